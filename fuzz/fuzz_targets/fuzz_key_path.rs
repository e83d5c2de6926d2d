#![no_main]

use kvbind_core::KeyPath;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(path) = KeyPath::parse(raw) else {
        return;
    };
    assert!(path.len() >= 1);
    assert_eq!(path.segments().collect::<Vec<_>>().join("."), raw);
    assert_eq!(KeyPath::parse(path.as_str()).as_ref(), Ok(&path));
    if let Some(parent) = path.parent() {
        assert_eq!(parent.len() + 1, path.len());
    }
});
