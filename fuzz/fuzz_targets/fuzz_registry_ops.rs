#![no_main]

use arbitrary::Arbitrary;
use kvbind_core::{Record, Value};
use kvbind_runtime::{BindingRegistry, RegistryConfig};
use libfuzzer_sys::fuzz_target;

const OBJECTS: usize = 4;
const PATHS: [&str; 5] = ["v", "next", "next.v", "next.next.v", "missing"];

#[derive(Arbitrary, Debug)]
enum Op {
    Bind { receiver: u8, target: u8, path: u8 },
    Unbind { receiver: u8, target: u8, path: u8 },
    SetInt { object: u8, value: i8 },
    Link { object: u8, next: u8 },
    Unlink { object: u8 },
    Destroy { object: u8 },
}

#[derive(Arbitrary, Debug)]
struct Input {
    strong: bool,
    strict_unbind: bool,
    ops: Vec<Op>,
}

fuzz_target!(|input: Input| {
    let config = if input.strong {
        RegistryConfig::strong()
    } else {
        RegistryConfig::weak()
    }
    .with_strict_unbind(input.strict_unbind)
    .with_max_propagation_steps(64);

    let registry = BindingRegistry::new(config);
    let objects: Vec<_> = (0..OBJECTS)
        .map(|_| registry.insert(Record::new("Node").with("v", 0).with("next", Value::Null)))
        .collect();
    let object = |i: u8| objects[usize::from(i) % OBJECTS];
    let path = |i: u8| PATHS[usize::from(i) % PATHS.len()];

    for op in input.ops.iter().take(256) {
        // Errors are expected; the registry must stay consistent.
        let _ = match *op {
            Op::Bind { receiver, target, path: p } => registry
                .bind(object(receiver), "v", object(target), path(p))
                .map(|_| ()),
            Op::Unbind { receiver, target, path: p } => {
                registry.unbind(object(receiver), "v", object(target), path(p))
            }
            Op::SetInt { object: o, value } => {
                registry.set_value(object(o), "v", i64::from(value))
            }
            Op::Link { object: o, next } => registry.set_value(object(o), "next", object(next)),
            Op::Unlink { object: o } => registry.set_value(object(o), "next", Value::Null),
            Op::Destroy { object: o } => registry.destroy(object(o)),
        };
        assert!(registry.leaked_bindings().len() <= registry.binding_count());
    }
});
