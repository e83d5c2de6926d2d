#![forbid(unsafe_code)]

//! Integration tests: structured log output of the registry.

use kvbind::prelude::*;
use tracing_test::traced_test;

fn setup(config: RegistryConfig) -> (BindingRegistry, ObjectId, ObjectId, ObjectId) {
    let registry = BindingRegistry::new(config);
    let user = registry.insert(Record::new("User").with("name", "Alice"));
    let doc = registry.insert(Record::new("Doc").with("user", user));
    let label = registry.insert(
        Record::new("Label")
            .with("title", Value::Null)
            .with_typed("count", ValueKind::Int, 0),
    );
    (registry, label, doc, user)
}

#[test]
#[traced_test]
fn bind_and_unbind_are_logged_with_fields() {
    let (registry, label, doc, _) = setup(RegistryConfig::default());
    registry.bind(label, "title", doc, "user.name").unwrap();
    assert!(logs_contain("bound property to key path"));
    assert!(logs_contain("key_path=\"user.name\""));
    assert!(logs_contain("mode=weak"));

    registry.unbind(label, "title", doc, "user.name").unwrap();
    assert!(logs_contain("unbound"));
}

#[test]
#[traced_test]
fn rejected_propagation_is_warned() {
    let (registry, label, _, _) = setup(RegistryConfig::default());
    let holder = registry.insert(Record::new("Holder").with("n", 1));
    registry.bind(label, "count", holder, "n").unwrap();
    registry.set_value(holder, "n", "many").unwrap();
    assert!(logs_contain("receiver rejected propagated value"));
    assert_eq!(registry.value(label, "count"), Some(Value::from(1)));
}

#[test]
#[traced_test]
fn strong_release_of_retained_target_is_warned() {
    let (registry, label, doc, _) = setup(RegistryConfig::strong());
    registry.bind(label, "title", doc, "user.name").unwrap();
    registry.destroy(doc).unwrap();
    assert!(logs_contain("object released while strong bindings retain it"));
}

#[test]
#[traced_test]
fn weak_invalidation_is_logged() {
    let (registry, label, doc, _) = setup(RegistryConfig::weak());
    registry.bind(label, "title", doc, "user.name").unwrap();
    registry.destroy(doc).unwrap();
    assert!(logs_contain("binding invalidated: endpoint destroyed"));
    assert!(logs_contain("object destroyed"));
}

#[test]
#[traced_test]
fn propagation_limit_is_warned() {
    let registry = BindingRegistry::new(
        RegistryConfig::default()
            .with_initial_sync(false)
            .with_max_propagation_steps(4),
    );
    let a = registry.insert(Record::new("Counter").with("n", 0));
    let b = registry.insert(Record::new("Counter").with("n", 0));
    let bump = |v: &Value| Value::from(v.as_int().unwrap_or(0) + 1);
    registry.bind_mapped(b, "n", a, "n", bump).unwrap();
    registry.bind_mapped(a, "n", b, "n", bump).unwrap();
    assert!(registry.set_value(a, "n", 1).is_err());
    assert!(logs_contain("propagation limit reached"));
}
