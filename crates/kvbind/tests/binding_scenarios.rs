#![forbid(unsafe_code)]

//! Integration tests: end-to-end binding scenarios through the facade.

use std::cell::RefCell;
use std::rc::Rc;

use kvbind::prelude::*;
use kvbind::{RebindPolicy, bind, bind_map};

/// A hand-written object with typed fields.
#[derive(Debug, Default)]
struct Progress {
    fraction: f64,
    caption: String,
}

impl KeyValue for Progress {
    fn value_for_key(&self, key: &str) -> Option<Value> {
        match key {
            "fraction" => Some(Value::Float(self.fraction)),
            "caption" => Some(Value::from(self.caption.as_str())),
            _ => None,
        }
    }

    fn is_settable(&self, key: &str) -> bool {
        matches!(key, "fraction" | "caption")
    }

    fn set_value_for_key(&mut self, key: &str, value: Value) -> Result<(), KeyValueError> {
        match (key, value) {
            ("fraction", Value::Float(f)) => self.fraction = f,
            ("fraction", Value::Int(i)) => self.fraction = i as f64,
            ("caption", Value::Text(text)) => self.caption = text,
            ("caption", Value::Null) => self.caption.clear(),
            (key @ ("fraction" | "caption"), other) => {
                return Err(KeyValueError::TypeMismatch {
                    key: key.to_owned(),
                    expected: if key == "fraction" {
                        ValueKind::Float
                    } else {
                        ValueKind::Text
                    },
                    found: other.kind(),
                });
            }
            (key, _) => {
                return Err(KeyValueError::UnknownKey {
                    key: key.to_owned(),
                });
            }
        }
        Ok(())
    }
}

struct Fixture {
    registry: BindingRegistry,
    label: ObjectId,
    doc: ObjectId,
    user: ObjectId,
}

fn fixture(config: RegistryConfig) -> Fixture {
    let registry = BindingRegistry::new(config);
    let user = registry.insert(Record::new("User").with("name", "Alice"));
    let doc = registry.insert(Record::new("Doc").with("user", user));
    let label = registry.insert(Record::new("Label").with("title", Value::Null));
    Fixture {
        registry,
        label,
        doc,
        user,
    }
}

impl Fixture {
    fn title(&self) -> Option<Value> {
        self.registry.value(self.label, "title")
    }
}

// ============================================================================
// Core contract
// ============================================================================

#[test]
fn alice_bob_carol() {
    let f = fixture(RegistryConfig::default());
    f.registry.bind(f.label, "title", f.doc, "user.name").unwrap();
    assert_eq!(f.title(), Some(Value::from("Alice")));

    f.registry.set_value_at_path(f.doc, "user.name", "Bob").unwrap();
    assert_eq!(f.title(), Some(Value::from("Bob")));

    f.registry.unbind(f.label, "title", f.doc, "user.name").unwrap();
    f.registry.set_value_at_path(f.doc, "user.name", "Carol").unwrap();
    assert_eq!(f.title(), Some(Value::from("Bob")));
}

#[test]
fn alice_bob_carol_in_strong_mode() {
    let f = fixture(RegistryConfig::strong());
    f.registry.bind(f.label, "title", f.doc, "user.name").unwrap();
    f.registry.set_value(f.user, "name", "Bob").unwrap();
    assert_eq!(f.title(), Some(Value::from("Bob")));
    f.registry.unbind(f.label, "title", f.doc, "user.name").unwrap();
    f.registry.set_value(f.user, "name", "Carol").unwrap();
    assert_eq!(f.title(), Some(Value::from("Bob")));
    assert_eq!(f.registry.retain_count(f.doc), 0);
}

#[test]
fn every_mutation_is_visible_before_next_read() {
    let f = fixture(RegistryConfig::default());
    f.registry.bind(f.label, "title", f.doc, "user.name").unwrap();
    for name in ["a", "b", "c", "d"] {
        f.registry.set_value(f.user, "name", name).unwrap();
        assert_eq!(f.title(), Some(Value::from(name)));
    }
}

#[test]
fn double_unbind_is_quiet_by_default() {
    let f = fixture(RegistryConfig::default());
    f.registry.bind(f.label, "title", f.doc, "user.name").unwrap();
    assert!(f.registry.unbind(f.label, "title", f.doc, "user.name").is_ok());
    assert!(f.registry.unbind(f.label, "title", f.doc, "user.name").is_ok());
}

#[test]
fn double_unbind_is_reported_under_strict_policy() {
    let f = fixture(RegistryConfig::default().with_strict_unbind(true));
    f.registry.bind(f.label, "title", f.doc, "user.name").unwrap();
    assert!(f.registry.unbind(f.label, "title", f.doc, "user.name").is_ok());
    let err = f
        .registry
        .unbind(f.label, "title", f.doc, "user.name")
        .unwrap_err();
    assert!(matches!(err, BindError::NoSuchBinding { .. }));
    assert_eq!(
        err.to_string(),
        "no binding of \"title\" to key path \"user.name\""
    );
}

#[test]
fn rebinding_identical_tuple_keeps_one_subscription() {
    let f = fixture(RegistryConfig::default());
    let seen = Rc::new(RefCell::new(Vec::new()));
    let s = Rc::clone(&seen);
    let _sub = f
        .registry
        .observe(f.label, "title", move |v| s.borrow_mut().push(v.clone()))
        .unwrap();

    let first = f.registry.bind(f.label, "title", f.doc, "user.name").unwrap();
    let again = f.registry.bind(f.label, "title", f.doc, "user.name").unwrap();
    assert_eq!(first, again);
    assert_eq!(f.registry.binding_count(), 1);

    f.registry.set_value(f.user, "name", "Bob").unwrap();
    assert_eq!(
        *seen.borrow(),
        vec![Value::from("Alice"), Value::from("Bob")],
        "one write per change, not two"
    );
}

#[test]
fn replace_policy_installs_new_transform() {
    let f = fixture(RegistryConfig::default().with_rebind_policy(RebindPolicy::Replace));
    f.registry.bind(f.label, "title", f.doc, "user.name").unwrap();
    f.registry
        .bind_mapped(f.label, "title", f.doc, "user.name", |v| {
            Value::from(v.as_text().unwrap_or_default().to_uppercase())
        })
        .unwrap();
    f.registry.set_value(f.user, "name", "bob").unwrap();
    assert_eq!(f.title(), Some(Value::from("BOB")));
    assert_eq!(f.registry.binding_count(), 1);
}

// ============================================================================
// Key paths
// ============================================================================

#[test]
fn replacing_an_intermediate_moves_observation() {
    let f = fixture(RegistryConfig::default());
    f.registry.bind(f.label, "title", f.doc, "user.name").unwrap();

    let other = f.registry.insert(Record::new("User").with("name", "Zoe"));
    f.registry.set_value(f.doc, "user", other).unwrap();
    assert_eq!(f.title(), Some(Value::from("Zoe")));

    f.registry.set_value(f.user, "name", "stale").unwrap();
    assert_eq!(f.title(), Some(Value::from("Zoe")));
    f.registry.set_value(other, "name", "Zed").unwrap();
    assert_eq!(f.title(), Some(Value::from("Zed")));
}

#[test]
fn deep_paths_follow_every_level() {
    let registry = BindingRegistry::default();
    let city = registry.insert(Record::new("City").with("name", "Oslo"));
    let address = registry.insert(Record::new("Address").with("city", city));
    let user = registry.insert(Record::new("User").with("address", address));
    let doc = registry.insert(Record::new("Doc").with("owner", user));
    let label = registry.insert(Record::new("Label").with("text", Value::Null));

    registry
        .bind(label, "text", doc, "owner.address.city.name")
        .unwrap();
    assert_eq!(registry.value(label, "text"), Some(Value::from("Oslo")));

    let bergen = registry.insert(Record::new("City").with("name", "Bergen"));
    registry.set_value(address, "city", bergen).unwrap();
    assert_eq!(registry.value(label, "text"), Some(Value::from("Bergen")));

    registry.set_value(user, "address", Value::Null).unwrap();
    assert_eq!(registry.value(label, "text"), Some(Value::Null));
}

#[test]
fn path_through_null_binds_and_fills_in_later() {
    let registry = BindingRegistry::default();
    let doc = registry.insert(Record::new("Doc").with("user", Value::Null));
    let label = registry.insert(Record::new("Label").with("title", "placeholder"));
    registry.bind(label, "title", doc, "user.name").unwrap();
    assert_eq!(registry.value(label, "title"), Some(Value::Null));

    let user = registry.insert(Record::new("User").with("name", "Late"));
    registry.set_value(doc, "user", user).unwrap();
    assert_eq!(registry.value(label, "title"), Some(Value::from("Late")));
}

#[test]
fn invalid_bindings_are_rejected() {
    let f = fixture(RegistryConfig::default());
    for path in ["", ".user", "user.", "user..name", "us er"] {
        assert!(
            matches!(
                f.registry.bind(f.label, "title", f.doc, path),
                Err(BindError::InvalidKeyPath { .. })
            ),
            "{path:?} should be rejected"
        );
    }
    assert!(matches!(
        f.registry.bind(f.label, "title", f.doc, "owner"),
        Err(BindError::InvalidKeyPath { .. })
    ));
    assert!(matches!(
        f.registry.bind(f.label, "subtitle", f.doc, "user.name"),
        Err(BindError::InvalidProperty { .. })
    ));
    assert_eq!(f.registry.binding_count(), 0);
}

// ============================================================================
// Reference modes
// ============================================================================

#[test]
fn weak_mode_destroyed_target_with_live_proxy() {
    let f = fixture(RegistryConfig::weak());
    f.registry.bind(f.label, "title", f.doc, "user.name").unwrap();
    f.registry.destroy(f.doc).unwrap();

    // The user ("proxy") is still alive and mutable.
    f.registry.set_value(f.user, "name", "Bob").unwrap();
    assert_eq!(f.title(), Some(Value::from("Alice")));
    assert_eq!(f.registry.binding_count(), 0);
    assert_eq!(
        f.registry.unbind(f.label, "title", f.doc, "user.name"),
        Ok(())
    );
}

#[test]
fn weak_mode_destroyed_receiver() {
    let f = fixture(RegistryConfig::weak());
    f.registry.bind(f.label, "title", f.doc, "user.name").unwrap();
    f.registry.destroy(f.label).unwrap();
    f.registry.set_value(f.user, "name", "Bob").unwrap();
    assert_eq!(f.registry.binding_count(), 0);
    assert!(f.registry.leaked_bindings().is_empty());
}

#[test]
fn stale_handles_stay_stale_after_slot_reuse() {
    let f = fixture(RegistryConfig::weak());
    f.registry.destroy(f.doc).unwrap();
    let reused = f.registry.insert(Record::new("Doc").with("user", f.user));
    assert!(!f.registry.is_alive(f.doc));
    assert!(f.registry.is_alive(reused));
    assert_eq!(
        f.registry.bind(f.label, "title", f.doc, "user.name"),
        Err(BindError::StaleObject(f.doc))
    );
    f.registry.bind(f.label, "title", reused, "user.name").unwrap();
}

#[test]
fn strong_mode_target_survives_owner_release() {
    let f = fixture(RegistryConfig::strong());
    let id = f.registry.bind(f.label, "title", f.doc, "user.name").unwrap();
    f.registry.destroy(f.doc).unwrap();

    assert!(!f.registry.is_alive(f.doc));
    assert_eq!(f.registry.retain_count(f.doc), 1);
    f.registry.set_value(f.user, "name", "Bob").unwrap();
    assert_eq!(f.title(), Some(Value::from("Bob")));

    let leaked = f.registry.leaked_bindings();
    assert_eq!(leaked.len(), 1);
    assert_eq!(leaked[0].id, id);
    assert!(leaked[0].retains_target);

    f.registry.unbind_by_id(id).unwrap();
    assert!(f.registry.leaked_bindings().is_empty());
    assert_eq!(f.registry.value(f.doc, "user"), None, "finalized");
}

#[test]
fn destroyed_intermediate_propagates_null() {
    for config in [RegistryConfig::weak(), RegistryConfig::strong()] {
        let f = fixture(config);
        f.registry.bind(f.label, "title", f.doc, "user.name").unwrap();
        f.registry.destroy(f.user).unwrap();
        assert_eq!(f.title(), Some(Value::Null));
    }
}

// ============================================================================
// Propagation
// ============================================================================

#[test]
fn custom_key_value_objects_participate() {
    let registry = BindingRegistry::default();
    let model = registry.insert(Record::new("Task").with("done", 3).with("name", "Build"));
    let bar = registry.insert(Progress::default());

    registry
        .bind_mapped(bar, "fraction", model, "done", |v| {
            Value::Float(v.as_int().unwrap_or(0) as f64 / 10.0)
        })
        .unwrap();
    registry.bind(bar, "caption", model, "name").unwrap();
    assert_eq!(registry.value(bar, "fraction"), Some(Value::Float(0.3)));
    assert_eq!(registry.value(bar, "caption"), Some(Value::from("Build")));

    registry.set_value(model, "done", 5).unwrap();
    assert_eq!(registry.value(bar, "fraction"), Some(Value::Float(0.5)));

    // A rejected write is skipped; the caption keeps its old value.
    registry.set_value(model, "name", true).unwrap();
    assert_eq!(registry.value(bar, "caption"), Some(Value::from("Build")));
}

#[test]
fn fan_out_and_chains() {
    let registry = BindingRegistry::default();
    let source = registry.insert(Record::new("Source").with("v", 1));
    let mid = registry.insert(Record::new("Mid").with("v", Value::Null));
    let leaves: Vec<ObjectId> = (0..4)
        .map(|_| registry.insert(Record::new("Leaf").with("v", Value::Null)))
        .collect();

    registry.bind(mid, "v", source, "v").unwrap();
    for &leaf in &leaves {
        registry.bind(leaf, "v", mid, "v").unwrap();
    }
    registry.set_value(source, "v", 42).unwrap();
    for &leaf in &leaves {
        assert_eq!(registry.value(leaf, "v"), Some(Value::from(42)));
    }
    assert_eq!(registry.bindings_for(mid).len(), 1);
}

#[test]
fn two_way_binding_converges_and_unbinds_on_drop() {
    let registry = BindingRegistry::default();
    let field = registry.insert(Record::new("Field").with("text", "initial"));
    let model = registry.insert(Record::new("Model").with("text", Value::Null));

    let binding = registry.bind_two_way(field, "text", model, "text").unwrap();
    assert_eq!(registry.value(model, "text"), Some(Value::from("initial")));

    registry.set_value(model, "text", "from model").unwrap();
    assert_eq!(registry.value(field, "text"), Some(Value::from("from model")));
    registry.set_value(field, "text", "from field").unwrap();
    assert_eq!(registry.value(model, "text"), Some(Value::from("from field")));

    drop(binding);
    assert_eq!(registry.binding_count(), 0);
}

#[test]
fn non_converging_cycle_is_bounded() {
    let registry = BindingRegistry::new(
        RegistryConfig::default()
            .with_initial_sync(false)
            .with_max_propagation_steps(100),
    );
    let a = registry.insert(Record::new("Counter").with("n", 0));
    let b = registry.insert(Record::new("Counter").with("n", 0));
    let bump = |v: &Value| Value::from(v.as_int().unwrap_or(0) + 1);
    registry.bind_mapped(b, "n", a, "n", bump).unwrap();
    registry.bind_mapped(a, "n", b, "n", bump).unwrap();

    let err = registry.set_value(a, "n", 1).unwrap_err();
    assert_eq!(err, BindError::PropagationLimit { steps: 100 });
    // Still usable afterwards.
    assert_eq!(registry.binding_count(), 2);
    // Exactly 100 propagated writes landed.
    assert_eq!(registry.value(a, "n"), Some(Value::from(101)));
    assert_eq!(registry.value(b, "n"), Some(Value::from(100)));
}

#[test]
fn cycle_created_by_bind_is_rolled_back() {
    let registry = BindingRegistry::new(RegistryConfig::default().with_max_propagation_steps(8));
    let a = registry.insert(Record::new("Counter").with("n", 0));
    let b = registry.insert(Record::new("Counter").with("n", 0));
    let bump = |v: &Value| Value::from(v.as_int().unwrap_or(0) + 1);
    registry.bind_mapped(b, "n", a, "n", bump).unwrap();

    let err = registry.bind_mapped(a, "n", b, "n", bump).unwrap_err();
    assert!(matches!(err, BindError::PropagationLimit { .. }));
    assert_eq!(registry.binding_count(), 1);
    assert!(!registry.is_bound(a, "n", b, "n"));
}

// ============================================================================
// Observers, scopes, macros
// ============================================================================

#[test]
fn observers_see_each_settled_value_once() {
    let f = fixture(RegistryConfig::default());
    f.registry.bind(f.label, "title", f.doc, "user.name").unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let s = Rc::clone(&seen);
    let _sub = f
        .registry
        .observe(f.doc, "user.name", move |v| s.borrow_mut().push(v.clone()))
        .unwrap();

    f.registry.set_value(f.user, "name", "Bob").unwrap();
    f.registry.set_value(f.user, "name", "Bob").unwrap();
    f.registry.set_value(f.user, "name", "Cy").unwrap();
    assert_eq!(*seen.borrow(), vec![Value::from("Bob"), Value::from("Cy")]);
}

#[test]
fn scope_tears_down_everything() {
    let f = fixture(RegistryConfig::default());
    let other = f
        .registry
        .insert(Record::new("Badge").with("text", Value::Null));
    let fired = Rc::new(RefCell::new(0));
    {
        let mut scope = BindingScope::new(&f.registry);
        scope.bind(f.label, "title", f.doc, "user.name").unwrap();
        scope.bind(other, "text", f.doc, "user.name").unwrap();
        let c = Rc::clone(&fired);
        scope
            .observe(f.label, "title", move |_| *c.borrow_mut() += 1)
            .unwrap();
        f.registry.set_value(f.user, "name", "Bob").unwrap();
        assert_eq!(scope.binding_count(), 3);
    }
    assert_eq!(f.registry.binding_count(), 0);
    f.registry.set_value(f.user, "name", "Cy").unwrap();
    assert_eq!(*fired.borrow(), 1);
    assert_eq!(f.registry.value(other, "text"), Some(Value::from("Bob")));
}

#[test]
fn macros_bind_by_property_name() {
    let f = fixture(RegistryConfig::default());
    let label = f.label;
    let doc = f.doc;
    let id = bind!(f.registry, label.title <- doc."user.name").unwrap();
    assert_eq!(f.title(), Some(Value::from("Alice")));
    f.registry.unbind_by_id(id).unwrap();

    bind_map!(f.registry, label.title <- doc."user.name", |v| {
        Value::from(format!("<{}>", v.as_text().unwrap_or("")))
    })
    .unwrap();
    assert_eq!(f.title(), Some(Value::from("<Alice>")));
}

#[test]
fn introspection_reports_bindings() {
    let f = fixture(RegistryConfig::default());
    let id = f.registry.bind(f.label, "title", f.doc, "user.name").unwrap();
    let info = f.registry.binding(id).unwrap();
    assert_eq!(info.receiver, f.label);
    assert_eq!(info.property, "title");
    assert_eq!(info.target, f.doc);
    assert_eq!(info.key_path, "user.name");
    assert!(!info.mapped);
    assert_eq!(f.registry.bindings_for(f.label), vec![info]);
    assert!(f.registry.bindings_for(f.doc).is_empty());
}
