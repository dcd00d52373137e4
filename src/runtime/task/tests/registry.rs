//! Registry tests

use crate::runtime::task::{Buffer, Registry, WorkId};

#[test]
fn test_ids_follow_registration_order() {
    let mut registry = Registry::new();
    let a = registry.register_task("a", |_ctx, _args| {});
    let b = registry.register_task("b", |_ctx, _args| {});
    assert_eq!(a, WorkId(0));
    assert_eq!(b, WorkId(1));
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.lookup("b"), Some(b));
    assert_eq!(registry.get(a).map(|f| f.name.as_str()), Some("a"));
}

#[test]
fn test_reregistration_keeps_id() {
    let mut registry = Registry::new();
    let first = registry.register_task("work", |_ctx, _args| {});
    let second = registry.register_task("work", |_ctx, _args| {});
    assert_eq!(first, second);
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_unknown_id() {
    let registry = Registry::new();
    assert!(registry.is_empty());
    assert!(registry.get(WorkId(3)).is_none());
    assert!(registry.lookup("missing").is_none());
}

#[test]
fn test_broadcast_targets() {
    let mut registry = Registry::new();
    let buffer = Buffer::new::<f64>(8);
    let id = registry.register_broadcast("grid", buffer.clone());
    assert_eq!(registry.broadcast_id("grid"), Some(id));
    assert!(registry.broadcast_target(id).unwrap().ptr_eq(&buffer));
}
