//! Proxy and scope switching tests
//!
//! Calls through an exported name must run inside the owning module's scope
//! and hand the caller's scope back afterwards, however deep the chain.

mod common;

use common::*;
use component_manager::{ComponentError, Invocation, ServiceProxy};
use serde_json::{json, Value};

fn tracer_chain(fixture: &ComponentsFixture) {
    fixture
        .write_module(
            "alpha",
            r#"
[[service]]
name = "alpha.tracer"
recipe = "test.tracer"
"#,
        )
        .unwrap();
    fixture
        .write_module(
            "beta",
            r#"
[[service]]
name = "beta.tracer"
recipe = "test.tracer"
refs = { next = "alpha.tracer" }
"#,
        )
        .unwrap();
    fixture
        .write_module(
            "gamma",
            r#"
[[service]]
name = "gamma.tracer"
recipe = "test.tracer"
refs = { next = "beta.tracer" }
"#,
        )
        .unwrap();
}

#[test]
fn test_call_runs_in_owner_scope() {
    let fixture = ComponentsFixture::new().unwrap();
    tracer_chain(&fixture);
    let manager = fixture.started();

    assert_eq!(call_tracer(&manager, "alpha.tracer", "scope").unwrap(), json!("alpha"));
    assert_eq!(call_tracer(&manager, "beta.tracer", "scope").unwrap(), json!("beta"));
}

#[test]
fn test_nested_scopes_restore_across_modules() {
    let fixture = ComponentsFixture::new().unwrap();
    tracer_chain(&fixture);
    let manager = fixture.started();

    let mut call = manager.call_context();
    let gamma = manager.get("gamma.tracer").unwrap();
    let trace = gamma
        .invoke(&mut call, &Invocation::new(TRACER_CAPABILITY, "trace", Value::Null))
        .unwrap();

    assert_eq!(
        trace,
        json!(["gamma", "beta", "alpha", "alpha", "beta", "gamma"])
    );
    assert_eq!(call.scope_id().as_str(), "platform");
    assert_eq!(call.depth(), 0);
}

#[test]
fn test_scope_restored_after_failed_call() {
    let fixture = ComponentsFixture::new().unwrap();
    tracer_chain(&fixture);
    let manager = fixture.started();

    let mut call = manager.call_context();
    let beta = manager.get("beta.tracer").unwrap();
    let err = beta
        .invoke(&mut call, &Invocation::new(TRACER_CAPABILITY, "explode", Value::Null))
        .unwrap_err();

    assert!(matches!(err, ComponentError::UnknownMethod { .. }));
    assert_eq!(call.scope_id().as_str(), "platform");
}

#[test]
fn test_proxy_limits_surface_to_visible_capabilities() {
    let fixture = ComponentsFixture::new().unwrap();
    tracer_chain(&fixture);
    let manager = fixture.started();

    let alpha = manager.get("alpha.tracer").unwrap();
    let proxy = alpha.as_any().downcast_ref::<ServiceProxy>().unwrap();
    assert_eq!(proxy.owner(), "alpha");
    assert!(proxy.exposes(TRACER_CAPABILITY));
    assert!(!proxy.exposes(WIDGET_CAPABILITY));

    let err = manager
        .invoke("alpha.tracer", &Invocation::new(WIDGET_CAPABILITY, "label", Value::Null))
        .unwrap_err();
    assert!(matches!(err, ComponentError::CapabilityNotExposed { .. }));

    assert!(manager.get_as("alpha.tracer", TRACER_CAPABILITY).is_ok());
    assert!(matches!(
        manager.get_as("alpha.tracer", WIDGET_CAPABILITY),
        Err(ComponentError::CapabilityMismatch { .. })
    ));
}

#[test]
fn test_deferred_proxy_builds_on_first_call() {
    let fixture = ComponentsFixture::new().unwrap();
    fixture
        .write_module(
            "alpha",
            r#"
[[service]]
name = "alpha.deferred"
recipe = "test.tracer"
lazy = true
provides = ["test.Tracer"]
"#,
        )
        .unwrap();
    let manager = fixture.started();

    let handle = manager.get("alpha.deferred").unwrap();
    let proxy = handle.as_any().downcast_ref::<ServiceProxy>().unwrap();
    assert!(!proxy.is_resolved());
    assert_eq!(fixture.counter.tracers(), 0);

    assert_eq!(call_tracer(&manager, "alpha.deferred", "name").unwrap(), json!("alpha.deferred"));
    assert!(proxy.is_resolved());
    assert_eq!(fixture.counter.tracers(), 1);

    call_tracer(&manager, "alpha.deferred", "name").unwrap();
    assert_eq!(fixture.counter.tracers(), 1);
}

#[test]
fn test_root_binds_each_name_once() {
    let fixture = ComponentsFixture::new().unwrap();
    tracer_chain(&fixture);
    let manager = fixture.started();

    let first = manager.get("beta.tracer").unwrap();
    let second = manager.get("beta.tracer").unwrap();
    assert!(component_manager::module::traits::same_service(&first, &second));
    assert_eq!(fixture.counter.tracers(), 3);
}

#[test]
fn test_concurrent_lookups_share_one_binding() {
    let fixture = ComponentsFixture::new().unwrap();
    fixture
        .write_module(
            "alpha",
            r#"
[[service]]
name = "alpha.lazy"
recipe = "test.tracer"
lazy = true
"#,
        )
        .unwrap();
    let manager = fixture.started();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            std::thread::spawn(move || manager.get("alpha.lazy").unwrap())
        })
        .collect();
    let services: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let bound = manager.get("alpha.lazy").unwrap();
    assert!(services
        .iter()
        .all(|s| component_manager::module::traits::same_service(s, &bound)));
}

#[test]
fn test_stray_singleton_is_served_as_is() {
    let fixture = ComponentsFixture::new().unwrap();
    let manager = fixture.started();
    let stray: component_manager::ServiceRef = std::sync::Arc::new(WidgetService {
        label: "injected".into(),
    });

    manager
        .register_singleton("platform.widget", std::sync::Arc::clone(&stray))
        .unwrap();
    let found = manager.get("platform.widget").unwrap();

    assert!(component_manager::module::traits::same_service(&found, &stray));
    assert!(manager.get_all_exported_names().contains(&"platform.widget".to_string()));
    assert!(matches!(
        manager.register_singleton("platform.widget", stray),
        Err(ComponentError::Unsupported(_))
    ));
}

#[test]
fn test_close_ends_lookups_and_deferred_calls() {
    let fixture = ComponentsFixture::new().unwrap();
    fixture
        .write_module(
            "alpha",
            r#"
[[service]]
name = "alpha.deferred"
recipe = "test.tracer"
lazy = true
provides = ["test.Tracer"]
"#,
        )
        .unwrap();
    let manager = fixture.started();
    let handle = manager.get("alpha.deferred").unwrap();

    manager.close();
    manager.close();

    assert!(manager.has_been_closed());
    assert!(matches!(manager.get("alpha.deferred"), Err(ComponentError::Closed)));
    let err = handle
        .invoke(
            &mut manager.call_context(),
            &Invocation::new(TRACER_CAPABILITY, "name", Value::Null),
        )
        .unwrap_err();
    assert!(matches!(err, ComponentError::Closed));
    assert!(matches!(manager.refresh(), Err(ComponentError::Closed)));
}
