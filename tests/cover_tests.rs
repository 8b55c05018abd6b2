//! Process-wide manager handle tests
//!
//! Runs as its own test binary: the handle can only be installed once per
//! process, so everything happens in a single test.

mod common;

use common::*;
use component_manager::{cover, ComponentError};

#[test]
fn test_cover_lifecycle() {
    assert!(!cover::contains("alpha.svc"));
    assert!(!cover::has_been_closed());
    assert!(matches!(cover::get("alpha.svc"), Err(ComponentError::NotAvailable(_))));
    assert!(matches!(cover::close(), Err(ComponentError::NotAvailable(_))));

    let fixture = ComponentsFixture::new().unwrap();
    fixture
        .write_module(
            "alpha",
            r#"
[[service]]
name = "alpha.svc"
recipe = "builtin.value"
"#,
        )
        .unwrap();
    let manager = fixture.started();

    cover::install(manager.clone()).unwrap();
    assert!(matches!(
        cover::install(fixture.manager()),
        Err(ComponentError::Unsupported(_))
    ));

    assert!(cover::contains("alpha.svc"));
    let via_cover = cover::get("alpha.svc").unwrap();
    let direct = manager.get("alpha.svc").unwrap();
    assert!(component_manager::module::traits::same_service(&via_cover, &direct));

    cover::close().unwrap();
    assert!(cover::has_been_closed());
    assert!(manager.has_been_closed());
    assert!(matches!(cover::get("alpha.svc"), Err(ComponentError::Closed)));
}
