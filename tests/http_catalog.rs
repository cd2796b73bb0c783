#![cfg(feature = "web")]

mod common;

use fleet_dashboard::FleetError;
use fleet_dashboard::catalog::{HttpCatalog, ItemSource, User};
use fleet_dashboard::payloads::{LoginRequest, ProfileUpdate, SparePartForm, SparePartPayload};

use common::{EMAIL, PASSWORD, TOKEN, spawn_inventory_api};

#[tokio::test]
async fn lists_and_fetches_from_the_api() {
    let api = spawn_inventory_api().await;
    let catalog = HttpCatalog::new(&api.config()).unwrap();

    let buses = catalog.list_buses().await.unwrap();
    assert_eq!(buses.len(), 2);
    assert_eq!(buses[0].id, "42");

    let bus = catalog.fetch_bus("42").await.unwrap();
    assert_eq!(bus.asientos.as_deref(), Some("49"));

    let parts = catalog.list_parts().await.unwrap();
    assert_eq!(parts[1].modelo.as_deref(), Some("ZK6129H"));
}

#[tokio::test]
async fn missing_and_failing_buses_are_errors() {
    let api = spawn_inventory_api().await;
    let catalog = HttpCatalog::new(&api.config()).unwrap();

    assert!(matches!(catalog.fetch_bus("999").await, Err(FleetError::NotFound(_))));
    assert!(matches!(catalog.fetch_bus("0").await, Err(FleetError::NotFound(_))));
    match catalog.fetch_bus("500").await {
        Err(FleetError::Upstream { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "db down");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn parts_are_posted_as_multipart() {
    let api = spawn_inventory_api().await;
    let catalog = HttpCatalog::new(&api.config()).unwrap();

    let payload = SparePartPayload::try_from(SparePartForm {
        nombre: "Correa".into(),
        ..Default::default()
    })
    .unwrap();
    catalog.save_part(None, &payload, None).await.unwrap();
    assert_eq!(api.created_parts(), 1);

    let rejected = SparePartPayload::try_from(SparePartForm {
        nombre: "Rechazado".into(),
        ..Default::default()
    })
    .unwrap();
    let err = catalog.save_part(None, &rejected, None).await.unwrap_err();
    assert_eq!(err.status_code(), 400);
    assert_eq!(err.user_message(), "Repuesto duplicado");
}

#[tokio::test]
async fn login_returns_token_and_user() {
    let api = spawn_inventory_api().await;
    let catalog = HttpCatalog::new(&api.config()).unwrap();

    let response = catalog
        .login(&LoginRequest {
            email: EMAIL.into(),
            password: PASSWORD.into(),
        })
        .await
        .unwrap();
    assert_eq!(response.token, TOKEN);
    assert_eq!(response.user.id, "5");
    assert_eq!(response.user.display_name(), "Ana Pérez");
}

#[tokio::test]
async fn profile_update_needs_a_valid_token() {
    let api = spawn_inventory_api().await;
    let catalog = HttpCatalog::new(&api.config()).unwrap();
    let user = User {
        id: "5".into(),
        nombre: "Ana".into(),
        apellido: "Pérez".into(),
        email: EMAIL.into(),
        imagen: None,
    };
    let update = ProfileUpdate {
        nombre: "Anita".into(),
        apellido: "Pérez".into(),
        email: EMAIL.into(),
        password: None,
    };

    let updated = catalog
        .update_profile(TOKEN, &user, &update, None)
        .await
        .unwrap();
    assert_eq!(updated.nombre, "Anita");
    assert_eq!(updated.email, EMAIL);

    let err = catalog
        .update_profile("expired", &user, &update, None)
        .await
        .unwrap_err();
    assert!(matches!(err, FleetError::Unauthorized));
}
