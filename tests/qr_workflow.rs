#![cfg(feature = "web")]

mod common;

use fleet_dashboard::catalog::HttpCatalog;
use fleet_dashboard::qr::{ModuleMatrix, QrOptions};
use fleet_dashboard::{Action, QrWorkflow, WorkflowState};

use common::{ORIGIN, spawn_inventory_api};

async fn mounted(catalog: &HttpCatalog, id: &str) -> QrWorkflow {
    let mut workflow = QrWorkflow::new(ORIGIN, id);
    assert_eq!(workflow.state(), WorkflowState::Loading);
    assert!(workflow.available_actions().is_empty());
    workflow.fetch_item(catalog).await;
    workflow
}

#[tokio::test]
async fn target_url_is_fixed_before_the_fetch() {
    let api = spawn_inventory_api().await;
    let catalog = HttpCatalog::new(&api.config()).unwrap();

    let workflow = QrWorkflow::new(ORIGIN, "42");
    assert_eq!(workflow.target_url(), "https://flota.example/autobus/42");

    let workflow = mounted(&catalog, "42").await;
    assert_eq!(workflow.target_url(), "https://flota.example/autobus/42");
    assert_eq!(workflow.item().unwrap().title(), "Yutong ZK6129H");
}

#[tokio::test]
async fn unavailable_buses_end_in_not_found() {
    let api = spawn_inventory_api().await;
    let catalog = HttpCatalog::new(&api.config()).unwrap();

    // 404, empty object and server error all land in the same dead end.
    for id in ["999", "0", "500"] {
        let mut workflow = mounted(&catalog, id).await;
        assert_eq!(workflow.state(), WorkflowState::NotFound, "bus {}", id);
        assert_eq!(workflow.available_actions(), vec![Action::NavigateBack]);
        assert!(!workflow.generate_artifact());
        assert!(workflow.artifact().is_none());
    }
}

#[tokio::test]
async fn an_unreachable_api_ends_in_not_found() {
    let config = fleet_dashboard::AppConfig::new().with_api_base_url("http://127.0.0.1:9/api");
    let catalog = HttpCatalog::new(&config).unwrap();

    let workflow = mounted(&catalog, "42").await;
    assert_eq!(workflow.state(), WorkflowState::NotFound);
}

#[tokio::test]
async fn download_and_print_wait_for_generation() {
    let api = spawn_inventory_api().await;
    let catalog = HttpCatalog::new(&api.config()).unwrap();
    let mut workflow = mounted(&catalog, "42").await;

    assert_eq!(workflow.state(), WorkflowState::Loaded);
    assert!(!workflow.allows(Action::Download));
    assert!(!workflow.allows(Action::Print));
    assert!(workflow.request_download().is_none());
    assert!(workflow.print().is_none());
    assert_eq!(workflow.state(), WorkflowState::Loaded);

    assert!(workflow.generate_artifact());
    assert!(workflow.allows(Action::Download));
    assert!(workflow.allows(Action::Print));
}

#[tokio::test]
async fn regenerating_is_deterministic() {
    let api = spawn_inventory_api().await;
    let catalog = HttpCatalog::new(&api.config()).unwrap();
    let mut workflow = mounted(&catalog, "42").await;

    workflow.generate_artifact();
    let first = workflow.artifact().unwrap().encoded().bytes().to_vec();
    workflow.generate_artifact();
    let second = workflow.artifact().unwrap().encoded().bytes().to_vec();

    assert_eq!(first, second);
    assert_eq!(workflow.state(), WorkflowState::Generated);
}

#[tokio::test]
async fn confirmed_download_is_the_named_300px_png() {
    let api = spawn_inventory_api().await;
    let catalog = HttpCatalog::new(&api.config()).unwrap();
    let mut workflow = mounted(&catalog, "42").await;
    workflow.generate_artifact();

    let preview = workflow.request_download().unwrap();
    assert_eq!(preview.file_name, "QR-Yutong-ZK6129H.png");
    assert_eq!(preview.dimensions, "300x300 px");
    assert!(preview.data_uri.starts_with("data:image/png;base64,"));

    let file = workflow.confirm_download().unwrap();
    assert_eq!(file.file_name, "QR-Yutong-ZK6129H.png");
    assert_eq!(file.content_type, "image/png");
    assert_eq!(workflow.state(), WorkflowState::Generated);

    let decoded = image::load_from_memory(&file.bytes).unwrap().to_rgb8();
    assert_eq!(decoded.dimensions(), (300, 300));
}

#[tokio::test]
async fn cancel_returns_without_touching_the_artifact() {
    let api = spawn_inventory_api().await;
    let catalog = HttpCatalog::new(&api.config()).unwrap();
    let mut workflow = mounted(&catalog, "42").await;
    workflow.generate_artifact();
    let before = workflow.artifact().cloned();

    workflow.request_download().unwrap();
    assert!(!workflow.allows(Action::Generate));
    assert!(workflow.cancel_download());

    assert_eq!(workflow.state(), WorkflowState::Generated);
    assert_eq!(workflow.artifact().cloned(), before);
}

#[tokio::test]
async fn surface_and_png_encode_the_target_url() {
    let api = spawn_inventory_api().await;
    let catalog = HttpCatalog::new(&api.config()).unwrap();
    let mut workflow = mounted(&catalog, "42").await;
    workflow.generate_artifact();

    let artifact = workflow.artifact().unwrap();
    let surface = artifact.surface().raster();
    let decoded = image::load_from_memory(artifact.encoded().bytes())
        .unwrap()
        .to_rgb8();
    assert_eq!(surface.dimensions(), (300, 300));
    assert_eq!(surface.as_raw(), decoded.as_raw());

    // Sample the centre of every module and compare with a fresh encoding.
    let options = QrOptions::default();
    let matrix = ModuleMatrix::encode(workflow.target_url(), options.ec_level).unwrap();
    let total = matrix.size() + 2 * options.margin as usize;
    let scale = options.width as f64 / total as f64;
    for my in 0..matrix.size() {
        for mx in 0..matrix.size() {
            let px = ((mx as f64 + options.margin as f64 + 0.5) * scale) as u32;
            let py = ((my as f64 + options.margin as f64 + 0.5) * scale) as u32;
            let expected = if matrix.is_dark(mx, my) {
                options.dark
            } else {
                options.light
            };
            assert_eq!(*surface.get_pixel(px, py), expected, "module ({}, {})", mx, my);
        }
    }
}

#[tokio::test]
async fn print_sheet_carries_title_and_usage() {
    let api = spawn_inventory_api().await;
    let catalog = HttpCatalog::new(&api.config()).unwrap();
    let mut workflow = mounted(&catalog, "42").await;
    workflow.generate_artifact();

    let sheet = workflow.print().unwrap();
    assert_eq!(sheet.title, "Yutong ZK6129H");
    assert_eq!(sheet.usage.as_deref(), Some("Turismo"));
    assert_eq!(sheet.size_px, 300);
    assert_eq!(
        sheet.data_uri,
        workflow.artifact().unwrap().encoded().data_uri()
    );
    assert_eq!(workflow.state(), WorkflowState::Generated);
}
