//! Route templates shared by the router and by every place that builds links.
//!
//! The public detail route is the target encoded into QR codes, so the router
//! registers [`PUBLIC_BUS_ROUTE`] and [`public_bus_url`] expands the very same
//! template. Changing the path here changes both.

/// Public (unauthenticated) bus detail page. QR codes point here.
pub const PUBLIC_BUS_ROUTE: &str = "/autobus/:id";

pub const LANDING_ROUTE: &str = "/";
pub const LOGIN_ROUTE: &str = "/login";
pub const REGISTER_ROUTE: &str = "/register";
pub const LOGOUT_ROUTE: &str = "/logout";

pub const DASHBOARD_ROUTE: &str = "/dashboard";
pub const INVENTORY_ROUTE: &str = "/dashboard/inventory";
pub const INVENTORY_NEW_ROUTE: &str = "/dashboard/inventory/new";
pub const INVENTORY_EDIT_ROUTE: &str = "/dashboard/inventory/edit/:id";
pub const INVENTORY_DELETE_ROUTE: &str = "/dashboard/inventory/:id/delete";
pub const INVENTORY_FICHE_ROUTE: &str = "/dashboard/inventory/:id/fiche";
pub const INVENTORY_FICHE_PDF_ROUTE: &str = "/dashboard/inventory/:id/fiche.pdf";

/// Mount point of the QR workflow for one bus. Action routes hang off it.
pub const QR_ROUTE: &str = "/dashboard/inventory/qr/:id";
pub const QR_GENERATE_ROUTE: &str = "/dashboard/inventory/qr/:id/generate";
pub const QR_DOWNLOAD_ROUTE: &str = "/dashboard/inventory/qr/:id/download";
pub const QR_CONFIRM_ROUTE: &str = "/dashboard/inventory/qr/:id/confirm";
pub const QR_CANCEL_ROUTE: &str = "/dashboard/inventory/qr/:id/cancel";
pub const QR_PRINT_ROUTE: &str = "/dashboard/inventory/qr/:id/print";
pub const QR_SURFACE_ROUTE: &str = "/dashboard/inventory/qr/:id/surface.png";

pub const PARTS_ROUTE: &str = "/dashboard/repuestos";
pub const PARTS_NEW_ROUTE: &str = "/dashboard/repuestos/new";
pub const PARTS_EDIT_ROUTE: &str = "/dashboard/repuestos/edit/:id";
pub const PARTS_DELETE_ROUTE: &str = "/dashboard/repuestos/:id/delete";
pub const PARTS_EXPORT_ROUTE: &str = "/dashboard/repuestos/export";
pub const PARTS_IMPORT_ROUTE: &str = "/dashboard/repuestos/import";

pub const PROFILE_ROUTE: &str = "/dashboard/profile";

/// Substitute `:id` in a route template.
///
/// # Examples
/// ```
/// use fleet_dashboard::routes::{expand, QR_ROUTE};
///
/// assert_eq!(expand(QR_ROUTE, "42"), "/dashboard/inventory/qr/42");
/// ```
pub fn expand(template: &str, id: &str) -> String {
    template.replacen(":id", id, 1)
}

/// Absolute public URL of a bus detail page: `{origin}/autobus/{id}`.
///
/// A trailing slash on `origin` is dropped so the result never contains `//`.
pub fn public_bus_url(origin: &str, id: &str) -> String {
    format!(
        "{}{}",
        origin.trim_end_matches('/'),
        expand(PUBLIC_BUS_ROUTE, id)
    )
}

/// Whether a request path belongs to the QR workflow of some bus.
pub fn is_qr_workflow_path(path: &str) -> bool {
    let prefix = QR_ROUTE.trim_end_matches(":id");
    path.starts_with(prefix)
}
