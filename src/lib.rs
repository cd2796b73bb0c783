/*!
# Fleet Dashboard

A browser-based administration dashboard for a bus fleet and its spare-part
catalog, built in Rust on top of a REST inventory API.

## Overview

Staff sign in, browse and edit the bus inventory and the spare-part catalog,
and produce printable artifacts for each bus: a technical fiche and a QR code
that points at the bus's public detail page. Anyone who scans the code lands
on that page without signing in.

## Architecture

### Frontend Layer
- **Technologies**: server-rendered HTML (Handlebars), plain forms
- **Key Components**:
  - Inventory and catalog pages with search and pagination
  - QR page: generate, preview, confirm download, print
  - Technical fiche as PDF, and a print-only QR sheet

### Backend Layer
- **Technologies**: Rust, axum, tokio
- **Core Components**:
  - QR Workflow Controller - per-session state machine for one bus's QR code
  - QR Encoder - module matrix, raster surface and PNG encoding
  - Inventory Client - reqwest client for buses, parts, auth and profiles
  - Session Store - cookie sessions holding the API token and user
  - Profile Events - publish/subscribe refresh of open sessions

### Data Exchange
- XLSX export of the spare-part catalog, with pictures
- Excel and CSV import of spare parts

## Modules

- **routes**: Route templates shared by the router and the QR target URL
- **catalog**: Domain records and the inventory API client
- **payloads**: Form validation and request bodies
- **qr**: QR encoding and rasterization
- **workflow**: The QR workflow controller
- **session**: Session context and store
- **events**: Publish/subscribe subject
- **downloader**: Spreadsheet export and import
- **fiche**: Technical fiche PDF
- **config**, **error**: Runtime configuration and the error taxonomy
- **app**, **login**, **qr_page**, **templates**: The web layer (`web` feature)

## Pages

- `/` - Landing page with the fleet and the catalog
- `/autobus/{id}` - Public bus detail page, the QR target
- `/dashboard/inventory` - Bus inventory (+ QR, fiche page and PDF, edit, delete)
- `/dashboard/repuestos` - Spare-part catalog (+ export, import)
- `/dashboard/profile` - Profile of the signed-in user
*/

pub mod catalog;
pub mod config;
pub mod downloader;
pub mod error;
pub mod events;
pub mod fiche;
pub mod payloads;
pub mod qr;
pub mod routes;
pub mod session;
pub mod workflow;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod login;
#[cfg(feature = "web")]
pub mod qr_page;
#[cfg(feature = "web")]
pub mod templates;

pub use config::AppConfig;
pub use error::{FleetError, Result};
pub use workflow::{Action, QrWorkflow, WorkflowState};
