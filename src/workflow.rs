//! QR workflow controller.
//!
//! Drives one bus's QR code through
//! `Loading → Loaded → Generated ⇄ PreviewingDownload`, with `NotFound` as the
//! dead end when the bus cannot be loaded. Download and print are gated on a
//! generated artifact, and a download is only committed after an explicit
//! confirmation.

use serde::Serialize;

use crate::catalog::{Bus, ItemSource};
use crate::qr::{QrArtifact, QrOptions};
use crate::routes;

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkflowState {
    Loading,
    NotFound,
    Loaded,
    Generated,
    PreviewingDownload,
}

/// User actions the interface may offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Action {
    NavigateBack,
    Generate,
    Download,
    Print,
    Confirm,
    Cancel,
}

/// What the confirmation dialog shows before a download is committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadPreview {
    pub title: String,
    pub data_uri: String,
    pub dimensions: String,
    pub file_name: String,
}

/// A committed download, ready to be handed to the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadFile {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Content of the print-only view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrintSheet {
    pub title: String,
    pub usage: Option<String>,
    pub data_uri: String,
    pub size_px: u32,
}

/// `QR-{marca}-{modelo}.png`
pub fn download_file_name(bus: &Bus) -> String {
    format!("QR-{}-{}.png", bus.marca, bus.modelo)
}

/// Controller for one mounted QR page.
#[derive(Debug, Clone)]
pub struct QrWorkflow {
    item_id: String,
    target_url: String,
    options: QrOptions,
    state: WorkflowState,
    item: Option<Bus>,
    artifact: Option<QrArtifact>,
}

impl QrWorkflow {
    /// Mount a controller for `item_id`. The QR target is fixed here from the
    /// public route template and never depends on the fetched item.
    pub fn new(origin: &str, item_id: &str) -> Self {
        Self::with_options(origin, item_id, QrOptions::default())
    }

    pub fn with_options(origin: &str, item_id: &str, options: QrOptions) -> Self {
        Self {
            item_id: item_id.to_string(),
            target_url: routes::public_bus_url(origin, item_id),
            options,
            state: WorkflowState::Loading,
            item: None,
            artifact: None,
        }
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn item(&self) -> Option<&Bus> {
        self.item.as_ref()
    }

    pub fn artifact(&self) -> Option<&QrArtifact> {
        self.artifact.as_ref()
    }

    pub fn is_generated(&self) -> bool {
        self.artifact.is_some()
    }

    /// Load the bus. Any failure, including an empty answer, ends in
    /// `NotFound`; there is no retry. Calls outside `Loading` are ignored.
    pub async fn fetch_item(&mut self, source: &dyn ItemSource) {
        if self.state != WorkflowState::Loading {
            return;
        }

        match source.fetch_bus(&self.item_id).await {
            Ok(bus) => {
                log::debug!("loaded bus {} for QR workflow", bus.id);
                self.item = Some(bus);
                self.state = WorkflowState::Loaded;
            }
            Err(e) => {
                log::warn!("bus {} unavailable for QR workflow: {}", self.item_id, e);
                self.state = WorkflowState::NotFound;
            }
        }
    }

    /// Produce both materializations for the target URL, replacing any
    /// previous artifact. Returns whether an artifact is now held.
    ///
    /// On encoding failure the error is logged, the artifact is dropped and
    /// the controller sits in `Loaded` so the user can try again.
    pub fn generate_artifact(&mut self) -> bool {
        if !matches!(self.state, WorkflowState::Loaded | WorkflowState::Generated) {
            return false;
        }

        match QrArtifact::generate(&self.target_url, &self.options) {
            Ok(artifact) => {
                self.artifact = Some(artifact);
                self.state = WorkflowState::Generated;
                true
            }
            Err(e) => {
                log::error!("QR generation failed for {}: {}", self.target_url, e);
                self.artifact = None;
                self.state = WorkflowState::Loaded;
                false
            }
        }
    }

    /// Open the confirmation step. Nothing is written yet.
    pub fn request_download(&mut self) -> Option<DownloadPreview> {
        if self.state != WorkflowState::Generated {
            return None;
        }
        let preview = self.download_preview()?;
        self.state = WorkflowState::PreviewingDownload;
        Some(preview)
    }

    /// The preview shown while in `PreviewingDownload`.
    pub fn download_preview(&self) -> Option<DownloadPreview> {
        let (bus, artifact) = (self.item.as_ref()?, self.artifact.as_ref()?);
        let encoded = artifact.encoded();
        Some(DownloadPreview {
            title: bus.title(),
            data_uri: encoded.data_uri(),
            dimensions: format!("{}x{} px", encoded.width(), encoded.height()),
            file_name: download_file_name(bus),
        })
    }

    /// Commit the pending download and go back to `Generated`.
    pub fn confirm_download(&mut self) -> Option<DownloadFile> {
        if self.state != WorkflowState::PreviewingDownload {
            return None;
        }
        let (bus, artifact) = (self.item.as_ref()?, self.artifact.as_ref()?);
        let file = DownloadFile {
            file_name: download_file_name(bus),
            content_type: "image/png",
            bytes: artifact.encoded().bytes().to_vec(),
        };
        self.state = WorkflowState::Generated;
        Some(file)
    }

    /// Drop the pending confirmation. The artifact stays as it was.
    pub fn cancel_download(&mut self) -> bool {
        if self.state != WorkflowState::PreviewingDownload {
            return false;
        }
        self.state = WorkflowState::Generated;
        true
    }

    /// Content for the print-only view. Does not change state.
    pub fn print(&self) -> Option<PrintSheet> {
        if self.state != WorkflowState::Generated {
            return None;
        }
        let (bus, artifact) = (self.item.as_ref()?, self.artifact.as_ref()?);
        Some(PrintSheet {
            title: bus.title(),
            usage: bus.uso.clone(),
            data_uri: artifact.encoded().data_uri(),
            size_px: artifact.options().width,
        })
    }

    /// Actions the interface should offer in the current state.
    pub fn available_actions(&self) -> Vec<Action> {
        match self.state {
            WorkflowState::Loading => Vec::new(),
            WorkflowState::NotFound => vec![Action::NavigateBack],
            WorkflowState::Loaded => vec![Action::NavigateBack, Action::Generate],
            WorkflowState::Generated => vec![
                Action::NavigateBack,
                Action::Generate,
                Action::Download,
                Action::Print,
            ],
            WorkflowState::PreviewingDownload => vec![Action::Confirm, Action::Cancel],
        }
    }

    pub fn allows(&self, action: Action) -> bool {
        self.available_actions().contains(&action)
    }
}
