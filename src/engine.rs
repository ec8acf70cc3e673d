//! Device Engine
//!
//! Owns the three transport sessions, the shared session registry and the
//! release catalog, and implements the "flash a published release" actions
//! on top of them.

use crate::domain::models::{MessageSeverity, Transport};
use crate::domain::releases::{ArtifactFetcher, ReleaseCatalog, ReleaseSelection};
use crate::domain::settings::Settings;
use crate::infrastructure::bluetooth::adapter::GattAdapter;
use crate::infrastructure::bluetooth::BluetoothService;
use crate::infrastructure::dfu::device::UsbHost;
use crate::infrastructure::dfu::DfuService;
use crate::infrastructure::hid::device::HidHost;
use crate::infrastructure::hid::HidService;
use crate::infrastructure::notifier::Notifier;
use crate::infrastructure::registry::{self, RegistrySnapshot, SessionRegistry};
use crate::infrastructure::release_fetcher::HttpFetcher;
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tracing::info;

/// Host-side implementations of every transport
pub struct Backends {
    pub gatt: Arc<dyn GattAdapter>,
    pub usb: Arc<dyn UsbHost>,
    pub hid: Arc<dyn HidHost>,
    pub fetcher: Arc<dyn ArtifactFetcher>,
}

pub struct DeviceEngine {
    bluetooth: BluetoothService,
    dfu: DfuService,
    hid: HidService,
    registry: Arc<SessionRegistry>,
    notifier: Arc<dyn Notifier>,
    fetcher: Arc<dyn ArtifactFetcher>,
    catalog: Option<ReleaseCatalog>,
    settings: Settings,
}

impl DeviceEngine {
    pub fn new(backends: Backends, settings: Settings, notifier: Arc<dyn Notifier>) -> Self {
        let registry = Arc::new(SessionRegistry::with_notifier(notifier.clone()));

        let bluetooth = BluetoothService::new(
            backends.gatt,
            registry.clone(),
            notifier.clone(),
            settings.writes.clone(),
        );
        let dfu = DfuService::new(
            backends.usb,
            registry.clone(),
            notifier.clone(),
            settings.dfu.clone(),
        );
        let hid = HidService::new(backends.hid, registry.clone(), notifier.clone());

        Self {
            bluetooth,
            dfu,
            hid,
            registry,
            notifier,
            fetcher: backends.fetcher,
            catalog: None,
            settings,
        }
    }

    pub fn bluetooth(&self) -> &BluetoothService {
        &self.bluetooth
    }

    pub fn bluetooth_mut(&mut self) -> &mut BluetoothService {
        &mut self.bluetooth
    }

    pub fn dfu(&self) -> &DfuService {
        &self.dfu
    }

    pub fn dfu_mut(&mut self) -> &mut DfuService {
        &mut self.dfu
    }

    pub fn hid(&self) -> &HidService {
        &self.hid
    }

    pub fn hid_mut(&mut self) -> &mut HidService {
        &mut self.hid
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.registry.clone()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        self.registry.snapshot()
    }

    pub fn input_available(&self) -> bool {
        registry::input_available(&self.snapshot())
    }

    pub fn camera_available(&self) -> bool {
        registry::camera_available(&self.snapshot())
    }

    pub fn settings_available(&self) -> bool {
        registry::settings_available(&self.snapshot())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn catalog(&self) -> Option<&ReleaseCatalog> {
        self.catalog.as_ref()
    }

    pub fn set_catalog(&mut self, catalog: ReleaseCatalog) {
        info!(
            "Release catalog loaded: {} releases",
            catalog.list_releases().len()
        );
        self.catalog = Some(catalog);
    }

    /// Reload the manifest from the configured release site
    pub async fn refresh_catalog(&mut self, http: &HttpFetcher) -> Result<()> {
        let catalog = http.fetch_catalog(&self.settings.release_base_url).await?;
        self.set_catalog(catalog);
        Ok(())
    }

    /// Download a published build and flash it over the update session.
    ///
    /// `board` falls back to the configured board.
    pub async fn flash_release(
        &mut self,
        selection: &ReleaseSelection,
        board: Option<&str>,
    ) -> Result<()> {
        let board = match board.or(self.settings.board.as_deref()) {
            Some(board) => board.to_string(),
            None => return Err(self.reject("No board selected.")),
        };
        if !self.dfu.is_connected() {
            return Err(self.reject("No connected device."));
        }
        let catalog = match &self.catalog {
            Some(catalog) => catalog,
            None => return Err(self.reject("Release list not loaded.")),
        };

        // The update session counts as busy from the download onwards
        let guard = match self.registry.begin_operation(Transport::Update) {
            Ok(guard) => guard,
            Err(e) => return Err(self.reject(&e.to_string())),
        };

        let label = match selection {
            ReleaseSelection::Latest => "latest".to_string(),
            ReleaseSelection::Nightly => "nightly".to_string(),
            ReleaseSelection::Version(version) => version.clone(),
        };
        self.notifier.notify(
            &format!("Downloading release \"{}\" for board {}", label, board),
            MessageSeverity::Info,
        );

        let (artifact, image) = match catalog
            .fetch_artifact(self.fetcher.as_ref(), selection, &board)
            .await
        {
            Ok(fetched) => fetched,
            Err(e) => {
                let message = format!("Failed to download release: {}", e);
                return Err(self.reject(&message));
            }
        };
        info!("Flashing {} ({} bytes)", artifact.version, image.len());
        drop(guard);

        let transfer_size = self.settings.dfu.transfer_size;
        self.dfu.download(transfer_size, &image).await?;
        Ok(())
    }

    pub async fn flash_latest(&mut self, board: Option<&str>) -> Result<()> {
        self.flash_release(&ReleaseSelection::Latest, board).await
    }

    pub async fn flash_nightly(&mut self, board: Option<&str>) -> Result<()> {
        self.flash_release(&ReleaseSelection::Nightly, board).await
    }

    fn reject(&self, message: &str) -> anyhow::Error {
        self.notifier.notify(message, MessageSeverity::Error);
        anyhow!(message.to_string())
    }
}
