//! Self-update: release check, installer download and watchdog handoff.
//!
//! [`UpdateManager`] does the work; [`UpdateCycle`] tracks one
//! check-and-apply attempt on the front-end side:
//!
//! ```text
//! Idle -> Checking -> UpToDate
//!                  -> UpdateAvailable -> Downloading -> DownloadFailed
//!                                                    -> ReadyToApply -> Applying -> (exit)
//! ```

pub mod release;
pub mod version;
pub mod watchdog;

pub use release::{GitHubReleaseFeed, ReleaseAsset, ReleaseFeed, ReleaseInfo};
pub use version::{is_version_newer, parse_version};
pub use watchdog::{ProcessControl, SystemProcess, WatchdogPlan};

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

/// Installer asset name expected on each release.
#[cfg(windows)]
pub const UPDATE_ASSET_NAME: &str = "pdfmaker-setup.exe";
#[cfg(not(windows))]
pub const UPDATE_ASSET_NAME: &str = "pdfmaker-setup.run";

/// Errors from one update attempt. None of them stop the application.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpdateError {
    #[error("Failed to check for updates: {0}")]
    Check(String),

    #[error("Update asset not found: {0}")]
    AssetNotFound(String),

    #[error("Failed to download update: {0}")]
    Download(String),

    #[error("Failed to apply update: {0}")]
    Apply(String),

    #[error("Auto-update is only available in the packaged app.")]
    NotPackaged,

    #[error("No update is ready for this step")]
    InvalidState,
}

/// Where an update attempt currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UpdatePhase {
    #[default]
    Idle,
    Checking,
    UpToDate,
    UpdateAvailable {
        version: String,
        can_self_update: bool,
    },
    Downloading,
    DownloadFailed(String),
    ReadyToApply,
    Applying,

    /// A manual check failed. Passive check failures return to `Idle`.
    CheckFailed(String),

    /// The watchdog could not be launched; the application keeps running.
    ApplyFailed(String),
}

impl UpdatePhase {
    /// True while network or handoff work is outstanding.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            UpdatePhase::Checking | UpdatePhase::Downloading | UpdatePhase::Applying
        )
    }
}

/// Results posted back to the front end by update workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateEvent {
    /// `Ok(None)` means the installed version is current.
    CheckCompleted(Result<Option<ReleaseInfo>, UpdateError>),
    DownloadCompleted(Result<Utf8PathBuf, UpdateError>),
    HandoffCompleted(Result<Utf8PathBuf, UpdateError>),
}

/// One check-and-apply attempt: the fetched release and, once downloaded, the
/// installer path. Dropped after handoff or failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCycle {
    manual: bool,
    can_self_update: bool,
    phase: UpdatePhase,
    release: Option<ReleaseInfo>,
    installer: Option<Utf8PathBuf>,
}

impl UpdateCycle {
    /// Start a cycle in `Checking`.
    pub fn start(manual: bool, can_self_update: bool) -> Self {
        Self {
            manual,
            can_self_update,
            phase: UpdatePhase::Checking,
            release: None,
            installer: None,
        }
    }

    pub fn phase(&self) -> &UpdatePhase {
        &self.phase
    }

    pub fn is_manual(&self) -> bool {
        self.manual
    }

    pub fn release(&self) -> Option<&ReleaseInfo> {
        self.release.as_ref()
    }

    pub fn installer(&self) -> Option<&Utf8Path> {
        self.installer.as_deref()
    }

    /// Move to `Downloading`. Only valid from `UpdateAvailable` on a packaged build.
    pub fn begin_download(&mut self) -> Result<ReleaseInfo, UpdateError> {
        if !self.can_self_update {
            return Err(UpdateError::NotPackaged);
        }
        match (&self.phase, &self.release) {
            (UpdatePhase::UpdateAvailable { .. }, Some(release)) => {
                let release = release.clone();
                self.phase = UpdatePhase::Downloading;
                Ok(release)
            }
            _ => Err(UpdateError::InvalidState),
        }
    }

    /// Move to `Applying`. Only valid from `ReadyToApply`.
    pub fn begin_apply(&mut self) -> Result<Utf8PathBuf, UpdateError> {
        match (&self.phase, &self.installer) {
            (UpdatePhase::ReadyToApply, Some(installer)) => {
                let installer = installer.clone();
                self.phase = UpdatePhase::Applying;
                Ok(installer)
            }
            _ => Err(UpdateError::InvalidState),
        }
    }

    /// Apply a worker result. Results that do not match the current phase
    /// are ignored.
    pub fn on_event(&mut self, event: UpdateEvent) -> &UpdatePhase {
        self.phase = match (&self.phase, event) {
            (UpdatePhase::Checking, UpdateEvent::CheckCompleted(Ok(Some(release)))) => {
                let phase = UpdatePhase::UpdateAvailable {
                    version: release.version().to_string(),
                    can_self_update: self.can_self_update,
                };
                self.release = Some(release);
                phase
            }
            (UpdatePhase::Checking, UpdateEvent::CheckCompleted(Ok(None))) => UpdatePhase::UpToDate,
            (UpdatePhase::Checking, UpdateEvent::CheckCompleted(Err(e))) => {
                if self.manual {
                    UpdatePhase::CheckFailed(e.to_string())
                } else {
                    tracing::debug!("Passive update check failed: {}", e);
                    UpdatePhase::Idle
                }
            }
            (UpdatePhase::Downloading, UpdateEvent::DownloadCompleted(Ok(path))) => {
                self.installer = Some(path);
                UpdatePhase::ReadyToApply
            }
            (UpdatePhase::Downloading, UpdateEvent::DownloadCompleted(Err(e))) => {
                UpdatePhase::DownloadFailed(e.to_string())
            }
            (UpdatePhase::Applying, UpdateEvent::HandoffCompleted(Ok(_))) => UpdatePhase::Applying,
            (UpdatePhase::Applying, UpdateEvent::HandoffCompleted(Err(e))) => {
                UpdatePhase::ApplyFailed(e.to_string())
            }
            (phase, event) => {
                tracing::debug!("Ignoring {:?} while {:?}", event, phase);
                phase.clone()
            }
        };
        &self.phase
    }
}

/// Checks the feed, downloads the installer and hands off to the watchdog.
#[derive(Debug)]
pub struct UpdateManager<F: ReleaseFeed> {
    feed: F,
    current_version: String,
    asset_name: String,
    packaged: bool,
}

impl<F: ReleaseFeed> UpdateManager<F> {
    /// Manager for `current_version`; packaged-ness is detected from the
    /// running executable.
    pub fn new(feed: F, current_version: impl Into<String>) -> Self {
        let packaged = SystemProcess
            .current_exe()
            .map(|exe| is_packaged_executable(&exe))
            .unwrap_or(false);

        Self {
            feed,
            current_version: current_version.into(),
            asset_name: UPDATE_ASSET_NAME.to_string(),
            packaged,
        }
    }

    pub fn with_packaged(mut self, packaged: bool) -> Self {
        self.packaged = packaged;
        self
    }

    pub fn with_asset_name(mut self, asset_name: impl Into<String>) -> Self {
        self.asset_name = asset_name.into();
        self
    }

    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    /// Automatic download and install is only offered for packaged builds.
    pub fn can_self_update(&self) -> bool {
        self.packaged
    }

    /// Fetch the latest release; `Some` when it is newer than this build.
    pub async fn check(&self) -> Result<Option<ReleaseInfo>, UpdateError> {
        let release = self.feed.latest_release().await?;
        let latest = release.version();

        if is_version_newer(latest, &self.current_version) {
            tracing::info!(
                "Update available: {} (running {})",
                latest,
                self.current_version
            );
            Ok(Some(release))
        } else {
            tracing::info!("Up to date (running {}, latest {:?})", self.current_version, latest);
            Ok(None)
        }
    }

    /// Download the installer asset of `release` to a temporary file.
    pub async fn download(&self, release: &ReleaseInfo) -> Result<Utf8PathBuf, UpdateError> {
        if !self.packaged {
            return Err(UpdateError::NotPackaged);
        }

        let asset = release
            .find_asset(&self.asset_name)
            .ok_or_else(|| UpdateError::AssetNotFound(self.asset_name.clone()))?;

        self.feed.download_asset(asset).await
    }

    /// Launch the watchdog for `installer`. On success the caller must exit.
    pub fn apply(
        &self,
        installer: &Utf8Path,
        process: &dyn ProcessControl,
    ) -> Result<Utf8PathBuf, UpdateError> {
        if !self.packaged {
            return Err(UpdateError::NotPackaged);
        }
        watchdog::hand_off(installer, process)
    }
}

/// A build run from a cargo `target` directory is a development build.
pub fn is_packaged_executable(exe: &Utf8Path) -> bool {
    !exe.components().any(|c| c.as_str() == "target")
}
