// App Controller - Connects front-end input with state, services and workers
//
// The controller is owned by the front-end loop. It:
// - Turns user input (selection, batch registration, create, update accept)
//   into state updates and background work
// - Applies worker events drained from the EventLoopBridge once per tick
// - Resolves selections on the blocking pool and installs them on the next tick
// - Owns the current selection, including any zip extraction directory
// - Drives the self-update cycle through to the watchdog handoff

use crate::config::SettingsManager;
use crate::metrics::Metrics;
use crate::models::{CandidateImage, InputSpec, Job, PageMode, Settings, is_zip_path};
use crate::services::layout::select_layout;
use crate::services::orchestrator::{JobEvent, JobRunner};
use crate::services::output::{derive_output_path, ensure_pdf_extension};
use crate::services::resolver::{ExtractedArchive, ImageSetResolver, ResolveError, ResolvedInput};
use crate::services::update::{
    ProcessControl, ReleaseFeed, UpdateCycle, UpdateEvent, UpdateManager, UpdatePhase,
};
use crate::state::{StateChange, StateManager};
use crate::ui::bridge::{AppEvent, EventLoopBridge};
use anyhow::{Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::sync::Arc;

/// Shown when a newer release exists but this build cannot install it.
pub const MANUAL_UPDATE_MESSAGE: &str =
    "A new version is available. Please download the latest release.";

/// The resolved input a single job would run on.
struct Selection {
    spec: InputSpec,
    root: Utf8PathBuf,
    candidates: Vec<CandidateImage>,

    /// Dropped (and its directory removed) when the selection is replaced.
    extraction: Option<ExtractedArchive>,
}

/// Front-end controller
///
/// # Example
/// ```ignore
/// let controller = AppController::new(
///     state_manager,
///     SettingsManager::new(),
///     UpdateManager::new(GitHubReleaseFeed::new(), VERSION),
///     Arc::new(SystemProcess),
///     runtime.handle().clone(),
///     metrics,
/// );
/// controller.select_input("/photos/trip".into())?;
/// while controller.is_resolving() {
///     controller.tick();
/// }
/// controller.start_conversion()?;
/// loop {
///     for change in controller.tick() { render(change); }
/// }
/// ```
pub struct AppController<F: ReleaseFeed + 'static> {
    state_manager: StateManager,
    settings_manager: SettingsManager,
    bridge: EventLoopBridge,
    runner: JobRunner,
    resolver: ImageSetResolver,
    update_manager: Arc<UpdateManager<F>>,
    process: Arc<dyn ProcessControl>,
    update_cycle: Option<UpdateCycle>,
    selection: Option<Selection>,
    metrics: Arc<Metrics>,
    exit_requested: bool,
}

impl<F: ReleaseFeed + 'static> AppController<F> {
    /// Create a controller and load settings into state
    ///
    /// # Arguments
    /// * `state_manager` - Shared application state
    /// * `settings_manager` - Owner of `settings.json`
    /// * `update_manager` - Release check, download and handoff
    /// * `process` - Process operations used by the watchdog handoff
    /// * `tokio_handle` - Runtime the workers run on
    /// * `metrics` - Shared counters
    pub fn new(
        state_manager: StateManager,
        settings_manager: SettingsManager,
        update_manager: UpdateManager<F>,
        process: Arc<dyn ProcessControl>,
        tokio_handle: tokio::runtime::Handle,
        metrics: Arc<Metrics>,
    ) -> Self {
        state_manager.set_settings(settings_manager.load());

        tracing::info!("App controller initialized");

        Self {
            state_manager,
            settings_manager,
            bridge: EventLoopBridge::new(tokio_handle, Arc::clone(&metrics)),
            runner: JobRunner::new(Arc::clone(&metrics)),
            resolver: ImageSetResolver::new(),
            update_manager: Arc::new(update_manager),
            process,
            update_cycle: None,
            selection: None,
            metrics,
            exit_requested: false,
        }
    }

    pub fn state(&self) -> &StateManager {
        &self.state_manager
    }

    /// True once an update handoff succeeded; the front end must exit.
    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    /// True while a job, a selection scan or an update step is outstanding.
    pub fn is_busy(&self) -> bool {
        self.state_manager
            .read(|s| s.is_converting || s.is_resolving || s.update_phase.is_busy())
    }

    /// True while the last selection is still being listed or extracted.
    pub fn is_resolving(&self) -> bool {
        self.state_manager.read(|s| s.is_resolving)
    }

    /// True once a selection has been resolved and installed.
    pub fn has_selection(&self) -> bool {
        self.selection.is_some()
    }

    /// Extraction directory of the current selection, if it came from a zip.
    pub fn extraction_root(&self) -> Option<&Utf8Path> {
        self.selection
            .as_ref()
            .and_then(|selection| selection.extraction.as_ref())
            .map(ExtractedArchive::root)
    }

    // ---- Input ----------------------------------------------------------

    /// Select a folder or zip archive as the single-job input
    ///
    /// Drops (and cleans up) the previous selection, then lists the folder or
    /// extracts the archive on the blocking pool. The result is installed by
    /// the next [`tick`](Self::tick) that sees it. Rejected while a job is
    /// running, since that job may still be reading the extraction.
    pub fn select_input(&mut self, path: Utf8PathBuf) -> Result<()> {
        self.ensure_idle()?;

        let Some(spec) = InputSpec::from_path(path.clone()) else {
            bail!("Not a folder or zip archive: {}", path);
        };

        self.clear_selection();
        self.state_manager.start_resolving(&spec.label());

        let resolver = self.resolver.clone();
        self.bridge.clone_handle().spawn_blocking(move |post| {
            let result = resolver.resolve(&spec);
            post(AppEvent::Input { spec, result });
        });
        Ok(())
    }

    fn install_selection(
        &mut self,
        spec: InputSpec,
        result: Result<ResolvedInput, ResolveError>,
    ) -> Vec<StateChange> {
        let resolved = match result {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!("Failed to resolve {}: {}", spec.label(), e);
                return self.state_manager.fail_resolving(e.to_string());
            }
        };

        let mut changes = self.clear_selection();

        let settings = self.state_manager.read(|s| s.settings.clone());
        let output = selection_path(&spec)
            .map(|path| derive_output_path(path, is_zip_path(path), &settings));
        let names = resolved
            .candidates
            .iter()
            .map(|c| c.display_name.clone())
            .collect();

        tracing::info!(
            "Selected {} ({} candidate image(s)), output {:?}",
            spec.label(),
            resolved.candidates.len(),
            output
        );
        changes.extend(self.state_manager.set_input(spec.label(), names, output));

        self.selection = Some(Selection {
            spec,
            root: resolved.root,
            candidates: resolved.candidates,
            extraction: resolved.extraction,
        });
        changes
    }

    /// Override the derived output path for the next single job
    pub fn set_output_path(&self, path: Utf8PathBuf) {
        self.state_manager
            .set_output_path(Some(ensure_pdf_extension(path)));
    }

    /// Register a folder for batch mode
    pub fn register_batch_folder(&self, folder: Utf8PathBuf) -> Result<()> {
        if !folder.is_dir() {
            bail!("Not a folder: {}", folder);
        }
        self.state_manager.register_batch_folder(folder);
        Ok(())
    }

    pub fn clear_batch_folders(&self) {
        self.state_manager.clear_batch_folders();
    }

    // ---- Settings -------------------------------------------------------

    pub fn set_page_mode(&self, mode: PageMode) {
        self.state_manager.set_page_mode(mode);
    }

    /// Replace the output settings and re-derive the current output path
    pub fn update_settings(&self, settings: Settings) {
        if let Some(selection) = &self.selection
            && let Some(path) = selection_path(&selection.spec)
        {
            let output = derive_output_path(path, is_zip_path(path), &settings);
            self.state_manager.set_output_path(Some(output));
        }
        self.state_manager.set_settings(settings);
    }

    /// Persist the current settings to `settings.json`
    pub fn save_settings(&self) -> Result<()> {
        let settings = self.state_manager.read(|s| s.settings.clone());
        self.settings_manager.save(&settings)
    }

    // ---- Jobs -----------------------------------------------------------

    /// Start a single job on the current selection
    pub fn start_conversion(&mut self) -> Result<()> {
        self.ensure_idle()?;

        let Some(selection) = &self.selection else {
            bail!("No folder or zip archive selected");
        };
        if selection.candidates.is_empty() {
            bail!("No supported images found.");
        }

        let (output_path, mode) = self
            .state_manager
            .read(|s| (s.output_path.clone(), s.page_mode));
        let Some(output_path) = output_path else {
            bail!("No output path set");
        };

        let job = Job {
            input_root: selection.root.clone(),
            output_path,
            policy: select_layout(mode),
        };
        let candidates = selection.candidates.clone();
        let runner = self.runner.clone();

        self.state_manager.start_conversion(candidates.len());
        self.bridge.clone_handle().spawn_blocking(move |post| {
            runner.run_single(&job, &candidates, |event| post(AppEvent::Job(event)));
        });
        Ok(())
    }

    /// Run every registered batch folder in order
    pub fn start_batch(&mut self) -> Result<()> {
        self.ensure_idle()?;

        let (folders, settings, mode) = self.state_manager.read(|s| {
            (s.batch_folders.clone(), s.settings.clone(), s.page_mode)
        });
        if folders.is_empty() {
            bail!("No batch folders registered");
        }

        let policy = select_layout(mode);
        let runner = self.runner.clone();

        self.state_manager.start_conversion(folders.len());
        self.bridge.clone_handle().spawn_blocking(move |post| {
            runner.run_batch(&folders, &settings, policy, |event| post(AppEvent::Job(event)));
        });
        Ok(())
    }

    fn ensure_idle(&self) -> Result<()> {
        let (converting, resolving) = self
            .state_manager
            .read(|s| (s.is_converting, s.is_resolving));
        if converting {
            bail!("A conversion is already running");
        }
        if resolving {
            bail!("Still scanning the selected input");
        }
        Ok(())
    }

    // ---- Updates --------------------------------------------------------

    /// Start an update check; `manual` checks surface their failures
    ///
    /// Ignored while another update step is outstanding.
    pub fn check_for_updates(&mut self, manual: bool) {
        if self
            .update_cycle
            .as_ref()
            .is_some_and(|cycle| cycle.phase().is_busy())
        {
            tracing::debug!("Update check already in progress");
            return;
        }

        let cycle = UpdateCycle::start(manual, self.update_manager.can_self_update());
        self.state_manager.set_update_phase(cycle.phase().clone());
        self.update_cycle = Some(cycle);
        self.metrics.record_update_check();

        let manager = Arc::clone(&self.update_manager);
        let handle = self.bridge.clone_handle();
        self.bridge.clone_handle().spawn_async(move || async move {
            let result = manager.check().await;
            handle.post(AppEvent::Update(UpdateEvent::CheckCompleted(result)));
        });
    }

    /// Accept an available update: download, then hand off when ready
    pub fn accept_update(&mut self) -> Result<()> {
        let Some(cycle) = self.update_cycle.as_mut() else {
            bail!("No update available");
        };

        let release = cycle.begin_download()?;
        self.state_manager.set_update_phase(cycle.phase().clone());

        let manager = Arc::clone(&self.update_manager);
        let handle = self.bridge.clone_handle();
        self.bridge.clone_handle().spawn_async(move || async move {
            let result = manager.download(&release).await;
            handle.post(AppEvent::Update(UpdateEvent::DownloadCompleted(result)));
        });
        Ok(())
    }

    // ---- Tick -----------------------------------------------------------

    /// Apply every worker event posted since the last tick
    ///
    /// # Returns
    /// The state changes those events caused, in order
    pub fn tick(&mut self) -> Vec<StateChange> {
        self.bridge
            .drain()
            .into_iter()
            .flat_map(|event| self.apply(event))
            .collect()
    }

    fn apply(&mut self, event: AppEvent) -> Vec<StateChange> {
        match event {
            AppEvent::Job(event) => self.apply_job_event(event),
            AppEvent::Update(event) => self.apply_update_event(event),
            AppEvent::Input { spec, result } => self.install_selection(spec, result),
        }
    }

    fn apply_job_event(&mut self, event: JobEvent) -> Vec<StateChange> {
        match event {
            JobEvent::Progress {
                current,
                total,
                message,
            } => self.state_manager.update_progress(current, total, message),
            JobEvent::Completed {
                output_path,
                warnings,
            } => self.state_manager.finish_conversion(output_path, warnings),
            JobEvent::Failed { message } => self.state_manager.fail_conversion(message),
            JobEvent::BatchCompleted { results } => self.state_manager.finish_batch(results),
        }
    }

    fn apply_update_event(&mut self, event: UpdateEvent) -> Vec<StateChange> {
        let Some(cycle) = self.update_cycle.as_mut() else {
            tracing::debug!("Ignoring update event without an active cycle: {:?}", event);
            return Vec::new();
        };

        let mut phase = cycle.on_event(event).clone();

        if phase == UpdatePhase::ReadyToApply {
            phase = self.hand_off();
        }

        let notify_only = matches!(
            phase,
            UpdatePhase::UpdateAvailable {
                can_self_update: false,
                ..
            }
        );
        let changes = self.state_manager.update(|state| {
            state.update_phase = phase.clone();
            if notify_only {
                state.status_text = MANUAL_UPDATE_MESSAGE.to_string();
            }
        });

        if matches!(
            phase,
            UpdatePhase::Idle
                | UpdatePhase::UpToDate
                | UpdatePhase::CheckFailed(_)
                | UpdatePhase::DownloadFailed(_)
                | UpdatePhase::ApplyFailed(_)
        ) {
            self.update_cycle = None;
        }

        changes
    }

    /// Launch the watchdog for the downloaded installer
    fn hand_off(&mut self) -> UpdatePhase {
        let Some(cycle) = self.update_cycle.as_mut() else {
            return UpdatePhase::Idle;
        };

        let installer = match cycle.begin_apply() {
            Ok(installer) => installer,
            Err(e) => return UpdatePhase::ApplyFailed(e.to_string()),
        };

        let result = self.update_manager.apply(&installer, self.process.as_ref());
        match &result {
            Ok(script) => {
                tracing::info!("Update watchdog {} launched, exiting", script);
                self.exit_requested = true;
            }
            Err(e) => {
                tracing::error!("Update handoff failed: {}", e);
                remove_quietly(&installer);
            }
        }

        cycle
            .on_event(UpdateEvent::HandoffCompleted(result))
            .clone()
    }

    // ---- Shutdown -------------------------------------------------------

    fn clear_selection(&mut self) -> Vec<StateChange> {
        let Some(selection) = self.selection.take() else {
            return Vec::new();
        };
        if let Some(extraction) = selection.extraction {
            extraction.close();
        }
        self.state_manager.clear_input()
    }

    /// Release the selection's extraction directory and log the metrics summary
    pub fn shutdown(mut self) {
        if let Some(selection) = self.selection.take()
            && let Some(extraction) = selection.extraction
        {
            extraction.close();
        }
        self.metrics.log_summary();
        tracing::info!("App controller shut down");
    }
}

fn selection_path(spec: &InputSpec) -> Option<&Utf8Path> {
    match spec {
        InputSpec::Folder(path) | InputSpec::ZipArchive(path) => Some(path),
        InputSpec::BatchFolderList(_) => None,
    }
}

fn remove_quietly(path: &Utf8Path) {
    if let Err(e) = fs::remove_file(path) {
        tracing::debug!("Could not remove {}: {}", path, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::update::{ReleaseAsset, ReleaseInfo, UpdateError};
    use async_trait::async_trait;
    use image::{ImageFormat, RgbImage};
    use std::io::{Cursor, Write};
    use std::time::Duration;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    struct NoRelease;

    #[async_trait]
    impl ReleaseFeed for NoRelease {
        async fn latest_release(&self) -> Result<ReleaseInfo, UpdateError> {
            Err(UpdateError::Check("offline".into()))
        }

        async fn download_asset(&self, _: &ReleaseAsset) -> Result<Utf8PathBuf, UpdateError> {
            Err(UpdateError::Download("offline".into()))
        }
    }

    struct NoProcess;

    impl ProcessControl for NoProcess {
        fn current_pid(&self) -> u32 {
            1
        }
        fn current_exe(&self) -> std::io::Result<Utf8PathBuf> {
            Ok("/opt/pdfmaker/pdfmaker".into())
        }
        fn spawn_detached(&self, _: &Utf8Path) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn controller(rt: &tokio::runtime::Runtime, dir: &Utf8Path) -> AppController<NoRelease> {
        let settings_manager = SettingsManager::with_path(dir.join("settings.json"));
        settings_manager
            .save(&Settings {
                use_fixed_output: false,
                fixed_output_dir: String::new(),
            })
            .unwrap();

        AppController::new(
            StateManager::new(),
            settings_manager,
            UpdateManager::new(NoRelease, "0.1.5").with_packaged(true),
            Arc::new(NoProcess),
            rt.handle().clone(),
            Arc::new(Metrics::new()),
        )
    }

    fn tick_until_idle(controller: &mut AppController<NoRelease>) -> Vec<StateChange> {
        let mut changes = Vec::new();
        for _ in 0..500 {
            changes.extend(controller.tick());
            if !controller.is_busy() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        changes
    }

    fn wait_for_selection(controller: &mut AppController<NoRelease>) -> Vec<StateChange> {
        let mut changes = Vec::new();
        for _ in 0..500 {
            changes.extend(controller.tick());
            if !controller.is_resolving() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        changes
    }

    fn write_zip(path: &Utf8Path) {
        let mut png = Vec::new();
        RgbImage::new(4, 4)
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let mut writer = zip::ZipWriter::new(fs::File::create(path).unwrap());
        writer
            .start_file("pages/01.png", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(&png).unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn test_select_and_convert_folder() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let photos = dir.join("trip");
        fs::create_dir(&photos).unwrap();
        RgbImage::new(10, 10).save(photos.join("a.png")).unwrap();

        let mut controller = controller(&rt, &dir);
        controller.select_input(photos.clone()).unwrap();
        assert!(controller.is_busy());
        assert!(controller.start_conversion().is_err());

        let changes = wait_for_selection(&mut controller);
        assert!(changes.contains(&StateChange::InputChanged {
            label: Some(photos.to_string()),
            image_count: 1
        }));
        assert_eq!(
            controller.state().read(|s| s.output_path.clone()),
            Some(photos.join("trip.pdf"))
        );

        controller.start_conversion().unwrap();
        assert!(controller.start_conversion().is_err());

        let changes = tick_until_idle(&mut controller);
        assert!(changes.contains(&StateChange::ConversionSucceeded {
            output: photos.join("trip.pdf"),
            warnings: Vec::new()
        }));
        assert!(photos.join("trip.pdf").exists());
    }

    #[test]
    fn test_select_rejects_plain_file() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        fs::write(dir.join("notes.txt"), b"x").unwrap();

        let mut controller = controller(&rt, &dir);
        assert!(controller.select_input(dir.join("notes.txt")).is_err());
        assert!(!controller.is_resolving());
    }

    #[test]
    fn test_broken_archive_reports_and_leaves_no_selection() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        fs::write(dir.join("broken.zip"), b"not a zip").unwrap();

        let mut controller = controller(&rt, &dir);
        controller.select_input(dir.join("broken.zip")).unwrap();
        let changes = wait_for_selection(&mut controller);

        assert!(
            changes
                .iter()
                .any(|c| matches!(c, StateChange::StatusChanged { text } if text.contains("broken.zip")))
        );
        assert!(!controller.has_selection());
        assert!(controller.start_conversion().is_err());
    }

    #[test]
    fn test_replacing_zip_selection_removes_extraction() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        write_zip(&dir.join("comic.zip"));
        let photos = dir.join("trip");
        fs::create_dir(&photos).unwrap();
        RgbImage::new(4, 4).save(photos.join("a.png")).unwrap();

        let mut controller = controller(&rt, &dir);
        controller.select_input(dir.join("comic.zip")).unwrap();
        wait_for_selection(&mut controller);
        let extracted = controller.extraction_root().unwrap().to_path_buf();
        assert!(extracted.join("pages").join("01.png").exists());

        controller.select_input(photos.clone()).unwrap();
        assert!(!extracted.exists());

        wait_for_selection(&mut controller);
        assert!(controller.has_selection());
        assert!(controller.extraction_root().is_none());
        assert_eq!(
            controller.state().read(|s| s.input_label.clone()),
            Some(photos.to_string())
        );
    }

    #[test]
    fn test_shutdown_removes_extraction() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        write_zip(&dir.join("comic.zip"));

        let mut controller = controller(&rt, &dir);
        controller.select_input(dir.join("comic.zip")).unwrap();
        wait_for_selection(&mut controller);
        assert_eq!(
            controller.state().read(|s| s.output_path.clone()),
            Some(dir.join("comic.pdf"))
        );
        let extracted = controller.extraction_root().unwrap().to_path_buf();
        assert!(extracted.exists());

        controller.shutdown();
        assert!(!extracted.exists());
    }

    #[test]
    fn test_manual_check_failure_is_surfaced_and_cleared() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();

        let mut controller = controller(&rt, &dir);
        controller.check_for_updates(true);
        let changes = tick_until_idle(&mut controller);

        assert!(changes.iter().any(|c| matches!(
            c,
            StateChange::UpdatePhaseChanged {
                phase: UpdatePhase::CheckFailed(_)
            }
        )));
        assert!(controller.accept_update().is_err());
    }
}
