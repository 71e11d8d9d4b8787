//! pdfmaker - image folders and zip archives to PDF
//!
//! Main entry point for the command-line front end.
//!
//! # Overview
//!
//! The binary initializes:
//! - Logging infrastructure (daily file rotation + console output on stderr)
//! - Tokio runtime (jobs on the blocking pool, update checks as async tasks)
//! - State management ([`StateManager`])
//! - Settings loading ([`SettingsManager`])
//! - The [`AppController`], ticked every 50 ms until no work is outstanding
//!
//! # Execution Flow
//!
//! 1. Parse arguments, initialize logging under the local data directory
//! 2. Load `settings.json`, apply command-line overrides
//! 3. Start the single job (once its input has been scanned) or the batch
//! 4. Run a passive update check shortly after startup (unless disabled)
//! 5. Print every state change until idle
//! 6. Exit immediately after a successful update handoff

use anyhow::{Result, bail};
use camino::Utf8PathBuf;
use clap::Parser;
use pdfmaker::models::{BatchStatus, failure_summary, success_summary};
use pdfmaker::services::update::{GitHubReleaseFeed, SystemProcess, UpdateManager, UpdatePhase};
use pdfmaker::ui::AppController;
use pdfmaker::{APP_NAME, Metrics, PageMode, SettingsManager, StateChange, StateManager, VERSION};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Delay before the passive startup update check.
const PASSIVE_CHECK_DELAY: Duration = Duration::from_millis(600);

/// Front-end tick interval.
const TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Convert image folders or zip archives into PDF documents
#[derive(Parser, Debug)]
#[command(name = "pdfmaker", version, about)]
struct Args {
    /// Folder or .zip archive to convert (several folders with --batch)
    inputs: Vec<Utf8PathBuf>,

    /// Convert every input folder into its own PDF, in order
    #[arg(short, long)]
    batch: bool,

    /// Page size: fit, shrink or original
    #[arg(short = 'm', long, default_value = "fit")]
    page_mode: PageMode,

    /// Explicit output PDF path (single input only)
    #[arg(short, long)]
    output: Option<Utf8PathBuf>,

    /// Write every PDF into this folder
    #[arg(long, conflicts_with = "no_fixed_output")]
    fixed_output_dir: Option<String>,

    /// Write each PDF next to its input instead of the fixed folder
    #[arg(long)]
    no_fixed_output: bool,

    /// Persist the output folder settings to settings.json
    #[arg(long)]
    save_settings: bool,

    /// Check for a newer release and report the result
    #[arg(long)]
    check_updates: bool,

    /// Download and install a newer release when one is found
    #[arg(long)]
    update: bool,

    /// Skip the passive startup update check
    #[arg(long)]
    no_update_check: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = pdfmaker::logging::setup_logging(
        &pdfmaker::config::log_dir(),
        pdfmaker::logging::LOG_PREFIX,
        args.verbose,
        true,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("pdfmaker-worker")
        .build()?;

    let metrics = Arc::new(Metrics::new());
    let feed = GitHubReleaseFeed::new();
    if !feed.is_available() {
        tracing::warn!("Continuing without update checks");
    }
    let update_manager = UpdateManager::new(feed, VERSION);
    let mut controller = AppController::new(
        StateManager::new(),
        SettingsManager::new(),
        update_manager,
        Arc::new(SystemProcess),
        runtime.handle().clone(),
        Arc::clone(&metrics),
    );

    apply_settings_overrides(&controller, &args)?;

    let failed = run(&mut controller, &args);

    if controller.exit_requested() {
        controller.shutdown();
        runtime.shutdown_timeout(Duration::from_secs(1));
        std::process::exit(0);
    }

    controller.shutdown();
    runtime.shutdown_timeout(Duration::from_secs(5));
    tracing::info!("Application shutdown complete");

    if failed? {
        bail!("One or more conversions failed");
    }
    Ok(())
}

fn apply_settings_overrides(
    controller: &AppController<GitHubReleaseFeed>,
    args: &Args,
) -> Result<()> {
    controller.set_page_mode(args.page_mode);

    let mut settings = controller.state().read(|s| s.settings.clone());
    if let Some(dir) = &args.fixed_output_dir {
        settings.use_fixed_output = true;
        settings.fixed_output_dir = dir.clone();
    }
    if args.no_fixed_output {
        settings.use_fixed_output = false;
    }
    controller.update_settings(settings);

    if args.save_settings {
        controller.save_settings()?;
    }
    Ok(())
}

/// Start the requested work and tick until it is done
///
/// # Returns
/// `true` when a single job failed or any batch folder errored
fn run(controller: &mut AppController<GitHubReleaseFeed>, args: &Args) -> Result<bool> {
    start_jobs(controller, args)?;

    if args.check_updates || args.update {
        controller.check_for_updates(true);
    }

    let started = Instant::now();
    let mut passive_pending = !args.no_update_check && !args.check_updates && !args.update;
    let mut failed = false;

    loop {
        if passive_pending && started.elapsed() >= PASSIVE_CHECK_DELAY {
            controller.check_for_updates(false);
            passive_pending = false;
        }

        for change in controller.tick() {
            failed |= report(&change);

            if args.update
                && let StateChange::UpdatePhaseChanged {
                    phase:
                        UpdatePhase::UpdateAvailable {
                            can_self_update: true,
                            ..
                        },
                } = &change
                && let Err(e) = controller.accept_update()
            {
                eprintln!("{e}");
            }
        }

        if controller.exit_requested() || (!passive_pending && !controller.is_busy()) {
            break;
        }
        std::thread::sleep(TICK_INTERVAL);
    }

    Ok(failed)
}

fn start_jobs(controller: &mut AppController<GitHubReleaseFeed>, args: &Args) -> Result<()> {
    if args.batch {
        for folder in &args.inputs {
            controller.register_batch_folder(folder.clone())?;
        }
        if !args.inputs.is_empty() {
            controller.start_batch()?;
        }
        return Ok(());
    }

    match args.inputs.as_slice() {
        [] => {}
        [input] => {
            controller.select_input(input.clone())?;
            wait_for_selection(controller);
            if !controller.has_selection() {
                let status = controller.state().read(|s| s.status_text.clone());
                bail!("{status}");
            }
            if let Some(output) = &args.output {
                controller.set_output_path(output.clone());
            }
            controller.start_conversion()?;
        }
        _ => bail!("Several inputs need --batch"),
    }
    Ok(())
}

/// Tick until the background scan of the selected input has finished
fn wait_for_selection(controller: &mut AppController<GitHubReleaseFeed>) {
    loop {
        for change in controller.tick() {
            report(&change);
        }
        if !controller.is_resolving() {
            break;
        }
        std::thread::sleep(TICK_INTERVAL);
    }
}

/// Print one state change; returns true when it reports a failure.
fn report(change: &StateChange) -> bool {
    match change {
        StateChange::ProgressUpdated {
            current,
            total,
            message,
        } => {
            println!("[{current}/{total}] {message}");
            false
        }
        StateChange::ConversionSucceeded { output, warnings } => {
            println!("{}", success_summary(output, warnings));
            false
        }
        StateChange::ConversionFailed { message } => {
            eprintln!("{}", failure_summary(message));
            true
        }
        StateChange::BatchFinished { results } => {
            for entry in results {
                match (&entry.status, &entry.output_path) {
                    (BatchStatus::Error(_), _) | (_, None) => {
                        println!("{}: {}", entry.source_label, entry.status)
                    }
                    (status, Some(path)) => {
                        println!("{}: {} -> {}", entry.source_label, status, path)
                    }
                }
            }
            results.iter().any(|entry| entry.is_error())
        }
        StateChange::StatusChanged { text } if !text.is_empty() => {
            println!("{text}");
            false
        }
        StateChange::UpdatePhaseChanged { phase } => {
            match phase {
                UpdatePhase::UpToDate => println!("pdfmaker {VERSION} is up to date."),
                UpdatePhase::UpdateAvailable {
                    version,
                    can_self_update: true,
                } => println!("Version {version} is available. Run with --update to install it."),
                UpdatePhase::Downloading => println!("Downloading update..."),
                UpdatePhase::Applying => println!("Installing update, pdfmaker will restart."),
                UpdatePhase::CheckFailed(message)
                | UpdatePhase::DownloadFailed(message)
                | UpdatePhase::ApplyFailed(message) => eprintln!("{message}"),
                _ => {}
            }
            false
        }
        _ => false,
    }
}
