use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::time::Duration;

/// Severity for user-facing messages; mirrored into the `log` facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// Coarse pipeline stage, shown as a prefix on progress output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    Idle,
    Ingestion,
    Standardization,
    FootprintFit,
    Labeling,
    Export,
}

impl ProcessingStage {
    fn name(&self) -> &'static str {
        match self {
            ProcessingStage::Idle => "idle",
            ProcessingStage::Ingestion => "ingestion",
            ProcessingStage::Standardization => "standardization",
            ProcessingStage::FootprintFit => "footprint fit",
            ProcessingStage::Labeling => "labeling",
            ProcessingStage::Export => "export",
        }
    }
}

static CURRENT_STAGE: Lazy<Mutex<ProcessingStage>> =
    Lazy::new(|| Mutex::new(ProcessingStage::Idle));
static ACTIVE_BAR: Lazy<Mutex<Option<ProgressBar>>> = Lazy::new(|| Mutex::new(None));

pub fn set_stage(stage: ProcessingStage) {
    *CURRENT_STAGE.lock() = stage;
    log(LogLevel::Info, &format!("Stage: {}", stage.name()));
}

/// Prints a colored message without tearing any active progress bar, and
/// mirrors it to the `log` facade.
pub fn log(level: LogLevel, message: &str) {
    let line = match level {
        LogLevel::Info => message.normal(),
        LogLevel::Warning => format!("Warning: {}", message).yellow(),
        LogLevel::Error => format!("Error: {}", message).red().bold(),
    };
    match level {
        LogLevel::Info => log::info!("{}", message),
        LogLevel::Warning => log::warn!("{}", message),
        LogLevel::Error => log::error!("{}", message),
    }
    let bar_guard = ACTIVE_BAR.lock();
    match bar_guard.as_ref() {
        Some(bar) if !bar.is_finished() => bar.println(line.to_string()),
        _ => println!("{}", line),
    }
}

/// Starts a step-counted progress bar for the current stage, replacing any
/// previous one.
pub fn init_step_progress(message: &str, total: u64) {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );
    bar.set_message(format!(
        "[{}] {}",
        CURRENT_STAGE.lock().name(),
        message
    ));
    *ACTIVE_BAR.lock() = Some(bar);
}

pub fn update_step_progress(position: u64, message: &str) {
    if let Some(bar) = ACTIVE_BAR.lock().as_ref() {
        bar.set_position(position);
        bar.set_message(message.to_string());
    }
}

pub fn finish_step_progress(message: &str) {
    if let Some(bar) = ACTIVE_BAR.lock().take() {
        bar.finish_with_message(message.to_string());
    }
    log::info!("{}", message);
}

/// Spinner for stages without a known step count.
pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}
