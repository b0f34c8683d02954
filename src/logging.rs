use crate::enforcement::EnforcementEffect;
use crate::worker::PipelineError;
use crate::{CONSOLE_TARGET, ENFORCEMENT_TARGET, ERROR_TARGET, EVENT_TARGET};
use std::path::Path;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Log directory name
pub const LOG_DIR: &str = "logs";
/// Enforcement decisions and pipeline errors, JSON lines
pub const ENFORCEMENT_LOG_FILE: &str = "enforcement";

/// Initialize the logging system with console and file outputs
pub fn init() -> Result<(), crate::Error> {
    if !Path::new(LOG_DIR).exists() {
        std::fs::create_dir_all(LOG_DIR)?;
    }

    let enforcement_file = RollingFileAppender::new(Rotation::DAILY, LOG_DIR, ENFORCEMENT_LOG_FILE);

    // Human-readable console output
    let console_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(true);

    // Structured enforcement log
    let enforcement_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(false)
        .json()
        .with_writer(enforcement_file);

    // RUST_LOG wins; default to INFO
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(enforcement_layer)
        .try_init()?;

    info!("Logging system initialized");
    Ok(())
}

/// One structured line per enforcement effect
pub fn log_effect(effect: &EnforcementEffect) {
    let enforcer_id = effect.enforcer_id();
    let player = effect.player();
    let event = effect.describe();
    match effect {
        EnforcementEffect::Message { text, .. } => info!(
            target: ENFORCEMENT_TARGET,
            enforcer_id = enforcer_id,
            player = %player,
            event = %event,
            text = %text,
            "Enforcement message"
        ),
        EnforcementEffect::Punish(request) => info!(
            target: ENFORCEMENT_TARGET,
            enforcer_id = enforcer_id,
            player = %player,
            event = %event,
            request_id = %request.id,
            reason = %request.reason,
            "Enforcement punishment"
        ),
        EnforcementEffect::Suppressed { .. } => info!(
            target: ENFORCEMENT_TARGET,
            enforcer_id = enforcer_id,
            player = %player,
            event = %event,
            "Virtual enforcer, action suppressed"
        ),
    }
}

/// A kill that could not be processed
pub fn log_pipeline_error(context: &str, error: &PipelineError) {
    error!(
        target: ERROR_TARGET,
        context = %context,
        error = %error,
        "Kill skipped"
    );
}

/// A host event as received
pub fn log_host_event(kind: &str, detail: &str) {
    info!(
        target: EVENT_TARGET,
        event = %kind,
        detail = %detail,
    );
}

pub fn log_console(message: String) {
    info!(
        target: CONSOLE_TARGET,
        message = %message,
        event = "console",
    );
}
