//! User-facing commands composed from the session, runner and explainer.

use std::path::Path;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::config::Setting;
use crate::error::CommandError;
use crate::explainer;
use crate::languages::{resolve_command, RunRequest};
use crate::runner::{self, RunOutcome};
use crate::secrets::API_KEY_SECRET;
use crate::session::{KeySource, RunState, Session};

const COST_WARNING: &str = "Each explanation sends the error text to the OpenAI API, which may incur costs on your account. Set `show_cost_warning = false` under [explain] to hide this message.";

/// Flip error explanation on or off and persist the new value.
///
/// Enabling constructs the completion client first; if the key cannot be
/// obtained the flag is left as it was and nothing is written.
pub async fn toggle_explanation(session: &Session) -> Result<bool, CommandError> {
    let host = session.host();
    let enable = !session.is_enabled();

    if enable {
        session.ensure_client().await?;
    }

    let scope = host.settings.scope_for(Setting::EnableOnStartup);
    host.settings
        .update(Setting::EnableOnStartup, enable, scope)
        .await
        .map_err(|e| CommandError::Settings(format!("{e:#}")))?;
    session.set_enabled(enable);
    info!(enabled = enable, ?scope, "explanation toggled");

    host.notifier.status(enable);
    if enable {
        host.notifier.info("Error explanation enabled");
        if host.settings.get(Setting::ShowCostWarning) {
            host.notifier.warn(COST_WARNING);
        }
    } else {
        host.notifier.info("Error explanation disabled");
    }

    Ok(enable)
}

/// Run the active document and explain whatever it writes to stderr.
///
/// Returns `Ok(None)` without doing anything if another run is in progress.
/// Explanation requests run as separate tasks and are joined before the
/// exit line is logged; their blocks may land in any order.
pub async fn run_with_explanation(
    session: &Arc<Session>,
) -> Result<Option<RunOutcome>, CommandError> {
    let Some(_guard) = session.try_begin_run() else {
        debug!("run already in progress, dropping request");
        return Ok(None);
    };

    if session.is_enabled() {
        session.ensure_client().await?;
    } else {
        toggle_explanation(session).await?;
    }

    let host = session.host();
    let path = host
        .documents
        .active_document()
        .ok_or(CommandError::NoActiveDocument)?;
    let request = RunRequest::from_path(&path);
    let command = resolve_command(&request)?;
    let cwd = request.working_dir();

    info!(command = %command, cwd = %cwd.display(), "running file");
    host.log.show(true);
    host.log.append_line(&format!("> {command}"));

    let mut pending = Vec::new();
    let outcome = runner::run(
        host.spawner.as_ref(),
        &command,
        &cwd,
        host.log.as_ref(),
        |chunk| {
            let session = Arc::clone(session);
            let chunk = chunk.to_string();
            pending.push(tokio::spawn(async move {
                explainer::explain(&session, &chunk).await;
            }));
        },
    )
    .await?;

    for result in join_all(pending).await {
        if let Err(e) = result {
            warn!(error = %e, "explanation task failed");
        }
    }

    host.log.append_line(&runner::exit_line(outcome.exit_code));
    Ok(Some(outcome))
}

/// Explain the last non-empty line of a document
pub async fn explain_document(session: &Session, path: &Path) -> Result<(), CommandError> {
    let contents = tokio::fs::read_to_string(path).await?;
    let line = last_non_empty_line(&contents)
        .ok_or_else(|| CommandError::EmptyDocument(path.to_path_buf()))?;
    explain_text(session, line).await
}

/// Explain literal error text, whether or not streamed explanation is on
pub async fn explain_text(session: &Session, text: &str) -> Result<(), CommandError> {
    explainer::explain_to_log(session, text).await
}

pub fn last_non_empty_line(contents: &str) -> Option<&str> {
    contents.lines().rev().find(|line| !line.trim().is_empty())
}

/// Snapshot for the `status` command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub enabled: bool,
    pub running: bool,
    pub key_source: Option<KeySource>,
    pub model: String,
}

pub async fn status(session: &Session) -> StatusReport {
    StatusReport {
        enabled: session.is_enabled(),
        running: session.run_state() == RunState::Running,
        key_source: session.key_source().await,
        model: session.provider().model.clone(),
    }
}

/// Prompt for a new key and store it, replacing any stored one
pub async fn store_key(session: &Session) -> Result<(), CommandError> {
    let host = session.host();
    let key = host
        .prompt
        .prompt("Enter your OpenAI API Key (sk-...):")
        .await
        .map_err(|e| CommandError::credential(format!("{e:#}")))?
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .ok_or_else(|| CommandError::credential("No API key entered"))?;

    host.secrets
        .set(API_KEY_SECRET, &key)
        .await
        .map_err(|e| CommandError::credential(format!("Failed to store API key: {e:#}")))?;
    host.notifier.info("API key saved");
    Ok(())
}

/// Delete the stored key
pub async fn forget_key(session: &Session) -> Result<bool, CommandError> {
    let host = session.host();
    let removed = host
        .secrets
        .delete(API_KEY_SECRET)
        .await
        .map_err(|e| CommandError::credential(format!("Failed to remove API key: {e:#}")))?;
    if removed {
        host.notifier.info("Stored API key removed");
    } else {
        host.notifier.info("No stored API key");
    }
    Ok(removed)
}
