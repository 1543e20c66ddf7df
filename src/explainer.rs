//! Error explanation through the completion client.

use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, trace};

use crate::error::CommandError;
use crate::providers::{ChatMessage, CompletionRequest, ProviderError};
use crate::session::Session;

/// System instruction sent with every explanation request
pub const SYSTEM_PROMPT: &str =
    "You are a helpful assistant that explains programming errors in a friendly and encouraging way.";

/// Prefix of the user message; the raw error follows it
pub const USER_PROMPT_PREFIX: &str = "Please explain this error in a friendly and encouraging way:";

/// First line of an explanation block in the log
pub const BLOCK_HEADER: &str = "--- AI Assistant ---";

/// Last line of an explanation block in the log
pub const BLOCK_FOOTER: &str = "--------------------";

fn ansi_escape() -> &'static Regex {
    static ANSI_ESCAPE_RE: OnceLock<Regex> = OnceLock::new();
    ANSI_ESCAPE_RE
        .get_or_init(|| Regex::new(r"\x1B\[[0-?]*[ -/]*[@-~]").expect("valid ansi escape regex"))
}

/// Strip terminal escapes and surrounding whitespace; `None` if nothing is left
pub fn clean_error_text(raw: &str) -> Option<String> {
    let cleaned = ansi_escape().replace_all(raw, "");
    let trimmed = cleaned.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub fn build_request(model: &str, max_tokens: u32, error: &str) -> CompletionRequest {
    CompletionRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!("{USER_PROMPT_PREFIX} {error}")),
        ],
        max_tokens: Some(max_tokens),
    }
}

/// Explain `error_text` if explanation is enabled right now.
///
/// Failures are reported as a notification and never returned, so a failed
/// explanation cannot disturb the run that produced the error.
pub async fn explain(session: &Session, error_text: &str) {
    if !session.is_enabled() {
        trace!("explanation disabled, skipping chunk");
        return;
    }

    if let Err(e) = explain_to_log(session, error_text).await {
        session.host().notifier.error(&e.to_string());
    }
}

/// Request an explanation and append it to the log as one delimited block
pub async fn explain_to_log(session: &Session, error_text: &str) -> Result<(), CommandError> {
    let Some(error) = clean_error_text(error_text) else {
        return Ok(());
    };

    let client = session.ensure_client().await?;
    let request = build_request(client.model(), session.provider().max_tokens, &error);
    debug!(chars = error.len(), "requesting explanation");

    let response = client.create_completion(&request).await?;
    let body = response
        .first_content()
        .ok_or_else(|| ProviderError::InvalidResponse {
            provider: client.name().to_string(),
            message: "response contained no message".to_string(),
        })?;

    let mut block = Vec::with_capacity(body.lines().count() + 2);
    block.push(BLOCK_HEADER);
    block.extend(body.trim_end().lines());
    block.push(BLOCK_FOOTER);

    let log = &session.host().log;
    log.append_block(&block);
    log.show(true);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{LogEntry, TestHost};

    #[test]
    fn test_clean_error_text_strips_ansi() {
        let raw = "\x1b[31mReferenceError\x1b[0m: x is not defined\n";
        assert_eq!(
            clean_error_text(raw),
            Some("ReferenceError: x is not defined".to_string())
        );
    }

    #[test]
    fn test_clean_error_text_blank() {
        assert_eq!(clean_error_text("  \n\t"), None);
        assert_eq!(clean_error_text("\x1b[0m\n"), None);
    }

    #[test]
    fn test_build_request_shape() {
        let request = build_request("gpt-3.5-turbo", 512, "TypeError: boom");
        assert_eq!(request.model, "gpt-3.5-turbo");
        assert_eq!(request.max_tokens, Some(512));
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, "system");
        assert_eq!(request.messages[0].content, SYSTEM_PROMPT);
        assert_eq!(request.messages[1].role, "user");
        assert!(request.messages[1].content.ends_with("TypeError: boom"));
        assert!(request.messages[1].content.starts_with(USER_PROMPT_PREFIX));
    }

    #[tokio::test]
    async fn test_disabled_session_makes_no_request() {
        let host = TestHost::new().with_stored_key("sk-test");
        let session = host.session();

        explain(&session, "Error: nope").await;

        assert_eq!(host.client.calls(), 0);
        assert!(host.log.entries().is_empty());
    }

    #[tokio::test]
    async fn test_block_is_contiguous_and_shown() {
        let host = TestHost::new()
            .enabled_on_startup(true)
            .with_stored_key("sk-test")
            .with_reply("You used x before declaring it.\nDeclare it first!");
        let session = host.session();

        explain(&session, "ReferenceError: x is not defined\n").await;

        assert_eq!(
            host.log.entries(),
            vec![
                LogEntry::Line(BLOCK_HEADER.to_string()),
                LogEntry::Line("You used x before declaring it.".to_string()),
                LogEntry::Line("Declare it first!".to_string()),
                LogEntry::Line(BLOCK_FOOTER.to_string()),
                LogEntry::Show(true),
            ]
        );
        let request = host.client.last_request().unwrap();
        assert!(request.messages[1]
            .content
            .ends_with("ReferenceError: x is not defined"));
    }

    #[tokio::test]
    async fn test_completion_failure_is_notified_not_propagated() {
        let host = TestHost::new()
            .enabled_on_startup(true)
            .with_stored_key("sk-test")
            .with_failure("invalid api key");
        let session = host.session();

        explain(&session, "Error: nope").await;

        let errors = host.notifier.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("invalid api key"));
        assert!(host.log.entries().is_empty());
        assert!(session.is_enabled());
    }

    #[tokio::test]
    async fn test_empty_choices_is_reported() {
        let host = TestHost::new()
            .enabled_on_startup(true)
            .with_stored_key("sk-test")
            .with_empty_response();
        let session = host.session();

        let err = explain_to_log(&session, "Error: nope").await.unwrap_err();
        assert!(matches!(
            err,
            CommandError::Completion(ProviderError::InvalidResponse { .. })
        ));
    }
}
