//! Mapping of failed `az` invocations onto ControlPlaneError kinds

use std::sync::LazyLock;

use regex::Regex;
use runnernet_core::control_plane::ControlPlaneError;

use crate::runner::CommandOutput;

static NOT_FOUND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(ResourceNotFound|ResourceGroupNotFound|RoleDefinitionDoesNotExist|\bNotFound\b|could not be found|was not found|does not exist|doesn't exist|No matched assignments)",
    )
    .unwrap_or_else(|e| panic!("invalid not-found pattern: {}", e))
});

static AUTHENTICATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(AADSTS\d+|az login|InvalidAuthenticationToken|ExpiredAuthenticationToken)")
        .unwrap_or_else(|e| panic!("invalid authentication pattern: {}", e))
});

/// Which side of the taxonomy a failing call sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Login and subscription selection
    Session,
    /// Everything else
    Operation,
}

/// Text the CLI printed for a failure, trimmed of the "ERROR: " prefix
pub fn failure_message(output: &CommandOutput) -> String {
    let text = if output.stderr.trim().is_empty() {
        output.stdout.trim()
    } else {
        output.stderr.trim()
    };

    let text = text.strip_prefix("ERROR: ").unwrap_or(text);
    if text.is_empty() {
        format!("az exited with status {}", output.code.unwrap_or(-1))
    } else {
        text.to_string()
    }
}

/// Classify a failed invocation, keeping the CLI's own text
pub fn classify(output: &CommandOutput, kind: CallKind) -> ControlPlaneError {
    let message = failure_message(output);

    if kind == CallKind::Session || AUTHENTICATION.is_match(&message) {
        ControlPlaneError::Authentication(message)
    } else if NOT_FOUND.is_match(&message) {
        ControlPlaneError::NotFound(message)
    } else {
        ControlPlaneError::command(message)
    }
}
