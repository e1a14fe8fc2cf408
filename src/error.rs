use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while talking to the JMAP server
#[derive(Error, Debug)]
pub enum MailError {
    #[error("mailbox '{0}' not found")]
    NotFound(String),

    #[error("API key has read-only permissions. Please create a new Fastmail API token with read-write permissions for Mail")]
    ReadOnlyCredential,

    #[error("JMAP error ({kind}): {description}")]
    Method { kind: String, description: String },

    #[error("email {id} was not updated: {reason}")]
    NotUpdated { id: String, reason: String },

    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("no primary mail account found in JMAP session")]
    NoMailAccount,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to decode JMAP response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("unexpected response format: {0}")]
    UnexpectedResponse(String),
}

/// Errors raised while turning an HTML body into an image
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("rendering did not finish within {0:?}")]
    Timeout(Duration),

    #[error("browser error: {0}")]
    Browser(#[from] chromiumoxide::error::CdpError),

    #[error("failed to parse timestamp '{value}': {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("failed to write screenshot {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
