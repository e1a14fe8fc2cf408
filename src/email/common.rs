/// Common structures and utilities for email processing
use std::collections::HashMap;

use serde::Deserialize;

/// A JMAP mailbox (folder)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Mailbox {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
}

/// Email as returned by `Email/get`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Email {
    pub id: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub received_at: String,
    #[serde(default)]
    pub from: Option<Vec<EmailAddress>>,
    #[serde(default)]
    pub html_body: Vec<HtmlBodyPart>,
    #[serde(default)]
    pub body_values: HashMap<String, BodyValue>,
    #[serde(default)]
    pub mailbox_ids: HashMap<String, bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmailAddress {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: String,
}

/// Reference to one HTML leaf part of the body structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HtmlBodyPart {
    #[serde(default)]
    pub part_id: Option<String>,
    #[serde(rename = "type", default)]
    pub content_type: String,
}

/// Decoded content of a body part
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyValue {
    pub value: String,
    #[serde(default)]
    pub is_encoding_problem: bool,
    #[serde(default)]
    pub is_truncated: bool,
}

impl Email {
    pub fn subject_or_default(&self) -> &str {
        match self.subject.as_deref() {
            Some(subject) if !subject.trim().is_empty() => subject,
            _ => "(no subject)",
        }
    }

    /// First sender formatted as `Name <address>`
    pub fn sender(&self) -> Option<String> {
        let addr = self.from.as_ref()?.first()?;
        Some(match addr.name.as_deref() {
            Some(name) if !name.is_empty() => format!("{} <{}>", name, addr.email),
            _ => addr.email.clone(),
        })
    }

    /// Decoded content of the first HTML body part, if any.
    ///
    /// Servers put the `text/plain` part in `htmlBody` when a message has no
    /// HTML alternative, so the part type is checked.
    pub fn html_content(&self) -> Option<&str> {
        let part = self.html_body.first()?;
        if !part.content_type.eq_ignore_ascii_case("text/html") {
            return None;
        }
        let part_id = part.part_id.as_deref()?;
        let value = self.body_values.get(part_id)?;
        if value.value.is_empty() {
            None
        } else {
            Some(&value.value)
        }
    }
}

/// Result of one processing run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessingResult {
    pub emails_found: usize,
    pub emails_processed: usize,
    pub emails_failed: usize,
}

impl ProcessingResult {
    pub fn new(emails_found: usize) -> Self {
        Self {
            emails_found,
            emails_processed: 0,
            emails_failed: 0,
        }
    }

    pub fn success(&mut self) {
        self.emails_processed += 1;
    }

    pub fn failure(&mut self) {
        self.emails_failed += 1;
    }
}
