use std::collections::HashMap;

use futures::future::BoxFuture;
use log::{debug, info, warn};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::JmapConfig;
use crate::email::{Email, MailClient, Mailbox};
use crate::error::MailError;

const MAIL_CAPABILITY: &str = "urn:ietf:params:jmap:mail";
const CORE_CAPABILITY: &str = "urn:ietf:params:jmap:core";

const EMAIL_PROPERTIES: [&str; 7] = [
    "id",
    "subject",
    "receivedAt",
    "from",
    "htmlBody",
    "bodyValues",
    "mailboxIds",
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    #[serde(default)]
    primary_accounts: HashMap<String, String>,
    api_url: String,
}

/// One `[name, arguments, callId]` triple
#[derive(Debug, Deserialize)]
struct MethodResponse(String, Value, String);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JmapResponse {
    method_responses: Vec<MethodResponse>,
}

#[derive(Debug, Deserialize)]
struct MethodError {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GetResponse<T> {
    list: Vec<T>,
    #[serde(default, rename = "notFound")]
    not_found: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetResponse {
    #[serde(default)]
    updated: Option<HashMap<String, Value>>,
    #[serde(default)]
    not_updated: Option<HashMap<String, Value>>,
}

pub struct JmapClient {
    http: reqwest::Client,
    api_key: String,
    account_id: String,
    api_url: String,
}

impl JmapClient {
    /// Authenticate against the session endpoint and keep the primary mail
    /// account and API URL for later calls
    pub async fn new(config: &JmapConfig) -> Result<Self, MailError> {
        info!("Connecting to JMAP session at {}", config.session_url);

        let http = reqwest::Client::new();

        let response = http
            .get(&config.session_url)
            .header(AUTHORIZATION, format!("Bearer {}", config.api_key))
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let session: SessionResponse = serde_json::from_slice(&response.bytes().await?)?;

        let account_id = session
            .primary_accounts
            .get(MAIL_CAPABILITY)
            .cloned()
            .ok_or(MailError::NoMailAccount)?;

        info!("✅ JMAP session established (account {})", account_id);
        debug!("JMAP API URL: {}", session.api_url);

        Ok(JmapClient {
            http,
            api_key: config.api_key.clone(),
            account_id,
            api_url: session.api_url,
        })
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    async fn make_request(&self, method_calls: Value) -> Result<JmapResponse, MailError> {
        let request_body = json!({
            "using": [CORE_CAPABILITY, MAIL_CAPABILITY],
            "methodCalls": method_calls,
        });

        let response = self
            .http
            .post(&self.api_url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(serde_json::from_slice(&response.bytes().await?)?)
    }

    pub async fn find_mailbox_by_name(&self, name: &str) -> Result<Mailbox, MailError> {
        debug!("Looking up mailbox '{}'", name);

        let response = self
            .make_request(json!([
                ["Mailbox/query", {
                    "accountId": self.account_id,
                    "filter": { "name": name },
                }, "0"],
                ["Mailbox/get", {
                    "accountId": self.account_id,
                    "#ids": {
                        "resultOf": "0",
                        "name": "Mailbox/query",
                        "path": "/ids",
                    },
                }, "1"],
            ]))
            .await?;

        let mailboxes: GetResponse<Mailbox> = method_result(response, 1)?;
        select_mailbox(mailboxes.list, name)
    }

    pub async fn list_email_ids(&self, mailbox_id: &str, limit: usize) -> Result<Vec<String>, MailError> {
        let mut query_args = json!({
            "accountId": self.account_id,
            "filter": { "inMailbox": mailbox_id },
        });
        if limit > 0 {
            query_args["limit"] = json!(limit);
        }

        let response = self.make_request(json!([["Email/query", query_args, "0"]])).await?;
        let query: QueryResponse = method_result(response, 0)?;

        debug!("Mailbox {} lists {} email(s)", mailbox_id, query.ids.len());
        Ok(query.ids)
    }

    pub async fn get_emails(&self, email_ids: &[String]) -> Result<Vec<Email>, MailError> {
        let response = self
            .make_request(json!([
                ["Email/get", {
                    "accountId": self.account_id,
                    "ids": email_ids,
                    "properties": EMAIL_PROPERTIES,
                    "fetchHTMLBodyValues": true,
                }, "0"],
            ]))
            .await?;

        let emails: GetResponse<Email> = method_result(response, 0)?;
        if let Some(not_found) = emails.not_found.filter(|ids| !ids.is_empty()) {
            warn!("Emails not found on server: {}", not_found.join(", "));
        }

        Ok(emails.list)
    }

    pub async fn move_email(
        &self,
        email_id: &str,
        source_mailbox_id: &str,
        target_mailbox_id: &str,
    ) -> Result<(), MailError> {
        info!("Moving email {} from {} to {}", email_id, source_mailbox_id, target_mailbox_id);

        let mut update = serde_json::Map::new();
        update.insert(email_id.to_string(), move_patch(source_mailbox_id, target_mailbox_id));

        let response = self
            .make_request(json!([
                ["Email/set", {
                    "accountId": self.account_id,
                    "update": update,
                }, "0"],
            ]))
            .await?;

        let set: SetResponse = method_result(response, 0)?;

        if let Some(reason) = set.not_updated.as_ref().and_then(|m| m.get(email_id)) {
            return Err(MailError::NotUpdated {
                id: email_id.to_string(),
                reason: reason.to_string(),
            });
        }

        if !set.updated.as_ref().is_some_and(|m| m.contains_key(email_id)) {
            warn!("Server did not confirm the update of email {}", email_id);
        }

        Ok(())
    }
}

impl MailClient for JmapClient {
    fn find_mailbox_by_name<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Mailbox, MailError>> {
        Box::pin(JmapClient::find_mailbox_by_name(self, name))
    }

    fn list_email_ids<'a>(
        &'a self,
        mailbox_id: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<String>, MailError>> {
        Box::pin(JmapClient::list_email_ids(self, mailbox_id, limit))
    }

    fn get_emails<'a>(&'a self, email_ids: &'a [String]) -> BoxFuture<'a, Result<Vec<Email>, MailError>> {
        Box::pin(JmapClient::get_emails(self, email_ids))
    }

    fn move_email<'a>(
        &'a self,
        email_id: &'a str,
        source_mailbox_id: &'a str,
        target_mailbox_id: &'a str,
    ) -> BoxFuture<'a, Result<(), MailError>> {
        Box::pin(JmapClient::move_email(self, email_id, source_mailbox_id, target_mailbox_id))
    }
}

/// `Email/set` patch removing one mailbox and adding another
fn move_patch(source_mailbox_id: &str, target_mailbox_id: &str) -> Value {
    let mut patch = serde_json::Map::new();
    patch.insert(format!("mailboxIds/{}", source_mailbox_id), Value::Null);
    patch.insert(format!("mailboxIds/{}", target_mailbox_id), Value::Bool(true));
    Value::Object(patch)
}

/// `Mailbox/query` matches names by substring; keep the first exact match
fn select_mailbox(mailboxes: Vec<Mailbox>, name: &str) -> Result<Mailbox, MailError> {
    let mut matches = mailboxes.into_iter().filter(|m| m.name == name);
    let mailbox = matches.next().ok_or_else(|| MailError::NotFound(name.to_string()))?;

    let duplicates = matches.count();
    if duplicates > 0 {
        warn!("{} other mailbox(es) named '{}', using {}", duplicates, name, mailbox.id);
    }

    Ok(mailbox)
}

/// Decode the arguments of the method response at `index`, turning JMAP
/// method-level errors into `MailError`
fn method_result<T: DeserializeOwned>(response: JmapResponse, index: usize) -> Result<T, MailError> {
    let MethodResponse(name, arguments, _) = response
        .method_responses
        .into_iter()
        .nth(index)
        .ok_or_else(|| MailError::UnexpectedResponse(format!("missing method response #{}", index)))?;

    if name == "error" {
        let error: MethodError = serde_json::from_value(arguments)?;
        if error.kind == "accountReadOnly" {
            return Err(MailError::ReadOnlyCredential);
        }
        return Err(MailError::Method {
            kind: error.kind,
            description: error.description.unwrap_or_default(),
        });
    }

    Ok(serde_json::from_value(arguments)?)
}
