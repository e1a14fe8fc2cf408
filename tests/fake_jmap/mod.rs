//! In-process fake JMAP server for integration testing
//!
//! Serves the session resource at `/jmap/session` and answers method calls
//! POSTed to `/jmap/api` from an in-memory store. Only the methods the
//! client issues are understood: `Mailbox/query`, `Mailbox/get` (with a
//! `#ids` back-reference), `Email/query`, `Email/get` and `Email/set`.
//!
//! One request per connection; every response carries `Connection: close`.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

pub const API_KEY: &str = "fmu1-test-key";
pub const ACCOUNT_ID: &str = "u1234";

#[derive(Debug, Clone)]
pub struct FakeEmail {
    pub id: String,
    pub subject: String,
    pub received_at: String,
    pub html: Option<String>,
    pub mailbox_ids: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub struct Store {
    pub mailboxes: Vec<(String, String)>,
    pub emails: Vec<FakeEmail>,
    pub read_only: bool,
    /// Every method name received, in order
    pub calls: Vec<String>,
}

impl Store {
    pub fn mailbox(mut self, id: &str, name: &str) -> Self {
        self.mailboxes.push((id.to_string(), name.to_string()));
        self
    }

    pub fn email(mut self, id: &str, mailbox_id: &str, received_at: &str, html: Option<&str>) -> Self {
        self.emails.push(FakeEmail {
            id: id.to_string(),
            subject: format!("Subject of {}", id),
            received_at: received_at.to_string(),
            html: html.map(str::to_string),
            mailbox_ids: BTreeSet::from([mailbox_id.to_string()]),
        });
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn ids_in(&self, mailbox_id: &str) -> Vec<String> {
        self.emails
            .iter()
            .filter(|e| e.mailbox_ids.contains(mailbox_id))
            .map(|e| e.id.clone())
            .collect()
    }
}

pub struct FakeJmapServer {
    port: u16,
    store: Arc<Mutex<Store>>,
    handle: tokio::task::JoinHandle<()>,
}

impl FakeJmapServer {
    pub async fn start(store: Store) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let store = Arc::new(Mutex::new(store));

        let shared = Arc::clone(&store);
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let store = Arc::clone(&shared);
                tokio::spawn(async move {
                    let _ = handle_connection(stream, port, store).await;
                });
            }
        });

        FakeJmapServer { port, store, handle }
    }

    pub fn session_url(&self) -> String {
        format!("http://127.0.0.1:{}/jmap/session", self.port)
    }

    pub fn store(&self) -> std::sync::MutexGuard<'_, Store> {
        self.store.lock().unwrap()
    }
}

impl Drop for FakeJmapServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_connection(stream: TcpStream, port: u16, store: Arc<Mutex<Store>>) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut content_length = 0usize;
    let mut authorized = false;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await?;
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            match name.trim().to_ascii_lowercase().as_str() {
                "content-length" => content_length = value.trim().parse().unwrap_or(0),
                "authorization" => authorized = value.trim() == format!("Bearer {}", API_KEY),
                _ => {}
            }
        }
    }

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await?;

    let (status, payload) = if !authorized {
        (401, json!({ "type": "unauthorized" }))
    } else {
        match (method.as_str(), path.as_str()) {
            ("GET", "/jmap/session") => (200, session(port)),
            ("POST", "/jmap/api") => match serde_json::from_slice::<Value>(&body) {
                Ok(request) => (200, dispatch(&request, &mut store.lock().unwrap())),
                Err(_) => (400, json!({ "type": "urn:ietf:params:jmap:error:notJSON" })),
            },
            _ => (404, json!({ "type": "notFound" })),
        }
    };

    let body = payload.to_string();
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        _ => "Not Found",
    };
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    );

    let mut stream = reader.into_inner();
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

fn session(port: u16) -> Value {
    json!({
        "capabilities": {},
        "accounts": { ACCOUNT_ID: { "name": "test@example.com" } },
        "primaryAccounts": {
            "urn:ietf:params:jmap:core": ACCOUNT_ID,
            "urn:ietf:params:jmap:mail": ACCOUNT_ID,
        },
        "apiUrl": format!("http://127.0.0.1:{}/jmap/api", port),
        "state": "s0",
    })
}

fn dispatch(request: &Value, store: &mut Store) -> Value {
    let calls = request["methodCalls"].as_array().cloned().unwrap_or_default();
    let mut responses: Vec<Value> = Vec::new();

    for call in calls {
        let name = call[0].as_str().unwrap_or_default().to_string();
        let args = &call[1];
        let call_id = call[2].clone();
        store.calls.push(name.clone());

        let (response_name, result) = match name.as_str() {
            "Mailbox/query" => ("Mailbox/query", mailbox_query(args, store)),
            "Mailbox/get" => ("Mailbox/get", mailbox_get(args, store, &responses)),
            "Email/query" => ("Email/query", email_query(args, store)),
            "Email/get" => ("Email/get", email_get(args, store)),
            "Email/set" if store.read_only => ("error", json!({ "type": "accountReadOnly" })),
            "Email/set" => ("Email/set", email_set(args, store)),
            _ => ("error", json!({ "type": "unknownMethod" })),
        };

        responses.push(json!([response_name, result, call_id]));
    }

    json!({ "methodResponses": responses, "sessionState": "s0" })
}

fn mailbox_query(args: &Value, store: &Store) -> Value {
    let needle = args["filter"]["name"].as_str().unwrap_or_default();
    // RFC 8621: the name filter is a substring match
    let ids: Vec<&str> = store
        .mailboxes
        .iter()
        .filter(|(_, name)| name.contains(needle))
        .map(|(id, _)| id.as_str())
        .collect();
    json!({ "accountId": ACCOUNT_ID, "ids": ids, "position": 0 })
}

fn mailbox_get(args: &Value, store: &Store, previous: &[Value]) -> Value {
    let ids: Vec<String> = match args.get("#ids") {
        Some(reference) => previous
            .iter()
            .find(|r| r[2] == reference["resultOf"])
            .and_then(|r| r[1]["ids"].as_array().cloned())
            .unwrap_or_default()
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        None => string_list(&args["ids"]),
    };

    let list: Vec<Value> = store
        .mailboxes
        .iter()
        .filter(|(id, _)| ids.contains(id))
        .map(|(id, name)| json!({ "id": id, "name": name, "role": null }))
        .collect();
    json!({ "accountId": ACCOUNT_ID, "list": list, "notFound": [] })
}

fn email_query(args: &Value, store: &Store) -> Value {
    let mailbox_id = args["filter"]["inMailbox"].as_str().unwrap_or_default();
    let mut ids = store.ids_in(mailbox_id);
    if let Some(limit) = args["limit"].as_u64() {
        ids.truncate(limit as usize);
    }
    json!({ "accountId": ACCOUNT_ID, "ids": ids, "position": 0 })
}

fn email_get(args: &Value, store: &Store) -> Value {
    let ids = string_list(&args["ids"]);
    let mut list = Vec::new();
    let mut not_found = Vec::new();

    for id in ids {
        match store.emails.iter().find(|e| e.id == id) {
            Some(email) => list.push(email_json(email)),
            None => not_found.push(id),
        }
    }

    json!({ "accountId": ACCOUNT_ID, "list": list, "notFound": not_found })
}

fn email_json(email: &FakeEmail) -> Value {
    let mailbox_ids: Map<String, Value> = email
        .mailbox_ids
        .iter()
        .map(|id| (id.clone(), Value::Bool(true)))
        .collect();

    let (html_body, body_values) = match &email.html {
        Some(html) => (
            json!([{ "partId": "1", "type": "text/html" }]),
            json!({ "1": { "value": html, "isEncodingProblem": false, "isTruncated": false } }),
        ),
        // No HTML alternative: RFC 8621 lists the text/plain part instead
        None => (
            json!([{ "partId": "1", "type": "text/plain" }]),
            json!({ "1": { "value": format!("Plain text of {}", email.id), "isEncodingProblem": false, "isTruncated": false } }),
        ),
    };

    json!({
        "id": email.id,
        "subject": email.subject,
        "receivedAt": email.received_at,
        "from": [{ "name": "Sender", "email": "sender@example.com" }],
        "htmlBody": html_body,
        "bodyValues": body_values,
        "mailboxIds": mailbox_ids,
    })
}

fn email_set(args: &Value, store: &mut Store) -> Value {
    let mut updated = Map::new();
    let mut not_updated = Map::new();

    if let Some(update) = args["update"].as_object() {
        for (id, patch) in update {
            let Some(email) = store.emails.iter_mut().find(|e| &e.id == id) else {
                not_updated.insert(id.clone(), json!({ "type": "notFound" }));
                continue;
            };
            for (key, value) in patch.as_object().into_iter().flatten() {
                if let Some(mailbox_id) = key.strip_prefix("mailboxIds/") {
                    if value.is_null() {
                        email.mailbox_ids.remove(mailbox_id);
                    } else {
                        email.mailbox_ids.insert(mailbox_id.to_string());
                    }
                }
            }
            updated.insert(id.clone(), Value::Null);
        }
    }

    json!({
        "accountId": ACCOUNT_ID,
        "updated": updated,
        "notUpdated": not_updated,
    })
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}
