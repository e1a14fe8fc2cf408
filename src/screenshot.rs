use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::error::CdpError;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::ScreenshotParams;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::StreamExt;
use log::{debug, info, warn};
use serde::Deserialize;

use crate::config::ScreenshotConfig;
use crate::email::{Email, ScreenshotService};
use crate::error::RenderError;

/// Delay after the body is ready, leaves room for async layout and web fonts
const SETTLE_DELAY: Duration = Duration::from_millis(500);

const DOCUMENT_STYLE: &str = r#"
        body {
            margin: 20px;
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, "Helvetica Neue", Arial, sans-serif;
            font-size: 14px;
            line-height: 1.5;
        }
        img {
            max-width: 100%;
            height: auto;
        }
"#;

/// How screenshot files are named
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactNaming {
    /// `YYYY-MM-DD-HH-MM-SS.png` from the email's `receivedAt` (UTC)
    Timestamp,
    /// `<email id>.png`
    #[serde(rename = "id")]
    MessageId,
}

impl ArtifactNaming {
    /// File name (without extension) of the screenshot for `email`
    pub fn file_stem(&self, email: &Email) -> Result<String, RenderError> {
        match self {
            ArtifactNaming::Timestamp => {
                let received = DateTime::parse_from_rfc3339(&email.received_at).map_err(|source| {
                    RenderError::Timestamp {
                        value: email.received_at.clone(),
                        source,
                    }
                })?;
                Ok(received.with_timezone(&Utc).format("%Y-%m-%d-%H-%M-%S").to_string())
            }
            ArtifactNaming::MessageId => Ok(email
                .id
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
                .collect()),
        }
    }
}

impl FromStr for ArtifactNaming {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "timestamp" => Ok(ArtifactNaming::Timestamp),
            "id" | "message-id" => Ok(ArtifactNaming::MessageId),
            other => Err(format!("unknown naming scheme '{}' (expected 'timestamp' or 'id')", other)),
        }
    }
}

impl fmt::Display for ArtifactNaming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactNaming::Timestamp => write!(f, "timestamp"),
            ArtifactNaming::MessageId => write!(f, "id"),
        }
    }
}

/// Wrap an HTML fragment in a minimal, readable document
pub fn wrap_html_document(html_content: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n    <meta charset=\"UTF-8\">\n    <style>{}    </style>\n</head>\n<body>\n{}\n</body>\n</html>",
        DOCUMENT_STYLE, html_content
    )
}

/// Aborts the wrapped task when dropped, including when a timeout drops
/// the future that owns it
struct AbortOnDrop<T>(tokio::task::JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Renders HTML through headless Chromium and stores PNG files
pub struct ScreenshotGenerator {
    output_dir: PathBuf,
    timeout: Duration,
}

impl ScreenshotGenerator {
    pub fn new(config: &ScreenshotConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.output_dir)
            .with_context(|| format!("Unable to create output directory {}", config.output_dir))?;

        info!("Screenshots will be written to {}", config.output_dir);

        Ok(ScreenshotGenerator {
            output_dir: PathBuf::from(&config.output_dir),
            timeout: config.timeout(),
        })
    }

    pub fn output_path(&self, file_stem: &str) -> PathBuf {
        self.output_dir.join(format!("{}.png", file_stem))
    }

    async fn capture(&self, html: &str, width: u32, height: u32) -> Result<Vec<u8>, RenderError> {
        let browser_config = BrowserConfig::builder()
            .window_size(width, height)
            .viewport(Viewport {
                width,
                height,
                ..Default::default()
            })
            .build()
            .map_err(RenderError::Launch)?;

        let (mut browser, mut handler) = Browser::launch(browser_config).await?;

        let _handler_task = AbortOnDrop(tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        }));

        let result: Result<Vec<u8>, CdpError> = async {
            let page = browser.new_page("about:blank").await?;
            page.set_content(wrap_html_document(html)).await?;
            page.find_element("body").await?;
            tokio::time::sleep(SETTLE_DELAY).await;

            page.screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(true)
                    .build(),
            )
            .await
        }
        .await;

        if let Err(e) = browser.close().await {
            warn!("Unable to close browser cleanly: {}", e);
        }

        Ok(result?)
    }
}

/// Write the PNG, returning `true` when an existing file was replaced
async fn write_screenshot(path: &Path, png: &[u8]) -> Result<bool, RenderError> {
    let replaced = tokio::fs::try_exists(path).await.unwrap_or(false);
    if replaced {
        warn!("Overwriting existing screenshot {:?}, another email has the same name", path);
    }

    tokio::fs::write(path, png)
        .await
        .map_err(|source| RenderError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(replaced)
}

impl ScreenshotService for ScreenshotGenerator {
    fn render<'a>(
        &'a self,
        file_stem: &'a str,
        html: &'a str,
        width: u32,
        height: u32,
    ) -> BoxFuture<'a, Result<PathBuf, RenderError>> {
        Box::pin(async move {
            let output_path = self.output_path(file_stem);
            debug!("Rendering {} bytes of HTML at {}x{}", html.len(), width, height);

            let png = tokio::time::timeout(self.timeout, self.capture(html, width, height))
                .await
                .map_err(|_| RenderError::Timeout(self.timeout))??;

            write_screenshot(&output_path, &png).await?;

            info!("Screenshot saved: {:?} ({} bytes)", output_path, png.len());
            Ok(output_path)
        })
    }
}
