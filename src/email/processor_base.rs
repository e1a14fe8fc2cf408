use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use log::{debug, error, info, warn};

use crate::config::{Config, FolderConfig};
use crate::email::{Email, Mailbox, ProcessingResult};
use crate::error::{MailError, RenderError};
use crate::screenshot::ArtifactNaming;

/// Mail operations needed by the processor
pub trait MailClient: Send + Sync {
    /// Resolve a mailbox by its exact name
    fn find_mailbox_by_name<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Mailbox, MailError>>;

    /// Ids of the emails in a mailbox, at most `limit` of them (`0` = all)
    fn list_email_ids<'a>(
        &'a self,
        mailbox_id: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<String>, MailError>>;

    /// Fetch emails by id; unknown ids are left out of the result
    fn get_emails<'a>(&'a self, email_ids: &'a [String]) -> BoxFuture<'a, Result<Vec<Email>, MailError>>;

    /// Move an email from one mailbox to another in a single update
    fn move_email<'a>(
        &'a self,
        email_id: &'a str,
        source_mailbox_id: &'a str,
        target_mailbox_id: &'a str,
    ) -> BoxFuture<'a, Result<(), MailError>>;
}

/// Turns HTML into an image file
pub trait ScreenshotService: Send + Sync {
    /// Render `html` at `width`x`height` into `<output dir>/<file_stem>.png`
    fn render<'a>(
        &'a self,
        file_stem: &'a str,
        html: &'a str,
        width: u32,
        height: u32,
    ) -> BoxFuture<'a, Result<PathBuf, RenderError>>;
}

/// Settings the processor needs besides its collaborators
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    pub folders: FolderConfig,
    pub width: u32,
    pub height: u32,
    pub naming: ArtifactNaming,
}

impl From<&Config> for ProcessorSettings {
    fn from(config: &Config) -> Self {
        ProcessorSettings {
            folders: config.folders.clone(),
            width: config.screenshot.width,
            height: config.screenshot.height,
            naming: config.screenshot.naming,
        }
    }
}

/// Moves emails from the source folder to the archive folder, leaving a
/// screenshot of each one behind
pub struct EmailProcessor<C: MailClient, S: ScreenshotService> {
    client: C,
    screenshots: S,
    settings: ProcessorSettings,
}

impl<C: MailClient, S: ScreenshotService> EmailProcessor<C, S> {
    pub fn new(client: C, screenshots: S, settings: ProcessorSettings) -> Self {
        EmailProcessor {
            client,
            screenshots,
            settings,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn screenshots(&self) -> &S {
        &self.screenshots
    }

    /// Run one pass over the source folder.
    ///
    /// Only folder resolution and listing are fatal. Anything that goes wrong
    /// with a single email is counted as a failure and the email stays in the
    /// source folder for the next run.
    pub async fn process_emails<W: Write>(
        &self,
        limit: usize,
        dry_run: bool,
        output: &mut W,
    ) -> Result<ProcessingResult> {
        let folders = &self.settings.folders;

        let source = self
            .client
            .find_mailbox_by_name(&folders.source)
            .await
            .with_context(|| format!("failed to find source folder '{}'", folders.source))?;

        let archive = self
            .client
            .find_mailbox_by_name(&folders.archive)
            .await
            .with_context(|| format!("failed to find archive folder '{}'", folders.archive))?;

        debug!("Source mailbox {} -> {}, archive mailbox {} -> {}",
               source.name, source.id, archive.name, archive.id);

        let email_ids = self
            .client
            .list_email_ids(&source.id, limit)
            .await
            .context("failed to retrieve emails")?;

        let email_count = email_ids.len();
        if email_count == 0 {
            writeln!(output, "No emails found in folder '{}'", folders.source)?;
            info!("No emails found in folder '{}'", folders.source);
            return Ok(ProcessingResult::new(0));
        }

        writeln!(output, "Found {} email(s) in folder '{}'", email_count, folders.source)?;

        if dry_run {
            writeln!(output, "\nDRY RUN MODE - No changes will be made")?;
            writeln!(output, "Would process {} emails:", email_count)?;
            for (index, email_id) in email_ids.iter().enumerate() {
                writeln!(output, "  {}. Email ID: {}", index + 1, email_id)?;
            }
            return Ok(ProcessingResult::new(email_count));
        }

        let mut result = ProcessingResult::new(email_count);

        for (index, email_id) in email_ids.iter().enumerate() {
            writeln!(output, "\nProcessing email {}/{} (ID: {})...", index + 1, email_count, email_id)?;

            if self.process_single_email(email_id, &source, &archive, output).await? {
                result.success();
            } else {
                result.failure();
            }
        }

        info!("Processing completed: {} processed, {} failed out of {}",
              result.emails_processed, result.emails_failed, result.emails_found);

        Ok(result)
    }

    /// Returns `Ok(false)` for a per-email failure, `Err` only when the
    /// progress output itself cannot be written
    async fn process_single_email<W: Write>(
        &self,
        email_id: &str,
        source: &Mailbox,
        archive: &Mailbox,
        output: &mut W,
    ) -> Result<bool> {
        let ids = [email_id.to_string()];
        let email = match self.client.get_emails(&ids).await {
            Ok(emails) => match emails.into_iter().next() {
                Some(email) => email,
                None => {
                    writeln!(output, "  ✗ Email not found")?;
                    warn!("Email {} no longer exists on the server", email_id);
                    return Ok(false);
                }
            },
            Err(e) => {
                writeln!(output, "  ✗ Failed to fetch email: {}", e)?;
                error!("Failed to fetch email {}: {}", email_id, e);
                return Ok(false);
            }
        };

        writeln!(output, "  Subject: {}", email.subject_or_default())?;
        if let Some(sender) = email.sender() {
            writeln!(output, "  From: {}", sender)?;
        }

        let Some(html_content) = email.html_content() else {
            writeln!(output, "  ✗ No HTML content found")?;
            warn!("Email {} has no HTML body", email_id);
            return Ok(false);
        };

        let rendered = match self.settings.naming.file_stem(&email) {
            Ok(file_stem) => {
                self.screenshots
                    .render(&file_stem, html_content, self.settings.width, self.settings.height)
                    .await
            }
            Err(e) => Err(e),
        };

        let screenshot_path = match rendered {
            Ok(path) => path,
            Err(e) => {
                writeln!(output, "  ✗ Failed to generate screenshot: {}", e)?;
                error!("Failed to generate screenshot for email {}: {}", email_id, e);
                return Ok(false);
            }
        };
        writeln!(output, "  ✓ Screenshot generated: {}", screenshot_path.display())?;

        // The screenshot stays on disk even if the move fails
        if let Err(e) = self.client.move_email(email_id, &source.id, &archive.id).await {
            writeln!(output, "  ✗ Failed to move email to archive: {}", e)?;
            error!("Failed to move email {} to '{}': {}", email_id, archive.name, e);
            return Ok(false);
        }
        writeln!(output, "  ✓ Moved to archive folder")?;
        debug!("Email {} moved to mailbox {}", email_id, archive.id);

        Ok(true)
    }
}
