pub mod common;
pub mod processor_base;

// Re-export commonly used items
pub use common::{Email, Mailbox, ProcessingResult};
pub use processor_base::{EmailProcessor, MailClient, ProcessorSettings, ScreenshotService};
