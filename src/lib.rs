// Library exports for the email-screenshots crate
// This allows tests and the binary to use the modules

pub mod config;
pub mod email;
pub mod error;
pub mod jmap_client;
pub mod screenshot;
