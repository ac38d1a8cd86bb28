//! Test-side mail tooling: a listener client that buffers captured
//! mail and resolves waits, and an outbound sender for pushing test
//! messages through the relay.

pub mod address;
pub mod client;
pub mod error;
pub mod filter;
pub mod send;

pub use client::MailClient;
pub use error::ClientError;
pub use filter::Filter;
pub use send::{MailSender, TestMail};
