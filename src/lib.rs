//! `echomail` — store-and-forward group messaging for disconnected nodes.
//!
//! This crate provides the envelope codec that bundles a message and its
//! attachments for batch transport, the validation that makes a received
//! envelope trustworthy, the structured message model, reply threading,
//! and the mail root the messages are kept in.

pub mod config;
pub mod envelope;
pub mod error;
pub mod index;
pub mod mailer;
pub mod model;
pub mod store;
pub mod threading;

pub use envelope::Envelope;
pub use error::{EchomailError, Result};
pub use model::Message;
pub use threading::{build_forest, Forest, ThreadNode};
