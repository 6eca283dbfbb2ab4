//! On-disk mail root: one directory per group, one per message.

pub mod mailroot;

pub use mailroot::{GroupInfo, MailRoot, MESSAGE_FILE};
