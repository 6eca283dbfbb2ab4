//! Structured message records built from verified envelopes.

pub mod message;

pub use message::{compute_msg_id, group_dir, Message, GROUP_DIR_SUFFIX};
