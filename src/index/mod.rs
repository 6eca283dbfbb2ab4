//! Gemtext index pages for a mail root.

pub mod gemtext;

use std::fs;

use tracing::info;

use crate::error::{EchomailError, Result};
use crate::store::{MailRoot, MESSAGE_FILE};
use crate::threading::build_forest;

/// What [`write_indexes`] produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct IndexSummary {
    pub groups: usize,
    pub messages: usize,
}

/// Regenerate the group list and every group's thread index.
pub fn write_indexes(root: &MailRoot) -> Result<IndexSummary> {
    let groups = root.groups()?;
    let mut summary = IndexSummary {
        groups: groups.len(),
        messages: 0,
    };

    let root_page = root.path().join(MESSAGE_FILE);
    fs::write(&root_page, gemtext::render_root_index(&groups))
        .map_err(|e| EchomailError::io(&root_page, e))?;

    for group in &groups {
        let messages = root.load_group(&group.dir)?;
        let forest = build_forest(&messages);
        summary.messages += forest.len();

        let page = root.path().join(&group.dir).join(MESSAGE_FILE);
        fs::write(&page, gemtext::render_group_index(&group.name, &forest))
            .map_err(|e| EchomailError::io(&page, e))?;
        info!(group = %group.name, messages = forest.len(), "Wrote group index");
    }

    Ok(summary)
}
