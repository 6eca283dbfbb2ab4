//! Gemtext rendering of group lists and thread forests.

use crate::store::{GroupInfo, MESSAGE_FILE};
use crate::threading::Forest;

/// Render the page listing every group.
pub fn render_root_index(groups: &[GroupInfo]) -> String {
    let mut out = String::from("# Echomail Message Groups\n\n");
    for group in groups {
        out.push_str(&format!(
            "=> {}/{MESSAGE_FILE} 📰 {}\n",
            group.dir, group.name
        ));
    }
    out
}

/// Render the thread index of one group.
///
/// Replies are indented under their parent and marked with `⤷`.
pub fn render_group_index(group: &str, forest: &Forest) -> String {
    let mut out = format!("# Echomail: {group}\n\n");

    for (index, depth) in forest.walk() {
        let node = forest.node(index);
        let prefix = match depth {
            0 => String::new(),
            d => format!("{}⤷ ", "  ".repeat(d - 1)),
        };
        let text = format!("{}: {}", node.from, node.subject);
        out.push_str(&format!(
            "=> {}/{MESSAGE_FILE} ✉️ {prefix}{}\n",
            node.msg_id,
            text.trim_end()
        ));
    }

    out.push_str(&format!("\n=> ../{MESSAGE_FILE} 🔙 Back to groups\n"));
    out
}
