//! Reply-tree reconstruction for the messages of one group.
//!
//! Every message may name its parent with a `ReplyTo` header holding the
//! parent's `MsgId`. Nodes live in an arena and refer to their children by
//! index, so building is a linear pass and no node is ever owned twice.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::model::Message;

/// One message in a reply tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadNode {
    pub msg_id: String,
    /// Author display name, see [`Message::from_display`].
    pub from: String,
    pub subject: String,
    pub date: Option<DateTime<Utc>>,
    /// Arena indices of direct replies, sorted by date.
    pub children: Vec<usize>,
}

/// A set of reply trees sharing one arena.
#[derive(Debug, Clone, Default)]
pub struct Forest {
    nodes: Vec<ThreadNode>,
    roots: Vec<usize>,
}

impl Forest {
    /// Root nodes, sorted by date.
    pub fn roots(&self) -> impl Iterator<Item = &ThreadNode> {
        self.roots.iter().map(|&i| &self.nodes[i])
    }

    /// Arena indices of the roots.
    pub fn root_indices(&self) -> &[usize] {
        &self.roots
    }

    pub fn node(&self, index: usize) -> &ThreadNode {
        &self.nodes[index]
    }

    /// Direct replies of `node`, sorted by date.
    pub fn children<'a>(&'a self, node: &'a ThreadNode) -> impl Iterator<Item = &'a ThreadNode> {
        node.children.iter().map(|&i| &self.nodes[i])
    }

    /// Total number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Depth-first, pre-ordered `(node_index, depth)` pairs over every tree.
    pub fn walk(&self) -> Vec<(usize, usize)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(usize, usize)> = self.roots.iter().rev().map(|&i| (i, 0)).collect();

        while let Some((index, depth)) = stack.pop() {
            out.push((index, depth));
            stack.extend(self.nodes[index].children.iter().rev().map(|&c| (c, depth + 1)));
        }
        out
    }
}

/// Build the reply forest of a batch of messages.
///
/// A message whose `ReplyTo` is absent or names an unknown id becomes a
/// root, as does every message on a `ReplyTo` cycle. When several messages
/// share an id, replies attach to the first of them. Every level is sorted
/// by date, dateless messages first; ties keep input order.
pub fn build_forest(messages: &[Message]) -> Forest {
    let mut ids: HashMap<&str, usize> = HashMap::with_capacity(messages.len());
    for (index, msg) in messages.iter().enumerate() {
        ids.entry(msg.msg_id.as_str()).or_insert(index);
    }

    let mut parents: Vec<Option<usize>> = messages
        .iter()
        .map(|msg| msg.reply_to().and_then(|id| ids.get(id).copied()))
        .collect();
    break_cycles(&mut parents);

    let mut nodes: Vec<ThreadNode> = messages
        .iter()
        .map(|msg| ThreadNode {
            msg_id: msg.msg_id.clone(),
            from: msg.from_display(),
            subject: msg.subject().to_string(),
            date: msg.date,
            children: Vec::new(),
        })
        .collect();

    let mut roots = Vec::new();
    for (index, parent) in parents.iter().enumerate() {
        match parent {
            Some(p) => nodes[*p].children.push(index),
            None => roots.push(index),
        }
    }

    // Levels sort independently, so one pass over the arena covers every depth.
    roots.sort_by_key(|&i| nodes[i].date);
    for index in 0..nodes.len() {
        let mut children = std::mem::take(&mut nodes[index].children);
        children.sort_by_key(|&c| nodes[c].date);
        nodes[index].children = children;
    }

    Forest { nodes, roots }
}

/// Detach every node that lies on a parent cycle.
fn break_cycles(parents: &mut [Option<usize>]) {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        New,
        OnPath,
        Done,
    }

    let mut marks = vec![Mark::New; parents.len()];
    let mut path = Vec::new();

    for start in 0..parents.len() {
        let mut current = Some(start);
        while let Some(index) = current {
            match marks[index] {
                Mark::New => {
                    marks[index] = Mark::OnPath;
                    path.push(index);
                    current = parents[index];
                }
                Mark::OnPath => {
                    let from = path.iter().position(|&p| p == index).unwrap_or(0);
                    for &member in &path[from..] {
                        parents[member] = None;
                    }
                    break;
                }
                Mark::Done => break,
            }
        }
        for index in path.drain(..) {
            marks[index] = Mark::Done;
        }
    }
}
