//! Mail root layout and persistence.
//!
//! ```text
//! <root>/
//!   index.gmi                      group list
//!   <GroupDir(group)>/
//!     index.gmi                    thread index of the group
//!     <MsgId>/
//!       index.gmi                  message text
//!       <attachment>...
//! ```

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::envelope::filename::is_clean_filename;
use crate::envelope::header::message_header;
use crate::error::{EchomailError, Result};
use crate::model::{Message, GROUP_DIR_SUFFIX};

/// File name of a stored message text, and of every generated index page.
pub const MESSAGE_FILE: &str = "index.gmi";

/// A group directory found in the mail root.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct GroupInfo {
    /// Directory name, see [`crate::model::group_dir`].
    pub dir: String,
    /// Group name as written in the messages.
    pub name: String,
}

/// A directory tree of received messages.
#[derive(Debug, Clone)]
pub struct MailRoot {
    root: PathBuf,
}

impl MailRoot {
    /// Open an existing mail root directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(EchomailError::InvalidPath(format!(
                "mail root must be a directory: {}",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Directory a message is stored in.
    pub fn message_dir(&self, msg: &Message) -> PathBuf {
        self.root.join(msg.group_dir()).join(&msg.msg_id)
    }

    /// Store a message and its attachments.
    ///
    /// The message text is (re)written; an attachment that already exists
    /// on disk is never overwritten and fails the save.
    pub fn save(&self, msg: &Message) -> Result<PathBuf> {
        let dir = self.message_dir(msg);
        fs::create_dir_all(&dir).map_err(|e| EchomailError::io(&dir, e))?;

        let text_path = dir.join(MESSAGE_FILE);
        fs::write(&text_path, &msg.body).map_err(|e| EchomailError::io(&text_path, e))?;

        for (name, content) in &msg.attachments {
            let path = dir.join(name);
            if !is_clean_filename(name) || path.parent() != Some(dir.as_path()) {
                return Err(EchomailError::InvalidPath(format!(
                    "path traversal in attachment: {name}"
                )));
            }
            write_new(&path, content)?;
            debug!(path = %path.display(), size = content.len(), "Saved attachment");
        }

        info!(
            group = %msg.group,
            msg_id = %msg.msg_id,
            attachments = msg.attachments.len(),
            "Saved message"
        );
        Ok(dir)
    }

    /// List group directories that hold at least one readable message,
    /// sorted by directory name.
    pub fn groups(&self) -> Result<Vec<GroupInfo>> {
        let mut groups = Vec::new();

        for dir in sorted_subdirs(&self.root)? {
            let Some(dir_name) = file_name(&dir) else {
                continue;
            };
            if !dir_name.ends_with(GROUP_DIR_SUFFIX) {
                continue;
            }

            let name = sorted_subdirs(&dir)?
                .iter()
                .map(|msg_dir| msg_dir.join(MESSAGE_FILE))
                .filter(|path| path.is_file())
                .find_map(|path| read_group_name(&path));

            match name {
                Some(name) => groups.push(GroupInfo {
                    dir: dir_name,
                    name,
                }),
                None => debug!(dir = %dir.display(), "Skipping group without messages"),
            }
        }

        Ok(groups)
    }

    /// Load every stored message of a group directory.
    ///
    /// Messages that cannot be read or carry a malformed header are skipped.
    pub fn load_group(&self, group_dir: &str) -> Result<Vec<Message>> {
        let dir = self.root.join(group_dir);
        let mut messages = Vec::new();

        for msg_dir in sorted_subdirs(&dir)? {
            let path = msg_dir.join(MESSAGE_FILE);
            let Some(msg_id) = file_name(&msg_dir) else {
                continue;
            };
            if !path.is_file() {
                continue;
            }

            let body = match fs::read(&path) {
                Ok(body) => body,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable message");
                    continue;
                }
            };
            match Message::from_stored(msg_id, body) {
                Ok(msg) => messages.push(msg),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unparseable message");
                }
            }
        }

        debug!(dir = %dir.display(), count = messages.len(), "Loaded group");
        Ok(messages)
    }
}

/// Create `path` exclusively and write `content` to it.
fn write_new(path: &Path, content: &[u8]) -> Result<()> {
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(EchomailError::AttachmentExists(path.to_path_buf()));
        }
        Err(e) => return Err(EchomailError::io(path, e)),
    };
    file.write_all(content)
        .map_err(|e| EchomailError::io(path, e))
}

fn read_group_name(path: &Path) -> Option<String> {
    let body = fs::read(path).ok()?;
    match message_header(&body) {
        Ok(fields) => fields.get("Group").cloned(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unreadable message header");
            None
        }
    }
}

fn sorted_subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| EchomailError::io(dir, e))? {
        let entry = entry.map_err(|e| EchomailError::io(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()?.to_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Envelope;

    const SENDER: &str = "MZLQ74C2EB2AIMEE2SWKSQUT54DHKMG55FH7J2JLRWCFSJJ6W54Q";

    fn message(group: &str, text: &str) -> Message {
        let body = format!("```Echomail\nSender: {SENDER}\nGroup: {group}\n```\n{text}\n");
        Envelope::with_body(body).parse().unwrap()
    }

    #[test]
    fn test_open_requires_directory() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(MailRoot::open(tmp.path()).is_ok());
        assert!(MailRoot::open(tmp.path().join("nope")).is_err());

        let file = tmp.path().join("file");
        fs::write(&file, "x").unwrap();
        assert!(matches!(
            MailRoot::open(&file).unwrap_err(),
            EchomailError::InvalidPath(_)
        ));
    }

    #[test]
    fn test_save_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let root = MailRoot::open(tmp.path()).unwrap();
        let mut msg = message("local.test", "hello");
        msg.attachments.insert("a.txt".into(), b"attached".to_vec());

        let dir = root.save(&msg).unwrap();
        assert_eq!(dir, tmp.path().join(msg.group_dir()).join(&msg.msg_id));
        assert_eq!(fs::read(dir.join(MESSAGE_FILE)).unwrap(), msg.body);
        assert_eq!(fs::read(dir.join("a.txt")).unwrap(), b"attached");
    }

    #[test]
    fn test_save_refuses_to_overwrite_attachment() {
        let tmp = tempfile::tempdir().unwrap();
        let root = MailRoot::open(tmp.path()).unwrap();
        let mut msg = message("local.test", "hello");
        msg.attachments.insert("a.txt".into(), b"new".to_vec());

        let dir = root.message_dir(&msg);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("a.txt"), b"old").unwrap();

        let err = root.save(&msg).unwrap_err();
        assert!(matches!(err, EchomailError::AttachmentExists(_)));
        assert_eq!(fs::read(dir.join("a.txt")).unwrap(), b"old");
    }

    #[test]
    fn test_attachment_cannot_replace_message_text() {
        let tmp = tempfile::tempdir().unwrap();
        let root = MailRoot::open(tmp.path()).unwrap();
        let mut msg = message("local.test", "hello");
        msg.attachments.insert(MESSAGE_FILE.into(), b"evil".to_vec());

        assert!(matches!(
            root.save(&msg).unwrap_err(),
            EchomailError::AttachmentExists(_)
        ));
        let text = fs::read(root.message_dir(&msg).join(MESSAGE_FILE)).unwrap();
        assert_eq!(text, msg.body);
    }

    #[test]
    fn test_save_rejects_traversal() {
        let tmp = tempfile::tempdir().unwrap();
        let root = MailRoot::open(tmp.path()).unwrap();
        let mut msg = message("local.test", "hello");
        msg.attachments.insert("../escape".into(), b"x".to_vec());

        assert!(matches!(
            root.save(&msg).unwrap_err(),
            EchomailError::InvalidPath(_)
        ));
        assert!(!tmp.path().join(msg.group_dir()).join("escape").exists());
    }

    #[test]
    fn test_groups_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let root = MailRoot::open(tmp.path()).unwrap();
        let first = message("alpha", "one");
        let second = message("alpha", "two");
        let other = message("beta", "three");
        for msg in [&first, &second, &other] {
            root.save(msg).unwrap();
        }
        fs::create_dir_all(tmp.path().join("empty.group")).unwrap();
        fs::create_dir_all(tmp.path().join("not-a-group")).unwrap();

        let groups = root.groups().unwrap();
        assert_eq!(groups.len(), 2);
        let alpha = groups.iter().find(|g| g.name == "alpha").unwrap();
        assert_eq!(alpha.dir, first.group_dir());
        assert!(groups.windows(2).all(|w| w[0].dir < w[1].dir));

        let loaded = root.load_group(&alpha.dir).unwrap();
        assert_eq!(loaded.len(), 2);
        let mut ids: Vec<&str> = loaded.iter().map(|m| m.msg_id.as_str()).collect();
        ids.sort();
        let mut expected = vec![first.msg_id.as_str(), second.msg_id.as_str()];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_load_skips_broken_messages() {
        let tmp = tempfile::tempdir().unwrap();
        let root = MailRoot::open(tmp.path()).unwrap();
        let msg = message("alpha", "ok");
        root.save(&msg).unwrap();

        let broken = tmp.path().join(msg.group_dir()).join("broken");
        fs::create_dir_all(&broken).unwrap();
        fs::write(broken.join(MESSAGE_FILE), "no header").unwrap();

        let loaded = root.load_group(&msg.group_dir()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].msg_id, msg.msg_id);
    }
}
