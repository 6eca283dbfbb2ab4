//! Attachment filename hygiene.
//!
//! An attachment name travels from an untrusted peer straight into a path
//! join, so only names that are already a single portable file name pass.

/// Longest accepted file name, in bytes.
pub const MAX_FILENAME_LEN: usize = 255;

const FORBIDDEN: &[char] = &['/', '\\', '<', '>', ':', '"', '|', '?', '*'];

const RESERVED: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Check whether `name` can be used verbatim as a file name inside a
/// message directory.
pub fn is_clean_filename(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_FILENAME_LEN {
        return false;
    }
    if name == "." || name == ".." {
        return false;
    }
    if name.chars().any(|c| c.is_control() || FORBIDDEN.contains(&c)) {
        return false;
    }
    if name.starts_with(char::is_whitespace)
        || name.ends_with(char::is_whitespace)
        || name.ends_with('.')
    {
        return false;
    }

    let stem = name.split('.').next().unwrap_or(name);
    !RESERVED.iter().any(|r| r.eq_ignore_ascii_case(stem))
}
