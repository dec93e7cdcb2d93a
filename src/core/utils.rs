use std::path::MAIN_SEPARATOR;

use crate::DirectoryError;
use crate::core::Result;

/// Splits a relative path into entry names.
///
/// `/` and the host separator separate segments; on Unix `\` is an ordinary name
/// character. Empty and `.` segments are dropped, so trailing and doubled separators are
/// harmless. `..` is rejected: a path never leaves the directory it is resolved from.
pub fn segments(path: &str) -> Result<Vec<&str>> {
    let mut result = Vec::new();
    for segment in path.split(['/', MAIN_SEPARATOR]) {
        match segment {
            "" | "." => {}
            ".." => {
                return Err(DirectoryError::InvalidPath(format!(
                    "'{path}' escapes its directory"
                )));
            }
            _ => result.push(segment),
        }
    }
    Ok(result)
}

/// Splits a relative path into its parent segments and the final entry name.
pub fn split_parent(path: &str) -> Result<(Vec<&str>, &str)> {
    let mut parts = segments(path)?;
    match parts.pop() {
        Some(name) => Ok((parts, name)),
        None => Err(DirectoryError::InvalidPath("empty".into())),
    }
}

/// Joins a relative directory path and an entry name with `/`.
pub fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}
