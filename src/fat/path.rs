//! Path splitting and normalization

use crate::error::Result;
use crate::fat::names::long_name;

/// Split `path` into validated long-name steps from the root.
///
/// `.` and empty segments are dropped and `..` pops the previous step
/// (staying at the root when there is none). Backslashes count as
/// separators.
pub fn absolute_steps(path: &str) -> Result<Vec<String>> {
    let normalized = path.replace('\\', "/");
    let mut steps: Vec<String> = Vec::new();
    for segment in normalized.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                steps.pop();
            }
            name => steps.push(long_name(name)?),
        }
    }
    log::debug!("Path {:?} resolved to steps {:?}", path, steps);
    Ok(steps)
}
