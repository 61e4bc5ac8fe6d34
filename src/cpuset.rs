//! Compact cpuset parsing.
//!
//! Expands cpuset strings such as `"0,2-4,7"` (the format used by
//! `/sys/devices/system/cpu/online` and by pool definitions) into the
//! individual CPU ids they cover.

use thiserror::Error;

/// Errors produced while expanding a cpuset string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CpusetError {
    #[error("empty token at position {position} in cpuset '{cpuset}'")]
    EmptyToken { cpuset: String, position: usize },

    #[error("invalid CPU id '{token}' in cpuset '{cpuset}'")]
    InvalidNumber { cpuset: String, token: String },

    #[error("reversed range '{token}' in cpuset '{cpuset}' (low > high)")]
    ReversedRange { cpuset: String, token: String },
}

/// Expands a cpuset into CPU ids rendered as decimal strings.
///
/// Order is preserved and duplicates are kept, e.g.
/// `expand("0,2-4,7")` yields `["0", "2", "3", "4", "7"]`.
pub fn expand(cpuset: &str) -> Result<Vec<String>, CpusetError> {
    Ok(parse_cpu_ids(cpuset)?
        .into_iter()
        .map(|id| id.to_string())
        .collect())
}

/// Expands a cpuset into numeric CPU ids.
///
/// An empty or all-whitespace cpuset yields an empty list. Every other
/// malformed input is an error; nothing degrades to CPU 0.
pub fn parse_cpu_ids(cpuset: &str) -> Result<Vec<usize>, CpusetError> {
    if cpuset.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut ids = Vec::new();
    for (position, raw) in cpuset.split(',').enumerate() {
        let token = raw.trim();
        if token.is_empty() {
            return Err(CpusetError::EmptyToken {
                cpuset: cpuset.to_string(),
                position,
            });
        }

        match token.split_once('-') {
            Some((low, high)) => {
                let low = parse_id(cpuset, token, low)?;
                let high = parse_id(cpuset, token, high)?;
                if low > high {
                    return Err(CpusetError::ReversedRange {
                        cpuset: cpuset.to_string(),
                        token: token.to_string(),
                    });
                }
                ids.extend(low..=high);
            }
            None => ids.push(parse_id(cpuset, token, token)?),
        }
    }

    Ok(ids)
}

fn parse_id(cpuset: &str, token: &str, value: &str) -> Result<usize, CpusetError> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| CpusetError::InvalidNumber {
            cpuset: cpuset.to_string(),
            token: token.to_string(),
        })
}
