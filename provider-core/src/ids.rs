//! Composite identifier encoding.
//!
//! Objects without a server-assigned id are identified by joining immutable
//! fields: `"<parent>:<child>"` for attachments and `"<kind>/<name>"`-style
//! paths for keyed objects.

use crate::error::{ProviderError, Result};

pub const PAIR_SEPARATOR: char = ':';
pub const PATH_SEPARATOR: char = '/';

pub fn encode_pair(parent: &str, child: &str) -> String {
    format!("{}{}{}", parent, PAIR_SEPARATOR, child)
}

/// Split `"<parent>:<child>"`. Exactly one separator and two non-empty parts.
pub fn decode_pair(id: &str) -> Result<(String, String)> {
    let parts: Vec<&str> = id.split(PAIR_SEPARATOR).collect();
    match parts.as_slice() {
        [parent, child] if !parent.is_empty() && !child.is_empty() => {
            Ok((parent.to_string(), child.to_string()))
        }
        _ => Err(ProviderError::invalid(format!(
            "unexpected ID format ({:?}), expected \"<parent>{}<child>\"",
            id, PAIR_SEPARATOR
        ))),
    }
}

pub fn encode_path(parts: &[&str]) -> String {
    parts.join(&PATH_SEPARATOR.to_string())
}

/// Split a `/`-joined id whose segment count is one of `allowed`.
///
/// Empty segments are only accepted at positions listed in `may_be_empty`.
pub fn decode_path(id: &str, allowed: &[usize], may_be_empty: &[usize]) -> Result<Vec<String>> {
    let parts: Vec<&str> = id.split(PATH_SEPARATOR).collect();
    let shape_ok = allowed.contains(&parts.len())
        && parts
            .iter()
            .enumerate()
            .all(|(i, p)| !p.is_empty() || may_be_empty.contains(&i));
    if !shape_ok {
        return Err(ProviderError::invalid(format!(
            "unexpected ID format ({:?}), expected {:?} segments separated by {:?}",
            id, allowed, PATH_SEPARATOR
        )));
    }
    Ok(parts.into_iter().map(str::to_string).collect())
}
