//! `:name` placeholder substitution for URL templates
//!
//! A placeholder is a path segment that starts with `:` followed by an
//! identifier (`[A-Za-z0-9_]+`). Anything after the identifier stays in place,
//! so `/files/:name.json` works. Only the path is scanned: the query string
//! and the `host:port` authority of an absolute URL are left alone.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{Error, Result};

/// Substitute every placeholder in `template` from `vars`.
///
/// Fails with `Error::Configuration` if a placeholder has no value. Variables
/// that match no placeholder are ignored.
pub fn substitute(template: &str, vars: &BTreeMap<String, String>) -> Result<String> {
    let (path, query) = match template.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (template, None),
    };

    let mut resolved = String::with_capacity(template.len());
    let mut used = 0usize;

    for (i, segment) in path.split('/').enumerate() {
        if i > 0 {
            resolved.push('/');
        }
        let Some(tail) = segment.strip_prefix(':') else {
            resolved.push_str(segment);
            continue;
        };
        let name_len = tail
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(tail.len());
        if name_len == 0 {
            resolved.push_str(segment);
            continue;
        }
        let (name, suffix) = tail.split_at(name_len);
        let value = vars.get(name).ok_or_else(|| {
            Error::Configuration(format!("unresolved path placeholder :{name} in {template}"))
        })?;
        resolved.push_str(value);
        resolved.push_str(suffix);
        used += 1;
    }

    if used < vars.len() {
        debug!(
            template,
            provided = vars.len(),
            used,
            "path variables without a matching placeholder"
        );
    }

    if let Some(q) = query {
        resolved.push('?');
        resolved.push_str(q);
    }
    Ok(resolved)
}
