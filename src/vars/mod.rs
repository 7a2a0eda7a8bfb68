//! Build-variable resolution for user-supplied strings
//!
//! Image references, container names, volume paths, and config-item values
//! may reference build variables as `$VAR` or `${VAR}`. The variable map is
//! supplied by the build-runner collaborator.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static VAR_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$(\w+)|\$\{([^}]+)\}").expect("variable regex"));

/// Resolve `$VAR` and `${VAR}` occurrences against the variable map.
///
/// Unresolved variables are normalized to their `${VAR}` form and left in
/// place rather than dropped, so a missing variable stays visible in the
/// assembled command line.
pub fn resolve(vars: &HashMap<String, String>, s: &str) -> String {
    VAR_REGEX
        .replace_all(s, |caps: &Captures<'_>| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            match vars.get(name) {
                Some(value) => value.clone(),
                None => format!("${{{name}}}"),
            }
        })
        .into_owned()
}

/// Whether the string contains any `$VAR` or `${VAR}` that could resolve.
pub fn has_variables(s: &str) -> bool {
    VAR_REGEX.is_match(s)
}
