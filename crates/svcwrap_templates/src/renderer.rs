//! Token substitution for filename patterns and configuration text.

use std::collections::HashMap;

use regex::Regex;
use tracing::debug;

/// Renders `$token` filename patterns and `{{VAR}}` / `{{VAR=default}}`
/// configuration references.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    token_pattern: Regex,
    variable_pattern: Regex,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self {
            // Match $parameterid tokens
            token_pattern: Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("valid token regex"),
            // Match {{VAR}} and {{VAR=default}}
            variable_pattern: Regex::new(r"\{\{([A-Za-z_][A-Za-z0-9_]*)(?:=([^}]*))?\}\}")
                .expect("valid variable regex"),
        }
    }

    /// Identifiers referenced as `$token` in a pattern, in order.
    pub fn tokens<'a>(&self, pattern: &'a str) -> Vec<&'a str> {
        self.token_pattern
            .captures_iter(pattern)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
            .collect()
    }

    /// Replace every `$token` with the value returned by `lookup`.
    /// Tokens without a value resolve to the empty string.
    pub fn render_tokens<F>(&self, pattern: &str, lookup: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        self.token_pattern
            .replace_all(pattern, |caps: &regex::Captures| {
                let token = &caps[1];
                lookup(token).unwrap_or_else(|| {
                    debug!("Token ${} has no value, rendering empty", token);
                    String::new()
                })
            })
            .to_string()
    }

    /// Substitute `{{VAR}}` references. Returns the rendered text or the
    /// names of references that had neither a value nor a default.
    pub fn render_variables(
        &self,
        content: &str,
        variables: &HashMap<String, String>,
    ) -> Result<String, Vec<String>> {
        let mut missing = Vec::new();
        let rendered = self
            .variable_pattern
            .replace_all(content, |caps: &regex::Captures| {
                let name = &caps[1];
                match (variables.get(name), caps.get(2)) {
                    (Some(value), _) => value.clone(),
                    (None, Some(default)) => default.as_str().to_string(),
                    (None, None) => {
                        missing.push(name.to_string());
                        String::new()
                    }
                }
            })
            .to_string();

        if missing.is_empty() {
            Ok(rendered)
        } else {
            Err(missing)
        }
    }
}

/// Insert a sequence number before the final extension:
/// `out.txt` with 2 becomes `out.2.txt`. Callers skip index 0.
pub fn insert_sequence(filename: &str, seq: usize) -> String {
    match filename.rfind('.') {
        Some(pos) if pos > 0 => format!("{}.{}{}", &filename[..pos], seq, &filename[pos..]),
        _ => format!("{}.{}", filename, seq),
    }
}

/// Append `extension` unless the filename already carries it.
pub fn ensure_extension(filename: &str, extension: Option<&str>) -> String {
    match extension {
        Some(ext) if !ext.is_empty() => {
            let ext = ext.trim_start_matches('.');
            if filename.ends_with(&format!(".{}", ext)) {
                filename.to_string()
            } else {
                format!("{}.{}", filename, ext)
            }
        }
        _ => filename.to_string(),
    }
}

/// Strip the final extension from a filename.
pub fn strip_extension(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(pos) if pos > 0 => &filename[..pos],
        _ => filename,
    }
}
