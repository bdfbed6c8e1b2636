//! Configuration validation engine.
//!
//! Checks a TOML, YAML or JSON config file against the known schema. Unknown
//! keys get a spelling suggestion and a few values get semantic checks.

use std::path::Path;

use crate::schema::TocsinConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "security", "value", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "server.bnd"
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration file.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<std::path::PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

/// Known sections and their keys.
const SCHEMA: &[(&str, &[&str])] = &[
    ("server", &["bind", "port"]),
    ("storage", &["backend", "database_url", "data_dir"]),
    ("executor", &["timeout_secs", "user_agent"]),
    ("scheduler", &[
        "catch_up",
        "idle_poll_secs",
        "shutdown_grace_secs",
    ]),
];

// ── Levenshtein distance ────────────────────────────────────────────────────

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_len = b.chars().count();
    if a.is_empty() {
        return b_len;
    }
    if b_len == 0 {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_len]
}

/// Find the best match for `needle` among `candidates` using Levenshtein
/// distance. Returns `Some(best)` if the distance is <= `max_distance`.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    let mut best: Option<(&'a str, usize)> = None;
    for &candidate in candidates {
        let d = levenshtein(needle, candidate);
        if d > 0 && d <= max_distance && best.as_ref().is_none_or(|(_, bd)| d < *bd) {
            best = Some((candidate, d));
        }
    }
    best.map(|(s, _)| s)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate a config file at the given path, or discover the default config
/// file location if `path` is `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => crate::loader::find_config_file(),
    };

    let Some(ref actual_path) = config_path else {
        return ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Info,
                category: "file-ref",
                path: String::new(),
                message: "no config file found; using defaults".into(),
            }],
            config_path: None,
        };
    };

    match std::fs::read_to_string(actual_path) {
        Ok(content) => {
            let content = crate::env_subst::substitute_env(&content);
            let ext = actual_path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("toml");
            let mut result = match ext {
                "yaml" | "yml" => validate_parsed(serde_yaml::from_str(&content), "YAML"),
                "json" => validate_parsed(serde_json::from_str(&content), "JSON"),
                _ => validate_toml_str(&content),
            };
            result.config_path = Some(actual_path.clone());
            result
        },
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: format!("failed to read config file: {e}"),
            }],
            config_path: Some(actual_path.clone()),
        },
    }
}

/// Validate a TOML string without file-system side effects.
#[must_use]
pub fn validate_toml_str(toml_str: &str) -> ValidationResult {
    validate_parsed(toml::from_str(toml_str), "TOML")
}

/// YAML and JSON documents are read into a `toml::Value` so every format goes
/// through the same checks.
fn validate_parsed<E: std::fmt::Display>(
    parsed: Result<toml::Value, E>,
    format: &str,
) -> ValidationResult {
    let mut diagnostics = Vec::new();

    // 1. Syntax
    let value = match parsed {
        Ok(v) => v,
        Err(e) => {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: format!("{format} syntax error: {e}"),
            });
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    // 2. Unknown fields
    check_unknown_fields(&value, &mut diagnostics);

    // 3. Types, then semantics when the config parses
    match value.try_into::<TocsinConfig>() {
        Ok(config) => check_semantic_warnings(&config, &mut diagnostics),
        Err(e) => diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "type-error",
            path: String::new(),
            message: format!("type error: {e}"),
        }),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn check_unknown_fields(value: &toml::Value, diagnostics: &mut Vec<Diagnostic>) {
    let Some(root) = value.as_table() else {
        return;
    };
    let sections: Vec<&str> = SCHEMA.iter().map(|(name, _)| *name).collect();

    for (key, child) in root {
        let Some((_, fields)) = SCHEMA.iter().find(|(name, _)| name == key) else {
            diagnostics.push(unknown_field(key.clone(), key, &sections));
            continue;
        };
        let Some(table) = child.as_table() else {
            continue;
        };
        for field in table.keys() {
            if !fields.contains(&field.as_str()) {
                diagnostics.push(unknown_field(format!("{key}.{field}"), field, fields));
            }
        }
    }
}

fn unknown_field(path: String, key: &str, candidates: &[&str]) -> Diagnostic {
    let message = match suggest(key, candidates, 3) {
        Some(s) => format!("unknown field \"{key}\" (did you mean \"{s}\"?)"),
        None => format!("unknown field \"{key}\""),
    };
    Diagnostic {
        severity: Severity::Warning,
        category: "unknown-field",
        path,
        message,
    }
}

fn check_semantic_warnings(config: &TocsinConfig, diagnostics: &mut Vec<Diagnostic>) {
    if config.executor.timeout_secs == 0 {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "value",
            path: "executor.timeout_secs".into(),
            message: "timeout must be greater than zero".into(),
        });
    }

    if config.scheduler.idle_poll_secs == 0 {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "value",
            path: "scheduler.idle_poll_secs".into(),
            message: "idle poll interval must be greater than zero".into(),
        });
    }

    let bind = config.server.bind.as_str();
    if !matches!(bind, "127.0.0.1" | "::1" | "localhost") {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            category: "security",
            path: "server.bind".into(),
            message: format!(
                "binding to {bind}: the jobs API has no authentication and lets callers \
                 schedule requests to arbitrary URLs"
            ),
        });
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_is_clean() {
        let result = validate_toml_str("");
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn syntax_error() {
        let result = validate_toml_str("[server\nport = 1");
        assert!(result.has_errors());
        assert_eq!(result.diagnostics[0].category, "syntax");
    }

    #[test]
    fn misspelled_field_gets_suggestion() {
        let result = validate_toml_str("[server]\nbnd = \"127.0.0.1\"\n");
        let diag = result
            .diagnostics
            .iter()
            .find(|d| d.category == "unknown-field")
            .unwrap();
        assert_eq!(diag.path, "server.bnd");
        assert!(diag.message.contains("did you mean \"bind\""));
    }

    #[test]
    fn unknown_section() {
        let result = validate_toml_str("[schedular]\ncatch_up = \"reject\"\n");
        let diag = &result.diagnostics[0];
        assert_eq!(diag.path, "schedular");
        assert!(diag.message.contains("scheduler"));
    }

    #[test]
    fn type_error() {
        let result = validate_toml_str("[server]\nport = \"eighty\"\n");
        assert!(result.has_errors());
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.category == "type-error")
        );
    }

    #[test]
    fn zero_timeout_is_error() {
        let result = validate_toml_str("[executor]\ntimeout_secs = 0\n");
        assert_eq!(result.count(Severity::Error), 1);
    }

    #[test]
    fn public_bind_warns() {
        let result = validate_toml_str("[server]\nbind = \"0.0.0.0\"\n");
        assert!(!result.has_errors());
        assert_eq!(result.count(Severity::Warning), 1);
        assert_eq!(result.diagnostics[0].category, "security");
    }

    #[test]
    fn yaml_file_is_validated() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tocsin.yaml");
        std::fs::write(&path, "server:\n  prot: 9000\nexecutor:\n  timeout_secs: 0\n").unwrap();

        let result = validate(Some(&path));
        assert_eq!(result.config_path.as_deref(), Some(path.as_path()));
        assert_eq!(result.count(Severity::Error), 1);
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.path == "server.prot" && d.message.contains("\"port\""))
        );
    }

    #[test]
    fn json_syntax_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tocsin.json");
        std::fs::write(&path, "{ \"server\": ").unwrap();

        let result = validate(Some(&path));
        assert!(result.has_errors());
        assert!(result.diagnostics[0].message.starts_with("JSON syntax error"));
    }

    #[test]
    fn missing_file_is_error() {
        let result = validate(Some(Path::new("/nonexistent/tocsin.toml")));
        assert!(result.has_errors());
    }

    #[test]
    fn levenshtein_distances() {
        assert_eq!(levenshtein("bind", "bnd"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }
}
