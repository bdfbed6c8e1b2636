use std::path::Path;

use {
    anyhow::Result,
    clap::Subcommand,
    tocsin_config::validate::{self, Diagnostic, Severity},
};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors/warnings.
    Check {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
    /// Print the effective configuration (file, env overrides and defaults).
    Show,
}

pub fn handle_config(action: &ConfigAction, path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Check { verbose } => check(path, *verbose),
        ConfigAction::Show => show(path),
    }
}

const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn check(path: Option<&Path>, verbose: bool) -> Result<()> {
    let result = validate::validate(path);

    match &result.config_path {
        Some(path) => eprintln!("Checking {}\n", path.display()),
        None => eprintln!("No config file found; checking defaults.\n"),
    }

    let mut shown = 0;
    for d in &result.diagnostics {
        if d.severity == Severity::Info && !verbose {
            continue;
        }
        eprintln!("  {}", format_diagnostic(d));
        shown += 1;
    }
    if shown > 0 {
        eprintln!();
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);
    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if result.has_errors() {
        std::process::exit(1);
    }
    Ok(())
}

fn format_diagnostic(d: &Diagnostic) -> String {
    let (color, label) = match d.severity {
        Severity::Error => (RED, "error"),
        Severity::Warning => (YELLOW, "warning"),
        Severity::Info => (CYAN, "info"),
    };
    let location = if d.path.is_empty() {
        String::new()
    } else {
        format!("{}: ", d.path)
    };
    format!("{BOLD}{color}{label}{RESET} [{}] {location}{}", d.category, d.message)
}

fn show(path: Option<&Path>) -> Result<()> {
    let mut config = match path {
        Some(path) => tocsin_config::load_config(path)?,
        None => tocsin_config::discover_and_load(),
    };
    tocsin_config::apply_env_overrides(&mut config);
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_line_includes_path_and_category() {
        let d = Diagnostic {
            severity: Severity::Warning,
            category: "unknown-field",
            path: "server.prot".into(),
            message: "unknown field \"prot\"".into(),
        };
        let line = format_diagnostic(&d);
        assert!(line.starts_with(&format!("{BOLD}{YELLOW}warning{RESET}")));
        assert!(line.ends_with("[unknown-field] server.prot: unknown field \"prot\""));
    }

    #[test]
    fn diagnostic_line_without_path() {
        let d = Diagnostic {
            severity: Severity::Error,
            category: "syntax",
            path: String::new(),
            message: "TOML syntax error".into(),
        };
        assert!(format_diagnostic(&d).ends_with("[syntax] TOML syntax error"));
    }
}
