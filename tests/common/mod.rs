//! Common test utilities for the fixer predictor
//!
//! Shared issue fixtures and scratch-directory helpers used by the
//! integration tests.

#![allow(dead_code)]

use fixer_predictor::config::Config;
use fixer_predictor::loader::write_issues;
use fixer_predictor::Issue;
use std::fs::File;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Build an issue with a derived e-mail address
pub fn issue(title: &str, description: &str, fixer: &str) -> Issue {
    Issue {
        title: title.to_string(),
        description: description.to_string(),
        status: "Closed".to_string(),
        fixer_name: fixer.to_string(),
        fixer_email: format!("{}@example.com", fixer.to_lowercase()),
    }
}

/// Two clearly separated fixers
pub fn alice_and_bob() -> Vec<Issue> {
    vec![
        issue("Login broken", "Cannot log in", "Alice"),
        issue("Password reset fails", "Reset email never arrives", "Alice"),
        issue("Session expires", "Users are logged out after login", "Alice"),
        issue("Export slow", "CSV export takes minutes", "Bob"),
        issue("Report export timeout", "Large export never finishes", "Bob"),
        issue("Export missing columns", "Exported report lacks totals", "Bob"),
    ]
}

/// Write issues as CSV into `dir` and return the path
pub fn write_csv(dir: &Path, name: &str, issues: &[Issue]) -> PathBuf {
    let path = dir.join(name);
    let file = File::create(&path).expect("create csv");
    write_issues(file, issues, b',').expect("write csv");
    path
}

/// Default configuration pointed at scratch files inside `dir`
pub fn scratch_config(dir: &TempDir, issues: &[Issue]) -> Config {
    let mut config = Config::default();
    config.data.issues_path = write_csv(dir.path(), "issues.csv", issues);
    config.model.path = dir.path().join("dd.ml");
    config
}
