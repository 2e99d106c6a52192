/// Integration tests for the interactive prediction loop
///
/// Drives the full startup flow with scripted console input and checks the
/// console protocol a user sees.

mod common;

use common::{alice_and_bob, scratch_config};
use fixer_predictor::{
    app,
    predictor::{InteractiveSession, SessionStats},
    IssuePredictor, IssueQuery, PredictionEngine, Result,
};
use std::io::Cursor;
use tempfile::TempDir;

fn run_script(script: &str) -> (String, SessionStats) {
    run_bytes(script.as_bytes())
}

fn run_bytes(script: &[u8]) -> (String, SessionStats) {
    let dir = TempDir::new().unwrap();
    let config = scratch_config(&dir, &alice_and_bob());

    let mut output = Vec::new();
    let stats = app::run(&config, Cursor::new(script), &mut output).unwrap();
    (String::from_utf8(output).unwrap(), stats)
}

fn prediction_lines(output: &str) -> Vec<&str> {
    output
        .lines()
        .filter(|line| line.starts_with("Prediction: "))
        .collect()
}

#[test]
fn test_one_query_then_exit() {
    let (output, stats) = run_script("Login broken\nCannot log in\n\n");

    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines[0], "Title (or enter to exit):");
    assert_eq!(lines[1], "Description:");
    assert!(lines[2].starts_with("Prediction: Alice ("));
    assert!(lines[3].starts_with("Prediction: Bob ("));
    assert_eq!(lines[4], "Title (or enter to exit):");
    assert_eq!(lines.len(), 5);
    assert_eq!(stats.queries, 1);
}

#[test]
fn test_scores_are_descending_and_unique() {
    let (output, _) = run_script("Export slow\nreport export\nLogin\n\n\n");

    let lines = prediction_lines(&output);
    assert_eq!(lines.len(), 4);

    for query in lines.chunks(2) {
        let parsed: Vec<(&str, f32)> = query
            .iter()
            .map(|line| {
                let rest = line.trim_start_matches("Prediction: ");
                let (label, score) = rest.rsplit_once(" (").unwrap();
                (label, score.trim_end_matches(')').parse().unwrap())
            })
            .collect();
        assert_ne!(parsed[0].0, parsed[1].0);
        assert!(parsed[0].1 >= parsed[1].1);
    }
}

#[test]
fn test_whitespace_title_exits_immediately() {
    let (output, stats) = run_script("   \n");
    assert_eq!(output, "Title (or enter to exit):\n");
    assert_eq!(stats, SessionStats::default());
}

#[test]
fn test_long_title_gets_predictions() {
    let script = format!("{} login broken\ncannot log in\n\n", "a".repeat(501));
    let (output, stats) = run_script(&script);

    assert!(!output.contains("Prediction failed"));
    assert_eq!(prediction_lines(&output).len(), 2);
    assert_eq!(stats.queries, 1);
    assert_eq!(stats.failures, 0);
}

#[test]
fn test_non_utf8_title_does_not_end_session() {
    let (output, stats) = run_bytes(b"caf\xE9 login\nbroken\nLogin broken\nCannot log in\n\n");

    assert_eq!(stats.queries, 2);
    assert_eq!(stats.failures, 0);
    assert_eq!(prediction_lines(&output).len(), 4);
    assert!(output.ends_with("Title (or enter to exit):\n"));
}

struct CountingPredictor<'a> {
    inner: &'a PredictionEngine,
    calls: std::cell::Cell<usize>,
}

impl IssuePredictor for CountingPredictor<'_> {
    fn predict(&self, query: &IssueQuery) -> Result<fixer_predictor::IssuePrediction> {
        self.calls.set(self.calls.get() + 1);
        self.inner.predict(query)
    }
}

#[test]
fn test_top_k_limits_lines() {
    let dir = TempDir::new().unwrap();
    let config = scratch_config(&dir, &alice_and_bob());
    let engine = PredictionEngine::new(app::prepare_model(&config).unwrap());
    let predictor = CountingPredictor {
        inner: &engine,
        calls: std::cell::Cell::new(0),
    };

    let mut output = Vec::new();
    InteractiveSession::new(&predictor, Cursor::new("Login\n\n\n"), &mut output, 1)
        .run()
        .unwrap();

    let output = String::from_utf8(output).unwrap();
    assert_eq!(prediction_lines(&output).len(), 1);
    assert_eq!(predictor.calls.get(), 1);
}
