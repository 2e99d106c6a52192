use crate::error::Result;
use crate::models::IssueQuery;
use crate::predictor::IssuePredictor;
use std::io::{BufRead, Write};
use tracing::{debug, info, warn};

pub const TITLE_PROMPT: &str = "Title (or enter to exit):";
pub const DESCRIPTION_PROMPT: &str = "Description:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingTitle,
    Done,
}

/// Counters for a finished session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub queries: usize,
    pub failures: usize,
}

/// Line-oriented prompt loop that prints ranked fixers per issue
pub struct InteractiveSession<'a, R, W> {
    predictor: &'a dyn IssuePredictor,
    input: R,
    output: W,
    top_k: usize,
    state: SessionState,
    stats: SessionStats,
}

impl<'a, R: BufRead, W: Write> InteractiveSession<'a, R, W> {
    pub fn new(predictor: &'a dyn IssuePredictor, input: R, output: W, top_k: usize) -> Self {
        Self {
            predictor,
            input,
            output,
            top_k,
            state: SessionState::AwaitingTitle,
            stats: SessionStats::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Prompt until an empty title or end of input.
    ///
    /// Console read and write failures end the session with an error; a failed
    /// prediction is reported on the console and the loop goes on.
    pub fn run(mut self) -> Result<SessionStats> {
        while self.state == SessionState::AwaitingTitle {
            self.step()?;
        }
        info!(
            queries = self.stats.queries,
            failures = self.stats.failures,
            "Interactive session finished"
        );
        Ok(self.stats)
    }

    fn step(&mut self) -> Result<()> {
        writeln!(self.output, "{}", TITLE_PROMPT)?;
        self.output.flush()?;

        let title = match self.read_line()? {
            Some(line) if !line.trim().is_empty() => line,
            _ => {
                self.state = SessionState::Done;
                return Ok(());
            }
        };

        writeln!(self.output, "{}", DESCRIPTION_PROMPT)?;
        self.output.flush()?;
        let description = self.read_line()?.unwrap_or_default();

        self.stats.queries += 1;
        let query = IssueQuery::new(title, description);
        match self.predictor.predict(&query) {
            Ok(prediction) => {
                for candidate in prediction.top(self.top_k) {
                    writeln!(
                        self.output,
                        "Prediction: {} ({})",
                        candidate.label, candidate.score
                    )?;
                }
                debug!(predicted = %prediction.predicted_label, "Query answered");
            }
            Err(e) => {
                self.stats.failures += 1;
                warn!(error = %e, code = e.error_code(), "Prediction failed");
                writeln!(self.output, "Prediction failed: {}", e)?;
            }
        }
        self.output.flush()?;

        Ok(())
    }

    /// Next line without its terminator, `None` at end of input
    ///
    /// Bytes that are not valid UTF-8 are replaced rather than rejected.
    fn read_line(&mut self) -> Result<Option<String>> {
        let mut buf = Vec::new();
        if self.input.read_until(b'\n', &mut buf)? == 0 {
            return Ok(None);
        }
        let mut line = String::from_utf8_lossy(&buf).into_owned();
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::IssuePrediction;
    use std::cell::Cell;
    use std::io::Cursor;

    struct FixedPredictor {
        calls: Cell<usize>,
    }

    impl IssuePredictor for FixedPredictor {
        fn predict(&self, query: &IssueQuery) -> Result<IssuePrediction> {
            self.calls.set(self.calls.get() + 1);
            if query.title == "boom" {
                return Err(AppError::Inference("model exploded".to_string()));
            }
            Ok(IssuePrediction::ranked(
                "Alice".to_string(),
                &[
                    "Bob".to_string(),
                    "Alice".to_string(),
                    "Carol".to_string(),
                    "Dan".to_string(),
                ],
                &[0.2, 0.5, 0.2, 0.1],
            ))
        }
    }

    fn run(input: &str, top_k: usize) -> (String, SessionStats, usize) {
        let predictor = FixedPredictor {
            calls: Cell::new(0),
        };
        let mut output = Vec::new();
        let stats = InteractiveSession::new(&predictor, Cursor::new(input), &mut output, top_k)
            .run()
            .unwrap();
        (String::from_utf8(output).unwrap(), stats, predictor.calls.get())
    }

    #[test]
    fn test_empty_title_ends_without_inference() {
        let (output, stats, calls) = run("\n", 3);
        assert_eq!(output, "Title (or enter to exit):\n");
        assert_eq!(stats.queries, 0);
        assert_eq!(calls, 0);

        let (_, _, calls) = run("   \t\nignored\n", 3);
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_end_of_input_ends_session() {
        let (output, _, calls) = run("", 3);
        assert_eq!(output, "Title (or enter to exit):\n");
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_prints_top_k_ranked() {
        let (output, stats, _) = run("Login broken\nCannot log in\n\n", 3);
        let expected = "Title (or enter to exit):\n\
                        Description:\n\
                        Prediction: Alice (0.5)\n\
                        Prediction: Bob (0.2)\n\
                        Prediction: Carol (0.2)\n\
                        Title (or enter to exit):\n";
        assert_eq!(output, expected);
        assert_eq!(stats.queries, 1);
    }

    #[test]
    fn test_failure_keeps_loop_running() {
        let (output, stats, calls) = run("boom\n\nLogin\r\n\r\n\n", 1);
        assert!(output.contains("Prediction failed: Inference error: model exploded\n"));
        assert!(output.contains("Prediction: Alice (0.5)\n"));
        assert_eq!(calls, 2);
        assert_eq!(
            stats,
            SessionStats {
                queries: 2,
                failures: 1
            }
        );
    }

    #[test]
    fn test_invalid_utf8_line_is_still_served() {
        let predictor = FixedPredictor {
            calls: Cell::new(0),
        };
        let script: &[u8] = b"caf\xE9 login\nbroken\nLogin broken\nCannot log in\n\n";
        let mut output = Vec::new();
        let stats = InteractiveSession::new(&predictor, Cursor::new(script), &mut output, 1)
            .run()
            .unwrap();

        assert_eq!(predictor.calls.get(), 2);
        assert_eq!(stats.failures, 0);
        let output = String::from_utf8(output).unwrap();
        assert_eq!(output.matches("Prediction: Alice (0.5)\n").count(), 2);
    }

    #[test]
    fn test_missing_description_at_end_of_input() {
        let (output, stats, calls) = run("Login broken", 2);
        assert_eq!(calls, 1);
        assert_eq!(stats.queries, 1);
        assert!(output.ends_with("Title (or enter to exit):\n"));
    }
}
