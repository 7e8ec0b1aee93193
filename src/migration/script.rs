//! Line-oriented statement splitting and execution
//!
//! A migration file is a sequence of lines. A statement is every non-comment line up to
//! and including the first line ending in `;`. There is no SQL parsing beyond that: a `;`
//! inside a string literal at the end of a line ends the statement.

use crate::executor::SqlExecutor;
use crate::migration::ExecutionError;

/// How a single line contributes to the statement buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line<'a> {
    /// `--` comment, dropped
    Comment,
    /// Nothing but whitespace
    Blank,
    /// Part of a statement that continues on a later line
    Fragment(&'a str),
    /// Last line of a statement
    Terminator(&'a str),
}

/// Classify one line
///
/// Carriage returns are removed and the decision is made on the trimmed text, so an
/// indented `-- comment` is a comment and `SELECT 1;   ` terminates a statement. The text
/// carried by `Fragment`/`Terminator` keeps its indentation.
pub fn classify(raw: &str) -> Line<'_> {
    let line = raw.strip_suffix('\r').unwrap_or(raw);
    let trimmed = line.trim();

    if trimmed.is_empty() {
        Line::Blank
    } else if trimmed.starts_with("--") {
        Line::Comment
    } else if trimmed.ends_with(';') {
        Line::Terminator(line.trim_end())
    } else {
        Line::Fragment(line.trim_end())
    }
}

/// Statement text under construction, threaded through the fold over lines
#[derive(Debug, Default)]
struct Accumulator {
    buffer: String,
    executed: usize,
}

impl Accumulator {
    fn push(&mut self, text: &str) {
        if !self.buffer.is_empty() {
            self.buffer.push('\n');
        }
        self.buffer.push_str(text);
    }

    fn take(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }
}

/// Result of splitting a script without running it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statements {
    /// Complete statements in file order
    pub complete: Vec<String>,
    /// Text after the last terminator that never got its `;`
    pub unterminated: Option<String>,
}

/// Split `content` into statements without executing anything
pub fn split_statements(content: &str) -> Statements {
    let mut acc = Accumulator::default();
    let mut complete = Vec::new();

    for raw in content.split('\n') {
        match classify(raw) {
            Line::Comment | Line::Blank => {}
            Line::Fragment(text) => acc.push(text),
            Line::Terminator(text) => {
                acc.push(text);
                complete.push(acc.take());
            }
        }
    }

    Statements {
        complete,
        unterminated: Some(acc.buffer).filter(|b| !b.is_empty()),
    }
}

/// Execute every statement of `content`, in order, stopping at the first failure
///
/// Each statement is sent on its own and awaited before the next one is built. Nothing is
/// wrapped in a transaction: statements that ran before a failure stay applied.
///
/// Returns the number of statements executed.
///
/// # Errors
///
/// Returns the first `ExecutionError`; the remaining lines are not looked at.
pub fn execute_script(
    executor: &dyn SqlExecutor,
    content: &str,
    debug_sql: bool,
) -> Result<usize, ExecutionError> {
    let acc = content
        .split('\n')
        .try_fold(Accumulator::default(), |mut acc, raw| -> Result<Accumulator, ExecutionError> {
            match classify(raw) {
                Line::Comment | Line::Blank => {}
                Line::Fragment(text) => acc.push(text),
                Line::Terminator(text) => {
                    acc.push(text);
                    let statement = acc.take();
                    if debug_sql {
                        log::info!("{}", statement);
                    }
                    executor
                        .execute(&statement, &[])
                        .map_err(|source| ExecutionError {
                            statement_index: acc.executed,
                            statement,
                            source,
                        })?;
                    acc.executed += 1;
                }
            }
            Ok(acc)
        })?;

    if !acc.buffer.is_empty() {
        log::warn!(
            "ignoring unterminated statement at end of script: {}",
            acc.buffer
        );
    }

    Ok(acc.executed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::RecordingExecutor;

    #[test]
    fn test_classify() {
        assert_eq!(classify(""), Line::Blank);
        assert_eq!(classify("   \t"), Line::Blank);
        assert_eq!(classify("\r"), Line::Blank);
        assert_eq!(classify("-- note"), Line::Comment);
        assert_eq!(classify("    -- indented note"), Line::Comment);
        assert_eq!(classify("SELECT 1;"), Line::Terminator("SELECT 1;"));
        assert_eq!(classify("SELECT 1;  \r"), Line::Terminator("SELECT 1;"));
        assert_eq!(classify("  id INT,"), Line::Fragment("  id INT,"));
    }

    #[test]
    fn test_two_inserts_are_two_statements() {
        let store = RecordingExecutor::new();
        let n = execute_script(
            &store,
            "INSERT INTO t VALUES (1);\nINSERT INTO t VALUES (2);\n",
            false,
        )
        .unwrap();
        assert_eq!(n, 2);
        assert_eq!(
            store.executed(),
            vec!["INSERT INTO t VALUES (1);", "INSERT INTO t VALUES (2);"]
        );
    }

    #[test]
    fn test_comment_issues_no_query() {
        let store = RecordingExecutor::new();
        let n = execute_script(&store, "-- note\nSELECT 1;\n", false).unwrap();
        assert_eq!(n, 1);
        assert_eq!(store.executed(), vec!["SELECT 1;"]);
    }

    #[test]
    fn test_multi_line_statement_keeps_line_breaks() {
        let store = RecordingExecutor::new();
        let script = "CREATE TABLE users (\n  id INT,\n\n  -- display name\n  name TEXT\n);\r\n";
        let n = execute_script(&store, script, false).unwrap();
        assert_eq!(n, 1);
        assert_eq!(
            store.executed(),
            vec!["CREATE TABLE users (\n  id INT,\n  name TEXT\n);"]
        );
    }

    #[test]
    fn test_first_failure_stops_the_script() {
        let store = RecordingExecutor::new();
        store.fail_on("broken", "syntax error at or near \"broken\"");
        let script = "SELECT 1;\nSELECT broken;\nSELECT 3;\n";

        let err = execute_script(&store, script, false).unwrap_err();
        assert_eq!(err.statement_index, 1);
        assert_eq!(err.statement, "SELECT broken;");
        assert!(err.to_string().contains("syntax error"));
        // the failing statement was sent, the one after it never was
        assert_eq!(store.executed(), vec!["SELECT 1;", "SELECT broken;"]);
    }

    #[test]
    fn test_unterminated_tail_is_not_executed() {
        let store = RecordingExecutor::new();
        let n = execute_script(&store, "SELECT 1;\nSELECT 2", false).unwrap();
        assert_eq!(n, 1);
        assert_eq!(store.executed(), vec!["SELECT 1;"]);
    }

    #[test]
    fn test_split_statements_matches_execution() {
        let script = "-- header\nCREATE TABLE a (id INT);\nINSERT INTO a\nVALUES (1);\nDELETE FROM a";
        let statements = split_statements(script);
        assert_eq!(
            statements.complete,
            vec!["CREATE TABLE a (id INT);", "INSERT INTO a\nVALUES (1);"]
        );
        assert_eq!(statements.unterminated.as_deref(), Some("DELETE FROM a"));

        let store = RecordingExecutor::new();
        execute_script(&store, script, false).unwrap();
        assert_eq!(store.executed(), statements.complete);
    }

    #[test]
    fn test_empty_script_executes_nothing() {
        let store = RecordingExecutor::new();
        assert_eq!(execute_script(&store, "", false).unwrap(), 0);
        assert!(split_statements("\n\n-- only comments\n").complete.is_empty());
    }
}
