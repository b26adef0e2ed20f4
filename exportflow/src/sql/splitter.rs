//! Lexical statement splitting for batch SQL scripts.
//!
//! This is not a SQL parser. A `--` anywhere on a line starts a comment, even
//! inside a string literal, and a statement ends at a line whose last
//! non-whitespace character is `;`.

use serde::{Deserialize, Serialize};

/// Marker that starts a comment running to the end of the line.
pub const COMMENT_MARKER: &str = "--";

/// Character that closes a statement when it ends a line.
pub const STATEMENT_TERMINATOR: char = ';';

/// One executable unit of a split script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    /// 1-based position in the script.
    pub index: usize,
    /// The statement text, comments removed and trimmed.
    pub text: String,
}

impl Statement {
    /// Creates a new statement.
    #[must_use]
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }

    /// Returns at most `max_chars` characters of the statement, for logging.
    #[must_use]
    pub fn preview(&self, max_chars: usize) -> String {
        self.text.chars().take(max_chars).collect()
    }
}

/// Splits script text into ordered statements.
///
/// Blank and comment-only lines are dropped; a trailing statement without a
/// terminator is still returned.
///
/// # Examples
///
/// ```
/// use exportflow::sql::split;
///
/// let statements = split("-- mark\nALTER TABLE t UPDATE x = 1 WHERE 1;\nSELECT 1");
/// assert_eq!(statements.len(), 2);
/// assert_eq!(statements[1].text, "SELECT 1");
/// ```
#[must_use]
pub fn split(text: &str) -> Vec<Statement> {
    let mut statements = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for raw_line in text.lines() {
        let line = strip_comment(raw_line);
        if line.trim().is_empty() {
            continue;
        }

        current.push(line);

        if line.trim_end().ends_with(STATEMENT_TERMINATOR) {
            push_statement(&mut statements, &current);
            current.clear();
        }
    }

    if !current.is_empty() {
        push_statement(&mut statements, &current);
    }

    statements
}

fn strip_comment(line: &str) -> &str {
    match line.find(COMMENT_MARKER) {
        Some(pos) => &line[..pos],
        None => line,
    }
}

fn push_statement(statements: &mut Vec<Statement>, lines: &[&str]) {
    let joined = lines.join("\n");
    let text = joined.trim();
    if !text.is_empty() {
        statements.push(Statement::new(statements.len() + 1, text));
    }
}
