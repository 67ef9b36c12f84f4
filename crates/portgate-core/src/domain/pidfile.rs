//! Text format of the single-instance pid file.
//!
//! The file holds the decimal process id of the lock holder followed by a
//! newline.  Older writers also appended a NUL byte, so the parser tolerates
//! one.  The content is diagnostic only: whether a server is running is
//! decided by the lock on the file, never by what the file says.

use thiserror::Error;

/// Reasons the pid-file content could not be interpreted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PidParseError {
    /// The file is empty or contains only whitespace.
    #[error("pid file is empty")]
    Empty,

    /// The first token is not a decimal number.
    #[error("pid file does not start with a decimal pid: {0:?}")]
    NotANumber(String),

    /// Process id 0 is never a valid lock holder.
    #[error("pid file contains pid 0")]
    Zero,
}

/// Formats `pid` as it is written to the pid file.
pub fn format_pid_line(pid: u32) -> String {
    format!("{pid}\n")
}

/// Parses the leading decimal pid from pid-file content.
///
/// Leading whitespace is skipped; anything after the first token is ignored.
///
/// # Errors
///
/// Returns [`PidParseError`] when the content is empty, the first token is not
/// a number, or the number is 0.
pub fn parse_pid(content: &str) -> Result<u32, PidParseError> {
    let token = content
        .trim_matches(|c: char| c.is_whitespace() || c == '\0')
        .split(|c: char| c.is_whitespace() || c == '\0')
        .next()
        .unwrap_or("");

    if token.is_empty() {
        return Err(PidParseError::Empty);
    }

    let pid: u32 = token
        .parse()
        .map_err(|_| PidParseError::NotANumber(token.to_string()))?;

    if pid == 0 {
        return Err(PidParseError::Zero);
    }
    Ok(pid)
}
