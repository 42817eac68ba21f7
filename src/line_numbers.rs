//! Line-number prefixes (`"  12 | code"`) and line-ending detection.
//!
//! Listings handed to a model are rendered with [`add_line_numbers`]. Models
//! sometimes echo those prefixes back inside a SEARCH/REPLACE block, so the
//! parser uses [`looks_line_numbered`] and [`strip_line_numbers`] to make them
//! invisible to matching and keep them out of committed output.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// The line terminator style of a text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    /// `\n`
    #[default]
    Lf,
    /// `\r\n`
    CrLf,
}

impl LineEnding {
    /// Detects the style of `text`: CRLF if `\r\n` occurs anywhere, LF otherwise.
    ///
    /// # Example
    ///
    /// ```
    /// # use srpatch::LineEnding;
    /// assert_eq!(LineEnding::detect("a\r\nb"), LineEnding::CrLf);
    /// assert_eq!(LineEnding::detect("a\nb"), LineEnding::Lf);
    /// assert_eq!(LineEnding::detect("single line"), LineEnding::Lf);
    /// ```
    pub fn detect(text: &str) -> Self {
        if text.contains("\r\n") {
            LineEnding::CrLf
        } else {
            LineEnding::Lf
        }
    }

    /// The terminator itself.
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

impl fmt::Display for LineEnding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineEnding::Lf => write!(f, "LF"),
            LineEnding::CrLf => write!(f, "CRLF"),
        }
    }
}

/// Splits text into lines on `\n`, dropping a `\r` that precedes it.
///
/// Unlike [`str::lines`], a trailing line break yields a final empty line, so
/// joining the result with the detected [`LineEnding`] reproduces the input.
pub(crate) fn split_lines(text: &str) -> Vec<&str> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect()
}

/// `"<ws>*<digits>+<ws>+|"` followed by anything but a second pipe. Group 1
/// is the prefix itself.
static NUMBERED_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*[0-9]+\s+\|)(?:[^|]|$)").expect("Failed to create NUMBERED_PREFIX")
});

/// Returns the byte length of the line-number prefix, if the line has one.
fn numbered_prefix_len(line: &str) -> Option<usize> {
    NUMBERED_PREFIX
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|prefix| prefix.end())
}

/// Checks whether every non-empty line of `text` carries a line-number prefix.
///
/// Text without any non-empty line is not considered numbered.
///
/// # Example
///
/// ```
/// # use srpatch::looks_line_numbered;
/// assert!(looks_line_numbered(" 9 | fn main() {\n10 |     run();\n11 | }"));
/// assert!(!looks_line_numbered("fn main() {\n    run();\n}"));
/// // A double pipe is a logical "or", not a line-number separator.
/// assert!(!looks_line_numbered("1 || 2"));
/// ```
pub fn looks_line_numbered(text: &str) -> bool {
    let mut saw_line = false;
    for line in split_lines(text).into_iter().filter(|l| !l.is_empty()) {
        if numbered_prefix_len(line).is_none() {
            return false;
        }
        saw_line = true;
    }
    saw_line
}

/// Removes line-number prefixes from every line that has one.
///
/// One whitespace character after the pipe is removed along with the prefix.
/// Lines without a prefix are left as they are, and the output keeps the
/// input's line-ending style.
///
/// # Example
///
/// ```
/// # use srpatch::strip_line_numbers;
/// assert_eq!(strip_line_numbers("1 | a\n2 |     b"), "a\n    b");
/// assert_eq!(strip_line_numbers("1 | a\r\n2 | b"), "a\r\nb");
/// assert_eq!(strip_line_numbers("no numbers here"), "no numbers here");
/// ```
pub fn strip_line_numbers(text: &str) -> String {
    let ending = LineEnding::detect(text);
    split_lines(text)
        .into_iter()
        .map(|line| match numbered_prefix_len(line) {
            Some(prefix) => {
                let rest = &line[prefix..];
                match rest.chars().next() {
                    Some(c) if c.is_whitespace() => &rest[c.len_utf8()..],
                    _ => rest,
                }
            }
            None => line,
        })
        .collect::<Vec<_>>()
        .join(ending.as_str())
}

/// Renders `content` as a numbered listing starting at `start_line`.
///
/// Numbers are right-aligned to the width of the largest one, in the same
/// `"N | line"` form that [`strip_line_numbers`] removes.
///
/// # Example
///
/// ```
/// # use srpatch::add_line_numbers;
/// let listing = add_line_numbers("a\nb\nc", 9);
/// assert_eq!(listing, " 9 | a\n10 | b\n11 | c");
/// ```
pub fn add_line_numbers(content: &str, start_line: usize) -> String {
    let lines: Vec<&str> = content.split('\n').collect();
    let last = start_line + lines.len().saturating_sub(1);
    let width = last.to_string().len();
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{:>width$} | {}", start_line + i, line, width = width))
        .collect::<Vec<_>>()
        .join("\n")
}
