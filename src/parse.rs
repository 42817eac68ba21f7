//! Extraction of the SEARCH and REPLACE bodies from a diff block.

use crate::error::DiffError;
use crate::line_numbers::{looks_line_numbered, split_lines, strip_line_numbers};
use log::{debug, trace};

/// Opens the SEARCH body.
pub const SEARCH_MARKER: &str = "<<<<<<< SEARCH";
/// Separates the SEARCH body from the REPLACE body.
pub const SEPARATOR_MARKER: &str = "=======";
/// Closes the REPLACE body.
pub const REPLACE_MARKER: &str = ">>>>>>> REPLACE";

/// A single SEARCH/REPLACE operation.
///
/// Both texts are raw blocks with any echoed line-number prefixes already
/// removed. An empty `search` marks a pure insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffBlock {
    pub search: String,
    pub replace: String,
}

impl DiffBlock {
    /// The SEARCH body split into lines. An empty body has no lines.
    ///
    /// # Example
    ///
    /// ```
    /// # use srpatch::DiffBlock;
    /// let block = DiffBlock { search: "a\r\nb".to_string(), replace: String::new() };
    /// assert_eq!(block.search_lines(), vec!["a", "b"]);
    /// assert!(block.replace_lines().is_empty());
    /// ```
    pub fn search_lines(&self) -> Vec<&str> {
        body_lines(&self.search)
    }

    /// The REPLACE body split into lines. An empty body has no lines.
    pub fn replace_lines(&self) -> Vec<&str> {
        body_lines(&self.replace)
    }

    /// Checks whether this block is a pure insertion (empty SEARCH body).
    pub fn is_insertion(&self) -> bool {
        self.search.is_empty()
    }
}

fn body_lines(body: &str) -> Vec<&str> {
    if body.is_empty() {
        Vec::new()
    } else {
        split_lines(body)
    }
}

/// Byte span of one line within the diff text: `(start, end_without_terminator, next_line_start)`.
fn line_spans(text: &str) -> Vec<(usize, usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let (end, next) = match text[start..].find('\n') {
            Some(offset) => (start + offset, start + offset + 1),
            None => (text.len(), text.len()),
        };
        spans.push((start, end, next));
        start = next;
    }
    spans
}

fn is_marker(line: &str, marker: &str) -> bool {
    line.strip_suffix('\r').unwrap_or(line) == marker
}

/// Removes the single line break that precedes the next marker.
fn trim_body(body: &str) -> &str {
    body.strip_suffix("\r\n")
        .or_else(|| body.strip_suffix('\n'))
        .unwrap_or(body)
}

/// Parses a SEARCH/REPLACE block from `diff_text`.
///
/// The block must contain a `<<<<<<< SEARCH` line, a `=======` line and a
/// `>>>>>>> REPLACE` line in that order. Only the first complete block is
/// used; anything after its closing marker is ignored.
///
/// If both bodies look like numbered listings, the numbers are stripped from
/// both. They are never stripped from only one side.
///
/// # Errors
///
/// Returns [`DiffError::InvalidFormat`] if any of the three markers is missing.
///
/// # Example
///
/// ```
/// # use srpatch::parse_diff_block;
/// let diff = "<<<<<<< SEARCH\n    return x + 1\n=======\n    return x * 2\n>>>>>>> REPLACE";
/// let block = parse_diff_block(diff).unwrap();
/// assert_eq!(block.search, "    return x + 1");
/// assert_eq!(block.replace, "    return x * 2");
/// ```
pub fn parse_diff_block(diff_text: &str) -> Result<DiffBlock, DiffError> {
    let spans = line_spans(diff_text);
    let find_marker = |from: usize, marker: &str| {
        (from..spans.len())
            .find(|&i| is_marker(&diff_text[spans[i].0..spans[i].1], marker))
            .ok_or(DiffError::InvalidFormat)
    };

    let search_marker = find_marker(0, SEARCH_MARKER)?;
    let separator = find_marker(search_marker + 1, SEPARATOR_MARKER)?;
    let replace_marker = find_marker(separator + 1, REPLACE_MARKER)?;
    trace!(
        "  Markers found on diff lines {}, {} and {}.",
        search_marker + 1,
        separator + 1,
        replace_marker + 1
    );

    let search_body = &diff_text[spans[search_marker].2..spans[separator].0];
    let replace_body = &diff_text[spans[separator].2..spans[replace_marker].0];
    let mut search = trim_body(search_body).to_string();
    let mut replace = trim_body(replace_body).to_string();

    if looks_line_numbered(&search) && looks_line_numbered(&replace) {
        debug!("  Both SEARCH and REPLACE bodies carry line numbers; stripping them.");
        search = strip_line_numbers(&search);
        replace = strip_line_numbers(&replace);
    }

    Ok(DiffBlock { search, replace })
}
