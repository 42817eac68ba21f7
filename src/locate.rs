//! Locating the region of a file that a SEARCH block refers to.
//!
//! The locator first trusts the caller's line range hint, then falls back to
//! a middle-out scan of a window around it (or of the whole file when there
//! is no hint). Candidates near the middle of the window are tested first,
//! and a later candidate only wins with a strictly better score, so matches
//! close to the hint beat equally good matches further away.

use crate::error::DiffError;
use crate::line_numbers::add_line_numbers;
use crate::metrics::similarity;
use log::{debug, trace};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use std::fmt;

/// How many lines around the hint the fallback scan covers on each side.
pub const DEFAULT_BUFFER_LINES: usize = 20;

/// A 1-based, inclusive line range.
///
/// As a hint it is a best guess at where the SEARCH block lives in the
/// current file. It seeds the search but does not confine it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRange {
    pub start_line: usize,
    pub end_line: usize,
}

impl LineRange {
    /// Creates a range from 1-based inclusive bounds.
    pub fn new(start_line: usize, end_line: usize) -> Self {
        Self {
            start_line,
            end_line,
        }
    }

    /// Builds an optional hint from optional bounds.
    ///
    /// Both bounds give a hint and no bounds give none. A single bound is
    /// rejected rather than guessed at.
    ///
    /// # Example
    ///
    /// ```
    /// # use srpatch::{DiffError, LineRange};
    /// assert_eq!(LineRange::from_bounds(Some(3), Some(5)), Ok(Some(LineRange::new(3, 5))));
    /// assert_eq!(LineRange::from_bounds(None, None), Ok(None));
    /// assert!(matches!(
    ///     LineRange::from_bounds(Some(3), None),
    ///     Err(DiffError::IncompleteRange { .. })
    /// ));
    /// ```
    pub fn from_bounds(
        start_line: Option<usize>,
        end_line: Option<usize>,
    ) -> Result<Option<Self>, DiffError> {
        match (start_line, end_line) {
            (Some(start), Some(end)) => Ok(Some(Self::new(start, end))),
            (None, None) => Ok(None),
            _ => Err(DiffError::IncompleteRange {
                start_line,
                end_line,
            }),
        }
    }

    /// Checks whether the range names exactly one line.
    pub fn is_single_line(&self) -> bool {
        self.start_line == self.end_line
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lines {}-{}", self.start_line, self.end_line)
    }
}

/// A contiguous region of the original file and how well it matched.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    /// 0-based index of the first matched line.
    pub start_index: usize,
    /// Similarity to the SEARCH text, from `0.0` to `1.0`.
    pub score: f64,
    /// The matched original lines.
    pub lines: Vec<String>,
}

impl MatchCandidate {
    /// The 1-based line number of the first matched line.
    pub fn start_line(&self) -> usize {
        self.start_index + 1
    }

    /// The number of original lines the candidate covers.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Checks whether the candidate covers no lines (an insertion point).
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Everything known about a search that did not reach the threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchDiagnostics {
    /// The best similarity achieved.
    pub score: f64,
    /// The similarity required.
    pub threshold: f64,
    /// The caller's hint, if any.
    pub hint: Option<LineRange>,
    /// The lines the fallback scan covered.
    pub search_range: LineRange,
    /// The SEARCH text that was looked for.
    pub search_text: String,
    /// The best-scoring candidate, if any candidate scored above zero.
    pub best_match: Option<MatchCandidate>,
    /// Line number of the first line of `original_context`.
    pub context_start_line: usize,
    /// The original content around the hint, or the whole file without one.
    pub original_context: String,
}

/// Floors a score to a whole percentage.
fn percent(score: f64) -> u32 {
    (score * 100.0).floor() as u32
}

impl MatchDiagnostics {
    /// Renders the failure for a human or a model to act on.
    ///
    /// The search text, best match and original context are shown as
    /// numbered listings, each anchored at its real line number.
    pub fn report(&self) -> String {
        let at = match self.hint {
            Some(range) => format!(" at start: {} to end: {}", range.start_line, range.end_line),
            None => String::new(),
        };
        let hinted = match self.hint {
            Some(range) => range.to_string(),
            None => "start to end".to_string(),
        };
        let best_match = match &self.best_match {
            Some(candidate) => add_line_numbers(&candidate.lines.join("\n"), candidate.start_line()),
            None => "(no match)".to_string(),
        };

        format!(
            "No sufficiently similar match found{at} ({score}% similar, needs {threshold}%)\n\n\
             Debug Info:\n\
             - Similarity Score: {score}%\n\
             - Required Threshold: {threshold}%\n\
             - Search Range: {hinted} (scanned {scanned})\n\n\
             Search Content:\n{search}\n\n\
             Best Match Found:\n{best_match}\n\n\
             Original Content:\n{original}",
            at = at,
            score = percent(self.score),
            threshold = percent(self.threshold),
            hinted = hinted,
            scanned = self.search_range,
            search = add_line_numbers(&self.search_text, 1),
            best_match = best_match,
            original = add_line_numbers(&self.original_context, self.context_start_line),
        )
    }
}

/// Finds the region of a file that best matches a SEARCH block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionLocator {
    threshold: f64,
    buffer_lines: usize,
}

impl RegionLocator {
    /// Creates a locator accepting matches scoring at least `threshold` and
    /// scanning `buffer_lines` around a hint when the hinted range misses.
    pub fn new(threshold: f64, buffer_lines: usize) -> Self {
        Self {
            threshold,
            buffer_lines,
        }
    }

    /// The minimum accepted similarity.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Locates `search_lines` within `original_lines`.
    ///
    /// # Errors
    ///
    /// - [`DiffError::EmptySearchRequiresAnchor`] for an empty search without
    ///   a single-line hint.
    /// - [`DiffError::InvalidRange`] for a hint outside the file.
    /// - [`DiffError::NoSufficientMatch`] when no candidate reaches the
    ///   threshold.
    ///
    /// # Example
    ///
    /// ```
    /// # use srpatch::{LineRange, RegionLocator};
    /// let original = vec!["def f():", "  total = 0", "  return total"];
    /// let locator = RegionLocator::new(0.9, 20);
    ///
    /// // The hint is one line off; the scan still finds line 2.
    /// let found = locator
    ///     .locate(&original, &["total = 0"], Some(LineRange::new(3, 3)))
    ///     .unwrap();
    /// assert_eq!(found.start_line(), 2);
    /// assert_eq!(found.score, 1.0);
    /// ```
    pub fn locate<T: AsRef<str> + Sync>(
        &self,
        original_lines: &[T],
        search_lines: &[&str],
        hint: Option<LineRange>,
    ) -> Result<MatchCandidate, DiffError> {
        let line_count = original_lines.len();
        let search_chunk = search_lines.join("\n");
        trace!(
            "  locate called with {} search lines against {} original lines (hint: {:?}).",
            search_lines.len(),
            line_count,
            hint
        );

        if search_lines.is_empty() && !hint.is_some_and(|range| range.is_single_line()) {
            return Err(DiffError::EmptySearchRequiresAnchor {
                start_line: hint.map(|range| range.start_line),
                end_line: hint.map(|range| range.end_line),
            });
        }

        let mut scan_start = 0;
        let mut scan_end = line_count;

        if let Some(range) = hint {
            if range.start_line == 0 || range.start_line > range.end_line || range.end_line > line_count
            {
                return Err(DiffError::InvalidRange {
                    start_line: range.start_line,
                    end_line: range.end_line,
                    line_count,
                });
            }

            let exact_start = range.start_line - 1;
            let exact_chunk = join_lines(&original_lines[exact_start..range.end_line]);
            let score = similarity(&exact_chunk, &search_chunk);
            if score >= self.threshold {
                debug!(
                    "    Hinted range {} matched directly (similarity {:.3}).",
                    range, score
                );
                return Ok(self.candidate_at(original_lines, exact_start, search_lines.len(), score));
            }

            scan_start = range.start_line.saturating_sub(self.buffer_lines + 1);
            scan_end = line_count.min(range.end_line + self.buffer_lines);
            debug!(
                "    Hinted range {} scored {:.3}, below {:.3}. Scanning lines {}-{}.",
                range,
                score,
                self.threshold,
                scan_start + 1,
                scan_end
            );
        }

        let starts = middle_out_starts(scan_start, scan_end, search_lines.len());
        let scores = self.score_starts(original_lines, &search_chunk, &starts, search_lines.len());

        let mut best: Option<(usize, f64)> = None;
        let mut best_score = 0.0;
        for (&start, &score) in starts.iter().zip(&scores) {
            if score > best_score {
                trace!(
                    "      New best score {:.3} at line {}.",
                    score,
                    start + 1
                );
                best_score = score;
                best = Some((start, score));
            }
        }

        match best {
            Some((start, score)) if score >= self.threshold => {
                debug!(
                    "    Found best match at line {} (similarity {:.3}).",
                    start + 1,
                    score
                );
                Ok(self.candidate_at(original_lines, start, search_lines.len(), score))
            }
            _ => {
                debug!(
                    "    Best similarity {:.3} is below threshold {:.3}.",
                    best_score, self.threshold
                );
                let best_match = best.map(|(start, score)| {
                    self.candidate_at(original_lines, start, search_lines.len(), score)
                });
                let (context_start, context_end) = match hint {
                    Some(range) => (
                        (range.start_line - 1).saturating_sub(self.buffer_lines),
                        line_count.min(range.end_line + self.buffer_lines),
                    ),
                    None => (0, line_count),
                };
                Err(DiffError::NoSufficientMatch(Box::new(MatchDiagnostics {
                    score: best_score,
                    threshold: self.threshold,
                    hint,
                    search_range: LineRange::new(scan_start + 1, scan_end),
                    search_text: search_chunk,
                    best_match,
                    context_start_line: context_start + 1,
                    original_context: join_lines(&original_lines[context_start..context_end]),
                })))
            }
        }
    }

    fn candidate_at<T: AsRef<str>>(
        &self,
        original_lines: &[T],
        start: usize,
        len: usize,
        score: f64,
    ) -> MatchCandidate {
        let end = (start + len).min(original_lines.len());
        MatchCandidate {
            start_index: start,
            score,
            lines: original_lines[start.min(end)..end]
                .iter()
                .map(|l| l.as_ref().to_string())
                .collect(),
        }
    }

    /// Scores every candidate start. The result is in the same order as
    /// `starts`, so selection afterwards keeps the middle-out tie-break.
    fn score_starts<T: AsRef<str> + Sync>(
        &self,
        original_lines: &[T],
        search_chunk: &str,
        starts: &[usize],
        len: usize,
    ) -> Vec<f64> {
        let score_at = |start: usize| {
            let end = (start + len).min(original_lines.len());
            let chunk = join_lines(&original_lines[start.min(end)..end]);
            similarity(&chunk, search_chunk)
        };

        #[cfg(feature = "parallel")]
        let scores = starts.par_iter().map(|&start| score_at(start)).collect();

        #[cfg(not(feature = "parallel"))]
        let scores = starts.iter().map(|&start| score_at(start)).collect();

        scores
    }
}

fn join_lines<T: AsRef<str>>(lines: &[T]) -> String {
    lines
        .iter()
        .map(|l| l.as_ref())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Lists candidate start indices in middle-out order over `[lo, hi)`.
///
/// Starting from the midpoint, each step yields the next start to the left
/// (while it is `>= lo`) and then the next start to the right (while a chunk
/// of `len` lines starting there still ends within `hi`).
///
/// # Example
///
/// ```
/// # use srpatch::middle_out_starts;
/// assert_eq!(middle_out_starts(0, 6, 1), vec![3, 4, 2, 5, 1, 0]);
/// assert_eq!(middle_out_starts(0, 6, 3), vec![3, 2, 1, 0]);
/// ```
pub fn middle_out_starts(lo: usize, hi: usize, len: usize) -> Vec<usize> {
    let mid = (lo + hi) / 2;
    let mut starts = Vec::with_capacity(hi.saturating_sub(lo) + 1);
    let mut step = 0;
    loop {
        let left = mid.checked_sub(step).filter(|&start| start >= lo);
        let right = Some(mid + 1 + step).filter(|&start| start + len <= hi);
        if left.is_none() && right.is_none() {
            break;
        }
        starts.extend(left);
        starts.extend(right);
        step += 1;
    }
    starts
}
