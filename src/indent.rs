//! Re-indentation of replacement lines to fit the matched region.

/// The leading run of spaces and tabs.
fn leading_indent(line: &str) -> &str {
    let end = line
        .find(|c: char| c != ' ' && c != '\t')
        .unwrap_or(line.len());
    &line[..end]
}

/// Re-indents `replace_lines` to follow the indentation of `matched_lines`.
///
/// Each replacement line's indentation is measured relative to the first
/// SEARCH line and that relative offset is re-applied to the first matched
/// original line's indentation:
///
/// - a deeper line keeps its own extra indent characters beyond the SEARCH
///   base, appended to the matched base;
/// - a shallower line removes that many characters from the end of the
///   matched base.
///
/// The replacement line's content is trimmed first. A whitespace-only line
/// is treated like any other and keeps its re-based indent, so a block whose
/// base indent already matches comes out unchanged. This keeps the file's own
/// indentation style (tabs or spaces, depth) while honoring nesting changes
/// inside the replacement.
///
/// # Example
///
/// ```
/// # use srpatch::reconcile_indentation;
/// let matched = ["\tif ready {", "\t\tgo();", "\t}"];
/// let search = ["if ready {", "    go();", "}"];
/// let replace = ["if ready && armed {", "    go();", "    log();", "}"];
///
/// let result = reconcile_indentation(&matched, &search, &replace);
/// assert_eq!(result, vec!["\tif ready && armed {", "\t    go();", "\t    log();", "\t}"]);
/// ```
pub fn reconcile_indentation<M, S, R>(
    matched_lines: &[M],
    search_lines: &[S],
    replace_lines: &[R],
) -> Vec<String>
where
    M: AsRef<str>,
    S: AsRef<str>,
    R: AsRef<str>,
{
    let matched_base = matched_lines
        .first()
        .map(|l| leading_indent(l.as_ref()))
        .unwrap_or("");
    let search_base_len = search_lines
        .first()
        .map(|l| leading_indent(l.as_ref()).len())
        .unwrap_or(0);

    replace_lines
        .iter()
        .map(|line| {
            let line = line.as_ref();
            let indent = leading_indent(line);
            let indent = if indent.len() < search_base_len {
                let shallower_by = search_base_len - indent.len();
                matched_base[..matched_base.len().saturating_sub(shallower_by)].to_string()
            } else {
                format!("{}{}", matched_base, &indent[search_base_len..])
            };
            format!("{}{}", indent, line.trim())
        })
        .collect()
}
