//! Unified-diff rendering on top of the `similar` diff engine.
//!
//! The engine computes the line ops; this module owns the document shape:
//! header lines with configurable prefixes, hunks with three lines of
//! context, `\n` endings throughout, and `\ No newline at end of file`
//! markers so files without a trailing newline survive the round trip.

use std::borrow::Cow;

use similar::{DiffOp, DiffTag, TextDiff};

/// Context lines on either side of a hunk.
const CONTEXT: usize = 3;

const NO_NEWLINE_MARKER: &str = "\\ No newline at end of file";

/// Render a unified-diff document, or `None` when the diff has no hunks.
///
/// With `ignore_whitespace` set, lines differing only in whitespace compare
/// equal and produce no hunk; emitted lines are always taken verbatim from
/// the inputs, so the hunks that do exist still apply exact content.
pub fn render_unified(
    original: &str,
    modified: &str,
    original_header: &str,
    modified_header: &str,
    ignore_whitespace: bool,
) -> Option<String> {
    let original = normalize_eol(original);
    let modified = normalize_eol(modified);

    let old_lines: Vec<&str> = original.split_inclusive('\n').collect();
    let new_lines: Vec<&str> = modified.split_inclusive('\n').collect();

    let groups = if ignore_whitespace {
        let old_keys: Vec<String> = old_lines.iter().map(|l| whitespace_key(l)).collect();
        let new_keys: Vec<String> = new_lines.iter().map(|l| whitespace_key(l)).collect();
        let old_refs: Vec<&str> = old_keys.iter().map(String::as_str).collect();
        let new_refs: Vec<&str> = new_keys.iter().map(String::as_str).collect();
        TextDiff::from_slices(&old_refs, &new_refs).grouped_ops(CONTEXT)
    } else {
        TextDiff::from_slices(&old_lines, &new_lines).grouped_ops(CONTEXT)
    };

    if groups.is_empty() {
        return None;
    }

    let mut out = String::new();
    out.push_str(&format!("--- {original_header}\n"));
    out.push_str(&format!("+++ {modified_header}\n"));

    for group in &groups {
        push_hunk(&mut out, group, &old_lines, &new_lines);
    }

    Some(out)
}

fn push_hunk(out: &mut String, group: &[DiffOp], old_lines: &[&str], new_lines: &[&str]) {
    let first = match group.first() {
        Some(op) => op,
        None => return,
    };
    let last = group.last().unwrap_or(first);

    let old_start = first.old_range().start;
    let old_len = last.old_range().end - old_start;
    let new_start = first.new_range().start;
    let new_len = last.new_range().end - new_start;

    out.push_str(&format!(
        "@@ -{},{} +{},{} @@\n",
        display_start(old_start, old_len),
        old_len,
        display_start(new_start, new_len),
        new_len,
    ));

    for op in group {
        match op.tag() {
            DiffTag::Equal => push_lines(out, ' ', &old_lines[op.old_range()]),
            DiffTag::Delete => push_lines(out, '-', &old_lines[op.old_range()]),
            DiffTag::Insert => push_lines(out, '+', &new_lines[op.new_range()]),
            DiffTag::Replace => {
                push_lines(out, '-', &old_lines[op.old_range()]);
                push_lines(out, '+', &new_lines[op.new_range()]);
            }
        }
    }
}

/// Unified-diff line numbers are 1-based, except that an empty range names
/// the line before the gap.
fn display_start(start: usize, len: usize) -> usize {
    if len == 0 {
        start
    } else {
        start + 1
    }
}

fn push_lines(out: &mut String, prefix: char, lines: &[&str]) {
    for line in lines {
        out.push(prefix);
        match line.strip_suffix('\n') {
            Some(stripped) => {
                out.push_str(stripped);
                out.push('\n');
            }
            None => {
                // Final line of a file without a trailing newline.
                out.push_str(line);
                out.push('\n');
                out.push_str(NO_NEWLINE_MARKER);
                out.push('\n');
            }
        }
    }
}

/// Comparison key that erases whitespace differences within a line.
fn whitespace_key(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_eol(s: &str) -> Cow<'_, str> {
    if s.contains('\r') {
        Cow::Owned(s.replace("\r\n", "\n"))
    } else {
        Cow::Borrowed(s)
    }
}
