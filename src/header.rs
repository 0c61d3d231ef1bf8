//! Interpretation of the two header lines carried by every binary patch
//! artifact. Kept as pure functions: the mode rules are easy to get
//! backwards, so they live here with their own tests instead of inline in
//! the apply loop.

use crate::error::PatchError;

/// Sentinel path denoting "no file on this side".
pub const DEV_NULL: &str = "/dev/null";

/// Default header prefix for the original side.
pub const DEFAULT_ORIGINAL_PREFIX: &str = "a/";
/// Default header prefix for the modified side.
pub const DEFAULT_MODIFIED_PREFIX: &str = "b/";

/// What applying an artifact does to the target file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    Add,
    Change,
    Delete,
}

/// The decoded header pair of a binary artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderInfo {
    pub mode: OperationMode,
    /// Path from the `---` line, sentinel included when present.
    pub base: String,
    /// Path from the `+++` line, sentinel included when present.
    pub modified: String,
}

/// Decode the two header lines of a binary artifact.
///
/// The first line must start with `--- `, the second with `+++ `. The
/// configured prefixes are stripped only when both sides carry them; paths
/// are truncated at the first tab (trailing metadata) and trimmed. The base
/// side equal to `/dev/null` means ADD; otherwise a modified side equal to
/// or starting with `/dev/null` means DELETE; anything else is CHANGE.
pub fn interpret(
    line_one: &str,
    line_two: &str,
    original_prefix: &str,
    modified_prefix: &str,
) -> Result<HeaderInfo, PatchError> {
    let base_raw = line_one
        .strip_prefix("--- ")
        .ok_or_else(|| PatchError::HeaderFormat(format!("expected `--- `, got: {line_one}")))?;
    let modified_raw = line_two
        .strip_prefix("+++ ")
        .ok_or_else(|| PatchError::HeaderFormat(format!("expected `+++ `, got: {line_two}")))?;

    let (base_raw, modified_raw) =
        if base_raw.starts_with(original_prefix) && modified_raw.starts_with(modified_prefix) {
            (
                &base_raw[original_prefix.len()..],
                &modified_raw[modified_prefix.len()..],
            )
        } else {
            (base_raw, modified_raw)
        };

    let base = clean_path(base_raw);
    let modified = clean_path(modified_raw);

    let mode = if base == DEV_NULL {
        OperationMode::Add
    } else if modified.starts_with(DEV_NULL) {
        OperationMode::Delete
    } else {
        OperationMode::Change
    };

    Ok(HeaderInfo {
        mode,
        base,
        modified,
    })
}

/// Split a binary artifact into its two header lines and the delta payload.
/// Each header line is terminated by `\n`; the payload starts at the exact
/// byte after the second terminator.
pub fn split_artifact(artifact: &[u8]) -> Result<(&str, &str, &[u8]), PatchError> {
    let (line_one, rest) = take_line(artifact)
        .ok_or_else(|| PatchError::HeaderFormat("missing first header line".into()))?;
    let (line_two, payload) = take_line(rest)
        .ok_or_else(|| PatchError::HeaderFormat("missing second header line".into()))?;
    Ok((line_one, line_two, payload))
}

fn take_line(bytes: &[u8]) -> Option<(&str, &[u8])> {
    let end = bytes.iter().position(|&b| b == b'\n')?;
    let line = std::str::from_utf8(&bytes[..end]).ok()?;
    Some((line, &bytes[end + 1..]))
}

/// Truncate at the first tab (patch headers may carry trailing metadata
/// after one) and trim whitespace.
fn clean_path(raw: &str) -> String {
    raw.split('\t').next().unwrap_or("").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode_of(line_one: &str, line_two: &str) -> OperationMode {
        interpret(
            line_one,
            line_two,
            DEFAULT_ORIGINAL_PREFIX,
            DEFAULT_MODIFIED_PREFIX,
        )
        .unwrap()
        .mode
    }

    #[test]
    fn dev_null_base_is_add() {
        assert_eq!(mode_of("--- /dev/null", "+++ b/foo.bin"), OperationMode::Add);
    }

    #[test]
    fn dev_null_modified_is_delete() {
        assert_eq!(
            mode_of("--- a/foo.bin", "+++ /dev/null"),
            OperationMode::Delete
        );
    }

    #[test]
    fn both_paths_is_change() {
        assert_eq!(
            mode_of("--- a/foo.bin", "+++ b/foo.bin"),
            OperationMode::Change
        );
    }

    #[test]
    fn prefixes_strip_only_when_both_sides_carry_them() {
        let info = interpret("--- a/dir/f.bin", "+++ b/dir/f.bin", "a/", "b/").unwrap();
        assert_eq!(info.base, "dir/f.bin");
        assert_eq!(info.modified, "dir/f.bin");

        // Mixed convention: leave both sides alone.
        let info = interpret("--- a/dir/f.bin", "+++ /dev/null", "a/", "b/").unwrap();
        assert_eq!(info.base, "a/dir/f.bin");
        assert_eq!(info.mode, OperationMode::Delete);
    }

    #[test]
    fn metadata_after_tab_is_dropped() {
        let info = interpret(
            "--- a/f.bin\t2024-01-01 00:00:00",
            "+++ b/f.bin\t2024-01-02 00:00:00",
            "a/",
            "b/",
        )
        .unwrap();
        assert_eq!(info.base, "f.bin");
        assert_eq!(info.modified, "f.bin");
        assert_eq!(info.mode, OperationMode::Change);
    }

    #[test]
    fn missing_prefix_is_a_header_format_error() {
        let err = interpret("-- broken", "+++ b/foo", "a/", "b/").unwrap_err();
        assert!(matches!(err, PatchError::HeaderFormat(_)));

        let err = interpret("--- a/foo", "*** b/foo", "a/", "b/").unwrap_err();
        assert!(matches!(err, PatchError::HeaderFormat(_)));
    }

    #[test]
    fn split_finds_exact_payload_offset() {
        let artifact = b"--- a/x.bin\n+++ b/x.bin\n\x00\x01rawdelta";
        let (one, two, payload) = split_artifact(artifact).unwrap();
        assert_eq!(one, "--- a/x.bin");
        assert_eq!(two, "+++ b/x.bin");
        assert_eq!(payload, b"\x00\x01rawdelta");
    }

    #[test]
    fn split_without_two_lines_fails() {
        assert!(matches!(
            split_artifact(b"--- only one line\n"),
            Err(PatchError::HeaderFormat(_))
        ));
    }
}
