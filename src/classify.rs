//! Sampled-byte text/binary classification.
//!
//! A heuristic, not a format sniffer: it looks at the first 1 KiB and counts
//! ascii-like bytes against everything else. Misclassifications are an
//! accepted limitation.

use std::io::{self, Read};

/// How many bytes of the stream are sampled.
pub const SAMPLE_LEN: usize = 1024;

/// How the generator should treat a file's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Text,
    Binary,
}

/// Classify a stream by sampling up to [`SAMPLE_LEN`] bytes. The reader is
/// consumed and dropped; callers reopen the file for the actual diff.
pub fn classify<R: Read>(reader: R) -> io::Result<ContentKind> {
    let mut sample = Vec::with_capacity(SAMPLE_LEN);
    reader.take(SAMPLE_LEN as u64).read_to_end(&mut sample)?;
    Ok(classify_bytes(&sample))
}

/// Classify already-buffered content; only the first [`SAMPLE_LEN`] bytes
/// are inspected.
pub fn classify_bytes(content: &[u8]) -> ContentKind {
    let mut ascii: u32 = 0;
    let mut other: u32 = 0;

    for &byte in content.iter().take(SAMPLE_LEN) {
        // Control bytes below TAB never occur in text.
        if byte < 0x09 {
            return ContentKind::Binary;
        }
        match byte {
            0x09 | 0x0A | 0x0C | 0x0D | 0x20..=0x7E => ascii += 1,
            _ => other += 1,
        }
    }

    if other == 0 {
        ContentKind::Text
    } else if 100 * other / (ascii + other) > 95 {
        ContentKind::Binary
    } else {
        ContentKind::Text
    }
}
