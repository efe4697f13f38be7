//! # Text Sanitizer Module
//!
//! Removes recognition noise from OCR output. Recognition of photographed
//! worksheets produces stray symbols and whole lines of garbage where the
//! engine hallucinated text in shadows or diagrams. The sanitizer works
//! per line: heavily corrupted lines are dropped outright (a clean absence
//! misleads a reader less than mangled text), while lightly corrupted lines
//! have their non-linguistic characters replaced with spaces and their
//! whitespace collapsed. Runs on every result regardless of provider.

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

use crate::config::SanitizeConfig;

// Allow-listed content: letters (with combining marks), digits, punctuation,
// whitespace, and the math/currency symbols that show up in tutoring
// material. Everything else counts as garbage.
const GARBAGE_PATTERN: &str = r"[^\p{L}\p{M}\p{N}\p{P}\s+<=>^|~$°€£×÷±]";

lazy_static! {
    static ref GARBAGE_REGEX: Regex =
        Regex::new(GARBAGE_PATTERN).expect("Garbage character pattern should be valid");
    static ref WHITESPACE_REGEX: Regex =
        Regex::new(r"\s+").expect("Whitespace pattern should be valid");
}

/// Fraction of a line's characters that are non-linguistic garbage
///
/// Empty lines score 0.0 so blank paragraph separators survive sanitization.
pub fn garbage_ratio(line: &str) -> f64 {
    let total = line.chars().count();
    if total == 0 {
        return 0.0;
    }
    let garbage = GARBAGE_REGEX.find_iter(line).count();
    garbage as f64 / total as f64
}

/// Per-line garbage filter and character scrubber
#[derive(Debug, Clone, Default)]
pub struct TextSanitizer {
    config: SanitizeConfig,
}

impl TextSanitizer {
    /// Create a sanitizer with the given threshold settings
    pub fn new(config: SanitizeConfig) -> Self {
        Self { config }
    }

    /// Sanitize normalized OCR text
    ///
    /// For each line: compute the garbage ratio and drop the line entirely
    /// when it exceeds the configured threshold; otherwise replace each
    /// disallowed character with a space, collapse whitespace runs, and
    /// trim. Remaining lines are rejoined with newlines in their original
    /// order. Idempotent: sanitizing already-sanitized text is a no-op.
    pub fn sanitize(&self, text: &str) -> String {
        let mut kept: Vec<String> = Vec::new();

        for line in text.lines() {
            let ratio = garbage_ratio(line);
            if ratio > self.config.garbage_ratio_threshold {
                debug!("Dropping garbage line (ratio {ratio:.2}): '{line}'");
                continue;
            }

            let scrubbed = GARBAGE_REGEX.replace_all(line, " ");
            let collapsed = WHITESPACE_REGEX.replace_all(&scrubbed, " ");
            kept.push(collapsed.trim().to_string());
        }

        kept.join("\n")
    }
}
