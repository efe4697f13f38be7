//! # Layout Reconstruction Module
//!
//! Converts per-line positional recognition output into natural reading
//! order. Providers return lines in detection order, which for noisy photos
//! of worksheets rarely matches how a person reads the page: lines are
//! re-sorted top-to-bottom, near-equal vertical positions are merged into a
//! single row ordered left-to-right, and large vertical gaps become blank
//! separator lines approximating paragraph breaks.

use crate::config::LayoutConfig;

/// A recognized line with its position on the page
///
/// Intermediate shape only: discarded once reading order and the average
/// confidence have been computed.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    /// Recognized text content
    pub content: String,
    /// Horizontal position of the line's bounding box
    pub x: f64,
    /// Vertical position of the line's bounding box
    pub y: f64,
    /// Bounding box width
    pub width: f64,
    /// Bounding box height
    pub height: f64,
    /// Line-level recognition confidence, 0–100
    pub confidence: f64,
}

/// Rebuild reading order from positional line data
///
/// Lines are sorted by vertical position. Two lines whose vertical
/// positions differ by less than `same_row_threshold` are treated as one
/// row, with horizontal position breaking the tie; rows are joined with a
/// single space. A blank line is inserted between rows whose vertical gap
/// exceeds `paragraph_gap_threshold`.
pub fn reconstruct_reading_order(mut lines: Vec<TextLine>, config: &LayoutConfig) -> String {
    if lines.is_empty() {
        return String::new();
    }

    lines.sort_by(|a, b| a.y.total_cmp(&b.y));

    // Group into rows anchored at the first line's vertical position
    let mut rows: Vec<(f64, Vec<TextLine>)> = Vec::new();
    for line in lines {
        match rows.last_mut() {
            Some((anchor, members)) if (line.y - *anchor).abs() < config.same_row_threshold => {
                members.push(line);
            }
            _ => rows.push((line.y, vec![line])),
        }
    }

    let mut out: Vec<String> = Vec::new();
    let mut prev_anchor: Option<f64> = None;
    for (anchor, mut members) in rows {
        if let Some(prev) = prev_anchor {
            if anchor - prev > config.paragraph_gap_threshold {
                out.push(String::new());
            }
        }
        members.sort_by(|a, b| a.x.total_cmp(&b.x));
        let row_text = members
            .iter()
            .map(|line| line.content.trim())
            .collect::<Vec<_>>()
            .join(" ");
        out.push(row_text);
        prev_anchor = Some(anchor);
    }

    out.join("\n")
}

/// Mean of the line-level confidences, or 0.0 when no lines carry one
pub fn average_confidence(lines: &[TextLine]) -> f64 {
    if lines.is_empty() {
        return 0.0;
    }
    let sum: f64 = lines.iter().map(|line| line.confidence).sum();
    sum / lines.len() as f64
}
