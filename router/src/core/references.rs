//! Body/reference partitioning of the final answer.

use serde::Serialize;

/// Default reference marker (footnote-style `[^1]: ...` lines).
pub const DEFAULT_REFERENCE_MARKER: &str = "[^";

const REFERENCES_HEADING: &str = "**References:**";

/// Final answer split into its body and trailing references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalAnswer {
    pub body: String,
    pub references: Vec<String>,
}

impl FinalAnswer {
    /// Render the body followed by a references block when any exist.
    pub fn render(&self) -> String {
        if self.references.is_empty() {
            return self.body.clone();
        }
        let mut out = self.body.trim_end().to_string();
        out.push_str("\n\n");
        out.push_str(REFERENCES_HEADING);
        out.push('\n');
        for reference in &self.references {
            out.push_str(reference);
            out.push('\n');
        }
        out
    }
}

/// Partition `text` into body lines and reference lines.
///
/// A line is a reference iff it starts with `marker` after trimming. Reference
/// lines are kept trimmed and in order; body lines are rejoined unchanged.
pub fn split_references(text: &str, marker: &str) -> FinalAnswer {
    let mut body = Vec::new();
    let mut references = Vec::new();
    for line in text.split('\n') {
        let trimmed = line.trim();
        if !marker.is_empty() && trimmed.starts_with(marker) {
            references.push(trimmed.to_string());
        } else {
            body.push(line);
        }
    }
    FinalAnswer {
        body: body.join("\n"),
        references,
    }
}
