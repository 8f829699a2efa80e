//! Pasted-text identifier resolution.

use super::{is_numeric_id, ParsedInput, RecordRef, RejectedToken};

/// Resolves a blob of pasted text into record references.
///
/// Tokens are split on newlines, commas and any other whitespace, so a
/// column copied from a spreadsheet and a comma-separated one-liner both
/// work. Purely numeric tokens are accepted in input order; anything else
/// lands in the rejects list. No deduplication.
pub fn parse_pasted(text: &str) -> ParsedInput {
    let mut parsed = ParsedInput::default();

    for token in text.split(|c: char| c.is_whitespace() || c == ',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }

        if is_numeric_id(token) {
            parsed.records.push(RecordRef::new(token));
        } else {
            parsed.rejects.push(RejectedToken {
                token: token.to_string(),
                reason: "not a numeric record id".to_string(),
            });
        }
    }

    parsed
}
