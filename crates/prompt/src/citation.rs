//! Citation marker alphabet.
//!
//! Passage `n` (1-based, in prompt order) is cited with `CITATION_MARKERS[n - 1]`.

/// The fixed ten-symbol marker alphabet.
pub const CITATION_MARKERS: [&str; 10] = ["①", "②", "③", "④", "⑤", "⑥", "⑦", "⑧", "⑨", "⑩"];

/// Marker for the 1-based passage position `n`.
///
/// Positions outside the alphabet get a parenthesized number. Answer parsing
/// does not recognise that form, so callers keep prompts within the alphabet.
pub fn citation_marker(n: usize) -> String {
    match n.checked_sub(1).and_then(|i| CITATION_MARKERS.get(i)) {
        Some(marker) => (*marker).to_string(),
        None => format!("({})", n),
    }
}
