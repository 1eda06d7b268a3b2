//! Keyword transform applied before content is handed to templates.

use std::fmt::Write as _;

/// Rewrite every non-whitespace character as a decimal numeric character
/// reference (`a` becomes `&#97;`). Whitespace is kept verbatim so encoded
/// phrases still wrap in rendered pages.
pub fn encode_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len() * 6);
    for ch in input.chars() {
        if ch.is_whitespace() {
            out.push(ch);
        } else {
            let _ = write!(out, "&#{};", ch as u32);
        }
    }
    out
}
