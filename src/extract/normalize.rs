/// Canonicalizes one raw matched label block into the stored address form.
///
/// Applied in order: lowercase everything, turn each newline into a single
/// space, collapse every run of two-or-more whitespace characters into one
/// space, then append `", <state>"`. The stored form is all-lowercase, so
/// the state code is lowercased along with the match before it lands in the
/// suffix. Deterministic and side-effect free.
///
/// The suffix is appended even when the source line already named the state,
/// so `"ANYTOWN CA"` with state `"CA"` ends in `"anytown ca, ca"`. That
/// duplication is a known cosmetic artifact of the label format and is kept.
pub fn normalize(raw: &str, state: &str) -> String {
    let lowered = raw.to_lowercase();

    let mut out = String::with_capacity(lowered.len() + state.len() + 2);
    let mut chars = lowered
        .chars()
        .map(|ch| if ch == '\n' { ' ' } else { ch })
        .peekable();

    while let Some(ch) = chars.next() {
        if ch.is_whitespace() {
            let mut run = 1usize;
            while chars.peek().is_some_and(|next| next.is_whitespace()) {
                chars.next();
                run += 1;
            }
            // a lone whitespace character is kept as-is; only runs collapse
            if run >= 2 {
                out.push(' ');
            } else {
                out.push(ch);
            }
        } else {
            out.push(ch);
        }
    }

    out.push_str(", ");
    out.push_str(&state.to_lowercase());
    out
}
