use std::sync::OnceLock;

use regex::Regex;

/// The six address shapes recognized in raw label text. Every shape starts
/// with a building number (1-7 digits, no leading zero) and a street token
/// run, crosses at least one newline, and ends on an uppercase locality line
/// of one or two words. The middle variants tolerate a secondary line
/// carrying a `#unit` number or an `&`-joined company/suite qualifier.
///
/// Order matters: it is the tie-break when two shapes match at the same
/// position with the same length.
const SHAPES: [&str; 6] = [
    // street line, then a "#<unit>" line, then an uppercase locality line
    r"[1-9][0-9]{2,6}[ \w+.]+\n{1,2}[\w+ ]+#[0-9]+\n[A-Z ]+",
    // two-line form with a short building number
    r"[1-9][0-9]{1,6}[A-Za-z ]+\n+[A-Z]{2,20}( [A-Z]{2,20})?",
    // street line, an uppercase/digit secondary line, locality line
    r"[1-9][0-9]{2,6}[ \w+.]+\n+[A-Z 0-9]+\n[A-Z]{2,20}( [A-Z]{2,20})?",
    // street line with dashes, "&"/"#" qualifier line, locality line
    r"[1-9][0-9]{2,6}[ \w+.\-]+\n*[\w+ #&]+\n{1,2}[A-Z]{2,20}( [A-Z]{2,20})?",
    // digits-only building number directly followed by the street name
    r"[1-9]{1,6} ?[A-Za-z][ \w+.]+\n+[A-Z]{2,20}([ A-Z]{2,20})?",
    // plain two-line form
    r"[1-9][0-9]{2,6} [ \w+.]+\n+[A-Z]{2,20}([ A-Z]{2,20})?",
];

fn shapes() -> &'static Vec<Regex> {
    static COMPILED: OnceLock<Vec<Regex>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        SHAPES
            .iter()
            .map(|pattern| Regex::new(pattern).expect("address shape pattern compiles"))
            .collect()
    })
}

/// Scans recognized text for address-like blocks.
///
/// Returns every non-overlapping match in source order, case-sensitive.
/// At a given start position the longest matching shape wins, so a
/// three-line label block is preferred over its own two-line prefix; equal
/// lengths fall back to shape order. Lines that conform to no shape are
/// silently skipped.
pub fn extract_addresses(text: &str) -> Vec<&str> {
    let shapes = shapes();
    let mut matches = Vec::new();
    let mut at = 0;

    while at < text.len() {
        let mut best: Option<(usize, usize)> = None;
        for shape in shapes {
            if let Some(found) = shape.find_at(text, at) {
                let candidate = (found.start(), found.end());
                best = match best {
                    None => Some(candidate),
                    // earlier start wins; same start, longer match wins
                    Some(current)
                        if candidate.0 < current.0
                            || (candidate.0 == current.0 && candidate.1 > current.1) =>
                    {
                        Some(candidate)
                    }
                    Some(current) => Some(current),
                };
            }
        }

        match best {
            Some((start, end)) => {
                matches.push(&text[start..end]);
                at = end;
            }
            None => break,
        }
    }

    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_three_line_label_block() {
        let text = "123 MAIN ST\nSUITE 4\nANYTOWN CA\n";
        let matches = extract_addresses(text);
        assert_eq!(matches, vec!["123 MAIN ST\nSUITE 4\nANYTOWN CA"]);
    }

    #[test]
    fn matches_plain_two_line_address() {
        let text = "4528 ELM AVE\nSPRINGFIELD\n";
        let matches = extract_addresses(text);
        assert_eq!(matches, vec!["4528 ELM AVE\nSPRINGFIELD"]);
    }

    #[test]
    fn matches_unit_number_line() {
        let text = "1500 OAK BLVD\nAPT #12\nRIVERTON\n";
        let matches = extract_addresses(text);
        assert_eq!(matches.len(), 1);
        assert!(matches[0].contains("#12"));
    }

    #[test]
    fn multiple_labels_come_back_in_source_order() {
        let text = "700 PINE ST\nLAKESIDE CA\nnoise in between\n820 CEDAR RD\nHILLVIEW CA\n";
        let matches = extract_addresses(text);
        assert_eq!(
            matches,
            vec!["700 PINE ST\nLAKESIDE CA", "820 CEDAR RD\nHILLVIEW CA"]
        );
    }

    #[test]
    fn nonconforming_text_yields_nothing() {
        assert!(extract_addresses("").is_empty());
        assert!(extract_addresses("no numbers here\nat all\n").is_empty());
        // lowercase locality line does not conform
        assert!(extract_addresses("123 MAIN ST\nanytown ca\n").is_empty());
    }

    #[test]
    fn matches_do_not_overlap() {
        let text = "123 MAIN ST\nSUITE 4\nANYTOWN CA\n456 SIDE ST\nELSEWHERE NV\n";
        let matches = extract_addresses(text);
        assert_eq!(matches.len(), 2);
        assert!(matches[0].starts_with("123"));
        assert!(matches[1].starts_with("456"));
    }
}
