//! Callsign extraction from FT8/FT4 message text.
//!
//! Three message shapes cover nearly all standard traffic:
//!
//! - `CQ <call> <grid>`: `dx_call` is the caller, `de_call` is empty.
//! - `CQ <qualifier> <call> <grid>` (e.g. `CQ DX`, `CQ POTA`): the
//!   qualifier is skipped. A qualifier is an all-letter token; callsigns
//!   always contain a digit, so the two never collide.
//! - `<first> <second> <rest>`: `de_call` is the first token, `dx_call`
//!   the second.
//!
//! Hashed callsigns arrive in angle brackets (`<K1ABC>`) and are unwrapped;
//! an unresolved hash (`<...>`) yields an empty call.

/// Return `(dx_call, de_call)` for a decoded message.
pub fn extract_calls(message: &str) -> (String, String) {
    let tokens: Vec<&str> = message.split_whitespace().collect();
    let Some(&first) = tokens.first() else {
        return (String::new(), String::new());
    };

    if first.eq_ignore_ascii_case("CQ") {
        let mut idx = 1;
        if tokens.len() > 2 && is_qualifier(tokens[1]) {
            idx = 2;
        }
        let dx = tokens.get(idx).map(|t| unwrap_hashed(t)).unwrap_or_default();
        return (dx, String::new());
    }

    let de = unwrap_hashed(first);
    let dx = tokens.get(1).map(|t| unwrap_hashed(t)).unwrap_or_default();
    (dx, de)
}

// Any all-letter token counts, not only 2-3 letters: activity qualifiers
// such as POTA or TEST are common and a callsign always has a digit.
fn is_qualifier(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_alphabetic())
}

fn unwrap_hashed(token: &str) -> String {
    let call = token
        .strip_prefix('<')
        .and_then(|t| t.strip_suffix('>'))
        .unwrap_or(token);
    if call == "..." {
        String::new()
    } else {
        call.to_uppercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calls(msg: &str) -> (String, String) {
        extract_calls(msg)
    }

    #[test]
    fn plain_cq() {
        assert_eq!(calls("CQ K1ABC FN42"), ("K1ABC".into(), "".into()));
    }

    #[test]
    fn cq_with_qualifier() {
        assert_eq!(calls("CQ DX W2XYZ FN42"), ("W2XYZ".into(), "".into()));
        assert_eq!(calls("CQ POTA W2XYZ FN42"), ("W2XYZ".into(), "".into()));
        assert_eq!(calls("CQ NA K1ABC"), ("K1ABC".into(), "".into()));
    }

    #[test]
    fn cq_without_grid_does_not_skip_the_call() {
        // A qualifier must be followed by a call.
        assert_eq!(calls("CQ K1ABC"), ("K1ABC".into(), "".into()));
        assert_eq!(calls("CQ TEST"), ("TEST".into(), "".into()));
    }

    #[test]
    fn directed_exchange() {
        assert_eq!(
            calls("W2XYZ K1ABC R-12"),
            ("K1ABC".into(), "W2XYZ".into())
        );
        assert_eq!(calls("K1ABC W2XYZ RR73"), ("W2XYZ".into(), "K1ABC".into()));
    }

    #[test]
    fn hashed_calls_are_unwrapped() {
        assert_eq!(
            calls("<PJ4/K1ABC> W2XYZ -05"),
            ("W2XYZ".into(), "PJ4/K1ABC".into())
        );
        assert_eq!(calls("W2XYZ <...> 73"), ("".into(), "W2XYZ".into()));
    }

    #[test]
    fn degenerate_messages() {
        assert_eq!(calls(""), ("".into(), "".into()));
        assert_eq!(calls("CQ"), ("".into(), "".into()));
        assert_eq!(calls("TNX"), ("".into(), "TNX".into()));
    }
}
