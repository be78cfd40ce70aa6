// Text to Morse key timing for the `smartsdr cw` command.

/// One key transition: key down or up, held for a number of dit units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element {
    pub down: bool,
    pub units: u32,
}

fn pattern(c: char) -> Option<&'static str> {
    Some(match c.to_ascii_uppercase() {
        'A' => ".-",
        'B' => "-...",
        'C' => "-.-.",
        'D' => "-..",
        'E' => ".",
        'F' => "..-.",
        'G' => "--.",
        'H' => "....",
        'I' => "..",
        'J' => ".---",
        'K' => "-.-",
        'L' => ".-..",
        'M' => "--",
        'N' => "-.",
        'O' => "---",
        'P' => ".--.",
        'Q' => "--.-",
        'R' => ".-.",
        'S' => "...",
        'T' => "-",
        'U' => "..-",
        'V' => "...-",
        'W' => ".--",
        'X' => "-..-",
        'Y' => "-.--",
        'Z' => "--..",
        '0' => "-----",
        '1' => ".----",
        '2' => "..---",
        '3' => "...--",
        '4' => "....-",
        '5' => ".....",
        '6' => "-....",
        '7' => "--...",
        '8' => "---..",
        '9' => "----.",
        '/' => "-..-.",
        '?' => "..--..",
        '=' => "-...-",
        _ => return None,
    })
}

/// PARIS timing: one dit lasts 1200 / wpm milliseconds.
pub fn dit_ms(wpm: u8) -> u64 {
    1200 / u64::from(wpm.max(1))
}

/// Expand `text` into alternating key-down/key-up elements. Characters with
/// no Morse pattern are skipped. The sequence always ends key-up.
pub fn elements(text: &str) -> Vec<Element> {
    let mut out: Vec<Element> = Vec::new();
    let mut gap = 0;
    for word in text.split_whitespace() {
        for c in word.chars() {
            let Some(p) = pattern(c) else { continue };
            for (i, mark) in p.chars().enumerate() {
                if i > 0 {
                    gap = 1;
                }
                if gap > 0 {
                    if let Some(last) = out.last_mut() {
                        last.units = gap;
                    }
                }
                out.push(Element {
                    down: true,
                    units: if mark == '-' { 3 } else { 1 },
                });
                out.push(Element { down: false, units: 1 });
                gap = 0;
            }
            gap = 3;
        }
        gap = 7;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(els: &[Element]) -> String {
        els.iter()
            .map(|e| format!("{}{}", if e.down { 'D' } else { 'U' }, e.units))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn letter_spacing() {
        // A = .-   N = -.
        assert_eq!(render(&elements("AN")), "D1 U1 D3 U3 D3 U1 D1 U1");
    }

    #[test]
    fn word_spacing() {
        assert_eq!(render(&elements("E E")), "D1 U7 D1 U1");
    }

    #[test]
    fn unknown_characters_are_skipped() {
        assert_eq!(elements("E#"), elements("E"));
        assert!(elements("  ").is_empty());
    }

    #[test]
    fn dit_length() {
        assert_eq!(dit_ms(20), 60);
        assert_eq!(dit_ms(0), 1200);
    }
}
