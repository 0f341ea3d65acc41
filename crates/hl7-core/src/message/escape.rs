//! HL7v2 escape sequences (`\F\`, `\S\`, `\T\`, `\R\`, `\E\`, `\Xhh\`).

use super::Delimiters;

impl Delimiters {
    /// Escapes delimiter characters and line breaks so `text` can be placed
    /// inside a single component.
    #[must_use]
    pub fn escape(&self, text: &str) -> String {
        let mut escaped = String::with_capacity(text.len());
        for character in text.chars() {
            match self.escape_code(character) {
                Some(code) => {
                    escaped.push(self.escape);
                    escaped.push_str(code);
                    escaped.push(self.escape);
                }
                None => escaped.push(character),
            }
        }
        escaped
    }

    /// Reverses [`Delimiters::escape`]. Unknown sequences are kept verbatim.
    #[must_use]
    pub fn unescape(&self, text: &str) -> String {
        if !text.contains(self.escape) {
            return text.to_owned();
        }
        let marker = self.escape.len_utf8();
        let mut decoded = String::with_capacity(text.len());
        let mut remaining = text;
        while let Some(start) = remaining.find(self.escape) {
            decoded.push_str(remaining.get(..start).unwrap_or_default());
            let after = remaining.get(start + marker..).unwrap_or_default();
            let Some(end) = after.find(self.escape) else {
                decoded.push(self.escape);
                decoded.push_str(after);
                return decoded;
            };
            let sequence = after.get(..end).unwrap_or_default();
            if let Some(value) = self.decode_sequence(sequence) {
                decoded.push_str(&value);
            } else {
                decoded.push(self.escape);
                decoded.push_str(sequence);
                decoded.push(self.escape);
            }
            remaining = after.get(end + marker..).unwrap_or_default();
        }
        decoded.push_str(remaining);
        decoded
    }

    fn escape_code(&self, character: char) -> Option<&'static str> {
        if character == self.field {
            Some("F")
        } else if character == self.component {
            Some("S")
        } else if character == self.subcomponent {
            Some("T")
        } else if character == self.repetition {
            Some("R")
        } else if character == self.escape {
            Some("E")
        } else if character == '\r' {
            Some("X0D")
        } else if character == '\n' {
            Some("X0A")
        } else {
            None
        }
    }

    fn decode_sequence(&self, sequence: &str) -> Option<String> {
        let delimiter = match sequence {
            "F" => self.field,
            "S" => self.component,
            "T" => self.subcomponent,
            "R" => self.repetition,
            "E" => self.escape,
            _ => return sequence.strip_prefix('X').and_then(decode_hex),
        };
        Some(delimiter.to_string())
    }
}

fn decode_hex(digits: &str) -> Option<String> {
    if digits.is_empty() || !digits.len().is_multiple_of(2) {
        return None;
    }
    let bytes = digits
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|text| u8::from_str_radix(text, 16).ok())
        })
        .collect::<Option<Vec<u8>>>()?;
    String::from_utf8(bytes).ok()
}
