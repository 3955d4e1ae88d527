//! Text form helpers shared by all type descriptors.
//!
//! The text form is used for inspectors, clipboard data and XML values:
//!
//! - strings are C-escaped; inside containers they are quoted when they contain
//!   one of the structural characters `()[]"`,
//! - arrays print as `[a][b][c]`,
//! - structs print as `(name=value)(other=value)` listing non-default members.

use bitflags::bitflags;

bitflags! {
    /// Options for printing and parsing text.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextFlags: u8 {
        /// The value is printed inside an array item or struct member.
        const NESTED = 1 << 0;
    }
}

/// Characters that force quoting of a nested string.
const STRUCTURAL: &[char] = &['(', ')', '[', ']', '"'];

/// Append `text` to `out` with C escapes. Quotes are escaped only when `in_quotes` is set.
pub fn c_escape(out: &mut String, text: &str, in_quotes: bool) {
    for ch in text.chars() {
        match ch {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            '\\' => out.push_str("\\\\"),
            '"' if in_quotes => out.push_str("\\\""),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\x{:02X}", c as u32));
            }
            c => out.push(c),
        }
    }
}

/// Decode C escapes. Returns `None` for a dangling backslash or a bad `\x` escape.
pub fn c_unescape(text: &str) -> Option<String> {
    if !text.contains('\\') {
        return Some(text.to_owned());
    }

    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            '0' => out.push('\0'),
            'x' => {
                let hi = chars.next()?.to_digit(16)?;
                let lo = chars.next()?.to_digit(16)?;
                out.push(char::from_u32(hi * 16 + lo)?);
            }
            other => out.push(other),
        }
    }
    Some(out)
}

/// Print a string value following the nesting rules.
pub fn print_string(out: &mut String, text: &str, flags: TextFlags) {
    if flags.contains(TextFlags::NESTED) && text.contains(STRUCTURAL) {
        out.push('"');
        c_escape(out, text, true);
        out.push('"');
    } else {
        c_escape(out, text, false);
    }
}

/// Parse a string value, accepting both quoted and bare forms.
pub fn parse_string(text: &str) -> Option<String> {
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        let inner = &text[1..text.len() - 1];
        if quoted_end(text) == Some(text.len() - 1) {
            return c_unescape(inner);
        }
    }
    c_unescape(text)
}

/// Byte index of the quote closing the quoted string that starts at index 0.
fn quoted_end(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// Split `text`, which starts just after an opening delimiter, at the matching `close`.
///
/// `(`/`[` nest, quoted strings are skipped. Returns the enclosed text and the
/// remainder after the closing delimiter.
pub fn scan_enclosed(text: &str, close: u8) -> Option<(&str, &str)> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                let end = quoted_end(&text[i..])?;
                i += end + 1;
                continue;
            }
            b'(' | b'[' => depth += 1,
            c @ (b')' | b']') => {
                if depth == 0 {
                    if c != close {
                        return None;
                    }
                    return Some((&text[..i], &text[i + 1..]));
                }
                depth -= 1;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Iterator over the items of a bracketed list such as `[a][b][c]`.
///
/// Yields `Err(())` and stops on malformed input.
pub struct BracketItems<'a> {
    rest: &'a str,
    failed: bool,
}

impl<'a> BracketItems<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            rest: text,
            failed: false,
        }
    }
}

impl<'a> Iterator for BracketItems<'a> {
    type Item = Result<&'a str, ()>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let rest = self.rest.trim_start();
        if rest.is_empty() {
            return None;
        }
        let Some(body) = rest.strip_prefix('[') else {
            self.failed = true;
            return Some(Err(()));
        };
        match scan_enclosed(body, b']') {
            Some((item, remainder)) => {
                self.rest = remainder;
                Some(Ok(item))
            }
            None => {
                self.failed = true;
                Some(Err(()))
            }
        }
    }
}

/// Iterator over the `(name=value)` members of a struct text form.
pub struct MemberItems<'a> {
    rest: &'a str,
    failed: bool,
}

impl<'a> MemberItems<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            rest: text,
            failed: false,
        }
    }
}

impl<'a> Iterator for MemberItems<'a> {
    type Item = Result<(&'a str, &'a str), ()>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let rest = self.rest.trim_start();
        if rest.is_empty() {
            return None;
        }
        let parsed = rest.strip_prefix('(').and_then(|body| {
            let name_len = body
                .bytes()
                .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
                .count();
            let (name, after_name) = body.split_at(name_len);
            let value_start = after_name.trim_start().strip_prefix('=')?;
            if name.is_empty() {
                return None;
            }
            let (value, remainder) = scan_enclosed(value_start, b')')?;
            Some((name, value, remainder))
        });
        match parsed {
            Some((name, value, remainder)) => {
                self.rest = remainder;
                Some(Ok((name, value)))
            }
            None => {
                self.failed = true;
                Some(Err(()))
            }
        }
    }
}
