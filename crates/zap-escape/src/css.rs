//! CSS escapers and the lexical helpers the transition table needs.

use crate::content::{Content, ContentType, is_hex};
use crate::funcs::FILTER_FAILSAFE;

/// Whether `b` ends with the keyword `kw`, case-insensitively and not as the
/// tail of a longer name.
pub(crate) fn ends_with_css_keyword(b: &[u8], kw: &str) -> bool {
    let kw = kw.as_bytes();
    if b.len() < kw.len() {
        return false;
    }
    let i = b.len() - kw.len();
    if i != 0 {
        let before = String::from_utf8_lossy(&b[..i]);
        if before.chars().next_back().is_some_and(is_css_nmchar) {
            return false;
        }
    }
    b[i..].eq_ignore_ascii_case(kw)
}

/// CSS3 `nmchar` without multi-character escapes.
pub(crate) fn is_css_nmchar(r: char) -> bool {
    r.is_ascii_alphanumeric()
        || r == '-'
        || r == '_'
        || matches!(r as u32, 0x80..=0xd7ff | 0xe000..=0xfffd | 0x10000..=0x10ffff)
}

pub(crate) fn is_css_space(b: u8) -> bool {
    matches!(b, b'\t' | b'\n' | b'\x0c' | b'\r' | b' ')
}

/// Decodes CSS3 backslash escapes in a run of string characters.
pub(crate) fn decode_css(s: &[u8]) -> Vec<u8> {
    if !s.contains(&b'\\') {
        return s.to_vec();
    }
    let mut b = Vec::with_capacity(s.len());
    let mut s = s;
    while !s.is_empty() {
        let i = s.iter().position(|&c| c == b'\\').unwrap_or(s.len());
        b.extend_from_slice(&s[..i]);
        s = &s[i..];
        if s.len() < 2 {
            break;
        }
        if is_hex(s[1]) {
            // unicode ::= '\' [0-9a-fA-F]{1,6} wc?
            let mut j = 2;
            while j < s.len() && j < 7 && is_hex(s[j]) {
                j += 1;
            }
            let digits = String::from_utf8_lossy(&s[1..j]);
            let mut r = u32::from_str_radix(&digits, 16).unwrap_or(0);
            if r > 0x10ffff {
                r /= 16;
                j -= 1;
            }
            let c = char::from_u32(r).unwrap_or('\u{FFFD}');
            let mut buf = [0u8; 4];
            b.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            s = skip_css_space(&s[j..]);
        } else {
            // `\\` decodes to `\` and `\"` to `"`.
            let n = utf8_width(s[1]).min(s.len() - 1);
            b.extend_from_slice(&s[1..1 + n]);
            s = &s[1 + n..];
        }
    }
    b
}

fn utf8_width(lead: u8) -> usize {
    match lead {
        0xf0..=0xff => 4,
        0xe0..=0xef => 3,
        0xc0..=0xdf => 2,
        _ => 1,
    }
}

fn skip_css_space(c: &[u8]) -> &[u8] {
    match c {
        [b'\r', b'\n', rest @ ..] => rest,
        [b'\t' | b'\n' | b'\x0c' | b'\r' | b' ', rest @ ..] => rest,
        _ => c,
    }
}

fn css_replacement(c: char) -> Option<&'static str> {
    match c {
        '\0' => Some(r"\0"),
        '\t' => Some(r"\9"),
        '\n' => Some(r"\a"),
        '\x0c' => Some(r"\c"),
        '\r' => Some(r"\d"),
        // HTML specials are hex encoded so the output is attribute safe.
        '"' => Some(r"\22"),
        '&' => Some(r"\26"),
        '\'' => Some(r"\27"),
        '(' => Some(r"\28"),
        ')' => Some(r"\29"),
        '+' => Some(r"\2b"),
        '/' => Some(r"\2f"),
        ':' => Some(r"\3a"),
        ';' => Some(r"\3b"),
        '<' => Some(r"\3c"),
        '>' => Some(r"\3e"),
        '\\' => Some(r"\\"),
        '{' => Some(r"\7b"),
        '}' => Some(r"\7d"),
        _ => None,
    }
}

/// Escapes HTML and CSS specials with `\<hex>` escapes.
pub fn css_escaper(value: &Content) -> String {
    let s = value.as_str();
    let bytes = s.as_bytes();
    let mut out = String::with_capacity(s.len());
    let mut written = 0;
    for (i, c) in s.char_indices() {
        let Some(repl) = css_replacement(c) else {
            continue;
        };
        out.push_str(&s[written..i]);
        out.push_str(repl);
        written = i + c.len_utf8();
        // A hex digit or space after the escape would be read as part of it.
        if repl != r"\\"
            && (written == s.len() || is_hex(bytes[written]) || is_css_space(bytes[written]))
        {
            out.push(' ');
        }
    }
    if written == 0 {
        return s.to_string();
    }
    out.push_str(&s[written..]);
    out
}

/// Allows quantities, colors, identifiers and keywords; anything that could
/// break out of the value or run script becomes the failsafe.
pub fn css_value_filter(value: &Content) -> String {
    let s = value.as_str();
    if value.content_type() == ContentType::Css {
        return s.to_string();
    }
    let b = decode_css(s.as_bytes());
    let mut id: Vec<u8> = Vec::with_capacity(64);
    for (i, &c) in b.iter().enumerate() {
        match c {
            0 | b'"' | b'\'' | b'(' | b')' | b'/' | b';' | b'@' | b'[' | b'\\' | b']' | b'`' | b'{'
            | b'}' => return FILTER_FAILSAFE.to_string(),
            // `<!--` and `-->`; `--` never appears in a valid identifier.
            b'-' if i != 0 && b[i - 1] == b'-' => return FILTER_FAILSAFE.to_string(),
            b'-' => {}
            c if c.is_ascii() && is_css_nmchar(c as char) => id.push(c.to_ascii_lowercase()),
            _ => {}
        }
    }
    if contains(&id, b"expression") || contains(&id, b"mozbinding") {
        return FILTER_FAILSAFE.to_string();
    }
    String::from_utf8_lossy(&b).into_owned()
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ends_with_css_keyword() {
        assert!(ends_with_css_keyword(b"url", "url"));
        assert!(ends_with_css_keyword(b"background: URL", "url"));
        assert!(!ends_with_css_keyword(b"curl", "url"));
        assert!(!ends_with_css_keyword(b"ur", "url"));
    }

    #[test]
    fn test_decode_css() {
        let cases: [(&str, &str); 7] = [
            ("", ""),
            ("foo", "foo"),
            (r"foo\", "foo"),
            (r"foo\\", r"foo\"),
            (r"\A B", "\nB"),
            (r"\4e2d\56FD", "中国"),
            (r#"\"x\""#, r#""x""#),
        ];
        for (input, want) in cases {
            assert_eq!(String::from_utf8_lossy(&decode_css(input.as_bytes())), want, "{:?}", input);
        }
    }

    #[test]
    fn test_css_escaper() {
        assert_eq!(css_escaper(&"plain".into()), "plain");
        assert_eq!(css_escaper(&"</style>".into()), r"\3c\2fstyle\3e ");
        assert_eq!(css_escaper(&"a;b".into()), r"\3b b");
        assert_eq!(css_escaper(&"(1)".into()), r"\28 1\29 ");
        assert_eq!(css_escaper(&r"\x".into()), r"\\x");
    }

    #[test]
    fn test_css_value_filter() {
        let cases = [
            ("", ""),
            ("foo", "foo"),
            ("0", "0"),
            ("0px", "0px"),
            ("-5px", "-5px"),
            ("1.25in", "1.25in"),
            ("+.33em", "+.33em"),
            ("100%", "100%"),
            ("12.5%", "12.5%"),
            (".foo", ".foo"),
            ("#bar", "#bar"),
            ("corner-radius", "corner-radius"),
            ("-moz-corner-radius", "-moz-corner-radius"),
            ("#000", "#000"),
            ("#48f", "#48f"),
            ("#123456", "#123456"),
            ("U+00-FF, U+980-9FF", "U+00-FF, U+980-9FF"),
            ("color: red", "color: red"),
            ("<!--", "ZgotmplZ"),
            ("-->", "ZgotmplZ"),
            ("<![CDATA[", "ZgotmplZ"),
            ("]]>", "ZgotmplZ"),
            ("</style", "ZgotmplZ"),
            (r#"""#, "ZgotmplZ"),
            ("'", "ZgotmplZ"),
            ("`", "ZgotmplZ"),
            ("\x00", "ZgotmplZ"),
            ("/* foo */", "ZgotmplZ"),
            ("//", "ZgotmplZ"),
            ("[href=~", "ZgotmplZ"),
            ("expression(alert(1337))", "ZgotmplZ"),
            ("-expression(alert(1337))", "ZgotmplZ"),
            ("expression", "ZgotmplZ"),
            ("Expression", "ZgotmplZ"),
            ("EXPRESSION", "ZgotmplZ"),
            ("-moz-binding", "ZgotmplZ"),
            (r"-expr\essio\6E(alert(1337))", "ZgotmplZ"),
            (r"-expr\65\ssio\6E(alert(1337))", "ZgotmplZ"),
            ("@import url evil.css", "ZgotmplZ"),
        ];
        for (input, want) in cases {
            assert_eq!(css_value_filter(&input.into()), want, "{:?}", input);
        }
        assert_eq!(css_value_filter(&Content::Css("a{b:c}".into())), "a{b:c}");
    }
}
