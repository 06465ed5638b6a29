//! JavaScript escapers and the regexp/division heuristic.

use crate::content::{Content, ContentType};
use crate::context::JsCtx;
use serde_json::Value;

/// Decides whether a `/` following the token run `s` starts a regular
/// expression or is a division operator.
///
/// `s` holds no strings, comments, regexps or division operators. One token
/// of lookbehind is enough for every useful program; `x = ++/foo/i` is
/// misread as a division.
pub(crate) fn next_js_ctx(s: &[u8], preceding: JsCtx) -> JsCtx {
    let s = trim_js_space(s);
    let Some(&c) = s.last() else {
        return preceding;
    };
    let n = s.len();
    match c {
        b'+' | b'-' => {
            // `++` and `--` end an operand; a lone `+` or `-` is an operator.
            let run = s.iter().rev().take_while(|&&b| b == c).count();
            if run % 2 == 1 { JsCtx::Regexp } else { JsCtx::DivOp }
        }
        b'.' => {
            // "42."
            if n != 1 && s[n - 2].is_ascii_digit() {
                JsCtx::DivOp
            } else {
                JsCtx::Regexp
            }
        }
        b',' | b'<' | b'>' | b'=' | b'*' | b'%' | b'&' | b'|' | b'^' | b'?' => JsCtx::Regexp,
        b'!' | b'~' => JsCtx::Regexp,
        b'(' | b'[' => JsCtx::Regexp,
        b':' | b';' | b'{' => JsCtx::Regexp,
        // Object literals are rarely divided; `} /foo/.test(x)` is common.
        b'}' => JsCtx::Regexp,
        _ => {
            let word = s.len() - s.iter().rev().take_while(|&&b| is_js_ident_part(b as char)).count();
            if is_regexp_preceder(&s[word..]) {
                JsCtx::Regexp
            } else {
                JsCtx::DivOp
            }
        }
    }
}

fn trim_js_space(mut s: &[u8]) -> &[u8] {
    loop {
        match s {
            [rest @ .., b'\t' | b'\n' | b'\x0c' | b'\r' | b' '] => s = rest,
            // U+2028 and U+2029
            [rest @ .., 0xe2, 0x80, 0xa8 | 0xa9] => s = rest,
            _ => return s,
        }
    }
}

fn is_regexp_preceder(word: &[u8]) -> bool {
    matches!(
        word,
        b"break"
            | b"case"
            | b"continue"
            | b"delete"
            | b"do"
            | b"else"
            | b"finally"
            | b"in"
            | b"instanceof"
            | b"return"
            | b"throw"
            | b"try"
            | b"typeof"
            | b"void"
    )
}

/// Covers every character of numeric literals and keywords, not all of
/// Unicode's identifier characters.
pub(crate) fn is_js_ident_part(c: char) -> bool {
    c == '$' || c == '_' || c.is_ascii_alphanumeric()
}

/// Encodes a value as a JavaScript expression.
///
/// `Js` passes through and `JsStr` is wrapped in quotes; everything else
/// becomes a JSON string.
pub fn js_val_escaper(value: &Content) -> String {
    match value {
        Content::Js(s) => s.clone(),
        Content::JsStr(s) => format!("\"{}\"", s),
        other => js_value(&Value::String(other.as_str().to_string())),
    }
}

/// Encodes a JSON value so it is safe inside `<script>` and event handlers.
pub fn js_value(value: &Value) -> String {
    let json = match serde_json::to_string(value) {
        Ok(json) => json,
        // A space keeps `x/{{.}}` from turning into a line comment.
        Err(err) => return format!(" /* {} */null ", err.to_string().replace("*/", "* /")),
    };
    if json.is_empty() {
        return " null ".to_string();
    }

    let mut out = String::with_capacity(json.len() + 2);
    // Keep identifiers and numbers from running into `in`, `typeof`, ...
    let pad = json.chars().next().is_some_and(is_js_ident_part)
        || json.chars().next_back().is_some_and(is_js_ident_part);
    if pad {
        out.push(' ');
    }
    for c in json.chars() {
        match c {
            '<' => out.push_str(r"\u003c"),
            '>' => out.push_str(r"\u003e"),
            '&' => out.push_str(r"\u0026"),
            '\u{2028}' => out.push_str(r"\u2028"),
            '\u{2029}' => out.push_str(r"\u2029"),
            c => out.push(c),
        }
    }
    if pad {
        out.push(' ');
    }
    out
}

fn js_str_replacement(c: char) -> Option<&'static str> {
    match c {
        '\\' => Some(r"\\"),
        other => js_str_norm_replacement(other),
    }
}

/// Like [`js_str_replacement`] but keeps existing backslash escapes.
fn js_str_norm_replacement(c: char) -> Option<&'static str> {
    match c {
        '\0' => Some(r"\0"),
        '\t' => Some(r"\t"),
        '\n' => Some(r"\n"),
        // "\v" == "v" on IE 6.
        '\x0b' => Some(r"\x0b"),
        '\x0c' => Some(r"\f"),
        '\r' => Some(r"\r"),
        // HTML specials are hex encoded so the output is attribute safe.
        '"' => Some(r"\x22"),
        '&' => Some(r"\x26"),
        '\'' => Some(r"\x27"),
        '+' => Some(r"\x2b"),
        '/' => Some(r"\/"),
        '<' => Some(r"\x3c"),
        '>' => Some(r"\x3e"),
        _ => None,
    }
}

fn js_regexp_replacement(c: char) -> Option<&'static str> {
    match c {
        '$' => Some(r"\$"),
        '(' => Some(r"\("),
        ')' => Some(r"\)"),
        '*' => Some(r"\*"),
        '-' => Some(r"\-"),
        '.' => Some(r"\."),
        '?' => Some(r"\?"),
        '[' => Some(r"\["),
        ']' => Some(r"\]"),
        '^' => Some(r"\^"),
        '{' => Some(r"\{"),
        '|' => Some(r"\|"),
        '}' => Some(r"\}"),
        other => js_str_replacement(other),
    }
}

/// Replaces characters per `table`, plus the JS line terminators U+2028
/// and U+2029.
fn replace(s: &str, table: fn(char) -> Option<&'static str>) -> String {
    let mut out = crate::content::Rewriter::new(s);
    for (i, c) in s.char_indices() {
        let repl = match c {
            '\u{2028}' => Some(r"\u2028"),
            '\u{2029}' => Some(r"\u2029"),
            c => table(c),
        };
        if let Some(repl) = repl {
            out.replace(i, c.len_utf8(), repl);
        }
    }
    out.finish()
}

/// Escapes for the inside of a JS string literal.
pub fn js_str_escaper(value: &Content) -> String {
    if value.content_type() == ContentType::JsStr {
        return replace(value.as_str(), js_str_norm_replacement);
    }
    replace(value.as_str(), js_str_replacement)
}

/// Escapes for the inside of a JS regexp literal.
pub fn js_regexp_escaper(value: &Content) -> String {
    let s = replace(value.as_str(), js_regexp_replacement);
    if s.is_empty() {
        // `/{{.X}}/` must not become a line comment.
        return "(?:)".to_string();
    }
    s
}
