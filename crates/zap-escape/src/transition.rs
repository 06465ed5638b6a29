//! Context transitions over static template text.
//!
//! Each transition consumes a prefix of its input and returns the context
//! after it with the number of bytes consumed. Callers loop until the input
//! is exhausted.

use crate::attr::attr_type;
use crate::content::ContentType;
use crate::context::{Attr, Context, Delim, Element, JsCtx, State, UrlPart, attr_start_state};
use crate::css::{decode_css, ends_with_css_keyword};
use crate::error::{EscapeError, ErrorCode};
use crate::html::unescape_entities;
use crate::js::next_js_ctx;

type Step = Result<(Context, usize), EscapeError>;

/// Runs the transition for `c.state` over a prefix of `s`.
pub fn transition(c: Context, s: &[u8]) -> Step {
    transition_in(c.state, c, s)
}

/// Like [`transition`] but with the transition chosen by `state`.
pub(crate) fn transition_in(state: State, c: Context, s: &[u8]) -> Step {
    match state {
        State::Text => Ok(t_text(c, s)),
        State::Tag => t_tag(c, s),
        State::AttrName => t_attr_name(c, s),
        State::AfterName => Ok(t_after_name(c, s)),
        State::BeforeValue => Ok(t_before_value(c, s)),
        State::HtmlCmt => Ok(t_html_cmt(c, s)),
        State::Rcdata => Ok(t_special_tag_end(c, s)),
        State::Attr => Ok((c, s.len())),
        State::Url => Ok(t_url(c, s)),
        State::Js => t_js(c, s),
        State::JsDqStr | State::JsSqStr | State::JsRegexp => t_js_delimited(c, s),
        State::JsBlockCmt | State::CssBlockCmt => Ok(t_block_cmt(c, s)),
        State::JsLineCmt | State::CssLineCmt => Ok(t_line_cmt(c, s)),
        State::Css => Ok(t_css(c, s)),
        State::CssDqStr | State::CssSqStr | State::CssDqUrl | State::CssSqUrl | State::CssUrl => {
            t_css_str(c, s)
        }
    }
}

/// Consumes the prefix of `s` up to an attribute end or a special end tag.
///
/// Attribute values are entity decoded before their transitions run, so
/// `onclick="alert(&quot;Hi!&quot;)"` is seen as a JS string.
pub fn context_after_text(c: Context, s: &[u8]) -> Step {
    if c.delim == Delim::None {
        let (c1, i) = t_special_tag_end(c, s);
        if i == 0 {
            // `</script>` and friends: everything before it was consumed.
            return Ok((c1, 0));
        }
        return transition(c, &s[..i]);
    }

    let ends = c.delim.ends();
    let i = s.iter().position(|b| ends.contains(b)).unwrap_or(s.len());
    if c.delim == Delim::SpaceOrTagEnd {
        // HTML parsers disagree on where `<a id= onclick=f(` ends.
        if let Some(j) = s[..i].iter().position(|b| b"\"'<=`".contains(b)) {
            return Err(EscapeError::new(
                ErrorCode::BadHtml,
                format!("{:?} in unquoted attr: {:?}", s[j] as char, String::from_utf8_lossy(&s[..i])),
            ));
        }
    }
    if i == s.len() {
        let decoded = unescape_entities(&String::from_utf8_lossy(s)).into_owned();
        let mut c = c;
        let mut u = decoded.as_bytes();
        while !u.is_empty() {
            let (c1, n) = transition(c, u)?;
            if n == 0 && c1 == c {
                break;
            }
            c = c1;
            u = &u[n..];
        }
        return Ok((c, s.len()));
    }

    let consumed = if c.delim == Delim::SpaceOrTagEnd { i } else { i + 1 };
    // Leaving the value keeps only the element.
    Ok((Context::tag(c.element), consumed))
}

fn t_text(c: Context, s: &[u8]) -> (Context, usize) {
    let mut k = 0;
    loop {
        let Some(off) = s[k..].iter().position(|&b| b == b'<') else {
            return (c, s.len());
        };
        let mut i = k + off;
        if i + 1 == s.len() {
            return (c, s.len());
        }
        if s[i..].starts_with(b"<!--") {
            return (Context::new(State::HtmlCmt), i + 4);
        }
        i += 1;
        let mut end = false;
        if s[i] == b'/' {
            if i + 1 == s.len() {
                return (c, s.len());
            }
            end = true;
            i += 1;
        }
        let (j, element) = eat_tag_name(s, i);
        if j != i {
            let element = if end { Element::None } else { element };
            return (Context::tag(element), j);
        }
        k = j;
    }
}

fn t_tag(c: Context, s: &[u8]) -> Step {
    let i = eat_white_space(s, 0);
    if i == s.len() {
        return Ok((c, s.len()));
    }
    if s[i] == b'>' {
        let next = Context { state: c.element.content_state(), element: c.element, ..Context::default() };
        return Ok((next, i + 1));
    }
    let j = eat_attr_name(s, i)?;
    if i == j {
        return Err(EscapeError::new(
            ErrorCode::BadHtml,
            format!(
                "expected space, attr name, or end of tag, but got {:?}",
                String::from_utf8_lossy(&s[i..])
            ),
        ));
    }
    let name = String::from_utf8_lossy(&s[i..j]).to_lowercase();
    let attr = match attr_type(&name) {
        ContentType::Url => Attr::Url,
        ContentType::Css => Attr::Style,
        ContentType::Js => Attr::Script,
        _ => Attr::None,
    };
    let state = if j == s.len() { State::AttrName } else { State::AfterName };
    Ok((Context { state, element: c.element, attr, ..Context::default() }, j))
}

fn t_attr_name(c: Context, s: &[u8]) -> Step {
    let i = eat_attr_name(s, 0)?;
    let mut c = c;
    if i != s.len() {
        c.state = State::AfterName;
    }
    Ok((c, i))
}

fn t_after_name(c: Context, s: &[u8]) -> (Context, usize) {
    let i = eat_white_space(s, 0);
    if i == s.len() {
        return (c, s.len());
    }
    let mut c = c;
    if s[i] != b'=' {
        // A valueless attribute or the end of the tag.
        c.state = State::Tag;
        return (c, i);
    }
    c.state = State::BeforeValue;
    (c, i + 1)
}

fn t_before_value(c: Context, s: &[u8]) -> (Context, usize) {
    let mut i = eat_white_space(s, 0);
    if i == s.len() {
        return (c, s.len());
    }
    let delim = match s[i] {
        b'\'' => {
            i += 1;
            Delim::SingleQuote
        }
        b'"' => {
            i += 1;
            Delim::DoubleQuote
        }
        _ => Delim::SpaceOrTagEnd,
    };
    let mut c = c;
    c.state = attr_start_state(c.attr);
    c.delim = delim;
    c.attr = Attr::None;
    (c, i)
}

fn t_html_cmt(c: Context, s: &[u8]) -> (Context, usize) {
    match find(s, b"-->") {
        Some(i) => (Context::default(), i + 3),
        None => (c, s.len()),
    }
}

/// Finds the end tag of a `<script>`, `<style>`, `<textarea>` or `<title>`
/// body, case-insensitively.
fn t_special_tag_end(c: Context, s: &[u8]) -> (Context, usize) {
    if let Some(marker) = c.element.end_marker() {
        let lower = s.to_ascii_lowercase();
        if let Some(i) = find(&lower, marker) {
            return (Context::default(), i);
        }
    }
    (c, s.len())
}

fn t_url(c: Context, s: &[u8]) -> (Context, usize) {
    let mut c = c;
    if s.iter().any(|&b| b == b'#' || b == b'?') {
        c.url_part = UrlPart::QueryOrFrag;
    } else if s.len() != eat_white_space(s, 0) && c.url_part == UrlPart::None {
        // Attribute URLs may be surrounded by spaces.
        c.url_part = UrlPart::PreQuery;
    }
    (c, s.len())
}

fn t_js(c: Context, s: &[u8]) -> Step {
    let mut c = c;
    let Some(mut i) = s.iter().position(|&b| matches!(b, b'"' | b'\'' | b'/')) else {
        c.js_ctx = next_js_ctx(s, c.js_ctx);
        return Ok((c, s.len()));
    };
    c.js_ctx = next_js_ctx(&s[..i], c.js_ctx);
    match s[i] {
        b'"' => {
            c.state = State::JsDqStr;
            c.js_ctx = JsCtx::Regexp;
        }
        b'\'' => {
            c.state = State::JsSqStr;
            c.js_ctx = JsCtx::Regexp;
        }
        _ => match s.get(i + 1) {
            Some(b'/') => {
                c.state = State::JsLineCmt;
                i += 1;
            }
            Some(b'*') => {
                c.state = State::JsBlockCmt;
                i += 1;
            }
            _ => match c.js_ctx {
                JsCtx::Regexp => c.state = State::JsRegexp,
                JsCtx::DivOp => c.js_ctx = JsCtx::Regexp,
                JsCtx::Unknown => {
                    let tail: String = String::from_utf8_lossy(&s[i..]).chars().take(32).collect();
                    return Err(EscapeError::new(
                        ErrorCode::SlashAmbig,
                        format!("'/' could start a division or regexp: {:?}", tail),
                    ));
                }
            },
        },
    }
    Ok((c, i + 1))
}

fn t_js_delimited(c: Context, s: &[u8]) -> Step {
    let specials: &[u8] = match c.state {
        State::JsSqStr => b"\\'",
        State::JsRegexp => b"\\/[]",
        _ => b"\\\"",
    };

    let mut k = 0;
    let mut in_charset = false;
    while let Some(off) = s[k..].iter().position(|b| specials.contains(b)) {
        let mut i = k + off;
        match s[i] {
            b'\\' => {
                i += 1;
                if i == s.len() {
                    return Err(EscapeError::new(
                        ErrorCode::PartialEscape,
                        format!("unfinished escape sequence in JS string: {:?}", String::from_utf8_lossy(s)),
                    ));
                }
            }
            b'[' => in_charset = true,
            b']' => in_charset = false,
            _ => {
                // The closing delimiter.
                if !in_charset {
                    let mut c = c;
                    c.state = State::Js;
                    c.js_ctx = JsCtx::DivOp;
                    return Ok((c, i + 1));
                }
            }
        }
        k = i + 1;
    }

    if in_charset {
        return Err(EscapeError::new(
            ErrorCode::PartialCharset,
            format!("unfinished JS regexp charset: {:?}", String::from_utf8_lossy(s)),
        ));
    }
    Ok((c, s.len()))
}

fn t_block_cmt(c: Context, s: &[u8]) -> (Context, usize) {
    let Some(i) = find(s, b"*/") else {
        return (c, s.len());
    };
    let mut c = c;
    c.state = if c.state == State::CssBlockCmt { State::Css } else { State::Js };
    (c, i + 2)
}

fn t_line_cmt(c: Context, s: &[u8]) -> (Context, usize) {
    let (end, state) = if c.state == State::CssLineCmt {
        (s.iter().position(|&b| matches!(b, b'\n' | b'\x0c' | b'\r')), State::Css)
    } else {
        (js_line_terminator(s), State::Js)
    };
    match end {
        // The terminator itself is not part of the comment.
        Some(i) => {
            let mut c = c;
            c.state = state;
            (c, i)
        }
        None => (c, s.len()),
    }
}

fn js_line_terminator(s: &[u8]) -> Option<usize> {
    s.iter().enumerate().position(|(i, &b)| {
        b == b'\n' || b == b'\r' || (b == 0xe2 && matches!(s.get(i + 1..i + 3), Some([0x80, 0xa8 | 0xa9])))
    })
}

fn t_css(c: Context, s: &[u8]) -> (Context, usize) {
    // Quoted strings are treated as URLs: fonts and list separators never get
    // past the pre-query part, and selectors only hold URL-escaped content.
    let mut c = c;
    let mut k = 0;
    while let Some(off) = s[k..].iter().position(|&b| matches!(b, b'(' | b'"' | b'\'' | b'/')) {
        let i = k + off;
        match s[i] {
            b'(' => {
                let p = trim_css_space_end(&s[..i]);
                if ends_with_css_keyword(p, "url") {
                    let mut j = i + 1 + s[i + 1..].iter().take_while(|&&b| is_css_space_byte(b)).count();
                    match s.get(j) {
                        Some(b'"') => {
                            c.state = State::CssDqUrl;
                            j += 1;
                        }
                        Some(b'\'') => {
                            c.state = State::CssSqUrl;
                            j += 1;
                        }
                        _ => c.state = State::CssUrl,
                    }
                    return (c, j);
                }
            }
            b'/' => match s.get(i + 1) {
                Some(b'/') => {
                    c.state = State::CssLineCmt;
                    return (c, i + 2);
                }
                Some(b'*') => {
                    c.state = State::CssBlockCmt;
                    return (c, i + 2);
                }
                _ => {}
            },
            b'"' => {
                c.state = State::CssDqStr;
                return (c, i + 1);
            }
            _ => {
                c.state = State::CssSqStr;
                return (c, i + 1);
            }
        }
        k = i + 1;
    }
    (c, s.len())
}

fn t_css_str(c: Context, s: &[u8]) -> Step {
    let end_and_esc: &[u8] = match c.state {
        State::CssDqStr | State::CssDqUrl => b"\\\"",
        State::CssSqStr | State::CssSqUrl => b"\\'",
        // Unquoted URLs end at whitespace or a close paren.
        _ => b"\\\t\n\x0c\r )",
    };

    let mut c = c;
    let mut k = 0;
    loop {
        let Some(off) = s[k..].iter().position(|b| end_and_esc.contains(b)) else {
            let (c1, _) = t_url(c, &decode_css(&s[k..]));
            return Ok((c1, s.len()));
        };
        let mut i = k + off;
        if s[i] == b'\\' {
            i += 1;
            if i == s.len() {
                return Err(EscapeError::new(
                    ErrorCode::PartialEscape,
                    format!("unfinished escape sequence in CSS string: {:?}", String::from_utf8_lossy(s)),
                ));
            }
        } else {
            c.state = State::Css;
            return Ok((c, i + 1));
        }
        c = t_url(c, &decode_css(&s[..i + 1])).0;
        k = i + 1;
    }
}

fn eat_attr_name(s: &[u8], i: usize) -> Result<usize, EscapeError> {
    for j in i..s.len() {
        match s[j] {
            b' ' | b'\t' | b'\n' | b'\x0c' | b'\r' | b'=' | b'>' => return Ok(j),
            b'\'' | b'"' | b'<' => {
                let shown: String = String::from_utf8_lossy(s).chars().take(32).collect();
                return Err(EscapeError::new(
                    ErrorCode::BadHtml,
                    format!("{:?} in attribute name: {:?}", s[j] as char, shown),
                ));
            }
            _ => {}
        }
    }
    Ok(s.len())
}

/// Returns the end of the tag name starting at `i` and its element.
fn eat_tag_name(s: &[u8], i: usize) -> (usize, Element) {
    if i == s.len() || !s[i].is_ascii_alphabetic() {
        return (i, Element::None);
    }
    let mut j = i + 1;
    while j < s.len() {
        let x = s[j];
        if x.is_ascii_alphanumeric() {
            j += 1;
            continue;
        }
        // "x-y" and "x:y", but not "x-", "-y" or "x--y".
        if (x == b':' || x == b'-') && j + 1 < s.len() && s[j + 1].is_ascii_alphanumeric() {
            j += 2;
            continue;
        }
        break;
    }
    (j, Element::from_tag_name(&s[i..j]))
}

fn eat_white_space(s: &[u8], i: usize) -> usize {
    s[i..].iter().position(|&b| !is_css_space_byte(b)).map_or(s.len(), |j| i + j)
}

fn is_css_space_byte(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\x0c' | b'\r')
}

fn trim_css_space_end(s: &[u8]) -> &[u8] {
    let n = s.iter().rev().take_while(|&&b| is_css_space_byte(b)).count();
    &s[..s.len() - n]
}

pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Runs `context_after_text` over the whole input, starting in text.
    fn after(s: &str) -> Result<Context, EscapeError> {
        let s = s.as_bytes();
        let mut c = Context::default();
        let mut i = 0;
        while i < s.len() {
            let (c1, n) = context_after_text(c, &s[i..])?;
            c = c1;
            i += n;
        }
        Ok(c)
    }

    #[test]
    fn test_text_to_tag() {
        let c = after("<a").unwrap();
        assert_eq!(c.state, State::Tag);
        let c = after("<script").unwrap();
        assert_eq!(c, Context::tag(Element::Script));
        assert_eq!(after("I <3 Ponies!").unwrap().state, State::Text);
        assert_eq!(after("<").unwrap().state, State::Text);
    }

    #[test]
    fn test_unquoted_attr_errors() {
        let err = after("<a id=x\"").unwrap_err();
        assert_eq!(err.code, ErrorCode::BadHtml);
    }

    #[test]
    fn test_attr_name_errors() {
        let err = after("<a b\"c").unwrap_err();
        assert_eq!(err.code, ErrorCode::BadHtml);
        assert!(err.description.contains("in attribute name"));
    }

    #[test]
    fn test_slash_ambiguity() {
        let c = Context { state: State::Js, js_ctx: JsCtx::Unknown, ..Context::default() };
        let err = transition(c, b"/x").unwrap_err();
        assert_eq!(err.code, ErrorCode::SlashAmbig);
    }

    #[test]
    fn test_partial_escape_and_charset() {
        let c = Context::new(State::JsDqStr);
        assert_eq!(transition(c, b"abc\\").unwrap_err().code, ErrorCode::PartialEscape);
        let c = Context::new(State::JsRegexp);
        assert_eq!(transition(c, b"[abc").unwrap_err().code, ErrorCode::PartialCharset);
        let c = Context::new(State::CssDqStr);
        assert_eq!(transition(c, b"abc\\").unwrap_err().code, ErrorCode::PartialEscape);
    }

    #[test]
    fn test_special_tag_end_is_case_insensitive() {
        assert_eq!(after("<textarea>value</TEXTAREA>").unwrap(), Context::default());
        assert_eq!(after("<script>a</Script >").unwrap().state, State::Text);
    }

    #[test]
    fn test_js_line_terminators() {
        let c = Context::new(State::JsLineCmt);
        assert_eq!(transition(c, "a\u{2028}b".as_bytes()).unwrap(), (Context::new(State::Js), 1));
        let c = Context::new(State::CssLineCmt);
        assert_eq!(transition(c, b"a\x0cb").unwrap(), (Context::new(State::Css), 1));
    }
}
