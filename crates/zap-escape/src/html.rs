//! HTML escapers, tag stripping and character reference decoding.

use crate::attr::attr_type;
use crate::content::{Content, ContentType, Rewriter};
use crate::context::{Context, Delim, Element, State};
use crate::funcs::FILTER_FAILSAFE;
use crate::transition::transition_in;
use once_cell::sync::Lazy;
use std::borrow::Cow;
use std::collections::HashMap;

/// Escapes for HTML text. `Html` content passes through.
pub fn html_escaper(value: &Content) -> String {
    let s = value.as_str();
    if value.content_type() == ContentType::Html {
        return s.to_string();
    }
    html_replacer(s, html_replacement, true)
}

/// Escapes for a quoted attribute value. `Html` content loses its tags.
pub fn attr_escaper(value: &Content) -> String {
    let s = value.as_str();
    if value.content_type() == ContentType::Html {
        return html_replacer(&strip_tags(s), html_norm_replacement, true);
    }
    html_replacer(s, html_replacement, true)
}

/// Escapes for the body of `<textarea>` or `<title>`.
pub fn rcdata_escaper(value: &Content) -> String {
    let s = value.as_str();
    if value.content_type() == ContentType::Html {
        return html_replacer(s, html_norm_replacement, true);
    }
    html_replacer(s, html_replacement, true)
}

/// Escapes for an unquoted attribute value.
pub fn nospace_escaper(value: &Content) -> String {
    let s = value.as_str();
    if value.content_type() == ContentType::Html {
        return html_replacer(&strip_tags(s), nospace_norm_replacement, false);
    }
    html_replacer(s, nospace_replacement, false)
}

/// Accepts lowercase alphanumeric attribute or tag names whose values
/// would be plain text. `HtmlAttr` content passes through.
pub fn html_name_filter(value: &Content) -> String {
    let s = value.as_str();
    if value.content_type() == ContentType::HtmlAttr {
        return s.to_string();
    }
    // `<input checked {{.K}}={{.V}}>` with an empty name would make .V the
    // value of `checked`.
    if s.is_empty() {
        return FILTER_FAILSAFE.to_string();
    }
    let s = s.to_lowercase();
    if attr_type(&s) != ContentType::Plain {
        return FILTER_FAILSAFE.to_string();
    }
    if !s.bytes().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()) {
        return FILTER_FAILSAFE.to_string();
    }
    s
}

/// Drops everything interpolated into a comment.
pub fn comment_escaper(_value: &Content) -> String {
    String::new()
}

fn html_replacement(c: char) -> Option<&'static str> {
    match c {
        '\0' => Some("\u{FFFD}"),
        '&' => Some("&amp;"),
        other => html_norm_replacement(other),
    }
}

/// Like [`html_replacement`] but leaves `&` so entities are not encoded twice.
fn html_norm_replacement(c: char) -> Option<&'static str> {
    match c {
        '\0' => Some("\u{FFFD}"),
        '"' => Some("&#34;"),
        '\'' => Some("&#39;"),
        '+' => Some("&#43;"),
        '<' => Some("&lt;"),
        '>' => Some("&gt;"),
        _ => None,
    }
}

fn nospace_replacement(c: char) -> Option<&'static str> {
    match c {
        '&' => Some("&amp;"),
        other => nospace_norm_replacement(other),
    }
}

fn nospace_norm_replacement(c: char) -> Option<&'static str> {
    match c {
        '\0' => Some("&#xfffd;"),
        '\t' => Some("&#9;"),
        '\n' => Some("&#10;"),
        '\x0b' => Some("&#11;"),
        '\x0c' => Some("&#12;"),
        '\r' => Some("&#13;"),
        ' ' => Some("&#32;"),
        '"' => Some("&#34;"),
        '\'' => Some("&#39;"),
        '+' => Some("&#43;"),
        '<' => Some("&lt;"),
        '=' => Some("&#61;"),
        '>' => Some("&gt;"),
        // IE treats a backtick as a quote.
        '`' => Some("&#96;"),
        _ => None,
    }
}

/// Replaces characters per `table`. Unless `bad_runes` is set, noncharacters
/// are written as numeric references.
fn html_replacer(s: &str, table: fn(char) -> Option<&'static str>, bad_runes: bool) -> String {
    let mut out = Rewriter::new(s);
    for (i, c) in s.char_indices() {
        if let Some(repl) = table(c) {
            out.replace(i, c.len_utf8(), repl);
        } else if !bad_runes && matches!(c as u32, 0xfdd0..=0xfdef | 0xfff0..=0xffff) {
            out.replace(i, c.len_utf8(), &format!("&#x{:x};", c as u32));
        }
    }
    out.finish()
}

/// Returns the text content of an HTML snippet.
///
/// `<b>&iexcl;Hi!</b> <script>...</script>` becomes `&iexcl;Hi! `. Character
/// references are kept as they are.
pub fn strip_tags(html: &str) -> Cow<'_, str> {
    let s = html.as_bytes();
    let mut b: Vec<u8> = Vec::new();
    let mut c = Context::default();
    let mut i = 0;
    let mut all_text = true;
    let mut broken = false;

    while i != s.len() {
        if c.delim == Delim::None {
            let mut st = c.state;
            // Element bodies are skipped like RCDATA instead of being parsed.
            if c.element != Element::None && !st.is_in_tag() {
                st = State::Rcdata;
            }
            let (d, nread) = match transition_in(st, c, &s[i..]) {
                Ok(next) => next,
                Err(_) => {
                    all_text = false;
                    broken = true;
                    break;
                }
            };
            let i1 = i + nread;
            if c.state == State::Text || c.state == State::Rcdata {
                // Emit text up to the start of the tag or comment.
                let mut j = i1;
                if d.state != c.state {
                    if let Some(k) = s[i..i1].iter().rposition(|&ch| ch == b'<') {
                        j = i + k;
                    }
                }
                b.extend_from_slice(&s[i..j]);
            } else {
                all_text = false;
            }
            c = d;
            i = i1;
            continue;
        }
        let Some(k) = s[i..].iter().position(|ch| c.delim.ends().contains(ch)) else {
            break;
        };
        let mut i1 = i + k;
        if c.delim != Delim::SpaceOrTagEnd {
            i1 += 1;
        }
        c = Context::tag(c.element);
        i = i1;
    }

    if all_text {
        return Cow::Borrowed(html);
    }
    if !broken && (c.state == State::Text || c.state == State::Rcdata) {
        b.extend_from_slice(&s[i..]);
    }
    Cow::Owned(String::from_utf8_lossy(&b).into_owned())
}

static ENTITIES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("amp", "&"),
        ("AMP", "&"),
        ("lt", "<"),
        ("LT", "<"),
        ("gt", ">"),
        ("GT", ">"),
        ("quot", "\""),
        ("QUOT", "\""),
        ("apos", "'"),
        ("nbsp", "\u{a0}"),
        ("copy", "\u{a9}"),
        ("reg", "\u{ae}"),
        ("iexcl", "\u{a1}"),
        ("cent", "\u{a2}"),
        ("pound", "\u{a3}"),
        ("curren", "\u{a4}"),
        ("yen", "\u{a5}"),
        ("brvbar", "\u{a6}"),
        ("sect", "\u{a7}"),
        ("uml", "\u{a8}"),
        ("ordf", "\u{aa}"),
        ("laquo", "\u{ab}"),
        ("not", "\u{ac}"),
        ("shy", "\u{ad}"),
        ("macr", "\u{af}"),
        ("deg", "\u{b0}"),
        ("plusmn", "\u{b1}"),
        ("sup2", "\u{b2}"),
        ("sup3", "\u{b3}"),
        ("acute", "\u{b4}"),
        ("micro", "\u{b5}"),
        ("para", "\u{b6}"),
        ("middot", "\u{b7}"),
        ("cedil", "\u{b8}"),
        ("sup1", "\u{b9}"),
        ("ordm", "\u{ba}"),
        ("raquo", "\u{bb}"),
        ("frac14", "\u{bc}"),
        ("frac12", "\u{bd}"),
        ("frac34", "\u{be}"),
        ("iquest", "\u{bf}"),
        ("times", "\u{d7}"),
        ("divide", "\u{f7}"),
        ("ndash", "\u{2013}"),
        ("mdash", "\u{2014}"),
        ("lsquo", "\u{2018}"),
        ("rsquo", "\u{2019}"),
        ("ldquo", "\u{201c}"),
        ("rdquo", "\u{201d}"),
        ("bull", "\u{2022}"),
        ("hellip", "\u{2026}"),
        ("euro", "\u{20ac}"),
        ("trade", "\u{2122}"),
        ("Tab", "\t"),
        ("NewLine", "\n"),
        ("excl", "!"),
        ("num", "#"),
        ("dollar", "$"),
        ("percnt", "%"),
        ("lpar", "("),
        ("rpar", ")"),
        ("ast", "*"),
        ("plus", "+"),
        ("comma", ","),
        ("period", "."),
        ("sol", "/"),
        ("colon", ":"),
        ("semi", ";"),
        ("equals", "="),
        ("quest", "?"),
        ("commat", "@"),
        ("lsqb", "["),
        ("bsol", "\\"),
        ("rsqb", "]"),
        ("Hat", "^"),
        ("lowbar", "_"),
        ("grave", "`"),
        ("lcub", "{"),
        ("verbar", "|"),
        ("rcub", "}"),
    ]
    .into_iter()
    .collect()
});

/// Named references browsers accept without the trailing `;`.
const LEGACY_ENTITIES: &[&str] = &[
    "AMP", "GT", "LT", "QUOT", "amp", "copy", "gt", "lt", "nbsp", "quot", "reg",
];

/// Decodes HTML character references.
pub fn unescape_entities(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp + 1..];
        match decode_reference(tail) {
            Some((decoded, used)) => {
                out.push_str(&decoded);
                rest = &tail[used..];
            }
            None => {
                out.push('&');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Decodes the reference at the start of `s`, which follows an `&`.
fn decode_reference(s: &str) -> Option<(String, usize)> {
    let bytes = s.as_bytes();
    if let Some(num) = s.strip_prefix('#') {
        let (radix, digits_at) = match num.as_bytes().first() {
            Some(b'x') | Some(b'X') => (16, 2),
            _ => (10, 1),
        };
        let digits = s[digits_at..]
            .bytes()
            .take_while(|c| if radix == 16 { c.is_ascii_hexdigit() } else { c.is_ascii_digit() })
            .count();
        if digits == 0 {
            return None;
        }
        let end = digits_at + digits;
        let value = u32::from_str_radix(&s[digits_at..end], radix).unwrap_or(u32::MAX);
        let c = match value {
            0 => '\u{FFFD}',
            v => char::from_u32(v).unwrap_or('\u{FFFD}'),
        };
        let used = if bytes.get(end) == Some(&b';') { end + 1 } else { end };
        return Some((c.to_string(), used));
    }

    let len = bytes.iter().take_while(|c| c.is_ascii_alphanumeric()).count();
    if len == 0 {
        return None;
    }
    let name = &s[..len];
    if bytes.get(len) == Some(&b';') {
        if let Some(v) = ENTITIES.get(name) {
            return Some((v.to_string(), len + 1));
        }
    }
    (2..=len)
        .rev()
        .map(|j| &name[..j])
        .find(|prefix| LEGACY_ENTITIES.contains(prefix))
        .and_then(|prefix| ENTITIES.get(prefix).map(|v| (v.to_string(), prefix.len())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_escaper() {
        assert_eq!(
            html_escaper(&"<a href=\"x\">'&'+\0</a>".into()),
            "&lt;a href=&#34;x&#34;&gt;&#39;&amp;&#39;&#43;\u{FFFD}&lt;/a&gt;"
        );
        assert_eq!(html_escaper(&Content::Html("<b>hi</b>".into())), "<b>hi</b>");
    }

    #[test]
    fn test_nospace_escaper() {
        assert_eq!(nospace_escaper(&"a b=c`".into()), "a&#32;b&#61;c&#96;");
        assert_eq!(nospace_escaper(&"\u{fdd0}".into()), "&#xfdd0;");
        assert_eq!(nospace_escaper(&Content::Html("<b>x y</b>&amp;".into())), "x&#32;y&amp;");
    }

    #[test]
    fn test_attr_escaper_strips_html() {
        assert_eq!(attr_escaper(&Content::Html("<b>&iexcl;Hi!</b>".into())), "&iexcl;Hi!");
        assert_eq!(rcdata_escaper(&Content::Html("<b>&amp;</b>".into())), "&lt;b&gt;&amp;&lt;/b&gt;");
    }

    #[test]
    fn test_strip_tags() {
        let cases = [
            ("", ""),
            ("Hello, World!", "Hello, World!"),
            ("foo&amp;bar", "foo&amp;bar"),
            ("Hello <a href=\"www.example.com/\">World</a>!", "Hello World!"),
            ("Foo <textarea>Bar</textarea> Baz", "Foo Bar Baz"),
            ("Foo <!-- Bar --> Baz", "Foo  Baz"),
            ("<", "<"),
            ("foo < bar", "foo < bar"),
            ("Foo<script type=\"text/javascript\">alert(1337)</script>Bar", "FooBar"),
            ("Foo<div title=\"1>2\">Bar", "FooBar"),
            ("I <3 Ponies!", "I <3 Ponies!"),
            ("<script>foo()</script>", ""),
        ];
        for (input, want) in cases {
            assert_eq!(strip_tags(input), want, "{:?}", input);
        }
    }

    #[test]
    fn test_html_name_filter() {
        assert_eq!(html_name_filter(&"Title".into()), "title");
        assert_eq!(html_name_filter(&"".into()), FILTER_FAILSAFE);
        assert_eq!(html_name_filter(&"onclick".into()), FILTER_FAILSAFE);
        assert_eq!(html_name_filter(&"href".into()), FILTER_FAILSAFE);
        assert_eq!(html_name_filter(&"a b".into()), FILTER_FAILSAFE);
        assert_eq!(html_name_filter(&Content::HtmlAttr("onclick=\"x()\"".into())), "onclick=\"x()\"");
    }

    #[test]
    fn test_unescape_entities() {
        assert_eq!(unescape_entities("plain"), "plain");
        assert_eq!(unescape_entities("&quot;Hi&quot; &amp; &#39;x&#x27;"), "\"Hi\" & 'x'");
        assert_eq!(unescape_entities("a&ltb"), "a<b");
        assert_eq!(unescape_entities("javascript&colon;"), "javascript:");
        assert_eq!(unescape_entities("&unknown; &"), "&unknown; &");
        assert_eq!(unescape_entities("&#0;"), "\u{FFFD}");
    }
}
