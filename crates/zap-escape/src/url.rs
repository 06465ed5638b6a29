//! URL filters and escapers.

use crate::content::{Content, ContentType, is_hex};
use crate::funcs::FILTER_FAILSAFE;
use std::fmt::Write;

/// Defangs URLs with a scheme other than `http`, `https` or `mailto`.
pub fn url_filter(value: &Content) -> String {
    let s = value.as_str();
    if value.content_type() == ContentType::Url {
        return s.to_string();
    }
    if let Some(i) = s.find(':') {
        if !s[..i].contains('/') {
            let scheme = s[..i].to_ascii_lowercase();
            if scheme != "http" && scheme != "https" && scheme != "mailto" {
                return format!("#{}", FILTER_FAILSAFE);
            }
        }
    }
    s.to_string()
}

/// Percent-encodes everything but RFC 3986 unreserved characters, for use
/// inside a query or fragment. Values already typed as URLs are normalized
/// instead.
pub fn url_escaper(value: &Content) -> String {
    if value.content_type() == ContentType::Url {
        return url_normalizer(value);
    }
    urlencoding::encode(value.as_str()).into_owned()
}

/// Percent-encodes only what is invalid in a URL, keeping reserved
/// characters and existing escapes.
pub fn url_normalizer(value: &Content) -> String {
    let bytes = value.as_str().as_bytes();
    let mut out = String::with_capacity(bytes.len());
    for (i, &c) in bytes.iter().enumerate() {
        let keep = match c {
            b'!' | b'#' | b'$' | b'&' | b'*' | b'+' | b',' | b'/' | b':' | b';' | b'=' | b'?' | b'@'
            | b'[' | b']' | b'-' | b'.' | b'_' | b'~' => true,
            b'%' => i + 2 < bytes.len() && is_hex(bytes[i + 1]) && is_hex(bytes[i + 2]),
            c => c.is_ascii_alphanumeric(),
        };
        if keep {
            out.push(c as char);
        } else {
            let _ = write!(out, "%{:02X}", c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_filter() {
        assert_eq!(url_filter(&"http://x/".into()), "http://x/");
        assert_eq!(url_filter(&"HTTPS://x/".into()), "HTTPS://x/");
        assert_eq!(url_filter(&"/a:b".into()), "/a:b");
        assert_eq!(url_filter(&"javascript:alert(1)".into()), "#ZgotmplZ");
        assert_eq!(url_filter(&Content::Url("javascript:ok()".into())), "javascript:ok()");
    }

    #[test]
    fn test_url_escaper() {
        assert_eq!(url_escaper(&"a b&c=d/é".into()), "a%20b%26c%3Dd%2F%C3%A9");
        assert_eq!(url_escaper(&"%41".into()), "%2541");
        assert_eq!(url_escaper(&"A-z_0.9~".into()), "A-z_0.9~");
        assert_eq!(url_escaper(&Content::Url("/a b?q=%41".into())), "/a%20b?q=%41");
    }

    #[test]
    fn test_url_normalizer() {
        assert_eq!(url_normalizer(&"/foo bar?a=b&c=%41".into()), "/foo%20bar?a=b&c=%41");
        assert_eq!(url_normalizer(&"\"'<>(){}".into()), "%22%27%3C%3E%28%29%7B%7D");
        assert_eq!(url_normalizer(&"100%".into()), "100%25");
    }
}
