//! Values handed to escaping functions.

/// Content type used by the escapers and by the attribute classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    Plain,
    Css,
    Html,
    HtmlAttr,
    Js,
    JsStr,
    Url,
    /// Attribute values that need more than plain escaping to be safe,
    /// such as `type` or `http-equiv`.
    Unsafe,
}

/// A value to be escaped.
///
/// Everything except `Plain` is content already known to be safe in its
/// own context; escapers for that context pass it through or only normalize it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Content {
    Plain(String),
    Css(String),
    Html(String),
    HtmlAttr(String),
    Js(String),
    JsStr(String),
    Url(String),
}

impl Content {
    pub fn content_type(&self) -> ContentType {
        match self {
            Content::Plain(_) => ContentType::Plain,
            Content::Css(_) => ContentType::Css,
            Content::Html(_) => ContentType::Html,
            Content::HtmlAttr(_) => ContentType::HtmlAttr,
            Content::Js(_) => ContentType::Js,
            Content::JsStr(_) => ContentType::JsStr,
            Content::Url(_) => ContentType::Url,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Content::Plain(s)
            | Content::Css(s)
            | Content::Html(s)
            | Content::HtmlAttr(s)
            | Content::Js(s)
            | Content::JsStr(s)
            | Content::Url(s) => s,
        }
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Plain(s.to_string())
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Plain(s)
    }
}

/// Shared by the escapers: writes `s[written..i]` and a replacement.
pub(crate) struct Rewriter<'a> {
    src: &'a str,
    out: String,
    written: usize,
}

impl<'a> Rewriter<'a> {
    pub(crate) fn new(src: &'a str) -> Self {
        Rewriter { src, out: String::new(), written: 0 }
    }

    /// Replaces `src[at..at + width]` with `repl`.
    pub(crate) fn replace(&mut self, at: usize, width: usize, repl: &str) {
        self.out.push_str(&self.src[self.written..at]);
        self.out.push_str(repl);
        self.written = at + width;
    }

    pub(crate) fn written(&self) -> usize {
        self.written
    }

    pub(crate) fn finish(mut self) -> String {
        if self.written == 0 {
            return self.src.to_string();
        }
        self.out.push_str(&self.src[self.written..]);
        self.out
    }
}

pub(crate) fn is_hex(c: u8) -> bool {
    c.is_ascii_hexdigit()
}
