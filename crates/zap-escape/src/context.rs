//! Parser state at a point in the rendered output.
//!
//! A [`Context`] says which HTML, CSS, JavaScript or URL grammar production
//! surrounds the bytes emitted so far. Contexts are small `Copy` values; the
//! zero value is plain HTML text.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum State {
    /// Parsed character data between tags.
    #[default]
    Text,
    /// Inside a tag, before an attribute name.
    Tag,
    AttrName,
    /// After an attribute name, before any `=`.
    AfterName,
    /// After `=`, before the value.
    BeforeValue,
    HtmlCmt,
    /// Raw text inside `<textarea>` or `<title>`.
    Rcdata,
    /// A plain attribute value.
    Attr,
    Url,
    Js,
    JsDqStr,
    JsSqStr,
    JsRegexp,
    JsBlockCmt,
    JsLineCmt,
    Css,
    CssDqStr,
    CssSqStr,
    CssDqUrl,
    CssSqUrl,
    CssUrl,
    CssBlockCmt,
    CssLineCmt,
}

impl State {
    pub fn is_comment(self) -> bool {
        matches!(
            self,
            State::HtmlCmt | State::JsBlockCmt | State::JsLineCmt | State::CssBlockCmt | State::CssLineCmt
        )
    }

    /// States that occur inside an open tag.
    pub fn is_in_tag(self) -> bool {
        matches!(self, State::Tag | State::AttrName | State::AfterName | State::BeforeValue | State::Attr)
    }
}

/// How an attribute value ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Delim {
    #[default]
    None,
    DoubleQuote,
    SingleQuote,
    SpaceOrTagEnd,
}

impl Delim {
    /// Bytes that close a value with this delimiter.
    pub fn ends(self) -> &'static [u8] {
        match self {
            Delim::None => b"",
            Delim::DoubleQuote => b"\"",
            Delim::SingleQuote => b"'",
            Delim::SpaceOrTagEnd => b" \t\n\x0c\r>",
        }
    }
}

/// Position within a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UrlPart {
    /// Nothing of the URL has been seen yet.
    #[default]
    None,
    /// Scheme, authority or path.
    PreQuery,
    QueryOrFrag,
    /// Branches disagree about where we are.
    Unknown,
}

/// Whether a `/` in JavaScript starts a regular expression or divides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JsCtx {
    #[default]
    Regexp,
    DivOp,
    Unknown,
}

/// Content type of the attribute whose name was just read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Attr {
    #[default]
    None,
    Script,
    Style,
    Url,
}

/// Elements whose bodies are not parsed as HTML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Element {
    #[default]
    None,
    Script,
    Style,
    Textarea,
    Title,
}

impl Element {
    /// State of the element's body.
    pub fn content_state(self) -> State {
        match self {
            Element::None => State::Text,
            Element::Script => State::Js,
            Element::Style => State::Css,
            Element::Textarea | Element::Title => State::Rcdata,
        }
    }

    /// Lowercase prefix of the closing tag, if the body is special.
    pub fn end_marker(self) -> Option<&'static [u8]> {
        match self {
            Element::None => None,
            Element::Script => Some(b"</script"),
            Element::Style => Some(b"</style"),
            Element::Textarea => Some(b"</textarea"),
            Element::Title => Some(b"</title"),
        }
    }

    pub fn from_tag_name(name: &[u8]) -> Element {
        match name.to_ascii_lowercase().as_slice() {
            b"script" => Element::Script,
            b"style" => Element::Style,
            b"textarea" => Element::Textarea,
            b"title" => Element::Title,
            _ => Element::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Context {
    pub state: State,
    pub delim: Delim,
    pub url_part: UrlPart,
    pub js_ctx: JsCtx,
    pub attr: Attr,
    pub element: Element,
}

impl Context {
    pub fn new(state: State) -> Self {
        Context { state, ..Context::default() }
    }

    /// Context right after leaving an attribute value or starting a tag.
    pub fn tag(element: Element) -> Self {
        Context { state: State::Tag, element, ..Context::default() }
    }

    /// Moves a context that cannot hold an action into the nearest one that can.
    ///
    /// `<a {{.}}` emits an attribute name, `<a href={{.}}` an unquoted value.
    pub fn nudge(self) -> Context {
        let mut c = self;
        match c.state {
            State::Tag => c.state = State::AttrName,
            State::BeforeValue => {
                c.state = attr_start_state(c.attr);
                c.delim = Delim::SpaceOrTagEnd;
                c.attr = Attr::None;
            }
            State::AfterName => {
                c.state = State::AttrName;
                c.attr = Attr::None;
            }
            _ => {}
        }
        c
    }

    /// Merges the end contexts of two branches.
    ///
    /// Contexts that differ only in URL part or JS slash meaning collapse to
    /// `Unknown`; a nudged context may join an unnudged one. Anything else
    /// has no join.
    pub fn join(self, other: Context) -> Option<Context> {
        if self == other {
            return Some(self);
        }

        let mut c = self;
        c.url_part = other.url_part;
        if c == other {
            c.url_part = UrlPart::Unknown;
            return Some(c);
        }

        let mut c = self;
        c.js_ctx = other.js_ctx;
        if c == other {
            c.js_ctx = JsCtx::Unknown;
            return Some(c);
        }

        let (a, b) = (self.nudge(), other.nudge());
        if a != self || b != other {
            return a.join(b);
        }
        None
    }
}

pub(crate) fn attr_start_state(attr: Attr) -> State {
    match attr {
        Attr::None => State::Attr,
        Attr::Script => State::Js,
        Attr::Style => State::Css,
        Attr::Url => State::Url,
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{:?} {:?} {:?} {:?} {:?} {:?}}}",
            self.state, self.delim, self.url_part, self.js_ctx, self.attr, self.element
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_text() {
        let c = Context::default();
        assert_eq!(c.state, State::Text);
        assert_eq!(c.js_ctx, JsCtx::Regexp);
        assert_eq!(c.to_string(), "{Text None None Regexp None None}");
    }

    #[test]
    fn test_nudge() {
        let before = Context { state: State::BeforeValue, attr: Attr::Url, ..Context::default() };
        let nudged = before.nudge();
        assert_eq!(nudged.state, State::Url);
        assert_eq!(nudged.delim, Delim::SpaceOrTagEnd);
        assert_eq!(nudged.attr, Attr::None);

        assert_eq!(Context::new(State::Tag).nudge().state, State::AttrName);
        assert_eq!(Context::new(State::Js).nudge(), Context::new(State::Js));
    }

    #[test]
    fn test_join_url_part() {
        let a = Context { state: State::Url, url_part: UrlPart::PreQuery, ..Context::default() };
        let b = Context { url_part: UrlPart::QueryOrFrag, ..a };
        assert_eq!(a.join(b).map(|c| c.url_part), Some(UrlPart::Unknown));
    }

    #[test]
    fn test_join_js_ctx() {
        let a = Context { state: State::Js, js_ctx: JsCtx::DivOp, ..Context::default() };
        let b = Context { js_ctx: JsCtx::Regexp, ..a };
        assert_eq!(a.join(b).map(|c| c.js_ctx), Some(JsCtx::Unknown));
    }

    #[test]
    fn test_join_nudged() {
        let unquoted = Context { state: State::Attr, delim: Delim::SpaceOrTagEnd, ..Context::default() };
        let before = Context::new(State::BeforeValue);
        assert_eq!(unquoted.join(before), Some(unquoted));
        assert_eq!(before.join(unquoted), Some(unquoted));
    }

    #[test]
    fn test_join_failure() {
        assert_eq!(Context::new(State::Text).join(Context::new(State::Js)), None);
    }
}
