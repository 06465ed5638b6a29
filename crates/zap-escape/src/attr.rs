//! Attribute name classification.

use crate::content::ContentType;
use once_cell::sync::Lazy;
use std::collections::HashMap;

static ATTR_TYPES: Lazy<HashMap<&'static str, ContentType>> = Lazy::new(|| {
    use ContentType::*;
    [
        ("accept", Plain),
        ("accept-charset", Unsafe),
        ("action", Url),
        ("alt", Plain),
        ("archive", Url),
        ("async", Unsafe),
        ("autocomplete", Plain),
        ("autofocus", Plain),
        ("autoplay", Plain),
        ("background", Url),
        ("border", Plain),
        ("checked", Plain),
        ("cite", Url),
        ("challenge", Unsafe),
        ("charset", Unsafe),
        ("class", Plain),
        ("classid", Url),
        ("codebase", Url),
        ("cols", Plain),
        ("colspan", Plain),
        ("content", Unsafe),
        ("contenteditable", Plain),
        ("contextmenu", Plain),
        ("controls", Plain),
        ("coords", Plain),
        ("crossorigin", Unsafe),
        ("data", Url),
        ("datetime", Plain),
        ("default", Plain),
        ("defer", Unsafe),
        ("dir", Plain),
        ("dirname", Plain),
        ("disabled", Plain),
        ("draggable", Plain),
        ("dropzone", Plain),
        ("enctype", Unsafe),
        ("for", Plain),
        ("form", Unsafe),
        ("formaction", Url),
        ("formenctype", Unsafe),
        ("formmethod", Unsafe),
        ("formnovalidate", Unsafe),
        ("formtarget", Plain),
        ("headers", Plain),
        ("height", Plain),
        ("hidden", Plain),
        ("high", Plain),
        ("href", Url),
        ("hreflang", Plain),
        ("http-equiv", Unsafe),
        ("icon", Url),
        ("id", Plain),
        ("ismap", Plain),
        ("keytype", Unsafe),
        ("kind", Plain),
        ("label", Plain),
        ("lang", Plain),
        ("language", Unsafe),
        ("list", Plain),
        ("longdesc", Url),
        ("loop", Plain),
        ("low", Plain),
        ("manifest", Url),
        ("max", Plain),
        ("maxlength", Plain),
        ("media", Plain),
        ("mediagroup", Plain),
        ("method", Unsafe),
        ("min", Plain),
        ("multiple", Plain),
        ("name", Plain),
        ("novalidate", Unsafe),
        // Event handlers are matched by the "on" prefix.
        ("open", Plain),
        ("optimum", Plain),
        ("pattern", Unsafe),
        ("placeholder", Plain),
        ("poster", Url),
        ("profile", Url),
        ("preload", Plain),
        ("pubdate", Plain),
        ("radiogroup", Plain),
        ("readonly", Plain),
        ("rel", Unsafe),
        ("required", Plain),
        ("reversed", Plain),
        ("rows", Plain),
        ("rowspan", Plain),
        ("sandbox", Unsafe),
        ("spellcheck", Plain),
        ("scope", Plain),
        ("scoped", Plain),
        ("seamless", Plain),
        ("selected", Plain),
        ("shape", Plain),
        ("size", Plain),
        ("sizes", Plain),
        ("span", Plain),
        ("src", Url),
        ("srcdoc", Html),
        ("srclang", Plain),
        ("start", Plain),
        ("step", Plain),
        ("style", Css),
        ("tabindex", Plain),
        ("target", Plain),
        ("title", Plain),
        ("type", Unsafe),
        ("usemap", Url),
        ("value", Unsafe),
        ("width", Plain),
        ("wrap", Plain),
        ("xmlns", Url),
    ]
    .into_iter()
    .collect()
});

/// Content type of the value of the attribute `name`, which must be lowercase.
///
/// `data-` and namespace prefixes are stripped first, except that every
/// `xmlns:` attribute is a URL. Unknown names starting with `on` are script;
/// unknown names containing `src`, `uri` or `url` are URLs.
pub fn attr_type(name: &str) -> ContentType {
    let mut name = name;
    if let Some(rest) = name.strip_prefix("data-") {
        name = rest;
    } else if let Some(colon) = name.find(':') {
        if &name[..colon] == "xmlns" {
            return ContentType::Url;
        }
        name = &name[colon + 1..];
    }
    if let Some(t) = ATTR_TYPES.get(name) {
        return *t;
    }
    if name.starts_with("on") {
        return ContentType::Js;
    }
    if name.contains("src") || name.contains("uri") || name.contains("url") {
        return ContentType::Url;
    }
    ContentType::Plain
}
