//! Names and implementations of the escaping functions the escaper inserts.

use crate::content::Content;
use crate::css::{css_escaper, css_value_filter};
use crate::html::{attr_escaper, comment_escaper, html_escaper, html_name_filter, nospace_escaper, rcdata_escaper};
use crate::js::{js_regexp_escaper, js_str_escaper, js_val_escaper};
use crate::url::{url_escaper, url_filter, url_normalizer};
use once_cell::sync::Lazy;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Replaces unsafe values in filtered contexts.
pub const FILTER_FAILSAFE: &str = "ZgotmplZ";

pub const ATTR_ESCAPER: &str = "zap_attrescaper";
pub const COMMENT_ESCAPER: &str = "zap_commentescaper";
pub const CSS_ESCAPER: &str = "zap_cssescaper";
pub const CSS_VALUE_FILTER: &str = "zap_cssvaluefilter";
pub const HTML_NAME_FILTER: &str = "zap_htmlnamefilter";
pub const HTML_ESCAPER: &str = "zap_htmlescaper";
pub const JS_REGEXP_ESCAPER: &str = "zap_jsregexpescaper";
pub const JS_STR_ESCAPER: &str = "zap_jsstrescaper";
pub const JS_VAL_ESCAPER: &str = "zap_jsvalescaper";
pub const NOSPACE_ESCAPER: &str = "zap_nospaceescaper";
pub const RCDATA_ESCAPER: &str = "zap_rcdataescaper";
pub const URL_ESCAPER: &str = "zap_urlescaper";
pub const URL_FILTER: &str = "zap_urlfilter";
pub const URL_NORMALIZER: &str = "zap_urlnormalizer";

pub type EscapeFn = fn(&Content) -> String;

/// Every function the escaper may add to a pipeline, by name.
///
/// Executors register these next to their own functions.
pub static FUNCS: Lazy<BTreeMap<&'static str, EscapeFn>> = Lazy::new(|| {
    let funcs: [(&'static str, EscapeFn); 14] = [
        (ATTR_ESCAPER, attr_escaper),
        (COMMENT_ESCAPER, comment_escaper),
        (CSS_ESCAPER, css_escaper),
        (CSS_VALUE_FILTER, css_value_filter),
        (HTML_NAME_FILTER, html_name_filter),
        (HTML_ESCAPER, html_escaper),
        (JS_REGEXP_ESCAPER, js_regexp_escaper),
        (JS_STR_ESCAPER, js_str_escaper),
        (JS_VAL_ESCAPER, js_val_escaper),
        (NOSPACE_ESCAPER, nospace_escaper),
        (RCDATA_ESCAPER, rcdata_escaper),
        (URL_ESCAPER, url_escaper),
        (URL_FILTER, url_filter),
        (URL_NORMALIZER, url_normalizer),
    ];
    funcs.into_iter().collect()
});

/// Escapers that a user-written builtin already covers.
static EQUIV_ESCAPERS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        (ATTR_ESCAPER, "html"),
        (HTML_ESCAPER, "html"),
        (NOSPACE_ESCAPER, "html"),
        (RCDATA_ESCAPER, "html"),
        (URL_ESCAPER, "urlquery"),
        (URL_NORMALIZER, "urlquery"),
    ]
    .into_iter()
    .collect()
});

/// Pairs `(a, b)` where `b` applied to the output of `a` changes nothing.
static REDUNDANT: Lazy<HashSet<(&'static str, &'static str)>> = Lazy::new(|| {
    [
        (COMMENT_ESCAPER, ATTR_ESCAPER),
        (COMMENT_ESCAPER, NOSPACE_ESCAPER),
        (COMMENT_ESCAPER, HTML_ESCAPER),
        (CSS_ESCAPER, ATTR_ESCAPER),
        (JS_REGEXP_ESCAPER, ATTR_ESCAPER),
        (JS_STR_ESCAPER, ATTR_ESCAPER),
        (URL_ESCAPER, URL_NORMALIZER),
    ]
    .into_iter()
    .collect()
});

/// Whether `b` applied to the output of `a` changes nothing.
pub fn is_redundant(a: &str, b: &str) -> bool {
    REDUNDANT.iter().any(|&(x, y)| x == a && y == b)
}

/// Pairs `(a, b)` for which [`is_redundant`] holds.
pub fn redundant_pairs() -> impl Iterator<Item = (&'static str, &'static str)> {
    REDUNDANT.iter().copied()
}

/// Whether the escaper `a` and the pipeline function `b` do the same thing.
pub(crate) fn esc_fns_eq(a: &str, b: &str) -> bool {
    let a = EQUIV_ESCAPERS.get(a).copied().unwrap_or(a);
    let b = EQUIV_ESCAPERS.get(b).copied().unwrap_or(b);
    a == b
}
