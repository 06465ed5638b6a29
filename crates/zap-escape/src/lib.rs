//! # Zap Escape
//!
//! Contextual autoescaping for compiled zap template trees.
//!
//! The escaper follows every template through an HTML/CSS/JS/URL state
//! machine and appends the right escaping functions to each `{{...}}`
//! action, so `<a href="{{.U}}">` becomes
//! `<a href="{{.U | zap_urlfilter | zap_urlnormalizer | zap_attrescaper}}">`.
//!
//! ## Architecture
//!
//! ```text
//! compiled Tree
//!     ↓
//! escape (escaper.rs)
//!     ├── text:    context_after_text (transition.rs)
//!     ├── actions: escaper names (funcs.rs)
//!     └── calls:   per-template start/end contexts
//!     ↓
//! Tree with escaped pipelines
//! ```
//!
//! Executors register [`FUNCS`] so the inserted names resolve.
//!
//! ## Example
//!
//! ```rust
//! use zap_escape::{FUNCS, escape};
//! use zap_syntax::{compile, parse};
//!
//! let mut tree = parse(r#"{{define "page"}}<b title="{{.T}}">{{.B}}</b>{{end}}"#, "site", "", "", &[])
//!     .expect("parse failed");
//! compile(&mut tree).expect("compile failed");
//! let tree = escape(tree).expect("escape failed");
//!
//! assert_eq!(
//!     tree.get("page").unwrap().list.to_string(),
//!     r#"<b title="{{.T | zap_attrescaper}}">{{.B | zap_htmlescaper}}</b>"#
//! );
//! assert!(FUNCS.contains_key("zap_attrescaper"));
//! ```

pub mod attr;
pub mod content;
pub mod context;
pub mod css;
pub mod error;
pub mod escaper;
pub mod funcs;
pub mod html;
pub mod js;
pub mod transition;
pub mod url;

pub use attr::attr_type;
pub use content::{Content, ContentType};
pub use context::{Attr, Context, Delim, Element, JsCtx, State, UrlPart};
pub use error::{ErrorCode, EscapeError};
pub use escaper::{ensure_pipeline_contains, escape};
pub use funcs::{EscapeFn, FILTER_FAILSAFE, FUNCS};
pub use transition::{context_after_text, transition};
