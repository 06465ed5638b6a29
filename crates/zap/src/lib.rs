//! # Zap
//!
//! Parses template sources into a [`Set`], resolves `define` inheritance,
//! `fill` and `block`, and optionally escapes every action for the HTML
//! context it appears in. The result prints back to plain template source
//! ready for any text/template style executor.
//!
//! ```rust
//! use zap::Set;
//!
//! let mut set = Set::new();
//! set.parse("layout", r#"{{define "base"}}<title>{{block "t"}}Home{{end}}</title>{{end}}"#)?;
//! set.parse("page", r#"{{define "page" "base"}}{{block "t"}}{{.Title}}{{end}}{{end}}"#)?;
//! set.escape()?;
//!
//! assert_eq!(
//!     set.lookup("page").unwrap().list.to_string(),
//!     "<title>{{.Title | zap_rcdataescaper}}</title>"
//! );
//! # Ok::<(), zap::Error>(())
//! ```

mod error;
mod set;

pub use error::Error;
pub use set::Set;

pub use zap_escape::{Content, ContentType, EscapeError, FILTER_FAILSAFE, FUNCS, escape};
pub use zap_syntax::{
    CompileError, DefineNode, LexError, Lexer, ParseError, Span, Token, TokenKind, Tree, compile, parse, tokenize,
};
pub use zap_escape;
pub use zap_syntax;

pub mod prelude {
    pub use crate::{Error, Set};
    pub use crate::{compile, escape, parse};
}
