//! # Zap Syntax
//!
//! Lexer, parser, parse tree and inheritance compiler for zap templates.
//!
//! ## Overview
//!
//! - **Lexer**: pull-based state machine turning template source into tokens
//! - **Parser**: recursive descent over the token stream, building a [`Tree`]
//!   of named templates with scoped variables and checked function names
//! - **AST**: closed node types that print back to template source
//! - **Compiler**: resolves `define` inheritance, `fill` and `block`
//!
//! ## Architecture
//!
//! ```text
//! Source
//!     ↓
//! Lexer (next_token / peek / push_back)
//!     ↓
//! Parser (parse)
//!     ↓
//! Tree: name → DefineNode
//!     ↓
//! compile
//!     ↓
//! Tree without blocks, fills or parents
//! ```
//!
//! ## Example
//!
//! ```rust
//! use zap_syntax::{compile, parse};
//!
//! let source = r#"
//!     {{define "base"}}<h1>{{block "title"}}Home{{end}}</h1>{{end}}
//!     {{define "page" "base"}}{{block "title"}}{{.Title}}{{end}}{{end}}
//! "#;
//!
//! let mut tree = parse(source, "site", "", "", &[]).expect("parse failed");
//! compile(&mut tree).expect("compile failed");
//!
//! assert_eq!(tree.get("page").unwrap().list.to_string(), "<h1>{{.Title}}</h1>");
//! ```
//!
//! ## Grammar Overview
//!
//! ```text
//! File:     ( {{define "name" ["parent"]}} List {{end}} )*
//! List:     ( text | Action )*
//! Action:   {{pipeline}}
//!           {{if pipeline}} List [{{else}} List] {{end}}
//!           {{range pipeline}} List [{{else}} List] {{end}}
//!           {{with pipeline}} List [{{else}} List] {{end}}
//!           {{template "name" [pipeline]}}
//!           {{block "name" [pipeline]}} List {{end}}
//!           {{fill "name" [pipeline]}} List {{end}}
//! Pipeline: [$x :=] command ( "|" command )*
//! ```
//!
//! Comments are `// ...` after whitespace, `/* ... */`, and `{{# ... #}}`.
//! `{{raw}}...{{end}}` emits its content verbatim.

pub mod ast;
pub mod compile;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod tree;

pub use ast::*;
pub use compile::compile;
pub use error::{CompileError, LexError, ParseError, ParseErrorKind, Span};
pub use lexer::{DEFAULT_LEFT_DELIM, DEFAULT_RIGHT_DELIM, Lexer, Token, TokenKind, tokenize};
pub use parser::{BUILTINS, FuncNames, parse};
pub use tree::Tree;
