//! Walks a compiled tree, tracks the output context through every template
//! and adds escaping functions to each action's pipeline.
//!
//! ## Algorithm
//!
//! 1. Entry points (templates no `{{template}}` call names) start in HTML text
//!    and must end there.
//! 2. Text nodes advance the context through the transition table; `<` in
//!    text is encoded and template comments are stripped.
//! 3. Actions get the escapers for their context.
//! 4. Branches must end in joinable contexts; a `range` body must also be
//!    re-enterable.
//! 5. A called template is escaped once, for the context of its first call
//!    site. Recursive templates are solved by assuming the start context as
//!    output and retrying once with the computed one.
//!
//! Edits are collected by node position and applied only when the whole
//! tree escaped without error.

use crate::context::{Context, Delim, JsCtx, State, UrlPart};
use crate::error::{EscapeError, ErrorCode};
use crate::funcs::*;
use crate::transition::{context_after_text, find};
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};
use zap_syntax::{ActionNode, Arg, BranchNode, CommandNode, IdentifierNode, ListNode, Node, PipeNode, TextNode, Tree};

/// A node position: list indices, with a branch selector (0 for the body,
/// 1 for `else`) after each branch or block index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NodeRef {
    template: String,
    path: SmallVec<[u32; 8]>,
}

impl NodeRef {
    fn root(template: &str) -> Self {
        NodeRef { template: template.to_string(), path: SmallVec::new() }
    }
}

#[derive(Debug, Default)]
struct Edits {
    actions: HashMap<NodeRef, Vec<&'static str>>,
    texts: HashMap<NodeRef, String>,
}

/// Escapes every template in `tree`.
///
/// The tree must be compiled: `fill` nodes are an error and `block` nodes
/// are escaped in place. On error the tree is dropped unchanged.
pub fn escape(mut tree: Tree) -> Result<Tree, EscapeError> {
    let edits = {
        let invoked = invoked_templates(&tree);
        let mut e = Escaper::new(&tree);
        for name in tree.names().filter(|name| !invoked.contains(*name)) {
            e.escape_entry(name)?;
        }
        // Templates only reachable through call cycles.
        for name in tree.names() {
            if !e.input.contains_key(name) {
                e.escape_entry(name)?;
            }
        }
        e.edits
    };
    debug!(
        actions = edits.actions.len(),
        texts = edits.texts.len(),
        "applying escaper edits"
    );
    commit(&mut tree, &edits);
    Ok(tree)
}

fn invoked_templates(tree: &Tree) -> HashSet<String> {
    fn walk(list: &ListNode, out: &mut HashSet<String>) {
        for node in &list.nodes {
            match node {
                Node::Template(t) => {
                    out.insert(t.name.clone());
                }
                Node::If(b) | Node::Range(b) | Node::With(b) => {
                    walk(&b.list, out);
                    if let Some(list) = &b.else_list {
                        walk(list, out);
                    }
                }
                Node::Block(b) | Node::Fill(b) => walk(&b.list, out),
                Node::Text(_) | Node::Action(_) => {}
            }
        }
    }
    let mut out = HashSet::new();
    for (_, define) in tree.iter() {
        walk(&define.list, &mut out);
    }
    out
}

struct Escaper<'t> {
    tree: &'t Tree,
    /// Start context of every template escaped so far.
    input: HashMap<String, Context>,
    /// Output context, or the assumed one while a template is in progress.
    output: HashMap<String, Context>,
    /// Templates called during this escaper's walk.
    called: HashSet<String>,
    edits: Edits,
}

impl<'t> Escaper<'t> {
    fn new(tree: &'t Tree) -> Self {
        Escaper {
            tree,
            input: HashMap::new(),
            output: HashMap::new(),
            called: HashSet::new(),
            edits: Edits::default(),
        }
    }

    /// A speculative escaper whose findings can be kept or dropped.
    fn child(&self) -> Escaper<'t> {
        Escaper {
            tree: self.tree,
            input: self.input.clone(),
            output: self.output.clone(),
            called: HashSet::new(),
            edits: Edits::default(),
        }
    }

    fn absorb(&mut self, child: Escaper<'t>) {
        self.input.extend(child.input);
        self.output.extend(child.output);
        self.called.extend(child.called);
        self.edits.actions.extend(child.edits.actions);
        self.edits.texts.extend(child.edits.texts);
    }

    fn escape_entry(&mut self, name: &str) -> Result<(), EscapeError> {
        let out = self.escape_template(Context::default(), name, None)?;
        if out.state != State::Text {
            return Err(EscapeError::new(
                ErrorCode::EndContext,
                format!("ends in a non-text context: {}", out),
            )
            .at(name, 0));
        }
        debug!(template = name, "escaped entry point");
        Ok(())
    }

    /// Escapes the template `name` called in context `c` and returns its
    /// output context.
    fn escape_template(
        &mut self,
        c: Context,
        name: &str,
        call_site: Option<(&str, usize)>,
    ) -> Result<Context, EscapeError> {
        let locate = |err: EscapeError| match call_site {
            Some((template, line)) => err.at(template, line),
            None => err.at(name, 0),
        };

        self.called.insert(name.to_string());
        if let Some(start) = self.input.get(name) {
            if *start != c {
                return Err(locate(EscapeError::new(
                    ErrorCode::InvokedContexts,
                    format!("template {:?} is invoked in different contexts: {} and {}", name, start, c),
                )));
            }
            if let Some(out) = self.output.get(name) {
                return Ok(*out);
            }
        }

        let tree = self.tree;
        let Some(define) = tree.get(name) else {
            return Err(locate(EscapeError::new(
                ErrorCode::NoSuchTemplate,
                format!("no such template {:?}", name),
            )));
        };
        self.input.insert(name.to_string(), c);
        let out = self.compute_out_ctx(c, name, &define.list)?;
        self.output.insert(name.to_string(), out);
        trace!(template = name, start = %c, end = %out, "escaped template");
        Ok(out)
    }

    fn compute_out_ctx(&mut self, c: Context, name: &str, list: &ListNode) -> Result<Context, EscapeError> {
        let (c1, ok) = self.escape_template_body(c, c, name, list)?;
        if ok {
            return Ok(c1);
        }
        // Retry assuming the context the first pass ended in.
        let (c2, ok) = self.escape_template_body(c, c1, name, list)?;
        if ok {
            return Ok(c2);
        }
        Err(EscapeError::new(
            ErrorCode::OutputContext,
            format!("cannot compute output context for template {}", name),
        )
        .at(name, 0))
    }

    /// Escapes a template body assuming recursive calls end in `assumed`.
    /// The findings are kept only if the assumption holds.
    fn escape_template_body(
        &mut self,
        start: Context,
        assumed: Context,
        name: &str,
        list: &ListNode,
    ) -> Result<(Context, bool), EscapeError> {
        self.output.insert(name.to_string(), assumed);
        let mut child = self.child();
        let mut at = NodeRef::root(name);
        let end = child.escape_list(start, list, &mut at)?;
        let ok = !child.called.contains(name) || end == assumed;
        if ok {
            self.absorb(child);
        }
        Ok((end, ok))
    }

    fn escape_list(&mut self, c: Context, list: &ListNode, at: &mut NodeRef) -> Result<Context, EscapeError> {
        let mut c = c;
        for (i, node) in list.nodes.iter().enumerate() {
            at.path.push(i as u32);
            c = self.escape_node(c, node, at)?;
            at.path.pop();
        }
        Ok(c)
    }

    fn escape_node(&mut self, c: Context, node: &Node, at: &mut NodeRef) -> Result<Context, EscapeError> {
        match node {
            Node::Text(t) => self.escape_text(c, t, at),
            Node::Action(a) => self.escape_action(c, a, at),
            Node::If(b) => self.escape_branch(c, b, "if", at),
            Node::Range(b) => self.escape_branch(c, b, "range", at),
            Node::With(b) => self.escape_branch(c, b, "with", at),
            Node::Template(t) => self.escape_template(c, &t.name, Some((at.template.as_str(), t.span.line))),
            Node::Block(b) => {
                at.path.push(0);
                let end = self.escape_list(c, &b.list, at)?;
                at.path.pop();
                Ok(end)
            }
            Node::Fill(b) => Err(EscapeError::new(
                ErrorCode::NotCompiled,
                format!("{{{{fill {:?}}}}} must be compiled before escaping", b.name),
            )
            .at(&at.template, b.span.line)),
        }
    }

    fn escape_branch(
        &mut self,
        c: Context,
        branch: &BranchNode,
        name: &str,
        at: &mut NodeRef,
    ) -> Result<Context, EscapeError> {
        let line = branch.span.line;
        at.path.push(0);
        let mut c0 = self.escape_list(c, &branch.list, at)?;
        if name == "range" {
            // The body can run again right after itself.
            let reentry = self.child().escape_list(c0, &branch.list, at).and_then(|c1| {
                c0.join(c1).ok_or_else(|| branch_end(name, c0, c1))
            });
            c0 = reentry.map_err(|err| {
                let mut err = err.at(&at.template, line);
                err.description = format!("on range loop re-entry: {}", err.description);
                err
            })?;
        }
        at.path.pop();

        at.path.push(1);
        let c1 = match &branch.else_list {
            Some(list) => self.escape_list(c, list, at)?,
            None => c,
        };
        at.path.pop();

        c0.join(c1).ok_or_else(|| branch_end(name, c0, c1).at(&at.template, line))
    }

    fn escape_action(&mut self, c: Context, action: &ActionNode, at: &NodeRef) -> Result<Context, EscapeError> {
        if !action.pipe.decl.is_empty() {
            // A declaration outputs nothing.
            return Ok(c);
        }
        let mut c = c.nudge();
        let mut s: SmallVec<[&'static str; 3]> = SmallVec::new();
        match c.state {
            State::Url | State::CssDqStr | State::CssSqStr | State::CssDqUrl | State::CssSqUrl | State::CssUrl => {
                let pre_query = match c.state {
                    State::CssDqStr | State::CssSqStr => CSS_ESCAPER,
                    _ => URL_NORMALIZER,
                };
                match c.url_part {
                    UrlPart::None => {
                        s.push(URL_FILTER);
                        s.push(pre_query);
                    }
                    UrlPart::PreQuery => s.push(pre_query),
                    UrlPart::QueryOrFrag => s.push(URL_ESCAPER),
                    UrlPart::Unknown => {
                        return Err(EscapeError::new(
                            ErrorCode::AmbigContext,
                            format!("{} appears in an ambiguous context within a URL", action),
                        )
                        .at(&at.template, action.span.line));
                    }
                }
            }
            State::Js => {
                s.push(JS_VAL_ESCAPER);
                // A value is followed by an operator, not an operand.
                c.js_ctx = JsCtx::DivOp;
            }
            State::JsDqStr | State::JsSqStr => s.push(JS_STR_ESCAPER),
            State::JsRegexp => s.push(JS_REGEXP_ESCAPER),
            State::Css => s.push(CSS_VALUE_FILTER),
            State::Text => s.push(HTML_ESCAPER),
            State::Rcdata => s.push(RCDATA_ESCAPER),
            State::Attr => {}
            State::AttrName | State::Tag | State::AfterName | State::BeforeValue => {
                c.state = State::AttrName;
                s.push(HTML_NAME_FILTER);
            }
            State::HtmlCmt | State::JsBlockCmt | State::JsLineCmt | State::CssBlockCmt | State::CssLineCmt => {
                s.push(COMMENT_ESCAPER)
            }
        }
        match c.delim {
            Delim::None => {}
            Delim::SpaceOrTagEnd => s.push(NOSPACE_ESCAPER),
            Delim::DoubleQuote | Delim::SingleQuote => s.push(ATTR_ESCAPER),
        }
        trace!(template = %at.template, action = %action, escapers = ?s, "escaped action");
        self.edits.actions.insert(at.clone(), s.into_vec());
        Ok(c)
    }

    /// Advances the context over static text, encoding `<` in HTML text and
    /// dropping HTML, CSS and JS comments.
    fn escape_text(&mut self, c: Context, text: &TextNode, at: &NodeRef) -> Result<Context, EscapeError> {
        let s = text.text.as_bytes();
        let mut c = c;
        let mut b: Vec<u8> = Vec::new();
        let mut written = 0;
        let mut i = 0;
        while i != s.len() {
            let (c1, nread) =
                context_after_text(c, &s[i..]).map_err(|e| e.at(&at.template, text.span.line))?;
            let i1 = i + nread;
            if c.state == State::Text || c.state == State::Rcdata {
                let mut end = i1;
                if c1.state != c.state {
                    if let Some(j) = s[i..end].iter().rposition(|&ch| ch == b'<') {
                        end = i + j;
                    }
                }
                for j in i..end {
                    let doctype = s.get(j..j + 9).is_some_and(|p| p.eq_ignore_ascii_case(b"<!DOCTYPE"));
                    if s[j] == b'<' && !doctype {
                        b.extend_from_slice(&s[written..j]);
                        b.extend_from_slice(b"&lt;");
                        written = j + 1;
                    }
                }
            } else if c.state.is_comment() && c.delim == Delim::None {
                match c.state {
                    // A block comment holding a line terminator is a line
                    // terminator to the JS grammar.
                    State::JsBlockCmt => {
                        let body = &s[written..i1];
                        let has_newline = body.iter().any(|&ch| ch == b'\n' || ch == b'\r')
                            || find(body, "\u{2028}".as_bytes()).is_some()
                            || find(body, "\u{2029}".as_bytes()).is_some();
                        b.push(if has_newline { b'\n' } else { b' ' });
                    }
                    State::CssBlockCmt => b.push(b' '),
                    _ => {}
                }
                written = i1;
            }
            if c.state != c1.state && c1.state.is_comment() && c1.delim == Delim::None {
                // Keep what precedes the comment opener.
                let opener = if c1.state == State::HtmlCmt { 4 } else { 2 };
                let cs = i1.saturating_sub(opener).max(written);
                b.extend_from_slice(&s[written..cs]);
                written = i1;
            }
            if i == i1 && c.state == c1.state {
                return Err(EscapeError::new(
                    ErrorCode::BadHtml,
                    format!("no progress from {} on {:?}", c, String::from_utf8_lossy(&s[i..])),
                )
                .at(&at.template, text.span.line));
            }
            c = c1;
            i = i1;
        }

        if written != 0 {
            if !c.state.is_comment() || c.delim != Delim::None {
                b.extend_from_slice(&s[written..]);
            }
            self.edits.texts.insert(at.clone(), String::from_utf8_lossy(&b).into_owned());
        }
        Ok(c)
    }
}

fn branch_end(name: &str, a: Context, b: Context) -> EscapeError {
    EscapeError::new(
        ErrorCode::BranchEnd,
        format!("{{{{{}}}}} branches end in different contexts: {}, {}", name, a, b),
    )
}

fn commit(tree: &mut Tree, edits: &Edits) {
    fn walk(list: &mut ListNode, at: &mut NodeRef, edits: &Edits) {
        for (i, node) in list.nodes.iter_mut().enumerate() {
            at.path.push(i as u32);
            match node {
                Node::Text(t) => {
                    if let Some(text) = edits.texts.get(at) {
                        t.text = text.clone();
                    }
                }
                Node::Action(a) => {
                    if let Some(names) = edits.actions.get(at) {
                        ensure_pipeline_contains(&mut a.pipe, names);
                    }
                }
                Node::If(b) | Node::Range(b) | Node::With(b) => {
                    at.path.push(0);
                    walk(&mut b.list, at, edits);
                    at.path.pop();
                    if let Some(list) = &mut b.else_list {
                        at.path.push(1);
                        walk(list, at, edits);
                        at.path.pop();
                    }
                }
                Node::Block(b) => {
                    at.path.push(0);
                    walk(&mut b.list, at, edits);
                    at.path.pop();
                }
                Node::Template(_) | Node::Fill(_) => {}
            }
            at.path.pop();
        }
    }

    for (name, define) in tree.iter_mut() {
        let mut at = NodeRef::root(name);
        walk(&mut define.list, &mut at, edits);
    }
}

/// Makes the trailing function calls of `pipe` include the escapers `s` in
/// order, reusing equivalent calls already present.
///
/// Only the run of identifier commands at the end of the pipe is examined;
/// escapers missing from it are inserted before the next matching call or
/// appended. Calls made redundant by the one before them are dropped.
pub fn ensure_pipeline_contains(pipe: &mut PipeNode, s: &[&str]) {
    if s.is_empty() {
        return;
    }
    let n = pipe.cmds.len();
    let trailing = pipe.cmds.iter().rev().take_while(|cmd| cmd.ident().is_some()).count();
    let first_ident = n - trailing;

    // Already there, in order?
    let mut dups = 0;
    for cmd in &pipe.cmds[first_ident..] {
        if cmd.ident().is_some_and(|id| esc_fns_eq(s[dups], id)) {
            dups += 1;
            if dups == s.len() {
                return;
            }
        }
    }

    let idents = pipe.cmds.split_off(first_ident);
    let mut cmds = std::mem::take(&mut pipe.cmds);
    let mut remaining = s;
    for cmd in idents {
        let name = cmd.ident().unwrap_or_default().to_string();
        if let Some(i) = remaining.iter().position(|esc| esc_fns_eq(esc, &name)) {
            for esc in &remaining[..i] {
                append_cmd(&mut cmds, ident_cmd(esc, cmd.span));
            }
            remaining = &remaining[i + 1..];
        }
        append_cmd(&mut cmds, cmd);
    }
    for esc in remaining {
        append_cmd(&mut cmds, ident_cmd(esc, pipe.span));
    }
    pipe.cmds = cmds;
}

fn ident_cmd(name: &str, span: zap_syntax::Span) -> CommandNode {
    CommandNode { span, args: vec![Arg::Identifier(IdentifierNode::new(name, span))] }
}

fn append_cmd(cmds: &mut Vec<CommandNode>, cmd: CommandNode) {
    if let (Some(last), Some(next)) = (cmds.last().and_then(|c| c.ident()), cmd.ident()) {
        if is_redundant(last, next) {
            return;
        }
    }
    cmds.push(cmd);
}
