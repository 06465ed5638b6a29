//! Inheritance compiler.
//!
//! Resolves a [`Tree`] in three passes:
//!
//! 1. `{{define "child" "parent"}}`: the child becomes a copy of its fully
//!    resolved parent in which every block the child overrides carries the
//!    child's content. Ancestors are resolved before descendants.
//! 2. `{{fill "target" pipe}}`: the fill is replaced by the resolved body of
//!    `target`, with the fill's blocks as overrides.
//! 3. Blocks are inlined into their content. No `Block` or `Fill` node
//!    survives compilation.
//!
//! Overrides nested in `if`/`with`/`range` keep that structure, so the
//! override is chosen at execution time and a branch without an override
//! falls back to the default content.

use crate::ast::*;
use crate::error::CompileError;
use crate::tree::Tree;
use std::collections::HashMap;
use tracing::{debug, trace};

/// Resolves every inheritance relationship in `tree`.
///
/// The passes run on a copy; `tree` is replaced only when all of them succeed.
pub fn compile(tree: &mut Tree) -> Result<(), CompileError> {
    let mut work = tree.clone();
    resolve_parents(&mut work)?;
    expand_all_fills(&mut work)?;
    for (name, define) in work.iter_mut() {
        inline_blocks(name, &mut define.list)?;
    }
    debug!(templates = work.len(), "compiled");
    *tree = work;
    Ok(())
}

fn resolve_parents(tree: &mut Tree) -> Result<(), CompileError> {
    let names: Vec<String> = tree.names().map(str::to_string).collect();
    for name in &names {
        let chain = parent_chain(tree, name)?;
        for child in chain.iter().rev() {
            inline_parent(tree, child)?;
        }
    }
    Ok(())
}

/// Templates on the way from `name` to its root ancestor, root excluded,
/// nearest first.
fn parent_chain(tree: &Tree, name: &str) -> Result<Vec<String>, CompileError> {
    let mut chain: Vec<String> = Vec::new();
    let mut current = name.to_string();
    loop {
        let define = tree
            .get(&current)
            .ok_or_else(|| CompileError::NotFound { name: current.clone() })?;
        let Some(parent) = define.parent.clone() else {
            break;
        };
        if chain.contains(&current) {
            chain.push(current);
            return Err(CompileError::Recursion { chain });
        }
        chain.push(current);
        current = parent;
    }
    Ok(chain)
}

/// Replaces `name`'s body with its parent's, applying `name`'s overrides.
/// The parent must already be resolved.
fn inline_parent(tree: &mut Tree, name: &str) -> Result<(), CompileError> {
    let not_found = |name: &str| CompileError::NotFound { name: name.to_string() };
    let child = tree.get(name).ok_or_else(|| not_found(name))?;
    let Some(parent_name) = child.parent.clone() else {
        return Ok(());
    };
    let parent = tree.get(&parent_name).ok_or_else(|| not_found(&parent_name))?;

    let mut body = parent.list.clone();
    substitute(&mut body, &child.list);

    let child = tree.get_mut(name).ok_or_else(|| not_found(name))?;
    child.list = body;
    child.parent = None;
    debug!(template = name, parent = %parent_name, "inherited");
    Ok(())
}

/// Gives every block in `list` the override `source` supplies for it.
fn substitute(list: &mut ListNode, source: &ListNode) {
    for node in &mut list.nodes {
        match node {
            Node::Block(block) => {
                if let Some(content) = project(source, &block.name, &block.list) {
                    trace!(block = %block.name, "override");
                    block.list = content;
                } else {
                    substitute(&mut block.list, source);
                }
            }
            Node::If(branch) | Node::Range(branch) | Node::With(branch) => {
                substitute(&mut branch.list, source);
                if let Some(else_list) = &mut branch.else_list {
                    substitute(else_list, source);
                }
            }
            _ => {}
        }
    }
}

/// The content `source` provides for block `name`, or `None` if it has no
/// override. Control nodes enclosing the override are kept, with `default`
/// filling in branches that do not override.
fn project(source: &ListNode, name: &str, default: &ListNode) -> Option<ListNode> {
    for node in &source.nodes {
        match node {
            Node::Block(block) if block.name == name => return Some(override_content(block)),
            Node::Block(block) => {
                if let Some(content) = project(&block.list, name, default) {
                    return Some(content);
                }
            }
            Node::If(branch) | Node::Range(branch) | Node::With(branch) => {
                let then = project(&branch.list, name, default);
                let otherwise = branch
                    .else_list
                    .as_ref()
                    .and_then(|list| project(list, name, default));
                if then.is_none() && otherwise.is_none() {
                    continue;
                }
                let projected = BranchNode {
                    span: branch.span,
                    pipe: branch.pipe.clone(),
                    list: then.unwrap_or_else(|| default.clone()),
                    else_list: otherwise
                        .or_else(|| (!default.is_empty()).then(|| default.clone())),
                };
                let node = match node {
                    Node::If(_) => Node::If(projected),
                    Node::Range(_) => Node::Range(projected),
                    _ => Node::With(projected),
                };
                let mut list = ListNode::new(source.span);
                list.push(node);
                return Some(list);
            }
            _ => {}
        }
    }
    None
}

/// An override with its own non-dot pipeline stays a block so that inlining
/// scopes its content.
fn override_content(block: &BlockNode) -> ListNode {
    match &block.pipe {
        Some(pipe) if !pipe.is_dot() => {
            let mut list = ListNode::new(block.span);
            list.push(Node::Block(block.clone()));
            list
        }
        _ => block.list.clone(),
    }
}

fn expand_all_fills(tree: &mut Tree) -> Result<(), CompileError> {
    let mut cache = HashMap::new();
    let names: Vec<String> = tree.names().map(str::to_string).collect();
    for name in &names {
        resolved_body(tree, name, &mut cache, &mut Vec::new())?;
    }
    for (name, define) in tree.iter_mut() {
        if let Some(body) = cache.remove(name) {
            define.list = body;
        }
    }
    Ok(())
}

/// Body of `name` with every fill expanded, memoised in `cache`.
fn resolved_body(
    tree: &Tree,
    name: &str,
    cache: &mut HashMap<String, ListNode>,
    stack: &mut Vec<String>,
) -> Result<ListNode, CompileError> {
    if let Some(body) = cache.get(name) {
        return Ok(body.clone());
    }
    if stack.iter().any(|entry| entry == name) {
        let mut chain = stack.clone();
        chain.push(name.to_string());
        return Err(CompileError::Recursion { chain });
    }
    let define = tree
        .get(name)
        .ok_or_else(|| CompileError::NotFound { name: name.to_string() })?;

    stack.push(name.to_string());
    let mut body = define.list.clone();
    expand_fills(tree, &mut body, cache, stack)?;
    stack.pop();

    cache.insert(name.to_string(), body.clone());
    Ok(body)
}

fn expand_fills(
    tree: &Tree,
    list: &mut ListNode,
    cache: &mut HashMap<String, ListNode>,
    stack: &mut Vec<String>,
) -> Result<(), CompileError> {
    for node in std::mem::take(&mut list.nodes) {
        match node {
            Node::Fill(fill) => {
                let mut overrides = fill.list;
                expand_fills(tree, &mut overrides, cache, stack)?;
                let mut target = resolved_body(tree, &fill.name, cache, stack)?;
                substitute(&mut target, &overrides);
                debug!(target = %fill.name, "fill expanded");
                match fill.pipe {
                    Some(pipe) if !pipe.is_dot() => list.push(Node::With(BranchNode {
                        span: fill.span,
                        pipe,
                        list: target,
                        else_list: None,
                    })),
                    _ => list.extend(target.nodes),
                }
            }
            Node::Block(mut block) => {
                expand_fills(tree, &mut block.list, cache, stack)?;
                list.push(Node::Block(block));
            }
            Node::If(mut branch) => {
                expand_branch(tree, &mut branch, cache, stack)?;
                list.push(Node::If(branch));
            }
            Node::Range(mut branch) => {
                expand_branch(tree, &mut branch, cache, stack)?;
                list.push(Node::Range(branch));
            }
            Node::With(mut branch) => {
                expand_branch(tree, &mut branch, cache, stack)?;
                list.push(Node::With(branch));
            }
            other => list.push(other),
        }
    }
    Ok(())
}

fn expand_branch(
    tree: &Tree,
    branch: &mut BranchNode,
    cache: &mut HashMap<String, ListNode>,
    stack: &mut Vec<String>,
) -> Result<(), CompileError> {
    expand_fills(tree, &mut branch.list, cache, stack)?;
    if let Some(else_list) = &mut branch.else_list {
        expand_fills(tree, else_list, cache, stack)?;
    }
    Ok(())
}

/// Splices every block into its content. A block with a non-dot pipeline is
/// scoped with `{{with}}`.
fn inline_blocks(template: &str, list: &mut ListNode) -> Result<(), CompileError> {
    for node in std::mem::take(&mut list.nodes) {
        match node {
            Node::Block(mut block) => {
                inline_blocks(template, &mut block.list)?;
                match block.pipe {
                    Some(pipe) if !pipe.is_dot() => list.push(Node::With(BranchNode {
                        span: block.span,
                        pipe,
                        list: block.list,
                        else_list: None,
                    })),
                    _ => list.extend(block.list.nodes),
                }
            }
            Node::Fill(fill) => {
                return Err(CompileError::Unresolved {
                    template: template.to_string(),
                    node: Node::Fill(fill).to_string(),
                });
            }
            Node::If(mut branch) => {
                inline_branch(template, &mut branch)?;
                list.push(Node::If(branch));
            }
            Node::Range(mut branch) => {
                inline_branch(template, &mut branch)?;
                list.push(Node::Range(branch));
            }
            Node::With(mut branch) => {
                inline_branch(template, &mut branch)?;
                list.push(Node::With(branch));
            }
            other => list.push(other),
        }
    }
    Ok(())
}

fn inline_branch(template: &str, branch: &mut BranchNode) -> Result<(), CompileError> {
    inline_blocks(template, &mut branch.list)?;
    if let Some(else_list) = &mut branch.else_list {
        inline_blocks(template, else_list)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Span;
    use crate::parser::parse;

    fn compiled(src: &str) -> Result<Tree, CompileError> {
        let mut tree = parse(src, "test", "", "", &[]).unwrap();
        compile(&mut tree)?;
        Ok(tree)
    }

    fn body(tree: &Tree, name: &str) -> String {
        tree.get(name).unwrap().list.to_string()
    }

    #[test]
    fn parent_chain_is_nearest_first() {
        let tree = parse(
            r#"{{define "a"}}{{end}}{{define "b" "a"}}{{end}}{{define "c" "b"}}{{end}}"#,
            "t",
            "",
            "",
            &[],
        )
        .unwrap();
        assert_eq!(parent_chain(&tree, "c").unwrap(), vec!["c", "b"]);
        assert!(parent_chain(&tree, "a").unwrap().is_empty());
    }

    #[test]
    fn self_parent_is_recursion() {
        let err = compiled(r#"{{define "a" "a"}}{{end}}"#).unwrap_err();
        assert_eq!(err.to_string(), "impossible recursion: [a a]");
    }

    #[test]
    fn unmatched_child_blocks_are_ignored() {
        let tree = compiled(
            r#"{{define "base"}}<{{block "x"}}X{{end}}>{{end}}{{define "page" "base"}}{{block "y"}}Y{{end}}{{end}}"#,
        )
        .unwrap();
        assert_eq!(body(&tree, "page"), "<X>");
    }

    #[test]
    fn block_with_pipe_is_scoped() {
        let tree = compiled(r#"{{define "a"}}{{block "b" .User}}{{.Name}}{{end}}{{end}}"#).unwrap();
        assert_eq!(body(&tree, "a"), "{{with .User}}{{.Name}}{{end}}");
    }

    #[test]
    fn fill_inside_fill_recursion_is_detected() {
        let err = compiled(
            r#"{{define "a"}}{{fill "b"}}{{end}}{{end}}{{define "b"}}{{fill "a"}}{{end}}{{end}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::Recursion { .. }));
    }

    #[test]
    fn stray_fill_is_unresolved() {
        let mut list = ListNode::default();
        list.push(Node::Fill(BlockNode {
            span: Span::default(),
            name: "x".to_string(),
            pipe: None,
            list: ListNode::default(),
        }));
        let err = inline_blocks("t", &mut list).unwrap_err();
        assert!(matches!(err, CompileError::Unresolved { ref template, .. } if template == "t"));
    }
}
