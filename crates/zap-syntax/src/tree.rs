use crate::ast::DefineNode;
use crate::error::ParseError;
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;

/// Named templates, ordered by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tree {
    defines: BTreeMap<String, DefineNode>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a template. A name that is already present is an error and
    /// leaves the tree unchanged.
    pub fn add(&mut self, define: DefineNode) -> Result<(), ParseError> {
        match self.defines.entry(define.name.clone()) {
            btree_map::Entry::Occupied(_) => Err(ParseError::duplicate(define.name)),
            btree_map::Entry::Vacant(slot) => {
                slot.insert(define);
                Ok(())
            }
        }
    }

    /// Merges every template of `other`. Nothing is merged if any name clashes.
    pub fn add_tree(&mut self, other: Tree) -> Result<(), ParseError> {
        if let Some(name) = other.defines.keys().find(|name| self.defines.contains_key(*name)) {
            return Err(ParseError::duplicate(name.clone()));
        }
        self.defines.extend(other.defines);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&DefineNode> {
        self.defines.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut DefineNode> {
        self.defines.get_mut(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<DefineNode> {
        self.defines.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.defines.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.defines.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DefineNode)> {
        self.defines.iter().map(|(name, define)| (name.as_str(), define))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut DefineNode)> {
        self.defines.iter_mut().map(|(name, define)| (name.as_str(), define))
    }

    pub fn len(&self) -> usize {
        self.defines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defines.is_empty()
    }

    pub fn clear(&mut self) {
        self.defines.clear();
    }
}

impl IntoIterator for Tree {
    type Item = (String, DefineNode);
    type IntoIter = btree_map::IntoIter<String, DefineNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.defines.into_iter()
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for define in self.defines.values() {
            write!(f, "{}", define)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ListNode;
    use crate::error::{ParseErrorKind, Span};

    fn define(name: &str) -> DefineNode {
        DefineNode {
            span: Span::default(),
            name: name.to_string(),
            parent: None,
            list: ListNode::default(),
        }
    }

    #[test]
    fn add_rejects_duplicates() {
        let mut tree = Tree::new();
        tree.add(define("a")).unwrap();
        let err = tree.add(define("a")).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::DuplicateTemplate("a".to_string()));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn add_tree_is_all_or_nothing() {
        let mut tree = Tree::new();
        tree.add(define("b")).unwrap();

        let mut other = Tree::new();
        other.add(define("a")).unwrap();
        other.add(define("b")).unwrap();
        assert!(tree.add_tree(other).is_err());
        assert!(!tree.contains("a"));

        let mut other = Tree::new();
        other.add(define("c")).unwrap();
        tree.add_tree(other).unwrap();
        assert_eq!(tree.names().collect::<Vec<_>>(), vec!["b", "c"]);
    }
}
