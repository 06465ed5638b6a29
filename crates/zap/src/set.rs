use crate::Error;
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;
use zap_escape::FUNCS;
use zap_syntax::{DEFAULT_LEFT_DELIM, DEFAULT_RIGHT_DELIM, DefineNode, Tree};

/// A collection of named templates sharing delimiters and a function table.
#[derive(Debug, Clone, Default)]
pub struct Set {
    /// Templates as parsed. Compilation never modifies them.
    source: Tree,
    /// Output of the last compile or escape, if the source has not changed since.
    compiled: Option<Tree>,
    left: String,
    right: String,
    funcs: BTreeSet<String>,
}

impl Set {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the action delimiters for subsequent [`Set::parse`] calls.
    /// Empty strings select `{{` and `}}`.
    pub fn delims(&mut self, left: &str, right: &str) -> &mut Self {
        self.left = left.to_string();
        self.right = right.to_string();
        self
    }

    /// Adds function names that identifiers in later sources may refer to.
    pub fn funcs<I, S>(&mut self, names: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.funcs.extend(names.into_iter().map(Into::into));
        self
    }

    /// Parses `text` and adds its templates to the set. `name` labels errors.
    ///
    /// Nothing is added if parsing fails or a template name is already taken.
    pub fn parse(&mut self, name: &str, text: &str) -> Result<&mut Self, Error> {
        let tree = zap_syntax::parse(text, name, &self.left, &self.right, &[&self.funcs])?;
        debug!(source = name, templates = tree.len(), "parsed");
        self.add_tree(tree)?;
        Ok(self)
    }

    /// Merges an already parsed tree into the set.
    ///
    /// Earlier compile or escape output is discarded; the next
    /// [`Set::compile`] starts again from every parsed template.
    pub fn add_tree(&mut self, tree: Tree) -> Result<(), Error> {
        self.source.add_tree(tree)?;
        self.compiled = None;
        Ok(())
    }

    /// Resolves inheritance, fills and blocks in a copy of the parsed
    /// templates. On failure the set is unchanged.
    pub fn compile(&mut self) -> Result<(), Error> {
        let mut tree = self.source.clone();
        zap_syntax::compile(&mut tree)?;
        self.compiled = Some(tree);
        Ok(())
    }

    /// Compiles if needed, then escapes every template.
    ///
    /// On failure the set is left empty. On success the escaping functions
    /// join the function table so the printed set parses again.
    pub fn escape(&mut self) -> Result<(), Error> {
        let tree = match self.compiled.take() {
            Some(tree) => tree,
            None => {
                let mut tree = self.source.clone();
                zap_syntax::compile(&mut tree)?;
                tree
            }
        };
        match zap_escape::escape(tree) {
            Ok(escaped) => {
                self.compiled = Some(escaped);
                self.funcs.extend(FUNCS.keys().map(|name| name.to_string()));
                Ok(())
            }
            Err(err) => {
                self.source.clear();
                Err(err.into())
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&DefineNode> {
        self.tree().get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tree().names()
    }

    /// The compiled templates, or the parsed ones before the first compile.
    pub fn tree(&self) -> &Tree {
        self.compiled.as_ref().unwrap_or(&self.source)
    }

    pub fn into_tree(self) -> Tree {
        self.compiled.unwrap_or(self.source)
    }

    pub fn is_empty(&self) -> bool {
        self.tree().is_empty()
    }

    pub fn has_func(&self, name: &str) -> bool {
        self.funcs.contains(name)
    }

    /// The delimiters in effect, with defaults filled in.
    pub fn delimiters(&self) -> (&str, &str) {
        let left = if self.left.is_empty() { DEFAULT_LEFT_DELIM } else { &self.left };
        let right = if self.right.is_empty() { DEFAULT_RIGHT_DELIM } else { &self.right };
        (left, right)
    }
}

impl fmt::Display for Set {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tree())
    }
}
