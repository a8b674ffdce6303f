use std::fmt;

use crate::{
    error::{Error, Result},
    value::Value,
};

/// The global symbol table.
///
/// Entries are kept in definition order. Lookups scan from the newest entry,
/// so a later definition shadows an earlier one of the same name until it is
/// deleted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lexicon {
    entries: Vec<(String, Value)>,
}

impl Lexicon {
    pub fn new() -> Self {
        Lexicon::default()
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().rposition(|(entry, _)| entry == name)
    }
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }
    pub fn define<N>(&mut self, name: N, value: Value)
    where
        N: Into<String>,
    {
        self.entries.push((name.into(), value));
    }
    /// Replace the value of the newest binding of `name` without adding a
    /// shadowing entry.
    pub fn redefine(&mut self, name: &str, value: Value) -> Result<Value> {
        match self.position(name) {
            Some(i) => Ok(std::mem::replace(&mut self.entries[i].1, value)),
            None => Err(Error::UndefinedEntry(name.into())),
        }
    }
    /// A copy of the newest binding of `name`. The binding itself is left
    /// untouched.
    pub fn lookup(&self, name: &str) -> Result<Value> {
        self.position(name)
            .map(|i| self.entries[i].1.clone())
            .ok_or_else(|| Error::UndefinedSymbol(name.into()))
    }
    /// Remove the newest binding of `name`, uncovering any older one.
    pub fn delete(&mut self, name: &str) -> Result<Value> {
        match self.position(name) {
            Some(i) => Ok(self.entries.remove(i).1),
            None => Err(Error::UndefinedEntry(name.into())),
        }
    }
    /// Iterate from the oldest entry to the newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&str, &Value)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }
}

impl fmt::Display for Lexicon {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (name, value) in self.iter() {
            writeln!(f, "{} : {}", name, value)?;
        }
        Ok(())
    }
}
