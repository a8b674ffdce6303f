use std::fmt;

use itertools::Itertools;

use crate::{
    error::{Error, Result},
    value::Value,
};

/// The operand stack.
///
/// Positional access counts from the top: index 0 is the most recently
/// pushed value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stack {
    items: Vec<Value>,
}

impl Stack {
    pub fn new() -> Self {
        Stack::default()
    }
    pub fn len(&self) -> usize {
        self.items.len()
    }
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
    pub fn push(&mut self, value: Value) {
        self.items.push(value);
    }
    /// Push, reporting a failed reallocation instead of aborting.
    pub fn try_push(&mut self, value: Value) -> Result<()> {
        self.items.try_reserve(1)?;
        self.items.push(value);
        Ok(())
    }
    pub fn pop(&mut self) -> Option<Value> {
        self.items.pop()
    }
    /// Pop, treating an empty stack as an error.
    pub fn pull(&mut self) -> Result<Value> {
        self.pop().ok_or(Error::StackUnderflow)
    }
    pub fn top(&self) -> Option<&Value> {
        self.items.last()
    }
    fn position(&self, index: usize) -> Option<usize> {
        self.items.len().checked_sub(index)?.checked_sub(1)
    }
    /// A copy of the value `index` places below the top.
    pub fn peek_at(&self, index: usize) -> Option<Value> {
        self.position(index).map(|i| self.items[i].clone())
    }
    /// Remove the value `index` places below the top, shifting the values
    /// above it down.
    pub fn remove_at(&mut self, index: usize) -> Result<Value> {
        match self.position(index) {
            Some(i) => Ok(self.items.remove(i)),
            None => Err(Error::IndexOutOfRange {
                index,
                depth: self.len(),
            }),
        }
    }
    /// Iterate from the bottom of the stack to the top.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Value> {
        self.items.iter()
    }
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl FromIterator<Value> for Stack {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Stack {
            items: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for Stack {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.items.iter().join(", "))
    }
}
