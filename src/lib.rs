//! Execution core of Parus, a small postfix, stack-based language.
//!
//! Source text is split into whitespace-delimited tokens. Numbers evaluate to
//! themselves, symbols evaluate whatever they are bound to in the [`Lexicon`],
//! `'` defers the evaluation of the value after it and `( ... )` builds an
//! operator, a list of instructions run left to right with its last
//! instruction evaluated as a tail call.
//!
//! ```
//! use parus::Stack;
//!
//! let mut stack = Stack::new();
//! let mut lexicon = parus::core_lexicon();
//! let failures = parus::evaluate("1 '( 2 3 ) !", &mut stack, &mut lexicon).unwrap();
//! assert!(failures.is_empty());
//! assert_eq!(stack.to_string(), "1, 2, 3");
//! ```

pub mod error;
pub mod eval;
pub mod lexicon;
pub mod parse;
pub mod stack;
pub mod value;

pub use error::{Error, Result, SyntaxError, SyntaxErrorKind};
pub use eval::{force, Evaluator, Shortcut, MAX_CALL_DEPTH};
pub use lexicon::Lexicon;
pub use parse::{paren_count, parse};
pub use stack::Stack;
pub use value::{Instructions, NativeOp, Primitive, Value};

/// The name `force` is bound to by [`core_lexicon`].
pub const FORCE: &str = "!";

/// A lexicon holding only the core's own primitive, `!`.
pub fn core_lexicon() -> Lexicon {
    let mut lexicon = Lexicon::new();
    lexicon.define(FORCE, Value::primitive(force));
    lexicon
}

/// Evaluate every top-level expression of `text` in a fresh session.
///
/// See [`Evaluator::evaluate`].
pub fn evaluate(text: &str, stack: &mut Stack, lexicon: &mut Lexicon) -> Result<Vec<Error>> {
    Evaluator::new().evaluate(text, stack, lexicon)
}

/// Apply a single value in a fresh session. Unlike a top-level expression,
/// an operator applied this way runs its instructions.
pub fn apply(value: Value, stack: &mut Stack, lexicon: &mut Lexicon) -> Result<()> {
    Evaluator::new().apply(value, stack, lexicon)
}
