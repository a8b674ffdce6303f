use std::collections::TryReserveError;

use pest::{
    error::{Error as PestError, ErrorVariant},
    Span,
};

use crate::parse::Rule;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("undefined symbol {0:?}")]
    UndefinedSymbol(String),
    #[error("cannot delete an undefined entry {0:?}")]
    UndefinedEntry(String),
    #[error("stack underflow")]
    StackUnderflow,
    #[error("index {index} is out of range for a stack of depth {depth}")]
    IndexOutOfRange { index: usize, depth: usize },
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },
    #[error("call depth exceeded the limit of {0}")]
    CallDepthExceeded(usize),
    #[error("cannot allocate room for another value")]
    AllocationFailure,
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
}

impl Error {
    /// Syntax errors abort the whole chunk being evaluated, every other error
    /// only the current top-level expression.
    pub fn is_syntax(&self) -> bool {
        matches!(self, Error::Syntax(_))
    }
    pub fn syntax_kind(&self) -> Option<SyntaxErrorKind> {
        match self {
            Error::Syntax(error) => Some(error.kind),
            _ => None,
        }
    }
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Error::AllocationFailure
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SyntaxErrorKind {
    #[error("Unterminated operator")]
    UnterminatedOperator,
    #[error("Quote without a value to quote")]
    StandaloneQuote,
    #[error("Unexpected operator termination")]
    UnexpectedTermination,
    #[error("Invalid token")]
    InvalidToken,
}

impl SyntaxErrorKind {
    pub fn span(self, span: Span) -> SyntaxError {
        let error = PestError::new_from_span(
            ErrorVariant::CustomError {
                message: self.to_string(),
            },
            span,
        );
        SyntaxError { kind: self, error }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{error}")]
pub struct SyntaxError {
    pub kind: SyntaxErrorKind,
    error: PestError<Rule>,
}

impl SyntaxError {
    pub fn line_col(&self) -> (usize, usize) {
        match self.error.line_col {
            pest::error::LineColLocation::Pos(pos) => pos,
            pest::error::LineColLocation::Span(start, _) => start,
        }
    }
}

impl From<PestError<Rule>> for SyntaxError {
    fn from(error: PestError<Rule>) -> Self {
        SyntaxError {
            kind: SyntaxErrorKind::InvalidToken,
            error,
        }
    }
}
