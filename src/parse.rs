use pest::{iterators::FlatPairs, Parser, Span};

use crate::{
    error::{Result, SyntaxError, SyntaxErrorKind},
    value::{Instructions, Value},
};

pub const OPEN: char = '(';
pub const CLOSE: char = ')';
pub const QUOTE: char = '\'';
pub const COMMENT: char = ';';

#[derive(pest_derive::Parser)]
#[grammar = "grammar.pest"]
struct ParusParser;

/// Tokenize `input` and return an iterator over its top-level expressions.
///
/// Expressions are built as the iterator advances, so an expression that
/// precedes a syntax error is yielded before the error is. After an error the
/// iterator is exhausted.
pub fn parse(input: &str) -> Result<Expressions<'_>> {
    let tokens = ParusParser::parse(Rule::tokens, input).map_err(SyntaxError::from)?;
    Ok(Expressions {
        tokens: tokens.flatten(),
        operators: Vec::new(),
        quotes: Vec::new(),
        done: false,
    })
}

/// The nesting balance of the operators in `text`, ignoring comments.
///
/// Positive when more input is needed to close every operator, zero when
/// balanced and negative when there are more closes than opens.
pub fn paren_count(text: &str) -> i32 {
    text.lines()
        .filter_map(|line| line.split(COMMENT).next())
        .flat_map(str::chars)
        .map(|c| match c {
            OPEN => 1,
            CLOSE => -1,
            _ => 0,
        })
        .sum()
}

struct OpenOperator<'i> {
    span: Span<'i>,
    body: Instructions,
}

enum Quote<'i> {
    Open(Span<'i>),
    /// Separates the quotes pending outside an operator from those inside it
    Bookmark,
}

pub struct Expressions<'i> {
    tokens: FlatPairs<'i, Rule>,
    operators: Vec<OpenOperator<'i>>,
    quotes: Vec<Quote<'i>>,
    done: bool,
}

impl<'i> Expressions<'i> {
    fn advance(&mut self) -> Result<Option<Value>> {
        while let Some(pair) = self.tokens.next() {
            let span = pair.as_span();
            let candidate = match pair.as_rule() {
                Rule::open => {
                    self.operators.push(OpenOperator {
                        span,
                        body: Instructions::new_sync(),
                    });
                    self.quotes.push(Quote::Bookmark);
                    continue;
                }
                Rule::close => match self.operators.pop() {
                    Some(operator) => {
                        self.close_quotes()?;
                        Value::Operator(operator.body)
                    }
                    None => {
                        return Err(SyntaxErrorKind::UnexpectedTermination.span(span).into())
                    }
                },
                Rule::quote => {
                    self.quotes.push(Quote::Open(span));
                    continue;
                }
                Rule::word => literal(pair.as_str()),
                _ => continue,
            };
            let value = self.drain_quotes(candidate);
            match self.operators.last_mut() {
                Some(parent) => parent.body.push_back_mut(value),
                None => return Ok(Some(value)),
            }
        }
        self.finish()?;
        Ok(None)
    }
    fn drain_quotes(&mut self, mut value: Value) -> Value {
        while let Some(Quote::Open(_)) = self.quotes.last() {
            self.quotes.pop();
            value = Value::quote(value);
        }
        value
    }
    fn close_quotes(&mut self) -> Result<()> {
        match self.quotes.pop() {
            Some(Quote::Open(span)) => Err(SyntaxErrorKind::StandaloneQuote.span(span).into()),
            Some(Quote::Bookmark) | None => Ok(()),
        }
    }
    fn finish(&mut self) -> Result<()> {
        let dangling = self.quotes.iter().rev().find_map(|quote| match quote {
            Quote::Open(span) => Some(span.clone()),
            Quote::Bookmark => None,
        });
        if let Some(span) = dangling {
            return Err(SyntaxErrorKind::StandaloneQuote.span(span).into());
        }
        if let Some(operator) = self.operators.last() {
            return Err(SyntaxErrorKind::UnterminatedOperator
                .span(operator.span.clone())
                .into());
        }
        Ok(())
    }
}

impl<'i> Iterator for Expressions<'i> {
    type Item = Result<Value>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let next = self.advance().transpose();
        if !matches!(next, Some(Ok(_))) {
            self.done = true;
        }
        next
    }
}

fn literal(word: &str) -> Value {
    if let Ok(i) = word.parse::<i64>() {
        Value::Integer(i)
    } else if let Ok(d) = word.parse::<f64>() {
        Value::Decimal(d)
    } else {
        Value::symbol(word)
    }
}
