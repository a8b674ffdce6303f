use std::{fmt, mem};

use rpds::VectorSync;

use crate::{
    error::{Error, Result},
    eval::{ensure_sufficient_stack, stack_is_low, Evaluator},
    lexicon::Lexicon,
    stack::Stack,
};

/// Signature of a native operator.
///
/// A primitive pulls its own operands from the stack and is responsible for
/// checking their arity and types.
pub type NativeOp = fn(&mut Evaluator, &mut Stack, &mut Lexicon) -> Result<()>;

/// The instruction list of a user-defined operator.
///
/// Bodies are immutable once parsed, so copies share structure.
pub type Instructions = VectorSync<Value>;

#[derive(Clone, Copy)]
pub struct Primitive(pub NativeOp);

impl Primitive {
    fn addr(self) -> usize {
        self.0 as usize
    }
}

impl PartialEq for Primitive {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for Primitive {}

impl fmt::Debug for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Primitive({:#x})", self.addr())
    }
}

/// A Parus value.
///
/// Quotes and operators may nest arbitrarily deep. Cloning, comparing,
/// printing and dropping them switch to a fresh stack segment when the
/// current one runs low.
#[derive(Debug)]
pub enum Value {
    Integer(i64),
    Decimal(f64),
    Symbol(String),
    Quoted(Box<Value>),
    Primitive(Primitive),
    Operator(Instructions),
}

impl Value {
    pub fn symbol<S>(name: S) -> Self
    where
        S: Into<String>,
    {
        Value::Symbol(name.into())
    }
    pub fn quote(value: Value) -> Self {
        Value::Quoted(Box::new(value))
    }
    pub fn primitive(op: NativeOp) -> Self {
        Value::Primitive(Primitive(op))
    }
    pub fn operator<I>(instructions: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        let mut body = Instructions::new_sync();
        for instr in instructions {
            body.push_back_mut(instr);
        }
        Value::Operator(body)
    }
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Decimal(_) => "decimal",
            Value::Symbol(_) => "symbol",
            Value::Quoted(_) => "quoted",
            Value::Primitive(_) => "primitive",
            Value::Operator(_) => "operator",
        }
    }
    /// Move the value out, leaving a placeholder integer behind.
    pub(crate) fn take(&mut self) -> Value {
        mem::replace(self, Value::Integer(0))
    }
    /// Whether evaluating this value does more than push it.
    pub fn is_deferred(&self) -> bool {
        matches!(self, Value::Symbol(_) | Value::Quoted(_))
    }
    fn mismatch(&self, expected: &'static str) -> Error {
        Error::TypeMismatch {
            expected,
            found: self.type_name().into(),
        }
    }
    pub fn as_integer(&self) -> Result<i64> {
        match self {
            Value::Integer(i) => Ok(*i),
            other => Err(other.mismatch("integer")),
        }
    }
    pub fn as_decimal(&self) -> Result<f64> {
        match self {
            Value::Decimal(d) => Ok(*d),
            other => Err(other.mismatch("decimal")),
        }
    }
    /// Integers widen to decimals.
    pub fn as_number(&self) -> Result<f64> {
        match self {
            Value::Integer(i) => Ok(*i as f64),
            Value::Decimal(d) => Ok(*d),
            other => Err(other.mismatch("number")),
        }
    }
    pub fn as_symbol(&self) -> Result<&str> {
        match self {
            Value::Symbol(name) => Ok(name),
            other => Err(other.mismatch("symbol")),
        }
    }
    pub fn into_symbol(mut self) -> Result<String> {
        match &mut self {
            Value::Symbol(name) => Ok(mem::take(name)),
            other => Err(other.mismatch("symbol")),
        }
    }
    pub fn into_quoted(mut self) -> Result<Value> {
        match &mut self {
            Value::Quoted(inner) => Ok(inner.take()),
            other => Err(other.mismatch("quoted")),
        }
    }
    pub fn into_operator(self) -> Result<Instructions> {
        match &self {
            Value::Operator(body) => Ok(body.clone()),
            other => Err(other.mismatch("operator")),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Decimal(d)
    }
}

impl Clone for Value {
    fn clone(&self) -> Self {
        match self {
            Value::Integer(i) => Value::Integer(*i),
            Value::Decimal(d) => Value::Decimal(*d),
            Value::Symbol(name) => Value::Symbol(name.clone()),
            Value::Quoted(inner) => ensure_sufficient_stack(|| Value::Quoted(inner.clone())),
            Value::Primitive(primitive) => Value::Primitive(*primitive),
            Value::Operator(body) => Value::Operator(body.clone()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Quoted(a), Value::Quoted(b)) => ensure_sufficient_stack(|| a == b),
            (Value::Primitive(a), Value::Primitive(b)) => a == b,
            (Value::Operator(a), Value::Operator(b)) => ensure_sufficient_stack(|| a == b),
            _ => false,
        }
    }
}

impl Drop for Value {
    fn drop(&mut self) {
        if !matches!(self, Value::Quoted(_) | Value::Operator(_)) || !stack_is_low() {
            return;
        }
        let child = match self {
            Value::Quoted(inner) => inner.take(),
            Value::Operator(body) => {
                Value::Operator(mem::replace(body, Instructions::new_sync()))
            }
            _ => return,
        };
        ensure_sufficient_stack(move || drop(child));
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{}", i),
            Value::Decimal(d) => write!(f, "{:?}", d),
            Value::Symbol(name) => write!(f, "{}", name),
            Value::Quoted(inner) => ensure_sufficient_stack(|| write!(f, "'{}", inner)),
            Value::Primitive(_) => write!(f, "<primitive>"),
            Value::Operator(body) => ensure_sufficient_stack(|| {
                write!(f, "(")?;
                for instr in body.iter() {
                    write!(f, " {}", instr)?;
                }
                write!(f, " )")
            }),
        }
    }
}
