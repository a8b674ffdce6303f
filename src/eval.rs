use crate::{
    error::{Error, Result},
    lexicon::Lexicon,
    parse::parse,
    stack::Stack,
    value::{NativeOp, Primitive, Value},
};

/// Default ceiling on nested, non-tail applications.
pub const MAX_CALL_DEPTH: usize = 25_000;

/// If less than this much native stack remains, grow it before nesting.
const RED_ZONE: usize = 100 * 1024;
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Produces the value that stands in for a primitive met again while it is
/// in flight.
pub type Shortcut = fn(&mut Stack, &mut Lexicon) -> Result<Value>;

#[derive(Clone, Copy)]
struct Reentry {
    caller: Primitive,
    shortcut: Shortcut,
}

/// The state of one evaluation session.
///
/// Stack and lexicon are passed in by the caller, the evaluator only holds
/// the call depth and the reentry slot of the expression being evaluated.
/// Primitives receive it so they can apply values or evaluate text.
pub struct Evaluator {
    depth: usize,
    max_depth: usize,
    reentry: Option<Reentry>,
    /// Set while a top-level expression runs.
    active: bool,
}

impl Default for Evaluator {
    fn default() -> Self {
        Evaluator::with_max_depth(MAX_CALL_DEPTH)
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Evaluator::default()
    }
    pub fn with_max_depth(max_depth: usize) -> Self {
        Evaluator {
            depth: 0,
            max_depth,
            reentry: None,
            active: false,
        }
    }
    pub fn depth(&self) -> usize {
        self.depth
    }
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
    fn reset(&mut self) {
        self.depth = 0;
        self.reentry = None;
    }
    fn is_nested(&self) -> bool {
        self.active || self.depth > 0
    }

    /// Parse `text` and evaluate each top-level expression in order.
    ///
    /// A syntax error stops evaluation and is returned. Any other error only
    /// aborts its own expression; those are logged and collected.
    ///
    /// Called from a primitive, the text runs as a nested application of the
    /// one in progress.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn evaluate(
        &mut self,
        text: &str,
        stack: &mut Stack,
        lexicon: &mut Lexicon,
    ) -> Result<Vec<Error>> {
        let mut failures = Vec::new();
        for expr in parse(text)? {
            let value = expr?;
            tracing::trace!(%value, "evaluating");
            if let Err(error) = self.eval_expression(value, stack, lexicon) {
                tracing::warn!(%error, "expression failed");
                failures.push(error);
            }
        }
        Ok(failures)
    }

    /// Evaluate one top-level expression with a fresh depth count.
    ///
    /// While another expression is running, the value is applied as a nested
    /// call instead. It counts towards the depth of the outer expression and
    /// does not see its reentry slot.
    pub fn eval_expression(
        &mut self,
        value: Value,
        stack: &mut Stack,
        lexicon: &mut Lexicon,
    ) -> Result<()> {
        if !value.is_deferred() {
            return stack.try_push(value);
        }
        if self.is_nested() {
            let outer = self.reentry.take();
            let result = self.apply(value, stack, lexicon);
            self.reentry = outer;
            return result;
        }
        self.reset();
        self.active = true;
        let result = self.run(value, stack, lexicon);
        self.active = false;
        result
    }

    /// Apply `value` as a nested call.
    ///
    /// This is what primitives use to force a value. The call counts towards
    /// the depth limit.
    pub fn apply(&mut self, value: Value, stack: &mut Stack, lexicon: &mut Lexicon) -> Result<()> {
        if self.depth >= self.max_depth {
            tracing::debug!(depth = self.depth, "call depth limit reached");
            return Err(Error::CallDepthExceeded(self.max_depth));
        }
        self.depth += 1;
        let result = ensure_sufficient_stack(|| self.run(value, stack, lexicon));
        self.depth -= 1;
        result
    }

    /// Apply `value` with `caller` marked as in flight.
    ///
    /// Whenever `caller` is about to be invoked during this application, it
    /// is not called again. `shortcut` is called instead and evaluation
    /// continues with the value it returns. The previous reentry slot is
    /// restored afterwards, whether or not the application failed.
    pub fn delegate(
        &mut self,
        caller: NativeOp,
        shortcut: Shortcut,
        value: Value,
        stack: &mut Stack,
        lexicon: &mut Lexicon,
    ) -> Result<()> {
        let outer = self.reentry.replace(Reentry {
            caller: Primitive(caller),
            shortcut,
        });
        let result = self.apply(value, stack, lexicon);
        self.reentry = outer;
        result
    }

    /// The trampoline. Symbol lookups, reentry substitutions and the last
    /// instruction of an operator continue the loop instead of recursing.
    fn run(&mut self, mut value: Value, stack: &mut Stack, lexicon: &mut Lexicon) -> Result<()> {
        loop {
            value = match value {
                Value::Integer(_) | Value::Decimal(_) => return stack.try_push(value),
                Value::Symbol(ref name) => lexicon.lookup(name)?,
                Value::Quoted(ref mut inner) => return stack.try_push(inner.take()),
                Value::Primitive(primitive) => {
                    match self.reentry.filter(|reentry| reentry.caller == primitive) {
                        Some(reentry) => (reentry.shortcut)(stack, lexicon)?,
                        None => return (primitive.0)(self, stack, lexicon),
                    }
                }
                Value::Operator(ref body) => {
                    let last = match body.last() {
                        Some(last) => last.clone(),
                        None => return Ok(()),
                    };
                    for instr in body.iter().take(body.len() - 1) {
                        if instr.is_deferred() {
                            self.apply(instr.clone(), stack, lexicon)?;
                        } else {
                            stack.try_push(instr.clone())?;
                        }
                    }
                    if !last.is_deferred() {
                        return stack.try_push(last);
                    }
                    last
                }
            }
        }
    }
}

/// Run `f`, on a fresh stack segment if the current one is nearly used up.
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

pub(crate) fn stack_is_low() -> bool {
    stacker::remaining_stack().map_or(false, |left| left < RED_ZONE)
}

/// Pops the value to force.
fn pull_operand(stack: &mut Stack, _: &mut Lexicon) -> Result<Value> {
    stack.pull()
}

/// Apply the value on top of the stack.
///
/// Every `force` met while one is already in flight, in tail position or
/// not, pops its operand inside the running trampoline instead of nesting
/// another native call. Its address identifies it as the in-flight caller.
#[inline(never)]
pub fn force(evaluator: &mut Evaluator, stack: &mut Stack, lexicon: &mut Lexicon) -> Result<()> {
    evaluator.delegate(force, pull_operand, Value::primitive(force), stack, lexicon)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn add(_: &mut Evaluator, stack: &mut Stack, _: &mut Lexicon) -> Result<()> {
        let b = stack.pull()?.as_integer()?;
        let a = stack.pull()?.as_integer()?;
        stack.push(Value::from(a + b));
        Ok(())
    }

    fn run(text: &str, lexicon: &mut Lexicon) -> (Stack, Vec<Error>) {
        let mut stack = Stack::new();
        let failures = Evaluator::new()
            .evaluate(text, &mut stack, lexicon)
            .unwrap();
        (stack, failures)
    }

    #[test]
    fn self_evaluation() {
        let mut stack = Stack::new();
        let mut lex = Lexicon::new();
        let mut ev = Evaluator::new();
        ev.eval_expression(Value::from(5), &mut stack, &mut lex).unwrap();
        ev.eval_expression(Value::from(2.5), &mut stack, &mut lex).unwrap();
        assert_eq!(
            stack.iter().cloned().collect::<Vec<_>>(),
            vec![Value::from(5), Value::from(2.5)]
        );
    }

    #[test]
    fn quoting_defers_lookup() {
        let mut stack = Stack::new();
        let mut lex = Lexicon::new();
        let mut ev = Evaluator::new();
        ev.eval_expression(
            Value::quote(Value::symbol("undefined_name")),
            &mut stack,
            &mut lex,
        )
        .unwrap();
        assert_eq!(stack.top(), Some(&Value::symbol("undefined_name")));
        let error = ev
            .eval_expression(Value::symbol("undefined_name"), &mut stack, &mut lex)
            .unwrap_err();
        assert!(matches!(error, Error::UndefinedSymbol(name) if name == "undefined_name"));
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn operator_bodies() {
        let mut lex = Lexicon::new();
        lex.define("+", Value::primitive(add));
        lex.define(
            "three",
            Value::operator(vec![Value::from(1), Value::from(2), Value::symbol("+")]),
        );
        let (stack, failures) = run("three ( 4 ) 'x", &mut lex);
        assert!(failures.is_empty());
        assert_eq!(stack.to_string(), "3, ( 4 ), x");
    }

    #[test]
    fn operator_instructions_are_applied_in_order() {
        let mut lex = Lexicon::new();
        lex.define("one", Value::from(1));
        lex.define(
            "f",
            Value::operator(vec![
                Value::symbol("one"),
                Value::quote(Value::symbol("one")),
                Value::operator(None),
                Value::from(2.5),
            ]),
        );
        let (stack, _) = run("f", &mut lex);
        assert_eq!(stack.to_string(), "1, one, ( ), 2.5");
    }

    #[test]
    fn empty_operator_is_a_noop() {
        let mut lex = Lexicon::new();
        lex.define("nothing", Value::operator(None));
        let (stack, failures) = run("nothing nothing", &mut lex);
        assert!(failures.is_empty());
        assert!(stack.is_empty());
    }

    #[test]
    fn failures_abort_one_expression() {
        let mut lex = Lexicon::new();
        lex.define("+", Value::primitive(add));
        let (stack, failures) = run("1 + 2 missing 3", &mut lex);
        assert_eq!(failures.len(), 2);
        assert!(matches!(failures[0], Error::StackUnderflow));
        assert!(matches!(&failures[1], Error::UndefinedSymbol(name) if name == "missing"));
        assert_eq!(stack.to_string(), "2, 3");
    }

    #[test]
    fn syntax_errors_stop_evaluation() {
        let mut stack = Stack::new();
        let mut lex = Lexicon::new();
        let error = Evaluator::new()
            .evaluate("1 ( 2", &mut stack, &mut lex)
            .unwrap_err();
        assert!(error.is_syntax());
        assert_eq!(stack.to_string(), "1");
    }

    #[test]
    fn non_tail_recursion_is_bounded() {
        let mut lex = Lexicon::new();
        lex.define("f", Value::operator(vec![Value::symbol("f"), Value::from(1)]));
        let mut stack = Stack::new();
        let mut ev = Evaluator::with_max_depth(300);
        let error = ev
            .eval_expression(Value::symbol("f"), &mut stack, &mut lex)
            .unwrap_err();
        assert!(matches!(error, Error::CallDepthExceeded(300)));
        assert_eq!(ev.depth(), 0);
        assert!(stack.is_empty());
    }

    #[test]
    fn depth_resets_between_expressions() {
        let mut lex = Lexicon::new();
        lex.define("g", Value::operator(vec![Value::symbol("h"), Value::from(0)]));
        lex.define(
            "h",
            Value::operator(vec![Value::quote(Value::from(1)), Value::from(2)]),
        );
        let mut stack = Stack::new();
        let mut ev = Evaluator::with_max_depth(2);
        for _ in 0..3 {
            ev.eval_expression(Value::symbol("g"), &mut stack, &mut lex)
                .unwrap();
        }
        assert_eq!(stack.len(), 9);
        let mut ev = Evaluator::with_max_depth(1);
        assert!(ev
            .eval_expression(Value::symbol("g"), &mut stack, &mut lex)
            .is_err());
    }

    #[test]
    fn force_applies_the_top() {
        let mut lex = Lexicon::new();
        lex.define("!", Value::primitive(force));
        lex.define("+", Value::primitive(add));
        let (stack, failures) = run("1 2 '+ ! ( 3 ) ! 4 !", &mut lex);
        assert!(failures.is_empty());
        assert_eq!(stack.to_string(), "3, 3, 4");
    }

    #[test]
    fn nested_force_uses_the_shortcut() {
        let mut lex = Lexicon::new();
        lex.define("!", Value::primitive(force));
        let (stack, failures) = run("5 '( '! ! ) ! ! !", &mut lex);
        assert!(failures.is_empty());
        assert_eq!(stack.to_string(), "5");
    }

    #[test]
    fn delegate_restores_the_outer_slot() {
        fn marker(_: &mut Evaluator, stack: &mut Stack, _: &mut Lexicon) -> Result<()> {
            stack.push(Value::symbol("called"));
            Ok(())
        }
        fn substitute(_: &mut Stack, _: &mut Lexicon) -> Result<Value> {
            Ok(Value::quote(Value::symbol("substituted")))
        }
        let mut stack = Stack::new();
        let mut lex = Lexicon::new();
        let mut ev = Evaluator::new();
        ev.delegate(marker, substitute, Value::primitive(marker), &mut stack, &mut lex)
            .unwrap();
        ev.apply(Value::primitive(marker), &mut stack, &mut lex).unwrap();
        assert_eq!(stack.to_string(), "substituted, called");
    }

    #[test]
    fn failed_delegation_restores_the_outer_slot() {
        fn marker(_: &mut Evaluator, stack: &mut Stack, _: &mut Lexicon) -> Result<()> {
            stack.push(Value::symbol("called"));
            Ok(())
        }
        fn underflow(stack: &mut Stack, _: &mut Lexicon) -> Result<Value> {
            stack.pull()
        }
        let mut stack = Stack::new();
        let mut lex = Lexicon::new();
        let mut ev = Evaluator::new();
        let error = ev
            .delegate(marker, underflow, Value::primitive(marker), &mut stack, &mut lex)
            .unwrap_err();
        assert!(matches!(error, Error::StackUnderflow));
        assert!(ev.reentry.is_none());
        assert_eq!(ev.depth(), 0);
        ev.apply(Value::primitive(marker), &mut stack, &mut lex).unwrap();
        assert_eq!(stack.to_string(), "called");
    }

    /// Pops a symbol and evaluates it as source text.
    fn load(ev: &mut Evaluator, stack: &mut Stack, lexicon: &mut Lexicon) -> Result<()> {
        let text = stack.pull()?.into_symbol()?;
        match ev.evaluate(&text, stack, lexicon)?.into_iter().next() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    #[test]
    fn primitives_can_evaluate_text() {
        let mut lex = Lexicon::new();
        lex.define("load", Value::primitive(load));
        lex.define("seven", Value::from(7));
        lex.define(
            "f",
            Value::operator(vec![
                Value::quote(Value::symbol("seven")),
                Value::symbol("load"),
                Value::from(1),
            ]),
        );
        let mut stack = Stack::new();
        let mut ev = Evaluator::new();
        let failures = ev.evaluate("f f", &mut stack, &mut lex).unwrap();
        assert!(failures.is_empty());
        assert_eq!(stack.to_string(), "7, 1, 7, 1");
        assert_eq!(ev.depth(), 0);
        ev.apply(Value::symbol("f"), &mut stack, &mut lex).unwrap();
        assert_eq!(stack.len(), 6);
    }

    #[test]
    fn evaluating_text_counts_towards_depth() {
        let mut lex = Lexicon::new();
        lex.define("load", Value::primitive(load));
        lex.define(
            "r",
            Value::operator(vec![
                Value::quote(Value::symbol("r")),
                Value::symbol("load"),
                Value::from(1),
            ]),
        );
        let mut stack = Stack::new();
        let mut ev = Evaluator::with_max_depth(50);
        let failures = ev.evaluate("r", &mut stack, &mut lex).unwrap();
        assert!(matches!(&failures[..], [Error::CallDepthExceeded(50)]));
        assert_eq!(ev.depth(), 0);
        assert!(stack.iter().all(|value| *value != Value::from(1)));
    }

    #[test]
    fn nested_evaluation_hides_the_reentry_slot() {
        fn slot_is_free(ev: &mut Evaluator, stack: &mut Stack, _: &mut Lexicon) -> Result<()> {
            stack.push(Value::from(ev.reentry.is_none() as i64));
            Ok(())
        }
        let mut lex = Lexicon::new();
        lex.define("!", Value::primitive(force));
        lex.define("load", Value::primitive(load));
        lex.define("free?", Value::primitive(slot_is_free));
        let (stack, failures) = run("'free? '( load free? ) !", &mut lex);
        assert!(failures.is_empty());
        assert_eq!(stack.to_string(), "1, 0");
    }
}
