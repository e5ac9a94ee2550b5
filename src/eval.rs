//! # Evaluation
//!
//! A tree-walking evaluator over [`Expr`]. Evaluation returns a [`Flow`] so that `break` and
//! `return` can unwind to the construct that consumes them, while errors travel through the
//! `Err` side. Halting is not a flow: it is a flag on the environment that loops and queries poll.

mod builtins;

pub use builtins::Builtin;

use crate::{
    ast::{Call, Expr, FactPattern, Function, SlotValue, Sym},
    error::EvalError,
    facts::FactRef,
    universe::{Environment, Frame},
    value::{Flow, Value},
};

/// Unwrap a [`Flow::Normal`] value, or return any other flow from the enclosing function.
macro_rules! value {
    ($flow:expr) => {
        match $flow {
            Flow::Normal(value) => value,
            other => return Ok(other),
        }
    };
}

impl Environment {
    /// Evaluate an expression in the current variable frame.
    pub fn eval(&mut self, expr: &Expr) -> Result<Flow, EvalError> {
        match expr {
            Expr::Const(value) => Ok(Flow::Normal(value.clone())),
            Expr::Var(name) => self
                .frames
                .last()
                .and_then(|frame| frame.get(name))
                .cloned()
                .map(Flow::Normal)
                .ok_or_else(|| EvalError::UnboundVariable(self.name(*name))),
            Expr::Global(name) => self
                .globals
                .get(name)
                .cloned()
                .map(Flow::Normal)
                .ok_or_else(|| EvalError::UnboundGlobal(self.name(*name))),
            Expr::Call(call) => self.eval_call(call),
            Expr::Query(query) => self.eval_query(query),
            Expr::Template(template) => Ok(Flow::Normal(Value::Template(template.clone()))),
            Expr::QueryFact { depth, position } => {
                self.query_fact(*depth, *position).map(|f| Flow::Normal(f.into()))
            }
            Expr::QueryFactSlot {
                depth,
                position,
                slot,
            } => self
                .query_fact_slot(*depth, *position, *slot)
                .map(Flow::Normal),
            Expr::Delimiter => Ok(Flow::Normal(Value::Symbol(Sym::QUERY_DELIMITER))),
            Expr::Assert(patterns) => self.eval_assert(patterns),
        }
    }

    /// Evaluate expressions in order, yielding the value of the last one. Stops early on `break`,
    /// `return` or a halt.
    pub(crate) fn eval_sequence(&mut self, exprs: &[Expr]) -> Result<Flow, EvalError> {
        let mut last = Value::FALSE;
        for expr in exprs {
            last = value!(self.eval(expr)?);
            if self.is_halted() {
                break;
            }
        }
        Ok(Flow::Normal(last))
    }

    /// The value of a slot of a fact.
    pub(crate) fn slot_value(&self, fact: &FactRef, slot: Sym) -> Result<Value, EvalError> {
        if fact.is_garbage() {
            return Err(EvalError::FactRetracted(fact.index));
        }
        fact.slot_value(slot)
            .cloned()
            .ok_or_else(|| EvalError::UnknownSlot {
                template: self.name(fact.template.name),
                slot: self.name(slot),
            })
    }

    fn eval_call(&mut self, call: &Call) -> Result<Flow, EvalError> {
        match call.function {
            Function::Builtin(builtin) => self.eval_builtin(builtin, &call.args),
            Function::User(name) => self.call_deffunction(name, &call.args),
        }
    }

    fn eval_builtin(&mut self, builtin: Builtin, args: &[Expr]) -> Result<Flow, EvalError> {
        match builtin {
            Builtin::Progn => self.eval_sequence(args),
            Builtin::Break => Ok(Flow::Break),
            Builtin::Return => {
                let value = match args.first() {
                    Some(arg) => value!(self.eval(arg)?),
                    None => Value::FALSE,
                };
                Ok(Flow::Return(value))
            }
            Builtin::If => {
                let condition = value!(self.eval(&args[0])?);
                if condition.is_truthy() {
                    self.eval(&args[1])
                } else if let Some(otherwise) = args.get(2) {
                    self.eval(otherwise)
                } else {
                    Ok(Flow::Normal(Value::FALSE))
                }
            }
            Builtin::While => {
                while !self.is_halted() {
                    let condition = value!(self.eval(&args[0])?);
                    if !condition.is_truthy() {
                        break;
                    }
                    match self.eval(&args[1])? {
                        Flow::Normal(_) => {}
                        Flow::Break => break,
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
                Ok(Flow::Normal(Value::FALSE))
            }
            Builtin::And => {
                for arg in args {
                    if !value!(self.eval(arg)?).is_truthy() {
                        return Ok(Flow::Normal(Value::FALSE));
                    }
                }
                Ok(Flow::Normal(Value::TRUE))
            }
            Builtin::Or => {
                for arg in args {
                    if value!(self.eval(arg)?).is_truthy() {
                        return Ok(Flow::Normal(Value::TRUE));
                    }
                }
                Ok(Flow::Normal(Value::FALSE))
            }
            Builtin::Bind => self.eval_bind(&args[0], &args[1..]),
            _ => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(value!(self.eval(arg)?));
                }
                self.apply_builtin(builtin, values).map(Flow::Normal)
            }
        }
    }

    fn eval_bind(&mut self, target: &Expr, args: &[Expr]) -> Result<Flow, EvalError> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(value!(self.eval(arg)?));
        }
        let value = match values.len() {
            0 => None,
            1 => values.pop(),
            _ => Some(Value::Multifield(values)),
        };
        let result = value.clone().unwrap_or(Value::FALSE);
        match (target, value) {
            (Expr::Var(name), Some(value)) => {
                if let Some(frame) = self.frames.last_mut() {
                    frame.insert(*name, value);
                }
            }
            (Expr::Var(name), None) => {
                if let Some(frame) = self.frames.last_mut() {
                    frame.remove(name);
                }
            }
            (Expr::Global(name), Some(value)) => {
                self.globals.insert(*name, value);
            }
            (Expr::Global(name), None) => {
                return Err(EvalError::UnboundGlobal(self.name(*name)));
            }
            // the parser only accepts variables as bind targets
            _ => {}
        }
        Ok(Flow::Normal(result))
    }

    fn call_deffunction(&mut self, name: Sym, args: &[Expr]) -> Result<Flow, EvalError> {
        let function = self
            .functions
            .get(&name)
            .cloned()
            .ok_or_else(|| EvalError::UnknownFunction(self.name(name)))?;
        let mut frame = Frame::new();
        for (param, arg) in function.params.iter().zip(args) {
            frame.insert(*param, value!(self.eval(arg)?));
        }
        self.enter_nested()?;
        self.frames.push(frame);
        let result = self.eval_sequence(&function.body);
        self.frames.pop();
        self.depth -= 1;
        Ok(Flow::Normal(result?.into_value()))
    }

    /// Count one more level of deffunction or query nesting. Every successful call must be paired
    /// with a decrement of `depth` once the level is left.
    pub(crate) fn enter_nested(&mut self) -> Result<(), EvalError> {
        if self.depth >= self.settings.max_call_depth {
            return Err(EvalError::CallDepthExceeded(self.settings.max_call_depth));
        }
        self.depth += 1;
        Ok(())
    }

    fn eval_assert(&mut self, patterns: &[FactPattern]) -> Result<Flow, EvalError> {
        let mut last = Value::FALSE;
        for pattern in patterns {
            let mut fields = Vec::with_capacity(pattern.slots.len());
            for slot in &pattern.slots {
                match slot {
                    SlotValue::Single(expr) => fields.push(value!(self.eval(expr)?)),
                    SlotValue::Multi(exprs) => {
                        let mut values = Vec::new();
                        for expr in exprs {
                            match value!(self.eval(expr)?) {
                                Value::Multifield(inner) => values.extend(inner),
                                other => values.push(other),
                            }
                        }
                        fields.push(Value::Multifield(values));
                    }
                }
            }
            let duplicates = self.settings.fact_duplication;
            last = match self.facts.assert(&pattern.template, fields, duplicates) {
                Some(fact) => Value::Fact(fact),
                None => Value::FALSE,
            };
        }
        Ok(Flow::Normal(last))
    }
}
