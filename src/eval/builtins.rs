//! Built-in functions that evaluate all their arguments up front.
//!
//! Special forms with their own evaluation order (`if`, `while`, `and`, `or`, `bind`, `progn`,
//! `break` and `return`) are handled directly by the evaluator.

use crate::{
    error::EvalError,
    facts::FactRef,
    universe::Environment,
    value::Value,
};

/// The built-in functions known to the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Bind,
    If,
    While,
    Progn,
    Break,
    Return,
    And,
    Or,
    Not,
    Eq,
    Neq,
    NumEq,
    NumNeq,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Retract,
    FactSlotValue,
    FactIndex,
    FactExistp,
    Create,
    Length,
    Nth,
    StrCat,
    SymCat,
    Printout,
    Halt,
    Facts,
    Undeftemplate,
    SetFactDuplication,
    GetFactDuplication,
}

impl Builtin {
    pub const ALL: [Builtin; 36] = [
        Builtin::Bind,
        Builtin::If,
        Builtin::While,
        Builtin::Progn,
        Builtin::Break,
        Builtin::Return,
        Builtin::And,
        Builtin::Or,
        Builtin::Not,
        Builtin::Eq,
        Builtin::Neq,
        Builtin::NumEq,
        Builtin::NumNeq,
        Builtin::Lt,
        Builtin::Le,
        Builtin::Gt,
        Builtin::Ge,
        Builtin::Add,
        Builtin::Sub,
        Builtin::Mul,
        Builtin::Div,
        Builtin::Retract,
        Builtin::FactSlotValue,
        Builtin::FactIndex,
        Builtin::FactExistp,
        Builtin::Create,
        Builtin::Length,
        Builtin::Nth,
        Builtin::StrCat,
        Builtin::SymCat,
        Builtin::Printout,
        Builtin::Halt,
        Builtin::Facts,
        Builtin::Undeftemplate,
        Builtin::SetFactDuplication,
        Builtin::GetFactDuplication,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Bind => "bind",
            Builtin::If => "if",
            Builtin::While => "while",
            Builtin::Progn => "progn",
            Builtin::Break => "break",
            Builtin::Return => "return",
            Builtin::And => "and",
            Builtin::Or => "or",
            Builtin::Not => "not",
            Builtin::Eq => "eq",
            Builtin::Neq => "neq",
            Builtin::NumEq => "=",
            Builtin::NumNeq => "<>",
            Builtin::Lt => "<",
            Builtin::Le => "<=",
            Builtin::Gt => ">",
            Builtin::Ge => ">=",
            Builtin::Add => "+",
            Builtin::Sub => "-",
            Builtin::Mul => "*",
            Builtin::Div => "/",
            Builtin::Retract => "retract",
            Builtin::FactSlotValue => "fact-slot-value",
            Builtin::FactIndex => "fact-index",
            Builtin::FactExistp => "fact-existp",
            Builtin::Create => "create$",
            Builtin::Length => "length$",
            Builtin::Nth => "nth$",
            Builtin::StrCat => "str-cat",
            Builtin::SymCat => "sym-cat",
            Builtin::Printout => "printout",
            Builtin::Halt => "halt",
            Builtin::Facts => "facts",
            Builtin::Undeftemplate => "undeftemplate",
            Builtin::SetFactDuplication => "set-fact-duplication",
            Builtin::GetFactDuplication => "get-fact-duplication",
        }
    }

    pub fn from_name(name: &str) -> Option<Builtin> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }

    /// Minimum and optional maximum number of arguments.
    pub fn arity(self) -> (usize, Option<usize>) {
        match self {
            Builtin::Bind => (1, None),
            Builtin::If => (2, Some(3)),
            Builtin::While => (2, Some(2)),
            Builtin::Progn => (0, None),
            Builtin::Break | Builtin::Halt | Builtin::Facts | Builtin::GetFactDuplication => {
                (0, Some(0))
            }
            Builtin::Return => (0, Some(1)),
            Builtin::And | Builtin::Or => (1, None),
            Builtin::Not
            | Builtin::FactIndex
            | Builtin::FactExistp
            | Builtin::Length
            | Builtin::Undeftemplate
            | Builtin::SetFactDuplication => (1, Some(1)),
            Builtin::Eq
            | Builtin::Neq
            | Builtin::NumEq
            | Builtin::NumNeq
            | Builtin::Lt
            | Builtin::Le
            | Builtin::Gt
            | Builtin::Ge
            | Builtin::Add
            | Builtin::Sub
            | Builtin::Mul
            | Builtin::Div => (2, None),
            Builtin::Retract | Builtin::Printout => (1, None),
            Builtin::FactSlotValue | Builtin::Nth => (2, Some(2)),
            Builtin::Create | Builtin::StrCat | Builtin::SymCat => (0, None),
        }
    }

    /// Human readable form of [`Self::arity`] for diagnostics.
    pub fn arity_description(self) -> String {
        match self.arity() {
            (min, Some(max)) if min == max => format!("exactly {}", min),
            (min, Some(max)) => format!("{} to {}", min, max),
            (min, None) => format!("at least {}", min),
        }
    }
}

/// A number argument of an arithmetic or comparison function.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Value {
        match n {
            Number::Int(i) => Value::Integer(i),
            Number::Float(f) => Value::Float(f),
        }
    }
}

fn type_mismatch(
    builtin: Builtin,
    position: usize,
    expected: &'static str,
    found: &Value,
) -> EvalError {
    EvalError::TypeMismatch {
        function: builtin.name(),
        position: position + 1,
        expected,
        found: found.type_name(),
    }
}

fn numbers(builtin: Builtin, args: &[Value]) -> Result<Vec<Number>, EvalError> {
    args.iter()
        .enumerate()
        .map(|(position, arg)| match arg {
            Value::Integer(i) => Ok(Number::Int(*i)),
            Value::Float(f) => Ok(Number::Float(*f)),
            other => Err(type_mismatch(builtin, position, "a number", other)),
        })
        .collect()
}

fn arithmetic(builtin: Builtin, args: &[Value]) -> Result<Value, EvalError> {
    let nums = numbers(builtin, args)?;
    let (first, rest) = match nums.split_first() {
        Some(split) => split,
        None => return Ok(Value::Integer(0)),
    };
    let mut acc = match (builtin, *first) {
        // division always produces a float
        (Builtin::Div, n) => Number::Float(n.as_f64()),
        (_, n) => n,
    };
    for n in rest {
        acc = match (acc, *n) {
            (Number::Int(a), Number::Int(b)) => {
                let result = match builtin {
                    Builtin::Add => a.checked_add(b),
                    Builtin::Sub => a.checked_sub(b),
                    Builtin::Mul => a.checked_mul(b),
                    _ => unreachable!("division accumulates floats"),
                };
                Number::Int(result.ok_or(EvalError::Overflow(builtin.name()))?)
            }
            (a, b) => {
                let (a, b) = (a.as_f64(), b.as_f64());
                Number::Float(match builtin {
                    Builtin::Add => a + b,
                    Builtin::Sub => a - b,
                    Builtin::Mul => a * b,
                    _ => {
                        if b == 0.0 {
                            return Err(EvalError::DivisionByZero(builtin.name()));
                        }
                        a / b
                    }
                })
            }
        };
    }
    Ok(acc.into())
}

fn compare(builtin: Builtin, args: &[Value]) -> Result<Value, EvalError> {
    let nums = numbers(builtin, args)?;
    let holds = |a: Number, b: Number| {
        let (a, b) = match (a, b) {
            (Number::Int(a), Number::Int(b)) => return cmp_with(builtin, a.cmp(&b)),
            (a, b) => (a.as_f64(), b.as_f64()),
        };
        match a.partial_cmp(&b) {
            Some(ordering) => cmp_with(builtin, ordering),
            None => builtin == Builtin::NumNeq,
        }
    };
    let result = match builtin {
        // `<>` holds if the first argument differs from all others
        Builtin::NumNeq => nums[1..].iter().all(|n| holds(nums[0], *n)),
        _ => nums.windows(2).all(|pair| holds(pair[0], pair[1])),
    };
    Ok(Value::boolean(result))
}

fn cmp_with(builtin: Builtin, ordering: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match builtin {
        Builtin::NumEq => ordering == Equal,
        Builtin::NumNeq => ordering != Equal,
        Builtin::Lt => ordering == Less,
        Builtin::Le => ordering != Greater,
        Builtin::Gt => ordering == Greater,
        Builtin::Ge => ordering != Less,
        _ => false,
    }
}

impl Environment {
    /// Apply a built-in function to already evaluated arguments.
    pub(crate) fn apply_builtin(
        &mut self,
        builtin: Builtin,
        args: Vec<Value>,
    ) -> Result<Value, EvalError> {
        match builtin {
            Builtin::Not => Ok(Value::boolean(!args[0].is_truthy())),
            Builtin::Eq => Ok(Value::boolean(args[1..].iter().all(|v| *v == args[0]))),
            Builtin::Neq => Ok(Value::boolean(args[1..].iter().all(|v| *v != args[0]))),
            Builtin::NumEq
            | Builtin::NumNeq
            | Builtin::Lt
            | Builtin::Le
            | Builtin::Gt
            | Builtin::Ge => compare(builtin, &args),
            Builtin::Add | Builtin::Sub | Builtin::Mul | Builtin::Div => {
                arithmetic(builtin, &args)
            }
            Builtin::Retract => {
                let mut retracted = false;
                for (position, arg) in args.iter().enumerate() {
                    let fact = self.fact_argument(builtin, position, arg)?;
                    retracted |= self.facts.retract(&fact);
                }
                Ok(Value::boolean(retracted))
            }
            Builtin::FactSlotValue => {
                let fact = self.fact_argument(builtin, 0, &args[0])?;
                let slot = args[1]
                    .as_symbol()
                    .ok_or_else(|| type_mismatch(builtin, 1, "a slot name", &args[1]))?;
                self.slot_value(&fact, slot)
            }
            Builtin::FactIndex => {
                let fact = self.fact_argument(builtin, 0, &args[0])?;
                Ok(Value::Integer(fact.index as i64))
            }
            Builtin::FactExistp => Ok(Value::boolean(match &args[0] {
                Value::Fact(fact) => !fact.is_garbage(),
                Value::Integer(index) => {
                    u64::try_from(*index)
                        .ok()
                        .and_then(|index| self.facts.fact_by_index(index))
                        .is_some()
                }
                _ => false,
            })),
            Builtin::Create => {
                let mut fields = Vec::new();
                for arg in args {
                    match arg {
                        Value::Multifield(values) => fields.extend(values),
                        other => fields.push(other),
                    }
                }
                Ok(Value::Multifield(fields))
            }
            Builtin::Length => match &args[0] {
                Value::Multifield(values) => Ok(Value::Integer(values.len() as i64)),
                Value::String(s) => Ok(Value::Integer(s.chars().count() as i64)),
                Value::Symbol(sym) => Ok(Value::Integer(
                    self.symbols.name(*sym).chars().count() as i64,
                )),
                other => Err(type_mismatch(builtin, 0, "a multifield or lexeme", other)),
            },
            Builtin::Nth => {
                let index = match &args[0] {
                    Value::Integer(i) => *i,
                    other => return Err(type_mismatch(builtin, 0, "an integer", other)),
                };
                let values = args[1]
                    .as_multifield()
                    .ok_or_else(|| type_mismatch(builtin, 1, "a multifield", &args[1]))?;
                let found = usize::try_from(index)
                    .ok()
                    .and_then(|i| i.checked_sub(1))
                    .and_then(|i| values.get(i));
                Ok(found
                    .cloned()
                    .unwrap_or(Value::Symbol(self.well_known.nil)))
            }
            Builtin::StrCat => Ok(Value::String(self.concat(&args))),
            Builtin::SymCat => {
                let name = self.concat(&args);
                Ok(Value::Symbol(self.symbols.get_or_insert_named(&name)))
            }
            Builtin::Printout => {
                let mut text = String::new();
                for arg in &args[1..] {
                    match arg {
                        Value::Symbol(sym) if *sym == self.well_known.crlf => text.push('\n'),
                        Value::Symbol(sym) if *sym == self.well_known.tab => text.push('\t'),
                        other => text.push_str(&self.pretty().display_to_string(other)),
                    }
                }
                self.write_output(&text);
                Ok(Value::TRUE)
            }
            Builtin::Halt => {
                tracing::debug!("execution halted");
                self.halt_signal().set();
                Ok(Value::FALSE)
            }
            Builtin::Facts => {
                let facts = self.facts.all_facts();
                let mut text = String::new();
                for fact in &facts {
                    text.push_str(&format!(
                        "f-{:<5}{}\n",
                        fact.index,
                        self.pretty().fact_to_string(fact)
                    ));
                }
                text.push_str(&format!("For a total of {} facts.\n", facts.len()));
                self.write_output(&text);
                Ok(Value::Integer(facts.len() as i64))
            }
            Builtin::Undeftemplate => {
                let template = match &args[0] {
                    Value::Template(template) => template.clone(),
                    Value::Symbol(sym) => {
                        let name = self.name(*sym);
                        self.resolve_template(&name)?
                    }
                    other => return Err(type_mismatch(builtin, 0, "a template name", other)),
                };
                self.facts
                    .undefine_template(&template)
                    .map_err(|_| EvalError::TemplateInUse(self.name(template.name)))?;
                Ok(Value::TRUE)
            }
            Builtin::SetFactDuplication => {
                let old = self.settings.fact_duplication;
                self.settings.fact_duplication = args[0].is_truthy();
                Ok(Value::boolean(old))
            }
            Builtin::GetFactDuplication => Ok(Value::boolean(self.settings.fact_duplication)),
            Builtin::Bind
            | Builtin::If
            | Builtin::While
            | Builtin::Progn
            | Builtin::Break
            | Builtin::Return
            | Builtin::And
            | Builtin::Or => unreachable!("special form {} is evaluated lazily", builtin.name()),
        }
    }

    /// Accept either a fact address or a fact index.
    fn fact_argument(
        &self,
        builtin: Builtin,
        position: usize,
        arg: &Value,
    ) -> Result<FactRef, EvalError> {
        match arg {
            Value::Fact(fact) => Ok(fact.clone()),
            Value::Integer(index) => u64::try_from(*index)
                .ok()
                .and_then(|i| self.facts.fact_by_index(i))
                .ok_or(EvalError::NoSuchFact(*index)),
            other => Err(type_mismatch(builtin, position, "a fact", other)),
        }
    }

    fn concat(&self, args: &[Value]) -> String {
        let pretty = self.pretty();
        args.iter()
            .map(|arg| pretty.display_to_string(arg))
            .collect()
    }
}
