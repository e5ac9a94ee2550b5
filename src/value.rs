//! Runtime values and the control-flow signal returned by evaluation.

use crate::{
    ast::Sym,
    facts::{FactRef, TemplateRef},
};

/// A value produced by evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Symbol(Sym),
    String(String),
    Integer(i64),
    Float(f64),
    /// A fact address.
    Fact(FactRef),
    /// A template address, produced by restriction expressions resolved at parse time.
    Template(TemplateRef),
    Multifield(Vec<Value>),
}

impl Value {
    pub const FALSE: Value = Value::Symbol(Sym::FALSE);
    pub const TRUE: Value = Value::Symbol(Sym::TRUE);

    pub fn boolean(b: bool) -> Value {
        if b {
            Value::TRUE
        } else {
            Value::FALSE
        }
    }

    /// Everything except the symbol `FALSE` counts as true.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Symbol(Sym::FALSE))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Symbol(_) => "symbol",
            Value::String(_) => "string",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Fact(_) => "fact-address",
            Value::Template(_) => "deftemplate",
            Value::Multifield(_) => "multifield",
        }
    }

    pub fn as_symbol(&self) -> Option<Sym> {
        match self {
            Value::Symbol(sym) => Some(*sym),
            _ => None,
        }
    }

    pub fn as_multifield(&self) -> Option<&[Value]> {
        match self {
            Value::Multifield(values) => Some(values),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Sym> for Value {
    fn from(s: Sym) -> Self {
        Value::Symbol(s)
    }
}

impl From<FactRef> for Value {
    fn from(f: FactRef) -> Self {
        Value::Fact(f)
    }
}

/// How evaluation of an expression finished.
///
/// `Break` and `Return` unwind through enclosing expressions until they reach a construct that
/// consumes them: a `while` loop or a query action for `Break`, a deffunction body or query action
/// for `Return`.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal(Value),
    Break,
    Return(Value),
}

impl Flow {
    pub fn into_value(self) -> Value {
        match self {
            Flow::Normal(value) | Flow::Return(value) => value,
            Flow::Break => Value::FALSE,
        }
    }
}

impl From<Value> for Flow {
    fn from(value: Value) -> Self {
        Flow::Normal(value)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(!Value::FALSE.is_truthy());
        assert!(Value::TRUE.is_truthy());
        assert!(Value::Integer(0).is_truthy());
        assert!(Value::Multifield(vec![]).is_truthy());
        assert!(Value::Symbol(Sym::from_ord(42)).is_truthy());
    }

    #[test]
    fn flow_values() {
        assert_eq!(Flow::Break.into_value(), Value::FALSE);
        assert_eq!(Flow::Return(Value::Integer(3)).into_value(), Value::Integer(3));
    }
}
