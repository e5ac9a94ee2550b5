//! Errors raised while evaluating expressions, and the crate-level error combining them with
//! parse errors.

use thiserror::Error;

use crate::textual::ParseError;

/// A failure during evaluation. Evaluation stops at the first error and the error propagates to
/// the top-level command; query frames and pins are released on the way out.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("variable ?{0} is unbound")]
    UnboundVariable(String),
    #[error("global variable ?*{0}* is unbound")]
    UnboundGlobal(String),
    #[error("unknown function {0}")]
    UnknownFunction(String),
    #[error("function {function} expected argument #{position} to be {expected}, found {found}")]
    TypeMismatch {
        function: &'static str,
        position: usize,
        expected: &'static str,
        found: &'static str,
    },
    #[error("function {0} attempted to divide by zero")]
    DivisionByZero(&'static str),
    #[error("integer overflow in function {0}")]
    Overflow(&'static str),
    #[error("template {template} has no slot {slot}")]
    UnknownSlot { template: String, slot: String },
    #[error("fact f-{0} has been retracted")]
    FactRetracted(u64),
    #[error("fact f-{0} does not exist")]
    NoSuchFact(i64),
    #[error("template {0} is in use and cannot be changed")]
    TemplateInUse(String),
    #[error("unable to find template {0}")]
    TemplateNotFound(String),
    #[error("template reference {0} is ambiguous")]
    AmbiguousTemplate(String),
    #[error("{function}: invalid fact-set query class restriction {found}")]
    InvalidRestriction {
        function: &'static str,
        found: String,
    },
    #[error("fact-set member accessed outside of a running query")]
    NoActiveQuery,
    #[error("maximum call depth of {0} exceeded")]
    CallDepthExceeded(usize),
}

/// Everything that can go wrong when loading or evaluating source text.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Eval(#[from] EvalError),
}
