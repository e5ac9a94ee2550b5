//! # A CLIPS-like syntax
//!
//! This module provides the textual front end of an [`Environment`](crate::Environment): a lexer,
//! a parser that turns source text into [`Form`]s one at a time, and a pretty-printer for values.
//!
//! Syntactic elements:
//! - **Symbols**: any run of characters that is not a delimiter and does not start with `?`, e.g.
//!   `foo`, `>=`, `MAIN::point`.
//! - **Variables**: `?name` for local variables and fact-set members, `?*name*` for globals.
//!   Inside a query test, `?member:slot` reads a slot of the fact bound to `?member`.
//! - **Numbers and strings**: `42`, `-1.5`, `"a \"quoted\" string"`.
//! - **Comments**: from `;` to the end of the line.
//! - **Constructs**: `deftemplate`, `defmodule`, `deffunction` and `defglobal`.
//! - **Expressions**: function calls `(name arg*)`, including the six fact-set query functions,
//!   e.g. `(do-for-all-facts ((?p person)) (> ?p:age 30) (printout t ?p crlf))`.

mod lexer;
mod parser;
mod pretty;

pub use self::{
    parser::{Form, ParseError, ParseErrorKind, Parser},
    pretty::Prettifier,
};

pub(crate) use self::{
    lexer::Token,
    parser::{syntax, Context, TokenStream},
};
