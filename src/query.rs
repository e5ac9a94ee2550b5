//! # Fact-set queries
//!
//! The six query functions (`any-factp`, `find-fact`, `find-all-facts`, `do-for-fact`,
//! `do-for-all-facts` and `delayed-do-for-all-facts`) share one call layout:
//!
//! ```text
//! (<function> ((?member template+)+) <test> [<action>+])
//! ```
//!
//! Parsing happens in [`parse`], which turns restriction lists into template chains and rewrites
//! every use of a member variable in the test and action into a positional accessor (see
//! [`rewrite`]). At runtime, [`templates`] evaluates the chains into groups of pinned templates,
//! [`stack`] keeps one [`QueryCore`] per active query so that nested queries can reach outward,
//! and [`crate::search`] performs the actual join.

mod parse;
pub(crate) mod rewrite;
pub(crate) mod stack;
pub(crate) mod templates;

pub(crate) use stack::{QueryCore, QueryStack};

#[cfg(test)]
mod test;
