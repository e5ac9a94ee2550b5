//! # Fact-set queries in Rust
//!
//! Factset is an embeddable interpreter for a CLIPS-like language built around fact-set queries.
//! An [Environment] holds deftemplates, the facts asserted for them, modules, functions and
//! globals, and evaluates source text one form at a time.
//!
//! A fact-set query binds a member variable to each fact of one or more templates, forms every
//! combination of such bindings and evaluates a test against it. The six query functions differ
//! in what they do with the combinations that satisfy the test:
//!
//! | Function                   | Result                                                   |
//! |----------------------------|----------------------------------------------------------|
//! | `any-factp`                | `TRUE` if there is at least one                          |
//! | `find-fact`                | the first one, as a multifield of facts                  |
//! | `find-all-facts`           | all of them, flattened into one multifield               |
//! | `do-for-fact`              | runs the action for the first one                        |
//! | `do-for-all-facts`         | runs the action for each one as soon as it is found      |
//! | `delayed-do-for-all-facts` | finds all of them first, then runs the action for each   |
//!
//! # Example
//!
//! ```
//! use factset::Environment;
//!
//! let mut env = Environment::new();
//! env.capture_output();
//! env.load_str(
//!     r#"
//!     (deftemplate person (slot name) (slot age))
//!     (deftemplate pet (slot owner) (slot kind))
//!     (assert (person (name "Ann") (age 31))
//!             (person (name "Bob") (age 12))
//!             (pet (owner "Bob") (kind cat)))
//!     "#,
//! )
//! .unwrap();
//!
//! // Inside a test, `?member:slot` reads a slot of the bound fact.
//! let owners = env
//!     .eval_str("(find-all-facts ((?p person) (?x pet)) (eq ?p:name ?x:owner))")
//!     .unwrap();
//! assert_eq!(env.pretty().value_to_string(&owners), "(<Fact-2> <Fact-3>)");
//!
//! env.eval_str(
//!     r#"(do-for-all-facts ((?p person)) (>= ?p:age 18)
//!          (printout t (fact-slot-value ?p name) " is an adult" crlf))"#,
//! )
//! .unwrap();
//! assert_eq!(env.take_output(), "Ann is an adult\n");
//! ```
//!
//! Combinations are enumerated with the last member varying fastest, see [search] for the exact
//! order and for how queries interact with facts retracted or asserted while they run.

pub mod ast;
pub mod error;
pub mod eval;
pub mod facts;
pub mod modules;
pub mod query;
pub mod search;
pub mod textual;
pub mod universe;
pub mod value;

pub use error::{Error, EvalError};
pub use universe::{Environment, HaltSignal, Settings, SymbolStore};
pub use value::{Flow, Value};
