//! # Expression trees
//!
//! Everything the parser produces and the evaluator consumes lives here. Expressions are plain
//! owned trees; resolved references (templates, fact-set members) are distinct variants rather
//! than overwritten symbol nodes.

use crate::{eval::Builtin, facts::TemplateRef, value::Value};

/// An interned symbol, e.g. `foo` in `(eq ?x foo)`, but also variable names, slot names and
/// template names.
///
/// Internally, symbols are represented by numeric IDs handed out by a
/// [`SymbolStore`](crate::SymbolStore), so comparing two symbols is comparing their identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sym(usize);

impl Sym {
    /// The canonical false value.
    pub const FALSE: Sym = Sym(0);
    /// The canonical true value.
    pub const TRUE: Sym = Sym(1);
    /// The query delimiter symbol separating restriction chains of a query call. It contains
    /// parentheses, so the lexer can never produce it from source text.
    pub const QUERY_DELIMITER: Sym = Sym(2);

    #[inline(always)]
    pub fn ord(self) -> usize {
        self.0
    }

    #[inline(always)]
    pub fn from_ord(ord: usize) -> Sym {
        Sym(ord)
    }
}

/// Representation of an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal constant.
    Const(Value),
    /// A local variable reference `?name`.
    Var(Sym),
    /// A global variable reference `?*name*`.
    Global(Sym),
    /// A call of a built-in function or deffunction.
    Call(Call),
    /// A call of one of the six fact-set query functions.
    Query(Box<QueryCall>),
    /// A template reference resolved at parse time.
    Template(TemplateRef),
    /// The fact bound to a fact-set member variable.
    ///
    /// `depth` counts query calls outward from the innermost one (0 is the query whose test or
    /// action contains this expression), `position` is the index of the member variable in its
    /// restriction list.
    QueryFact { depth: usize, position: usize },
    /// A slot of the fact bound to a fact-set member variable, written `?var:slot` in a query test.
    QueryFactSlot {
        depth: usize,
        position: usize,
        slot: Sym,
    },
    /// The sentinel terminating a restriction chain. Evaluates to [`Sym::QUERY_DELIMITER`].
    Delimiter,
    /// An `(assert ...)` of one or more facts.
    Assert(Vec<FactPattern>),
}

impl Expr {
    pub fn symbol(sym: Sym) -> Expr {
        Expr::Const(Value::Symbol(sym))
    }

    pub fn call(function: Function, args: Vec<Expr>) -> Expr {
        Expr::Call(Call { function, args })
    }
}

/// Application of a function to arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub function: Function,
    pub args: Vec<Expr>,
}

/// The function being applied by a [`Call`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Builtin(Builtin),
    /// A deffunction, looked up by name when called.
    User(Sym),
}

/// The six fact-set query functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryFunction {
    /// `any-factp`: is there at least one fact set satisfying the test?
    AnyFactp,
    /// `find-fact`: the first fact set satisfying the test.
    FindFact,
    /// `find-all-facts`: all fact sets satisfying the test, flattened.
    FindAllFacts,
    /// `do-for-fact`: run the action for the first fact set satisfying the test.
    DoForFact,
    /// `do-for-all-facts`: run the action for every fact set as soon as it satisfies the test.
    DoForAllFacts,
    /// `delayed-do-for-all-facts`: collect all satisfying fact sets first, then run the action
    /// for each of them.
    DelayedDoForAllFacts,
}

impl QueryFunction {
    pub const ALL: [QueryFunction; 6] = [
        QueryFunction::AnyFactp,
        QueryFunction::FindFact,
        QueryFunction::FindAllFacts,
        QueryFunction::DoForFact,
        QueryFunction::DoForAllFacts,
        QueryFunction::DelayedDoForAllFacts,
    ];

    pub fn name(self) -> &'static str {
        match self {
            QueryFunction::AnyFactp => "any-factp",
            QueryFunction::FindFact => "find-fact",
            QueryFunction::FindAllFacts => "find-all-facts",
            QueryFunction::DoForFact => "do-for-fact",
            QueryFunction::DoForAllFacts => "do-for-all-facts",
            QueryFunction::DelayedDoForAllFacts => "delayed-do-for-all-facts",
        }
    }

    pub fn from_name(name: &str) -> Option<QueryFunction> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    /// Whether the function takes an action after its test.
    pub fn has_action(self) -> bool {
        matches!(
            self,
            QueryFunction::DoForFact
                | QueryFunction::DoForAllFacts
                | QueryFunction::DelayedDoForAllFacts
        )
    }
}

/// A parsed query function call.
///
/// The argument list has a fixed layout: the test expression first, then the action expression
/// for the action variants, then the restriction chains. Each chain is a run of one or more
/// template expressions terminated by [`Expr::Delimiter`].
#[derive(Debug, Clone, PartialEq)]
pub struct QueryCall {
    pub function: QueryFunction,
    pub args: Vec<Expr>,
}

impl QueryCall {
    pub fn test(&self) -> &Expr {
        &self.args[0]
    }

    pub fn action(&self) -> Option<&Expr> {
        if self.function.has_action() {
            self.args.get(1)
        } else {
            None
        }
    }

    /// The flattened restriction chains, delimiters included.
    pub fn restrictions(&self) -> &[Expr] {
        let start = if self.function.has_action() { 2 } else { 1 };
        &self.args[start.min(self.args.len())..]
    }

    /// Number of restrictions (fact-set member variables) declared by this call.
    pub fn restriction_count(&self) -> usize {
        self.restrictions()
            .iter()
            .filter(|e| matches!(e, Expr::Delimiter))
            .count()
    }
}

/// One fact to be asserted: the template plus one entry per slot, in slot order.
#[derive(Debug, Clone, PartialEq)]
pub struct FactPattern {
    pub template: TemplateRef,
    pub slots: Vec<SlotValue>,
}

/// The value expression(s) of one slot of a [`FactPattern`].
#[derive(Debug, Clone, PartialEq)]
pub enum SlotValue {
    /// A single-field slot.
    Single(Expr),
    /// A multifield slot; multifield results of the expressions are spliced in.
    Multi(Vec<Expr>),
}

/// A user-defined function.
#[derive(Debug, Clone, PartialEq)]
pub struct Deffunction {
    pub name: Sym,
    pub params: Vec<Sym>,
    pub body: Vec<Expr>,
}
