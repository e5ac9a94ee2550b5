use std::collections::VecDeque;

use crate::{
    ast::Sym,
    error::EvalError,
    facts::{FactPin, FactRef},
    universe::Environment,
    value::Value,
};

/// The state of one running query: the fact currently bound to each member, plus the solutions
/// collected so far by the collecting query functions.
#[derive(Debug, Default)]
pub(crate) struct QueryCore {
    pub solns: Vec<Option<FactPin>>,
    pub solutions: VecDeque<Vec<FactRef>>,
}

impl QueryCore {
    pub fn new(members: usize) -> Self {
        Self {
            solns: (0..members).map(|_| None).collect(),
            solutions: VecDeque::new(),
        }
    }

    /// A copy of the current member bindings. Only valid once every position is bound.
    pub fn current_solution(&self) -> Vec<FactRef> {
        self.solns
            .iter()
            .flatten()
            .map(|pin| pin.fact().clone())
            .collect()
    }
}

/// The cores of all queries that are running, innermost last.
#[derive(Debug, Default)]
pub(crate) struct QueryStack {
    frames: Vec<QueryCore>,
}

impl QueryStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, core: QueryCore) {
        self.frames.push(core);
    }

    pub fn pop(&mut self) -> Option<QueryCore> {
        self.frames.pop()
    }

    /// The core of the innermost query.
    pub fn current_mut(&mut self) -> Option<&mut QueryCore> {
        self.frames.last_mut()
    }

    /// The core of the query `depth` levels out from the innermost one.
    pub fn find(&self, depth: usize) -> Option<&QueryCore> {
        let index = self.frames.len().checked_sub(depth + 1)?;
        self.frames.get(index)
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }
}

impl Environment {
    /// The fact bound to member `position` of the query `depth` levels out.
    pub(crate) fn query_fact(&self, depth: usize, position: usize) -> Result<FactRef, EvalError> {
        self.queries
            .find(depth)
            .and_then(|core| core.solns.get(position))
            .and_then(|pin| pin.as_ref())
            .map(|pin| pin.fact().clone())
            .ok_or(EvalError::NoActiveQuery)
    }

    /// A slot of the fact bound to member `position` of the query `depth` levels out.
    pub(crate) fn query_fact_slot(
        &self,
        depth: usize,
        position: usize,
        slot: Sym,
    ) -> Result<Value, EvalError> {
        let fact = self.query_fact(depth, position)?;
        self.slot_value(&fact, slot)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn find_by_depth() {
        let mut stack = QueryStack::new();
        assert!(stack.find(0).is_none());
        stack.push(QueryCore::new(1));
        stack.push(QueryCore::new(3));
        assert_eq!(stack.find(0).map(|core| core.solns.len()), Some(3));
        assert_eq!(stack.find(1).map(|core| core.solns.len()), Some(1));
        assert!(stack.find(2).is_none());
        stack.pop();
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn accessors_outside_of_queries() {
        let env = Environment::new();
        assert_eq!(env.query_fact(0, 0), Err(EvalError::NoActiveQuery));
    }
}
