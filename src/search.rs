//! # A backtracking join over fact sets.
//!
//! This module runs the query functions. A query with members `?m0 .. ?mN` enumerates every
//! combination of facts drawn from the templates of each member, binds it, evaluates the test and
//! reacts to the combinations that satisfy it according to the query function.
//!
//! Enumeration order is part of the contract: for each member, the alternative templates are
//! visited in the order they were written and the facts of each template in assertion order, with
//! the last member varying fastest. So for `((?a t1 t2) (?b t3))` all facts of `t3` are tried for
//! the first fact of `t1`, then all of them for the second fact of `t1`, and so on, before any fact
//! of `t2` is bound to `?a`.
//!
//! Every fact bound to a member is pinned for as long as it stays bound, and every template of
//! the query is pinned until the query returns. Retracting a pinned fact only marks it as garbage,
//! which the enumeration skips.

#[cfg(test)]
mod test;

use crate::{
    ast::{QueryCall, QueryFunction},
    error::EvalError,
    facts::{Deftemplate, FactRef},
    query::{templates::Restrictions, QueryCore},
    universe::Environment,
    value::{Flow, Value},
};

/// What happens to a fact set that satisfies the test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Stop at the first one and leave it bound.
    First,
    /// Run the action right away, then continue.
    Stream,
    /// Record a copy of it in the query core, then continue.
    Collect,
}

/// The outcome of searching a subtree of the join.
#[derive(Debug)]
enum Step {
    /// All combinations were visited.
    Exhausted,
    /// A matching fact set was found in [`Mode::First`]; it is still bound.
    Matched,
    /// The environment was halted.
    Halted,
    /// The test or action broke out or returned.
    Unwound(Flow),
}

impl Environment {
    /// Run a query function call.
    ///
    /// The query gets its own [`QueryCore`] for the duration of the call, so member accessors of
    /// nested queries resolve relative to it. The core and all pins are released before returning,
    /// also when evaluation fails.
    pub(crate) fn eval_query(&mut self, query: &QueryCall) -> Result<Flow, EvalError> {
        let function = query.function;
        let restrictions = self.resolve_restrictions(query)?;
        self.enter_nested()?;
        tracing::debug!(
            function = function.name(),
            members = restrictions.len(),
            depth = self.queries.len(),
            "running fact-set query"
        );

        self.queries.push(QueryCore::new(restrictions.len()));
        let result = self.run_query(query, &restrictions);
        self.queries.pop();
        self.depth -= 1;
        drop(restrictions);

        match &result {
            Ok(flow) => tracing::debug!(function = function.name(), result = ?flow, "query done"),
            Err(err) => tracing::debug!(function = function.name(), %err, "query failed"),
        }
        result
    }

    fn run_query(
        &mut self,
        query: &QueryCall,
        restrictions: &Restrictions,
    ) -> Result<Flow, EvalError> {
        let mut last = Value::FALSE;
        match query.function {
            QueryFunction::AnyFactp => match self.search(query, restrictions, Mode::First)? {
                Step::Matched => Ok(Flow::Normal(Value::TRUE)),
                Step::Unwound(flow @ Flow::Return(_)) => Ok(flow),
                _ => Ok(Flow::Normal(Value::FALSE)),
            },
            QueryFunction::FindFact => match self.search(query, restrictions, Mode::First)? {
                Step::Matched => {
                    let solution = self.current_core()?.current_solution();
                    Ok(Flow::Normal(fact_list(solution)))
                }
                Step::Unwound(flow @ Flow::Return(_)) => Ok(flow),
                _ => Ok(Flow::Normal(Value::Multifield(vec![]))),
            },
            QueryFunction::FindAllFacts => {
                if let Step::Unwound(flow @ Flow::Return(_)) =
                    self.search(query, restrictions, Mode::Collect)?
                {
                    return Ok(flow);
                }
                let solutions = std::mem::take(&mut self.current_core()?.solutions);
                Ok(Flow::Normal(fact_list(solutions.into_iter().flatten())))
            }
            QueryFunction::DoForFact => match self.search(query, restrictions, Mode::First)? {
                Step::Matched => match self.eval_action(query)? {
                    Flow::Normal(value) => Ok(Flow::Normal(value)),
                    Flow::Break => Ok(Flow::Normal(Value::FALSE)),
                    ret @ Flow::Return(_) => Ok(ret),
                },
                Step::Unwound(flow @ Flow::Return(_)) => Ok(flow),
                _ => Ok(Flow::Normal(Value::FALSE)),
            },
            QueryFunction::DoForAllFacts => {
                match self.search_from(query, restrictions, 0, Mode::Stream, &mut last)? {
                    Step::Unwound(flow @ Flow::Return(_)) => Ok(flow),
                    Step::Unwound(Flow::Break) => Ok(Flow::Normal(Value::FALSE)),
                    _ => Ok(Flow::Normal(last)),
                }
            }
            QueryFunction::DelayedDoForAllFacts => {
                if let Step::Unwound(flow @ Flow::Return(_)) =
                    self.search(query, restrictions, Mode::Collect)?
                {
                    return Ok(flow);
                }
                self.run_delayed_actions(query, &mut last)
                    .map(|flow| flow.unwrap_or(Flow::Normal(last)))
            }
        }
    }

    fn search(
        &mut self,
        query: &QueryCall,
        restrictions: &Restrictions,
        mode: Mode,
    ) -> Result<Step, EvalError> {
        let mut last = Value::FALSE;
        self.search_from(query, restrictions, 0, mode, &mut last)
    }

    /// Enumerate the facts for member `position` and everything to the right of it.
    fn search_from(
        &mut self,
        query: &QueryCall,
        restrictions: &Restrictions,
        position: usize,
        mode: Mode,
        last: &mut Value,
    ) -> Result<Step, EvalError> {
        for template in &restrictions[position] {
            for fact in Deftemplate::live_facts(template) {
                if self.is_halted() {
                    return Ok(Step::Halted);
                }
                self.current_core()?.solns[position] = Some(fact.pin());
                let step = if position + 1 < restrictions.len() {
                    self.search_from(query, restrictions, position + 1, mode, last)?
                } else {
                    self.test_solution(query, mode, last)?
                };
                if !matches!(step, Step::Exhausted) {
                    return Ok(step);
                }
            }
        }
        self.current_core()?.solns[position] = None;
        Ok(Step::Exhausted)
    }

    /// Evaluate the test for the fact set that is currently bound and act on the outcome.
    fn test_solution(
        &mut self,
        query: &QueryCall,
        mode: Mode,
        last: &mut Value,
    ) -> Result<Step, EvalError> {
        if tracing::enabled!(tracing::Level::TRACE) {
            let solution = self.current_core()?.current_solution();
            tracing::trace!(?solution, "testing fact set");
        }
        let test = self.eval(query.test())?;
        self.facts.collect_garbage();
        let satisfied = match test {
            Flow::Normal(value) => value.is_truthy(),
            unwind => return Ok(Step::Unwound(unwind)),
        };
        if self.is_halted() {
            return Ok(Step::Halted);
        }
        if !satisfied {
            return Ok(Step::Exhausted);
        }
        match mode {
            Mode::First => Ok(Step::Matched),
            Mode::Collect => {
                let core = self.current_core()?;
                let solution = core.current_solution();
                core.solutions.push_back(solution);
                Ok(Step::Exhausted)
            }
            Mode::Stream => match self.eval_action(query)? {
                Flow::Normal(_) if self.is_halted() => Ok(Step::Halted),
                Flow::Normal(value) => {
                    *last = value;
                    Ok(Step::Exhausted)
                }
                unwind => Ok(Step::Unwound(unwind)),
            },
        }
    }

    /// Run the action once per collected solution, oldest first. Returns the flow to propagate
    /// if an action returned.
    fn run_delayed_actions(
        &mut self,
        query: &QueryCall,
        last: &mut Value,
    ) -> Result<Option<Flow>, EvalError> {
        while !self.is_halted() {
            let core = self.current_core()?;
            let Some(solution) = core.solutions.pop_front() else {
                break;
            };
            for (slot, fact) in core.solns.iter_mut().zip(&solution) {
                *slot = Some(fact.pin());
            }
            match self.eval_action(query)? {
                Flow::Normal(_) if self.is_halted() => break,
                Flow::Normal(value) => *last = value,
                Flow::Break => {
                    *last = Value::FALSE;
                    break;
                }
                ret @ Flow::Return(_) => return Ok(Some(ret)),
            }
        }
        Ok(None)
    }

    fn eval_action(&mut self, query: &QueryCall) -> Result<Flow, EvalError> {
        let flow = match query.action() {
            Some(action) => self.eval(action)?,
            None => Flow::Normal(Value::FALSE),
        };
        self.facts.collect_garbage();
        Ok(flow)
    }

    fn current_core(&mut self) -> Result<&mut QueryCore, EvalError> {
        self.queries.current_mut().ok_or(EvalError::NoActiveQuery)
    }
}

fn fact_list(facts: impl IntoIterator<Item = FactRef>) -> Value {
    Value::Multifield(facts.into_iter().map(Value::Fact).collect())
}
