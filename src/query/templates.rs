//! Runtime evaluation of restriction chains into pinned templates.

use crate::{
    ast::{Expr, QueryCall, Sym},
    error::EvalError,
    facts::{TemplatePin, TemplateRef},
    universe::{Environment, TemplateLookup},
    value::Value,
};

/// The resolved restrictions of one query invocation: for each member, the alternative templates
/// in the order they were written. The pins keep every template busy until the query returns.
pub(crate) type Restrictions = Vec<Vec<TemplatePin>>;

impl Environment {
    /// Resolve a template name at runtime, as seen from the current module.
    pub(crate) fn resolve_template(&self, name: &str) -> Result<TemplateRef, EvalError> {
        match self.find_template(name) {
            TemplateLookup::Found(template) => Ok(template),
            TemplateLookup::Missing => Err(EvalError::TemplateNotFound(name.to_owned())),
            TemplateLookup::Ambiguous => Err(EvalError::AmbiguousTemplate(name.to_owned())),
        }
    }

    /// Evaluate the restriction chains of a query call.
    ///
    /// Besides templates resolved at parse time, a restriction expression may evaluate to a
    /// template name or a multifield of template names.
    pub(crate) fn resolve_restrictions(
        &mut self,
        query: &QueryCall,
    ) -> Result<Restrictions, EvalError> {
        let function = query.function.name();
        let mut restrictions = Vec::with_capacity(query.restriction_count());
        let mut chain = vec![];
        for expr in query.restrictions() {
            let value = match expr {
                Expr::Delimiter => {
                    restrictions.push(std::mem::take(&mut chain));
                    continue;
                }
                other => self.eval(other)?.into_value(),
            };
            match value {
                Value::Template(template) => chain.push(template.pin()),
                Value::Symbol(name) => chain.push(self.restriction_template(function, name)?),
                Value::Multifield(names) if !names.is_empty() => {
                    for name in names {
                        match name {
                            Value::Symbol(name) => {
                                chain.push(self.restriction_template(function, name)?)
                            }
                            other => return Err(self.invalid_restriction(function, &other)),
                        }
                    }
                }
                other => return Err(self.invalid_restriction(function, &other)),
            }
        }
        Ok(restrictions)
    }

    fn restriction_template(
        &self,
        function: &'static str,
        name: Sym,
    ) -> Result<TemplatePin, EvalError> {
        if name == Sym::QUERY_DELIMITER {
            return Err(self.invalid_restriction(function, &Value::Symbol(name)));
        }
        self.resolve_template(self.symbols.name(name))
            .map(|template| template.pin())
    }

    fn invalid_restriction(&self, function: &'static str, value: &Value) -> EvalError {
        EvalError::InvalidRestriction {
            function,
            found: self.pretty().value_to_string(value),
        }
    }
}
