//! Parsing of query function calls.

use logos::Span;

use crate::{
    ast::{Expr, Function, QueryCall, QueryFunction, Sym},
    eval::Builtin,
    textual::{syntax, Context, ParseError, ParseErrorKind, Parser, Token, TokenStream},
    universe::TemplateLookup,
};

use super::rewrite::rewrite;

impl<'e> Parser<'e> {
    /// Parse the rest of a query function call after the function name, up to and including the
    /// closing paren.
    pub(crate) fn parse_query(
        &mut self,
        tokens: &mut TokenStream,
        function: QueryFunction,
        span: Span,
    ) -> Result<Expr, ParseError> {
        let (members, restrictions) = self.parse_restrictions(tokens, function)?;

        // the test must not bind variables, and break only makes sense in actions
        let test_context = Context {
            break_allowed: false,
            return_allowed: self.context.return_allowed,
        };
        let (test, test_binds) = self.scoped(test_context, |parser| parser.parse_expr(tokens));
        let mut test = test?;
        if !test_binds.is_empty() {
            return Err(ParseError::new(
                span,
                ParseErrorKind::BindInQueryTest(function.name()),
            ));
        }
        self.rewrite_members(&members, &mut test, true, span.clone())?;

        let mut args = vec![test];
        if function.has_action() {
            let action_context = Context {
                break_allowed: true,
                return_allowed: true,
            };
            let (actions, action_binds) =
                self.scoped(action_context, |parser| parser.parse_sequence(tokens));
            let actions = actions?;
            if actions.is_empty() {
                return Err(syntax(span, function.name()));
            }
            if let Some(&variable) = action_binds.iter().find(|b| members.contains(*b)) {
                return Err(ParseError::new(
                    span,
                    ParseErrorKind::RebindMemberVariable {
                        function: function.name(),
                        variable: self.env.name(variable),
                    },
                ));
            }
            for bind in action_binds {
                if !self.bind_names.contains(&bind) {
                    self.bind_names.push(bind);
                }
            }
            let mut action = Expr::call(Function::Builtin(Builtin::Progn), actions);
            self.rewrite_members(&members, &mut action, false, span.clone())?;
            args.push(action);
        } else {
            self.expect_token(tokens, Token::RParen)?;
        }
        args.extend(restrictions);

        tracing::trace!(
            function = function.name(),
            members = members.len(),
            "parsed fact-set query"
        );
        Ok(Expr::Query(Box::new(QueryCall { function, args })))
    }

    /// Parse `((?member template+)+)` into the member names and the flattened template chains,
    /// each chain terminated by [`Expr::Delimiter`].
    fn parse_restrictions(
        &mut self,
        tokens: &mut TokenStream,
        function: QueryFunction,
    ) -> Result<(Vec<Sym>, Vec<Expr>), ParseError> {
        let invalid =
            |span| ParseError::new(span, ParseErrorKind::InvalidRestrictions(function.name()));

        let (tok, span) = self.expect_next(tokens)?;
        if tok != Ok(Token::LParen) {
            return Err(invalid(span));
        }
        let mut members = vec![];
        let mut chains = vec![];
        loop {
            let (tok, span) = self.expect_next(tokens)?;
            match tok {
                Ok(Token::RParen) if !members.is_empty() => break,
                Ok(Token::LParen) => {}
                _ => return Err(invalid(span)),
            }

            let (tok, var_span) = self.expect_next(tokens)?;
            if tok != Ok(Token::Variable) {
                return Err(invalid(var_span));
            }
            let member = self.variable_sym(tokens, var_span.clone());
            if members.contains(&member) {
                return Err(ParseError::new(
                    var_span,
                    ParseErrorKind::DuplicateMemberVariable {
                        function: function.name(),
                        variable: self.env.name(member),
                    },
                ));
            }
            members.push(member);

            let chain_start = chains.len();
            loop {
                match tokens.peek() {
                    Some((Ok(Token::RParen), span)) => {
                        tokens.advance();
                        if chains.len() == chain_start {
                            return Err(invalid(span));
                        }
                        break;
                    }
                    Some((Ok(Token::Symbol), span)) => {
                        tokens.advance();
                        chains.push(self.template_name(tokens.slice(span.clone()), span)?);
                    }
                    Some((_, span)) => match self.parse_expr(tokens)? {
                        expr @ (Expr::Var(_) | Expr::Global(_) | Expr::Call(_)) => {
                            chains.push(expr)
                        }
                        _ => return Err(invalid(span)),
                    },
                    None => {
                        return Err(ParseError::new(tokens.eof(), ParseErrorKind::UnexpectedEof))
                    }
                }
            }
            chains.push(Expr::Delimiter);
        }
        Ok((members, chains))
    }

    /// Resolve a template name in a restriction as seen from the current module.
    fn template_name(&mut self, name: &str, span: Span) -> Result<Expr, ParseError> {
        match self.env.find_template(name) {
            TemplateLookup::Found(template) => Ok(Expr::Template(template)),
            TemplateLookup::Missing => Err(ParseError::new(
                span,
                ParseErrorKind::UnknownTemplate(name.to_owned()),
            )),
            TemplateLookup::Ambiguous => Err(ParseError::new(
                span,
                ParseErrorKind::AmbiguousTemplate(name.to_owned()),
            )),
        }
    }

    /// Run `f` with an empty list of bind names and the given context, then restore both.
    /// Returns the result of `f` along with the names bound while it ran.
    fn scoped<T>(
        &mut self,
        context: Context,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> (Result<T, ParseError>, Vec<Sym>) {
        let outer_binds = std::mem::take(&mut self.bind_names);
        let outer_context = std::mem::replace(&mut self.context, context);
        let result = f(self);
        self.context = outer_context;
        let binds = std::mem::replace(&mut self.bind_names, outer_binds);
        (result, binds)
    }

    fn rewrite_members(
        &mut self,
        members: &[Sym],
        expr: &mut Expr,
        slot_refs: bool,
        span: Span,
    ) -> Result<(), ParseError> {
        rewrite(members, expr, slot_refs, 0, &mut self.env.symbols)
            .map_err(|name| ParseError::new(span, ParseErrorKind::InvalidSlotReference(name)))
    }
}
