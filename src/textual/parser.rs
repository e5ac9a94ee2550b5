use std::iter::Peekable;

use logos::{Logos, Span, SpannedIter};
use thiserror::Error;

use crate::ast::{Call, Deffunction, Expr, FactPattern, Function, QueryFunction, SlotValue, Sym};
use crate::eval::Builtin;
use crate::facts::SlotDef;
use crate::modules::{Defmodule, Exports};
use crate::universe::{Environment, TemplateLookup};
use crate::value::Value;

use super::lexer::Token;

pub(crate) struct TokenStream<'a> {
    source: &'a str,
    lexer: Peekable<SpannedIter<'a, Token>>,
}

impl<'a> TokenStream<'a> {
    pub fn new(source: &'a str) -> Self {
        let lexer = Token::lexer(source).spanned().peekable();

        Self { source, lexer }
    }

    pub fn peek(&mut self) -> Option<(Result<Token, ()>, Span)> {
        self.lexer.peek().cloned()
    }

    pub fn next(&mut self) -> Option<(Result<Token, ()>, Span)> {
        self.lexer.next()
    }

    pub fn advance(&mut self) {
        self.lexer.next();
    }

    pub fn peek_token(&mut self) -> Option<Result<Token, ()>> {
        self.lexer.peek().map(|(tok, _)| tok).cloned()
    }

    pub fn slice(&self, span: Span) -> &'a str {
        &self.source[span]
    }

    pub fn eof(&self) -> Span {
        self.source.len()..self.source.len()
    }

    /// Whether the next token is the symbol `keyword`.
    pub fn peek_keyword(&mut self, keyword: &str) -> bool {
        match self.peek() {
            Some((Ok(Token::Symbol), span)) => self.slice(span) == keyword,
            _ => false,
        }
    }
}

/// A parse error originating from [`Parser`].
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} (at {}..{})", .span.start, .span.end)]
pub struct ParseError {
    /// The range in the source text where the error occurred.
    pub span: Span,
    /// The type of error that occurred.
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub fn new(span: Span, kind: ParseErrorKind) -> Self {
        Self { span, kind }
    }
}

/// The various types of parse errors reported by [`Parser`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseErrorKind {
    /// The parser reached the end of the input, but expected more tokens to follow.
    #[error("unexpected end of input")]
    UnexpectedEof,
    /// The parser encountered a token that doesn't belong in that place.
    #[error("unexpected token {0:?}")]
    UnexpectedToken(Token),
    /// The parser encountered input that could not be recognized as a token.
    #[error("unrecognized token")]
    UnrecognizedToken,
    /// Malformed syntax of the named construct or function.
    #[error("syntax error, check appropriate syntax for {0}")]
    Syntax(String),
    #[error("missing function declaration for {0}")]
    UnknownFunction(String),
    #[error("function {function} expected {expected} argument(s), found {found}")]
    WrongArity {
        function: String,
        expected: String,
        found: usize,
    },
    #[error("global variable ?*{0}* was referenced, but is not defined")]
    UnknownGlobal(String),
    #[error("unable to find defmodule {0}")]
    UnknownModule(String),
    #[error("unable to find deftemplate {0}")]
    UnknownTemplate(String),
    #[error("ambiguous reference to deftemplate {0}")]
    AmbiguousTemplate(String),
    #[error("deftemplate {template} has no slot {slot}")]
    UnknownSlot { template: String, slot: String },
    #[error("the break function is not valid in this context")]
    MisplacedBreak,
    #[error("the return function is not valid in this context")]
    MisplacedReturn,
    /// A malformed restriction list of a fact-set query.
    #[error("syntax error in fact-set query class restrictions of function {0}")]
    InvalidRestrictions(&'static str),
    #[error("[FACTQPSR1] duplicate fact member variable name ?{variable} in function {function}")]
    DuplicateMemberVariable {
        function: &'static str,
        variable: String,
    },
    #[error("[FACTQPSR2] binds are not allowed in fact-set query in function {0}")]
    BindInQueryTest(&'static str),
    #[error("[FACTQPSR3] cannot rebind fact-set member variable ?{variable} in function {function}")]
    RebindMemberVariable {
        function: &'static str,
        variable: String,
    },
    #[error("invalid fact-set member slot reference ?{0}")]
    InvalidSlotReference(String),
}

impl ParseErrorKind {
    /// Translate an unexpected item in the token stream (either an unexpected token or a lexer
    /// error) into the matching [`ParseErrorKind`].
    pub fn unexpected(res: Result<Token, ()>) -> Self {
        match res {
            Ok(tok) => Self::UnexpectedToken(tok),
            Err(()) => Self::UnrecognizedToken,
        }
    }
}

/// A top-level item of source text.
#[derive(Debug, Clone, PartialEq)]
pub enum Form {
    /// An expression to evaluate.
    Expr(Expr),
    Deftemplate {
        name: Sym,
        slots: Vec<SlotDef>,
    },
    Defmodule(Defmodule),
    Deffunction(Deffunction),
    /// Globals with their initial value expressions, in definition order.
    Defglobal(Vec<(Sym, Expr)>),
}

/// Which control-flow functions are legal at the current position.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Context {
    pub break_allowed: bool,
    pub return_allowed: bool,
}

/// A parser for the CLIPS-like syntax understood by an [`Environment`].
///
/// The parser resolves names against the environment while parsing, so it needs to see the
/// definitions made by earlier forms. [`Environment::eval_str`] therefore parses and executes one
/// form at a time.
pub struct Parser<'e> {
    pub(crate) env: &'e mut Environment,
    /// Local variables bound with `bind` in the body being parsed.
    pub(crate) bind_names: Vec<Sym>,
    pub(crate) context: Context,
    /// The deffunction whose body is being parsed, with its arity, so it can call itself.
    pending_function: Option<(Sym, usize)>,
    /// Globals defined earlier in the defglobal being parsed.
    pending_globals: Vec<Sym>,
}

impl<'e> Parser<'e> {
    pub fn new(env: &'e mut Environment) -> Self {
        Self {
            env,
            bind_names: vec![],
            context: Context::default(),
            pending_function: None,
            pending_globals: vec![],
        }
    }

    // //////////////////////////////// PUBLIC PARSER ////////////////////////////////

    /// Parse a single expression, which must make up the whole input.
    pub fn parse_expr_str(&mut self, source: &str) -> Result<Expr, ParseError> {
        let mut tokens = TokenStream::new(source);
        let expr = self.parse_expr(&mut tokens)?;
        self.expect_eof(&mut tokens)?;
        Ok(expr)
    }

    /// Parse the next form, or return `None` at the end of the input.
    pub(crate) fn parse_form(
        &mut self,
        tokens: &mut TokenStream,
    ) -> Result<Option<Form>, ParseError> {
        match tokens.peek() {
            None => return Ok(None),
            Some((Ok(Token::LParen), _)) => {}
            Some(_) => return self.parse_expr(tokens).map(|expr| Some(Form::Expr(expr))),
        }
        let (_, open) = self.expect_next(tokens)?;
        let form = match tokens.peek() {
            Some((Ok(Token::Symbol), span)) => match tokens.slice(span) {
                "deftemplate" => {
                    tokens.advance();
                    self.parse_deftemplate(tokens)?
                }
                "defmodule" => {
                    tokens.advance();
                    Form::Defmodule(self.parse_defmodule(tokens)?)
                }
                "deffunction" => {
                    tokens.advance();
                    Form::Deffunction(self.parse_deffunction(tokens)?)
                }
                "defglobal" => {
                    tokens.advance();
                    Form::Defglobal(self.parse_defglobal(tokens)?)
                }
                _ => Form::Expr(self.parse_call(tokens, open)?),
            },
            _ => Form::Expr(self.parse_call(tokens, open)?),
        };
        Ok(Some(form))
    }

    // //////////////////////////////// CONSTRUCTS ////////////////////////////////

    fn parse_deftemplate(&mut self, tokens: &mut TokenStream) -> Result<Form, ParseError> {
        let (name, _) = self.parse_symbol(tokens)?;
        self.skip_comment(tokens);
        let mut slots: Vec<SlotDef> = vec![];
        loop {
            let (tok, span) = self.expect_next(tokens)?;
            match tok {
                Ok(Token::RParen) => break,
                Ok(Token::LParen) => {}
                other => return Err(ParseError::new(span, ParseErrorKind::unexpected(other))),
            }
            let (kind, kind_span) = self.parse_symbol(tokens)?;
            let multi = match self.env.symbols.name(kind) {
                "slot" | "field" => false,
                "multislot" | "multifield" => true,
                _ => return Err(syntax(kind_span, "deftemplate")),
            };
            let (slot, slot_span) = self.parse_symbol(tokens)?;
            if slots.iter().any(|s| s.name == slot) {
                return Err(syntax(slot_span, "deftemplate"));
            }
            let mut default = if multi {
                Value::Multifield(vec![])
            } else {
                Value::Symbol(self.env.well_known.nil)
            };
            // slot attributes; only `default` is supported
            loop {
                let (tok, span) = self.expect_next(tokens)?;
                match tok {
                    Ok(Token::RParen) => break,
                    Ok(Token::LParen) => {}
                    other => return Err(ParseError::new(span, ParseErrorKind::unexpected(other))),
                }
                if !tokens.peek_keyword("default") {
                    return Err(syntax(span, "deftemplate"));
                }
                tokens.advance();
                let mut values = vec![];
                while tokens.peek_token() != Some(Ok(Token::RParen)) {
                    let expr_start = self.peek_span(tokens);
                    match self.parse_expr(tokens)? {
                        Expr::Const(value) => values.push(value),
                        _ => return Err(syntax(expr_start, "deftemplate")),
                    }
                }
                tokens.advance();
                default = if multi {
                    Value::Multifield(values)
                } else if values.len() == 1 {
                    values.remove(0)
                } else {
                    return Err(syntax(span, "deftemplate"));
                };
            }
            slots.push(SlotDef {
                name: slot,
                multi,
                default,
            });
        }
        Ok(Form::Deftemplate { name, slots })
    }

    fn parse_defmodule(&mut self, tokens: &mut TokenStream) -> Result<Defmodule, ParseError> {
        let (name, _) = self.parse_symbol(tokens)?;
        self.skip_comment(tokens);
        let mut module = Defmodule {
            name,
            exports: Exports::None,
            imports: vec![],
        };
        loop {
            let (tok, span) = self.expect_next(tokens)?;
            match tok {
                Ok(Token::RParen) => break,
                Ok(Token::LParen) => {}
                other => return Err(ParseError::new(span, ParseErrorKind::unexpected(other))),
            }
            let (keyword, keyword_span) = self.parse_symbol(tokens)?;
            match self.env.symbols.name(keyword) {
                "export" => {
                    let exports = self.parse_port_spec(tokens)?;
                    module.exports.extend(exports);
                }
                "import" => {
                    let (source, source_span) = self.parse_symbol(tokens)?;
                    let source_id = self.env.modules.find(source).ok_or_else(|| {
                        ParseError::new(
                            source_span,
                            ParseErrorKind::UnknownModule(self.env.name(source)),
                        )
                    })?;
                    let imports = self.parse_port_spec(tokens)?;
                    module.imports.push((source_id, imports));
                }
                _ => return Err(syntax(keyword_span, "defmodule")),
            }
        }
        Ok(module)
    }

    /// Parse the rest of an `export`/`import` specification including the closing paren:
    /// `?ALL`, `?NONE`, `deftemplate ?ALL`, `deftemplate ?NONE` or `deftemplate name+`.
    fn parse_port_spec(&mut self, tokens: &mut TokenStream) -> Result<Exports, ParseError> {
        let (tok, span) = self.expect_next(tokens)?;
        let exports = match (tok, tokens.slice(span.clone())) {
            (Ok(Token::Variable), "?ALL") => Exports::All,
            (Ok(Token::Variable), "?NONE") => Exports::None,
            (Ok(Token::Symbol), "deftemplate") => {
                let (tok, span) = self.expect_next(tokens)?;
                match (tok, tokens.slice(span.clone())) {
                    (Ok(Token::Variable), "?ALL") => Exports::All,
                    (Ok(Token::Variable), "?NONE") => Exports::None,
                    (Ok(Token::Symbol), first) => {
                        let mut names = vec![self.env.symbols.get_or_insert_named(first)];
                        while tokens.peek_token() == Some(Ok(Token::Symbol)) {
                            let (name, _) = self.parse_symbol(tokens)?;
                            names.push(name);
                        }
                        Exports::Named(names)
                    }
                    _ => return Err(syntax(span, "defmodule")),
                }
            }
            _ => return Err(syntax(span, "defmodule")),
        };
        self.expect_token(tokens, Token::RParen)?;
        Ok(exports)
    }

    fn parse_deffunction(&mut self, tokens: &mut TokenStream) -> Result<Deffunction, ParseError> {
        let (name, name_span) = self.parse_symbol(tokens)?;
        if Builtin::from_name(tokens.slice(name_span.clone())).is_some()
            || QueryFunction::from_name(tokens.slice(name_span.clone())).is_some()
        {
            return Err(syntax(name_span, "deffunction"));
        }
        self.skip_comment(tokens);
        self.expect_token(tokens, Token::LParen)?;
        let mut params = vec![];
        loop {
            let (tok, span) = self.expect_next(tokens)?;
            match tok {
                Ok(Token::RParen) => break,
                Ok(Token::Variable) => {
                    let param = self.variable_sym(tokens, span.clone());
                    if params.contains(&param) {
                        return Err(syntax(span, "deffunction"));
                    }
                    params.push(param);
                }
                other => return Err(ParseError::new(span, ParseErrorKind::unexpected(other))),
            }
        }

        let outer_binds = std::mem::replace(&mut self.bind_names, params.clone());
        let outer_context = std::mem::replace(
            &mut self.context,
            Context {
                break_allowed: false,
                return_allowed: true,
            },
        );
        self.pending_function = Some((name, params.len()));
        let body = self.parse_sequence(tokens);
        self.pending_function = None;
        self.context = outer_context;
        self.bind_names = outer_binds;

        Ok(Deffunction {
            name,
            params,
            body: body?,
        })
    }

    fn parse_defglobal(&mut self, tokens: &mut TokenStream) -> Result<Vec<(Sym, Expr)>, ParseError> {
        // optional module name
        if tokens.peek_token() == Some(Ok(Token::Symbol)) {
            tokens.advance();
        }
        let mut globals = vec![];
        loop {
            let (tok, span) = self.expect_next(tokens)?;
            match tok {
                Ok(Token::RParen) => break,
                Ok(Token::GlobalVariable) => {
                    let name = self.global_sym(tokens, span);
                    let (tok, span) = self.expect_next(tokens)?;
                    if tok != Ok(Token::Symbol) || tokens.slice(span.clone()) != "=" {
                        return Err(syntax(span, "defglobal"));
                    }
                    let init = self.parse_expr(tokens)?;
                    self.pending_globals.push(name);
                    globals.push((name, init));
                }
                other => return Err(ParseError::new(span, ParseErrorKind::unexpected(other))),
            }
        }
        self.pending_globals.clear();
        Ok(globals)
    }

    // //////////////////////////////// EXPRESSIONS ////////////////////////////////

    pub(crate) fn parse_expr(&mut self, tokens: &mut TokenStream) -> Result<Expr, ParseError> {
        let (tok, span) = self.expect_next(tokens)?;
        match tok {
            Ok(Token::LParen) => self.parse_call(tokens, span),
            Ok(Token::Variable) => Ok(Expr::Var(self.variable_sym(tokens, span))),
            Ok(Token::GlobalVariable) => {
                let name = self.global_sym(tokens, span.clone());
                if self.env.globals.contains_key(&name) || self.pending_globals.contains(&name) {
                    Ok(Expr::Global(name))
                } else {
                    Err(ParseError::new(
                        span,
                        ParseErrorKind::UnknownGlobal(self.env.name(name)),
                    ))
                }
            }
            Ok(Token::Integer(i)) => Ok(Expr::Const(Value::Integer(i))),
            Ok(Token::Float(f)) => Ok(Expr::Const(Value::Float(f))),
            Ok(Token::String(s)) => Ok(Expr::Const(Value::String(s))),
            Ok(Token::Symbol) => {
                let sym = self.env.symbols.get_or_insert_named(tokens.slice(span));
                Ok(Expr::symbol(sym))
            }
            other => Err(ParseError::new(span, ParseErrorKind::unexpected(other))),
        }
    }

    /// Parse expressions up to and including the closing paren of the enclosing list.
    pub(crate) fn parse_sequence(
        &mut self,
        tokens: &mut TokenStream,
    ) -> Result<Vec<Expr>, ParseError> {
        let mut exprs = vec![];
        loop {
            match tokens.peek_token() {
                Some(Ok(Token::RParen)) => {
                    tokens.advance();
                    return Ok(exprs);
                }
                Some(_) => exprs.push(self.parse_expr(tokens)?),
                None => return Err(ParseError::new(tokens.eof(), ParseErrorKind::UnexpectedEof)),
            }
        }
    }

    /// Parse a function call after its opening paren.
    fn parse_call(&mut self, tokens: &mut TokenStream, open: Span) -> Result<Expr, ParseError> {
        let (name, name_span) = self.parse_symbol(tokens)?;
        let call_span = open.start..name_span.end;
        let name_str = tokens.slice(name_span.clone());

        if let Some(function) = QueryFunction::from_name(name_str) {
            return self.parse_query(tokens, function, call_span);
        }
        if name_str == "assert" {
            return self.parse_assert(tokens, call_span);
        }
        if let Some(builtin) = Builtin::from_name(name_str) {
            let args = match builtin {
                Builtin::If => self.parse_if(tokens, call_span.clone())?,
                Builtin::While => self.parse_while(tokens)?,
                Builtin::Bind => self.parse_bind(tokens, call_span.clone())?,
                Builtin::Break if !self.context.break_allowed => {
                    return Err(ParseError::new(call_span, ParseErrorKind::MisplacedBreak))
                }
                Builtin::Return if !self.context.return_allowed => {
                    return Err(ParseError::new(call_span, ParseErrorKind::MisplacedReturn))
                }
                _ => self.parse_sequence(tokens)?,
            };
            let (min, max) = builtin.arity();
            if args.len() < min || max.map_or(false, |max| args.len() > max) {
                return Err(ParseError::new(
                    call_span,
                    ParseErrorKind::WrongArity {
                        function: builtin.name().to_owned(),
                        expected: builtin.arity_description(),
                        found: args.len(),
                    },
                ));
            }
            return Ok(Expr::call(Function::Builtin(builtin), args));
        }

        let arity = match self.pending_function {
            Some((pending, arity)) if pending == name => Some(arity),
            _ => self.env.functions.get(&name).map(|f| f.params.len()),
        };
        let Some(arity) = arity else {
            return Err(ParseError::new(
                name_span,
                ParseErrorKind::UnknownFunction(name_str.to_owned()),
            ));
        };
        let args = self.parse_sequence(tokens)?;
        if args.len() != arity {
            return Err(ParseError::new(
                call_span,
                ParseErrorKind::WrongArity {
                    function: name_str.to_owned(),
                    expected: format!("exactly {}", arity),
                    found: args.len(),
                },
            ));
        }
        Ok(Expr::Call(Call {
            function: Function::User(name),
            args,
        }))
    }

    /// `(if <cond> then <action>* [else <action>*])`
    fn parse_if(&mut self, tokens: &mut TokenStream, span: Span) -> Result<Vec<Expr>, ParseError> {
        let condition = self.parse_expr(tokens)?;
        if !tokens.peek_keyword("then") {
            return Err(syntax(span, "if"));
        }
        tokens.advance();
        let mut then = vec![];
        let mut otherwise = None;
        loop {
            match tokens.peek_token() {
                Some(Ok(Token::RParen)) => {
                    tokens.advance();
                    break;
                }
                Some(_) if otherwise.is_none() && tokens.peek_keyword("else") => {
                    tokens.advance();
                    otherwise = Some(self.parse_sequence(tokens)?);
                    break;
                }
                Some(_) => then.push(self.parse_expr(tokens)?),
                None => return Err(ParseError::new(tokens.eof(), ParseErrorKind::UnexpectedEof)),
            }
        }
        let progn = |body| Expr::call(Function::Builtin(Builtin::Progn), body);
        let mut args = vec![condition, progn(then)];
        args.extend(otherwise.map(progn));
        Ok(args)
    }

    /// `(while <cond> [do] <action>*)`
    fn parse_while(&mut self, tokens: &mut TokenStream) -> Result<Vec<Expr>, ParseError> {
        let condition = self.parse_expr(tokens)?;
        if tokens.peek_keyword("do") {
            tokens.advance();
        }
        let outer = self.context;
        self.context.break_allowed = true;
        let body = self.parse_sequence(tokens);
        self.context = outer;
        Ok(vec![
            condition,
            Expr::call(Function::Builtin(Builtin::Progn), body?),
        ])
    }

    /// `(bind <variable> <expr>*)`; records local binds in [`Self::bind_names`].
    fn parse_bind(&mut self, tokens: &mut TokenStream, span: Span) -> Result<Vec<Expr>, ParseError> {
        let (tok, var_span) = self.expect_next(tokens)?;
        let target = match tok {
            Ok(Token::Variable) => {
                let name = self.variable_sym(tokens, var_span);
                if !self.bind_names.contains(&name) {
                    self.bind_names.push(name);
                }
                Expr::Var(name)
            }
            Ok(Token::GlobalVariable) => {
                let name = self.global_sym(tokens, var_span.clone());
                if !self.env.globals.contains_key(&name) && !self.pending_globals.contains(&name)
                {
                    return Err(ParseError::new(
                        var_span,
                        ParseErrorKind::UnknownGlobal(self.env.name(name)),
                    ));
                }
                Expr::Global(name)
            }
            _ => return Err(syntax(span, "bind")),
        };
        let mut args = vec![target];
        args.extend(self.parse_sequence(tokens)?);
        Ok(args)
    }

    /// `(assert <pattern>+)` after the function name.
    fn parse_assert(&mut self, tokens: &mut TokenStream, span: Span) -> Result<Expr, ParseError> {
        let mut patterns = vec![];
        loop {
            let (tok, open) = self.expect_next(tokens)?;
            match tok {
                Ok(Token::RParen) => break,
                Ok(Token::LParen) => patterns.push(self.parse_fact_pattern(tokens, open)?),
                other => return Err(ParseError::new(open, ParseErrorKind::unexpected(other))),
            }
        }
        if patterns.is_empty() {
            return Err(syntax(span, "assert"));
        }
        Ok(Expr::Assert(patterns))
    }

    fn parse_fact_pattern(
        &mut self,
        tokens: &mut TokenStream,
        open: Span,
    ) -> Result<FactPattern, ParseError> {
        let (name, name_span) = self.parse_symbol(tokens)?;
        let name_str = tokens.slice(name_span.clone());
        let template = match self.env.find_template(name_str) {
            TemplateLookup::Found(template) => template,
            TemplateLookup::Ambiguous => {
                return Err(ParseError::new(
                    name_span,
                    ParseErrorKind::AmbiguousTemplate(name_str.to_owned()),
                ))
            }
            TemplateLookup::Missing if name_str.contains("::") => {
                return Err(ParseError::new(
                    name_span,
                    ParseErrorKind::UnknownTemplate(name_str.to_owned()),
                ))
            }
            TemplateLookup::Missing => {
                let implied = SlotDef {
                    name: self.env.well_known.implied,
                    multi: true,
                    default: Value::Multifield(vec![]),
                };
                let module = self.env.modules.current();
                self.env
                    .facts
                    .define_template(name, module, vec![implied], true)
                    .map_err(|_| syntax(open.clone(), "assert"))?
            }
        };

        if template.implied {
            let values = self.parse_sequence(tokens)?;
            return Ok(FactPattern {
                template,
                slots: vec![SlotValue::Multi(values)],
            });
        }

        let mut given: Vec<Option<SlotValue>> = vec![None; template.slots.len()];
        loop {
            let (tok, span) = self.expect_next(tokens)?;
            match tok {
                Ok(Token::RParen) => break,
                Ok(Token::LParen) => {}
                other => return Err(ParseError::new(span, ParseErrorKind::unexpected(other))),
            }
            let (slot, slot_span) = self.parse_symbol(tokens)?;
            let Some(position) = template.slot_position(slot) else {
                return Err(ParseError::new(
                    slot_span,
                    ParseErrorKind::UnknownSlot {
                        template: name_str.to_owned(),
                        slot: self.env.name(slot),
                    },
                ));
            };
            if given[position].is_some() {
                return Err(syntax(slot_span, "assert"));
            }
            let mut values = self.parse_sequence(tokens)?;
            given[position] = Some(if template.slots[position].multi {
                SlotValue::Multi(values)
            } else if values.len() == 1 {
                SlotValue::Single(values.remove(0))
            } else {
                return Err(syntax(slot_span, "assert"));
            });
        }

        let slots = given
            .into_iter()
            .zip(&template.slots)
            .map(|(value, def)| {
                value.unwrap_or_else(|| SlotValue::Single(Expr::Const(def.default.clone())))
            })
            .collect();
        Ok(FactPattern { template, slots })
    }

    // //////////////////////////////// TOKEN HELPERS ////////////////////////////////

    fn expect_eof(&mut self, tokens: &mut TokenStream) -> Result<(), ParseError> {
        if let Some((other, span)) = tokens.next() {
            Err(ParseError::new(span, ParseErrorKind::unexpected(other)))
        } else {
            Ok(())
        }
    }

    /// The next token, failing at the end of the input.
    pub(crate) fn expect_next(
        &mut self,
        tokens: &mut TokenStream,
    ) -> Result<(Result<Token, ()>, Span), ParseError> {
        tokens
            .next()
            .ok_or_else(|| ParseError::new(tokens.eof(), ParseErrorKind::UnexpectedEof))
    }

    pub(crate) fn expect_token(
        &mut self,
        tokens: &mut TokenStream,
        expected: Token,
    ) -> Result<Span, ParseError> {
        let (actual, span) = self.expect_next(tokens)?;
        if actual == Ok(expected) {
            Ok(span)
        } else {
            Err(ParseError::new(span, ParseErrorKind::unexpected(actual)))
        }
    }

    fn parse_symbol(&mut self, tokens: &mut TokenStream) -> Result<(Sym, Span), ParseError> {
        let span = self.expect_token(tokens, Token::Symbol)?;
        let sym = self.env.symbols.get_or_insert_named(tokens.slice(span.clone()));
        Ok((sym, span))
    }

    /// Intern the name of a `?name` token, without the question mark.
    pub(crate) fn variable_sym(&mut self, tokens: &TokenStream, span: Span) -> Sym {
        let name = &tokens.slice(span)[1..];
        self.env.symbols.get_or_insert_named(name)
    }

    /// Intern the name of a `?*name*` token, without the decoration.
    fn global_sym(&mut self, tokens: &TokenStream, span: Span) -> Sym {
        let text = tokens.slice(span);
        self.env.symbols.get_or_insert_named(&text[2..text.len() - 1])
    }

    fn peek_span(&mut self, tokens: &mut TokenStream) -> Span {
        tokens.peek().map_or_else(|| tokens.eof(), |(_, span)| span)
    }

    /// Skip the optional comment string of a construct.
    fn skip_comment(&mut self, tokens: &mut TokenStream) {
        if let Some(Ok(Token::String(_))) = tokens.peek_token() {
            tokens.advance();
        }
    }
}

pub(crate) fn syntax(span: Span, construct: &str) -> ParseError {
    ParseError::new(span, ParseErrorKind::Syntax(construct.to_owned()))
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse_err(env: &mut Environment, source: &str) -> ParseErrorKind {
        match env.eval_str(source) {
            Err(crate::Error::Parse(err)) => err.kind,
            other => panic!("expected a parse error, got {:?}", other),
        }
    }

    #[test]
    fn expressions() {
        let mut env = Environment::new();
        let expr = Parser::new(&mut env).parse_expr_str("(+ 1 2.5)").unwrap();
        assert_eq!(
            expr,
            Expr::call(
                Function::Builtin(Builtin::Add),
                vec![
                    Expr::Const(Value::Integer(1)),
                    Expr::Const(Value::Float(2.5))
                ]
            )
        );
        let err = Parser::new(&mut env).parse_expr_str("(+ 1 2) 3").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnexpectedToken(Token::Integer(3)));
        assert_eq!(err.span, 8..9);
    }

    #[test]
    fn comment_parsing() {
        let mut env = Environment::new();
        let with_comment = Parser::new(&mut env)
            .parse_expr_str("(eq a b) ; example comment")
            .unwrap();
        let no_comment = Parser::new(&mut env).parse_expr_str("(eq a b)").unwrap();
        assert_eq!(with_comment, no_comment);
    }

    #[test]
    fn arity_and_context() {
        let mut env = Environment::new();
        assert!(matches!(
            parse_err(&mut env, "(not 1 2)"),
            ParseErrorKind::WrongArity { found: 2, .. }
        ));
        assert_eq!(parse_err(&mut env, "(break)"), ParseErrorKind::MisplacedBreak);
        assert_eq!(parse_err(&mut env, "(return 1)"), ParseErrorKind::MisplacedReturn);
        assert_eq!(
            parse_err(&mut env, "(frobnicate)"),
            ParseErrorKind::UnknownFunction("frobnicate".into())
        );
        assert_eq!(
            parse_err(&mut env, "(+ ?*nope* 1)"),
            ParseErrorKind::UnknownGlobal("nope".into())
        );
        assert_eq!(parse_err(&mut env, "(+ 1"), ParseErrorKind::UnexpectedEof);
    }

    #[test]
    fn templates_and_asserts() {
        let mut env = Environment::new();
        env.load_str("(deftemplate point \"a point\" (slot x (default 0)) (slot y))")
            .unwrap();
        assert!(matches!(
            parse_err(&mut env, "(assert (point (z 1)))"),
            ParseErrorKind::UnknownSlot { .. }
        ));
        assert!(matches!(
            parse_err(&mut env, "(assert (point (x 1 2)))"),
            ParseErrorKind::Syntax(_)
        ));
        assert!(matches!(
            parse_err(&mut env, "(deftemplate bad (slot a) (slot a))"),
            ParseErrorKind::Syntax(_)
        ));
        let fact = env.eval_str("(assert (point (y 3)))").unwrap();
        let Value::Fact(fact) = fact else {
            panic!("expected a fact")
        };
        assert_eq!(env.pretty().fact_to_string(&fact), "(point (x 0) (y 3))");
    }

    #[test]
    fn modules() {
        let mut env = Environment::new();
        assert_eq!(
            parse_err(&mut env, "(defmodule A (import B ?ALL))"),
            ParseErrorKind::UnknownModule("B".into())
        );
        env.load_str("(defmodule B (export deftemplate a b)) (defmodule A (import B ?ALL))")
            .unwrap();
        let a = env.symbols.get("A").unwrap();
        assert_eq!(env.modules.current(), env.modules.find(a).unwrap());
    }
}
