//! # Environment
//!
//! The environment is the data store that holds everything a program defines: symbols, modules,
//! templates and their facts, deffunctions and globals. It also carries the runtime state of
//! evaluation, i.e. variable frames, the stack of running queries and the halt signal. See the
//! [`Environment`] type for more information.

use std::{
    collections::HashMap,
    io::Write,
    rc::Rc,
    sync::{
        atomic::{self, AtomicBool},
        Arc,
    },
};

use crate::{
    ast::{Deffunction, Sym},
    error::{Error, EvalError},
    facts::{FactBase, TemplateRef},
    modules::ModuleTable,
    query::QueryStack,
    textual::{Form, Parser, Prettifier, TokenStream},
    value::Value,
};

/// Mapping between symbol names and their interned [`Sym`] IDs.
#[derive(Debug)]
pub struct SymbolStore {
    names: Vec<String>,
    lookup: HashMap<String, Sym>,
}

impl SymbolStore {
    /// Create a symbol store that already contains the symbols with fixed IDs
    /// ([`Sym::FALSE`], [`Sym::TRUE`] and [`Sym::QUERY_DELIMITER`]).
    pub fn new() -> Self {
        let mut store = Self {
            names: vec![],
            lookup: HashMap::new(),
        };
        let fixed = [
            (Sym::FALSE, "FALSE"),
            (Sym::TRUE, "TRUE"),
            (Sym::QUERY_DELIMITER, "(QDS)"),
        ];
        for (sym, name) in fixed {
            let interned = store.get_or_insert_named(name);
            debug_assert_eq!(interned, sym);
        }
        store
    }

    pub fn get_or_insert_named(&mut self, name: &str) -> Sym {
        if let Some(sym) = self.lookup.get(name) {
            return *sym;
        }
        let sym = Sym::from_ord(self.names.len());
        self.names.push(name.to_owned());
        self.lookup.insert(name.to_owned(), sym);
        sym
    }

    /// Look up a symbol without interning it.
    pub fn get(&self, name: &str) -> Option<Sym> {
        self.lookup.get(name).copied()
    }

    pub fn get_symbol_name(&self, sym: Sym) -> Option<&str> {
        self.names.get(sym.ord()).map(|s| s.as_str())
    }

    /// The name of a symbol, or a placeholder if the symbol is not from this store.
    pub fn name(&self, sym: Sym) -> &str {
        self.get_symbol_name(sym).unwrap_or("<unknown>")
    }
}

impl Default for SymbolStore {
    fn default() -> Self {
        Self::new()
    }
}

/// A flag that stops evaluation as soon as possible once set.
///
/// Set by the `halt` function and, in the REPL, by Ctrl-C. The flag is shared, so it can be set
/// from another thread while a command is running.
#[derive(Debug, Clone, Default)]
pub struct HaltSignal(Arc<AtomicBool>);

impl HaltSignal {
    pub fn set(&self) {
        self.0.store(true, atomic::Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, atomic::Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(atomic::Ordering::SeqCst)
    }
}

/// Tunable behaviour of an environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Whether asserting a fact identical to a live fact creates a second fact.
    pub fact_duplication: bool,
    /// Maximum nesting of deffunction calls and query bodies. Each level costs several evaluator
    /// frames on the native stack, so the default stays well inside a 2 MiB thread.
    pub max_call_depth: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fact_duplication: false,
            max_call_depth: 64,
        }
    }
}

/// Destination of `printout` and `facts`.
#[derive(Debug)]
pub(crate) enum Output {
    Stdout,
    Captured(String),
}

impl Output {
    pub(crate) fn write_str(&mut self, text: &str) {
        match self {
            Output::Stdout => {
                let mut stdout = std::io::stdout().lock();
                if let Err(err) = stdout.write_all(text.as_bytes()).and_then(|_| stdout.flush()) {
                    tracing::warn!("failed to write output: {}", err);
                }
            }
            Output::Captured(buffer) => buffer.push_str(text),
        }
    }
}

/// Result of looking up a template by name from the current module.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateLookup {
    Found(TemplateRef),
    Missing,
    /// Visible from more than one module.
    Ambiguous,
}

/// Symbols the evaluator needs to recognize.
#[derive(Debug)]
pub(crate) struct WellKnown {
    pub implied: Sym,
    pub crlf: Sym,
    pub tab: Sym,
    pub nil: Sym,
}

/// A local variable frame.
pub(crate) type Frame = HashMap<Sym, Value>;

/// The environment holds all definitions and facts and evaluates source text against them.
///
/// # Example
///
/// ```
/// # use factset::Environment;
/// let mut env = Environment::new();
/// env.load_str(
///     r#"
/// (deftemplate person (slot name) (slot age))
/// (assert (person (name "Ann") (age 31)) (person (name "Bob") (age 17)))
/// "#,
/// )
/// .unwrap();
///
/// let adults = env
///     .eval_str("(find-all-facts ((?p person)) (>= ?p:age 18))")
///     .unwrap();
/// assert_eq!(env.pretty().value_to_string(&adults), "(<Fact-1>)");
/// ```
#[derive(Debug)]
pub struct Environment {
    pub symbols: SymbolStore,
    pub facts: FactBase,
    pub modules: ModuleTable,
    pub settings: Settings,
    pub(crate) functions: HashMap<Sym, Rc<Deffunction>>,
    pub(crate) globals: HashMap<Sym, Value>,
    pub(crate) frames: Vec<Frame>,
    pub(crate) queries: QueryStack,
    /// Deffunction calls and queries currently being evaluated.
    pub(crate) depth: usize,
    pub(crate) well_known: WellKnown,
    halt: HaltSignal,
    output: Output,
}

impl Environment {
    pub fn new() -> Self {
        let mut symbols = SymbolStore::new();
        let main = symbols.get_or_insert_named("MAIN");
        let well_known = WellKnown {
            implied: symbols.get_or_insert_named("implied"),
            crlf: symbols.get_or_insert_named("crlf"),
            tab: symbols.get_or_insert_named("tab"),
            nil: symbols.get_or_insert_named("nil"),
        };
        Self {
            symbols,
            facts: FactBase::new(),
            modules: ModuleTable::new(main),
            settings: Settings::default(),
            functions: HashMap::new(),
            globals: HashMap::new(),
            frames: vec![Frame::new()],
            queries: QueryStack::new(),
            depth: 0,
            well_known,
            halt: HaltSignal::default(),
            output: Output::Stdout,
        }
    }

    /// Create an environment using an existing halt signal, e.g. one a signal handler holds.
    pub fn with_halt_signal(halt: HaltSignal) -> Self {
        Self {
            halt,
            ..Self::new()
        }
    }

    /// Load and execute all constructs and expressions in the source text.
    pub fn load_str(&mut self, source: &str) -> Result<(), Error> {
        self.eval_str(source).map(|_| ())
    }

    /// Execute all constructs and expressions in the source text and return the value of the last
    /// one (`FALSE` if there is none).
    ///
    /// Forms are parsed and executed one at a time, so later forms can refer to templates and
    /// functions defined by earlier ones.
    pub fn eval_str(&mut self, source: &str) -> Result<Value, Error> {
        let mut tokens = TokenStream::new(source);
        let mut last = Value::FALSE;
        while let Some(form) = Parser::new(self).parse_form(&mut tokens)? {
            last = self.execute(form)?;
        }
        Ok(last)
    }

    /// Returns a handle to the halt signal of this environment.
    pub fn halt_signal(&self) -> HaltSignal {
        self.halt.clone()
    }

    pub fn is_halted(&self) -> bool {
        self.halt.is_set()
    }

    /// Collect output of `printout` and `facts` in a buffer instead of writing it to stdout.
    pub fn capture_output(&mut self) {
        if !matches!(self.output, Output::Captured(_)) {
            self.output = Output::Captured(String::new());
        }
    }

    /// Take the output captured so far.
    pub fn take_output(&mut self) -> String {
        match &mut self.output {
            Output::Captured(buffer) => std::mem::take(buffer),
            Output::Stdout => String::new(),
        }
    }

    pub(crate) fn write_output(&mut self, text: &str) {
        self.output.write_str(text);
    }

    /// Return a pretty-printer using the symbols defined in this environment.
    pub fn pretty(&self) -> Prettifier<'_> {
        Prettifier::new(&self.symbols)
    }

    /// Look up a template by name, either module qualified (`MOD::name`) or as seen from the
    /// current module.
    pub fn find_template(&self, name: &str) -> TemplateLookup {
        if let Some((module, local)) = name.split_once("::") {
            let found = self
                .symbols
                .get(module)
                .and_then(|module| self.modules.find(module))
                .zip(self.symbols.get(local))
                .and_then(|(module, local)| self.facts.find_in_module(module, local));
            return match found {
                Some(template) => TemplateLookup::Found(template),
                None => TemplateLookup::Missing,
            };
        }
        let Some(sym) = self.symbols.get(name) else {
            return TemplateLookup::Missing;
        };
        let mut hits = self
            .modules
            .search_path(self.modules.current(), sym)
            .into_iter()
            .filter_map(|module| self.facts.find_in_module(module, sym));
        match (hits.next(), hits.next()) {
            (Some(template), None) => TemplateLookup::Found(template),
            (None, _) => TemplateLookup::Missing,
            (Some(_), Some(_)) => TemplateLookup::Ambiguous,
        }
    }

    /// The value of a global variable, given its name without the `?*` `*` decoration.
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.symbols
            .get(name)
            .and_then(|sym| self.globals.get(&sym))
    }

    pub(crate) fn name(&self, sym: Sym) -> String {
        self.symbols.name(sym).to_owned()
    }

    // //////////////////////////////// FORM EXECUTION ////////////////////////////////

    fn execute(&mut self, form: Form) -> Result<Value, EvalError> {
        self.halt.clear();
        let result = self.execute_form(form);
        // A failed command may leave frames of aborted deffunction calls behind.
        self.frames.truncate(1);
        self.queries.clear();
        self.depth = 0;
        self.facts.collect_garbage();
        result
    }

    fn execute_form(&mut self, form: Form) -> Result<Value, EvalError> {
        match form {
            Form::Expr(expr) => Ok(self.eval(&expr)?.into_value()),
            Form::Deftemplate { name, slots } => {
                let module = self.modules.current();
                self.facts
                    .define_template(name, module, slots, false)
                    .map_err(|_| EvalError::TemplateInUse(self.name(name)))?;
                Ok(Value::Symbol(name))
            }
            Form::Defmodule(module) => {
                let name = module.name;
                self.modules.define(module);
                tracing::debug!(module = self.symbols.name(name), "defined module");
                Ok(Value::Symbol(name))
            }
            Form::Deffunction(function) => {
                let name = function.name;
                self.functions.insert(name, Rc::new(function));
                Ok(Value::Symbol(name))
            }
            Form::Defglobal(globals) => {
                for (name, init) in globals {
                    let value = self.eval(&init)?.into_value();
                    self.globals.insert(name, value);
                }
                Ok(Value::TRUE)
            }
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fixed_symbols() {
        let store = SymbolStore::new();
        assert_eq!(store.get("FALSE"), Some(Sym::FALSE));
        assert_eq!(store.get("TRUE"), Some(Sym::TRUE));
        assert_eq!(store.name(Sym::QUERY_DELIMITER), "(QDS)");
    }

    #[test]
    fn interning() {
        let mut store = SymbolStore::new();
        let a = store.get_or_insert_named("a");
        let b = store.get_or_insert_named("b");
        assert_ne!(a, b);
        assert_eq!(store.get_or_insert_named("a"), a);
        assert_eq!(store.get_symbol_name(b), Some("b"));
        assert_eq!(store.get("c"), None);
    }

    #[test]
    fn template_lookup_through_modules() {
        let mut env = Environment::new();
        env.load_str(
            "(defmodule A (export deftemplate ?ALL))
             (deftemplate thing (slot x))
             (defmodule B (export ?ALL))
             (deftemplate thing (slot y))
             (deftemplate other)
             (defmodule C (import A ?ALL) (import B deftemplate ?ALL))",
        )
        .unwrap();
        assert_eq!(env.find_template("thing"), TemplateLookup::Ambiguous);
        assert!(matches!(env.find_template("A::thing"), TemplateLookup::Found(_)));
        assert!(matches!(env.find_template("other"), TemplateLookup::Found(_)));
        assert_eq!(env.find_template("missing"), TemplateLookup::Missing);
        assert_eq!(env.find_template("Z::thing"), TemplateLookup::Missing);
    }

    #[test]
    fn halt_is_cleared_per_command() {
        let mut env = Environment::new();
        env.capture_output();
        env.eval_str("(halt) (printout t after crlf)").unwrap();
        assert!(!env.is_halted());
        assert_eq!(env.take_output(), "after\n");
    }
}
