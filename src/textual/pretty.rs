use crate::{facts::Fact, universe::SymbolStore, value::Value};

/// A pretty-printer for values using CLIPS notation.
pub struct Prettifier<'u> {
    symbols: &'u SymbolStore,
}

impl<'a> Prettifier<'a> {
    pub fn new(symbols: &'a SymbolStore) -> Self {
        Self { symbols }
    }

    pub fn value_to_string(&self, value: &Value) -> String {
        let mut out = String::new();
        // writing into a String cannot fail
        let _ = self.pretty(&mut out, value);
        out
    }

    /// Format a value the way `printout` shows it, i.e. strings without quotes.
    pub fn display_to_string(&self, value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => self.value_to_string(other),
        }
    }

    pub fn fact_to_string(&self, fact: &Fact) -> String {
        let mut out = String::new();
        let _ = self.pretty_fact(&mut out, fact);
        out
    }

    pub fn pretty<W: std::fmt::Write>(&self, writer: &mut W, value: &Value) -> std::fmt::Result {
        match value {
            Value::Symbol(sym) => write!(writer, "{}", self.symbols.name(*sym)),
            Value::String(s) => {
                write!(writer, "\"")?;
                for c in s.chars() {
                    if c == '"' || c == '\\' {
                        write!(writer, "\\")?;
                    }
                    write!(writer, "{}", c)?;
                }
                write!(writer, "\"")
            }
            Value::Integer(i) => write!(writer, "{}", i),
            Value::Float(f) => write!(writer, "{:?}", f),
            Value::Fact(fact) => write!(writer, "<Fact-{}>", fact.index),
            Value::Template(template) => write!(
                writer,
                "<Deftemplate-{}>",
                self.symbols.name(template.name)
            ),
            Value::Multifield(values) => {
                write!(writer, "(")?;
                self.pretty_fields(writer, values)?;
                write!(writer, ")")
            }
        }
    }

    /// Write the fact the way the `facts` command lists it, e.g. `(point 1 2)` or
    /// `(person (name "Ann") (age 31))`.
    pub fn pretty_fact<W: std::fmt::Write>(&self, writer: &mut W, fact: &Fact) -> std::fmt::Result {
        let template = &fact.template;
        write!(writer, "({}", self.symbols.name(template.name))?;
        if template.implied {
            for value in &fact.fields {
                if let Value::Multifield(values) = value {
                    if !values.is_empty() {
                        write!(writer, " ")?;
                        self.pretty_fields(writer, values)?;
                    }
                } else {
                    write!(writer, " ")?;
                    self.pretty(writer, value)?;
                }
            }
        } else {
            for (slot, value) in template.slots.iter().zip(&fact.fields) {
                write!(writer, " ({}", self.symbols.name(slot.name))?;
                match value {
                    Value::Multifield(values) if slot.multi => {
                        if !values.is_empty() {
                            write!(writer, " ")?;
                            self.pretty_fields(writer, values)?;
                        }
                    }
                    other => {
                        write!(writer, " ")?;
                        self.pretty(writer, other)?;
                    }
                }
                write!(writer, ")")?;
            }
        }
        write!(writer, ")")
    }

    fn pretty_fields<W: std::fmt::Write>(
        &self,
        writer: &mut W,
        values: &[Value],
    ) -> std::fmt::Result {
        if let Some((first, rest)) = values.split_first() {
            self.pretty(writer, first)?;
            for value in rest {
                write!(writer, " ")?;
                self.pretty(writer, value)?;
            }
        }
        Ok(())
    }
}
