//! # Templates and facts
//!
//! A [`FactBase`] owns the deftemplates of an environment and the facts asserted for them. Facts
//! are shared through [`FactRef`] handles so that values, query solutions and the store itself can
//! all point at the same fact.
//!
//! Retracting a fact only marks it as garbage. The fact stays in its template's fact list until
//! [`FactBase::collect_garbage`] runs, and even then it is only removed when neither the fact nor
//! its template is pinned. Pins are taken by running queries, which is what keeps their iteration
//! positions valid while actions retract and assert facts.

use std::{
    cell::{Cell, RefCell},
    fmt,
    ops::Deref,
    rc::Rc,
};

use crate::{ast::Sym, modules::ModuleId, value::Value};

/// Returned when a template cannot be replaced or removed because a query iterates over it or it
/// still has facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateInUse;

/// The declaration of one slot of a template.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotDef {
    pub name: Sym,
    /// Whether the slot holds a multifield.
    pub multi: bool,
    /// Value used when an assert does not mention the slot.
    pub default: Value,
}

/// A deftemplate, i.e. the schema of a set of facts.
pub struct Deftemplate {
    pub name: Sym,
    pub module: ModuleId,
    pub slots: Vec<SlotDef>,
    /// Implied templates are created on the fly for ordered facts and have a single multifield
    /// slot named `implied`.
    pub implied: bool,
    facts: RefCell<Vec<FactRef>>,
    busy: Cell<usize>,
}

impl Deftemplate {
    pub fn slot_position(&self, slot: Sym) -> Option<usize> {
        self.slots.iter().position(|s| s.name == slot)
    }

    /// Whether a running query currently iterates over this template.
    pub fn is_busy(&self) -> bool {
        self.busy.get() > 0
    }

    /// Iterate over the facts of this template that are not retracted, in assertion order.
    ///
    /// The iterator does not borrow the template's fact list between steps, so facts asserted
    /// while iterating are visited as well.
    pub fn live_facts(template: &TemplateRef) -> LiveFacts {
        LiveFacts {
            template: template.clone(),
            cursor: 0,
        }
    }

    pub fn live_count(&self) -> usize {
        self.facts.borrow().iter().filter(|f| !f.is_garbage()).count()
    }
}

/// Shared handle to a [`Deftemplate`]. Two handles are equal when they point at the same
/// template.
#[derive(Clone)]
pub struct TemplateRef(Rc<Deftemplate>);

impl TemplateRef {
    /// Mark the template as in use until the returned guard is dropped.
    pub fn pin(&self) -> TemplatePin {
        self.busy.set(self.busy.get() + 1);
        TemplatePin(self.clone())
    }
}

impl Deref for TemplateRef {
    type Target = Deftemplate;

    fn deref(&self) -> &Deftemplate {
        &self.0
    }
}

impl PartialEq for TemplateRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for TemplateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Template({}@{})",
            self.name.ord(),
            self.module.ord()
        )
    }
}

/// Keeps a template busy while alive.
#[derive(Debug)]
pub struct TemplatePin(TemplateRef);

impl Deref for TemplatePin {
    type Target = TemplateRef;

    fn deref(&self) -> &TemplateRef {
        &self.0
    }
}

impl Drop for TemplatePin {
    fn drop(&mut self) {
        let busy = &self.0.busy;
        busy.set(busy.get().saturating_sub(1));
    }
}

/// A fact asserted for some template.
pub struct Fact {
    pub index: u64,
    pub template: TemplateRef,
    /// One value per template slot.
    pub fields: Vec<Value>,
    garbage: Cell<bool>,
    busy: Cell<usize>,
}

impl Fact {
    /// Whether the fact has been retracted.
    pub fn is_garbage(&self) -> bool {
        self.garbage.get()
    }

    pub fn slot_value(&self, slot: Sym) -> Option<&Value> {
        self.template
            .slot_position(slot)
            .and_then(|pos| self.fields.get(pos))
    }
}

/// Shared handle to a [`Fact`], compared by identity.
#[derive(Clone)]
pub struct FactRef(Rc<Fact>);

impl FactRef {
    /// Keep the fact from being reclaimed until the returned guard is dropped.
    pub fn pin(&self) -> FactPin {
        self.busy.set(self.busy.get() + 1);
        FactPin(self.clone())
    }
}

impl Deref for FactRef {
    type Target = Fact;

    fn deref(&self) -> &Fact {
        &self.0
    }
}

impl PartialEq for FactRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for FactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Fact-{}>", self.index)
    }
}

/// Keeps a fact from being reclaimed while alive.
#[derive(Debug)]
pub struct FactPin(FactRef);

impl FactPin {
    pub fn fact(&self) -> &FactRef {
        &self.0
    }
}

impl Drop for FactPin {
    fn drop(&mut self) {
        let busy = &self.0.busy;
        busy.set(busy.get().saturating_sub(1));
    }
}

/// Iterator returned by [`Deftemplate::live_facts`].
pub struct LiveFacts {
    template: TemplateRef,
    cursor: usize,
}

impl Iterator for LiveFacts {
    type Item = FactRef;

    fn next(&mut self) -> Option<FactRef> {
        loop {
            let fact = self.template.facts.borrow().get(self.cursor).cloned()?;
            self.cursor += 1;
            if !fact.is_garbage() {
                return Some(fact);
            }
        }
    }
}

/// The templates of an environment and their facts.
#[derive(Debug, Default)]
pub struct FactBase {
    templates: Vec<TemplateRef>,
    next_index: u64,
}

impl FactBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a template, replacing an existing template of the same name in the same module.
    ///
    /// Replacing fails while the existing template is in use by a query or still has facts.
    pub fn define_template(
        &mut self,
        name: Sym,
        module: ModuleId,
        slots: Vec<SlotDef>,
        implied: bool,
    ) -> Result<TemplateRef, TemplateInUse> {
        let template = TemplateRef(Rc::new(Deftemplate {
            name,
            module,
            slots,
            implied,
            facts: RefCell::new(Vec::new()),
            busy: Cell::new(0),
        }));
        match self.position(module, name) {
            Some(pos) => {
                let old = &self.templates[pos];
                if old.is_busy() || old.live_count() > 0 {
                    return Err(TemplateInUse);
                }
                old.facts.borrow_mut().clear();
                self.templates[pos] = template.clone();
            }
            None => self.templates.push(template.clone()),
        }
        tracing::debug!(template = name.ord(), module = module.ord(), "defined template");
        Ok(template)
    }

    /// Remove a template. Fails while the template is in use or still has facts.
    pub fn undefine_template(&mut self, template: &TemplateRef) -> Result<(), TemplateInUse> {
        if template.is_busy() || template.live_count() > 0 {
            return Err(TemplateInUse);
        }
        template.facts.borrow_mut().clear();
        self.templates.retain(|t| t != template);
        Ok(())
    }

    /// Find a template by name in exactly the given module.
    pub fn find_in_module(&self, module: ModuleId, name: Sym) -> Option<TemplateRef> {
        self.position(module, name)
            .map(|pos| self.templates[pos].clone())
    }

    pub fn templates(&self) -> impl Iterator<Item = &TemplateRef> {
        self.templates.iter()
    }

    /// Assert a fact. Returns `None` when duplicates are disallowed and an identical live fact
    /// already exists.
    pub fn assert(
        &mut self,
        template: &TemplateRef,
        fields: Vec<Value>,
        allow_duplicates: bool,
    ) -> Option<FactRef> {
        if !allow_duplicates
            && Deftemplate::live_facts(template).any(|fact| fact.fields == fields)
        {
            tracing::trace!(template = template.name.ord(), "duplicate fact rejected");
            return None;
        }
        self.next_index += 1;
        let fact = FactRef(Rc::new(Fact {
            index: self.next_index,
            template: template.clone(),
            fields,
            garbage: Cell::new(false),
            busy: Cell::new(0),
        }));
        template.facts.borrow_mut().push(fact.clone());
        tracing::trace!(index = fact.index, "asserted fact");
        Some(fact)
    }

    /// Retract a fact. Returns `false` if it was already retracted.
    pub fn retract(&mut self, fact: &FactRef) -> bool {
        if fact.garbage.replace(true) {
            false
        } else {
            tracing::trace!(index = fact.index, "retracted fact");
            true
        }
    }

    /// Find a live fact by its index.
    pub fn fact_by_index(&self, index: u64) -> Option<FactRef> {
        self.templates
            .iter()
            .flat_map(Deftemplate::live_facts)
            .find(|fact| fact.index == index)
    }

    /// All live facts, ordered by index.
    pub fn all_facts(&self) -> Vec<FactRef> {
        let mut facts: Vec<FactRef> = self
            .templates
            .iter()
            .flat_map(Deftemplate::live_facts)
            .collect();
        facts.sort_by_key(|fact| fact.index);
        facts
    }

    /// Drop retracted facts from templates that are not in use, keeping facts that are pinned.
    pub fn collect_garbage(&mut self) {
        let mut collected = 0;
        for template in &self.templates {
            if template.is_busy() {
                continue;
            }
            let mut facts = template.facts.borrow_mut();
            let before = facts.len();
            facts.retain(|fact| !fact.is_garbage() || fact.busy.get() > 0);
            collected += before - facts.len();
        }
        if collected > 0 {
            tracing::trace!(collected, "collected retracted facts");
        }
    }

    fn position(&self, module: ModuleId, name: Sym) -> Option<usize> {
        self.templates
            .iter()
            .position(|t| t.module == module && t.name == name)
    }
}

impl Drop for FactBase {
    fn drop(&mut self) {
        // facts point back at their template
        for template in &self.templates {
            template.facts.borrow_mut().clear();
        }
    }
}
