//! # Module namespaces
//!
//! Templates live in modules. A module sees its own templates plus the templates exported by the
//! modules it imports; a reference that is visible from more than one module is ambiguous.

use crate::ast::Sym;

/// Index of a module in the [`ModuleTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleId(usize);

impl ModuleId {
    /// The `MAIN` module, which always exists.
    pub const MAIN: ModuleId = ModuleId(0);

    #[inline(always)]
    pub fn ord(self) -> usize {
        self.0
    }
}

/// Which templates a module makes available to importers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Exports {
    #[default]
    None,
    All,
    Named(Vec<Sym>),
}

impl Exports {
    pub fn exports(&self, template: Sym) -> bool {
        match self {
            Exports::None => false,
            Exports::All => true,
            Exports::Named(names) => names.contains(&template),
        }
    }

    /// Merge another export specification into this one.
    pub fn extend(&mut self, other: Exports) {
        *self = match (std::mem::take(self), other) {
            (Exports::All, _) | (_, Exports::All) => Exports::All,
            (Exports::None, other) | (other, Exports::None) => other,
            (Exports::Named(mut a), Exports::Named(b)) => {
                a.extend(b.into_iter());
                Exports::Named(a)
            }
        };
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defmodule {
    pub name: Sym,
    pub exports: Exports,
    /// Modules this one imports templates from, together with which of their templates are
    /// imported.
    pub imports: Vec<(ModuleId, Exports)>,
}

/// All modules defined in an environment, plus the current module.
#[derive(Debug)]
pub struct ModuleTable {
    modules: Vec<Defmodule>,
    current: ModuleId,
}

impl ModuleTable {
    pub fn new(main: Sym) -> Self {
        Self {
            modules: vec![Defmodule {
                name: main,
                exports: Exports::None,
                imports: vec![],
            }],
            current: ModuleId::MAIN,
        }
    }

    /// Define a module, or redefine an existing one, and make it the current module.
    pub fn define(&mut self, module: Defmodule) -> ModuleId {
        let id = match self.find(module.name) {
            Some(id) => {
                self.modules[id.0] = module;
                id
            }
            None => {
                self.modules.push(module);
                ModuleId(self.modules.len() - 1)
            }
        };
        self.current = id;
        id
    }

    pub fn find(&self, name: Sym) -> Option<ModuleId> {
        self.modules
            .iter()
            .position(|m| m.name == name)
            .map(ModuleId)
    }

    pub fn get(&self, id: ModuleId) -> &Defmodule {
        &self.modules[id.0]
    }

    pub fn current(&self) -> ModuleId {
        self.current
    }

    pub fn set_current(&mut self, id: ModuleId) {
        self.current = id;
    }

    /// The modules in which a template named `name` would be visible from `from`, starting with
    /// `from` itself.
    pub fn search_path(&self, from: ModuleId, name: Sym) -> Vec<ModuleId> {
        let mut path = vec![from];
        for (imported, which) in &self.get(from).imports {
            if which.exports(name) && self.get(*imported).exports.exports(name) {
                if !path.contains(imported) {
                    path.push(*imported);
                }
            }
        }
        path
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn search_path_respects_exports() {
        let main = Sym::from_ord(10);
        let a = Sym::from_ord(11);
        let b = Sym::from_ord(12);
        let c = Sym::from_ord(13);
        let foo = Sym::from_ord(20);

        let mut modules = ModuleTable::new(main);
        let a_id = modules.define(Defmodule {
            name: a,
            exports: Exports::All,
            imports: vec![],
        });
        let b_id = modules.define(Defmodule {
            name: b,
            exports: Exports::None,
            imports: vec![],
        });
        let c_id = modules.define(Defmodule {
            name: c,
            exports: Exports::None,
            imports: vec![(a_id, Exports::All), (b_id, Exports::All)],
        });

        assert_eq!(modules.current(), c_id);
        // b does not export anything
        assert_eq!(modules.search_path(c_id, foo), vec![c_id, a_id]);
        assert_eq!(modules.search_path(a_id, foo), vec![a_id]);
    }

    #[test]
    fn exports_merge() {
        let x = Sym::from_ord(5);
        let y = Sym::from_ord(6);
        let mut exports = Exports::None;
        exports.extend(Exports::Named(vec![x]));
        assert!(exports.exports(x));
        assert!(!exports.exports(y));
        exports.extend(Exports::All);
        assert!(exports.exports(y));
    }
}
