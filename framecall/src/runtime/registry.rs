//! Unique function ids.

use crate::func::{Func, FuncId, FuncPtr};
use std::rc::{Rc, Weak};
use tracing::debug;

/// Assigns every function a process-unique id and resolves ids back to the
/// function while it is alive.
///
/// The registry does not keep functions alive; frames refer to their function
/// by id only.
#[derive(Debug, Default)]
pub struct FuncRegistry {
    funcs: Vec<Weak<dyn Func>>,
}

impl FuncRegistry {
    /// Builds a function with the next free id and records it.
    pub fn register<F, B>(&mut self, build: B) -> Rc<F>
    where
        F: Func + 'static,
        B: FnOnce(FuncId) -> F,
    {
        let id = FuncId(self.funcs.len() as u32);
        let func = Rc::new(build(id));
        assert_eq!(func.unique_id(), id, "Function must keep its assigned id");

        debug!("Registered {} as {}", func.name(), id);
        let weak: Weak<F> = Rc::downgrade(&func);
        self.funcs.push(weak);
        func
    }

    pub fn lookup(&self, id: FuncId) -> Option<FuncPtr> {
        self.funcs.get(id.0 as usize)?.upgrade()
    }

    /// Live function called `name`. The most recently registered one wins.
    pub fn lookup_by_name(&self, name: &str) -> Option<FuncPtr> {
        self.funcs
            .iter()
            .rev()
            .filter_map(Weak::upgrade)
            .find(|func| func.name() == name)
    }

    /// Number of ids handed out so far.
    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::func::{BroFunc, BuiltinFunc, FuncType};

    #[test]
    fn test_ids_are_unique() {
        let mut registry = FuncRegistry::default();
        let a = registry.register(|id| BroFunc::new(id, "a", FuncType::event(&[]), 0));
        let b = registry.register(|id| BroFunc::new(id, "b", FuncType::event(&[]), 0));

        assert_ne!(a.unique_id(), b.unique_id());
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.lookup(b.unique_id()).unwrap().name(), "b");
        assert!(registry.lookup(FuncId(7)).is_none());
    }

    #[test]
    fn test_lookup_does_not_keep_alive() {
        let mut registry = FuncRegistry::default();
        let f = registry.register(|id| {
            BuiltinFunc::new(id, "strlen", FuncType::function(&["s"], true), |_, _| Ok(None), true)
        });
        let id = f.unique_id();
        assert!(registry.lookup_by_name("strlen").is_some());

        drop(f);
        assert!(registry.lookup(id).is_none());
        assert!(registry.lookup_by_name("strlen").is_none());
        // Ids are never reused.
        assert_eq!(registry.len(), 1);
    }
}
