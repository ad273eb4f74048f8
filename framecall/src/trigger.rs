//! Suspension tokens.
//!
//! A trigger stands for a condition that an external subsystem is waiting
//! on. Frames only hold a reference to it; the subsystem that created the
//! trigger decides which bindings a resumed evaluation needs and caches the
//! results of calls that completed asynchronously.

use crate::id::{CallSite, IdPtr};
use crate::value::ValPtr;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Shared handle to a trigger.
pub type TriggerPtr = Rc<dyn Trigger>;

pub trait Trigger: fmt::Debug {
    /// Human readable name used in logs.
    fn name(&self) -> &str;

    /// Identifiers whose bindings must survive into the resumed evaluation.
    fn needed_ids(&self) -> Vec<IdPtr>;

    /// Result of a delayed call made from `call`, once it is available.
    fn lookup(&self, call: &CallSite) -> Option<ValPtr>;
}

/// Trigger that keeps delayed-call results in a table keyed by call site.
#[derive(Debug, Default)]
pub struct CachedTrigger {
    name: String,
    needed: Vec<IdPtr>,
    cache: RefCell<HashMap<u64, ValPtr>>,
}

impl CachedTrigger {
    pub fn new(name: &str, needed: Vec<IdPtr>) -> Rc<Self> {
        Rc::new(Self {
            name: name.to_string(),
            needed,
            cache: RefCell::default(),
        })
    }

    /// Records the result of the call made from `call`.
    pub fn cache(&self, call: &CallSite, value: ValPtr) {
        self.cache.borrow_mut().insert(call.serial(), value);
    }

    /// Whether any result has been delivered yet.
    pub fn is_ready(&self) -> bool {
        !self.cache.borrow().is_empty()
    }
}

impl Trigger for CachedTrigger {
    fn name(&self) -> &str {
        &self.name
    }

    fn needed_ids(&self) -> Vec<IdPtr> {
        self.needed.clone()
    }

    fn lookup(&self, call: &CallSite) -> Option<ValPtr> {
        self.cache.borrow().get(&call.serial()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::Id;
    use crate::value::Val;

    #[test]
    fn test_cached_lookup() {
        let call = CallSite::new(7, None, "lookup_addr(1.2.3.4)");
        let other = CallSite::new(8, None, "lookup_addr(5.6.7.8)");
        let trigger = CachedTrigger::new("when-1", vec![Id::new("x", 0)]);

        assert!(!trigger.is_ready());
        assert!(trigger.lookup(&call).is_none());

        trigger.cache(&call, Val::from_string("example.com"));
        assert!(trigger.is_ready());
        assert_eq!(trigger.lookup(&call).unwrap().as_str(), Some("example.com"));
        assert!(trigger.lookup(&other).is_none());
        assert_eq!(trigger.needed_ids()[0].name(), "x");
    }
}
