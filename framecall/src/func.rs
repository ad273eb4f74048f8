//! Functions and their dispatch.
//!
//! A function is either a script function ([`BroFunc`]) with one or more
//! bodies, or a built-in ([`BuiltinFunc`]) backed by a native callback. Both
//! share the calling convention of [`Func::call`], so a call site never needs
//! to know which one it is invoking.
//!
//! Script functions come in three flavors. A plain function has a single body
//! whose result is the call result. Events and hooks accumulate one body per
//! handler, run in descending priority order.

pub mod builtin;
pub mod script;

pub use builtin::{BuiltinFn, BuiltinFunc};
pub use script::{BroFunc, Continuation};

use crate::frame::Frame;
use crate::id::IdPtr;
use crate::runtime::Runtime;
use crate::stmt::StmtPtr;
use crate::value::{CloneState, ValList, ValPtr};
use anyhow::Result;
use std::fmt;
use std::rc::Rc;

/// Shared handle to a function.
pub type FuncPtr = Rc<dyn Func>;

/// Process-unique function identifier, assigned by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub u32);

impl fmt::Display for FuncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuncKind {
    Script,
    Builtin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    Function,
    Event,
    Hook,
}

/// Static signature of a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncType {
    pub flavor: Flavor,
    /// Parameter names, in order.
    pub params: Vec<String>,
    /// Whether the function produces a value.
    pub yields: bool,
}

impl FuncType {
    pub fn new(flavor: Flavor, params: &[&str], yields: bool) -> Self {
        Self {
            flavor,
            params: params.iter().map(|p| p.to_string()).collect(),
            yields,
        }
    }

    pub fn function(params: &[&str], yields: bool) -> Self {
        Self::new(Flavor::Function, params, yields)
    }

    pub fn event(params: &[&str]) -> Self {
        Self::new(Flavor::Event, params, false)
    }

    pub fn hook(params: &[&str]) -> Self {
        Self::new(Flavor::Hook, params, false)
    }
}

/// One body of a script function, i.e. one handler of an event or hook.
#[derive(Debug, Clone)]
pub struct Body {
    pub stmts: StmtPtr,
    pub priority: i32,
    /// Locals the body introduces.
    pub inits: Rc<[IdPtr]>,
}

/// Outcome of a call.
#[derive(Debug)]
pub enum CallResult {
    /// The call ran to completion, with or without a value.
    Completed(Option<ValPtr>),
    /// Evaluation was suspended pending a trigger.
    Suspended(Continuation),
}

impl CallResult {
    /// Value of a completed call. A suspended call has no value yet.
    pub fn value(self) -> Option<ValPtr> {
        match self {
            CallResult::Completed(value) => value,
            CallResult::Suspended(_) => None,
        }
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, CallResult::Suspended(_))
    }
}

pub trait Func: fmt::Debug + fmt::Display {
    fn unique_id(&self) -> FuncId;

    fn name(&self) -> &str;

    fn kind(&self) -> FuncKind;

    fn ftype(&self) -> &FuncType;

    fn flavor(&self) -> Flavor {
        self.ftype().flavor
    }

    /// Whether calls with equal arguments can be treated as side-effect free.
    fn is_pure(&self) -> bool;

    /// Invokes the function.
    ///
    /// # Arguments
    /// * `args` - Argument values, in parameter order
    /// * `parent` - Frame of the caller, if the call comes from script code
    /// * `rt` - Runtime state the call is recorded in
    ///
    /// # Returns
    /// * `Ok(CallResult)` - The call completed or was suspended
    /// * `Err(anyhow::Error)` - A script-level error unwound the call
    fn call(
        self: Rc<Self>,
        args: &ValList,
        parent: Option<&mut Frame>,
        rt: &mut Runtime,
    ) -> Result<CallResult>;

    /// Adds a body (an event or hook handler, or a function's definition).
    fn add_body(&self, stmts: StmtPtr, inits: Vec<IdPtr>, frame_size: usize, priority: i32);

    /// Bodies in execution order.
    fn bodies(&self) -> Vec<Body>;

    fn has_bodies(&self) -> bool {
        !self.bodies().is_empty()
    }

    /// Produces the function to store in a copied function value.
    fn do_clone(self: Rc<Self>) -> FuncPtr {
        self.clone_with(&mut CloneState::new())
    }

    /// Like [`Func::do_clone`], within a larger clone operation. A function
    /// reached more than once, e.g. through its own closure, is copied once.
    fn clone_with(self: Rc<Self>, state: &mut CloneState) -> FuncPtr;

    /// Script functions expose their internals, e.g. for serialization.
    fn as_script(&self) -> Option<&BroFunc> {
        None
    }

    /// Renders a call as `name(param = arg, ...)`.
    fn describe_debug(&self, args: &[ValPtr]) -> String {
        let params = &self.ftype().params;
        let mut desc = format!("{}(", self.name());
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                desc.push_str(", ");
            }
            match params.get(i) {
                Some(param) => desc.push_str(param),
                None => desc.push_str(&format!("vararg{}", i - params.len())),
            }
            desc.push_str(&format!(" = {arg}"));
        }
        desc.push(')');
        desc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Val;

    #[test]
    fn test_describe_debug() {
        let mut rt = Runtime::new();
        let f = rt.register(|id| {
            BuiltinFunc::new(id, "fmt", FuncType::function(&["s"], true), |_, _| Ok(None), false)
        });

        let args = [Val::from_string("%s-%s"), Val::from_int(1), Val::from_int(2)];
        assert_eq!(
            f.describe_debug(&args),
            "fmt(s = %s-%s, vararg0 = 1, vararg1 = 2)"
        );
        assert_eq!(f.describe_debug(&[]), "fmt()");
    }

    #[test]
    fn test_call_result_value() {
        let done = CallResult::Completed(Some(Val::from_bool(true)));
        assert!(!done.is_suspended());
        assert_eq!(done.value().unwrap().as_bool(), Some(true));
        assert!(CallResult::Completed(None).value().is_none());
    }
}
