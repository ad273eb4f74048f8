//! Built-in functions backed by native callbacks.

use super::{Body, CallResult, Func, FuncId, FuncKind, FuncPtr, FuncType};
use crate::error::CallError;
use crate::frame::Frame;
use crate::id::IdPtr;
use crate::runtime::{CallInfo, CallStack, Runtime};
use crate::stmt::StmtPtr;
use crate::value::{CloneState, ValList, ValPtr};
use anyhow::Result;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, error};

/// Native implementation of a built-in.
///
/// The callback receives the caller's frame, which an asynchronous built-in
/// marks as delayed (attaching its trigger) when the result isn't available
/// yet.
pub type BuiltinFn = fn(Option<&mut Frame>, &ValList) -> Result<Option<ValPtr>>;

pub struct BuiltinFunc {
    id: FuncId,
    name: String,
    ftype: FuncType,
    func: BuiltinFn,
    is_pure: bool,
}

impl BuiltinFunc {
    pub fn new(id: FuncId, name: &str, ftype: FuncType, func: BuiltinFn, is_pure: bool) -> Self {
        Self {
            id,
            name: name.to_string(),
            ftype,
            func,
            is_pure,
        }
    }

    pub fn the_func(&self) -> BuiltinFn {
        self.func
    }
}

impl Func for BuiltinFunc {
    fn unique_id(&self) -> FuncId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> FuncKind {
        FuncKind::Builtin
    }

    fn ftype(&self) -> &FuncType {
        &self.ftype
    }

    fn is_pure(&self) -> bool {
        self.is_pure
    }

    fn call(
        self: Rc<Self>,
        args: &ValList,
        mut parent: Option<&mut Frame>,
        rt: &mut Runtime,
    ) -> Result<CallResult> {
        if let Some(result) = rt.intercept(&*self, args)? {
            return Ok(result);
        }

        let call = parent.as_deref().and_then(|p| p.call().cloned());
        let info = CallInfo::new(call, &*self, Rc::new(args.clone()));

        CallStack::with_call(rt, info, |rt| {
            if rt.config.trace_calls {
                rt.trace_entry(&self.describe_debug(args));
            }
            debug!("Calling built-in {}", self.name);

            let result = (self.func)(parent.as_deref_mut(), args).map_err(|e| {
                error!("{}: {:#}", self.name, e);
                e.context(CallError::Builtin {
                    func: self.name.clone(),
                })
            })?;

            if rt.config.trace_calls {
                rt.trace_exit(&self.name, result.as_ref());
            }
            Ok(CallResult::Completed(result))
        })
    }

    fn add_body(&self, _stmts: StmtPtr, _inits: Vec<IdPtr>, _frame_size: usize, _priority: i32) {
        panic!("add_body called on built-in function '{}'", self.name);
    }

    fn bodies(&self) -> Vec<Body> {
        Vec::new()
    }

    fn clone_with(self: Rc<Self>, _state: &mut CloneState) -> FuncPtr {
        // Built-ins carry no per-value state.
        self
    }
}

impl fmt::Debug for BuiltinFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinFunc")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("is_pure", &self.is_pure)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for BuiltinFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}()", self.name)
    }
}
