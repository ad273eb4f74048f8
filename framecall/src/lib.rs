//! Framecall Library
//!
//! Call frames, closures and function dispatch for an event-driven scripting
//! runtime.
//!
//! The library covers what happens between a call expression and the
//! statements of the callee: allocating the invocation [`Frame`], binding
//! arguments, running the bodies of script functions, events and hooks in
//! priority order, capturing closures, keeping the call stack, and suspending
//! an evaluation that has to wait on an external [`Trigger`].
//!
//! Parsing, type checking and the statement language itself are left to the
//! embedder, which supplies bodies through the [`Stmt`] trait.
//!
//! # Example
//!
//! ```
//! use framecall::{BroFunc, Flow, Func, FuncType, NativeStmt, Runtime, Val};
//! use std::rc::Rc;
//!
//! let mut rt = Runtime::new();
//! let log = Val::empty_vector();
//! let event = rt.register(|id| BroFunc::new(id, "zeek_init", FuncType::event(&[]), 0));
//! for (label, priority) in [("late", -5), ("early", 5)] {
//!     let log = Rc::clone(&log);
//!     let body = NativeStmt::new(label, move |_, _| {
//!         log.push(Val::from_string(label));
//!         Ok(Flow::Next)
//!     });
//!     event.add_body(body, vec![], 0, priority);
//! }
//!
//! event.call(&Default::default(), None, &mut rt).unwrap();
//! assert_eq!(log.to_string(), "[early, late]");
//! ```

pub mod error;
pub mod frame;
pub mod func;
pub mod id;
pub mod runtime;
pub mod serial;
pub mod stmt;
pub mod trigger;
pub mod value;

pub use error::CallError;
pub use frame::{Frame, FramePtr};
pub use func::{
    Body, BroFunc, BuiltinFn, BuiltinFunc, CallResult, Continuation, Flavor, Func, FuncId,
    FuncKind, FuncPtr, FuncType,
};
pub use id::{CallSite, Id, IdPtr, Location};
pub use runtime::{
    CallInfo, CallInterceptor, CallStack, FuncRegistry, Interception, Runtime, RuntimeConfig,
};
pub use stmt::{Flow, NativeStmt, Stmt, StmtList, StmtPtr};
pub use trigger::{CachedTrigger, Trigger, TriggerPtr};
pub use value::{CloneState, Val, ValList, ValPtr};
