//! Process-scoped interpreter state.
//!
//! Everything the dispatch code would otherwise keep in globals lives in a
//! [`Runtime`] that is passed explicitly into every call: the call stack, the
//! registry of function ids, the configuration and an optional call
//! interceptor.

mod call_stack;
mod interceptor;
mod registry;

pub use call_stack::{CallInfo, CallStack};
pub use interceptor::{CallInterceptor, Interception};
pub use registry::FuncRegistry;

use crate::error::CallError;
use crate::frame::Frame;
use crate::func::{CallResult, Func, FuncId, FuncPtr};
use crate::id::CallSite;
use crate::value::{Val, ValList, ValPtr};
use anyhow::Result;
use std::rc::Rc;
use tracing::{debug, error, info};

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Log every call and its result, indented by call depth.
    pub trace_calls: bool,
    /// Calls nested deeper than this fail with [`CallError::DepthExceeded`].
    pub max_call_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            trace_calls: false,
            max_call_depth: 1024,
        }
    }
}

#[derive(Debug, Default)]
pub struct Runtime {
    pub config: RuntimeConfig,
    call_stack: CallStack,
    registry: FuncRegistry,
    interceptor: Option<Rc<dyn CallInterceptor>>,
}

impl Runtime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Creates a function with a fresh unique id. See [`FuncRegistry::register`].
    pub fn register<F, B>(&mut self, build: B) -> Rc<F>
    where
        F: Func + 'static,
        B: FnOnce(FuncId) -> F,
    {
        self.registry.register(build)
    }

    pub fn call_stack(&self) -> &CallStack {
        &self.call_stack
    }

    pub fn registry(&self) -> &FuncRegistry {
        &self.registry
    }

    /// Installs `interceptor`, replacing the previous one. `None` removes it.
    pub fn set_interceptor(&mut self, interceptor: Option<Rc<dyn CallInterceptor>>) {
        self.interceptor = interceptor;
    }

    /// Offers a call of `func` to the interceptor. Returns the result if the
    /// interceptor answered it.
    pub(crate) fn intercept(&self, func: &dyn Func, args: &ValList) -> Result<Option<CallResult>> {
        let Some(handler) = &self.interceptor else {
            return Ok(None);
        };
        match handler.intercept(func, args) {
            Interception::Pass => Ok(None),
            Interception::Handled(result) => {
                debug!("{}: call answered by interceptor", func.name());
                let result = interceptor::check_result(func, result)?;
                Ok(Some(CallResult::Completed(result)))
            }
        }
    }

    /// Function a frame belongs to.
    pub fn frame_function(&self, frame: &Frame) -> Option<FuncPtr> {
        frame.function().and_then(|id| self.registry.lookup(id))
    }

    /// Evaluates the call expression `call`, made from `frame`.
    ///
    /// If `frame` is waiting on a trigger that already produced the result of
    /// this call, that result is used and `func` is not invoked again.
    /// Otherwise `frame` records `call` as its current call site while the
    /// callee runs.
    pub fn invoke(
        &mut self,
        call: &Rc<CallSite>,
        func: FuncPtr,
        args: &ValList,
        frame: Option<&mut Frame>,
    ) -> Result<CallResult> {
        let Some(frame) = frame else {
            return func.call(args, None, self);
        };

        if let Some(trigger) = frame.trigger()
            && let Some(value) = trigger.lookup(call)
        {
            debug!("{}: using result cached by {}", call, trigger.name());
            return Ok(CallResult::Completed(Some(value)));
        }

        let saved = frame.replace_call(Some(Rc::clone(call)));
        let result = func.call(args, Some(&mut *frame), self);
        frame.replace_call(saved);
        result
    }

    /// Like [`Runtime::invoke`], for a callee that is only known as a value.
    pub fn invoke_value(
        &mut self,
        call: &Rc<CallSite>,
        callee: &Val,
        args: &ValList,
        frame: Option<&mut Frame>,
    ) -> Result<CallResult> {
        match callee.as_func() {
            Some(func) => self.invoke(call, Rc::clone(func), args, frame),
            None => {
                let err = CallError::NotAFunction {
                    target: callee.to_string(),
                };
                error!("{}: {}", call, err);
                Err(err.into())
            }
        }
    }

    pub(crate) fn trace_entry(&self, desc: &str) {
        let indent = self.trace_indent();
        info!("{:indent$}| {}", "", desc);
    }

    pub(crate) fn trace_exit(&self, name: &str, value: Option<&ValPtr>) {
        let indent = self.trace_indent();
        match value {
            Some(value) => info!("{:indent$}| {} = {}", "", name, value),
            None => info!("{:indent$}| {} done", "", name),
        }
    }

    fn trace_indent(&self) -> usize {
        self.call_stack.depth().saturating_sub(1) * 2
    }
}
