//! The stack of active calls, used for backtraces.

use super::Runtime;
use crate::error::CallError;
use crate::func::{Func, FuncId};
use crate::id::CallSite;
use crate::value::ValList;
use anyhow::Result;
use std::fmt;
use std::rc::Rc;
use tracing::error;

/// One active call.
#[derive(Debug, Clone)]
pub struct CallInfo {
    /// Call expression, if the call came from script code.
    pub call: Option<Rc<CallSite>>,
    pub func: FuncId,
    pub name: String,
    pub args: Rc<ValList>,
}

impl CallInfo {
    pub fn new(call: Option<Rc<CallSite>>, func: &dyn Func, args: Rc<ValList>) -> Self {
        Self {
            call,
            func: func.unique_id(),
            name: func.name().to_string(),
            args,
        }
    }
}

#[derive(Debug, Default)]
pub struct CallStack {
    entries: Vec<CallInfo>,
}

impl CallStack {
    /// Runs `func` with `info` pushed on the call stack of `rt`.
    ///
    /// The entry is popped on every return path, including errors, so the
    /// stack depth after the call is always the depth before it.
    pub fn with_call<F, R>(rt: &mut Runtime, info: CallInfo, func: F) -> Result<R>
    where
        F: FnOnce(&mut Runtime) -> Result<R>,
    {
        let limit = rt.config.max_call_depth;
        let depth = rt.call_stack.depth();
        if depth >= limit {
            let err = CallError::DepthExceeded {
                func: info.name,
                limit,
            };
            error!("{}", err);
            return Err(err.into());
        }

        let id = info.func;
        rt.call_stack.entries.push(info);

        let result = func(rt);

        let top = rt.call_stack.entries.pop();
        assert!(
            rt.call_stack.depth() == depth && top.is_some_and(|top| top.func == id),
            "Unexpected call stack entry"
        );
        result
    }

    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Active calls, innermost first.
    pub fn iter(&self) -> impl Iterator<Item = &CallInfo> {
        self.entries.iter().rev()
    }

    /// Innermost active call.
    pub fn current(&self) -> Option<&CallInfo> {
        self.entries.last()
    }

    /// Renders the stack as `| #0 f(1) at file.zeek:3 | #1 g() |`.
    pub fn render(&self) -> String {
        if self.entries.is_empty() {
            return String::new();
        }
        self.iter()
            .enumerate()
            .fold(String::from("|"), |out, (level, info)| {
                format!("{out} #{level} {info} |")
            })
    }
}

impl fmt::Display for CallInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str(")")?;
        match self.call.as_ref().and_then(|c| c.location()) {
            Some(location) => write!(f, " at {location}"),
            None => Ok(()),
        }
    }
}
