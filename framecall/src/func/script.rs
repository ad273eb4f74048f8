//! Script functions, events and hooks.
//!
//! A [`BroFunc`] owns its bodies sorted by descending priority and runs them
//! one after the other in a fresh [`Frame`]. Arguments are bound to the first
//! slots of the frame before every body so that each handler starts from the
//! same state, even if a previous handler reassigned a parameter.
//!
//! When a body marks its frame as delayed, dispatch stops and the call
//! returns [`CallResult::Suspended`] with a [`Continuation`]. The
//! continuation carries a snapshot of the frame; resuming it re-runs the body
//! that was interrupted and then the remaining ones.

use super::{Body, CallResult, Flavor, Func, FuncId, FuncKind, FuncPtr, FuncType};
use crate::error::CallError;
use crate::frame::{Frame, FramePtr};
use crate::id::IdPtr;
use crate::runtime::{CallInfo, CallStack, Runtime};
use crate::stmt::{Flow, StmtPtr};
use crate::trigger::TriggerPtr;
use crate::value::{CloneState, Val, ValList};
use anyhow::Result;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use tracing::{debug, error, warn};

pub struct BroFunc {
    id: FuncId,
    name: String,
    ftype: FuncType,
    bodies: RefCell<Vec<Body>>,
    frame_size: Cell<usize>,
    /// Snapshot of the frame the function value was created in.
    closure: RefCell<Option<FramePtr>>,
    /// Identifiers resolved against `closure`.
    outer_ids: RefCell<Option<Rc<[IdPtr]>>>,
    argument_ids: RefCell<Option<Rc<[IdPtr]>>>,
}

impl BroFunc {
    /// Creates a function without bodies.
    ///
    /// The frame always has room for the parameters.
    pub fn new(id: FuncId, name: &str, ftype: FuncType, frame_size: usize) -> Self {
        let frame_size = frame_size.max(ftype.params.len());
        Self {
            id,
            name: name.to_string(),
            ftype,
            bodies: RefCell::default(),
            frame_size: Cell::new(frame_size),
            closure: RefCell::default(),
            outer_ids: RefCell::default(),
            argument_ids: RefCell::default(),
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size.get()
    }

    /// Captures a snapshot of `frame` as the function's closure.
    ///
    /// Only the outer identifiers are copied when they are already known.
    pub fn set_closure(&self, frame: &Frame) {
        let snapshot = self.snapshot(frame, &mut CloneState::new());
        *self.closure.borrow_mut() = Some(Rc::new(RefCell::new(snapshot)));
    }

    pub fn closure(&self) -> Option<FramePtr> {
        self.closure.borrow().clone()
    }

    pub fn set_outer_ids(&self, ids: Vec<IdPtr>) {
        *self.outer_ids.borrow_mut() = Some(ids.into());
    }

    pub fn outer_ids(&self) -> Option<Rc<[IdPtr]>> {
        self.outer_ids.borrow().clone()
    }

    pub fn set_argument_ids(&self, ids: Vec<IdPtr>) {
        *self.argument_ids.borrow_mut() = Some(ids.into());
    }

    pub fn argument_ids(&self) -> Option<Rc<[IdPtr]>> {
        self.argument_ids.borrow().clone()
    }

    /// Lays out the frame: parameters first, then every local introduced by
    /// a body, in body order.
    pub fn update_offsets(&self) {
        let mut next = 0;
        if let Some(ids) = self.argument_ids.borrow().as_deref() {
            for id in ids {
                id.set_offset(next);
                next += 1;
            }
        }
        next = next.max(self.ftype.params.len());

        for body in self.bodies.borrow().iter() {
            for id in body.inits.iter() {
                id.set_offset(next);
                next += 1;
            }
        }

        if next > self.frame_size.get() {
            debug!("{}: frame grows to {} slots", self.name, next);
            self.frame_size.set(next);
        }
    }

    fn snapshot(&self, frame: &Frame, state: &mut CloneState) -> Frame {
        match self.outer_ids.borrow().as_deref() {
            Some(ids) => frame.selective_clone_with(ids, state),
            None => frame.clone_with(state),
        }
    }

    fn new_frame(&self, args: &Rc<ValList>) -> Frame {
        let frame = Frame::new(self.frame_size(), Some(self.id), Some(Rc::clone(args)));
        match self.closure.borrow().as_ref() {
            Some(closure) => {
                let outer_ids = self.outer_ids.borrow();
                let outer_ids = outer_ids.as_deref().unwrap_or_default();
                Frame::with_closure(frame, Rc::clone(closure), outer_ids)
            }
            None => frame,
        }
    }

    /// Invokes a suspended call again, starting at body `start`.
    fn resume(
        self: Rc<Self>,
        frame: Frame,
        args: Rc<ValList>,
        start: usize,
        rt: &mut Runtime,
    ) -> Result<CallResult> {
        debug!("{}: resuming at body {}", self.name, start);
        let info = CallInfo::new(frame.call().cloned(), &*self, Rc::clone(&args));
        CallStack::with_call(rt, info, |rt| self.run(frame, &args, start, true, rt))
    }

    fn run(
        self: &Rc<Self>,
        frame: Frame,
        args: &Rc<ValList>,
        start: usize,
        resumed: bool,
        rt: &mut Runtime,
    ) -> Result<CallResult> {
        if rt.config.trace_calls {
            rt.trace_entry(&self.describe_debug(args));
        }
        let result = self.dispatch(frame, args, start, resumed, rt)?;
        if rt.config.trace_calls {
            match &result {
                CallResult::Completed(value) => rt.trace_exit(&self.name, value.as_ref()),
                CallResult::Suspended(_) => rt.trace_exit(&self.name, None),
            }
        }
        Ok(result)
    }

    fn dispatch(
        self: &Rc<Self>,
        mut frame: Frame,
        args: &Rc<ValList>,
        start: usize,
        resumed: bool,
        rt: &mut Runtime,
    ) -> Result<CallResult> {
        let flavor = self.flavor();
        let bodies = self.bodies();
        let mut result = None;
        let mut hook_broken = false;

        for (index, body) in bodies.iter().enumerate().skip(start) {
            // A resumed body continues with the bindings of the snapshot.
            bind_args(&mut frame, args, !(resumed && index == start));
            debug!(
                "{}: running body {} (priority {})",
                self.name, index, body.priority
            );

            let flow = match body.stmts.exec(&mut frame, rt) {
                Ok(flow) => flow,
                Err(e) if flavor == Flavor::Function => return Err(e),
                Err(e) => {
                    debug!("{}: skipping failed body {}: {:#}", self.name, index, e);
                    continue;
                }
            };

            if frame.has_delayed() {
                debug!("{}: body {} delayed", self.name, index);
                let continuation = Continuation::new(Rc::clone(self), &frame, Rc::clone(args), index);
                return Ok(CallResult::Suspended(continuation));
            }

            match (flavor, flow) {
                (Flavor::Hook, Flow::Break) => {
                    // Remaining handlers are skipped.
                    hook_broken = true;
                    break;
                }
                (Flavor::Hook | Flavor::Event, _) => {}
                (Flavor::Function, Flow::Return(value)) => result = value,
                (Flavor::Function, _) => {}
            }
        }

        match flavor {
            Flavor::Hook => Ok(CallResult::Completed(Some(Val::from_bool(!hook_broken)))),
            Flavor::Event => Ok(CallResult::Completed(None)),
            Flavor::Function => {
                if self.ftype.yields && result.is_none() {
                    warn!("{}: non-void function returning without a value", self.name);
                }
                Ok(CallResult::Completed(result))
            }
        }
    }
}

/// Binds `args` to the first slots of `frame`, optionally clearing the rest.
fn bind_args(frame: &mut Frame, args: &ValList, reset: bool) {
    for (offset, arg) in args.iter().enumerate() {
        // Only rebind slots a previous body reassigned.
        let bound = frame.nth_element(offset);
        if !bound.is_some_and(|v| Rc::ptr_eq(&v, arg)) {
            frame.set_nth_element(offset, Rc::clone(arg));
        }
    }
    if reset {
        frame.reset(args.len());
    }
}

impl Func for BroFunc {
    fn unique_id(&self) -> FuncId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> FuncKind {
        FuncKind::Script
    }

    fn ftype(&self) -> &FuncType {
        &self.ftype
    }

    /// Pure when it has bodies and all of them are.
    fn is_pure(&self) -> bool {
        let bodies = self.bodies.borrow();
        !bodies.is_empty() && bodies.iter().all(|body| body.stmts.is_pure())
    }

    fn call(
        self: Rc<Self>,
        args: &ValList,
        parent: Option<&mut Frame>,
        rt: &mut Runtime,
    ) -> Result<CallResult> {
        let expected = self.ftype.params.len();
        if args.len() != expected {
            let err = CallError::ArgCount {
                func: self.name.clone(),
                expected,
                got: args.len(),
            };
            error!("{}", err);
            return Err(err.into());
        }

        if let Some(result) = rt.intercept(&*self, args)? {
            return Ok(result);
        }

        if !self.has_bodies() {
            return match self.flavor() {
                Flavor::Hook => Ok(CallResult::Completed(Some(Val::from_bool(true)))),
                Flavor::Event => Ok(CallResult::Completed(None)),
                Flavor::Function => {
                    let err = CallError::NoBody {
                        func: self.name.clone(),
                    };
                    error!("{}", err);
                    Err(err.into())
                }
            };
        }

        let args = Rc::new(args.clone());
        let mut frame = self.new_frame(&args);
        let call = parent.as_deref().and_then(|p| p.call().cloned());
        if let Some(parent) = parent.as_deref() {
            frame.inherit_trigger(parent);
        }
        if let Some(call) = &call {
            frame.set_call(Rc::clone(call));
        }

        let info = CallInfo::new(call, &*self, Rc::clone(&args));
        let result = CallStack::with_call(rt, info, |rt| self.run(frame, &args, 0, false, rt))?;

        if result.is_suspended()
            && let Some(parent) = parent
        {
            parent.set_delayed();
        }
        Ok(result)
    }

    fn add_body(&self, stmts: StmtPtr, inits: Vec<IdPtr>, frame_size: usize, priority: i32) {
        if frame_size > self.frame_size.get() {
            self.frame_size.set(frame_size);
        }

        let mut bodies = self.bodies.borrow_mut();
        if self.ftype.flavor == Flavor::Function {
            // A function has a single body; a redefinition replaces it.
            bodies.clear();
        }
        bodies.push(Body {
            stmts,
            priority,
            inits: inits.into(),
        });
        bodies.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    fn bodies(&self) -> Vec<Body> {
        self.bodies.borrow().clone()
    }

    fn clone_with(self: Rc<Self>, state: &mut CloneState) -> FuncPtr {
        if let Some(copy) = state.cloned_func(&self) {
            return copy;
        }

        let copy = Rc::new(BroFunc {
            id: self.id,
            name: self.name.clone(),
            ftype: self.ftype.clone(),
            bodies: RefCell::new(self.bodies()),
            frame_size: Cell::new(self.frame_size()),
            closure: RefCell::default(),
            outer_ids: RefCell::new(self.outer_ids()),
            argument_ids: RefCell::new(self.argument_ids()),
        });
        let erased: FuncPtr = copy.clone();
        state.record_func(&self, erased);

        // Recorded first: the closure may hold this very function.
        if let Some(closure) = self.closure() {
            let snapshot = self.snapshot(&closure.borrow(), state);
            *copy.closure.borrow_mut() = Some(Rc::new(RefCell::new(snapshot)));
        }
        copy
    }

    fn as_script(&self) -> Option<&BroFunc> {
        Some(self)
    }
}

impl fmt::Debug for BroFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroFunc")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("flavor", &self.ftype.flavor)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for BroFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.ftype.params.join(", "))
    }
}

/// A suspended invocation of a script function.
///
/// Holds a snapshot of the invocation frame taken when a body delayed. If
/// the trigger was set on that frame, only the bindings it asks for are
/// kept. A frame that merely inherited the trigger from its caller has a
/// different layout, so it is copied whole.
#[derive(Debug)]
pub struct Continuation {
    func: Rc<BroFunc>,
    frame: Frame,
    args: Rc<ValList>,
    body: usize,
}

impl Continuation {
    fn new(func: Rc<BroFunc>, frame: &Frame, args: Rc<ValList>, body: usize) -> Self {
        let frame = match frame.trigger() {
            Some(trigger) if frame.owns_trigger() => {
                frame.selective_clone(&trigger.needed_ids())
            }
            _ => frame.clone_frame(),
        };
        Self {
            func,
            frame,
            args,
            body,
        }
    }

    pub fn func(&self) -> &Rc<BroFunc> {
        &self.func
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn frame_mut(&mut self) -> &mut Frame {
        &mut self.frame
    }

    pub fn trigger(&self) -> Option<&TriggerPtr> {
        self.frame.trigger()
    }

    /// Index of the body that was interrupted.
    pub fn body_index(&self) -> usize {
        self.body
    }

    /// Re-enters dispatch with the snapshot frame.
    pub fn resume(self, rt: &mut Runtime) -> Result<CallResult> {
        let Continuation {
            func,
            frame,
            args,
            body,
        } = self;
        func.resume(frame, args, body, rt)
    }
}
