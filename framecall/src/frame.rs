//! Function invocation frames.
//!
//! A frame holds the local variable slots of one function invocation. Slots
//! are addressed by the offsets the script compiler assigned to each
//! identifier, and the number of slots is fixed when the frame is created.
//!
//! A frame owns the values in its slots: storing a value takes over one
//! reference, overwriting or resetting a slot releases it, and dropping the
//! frame releases whatever is left.
//!
//! A frame may also capture another frame (see [`Frame::with_closure`]).
//! Lookups of the captured names go to the captured frame; everything else
//! stays local.

mod closure;

use crate::func::FuncId;
use crate::id::{CallSite, Id, IdPtr};
use crate::stmt::StmtPtr;
use crate::trigger::TriggerPtr;
use crate::value::{CloneState, ValList, ValPtr};
use closure::Capture;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Frame shared between several owners, such as a function's captured
/// environment referenced by every invocation of that function.
pub type FramePtr = Rc<RefCell<Frame>>;

#[derive(Debug)]
pub struct Frame {
    slots: Box<[Option<ValPtr>]>,
    /// Function executing in this frame. Resolved through the runtime registry.
    function: Option<FuncId>,
    func_args: Option<Rc<ValList>>,
    next_stmt: Option<StmtPtr>,
    break_before_next_stmt: bool,
    break_on_return: bool,
    trigger: Option<TriggerPtr>,
    /// The trigger was passed down by the caller rather than set on this frame.
    trigger_inherited: bool,
    call: Option<Rc<CallSite>>,
    delayed: bool,
    capture: Option<Capture>,
}

impl Frame {
    /// Creates a frame with `size` empty slots.
    pub fn new(size: usize, function: Option<FuncId>, func_args: Option<Rc<ValList>>) -> Self {
        Self {
            slots: vec![None; size].into_boxed_slice(),
            function,
            func_args,
            next_stmt: None,
            break_before_next_stmt: false,
            break_on_return: false,
            trigger: None,
            trigger_inherited: false,
            call: None,
            delayed: false,
            capture: None,
        }
    }

    /// Number of local slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn check_offset(&self, offset: usize) {
        // Offsets come from the compiler, so a bad one is a compiler bug.
        assert!(
            offset < self.slots.len(),
            "Frame offset {} out of range (frame size {})",
            offset,
            self.slots.len()
        );
    }

    /// Returns the local slot at `offset`.
    pub fn nth_element(&self, offset: usize) -> Option<ValPtr> {
        self.check_offset(offset);
        self.slots[offset].clone()
    }

    /// Stores `value` in the local slot at `offset`, releasing the previous one.
    pub fn set_nth_element(&mut self, offset: usize, value: ValPtr) {
        self.check_offset(offset);
        self.slots[offset] = Some(value);
    }

    /// Empties the local slot at `offset`.
    pub fn clear_nth_element(&mut self, offset: usize) {
        self.check_offset(offset);
        self.slots[offset] = None;
    }

    /// Captured frame that resolves `id`, if the name is captured.
    fn captured_by(&self, id: &Id) -> Option<&FramePtr> {
        self.capture
            .as_ref()
            .filter(|c| c.captures(id))
            .map(|c| c.frame())
    }

    /// Returns the value bound to `id`.
    pub fn get_element(&self, id: &Id) -> Option<ValPtr> {
        match self.captured_by(id) {
            Some(outer) => outer.borrow().get_element(id),
            None => self.nth_element(id.offset()),
        }
    }

    /// Binds `value` to `id`, releasing the previous binding.
    pub fn set_element(&mut self, id: &Id, value: ValPtr) {
        if let Some(outer) = self.captured_by(id) {
            outer.borrow_mut().set_element(id, value);
            return;
        }
        self.set_nth_element(id.offset(), value);
    }

    /// Introduces a new binding for `id`. Same effect as [`Frame::set_element`].
    pub fn add_element(&mut self, id: &Id, value: ValPtr) {
        self.set_element(id, value);
    }

    /// Releases and empties every local slot from `start` to the end.
    pub fn reset(&mut self, start: usize) {
        for slot in self.slots.iter_mut().skip(start) {
            *slot = None;
        }
    }

    /// Releases every local slot.
    pub fn release(&mut self) {
        self.reset(0);
    }

    /// Deep-copies this frame.
    ///
    /// Trigger and call site are carried over; debugger state and the delayed
    /// flag are not, as the copy is a fresh invocation.
    pub fn clone_frame(&self) -> Frame {
        self.clone_with(&mut CloneState::new())
    }

    /// Deep-copies this frame as part of a larger clone operation.
    pub(crate) fn clone_with(&self, state: &mut CloneState) -> Frame {
        let mut frame = self.empty_copy();
        for (target, source) in frame.slots.iter_mut().zip(self.slots.iter()) {
            *target = source.as_ref().map(|v| state.clone_val(v));
        }
        frame.capture = self.capture.as_ref().map(|c| c.clone_with(state));
        frame
    }

    /// Deep-copies only the bindings of `selection`; every other slot of the
    /// copy is empty.
    pub fn selective_clone(&self, selection: &[IdPtr]) -> Frame {
        self.selective_clone_with(selection, &mut CloneState::new())
    }

    pub(crate) fn selective_clone_with(&self, selection: &[IdPtr], state: &mut CloneState) -> Frame {
        let mut frame = self.empty_copy();
        let (outer, local): (Vec<IdPtr>, Vec<IdPtr>) = match &self.capture {
            Some(capture) => selection.iter().cloned().partition(|id| capture.captures(id)),
            None => (Vec::new(), selection.to_vec()),
        };

        for id in &local {
            let offset = id.offset();
            self.check_offset(offset);
            frame.slots[offset] = self.slots[offset].as_ref().map(|v| state.clone_val(v));
        }
        frame.capture = self
            .capture
            .as_ref()
            .map(|c| c.selective_clone_with(&outer, state));
        frame
    }

    /// Frame of the same shape with empty slots.
    fn empty_copy(&self) -> Frame {
        let mut frame = Frame::new(self.len(), self.function, self.func_args.clone());
        frame.trigger = self.trigger.clone();
        frame.trigger_inherited = self.trigger_inherited;
        frame.call = self.call.clone();
        frame
    }

    pub fn function(&self) -> Option<FuncId> {
        self.function
    }

    pub fn func_args(&self) -> Option<&Rc<ValList>> {
        self.func_args.as_ref()
    }

    /// Next statement to execute in the context of this frame.
    pub fn set_next_stmt(&mut self, stmt: Option<StmtPtr>) {
        self.next_stmt = stmt;
    }

    pub fn next_stmt(&self) -> Option<&StmtPtr> {
        self.next_stmt.as_ref()
    }

    /// Used to implement "next" in the debugger.
    pub fn set_break_before_next_stmt(&mut self, should_break: bool) {
        self.break_before_next_stmt = should_break;
    }

    pub fn break_before_next_stmt(&self) -> bool {
        self.break_before_next_stmt
    }

    /// Used to implement "finish" in the debugger.
    pub fn set_break_on_return(&mut self, should_break: bool) {
        self.break_on_return = should_break;
    }

    pub fn break_on_return(&self) -> bool {
        self.break_on_return
    }

    /// Associates the frame with a trigger, releasing any previous one.
    pub fn set_trigger(&mut self, trigger: Option<TriggerPtr>) {
        self.trigger = trigger;
        self.trigger_inherited = false;
    }

    /// Takes over the trigger of `caller`, for a callee running on its behalf.
    pub fn inherit_trigger(&mut self, caller: &Frame) {
        self.trigger = caller.trigger.clone();
        self.trigger_inherited = self.trigger.is_some();
    }

    pub fn clear_trigger(&mut self) {
        self.trigger = None;
        self.trigger_inherited = false;
    }

    /// Whether the trigger was set on this frame itself. Its needed ids are
    /// offsets into this frame only.
    pub fn owns_trigger(&self) -> bool {
        self.trigger.is_some() && !self.trigger_inherited
    }

    pub fn trigger(&self) -> Option<&TriggerPtr> {
        self.trigger.as_ref()
    }

    pub fn set_call(&mut self, call: Rc<CallSite>) {
        self.call = Some(call);
    }

    pub fn clear_call(&mut self) {
        self.call = None;
    }

    pub fn call(&self) -> Option<&Rc<CallSite>> {
        self.call.as_ref()
    }

    pub(crate) fn replace_call(&mut self, call: Option<Rc<CallSite>>) -> Option<Rc<CallSite>> {
        std::mem::replace(&mut self.call, call)
    }

    /// Marks the evaluation in this frame as suspended. There is no way back.
    pub fn set_delayed(&mut self) {
        self.delayed = true;
    }

    pub fn has_delayed(&self) -> bool {
        self.delayed
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("frame")?;
        for slot in self.slots.iter() {
            match slot {
                Some(v) => write!(f, " {v}")?,
                None => f.write_str(" <nil>")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::Location;
    use crate::trigger::{CachedTrigger, Trigger};
    use crate::value::Val;

    fn filled(size: usize) -> (Frame, Vec<ValPtr>) {
        let mut frame = Frame::new(size, None, None);
        let values: Vec<_> = (0..size).map(|i| Val::vector([Val::from_count(i as u64)])).collect();
        for (i, v) in values.iter().enumerate() {
            frame.set_nth_element(i, Rc::clone(v));
        }
        (frame, values)
    }

    #[test]
    fn test_new_frame_is_empty() {
        let frame = Frame::new(3, Some(FuncId(4)), None);
        assert_eq!(frame.len(), 3);
        assert_eq!(frame.function(), Some(FuncId(4)));
        assert!((0..3).all(|i| frame.nth_element(i).is_none()));
        assert!(!frame.has_delayed());
        assert!(frame.trigger().is_none());
    }

    #[test]
    fn test_slot_ownership_balance() {
        let value = Val::from_int(1);
        {
            let mut frame = Frame::new(4, None, None);
            frame.set_nth_element(0, Rc::clone(&value));
            frame.set_nth_element(1, Rc::clone(&value));
            frame.set_nth_element(2, Rc::clone(&value));
            assert_eq!(Rc::strong_count(&value), 4);

            // Overwrite releases the old reference.
            frame.set_nth_element(1, Val::from_int(2));
            assert_eq!(Rc::strong_count(&value), 3);

            frame.reset(2);
            assert_eq!(Rc::strong_count(&value), 2);

            frame.release();
            assert_eq!(Rc::strong_count(&value), 1);
            frame.release();
            assert_eq!(Rc::strong_count(&value), 1);

            frame.set_nth_element(3, Rc::clone(&value));
        }
        // Dropping the frame releases what was left.
        assert_eq!(Rc::strong_count(&value), 1);
    }

    #[test]
    fn test_get_and_set_by_id() {
        let x = Id::new("x", 1);
        let mut frame = Frame::new(2, None, None);

        frame.add_element(&x, Val::from_int(5));
        assert_eq!(*frame.get_element(&x).unwrap(), Val::Int(5));
        assert_eq!(*frame.nth_element(1).unwrap(), Val::Int(5));
        assert!(frame.nth_element(0).is_none());

        frame.set_element(&x, Val::from_int(6));
        assert_eq!(*frame.get_element(&x).unwrap(), Val::Int(6));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_offset_out_of_range() {
        let mut frame = Frame::new(2, None, None);
        frame.set_nth_element(2, Val::from_int(0));
    }

    #[test]
    fn test_clone_is_independent() {
        let (frame, values) = filled(2);
        let copy = frame.clone_frame();

        let original = frame.nth_element(0).unwrap();
        let cloned = copy.nth_element(0).unwrap();
        assert_eq!(*original, *cloned);
        assert!(!Rc::ptr_eq(&original, &cloned));

        cloned.push(Val::from_count(99));
        assert_eq!(values[0].size(), Some(1));
        assert_eq!(cloned.size(), Some(2));
    }

    #[test]
    fn test_clone_preserves_aliasing_between_slots() {
        let shared = Val::empty_vector();
        let mut frame = Frame::new(2, None, None);
        frame.set_nth_element(0, Rc::clone(&shared));
        frame.set_nth_element(1, Rc::clone(&shared));

        let copy = frame.clone_frame();
        let a = copy.nth_element(0).unwrap();
        let b = copy.nth_element(1).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert!(!Rc::ptr_eq(&a, &shared));
    }

    #[test]
    fn test_clone_drops_debugger_state() {
        let call = CallSite::new(1, Some(Location::new("test.zeek", 3)), "f()");
        let trigger: TriggerPtr = CachedTrigger::new("t", vec![]);
        let mut frame = Frame::new(1, Some(FuncId(2)), None);
        frame.set_break_on_return(true);
        frame.set_break_before_next_stmt(true);
        frame.set_delayed();
        frame.set_call(Rc::clone(&call));
        frame.set_trigger(Some(Rc::clone(&trigger)));

        let copy = frame.clone_frame();
        assert!(!copy.break_on_return());
        assert!(!copy.break_before_next_stmt());
        assert!(!copy.has_delayed());
        assert!(copy.next_stmt().is_none());
        assert_eq!(copy.function(), Some(FuncId(2)));
        assert!(Rc::ptr_eq(copy.call().unwrap(), &call));
        assert!(Rc::ptr_eq(copy.trigger().unwrap(), &trigger));
        assert_eq!(Rc::strong_count(&trigger), 3);
    }

    #[test]
    fn test_selective_clone() {
        let (frame, _values) = filled(4);
        let picked = Id::new("b", 2);

        let copy = frame.selective_clone(&[Rc::clone(&picked)]);
        assert_eq!(copy.len(), 4);
        for i in [0, 1, 3] {
            assert!(copy.nth_element(i).is_none());
        }
        let v = copy.get_element(&picked).unwrap();
        assert_eq!(*v, *frame.nth_element(2).unwrap());
        assert!(!Rc::ptr_eq(&v, &frame.nth_element(2).unwrap()));
    }

    #[test]
    fn test_selective_clone_of_empty_slot() {
        let frame = Frame::new(2, None, None);
        let copy = frame.selective_clone(&[Id::new("a", 1)]);
        assert!(copy.nth_element(1).is_none());
    }

    #[test]
    fn test_trigger_lifecycle() {
        let trigger: TriggerPtr = CachedTrigger::new("t", vec![]);
        let mut frame = Frame::new(0, None, None);

        frame.set_trigger(Some(Rc::clone(&trigger)));
        assert_eq!(Rc::strong_count(&trigger), 2);
        frame.clear_trigger();
        assert_eq!(Rc::strong_count(&trigger), 1);

        // Replacing a trigger releases the old one.
        let other: TriggerPtr = CachedTrigger::new("u", vec![]);
        frame.set_trigger(Some(Rc::clone(&trigger)));
        frame.set_trigger(Some(Rc::clone(&other)));
        assert_eq!(Rc::strong_count(&trigger), 1);
        assert_eq!(frame.trigger().unwrap().name(), "u");

        drop(frame);
        assert_eq!(Rc::strong_count(&other), 1);
    }

    #[test]
    fn test_inherited_trigger_is_not_owned() {
        let trigger: TriggerPtr = CachedTrigger::new("t", vec![]);
        let mut caller = Frame::new(0, None, None);
        caller.set_trigger(Some(Rc::clone(&trigger)));
        assert!(caller.owns_trigger());

        let mut callee = Frame::new(1, None, None);
        callee.inherit_trigger(&caller);
        assert!(Rc::ptr_eq(callee.trigger().unwrap(), &trigger));
        assert!(!callee.owns_trigger());
        assert!(!callee.clone_frame().owns_trigger());

        // Inheriting from a frame without a trigger leaves nothing behind.
        callee.inherit_trigger(&Frame::new(0, None, None));
        assert!(callee.trigger().is_none());
        assert!(!callee.owns_trigger());

        callee.set_trigger(Some(trigger));
        assert!(callee.owns_trigger());
    }

    #[test]
    fn test_reset_then_clone() {
        let a = Val::from_string("A");
        let b = Val::from_string("B");
        let c = Val::from_string("C");
        let mut frame = Frame::new(3, None, None);
        frame.set_nth_element(0, Rc::clone(&a));
        frame.set_nth_element(1, Rc::clone(&b));
        frame.set_nth_element(2, Rc::clone(&c));

        frame.reset(1);
        assert!(Rc::ptr_eq(&frame.nth_element(0).unwrap(), &a));
        assert!(frame.nth_element(1).is_none());
        assert!(frame.nth_element(2).is_none());
        assert_eq!(Rc::strong_count(&b), 1);
        assert_eq!(Rc::strong_count(&c), 1);

        let copy = frame.clone_frame();
        assert_eq!(copy.len(), 3);
        assert_eq!(copy.nth_element(0).unwrap().as_str(), Some("A"));
        assert!(copy.nth_element(1).is_none());
        assert!(copy.nth_element(2).is_none());
    }

    #[test]
    fn test_display() {
        let mut frame = Frame::new(3, None, None);
        frame.set_nth_element(0, Val::from_int(1));
        frame.set_nth_element(2, Val::from_string("x"));
        assert_eq!(frame.to_string(), "frame 1 <nil> x");
    }
}
