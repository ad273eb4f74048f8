//! Closure capture for frames.
//!
//! A closure frame is a regular frame plus a captured outer frame and the
//! names of the outer identifiers the closure refers to. Element lookups of
//! those names resolve against the captured frame, using the captured frame's
//! own offsets; every other operation works on the local slots. This lets a
//! function value that was created in one frame run in invocation frames of
//! any size or layout.
//!
//! Names are compared by content, so two distinct identifier objects that
//! spell the same name are treated as the same variable.

use super::{Frame, FramePtr};
use crate::id::{Id, IdPtr};
use crate::value::CloneState;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub(super) struct Capture {
    frame: FramePtr,
    names: Rc<HashSet<Rc<str>>>,
}

impl Capture {
    fn new(frame: FramePtr, outer_ids: &[IdPtr]) -> Self {
        let names = outer_ids.iter().map(|id| Rc::from(id.name())).collect();
        Self {
            frame,
            names: Rc::new(names),
        }
    }

    pub(super) fn captures(&self, id: &Id) -> bool {
        self.names.contains(id.name())
    }

    pub(super) fn frame(&self) -> &FramePtr {
        &self.frame
    }

    pub(super) fn clone_with(&self, state: &mut CloneState) -> Capture {
        let frame = self.frame.borrow().clone_with(state);
        Capture {
            frame: Rc::new(RefCell::new(frame)),
            names: Rc::clone(&self.names),
        }
    }

    pub(super) fn selective_clone_with(
        &self,
        selection: &[IdPtr],
        state: &mut CloneState,
    ) -> Capture {
        let frame = self.frame.borrow().selective_clone_with(selection, state);
        Capture {
            frame: Rc::new(RefCell::new(frame)),
            names: Rc::clone(&self.names),
        }
    }
}

impl Frame {
    /// Wraps `local` so that lookups of `outer_ids` resolve against `closure`.
    ///
    /// The captured frame is shared, not copied: every closure frame built
    /// over it sees the same bindings.
    pub fn with_closure(local: Frame, closure: FramePtr, outer_ids: &[IdPtr]) -> Frame {
        assert!(local.capture.is_none(), "Frame already captures a closure");
        Frame {
            capture: Some(Capture::new(closure, outer_ids)),
            ..local
        }
    }

    /// Whether this frame delegates any lookups to a captured frame.
    pub fn is_closure(&self) -> bool {
        self.capture.is_some()
    }

    /// The captured frame, if any.
    pub fn closure(&self) -> Option<&FramePtr> {
        self.capture.as_ref().map(|c| c.frame())
    }

    /// Names resolved against the captured frame.
    pub fn closure_names(&self) -> impl Iterator<Item = &str> {
        self.capture
            .iter()
            .flat_map(|c| c.names.iter().map(|name| &**name))
    }
}
