//! Runtime values held in frame slots.
//!
//! Values are reference counted. Holding a [`ValPtr`] is holding one
//! reference and dropping it releases that reference, so a slot can never
//! acquire or release a value more than once. Scalars are immutable; vectors
//! may be mutated in place through any handle that refers to them.

use crate::func::FuncPtr;
use num_traits::NumCast;
use smallvec::SmallVec;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Shared handle to a runtime value.
pub type ValPtr = Rc<Val>;

/// Argument list of a call.
///
/// Most calls take a handful of arguments, so they are kept inline.
pub type ValList = SmallVec<[ValPtr; 4]>;

/// A script value.
#[derive(Debug)]
pub enum Val {
    Bool(bool),
    Int(i64),
    Count(u64),
    Double(f64),
    Str(String),
    /// Mutable aggregate. Elements may be unset.
    Vector(RefCell<Vec<Option<ValPtr>>>),
    Func(FuncPtr),
}

impl Val {
    pub fn from_bool(value: bool) -> ValPtr {
        Rc::new(Val::Bool(value))
    }

    pub fn from_int(value: i64) -> ValPtr {
        Rc::new(Val::Int(value))
    }

    pub fn from_count(value: u64) -> ValPtr {
        Rc::new(Val::Count(value))
    }

    pub fn from_double(value: f64) -> ValPtr {
        Rc::new(Val::Double(value))
    }

    pub fn from_string(value: &str) -> ValPtr {
        Rc::new(Val::Str(value.to_string()))
    }

    pub fn from_func(func: FuncPtr) -> ValPtr {
        Rc::new(Val::Func(func))
    }

    /// Create a vector holding the given elements.
    pub fn vector<I>(elements: I) -> ValPtr
    where
        I: IntoIterator<Item = ValPtr>,
    {
        Rc::new(Val::Vector(RefCell::new(
            elements.into_iter().map(Some).collect(),
        )))
    }

    pub fn empty_vector() -> ValPtr {
        Rc::new(Val::Vector(RefCell::new(Vec::new())))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Val::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Val::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_func(&self) -> Option<&FuncPtr> {
        match self {
            Val::Func(f) => Some(f),
            _ => None,
        }
    }

    /// Converts a numeric value into a host number, if it fits.
    pub fn to_num<T: NumCast>(&self) -> Option<T> {
        match self {
            Val::Int(i) => T::from(*i),
            Val::Count(c) => T::from(*c),
            Val::Double(d) => T::from(*d),
            _ => None,
        }
    }

    /// Appends an element to a vector value.
    ///
    /// # Returns
    /// * `true` - If this is a vector and the element was added
    /// * `false` - If this value is not a vector
    pub fn push(&self, element: ValPtr) -> bool {
        match self {
            Val::Vector(elements) => {
                elements.borrow_mut().push(Some(element));
                true
            }
            _ => false,
        }
    }

    /// Replaces element `index` of a vector value, growing it with unset
    /// elements if needed.
    pub fn assign(&self, index: usize, element: ValPtr) -> bool {
        match self {
            Val::Vector(elements) => {
                let mut elements = elements.borrow_mut();
                if index >= elements.len() {
                    elements.resize(index + 1, None);
                }
                elements[index] = Some(element);
                true
            }
            _ => false,
        }
    }

    /// Returns element `index` of a vector value.
    pub fn element(&self, index: usize) -> Option<ValPtr> {
        match self {
            Val::Vector(elements) => elements.borrow().get(index).cloned().flatten(),
            _ => None,
        }
    }

    /// Number of elements of a vector value, `None` for scalars.
    pub fn size(&self) -> Option<usize> {
        match self {
            Val::Vector(elements) => Some(elements.borrow().len()),
            _ => None,
        }
    }

    /// Produces an independent copy of `value`.
    pub fn deep_clone(value: &ValPtr) -> ValPtr {
        CloneState::new().clone_val(value)
    }
}

impl PartialEq for Val {
    /// Structural equality. Functions compare by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Val::Bool(a), Val::Bool(b)) => a == b,
            (Val::Int(a), Val::Int(b)) => a == b,
            (Val::Count(a), Val::Count(b)) => a == b,
            (Val::Double(a), Val::Double(b)) => a == b,
            (Val::Str(a), Val::Str(b)) => a == b,
            (Val::Vector(a), Val::Vector(b)) => *a.borrow() == *b.borrow(),
            (Val::Func(a), Val::Func(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Bool(b) => f.write_str(if *b { "T" } else { "F" }),
            Val::Int(i) => write!(f, "{i}"),
            Val::Count(c) => write!(f, "{c}"),
            Val::Double(d) => write!(f, "{d:.6}"),
            Val::Str(s) => f.write_str(s),
            Val::Vector(elements) => {
                f.write_str("[")?;
                for (i, element) in elements.borrow().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    match element {
                        Some(v) => write!(f, "{v}")?,
                        None => f.write_str("<nil>")?,
                    }
                }
                f.write_str("]")
            }
            Val::Func(func) => f.write_str(func.name()),
        }
    }
}

/// Bookkeeping for one deep-clone operation.
///
/// A value reachable more than once from the cloned roots is copied once and
/// the copies share it, so aliasing in the source is reproduced in the clone.
#[derive(Debug, Default)]
pub struct CloneState {
    clones: HashMap<*const Val, ValPtr>,
    funcs: HashMap<*const (), FuncPtr>,
}

impl CloneState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of `original` made earlier in this operation.
    pub fn cloned_func<F: ?Sized>(&self, original: &Rc<F>) -> Option<FuncPtr> {
        self.funcs.get(&Rc::as_ptr(original).cast::<()>()).cloned()
    }

    /// Records `copy` as the copy of `original`. Must happen before anything
    /// reachable from `original` is cloned.
    pub fn record_func<F: ?Sized>(&mut self, original: &Rc<F>, copy: FuncPtr) {
        self.funcs.insert(Rc::as_ptr(original).cast::<()>(), copy);
    }

    /// Clones `value`, reusing the copy made earlier in this operation if any.
    pub fn clone_val(&mut self, value: &ValPtr) -> ValPtr {
        let key = Rc::as_ptr(value);
        if let Some(copy) = self.clones.get(&key) {
            return Rc::clone(copy);
        }

        let copy = match &**value {
            Val::Vector(elements) => {
                // Register before recursing so cyclic vectors terminate.
                let copy = Rc::new(Val::Vector(RefCell::new(Vec::new())));
                self.clones.insert(key, Rc::clone(&copy));
                let cloned: Vec<_> = elements
                    .borrow()
                    .iter()
                    .map(|e| e.as_ref().map(|e| self.clone_val(e)))
                    .collect();
                if let Val::Vector(target) = &*copy {
                    *target.borrow_mut() = cloned;
                }
                return copy;
            }
            Val::Func(func) => {
                let func = Rc::clone(func).clone_with(self);
                // Cloning the function may have reached this value again.
                if let Some(copy) = self.clones.get(&key) {
                    return Rc::clone(copy);
                }
                Val::Func(func)
            }
            Val::Bool(b) => Val::Bool(*b),
            Val::Int(i) => Val::Int(*i),
            Val::Count(c) => Val::Count(*c),
            Val::Double(d) => Val::Double(*d),
            Val::Str(s) => Val::Str(s.clone()),
        };
        let copy = Rc::new(copy);
        self.clones.insert(key, Rc::clone(&copy));
        copy
    }
}
