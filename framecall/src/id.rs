//! Identifiers, source locations and call sites.
//!
//! Identifiers are produced by the script compiler. Each one knows its name
//! and the frame offset it was assigned; the offset can be reassigned when a
//! function value is moved to a frame with a different layout.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// Shared handle to an identifier.
pub type IdPtr = Rc<Id>;

#[derive(Debug)]
pub struct Id {
    name: Rc<str>,
    offset: Cell<usize>,
}

impl Id {
    pub fn new(name: &str, offset: usize) -> IdPtr {
        Rc::new(Self {
            name: Rc::from(name),
            offset: Cell::new(offset),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Slot this identifier occupies in its frame.
    pub fn offset(&self) -> usize {
        self.offset.get()
    }

    pub fn set_offset(&self, offset: usize) {
        self.offset.set(offset);
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Position in a script file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: Rc<str>,
    pub line: u32,
}

impl Location {
    pub fn new(file: &str, line: u32) -> Self {
        Self {
            file: Rc::from(file),
            line,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// A call expression in a script.
///
/// `serial` uniquely identifies the expression; triggers key the results of
/// delayed calls by it.
#[derive(Debug)]
pub struct CallSite {
    serial: u64,
    location: Option<Location>,
    text: String,
}

impl CallSite {
    pub fn new(serial: u64, location: Option<Location>, text: &str) -> Rc<Self> {
        Rc::new(Self {
            serial,
            location,
            text: text.to_string(),
        })
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} ({})", self.text, location),
            None => f.write_str(&self.text),
        }
    }
}
