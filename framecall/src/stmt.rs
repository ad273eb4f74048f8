//! Function bodies.
//!
//! Statement trees are built by the script compiler; this module only fixes
//! the interface the dispatch code needs. [`NativeStmt`] and [`StmtList`]
//! allow bodies to be assembled by an embedder without a parser.

use crate::frame::Frame;
use crate::id::Location;
use crate::runtime::Runtime;
use crate::value::ValPtr;
use anyhow::Result;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

/// Shared handle to a statement tree.
pub type StmtPtr = Rc<dyn Stmt>;

/// How control leaves a statement.
#[derive(Debug, Clone)]
pub enum Flow {
    /// Fall through to the next statement.
    Next,
    /// `return`, with an optional value.
    Return(Option<ValPtr>),
    /// `break`. At the top of a hook body it stops the remaining handlers.
    Break,
}

impl Flow {
    /// `return value`.
    pub fn returning(value: ValPtr) -> Self {
        Flow::Return(Some(value))
    }
}

pub trait Stmt: fmt::Debug + fmt::Display {
    /// Executes the statement against `frame`.
    ///
    /// A script-level error is reported where it is detected and returned as
    /// `Err`, which unwinds the current body.
    fn exec(&self, frame: &mut Frame, rt: &mut Runtime) -> Result<Flow>;

    fn location(&self) -> Option<&Location> {
        None
    }

    /// Whether running the statement has no effect besides its result.
    fn is_pure(&self) -> bool {
        false
    }
}

type NativeBody = dyn Fn(&mut Frame, &mut Runtime) -> Result<Flow>;

/// A statement implemented by a Rust closure.
pub struct NativeStmt {
    label: String,
    location: Option<Location>,
    is_pure: bool,
    body: Box<NativeBody>,
}

impl NativeStmt {
    pub fn new<F>(label: &str, body: F) -> Rc<Self>
    where
        F: Fn(&mut Frame, &mut Runtime) -> Result<Flow> + 'static,
    {
        Rc::new(Self {
            label: label.to_string(),
            location: None,
            is_pure: false,
            body: Box::new(body),
        })
    }

    /// A statement that only computes its result.
    pub fn pure<F>(label: &str, body: F) -> Rc<Self>
    where
        F: Fn(&mut Frame, &mut Runtime) -> Result<Flow> + 'static,
    {
        Rc::new(Self {
            label: label.to_string(),
            location: None,
            is_pure: true,
            body: Box::new(body),
        })
    }

    pub fn with_location<F>(label: &str, location: Location, body: F) -> Rc<Self>
    where
        F: Fn(&mut Frame, &mut Runtime) -> Result<Flow> + 'static,
    {
        Rc::new(Self {
            label: label.to_string(),
            location: Some(location),
            is_pure: false,
            body: Box::new(body),
        })
    }
}

impl fmt::Debug for NativeStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeStmt")
            .field("label", &self.label)
            .field("location", &self.location)
            .field("is_pure", &self.is_pure)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for NativeStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

impl Stmt for NativeStmt {
    fn exec(&self, frame: &mut Frame, rt: &mut Runtime) -> Result<Flow> {
        (self.body)(frame, rt)
    }

    fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    fn is_pure(&self) -> bool {
        self.is_pure
    }
}

/// A sequence of statements.
///
/// Records each statement as the frame's next statement before running it,
/// and stops early once the frame has been delayed.
#[derive(Debug, Default)]
pub struct StmtList {
    stmts: Vec<StmtPtr>,
}

impl StmtList {
    pub fn new(stmts: Vec<StmtPtr>) -> Rc<Self> {
        Rc::new(Self { stmts })
    }
}

impl fmt::Display for StmtList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for stmt in &self.stmts {
            write!(f, " {stmt};")?;
        }
        f.write_str(" }")
    }
}

impl Stmt for StmtList {
    fn exec(&self, frame: &mut Frame, rt: &mut Runtime) -> Result<Flow> {
        for stmt in &self.stmts {
            frame.set_next_stmt(Some(Rc::clone(stmt)));
            if frame.break_before_next_stmt() {
                debug!("Break requested before: {}", stmt);
            }

            match stmt.exec(frame, rt)? {
                Flow::Next if frame.has_delayed() => return Ok(Flow::Next),
                Flow::Next => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Next)
    }

    fn is_pure(&self) -> bool {
        self.stmts.iter().all(|stmt| stmt.is_pure())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Val;
    use anyhow::bail;

    #[test]
    fn test_list_runs_in_order() {
        let mut rt = Runtime::new();
        let mut frame = Frame::new(1, None, None);
        let list = StmtList::new(vec![
            NativeStmt::new("a", |f, _| {
                f.set_nth_element(0, Val::from_string("a"));
                Ok(Flow::Next)
            }),
            NativeStmt::new("b", |f, _| {
                let prev = f.nth_element(0).unwrap();
                f.set_nth_element(0, Val::from_string(&format!("{prev}b")));
                Ok(Flow::Next)
            }),
        ]);

        assert!(matches!(list.exec(&mut frame, &mut rt).unwrap(), Flow::Next));
        assert_eq!(frame.nth_element(0).unwrap().as_str(), Some("ab"));
        assert_eq!(frame.next_stmt().unwrap().to_string(), "b");
        assert_eq!(list.to_string(), "{ a; b; }");
    }

    #[test]
    fn test_list_stops_on_return() {
        let mut rt = Runtime::new();
        let mut frame = Frame::new(0, None, None);
        let list = StmtList::new(vec![
            NativeStmt::new("return 1", |_, _| Ok(Flow::Return(Some(Val::from_int(1))))),
            NativeStmt::new("unreachable", |_, _| bail!("should not run")),
        ]);

        match list.exec(&mut frame, &mut rt).unwrap() {
            Flow::Return(Some(v)) => assert_eq!(*v, Val::Int(1)),
            flow => panic!("unexpected flow {flow:?}"),
        }
    }

    #[test]
    fn test_list_stops_when_delayed() {
        let mut rt = Runtime::new();
        let mut frame = Frame::new(0, None, None);
        let list = StmtList::new(vec![
            NativeStmt::new("suspend", |f, _| {
                f.set_delayed();
                Ok(Flow::Next)
            }),
            NativeStmt::new("unreachable", |_, _| bail!("should not run")),
        ]);

        assert!(matches!(list.exec(&mut frame, &mut rt).unwrap(), Flow::Next));
        assert!(frame.has_delayed());
    }

    #[test]
    fn test_list_purity() {
        let pure = || -> StmtPtr { NativeStmt::pure("x + 1", |_, _| Ok(Flow::Next)) };
        assert!(pure().is_pure());
        assert!(StmtList::new(vec![]).is_pure());
        assert!(StmtList::new(vec![pure(), pure()]).is_pure());

        let print: StmtPtr = NativeStmt::new("print x", |_, _| Ok(Flow::Next));
        assert!(!print.is_pure());
        assert!(!StmtList::new(vec![pure(), print]).is_pure());
    }
}
