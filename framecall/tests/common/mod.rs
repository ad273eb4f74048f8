//! Common test utilities and macros

use framecall::{BroFunc, Flow, Frame, Func, FuncType, NativeStmt, Runtime, StmtPtr, Val, ValPtr};
use smallvec::smallvec;
use std::rc::Rc;

#[derive(Debug)]
pub enum TestResult {
    Success,
    SuccessWithValue(String),
    Error(String),
    ErrorRegex(String),
}

impl PartialEq for TestResult {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TestResult::Success, TestResult::Success) => true,
            (TestResult::SuccessWithValue(a), TestResult::SuccessWithValue(b)) => a == b,
            (TestResult::Error(a), TestResult::Error(b)) => a == b,
            (TestResult::ErrorRegex(pattern), TestResult::Error(msg))
            | (TestResult::Error(msg), TestResult::ErrorRegex(pattern)) => {
                regex::Regex::new(pattern).unwrap().is_match(msg)
            }
            _ => false,
        }
    }
}

impl TestResult {
    pub fn from_call(result: anyhow::Result<Option<ValPtr>>) -> Self {
        match result {
            Ok(Some(value)) => TestResult::SuccessWithValue(value.to_string()),
            Ok(None) => TestResult::Success,
            Err(e) => TestResult::Error(format!("{e:#}")),
        }
    }
}

/// Body that appends `label` to the vector passed as first argument.
pub fn record(label: &str) -> StmtPtr {
    let entry = label.to_string();
    NativeStmt::new(label, move |frame: &mut Frame, _: &mut Runtime| {
        if let Some(log) = frame.nth_element(0) {
            log.push(Val::from_string(&entry));
        }
        Ok(Flow::Next)
    })
}

/// Registers an event `name(log)` with one recording body per priority, calls
/// it and returns the order the bodies ran in.
pub fn run_event(name: &str, priorities: &[i32]) -> Vec<String> {
    let mut rt = Runtime::new();
    let event = rt.register(|id| BroFunc::new(id, name, FuncType::event(&["log"]), 1));
    for (i, &priority) in priorities.iter().enumerate() {
        event.add_body(record(&format!("{i}@{priority}")), vec![], 1, priority);
    }

    let log = Val::empty_vector();
    event
        .call(&smallvec![Rc::clone(&log)], None, &mut rt)
        .expect("event dispatch failed");
    assert_eq!(rt.call_stack().depth(), 0);

    (0..log.size().unwrap())
        .map(|i| log.element(i).unwrap().to_string())
        .collect()
}

/// Generates a test that checks the order in which bodies of the given
/// priorities run. Expected entries are `index@priority`.
#[macro_export]
macro_rules! check_body_order {
    ($name:ident, priorities = [$($p:expr),* $(,)?], expected = [$($e:expr),* $(,)?]) => {
        #[test]
        fn $name() {
            let order = crate::common::run_event(stringify!($name), &[$($p),*]);
            let expected: Vec<String> = vec![$($e.to_string()),*];
            assert_eq!(order, expected);
        }
    };
}
