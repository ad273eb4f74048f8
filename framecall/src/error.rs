//! Script-level call errors.
//!
//! These are conditions caused by the script being run, not by a defect in
//! the runtime. They are reported once where they are detected and travel
//! inside `anyhow::Error`, so callers can `downcast_ref::<CallError>()`.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// Number of arguments does not match the function's parameters.
    ArgCount {
        func: String,
        expected: usize,
        got: usize,
    },
    /// A function without a body was called.
    NoBody { func: String },
    /// The call stack reached its configured limit.
    DepthExceeded { func: String, limit: usize },
    /// The callee is not a function value.
    NotAFunction { target: String },
    /// A built-in function failed.
    Builtin { func: String },
    /// An interceptor answered a call with a result the callee can't produce.
    BadInterception { func: String, expected: &'static str },
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::ArgCount {
                func,
                expected,
                got,
            } => write!(
                f,
                "Function '{func}' takes {expected} arguments, but {got} were given"
            ),
            CallError::NoBody { func } => write!(f, "Function '{func}' called without a body"),
            CallError::DepthExceeded { func, limit } => {
                write!(f, "Call to '{func}' exceeds the maximum call depth of {limit}")
            }
            CallError::NotAFunction { target } => write!(f, "'{target}' is not a function"),
            CallError::Builtin { func } => write!(f, "Built-in function '{func}' failed"),
            CallError::BadInterception { func, expected } => {
                write!(f, "Intercepted call to '{func}' must produce {expected}")
            }
        }
    }
}

impl std::error::Error for CallError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downcast_through_anyhow() {
        let err = anyhow::Error::new(CallError::NoBody {
            func: "f".to_string(),
        });
        assert_eq!(
            err.downcast_ref::<CallError>(),
            Some(&CallError::NoBody {
                func: "f".to_string()
            })
        );
        assert_eq!(err.to_string(), "Function 'f' called without a body");
    }
}
