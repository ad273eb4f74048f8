//! Call interception.
//!
//! An embedder (a plugin layer, a test harness) may install a
//! [`CallInterceptor`] on the runtime. It sees every call before the callee
//! runs and may answer it instead. An answer has to fit the callee's flavor:
//! a hook yields a bool, an event yields nothing, and a function yields a
//! value exactly when its type says so.

use crate::error::CallError;
use crate::func::{Flavor, Func};
use crate::value::{Val, ValList, ValPtr};
use anyhow::Result;
use std::fmt;
use tracing::error;

/// What an interceptor decided about a call.
#[derive(Debug, Clone)]
pub enum Interception {
    /// Let the callee run.
    Pass,
    /// The call is answered with this result; the callee does not run.
    Handled(Option<ValPtr>),
}

pub trait CallInterceptor: fmt::Debug {
    fn intercept(&self, func: &dyn Func, args: &ValList) -> Interception;
}

/// Checks an intercepted result against the flavor and type of `func`.
pub(crate) fn check_result(func: &dyn Func, result: Option<ValPtr>) -> Result<Option<ValPtr>> {
    let ftype = func.ftype();
    let expected = match (ftype.flavor, result.as_deref()) {
        (Flavor::Hook, Some(Val::Bool(_))) => None,
        (Flavor::Hook, _) => Some("a bool"),
        (Flavor::Event, None) => None,
        (Flavor::Event, Some(_)) => Some("no value"),
        (Flavor::Function, Some(_)) if ftype.yields => None,
        (Flavor::Function, None) if !ftype.yields => None,
        (Flavor::Function, _) if ftype.yields => Some("a value"),
        (Flavor::Function, _) => Some("no value"),
    };
    let Some(expected) = expected else {
        return Ok(result);
    };

    let err = CallError::BadInterception {
        func: func.name().to_string(),
        expected,
    };
    error!("{}", err);
    Err(err.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::func::{BroFunc, FuncType};
    use crate::runtime::Runtime;

    #[test]
    fn test_results_by_flavor() {
        let mut rt = Runtime::new();
        let hook = rt.register(|id| BroFunc::new(id, "h", FuncType::hook(&[]), 0));
        let event = rt.register(|id| BroFunc::new(id, "e", FuncType::event(&[]), 0));
        let value = rt.register(|id| BroFunc::new(id, "f", FuncType::function(&[], true), 0));
        let void = rt.register(|id| BroFunc::new(id, "g", FuncType::function(&[], false), 0));

        assert!(check_result(&*hook, Some(Val::from_bool(false))).is_ok());
        assert!(check_result(&*hook, Some(Val::from_int(0))).is_err());
        assert!(check_result(&*hook, None).is_err());

        assert!(check_result(&*event, None).is_ok());
        let err = check_result(&*event, Some(Val::from_int(1))).unwrap_err();
        assert_eq!(err.to_string(), "Intercepted call to 'e' must produce no value");

        assert!(check_result(&*value, Some(Val::from_int(1))).is_ok());
        let err = check_result(&*value, None).unwrap_err();
        assert_eq!(err.to_string(), "Intercepted call to 'f' must produce a value");

        assert!(check_result(&*void, None).is_ok());
        assert!(check_result(&*void, Some(Val::from_int(1))).is_err());
    }
}
