//! Framecall driver
//!
//! Runs a short scripted scenario against the dispatch core: an event with
//! several prioritized handlers, a hook that vetoes, a function value with a
//! closure, and optionally a call that suspends on a trigger and resumes.

use anyhow::{Result, bail};
use clap::Parser;
use framecall::{
    BroFunc, BuiltinFunc, CachedTrigger, CallResult, CallSite, Flow, Frame, Func, FuncPtr,
    FuncType, Id, Location, NativeStmt, Runtime, RuntimeConfig, StmtList, StmtPtr, Trigger,
    TriggerPtr, Val, ValList, ValPtr,
};
use smallvec::smallvec;
use std::process::ExitCode;
use std::rc::Rc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(version, about = "Exercise frames, closures and event dispatch")]
struct Args {
    /// Log every call and its result
    #[arg(long)]
    trace: bool,

    /// Maximum depth of nested calls
    #[arg(long, default_value_t = 1024)]
    max_depth: usize,

    /// Priorities of the demo event handlers
    #[arg(
        long,
        value_delimiter = ',',
        allow_negative_numbers = true,
        default_values_t = [0, 10, -5]
    )]
    priorities: Vec<i32>,

    /// Also run a call that suspends on a trigger and is resumed
    #[arg(long)]
    suspend: bool,
}

fn main() -> ExitCode {
    let log_level = std::env::var("FRAMECALL_LOG").unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::fmt().with_env_filter(log_level).init();

    let args = Args::parse();
    let mut rt = Runtime::with_config(RuntimeConfig {
        trace_calls: args.trace,
        max_call_depth: args.max_depth,
    });

    match run(&args, &mut rt) {
        Ok(()) => {
            info!("Scenario completed");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Scenario failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args, rt: &mut Runtime) -> Result<()> {
    run_event(&args.priorities, rt)?;
    run_hook(rt)?;
    run_closure(rt)?;
    if args.suspend {
        run_suspended(rt)?;
    }
    Ok(())
}

/// Appends `label` to the vector in the first argument slot.
fn append(label: String) -> StmtPtr {
    let desc = format!("log += \"{label}\"");
    NativeStmt::new(&desc, move |frame, _| {
        if let Some(log) = frame.nth_element(0) {
            log.push(Val::from_string(&label));
        }
        Ok(Flow::Next)
    })
}

fn run_event(priorities: &[i32], rt: &mut Runtime) -> Result<()> {
    let event = rt.register(|id| BroFunc::new(id, "connection_established", FuncType::event(&["log"]), 1));
    for &priority in priorities {
        event.add_body(append(format!("handler@{priority}")), vec![], 1, priority);
    }

    let log = Val::empty_vector();
    event.call(&smallvec![Rc::clone(&log)], None, rt)?;
    info!("Event handlers ran in order: {}", log);
    Ok(())
}

fn run_hook(rt: &mut Runtime) -> Result<()> {
    let hook = rt.register(|id| BroFunc::new(id, "log_policy", FuncType::hook(&["log"]), 1));
    hook.add_body(append("accept".to_string()), vec![], 1, 5);
    hook.add_body(
        StmtList::new(vec![
            append("veto".to_string()),
            NativeStmt::new("break", |_, _| Ok(Flow::Break)),
        ]),
        vec![],
        1,
        0,
    );
    hook.add_body(append("unreachable".to_string()), vec![], 1, -5);

    let log = Val::empty_vector();
    let result = hook.call(&smallvec![Rc::clone(&log)], None, rt)?;
    let accepted = result.value().and_then(|v| v.as_bool()).unwrap_or(true);
    info!("Hook returned {} after {}", accepted, log);
    Ok(())
}

/// Builds `function(): count { return ++count; }` over a frame where `count`
/// is `start`.
fn make_counter(rt: &mut Runtime, start: u64) -> FuncPtr {
    let count = Id::new("count", 0);
    let mut defining = Frame::new(1, None, None);
    defining.set_element(&count, Val::from_count(start));

    let counter = rt.register(|id| BroFunc::new(id, "counter", FuncType::function(&[], true), 0));
    counter.set_outer_ids(vec![Rc::clone(&count)]);
    counter.set_closure(&defining);
    counter.add_body(
        NativeStmt::new("return ++count", move |frame, rt| {
            let Some(n) = frame.get_element(&count).and_then(|v| v.to_num::<u64>()) else {
                bail!("count is not set");
            };
            frame.set_element(&count, Val::from_count(n + 1));
            info!("Call stack: {}", rt.call_stack().render());
            Ok(Flow::returning(Val::from_count(n + 1)))
        }),
        vec![],
        0,
        0,
    );
    counter
}

fn run_closure(rt: &mut Runtime) -> Result<()> {
    let counter = make_counter(rt, 0);
    let site = CallSite::new(1, Some(Location::new("demo.zeek", 12)), "counter()");
    let mut frame = Frame::new(0, None, None);

    for _ in 0..3 {
        let result = rt.invoke(&site, Rc::clone(&counter), &ValList::new(), Some(&mut frame))?;
        info!("counter() = {}", describe(result.value()));
    }

    // A copy of the function value counts independently.
    let copy = Rc::clone(&counter).do_clone();
    let result = copy.call(&ValList::new(), None, rt)?;
    info!("copy of counter() = {}", describe(result.value()));
    let result = counter.call(&ValList::new(), None, rt)?;
    info!("counter() = {}", describe(result.value()));
    Ok(())
}

/// Asynchronous built-in: suspends its caller until a trigger has the answer.
fn lookup_addr(frame: Option<&mut Frame>, _args: &ValList) -> Result<Option<ValPtr>> {
    match frame {
        Some(frame) if frame.trigger().is_some() => {
            frame.set_delayed();
            Ok(None)
        }
        _ => bail!("lookup_addr() can only be called inside a when condition"),
    }
}

fn run_suspended(rt: &mut Runtime) -> Result<()> {
    let builtin: FuncPtr = rt.register(|id| {
        BuiltinFunc::new(id, "lookup_addr", FuncType::function(&["host"], true), lookup_addr, false)
    });
    let site = CallSite::new(2, Some(Location::new("demo.zeek", 20)), "lookup_addr(host)");

    let resolve = rt.register(|id| BroFunc::new(id, "resolve", FuncType::function(&["host"], true), 1));
    let call = Rc::clone(&site);
    resolve.add_body(
        NativeStmt::new("return lookup_addr(host)", move |frame, rt| {
            let args: ValList = frame.nth_element(0).into_iter().collect();
            let result = rt.invoke(&call, Rc::clone(&builtin), &args, Some(frame))?;
            Ok(Flow::Return(result.value()))
        }),
        vec![],
        1,
        0,
    );

    let trigger = CachedTrigger::new("when-resolve", vec![Id::new("host", 0)]);
    let mut when_frame = Frame::new(0, None, None);
    let pending: TriggerPtr = trigger.clone();
    when_frame.set_trigger(Some(pending));

    let host = Val::from_string("www.example.com");
    let CallResult::Suspended(continuation) =
        resolve.call(&smallvec![host], Some(&mut when_frame), rt)?
    else {
        bail!("resolve() was expected to suspend");
    };
    info!(
        "resolve() suspended on {} with {}",
        trigger.name(),
        continuation.frame()
    );

    trigger.cache(&site, Val::from_string("93.184.216.34"));
    let result = continuation.resume(rt)?;
    info!("resolve() resumed and returned {}", describe(result.value()));
    Ok(())
}

fn describe(value: Option<ValPtr>) -> String {
    value.map_or_else(|| "<none>".to_string(), |v| v.to_string())
}
