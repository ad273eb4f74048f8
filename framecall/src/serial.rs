//! Serialization of functions.
//!
//! The byte layout belongs to the serialization layer; this module only
//! decides what is written and in which order. A script function is written
//! as its signature plus one selected body, which is enough to rebuild a
//! callable function on the other side. A built-in is written by name and
//! resolved against the functions registered in the reading runtime.

use crate::func::{BroFunc, Flavor, Func, FuncKind, FuncPtr, FuncType};
use crate::runtime::Runtime;
use crate::stmt::StmtPtr;
use anyhow::{Result, bail};
use tracing::debug;

/// Destination supplied by the serialization layer.
pub trait SerialSink {
    fn write_u8(&mut self, value: u8) -> Result<()>;
    fn write_u32(&mut self, value: u32) -> Result<()>;
    fn write_i32(&mut self, value: i32) -> Result<()>;
    fn write_str(&mut self, value: &str) -> Result<()>;
    /// Statement trees are encoded by the layer that knows their syntax.
    fn write_stmt(&mut self, stmt: &StmtPtr) -> Result<()>;
}

/// Source supplied by the serialization layer.
pub trait SerialSource {
    fn read_u8(&mut self) -> Result<u8>;
    fn read_u32(&mut self) -> Result<u32>;
    fn read_i32(&mut self) -> Result<i32>;
    fn read_str(&mut self) -> Result<String>;
    fn read_stmt(&mut self) -> Result<StmtPtr>;
}

const KIND_SCRIPT: u8 = 0;
const KIND_BUILTIN: u8 = 1;

fn flavor_tag(flavor: Flavor) -> u8 {
    match flavor {
        Flavor::Function => 0,
        Flavor::Event => 1,
        Flavor::Hook => 2,
    }
}

fn flavor_from_tag(tag: u8) -> Result<Flavor> {
    match tag {
        0 => Ok(Flavor::Function),
        1 => Ok(Flavor::Event),
        2 => Ok(Flavor::Hook),
        _ => bail!("Invalid function flavor tag: {}", tag),
    }
}

/// Writes `func` with the body at index `which_body`.
pub fn serialize_func(func: &dyn Func, which_body: usize, sink: &mut dyn SerialSink) -> Result<()> {
    let Some(script) = func.as_script() else {
        debug_assert_eq!(func.kind(), FuncKind::Builtin);
        sink.write_u8(KIND_BUILTIN)?;
        return sink.write_str(func.name());
    };

    let bodies = script.bodies();
    let Some(body) = bodies.get(which_body) else {
        bail!(
            "Function '{}' has no body {} ({} bodies)",
            script.name(),
            which_body,
            bodies.len()
        );
    };

    let ftype = script.ftype();
    sink.write_u8(KIND_SCRIPT)?;
    sink.write_str(script.name())?;
    sink.write_u8(flavor_tag(ftype.flavor))?;
    sink.write_u8(u8::from(ftype.yields))?;
    sink.write_u32(u32::try_from(ftype.params.len())?)?;
    for param in &ftype.params {
        sink.write_str(param)?;
    }
    sink.write_u32(u32::try_from(script.frame_size())?)?;
    sink.write_i32(body.priority)?;
    sink.write_stmt(&body.stmts)?;

    debug!("Serialized body {} of {}", which_body, script.name());
    Ok(())
}

/// Rebuilds a function written by [`serialize_func`].
///
/// A script function is registered in `rt` under a new id. A built-in must
/// already be registered there.
pub fn unserialize_func(source: &mut dyn SerialSource, rt: &mut Runtime) -> Result<FuncPtr> {
    match source.read_u8()? {
        KIND_BUILTIN => {
            let name = source.read_str()?;
            match rt.registry().lookup_by_name(&name) {
                Some(func) if func.kind() == FuncKind::Builtin => Ok(func),
                _ => bail!("Unknown built-in function '{}'", name),
            }
        }
        KIND_SCRIPT => {
            let name = source.read_str()?;
            let flavor = flavor_from_tag(source.read_u8()?)?;
            let yields = source.read_u8()? != 0;
            let nparams = source.read_u32()?;
            let params = (0..nparams)
                .map(|_| source.read_str())
                .collect::<Result<Vec<_>>>()?;
            let frame_size = source.read_u32()? as usize;
            let priority = source.read_i32()?;
            let stmts = source.read_stmt()?;

            let ftype = FuncType {
                flavor,
                params,
                yields,
            };
            let func = rt.register(|id| BroFunc::new(id, &name, ftype, frame_size));
            func.add_body(stmts, Vec::new(), frame_size, priority);
            let func: FuncPtr = func;
            Ok(func)
        }
        kind => bail!("Invalid function kind tag: {}", kind),
    }
}
