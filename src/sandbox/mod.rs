//! The capability system: everything a script can reach at run time goes
//! through this module — named capabilities, allowlisted imports, mediated
//! primitive operations, and the captured print sink.

pub mod capabilities;
pub mod hooks;
pub mod imports;
pub mod output;
pub mod runtime;

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::SandboxError;
use crate::host::HostServices;
use crate::result::ResultObject;
use crate::script::value::Value;

use imports::ImportBroker;
use output::OutputCapture;

/// Signature of every capability callable exposed to scripts.
pub type BuiltinFn = fn(&mut ExecCtx<'_>, &[Value]) -> Result<Value, SandboxError>;

/// Per-execution state threaded through the interpreter and into every
/// capability call. Created fresh for each run; never shared between
/// executions.
pub struct ExecCtx<'a> {
    /// The captured print sink for this execution.
    pub output: &'a RefCell<OutputCapture>,
    /// The live result object, also reachable from the namespace as the
    /// opaque `result` value.
    pub result: Rc<RefCell<ResultObject>>,
    /// Shared, lock-guarded import broker of the owning sandbox.
    pub imports: &'a ImportBroker,
    /// Platform services. Opaque to the sandbox.
    pub host: &'a dyn HostServices,
}

pub use runtime::Sandbox;
