//! The execution driver: compile, assemble the namespace, run once,
//! collect the result or the failure.
//!
//! One `Sandbox` holds the read-only capability table and the lock-guarded
//! import cache, and can serve many executions — concurrently, if the host
//! wants. Everything per-execution (output buffer, result object,
//! namespace) is created fresh inside `run` and dropped on failure.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ScriptConfig;
use crate::error::SandboxError;
use crate::host::HostServices;
use crate::result::ResultObject;
use crate::script::{self, Interp};

use super::capabilities::CapabilityTable;
use super::imports::ImportBroker;
use super::output::OutputCapture;
use super::ExecCtx;

pub struct Sandbox {
    table: CapabilityTable,
    imports: ImportBroker,
    host: Arc<dyn HostServices>,
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl Sandbox {
    /// Build a sandbox from operator configuration. Configuration is a
    /// trusted input, but mistakes in it (unknown builtin names) surface
    /// here rather than failing every execution later.
    pub fn new(config: &ScriptConfig, host: Arc<dyn HostServices>) -> anyhow::Result<Self> {
        let table = CapabilityTable::build(&config.extra_builtins())?;

        let roots = config.module_roots();
        for root in &roots {
            if !root.is_dir() {
                warn!("Module search root {} does not exist", root.display());
            }
        }
        let allowed = config.allowed_modules();
        info!(
            "Sandbox ready: {} capabilities, {} allowed import modules",
            table.len(),
            allowed.len()
        );
        let imports = ImportBroker::new(allowed, roots);

        Ok(Self {
            table,
            imports,
            host,
        })
    }

    /// Run one script: single-shot, synchronous, isolated.
    ///
    /// Returns exactly one of the finished result or the collapsed
    /// failure. On a compile rejection nothing beyond the AST was ever
    /// constructed; on a runtime failure the partially built result and
    /// the output buffer are discarded, never leaked.
    pub fn run(&self, source: &str) -> Result<ResultObject, SandboxError> {
        let execution = Uuid::new_v4();
        let started = Instant::now();
        debug!(%execution, "Compiling script ({} bytes)", source.len());

        let program = script::compile(source).map_err(|e| {
            warn!(%execution, "Compilation rejected: {e}");
            e
        })?;

        let output = RefCell::new(OutputCapture::new());
        let result = Rc::new(RefCell::new(ResultObject::new()));
        let mut interp = Interp::new(self.table.materialize(&result));
        let mut ctx = ExecCtx {
            output: &output,
            result: Rc::clone(&result),
            imports: &self.imports,
            host: self.host.as_ref(),
        };

        match interp.run(&program, &mut ctx) {
            Ok(()) => {
                drop(ctx);
                drop(interp);
                let mut result = Rc::try_unwrap(result)
                    .map(RefCell::into_inner)
                    .unwrap_or_else(|shared| shared.borrow().clone());
                result.set_log(output.into_inner().into_lines());
                info!(
                    %execution,
                    "Execution completed in {:?} ({} rows, {} log lines)",
                    started.elapsed(),
                    result.rows.len(),
                    result.log.len()
                );
                Ok(result)
            }
            Err(e) => {
                warn!(%execution, "Execution failed after {:?}: {e}", started.elapsed());
                Err(e)
            }
        }
    }
}
