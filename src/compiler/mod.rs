//! # Backend driver
//!
//! Takes a scheduled program graph, weakens memory orderings across the
//! whole program, then lowers every function to the low-level IR.
//!
//! ## Architecture
//!
//! ```text
//! Program ─► fence::FenceOptimizer ─► (modes weakened in place)
//!        └─► lower::LoweringVisitor (per function, parallel) ─► ir::LlModule
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use aotc::compiler::{CompileOptions, Compiler};
//!
//! let compiler = Compiler::new(CompileOptions::default());
//! let result = compiler.compile(&program, Arc::new(hierarchy))?;
//! println!("{}", result.module);
//! ```

pub mod context;
pub mod debug;
pub mod fence;
pub mod ir;
pub mod lower;

pub use context::{CompilationContext, Diagnostic, DiagnosticLevel};
pub use debug::dump_module;
pub use fence::{FenceOptimizer, FenceReport, HazardReport};
pub use ir::{FunctionDefinition, LlModule, LlType, LlValue};
pub use lower::LoweringVisitor;

use crate::error::{Error, Result};
use crate::graph::{BlockSchedule, FunctionBody, Program};
use crate::parallel::{run_parallel_task, ParallelConfig};
use crate::reachability::Reachability;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How detected SB/IRIW hazards influence weakening
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HazardPolicy {
    /// Hazards are logged only
    #[default]
    Advisory,
    /// The store rule runs only when no hazard was found
    Gating,
}

/// Fence optimization options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FenceOptions {
    /// Memory-relevant nodes per function before analysis gives up
    pub max_function_nodes: usize,
    /// Reachable blocks per function before analysis gives up
    pub max_function_blocks: usize,
    /// Hazard handling
    pub hazard_policy: HazardPolicy,
}

impl Default for FenceOptions {
    fn default() -> Self {
        Self {
            max_function_nodes: 4096,
            max_function_blocks: 2048,
            hazard_policy: HazardPolicy::Advisory,
        }
    }
}

/// Compilation options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Name of the output module
    pub module_name: String,
    /// Run the fence optimizer before lowering
    pub fence_optimization: bool,
    /// Lower functions to IR
    pub lower: bool,
    /// Worker threads
    pub parallel: ParallelConfig,
    /// Fence optimizer settings
    pub fence: FenceOptions,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            module_name: "main".to_string(),
            fence_optimization: true,
            lower: true,
            parallel: ParallelConfig::default(),
            fence: FenceOptions::default(),
        }
    }
}

impl CompileOptions {
    /// Parse options from JSON; missing fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }
}

/// Compilation result with metadata
#[derive(Debug)]
pub struct CompileResult {
    /// Lowered functions (empty when lowering is disabled)
    pub module: LlModule,
    /// Warnings and notes; errors make `compile` fail instead
    pub diagnostics: Vec<Diagnostic>,
    /// Fence optimizer statistics, if it ran
    pub fence_report: Option<FenceReport>,
}

/// Backend driver
pub struct Compiler {
    options: CompileOptions,
}

impl Compiler {
    /// Create a new compiler with options
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    /// Options in use
    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Optimize and lower `program`
    pub fn compile(
        &self,
        program: &Program,
        reachability: Arc<dyn Reachability + Send + Sync>,
    ) -> Result<CompileResult> {
        let ctxt = CompilationContext::new();

        // Phase 1: fence optimization, so lowering sees the final orderings
        let fence_report = if self.options.fence_optimization {
            let optimizer = FenceOptimizer::new(self.options.fence.clone());
            Some(optimizer.run(&ctxt, program, reachability, &self.options.parallel)?)
        } else {
            None
        };

        // Phase 2: lowering
        let mut module = LlModule::new(self.options.module_name.clone());
        if self.options.lower {
            for func in self.lower_all(&ctxt, program)? {
                module.add(func);
            }
        }

        let errors = ctxt.error_count();
        if errors > 0 {
            tracing::warn!("Compilation failed with {} error(s)", errors);
            return Err(Error::CompilationFailed { errors });
        }

        tracing::info!(
            "Compiled {} functions into {}",
            module.functions.len(),
            module.name
        );
        Ok(CompileResult {
            module,
            diagnostics: ctxt.diagnostics(),
            fence_report,
        })
    }

    fn lower_all(
        &self,
        ctxt: &CompilationContext,
        program: &Program,
    ) -> Result<Vec<FunctionDefinition>> {
        let bodies: Vec<&Arc<FunctionBody>> = program.functions().collect();
        let results = run_parallel_task(
            bodies,
            &self.options.parallel,
            || (),
            |_, body| {
                let schedule = BlockSchedule::from_body(body);
                LoweringVisitor::new(ctxt, &schedule, body).execute()
            },
        )?;
        results.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_json_defaults() {
        let options = CompileOptions::from_json(r#"{"fence_optimization": false}"#).unwrap();
        assert!(!options.fence_optimization);
        assert!(options.lower);
        assert_eq!(options.fence.max_function_nodes, 4096);
        assert_eq!(options.fence.hazard_policy, HazardPolicy::Advisory);
    }

    #[test]
    fn test_options_nested() {
        let options = CompileOptions::from_json(
            r#"{"fence": {"hazard_policy": "gating", "max_function_blocks": 8},
                "parallel": {"max_parallelism": 2}}"#,
        )
        .unwrap();
        assert_eq!(options.fence.hazard_policy, HazardPolicy::Gating);
        assert_eq!(options.fence.max_function_blocks, 8);
        assert_eq!(options.fence.max_function_nodes, 4096);
        assert_eq!(options.parallel.max_parallelism, 2);
    }

    #[test]
    fn test_options_bad_json() {
        let err = CompileOptions::from_json("{").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
