//! # aotc - Ahead-of-Time Compiler Backend
//!
//! The backend stage of an ahead-of-time compiler for managed code. It takes
//! a typed, scheduled SSA program graph and
//!
//! - weakens memory orderings across the whole program where an immediately
//!   preceding memory operation already provides them, and
//! - lowers every function to a target-independent low-level IR.
//!
//! ## Quick Start
//!
//! ```rust
//! use aotc::compiler::{CompileOptions, Compiler};
//! use aotc::graph::{FunctionBuilder, MemoryAtomicityMode, Program, ProgramModule, Type, ValueHandle};
//! use aotc::reachability::ClassHierarchy;
//! use std::sync::Arc;
//!
//! # fn main() -> aotc::Result<()> {
//! let mut b = FunctionBuilder::new("reader", vec![], Type::s32());
//! b.fence(MemoryAtomicityMode::Acquire);
//! let value = b.load(ValueHandle::global("flag"), Type::s32(), MemoryAtomicityMode::Acquire);
//! b.ret_value(value);
//!
//! let mut module = ProgramModule::new("app");
//! module.add(b.finish()?);
//! let mut program = Program::new();
//! program.modules.push(module);
//!
//! let compiler = Compiler::new(CompileOptions::default());
//! let result = compiler.compile(&program, Arc::new(ClassHierarchy::new()))?;
//!
//! // the acquire fence already orders the load
//! assert_eq!(result.fence_report.map(|r| r.loads_weakened), Some(1));
//! assert!(result.module.function("reader").is_some());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! graph ──► compiler::fence ──► compiler::lower ──► compiler::ir
//!   │            │
//!   │            └── reachability (virtual call targets)
//!   └── parallel (per-module analysis, per-function lowering)
//! ```
//!
//! ### Main Components
//!
//! - [`graph`] - Program graph: nodes, blocks, atomicity modes, schedule
//! - [`reachability`] - Virtual dispatch targets from a class hierarchy
//! - [`compiler::fence`] - Fence analysis, hazard detection and weakening
//! - [`compiler::lower`] - Node-to-IR lowering visitor
//! - [`compiler::ir`] - Low-level IR and its textual form
//! - [`parallel`] - Bounded worker pool
//!
//! ## Error Handling
//!
//! Conditions that stop a compilation unit are [`Error`] values. Problems
//! with single nodes are collected in a
//! [`CompilationContext`](compiler::CompilationContext); `compile` fails at
//! the end if any of them is an error. A fence optimization that cannot be
//! proven safe is skipped, never reported as an error.
//!
//! ## Logging
//!
//! The crate logs through `tracing` and never installs a subscriber.

#![warn(missing_docs)]

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod compiler;
pub mod error;
pub mod graph;
pub mod parallel;
pub mod reachability;

// Re-export main types
pub use compiler::{CompileOptions, CompileResult, Compiler};
pub use error::{Error, ErrorSeverity, Result};
pub use graph::{FunctionBody, FunctionBuilder, MemoryAtomicityMode, Program, ProgramModule};
pub use reachability::{ClassHierarchy, Reachability};
