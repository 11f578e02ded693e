//! # Low-level IR
//!
//! Target-independent SSA form produced by the lowering visitor and handed to
//! an external code generator. Rendering lives in [`crate::compiler::debug`].
//!
//! ## Module Structure
//!
//! ```text
//! ir/
//! ├── mod.rs          # This file - module definition and re-exports
//! ├── types.rs        # LlType (i1..i64, float, double, pointers)
//! ├── instruction.rs  # LlValue, Instruction, Phi, TerminatorInst
//! └── program.rs      # LlBasicBlock, FunctionDefinition, LlModule
//! ```
//!
//! ## Key Types
//!
//! - [`LlValue`] - Operand: local, argument, constant or global
//! - [`Instruction`] - Arithmetic, compare, cast, memory and call instructions
//! - [`FunctionDefinition`] - Blocks of one function plus local numbering
//! - [`LlModule`] - Definitions of one output module, sorted by name

mod instruction;
mod program;
mod types;

pub use instruction::{
    AtomicOrdering, BinOp, BlockRef, CastOp, FCmpCond, ICmpCond, Instruction, LlValue, Phi,
    TerminatorInst,
};
pub use program::{FunctionDefinition, LlBasicBlock, LlModule};
pub use types::LlType;
