//! Program graph model
//!
//! The typed SSA graph the backend consumes. Nodes live in a per-function
//! arena; blocks group the ids the scheduler placed in them and end in one
//! terminator.
//!
//! ```text
//! Program
//!   └── ProgramModule*
//!         └── FunctionBody (Arc, shared with the fence pass)
//!               ├── nodes: [Node]          arena, indexed by NodeId
//!               └── blocks: [BasicBlock]   scheduled NodeIds + terminator
//! ```

pub mod builder;
pub mod function;
pub mod mode;
pub mod node;
pub mod schedule;
pub mod types;

pub use builder::FunctionBuilder;
pub use function::{BasicBlock, FunctionBody, Program, ProgramModule};
pub use mode::{MemoryAtomicityMode, ModeCell};
pub use node::{
    BinaryOp, BlockId, CallKind, CallTarget, CompareOp, ElementIndex, MethodRef, Node,
    NodeCategory, NodeId, NodeKind, ValueHandle,
};
pub use schedule::{BlockSchedule, Schedule};
pub use types::Type;
