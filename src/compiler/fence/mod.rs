//! # Memory fence optimization
//!
//! Whole-program pass that weakens atomicity modes of loads, stores and
//! fences when an immediately preceding memory operation, possibly the tail
//! of a called function, already provides the ordering.
//!
//! ```text
//! Program ──FenceAnalyzer (per module, parallel)──► AnalysisSession
//!                                                      │
//!                       hazard::find_hazards ◄─────────┤  read only
//!                                                      │
//!                FencePass::weaken_function ◄──────────┘  single writer
//! ```
//!
//! Every decision the pass cannot make with certainty leaves the node at
//! its original mode.

pub mod analyzer;
pub mod hazard;
pub mod optimizer;
pub mod session;

pub use analyzer::{BlockInfo, FenceAnalyzer};
pub use hazard::{find_iriw, find_sb, HazardReport};
pub use optimizer::{FenceOptimizer, FenceReport};
pub use session::{AnalysisSession, FunctionInfo, MemoryNode, Tail, TailSet, WeakenState};
