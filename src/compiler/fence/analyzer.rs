//! Intraprocedural fence analysis
//!
//! For every reachable block: the memory-relevant nodes in program order and
//! the incoming frontier, i.e. the nodes that may have executed last before
//! control enters the block.
//!
//! ```text
//! exit(b)     = last(list(b))            if list(b) is non-empty
//!             = incoming(b)              otherwise
//! incoming(b) = ∪ exit(p) for p in preds(b)      (iterated to a fixpoint)
//! open(b)     = b is the entry block
//!               or some pred p has an empty list and open(p)
//! ```
//!
//! An open block can be entered on a path from function entry that crossed
//! no memory operation, so its incoming set does not cover every path.

use super::session::FunctionInfo;
use crate::compiler::FenceOptions;
use crate::error::{Error, Result};
use crate::graph::{BlockId, FunctionBody, NodeId};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Analysis result for one basic block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    /// Block id
    pub block: BlockId,
    /// Loads, stores, fences and calls in program order
    pub list: Vec<NodeId>,
    /// Frontier visible at block entry, sorted by id
    pub incoming: Vec<NodeId>,
    /// Some path from function entry reaches this block without passing a
    /// memory operation
    pub open: bool,
    /// Incoming frontier unknown; the block is never optimized
    pub failed: bool,
    /// The block ends in a return
    pub is_return: bool,
}

/// Builds [`FunctionInfo`]s
#[derive(Debug, Clone)]
pub struct FenceAnalyzer {
    max_nodes: usize,
    max_blocks: usize,
}

impl FenceAnalyzer {
    /// Analyzer with the size ceilings of `options`
    pub fn new(options: &FenceOptions) -> Self {
        Self {
            max_nodes: options.max_function_nodes,
            max_blocks: options.max_function_blocks,
        }
    }

    /// Analyze `body`
    ///
    /// Fails with [`Error::FunctionTooBig`] when either ceiling is exceeded;
    /// the caller skips the function and carries on with the others.
    pub fn execute(&self, body: Arc<FunctionBody>) -> Result<FunctionInfo> {
        let order = body.reachable_blocks();
        if order.len() > self.max_blocks {
            return Err(Error::FunctionTooBig {
                function: body.name().to_string(),
                nodes: order.len(),
                limit: self.max_blocks,
            });
        }

        let mut handlers: FxHashSet<BlockId> = FxHashSet::default();
        for &block in &order {
            handlers.extend(body.exception_successors(block));
        }

        let mut position: FxHashMap<BlockId, usize> = FxHashMap::default();
        let mut infos = Vec::with_capacity(order.len());
        let mut total = 0usize;
        for (i, &block) in order.iter().enumerate() {
            position.insert(block, i);
            let list: Vec<NodeId> = body
                .block(block)
                .nodes
                .iter()
                .copied()
                .filter(|&id| body.node(id).is_memory_relevant())
                .collect();
            total += list.len();
            if total > self.max_nodes {
                return Err(Error::FunctionTooBig {
                    function: body.name().to_string(),
                    nodes: total,
                    limit: self.max_nodes,
                });
            }
            infos.push(BlockInfo {
                block,
                list,
                incoming: Vec::new(),
                open: block == body.entry(),
                // entered by unwinding, which this analysis does not follow
                failed: handlers.contains(&block) || body.is_handler_block(block),
                is_return: body.terminator(block).is_return(),
            });
        }

        // predecessors restricted to reachable blocks
        let preds: Vec<Vec<usize>> = order
            .iter()
            .map(|&block| {
                body.predecessors(block)
                    .iter()
                    .filter_map(|p| position.get(p).copied())
                    .collect()
            })
            .collect();

        let mut incoming: Vec<BTreeSet<NodeId>> = vec![BTreeSet::new(); infos.len()];
        let mut changed = true;
        while changed {
            changed = false;
            for i in 0..infos.len() {
                for &p in &preds[i] {
                    let exit: Vec<NodeId> = match infos[p].list.last() {
                        Some(&last) => vec![last],
                        None => incoming[p].iter().copied().collect(),
                    };
                    for id in exit {
                        changed |= incoming[i].insert(id);
                    }
                    if !infos[p].list.is_empty() {
                        continue;
                    }
                    if infos[p].open && !infos[i].open {
                        infos[i].open = true;
                        changed = true;
                    }
                    if infos[p].failed && !infos[i].failed {
                        infos[i].failed = true;
                        changed = true;
                    }
                }
            }
        }

        for (info, set) in infos.iter_mut().zip(incoming) {
            info.incoming = set.into_iter().collect();
            if info.failed {
                tracing::debug!("{}: block {} failed", body.name(), info.block);
            }
        }

        tracing::debug!(
            "analyzed {} ({} blocks, {} memory nodes)",
            body.name(),
            infos.len(),
            total
        );
        Ok(FunctionInfo::new(body, infos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{CallTarget, FunctionBuilder, MemoryAtomicityMode, Type, ValueHandle};

    fn options() -> FenceOptions {
        FenceOptions::default()
    }

    #[test]
    fn test_loop_incoming_reaches_fixpoint() {
        let mut b = FunctionBuilder::new("loop", vec![Type::Boolean], Type::Void);
        let cond = b.param(0);
        let header = b.new_block();
        let body_block = b.new_block();
        let exit = b.new_block();
        let store = b.store(
            ValueHandle::global("x"),
            cond,
            MemoryAtomicityMode::Release,
        );
        b.goto(header);
        b.switch_to(header);
        b.if_(cond, body_block, exit);
        b.switch_to(body_block);
        let load = b.load(ValueHandle::global("y"), Type::s32(), MemoryAtomicityMode::Acquire);
        b.goto(header);
        b.switch_to(exit);
        b.ret();

        let info = FenceAnalyzer::new(&options())
            .execute(Arc::new(b.finish().unwrap()))
            .unwrap();
        let header_info = info.block(header).unwrap();
        assert!(header_info.list.is_empty());
        assert_eq!(header_info.incoming, vec![store, load]);
        // header has an empty list, so exit sees the header's incoming set
        assert_eq!(info.block(exit).unwrap().incoming, vec![store, load]);
        assert!(info.block(exit).unwrap().is_return);
        assert!(info.block(BlockId(0)).unwrap().open);
        assert!(!header_info.open);
        assert!(!info.block(exit).unwrap().open);
    }

    #[test]
    fn test_empty_path_from_entry_marks_join_open() {
        let mut b = FunctionBuilder::new("diamond", vec![Type::Boolean], Type::Void);
        let cond = b.param(0);
        let left = b.new_block();
        let join = b.new_block();
        let tail = b.new_block();
        b.if_(cond, left, join);
        b.switch_to(left);
        let fence = b.fence(MemoryAtomicityMode::Acquire);
        b.goto(join);
        b.switch_to(join);
        b.goto(tail);
        b.switch_to(tail);
        b.ret();

        let info = FenceAnalyzer::new(&options())
            .execute(Arc::new(b.finish().unwrap()))
            .unwrap();
        assert!(!info.block(left).unwrap().open);
        let join_info = info.block(join).unwrap();
        assert_eq!(join_info.incoming, vec![fence]);
        assert!(join_info.open);
        // carried through the empty join
        assert!(info.block(tail).unwrap().open);
    }

    #[test]
    fn test_too_big() {
        let mut b = FunctionBuilder::new("big", vec![], Type::Void);
        for _ in 0..5 {
            b.fence(MemoryAtomicityMode::SequentiallyConsistent);
        }
        b.ret();
        let opts = FenceOptions {
            max_function_nodes: 4,
            ..FenceOptions::default()
        };
        let err = FenceAnalyzer::new(&opts)
            .execute(Arc::new(b.finish().unwrap()))
            .unwrap_err();
        assert!(matches!(err, Error::FunctionTooBig { limit: 4, .. }));
    }

    #[test]
    fn test_handler_block_fails() {
        let mut b = FunctionBuilder::new("try", vec![], Type::Void);
        let handler = b.new_block();
        let after = b.new_block();
        b.invoke(CallTarget::Function("callee".into()), vec![], Type::Void, handler);
        b.ret();
        b.switch_to(handler);
        b.catch("java/lang/Throwable");
        b.goto(after);
        b.switch_to(after);
        b.ret();

        let info = FenceAnalyzer::new(&options())
            .execute(Arc::new(b.finish().unwrap()))
            .unwrap();
        assert!(!info.block(BlockId(0)).unwrap().failed);
        assert!(info.block(handler).unwrap().failed);
        // empty failed predecessor: frontier unknown
        assert!(info.block(after).unwrap().failed);
    }
}
