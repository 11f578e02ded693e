//! Store-buffering and IRIW litmus detection
//!
//! Both detectors read the analysis session and never touch a mode. Calls
//! are seen through a caller-supplied resolver that maps a call node to the
//! tail of its callee(s), `None` when it cannot be resolved.
//!
//! ```text
//! SB                          IRIW
//!   T1: st X ; ld Y             T1: st X      T3: ld X ; ld Y
//!   T2: st Y ; ld X             T2: st Y      T4: ld Y ; ld X
//! ```

use super::session::{AnalysisSession, MemoryNode, TailSet};
use crate::graph::MemoryAtomicityMode;
use serde::Serialize;

/// Hazards found in the whole program
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HazardReport {
    /// Store-buffering pattern present
    pub sb: bool,
    /// Independent-reads-of-independent-writes pattern present
    pub iriw: bool,
}

impl HazardReport {
    /// True if either pattern was found
    pub fn any(&self) -> bool {
        self.sb || self.iriw
    }
}

/// Run both detectors
pub fn find_hazards<R>(session: &AnalysisSession, resolve: &mut R) -> HazardReport
where
    R: FnMut(&MemoryNode) -> Option<TailSet>,
{
    let report = HazardReport {
        sb: find_sb(session, resolve),
        iriw: find_iriw(session, resolve),
    };
    tracing::info!("Hazards: SB={} IRIW={}", report.sb, report.iriw);
    report
}

fn same(a: &MemoryNode, b: &MemoryNode) -> bool {
    match (a.node().handle(), b.node().handle()) {
        (Some(x), Some(y)) => x.same_location(y),
        _ => false,
    }
}

fn is_seq_cst_fence(node: &MemoryNode) -> bool {
    let node = node.node();
    node.is_fence() && node.mode() == Some(MemoryAtomicityMode::SequentiallyConsistent)
}

enum Step {
    /// Keep scanning backwards
    Continue,
    /// Stop scanning
    Stop,
}

/// Hand every memory node that may precede a load to `visit`, nearest
/// first, seeing through calls. Blocks that reach their start continue
/// into the incoming frontier.
fn scan_predecessors<R, V>(session: &AnalysisSession, resolve: &mut R, mut visit: V)
where
    R: FnMut(&MemoryNode) -> Option<TailSet>,
    V: FnMut(&MemoryNode, &MemoryNode) -> Step,
{
    for name in session.function_names() {
        let Some(info) = session.get(&name) else {
            continue;
        };
        for block in info.blocks.iter().filter(|b| !b.failed) {
            for (i, &id) in block.list.iter().enumerate() {
                let current = info.memory_node(id);
                if !current.node().is_load() {
                    continue;
                }
                let mut reached_start = true;
                for &prev_id in block.list[..i].iter().rev() {
                    let prev = info.memory_node(prev_id);
                    if let Some(Step::Stop) = through_call(&prev, resolve, &current, &mut visit) {
                        reached_start = false;
                        break;
                    }
                }
                if reached_start {
                    for &prev_id in &block.incoming {
                        let prev = info.memory_node(prev_id);
                        through_call(&prev, resolve, &current, &mut visit);
                    }
                }
            }
        }
    }
}

/// Visit `prev`, or every node of its tail when it is a call.
/// `None` when the call could not be resolved.
fn through_call<R, V>(
    prev: &MemoryNode,
    resolve: &mut R,
    current: &MemoryNode,
    visit: &mut V,
) -> Option<Step>
where
    R: FnMut(&MemoryNode) -> Option<TailSet>,
    V: FnMut(&MemoryNode, &MemoryNode) -> Step,
{
    if !prev.node().is_call() {
        return Some(visit(prev, current));
    }
    let tail = resolve(prev)?;
    if tail.is_empty() {
        return Some(Step::Continue);
    }
    for node in &tail.nodes {
        visit(node, current);
    }
    Some(Step::Stop)
}

/// Store-buffering: a store to X followed (without an intervening load or
/// seq_cst fence) by a load of Y, plus a store to Y followed by a load of X.
pub fn find_sb<R>(session: &AnalysisSession, resolve: &mut R) -> bool
where
    R: FnMut(&MemoryNode) -> Option<TailSet>,
{
    let mut pairs: Vec<(MemoryNode, MemoryNode)> = Vec::new();
    scan_predecessors(session, resolve, |prev, load| {
        let node = prev.node();
        if node.is_store() {
            pairs.push((prev.clone(), load.clone()));
            Step::Continue
        } else if node.is_load() || is_seq_cst_fence(prev) {
            Step::Stop
        } else {
            Step::Continue
        }
    });
    tracing::debug!("SB: {} store-load pairs", pairs.len());

    for (s1, l1) in &pairs {
        if same(s1, l1) {
            continue;
        }
        for (s2, l2) in &pairs {
            if same(s2, l1) && same(s1, l2) {
                tracing::debug!("SB: {:?}->{:?} / {:?}->{:?}", s1, l1, s2, l2);
                return true;
            }
        }
    }
    false
}

/// IRIW: one load sequence reads X then Y, another reads Y then X, and both
/// locations are written somewhere.
pub fn find_iriw<R>(session: &AnalysisSession, resolve: &mut R) -> bool
where
    R: FnMut(&MemoryNode) -> Option<TailSet>,
{
    let mut pairs: Vec<(MemoryNode, MemoryNode)> = Vec::new();
    scan_predecessors(session, resolve, |prev, load| {
        let node = prev.node();
        if node.is_load() {
            pairs.push((prev.clone(), load.clone()));
            Step::Stop
        } else if node.is_store() || is_seq_cst_fence(prev) {
            Step::Stop
        } else {
            Step::Continue
        }
    });
    if pairs.is_empty() {
        return false;
    }

    let mut stores: Vec<MemoryNode> = Vec::new();
    for name in session.function_names() {
        let Some(info) = session.get(&name) else {
            continue;
        };
        for block in &info.blocks {
            for &id in &block.list {
                let node = info.memory_node(id);
                if node.node().is_store() {
                    stores.push(node);
                }
            }
        }
    }
    let written = |load: &MemoryNode| stores.iter().any(|s| same(s, load));
    tracing::debug!(
        "IRIW: {} load-load pairs, {} stores",
        pairs.len(),
        stores.len()
    );

    for (l1, l2) in &pairs {
        if same(l1, l2) || !written(l1) || !written(l2) {
            continue;
        }
        for (l3, l4) in &pairs {
            if same(l1, l4) && same(l2, l3) {
                tracing::debug!("IRIW: {:?},{:?} / {:?},{:?}", l1, l2, l3, l4);
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::FenceOptions;
    use crate::graph::{FunctionBuilder, MemoryAtomicityMode::*, Type, ValueHandle};
    use crate::reachability::ClassHierarchy;
    use std::sync::Arc;

    fn session() -> AnalysisSession {
        AnalysisSession::new(Arc::new(ClassHierarchy::new()), FenceOptions::default())
    }

    fn add(session: &AnalysisSession, b: FunctionBuilder) {
        session
            .analyze_function(Arc::new(b.finish().unwrap()))
            .unwrap();
    }

    fn store_then_load(name: &str, store: &str, load: &str, fence: bool) -> FunctionBuilder {
        let mut b = FunctionBuilder::new(name, vec![], Type::Void);
        let one = b.int(Type::s32(), 1);
        b.store(ValueHandle::global(store), one, Release);
        if fence {
            b.fence(SequentiallyConsistent);
        }
        b.load(ValueHandle::global(load), Type::s32(), Acquire);
        b.ret();
        b
    }

    fn no_calls(_: &MemoryNode) -> Option<TailSet> {
        None
    }

    #[test]
    fn test_sb_seq_cst_fence_breaks_pattern() {
        let s = session();
        add(&s, store_then_load("t1", "A", "B", true));
        add(&s, store_then_load("t2", "B", "A", false));
        assert!(!find_sb(&s, &mut no_calls));
    }

    #[test]
    fn test_iriw() {
        let s = session();
        for (name, loc) in [("w1", "X"), ("w2", "Y")] {
            let mut b = FunctionBuilder::new(name, vec![], Type::Void);
            let one = b.int(Type::s32(), 1);
            b.store(ValueHandle::global(loc), one, SequentiallyConsistent);
            b.ret();
            add(&s, b);
        }
        for (name, first, second) in [("r1", "X", "Y"), ("r2", "Y", "X")] {
            let mut b = FunctionBuilder::new(name, vec![], Type::Void);
            b.load(ValueHandle::global(first), Type::s32(), Acquire);
            b.load(ValueHandle::global(second), Type::s32(), Acquire);
            b.ret();
            add(&s, b);
        }
        let report = find_hazards(&s, &mut no_calls);
        assert!(report.iriw);
        assert!(!report.sb);
        assert!(report.any());
    }

    #[test]
    fn test_iriw_needs_both_orders() {
        let s = session();
        let mut b = FunctionBuilder::new("r", vec![], Type::Void);
        b.load(ValueHandle::global("X"), Type::s32(), Acquire);
        b.load(ValueHandle::global("Y"), Type::s32(), Acquire);
        b.ret();
        add(&s, b);
        assert!(!find_iriw(&s, &mut no_calls));
    }
}
