//! # Interprocedural fence weakening
//!
//! Drives the analyzer over the whole program, resolves calls to their
//! callees' tails and moves atomicity modes down where an immediately
//! preceding memory operation already provides the ordering:
//!
//! - `Load(ACQUIRE)` after `Fence(ACQUIRE)` becomes `UNORDERED`
//! - `Load(ACQUIRE)` after a release-or-stronger `Store` becomes `UNORDERED`
//!   (earlier versions of this pass accepted only a
//!   `SEQUENTIALLY_CONSISTENT` store; a `RELEASE` store is accepted on
//!   purpose)
//! - `Fence(RELEASE)` after a `Store(SEQUENTIALLY_CONSISTENT)` becomes `UNORDERED`
//! - with [`HazardPolicy::Gating`] and no hazard in the program, a
//!   `Store(SEQUENTIALLY_CONSISTENT)` after any memory operation becomes
//!   `RELEASE`
//!
//! Anything that cannot be resolved leaves the node at its current mode. So
//! does a block that some path from function entry reaches without passing a
//! memory operation: its predecessors do not cover every path.

use super::analyzer::FenceAnalyzer;
use super::hazard::{self, HazardReport};
use super::session::{AnalysisSession, FunctionInfo, MemoryNode, Tail, TailSet, WeakenState};
use crate::compiler::context::CompilationContext;
use crate::compiler::{FenceOptions, HazardPolicy};
use crate::error::Result;
use crate::graph::{CallTarget, MemoryAtomicityMode, NodeKind, Program, ProgramModule};
use crate::parallel::{run_parallel_task, ParallelConfig};
use crate::reachability::Reachability;
use serde::Serialize;
use std::sync::Arc;

/// Statistics of one fence optimization run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FenceReport {
    /// Functions with analysis results
    pub functions_analyzed: usize,
    /// Functions skipped for exceeding a size ceiling
    pub functions_too_big: usize,
    /// Loads moved to a weaker mode
    pub loads_weakened: usize,
    /// Fences moved to a weaker mode
    pub fences_weakened: usize,
    /// Stores moved to a weaker mode
    pub stores_weakened: usize,
    /// Store-buffering pattern present
    pub sb_found: bool,
    /// IRIW pattern present
    pub iriw_found: bool,
}

impl FenceReport {
    /// Total number of weakened nodes
    pub fn total_weakened(&self) -> usize {
        self.loads_weakened + self.fences_weakened + self.stores_weakened
    }
}

/// Whole-program fence optimizer
#[derive(Debug, Clone, Default)]
pub struct FenceOptimizer {
    options: FenceOptions,
}

impl FenceOptimizer {
    /// Create an optimizer
    pub fn new(options: FenceOptions) -> Self {
        Self { options }
    }

    /// Analyze every function, one work item per program module
    ///
    /// Functions over a size ceiling get a warning and stay out of the
    /// session; calls to them are treated as unresolved.
    pub fn analyze(
        &self,
        ctxt: &CompilationContext,
        program: &Program,
        reachability: Arc<dyn Reachability + Send + Sync>,
        parallel: &ParallelConfig,
    ) -> Result<AnalysisSession> {
        let session = AnalysisSession::new(reachability, self.options.clone());
        let modules: Vec<&ProgramModule> = program.modules.iter().collect();

        run_parallel_task(
            modules,
            parallel,
            || FenceAnalyzer::new(&self.options),
            |analyzer, module| {
                for body in &module.functions {
                    match analyzer.execute(Arc::clone(body)) {
                        Ok(info) => {
                            session.insert_if_absent(info);
                        }
                        Err(e) => {
                            ctxt.warning(
                                body.name(),
                                format!("Fence optimization skipped: {}", e),
                            );
                            session.record_skipped();
                        }
                    }
                }
            },
        )?;

        tracing::debug!(
            "Fence analysis: {} functions, {} skipped",
            session.len(),
            session.skipped()
        );
        Ok(session)
    }

    /// Look for SB and IRIW patterns; modes are left untouched
    pub fn find_hazards(&self, session: &AnalysisSession) -> HazardReport {
        let mut pass = FencePass::new(session, false, false);
        hazard::find_hazards(session, &mut |node: &MemoryNode| pass.resolve_call(node))
    }

    /// Weaken every analyzed function in name order
    pub fn optimize(&self, session: &AnalysisSession) -> FenceReport {
        let hazards = self.find_hazards(session);
        let store_rule = self.options.hazard_policy == HazardPolicy::Gating && !hazards.any();

        let mut pass = FencePass::new(session, true, store_rule);
        for name in session.function_names() {
            if let Some(info) = session.get(&name) {
                pass.weaken_function(&info);
            }
        }

        let mut report = pass.report;
        report.functions_analyzed = session.len();
        report.functions_too_big = session.skipped();
        report.sb_found = hazards.sb;
        report.iriw_found = hazards.iriw;
        tracing::info!(
            "Fence optimization: {} functions, {} loads, {} fences, {} stores weakened",
            report.functions_analyzed,
            report.loads_weakened,
            report.fences_weakened,
            report.stores_weakened
        );
        report
    }

    /// Analyze then optimize
    pub fn run(
        &self,
        ctxt: &CompilationContext,
        program: &Program,
        reachability: Arc<dyn Reachability + Send + Sync>,
        parallel: &ParallelConfig,
    ) -> Result<FenceReport> {
        let session = self.analyze(ctxt, program, reachability, parallel)?;
        Ok(self.optimize(&session))
    }
}

/// One resolution or weakening sweep over a session
struct FencePass<'s> {
    session: &'s AnalysisSession,
    /// Weaken callees before reading their tails
    weakening: bool,
    store_rule: bool,
    report: FenceReport,
}

impl<'s> FencePass<'s> {
    fn new(session: &'s AnalysisSession, weakening: bool, store_rule: bool) -> Self {
        Self {
            session,
            weakening,
            store_rule,
            report: FenceReport::default(),
        }
    }

    /// Memoized tail of `info`; a function already on the stack is
    /// `Unresolved`
    fn tail_of(&mut self, info: &Arc<FunctionInfo>) -> Tail {
        if let Some(tail) = info.tail() {
            return tail.clone();
        }
        if !info.begin_tail() {
            tracing::debug!("Tail cycle through {}", info.name());
            return Tail::Unresolved;
        }
        let tail = self.compute_tail(info);
        info.finish_tail(tail).clone()
    }

    fn compute_tail(&mut self, info: &Arc<FunctionInfo>) -> Tail {
        let mut set = TailSet::default();
        let mut empty_path = false;

        for block in info.blocks.iter().filter(|b| b.is_return) {
            if block.failed {
                return Tail::Failed;
            }
            let mut found = false;
            for &id in block.list.iter().rev() {
                let node = info.memory_node(id);
                if !node.node().is_call() {
                    set.insert(node);
                    found = true;
                    break;
                }
                match self.resolve_call(&node) {
                    None => return Tail::Unresolved,
                    Some(tail) if tail.is_empty() => set.open |= tail.open,
                    Some(tail) => {
                        set.extend(tail);
                        found = true;
                        break;
                    }
                }
            }
            if found {
                continue;
            }

            // a path from entry with no memory operation on it
            if block.open {
                empty_path = true;
            }
            if block.incoming.is_empty() {
                empty_path = true;
                continue;
            }
            for &id in &block.incoming {
                let node = info.memory_node(id);
                if !node.node().is_call() {
                    set.insert(node);
                    continue;
                }
                match self.resolve_call(&node) {
                    None => return Tail::Unresolved,
                    Some(tail) if tail.is_empty() => set.open = true,
                    Some(tail) => set.extend(tail),
                }
            }
        }

        if empty_path && !set.is_empty() {
            tracing::debug!("Return paths of {} disagree", info.name());
            return Tail::Failed;
        }
        Tail::Resolved(set)
    }

    /// Tail of the callee(s) of a call node, `None` if unknown
    fn resolve_call(&mut self, call: &MemoryNode) -> Option<TailSet> {
        let NodeKind::Call { target, .. } = &call.node().kind else {
            return None;
        };
        match target {
            CallTarget::Function(name) | CallTarget::FunctionDeclaration(name) => {
                self.callee_tail(name)
            }
            CallTarget::Virtual(method) => {
                let session = self.session;
                let Some(names) = session
                    .reachability()
                    .reachable_overriding_implementations(method)
                else {
                    tracing::debug!("No reachability data for {}", method);
                    return None;
                };
                match names.as_slice() {
                    [] => {
                        tracing::debug!("No reachable implementation of {}", method);
                        None
                    }
                    [only] => self.callee_tail(only),
                    _ => {
                        let mut union = TailSet::default();
                        for name in &names {
                            let tail = self.callee_tail(name)?;
                            union.open |= tail.is_empty();
                            union.extend(tail);
                        }
                        Some(union)
                    }
                }
            }
            CallTarget::Indirect(_) => None,
        }
    }

    fn callee_tail(&mut self, name: &str) -> Option<TailSet> {
        let Some(callee) = self.session.get(name) else {
            tracing::debug!("No record on {}", name);
            return None;
        };
        if self.weakening {
            if callee.state() == WeakenState::Weakening {
                tracing::debug!("{} is being weakened", name);
                return None;
            }
            self.weaken_function(&callee);
        }
        match self.tail_of(&callee) {
            Tail::Resolved(set) => Some(set),
            _ => None,
        }
    }

    fn weaken_function(&mut self, info: &Arc<FunctionInfo>) {
        if !info.begin_weakening() {
            return;
        }
        tracing::debug!("Weakening {}", info.name());

        // stores first, so the fence rule reads final store modes
        for stores in [true, false] {
            if stores && !self.store_rule {
                continue;
            }
            for block in info.blocks.iter().filter(|b| !b.failed) {
                for (i, &id) in block.list.iter().enumerate() {
                    let target = info.memory_node(id);
                    let node = target.node();
                    if node.is_call() || node.is_store() != stores {
                        continue;
                    }
                    let mut decided = false;
                    for &prev in block.list[..i].iter().rev() {
                        if self.weaken_pair(&target, &info.memory_node(prev)) {
                            decided = true;
                            break;
                        }
                    }
                    if !decided {
                        let prevs: Vec<MemoryNode> = block
                            .incoming
                            .iter()
                            .map(|&id| info.memory_node(id))
                            .collect();
                        self.weaken_set(&target, &prevs, block.open);
                    }
                }
            }
        }

        self.tail_of(info);
        info.finish_weakening();
    }

    /// Decide `target` against its nearest predecessor in the block.
    /// False only when `prev` is a call with no visible memory operation.
    fn weaken_pair(&mut self, target: &MemoryNode, prev: &MemoryNode) -> bool {
        if prev.node().is_call() {
            return self.weaken_set(target, std::slice::from_ref(prev), false);
        }
        if let Some(mode) = self.rule(target, prev) {
            self.apply(target, mode);
        }
        true
    }

    /// Decide `target` against every effective predecessor at once.
    /// `open` marks that some path reaches `target` past none of `prevs`.
    /// False when the set is empty once calls are resolved.
    fn weaken_set(&mut self, target: &MemoryNode, prevs: &[MemoryNode], open: bool) -> bool {
        let mut set = TailSet::default();
        let mut empty_path = open;
        for prev in prevs {
            if !prev.node().is_call() {
                set.insert(prev.clone());
                continue;
            }
            match self.resolve_call(prev) {
                None => return true,
                Some(tail) if tail.is_empty() => empty_path = true,
                Some(tail) => {
                    empty_path |= tail.open;
                    set.extend(tail);
                }
            }
        }
        if set.is_empty() {
            return false;
        }
        // some path reaches further back than this set
        if empty_path {
            return true;
        }

        let modes: Vec<MemoryAtomicityMode> =
            set.nodes.iter().filter_map(|n| n.node().mode()).collect();
        if modes.contains(&MemoryAtomicityMode::Acquire)
            && modes.contains(&MemoryAtomicityMode::Release)
        {
            return true;
        }

        let mut decided: Option<MemoryAtomicityMode> = None;
        for prev in &set.nodes {
            match self.rule(target, prev) {
                Some(mode) if decided.map_or(true, |d| d == mode) => decided = Some(mode),
                _ => return true,
            }
        }
        if let Some(mode) = decided {
            self.apply(target, mode);
        }
        true
    }

    /// Mode `target` may drop to given the non-call predecessor `prev`
    fn rule(&self, target: &MemoryNode, prev: &MemoryNode) -> Option<MemoryAtomicityMode> {
        use MemoryAtomicityMode::*;

        let (t, p) = (target.node(), prev.node());
        let (tm, pm) = (t.mode()?, p.mode()?);
        if t.is_load() && tm == Acquire {
            if p.is_fence() && pm == Acquire {
                return Some(Unordered);
            }
            if p.is_store() && pm.is_release_or_stronger() {
                return Some(Unordered);
            }
        }
        if t.is_fence() && tm == Release && p.is_store() && pm == SequentiallyConsistent {
            return Some(Unordered);
        }
        if self.store_rule && t.is_store() && tm == SequentiallyConsistent {
            return Some(Release);
        }
        None
    }

    fn apply(&mut self, target: &MemoryNode, mode: MemoryAtomicityMode) {
        let node = target.node();
        let Some(cell) = node.mode_cell() else {
            return;
        };
        let before = cell.get();
        if !cell.weaken_to(mode) {
            return;
        }
        tracing::debug!(
            "Weakened {:?} {} from {} to {}",
            target,
            node.kind_name(),
            before,
            mode
        );
        if node.is_load() {
            self.report.loads_weakened += 1;
        } else if node.is_fence() {
            self.report.fences_weakened += 1;
        } else if node.is_store() {
            self.report.stores_weakened += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{
        BlockId, CallKind, FunctionBody, FunctionBuilder, MemoryAtomicityMode::*, NodeId, Type,
        ValueHandle,
    };
    use crate::reachability::ClassHierarchy;

    fn session(policy: HazardPolicy) -> AnalysisSession {
        let options = FenceOptions {
            hazard_policy: policy,
            ..FenceOptions::default()
        };
        AnalysisSession::new(Arc::new(ClassHierarchy::new()), options)
    }

    fn add(session: &AnalysisSession, b: FunctionBuilder) -> Arc<FunctionBody> {
        let body = Arc::new(b.finish().unwrap());
        session.analyze_function(Arc::clone(&body)).unwrap();
        body
    }

    fn mode(body: &FunctionBody, id: NodeId) -> MemoryAtomicityMode {
        body.node(id).mode().unwrap()
    }

    fn optimize(session: &AnalysisSession) -> FenceReport {
        FenceOptimizer::new(session.options().clone()).optimize(session)
    }

    #[test]
    fn test_load_after_release_store() {
        let s = session(HazardPolicy::Advisory);
        let mut b = FunctionBuilder::new("f", vec![], Type::Void);
        let one = b.int(Type::s32(), 1);
        b.store(ValueHandle::global("x"), one, Release);
        let load = b.load(ValueHandle::global("y"), Type::s32(), Acquire);
        b.ret();
        let body = add(&s, b);

        let report = optimize(&s);
        assert_eq!(mode(&body, load), Unordered);
        assert_eq!(report.loads_weakened, 1);
    }

    #[test]
    fn test_release_fence_after_seq_cst_store() {
        let s = session(HazardPolicy::Advisory);
        let mut b = FunctionBuilder::new("f", vec![], Type::Void);
        let one = b.int(Type::s32(), 1);
        let store = b.store(ValueHandle::global("x"), one, SequentiallyConsistent);
        let fence = b.fence(Release);
        b.ret();
        let body = add(&s, b);

        optimize(&s);
        assert_eq!(mode(&body, fence), Unordered);
        // advisory policy never touches stores
        assert_eq!(mode(&body, store), SequentiallyConsistent);
    }

    #[test]
    fn test_gating_store_rule_keeps_fence() {
        let s = session(HazardPolicy::Gating);
        let mut b = FunctionBuilder::new("f", vec![], Type::Void);
        let one = b.int(Type::s32(), 1);
        let first = b.store(ValueHandle::global("x"), one, SequentiallyConsistent);
        let second = b.store(ValueHandle::global("y"), one, SequentiallyConsistent);
        let fence = b.fence(Release);
        b.ret();
        let body = add(&s, b);

        let report = optimize(&s);
        assert_eq!(mode(&body, first), SequentiallyConsistent);
        assert_eq!(mode(&body, second), Release);
        // the store it relied on is no longer seq_cst
        assert_eq!(mode(&body, fence), Release);
        assert_eq!(report.stores_weakened, 1);
    }

    #[test]
    fn test_mixed_incoming_modes_block_weakening() {
        let s = session(HazardPolicy::Advisory);
        let mut b = FunctionBuilder::new("f", vec![Type::Boolean], Type::Void);
        let cond = b.param(0);
        let left = b.new_block();
        let right = b.new_block();
        let join = b.new_block();
        b.if_(cond, left, right);
        b.switch_to(left);
        b.fence(Acquire);
        b.goto(join);
        b.switch_to(right);
        let one = b.int(Type::s32(), 1);
        b.store(ValueHandle::global("x"), one, Release);
        b.goto(join);
        b.switch_to(join);
        let load = b.load(ValueHandle::global("y"), Type::s32(), Acquire);
        b.ret();
        let body = add(&s, b);

        optimize(&s);
        assert_eq!(mode(&body, load), Acquire);
    }

    #[test]
    fn test_agreeing_incoming_modes_weaken() {
        let s = session(HazardPolicy::Advisory);
        let mut b = FunctionBuilder::new("f", vec![Type::Boolean], Type::Void);
        let cond = b.param(0);
        let left = b.new_block();
        let right = b.new_block();
        let join = b.new_block();
        b.if_(cond, left, right);
        b.switch_to(left);
        b.fence(Acquire);
        b.goto(join);
        b.switch_to(right);
        b.fence(Acquire);
        b.goto(join);
        b.switch_to(join);
        let load = b.load(ValueHandle::global("y"), Type::s32(), Acquire);
        b.ret();
        let body = add(&s, b);

        optimize(&s);
        assert_eq!(mode(&body, load), Unordered);
    }

    /// entry: if c then left else join; left: Fence(ACQUIRE); join
    fn fence_on_one_path(b: &mut FunctionBuilder) -> BlockId {
        let cond = b.param(0);
        let left = b.new_block();
        let join = b.new_block();
        b.if_(cond, left, join);
        b.switch_to(left);
        b.fence(Acquire);
        b.goto(join);
        b.switch_to(join);
        join
    }

    #[test]
    fn test_join_with_empty_path_keeps_load() {
        let s = session(HazardPolicy::Advisory);
        let mut b = FunctionBuilder::new("f", vec![Type::Boolean], Type::Void);
        fence_on_one_path(&mut b);
        let load = b.load(ValueHandle::global("y"), Type::s32(), Acquire);
        b.ret();
        let body = add(&s, b);

        let report = optimize(&s);
        assert_eq!(mode(&body, load), Acquire);
        assert_eq!(report.total_weakened(), 0);
    }

    #[test]
    fn test_callee_with_empty_path_to_return_fails() {
        let s = session(HazardPolicy::Advisory);
        let mut g = FunctionBuilder::new("g", vec![Type::Boolean], Type::Void);
        fence_on_one_path(&mut g);
        g.ret();
        add(&s, g);

        let mut b = FunctionBuilder::new("caller", vec![], Type::Void);
        let flag = b.bool(true);
        b.call(
            CallKind::Call,
            CallTarget::Function("g".into()),
            vec![flag],
            Type::Void,
        );
        let load = b.load(ValueHandle::global("y"), Type::s32(), Acquire);
        b.ret();
        let body = add(&s, b);

        optimize(&s);
        assert_eq!(s.get("g").unwrap().tail(), Some(&Tail::Failed));
        assert_eq!(mode(&body, load), Acquire);
    }

    #[test]
    fn test_call_tail_feeds_caller() {
        let s = session(HazardPolicy::Advisory);
        let mut callee = FunctionBuilder::new("callee", vec![], Type::Void);
        callee.fence(Acquire);
        callee.ret();
        add(&s, callee);

        let mut b = FunctionBuilder::new("caller", vec![], Type::Void);
        b.call(
            CallKind::Call,
            CallTarget::Function("callee".into()),
            vec![],
            Type::Void,
        );
        let load = b.load(ValueHandle::global("y"), Type::s32(), Acquire);
        b.ret();
        let body = add(&s, b);

        optimize(&s);
        assert_eq!(mode(&body, load), Unordered);
    }

    #[test]
    fn test_empty_callee_is_transparent() {
        let s = session(HazardPolicy::Advisory);
        let mut callee = FunctionBuilder::new("noop", vec![], Type::Void);
        callee.ret();
        add(&s, callee);

        let mut b = FunctionBuilder::new("caller", vec![], Type::Void);
        b.fence(Acquire);
        b.call(
            CallKind::Call,
            CallTarget::Function("noop".into()),
            vec![],
            Type::Void,
        );
        let load = b.load(ValueHandle::global("y"), Type::s32(), Acquire);
        b.ret();
        let body = add(&s, b);

        optimize(&s);
        assert_eq!(mode(&body, load), Unordered);
    }

    #[test]
    fn test_recursion_terminates_unresolved() {
        let s = session(HazardPolicy::Advisory);
        for (name, other) in [("even", "odd"), ("odd", "even")] {
            let mut b = FunctionBuilder::new(name, vec![], Type::Void);
            b.fence(Acquire);
            b.call(
                CallKind::Call,
                CallTarget::Function(other.into()),
                vec![],
                Type::Void,
            );
            b.ret();
            add(&s, b);
        }

        optimize(&s);
        let even = s.get("even").unwrap();
        let odd = s.get("odd").unwrap();
        assert_eq!(even.state(), WeakenState::Weakened);
        assert_eq!(odd.state(), WeakenState::Weakened);
        assert_eq!(even.tail(), Some(&Tail::Unresolved));
        assert_eq!(odd.tail(), Some(&Tail::Unresolved));
    }

    #[test]
    fn test_return_paths_disagree() {
        let s = session(HazardPolicy::Advisory);
        let mut b = FunctionBuilder::new("f", vec![Type::Boolean], Type::Void);
        let cond = b.param(0);
        let left = b.new_block();
        let right = b.new_block();
        b.if_(cond, left, right);
        b.switch_to(left);
        b.fence(Release);
        b.ret();
        b.switch_to(right);
        b.ret();
        add(&s, b);

        optimize(&s);
        assert_eq!(s.get("f").unwrap().tail(), Some(&Tail::Failed));
    }

    #[test]
    fn test_tail_walks_through_empty_return_block() {
        let s = session(HazardPolicy::Advisory);
        let mut b = FunctionBuilder::new("f", vec![], Type::Void);
        let exit = b.new_block();
        let fence = b.fence(Release);
        b.goto(exit);
        b.switch_to(exit);
        b.ret();
        add(&s, b);

        optimize(&s);
        let info = s.get("f").unwrap();
        let tail = info.tail().and_then(Tail::resolved).unwrap();
        assert_eq!(tail.nodes, vec![info.memory_node(fence)]);
        assert!(info.block(exit).unwrap().list.is_empty());
        assert_eq!(info.block(BlockId(0)).unwrap().list.len(), 1);
    }
}
