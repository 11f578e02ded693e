//! Analysis session: per-run table of analyzed functions
//!
//! The session is passed by reference through the whole pass and dropped
//! when the pass ends. Nothing about it is global.

use super::analyzer::{BlockInfo, FenceAnalyzer};
use crate::compiler::FenceOptions;
use crate::error::Result;
use crate::graph::{BlockId, FunctionBody, Node, NodeId};
use crate::reachability::Reachability;
use dashmap::DashMap;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

/// A memory-relevant node, identified across functions
#[derive(Clone)]
pub struct MemoryNode {
    /// Owning body
    pub body: Arc<FunctionBody>,
    /// Node id inside `body`
    pub id: NodeId,
}

impl MemoryNode {
    /// Create a reference to `id` in `body`
    pub fn new(body: Arc<FunctionBody>, id: NodeId) -> Self {
        Self { body, id }
    }

    /// The node itself
    pub fn node(&self) -> &Node {
        self.body.node(self.id)
    }
}

impl PartialEq for MemoryNode {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.body, &other.body) && self.id == other.id
    }
}

impl Eq for MemoryNode {}

impl Hash for MemoryNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.body) as usize).hash(state);
        self.id.hash(state);
    }
}

impl fmt::Debug for MemoryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.body.name(), self.id)
    }
}

/// Memory operations a caller sees right after a call returns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TailSet {
    /// Last memory operations on the return paths, calls resolved
    pub nodes: Vec<MemoryNode>,
    /// Some dispatch target or path exposes no memory operation at all
    pub open: bool,
}

impl TailSet {
    /// Add `node` unless present
    pub fn insert(&mut self, node: MemoryNode) {
        if !self.nodes.contains(&node) {
            self.nodes.push(node);
        }
    }

    /// Merge another tail into this one
    pub fn extend(&mut self, other: TailSet) {
        for node in other.nodes {
            self.insert(node);
        }
        self.open |= other.open;
    }

    /// True if no memory operation is visible
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Outcome of tail computation for a function
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tail {
    /// Tail known
    Resolved(TailSet),
    /// A call on a return path could not be resolved, or the function was
    /// caught in a call cycle
    Unresolved,
    /// A return block is failed, or return paths disagree on whether any
    /// memory operation is visible
    Failed,
}

impl Tail {
    /// Tail nodes, if resolved
    pub fn resolved(&self) -> Option<&TailSet> {
        match self {
            Tail::Resolved(set) => Some(set),
            _ => None,
        }
    }
}

/// Weakening progress of a function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeakenState {
    /// Not visited yet
    Pending,
    /// On the current resolution stack
    Weakening,
    /// Done
    Weakened,
}

/// Analyzer output for one function
pub struct FunctionInfo {
    /// Analyzed body
    pub body: Arc<FunctionBody>,
    /// Per-block information in traversal order
    pub blocks: Vec<BlockInfo>,
    index: FxHashMap<BlockId, usize>,
    state: Mutex<WeakenState>,
    tail: OnceLock<Tail>,
    tail_in_progress: AtomicBool,
}

impl FunctionInfo {
    /// Wrap analyzer results
    pub fn new(body: Arc<FunctionBody>, blocks: Vec<BlockInfo>) -> Self {
        let index = blocks
            .iter()
            .enumerate()
            .map(|(i, info)| (info.block, i))
            .collect();
        Self {
            body,
            blocks,
            index,
            state: Mutex::new(WeakenState::Pending),
            tail: OnceLock::new(),
            tail_in_progress: AtomicBool::new(false),
        }
    }

    /// Function name
    pub fn name(&self) -> &str {
        self.body.name()
    }

    /// Block information by id
    pub fn block(&self, block: BlockId) -> Option<&BlockInfo> {
        self.index.get(&block).map(|&i| &self.blocks[i])
    }

    /// Weakening state
    pub fn state(&self) -> WeakenState {
        *self.state.lock()
    }

    /// Move to `Weakening` if still pending; false otherwise
    pub(crate) fn begin_weakening(&self) -> bool {
        let mut state = self.state.lock();
        if *state != WeakenState::Pending {
            return false;
        }
        *state = WeakenState::Weakening;
        true
    }

    pub(crate) fn finish_weakening(&self) {
        *self.state.lock() = WeakenState::Weakened;
    }

    /// Computed tail, `None` until computed
    pub fn tail(&self) -> Option<&Tail> {
        self.tail.get()
    }

    /// True once the tail is fixed; it never changes afterwards
    pub fn resolved(&self) -> bool {
        self.tail.get().is_some()
    }

    /// Claim tail computation; false if already running (call cycle)
    pub(crate) fn begin_tail(&self) -> bool {
        !self.tail_in_progress.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn finish_tail(&self, tail: Tail) -> &Tail {
        self.tail_in_progress.store(false, Ordering::Release);
        self.tail.get_or_init(|| tail)
    }

    /// Memory node in this function
    pub fn memory_node(&self, id: NodeId) -> MemoryNode {
        MemoryNode::new(Arc::clone(&self.body), id)
    }
}

impl fmt::Debug for FunctionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionInfo")
            .field("name", &self.name())
            .field("blocks", &self.blocks.len())
            .field("state", &self.state())
            .field("tail", &self.tail())
            .finish()
    }
}

/// Function-name to [`FunctionInfo`] table plus the reachability handle
pub struct AnalysisSession {
    functions: DashMap<String, Arc<FunctionInfo>>,
    reachability: Arc<dyn Reachability + Send + Sync>,
    options: FenceOptions,
    skipped: AtomicUsize,
}

impl AnalysisSession {
    /// Create an empty session
    pub fn new(reachability: Arc<dyn Reachability + Send + Sync>, options: FenceOptions) -> Self {
        Self {
            functions: DashMap::new(),
            reachability,
            options,
            skipped: AtomicUsize::new(0),
        }
    }

    /// Reachability handle
    pub fn reachability(&self) -> &(dyn Reachability + Send + Sync) {
        self.reachability.as_ref()
    }

    /// Options of this run
    pub fn options(&self) -> &FenceOptions {
        &self.options
    }

    /// Insert `info` unless a function of that name is already present.
    /// Returns the entry that ends up in the table.
    pub fn insert_if_absent(&self, info: FunctionInfo) -> Arc<FunctionInfo> {
        let entry = self
            .functions
            .entry(info.name().to_string())
            .or_insert_with(|| Arc::new(info));
        Arc::clone(entry.value())
    }

    /// Analyze one body with this session's limits and record it
    pub fn analyze_function(&self, body: Arc<FunctionBody>) -> Result<Arc<FunctionInfo>> {
        let analyzer = FenceAnalyzer::new(&self.options);
        let info = analyzer.execute(body)?;
        Ok(self.insert_if_absent(info))
    }

    /// Count a function left out of the session
    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Functions left out, e.g. over the size ceiling
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Function record by exact name
    pub fn get(&self, name: &str) -> Option<Arc<FunctionInfo>> {
        self.functions.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// All recorded names, sorted
    pub fn function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of recorded functions
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// True if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
