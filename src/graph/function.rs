//! Function bodies, basic blocks and program modules

use super::node::{BlockId, CallTarget, Node, NodeCategory, NodeId, NodeKind};
use super::types::Type;
use crate::error::{Error, Result};
use rustc_hash::FxHashSet;
use std::sync::Arc;

/// A basic block: scheduled nodes in program order plus one terminator
#[derive(Debug, Clone)]
pub struct BasicBlock {
    /// Block id
    pub id: BlockId,
    /// Non-terminator nodes scheduled into this block, in program order
    pub nodes: Vec<NodeId>,
    /// The block's terminator
    pub terminator: NodeId,
}

/// Graph of one function
///
/// Blocks do not own nodes; they list the ids of the nodes the scheduler
/// placed in them. Node ids and block ids are checked on construction, so
/// indexing with an id taken from the same body never fails.
#[derive(Debug)]
pub struct FunctionBody {
    name: String,
    params: Vec<Type>,
    return_type: Type,
    nodes: Vec<Node>,
    blocks: Vec<BasicBlock>,
    entry: BlockId,
    predecessors: Vec<Vec<BlockId>>,
}

impl FunctionBody {
    /// Assemble and validate a body
    pub fn new(
        name: impl Into<String>,
        params: Vec<Type>,
        return_type: Type,
        nodes: Vec<Node>,
        blocks: Vec<BasicBlock>,
        entry: BlockId,
    ) -> Result<Self> {
        let name = name.into();
        let mut body = Self {
            name,
            params,
            return_type,
            nodes,
            blocks,
            entry,
            predecessors: Vec::new(),
        };
        body.validate()?;
        body.predecessors = body.compute_predecessors();
        Ok(body)
    }

    fn validate(&self) -> Result<()> {
        if self.entry.index() >= self.blocks.len() {
            return Err(Error::UnknownBlock {
                function: self.name.clone(),
                block: self.entry.0,
            });
        }
        let check_node = |id: NodeId| -> Result<()> {
            if id.index() < self.nodes.len() {
                Ok(())
            } else {
                Err(Error::UnknownNode {
                    function: self.name.clone(),
                    node: id.0,
                })
            }
        };
        let check_block = |id: BlockId| -> Result<()> {
            if id.index() < self.blocks.len() {
                Ok(())
            } else {
                Err(Error::UnknownBlock {
                    function: self.name.clone(),
                    block: id.0,
                })
            }
        };

        for (index, block) in self.blocks.iter().enumerate() {
            if block.id.index() != index {
                return Err(Error::malformed(format!(
                    "{}: block {} stored at position {}",
                    self.name, block.id, index
                )));
            }
            check_node(block.terminator)?;
            if self.nodes[block.terminator.index()].category() != NodeCategory::Terminator {
                return Err(Error::malformed(format!(
                    "{}: block {} ends in non-terminator {}",
                    self.name, block.id, block.terminator
                )));
            }
            for &id in &block.nodes {
                check_node(id)?;
                if self.nodes[id.index()].category() == NodeCategory::Terminator {
                    return Err(Error::malformed(format!(
                        "{}: block {} has terminator {} in its body",
                        self.name, block.id, id
                    )));
                }
            }
        }

        for node in &self.nodes {
            match &node.kind {
                NodeKind::Binary { lhs, rhs, .. } | NodeKind::Compare { lhs, rhs, .. } => {
                    check_node(*lhs)?;
                    check_node(*rhs)?;
                }
                NodeKind::Neg { input }
                | NodeKind::Extend { input }
                | NodeKind::Truncate { input }
                | NodeKind::Convert { input }
                | NodeKind::BitCast { input } => check_node(*input)?,
                NodeKind::Select {
                    condition,
                    if_true,
                    if_false,
                } => {
                    check_node(*condition)?;
                    check_node(*if_true)?;
                    check_node(*if_false)?;
                }
                NodeKind::Phi { incoming } => {
                    for (block, value) in incoming {
                        check_block(*block)?;
                        check_node(*value)?;
                    }
                }
                NodeKind::Load { handle, .. } => {
                    for id in handle.operands() {
                        check_node(id)?;
                    }
                }
                NodeKind::Call {
                    target,
                    args,
                    handler,
                    ..
                } => {
                    if let CallTarget::Indirect(pointer) = target {
                        check_node(*pointer)?;
                    }
                    for arg in args {
                        check_node(*arg)?;
                    }
                    if let Some(handler) = handler {
                        check_block(*handler)?;
                    }
                }
                NodeKind::Store { handle, value, .. } => {
                    for id in handle.operands() {
                        check_node(id)?;
                    }
                    check_node(*value)?;
                }
                NodeKind::Goto { target } => check_block(*target)?,
                NodeKind::If {
                    condition,
                    if_true,
                    if_false,
                } => {
                    check_node(*condition)?;
                    check_block(*if_true)?;
                    check_block(*if_false)?;
                }
                NodeKind::ValueReturn { value } => check_node(*value)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn compute_predecessors(&self) -> Vec<Vec<BlockId>> {
        let mut preds = vec![Vec::new(); self.blocks.len()];
        for block in &self.blocks {
            for succ in self.successors(block.id) {
                let list: &mut Vec<BlockId> = &mut preds[succ.index()];
                if !list.contains(&block.id) {
                    list.push(block.id);
                }
            }
        }
        preds
    }

    /// Function name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameter types
    pub fn params(&self) -> &[Type] {
        &self.params
    }

    /// Return type
    pub fn return_type(&self) -> &Type {
        &self.return_type
    }

    /// Entry block
    pub fn entry(&self) -> BlockId {
        self.entry
    }

    /// Node by id
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Node by id, `None` if the id does not belong to this body
    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Block by id
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    /// All blocks, reachable or not
    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    /// Terminator node of a block
    pub fn terminator(&self, block: BlockId) -> &Node {
        self.node(self.block(block).terminator)
    }

    /// Normal control successors of a block
    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        self.terminator(block).successors()
    }

    /// Exception handler blocks entered from invokes scheduled in a block
    pub fn exception_successors(&self, block: BlockId) -> Vec<BlockId> {
        let mut handlers = Vec::new();
        for &id in &self.block(block).nodes {
            if let NodeKind::Call {
                handler: Some(handler),
                ..
            } = &self.node(id).kind
            {
                if !handlers.contains(handler) {
                    handlers.push(*handler);
                }
            }
        }
        handlers
    }

    /// Normal control predecessors of a block
    pub fn predecessors(&self, block: BlockId) -> &[BlockId] {
        &self.predecessors[block.index()]
    }

    /// Blocks reachable from the entry, depth-first pre-order.
    ///
    /// Handler blocks reached through invokes are included after the
    /// normal successors of the invoking block.
    pub fn reachable_blocks(&self) -> Vec<BlockId> {
        let mut visited: FxHashSet<BlockId> = FxHashSet::default();
        let mut order = Vec::new();
        let mut stack = vec![self.entry];

        while let Some(block) = stack.pop() {
            if !visited.insert(block) {
                continue;
            }
            order.push(block);

            let mut next = self.successors(block);
            next.extend(self.exception_successors(block));
            // reversed so the first successor is visited first
            for succ in next.into_iter().rev() {
                if !visited.contains(&succ) {
                    stack.push(succ);
                }
            }
        }

        order
    }

    /// True if the block starts with a `Catch` value
    pub fn is_handler_block(&self, block: BlockId) -> bool {
        self.block(block)
            .nodes
            .iter()
            .any(|&id| matches!(self.node(id).kind, NodeKind::Catch))
    }
}

/// A unit of code generation: the functions emitted into one output module
#[derive(Debug, Clone, Default)]
pub struct ProgramModule {
    /// Module name
    pub name: String,
    /// Function bodies
    pub functions: Vec<Arc<FunctionBody>>,
}

impl ProgramModule {
    /// Create an empty module
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
        }
    }

    /// Add a function
    pub fn add(&mut self, body: FunctionBody) -> Arc<FunctionBody> {
        let body = Arc::new(body);
        self.functions.push(Arc::clone(&body));
        body
    }
}

/// Whole program: every module handed to the backend
#[derive(Debug, Clone, Default)]
pub struct Program {
    /// Modules
    pub modules: Vec<ProgramModule>,
}

impl Program {
    /// Create an empty program
    pub fn new() -> Self {
        Self::default()
    }

    /// All functions of all modules
    pub fn functions(&self) -> impl Iterator<Item = &Arc<FunctionBody>> {
        self.modules.iter().flat_map(|m| m.functions.iter())
    }
}
