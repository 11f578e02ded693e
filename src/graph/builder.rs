//! Function body builder
//!
//! Computed values, memory operations and actions are scheduled into the
//! current block in the order they are created. Literals and parameters
//! float; they are not placed in any block.

use super::function::{BasicBlock, FunctionBody};
use super::mode::{MemoryAtomicityMode, ModeCell};
use super::node::{
    BinaryOp, BlockId, CallKind, CallTarget, CompareOp, Node, NodeId, NodeKind, ValueHandle,
};
use super::types::Type;
use crate::error::{Error, Result};

struct PendingBlock {
    nodes: Vec<NodeId>,
    terminator: Option<NodeId>,
}

/// Builder for a [`FunctionBody`]
pub struct FunctionBuilder {
    name: String,
    params: Vec<Type>,
    return_type: Type,
    nodes: Vec<Node>,
    blocks: Vec<PendingBlock>,
    current: BlockId,
    line: u32,
    error: Option<Error>,
}

impl FunctionBuilder {
    /// Start a function; the entry block is current
    pub fn new(name: impl Into<String>, params: Vec<Type>, return_type: Type) -> Self {
        FunctionBuilder {
            name: name.into(),
            params,
            return_type,
            nodes: Vec::new(),
            blocks: vec![PendingBlock {
                nodes: Vec::new(),
                terminator: None,
            }],
            current: BlockId(0),
            line: 0,
            error: None,
        }
    }

    /// Entry block
    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    /// Block receiving new nodes
    pub fn current_block(&self) -> BlockId {
        self.current
    }

    /// Create an empty block
    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(PendingBlock {
            nodes: Vec::new(),
            terminator: None,
        });
        id
    }

    /// Make `block` the insertion point
    pub fn switch_to(&mut self, block: BlockId) {
        if block.index() >= self.blocks.len() {
            self.record(Error::UnknownBlock {
                function: self.name.clone(),
                block: block.0,
            });
            return;
        }
        self.current = block;
    }

    /// Source line attached to subsequently created nodes
    pub fn set_line(&mut self, line: u32) {
        self.line = line;
    }

    /// Type of an already created node
    pub fn type_of(&self, id: NodeId) -> Type {
        self.nodes
            .get(id.index())
            .map(|n| n.ty.clone())
            .unwrap_or(Type::Void)
    }

    fn record(&mut self, error: Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn add(&mut self, kind: NodeKind, ty: Type) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let mut node = Node::new(kind, ty);
        node.line = self.line;
        self.nodes.push(node);
        id
    }

    fn place(&mut self, kind: NodeKind, ty: Type) -> NodeId {
        let id = self.add(kind, ty);
        let block = &mut self.blocks[self.current.index()];
        if block.terminator.is_some() {
            let current = self.current;
            self.record(Error::malformed(format!(
                "{}: node {} added to {} after its terminator",
                self.name, id, current
            )));
        } else {
            block.nodes.push(id);
        }
        id
    }

    fn terminate(&mut self, kind: NodeKind) -> NodeId {
        let id = self.add(kind, Type::Void);
        let current = self.current;
        let block = &mut self.blocks[current.index()];
        if block.terminator.is_some() {
            self.record(Error::malformed(format!(
                "{}: block {} has more than one terminator",
                self.name, current
            )));
        } else {
            block.terminator = Some(id);
        }
        id
    }

    // Floating values

    /// Integer literal of type `ty`
    pub fn int(&mut self, ty: Type, value: i64) -> NodeId {
        self.add(NodeKind::IntegerLiteral(value), ty)
    }

    /// Float literal of type `ty`
    pub fn float(&mut self, ty: Type, value: f64) -> NodeId {
        self.add(NodeKind::FloatLiteral(value), ty)
    }

    /// Boolean literal
    pub fn bool(&mut self, value: bool) -> NodeId {
        self.add(NodeKind::BooleanLiteral(value), Type::Boolean)
    }

    /// Null reference of the named class
    pub fn null(&mut self, class: impl Into<String>) -> NodeId {
        self.add(NodeKind::NullLiteral, Type::reference(class))
    }

    /// Parameter `index`, typed from the signature
    pub fn param(&mut self, index: u32) -> NodeId {
        let ty = match self.params.get(index as usize) {
            Some(ty) => ty.clone(),
            None => {
                self.record(Error::malformed(format!(
                    "{}: parameter {} out of range",
                    self.name, index
                )));
                Type::Void
            }
        };
        self.add(NodeKind::Parameter(index), ty)
    }

    // Scheduled values

    /// `lhs op rhs`, typed like `lhs`
    pub fn binary(&mut self, op: BinaryOp, lhs: NodeId, rhs: NodeId) -> NodeId {
        let ty = self.type_of(lhs);
        self.place(NodeKind::Binary { op, lhs, rhs }, ty)
    }

    /// Comparison producing a boolean
    pub fn compare(&mut self, op: CompareOp, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.place(NodeKind::Compare { op, lhs, rhs }, Type::Boolean)
    }

    /// Negation
    pub fn neg(&mut self, input: NodeId) -> NodeId {
        let ty = self.type_of(input);
        self.place(NodeKind::Neg { input }, ty)
    }

    /// Widen `input` to `ty`
    pub fn extend(&mut self, input: NodeId, ty: Type) -> NodeId {
        self.place(NodeKind::Extend { input }, ty)
    }

    /// Narrow `input` to `ty`
    pub fn truncate(&mut self, input: NodeId, ty: Type) -> NodeId {
        self.place(NodeKind::Truncate { input }, ty)
    }

    /// Convert `input` between integer and float
    pub fn convert(&mut self, input: NodeId, ty: Type) -> NodeId {
        self.place(NodeKind::Convert { input }, ty)
    }

    /// Reinterpret `input` as `ty`
    pub fn bitcast(&mut self, input: NodeId, ty: Type) -> NodeId {
        self.place(NodeKind::BitCast { input }, ty)
    }

    /// `condition ? if_true : if_false`
    pub fn select(&mut self, condition: NodeId, if_true: NodeId, if_false: NodeId) -> NodeId {
        let ty = self.type_of(if_true);
        self.place(
            NodeKind::Select {
                condition,
                if_true,
                if_false,
            },
            ty,
        )
    }

    /// Phi with no incoming values yet
    pub fn phi(&mut self, ty: Type) -> NodeId {
        self.place(
            NodeKind::Phi {
                incoming: Vec::new(),
            },
            ty,
        )
    }

    /// Add the value `phi` receives from `block`
    pub fn add_phi_incoming(&mut self, phi: NodeId, block: BlockId, value: NodeId) {
        match self.nodes.get_mut(phi.index()).map(|n| &mut n.kind) {
            Some(NodeKind::Phi { incoming }) => incoming.push((block, value)),
            _ => {
                let name = self.name.clone();
                self.record(Error::malformed(format!("{}: {} is not a phi", name, phi)));
            }
        }
    }

    /// Exception value; place it first in a handler block
    pub fn catch(&mut self, class: impl Into<String>) -> NodeId {
        self.place(NodeKind::Catch, Type::reference(class))
    }

    /// Memory read
    pub fn load(&mut self, handle: ValueHandle, ty: Type, mode: MemoryAtomicityMode) -> NodeId {
        self.place(
            NodeKind::Load {
                handle,
                mode: ModeCell::new(mode),
            },
            ty,
        )
    }

    /// Call without a handler
    pub fn call(
        &mut self,
        kind: CallKind,
        target: CallTarget,
        args: Vec<NodeId>,
        return_type: Type,
    ) -> NodeId {
        self.place(
            NodeKind::Call {
                kind,
                target,
                args,
                handler: None,
            },
            return_type,
        )
    }

    /// Invoke whose exceptions land in `handler`
    pub fn invoke(
        &mut self,
        target: CallTarget,
        args: Vec<NodeId>,
        return_type: Type,
        handler: BlockId,
    ) -> NodeId {
        self.place(
            NodeKind::Call {
                kind: CallKind::Invoke,
                target,
                args,
                handler: Some(handler),
            },
            return_type,
        )
    }

    /// Value of a kind this backend does not know
    pub fn unsupported_value(&mut self, name: impl Into<String>, ty: Type) -> NodeId {
        self.place(NodeKind::UnsupportedValue(name.into()), ty)
    }

    // Actions

    /// Memory write
    pub fn store(&mut self, handle: ValueHandle, value: NodeId, mode: MemoryAtomicityMode) -> NodeId {
        self.place(
            NodeKind::Store {
                handle,
                value,
                mode: ModeCell::new(mode),
            },
            Type::Void,
        )
    }

    /// Memory fence
    pub fn fence(&mut self, mode: MemoryAtomicityMode) -> NodeId {
        self.place(
            NodeKind::Fence {
                mode: ModeCell::new(mode),
            },
            Type::Void,
        )
    }

    /// Action of a kind this backend does not know
    pub fn unsupported_action(&mut self, name: impl Into<String>) -> NodeId {
        self.place(NodeKind::UnsupportedAction(name.into()), Type::Void)
    }

    // Terminators

    /// Unconditional branch
    pub fn goto(&mut self, target: BlockId) -> NodeId {
        self.terminate(NodeKind::Goto { target })
    }

    /// Conditional branch
    pub fn if_(&mut self, condition: NodeId, if_true: BlockId, if_false: BlockId) -> NodeId {
        self.terminate(NodeKind::If {
            condition,
            if_true,
            if_false,
        })
    }

    /// Return without a value
    pub fn ret(&mut self) -> NodeId {
        self.terminate(NodeKind::Return)
    }

    /// Return `value`
    pub fn ret_value(&mut self, value: NodeId) -> NodeId {
        self.terminate(NodeKind::ValueReturn { value })
    }

    /// Terminator of a kind this backend does not know
    pub fn unsupported_terminator(&mut self, name: impl Into<String>) -> NodeId {
        self.terminate(NodeKind::UnsupportedTerminator(name.into()))
    }

    /// Validate and produce the body
    pub fn finish(self) -> Result<FunctionBody> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let mut blocks = Vec::with_capacity(self.blocks.len());
        for (index, pending) in self.blocks.into_iter().enumerate() {
            let id = BlockId(index as u32);
            let terminator = pending.terminator.ok_or_else(|| {
                Error::malformed(format!("{}: block {} has no terminator", self.name, id))
            })?;
            blocks.push(BasicBlock {
                id,
                nodes: pending.nodes,
                terminator,
            });
        }
        FunctionBody::new(
            self.name,
            self.params,
            self.return_type,
            self.nodes,
            blocks,
            BlockId(0),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::schedule::{BlockSchedule, Schedule};

    #[test]
    fn test_diamond() {
        let mut b = FunctionBuilder::new("diamond", vec![Type::Boolean], Type::s32());
        let cond = b.param(0);
        let left = b.new_block();
        let right = b.new_block();
        let join = b.new_block();
        b.if_(cond, left, right);

        b.switch_to(left);
        let one = b.int(Type::s32(), 1);
        b.goto(join);
        b.switch_to(right);
        let two = b.int(Type::s32(), 2);
        b.goto(join);

        b.switch_to(join);
        let phi = b.phi(Type::s32());
        b.add_phi_incoming(phi, left, one);
        b.add_phi_incoming(phi, right, two);
        b.ret_value(phi);

        let body = b.finish().unwrap();
        assert_eq!(body.reachable_blocks(), vec![BlockId(0), left, join, right]);
        assert_eq!(body.predecessors(join), &[left, right]);
        assert_eq!(body.successors(BlockId(0)), vec![left, right]);

        let schedule = BlockSchedule::from_body(&body);
        assert_eq!(schedule.block_for(phi), Some(join));
        assert_eq!(schedule.block_for(one), None);
    }

    #[test]
    fn test_missing_terminator() {
        let mut b = FunctionBuilder::new("open", vec![], Type::Void);
        let next = b.new_block();
        b.goto(next);
        let err = b.finish().unwrap_err();
        assert!(matches!(err, Error::MalformedGraph(_)));
    }

    #[test]
    fn test_double_terminator() {
        let mut b = FunctionBuilder::new("twice", vec![], Type::Void);
        b.ret();
        b.ret();
        assert!(b.finish().is_err());
    }

    #[test]
    fn test_handler_blocks_are_reachable() {
        let mut b = FunctionBuilder::new("thrower", vec![], Type::Void);
        let handler = b.new_block();
        b.invoke(CallTarget::Function("may_throw".into()), vec![], Type::Void, handler);
        b.ret();
        b.switch_to(handler);
        b.catch("java/lang/Throwable");
        b.ret();

        let body = b.finish().unwrap();
        assert_eq!(body.exception_successors(BlockId(0)), vec![handler]);
        assert!(body.reachable_blocks().contains(&handler));
        assert!(body.is_handler_block(handler));
        assert!(body.predecessors(handler).is_empty());
    }

    #[test]
    fn test_dangling_ids_in_handles_and_targets() {
        use crate::graph::ElementIndex;

        let mut b = FunctionBuilder::new("dangling", vec![], Type::Void);
        b.load(ValueHandle::Pointer(NodeId(999)), Type::s32(), MemoryAtomicityMode::Unordered);
        b.ret();
        let err = b.finish().unwrap_err();
        assert!(matches!(err, Error::UnknownNode { node: 999, .. }));

        let mut b = FunctionBuilder::new("dangling_index", vec![], Type::Void);
        let one = b.int(Type::s32(), 1);
        let handle = ValueHandle::MemberOf {
            base: Box::new(ValueHandle::ElementOf {
                base: Box::new(ValueHandle::global("table")),
                index: ElementIndex::Dynamic(NodeId(77)),
            }),
            field: "count".into(),
        };
        b.store(handle, one, MemoryAtomicityMode::Unordered);
        b.ret();
        let err = b.finish().unwrap_err();
        assert!(matches!(err, Error::UnknownNode { node: 77, .. }));

        let mut b = FunctionBuilder::new("dangling_target", vec![], Type::Void);
        b.call(CallKind::Call, CallTarget::Indirect(NodeId(42)), vec![], Type::Void);
        b.ret();
        let err = b.finish().unwrap_err();
        assert!(matches!(err, Error::UnknownNode { node: 42, .. }));
    }

    #[test]
    fn test_pointer_handle_to_parameter_is_valid() {
        let mut b = FunctionBuilder::new("deref", vec![Type::reference("pkg/Cell")], Type::s32());
        let ptr = b.param(0);
        let value = b.load(ValueHandle::Pointer(ptr), Type::s32(), MemoryAtomicityMode::Acquire);
        b.ret_value(value);
        assert!(b.finish().is_ok());
    }
}
