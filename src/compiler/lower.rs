//! Graph to IR lowering
//!
//! One [`LoweringVisitor`] lowers one function body. Blocks are created on
//! first reference and lowered from a worklist in discovery order, so a
//! dominating block is always lowered before the blocks it dominates.
//! Values are emitted into the block the schedule placed them in and are
//! memoized, so a value used twice is emitted once.
//!
//! ```text
//! entry ──map_block──► worklist ──lower_block──► scheduled nodes in order
//!                         ▲                         └── terminator
//!                         └────── successors ◄──────────┘
//! phis: created up front, incoming items attached once every block is lowered
//! ```
//!
//! ## Exceptions
//!
//! No landing pads are emitted. An invoke lowers as a plain call, so handler
//! blocks are never reached from lowered code, and a `Catch` value becomes
//! `undef` with a note in the compilation context.

use super::context::CompilationContext;
use super::ir::{
    AtomicOrdering, BinOp, BlockRef, CastOp, FCmpCond, FunctionDefinition, ICmpCond, Instruction,
    LlType, LlValue, TerminatorInst,
};
use crate::error::{Error, Result};
use crate::graph::{
    BinaryOp, BlockId, CallTarget, CompareOp, FunctionBody, MemoryAtomicityMode, NodeCategory,
    NodeId, NodeKind, Schedule, Type, ValueHandle,
};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;

/// Atomic ordering emitted for a mode, `None` for plain accesses
pub fn atomic_ordering(mode: MemoryAtomicityMode) -> Option<AtomicOrdering> {
    match mode {
        MemoryAtomicityMode::Unordered => None,
        MemoryAtomicityMode::Acquire => Some(AtomicOrdering::Acquire),
        MemoryAtomicityMode::Release => Some(AtomicOrdering::Release),
        MemoryAtomicityMode::SequentiallyConsistent => Some(AtomicOrdering::SeqCst),
    }
}

struct PendingPhi {
    node: NodeId,
    block: BlockRef,
    index: usize,
}

/// Lowers one function body to a [`FunctionDefinition`]
pub struct LoweringVisitor<'a, S: Schedule> {
    ctxt: &'a CompilationContext,
    schedule: &'a S,
    body: &'a FunctionBody,
    func: FunctionDefinition,
    known_blocks: Vec<BlockId>,
    mapped_blocks: FxHashMap<BlockId, BlockRef>,
    mapped_values: FxHashMap<NodeId, LlValue>,
    types: FxHashMap<Type, LlType>,
    worklist: VecDeque<BlockId>,
    pending_phis: Vec<PendingPhi>,
}

impl<'a, S: Schedule> LoweringVisitor<'a, S> {
    /// Create a visitor for `body`
    pub fn new(ctxt: &'a CompilationContext, schedule: &'a S, body: &'a FunctionBody) -> Self {
        Self {
            ctxt,
            schedule,
            body,
            func: FunctionDefinition::new(body.name(), Vec::new(), LlType::Void),
            known_blocks: body.reachable_blocks(),
            mapped_blocks: FxHashMap::default(),
            mapped_values: FxHashMap::default(),
            types: FxHashMap::default(),
            worklist: VecDeque::new(),
            pending_phis: Vec::new(),
        }
    }

    /// Lower the whole function
    pub fn execute(mut self) -> Result<FunctionDefinition> {
        let body = self.body;
        let mut params = Vec::with_capacity(body.params().len());
        for ty in body.params() {
            params.push(self.map_type(ty)?);
        }
        self.func.params = params;
        self.func.return_type = self.map_type(body.return_type())?;

        self.map_block(body.entry());
        loop {
            while let Some(block) = self.worklist.pop_front() {
                self.lower_block(block)?;
            }
            if self.pending_phis.is_empty() {
                break;
            }
            // may discover blocks reached only through phi inputs
            self.resolve_phis()?;
        }

        tracing::debug!(
            "lowered {} ({} blocks, {} instructions)",
            body.name(),
            self.func.blocks.len(),
            self.func.instruction_count()
        );
        Ok(self.func)
    }

    /// Physical type of a semantic type, memoized
    pub fn map_type(&mut self, ty: &Type) -> Result<LlType> {
        if let Some(mapped) = self.types.get(ty) {
            return Ok(mapped.clone());
        }
        let mapped = match ty {
            Type::Void => LlType::Void,
            Type::Boolean => LlType::I1,
            Type::SignedInteger { bytes } | Type::UnsignedInteger { bytes } => {
                LlType::int_of_bytes(*bytes).ok_or_else(|| {
                    Error::internal(
                        self.body.name(),
                        format!("no integer type of {} bytes", bytes),
                    )
                })?
            }
            Type::Float { bytes } => LlType::float_of_bytes(*bytes).ok_or_else(|| {
                Error::internal(self.body.name(), format!("no float type of {} bytes", bytes))
            })?,
            // class shapes are not lowered yet
            Type::Reference { .. } => LlType::byte_ptr(),
            Type::Class { name } => {
                return Err(Error::internal(
                    self.body.name(),
                    format!("class type {} reached code generation", name),
                ))
            }
        };
        self.types.insert(ty.clone(), mapped.clone());
        Ok(mapped)
    }

    fn map_block(&mut self, block: BlockId) -> BlockRef {
        if let Some(mapped) = self.mapped_blocks.get(&block) {
            return *mapped;
        }
        let mapped = self.func.create_block();
        self.mapped_blocks.insert(block, mapped);
        self.worklist.push_back(block);
        mapped
    }

    fn lower_block(&mut self, block: BlockId) -> Result<()> {
        let body = self.body;
        let target = self.map_block(block);
        let graph_block = body.block(block);
        for &id in &graph_block.nodes {
            match body.node(id).category() {
                NodeCategory::Value => {
                    self.map_value(id)?;
                }
                NodeCategory::Action => self.visit_action(id, target)?,
                NodeCategory::Terminator => {
                    return Err(Error::malformed(format!(
                        "{}: terminator {} scheduled inside {}",
                        body.name(),
                        id,
                        block
                    )))
                }
            }
        }
        self.visit_terminator(graph_block.terminator, target)
    }

    fn resolve_phis(&mut self) -> Result<()> {
        let body = self.body;
        let pending = std::mem::take(&mut self.pending_phis);
        for phi in pending {
            let node = body.node(phi.node);
            for i in 0..self.known_blocks.len() {
                let known = self.known_blocks[i];
                if let Some(value) = node.value_for_block(known) {
                    let value = self.map_value(value)?;
                    let from = self.map_block(known);
                    self.func.phi_item(phi.block, phi.index, value, from);
                }
            }
        }
        Ok(())
    }

    /// Lowered value of a node, memoized
    fn map_value(&mut self, id: NodeId) -> Result<LlValue> {
        if let Some(mapped) = self.mapped_values.get(&id) {
            return Ok(mapped.clone());
        }
        let mapped = self.visit_value(id)?;
        self.mapped_values.insert(id, mapped.clone());
        Ok(mapped)
    }

    fn target_block(&mut self, id: NodeId) -> Result<BlockRef> {
        match self.schedule.block_for(id) {
            Some(block) => Ok(self.map_block(block)),
            None => Err(Error::internal(
                self.body.name(),
                format!("value {} is not scheduled", id),
            )),
        }
    }

    fn unknown(&self, id: NodeId, what: &str) {
        let node = self.body.node(id);
        self.ctxt.error(
            self.body.name(),
            Some(id),
            node.line,
            format!("llvm: Unrecognized {} {}", what, node.kind_name()),
        );
    }

    fn unsupported(&self, id: NodeId, detail: String) {
        let node = self.body.node(id);
        self.ctxt.error(
            self.body.name(),
            Some(id),
            node.line,
            format!("llvm: Unsupported {}", detail),
        );
    }

    fn type_of(&mut self, id: NodeId) -> Result<LlType> {
        let ty = self.body.node(id).ty.clone();
        self.map_type(&ty)
    }

    fn visit_value(&mut self, id: NodeId) -> Result<LlValue> {
        let body = self.body;
        let node = body.node(id);
        match &node.kind {
            NodeKind::Binary { op, lhs, rhs } => {
                let ty = self.map_type(&node.ty)?;
                let lhs = self.map_value(*lhs)?;
                let rhs = self.map_value(*rhs)?;
                let target = self.target_block(id)?;
                let op = binary_op(*op, &node.ty);
                Ok(self.func.emit(target, |result| Instruction::Binary {
                    result,
                    op,
                    ty,
                    lhs,
                    rhs,
                }))
            }
            NodeKind::Compare { op, lhs, rhs } => {
                let operand_ty = body.node(*lhs).ty.clone();
                let ty = self.map_type(&operand_ty)?;
                let lhs = self.map_value(*lhs)?;
                let rhs = self.map_value(*rhs)?;
                let target = self.target_block(id)?;
                if operand_ty.is_floating() {
                    let cond = float_condition(*op);
                    Ok(self.func.emit(target, |result| Instruction::FCmp {
                        result,
                        cond,
                        ty,
                        lhs,
                        rhs,
                    }))
                } else {
                    let cond = int_condition(*op, operand_ty.is_signed());
                    Ok(self.func.emit(target, |result| Instruction::ICmp {
                        result,
                        cond,
                        ty,
                        lhs,
                        rhs,
                    }))
                }
            }
            NodeKind::Neg { input } => {
                let ty = self.type_of(*input)?;
                let value = self.map_value(*input)?;
                let target = self.target_block(id)?;
                if body.node(*input).ty.is_floating() {
                    Ok(self
                        .func
                        .emit(target, |result| Instruction::FNeg { result, ty, value }))
                } else {
                    Ok(self.func.emit(target, |result| Instruction::Binary {
                        result,
                        op: BinOp::Sub,
                        ty,
                        lhs: LlValue::Int(0),
                        rhs: value,
                    }))
                }
            }
            NodeKind::Extend { input } => {
                let input_ty = &body.node(*input).ty;
                let op = if input_ty.is_floating() {
                    CastOp::FpExt
                } else if input_ty.is_signed() {
                    CastOp::Sext
                } else {
                    CastOp::Zext
                };
                self.cast(id, *input, op)
            }
            NodeKind::Truncate { input } => {
                let op = if body.node(*input).ty.is_floating() {
                    CastOp::FpTrunc
                } else {
                    CastOp::Trunc
                };
                self.cast(id, *input, op)
            }
            NodeKind::Convert { input } => {
                let input_ty = &body.node(*input).ty;
                let op = if input_ty.is_floating() {
                    if node.ty.is_signed() {
                        CastOp::FpToSi
                    } else {
                        CastOp::FpToUi
                    }
                } else if input_ty.is_signed() {
                    CastOp::SiToFp
                } else {
                    CastOp::UiToFp
                };
                self.cast(id, *input, op)
            }
            NodeKind::BitCast { input } => self.cast(id, *input, CastOp::Bitcast),
            NodeKind::Select {
                condition,
                if_true,
                if_false,
            } => {
                let ty = self.map_type(&node.ty)?;
                let condition = self.map_value(*condition)?;
                let if_true = self.map_value(*if_true)?;
                let if_false = self.map_value(*if_false)?;
                let target = self.target_block(id)?;
                Ok(self.func.emit(target, |result| Instruction::Select {
                    result,
                    condition,
                    ty,
                    if_true,
                    if_false,
                }))
            }
            NodeKind::Phi { .. } => {
                let target = self.target_block(id)?;
                let ty = self.map_type(&node.ty)?;
                let (index, value) = self.func.phi(target, ty);
                // visible before any input is lowered, so cycles end here
                self.mapped_values.insert(id, value.clone());
                self.pending_phis.push(PendingPhi {
                    node: id,
                    block: target,
                    index,
                });
                Ok(value)
            }
            NodeKind::IntegerLiteral(v) => Ok(LlValue::Int(*v)),
            NodeKind::FloatLiteral(v) => Ok(LlValue::Float(*v)),
            NodeKind::BooleanLiteral(v) => Ok(LlValue::Bool(*v)),
            NodeKind::NullLiteral => Ok(LlValue::Null),
            NodeKind::Parameter(index) => Ok(LlValue::Arg(*index)),
            NodeKind::Catch => {
                self.ctxt.note(
                    body.name(),
                    format!("exception value {} lowered to undef", id),
                );
                Ok(LlValue::Undef)
            }
            NodeKind::Load { handle, mode } => {
                let Some(ptr) = self.map_handle(id, handle)? else {
                    return Ok(LlValue::Bool(false));
                };
                let ty = self.map_type(&node.ty)?;
                let target = self.target_block(id)?;
                let ordering = atomic_ordering(mode.get());
                Ok(self.func.emit(target, |result| Instruction::Load {
                    result,
                    ty,
                    ptr,
                    ordering,
                }))
            }
            NodeKind::Call {
                kind,
                target: callee,
                args,
                handler,
            } => {
                let callee = match callee {
                    CallTarget::Function(name) | CallTarget::FunctionDeclaration(name) => {
                        name.clone()
                    }
                    CallTarget::Virtual(method) => {
                        self.unsupported(id, format!("virtual call to {}", method));
                        return Ok(LlValue::Bool(false));
                    }
                    CallTarget::Indirect(pointer) => {
                        self.unsupported(id, format!("indirect call through {}", pointer));
                        return Ok(LlValue::Bool(false));
                    }
                };
                if kind.is_invoke() && handler.is_some() {
                    self.ctxt.note(
                        body.name(),
                        format!("invoke of {} lowered as a plain call", callee),
                    );
                }
                let mut lowered_args = Vec::with_capacity(args.len());
                for &arg in args {
                    let ty = self.type_of(arg)?;
                    lowered_args.push((ty, self.map_value(arg)?));
                }
                let ret = self.map_type(&node.ty)?;
                let target = self.target_block(id)?;
                if ret == LlType::Void {
                    self.func.emit_void(
                        target,
                        Instruction::Call {
                            result: None,
                            ret,
                            callee,
                            args: lowered_args,
                        },
                    );
                    Ok(LlValue::Undef)
                } else {
                    Ok(self.func.emit(target, |result| Instruction::Call {
                        result: Some(result),
                        ret,
                        callee,
                        args: lowered_args,
                    }))
                }
            }
            NodeKind::UnsupportedValue(_) => {
                self.unknown(id, "value");
                Ok(LlValue::Bool(false))
            }
            NodeKind::Store { .. }
            | NodeKind::Fence { .. }
            | NodeKind::BlockEntry
            | NodeKind::UnsupportedAction(_)
            | NodeKind::Goto { .. }
            | NodeKind::If { .. }
            | NodeKind::Return
            | NodeKind::ValueReturn { .. }
            | NodeKind::UnsupportedTerminator(_) => Err(Error::malformed(format!(
                "{}: {} {} used as a value",
                body.name(),
                node.kind_name(),
                id
            ))),
        }
    }

    fn cast(&mut self, id: NodeId, input: NodeId, op: CastOp) -> Result<LlValue> {
        let from = self.type_of(input)?;
        let to = self.type_of(id)?;
        let value = self.map_value(input)?;
        let target = self.target_block(id)?;
        Ok(self.func.emit(target, |result| Instruction::Cast {
            result,
            op,
            from,
            value,
            to,
        }))
    }

    /// Address of a memory handle; reports and returns `None` when the
    /// handle needs object layout
    fn map_handle(&mut self, id: NodeId, handle: &ValueHandle) -> Result<Option<LlValue>> {
        match handle {
            ValueHandle::Global(name) => Ok(Some(LlValue::Global(name.clone()))),
            ValueHandle::Pointer(pointer) => Ok(Some(self.map_value(*pointer)?)),
            ValueHandle::MemberOf { .. } | ValueHandle::ElementOf { .. } => {
                self.unsupported(id, format!("memory handle {}", handle));
                Ok(None)
            }
        }
    }

    fn visit_action(&mut self, id: NodeId, target: BlockRef) -> Result<()> {
        let body = self.body;
        let node = body.node(id);
        match &node.kind {
            NodeKind::Store {
                handle,
                value,
                mode,
            } => {
                let Some(ptr) = self.map_handle(id, handle)? else {
                    return Ok(());
                };
                let ty = self.type_of(*value)?;
                let value = self.map_value(*value)?;
                self.func.emit_void(
                    target,
                    Instruction::Store {
                        ty,
                        value,
                        ptr,
                        ordering: atomic_ordering(mode.get()),
                    },
                );
            }
            NodeKind::Fence { mode } => {
                // a fence weakened to unordered emits nothing
                if let Some(ordering) = atomic_ordering(mode.get()) {
                    self.func.emit_void(target, Instruction::Fence { ordering });
                }
            }
            NodeKind::BlockEntry => {}
            _ => self.unknown(id, "action"),
        }
        Ok(())
    }

    fn visit_terminator(&mut self, id: NodeId, target: BlockRef) -> Result<()> {
        let body = self.body;
        let node = body.node(id);
        let terminator = match &node.kind {
            NodeKind::Goto { target: successor } => TerminatorInst::Br(self.map_block(*successor)),
            NodeKind::If {
                condition,
                if_true,
                if_false,
            } => {
                let condition = self.map_value(*condition)?;
                let if_true = self.map_block(*if_true);
                let if_false = self.map_block(*if_false);
                TerminatorInst::CondBr {
                    condition,
                    if_true,
                    if_false,
                }
            }
            NodeKind::Return => TerminatorInst::Ret,
            NodeKind::ValueReturn { value } => {
                let ty = self.type_of(*value)?;
                let value = self.map_value(*value)?;
                TerminatorInst::RetValue { ty, value }
            }
            _ => {
                self.unknown(id, "terminator");
                TerminatorInst::Unreachable
            }
        };
        self.func.terminate(target, terminator);
        Ok(())
    }
}

fn binary_op(op: BinaryOp, ty: &Type) -> BinOp {
    let float = ty.is_floating();
    let signed = ty.is_signed();
    match op {
        BinaryOp::Add if float => BinOp::FAdd,
        BinaryOp::Add => BinOp::Add,
        BinaryOp::Sub if float => BinOp::FSub,
        BinaryOp::Sub => BinOp::Sub,
        BinaryOp::Mul if float => BinOp::FMul,
        BinaryOp::Mul => BinOp::Mul,
        BinaryOp::Div if float => BinOp::FDiv,
        BinaryOp::Div if signed => BinOp::SDiv,
        BinaryOp::Div => BinOp::UDiv,
        BinaryOp::Rem if float => BinOp::FRem,
        BinaryOp::Rem if signed => BinOp::SRem,
        BinaryOp::Rem => BinOp::URem,
        BinaryOp::And => BinOp::And,
        BinaryOp::Or => BinOp::Or,
        BinaryOp::Xor => BinOp::Xor,
        BinaryOp::Shl => BinOp::Shl,
        BinaryOp::Shr if signed => BinOp::AShr,
        BinaryOp::Shr => BinOp::LShr,
    }
}

fn float_condition(op: CompareOp) -> FCmpCond {
    match op {
        CompareOp::Eq => FCmpCond::Oeq,
        CompareOp::Ne => FCmpCond::One,
        CompareOp::Lt => FCmpCond::Olt,
        CompareOp::Le => FCmpCond::Ole,
        CompareOp::Gt => FCmpCond::Ogt,
        CompareOp::Ge => FCmpCond::Oge,
    }
}

fn int_condition(op: CompareOp, signed: bool) -> ICmpCond {
    match (op, signed) {
        (CompareOp::Eq, _) => ICmpCond::Eq,
        (CompareOp::Ne, _) => ICmpCond::Ne,
        (CompareOp::Lt, true) => ICmpCond::Slt,
        (CompareOp::Le, true) => ICmpCond::Sle,
        (CompareOp::Gt, true) => ICmpCond::Sgt,
        (CompareOp::Ge, true) => ICmpCond::Sge,
        (CompareOp::Lt, false) => ICmpCond::Ult,
        (CompareOp::Le, false) => ICmpCond::Ule,
        (CompareOp::Gt, false) => ICmpCond::Ugt,
        (CompareOp::Ge, false) => ICmpCond::Uge,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{BlockSchedule, FunctionBuilder};

    fn empty_body() -> FunctionBody {
        let mut b = FunctionBuilder::new("empty", vec![], Type::Void);
        b.ret();
        b.finish().unwrap()
    }

    #[test]
    fn test_bad_integer_size_is_fatal() {
        let body = empty_body();
        let ctxt = CompilationContext::new();
        let schedule = BlockSchedule::from_body(&body);
        let mut visitor = LoweringVisitor::new(&ctxt, &schedule, &body);
        let err = visitor
            .map_type(&Type::SignedInteger { bytes: 3 })
            .unwrap_err();
        assert!(matches!(err, Error::InternalConsistency { .. }));
        assert!(visitor
            .map_type(&Type::Class {
                name: "pkg/Thing".into()
            })
            .is_err());
        assert_eq!(visitor.map_type(&Type::reference("pkg/Thing")).unwrap(), LlType::byte_ptr());
    }

    #[test]
    fn test_shift_and_division_variants() {
        assert_eq!(binary_op(BinaryOp::Shr, &Type::s32()), BinOp::AShr);
        assert_eq!(binary_op(BinaryOp::Shr, &Type::u32()), BinOp::LShr);
        assert_eq!(binary_op(BinaryOp::Div, &Type::f64()), BinOp::FDiv);
        assert_eq!(binary_op(BinaryOp::Rem, &Type::u16()), BinOp::URem);
        assert_eq!(int_condition(CompareOp::Lt, false), ICmpCond::Ult);
    }

    #[test]
    fn test_weakened_fence_emits_nothing() {
        assert_eq!(atomic_ordering(MemoryAtomicityMode::Unordered), None);
        assert_eq!(
            atomic_ordering(MemoryAtomicityMode::SequentiallyConsistent),
            Some(AtomicOrdering::SeqCst)
        );
    }
}
