//! Integration tests for graph-to-IR lowering
//!
//! Covers type mapping, value memoization, phi cycles, memory operations
//! and the diagnostics produced for node kinds the backend does not know.

use aotc::compiler::ir::{Instruction, LlType, LlValue, TerminatorInst};
use aotc::compiler::{CompilationContext, DiagnosticLevel, FunctionDefinition, LoweringVisitor};
use aotc::graph::{
    BinaryOp, BlockSchedule, CallKind, CallTarget, CompareOp, FunctionBody, FunctionBuilder,
    MemoryAtomicityMode, Type, ValueHandle,
};
use aotc::Error;
use proptest::prelude::*;

fn lower(body: &FunctionBody) -> (FunctionDefinition, CompilationContext) {
    let ctxt = CompilationContext::new();
    let schedule = BlockSchedule::from_body(body);
    let func = LoweringVisitor::new(&ctxt, &schedule, body)
        .execute()
        .unwrap();
    (func, ctxt)
}

fn instructions(func: &FunctionDefinition) -> Vec<&Instruction> {
    func.blocks.iter().flat_map(|b| b.instructions.iter()).collect()
}

fn empty_body() -> FunctionBody {
    let mut b = FunctionBuilder::new("empty", vec![], Type::Void);
    b.ret();
    b.finish().unwrap()
}

// =============================================================================
// TYPE MAPPING
// =============================================================================

#[test]
fn test_type_mapping_table() {
    let body = empty_body();
    let ctxt = CompilationContext::new();
    let schedule = BlockSchedule::from_body(&body);
    let mut visitor = LoweringVisitor::new(&ctxt, &schedule, &body);

    assert_eq!(visitor.map_type(&Type::Void).unwrap(), LlType::Void);
    assert_eq!(visitor.map_type(&Type::Boolean).unwrap(), LlType::I1);
    assert_eq!(visitor.map_type(&Type::s8()).unwrap(), LlType::I8);
    assert_eq!(visitor.map_type(&Type::u16()).unwrap(), LlType::I16);
    assert_eq!(visitor.map_type(&Type::s64()).unwrap(), LlType::I64);
    assert_eq!(visitor.map_type(&Type::f32()).unwrap(), LlType::F32);
    assert_eq!(visitor.map_type(&Type::f64()).unwrap(), LlType::F64);
    assert_eq!(
        visitor.map_type(&Type::reference("pkg/Node")).unwrap(),
        LlType::byte_ptr()
    );
    assert!(matches!(
        visitor.map_type(&Type::Float { bytes: 2 }),
        Err(Error::InternalConsistency { .. })
    ));
}

proptest! {
    #[test]
    fn prop_integer_mapping_is_deterministic_and_erases_sign(
        bytes in prop::sample::select(vec![1u32, 2, 4, 8]),
    ) {
        let body = empty_body();
        let ctxt = CompilationContext::new();
        let schedule = BlockSchedule::from_body(&body);
        let mut visitor = LoweringVisitor::new(&ctxt, &schedule, &body);

        let signed = Type::SignedInteger { bytes };
        let unsigned = Type::UnsignedInteger { bytes };
        let first = visitor.map_type(&signed).unwrap();
        prop_assert_eq!(&first, &visitor.map_type(&signed).unwrap());
        prop_assert_eq!(&first, &visitor.map_type(&unsigned).unwrap());
        prop_assert_eq!(Some(first), LlType::int_of_bytes(bytes));
    }

    #[test]
    fn prop_odd_integer_sizes_are_fatal(bytes in 0u32..64) {
        prop_assume!(![1, 2, 4, 8].contains(&bytes));
        let body = empty_body();
        let ctxt = CompilationContext::new();
        let schedule = BlockSchedule::from_body(&body);
        let mut visitor = LoweringVisitor::new(&ctxt, &schedule, &body);
        let is_internal = matches!(
            visitor.map_type(&Type::UnsignedInteger { bytes }),
            Err(Error::InternalConsistency { .. })
        );
        prop_assert!(is_internal);
        prop_assert_eq!(ctxt.error_count(), 0);
    }
}

// =============================================================================
// VALUES
// =============================================================================

#[test]
fn test_shared_value_is_emitted_once() {
    let mut b = FunctionBuilder::new("square_sum", vec![Type::s32(), Type::s32()], Type::s32());
    let x = b.param(0);
    let y = b.param(1);
    let sum = b.binary(BinaryOp::Add, x, y);
    let square = b.binary(BinaryOp::Mul, sum, sum);
    b.ret_value(square);
    let (func, ctxt) = lower(&b.finish().unwrap());

    assert_eq!(ctxt.error_count(), 0);
    let insts = instructions(&func);
    assert_eq!(insts.len(), 2);
    match insts[1] {
        Instruction::Binary { lhs, rhs, .. } => {
            assert_eq!(lhs, rhs);
            assert_eq!(*lhs, LlValue::Local(0));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(func.params, vec![LlType::I32, LlType::I32]);
}

#[test]
fn test_loop_phi_terminates_with_one_item_per_predecessor() {
    let mut b = FunctionBuilder::new("count", vec![Type::s32()], Type::s32());
    let limit = b.param(0);
    let zero = b.int(Type::s32(), 0);
    let one = b.int(Type::s32(), 1);
    let header = b.new_block();
    let body_block = b.new_block();
    let exit = b.new_block();
    let entry = b.entry();
    b.goto(header);

    b.switch_to(header);
    let i = b.phi(Type::s32());
    let more = b.compare(CompareOp::Lt, i, limit);
    b.if_(more, body_block, exit);

    b.switch_to(body_block);
    let next = b.binary(BinaryOp::Add, i, one);
    b.goto(header);

    b.switch_to(exit);
    b.ret_value(i);

    b.add_phi_incoming(i, entry, zero);
    b.add_phi_incoming(i, body_block, next);
    let (func, ctxt) = lower(&b.finish().unwrap());

    assert_eq!(ctxt.error_count(), 0);
    let phis: Vec<_> = func.blocks.iter().flat_map(|b| b.phis.iter()).collect();
    assert_eq!(phis.len(), 1);
    assert_eq!(phis[0].incoming.len(), 2);
    assert!(phis[0].incoming.contains(&(LlValue::Int(0), aotc::compiler::ir::BlockRef(0))));
    assert_eq!(func.blocks.len(), 4);
    assert!(func.blocks.iter().all(|b| b.terminator.is_some()));
}

#[test]
fn test_signed_compare_and_negation() {
    let mut b = FunctionBuilder::new("abs", vec![Type::s64(), Type::f64()], Type::s64());
    let x = b.param(0);
    let f = b.param(1);
    let zero = b.int(Type::s64(), 0);
    let negative = b.compare(CompareOp::Lt, x, zero);
    let minus_x = b.neg(x);
    b.neg(f);
    let result = b.select(negative, minus_x, x);
    b.ret_value(result);
    let (func, _) = lower(&b.finish().unwrap());

    let rendered = func.to_string();
    assert!(rendered.contains("icmp slt i64 %arg0, 0"), "{}", rendered);
    assert!(rendered.contains("sub i64 0, %arg0"), "{}", rendered);
    assert!(rendered.contains("fneg double %arg1"), "{}", rendered);
    assert!(rendered.contains("select i1"), "{}", rendered);
}

// =============================================================================
// MEMORY OPERATIONS AND CALLS
// =============================================================================

#[test]
fn test_memory_orderings_follow_modes() {
    let mut b = FunctionBuilder::new("publish", vec![Type::s32()], Type::Void);
    let v = b.param(0);
    b.store(ValueHandle::global("data"), v, MemoryAtomicityMode::Unordered);
    b.fence(MemoryAtomicityMode::Release);
    b.store(ValueHandle::global("ready"), v, MemoryAtomicityMode::SequentiallyConsistent);
    b.fence(MemoryAtomicityMode::Unordered);
    b.ret();
    let (func, _) = lower(&b.finish().unwrap());

    let rendered = func.to_string();
    assert!(rendered.contains("store i32 %arg0, i32* @\"data\"\n"), "{}", rendered);
    assert!(rendered.contains("fence release"), "{}", rendered);
    assert!(rendered.contains("store atomic i32 %arg0, i32* @\"ready\" seq_cst"));
    // the unordered fence disappears
    assert_eq!(instructions(&func).len(), 3);
}

#[test]
fn test_direct_call_and_invoke() {
    let mut b = FunctionBuilder::new("caller", vec![], Type::s32());
    let handler = b.new_block();
    let arg = b.int(Type::s32(), 7);
    let r = b.call(
        CallKind::Call,
        CallTarget::Function("callee".into()),
        vec![arg],
        Type::s32(),
    );
    b.invoke(
        CallTarget::FunctionDeclaration("extern_fn".into()),
        vec![],
        Type::Void,
        handler,
    );
    b.ret_value(r);
    b.switch_to(handler);
    b.catch("java/lang/Throwable");
    b.ret_value(arg);
    let (func, ctxt) = lower(&b.finish().unwrap());

    assert_eq!(ctxt.error_count(), 0);
    let rendered = func.to_string();
    assert!(rendered.contains("%0 = call i32 @\"callee\"(i32 7)"), "{}", rendered);
    assert!(rendered.contains("call void @\"extern_fn\"()"), "{}", rendered);
    let notes = ctxt
        .diagnostics()
        .into_iter()
        .filter(|d| d.level == DiagnosticLevel::Note)
        .count();
    // plain-call lowering never branches to the handler block
    assert_eq!(notes, 1);
    assert_eq!(func.blocks.len(), 1);
}

#[test]
fn test_virtual_call_and_member_handle_are_unsupported() {
    let mut b = FunctionBuilder::new("dispatch", vec![], Type::Void);
    b.call(
        CallKind::Call,
        CallTarget::Virtual(aotc::graph::MethodRef::new("pkg/Base", "run", "()V")),
        vec![],
        Type::Void,
    );
    b.load(
        ValueHandle::MemberOf {
            base: Box::new(ValueHandle::global("obj")),
            field: "count".into(),
        },
        Type::s32(),
        MemoryAtomicityMode::Unordered,
    );
    b.ret();
    let (func, ctxt) = lower(&b.finish().unwrap());

    assert_eq!(ctxt.error_count(), 2);
    assert!(instructions(&func).is_empty());
    assert!(ctxt
        .diagnostics()
        .iter()
        .all(|d| d.message.starts_with("llvm: Unsupported")));
}

// =============================================================================
// UNKNOWN NODES
// =============================================================================

#[test]
fn test_unknown_nodes_are_reported_and_lowering_continues() {
    let mut b = FunctionBuilder::new("odd", vec![], Type::Void);
    let next = b.new_block();
    b.set_line(12);
    b.unsupported_value("VectorShuffle", Type::s32());
    b.unsupported_action("Prefetch");
    b.goto(next);
    b.switch_to(next);
    b.unsupported_terminator("Switch");
    let (func, ctxt) = lower(&b.finish().unwrap());

    assert_eq!(ctxt.error_count(), 3);
    let messages: Vec<String> = ctxt.diagnostics().into_iter().map(|d| d.message).collect();
    assert_eq!(
        messages,
        vec![
            "llvm: Unrecognized value VectorShuffle",
            "llvm: Unrecognized action Prefetch",
            "llvm: Unrecognized terminator Switch",
        ]
    );
    assert_eq!(ctxt.diagnostics()[0].line, 12);
    assert_eq!(func.blocks.len(), 2);
    assert_eq!(func.blocks[1].terminator, Some(TerminatorInst::Unreachable));
}
