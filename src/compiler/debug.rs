//! Debug utilities for the lowered IR
//!
//! Renders modules in LLVM-like text. The output is for inspection and
//! tests; it is not guaranteed to be accepted by `llc` verbatim.

use super::ir::{FunctionDefinition, Instruction, LlBasicBlock, LlModule, Phi, TerminatorInst};
use std::fmt::{self, Write};

/// Print a module in human-readable format
pub fn dump_module(module: &LlModule) {
    println!("═══════════════════════════════════════════════════════════");
    println!("                    IR DUMP: {}", module.name);
    println!("═══════════════════════════════════════════════════════════");
    print!("{}", module);
    println!("═══════════════════════════════════════════════════════════\n");
}

/// Format a single instruction
pub fn format_instruction(inst: &Instruction) -> String {
    match inst {
        Instruction::Binary {
            result,
            op,
            ty,
            lhs,
            rhs,
        } => format!("%{} = {} {} {}, {}", result, op.mnemonic(), ty, lhs, rhs),
        Instruction::ICmp {
            result,
            cond,
            ty,
            lhs,
            rhs,
        } => format!("%{} = icmp {} {} {}, {}", result, cond.mnemonic(), ty, lhs, rhs),
        Instruction::FCmp {
            result,
            cond,
            ty,
            lhs,
            rhs,
        } => format!("%{} = fcmp {} {} {}, {}", result, cond.mnemonic(), ty, lhs, rhs),
        Instruction::FNeg { result, ty, value } => format!("%{} = fneg {} {}", result, ty, value),
        Instruction::Cast {
            result,
            op,
            from,
            value,
            to,
        } => format!("%{} = {} {} {} to {}", result, op.mnemonic(), from, value, to),
        Instruction::Select {
            result,
            condition,
            ty,
            if_true,
            if_false,
        } => format!(
            "%{} = select i1 {}, {} {}, {} {}",
            result, condition, ty, if_true, ty, if_false
        ),
        Instruction::Load {
            result,
            ty,
            ptr,
            ordering,
        } => match ordering {
            Some(ordering) => format!(
                "%{} = load atomic {}, {}* {} {}",
                result, ty, ty, ptr, ordering
            ),
            None => format!("%{} = load {}, {}* {}", result, ty, ty, ptr),
        },
        Instruction::Store {
            ty,
            value,
            ptr,
            ordering,
        } => match ordering {
            Some(ordering) => format!(
                "store atomic {} {}, {}* {} {}",
                ty, value, ty, ptr, ordering
            ),
            None => format!("store {} {}, {}* {}", ty, value, ty, ptr),
        },
        Instruction::Fence { ordering } => format!("fence {}", ordering),
        Instruction::Call {
            result,
            ret,
            callee,
            args,
        } => {
            let args_str: Vec<String> = args.iter().map(|(ty, v)| format!("{} {}", ty, v)).collect();
            match result {
                Some(r) => format!("%{} = call {} @\"{}\"({})", r, ret, callee, args_str.join(", ")),
                None => format!("call {} @\"{}\"({})", ret, callee, args_str.join(", ")),
            }
        }
    }
}

/// Format a phi
pub fn format_phi(phi: &Phi) -> String {
    let items: Vec<String> = phi
        .incoming
        .iter()
        .map(|(value, from)| format!("[ {}, {} ]", value, from))
        .collect();
    format!("%{} = phi {} {}", phi.result, phi.ty, items.join(", "))
}

/// Format a terminator
pub fn format_terminator(term: &TerminatorInst) -> String {
    match term {
        TerminatorInst::Br(target) => format!("br label {}", target),
        TerminatorInst::CondBr {
            condition,
            if_true,
            if_false,
        } => format!("br i1 {}, label {}, label {}", condition, if_true, if_false),
        TerminatorInst::Ret => "ret void".to_string(),
        TerminatorInst::RetValue { ty, value } => format!("ret {} {}", ty, value),
        TerminatorInst::Unreachable => "unreachable".to_string(),
    }
}

fn write_block(f: &mut fmt::Formatter<'_>, index: usize, block: &LlBasicBlock) -> fmt::Result {
    writeln!(f, "B{}:", index)?;
    for phi in &block.phis {
        writeln!(f, "  {}", format_phi(phi))?;
    }
    for inst in &block.instructions {
        writeln!(f, "  {}", format_instruction(inst))?;
    }
    match &block.terminator {
        Some(term) => writeln!(f, "  {}", format_terminator(term)),
        None => writeln!(f, "  ; missing terminator"),
    }
}

impl fmt::Display for FunctionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut params = String::new();
        for (i, ty) in self.params.iter().enumerate() {
            if i > 0 {
                params.push_str(", ");
            }
            write!(params, "{} %arg{}", ty, i)?;
        }
        writeln!(f, "define {} @\"{}\"({}) {{", self.return_type, self.name, params)?;
        for (index, block) in self.blocks.iter().enumerate() {
            write_block(f, index, block)?;
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for LlModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; ModuleID = '{}'", self.name)?;
        for func in self.functions.values() {
            writeln!(f)?;
            write!(f, "{}", func)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ir::{AtomicOrdering, BinOp, BlockRef, LlType, LlValue};

    #[test]
    fn test_format_memory_ops() {
        let load = Instruction::Load {
            result: 3,
            ty: LlType::I32,
            ptr: LlValue::Global("x".into()),
            ordering: Some(AtomicOrdering::Acquire),
        };
        assert_eq!(
            format_instruction(&load),
            "%3 = load atomic i32, i32* @\"x\" acquire"
        );
        let fence = Instruction::Fence {
            ordering: AtomicOrdering::SeqCst,
        };
        assert_eq!(format_instruction(&fence), "fence seq_cst");
    }

    #[test]
    fn test_render_function() {
        let mut func = FunctionDefinition::new("add", vec![LlType::I64, LlType::I64], LlType::I64);
        let entry = func.create_block();
        let sum = func.emit(entry, |result| Instruction::Binary {
            result,
            op: BinOp::Add,
            ty: LlType::I64,
            lhs: LlValue::Arg(0),
            rhs: LlValue::Arg(1),
        });
        func.terminate(
            entry,
            TerminatorInst::RetValue {
                ty: LlType::I64,
                value: sum,
            },
        );
        let text = func.to_string();
        assert!(text.starts_with("define i64 @\"add\"(i64 %arg0, i64 %arg1) {"));
        assert!(text.contains("  %0 = add i64 %arg0, %arg1"));
        assert!(text.contains("  ret i64 %0"));
        assert_eq!(format_terminator(&TerminatorInst::Br(BlockRef(2))), "br label %B2");
    }
}
