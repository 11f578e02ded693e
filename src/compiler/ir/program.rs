//! IR function definitions, blocks and modules

use super::instruction::{BlockRef, Instruction, LlValue, Phi, TerminatorInst};
use super::types::LlType;
use std::collections::BTreeMap;

/// Basic block of a function definition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlBasicBlock {
    /// Phis, always ahead of the instructions
    pub phis: Vec<Phi>,
    /// Instructions in emission order
    pub instructions: Vec<Instruction>,
    /// Terminator, `None` until the block is closed
    pub terminator: Option<TerminatorInst>,
}

/// A lowered function
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDefinition {
    /// Symbol name
    pub name: String,
    /// Parameter types
    pub params: Vec<LlType>,
    /// Return type
    pub return_type: LlType,
    /// Blocks; `BlockRef(0)` is the entry
    pub blocks: Vec<LlBasicBlock>,
    next_local: u32,
}

impl FunctionDefinition {
    /// Create a definition with no blocks
    pub fn new(name: impl Into<String>, params: Vec<LlType>, return_type: LlType) -> Self {
        Self {
            name: name.into(),
            params,
            return_type,
            blocks: Vec::new(),
            next_local: 0,
        }
    }

    /// Append an empty block
    pub fn create_block(&mut self) -> BlockRef {
        let id = BlockRef(self.blocks.len() as u32);
        self.blocks.push(LlBasicBlock::default());
        id
    }

    /// Block by reference
    pub fn block(&self, block: BlockRef) -> Option<&LlBasicBlock> {
        self.blocks.get(block.0 as usize)
    }

    fn block_mut(&mut self, block: BlockRef) -> &mut LlBasicBlock {
        let index = block.0 as usize;
        if index >= self.blocks.len() {
            self.blocks.resize_with(index + 1, LlBasicBlock::default);
        }
        &mut self.blocks[index]
    }

    /// Fresh local number
    pub fn fresh_local(&mut self) -> u32 {
        let n = self.next_local;
        self.next_local += 1;
        n
    }

    /// Number of locals allocated so far
    pub fn local_count(&self) -> u32 {
        self.next_local
    }

    /// Emit a value-producing instruction built around a fresh local
    pub fn emit(&mut self, block: BlockRef, make: impl FnOnce(u32) -> Instruction) -> LlValue {
        let result = self.fresh_local();
        self.block_mut(block).instructions.push(make(result));
        LlValue::Local(result)
    }

    /// Emit an instruction with no result
    pub fn emit_void(&mut self, block: BlockRef, inst: Instruction) {
        self.block_mut(block).instructions.push(inst);
    }

    /// Create an empty phi in `block`; returns its index in the block and
    /// its result value
    pub fn phi(&mut self, block: BlockRef, ty: LlType) -> (usize, LlValue) {
        let result = self.fresh_local();
        let phis = &mut self.block_mut(block).phis;
        phis.push(Phi {
            result,
            ty,
            incoming: Vec::new(),
        });
        (phis.len() - 1, LlValue::Local(result))
    }

    /// Add an incoming item to a phi created by [`FunctionDefinition::phi`]
    pub fn phi_item(&mut self, block: BlockRef, phi: usize, value: LlValue, from: BlockRef) {
        if let Some(phi) = self.block_mut(block).phis.get_mut(phi) {
            phi.item(value, from);
        }
    }

    /// Close `block`
    pub fn terminate(&mut self, block: BlockRef, terminator: TerminatorInst) {
        self.block_mut(block).terminator = Some(terminator);
    }

    /// Total instruction count, phis included
    pub fn instruction_count(&self) -> usize {
        self.blocks
            .iter()
            .map(|b| b.phis.len() + b.instructions.len())
            .sum()
    }
}

/// Output module: function definitions keyed by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlModule {
    /// Module name
    pub name: String,
    /// Definitions, sorted by name
    pub functions: BTreeMap<String, FunctionDefinition>,
}

impl LlModule {
    /// Create an empty module
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: BTreeMap::new(),
        }
    }

    /// Add a definition, replacing one of the same name
    pub fn add(&mut self, func: FunctionDefinition) {
        self.functions.insert(func.name.clone(), func);
    }

    /// Definition by name
    pub fn function(&self, name: &str) -> Option<&FunctionDefinition> {
        self.functions.get(name)
    }
}
