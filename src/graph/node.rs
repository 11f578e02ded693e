//! Graph node definitions
//!
//! Every node kind is a variant of [`NodeKind`], so lowering and the fence
//! passes match exhaustively. The `Unsupported*` variants stand in for node
//! kinds produced by front ends this backend does not know yet.

use super::mode::{MemoryAtomicityMode, ModeCell};
use super::types::Type;
use std::fmt;

/// Index of a node inside its function body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Index as usize
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Index of a basic block inside its function body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    /// Index as usize
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// Two-operand arithmetic and bitwise operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
    /// `&`
    And,
    /// `|`
    Or,
    /// `^`
    Xor,
    /// `<<`
    Shl,
    /// `>>` (arithmetic for signed operands, logical otherwise)
    Shr,
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

/// A method as named by a virtual call site
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    /// Declaring class, slash separated (`pkg/Name`)
    pub class: String,
    /// Method name
    pub name: String,
    /// Method descriptor, e.g. `(I)V`
    pub descriptor: String,
}

impl MethodRef {
    /// Create a method reference
    pub fn new(
        class: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        Self {
            class: class.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }

    /// Exact function name of this method's implementation in `class`
    pub fn exact_name_in(&self, class: &str) -> String {
        format!(
            "{}.{}{}",
            class.replace('/', "."),
            self.name,
            self.descriptor
        )
    }

    /// Exact function name of the declaring class's implementation
    pub fn exact_name(&self) -> String {
        self.exact_name_in(&self.class)
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.exact_name())
    }
}

/// Element index of an `ElementOf` handle
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ElementIndex {
    /// Index known at compile time
    Constant(i64),
    /// Index computed by a node of the enclosing function
    Dynamic(NodeId),
}

/// Memory location addressed by a load or store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueHandle {
    /// Global variable (also used for static fields)
    Global(String),
    /// Field of the object or structure addressed by `base`
    MemberOf {
        /// Containing location
        base: Box<ValueHandle>,
        /// Field name
        field: String,
    },
    /// Array element of the location addressed by `base`
    ElementOf {
        /// Containing array
        base: Box<ValueHandle>,
        /// Element index
        index: ElementIndex,
    },
    /// Location held in a pointer value
    Pointer(NodeId),
}

impl ValueHandle {
    /// Global variable handle
    pub fn global(name: impl Into<String>) -> Self {
        ValueHandle::Global(name.into())
    }

    /// Value nodes the handle refers to, outermost first
    pub fn operands(&self) -> Vec<NodeId> {
        match self {
            ValueHandle::Global(_) => Vec::new(),
            ValueHandle::MemberOf { base, .. } => base.operands(),
            ValueHandle::ElementOf { base, index } => {
                let mut ids = Vec::new();
                if let ElementIndex::Dynamic(id) = index {
                    ids.push(*id);
                }
                ids.extend(base.operands());
                ids
            }
            ValueHandle::Pointer(id) => vec![*id],
        }
    }

    /// Whether two handles provably name the same location.
    ///
    /// Only globals, members and constant-index elements are compared;
    /// pointers and dynamic indices belong to a single function's value
    /// space and never match.
    pub fn same_location(&self, other: &ValueHandle) -> bool {
        match (self, other) {
            (ValueHandle::Global(a), ValueHandle::Global(b)) => a == b,
            (
                ValueHandle::MemberOf { base: b1, field: f1 },
                ValueHandle::MemberOf { base: b2, field: f2 },
            ) => f1 == f2 && b1.same_location(b2),
            (
                ValueHandle::ElementOf {
                    base: b1,
                    index: ElementIndex::Constant(i1),
                },
                ValueHandle::ElementOf {
                    base: b2,
                    index: ElementIndex::Constant(i2),
                },
            ) => i1 == i2 && b1.same_location(b2),
            _ => false,
        }
    }
}

impl fmt::Display for ValueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueHandle::Global(name) => write!(f, "@{}", name),
            ValueHandle::MemberOf { base, field } => write!(f, "{}.{}", base, field),
            ValueHandle::ElementOf { base, index } => match index {
                ElementIndex::Constant(i) => write!(f, "{}[{}]", base, i),
                ElementIndex::Dynamic(n) => write!(f, "{}[{}]", base, n),
            },
            ValueHandle::Pointer(n) => write!(f, "*{}", n),
        }
    }
}

/// Flavour of a call node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// Ordinary call
    Call,
    /// Call known to have no side effects
    CallNoSideEffects,
    /// Call that never returns
    CallNoReturn,
    /// Call in tail position
    TailCall,
    /// Call with an exception handler
    Invoke,
    /// Invoke that never returns normally
    InvokeNoReturn,
    /// Invoke in tail position
    TailInvoke,
}

impl CallKind {
    /// True for the invoke flavours, which may carry a handler block
    pub fn is_invoke(self) -> bool {
        matches!(
            self,
            CallKind::Invoke | CallKind::InvokeNoReturn | CallKind::TailInvoke
        )
    }
}

/// What a call node calls
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallTarget {
    /// Function defined in the program
    Function(String),
    /// Function declared but defined elsewhere
    FunctionDeclaration(String),
    /// Virtual dispatch through an object reference
    Virtual(MethodRef),
    /// Call through a function pointer value
    Indirect(NodeId),
}

/// Broad category of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeCategory {
    /// Produces a value
    Value,
    /// Side effect only
    Action,
    /// Ends a block
    Terminator,
}

/// Node payload
#[derive(Debug, Clone)]
pub enum NodeKind {
    // Values
    /// `lhs op rhs`
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left input
        lhs: NodeId,
        /// Right input
        rhs: NodeId,
    },
    /// Comparison producing a boolean
    Compare {
        /// Operator
        op: CompareOp,
        /// Left input
        lhs: NodeId,
        /// Right input
        rhs: NodeId,
    },
    /// Arithmetic negation
    Neg {
        /// Operand
        input: NodeId,
    },
    /// Widening conversion
    Extend {
        /// Operand
        input: NodeId,
    },
    /// Narrowing conversion
    Truncate {
        /// Operand
        input: NodeId,
    },
    /// Integer/float conversion
    Convert {
        /// Operand
        input: NodeId,
    },
    /// Reinterpret the bits as another type
    BitCast {
        /// Operand
        input: NodeId,
    },
    /// `condition ? if_true : if_false`
    Select {
        /// Boolean condition
        condition: NodeId,
        /// Value when true
        if_true: NodeId,
        /// Value when false
        if_false: NodeId,
    },
    /// Merge of values flowing in from predecessor blocks
    Phi {
        /// One value per predecessor block that supplies one
        incoming: Vec<(BlockId, NodeId)>,
    },
    /// Integer constant
    IntegerLiteral(i64),
    /// Floating point constant
    FloatLiteral(f64),
    /// Boolean constant
    BooleanLiteral(bool),
    /// Null reference
    NullLiteral,
    /// Function parameter by position
    Parameter(u32),
    /// Exception value at the start of a handler block
    Catch,
    /// Memory read
    Load {
        /// Location read
        handle: ValueHandle,
        /// Atomicity mode
        mode: ModeCell,
    },
    /// Function call (result typed by the node type, `void` if none)
    Call {
        /// Call flavour
        kind: CallKind,
        /// Callee
        target: CallTarget,
        /// Arguments
        args: Vec<NodeId>,
        /// Exception handler block for invokes
        handler: Option<BlockId>,
    },

    // Actions
    /// Memory write
    Store {
        /// Location written
        handle: ValueHandle,
        /// Value written
        value: NodeId,
        /// Atomicity mode
        mode: ModeCell,
    },
    /// Memory fence
    Fence {
        /// Atomicity mode
        mode: ModeCell,
    },
    /// Marks the start of a block
    BlockEntry,

    // Terminators
    /// Unconditional branch
    Goto {
        /// Successor
        target: BlockId,
    },
    /// Conditional branch
    If {
        /// Boolean condition
        condition: NodeId,
        /// Successor when true
        if_true: BlockId,
        /// Successor when false
        if_false: BlockId,
    },
    /// Return without a value
    Return,
    /// Return a value
    ValueReturn {
        /// Returned value
        value: NodeId,
    },

    /// Value kind unknown to this backend
    UnsupportedValue(String),
    /// Action kind unknown to this backend
    UnsupportedAction(String),
    /// Terminator kind unknown to this backend
    UnsupportedTerminator(String),
}

/// A node of the program graph
#[derive(Debug, Clone)]
pub struct Node {
    /// Payload
    pub kind: NodeKind,
    /// Result type (`Void` for actions and terminators)
    pub ty: Type,
    /// Source line, 0 when unknown
    pub line: u32,
}

impl Node {
    /// Create a node
    pub fn new(kind: NodeKind, ty: Type) -> Self {
        Self { kind, ty, line: 0 }
    }

    /// Category of this node
    pub fn category(&self) -> NodeCategory {
        match &self.kind {
            NodeKind::Store { .. }
            | NodeKind::Fence { .. }
            | NodeKind::BlockEntry
            | NodeKind::UnsupportedAction(_) => NodeCategory::Action,
            NodeKind::Goto { .. }
            | NodeKind::If { .. }
            | NodeKind::Return
            | NodeKind::ValueReturn { .. }
            | NodeKind::UnsupportedTerminator(_) => NodeCategory::Terminator,
            _ => NodeCategory::Value,
        }
    }

    /// Short name of the node kind, used in diagnostics
    pub fn kind_name(&self) -> &str {
        match &self.kind {
            NodeKind::Binary { .. } => "Binary",
            NodeKind::Compare { .. } => "Compare",
            NodeKind::Neg { .. } => "Neg",
            NodeKind::Extend { .. } => "Extend",
            NodeKind::Truncate { .. } => "Truncate",
            NodeKind::Convert { .. } => "Convert",
            NodeKind::BitCast { .. } => "BitCast",
            NodeKind::Select { .. } => "Select",
            NodeKind::Phi { .. } => "Phi",
            NodeKind::IntegerLiteral(_) => "IntegerLiteral",
            NodeKind::FloatLiteral(_) => "FloatLiteral",
            NodeKind::BooleanLiteral(_) => "BooleanLiteral",
            NodeKind::NullLiteral => "NullLiteral",
            NodeKind::Parameter(_) => "Parameter",
            NodeKind::Catch => "Catch",
            NodeKind::Load { .. } => "Load",
            NodeKind::Call { .. } => "Call",
            NodeKind::Store { .. } => "Store",
            NodeKind::Fence { .. } => "Fence",
            NodeKind::BlockEntry => "BlockEntry",
            NodeKind::Goto { .. } => "Goto",
            NodeKind::If { .. } => "If",
            NodeKind::Return => "Return",
            NodeKind::ValueReturn { .. } => "ValueReturn",
            NodeKind::UnsupportedValue(name)
            | NodeKind::UnsupportedAction(name)
            | NodeKind::UnsupportedTerminator(name) => name,
        }
    }

    /// Atomicity mode cell of loads, stores and fences
    pub fn mode_cell(&self) -> Option<&ModeCell> {
        match &self.kind {
            NodeKind::Load { mode, .. }
            | NodeKind::Store { mode, .. }
            | NodeKind::Fence { mode } => Some(mode),
            _ => None,
        }
    }

    /// Current atomicity mode of loads, stores and fences
    pub fn mode(&self) -> Option<MemoryAtomicityMode> {
        self.mode_cell().map(ModeCell::get)
    }

    /// Location of loads and stores
    pub fn handle(&self) -> Option<&ValueHandle> {
        match &self.kind {
            NodeKind::Load { handle, .. } | NodeKind::Store { handle, .. } => Some(handle),
            _ => None,
        }
    }

    /// True for call and invoke nodes
    pub fn is_call(&self) -> bool {
        matches!(self.kind, NodeKind::Call { .. })
    }

    /// True for loads
    pub fn is_load(&self) -> bool {
        matches!(self.kind, NodeKind::Load { .. })
    }

    /// True for stores
    pub fn is_store(&self) -> bool {
        matches!(self.kind, NodeKind::Store { .. })
    }

    /// True for fences
    pub fn is_fence(&self) -> bool {
        matches!(self.kind, NodeKind::Fence { .. })
    }

    /// Nodes the fence analysis records: loads, stores, fences and calls
    pub fn is_memory_relevant(&self) -> bool {
        self.is_load() || self.is_store() || self.is_fence() || self.is_call()
    }

    /// Control successors of a terminator, empty for other nodes
    pub fn successors(&self) -> Vec<BlockId> {
        match &self.kind {
            NodeKind::Goto { target } => vec![*target],
            NodeKind::If {
                if_true, if_false, ..
            } => {
                if if_true == if_false {
                    vec![*if_true]
                } else {
                    vec![*if_true, *if_false]
                }
            }
            _ => Vec::new(),
        }
    }

    /// True for return terminators
    pub fn is_return(&self) -> bool {
        matches!(self.kind, NodeKind::Return | NodeKind::ValueReturn { .. })
    }

    /// Value a phi receives from `block`, if any
    pub fn value_for_block(&self, block: BlockId) -> Option<NodeId> {
        match &self.kind {
            NodeKind::Phi { incoming } => incoming
                .iter()
                .find(|(b, _)| *b == block)
                .map(|(_, v)| *v),
            _ => None,
        }
    }
}
