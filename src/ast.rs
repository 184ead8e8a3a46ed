use crate::token::Position;

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: AstKind,
    pub position: Position,
}

impl Node {
    pub fn new(kind: AstKind, position: Position) -> Self {
        Self { kind, position }
    }

    pub fn boxed(kind: AstKind, position: Position) -> Box<Self> {
        Box::new(Self::new(kind, position))
    }

    /// Whether the node can appear on the left of an assignment or `++`/`--`.
    pub fn is_assignable(&self) -> bool {
        matches!(
            self.kind,
            AstKind::Identifier { .. } | AstKind::Member { .. } | AstKind::Index { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Real(f64),
}

/// What an identifier refers to. Everything starts `Unresolved`; the
/// resolver replaces it with one of the other variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Unresolved,
    Local,
    Global,
    /// `argument0` .. `argument15`
    Argument(u8),
    /// `argument[i]`
    ArgumentArray,
    BuiltinFunction,
    BuiltinVariable,
    UserSymbol(i32),
    /// `true`, `false`, `self`, `other`, `all`, `noone`, `global`
    Intrinsic(i32),
    /// Instance variable looked up by name when the script runs.
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    IntDivide,
    Modulo,
    BitAnd,
    BitOr,
    BitXor,
    ShiftLeft,
    ShiftRight,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Xor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
    BitNot,
}

/// Index sigil: `[`, `[?`, `[@`, `[#`, `[|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accessor {
    Array,
    Map,
    ArrayRef,
    Grid,
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    BitOr,
    BitAnd,
    BitXor,
}

impl AssignOp {
    /// The arithmetic a compound assignment performs before storing.
    pub fn binary(self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::Add => Some(BinaryOp::Add),
            AssignOp::Subtract => Some(BinaryOp::Subtract),
            AssignOp::Multiply => Some(BinaryOp::Multiply),
            AssignOp::Divide => Some(BinaryOp::Divide),
            AssignOp::Modulo => Some(BinaryOp::Modulo),
            AssignOp::BitOr => Some(BinaryOp::BitOr),
            AssignOp::BitAnd => Some(BinaryOp::BitAnd),
            AssignOp::BitXor => Some(BinaryOp::BitXor),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AstKind {
    // Expressions
    NumericLiteral(Number),
    StringLiteral {
        value: String,
        verbatim: bool,
    },
    Identifier {
        name: String,
        resolution: Resolution,
    },
    BinaryExpression {
        operator: BinaryOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    LogicalExpression {
        operator: LogicalOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    UnaryExpression {
        operator: UnaryOp,
        operand: Box<Node>,
    },
    Conditional {
        condition: Box<Node>,
        then: Box<Node>,
        otherwise: Box<Node>,
    },
    FunctionCall {
        callee: Box<Node>,
        arguments: Vec<Node>,
    },
    Index {
        target: Box<Node>,
        accessor: Accessor,
        indices: Vec<Node>,
    },
    Member {
        target: Box<Node>,
        field: String,
    },
    Update {
        target: Box<Node>,
        step: Step,
        prefix: bool,
    },
    StructLiteral(Vec<(String, Node)>),
    ArrayLiteral(Vec<Node>),

    // Statements
    Assignment {
        target: Box<Node>,
        operator: AssignOp,
        value: Box<Node>,
    },
    Block(Vec<Node>),
    If {
        condition: Box<Node>,
        then: Box<Node>,
        otherwise: Option<Box<Node>>,
    },
    While {
        condition: Box<Node>,
        body: Box<Node>,
    },
    DoUntil {
        body: Box<Node>,
        condition: Box<Node>,
    },
    Repeat {
        count: Box<Node>,
        body: Box<Node>,
    },
    For {
        init: Vec<Node>,
        condition: Option<Box<Node>>,
        step: Vec<Node>,
        body: Box<Node>,
    },
    Switch {
        subject: Box<Node>,
        cases: Vec<Case>,
    },
    With {
        targets: Vec<Node>,
        body: Box<Node>,
    },
    Var(Vec<Declaration>),
    GlobalVar(Vec<String>),
    Enum {
        name: String,
        members: Vec<EnumMember>,
    },
    Return(Option<Box<Node>>),
    Exit,
    Break,
    Continue,
    Expression(Box<Node>),
}

/// One `case` or `default` arm. `label` is `None` for `default`.
#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    pub label: Option<Node>,
    pub body: Vec<Node>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub name: String,
    pub value: Option<Node>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumMember {
    pub name: String,
    pub value: Option<Node>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub body: Vec<Node>,
}
