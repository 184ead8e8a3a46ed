use serde::Serialize;
use std::fmt;

/// Location of a token or node in the (newline-normalized) source.
/// `line` and `column` are 1-based, `index` is the 0-based char offset.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub index: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Token {
    pub kind: Kind,
    pub value: String,
    pub position: Position,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Kind {
    // Literals
    Number,
    String,
    RawString,   // @"..." / @'...'
    Identifier,

    // Keywords
    If,
    Then,
    Else,
    While,
    Do,
    For,
    Until,
    Repeat,
    With,
    Switch,
    Case,
    Default,
    Return,
    Exit,
    Break,
    Continue,
    Var,
    GlobalVar,
    Struct,
    Enum,
    IntDiv,      // div

    // Arithmetic and bitwise
    Plus,
    Minus,
    Star,
    Slash,
    Percent,     // %, mod
    BitAnd,
    BitOr,
    BitXor,
    BitNot,
    ShiftLeft,
    ShiftRight,

    // Logical
    LogicalAnd,  // &&, and
    LogicalOr,   // ||, or
    LogicalXor,  // ^^, xor
    Bang,        // !, not

    // Comparison
    Equal,
    NotEqual,    // !=, <>
    Less,
    LessEqual,
    Greater,
    GreaterEqual,

    // Assignment
    Assign,      // =, :=
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    OrAssign,
    AndAssign,
    XorAssign,
    Increment,
    Decrement,

    // Brackets and delimiters
    LParen,
    RParen,
    LBrace,      // {, begin
    RBrace,      // }, end
    LBracket,    // [
    MapIndex,    // [?
    ArrayRefIndex, // [@
    GridIndex,   // [#
    ListIndex,   // [|
    RBracket,
    Question,
    Colon,
    Dot,
    Comma,
    Semicolon,

    EOF,
}

impl Kind {
    pub fn is_index_open(self) -> bool {
        matches!(
            self,
            Kind::LBracket | Kind::MapIndex | Kind::ArrayRefIndex | Kind::GridIndex | Kind::ListIndex
        )
    }

    pub fn is_assignment(self) -> bool {
        matches!(
            self,
            Kind::Assign
                | Kind::PlusAssign
                | Kind::MinusAssign
                | Kind::StarAssign
                | Kind::SlashAssign
                | Kind::PercentAssign
                | Kind::OrAssign
                | Kind::AndAssign
                | Kind::XorAssign
        )
    }
}
