use std::cmp::Ordering;

// Reserved instance ids understood by the VM.
pub const SELF: i32 = -1;
pub const OTHER: i32 = -2;
pub const ALL: i32 = -3;
pub const NOONE: i32 = -4;
pub const GLOBAL: i32 = -5;

/// `argument0` .. `argument15`
pub const MAX_ARGUMENTS: u8 = 16;

/// Names that compile to a fixed number rather than a variable.
pub fn intrinsic(name: &str) -> Option<i32> {
    match name {
        "true" => Some(1),
        "false" => Some(0),
        "self" => Some(SELF),
        "other" => Some(OTHER),
        "all" => Some(ALL),
        "noone" => Some(NOONE),
        "global" => Some(GLOBAL),
        _ => None,
    }
}

/// Operand of the `Cmp` instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Comparison {
    Less = 1,
    LessEqual = 2,
    Equal = 3,
    NotEqual = 4,
    GreaterEqual = 5,
    Greater = 6,
}

impl Comparison {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Comparison::Less),
            2 => Some(Comparison::LessEqual),
            3 => Some(Comparison::Equal),
            4 => Some(Comparison::NotEqual),
            5 => Some(Comparison::GreaterEqual),
            6 => Some(Comparison::Greater),
            _ => None,
        }
    }

    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            Comparison::Less => ordering == Ordering::Less,
            Comparison::LessEqual => ordering != Ordering::Greater,
            Comparison::Equal => ordering == Ordering::Equal,
            Comparison::NotEqual => ordering != Ordering::Equal,
            Comparison::GreaterEqual => ordering != Ordering::Less,
            Comparison::Greater => ordering == Ordering::Greater,
        }
    }
}
