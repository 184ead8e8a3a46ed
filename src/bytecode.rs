use std::fmt;

use crate::ast::Accessor;
use crate::token::Position;
use crate::types::Comparison;

/// Branch operand. Stays `Pending` until the target is known, then holds the
/// distance in instructions from the branch itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jump {
    Pending,
    Relative(i32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    PushInt(i32),             // Push integer immediate
    PushReal(u32),            // Push constants[n]
    PushString(u32),          // Push strings[n]
    PushLocal(u32),           // Push local slot
    PopLocal(u32),            // Store into local slot
    PushInstance(u32),        // Push instance variable named strings[n]
    PopInstance(u32),         // Store instance variable named strings[n]
    PushGlobal(u32),          // Push global named strings[n]
    PopGlobal(u32),           // Store global named strings[n]
    PushBuiltin(u32),         // Push builtin variable named strings[n]
    PopBuiltin(u32),          // Store builtin variable named strings[n]
    PushArgument(u8),         // Push argumentN
    PopArgument(u8),          // Store argumentN
    PushArgumentIndexed,      // [index] -> argument[index]
    PopArgumentIndexed,       // [index, value] -> argument[index] = value
    PushFunction(u32),        // Push a reference to builtin function strings[n]
    PushField(u32),           // [instance] -> instance.field
    PopField(u32),            // [instance, value] -> instance.field = value
    LoadIndex { accessor: Accessor, dims: u8 },  // [container, indices..] -> element
    StoreIndex { accessor: Accessor, dims: u8 }, // [container, indices.., value]
    NewArray(u32),            // [elements..] -> array
    NewStruct(u32),           // [key, value, ..] -> struct
    Dup(u8),                  // Duplicate the top n values as a group
    Popz,                     // Discard top of stack
    Add,
    Sub,
    Mul,
    Div,
    IntDiv,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Neg,
    Not,
    BitNot,
    Cmp(Comparison),
    Branch(Jump),
    BranchTrue(Jump),         // Pops the condition
    BranchFalse(Jump),        // Pops the condition
    PushEnv(Jump),            // Pops a target, enters its first instance or jumps past the body
    PopEnv(Jump),             // Moves to the next instance and jumps back, or leaves
    PopEnvExit,               // Leaves the current `with` early
    Call { function: u32, argc: u8 },       // Builtin named strings[function]
    CallScript { reference: i32, argc: u8 }, // User script by asset id
    CallValue { argc: u8 },   // [callee, args..]
    Ret,                      // Return top of stack
    Exit,                     // Return nothing
}

fn accessor_code(accessor: Accessor) -> u16 {
    match accessor {
        Accessor::Array => 0,
        Accessor::Map => 1,
        Accessor::ArrayRef => 2,
        Accessor::Grid => 3,
        Accessor::List => 4,
    }
}

impl Instruction {
    pub fn opcode(&self) -> u16 {
        match self {
            Instruction::PushInt(_) => 0x01,
            Instruction::PushReal(_) => 0x02,
            Instruction::PushString(_) => 0x03,
            Instruction::PushLocal(_) => 0x04,
            Instruction::PopLocal(_) => 0x05,
            Instruction::PushInstance(_) => 0x06,
            Instruction::PopInstance(_) => 0x07,
            Instruction::PushGlobal(_) => 0x08,
            Instruction::PopGlobal(_) => 0x09,
            Instruction::PushBuiltin(_) => 0x0A,
            Instruction::PopBuiltin(_) => 0x0B,
            Instruction::PushArgument(_) => 0x0C,
            Instruction::PopArgument(_) => 0x0D,
            Instruction::PushArgumentIndexed => 0x0E,
            Instruction::PopArgumentIndexed => 0x0F,
            Instruction::PushFunction(_) => 0x10,
            Instruction::PushField(_) => 0x11,
            Instruction::PopField(_) => 0x12,
            Instruction::LoadIndex { accessor, .. } => 0x20 + accessor_code(*accessor),
            Instruction::StoreIndex { accessor, .. } => 0x28 + accessor_code(*accessor),
            Instruction::NewArray(_) => 0x30,
            Instruction::NewStruct(_) => 0x31,
            Instruction::Dup(_) => 0x32,
            Instruction::Popz => 0x33,
            Instruction::Add => 0x40,
            Instruction::Sub => 0x41,
            Instruction::Mul => 0x42,
            Instruction::Div => 0x43,
            Instruction::IntDiv => 0x44,
            Instruction::Mod => 0x45,
            Instruction::BitAnd => 0x46,
            Instruction::BitOr => 0x47,
            Instruction::BitXor => 0x48,
            Instruction::Shl => 0x49,
            Instruction::Shr => 0x4A,
            Instruction::Neg => 0x4B,
            Instruction::Not => 0x4C,
            Instruction::BitNot => 0x4D,
            Instruction::Cmp(_) => 0x4E,
            Instruction::Branch(_) => 0x50,
            Instruction::BranchTrue(_) => 0x51,
            Instruction::BranchFalse(_) => 0x52,
            Instruction::PushEnv(_) => 0x53,
            Instruction::PopEnv(_) => 0x54,
            Instruction::PopEnvExit => 0x55,
            Instruction::Call { .. } => 0x60,
            Instruction::CallScript { .. } => 0x61,
            Instruction::CallValue { .. } => 0x62,
            Instruction::Ret => 0x63,
            Instruction::Exit => 0x64,
        }
    }

    /// Number of operands that follow the opcode in the encoded stream.
    pub fn operand_count(opcode: u16) -> Option<usize> {
        match opcode {
            0x01..=0x0D | 0x10..=0x12 | 0x30..=0x32 | 0x4E | 0x50..=0x54 | 0x62 => Some(1),
            0x0E | 0x0F | 0x33 | 0x40..=0x4D | 0x55 | 0x63 | 0x64 => Some(0),
            0x20..=0x24 | 0x28..=0x2C => Some(1),
            0x60 | 0x61 => Some(2),
            _ => None,
        }
    }

    pub fn jump(&self) -> Option<Jump> {
        match self {
            Instruction::Branch(jump)
            | Instruction::BranchTrue(jump)
            | Instruction::BranchFalse(jump)
            | Instruction::PushEnv(jump)
            | Instruction::PopEnv(jump) => Some(*jump),
            _ => None,
        }
    }

    /// Operand values in encoding order. Branches report their instruction
    /// distance; the assembler converts it to bytes.
    pub fn operands(&self) -> Vec<i64> {
        match self {
            Instruction::PushInt(n) => vec![i64::from(*n)],
            Instruction::PushReal(n)
            | Instruction::PushString(n)
            | Instruction::PushLocal(n)
            | Instruction::PopLocal(n)
            | Instruction::PushInstance(n)
            | Instruction::PopInstance(n)
            | Instruction::PushGlobal(n)
            | Instruction::PopGlobal(n)
            | Instruction::PushBuiltin(n)
            | Instruction::PopBuiltin(n)
            | Instruction::PushFunction(n)
            | Instruction::PushField(n)
            | Instruction::PopField(n)
            | Instruction::NewArray(n)
            | Instruction::NewStruct(n) => vec![i64::from(*n)],
            Instruction::PushArgument(n) | Instruction::PopArgument(n) | Instruction::Dup(n) => {
                vec![i64::from(*n)]
            }
            Instruction::LoadIndex { dims, .. } | Instruction::StoreIndex { dims, .. } => {
                vec![i64::from(*dims)]
            }
            Instruction::Cmp(comparison) => vec![*comparison as i64],
            Instruction::Call { function, argc } => vec![i64::from(*function), i64::from(*argc)],
            Instruction::CallScript { reference, argc } => {
                vec![i64::from(*reference), i64::from(*argc)]
            }
            Instruction::CallValue { argc } => vec![i64::from(*argc)],
            _ => match self.jump() {
                Some(Jump::Relative(delta)) => vec![i64::from(delta)],
                Some(Jump::Pending) => vec![0],
                None => Vec::new(),
            },
        }
    }

    fn with_jump(&self, jump: Jump) -> Option<Instruction> {
        match self {
            Instruction::Branch(_) => Some(Instruction::Branch(jump)),
            Instruction::BranchTrue(_) => Some(Instruction::BranchTrue(jump)),
            Instruction::BranchFalse(_) => Some(Instruction::BranchFalse(jump)),
            Instruction::PushEnv(_) => Some(Instruction::PushEnv(jump)),
            Instruction::PopEnv(_) => Some(Instruction::PopEnv(jump)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ByteCode {
    pub instructions: Vec<Instruction>,
    pub strings: Vec<String>,
    pub constants: Vec<f64>,
    pub locals: Vec<String>,
    /// (instruction index, source position), one entry per statement start.
    pub debug: Vec<(usize, Position)>,
}

impl ByteCode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Appends an instruction and returns its index, for later patching.
    pub fn push(&mut self, instruction: Instruction) -> usize {
        self.instructions.push(instruction);
        self.instructions.len() - 1
    }

    /// Points the branch at `site` to instruction `target`.
    pub fn patch(&mut self, site: usize, target: usize) -> bool {
        let delta = target as i64 - site as i64;
        let (Some(instruction), Ok(delta)) = (self.instructions.get(site), i32::try_from(delta))
        else {
            return false;
        };
        match instruction.with_jump(Jump::Relative(delta)) {
            Some(patched) => {
                self.instructions[site] = patched;
                true
            }
            None => false,
        }
    }

    /// Index of the first branch still waiting for its target.
    pub fn first_pending(&self) -> Option<usize> {
        self.instructions
            .iter()
            .position(|instruction| instruction.jump() == Some(Jump::Pending))
    }

    pub fn mark(&mut self, position: Position) {
        let index = self.instructions.len();
        match self.debug.last_mut() {
            Some((last, pos)) if *last == index => *pos = position,
            _ => self.debug.push((index, position)),
        }
    }

    pub fn add_constant(&mut self, value: f64) -> u32 {
        if let Some(pos) = self
            .constants
            .iter()
            .position(|x| x.to_bits() == value.to_bits())
        {
            pos as u32
        } else {
            self.constants.push(value);
            (self.constants.len() - 1) as u32
        }
    }

    pub fn add_string(&mut self, value: &str) -> u32 {
        if let Some(pos) = self.strings.iter().position(|x| x == value) {
            pos as u32
        } else {
            self.strings.push(value.to_string());
            (self.strings.len() - 1) as u32
        }
    }

    pub fn add_local(&mut self, name: &str) -> u32 {
        if let Some(pos) = self.locals.iter().position(|x| x == name) {
            pos as u32
        } else {
            self.locals.push(name.to_string());
            (self.locals.len() - 1) as u32
        }
    }
}

impl fmt::Display for ByteCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (index, instruction) in self.instructions.iter().enumerate() {
            write!(f, "{:5}  ", index)?;
            match instruction {
                Instruction::PushString(n)
                | Instruction::PushInstance(n)
                | Instruction::PopInstance(n)
                | Instruction::PushGlobal(n)
                | Instruction::PopGlobal(n)
                | Instruction::PushBuiltin(n)
                | Instruction::PopBuiltin(n)
                | Instruction::PushFunction(n)
                | Instruction::PushField(n)
                | Instruction::PopField(n) => {
                    let name = self.strings.get(*n as usize).map_or("?", String::as_str);
                    writeln!(f, "{:?}  ; {:?}", instruction, name)?
                }
                Instruction::PushLocal(n) | Instruction::PopLocal(n) => {
                    let name = self.locals.get(*n as usize).map_or("?", String::as_str);
                    writeln!(f, "{:?}  ; {}", instruction, name)?
                }
                Instruction::PushReal(n) => {
                    let value = self.constants.get(*n as usize).copied().unwrap_or(f64::NAN);
                    writeln!(f, "{:?}  ; {}", instruction, value)?
                }
                Instruction::Call { function, .. } => {
                    let name = self.strings.get(*function as usize).map_or("?", String::as_str);
                    writeln!(f, "{:?}  ; {}", instruction, name)?
                }
                _ => match instruction.jump() {
                    Some(Jump::Relative(delta)) => writeln!(
                        f,
                        "{:?}  ; -> {}",
                        instruction,
                        index as i64 + i64::from(delta)
                    )?,
                    _ => writeln!(f, "{:?}", instruction)?,
                },
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pools_deduplicate() {
        let mut bytecode = ByteCode::new();
        assert_eq!(bytecode.add_string("hp"), 0);
        assert_eq!(bytecode.add_string("mp"), 1);
        assert_eq!(bytecode.add_string("hp"), 0);
        assert_eq!(bytecode.add_constant(0.5), 0);
        assert_eq!(bytecode.add_constant(0.5), 0);
        assert_eq!(bytecode.add_local("i"), 0);
        assert_eq!(bytecode.locals, ["i"]);
    }

    #[test]
    fn patches_relative_jumps() {
        let mut bytecode = ByteCode::new();
        bytecode.push(Instruction::PushInt(1));
        let site = bytecode.push(Instruction::BranchFalse(Jump::Pending));
        bytecode.push(Instruction::PushInt(2));
        assert_eq!(bytecode.first_pending(), Some(site));

        assert!(bytecode.patch(site, 3));
        assert_eq!(bytecode.instructions[site], Instruction::BranchFalse(Jump::Relative(2)));
        assert!(bytecode.patch(site, 0));
        assert_eq!(bytecode.instructions[site], Instruction::BranchFalse(Jump::Relative(-1)));
        assert_eq!(bytecode.first_pending(), None);

        assert!(!bytecode.patch(0, 2), "only branches can be patched");
    }

    #[test]
    fn every_opcode_has_an_operand_count() {
        let samples = [
            Instruction::PushInt(-3),
            Instruction::LoadIndex { accessor: Accessor::Grid, dims: 2 },
            Instruction::StoreIndex { accessor: Accessor::List, dims: 1 },
            Instruction::Cmp(Comparison::Greater),
            Instruction::Call { function: 0, argc: 2 },
            Instruction::CallScript { reference: 9, argc: 0 },
            Instruction::PopEnv(Jump::Relative(-4)),
            Instruction::PopEnvExit,
            Instruction::Exit,
        ];
        for instruction in samples {
            assert_eq!(
                Instruction::operand_count(instruction.opcode()),
                Some(instruction.operands().len()),
                "{:?}",
                instruction
            );
        }
    }
}
