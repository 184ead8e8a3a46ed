use serde::Serialize;

use crate::bytecode::{ByteCode, Jump};
use crate::context::{EncodingParams, Endianness};
use crate::error::Diagnostic;
use crate::token::Position;

/// Encoded output of one compile unit. Serializing it yields the tables
/// only; `code` is written as a raw blob.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assembly {
    #[serde(skip)]
    pub code: Vec<u8>,
    pub strings: Vec<String>,
    pub constants: Vec<f64>,
    pub locals: Vec<String>,
    /// (byte offset, source position) for each statement start.
    pub debug: Vec<(usize, Position)>,
}

fn fits(value: i64, width: u8) -> bool {
    match width {
        1 => i8::try_from(value).is_ok(),
        2 => i16::try_from(value).is_ok(),
        4 => i32::try_from(value).is_ok(),
        _ => true,
    }
}

fn write_int(code: &mut Vec<u8>, value: i64, width: u8, endianness: Endianness) {
    let width = width as usize;
    match endianness {
        Endianness::Little => code.extend_from_slice(&value.to_le_bytes()[..width]),
        Endianness::Big => code.extend_from_slice(&value.to_be_bytes()[8 - width..]),
    }
}

pub struct Assembler<'a> {
    bytecode: &'a ByteCode,
    encoding: EncodingParams,
}

pub fn assemble(bytecode: &ByteCode, encoding: &EncodingParams) -> Result<Assembly, Diagnostic> {
    Assembler::new(bytecode, *encoding).assemble()
}

impl<'a> Assembler<'a> {
    pub fn new(bytecode: &'a ByteCode, encoding: EncodingParams) -> Self {
        Self { bytecode, encoding }
    }

    /// Source position of the statement that produced instruction `index`.
    fn position_of(&self, index: usize) -> Position {
        self.bytecode
            .debug
            .iter()
            .rev()
            .find(|(start, _)| *start <= index)
            .map(|(_, position)| *position)
            .unwrap_or_default()
    }

    /// Byte offset of every instruction, plus the end of the stream.
    fn offsets(&self) -> Vec<usize> {
        let opcode = self.encoding.opcode_width as usize;
        let operand = self.encoding.operand_width as usize;
        let mut offsets = Vec::with_capacity(self.bytecode.len() + 1);
        let mut offset = 0;
        for instruction in &self.bytecode.instructions {
            offsets.push(offset);
            offset += opcode + operand * instruction.operands().len();
        }
        offsets.push(offset);
        offsets
    }

    pub fn assemble(&self) -> Result<Assembly, Diagnostic> {
        let EncodingParams {
            opcode_width,
            operand_width,
            endianness,
        } = self.encoding;

        if !matches!(opcode_width, 1 | 2) {
            return Err(Diagnostic::assembly(
                format!("Unsupported opcode width {}", opcode_width),
                Position::default(),
            ));
        }
        if !matches!(operand_width, 1 | 2 | 4 | 8) {
            return Err(Diagnostic::assembly(
                format!("Unsupported operand width {}", operand_width),
                Position::default(),
            ));
        }

        let offsets = self.offsets();
        let mut code = Vec::with_capacity(offsets[offsets.len() - 1]);

        for (index, instruction) in self.bytecode.instructions.iter().enumerate() {
            let opcode = i64::from(instruction.opcode());
            if opcode_width == 1 && opcode > 0xFF {
                return Err(Diagnostic::assembly(
                    format!("Opcode {:#x} does not fit in {} byte(s)", opcode, opcode_width),
                    self.position_of(index),
                ));
            }
            write_int(&mut code, opcode, opcode_width, endianness);

            let mut operands = instruction.operands();
            match instruction.jump() {
                Some(Jump::Relative(delta)) => {
                    let target = index as i64 + i64::from(delta);
                    let target = usize::try_from(target)
                        .ok()
                        .and_then(|target| offsets.get(target))
                        .ok_or_else(|| {
                            Diagnostic::codegen(
                                format!("Branch at instruction {} leaves the script", index),
                                self.position_of(index),
                            )
                        })?;
                    operands[0] = *target as i64 - offsets[index] as i64;
                }
                Some(Jump::Pending) => {
                    return Err(Diagnostic::codegen(
                        format!("Branch at instruction {} was never patched", index),
                        self.position_of(index),
                    ))
                }
                None => {}
            }

            for operand in operands {
                if !fits(operand, operand_width) {
                    return Err(Diagnostic::assembly(
                        format!(
                            "Operand {} of {:?} does not fit in {} byte(s)",
                            operand, instruction, operand_width
                        ),
                        self.position_of(index),
                    ));
                }
                write_int(&mut code, operand, operand_width, endianness);
            }
        }

        let debug = self
            .bytecode
            .debug
            .iter()
            .map(|(index, position)| (offsets[(*index).min(offsets.len() - 1)], *position))
            .collect();

        Ok(Assembly {
            code,
            strings: self.bytecode.strings.clone(),
            constants: self.bytecode.constants.clone(),
            locals: self.bytecode.locals.clone(),
            debug,
        })
    }
}
