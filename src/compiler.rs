use crate::ast::{Accessor, AstKind, BinaryOp, LogicalOp, Node, Number, Resolution, Script, Step, UnaryOp};
use crate::bytecode::{ByteCode, Instruction, Jump};
use crate::error::Diagnostic;
use crate::token::Position;
use crate::types::Comparison;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Loop,
    /// Keeps its counter on the stack.
    Repeat,
    /// Keeps its subject on the stack.
    Switch,
    With,
}

/// An enclosing construct that `break`/`continue` can leave. Holds the branch
/// sites waiting for the construct's exit and continue points.
struct Frame {
    kind: FrameKind,
    breaks: Vec<usize>,
    continues: Vec<usize>,
}

/// Where an assignable expression lives once its address is on the stack.
enum Place {
    Variable { load: Instruction, store: Instruction },
    Field(u32),
    Indexed { accessor: Accessor, dims: u8 },
    ArgumentIndexed,
}

impl Place {
    /// Stack slots the address occupies.
    fn width(&self) -> u8 {
        match self {
            Place::Variable { .. } => 0,
            Place::Field(_) | Place::ArgumentIndexed => 1,
            Place::Indexed { dims, .. } => dims + 1,
        }
    }

    fn load(&self) -> Instruction {
        match self {
            Place::Variable { load, .. } => load.clone(),
            Place::Field(name) => Instruction::PushField(*name),
            Place::Indexed { accessor, dims } => Instruction::LoadIndex {
                accessor: *accessor,
                dims: *dims,
            },
            Place::ArgumentIndexed => Instruction::PushArgumentIndexed,
        }
    }

    fn store(&self) -> Instruction {
        match self {
            Place::Variable { store, .. } => store.clone(),
            Place::Field(name) => Instruction::PopField(*name),
            Place::Indexed { accessor, dims } => Instruction::StoreIndex {
                accessor: *accessor,
                dims: *dims,
            },
            Place::ArgumentIndexed => Instruction::PopArgumentIndexed,
        }
    }
}

pub struct Compiler {
    bytecode: ByteCode,
    frames: Vec<Frame>,
    temps: usize,
}

pub fn generate(script: &Script) -> Result<ByteCode, Diagnostic> {
    Compiler::new().compile_script(script)
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            bytecode: ByteCode::new(),
            frames: Vec::new(),
            temps: 0,
        }
    }

    pub fn compile_script(mut self, script: &Script) -> Result<ByteCode, Diagnostic> {
        for node in &script.body {
            self.compile_statement(node)?;
        }

        // Branches to the end of the script need an instruction to land on.
        if !matches!(self.bytecode.instructions.last(), Some(Instruction::Exit)) {
            self.bytecode.push(Instruction::Exit);
        }

        if let Some(site) = self.bytecode.first_pending() {
            let position = self
                .bytecode
                .debug
                .iter()
                .rev()
                .find(|(index, _)| *index <= site)
                .map(|(_, position)| *position)
                .unwrap_or_default();
            return Err(Diagnostic::codegen(
                format!("Branch at instruction {} was never patched", site),
                position,
            ));
        }

        Ok(self.bytecode)
    }

    fn emit(&mut self, instruction: Instruction) -> usize {
        self.bytecode.push(instruction)
    }

    fn here(&self) -> usize {
        self.bytecode.len()
    }

    fn patch(&mut self, site: usize, target: usize, position: Position) -> Result<(), Diagnostic> {
        if self.bytecode.patch(site, target) {
            Ok(())
        } else {
            Err(Diagnostic::codegen(
                format!("Instruction {} is not a branch", site),
                position,
            ))
        }
    }

    fn patch_all(&mut self, sites: &[usize], target: usize, position: Position) -> Result<(), Diagnostic> {
        for &site in sites {
            self.patch(site, target, position)?;
        }
        Ok(())
    }

    /// Emits a backward branch to an already known target.
    fn emit_back(&mut self, instruction: Instruction, target: usize, position: Position) -> Result<(), Diagnostic> {
        let site = self.emit(instruction);
        self.patch(site, target, position)
    }

    fn int_operand(value: usize, what: &str, position: Position) -> Result<u8, Diagnostic> {
        u8::try_from(value).map_err(|_| {
            Diagnostic::assembly(format!("Too many {} ({}), at most 255", what, value), position)
        })
    }

    fn count_operand(value: usize, what: &str, position: Position) -> Result<u32, Diagnostic> {
        u32::try_from(value)
            .map_err(|_| Diagnostic::assembly(format!("Too many {} ({})", what, value), position))
    }

    fn temp(&mut self) -> u32 {
        let name = format!("$tmp{}", self.temps);
        self.temps += 1;
        self.bytecode.add_local(&name)
    }

    fn in_frame<F>(&mut self, kind: FrameKind, position: Position, f: F) -> Result<Frame, Diagnostic>
    where
        F: FnOnce(&mut Self) -> Result<(), Diagnostic>,
    {
        self.frames.push(Frame {
            kind,
            breaks: Vec::new(),
            continues: Vec::new(),
        });
        let result = f(self);
        let frame = self.frames.pop();
        result?;
        frame.ok_or_else(|| Diagnostic::codegen("Loop frame stack underflow", position))
    }

    fn compile_body(&mut self, kind: FrameKind, body: &Node) -> Result<Frame, Diagnostic> {
        self.in_frame(kind, body.position, |this| this.compile_statement(body))
    }

    fn compile_statement(&mut self, node: &Node) -> Result<(), Diagnostic> {
        let position = node.position;
        self.bytecode.mark(position);

        match &node.kind {
            AstKind::Block(statements) => {
                for statement in statements {
                    self.compile_statement(statement)?;
                }
            }

            AstKind::Assignment {
                target,
                operator,
                value,
            } => {
                let place = self.compile_place(target)?;
                match operator.binary() {
                    None => self.compile_expression(value)?,
                    Some(op) => {
                        self.duplicate_address(&place);
                        self.emit(place.load());
                        self.compile_expression(value)?;
                        self.emit_binary(op);
                    }
                }
                self.emit(place.store());
            }

            AstKind::Expression(expr) => match &expr.kind {
                // Nobody reads the result, so this is just `target += 1`.
                AstKind::Update { target, step, .. } => {
                    let place = self.compile_place(target)?;
                    self.duplicate_address(&place);
                    self.emit(place.load());
                    self.emit(Instruction::PushInt(1));
                    self.emit(step_instruction(*step));
                    self.emit(place.store());
                }
                _ => {
                    self.compile_expression(expr)?;
                    self.emit(Instruction::Popz);
                }
            },

            AstKind::If {
                condition,
                then,
                otherwise,
            } => {
                self.compile_expression(condition)?;
                let skip_then = self.emit(Instruction::BranchFalse(Jump::Pending));
                self.compile_statement(then)?;
                match otherwise {
                    Some(otherwise) => {
                        let skip_else = self.emit(Instruction::Branch(Jump::Pending));
                        let else_start = self.here();
                        self.patch(skip_then, else_start, position)?;
                        self.compile_statement(otherwise)?;
                        let end = self.here();
                        self.patch(skip_else, end, position)?;
                    }
                    None => {
                        let end = self.here();
                        self.patch(skip_then, end, position)?;
                    }
                }
            }

            AstKind::While { condition, body } => {
                let start = self.here();
                self.compile_expression(condition)?;
                let exit = self.emit(Instruction::BranchFalse(Jump::Pending));
                let frame = self.compile_body(FrameKind::Loop, body)?;
                self.patch_all(&frame.continues, start, position)?;
                self.emit_back(Instruction::Branch(Jump::Pending), start, position)?;
                let end = self.here();
                self.patch(exit, end, position)?;
                self.patch_all(&frame.breaks, end, position)?;
            }

            AstKind::DoUntil { body, condition } => {
                let start = self.here();
                let frame = self.compile_body(FrameKind::Loop, body)?;
                let check = self.here();
                self.patch_all(&frame.continues, check, position)?;
                self.compile_expression(condition)?;
                self.emit_back(Instruction::BranchFalse(Jump::Pending), start, position)?;
                let end = self.here();
                self.patch_all(&frame.breaks, end, position)?;
            }

            AstKind::Repeat { count, body } => {
                self.compile_expression(count)?;
                let start = self.here();
                self.emit(Instruction::Dup(1));
                self.emit(Instruction::PushInt(0));
                self.emit(Instruction::Cmp(Comparison::Greater));
                let exit = self.emit(Instruction::BranchFalse(Jump::Pending));
                let frame = self.compile_body(FrameKind::Repeat, body)?;
                let step = self.here();
                self.patch_all(&frame.continues, step, position)?;
                self.emit(Instruction::PushInt(1));
                self.emit(Instruction::Sub);
                self.emit_back(Instruction::Branch(Jump::Pending), start, position)?;
                let end = self.here();
                self.patch(exit, end, position)?;
                self.patch_all(&frame.breaks, end, position)?;
                self.emit(Instruction::Popz);
            }

            AstKind::For {
                init,
                condition,
                step,
                body,
            } => {
                for statement in init {
                    self.compile_statement(statement)?;
                }
                let start = self.here();
                let exit = match condition {
                    Some(condition) => {
                        self.compile_expression(condition)?;
                        Some(self.emit(Instruction::BranchFalse(Jump::Pending)))
                    }
                    None => None,
                };
                let frame = self.compile_body(FrameKind::Loop, body)?;
                let step_start = self.here();
                self.patch_all(&frame.continues, step_start, position)?;
                for statement in step {
                    self.compile_statement(statement)?;
                }
                self.emit_back(Instruction::Branch(Jump::Pending), start, position)?;
                let end = self.here();
                if let Some(exit) = exit {
                    self.patch(exit, end, position)?;
                }
                self.patch_all(&frame.breaks, end, position)?;
            }

            AstKind::Switch { subject, cases } => {
                self.compile_expression(subject)?;

                let mut entries = Vec::with_capacity(cases.len());
                for case in cases {
                    match &case.label {
                        Some(label) => {
                            self.emit(Instruction::Dup(1));
                            self.compile_expression(label)?;
                            self.emit(Instruction::Cmp(Comparison::Equal));
                            entries.push(Some(self.emit(Instruction::BranchTrue(Jump::Pending))));
                        }
                        None => entries.push(None),
                    }
                }
                let no_match = self.emit(Instruction::Branch(Jump::Pending));

                // Bodies are laid out in source order so cases fall through.
                let mut has_default = false;
                let frame = self.in_frame(FrameKind::Switch, position, |this| {
                    for (case, entry) in cases.iter().zip(entries) {
                        let target = this.here();
                        match entry {
                            Some(site) => this.patch(site, target, case.position)?,
                            None if !has_default => {
                                has_default = true;
                                this.patch(no_match, target, case.position)?;
                            }
                            None => {}
                        }
                        for statement in &case.body {
                            this.compile_statement(statement)?;
                        }
                    }
                    Ok(())
                })?;

                let end = self.here();
                if !has_default {
                    self.patch(no_match, end, position)?;
                }
                self.patch_all(&frame.breaks, end, position)?;
                self.emit(Instruction::Popz);
            }

            // `with (a, b) s` runs `s` for every instance of `a`, then of `b`.
            AstKind::With { targets, body } => {
                for target in targets {
                    self.compile_expression(target)?;
                    let enter = self.emit(Instruction::PushEnv(Jump::Pending));
                    let body_start = self.here();
                    let frame = self.compile_body(FrameKind::With, body)?;
                    let next = self.here();
                    self.patch_all(&frame.continues, next, position)?;
                    self.emit_back(Instruction::PopEnv(Jump::Pending), body_start, position)?;
                    let end = self.here();
                    self.patch(enter, end, position)?;
                    self.patch_all(&frame.breaks, end, position)?;
                }
            }

            AstKind::Var(declarations) => {
                for declaration in declarations {
                    let slot = self.bytecode.add_local(&declaration.name);
                    if let Some(value) = &declaration.value {
                        self.compile_expression(value)?;
                        self.emit(Instruction::PopLocal(slot));
                    }
                }
            }

            AstKind::GlobalVar(_) | AstKind::Enum { .. } => {}

            AstKind::Return(value) => match value {
                Some(value) => {
                    self.compile_expression(value)?;
                    self.leave_environments();
                    self.emit(Instruction::Ret);
                }
                None => {
                    self.leave_environments();
                    self.emit(Instruction::Exit);
                }
            },

            AstKind::Exit => {
                self.leave_environments();
                self.emit(Instruction::Exit);
            }

            AstKind::Break => {
                let kind = match self.frames.last() {
                    Some(frame) => frame.kind,
                    None => return Err(Diagnostic::codegen("break outside of a loop", position)),
                };
                if kind == FrameKind::With {
                    self.emit(Instruction::PopEnvExit);
                }
                let site = self.emit(Instruction::Branch(Jump::Pending));
                if let Some(frame) = self.frames.last_mut() {
                    frame.breaks.push(site);
                }
            }

            AstKind::Continue => {
                let Some(depth) = self.frames.iter().rposition(|f| f.kind != FrameKind::Switch) else {
                    return Err(Diagnostic::codegen("continue outside of a loop", position));
                };
                let crossed = self.frames.len() - depth - 1;
                for _ in 0..crossed {
                    self.emit(Instruction::Popz);
                }
                let site = self.emit(Instruction::Branch(Jump::Pending));
                self.frames[depth].continues.push(site);
            }

            _ => {
                return Err(Diagnostic::codegen(
                    "Expression used as a statement",
                    position,
                ))
            }
        }

        Ok(())
    }

    /// `return` and `exit` inside `with` must leave every open environment.
    fn leave_environments(&mut self) {
        let open = self
            .frames
            .iter()
            .filter(|frame| frame.kind == FrameKind::With)
            .count();
        for _ in 0..open {
            self.emit(Instruction::PopEnvExit);
        }
    }

    fn duplicate_address(&mut self, place: &Place) {
        let width = place.width();
        if width > 0 {
            self.emit(Instruction::Dup(width));
        }
    }

    fn emit_binary(&mut self, operator: BinaryOp) {
        let instruction = match operator {
            BinaryOp::Add => Instruction::Add,
            BinaryOp::Subtract => Instruction::Sub,
            BinaryOp::Multiply => Instruction::Mul,
            BinaryOp::Divide => Instruction::Div,
            BinaryOp::IntDivide => Instruction::IntDiv,
            BinaryOp::Modulo => Instruction::Mod,
            BinaryOp::BitAnd => Instruction::BitAnd,
            BinaryOp::BitOr => Instruction::BitOr,
            BinaryOp::BitXor => Instruction::BitXor,
            BinaryOp::ShiftLeft => Instruction::Shl,
            BinaryOp::ShiftRight => Instruction::Shr,
            BinaryOp::Equal => Instruction::Cmp(Comparison::Equal),
            BinaryOp::NotEqual => Instruction::Cmp(Comparison::NotEqual),
            BinaryOp::Less => Instruction::Cmp(Comparison::Less),
            BinaryOp::LessEqual => Instruction::Cmp(Comparison::LessEqual),
            BinaryOp::Greater => Instruction::Cmp(Comparison::Greater),
            BinaryOp::GreaterEqual => Instruction::Cmp(Comparison::GreaterEqual),
        };
        self.emit(instruction);
    }

    fn variable(&mut self, name: &str, resolution: Resolution, position: Position) -> Result<Place, Diagnostic> {
        let (load, store) = match resolution {
            Resolution::Local => {
                let slot = self.bytecode.add_local(name);
                (Instruction::PushLocal(slot), Instruction::PopLocal(slot))
            }
            Resolution::Global => {
                let id = self.bytecode.add_string(name);
                (Instruction::PushGlobal(id), Instruction::PopGlobal(id))
            }
            Resolution::BuiltinVariable | Resolution::ArgumentArray => {
                let id = self.bytecode.add_string(name);
                (Instruction::PushBuiltin(id), Instruction::PopBuiltin(id))
            }
            Resolution::Dynamic => {
                let id = self.bytecode.add_string(name);
                (Instruction::PushInstance(id), Instruction::PopInstance(id))
            }
            Resolution::Argument(n) => (Instruction::PushArgument(n), Instruction::PopArgument(n)),
            other => {
                return Err(Diagnostic::codegen(
                    format!("{} ({:?}) is not a variable", name, other),
                    position,
                ))
            }
        };
        Ok(Place::Variable { load, store })
    }

    /// Pushes the address part of an assignable expression.
    fn compile_place(&mut self, target: &Node) -> Result<Place, Diagnostic> {
        match &target.kind {
            AstKind::Identifier { name, resolution } => self.variable(name, *resolution, target.position),
            AstKind::Member { target: instance, field } => {
                self.compile_expression(instance)?;
                Ok(Place::Field(self.bytecode.add_string(field)))
            }
            AstKind::Index {
                target: container,
                accessor,
                indices,
            } => {
                if is_argument_array(container, *accessor, indices) {
                    self.compile_expression(&indices[0])?;
                    return Ok(Place::ArgumentIndexed);
                }
                self.compile_expression(container)?;
                for index in indices {
                    self.compile_expression(index)?;
                }
                Ok(Place::Indexed {
                    accessor: *accessor,
                    dims: Self::int_operand(indices.len(), "indices", target.position)?,
                })
            }
            _ => Err(Diagnostic::codegen("Invalid assignment target", target.position)),
        }
    }

    fn compile_expression(&mut self, node: &Node) -> Result<(), Diagnostic> {
        let position = node.position;

        match &node.kind {
            AstKind::NumericLiteral(Number::Int(n)) => match i32::try_from(*n) {
                Ok(n) => {
                    self.emit(Instruction::PushInt(n));
                }
                Err(_) => {
                    let id = self.bytecode.add_constant(*n as f64);
                    self.emit(Instruction::PushReal(id));
                }
            },
            AstKind::NumericLiteral(Number::Real(r)) => {
                let id = self.bytecode.add_constant(*r);
                self.emit(Instruction::PushReal(id));
            }

            AstKind::StringLiteral { value, .. } => {
                let id = self.bytecode.add_string(value);
                self.emit(Instruction::PushString(id));
            }

            AstKind::Identifier { name, resolution } => match resolution {
                Resolution::Intrinsic(value) | Resolution::UserSymbol(value) => {
                    self.emit(Instruction::PushInt(*value));
                }
                Resolution::BuiltinFunction => {
                    let id = self.bytecode.add_string(name);
                    self.emit(Instruction::PushFunction(id));
                }
                _ => {
                    let place = self.variable(name, *resolution, position)?;
                    self.emit(place.load());
                }
            },

            AstKind::BinaryExpression { operator, lhs, rhs } => {
                self.compile_expression(lhs)?;
                self.compile_expression(rhs)?;
                self.emit_binary(*operator);
            }

            AstKind::LogicalExpression { operator, lhs, rhs } => match operator {
                LogicalOp::And | LogicalOp::Or => {
                    let (test, decided) = if *operator == LogicalOp::And {
                        (Instruction::BranchFalse(Jump::Pending), 0)
                    } else {
                        (Instruction::BranchTrue(Jump::Pending), 1)
                    };
                    self.compile_expression(lhs)?;
                    let short = self.emit(test);
                    self.compile_expression(rhs)?;
                    // The result is 0 or 1, like `^^`.
                    self.emit(Instruction::Not);
                    self.emit(Instruction::Not);
                    let done = self.emit(Instruction::Branch(Jump::Pending));
                    let short_target = self.here();
                    self.patch(short, short_target, position)?;
                    self.emit(Instruction::PushInt(decided));
                    let end = self.here();
                    self.patch(done, end, position)?;
                }
                // Both sides always run.
                LogicalOp::Xor => {
                    self.compile_expression(lhs)?;
                    self.emit(Instruction::Not);
                    self.compile_expression(rhs)?;
                    self.emit(Instruction::Not);
                    self.emit(Instruction::Cmp(Comparison::NotEqual));
                }
            },

            AstKind::UnaryExpression { operator, operand } => {
                self.compile_expression(operand)?;
                self.emit(match operator {
                    UnaryOp::Not => Instruction::Not,
                    UnaryOp::Negate => Instruction::Neg,
                    UnaryOp::BitNot => Instruction::BitNot,
                });
            }

            AstKind::Conditional {
                condition,
                then,
                otherwise,
            } => {
                self.compile_expression(condition)?;
                let skip_then = self.emit(Instruction::BranchFalse(Jump::Pending));
                self.compile_expression(then)?;
                let skip_else = self.emit(Instruction::Branch(Jump::Pending));
                let else_start = self.here();
                self.patch(skip_then, else_start, position)?;
                self.compile_expression(otherwise)?;
                let end = self.here();
                self.patch(skip_else, end, position)?;
            }

            AstKind::FunctionCall { callee, arguments } => {
                let argc = Self::int_operand(arguments.len(), "arguments", position)?;
                // The VM pops arguments first-to-last.
                for argument in arguments.iter().rev() {
                    self.compile_expression(argument)?;
                }
                match &callee.kind {
                    AstKind::Identifier {
                        name,
                        resolution: Resolution::BuiltinFunction,
                    } => {
                        let function = self.bytecode.add_string(name);
                        self.emit(Instruction::Call { function, argc });
                    }
                    AstKind::Identifier {
                        resolution: Resolution::UserSymbol(reference),
                        ..
                    } => {
                        self.emit(Instruction::CallScript {
                            reference: *reference,
                            argc,
                        });
                    }
                    _ => {
                        self.compile_expression(callee)?;
                        self.emit(Instruction::CallValue { argc });
                    }
                }
            }

            AstKind::Index { .. } | AstKind::Member { .. } => {
                let place = self.compile_place(node)?;
                self.emit(place.load());
            }

            AstKind::Update {
                target,
                step,
                prefix,
            } => {
                let place = self.compile_place(target)?;
                self.duplicate_address(&place);
                self.emit(place.load());
                match (&place, prefix) {
                    (Place::Variable { .. }, true) => {
                        self.emit(Instruction::PushInt(1));
                        self.emit(step_instruction(*step));
                        self.emit(Instruction::Dup(1));
                        self.emit(place.store());
                    }
                    (Place::Variable { .. }, false) => {
                        self.emit(Instruction::Dup(1));
                        self.emit(Instruction::PushInt(1));
                        self.emit(step_instruction(*step));
                        self.emit(place.store());
                    }
                    // The address sits under the value, so the result is
                    // parked in a temporary while the store runs.
                    (_, true) => {
                        let temp = self.temp();
                        self.emit(Instruction::PushInt(1));
                        self.emit(step_instruction(*step));
                        self.emit(Instruction::Dup(1));
                        self.emit(Instruction::PopLocal(temp));
                        self.emit(place.store());
                        self.emit(Instruction::PushLocal(temp));
                    }
                    (_, false) => {
                        let temp = self.temp();
                        self.emit(Instruction::Dup(1));
                        self.emit(Instruction::PopLocal(temp));
                        self.emit(Instruction::PushInt(1));
                        self.emit(step_instruction(*step));
                        self.emit(place.store());
                        self.emit(Instruction::PushLocal(temp));
                    }
                }
            }

            AstKind::StructLiteral(fields) => {
                for (key, value) in fields {
                    let id = self.bytecode.add_string(key);
                    self.emit(Instruction::PushString(id));
                    self.compile_expression(value)?;
                }
                let count = Self::count_operand(fields.len(), "struct fields", position)?;
                self.emit(Instruction::NewStruct(count));
            }

            AstKind::ArrayLiteral(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                let count = Self::count_operand(elements.len(), "array elements", position)?;
                self.emit(Instruction::NewArray(count));
            }

            other => {
                return Err(Diagnostic::codegen(
                    format!("Statement {:?} used as an expression", other),
                    position,
                ))
            }
        }

        Ok(())
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

fn step_instruction(step: Step) -> Instruction {
    match step {
        Step::Increment => Instruction::Add,
        Step::Decrement => Instruction::Sub,
    }
}

fn is_argument_array(container: &Node, accessor: Accessor, indices: &[Node]) -> bool {
    accessor == Accessor::Array
        && indices.len() == 1
        && matches!(
            container.kind,
            AstKind::Identifier {
                resolution: Resolution::ArgumentArray,
                ..
            }
        )
}
