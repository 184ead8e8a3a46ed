//! Reference stack machine used by the tests to execute generated code.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::Accessor;
use crate::bytecode::{ByteCode, Instruction, Jump};
use crate::types::Comparison;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Real(f64),
    Str(String),
    Undefined,
    Array(Rc<RefCell<Vec<Value>>>),
    Struct(Rc<RefCell<HashMap<String, Value>>>),
}

impl Value {
    fn truthy(&self) -> bool {
        match self {
            Value::Real(r) => *r > 0.5,
            Value::Str(s) => !s.is_empty(),
            Value::Undefined => false,
            Value::Array(_) | Value::Struct(_) => true,
        }
    }

    fn real(&self) -> Result<f64, String> {
        match self {
            Value::Real(r) => Ok(*r),
            other => Err(format!("Expected a number, got {:?}", other)),
        }
    }

    fn from_bool(b: bool) -> Value {
        Value::Real(if b { 1.0 } else { 0.0 })
    }

    fn key(&self) -> String {
        match self {
            Value::Real(r) => r.to_string(),
            Value::Str(s) => s.clone(),
            other => format!("{:?}", other),
        }
    }
}

const SELF_ID: i32 = 0;

pub struct VM<'a> {
    bytecode: &'a ByteCode,
    ip: usize,
    stack: Vec<Value>,
    locals: Vec<Value>,
    instances: HashMap<i32, HashMap<String, Value>>,
    current: i32,
    env: Vec<i32>,
    globals: HashMap<String, Value>,
    builtins: HashMap<String, Value>,
    arguments: Vec<Value>,
    /// Builtin calls by name, script calls as `script <id>`.
    pub calls: Vec<String>,
    max_instructions: usize,
}

impl<'a> VM<'a> {
    pub fn new(bytecode: &'a ByteCode) -> Self {
        let mut instances = HashMap::new();
        instances.insert(SELF_ID, HashMap::new());
        VM {
            bytecode,
            ip: 0,
            stack: Vec::new(),
            locals: vec![Value::Undefined; bytecode.locals.len()],
            instances,
            current: SELF_ID,
            env: Vec::new(),
            globals: HashMap::new(),
            builtins: HashMap::new(),
            arguments: Vec::new(),
            calls: Vec::new(),
            max_instructions: 100_000,
        }
    }

    pub fn set_instance(&mut self, name: &str, value: Value) {
        if let Some(vars) = self.instances.get_mut(&SELF_ID) {
            vars.insert(name.to_string(), value);
        }
    }

    pub fn add_instance(&mut self, id: i32) {
        self.instances.entry(id).or_default();
    }

    pub fn instance(&self, id: i32, name: &str) -> Option<Value> {
        self.instances.get(&id).and_then(|vars| vars.get(name)).cloned()
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    pub fn env_depth(&self) -> usize {
        self.env.len()
    }

    fn pop(&mut self) -> Result<Value, String> {
        self.stack.pop().ok_or_else(|| "Stack underflow".to_string())
    }

    fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, String> {
        if self.stack.len() < n {
            return Err("Stack underflow".to_string());
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    fn name(&self, id: u32) -> Result<String, String> {
        self.bytecode
            .strings
            .get(id as usize)
            .cloned()
            .ok_or_else(|| format!("No string {}", id))
    }

    fn vars(&mut self, id: i32) -> Result<&mut HashMap<String, Value>, String> {
        self.instances
            .get_mut(&id)
            .ok_or_else(|| format!("No instance {}", id))
    }

    fn jump(&mut self, from: usize, jump: Jump) -> Result<(), String> {
        match jump {
            Jump::Relative(delta) => {
                self.ip = (from as i64 + i64::from(delta)) as usize;
                Ok(())
            }
            Jump::Pending => Err(format!("Unpatched branch at {}", from)),
        }
    }

    fn element(container: &Value, indices: &[Value], accessor: Accessor) -> Result<Value, String> {
        match (accessor, container) {
            (Accessor::Map, Value::Struct(map)) => {
                Ok(map.borrow().get(&indices[0].key()).cloned().unwrap_or(Value::Undefined))
            }
            (_, Value::Array(items)) => {
                let index = indices[0].real()? as usize;
                let item = items.borrow().get(index).cloned().unwrap_or(Value::Undefined);
                match indices.len() {
                    1 => Ok(item),
                    _ => Self::element(&item, &indices[1..], accessor),
                }
            }
            (_, other) => Err(format!("Cannot index {:?}", other)),
        }
    }

    fn store(container: &Value, indices: &[Value], accessor: Accessor, value: Value) -> Result<(), String> {
        match (accessor, container) {
            (Accessor::Map, Value::Struct(map)) => {
                map.borrow_mut().insert(indices[0].key(), value);
                Ok(())
            }
            (_, Value::Array(items)) => {
                let index = indices[0].real()? as usize;
                let mut items = items.borrow_mut();
                if items.len() <= index {
                    items.resize(index + 1, Value::Real(0.0));
                }
                if indices.len() == 1 {
                    items[index] = value;
                    return Ok(());
                }
                if !matches!(items[index], Value::Array(_)) {
                    items[index] = Value::Array(Rc::new(RefCell::new(Vec::new())));
                }
                let row = items[index].clone();
                drop(items);
                Self::store(&row, &indices[1..], accessor, value)
            }
            (_, other) => Err(format!("Cannot index {:?}", other)),
        }
    }

    fn arithmetic(instruction: &Instruction, a: Value, b: Value) -> Result<Value, String> {
        if let (Instruction::Add, Value::Str(a), Value::Str(b)) = (instruction, &a, &b) {
            return Ok(Value::Str(format!("{}{}", a, b)));
        }
        let (a, b) = (a.real()?, b.real()?);
        let value = match instruction {
            Instruction::Add => a + b,
            Instruction::Sub => a - b,
            Instruction::Mul => a * b,
            Instruction::Div => a / b,
            Instruction::IntDiv => (a / b).trunc(),
            Instruction::Mod => a % b,
            Instruction::BitAnd => ((a as i64) & (b as i64)) as f64,
            Instruction::BitOr => ((a as i64) | (b as i64)) as f64,
            Instruction::BitXor => ((a as i64) ^ (b as i64)) as f64,
            Instruction::Shl => ((a as i64) << (b as i64)) as f64,
            Instruction::Shr => ((a as i64) >> (b as i64)) as f64,
            other => return Err(format!("{:?} is not arithmetic", other)),
        };
        Ok(Value::Real(value))
    }

    fn compare(a: &Value, b: &Value) -> Option<Ordering> {
        match (a, b) {
            (Value::Real(a), Value::Real(b)) => a.partial_cmp(b),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Undefined, Value::Undefined) => Some(Ordering::Equal),
            _ => None,
        }
    }

    /// Runs until `Ret` or `Exit` and returns the script's result.
    pub fn run(&mut self) -> Result<Value, String> {
        let bytecode = self.bytecode;
        let instructions = &bytecode.instructions;
        let mut executed = 0;

        while self.ip < instructions.len() {
            executed += 1;
            if executed > self.max_instructions {
                return Err(format!(
                    "Execution exceeded maximum instruction count ({}).",
                    self.max_instructions
                ));
            }

            let current_ip = self.ip;
            self.ip += 1;

            match &instructions[current_ip] {
                Instruction::PushInt(n) => self.stack.push(Value::Real(f64::from(*n))),
                Instruction::PushReal(id) => {
                    let value = self.bytecode.constants[*id as usize];
                    self.stack.push(Value::Real(value));
                }
                Instruction::PushString(id) => {
                    let value = self.name(*id)?;
                    self.stack.push(Value::Str(value));
                }
                Instruction::PushLocal(slot) => {
                    let value = self.locals[*slot as usize].clone();
                    self.stack.push(value);
                }
                Instruction::PopLocal(slot) => {
                    self.locals[*slot as usize] = self.pop()?;
                }
                Instruction::PushInstance(id) => {
                    let name = self.name(*id)?;
                    let current = self.current;
                    let value = self.vars(current)?.get(&name).cloned().unwrap_or(Value::Undefined);
                    self.stack.push(value);
                }
                Instruction::PopInstance(id) => {
                    let name = self.name(*id)?;
                    let value = self.pop()?;
                    let current = self.current;
                    self.vars(current)?.insert(name, value);
                }
                Instruction::PushGlobal(id) => {
                    let name = self.name(*id)?;
                    let value = self.globals.get(&name).cloned().unwrap_or(Value::Undefined);
                    self.stack.push(value);
                }
                Instruction::PopGlobal(id) => {
                    let name = self.name(*id)?;
                    let value = self.pop()?;
                    self.globals.insert(name, value);
                }
                Instruction::PushBuiltin(id) => {
                    let name = self.name(*id)?;
                    let value = self.builtins.get(&name).cloned().unwrap_or(Value::Real(0.0));
                    self.stack.push(value);
                }
                Instruction::PopBuiltin(id) => {
                    let name = self.name(*id)?;
                    let value = self.pop()?;
                    self.builtins.insert(name, value);
                }
                Instruction::PushArgument(n) => {
                    let value = self.arguments.get(*n as usize).cloned().unwrap_or(Value::Undefined);
                    self.stack.push(value);
                }
                Instruction::PopArgument(n) => {
                    let value = self.pop()?;
                    let n = *n as usize;
                    if self.arguments.len() <= n {
                        self.arguments.resize(n + 1, Value::Undefined);
                    }
                    self.arguments[n] = value;
                }
                Instruction::PushArgumentIndexed => {
                    let index = self.pop()?.real()? as usize;
                    let value = self.arguments.get(index).cloned().unwrap_or(Value::Undefined);
                    self.stack.push(value);
                }
                Instruction::PopArgumentIndexed => {
                    let value = self.pop()?;
                    let index = self.pop()?.real()? as usize;
                    if self.arguments.len() <= index {
                        self.arguments.resize(index + 1, Value::Undefined);
                    }
                    self.arguments[index] = value;
                }
                Instruction::PushFunction(id) => {
                    let name = self.name(*id)?;
                    self.stack.push(Value::Str(name));
                }
                Instruction::PushField(id) => {
                    let name = self.name(*id)?;
                    let instance = self.pop()?.real()? as i32;
                    let value = self.vars(instance)?.get(&name).cloned().unwrap_or(Value::Undefined);
                    self.stack.push(value);
                }
                Instruction::PopField(id) => {
                    let name = self.name(*id)?;
                    let value = self.pop()?;
                    let instance = self.pop()?.real()? as i32;
                    self.vars(instance)?.insert(name, value);
                }
                Instruction::LoadIndex { accessor, dims } => {
                    let indices = self.pop_n(*dims as usize)?;
                    let container = self.pop()?;
                    let value = Self::element(&container, &indices, *accessor)?;
                    self.stack.push(value);
                }
                Instruction::StoreIndex { accessor, dims } => {
                    let value = self.pop()?;
                    let indices = self.pop_n(*dims as usize)?;
                    let container = self.pop()?;
                    Self::store(&container, &indices, *accessor, value)?;
                }
                Instruction::NewArray(n) => {
                    let items = self.pop_n(*n as usize)?;
                    self.stack.push(Value::Array(Rc::new(RefCell::new(items))));
                }
                Instruction::NewStruct(n) => {
                    let pairs = self.pop_n(*n as usize * 2)?;
                    let fields = pairs
                        .chunks(2)
                        .map(|pair| (pair[0].key(), pair[1].clone()))
                        .collect();
                    self.stack.push(Value::Struct(Rc::new(RefCell::new(fields))));
                }
                Instruction::Dup(n) => {
                    let n = *n as usize;
                    if self.stack.len() < n {
                        return Err("Stack underflow".to_string());
                    }
                    let top = self.stack[self.stack.len() - n..].to_vec();
                    self.stack.extend(top);
                }
                Instruction::Popz => {
                    self.pop()?;
                }
                Instruction::Neg => {
                    let value = self.pop()?.real()?;
                    self.stack.push(Value::Real(-value));
                }
                Instruction::Not => {
                    let value = self.pop()?;
                    self.stack.push(Value::from_bool(!value.truthy()));
                }
                Instruction::BitNot => {
                    let value = self.pop()?.real()?;
                    self.stack.push(Value::Real(!(value as i64) as f64));
                }
                Instruction::Cmp(comparison) => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    let result = match Self::compare(&a, &b) {
                        Some(ordering) => comparison.holds(ordering),
                        None => match comparison {
                            Comparison::Equal => false,
                            Comparison::NotEqual => true,
                            _ => return Err(format!("Cannot compare {:?} and {:?}", a, b)),
                        },
                    };
                    self.stack.push(Value::from_bool(result));
                }
                Instruction::Branch(jump) => self.jump(current_ip, *jump)?,
                Instruction::BranchTrue(jump) => {
                    if self.pop()?.truthy() {
                        self.jump(current_ip, *jump)?;
                    }
                }
                Instruction::BranchFalse(jump) => {
                    if !self.pop()?.truthy() {
                        self.jump(current_ip, *jump)?;
                    }
                }
                // One instance per id, so every `with` body runs at most once.
                Instruction::PushEnv(jump) => {
                    let target = self.pop()?.real()? as i32;
                    if self.instances.contains_key(&target) {
                        self.env.push(self.current);
                        self.current = target;
                    } else {
                        self.jump(current_ip, *jump)?;
                    }
                }
                Instruction::PopEnv(_) | Instruction::PopEnvExit => {
                    self.current = self.env.pop().ok_or_else(|| "Environment underflow".to_string())?;
                }
                Instruction::Call { function, argc } => {
                    let name = self.name(*function)?;
                    let mut args = self.pop_n(*argc as usize)?;
                    args.reverse();
                    self.calls.push(name);
                    self.stack.push(args.into_iter().next().unwrap_or(Value::Real(0.0)));
                }
                Instruction::CallScript { reference, argc } => {
                    self.pop_n(*argc as usize)?;
                    self.calls.push(format!("script {}", reference));
                    self.stack.push(Value::Undefined);
                }
                Instruction::CallValue { argc } => {
                    self.pop()?;
                    self.pop_n(*argc as usize)?;
                    self.stack.push(Value::Undefined);
                }
                Instruction::Ret => return self.pop(),
                Instruction::Exit => return Ok(Value::Undefined),
                arithmetic => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    let value = Self::arithmetic(arithmetic, a, b)?;
                    self.stack.push(value);
                }
            }
        }

        Ok(Value::Undefined)
    }
}
