use crate::token::{Position, Token};
use std::error::Error;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum CompilerError {
    FileNotFound(String),
    IO(std::io::Error),
    Json(serde_json::Error),
    Compile {
        path: PathBuf,
        diagnostic: Diagnostic,
    },
}

impl Error for CompilerError {}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CompilerError::IO(err) => writeln!(f, "IOError: {}", err),
            CompilerError::FileNotFound(err) => writeln!(f, "FileNotFoundError: {}", err),
            CompilerError::Json(err) => writeln!(f, "JsonError: {}", err),
            CompilerError::Compile { path, diagnostic } => writeln!(
                f,
                "{}: {}\n  --> {}:{}:{}",
                diagnostic.stage,
                diagnostic.message,
                path.display(),
                diagnostic.position.line,
                diagnostic.position.column,
            ),
        }
    }
}

impl From<std::io::Error> for CompilerError {
    fn from(err: std::io::Error) -> Self {
        CompilerError::IO(err)
    }
}

impl From<serde_json::Error> for CompilerError {
    fn from(err: serde_json::Error) -> Self {
        CompilerError::Json(err)
    }
}

/// The pipeline stage a diagnostic was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Lexical,
    Syntax,
    Resolution,
    CodeGen,
    Assembly,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Stage::Lexical => "LexingError",
            Stage::Syntax => "SyntaxError",
            Stage::Resolution => "ResolutionError",
            Stage::CodeGen => "CodeGenError",
            Stage::Assembly => "AssemblyError",
        };
        f.write_str(name)
    }
}

/// The single error a compile unit can fail with.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub stage: Stage,
    pub message: String,
    pub position: Position,
}

impl Error for Diagnostic {}

impl Diagnostic {
    pub fn new(stage: Stage, message: impl Into<String>, position: Position) -> Self {
        Self {
            stage,
            message: message.into(),
            position,
        }
    }

    pub fn lexical(message: impl Into<String>, position: Position) -> Self {
        Self::new(Stage::Lexical, message, position)
    }

    pub fn syntax(message: impl Into<String>, position: Position) -> Self {
        Self::new(Stage::Syntax, message, position)
    }

    pub fn from_token(token: &Token, message: impl Into<String>) -> Self {
        Self::new(Stage::Syntax, message, token.position)
    }

    pub fn resolution(message: impl Into<String>, position: Position) -> Self {
        Self::new(Stage::Resolution, message, position)
    }

    pub fn codegen(message: impl Into<String>, position: Position) -> Self {
        Self::new(Stage::CodeGen, message, position)
    }

    pub fn assembly(message: impl Into<String>, position: Position) -> Self {
        Self::new(Stage::Assembly, message, position)
    }

    /// Internal invariant violations are compiler defects, not script errors.
    pub fn is_internal(&self) -> bool {
        self.stage == Stage::CodeGen
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}: {}\n  --> {}:{}",
            self.stage, self.message, self.position.line, self.position.column,
        )
    }
}
