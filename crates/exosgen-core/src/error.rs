use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::diagnostics::{Diagnostic, DiagnosticCode, Phase};

/// Malformed or ambiguous type source. Fatal to the generation of that type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("line {line}: {message}")]
    Syntax { line: u32, message: String },

    #[error("type {name:?} is not declared in the source")]
    TypeNotFound { name: String },

    #[error("line {line}: illegal identifier {name:?}: {reason}")]
    IllegalIdentifier {
        line: u32,
        name: String,
        reason: String,
    },

    #[error("line {line}: duplicate type {name:?}")]
    DuplicateType { line: u32, name: String },

    #[error("line {line}: duplicate field {record}.{field}")]
    DuplicateField {
        line: u32,
        record: String,
        field: String,
    },

    #[error("line {line}: field {record}.{field} references unknown type {ty:?}")]
    UnknownType {
        line: u32,
        record: String,
        field: String,
        ty: String,
    },

    #[error("line {line}: unknown constant {name:?}")]
    UnknownConstant { line: u32, name: String },

    #[error("line {line}: field {record}.{field} has non-positive bound {bound}")]
    NonPositiveBound {
        line: u32,
        record: String,
        field: String,
        bound: i64,
    },

    #[error("line {line}: type {name:?} uses unsupported {what}")]
    Unsupported {
        line: u32,
        name: String,
        what: String,
    },
}

impl SchemaError {
    pub fn code(&self) -> DiagnosticCode {
        match self {
            SchemaError::Syntax { .. } => DiagnosticCode::EXG0001SyntaxError,
            SchemaError::TypeNotFound { .. } => DiagnosticCode::EXG0002TypeNotFound,
            SchemaError::IllegalIdentifier { .. } => DiagnosticCode::EXG0100IllegalIdentifier,
            SchemaError::DuplicateType { .. } | SchemaError::DuplicateField { .. } => {
                DiagnosticCode::EXG0101DuplicateName
            }
            SchemaError::UnknownType { .. } => DiagnosticCode::EXG0110UnknownType,
            SchemaError::UnknownConstant { .. } => DiagnosticCode::EXG0111UnknownConstant,
            SchemaError::NonPositiveBound { .. } => DiagnosticCode::EXG0120NonPositiveBound,
            SchemaError::Unsupported { .. } => DiagnosticCode::EXG0130UnsupportedKind,
        }
    }
}

/// Structural problems found while flattening a model.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("record cycle: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("records nested deeper than {limit} levels: {}", path.join(" -> "))]
    TooDeep { limit: usize, path: Vec<String> },

    #[error("record {name:?} has no fields")]
    EmptyRecord { name: String },

    #[error("record {name:?} exceeds the maximum layout size")]
    TooLarge { name: String },

    #[error("record {name:?} is referenced but missing from the model")]
    MissingRecord { name: String },

    #[error("record {name:?} flattens to more than {limit} fields")]
    TooManyFields { name: String, limit: usize },
}

impl LayoutError {
    pub fn code(&self) -> DiagnosticCode {
        match self {
            LayoutError::Cycle { .. } => DiagnosticCode::EXG0200RecordCycle,
            LayoutError::TooDeep { .. } => DiagnosticCode::EXG0201NestingTooDeep,
            LayoutError::EmptyRecord { .. } => DiagnosticCode::EXG0202EmptyRecord,
            LayoutError::TooLarge { .. } => DiagnosticCode::EXG0203LayoutTooLarge,
            LayoutError::MissingRecord { .. } => DiagnosticCode::EXG0204MissingRecord,
            LayoutError::TooManyFields { .. } => DiagnosticCode::EXG0205TooManyFields,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error(
    "types {first:?} and {second:?} both truncate to library name {library_name:?} (budget {budget})"
)]
pub struct NamingConflictError {
    pub first: String,
    pub second: String,
    pub library_name: String,
    pub budget: usize,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("folder {} already exists, choose another output folder", path.display())]
    OutputExists { path: PathBuf },

    #[error("output root {} is not a directory", path.display())]
    NotADirectory { path: PathBuf },
}

impl PreconditionError {
    pub fn code(&self) -> DiagnosticCode {
        match self {
            PreconditionError::OutputExists { .. } => DiagnosticCode::EXG0400OutputExists,
            PreconditionError::NotADirectory { .. } => DiagnosticCode::EXG0401OutputNotDirectory,
        }
    }
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    NamingConflict(#[from] NamingConflictError),

    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("generated output differs: {}", path.display())]
    CheckMismatch { path: PathBuf },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl GenerateError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        GenerateError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn code(&self) -> DiagnosticCode {
        match self {
            GenerateError::Schema(e) => e.code(),
            GenerateError::Layout(e) => e.code(),
            GenerateError::NamingConflict(_) => DiagnosticCode::EXG0300NamingConflict,
            GenerateError::Precondition(e) => e.code(),
            GenerateError::Config(_) => DiagnosticCode::EXG0500InvalidConfig,
            GenerateError::CheckMismatch { .. } => DiagnosticCode::EXG0403CheckMismatch,
            GenerateError::Io { .. } => DiagnosticCode::EXG0402Io,
        }
    }

    pub fn phase(&self) -> Phase {
        self.code().phase()
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(self.code(), self.to_string())
    }
}
