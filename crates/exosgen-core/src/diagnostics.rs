use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    Parse,
    Validate,
    Layout,
    Naming,
    Write,
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DiagnosticCode {
    EXG0001SyntaxError,
    EXG0002TypeNotFound,
    EXG0100IllegalIdentifier,
    EXG0101DuplicateName,
    EXG0110UnknownType,
    EXG0111UnknownConstant,
    EXG0120NonPositiveBound,
    EXG0130UnsupportedKind,
    EXG0200RecordCycle,
    EXG0201NestingTooDeep,
    EXG0202EmptyRecord,
    EXG0203LayoutTooLarge,
    EXG0204MissingRecord,
    EXG0205TooManyFields,
    EXG0300NamingConflict,
    EXG0400OutputExists,
    EXG0401OutputNotDirectory,
    EXG0402Io,
    EXG0403CheckMismatch,
    EXG0500InvalidConfig,
}

impl DiagnosticCode {
    pub fn code_str(self) -> &'static str {
        match self {
            DiagnosticCode::EXG0001SyntaxError => "EXG0001",
            DiagnosticCode::EXG0002TypeNotFound => "EXG0002",
            DiagnosticCode::EXG0100IllegalIdentifier => "EXG0100",
            DiagnosticCode::EXG0101DuplicateName => "EXG0101",
            DiagnosticCode::EXG0110UnknownType => "EXG0110",
            DiagnosticCode::EXG0111UnknownConstant => "EXG0111",
            DiagnosticCode::EXG0120NonPositiveBound => "EXG0120",
            DiagnosticCode::EXG0130UnsupportedKind => "EXG0130",
            DiagnosticCode::EXG0200RecordCycle => "EXG0200",
            DiagnosticCode::EXG0201NestingTooDeep => "EXG0201",
            DiagnosticCode::EXG0202EmptyRecord => "EXG0202",
            DiagnosticCode::EXG0203LayoutTooLarge => "EXG0203",
            DiagnosticCode::EXG0204MissingRecord => "EXG0204",
            DiagnosticCode::EXG0205TooManyFields => "EXG0205",
            DiagnosticCode::EXG0300NamingConflict => "EXG0300",
            DiagnosticCode::EXG0400OutputExists => "EXG0400",
            DiagnosticCode::EXG0401OutputNotDirectory => "EXG0401",
            DiagnosticCode::EXG0402Io => "EXG0402",
            DiagnosticCode::EXG0403CheckMismatch => "EXG0403",
            DiagnosticCode::EXG0500InvalidConfig => "EXG0500",
        }
    }

    pub fn phase(self) -> Phase {
        match self {
            DiagnosticCode::EXG0001SyntaxError | DiagnosticCode::EXG0002TypeNotFound => {
                Phase::Parse
            }
            DiagnosticCode::EXG0100IllegalIdentifier
            | DiagnosticCode::EXG0101DuplicateName
            | DiagnosticCode::EXG0110UnknownType
            | DiagnosticCode::EXG0111UnknownConstant
            | DiagnosticCode::EXG0120NonPositiveBound
            | DiagnosticCode::EXG0130UnsupportedKind => Phase::Validate,
            DiagnosticCode::EXG0200RecordCycle
            | DiagnosticCode::EXG0201NestingTooDeep
            | DiagnosticCode::EXG0202EmptyRecord
            | DiagnosticCode::EXG0203LayoutTooLarge
            | DiagnosticCode::EXG0204MissingRecord
            | DiagnosticCode::EXG0205TooManyFields => Phase::Layout,
            DiagnosticCode::EXG0300NamingConflict => Phase::Naming,
            DiagnosticCode::EXG0400OutputExists
            | DiagnosticCode::EXG0401OutputNotDirectory
            | DiagnosticCode::EXG0402Io
            | DiagnosticCode::EXG0403CheckMismatch => Phase::Write,
            DiagnosticCode::EXG0500InvalidConfig => Phase::Config,
        }
    }

    pub fn default_message(self) -> &'static str {
        match self {
            DiagnosticCode::EXG0001SyntaxError => "failed to parse type source",
            DiagnosticCode::EXG0002TypeNotFound => "requested type is not declared",
            DiagnosticCode::EXG0100IllegalIdentifier => "illegal identifier",
            DiagnosticCode::EXG0101DuplicateName => "duplicate type or field name",
            DiagnosticCode::EXG0110UnknownType => "field references an unknown type",
            DiagnosticCode::EXG0111UnknownConstant => "array or string bound uses an unknown constant",
            DiagnosticCode::EXG0120NonPositiveBound => "array or string bound is not positive",
            DiagnosticCode::EXG0130UnsupportedKind => "unsupported type kind",
            DiagnosticCode::EXG0200RecordCycle => "record contains itself",
            DiagnosticCode::EXG0201NestingTooDeep => "records nested too deeply",
            DiagnosticCode::EXG0202EmptyRecord => "record has no fields",
            DiagnosticCode::EXG0203LayoutTooLarge => "record layout too large",
            DiagnosticCode::EXG0204MissingRecord => "record missing from model",
            DiagnosticCode::EXG0205TooManyFields => "record flattens to too many fields",
            DiagnosticCode::EXG0300NamingConflict => "library names collide after truncation",
            DiagnosticCode::EXG0400OutputExists => "output folder already exists",
            DiagnosticCode::EXG0401OutputNotDirectory => "output root is not a directory",
            DiagnosticCode::EXG0402Io => "filesystem error",
            DiagnosticCode::EXG0403CheckMismatch => "generated output differs from existing tree",
            DiagnosticCode::EXG0500InvalidConfig => "invalid generator configuration",
        }
    }

    pub fn default_help(self) -> Option<&'static str> {
        match self {
            DiagnosticCode::EXG0001SyntaxError => Some(
                "Ensure the file contains TYPE ... END_TYPE blocks of STRUCT declarations.",
            ),
            DiagnosticCode::EXG0100IllegalIdentifier => Some(
                "Use letters, digits and single underscores; avoid C and IEC keywords.",
            ),
            DiagnosticCode::EXG0130UnsupportedKind => {
                Some("Only elementary types, STRING, ARRAY and STRUCT can be synchronized.")
            }
            DiagnosticCode::EXG0200RecordCycle => {
                Some("Nested records must form a DAG; break the cycle.")
            }
            DiagnosticCode::EXG0205TooManyFields => {
                Some("Group repeated records into an ARRAY; an array of records is a single field.")
            }
            DiagnosticCode::EXG0300NamingConflict => {
                Some("Rename one of the types so their leading characters differ.")
            }
            DiagnosticCode::EXG0400OutputExists => {
                Some("Remove the folder or pick another output root; existing trees are never merged.")
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub phase: Phase,
    pub message: String,
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Diagnostic {
            code,
            phase: code.phase(),
            message: message.into(),
            help: code.default_help().map(|s| s.to_string()),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error[{}]: {}", self.code.code_str(), self.message)?;
        if let Some(help) = &self.help {
            write!(f, "\n  help: {help}")?;
        }
        Ok(())
    }
}

pub fn render_diagnostics_md() -> String {
    let mut rows: Vec<(&'static str, Phase, &'static str, &'static str)> = all_codes()
        .iter()
        .map(|code| {
            (
                code.code_str(),
                code.phase(),
                code.default_message(),
                code.default_help().unwrap_or(""),
            )
        })
        .collect();
    rows.sort_by(|a, b| a.0.cmp(b.0));

    let mut out = String::new();
    out.push_str("# exosgen diagnostics catalog\n\n");
    out.push_str("This document is generated from `crates/exosgen-core/src/diagnostics.rs`.\n\n");
    out.push_str("| Code | Phase | Message | Help |\n");
    out.push_str("| ---- | ----- | ------- | ---- |\n");
    for (code, phase, msg, help) in rows {
        out.push_str(&format!("| {code} | {phase:?} | {msg} | {help} |\n"));
    }
    out
}

fn all_codes() -> &'static [DiagnosticCode] {
    &[
        DiagnosticCode::EXG0001SyntaxError,
        DiagnosticCode::EXG0002TypeNotFound,
        DiagnosticCode::EXG0100IllegalIdentifier,
        DiagnosticCode::EXG0101DuplicateName,
        DiagnosticCode::EXG0110UnknownType,
        DiagnosticCode::EXG0111UnknownConstant,
        DiagnosticCode::EXG0120NonPositiveBound,
        DiagnosticCode::EXG0130UnsupportedKind,
        DiagnosticCode::EXG0200RecordCycle,
        DiagnosticCode::EXG0201NestingTooDeep,
        DiagnosticCode::EXG0202EmptyRecord,
        DiagnosticCode::EXG0203LayoutTooLarge,
        DiagnosticCode::EXG0204MissingRecord,
        DiagnosticCode::EXG0205TooManyFields,
        DiagnosticCode::EXG0300NamingConflict,
        DiagnosticCode::EXG0400OutputExists,
        DiagnosticCode::EXG0401OutputNotDirectory,
        DiagnosticCode::EXG0402Io,
        DiagnosticCode::EXG0403CheckMismatch,
        DiagnosticCode::EXG0500InvalidConfig,
    ]
}
