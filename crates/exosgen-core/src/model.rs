use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// IEC 61131-3 elementary types accepted in a datamodel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Primitive {
    Bool,
    Sint,
    Usint,
    Byte,
    Int,
    Uint,
    Word,
    Dint,
    Udint,
    Dword,
    Time,
    DateAndTime,
    Real,
    Lint,
    Ulint,
    Lword,
    Lreal,
}

impl Primitive {
    pub fn from_keyword(word: &str) -> Option<Self> {
        let p = match word.to_ascii_uppercase().as_str() {
            "BOOL" => Primitive::Bool,
            "SINT" => Primitive::Sint,
            "USINT" => Primitive::Usint,
            "BYTE" => Primitive::Byte,
            "INT" => Primitive::Int,
            "UINT" => Primitive::Uint,
            "WORD" => Primitive::Word,
            "DINT" => Primitive::Dint,
            "UDINT" => Primitive::Udint,
            "DWORD" => Primitive::Dword,
            "TIME" => Primitive::Time,
            "DATE_AND_TIME" | "DT" => Primitive::DateAndTime,
            "REAL" => Primitive::Real,
            "LINT" => Primitive::Lint,
            "ULINT" => Primitive::Ulint,
            "LWORD" => Primitive::Lword,
            "LREAL" => Primitive::Lreal,
            _ => return None,
        };
        Some(p)
    }

    pub fn iec_name(self) -> &'static str {
        match self {
            Primitive::Bool => "BOOL",
            Primitive::Sint => "SINT",
            Primitive::Usint => "USINT",
            Primitive::Byte => "BYTE",
            Primitive::Int => "INT",
            Primitive::Uint => "UINT",
            Primitive::Word => "WORD",
            Primitive::Dint => "DINT",
            Primitive::Udint => "UDINT",
            Primitive::Dword => "DWORD",
            Primitive::Time => "TIME",
            Primitive::DateAndTime => "DATE_AND_TIME",
            Primitive::Real => "REAL",
            Primitive::Lint => "LINT",
            Primitive::Ulint => "ULINT",
            Primitive::Lword => "LWORD",
            Primitive::Lreal => "LREAL",
        }
    }

    /// Natural width in bytes.
    pub fn width(self) -> u32 {
        match self {
            Primitive::Bool | Primitive::Sint | Primitive::Usint | Primitive::Byte => 1,
            Primitive::Int | Primitive::Uint | Primitive::Word => 2,
            Primitive::Dint
            | Primitive::Udint
            | Primitive::Dword
            | Primitive::Time
            | Primitive::DateAndTime
            | Primitive::Real => 4,
            Primitive::Lint | Primitive::Ulint | Primitive::Lword | Primitive::Lreal => 8,
        }
    }

    pub fn c_type(self) -> &'static str {
        match self {
            Primitive::Bool => "bool",
            Primitive::Sint => "int8_t",
            Primitive::Usint | Primitive::Byte => "uint8_t",
            Primitive::Int => "int16_t",
            Primitive::Uint | Primitive::Word => "uint16_t",
            Primitive::Dint | Primitive::Time => "int32_t",
            Primitive::Udint | Primitive::Dword | Primitive::DateAndTime => "uint32_t",
            Primitive::Real => "float",
            Primitive::Lint => "int64_t",
            Primitive::Ulint | Primitive::Lword => "uint64_t",
            Primitive::Lreal => "double",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    Primitive {
        ty: Primitive,
    },
    FixedArray {
        element: Box<FieldKind>,
        count: u32,
    },
    /// Reference to another record of the same model, by type name.
    Record {
        name: String,
    },
    FixedString {
        max_len: u32,
    },
}

impl FieldKind {
    /// Innermost element kind of a (possibly nested) array.
    pub fn element_kind(&self) -> &FieldKind {
        match self {
            FieldKind::FixedArray { element, .. } => element.element_kind(),
            other => other,
        }
    }

    /// Array dimensions from outermost to innermost; empty for scalars.
    pub fn dimensions(&self) -> Vec<u32> {
        let mut dims = Vec::new();
        let mut cur = self;
        while let FieldKind::FixedArray { element, count } = cur {
            dims.push(*count);
            cur = element;
        }
        dims
    }

    pub fn referenced_record(&self) -> Option<&str> {
        match self.element_kind() {
            FieldKind::Record { name } => Some(name.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// 1-based line of the declaration in the source document.
    #[serde(default)]
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordType {
    pub name: String,
    pub fields: Vec<Field>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub line: u32,
}

/// A parsed structured type: the root record plus every record it reaches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeModel {
    pub type_name: String,
    pub records: BTreeMap<String, RecordType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_sha256: Option<String>,
}

impl TypeModel {
    pub fn root(&self) -> Option<&RecordType> {
        self.records.get(&self.type_name)
    }

    pub fn record(&self, name: &str) -> Option<&RecordType> {
        self.records.get(name)
    }

    /// Distinct record names referenced by `record`'s fields, in field order.
    pub fn referenced_records<'a>(&self, record: &'a RecordType) -> Vec<&'a str> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for f in &record.fields {
            if let Some(name) = f.kind.referenced_record() {
                if seen.insert(name) {
                    out.push(name);
                }
            }
        }
        out
    }
}
