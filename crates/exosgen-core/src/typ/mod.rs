//! TypeParser: IEC 61131-3 `.typ` declarations to [`TypeModel`].
//!
//! Declarations may appear in any order; references between records and to
//! `VAR CONSTANT` bounds are resolved after the whole document has been read.

mod lex;
mod parse;
mod validate;

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::Path;

use crate::config::DEFAULT_MAX_IDENTIFIER_LEN;
use crate::error::{GenerateError, SchemaError};
use crate::model::{Field, FieldKind, Primitive, RecordType, TypeModel};

use parse::{Bound, RawDocument, RawType};

pub use validate::check_identifier;

/// Length of a bare `STRING` declaration.
pub const DEFAULT_STRING_LEN: u32 = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    pub max_identifier_len: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            max_identifier_len: DEFAULT_MAX_IDENTIFIER_LEN,
        }
    }
}

/// All records declared in one source document, references resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDocument {
    pub records: BTreeMap<String, RecordType>,
    /// Record names in source order.
    pub order: Vec<String>,
    pub constants: BTreeMap<String, i64>,
    pub source_sha256: String,
}

pub fn parse(src: &str, type_name: &str, opts: &ParseOptions) -> Result<TypeModel, SchemaError> {
    parse_document(src, opts)?.model(type_name)
}

pub fn parse_file(path: &Path, type_name: &str, opts: &ParseOptions) -> Result<TypeModel, GenerateError> {
    let src = std::fs::read_to_string(path)
        .map_err(|err| GenerateError::io(format!("read type source {}", path.display()), err))?;
    Ok(parse(&src, type_name, opts)?)
}

pub fn parse_document(src: &str, opts: &ParseOptions) -> Result<TypeDocument, SchemaError> {
    let lexed = lex::lex(src)?;
    let raw = parse::parse_document(&lexed.tokens, &lexed.comments)?;
    let doc = resolve_document(raw, opts, crate::util::sha256_hex(src.as_bytes()))?;
    tracing::debug!(
        records = doc.records.len(),
        constants = doc.constants.len(),
        sha256 = %doc.source_sha256,
        "parsed type document"
    );
    Ok(doc)
}

impl TypeDocument {
    /// The root record `type_name` and every record reachable from it.
    pub fn model(&self, type_name: &str) -> Result<TypeModel, SchemaError> {
        let root = self.records.get(type_name).or_else(|| {
            self.records
                .values()
                .find(|r| r.name.eq_ignore_ascii_case(type_name))
        });
        let Some(root) = root else {
            return Err(SchemaError::TypeNotFound {
                name: type_name.to_string(),
            });
        };

        let mut records = BTreeMap::new();
        let mut queue = VecDeque::from([root.name.clone()]);
        while let Some(name) = queue.pop_front() {
            if records.contains_key(&name) {
                continue;
            }
            let Some(rec) = self.records.get(&name) else {
                continue;
            };
            for f in &rec.fields {
                if let Some(dep) = f.kind.referenced_record() {
                    queue.push_back(dep.to_string());
                }
            }
            records.insert(name, rec.clone());
        }

        Ok(TypeModel {
            type_name: root.name.clone(),
            records,
            source_sha256: Some(self.source_sha256.clone()),
        })
    }
}

fn resolve_document(
    raw: RawDocument,
    opts: &ParseOptions,
    source_sha256: String,
) -> Result<TypeDocument, SchemaError> {
    // IEC identifiers are case-insensitive; lookups go through lower-case keys.
    let mut seen: BTreeSet<String> = BTreeSet::new();

    let mut constants = BTreeMap::new();
    let mut const_keys: BTreeMap<String, i64> = BTreeMap::new();
    for c in &raw.constants {
        check_identifier(&c.name, c.line, opts.max_identifier_len)?;
        if !seen.insert(c.name.to_ascii_lowercase()) {
            return Err(SchemaError::DuplicateType {
                line: c.line,
                name: c.name.clone(),
            });
        }
        constants.insert(c.name.clone(), c.value);
        const_keys.insert(c.name.to_ascii_lowercase(), c.value);
    }

    let mut canonical: BTreeMap<String, String> = BTreeMap::new();
    for r in &raw.records {
        check_identifier(&r.name, r.line, opts.max_identifier_len)?;
        if Primitive::from_keyword(&r.name).is_some() {
            return Err(SchemaError::IllegalIdentifier {
                line: r.line,
                name: r.name.clone(),
                reason: "shadows an elementary type".to_string(),
            });
        }
        if !seen.insert(r.name.to_ascii_lowercase()) {
            return Err(SchemaError::DuplicateType {
                line: r.line,
                name: r.name.clone(),
            });
        }
        canonical.insert(r.name.to_ascii_lowercase(), r.name.clone());
    }

    let resolver = Resolver {
        canonical: &canonical,
        constants: &const_keys,
    };

    let mut records = BTreeMap::new();
    let mut order = Vec::with_capacity(raw.records.len());
    for r in raw.records {
        let mut field_names: BTreeSet<String> = BTreeSet::new();
        let mut fields = Vec::with_capacity(r.fields.len());
        for f in r.fields {
            check_identifier(&f.name, f.line, opts.max_identifier_len)?;
            if !field_names.insert(f.name.to_ascii_lowercase()) {
                return Err(SchemaError::DuplicateField {
                    line: f.line,
                    record: r.name.clone(),
                    field: f.name,
                });
            }
            let kind = resolver.kind(&f.ty, &r.name, &f.name, f.line)?;
            fields.push(Field {
                name: f.name,
                kind,
                comment: f.comment,
                line: f.line,
            });
        }
        order.push(r.name.clone());
        records.insert(
            r.name.clone(),
            RecordType {
                name: r.name,
                fields,
                comment: r.comment,
                line: r.line,
            },
        );
    }

    Ok(TypeDocument {
        records,
        order,
        constants,
        source_sha256,
    })
}

struct Resolver<'a> {
    canonical: &'a BTreeMap<String, String>,
    constants: &'a BTreeMap<String, i64>,
}

impl Resolver<'_> {
    fn kind(&self, ty: &RawType, record: &str, field: &str, line: u32) -> Result<FieldKind, SchemaError> {
        match ty {
            RawType::Primitive(p) => Ok(FieldKind::Primitive { ty: *p }),
            RawType::Named(name) => match self.canonical.get(&name.to_ascii_lowercase()) {
                Some(canon) => Ok(FieldKind::Record {
                    name: canon.clone(),
                }),
                None => Err(SchemaError::UnknownType {
                    line,
                    record: record.to_string(),
                    field: field.to_string(),
                    ty: name.clone(),
                }),
            },
            RawType::String(bound) => {
                let max_len = match bound {
                    None => DEFAULT_STRING_LEN,
                    Some(b) => self.positive(self.bound(b, line)?, record, field, line)?,
                };
                Ok(FieldKind::FixedString { max_len })
            }
            RawType::Array { ranges, element } => {
                let mut kind = self.kind(element, record, field, line)?;
                for (lo, hi) in ranges.iter().rev() {
                    let lo = self.bound(lo, line)?;
                    let hi = self.bound(hi, line)?;
                    let span = hi.checked_sub(lo).and_then(|d| d.checked_add(1));
                    let Some(span) = span else {
                        return Err(SchemaError::Syntax {
                            line,
                            message: format!("array range of {record}.{field} overflows"),
                        });
                    };
                    let count = self.positive(span, record, field, line)?;
                    kind = FieldKind::FixedArray {
                        element: Box::new(kind),
                        count,
                    };
                }
                Ok(kind)
            }
        }
    }

    fn bound(&self, b: &Bound, line: u32) -> Result<i64, SchemaError> {
        match b {
            Bound::Lit(v) => Ok(*v),
            Bound::Const(name) => self
                .constants
                .get(&name.to_ascii_lowercase())
                .copied()
                .ok_or_else(|| SchemaError::UnknownConstant {
                    line,
                    name: name.clone(),
                }),
        }
    }

    fn positive(&self, v: i64, record: &str, field: &str, line: u32) -> Result<u32, SchemaError> {
        if v <= 0 {
            return Err(SchemaError::NonPositiveBound {
                line,
                record: record.to_string(),
                field: field.to_string(),
                bound: v,
            });
        }
        u32::try_from(v).map_err(|_| SchemaError::Syntax {
            line,
            message: format!("bound {v} of {record}.{field} is too large"),
        })
    }
}
