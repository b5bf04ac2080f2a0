//! LayoutResolver: flattens a [`TypeModel`] into offset-annotated leaves.
//!
//! Layout is packed (no padding) and a pure function of the model, so two
//! artifacts generated from the same model at different times agree on it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::LayoutError;
use crate::model::{FieldKind, TypeModel};

pub const MAX_NESTING_DEPTH: usize = 64;

/// Upper bound on leaves after flattening. Each leaf costs a flag and a
/// compare in both generated sources.
pub const MAX_LEAF_COUNT: usize = 4096;

/// Separator between path segments in generated C identifiers.
pub const FLAG_SEPARATOR: &str = "__";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafField {
    /// Dotted path from the root record, e.g. `Position.X`.
    pub path: String,
    /// `path` with `.` replaced by `__`; names the changed flag in C.
    pub flag_name: String,
    pub offset: u32,
    pub size: u32,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordLayout {
    pub name: String,
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLayout {
    pub type_name: String,
    pub size: u32,
    pub leaves: Vec<LeafField>,
    /// Every record, dependencies before dependents; the root is last.
    pub records: Vec<RecordLayout>,
    /// 16 hex digits identifying this exact layout.
    pub fingerprint: String,
}

impl FieldLayout {
    pub fn leaf(&self, path: &str) -> Option<&LeafField> {
        self.leaves.iter().find(|l| l.path == path)
    }

    pub fn record_size(&self, name: &str) -> Option<u32> {
        self.records.iter().find(|r| r.name == name).map(|r| r.size)
    }

    pub fn fingerprint_u64(&self) -> u64 {
        u64::from_str_radix(&self.fingerprint, 16).unwrap_or(0)
    }
}

pub fn resolve(model: &TypeModel) -> Result<FieldLayout, LayoutError> {
    let order = dependency_order(model)?;

    let mut sizes: BTreeMap<&str, u32> = BTreeMap::new();
    let mut leaf_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for name in &order {
        let rec = record(model, name)?;
        let mut total: u32 = 0;
        let mut leaves: usize = 0;
        for f in &rec.fields {
            let size = kind_size(&f.kind, &sizes).ok_or_else(|| LayoutError::TooLarge {
                name: rec.name.clone(),
            })?;
            total = total.checked_add(size).ok_or_else(|| LayoutError::TooLarge {
                name: rec.name.clone(),
            })?;
            leaves += match &f.kind {
                FieldKind::Record { name } => leaf_counts.get(name.as_str()).copied().unwrap_or(0),
                _ => 1,
            };
        }
        if leaves > MAX_LEAF_COUNT {
            return Err(LayoutError::TooManyFields {
                name: rec.name.clone(),
                limit: MAX_LEAF_COUNT,
            });
        }
        sizes.insert(name.as_str(), total);
        leaf_counts.insert(name.as_str(), leaves);
    }

    let root = record(model, &model.type_name)?;
    let mut leaves = Vec::new();
    let mut offset = 0u32;
    flatten(model, &root.fields, &[], &sizes, &mut offset, &mut leaves)?;

    let size = sizes.get(model.type_name.as_str()).copied().unwrap_or(0);
    let records = order
        .iter()
        .map(|name| RecordLayout {
            name: name.clone(),
            size: sizes.get(name.as_str()).copied().unwrap_or(0),
        })
        .collect();

    let fingerprint = fingerprint(&model.type_name, size, &leaves);
    tracing::debug!(
        type_name = %model.type_name,
        size,
        leaves = leaves.len(),
        fingerprint = %fingerprint,
        "resolved layout"
    );

    Ok(FieldLayout {
        type_name: model.type_name.clone(),
        size,
        leaves,
        records,
        fingerprint,
    })
}

fn record<'m>(model: &'m TypeModel, name: &str) -> Result<&'m crate::model::RecordType, LayoutError> {
    model.record(name).ok_or_else(|| LayoutError::MissingRecord {
        name: name.to_string(),
    })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Records reachable from the root in post-order (dependencies first).
fn dependency_order(model: &TypeModel) -> Result<Vec<String>, LayoutError> {
    let mut marks: BTreeMap<String, Mark> = BTreeMap::new();
    let mut stack: Vec<String> = Vec::new();
    let mut out = Vec::new();
    visit(model, &model.type_name, &mut marks, &mut stack, &mut out)?;
    Ok(out)
}

fn visit(
    model: &TypeModel,
    name: &str,
    marks: &mut BTreeMap<String, Mark>,
    stack: &mut Vec<String>,
    out: &mut Vec<String>,
) -> Result<(), LayoutError> {
    match marks.get(name) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            let start = stack.iter().position(|s| s == name).unwrap_or(0);
            let mut path: Vec<String> = stack[start..].to_vec();
            path.push(name.to_string());
            return Err(LayoutError::Cycle { path });
        }
        None => {}
    }
    if stack.len() >= MAX_NESTING_DEPTH {
        let mut path = stack.clone();
        path.push(name.to_string());
        return Err(LayoutError::TooDeep {
            limit: MAX_NESTING_DEPTH,
            path,
        });
    }

    let rec = record(model, name)?;
    if rec.fields.is_empty() {
        return Err(LayoutError::EmptyRecord {
            name: name.to_string(),
        });
    }

    marks.insert(name.to_string(), Mark::Visiting);
    stack.push(name.to_string());
    for dep in model.referenced_records(rec) {
        visit(model, dep, marks, stack, out)?;
    }
    stack.pop();
    marks.insert(name.to_string(), Mark::Done);
    out.push(name.to_string());
    Ok(())
}

fn kind_size(kind: &FieldKind, records: &BTreeMap<&str, u32>) -> Option<u32> {
    match kind {
        FieldKind::Primitive { ty } => Some(ty.width()),
        FieldKind::FixedString { max_len } => max_len.checked_add(1),
        FieldKind::FixedArray { element, count } => kind_size(element, records)?.checked_mul(*count),
        FieldKind::Record { name } => records.get(name.as_str()).copied(),
    }
}

fn flatten(
    model: &TypeModel,
    fields: &[crate::model::Field],
    prefix: &[&str],
    sizes: &BTreeMap<&str, u32>,
    offset: &mut u32,
    out: &mut Vec<LeafField>,
) -> Result<(), LayoutError> {
    for f in fields {
        let mut path: Vec<&str> = prefix.to_vec();
        path.push(f.name.as_str());

        if let FieldKind::Record { name } = &f.kind {
            let rec = record(model, name)?;
            flatten(model, &rec.fields, &path, sizes, offset, out)?;
            continue;
        }

        let size = kind_size(&f.kind, sizes).ok_or_else(|| LayoutError::TooLarge {
            name: model.type_name.clone(),
        })?;
        out.push(LeafField {
            path: path.join("."),
            flag_name: path.join(FLAG_SEPARATOR),
            offset: *offset,
            size,
            kind: f.kind.clone(),
        });
        *offset += size;
    }
    Ok(())
}

fn fingerprint(type_name: &str, size: u32, leaves: &[LeafField]) -> String {
    let mut canon = format!("{type_name}:{size}\n");
    for l in leaves {
        let kind = serde_json::to_string(&l.kind).unwrap_or_default();
        canon.push_str(&format!("{}:{}:{}:{}\n", l.path, l.offset, l.size, kind));
    }
    let hex = crate::util::sha256_hex(canon.as_bytes());
    hex[..16].to_string()
}
