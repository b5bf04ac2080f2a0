//! Generation runs: source text in, a component tree on disk out.
//!
//! Everything up to [`Generation`] is in memory; [`write_generation`] is the
//! only step that touches the output directory and it either produces the
//! whole `<out>/<Type>` tree or nothing.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::GeneratorConfig;
use crate::emit::channel::emit_channel_pair;
use crate::emit::header::{emit_header, HeaderOptions};
use crate::emit::CNames;
use crate::error::{GenerateError, PreconditionError, SchemaError};
use crate::layout::FieldLayout;
use crate::model::TypeModel;
use crate::naming::{check_conflicts, ArtifactNames};
use crate::protocol::ChannelRole;
use crate::target::{ContextSpec, Target};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Relative to the component directory `<out>/<Type>`.
    pub rel_path: PathBuf,
    pub contents: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub type_name: String,
    pub library_name: String,
    pub target: Target,
    pub layout: FieldLayout,
    pub artifacts: Vec<Artifact>,
}

/// Summary printed by the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationReport {
    pub type_name: String,
    pub library_name: String,
    pub target: Target,
    pub size: u32,
    pub fields: usize,
    pub fingerprint: String,
    pub files: Vec<String>,
}

impl Generation {
    pub fn component_dir(&self, out_root: &Path) -> PathBuf {
        out_root.join(&self.type_name)
    }

    pub fn artifact(&self, rel_path: impl AsRef<Path>) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.rel_path == rel_path.as_ref())
    }

    pub fn report(&self) -> GenerationReport {
        GenerationReport {
            type_name: self.type_name.clone(),
            library_name: self.library_name.clone(),
            target: self.target,
            size: self.layout.size,
            fields: self.layout.leaves.len(),
            fingerprint: self.layout.fingerprint.clone(),
            files: self
                .artifacts
                .iter()
                .map(|a| {
                    Path::new(&self.type_name)
                        .join(&a.rel_path)
                        .to_string_lossy()
                        .replace('\\', "/")
                })
                .collect(),
        }
    }
}

pub fn generate(src: &str, type_name: &str, config: &GeneratorConfig) -> Result<Generation, GenerateError> {
    config.validate()?;
    let model = crate::typ::parse(src, type_name, &config.parse_options())?;
    generate_model(&model, config)
}

pub fn generate_file(path: &Path, type_name: &str, config: &GeneratorConfig) -> Result<Generation, GenerateError> {
    let src = std::fs::read_to_string(path)
        .map_err(|err| GenerateError::io(format!("read type source {}", path.display()), err))?;
    generate(&src, type_name, config)
}

/// Resolves, names and emits an already parsed model.
pub fn generate_model(model: &TypeModel, config: &GeneratorConfig) -> Result<Generation, GenerateError> {
    let _span = tracing::info_span!("generate", type_name = %model.type_name).entered();

    let layout = crate::layout::resolve(model)?;
    let budget = config.naming_budget();
    let names = ArtifactNames::new(&model.type_name, budget);
    check_generated_names(model, &names)?;

    let contexts = config.target.contexts(&model.type_name, budget);
    check_context_dirs(model, &contexts)?;
    let header = emit_header(
        model,
        &layout,
        &HeaderOptions {
            names: names.clone(),
            channel: config.channel_options(),
        },
    );
    let pair = emit_channel_pair(model, &layout, &names, &contexts);

    let mut artifacts = Vec::new();
    for ctx in &contexts {
        let dir = PathBuf::from(&ctx.dir);
        let source = match ctx.role {
            ChannelRole::Publisher => &pair.publisher,
            ChannelRole::Subscriber => &pair.subscriber,
        };
        artifacts.push(Artifact {
            rel_path: dir.join(&names.header_file),
            contents: header.clone(),
        });
        artifacts.push(Artifact {
            rel_path: dir.join(&names.source_file),
            contents: source.clone(),
        });
    }
    if config.emit_layout_json {
        let json = serde_json::to_string_pretty(&layout).map_err(|err| {
            GenerateError::io("serialize layout", std::io::Error::other(err))
        })?;
        artifacts.push(Artifact {
            rel_path: PathBuf::from(format!("{}.layout.json", model.type_name)),
            contents: crate::util::ensure_trailing_newline(json),
        });
    }

    tracing::info!(
        library_name = %names.library_name,
        generation_target = %config.target,
        size = layout.size,
        fields = layout.leaves.len(),
        fingerprint = %layout.fingerprint,
        artifacts = artifacts.len(),
        "generated"
    );

    Ok(Generation {
        type_name: model.type_name.clone(),
        library_name: names.library_name,
        target: config.target,
        layout,
        artifacts,
    })
}

fn check_generated_names(model: &TypeModel, names: &ArtifactNames) -> Result<(), SchemaError> {
    let c = CNames::new(names);
    let macros = c.generated_macros();
    let functions = c.generated_functions();
    let clash = |line: u32, name: &str, reason: &str| SchemaError::IllegalIdentifier {
        line,
        name: name.to_string(),
        reason: reason.to_string(),
    };

    for rec in model.records.values() {
        if c.generated_types().contains(&rec.name.as_str()) {
            return Err(clash(rec.line, &rec.name, "collides with a generated C type"));
        }
        if functions.iter().any(|f| *f == rec.name) {
            return Err(clash(rec.line, &rec.name, "collides with a generated C function"));
        }
        if macros.iter().any(|m| *m == rec.name) {
            return Err(clash(rec.line, &rec.name, "collides with a generated C macro"));
        }
        for f in &rec.fields {
            if macros.iter().any(|m| *m == f.name) {
                return Err(clash(f.line, &f.name, "collides with a generated C macro"));
            }
        }
    }
    Ok(())
}

/// Both sides must land in distinct directories, also on case-insensitive
/// filesystems.
fn check_context_dirs(model: &TypeModel, contexts: &[ContextSpec; 2]) -> Result<(), SchemaError> {
    let [publisher, subscriber] = contexts;
    if publisher.dir.eq_ignore_ascii_case(&subscriber.dir) {
        let line = model.record(&model.type_name).map(|r| r.line).unwrap_or(0);
        return Err(SchemaError::IllegalIdentifier {
            line,
            name: model.type_name.clone(),
            reason: format!(
                "library directory {:?} collides with the {} side directory {:?}",
                subscriber.dir,
                publisher.role.as_str(),
                publisher.dir
            ),
        });
    }
    Ok(())
}

/// Writes the component tree `<out_root>/<Type>`.
///
/// Refuses to touch an existing component directory. Files are written to a
/// staging directory first and moved into place with a single rename.
pub fn write_generation(out_root: &Path, generation: &Generation) -> Result<PathBuf, GenerateError> {
    let dest = generation.component_dir(out_root);
    check_destination(out_root, &dest)?;

    std::fs::create_dir_all(out_root)
        .map_err(|err| GenerateError::io(format!("create output root {}", out_root.display()), err))?;

    let staging = out_root.join(format!(".{}.exosgen-staging", generation.type_name));
    if staging.exists() {
        tracing::debug!(path = %staging.display(), "removing stale staging directory");
        std::fs::remove_dir_all(&staging)
            .map_err(|err| GenerateError::io(format!("remove {}", staging.display()), err))?;
    }

    let written = write_artifacts(&staging, &generation.artifacts)
        .and_then(|()| {
            std::fs::rename(&staging, &dest).map_err(|err| {
                GenerateError::io(
                    format!("move {} to {}", staging.display(), dest.display()),
                    err,
                )
            })
        });
    if let Err(err) = written {
        let _ = std::fs::remove_dir_all(&staging);
        return Err(err);
    }

    tracing::info!(
        path = %dest.display(),
        files = generation.artifacts.len(),
        "wrote component"
    );
    Ok(dest)
}

fn check_destination(out_root: &Path, dest: &Path) -> Result<(), PreconditionError> {
    if out_root.exists() && !out_root.is_dir() {
        return Err(PreconditionError::NotADirectory {
            path: out_root.to_path_buf(),
        });
    }
    if dest.exists() {
        return Err(PreconditionError::OutputExists {
            path: dest.to_path_buf(),
        });
    }
    Ok(())
}

fn write_artifacts(root: &Path, artifacts: &[Artifact]) -> Result<(), GenerateError> {
    for a in artifacts {
        let path = root.join(&a.rel_path);
        write_new_file(&path, a.contents.as_bytes())
            .map_err(|err| GenerateError::io(format!("write {}", path.display()), err))?;
        tracing::debug!(path = %path.display(), bytes = a.contents.len(), "staged");
    }
    Ok(())
}

fn write_new_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut f = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    use std::io::Write as _;
    f.write_all(bytes)?;
    Ok(())
}

/// Compares a generation with an existing tree without writing anything.
pub fn check_generation(out_root: &Path, generation: &Generation) -> Result<(), GenerateError> {
    let dir = generation.component_dir(out_root);
    for a in &generation.artifacts {
        let path = dir.join(&a.rel_path);
        let matches = match std::fs::read_to_string(&path) {
            Ok(cur) => cur == a.contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => false,
            Err(err) => {
                return Err(GenerateError::io(format!("read existing output {}", path.display()), err))
            }
        };
        if !matches {
            return Err(GenerateError::CheckMismatch { path });
        }
    }
    tracing::info!(path = %dir.display(), "output up to date");
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub source: PathBuf,
    pub type_name: String,
    pub out_root: PathBuf,
}

/// Generates every entry in memory after checking library names across the
/// whole batch. Nothing is written.
pub fn plan_batch(
    entries: &[BatchEntry],
    config: &GeneratorConfig,
) -> Result<Vec<Generation>, GenerateError> {
    config.validate()?;
    let budget = config.naming_budget();
    let names: Vec<&str> = entries.iter().map(|e| e.type_name.as_str()).collect();
    check_conflicts(&names, budget)?;

    entries
        .iter()
        .map(|e| generate_file(&e.source, &e.type_name, config))
        .collect()
}

/// Plans the batch, verifies that no destination exists, then writes each
/// component. A precondition failure leaves every output root untouched.
pub fn generate_batch(entries: &[BatchEntry], config: &GeneratorConfig) -> Result<Vec<PathBuf>, GenerateError> {
    let plan = plan_batch(entries, config)?;
    let mut dests = std::collections::BTreeSet::new();
    for (e, g) in entries.iter().zip(&plan) {
        let dest = g.component_dir(&e.out_root);
        check_destination(&e.out_root, &dest)?;
        if !dests.insert(dest.clone()) {
            return Err(PreconditionError::OutputExists { path: dest }.into());
        }
    }
    let mut written = Vec::with_capacity(plan.len());
    for (e, g) in entries.iter().zip(&plan) {
        written.push(write_generation(&e.out_root, g)?);
    }
    Ok(written)
}
