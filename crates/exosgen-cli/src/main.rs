use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use exosgen_core::generate::{self, BatchEntry};
use exosgen_core::{GenerateError, GeneratorConfig, Target};
use serde::Serialize;

mod logging;

use logging::{LogFormat, LogLevel};

const MANIFEST_SCHEMA: &str = "exosgen.manifest@0.1.0";

#[derive(Parser, Debug)]
#[command(name = "exosgen")]
#[command(
    about = "Generates mirrored datamodel channels from IEC 61131-3 type declarations.",
    long_about = None
)]
struct Cli {
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Warn)]
    log_level: LogLevel,
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Default)]
struct ConfigArgs {
    /// Generator config JSON; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, value_enum)]
    target: Option<Target>,
    /// Characters of the type name kept in the library name.
    #[arg(long)]
    library_name_len: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate the component tree <out>/<Type> for one type.
    Generate {
        /// IEC 61131-3 type declaration file.
        #[arg(long)]
        typ: PathBuf,
        #[arg(long = "type")]
        type_name: String,
        #[arg(long)]
        out: PathBuf,
        /// If set, fail if output differs; do not write.
        #[arg(long, default_value_t = false)]
        check: bool,
        /// Also write <Type>.layout.json.
        #[arg(long, default_value_t = false)]
        layout_json: bool,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Print the resolved field layout of a type as JSON.
    Layout {
        #[arg(long)]
        typ: PathBuf,
        #[arg(long = "type")]
        type_name: String,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Generate every entry of a manifest.
    Batch {
        #[arg(long)]
        manifest: PathBuf,
        /// If set, fail if any output differs; do not write.
        #[arg(long, default_value_t = false)]
        check: bool,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Check that type names map to distinct library names.
    CheckNames {
        #[arg(required = true)]
        names: Vec<String>,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Print the diagnostics catalog as markdown.
    Diagnostics,
}

fn main() -> ExitCode {
    match try_main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.chain().find_map(|e| e.downcast_ref::<GenerateError>()) {
                Some(gen_err) => {
                    let mut diag = gen_err.to_diagnostic();
                    diag.message = format!("{err:#}");
                    eprintln!("{diag}");
                }
                None => eprintln!("error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_level, cli.log_format);

    match cli.command {
        Command::Generate {
            typ,
            type_name,
            out,
            check,
            layout_json,
            config,
        } => {
            let mut cfg = load_config(&config)?;
            cfg.emit_layout_json |= layout_json;
            run_generate(&typ, &type_name, &out, check, &cfg)
        }
        Command::Layout {
            typ,
            type_name,
            config,
        } => run_layout(&typ, &type_name, &load_config(&config)?),
        Command::Batch {
            manifest,
            check,
            config,
        } => run_batch(&manifest, check, &load_config(&config)?),
        Command::CheckNames { names, config } => run_check_names(&names, &load_config(&config)?),
        Command::Diagnostics => {
            print!("{}", exosgen_core::diagnostics::render_diagnostics_md());
            Ok(())
        }
    }
}

fn load_config(args: &ConfigArgs) -> Result<GeneratorConfig> {
    let mut cfg = match &args.config {
        Some(path) => GeneratorConfig::load(path).map_err(GenerateError::from)?,
        None => GeneratorConfig::default(),
    };
    if let Some(target) = args.target {
        cfg.target = target;
    }
    if let Some(len) = args.library_name_len {
        cfg.library_name_len = Some(len);
    }
    cfg.validate().map_err(GenerateError::from)?;
    Ok(cfg)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_generate(typ: &Path, type_name: &str, out: &Path, check: bool, cfg: &GeneratorConfig) -> Result<()> {
    let generation = generate::generate_file(typ, type_name, cfg)
        .with_context(|| format!("generate {type_name} from {}", typ.display()))?;
    if check {
        generate::check_generation(out, &generation)?;
    } else {
        generate::write_generation(out, &generation)?;
    }
    print_json(&generation.report())
}

fn run_layout(typ: &Path, type_name: &str, cfg: &GeneratorConfig) -> Result<()> {
    let model = exosgen_core::typ::parse_file(typ, type_name, &cfg.parse_options())
        .with_context(|| format!("parse {}", typ.display()))?;
    let layout = exosgen_core::layout::resolve(&model).map_err(GenerateError::from)?;
    print_json(&layout)
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    schema_version: String,
    entries: Vec<ManifestEntry>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestEntry {
    source: String,
    #[serde(rename = "type")]
    type_name: String,
    out_root: String,
}

fn run_batch(manifest_path: &Path, check: bool, cfg: &GeneratorConfig) -> Result<()> {
    let bytes = std::fs::read(manifest_path)
        .with_context(|| format!("read manifest: {}", manifest_path.display()))?;
    let m: Manifest = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse manifest JSON: {}", manifest_path.display()))?;
    if m.schema_version.trim() != MANIFEST_SCHEMA {
        anyhow::bail!(
            "manifest schema_version mismatch: expected {MANIFEST_SCHEMA} got {:?}",
            m.schema_version
        );
    }

    // Relative paths are relative to the manifest.
    let base = manifest_path.parent().unwrap_or(Path::new("."));
    let entries: Vec<BatchEntry> = m
        .entries
        .iter()
        .map(|e| BatchEntry {
            source: base.join(&e.source),
            type_name: e.type_name.clone(),
            out_root: base.join(&e.out_root),
        })
        .collect();

    if check {
        let plan = generate::plan_batch(&entries, cfg)?;
        for (idx, (e, g)) in entries.iter().zip(&plan).enumerate() {
            generate::check_generation(&e.out_root, g)
                .with_context(|| format!("manifest entry[{idx}] {}", e.type_name))?;
        }
        let reports: Vec<_> = plan.iter().map(|g| g.report()).collect();
        return print_json(&reports);
    }

    let written = generate::generate_batch(&entries, cfg)?;
    let paths: Vec<String> = written.iter().map(|p| p.display().to_string()).collect();
    print_json(&paths)
}

#[derive(Debug, Serialize)]
struct NameReport {
    budget: usize,
    names: Vec<NameEntry>,
}

#[derive(Debug, Serialize)]
struct NameEntry {
    type_name: String,
    library_name: String,
}

fn run_check_names(names: &[String], cfg: &GeneratorConfig) -> Result<()> {
    let budget = cfg.naming_budget();
    exosgen_core::naming::check_conflicts(names, budget).map_err(GenerateError::from)?;
    print_json(&NameReport {
        budget: budget.library_name_len,
        names: names
            .iter()
            .map(|n| NameEntry {
                type_name: n.clone(),
                library_name: exosgen_core::naming::library_name(n, budget),
            })
            .collect(),
    })
}
