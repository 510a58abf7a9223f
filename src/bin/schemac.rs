//! schemac - compile an SDL schema and optionally validate instance data
//! against it, printing diagnostics to stderr and an exit code callers can
//! script against.
//!
//! # Usage
//!
//! ```bash
//! # Compile a schema and report diagnostics
//! schemac compile schema.sdl
//!
//! # Compile a schema, then validate instance data and build the graph
//! schemac validate schema.sdl instances.json
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use schemac::cancel::CancellationToken;
use schemac::graph::{Graph, GraphOptions};
use schemac::schema::{FsResolver, Loader, LoaderOptions};
use schemac::source::SourceId;
use schemac::validator::{Validator, ValidatorOptions};

/// Compile SDL schemas and validate instance data against them.
#[derive(Parser, Debug)]
#[command(name = "schemac")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a schema file and report diagnostics.
    Compile {
        /// Path to the SDL schema file.
        schema: PathBuf,
    },
    /// Compile a schema, validate JSON instance data against it, and
    /// report the resulting graph's duplicates and unresolved edges.
    Validate {
        /// Path to the SDL schema file.
        schema: PathBuf,
        /// Path to a JSON file shaped `{type-name: [object, ...]}`.
        instances: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber_init();
    let args = Args::parse();
    match args.command {
        Command::Compile { schema } => run_compile(&schema),
        Command::Validate { schema, instances } => run_validate(&schema, &instances),
    }
}

fn tracing_subscriber_init() {
    // The CLI is the only place in this workspace that installs a `tracing`
    // subscriber; library code only ever emits events.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_schema(path: &Path) -> Option<schemac::schema::Schema> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("error: failed to read `{}`: {e}", path.display());
            return None;
        }
    };
    let root = path.parent().unwrap_or_else(|| Path::new("."));
    let loader = Loader::new(FsResolver::new(root), LoaderOptions::default());
    let entry = SourceId::new(path.display().to_string());
    let (schema, result) = loader.compile(entry, &text, &CancellationToken::never());
    if !result.issues.is_empty() {
        eprintln!("{result}");
    }
    schema
}

fn run_compile(schema_path: &Path) -> ExitCode {
    match load_schema(schema_path) {
        Some(_) => ExitCode::SUCCESS,
        None => ExitCode::FAILURE,
    }
}

fn run_validate(schema_path: &Path, instances_path: &Path) -> ExitCode {
    let Some(schema) = load_schema(schema_path) else {
        return ExitCode::FAILURE;
    };
    let schema = std::sync::Arc::new(schema);

    let bytes = match std::fs::read(instances_path) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("error: failed to read `{}`: {e}", instances_path.display());
            return ExitCode::FAILURE;
        }
    };

    let source = SourceId::new(instances_path.display().to_string());
    let (grouped, parse_result) = schemac::json::parse_object(source, &bytes);
    if !parse_result.issues.is_empty() {
        eprintln!("{parse_result}");
    }

    let validator = Validator::new(schema.clone(), ValidatorOptions::default());
    let graph = Graph::new(schema, GraphOptions::default());
    let mut had_errors = !parse_result.ok();

    for (type_name, raws) in grouped {
        for raw in raws {
            let (valid, failure, _) = validator.validate_one(&type_name, raw, &CancellationToken::never());
            if let Some(failure) = failure {
                had_errors = true;
                for issue in &failure.issues {
                    eprintln!("{issue}");
                }
                continue;
            }
            if let Some(valid) = valid {
                let (add_result, _) = graph.add(valid, &CancellationToken::never());
                if !add_result.ok() {
                    had_errors = true;
                }
                eprintln!("{add_result}");
            }
        }
    }

    let (check_result, _) = graph.check(&CancellationToken::never());
    if !check_result.ok() {
        had_errors = true;
    }
    eprintln!("{check_result}");

    let snapshot = graph.snapshot();
    println!("{}", schemac::json::serialize_snapshot(&snapshot));

    if had_errors {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
