//! restwalk CLI
//!
//! Command-line interface for checking resource-definition documents,
//! printing flattened definitions and fetching resources.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use restwalk::{lint, load_document, FileStatus, MemoryLoader, SchemaStore, Severity};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "restwalk")]
#[command(about = "Check and navigate schema-described REST services")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check documents for errors (syntax, broken refs, unusable links and relations)
    Check {
        /// Document files or directories, checked as one set
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Output format: text (default) or json
        #[arg(long, default_value = "text")]
        format: String,

        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,
    },

    /// Print the flattened definition behind a reference
    Resolve {
        /// Document files to load
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Reference to flatten, e.g. shop#/resources/item
        #[arg(long = "ref")]
        reference: String,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Fetch one resource and print its data
    #[cfg(feature = "remote")]
    Get {
        /// Document files to load
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Identifier of the document that defines the resource
        #[arg(long)]
        doc: String,

        /// Host serving the document
        #[arg(long)]
        host: String,

        /// Resource name
        #[arg(long)]
        resource: String,

        /// Path variable or parameter, as name=value (repeatable)
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, Value)>,

        /// Service instance on the host
        #[arg(long)]
        instance: Option<String>,

        /// Bearer token sent with every request
        #[arg(long)]
        bearer: Option<String>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check {
            paths,
            format,
            strict,
        } => run_check(&paths, &format, strict),

        Commands::Resolve {
            files,
            reference,
            pretty,
            output,
        } => run_resolve(&files, &reference, pretty, output),

        #[cfg(feature = "remote")]
        Commands::Get {
            files,
            doc,
            host,
            resource,
            vars,
            instance,
            bearer,
            pretty,
        } => {
            run_get(GetArgs {
                files,
                doc,
                host,
                resource,
                vars,
                instance,
                bearer,
                pretty,
            })
            .await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

/// `name=value`; the value is read as JSON when it parses, else as a string.
fn parse_var(raw: &str) -> Result<(String, Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", raw))?;
    if name.is_empty() {
        return Err(format!("empty name in '{}'", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((name.to_string(), value))
}

/// Load every file into a fresh store, dependencies first.
///
/// Returns the store and the identifier of the first document.
fn load_set(files: &[PathBuf]) -> Result<(SchemaStore, String), u8> {
    let mut loader = MemoryLoader::new();
    let mut ids = Vec::new();
    let mut origins: HashMap<String, &PathBuf> = HashMap::new();
    for file in files {
        let raw = load_document(file).map_err(|e| {
            eprintln!("Error: {}: {}", file.display(), e);
            e.exit_code() as u8
        })?;
        let Some(id) = raw.get("id").and_then(Value::as_str).map(String::from) else {
            eprintln!("Error: {}: missing document id", file.display());
            return Err(2);
        };
        if let Some(earlier) = origins.insert(id.clone(), file) {
            eprintln!(
                "Error: {}: document '{}' is defined more than once (also in {})",
                file.display(),
                id,
                earlier.display()
            );
            return Err(2);
        }
        loader.insert(id.clone(), raw);
        ids.push(id);
    }

    let store = SchemaStore::new();
    for id in &ids {
        if store.contains(id) {
            continue;
        }
        store.load_from(&loader, id).map_err(|e| {
            eprintln!("Error: {}", e);
            e.exit_code() as u8
        })?;
    }
    let first = ids.into_iter().next().unwrap_or_default();
    Ok((store, first))
}

fn to_json(value: &impl serde::Serialize, pretty: bool) -> Result<String, u8> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })
}

fn run_resolve(files: &[PathBuf], reference: &str, pretty: bool, output: Option<PathBuf>) -> Result<(), u8> {
    let (store, current) = load_set(files)?;
    let def = store.resolve_str(reference, &current).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let json_output = to_json(&*def, pretty)?;
    match output {
        Some(path) => {
            std::fs::write(&path, &json_output).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            })?;
        }
        None => {
            println!("{}", json_output);
        }
    }

    Ok(())
}

#[cfg(feature = "remote")]
struct GetArgs {
    files: Vec<PathBuf>,
    doc: String,
    host: String,
    resource: String,
    vars: Vec<(String, Value)>,
    instance: Option<String>,
    bearer: Option<String>,
    pretty: bool,
}

#[cfg(feature = "remote")]
async fn run_get(args: GetArgs) -> Result<(), u8> {
    use restwalk::{ConnectionManager, Credentials, ReqwestConnector, Runtime, RuntimeConfig};

    let fail = |e: &dyn std::fmt::Display, code: i32| {
        eprintln!("Error: {}", e);
        code as u8
    };

    let config = RuntimeConfig::from_env().map_err(|e| fail(&e, 2))?;
    let (store, _) = load_set(&args.files)?;

    let manager = ConnectionManager::new(ReqwestConnector::new(&config));
    if let Some(token) = args.bearer {
        manager
            .set_credentials(&args.host, Credentials::Bearer(token))
            .map_err(|e| fail(&e, 2))?;
    }

    let runtime = Runtime::new(Arc::new(store), Arc::new(manager), config);
    let service = runtime
        .service(&args.doc, &args.host, args.instance.as_deref())
        .map_err(|e| fail(&e, e.exit_code()))?;
    let rep = service
        .bind(&args.resource, args.vars.into_iter().collect())
        .map_err(|e| fail(&e, 2))?;

    let data = rep.get().await.map_err(|e| fail(&e, e.exit_code()))?;
    println!("{}", to_json(&data, args.pretty)?);
    Ok(())
}

fn run_check(paths: &[PathBuf], format: &str, strict: bool) -> Result<(), u8> {
    let result = lint(paths, strict);

    if format == "json" {
        println!("{}", to_json(&result, true)?);
    } else {
        for file_result in &result.results {
            let status_icon = match file_result.status {
                FileStatus::Ok => "\x1b[32m✓\x1b[0m",
                FileStatus::Warning => "\x1b[33m⚠\x1b[0m",
                FileStatus::Error => "\x1b[31m✗\x1b[0m",
            };
            match &file_result.document {
                Some(id) => println!("  {} {} ({})", status_icon, file_result.file.display(), id),
                None => println!("  {} {}", status_icon, file_result.file.display()),
            }

            for diag in &file_result.diagnostics {
                let (color, label) = match diag.severity {
                    Severity::Error => ("\x1b[31m", "error"),
                    Severity::Warning => ("\x1b[33m", "warning"),
                };
                println!(
                    "    {}{}[{}]\x1b[0m: {} - {}",
                    color, label, diag.code, diag.path, diag.message
                );
            }
        }

        println!();
        if result.is_ok() && (!strict || result.warnings == 0) {
            println!(
                "\x1b[32m✓ {} files checked, all passed\x1b[0m",
                result.files_checked
            );
        } else {
            println!(
                "\x1b[31m✗ {} files checked: {} passed, {} failed ({} errors, {} warnings)\x1b[0m",
                result.files_checked, result.passed, result.failed, result.errors, result.warnings
            );
        }
    }

    if result.is_ok() && (!strict || result.warnings == 0) {
        Ok(())
    } else {
        Err(1)
    }
}
