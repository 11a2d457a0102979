//! Cellbook CLI
//!
//! Usage:
//!   cellbook compile cell.tsx          Print the compiled JavaScript
//!   cellbook run cell.jsx --mount      Run a cell and print its console and HTML
//!   cellbook notebook notes.json       Run every cell of a notebook document
//!
//! A path of `-` reads the source from stdin.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use cellbook::notebook::{Notebook, Session};
use cellbook::{
    CompilationRequest, Engine, ExecutionResult, HtmlRenderer, Language, Settings, SettingsStore,
};

/// Cellbook - compile and run notebook cells in a sandbox
#[derive(Parser, Debug)]
#[command(name = "cellbook")]
#[command(about = "Compile and run notebook cells in a sandboxed JavaScript realm")]
struct Args {
    /// Settings file; defaults are used when it is absent
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a cell and print the resulting JavaScript
    Compile {
        /// Source file, or `-` for stdin
        file: PathBuf,
        /// Source language; inferred from the extension when omitted
        #[arg(short, long)]
        language: Option<Language>,
    },
    /// Compile and run a cell
    Run {
        /// Source file, or `-` for stdin
        file: PathBuf,
        /// Source language; inferred from the extension when omitted
        #[arg(short, long)]
        language: Option<Language>,
        /// Mount the produced element and print its HTML
        #[arg(long)]
        mount: bool,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run every cell of a notebook document and print the outputs as JSON
    Notebook {
        /// Notebook JSON file
        file: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .init();

    let args = Args::parse();
    let settings = match &args.settings {
        Some(path) => SettingsStore::new(path).load(),
        None => Settings::default(),
    };

    let renderer = Arc::new(HtmlRenderer::auto_create());
    let engine = Engine::builder()
        .renderer(renderer.clone())
        .mirror_console(settings.mirror_console)
        .build();

    let ok = match args.command {
        Command::Compile { file, language } => {
            let language = resolve_language(&file, language, &settings);
            let compiled = engine
                .compile(&CompilationRequest::new(read_source(&file)?, language))
                .await;
            match compiled.error_message() {
                None => {
                    println!("{}", compiled.compiled_code());
                    true
                }
                Some(message) => {
                    eprintln!("cellbook: {message}");
                    false
                }
            }
        }
        Command::Run {
            file,
            language,
            mount,
            json,
        } => {
            let language = resolve_language(&file, language, &settings);
            let output = engine
                .run(&CompilationRequest::new(read_source(&file)?, language))
                .await;
            let mounted = output
                .execution
                .as_ref()
                .filter(|e| mount || (settings.auto_mount && e.produced_element.is_some()))
                .map(|e| engine.mount(e, "root"));

            if json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                if let Some(execution) = &output.execution {
                    print_console(execution);
                }
                let html = mounted
                    .as_ref()
                    .filter(|m| m.success)
                    .and_then(|_| renderer.html("root"));
                if let Some(html) = html {
                    println!("{html}");
                }
            }
            if let Some(message) = output.error_message() {
                eprintln!("cellbook: {message}");
            }
            if let Some(message) = mounted.as_ref().and_then(|m| m.error_message.as_deref()) {
                eprintln!("cellbook: {message}");
            }
            output.success() && mounted.is_none_or(|m| m.success)
        }
        Command::Notebook { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let notebook: Notebook = serde_json::from_str(&text)
                .with_context(|| format!("invalid notebook document {}", file.display()))?;

            let session = Session::new(Arc::new(engine)).auto_mount(settings.auto_mount);
            let outputs = session.run_all(&notebook).await;
            println!("{}", serde_json::to_string_pretty(&outputs)?);
            outputs.iter().all(|o| o.success())
        }
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn resolve_language(file: &Path, explicit: Option<Language>, settings: &Settings) -> Language {
    explicit
        .or_else(|| {
            file.extension()
                .and_then(|ext| ext.to_str())
                .and_then(Language::from_extension)
        })
        .unwrap_or(settings.default_language)
}

fn read_source(file: &Path) -> anyhow::Result<String> {
    if file.as_os_str() == "-" {
        let mut source = String::new();
        io::stdin()
            .read_to_string(&mut source)
            .context("failed to read stdin")?;
        return Ok(source);
    }
    if !file.is_file() {
        bail!("{}: no such file", file.display());
    }
    std::fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))
}

fn print_console(execution: &ExecutionResult) {
    for entry in &execution.console_entries {
        println!("[{}] {}", entry.level, entry.message());
    }
    if execution.truncated {
        println!("[warn] console output truncated");
    }
    if let Some(value) = execution.return_value.as_ref().filter(|v| !v.is_null()) {
        println!("=> {value}");
    }
}
