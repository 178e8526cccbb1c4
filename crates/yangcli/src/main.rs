//! yangcli
//!
//! Schema-driven command shell:
//! - loads `*.yang` documents from a schema directory into a command model
//! - dispatches `show <field>` and model-declared commands to registered handlers
//! - offers context-sensitive tab completion derived from the same model

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use yangcli_dsl::{load_schema_dir, LoadedSchema};

mod builtins;
mod completion;
mod interpreter;
mod registry;
mod repl;
mod session;

use completion::CompletionEngine;
use interpreter::{Interpreter, InterpreterConfig};
use registry::HandlerRegistry;
use session::{Session, SessionState};

const BANNER: &str = "Example YANG CLI. Type 'help' or '?' for help.";

#[derive(Parser)]
#[command(name = "yangcli")]
#[command(author, version, about = "Schema-driven command shell")]
struct Cli {
    /// Directory holding the `*.yang` schema documents.
    #[arg(long, env = "YANGCLI_SCHEMA_DIR", default_value = "schema")]
    schema_dir: PathBuf,

    #[arg(long, default_value = "ex> ")]
    prompt: String,

    /// Program started by the `bash` passthrough command.
    #[arg(long, default_value = "/usr/bin/bash")]
    shell: PathBuf,

    /// Disable the `bash` passthrough command.
    #[arg(long)]
    no_shell: bool,

    /// Print the loaded command model as JSON and exit.
    #[arg(long)]
    dump_model: bool,

    /// Run commands from a file (`-` for stdin) instead of interactively.
    #[arg(long)]
    script: Option<PathBuf>,

    /// Run a single command line (repeatable); implies script mode.
    #[arg(long = "command", short = 'c')]
    commands: Vec<String>,

    /// Do not echo script lines.
    #[arg(long, short = 'q')]
    quiet: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let loaded = match load_schema_dir(&cli.schema_dir) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("{} failed to load schema: {e}", "error:".red().bold());
            return ExitCode::FAILURE;
        }
    };

    match run(cli, loaded) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, loaded: LoadedSchema) -> Result<()> {
    if cli.dump_model {
        println!("{}", serde_json::to_string_pretty(&loaded)?);
        return Ok(());
    }

    let model = Arc::new(loaded.model);
    let interrupt = Arc::new(AtomicBool::new(false));
    let session = Session::new(SessionState::for_model(&model), Box::new(io::stdout()))
        .with_interrupt_flag(Arc::clone(&interrupt));
    let config = InterpreterConfig {
        shell: (!cli.no_shell).then(|| cli.shell.clone()),
    };
    let mut interp = Interpreter::new(
        Arc::clone(&model),
        HandlerRegistry::with_builtins(),
        session,
        config,
    );

    // Ctrl-C raises the flag instead of killing the process; long-running
    // builtins poll it.
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&interrupt))?;

    if cli.script.is_some() || !cli.commands.is_empty() {
        let lines = repl::collect_script_lines(cli.script.as_deref(), &cli.commands)?;
        return repl::run_script(&mut interp, &lines, &cli.prompt, cli.quiet);
    }

    let engine = CompletionEngine::new(Arc::clone(&model), interp.builtin_names());
    let mut editor = repl::default_editor(engine, Arc::clone(&interrupt))?;
    println!("{}", BANNER.green().bold());
    repl::run_session(&mut interp, editor.as_mut(), &cli.prompt)
}
