//! Runbook CLI - manage workflows and execute classifier decisions

use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use clap::builder::TypedValueParser;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use runbook::resolver::{parse_selector, selector_for};
use runbook::{
    status_message, Engine, FileBlobStore, FixSuggestion, RunbookConfig, RunbookError, Workflow,
};

#[derive(Parser)]
#[command(name = "runbook")]
#[command(about = "Run local workflow scripts selected by an LLM classifier")]
#[command(version)]
struct Cli {
    /// Directory holding workflows.json (overrides config)
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    /// Shell used to run workflow scripts (overrides config)
    #[arg(long, global = true)]
    shell: Option<PathBuf>,

    /// Verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List workflows in selector order
    List {
        /// Print the stored JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show one workflow (by id or selector, e.g. w2)
    Show { workflow: String },

    /// Add a workflow at the end of the list
    Add {
        #[arg(short, long)]
        name: String,
        #[arg(short, long, default_value = "")]
        prompt: String,
        /// Expected output schema shown to the classifier
        #[arg(long, default_value = "")]
        schema: String,
        /// Script to run (may be set later)
        #[arg(long, default_value = "", value_parser = clap::builder::OsStringValueParser::new().map(PathBuf::from))]
        script: PathBuf,
    },

    /// Update fields of a workflow (by id or selector)
    Update {
        workflow: String,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        prompt: Option<String>,
        #[arg(long)]
        schema: Option<String>,
        #[arg(long)]
        script: Option<PathBuf>,
    },

    /// Remove a workflow (by id or selector)
    Remove { workflow: String },

    /// Print the catalog to give the classifier
    Catalog,

    /// Execute a classifier decision
    Execute {
        /// Decision JSON (reads --file or stdin when omitted)
        decision: Option<String>,

        /// Read the decision from a file
        #[arg(short, long, conflicts_with = "decision")]
        file: Option<PathBuf>,

        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Print the invocation's events as JSON on stderr
        #[arg(long)]
        events: bool,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file location
    Path,
}

#[tokio::main]
async fn main() {
    // Load .env file (ignore if not present)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Logs go to stderr; stdout is reserved for script output
    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let RunbookError::ExecutionFailed { stderr, .. } = &e {
            if !stderr.trim().is_empty() {
                eprintln!("{}", stderr.trim_end().dimmed());
            }
        }
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), RunbookError> {
    let mut config = RunbookConfig::load()?;
    if let Some(dir) = cli.store_dir {
        config.store_dir = dir;
    }
    if let Some(shell) = cli.shell {
        config.shell = shell;
    }

    let open = || Engine::from_config(&config);

    match cli.command {
        Commands::List { json } => list(&open()?, json),
        Commands::Show { workflow } => {
            let engine = open()?;
            let wf = lookup(&engine, &workflow)?;
            print_workflow(&engine, &wf);
            Ok(())
        }
        Commands::Add {
            name,
            prompt,
            schema,
            script,
        } => {
            let mut engine = open()?;
            let id = engine.add_workflow(Workflow::new(name, prompt, schema, script))?;
            let selector = selector_for(engine.store().len() - 1);
            println!("{} Added workflow {} ({})", "✓".green(), selector.cyan(), id);
            Ok(())
        }
        Commands::Update {
            workflow,
            name,
            prompt,
            schema,
            script,
        } => {
            let mut engine = open()?;
            let mut wf = lookup(&engine, &workflow)?;
            if let Some(name) = name {
                wf.name = name;
            }
            if let Some(prompt) = prompt {
                wf.prompt = prompt;
            }
            if let Some(schema) = schema {
                wf.output_schema = schema;
            }
            if let Some(script) = script {
                wf.script_path = script;
            }
            engine.update_workflow(wf.clone())?;
            println!("{} Updated workflow '{}'", "✓".green(), wf.name);
            Ok(())
        }
        Commands::Remove { workflow } => {
            let mut engine = open()?;
            let wf = lookup(&engine, &workflow)?;
            engine.delete_workflow(wf.id)?;
            println!("{} Removed workflow '{}'", "✓".green(), wf.name);
            Ok(())
        }
        Commands::Catalog => {
            println!("{}", open()?.catalog().to_json_pretty());
            Ok(())
        }
        Commands::Execute {
            decision,
            file,
            timeout,
            events,
        } => execute(&mut open()?, decision, file, timeout, events).await,
        Commands::Config { action } => show_config(&action, &config),
    }
}

/// Find a workflow by UUID or by `w<N>` selector
fn lookup(engine: &Engine<FileBlobStore>, key: &str) -> Result<Workflow, RunbookError> {
    if let Ok(id) = Uuid::parse_str(key) {
        return engine
            .workflow(id)
            .ok_or_else(|| RunbookError::WorkflowNotFound { id: key.to_string() });
    }
    let index = parse_selector(key)?;
    engine
        .store()
        .as_slice()
        .get(index)
        .cloned()
        .ok_or_else(|| RunbookError::IndexOutOfRange {
            selector: key.to_string(),
            index,
            len: engine.store().len(),
        })
}

fn list(engine: &Engine<FileBlobStore>, json: bool) -> Result<(), RunbookError> {
    let workflows = engine.workflows();
    if json {
        println!("{}", serde_json::to_string_pretty(&workflows)?);
        return Ok(());
    }
    if workflows.is_empty() {
        println!("No workflows. Add one with `runbook add --name <name>`.");
        return Ok(());
    }
    for (i, wf) in workflows.iter().enumerate() {
        let script = match wf.script() {
            Some(path) => path.display().to_string(),
            None => "(no script)".dimmed().to_string(),
        };
        println!(
            "{:<5} {:<24} {}  {}",
            selector_for(i).cyan(),
            wf.name.bold(),
            script,
            wf.id.to_string().dimmed()
        );
    }
    Ok(())
}

fn print_workflow(engine: &Engine<FileBlobStore>, wf: &Workflow) {
    let position = engine
        .store()
        .as_slice()
        .iter()
        .position(|w| w.id == wf.id);
    println!("{} {}", "Workflow:".cyan().bold(), wf.name.bold());
    if let Some(i) = position {
        println!("  Selector: {}", selector_for(i));
    }
    println!("  Id:       {}", wf.id);
    match wf.script() {
        Some(path) => {
            let ready = if engine.launcher().preflight(wf).is_ok() {
                "ready".green()
            } else {
                "not launchable".red()
            };
            println!("  Script:   {} ({})", path.display(), ready);
        }
        None => println!("  Script:   (not configured)"),
    }
    println!("  Prompt:   {}", wf.prompt);
    println!("  Schema:   {}", wf.output_schema);
}

async fn execute(
    engine: &mut Engine<FileBlobStore>,
    decision: Option<String>,
    file: Option<PathBuf>,
    timeout: Option<u64>,
    show_events: bool,
) -> Result<(), RunbookError> {
    let raw = match (decision, file) {
        (Some(text), _) => text.into_bytes(),
        (None, Some(path)) => tokio::fs::read(&path).await?,
        (None, None) => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            buf
        }
    };

    let result = match timeout {
        Some(seconds) => {
            let outcome =
                tokio::time::timeout(Duration::from_secs(seconds), engine.execute(&raw)).await;
            match outcome {
                Ok(result) => result,
                Err(_) => {
                    let err = RunbookError::Timeout { seconds };
                    engine.record_failure(&err);
                    Err(err)
                }
            }
        }
        None => engine.execute(&raw).await,
    };

    if show_events {
        let events = engine.events().latest();
        eprintln!("{}", serde_json::to_string_pretty(&events)?);
    }

    let message = status_message(&result);
    let report = result?;
    print!("{}", report.stdout);
    if let Some(message) = message {
        eprintln!("{} {}", "Warning:".yellow().bold(), message);
    }
    Ok(())
}

fn show_config(action: &ConfigAction, config: &RunbookConfig) -> Result<(), RunbookError> {
    match action {
        ConfigAction::Path => println!("{}", RunbookConfig::config_path().display()),
        ConfigAction::Show => {
            let text = toml::to_string_pretty(config).map_err(|e| RunbookError::Config {
                reason: e.to_string(),
            })?;
            print!("{}", text);
        }
    }
    Ok(())
}
