use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Context as _;
use clap::{CommandFactory, Parser, Subcommand};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

use genoflow_agent::AnalysisAgent;
use genoflow_core::config::AppConfig;
use genoflow_core::types::JsonMap;
use genoflow_tools::{FormatRegistry, KnowledgeRouter, ToolRegistry};

#[derive(Parser)]
#[command(
    name = "genoflow",
    version,
    about = "Plan and run genomic analysis workflows from natural-language queries"
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "genoflow.toml")]
    config: PathBuf,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan and run a single query, then print the report
    Analyze {
        /// The analysis request
        #[arg(trailing_var_arg = true, required = true)]
        query: Vec<String>,
        /// Context entry as key=value (value parsed as JSON when possible)
        #[arg(long = "context", value_parser = parse_context_entry)]
        context: Vec<(String, Value)>,
    },
    /// Start an interactive session
    Repl,
    /// List registered tools, file formats and knowledge sources
    Tools,
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn parse_context_entry(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty context key in '{}'", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "genoflow=debug,info"
    } else {
        "genoflow=info,warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    // Handle completions before config loading
    if let Some(Commands::Completions { shell }) = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "genoflow", &mut io::stdout());
        return Ok(());
    }

    let config = AppConfig::load_or_env(Some(cli.config.as_path()))
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Some(Commands::Config) => {
            println!("{}", toml::to_string_pretty(&config.redacted())?);
        }
        Some(Commands::Tools) => print_tools(&config)?,
        Some(Commands::Analyze { query, context }) => {
            let mut agent = build_agent(&config)?;
            let context: JsonMap = context.into_iter().collect();
            let context = (!context.is_empty()).then_some(context);
            let report = agent.execute(&query.join(" "), context).await;
            println!("{}", report);
        }
        Some(Commands::Repl) | None => {
            let mut agent = build_agent(&config)?;
            run_repl(&mut agent, &config).await?;
        }
        Some(Commands::Completions { .. }) => unreachable!("handled before config load"),
    }

    Ok(())
}

fn build_agent(config: &AppConfig) -> anyhow::Result<AnalysisAgent> {
    config.validate()?;
    let oracle = genoflow_llm::create_oracle(config)?;
    info!(
        provider = %config.model.provider,
        model = %config.model.model_id,
        "Agent ready"
    );
    Ok(AnalysisAgent::from_config(config, oracle)?)
}

fn print_tools(config: &AppConfig) -> anyhow::Result<()> {
    println!("Tools:");
    for (name, description) in ToolRegistry::with_builtins(&config.tools).descriptions() {
        println!("  {:<16} {}", name, description);
    }
    println!("\nFile formats: {}", FormatRegistry::with_builtins(&config.tools).extensions().join(", "));
    println!(
        "Knowledge sources: {}",
        KnowledgeRouter::with_builtins(&config.knowledge)?.databases().join(", ")
    );
    Ok(())
}

async fn run_repl(agent: &mut AnalysisAgent, config: &AppConfig) -> anyhow::Result<()> {
    println!("Genoflow v{}", env!("CARGO_PKG_VERSION"));
    println!("Session: {}", agent.state().session_id());
    println!(
        "Model: {} ({}), genome build {}",
        config.model.model_id, config.model.provider, config.verification.genome_build
    );
    println!("Type 'history', 'reset', or 'exit' to quit.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break; // EOF
        }

        match input.trim() {
            "" => continue,
            "exit" | "quit" => {
                println!("Goodbye!");
                break;
            }
            "reset" => {
                agent.reset();
                println!("Conversation reset.");
            }
            "history" => {
                let history = agent.conversation_history();
                if history.is_empty() {
                    println!("(no messages yet)");
                }
                for entry in history {
                    println!(
                        "[{}] {}: {}",
                        entry.timestamp.format("%H:%M:%S"),
                        entry.role,
                        truncate(&entry.content, 120)
                    );
                }
            }
            query => {
                let report = agent.execute(query, None).await;
                println!("\n{}\n", report);
            }
        }
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
