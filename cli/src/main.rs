//! Graphask CLI — ask a Neo4j graph questions in natural language
//!
//! Configuration comes from `--config <file.yaml>` and/or the environment
//! (`NEO4J_URI`, `NEO4J_USER`, `NEO4J_PASSWORD`, `LLM_PROVIDER`, ...).

use anyhow::Context;
use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table};
use graphask::nlq::VERBOSE_TARGET;
use graphask::{AppConfig, NLQPipeline, QueryResult};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "graphask", version, about = "Ask a Neo4j graph questions in natural language")]
struct Cli {
    /// YAML config file; environment variables override its values
    #[arg(long, global = true, env = "GRAPHASK_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, clap::ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask one question
    Ask {
        question: String,

        /// Log the raw completion and the generated Cypher
        #[arg(long, short)]
        verbose: bool,
    },
    /// Ask questions interactively
    Shell {
        #[arg(long, short)]
        verbose: bool,
    },
    /// Regenerate the cached schema from the store
    Schema {
        /// Print the rendered schema after writing it
        #[arg(long)]
        print: bool,
    },
    /// Run a Cypher query through the read-only gate
    Cypher { query: String },
}

const DEFAULT_LOG_FILTER: &str = "warn,graphask=info";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let verbose = matches!(
        cli.command,
        Commands::Ask { verbose: true, .. } | Commands::Shell { verbose: true }
    );
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(with_verbose(filter, verbose))
        .with_target(false)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Enable the verbose target on top of whatever `RUST_LOG` selected
fn with_verbose(filter: EnvFilter, verbose: bool) -> EnvFilter {
    if !verbose {
        return filter;
    }
    match format!("{}=info", VERBOSE_TARGET).parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let pipeline = NLQPipeline::from_config(&config).context("failed to set up pipeline")?;

    match cli.command {
        Commands::Ask { question, verbose } => {
            let result = pipeline.ask_graph(&question, verbose).await?;
            print_result(&result, &cli.format)?;
        }
        Commands::Shell { verbose } => run_shell(&pipeline, verbose, &cli.format).await?,
        Commands::Schema { print } => {
            let snapshot = pipeline.schema_cache().regenerate(pipeline.graph()).await?;
            if print {
                println!("{}", snapshot.render());
            }
        }
        Commands::Cypher { query } => {
            let result = pipeline.run_read_only(&query).await?;
            print_result(&result, &cli.format)?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => {
            let mut config = AppConfig::from_yaml_file(path)?;
            config.apply_env_overrides(|k| std::env::var(k).ok())?;
            config
        }
        None => AppConfig::from_env()?,
    };
    Ok(config)
}

async fn run_shell(pipeline: &NLQPipeline, verbose: bool, format: &OutputFormat) -> anyhow::Result<()> {
    println!("Ask questions about the graph. Type 'exit' or 'quit' to stop.\n");

    let stdin = std::io::stdin();
    let mut line = String::new();

    loop {
        eprint!("You: ");

        line.clear();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }

        let question = line.trim();
        if question.is_empty() || question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }

        match pipeline.ask_graph(question, verbose).await {
            Ok(result) => print_result(&result, format)?,
            Err(e) => {
                eprintln!("Error: {}", e);
                if !e.is_retryable_by_user() {
                    eprintln!("(not a problem with the question; check the schema cache, LLM and store)");
                }
                eprintln!();
            }
        }
    }

    Ok(())
}

fn print_result(result: &QueryResult, format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?);
        }
        OutputFormat::Table => {
            println!("Query: {}\n", result.query);

            let Some(first) = result.results.first() else {
                println!("(no results)\n");
                return Ok(());
            };

            let columns: Vec<&String> = first.keys().collect();
            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(&columns);

            for row in &result.results {
                let cells: Vec<String> = columns
                    .iter()
                    .map(|c| row.get(*c).map(format_table_value).unwrap_or_default())
                    .collect();
                table.add_row(cells);
            }

            println!("{}", table);
            println!("{} row(s)\n", result.results.len());
        }
    }

    Ok(())
}

fn format_table_value(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
            serde_json::to_string(v).unwrap_or_default()
        }
    }
}
