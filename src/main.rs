use sql_analyst::dataset::DatasetSchema;
use sql_analyst::execution_loop::{Orchestrator, TurnInput, TurnOutcome};
use sql_analyst::llm::ChatMessage;
use sql_analyst::security::SqlValidator;
use sql_analyst::{AnalystConfig, PolarsEngine, SqlQuery};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sql-analyst")]
#[command(about = "Answer questions about a CSV dataset with generated, validated SQL")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a single question about a dataset
    Ask {
        /// The question in natural language
        question: String,

        /// CSV file to load
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Interactive conversation over a dataset (keeps query memory between turns)
    Chat {
        /// CSV file to load
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Summarise a dataset and propose starter questions
    Suggest {
        /// CSV file to load
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Check whether a SQL statement passes the read-only policy
    Validate {
        /// SQL text
        sql: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Validate { sql } => {
            let verdict = SqlValidator::validate(&SqlQuery::new(sql)?);
            match verdict.validation_error() {
                None => println!("SAFE"),
                Some(reason) => println!("UNSAFE: {}", reason),
            }
        }
        Commands::Ask { question, file } => {
            let (orchestrator, schema) = load(&file).await?;
            let input = TurnInput::new(vec![ChatMessage::user(question)], schema.context_for_llm());
            let outcome = orchestrator.run_turn(input).await;
            print_outcome(&outcome)?;
        }
        Commands::Chat { file } => {
            let (orchestrator, schema) = load(&file).await?;
            chat(&orchestrator, &schema, BufReader::new(tokio::io::stdin())).await?;
        }
        Commands::Suggest { file } => {
            let (orchestrator, schema) = load(&file).await?;
            let suggestions = orchestrator.suggest(&schema.context_for_llm()).await;
            println!("{}\n", suggestions.summary);
            for (idx, question) in suggestions.questions.iter().enumerate() {
                println!("{}. {}", idx + 1, question);
            }
        }
    }

    Ok(())
}

async fn load(file: &Path) -> Result<(Orchestrator, DatasetSchema)> {
    let config = AnalystConfig::from_env()?;
    let engine = Arc::new(PolarsEngine::new());
    let schema = engine.load_file(file, &config.table_name).await?;
    info!("{}", schema.context_for_llm());

    let orchestrator = Orchestrator::from_config(&config, engine)?;
    Ok((orchestrator, schema))
}

/// Conversation loop over any line source. Returns the last query that ran.
async fn chat<R>(orchestrator: &Orchestrator, schema: &DatasetSchema, input: R) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut messages: Vec<ChatMessage> = Vec::new();
    let mut last_successful_sql: Option<String> = None;
    let mut lines = input.lines();

    println!("{}", schema.context_for_llm());
    println!("Type a question, or 'exit' to quit.");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }

        messages.push(ChatMessage::user(question));
        let input = TurnInput::new(messages.clone(), schema.context_for_llm())
            .with_last_successful_sql(last_successful_sql.clone());
        let outcome = orchestrator.run_turn(input).await;
        print_outcome(&outcome)?;

        messages = outcome.context.messages.clone();
        if let Some(sql) = outcome.last_successful_sql() {
            last_successful_sql = Some(sql.to_string());
        }
    }

    Ok(last_successful_sql)
}

fn print_outcome(outcome: &TurnOutcome) -> Result<()> {
    if outcome.is_aborted() {
        println!("\n{}", outcome.final_message().unwrap_or_default());
        return Ok(());
    }

    let ctx = &outcome.context;
    println!("\n=== SQL ===\n{}", ctx.sql_query);
    println!("\n=== Rows ({}) ===", ctx.execution_result.len());
    for row in ctx.execution_result.iter().take(20) {
        println!("{}", serde_json::to_string(row)?);
    }
    println!("\n=== Answer ===\n{}", outcome.final_message().unwrap_or_default());
    if !ctx.viz_config.is_none() {
        println!("\n=== Chart ===\n{}", serde_json::to_string_pretty(&ctx.viz_config)?);
    }
    Ok(())
}
