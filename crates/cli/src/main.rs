mod app;
mod cli;

use std::io::{IsTerminal, Write};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::error;

use playwatch_core::config::{load_dotenv, Config};

use crate::app::build_analyst;
use crate::cli::CliArgs;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli::DEFAULT_LOG_FILTER)),
        )
        .with_target(false)
        .init();

    load_dotenv();
    let args = CliArgs::parse();

    let mut config = match &args.profile {
        Some(profile) => Config::for_profile(profile),
        None => Config::from_env(),
    }
    .context("failed to load configuration")?;
    args.apply_overrides(&mut config);
    config.log_summary();

    let mut analyst = build_analyst(&config)?;

    // Scripted: every question in order, first hard failure ends the run.
    if !args.questions.is_empty() {
        for question in &args.questions {
            println!("> {question}");
            let answer = analyst
                .query_agent(question)
                .await
                .with_context(|| format!("failed to answer '{question}'"))?;
            println!("{answer}\n");
        }
        return Ok(());
    }

    // Interactive: one question per line until EOF.
    let interactive = std::io::stdin().is_terminal();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if interactive {
            print!("> ");
            std::io::stdout().flush()?;
        }
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        match analyst.query_agent(question).await {
            Ok(answer) => println!("{answer}\n"),
            Err(e) => {
                error!(error = %e, "question failed");
                eprintln!("error: {e}\n");
            }
        }
    }

    Ok(())
}
