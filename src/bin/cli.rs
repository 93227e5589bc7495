//! Operator CLI.
//!
//! Talks to a running pipeline server over its HTTP control surface and
//! prints the JSON responses.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(
    name = "occupancy-pipeline",
    version,
    about = "Operate the pipeline that moves occupancy data from Sensource into PostgreSQL"
)]
struct Cli {
    /// Base URL of the running pipeline server.
    #[arg(long, default_value = "http://localhost:3000")]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Arm the cron task for moving occupancy data
    Start,
    /// Disarm the cron task
    Stop,
    /// Show the current task status
    Status,
    /// Run the task immediately
    Run {
        /// Wait for the task to complete before reporting
        #[arg(short, long)]
        wait: bool,
        /// Custom start date (RFC 3339 or YYYY-MM-DD); defaults to the last update in the store
        #[arg(short, long)]
        start: Option<String>,
        /// Custom end date; defaults to the current time
        #[arg(short, long)]
        end: Option<String>,
        /// Timeout in milliseconds; defaults to the server's configured timeout
        #[arg(short, long)]
        timeout: Option<u64>,
    },
    /// Execute a SQL file from the server's SQL directory
    ExecuteSqlFile {
        /// File name inside the SQL directory
        file: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let request = match &cli.command {
        Command::Start => client.post(format!("{}/start", cli.server)),
        Command::Stop => client.post(format!("{}/stop", cli.server)),
        Command::Status => client.get(format!("{}/status", cli.server)),
        Command::Run {
            wait,
            start,
            end,
            timeout,
        } => {
            let mut query: Vec<(&str, String)> = Vec::new();
            if *wait {
                query.push(("wait", "true".to_string()));
            }
            if let Some(start) = start {
                query.push(("startDate", start.clone()));
            }
            if let Some(end) = end {
                query.push(("endDate", end.clone()));
            }
            if let Some(timeout) = timeout {
                query.push(("timeout", timeout.to_string()));
            }
            client.post(format!("{}/run", cli.server)).query(&query)
        }
        Command::ExecuteSqlFile { file } => client
            .post(format!("{}/execute-sql-file", cli.server))
            .query(&[("file", file)]),
    };

    let response = request
        .send()
        .await
        .context("request failed; is the server running?")?;
    let status = response.status();
    let body: Value = response.json().await.context("decoding response")?;
    if !status.is_success() {
        anyhow::bail!("server returned {status}: {body}");
    }
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
