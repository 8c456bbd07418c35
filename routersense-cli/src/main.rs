use clap::{Parser, Subcommand};
use reqwest::Client;
use std::error::Error;
use std::path::PathBuf;

mod doctor;
mod sql;
mod status;

#[derive(clap::Parser, Debug)]
#[command(version, about = "Talk to a running routersensed agent")]
struct Args {
    /// Base URL of the routersensed agent
    #[clap(long, default_value = "http://127.0.0.1:58745")]
    url: String,

    /// Disable colorized output
    #[clap(long)]
    no_color: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the current health snapshot
    Status {
        /// Print the raw JSON response
        #[clap(long)]
        json: bool,
    },
    /// Run one SQL statement against the agent's database
    Query {
        sql: String,
        /// Positional parameter as a JSON literal (repeatable)
        #[clap(long = "param")]
        params: Vec<String>,
    },
    /// Run a SQL file as a single script
    Script { file: PathBuf },
    /// Check agent connectivity and device health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    if args.no_color {
        colored::control::set_override(false);
    }
    let client = Client::new();

    match args.command {
        Command::Status { json } => status::run_status(&client, &args.url, json).await,
        Command::Query { sql, params } => sql::run_query(&client, &args.url, &sql, &params).await,
        Command::Script { file } => sql::run_script(&client, &args.url, &file).await,
        Command::Doctor => doctor::run_doctor(&client, &args.url).await,
    }
}
