#[macro_use]
extern crate rocket;

mod build;
mod commands;
mod config;
mod error;
mod logging;
mod metrics;
mod models;
mod notify;
mod rest;
mod scheduling;
mod wpt;

use crate::config::Config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::exit;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler loop and the web front end
    Run,
    /// Create the database tables
    InitDb,
    /// Submit the job described by a JSON file
    Submit { job: PathBuf },
}

#[rocket::main]
async fn main() {
    let cli = Cli::parse();

    let rocket = rocket::build();
    let config: Config = match rocket.figment().extract() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to read config: {}", e);
            exit(2);
        }
    };
    let guard = match logging::init_logging(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to set up logging: {}", e);
            exit(2);
        }
    };

    let result = match cli.command {
        // scheduler and front end, until one of them fails
        Commands::Run => commands::run_server(rocket, &config).await,
        Commands::InitDb => commands::init_database(&config).await,
        Commands::Submit { job } => commands::submit_job(&job, &config)
            .await
            .map(|id| println!("submitted job {}", id)),
    };
    if let Err(e) = result {
        tracing::error!("{}", e);
        drop(guard);
        exit(2);
    }
}
