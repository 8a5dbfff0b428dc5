//! Glimpse CLI - image captioning from the command line or over HTTP.
//!
//! Glimpse loads a trained encoder/decoder pair and turns photographs into
//! short English captions.
//!
//! # Usage
//!
//! ```bash
//! # Serve POST /predict on the configured host and port
//! glimpse serve
//!
//! # Caption local files
//! glimpse caption beach.jpg dog.png --format json
//!
//! # Build a vocabulary from a caption corpus
//! glimpse vocab build captions.txt --output vocab.json
//!
//! # Verify the installed artifacts
//! glimpse models check
//! ```

use clap::{Parser, Subcommand};

mod cli;
mod logging;
mod server;

/// Glimpse - image captioning with a CNN encoder and LSTM decoder.
#[derive(Parser, Debug)]
#[command(name = "glimpse")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP captioning service
    Serve(cli::serve::ServeArgs),

    /// Caption image files
    Caption(cli::caption::CaptionArgs),

    /// Build and inspect vocabularies
    Vocab(cli::vocab::VocabArgs),

    /// Inspect model artifacts
    Models(cli::models::ModelsArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so config warnings go through eprintln.
    let config = match glimpse_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `glimpse config path`."
            );
            glimpse_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Glimpse v{}", glimpse_core::VERSION);

    match cli.command {
        Commands::Serve(args) => cli::serve::execute(args, config).await,
        Commands::Caption(args) => cli::caption::execute(args, config).await,
        Commands::Vocab(args) => cli::vocab::execute(args).await,
        Commands::Models(args) => cli::models::execute(args, config).await,
        Commands::Config(args) => cli::config::execute(args).await,
    }
}
