//! sandbox-client: sends one command to a sandbox server and prints the reply.
//!
//! ```text
//! sandbox-client check_local_file --filepath notes.txt --signature ipsum
//! sandbox-client quarantine_local_file --filepath notes.txt
//! ```

use clap::{Parser, Subcommand};
use sandbox_server::config::DEFAULT_BUFFER_SIZE;
use sandbox_server::Client;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the sandbox client
#[derive(Parser, Debug)]
#[command(name = "sandbox-client")]
#[command(version)]
#[command(about = "Simple sandbox client", long_about = None)]
struct Cli {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:15000")]
    server: String,

    /// Size of the single response read
    #[arg(long, default_value_t = DEFAULT_BUFFER_SIZE)]
    buffer_size: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check local file on the server for a signature
    #[command(name = "check_local_file")]
    CheckLocalFile {
        /// Full or relative path to the file, as seen by the server
        #[arg(short, long)]
        filepath: String,
        /// Signature (string) to find in the file
        #[arg(short, long)]
        signature: String,
    },
    /// Move a file on the server to its quarantine directory
    #[command(name = "quarantine_local_file")]
    QuarantineLocalFile {
        /// Full or relative path to the file, as seen by the server
        #[arg(short, long)]
        filepath: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let client = Client::new(cli.server).with_buffer_size(cli.buffer_size);

    let response = match cli.command {
        Command::CheckLocalFile {
            filepath,
            signature,
        } => client.check_local_file(&filepath, &signature).await?,
        Command::QuarantineLocalFile { filepath } => {
            client.quarantine_local_file(&filepath).await?
        }
    };

    println!("{response}");
    Ok(())
}
