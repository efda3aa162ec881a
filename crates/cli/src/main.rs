//! notegraph CLI: the main entry point.
//!
//! Commands:
//! - `init`      - Write the default config
//! - `serve`     - Start the HTTP gateway
//! - `chat`      - Send one message and stream the reply
//! - `workflow`  - Run a workflow definition from a JSON file
//! - `status`    - Show configuration status

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "notegraph",
    about = "notegraph: AI knowledge assistant with streaming chat and workflows",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration file
    Init,

    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Send a message to the agent and stream the reply
    Chat {
        /// The message to send
        #[arg(short, long)]
        message: String,

        /// Do not offer tools to the model
        #[arg(long)]
        no_tools: bool,

        /// Print the raw NDJSON event stream
        #[arg(long)]
        raw: bool,

        /// Provider to use instead of the configured default
        #[arg(long)]
        provider: Option<String>,

        /// Model to use instead of the provider default
        #[arg(long)]
        model: Option<String>,
    },

    /// Workflow commands
    Workflow {
        #[command(subcommand)]
        command: WorkflowCommand,
    },

    /// Show system status
    Status,
}

#[derive(Subcommand)]
enum WorkflowCommand {
    /// Run a workflow definition (JSON) and print progress as it happens
    Run {
        /// Path to the workflow JSON file
        file: PathBuf,

        /// Project scope for steps that write into a project
        #[arg(long)]
        project: Option<String>,

        /// Workspace scope for steps that write into a workspace
        #[arg(long)]
        workspace: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init => commands::init::run().await?,
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Chat {
            message,
            no_tools,
            raw,
            provider,
            model,
        } => {
            let options = commands::chat::ChatOptions {
                tools: !no_tools,
                raw,
                provider,
                model,
            };
            commands::chat::run(message, options).await?
        }
        Commands::Workflow {
            command:
                WorkflowCommand::Run {
                    file,
                    project,
                    workspace,
                },
        } => commands::workflow::run(file, project, workspace).await?,
        Commands::Status => commands::status::run().await?,
    }

    Ok(())
}
