use anyhow::Result;
use clap::{Parser, Subcommand};
use flowcabal::cli::{self, OutputMode, create_handler};
use flowcabal::config::FlowConfig;
use flowcabal::logging::init_logging;
use flowcabal::signals::{CancellationToken, setup_signal_handlers};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "flowcabal")]
#[command(about = "Run graphs of LLM calls in dependency order")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project directory for .flowcabal/config.toml (defaults to current)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Suppress normal output
    #[arg(long, global = true)]
    quiet: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow document
    Run {
        /// Workflow JSON file
        file: PathBuf,

        /// Save each node's output to <DIR>/<node>.txt
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Emit events as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Validate a workflow without running
    Validate {
        /// Workflow JSON file
        file: PathBuf,
    },

    /// Print the execution order
    Order {
        /// Workflow JSON file
        file: PathBuf,
    },

    /// Store a workflow document in the database
    Import {
        /// Workflow JSON file
        file: PathBuf,
    },

    /// List stored workflows
    Workflows,

    /// Read or write stored settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print a setting as JSON
    Get { key: String },

    /// Store a JSON value
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_guard = init_logging(cli.debug, cli.quiet, cli.log_file.as_deref())?;

    let config = FlowConfig::load(cli.dir.as_deref())?;
    let json = matches!(cli.command, Commands::Run { json: true, .. });
    let handler = create_handler(OutputMode::from_flags(json, cli.quiet), cli.debug);

    let code = match cli.command {
        Commands::Run {
            file, output_dir, ..
        } => {
            let cancel = CancellationToken::new();
            tokio::spawn(setup_signal_handlers(cancel.clone()));

            cli::run_workflow(&file, output_dir.as_deref(), &config, &cancel, handler).await?
        }

        Commands::Validate { file } => cli::validate_workflow(&file, &*handler),

        Commands::Order { file } => cli::print_order(&file, &*handler),

        Commands::Import { file } => {
            let store = cli::open_store(&config)?;
            cli::import_workflow(&file, &store, &*handler)?
        }

        Commands::Workflows => {
            let store = cli::open_store(&config)?;
            cli::list_workflows(&store, &*handler)?
        }

        Commands::Settings { action } => {
            let store = cli::open_store(&config)?;
            match action {
                SettingsAction::Get { key } => cli::get_setting(&store, &key, &*handler)?,
                SettingsAction::Set { key, value } => {
                    cli::set_setting(&store, &key, &value, &*handler)?
                }
            }
        }
    };

    if code != 0 {
        drop(log_guard);
        std::process::exit(code);
    }
    Ok(())
}
