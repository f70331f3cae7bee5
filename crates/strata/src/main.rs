mod commands;
mod project;
mod render;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "strata")]
#[command(version, about = "Declarative infrastructure, reconciled.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the changes needed to reach the configuration
    Plan {
        /// Exit with 2 when the plan has changes
        #[arg(long)]
        detailed_exitcode: bool,
        /// Plan the removal of every recorded resource
        #[arg(long)]
        destroy: bool,
        /// Skip reading recorded resources back from the provider
        #[arg(long)]
        no_refresh: bool,
    },
    /// Plan and apply changes
    Apply {
        /// Apply without asking for confirmation
        #[arg(short, long)]
        yes: bool,
        /// Maximum concurrent provider operations
        #[arg(short, long)]
        parallelism: Option<usize>,
        /// Skip reading recorded resources back from the provider
        #[arg(long)]
        no_refresh: bool,
    },
    /// Destroy every recorded resource
    Destroy {
        /// Destroy without asking for confirmation
        #[arg(short, long)]
        yes: bool,
        /// Maximum concurrent provider operations
        #[arg(short, long)]
        parallelism: Option<usize>,
    },
    /// Check the configuration against resource schemas
    Validate,
    /// Inspect recorded state
    #[command(subcommand)]
    State(StateCommands),
    /// Remove a state lock left behind by a dead process
    #[command(name = "force-unlock")]
    ForceUnlock {
        /// Lock id, as shown in the lock error
        id: String,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum StateCommands {
    /// List recorded resources
    List,
    /// Show one recorded resource
    Show {
        /// Resource address (type.name)
        address: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("STRATA_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Version => {
            println!("strata {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }
        Commands::State(StateCommands::List) => {
            let root = project::locate_root()?;
            commands::state::list(&root).await
        }
        Commands::State(StateCommands::Show { address }) => {
            let root = project::locate_root()?;
            commands::state::show(&root, &address).await
        }
        Commands::ForceUnlock { id } => {
            let root = project::locate_root()?;
            commands::force_unlock::handle(&root, &id).await
        }
        Commands::Validate => {
            let project = project::Project::load()?;
            commands::validate::handle(&project).await
        }
        Commands::Plan {
            detailed_exitcode,
            destroy,
            no_refresh,
        } => {
            let project = project::Project::load()?;
            commands::plan::handle(&project, destroy, !no_refresh, detailed_exitcode).await
        }
        Commands::Apply {
            yes,
            parallelism,
            no_refresh,
        } => {
            let project = project::Project::load()?;
            commands::apply::handle(
                &project,
                commands::apply::ApplyArgs {
                    mode: strata_cloud::PlanMode::Normal,
                    yes,
                    parallelism,
                    refresh: !no_refresh,
                },
            )
            .await
        }
        Commands::Destroy { yes, parallelism } => {
            let project = project::Project::load()?;
            commands::destroy::handle(&project, yes, parallelism).await
        }
    }
}
