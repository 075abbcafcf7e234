mod commands;
mod context;
mod examples;
mod help;
mod output;
mod theme;
mod utils;

use anyhow::Result;
use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};

use commands::{
    control::{ControlCommands, handle_control_commands},
    init::{InitArgs, handle_init},
    migrate::{MigrateCommands, handle_migrate_commands},
};
use output::{GlobalOptions, OutputFormat, OutputManager};

#[derive(Parser)]
#[command(name = "keyshift")]
#[command(version)]
#[command(
    about = "Versioned data migrations and host control for Hybrasyl key-value stores",
    long_about = r#"Migration runner and remote control for a Hybrasyl Redis store:

• One-shot, ordered migrations recorded in a ledger
• Dry runs that report every write without issuing it
• Manual resolution when a ledger update failed
• Shutdown and status requests to a running host

Commands:
  init      Write a default .keyshift/config.toml
  migrate   Deploy, inspect and resolve migrations
  control   Talk to a running host
"#
)]
#[command(subcommand_required = true, arg_required_else_help = true)]
struct Cli {
    /// Output format
    #[arg(long, value_enum, default_value = "table", global = true)]
    output: OutputFormat,

    /// Suppress output (only errors will be shown)
    #[arg(short = 'q', long, global = true)]
    quiet: bool,

    /// Enable verbose output
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config in the current directory
    Init(InitArgs),

    /// Deploy, inspect and resolve migrations
    #[command(subcommand)]
    Migrate(MigrateCommands),

    /// Send control requests to a running host
    #[command(subcommand)]
    Control(ControlCommands),
}

impl Cli {
    /// Parse with styled help. Help, version and usage errors exit here.
    fn parse_styled() -> Self {
        let matches = help::decorate(Cli::command()).get_matches();
        Cli::from_arg_matches(&matches).unwrap_or_else(|err| err.exit())
    }

    fn options(&self) -> GlobalOptions {
        GlobalOptions {
            output_format: self.output.clone(),
            quiet: self.quiet,
            verbose: self.verbose,
            no_color: self.no_color,
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let cli = Cli::parse_styled();
    if cli.no_color {
        colored::control::set_override(false);
    }

    if let Err(err) = execute(cli).await {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

async fn execute(cli: Cli) -> Result<()> {
    let output = OutputManager::new(cli.options());

    match cli.command {
        Commands::Init(args) => handle_init(args, &output).await,
        Commands::Migrate(command) => handle_migrate_commands(command, &output).await,
        Commands::Control(command) => handle_control_commands(command, &output).await,
    }
}
