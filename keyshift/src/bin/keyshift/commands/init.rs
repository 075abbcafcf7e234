use anyhow::{Context, Result};
use clap::Args;

use crate::context::{CONFIG_DIR, CONFIG_FILE, KeyshiftConfig};
use crate::examples::ExampleGroup;
use crate::output::OutputManager;

pub const EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Initialize",
    commands: &[
        "keyshift init                        # Write .keyshift/config.toml with defaults",
        "keyshift init --namespace Staging    # Use a different key namespace",
        "keyshift init --force                # Overwrite an existing config",
    ],
}];

#[derive(Args)]
pub struct InitArgs {
    /// Key namespace prefix (e.g. Hybrasyl)
    #[arg(long)]
    namespace: Option<String>,

    /// Overwrite an existing config file
    #[arg(long)]
    force: bool,
}

pub async fn handle_init(args: InitArgs, output: &OutputManager) -> Result<()> {
    let root = std::env::current_dir().context("Failed to get current directory")?;
    let config_dir = root.join(CONFIG_DIR);
    let config_path = config_dir.join(CONFIG_FILE);

    output.heading("Initialize keyshift");

    if config_path.exists() && !args.force {
        output.warning(&format!("{} already exists", config_path.display()));
        output.info("Use --force to overwrite it.");
        return Ok(());
    }

    let mut config = KeyshiftConfig::default();
    if let Some(namespace) = args.namespace {
        config.keyshift.namespace = namespace;
    }

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create {}", config_dir.display()))?;
    let content = toml::to_string_pretty(&config).context("Failed to serialize config")?;
    std::fs::write(&config_path, content)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    output.success(&format!("Created {}", config_path.display()));
    output.bullet(&format!("Namespace: {}", config.keyshift.namespace));
    output.bullet(&format!("Redis: {}", config.redis.url));

    output.info("Next steps:");
    output.bullet("Export REDIS_URL or edit [redis] url");
    output.bullet("Run 'keyshift migrate status' to inspect the ledger");
    Ok(())
}
