use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use comfy_table::{Cell, Table};
use keyshift::admin::{
    AdminError, AdminService, BooleanReply, ControlChannelClient, CredentialSet, ShutdownDelay, connect_tls,
    control_url,
};
use serde::Serialize;

use crate::context::ProjectContext;
use crate::examples::ExampleGroup;
use crate::output::{OutputManager, TableDisplay};
use crate::theme::ICONS;

pub const EXAMPLES: &[ExampleGroup] = &[
    ExampleGroup {
        title: "Shutdown",
        commands: &[
            "keyshift control shutdown 5                         # Shut down in 5 minutes",
            "keyshift control shutdown 0 --wait                  # Shut down now and wait",
            "keyshift control shutdown 10 --host game.example:2613",
        ],
    },
    ExampleGroup {
        title: "Query",
        commands: &[
            "keyshift control users                              # Active user count",
            "keyshift control status                             # Shutdown progress",
        ],
    },
];

#[derive(Args)]
pub struct HostArgs {
    /// Control channel address (host:port or rediss:// URL)
    #[arg(long, env = "KEYSHIFT_CONTROL_HOST")]
    host: Option<String>,
}

#[derive(Subcommand)]
pub enum ControlCommands {
    /// Ask the host to shut down after a delay
    #[command(name = "shutdown")]
    Shutdown {
        /// Delay in minutes
        #[arg(allow_negative_numbers = true)]
        minutes: i64,

        /// Poll until the host reports the shutdown complete
        #[arg(long)]
        wait: bool,

        /// Seconds between polls with --wait
        #[arg(long, default_value_t = 5)]
        poll_secs: u64,

        #[command(flatten)]
        host: HostArgs,
    },

    /// Show the number of active users
    #[command(name = "users")]
    Users {
        #[command(flatten)]
        host: HostArgs,
    },

    /// Show shutdown progress
    #[command(name = "status")]
    Status {
        #[command(flatten)]
        host: HostArgs,
    },
}

pub async fn handle_control_commands(command: ControlCommands, output: &OutputManager) -> Result<()> {
    let ctx = ProjectContext::find()?;

    match command {
        ControlCommands::Shutdown {
            minutes,
            wait,
            poll_secs,
            host,
        } => {
            // Validate before touching credentials or the network
            let delay = ShutdownDelay::from_minutes(minutes)?;
            let (client, host) = connect(&ctx, host, output).await?;
            handle_shutdown(&client, &host, delay, wait.then(|| Duration::from_secs(poll_secs.max(1))), output).await
        }
        ControlCommands::Users { host } => {
            let (client, host) = connect(&ctx, host, output).await?;
            let number = client.total_user_count().await?;
            output.display(&UserCountView { host, number })
        }
        ControlCommands::Status { host } => {
            let (client, host) = connect(&ctx, host, output).await?;
            let reply = client.is_shutdown_complete().await?;
            output.display(&ReplyView {
                host,
                operation: "IsShutdownComplete",
                reply,
            })
        }
    }
}

async fn connect(ctx: &ProjectContext, host: HostArgs, output: &OutputManager) -> Result<(ControlChannelClient, String)> {
    let host = match host.host {
        Some(host) => host,
        None => ctx.control_host()?,
    };

    let paths = ctx.credential_paths()?;
    let credentials = match CredentialSet::load(&paths) {
        Ok(credentials) => credentials,
        Err(AdminError::MissingCredentials { paths }) => {
            for path in &paths {
                output.error(&format!("Credential file not found: {}", path.display()));
            }
            anyhow::bail!("{} credential file(s) missing", paths.len());
        }
        Err(err) => return Err(err.into()),
    };

    output.progress(&format!("Connecting to {host}"));
    let conn = connect_tls(&control_url(&host), credentials)
        .await
        .with_context(|| format!("Failed to connect to control channel at {host}"))?;
    output.clear_line();
    output.verbose(&format!("Connected to {host}"));

    let peer = std::env::var("USER").map_or_else(|_| "keyshift".to_string(), |user| format!("keyshift:{user}"));
    let client = ControlChannelClient::new(conn, ctx.control_queue()?)
        .with_peer(peer)
        .with_timeout(ctx.control_timeout());
    Ok((client, host))
}

async fn handle_shutdown<A>(
    client: &A,
    host: &str,
    delay: ShutdownDelay,
    poll: Option<Duration>,
    output: &OutputManager,
) -> Result<()>
where
    A: AdminService + ?Sized,
{
    output.heading(&format!("Shutdown: {host}"));
    output.bullet(&format!("Delay: {} minute(s)", delay.minutes()));

    let reply = client.begin_shutdown(delay).await?;
    output.reply(&reply);
    if !reply.success {
        anyhow::bail!("Host refused the shutdown request");
    }

    let Some(interval) = poll else {
        return Ok(());
    };

    loop {
        tokio::time::sleep(interval).await;
        match client.is_shutdown_complete().await {
            Ok(reply) if reply.success => {
                output.reply(&reply);
                return Ok(());
            }
            Ok(reply) => output.info(&format!("{} {}", ICONS.clock, reply.message)),
            Err(AdminError::Timeout { .. }) => {
                output.warning("Host stopped answering before it reported the shutdown complete");
                anyhow::bail!("Shutdown of {host} could not be confirmed");
            }
            Err(err) => return Err(err.into()),
        }
    }
}

#[derive(Serialize)]
struct UserCountView {
    host: String,
    number: i64,
}

impl TableDisplay for UserCountView {
    fn to_table(&self, output: &OutputManager) -> Table {
        let mut table = output.create_table();
        output.add_table_header(&mut table, &["Host", "Active Users"]);
        table.add_row(vec![Cell::new(&self.host), Cell::new(self.number)]);
        table
    }

    fn to_compact(&self) -> String {
        format!("host={} users={}", self.host, self.number)
    }
}

#[derive(Serialize)]
struct ReplyView {
    host: String,
    operation: &'static str,
    #[serde(flatten)]
    reply: BooleanReply,
}

impl TableDisplay for ReplyView {
    fn to_table(&self, output: &OutputManager) -> Table {
        let mut table = output.create_table();
        output.add_table_header(&mut table, &["Host", "Operation", "Success", "Message"]);
        table.add_row(vec![
            Cell::new(&self.host),
            Cell::new(self.operation),
            Cell::new(if self.reply.success { ICONS.success } else { ICONS.error }),
            Cell::new(&self.reply.message),
        ]);
        table
    }

    fn to_compact(&self) -> String {
        format!("{} success={} {}", self.operation, self.reply.success, self.reply.message)
    }
}
