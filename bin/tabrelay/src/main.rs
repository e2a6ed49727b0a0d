mod commands;

use clap::{Args, Parser, Subcommand};
use tabrelay_core::{TaskCommand, TaskRequest};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "tabrelay")]
#[command(about = "Relay tasks between HTTP callers and a polling browser executor", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway (long-running daemon)
    Gateway {
        /// Port to listen on (overrides config gateway.port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides config gateway.host)
        #[arg(long)]
        host: Option<String>,
    },

    /// Submit a task to a running gateway and wait for its result
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },

    /// List tracked tabs
    Tabs {
        /// Gateway URL (defaults to the configured host and port)
        #[arg(long)]
        server: Option<String>,

        /// Read the on-disk snapshot instead of asking the gateway
        #[arg(long)]
        offline: bool,
    },

    /// Show configuration, snapshot and gateway status
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Args)]
struct SubmitOpts {
    /// Explicit task id (generated when omitted)
    #[arg(long)]
    task_id: Option<String>,

    /// Gateway URL (defaults to the configured host and port)
    #[arg(long)]
    server: Option<String>,
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Open a new tab
    Open {
        #[arg(long)]
        url: String,
        #[command(flatten)]
        opts: SubmitOpts,
    },
    /// Close a tab
    Close {
        #[arg(long)]
        tab_id: i64,
        #[command(flatten)]
        opts: SubmitOpts,
    },
    /// Focus a tab
    Switch {
        #[arg(long)]
        tab_id: i64,
        #[command(flatten)]
        opts: SubmitOpts,
    },
    /// Run a JavaScript function in a tab
    Exec {
        #[arg(long)]
        tab_id: i64,
        /// Function source, e.g. "() => document.title"
        #[arg(long)]
        script: String,
        #[command(flatten)]
        opts: SubmitOpts,
    },
    /// Find a tab by URL and focus it
    Find {
        #[arg(long)]
        url: String,
        #[command(flatten)]
        opts: SubmitOpts,
    },
}

impl TaskCommands {
    fn into_request(self) -> (TaskRequest, Option<String>) {
        let (mut request, opts) = match self {
            TaskCommands::Open { url, opts } => {
                let mut r = TaskRequest::new(TaskCommand::OpenTab);
                r.url = Some(url);
                (r, opts)
            }
            TaskCommands::Close { tab_id, opts } => {
                let mut r = TaskRequest::new(TaskCommand::CloseTab);
                r.tab_id = Some(tab_id);
                (r, opts)
            }
            TaskCommands::Switch { tab_id, opts } => {
                let mut r = TaskRequest::new(TaskCommand::SwitchTab);
                r.tab_id = Some(tab_id);
                (r, opts)
            }
            TaskCommands::Exec { tab_id, script, opts } => {
                let mut r = TaskRequest::new(TaskCommand::ExecuteJs);
                r.tab_id = Some(tab_id);
                r.js_function = Some(script);
                (r, opts)
            }
            TaskCommands::Find { url, opts } => {
                let mut r = TaskRequest::new(TaskCommand::FindTab);
                r.url = Some(url);
                (r, opts)
            }
        };
        request.task_id = opts.task_id;
        (request, opts.server)
    }
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Write a default config file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing; RUST_LOG wins over --verbose
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Gateway { port, host } => {
            commands::gateway::run(host, port).await?;
        }
        Commands::Task { command } => {
            let (request, server) = command.into_request();
            commands::task_cmd::submit(request, server).await?;
        }
        Commands::Tabs { server, offline } => {
            commands::tabs_cmd::run(server, offline).await?;
        }
        Commands::Status => {
            commands::status::run().await?;
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                commands::config_cmd::show().await?;
            }
            ConfigCommands::Init { force } => {
                commands::config_cmd::init(force).await?;
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_args_build_request() {
        let cli = Cli::parse_from([
            "tabrelay", "task", "exec", "--tab-id", "4", "--script", "() => 1", "--task-id", "t9",
        ]);
        let Commands::Task { command } = cli.command else {
            panic!("expected task subcommand");
        };
        let (request, server) = command.into_request();
        assert!(server.is_none());
        let task = request.into_task().unwrap();
        assert_eq!(task.task_id, "t9");
        assert_eq!(task.command, TaskCommand::ExecuteJs);
        assert_eq!(task.tab_id, Some(4));
        assert_eq!(task.js_function.as_deref(), Some("() => 1"));
    }

    #[test]
    fn test_find_uses_url() {
        let cli = Cli::parse_from(["tabrelay", "task", "find", "--url", "https://a.example", "--server", "http://h:1"]);
        let Commands::Task { command } = cli.command else {
            panic!("expected task subcommand");
        };
        let (request, server) = command.into_request();
        assert_eq!(server.as_deref(), Some("http://h:1"));
        assert_eq!(request.command, Some(TaskCommand::FindTab));
        assert_eq!(request.url.as_deref(), Some("https://a.example"));
    }
}
