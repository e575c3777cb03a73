use agent_monitor::config::{resolve_state_dir, MonitorConfig};
use agent_monitor::signal::WatchMode;
use agent_monitor::{logging, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::Colorize;
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "agent-monitor")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Live monitor for agent sessions", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// State directory (default: ~/.agent-monitor)
    #[arg(long, global = true, env = "AGENT_MONITOR_DIR")]
    state_dir: Option<PathBuf>,

    /// Config file (default: <state-dir>/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the live view on 127.0.0.1
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// How to detect state file changes
        #[arg(long, value_enum)]
        watch: Option<WatchMode>,
    },

    /// Ingest one host notification from stdin (always exits 0)
    Hook,

    /// Show the current session
    Status {
        /// Output in JSON format
        #[arg(short, long)]
        json: bool,
    },

    /// Print the JSON Schema of the state document
    Schema,

    /// Generate shell completions
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "agent-monitor", &mut io::stdout());
        }

        // Never fail the host
        Commands::Hook => {
            logging::init("agent_monitor=warn");
            if let Err(e) = load_config(&cli.state_dir, &cli.config)
                .and_then(|config| agent_monitor::cli::hook::run(&config))
            {
                tracing::warn!(error = %e, "hook failed");
            }
        }

        command => {
            if let Err(e) = run(command, cli.state_dir, cli.config) {
                eprintln!("{}", format!("Error: {:#}", e).red());
                std::process::exit(1);
            }
        }
    }
}

fn load_config(state_dir: &Option<PathBuf>, config: &Option<PathBuf>) -> Result<MonitorConfig> {
    let state_dir = resolve_state_dir(state_dir.clone())?;
    MonitorConfig::load(&state_dir, config.as_deref())
}

fn run(command: Commands, state_dir: Option<PathBuf>, config: Option<PathBuf>) -> Result<()> {
    match command {
        Commands::Serve { port, watch } => {
            logging::init("agent_monitor=info,tower_http=info");
            let mut config = load_config(&state_dir, &config)?;
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(watch) = watch {
                config.watch = watch;
            }

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(agent_monitor::cli::serve::run(config))?;
        }

        Commands::Status { json } => {
            logging::init("agent_monitor=warn");
            let config = load_config(&state_dir, &config)?;
            agent_monitor::cli::status::run(&config, json)?;
        }

        Commands::Schema => {
            agent_monitor::cli::schema::run()?;
        }

        Commands::Hook | Commands::Completions { .. } => {}
    }

    Ok(())
}
