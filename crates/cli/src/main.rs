use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "line-echo")]
#[command(about = "LINE echo responder", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config file.
    Init {
        /// Config file path (default: LINE_ECHO_CONFIG_PATH or ~/.line-echo/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the webhook gateway. Channel credentials come from CHANNEL_TOKEN / CHANNEL_SECRET or the config file.
    Gateway {
        /// Config file path (default: LINE_ECHO_CONFIG_PATH or ~/.line-echo/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP port (default from config or 15151)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Print the x-line-signature value for a request body, using the configured channel secret.
    Sign {
        /// File holding the exact request body bytes
        #[arg(value_name = "BODY_FILE")]
        body: PathBuf,

        /// Config file path (default: LINE_ECHO_CONFIG_PATH or ~/.line-echo/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("line-echo {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Gateway { config, port }) => {
            if let Err(e) = run_gateway(config, port).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Sign { body, config }) => {
            if let Err(e) = run_sign(body, config) {
                log::error!("sign failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let dir = lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_gateway(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut config, path) = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!(
        "starting gateway on {}:{} (config {})",
        config.gateway.bind,
        config.gateway.port,
        path.display()
    );
    lib::gateway::run_gateway(config).await
}

fn run_sign(body_path: PathBuf, config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, _) = lib::config::load_config(config_path)?;
    let secret = lib::config::resolve_channel_secret(&config).with_context(|| {
        format!(
            "channel secret not configured (set {} or channels.line.channelSecret)",
            lib::config::CHANNEL_SECRET_ENV
        )
    })?;
    let body = std::fs::read(&body_path)
        .with_context(|| format!("reading body from {}", body_path.display()))?;
    println!("{}", lib::channels::line::sign(secret.as_bytes(), &body));
    Ok(())
}
