mod bootstrap;
mod commands;
mod http;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use livecast_core::{logging, PlaybackPolicy, StreamId};

#[derive(Parser, Debug)]
#[command(name = "livecast")]
#[command(about = "Create, watch and tear down Mux live streams", long_about = None)]
struct Cli {
    /// Config file (YAML or TOML)
    #[arg(long, short, global = true, env = "LIVECAST_CONFIG_PATH")]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List streams with their status
    List {
        /// Append the "coming soon" placeholders
        #[arg(long)]
        demo: bool,
    },

    /// Show one stream
    Show { id: String },

    /// Create a stream
    Create {
        /// public or signed (defaults to streams.playback_policy)
        #[arg(long, value_parser = parse_policy)]
        policy: Option<PlaybackPolicy>,

        /// Seconds the platform waits for the encoder to reconnect
        #[arg(long)]
        reconnect_window: Option<i64>,
    },

    /// Delete a stream
    Delete { id: String },

    /// Print the RTMP URL and stream key for an encoder
    Ingest { id: String },

    /// Poll and print status changes until Ctrl+C
    Watch {
        /// Watch one stream instead of the whole catalogue
        id: Option<String>,
    },

    /// Run the HTTP API
    Serve,
}

fn parse_policy(s: &str) -> std::result::Result<PlaybackPolicy, String> {
    s.parse().map_err(|e: livecast_core::Error| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = bootstrap::load_config(cli.config.as_deref())?;
    logging::init_logging(&config.logging)?;

    let registry = bootstrap::build_registry(&config)?;

    match cli.command {
        Command::List { demo } => commands::list(&registry, demo).await,
        Command::Show { id } => commands::show(&registry, &StreamId::from(id)).await,
        Command::Create {
            policy,
            reconnect_window,
        } => commands::create(&config, registry, policy, reconnect_window).await,
        Command::Delete { id } => commands::delete(registry, &StreamId::from(id)).await,
        Command::Ingest { id } => commands::ingest(&config, &registry, &StreamId::from(id)).await,
        Command::Watch { id } => commands::watch(&config, registry, id.map(StreamId::from)).await,
        Command::Serve => server::serve(config, registry).await,
    }
}
