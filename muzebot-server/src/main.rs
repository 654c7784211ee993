use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

use muzebot_core::Error;

mod context;
mod server;

#[derive(Parser, Debug, Clone)]
#[command(name = "muzebot")]
#[command(author, version, about = "MuzeBot - Discord music bot with a per-guild playback queue")]
pub struct Args {
    /// Discord bot token. Falls back to the BOT_TOKEN environment variable.
    #[arg(long)]
    token: Option<String>,

    /// Prefix for text commands
    #[arg(long, default_value = "!")]
    pub prefix: String,

    /// Base URL of the lyrics API
    #[arg(long, default_value = "https://some-random-api.ml")]
    pub lyrics_api: String,
}

impl Args {
    pub fn resolve_token(&self) -> Result<String, Error> {
        if let Some(token) = &self.token {
            if !token.is_empty() {
                return Ok(token.clone());
            }
        }
        std::env::var("BOT_TOKEN")
            .map_err(|_| Error::Auth("no Discord token: pass --token or set BOT_TOKEN".into()))
    }
}

fn init_tracing() {
    let filter = EnvFilter::from_default_env()
        .add_directive("muzebot=info".parse().unwrap_or_default());
    let sub = fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(sub)
        .expect("Failed to set global subscriber");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();
    info!("MuzeBot starting. prefix={}", args.prefix);

    if let Err(e) = server::run_server(args).await {
        error!("Server error: {:?}", e);
    }
    Ok(())
}
