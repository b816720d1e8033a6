//! Simulator binary. Listens on the control port and behaves like a
//! projector on the network.

use std::time::Duration;

use clap::Parser;
use jvctl_sim::{Simulator, SimulatorConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "jvctl-sim")]
#[command(about = "Protocol simulator for D-ILA projector IP control")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:20554")]
    listen: String,

    /// Require this password during the handshake
    #[arg(short, long)]
    password: Option<String>,

    /// Seconds the lamp spends warming up
    #[arg(long, default_value = "2")]
    warmup: u64,

    /// Seconds the lamp spends cooling down
    #[arg(long, default_value = "3")]
    cooldown: u64,

    /// Artificial delay before each reply, in milliseconds
    #[arg(long, default_value = "0", value_name = "MS")]
    reply_delay: u64,

    /// Model identification string reported to clients
    #[arg(long, default_value = "ILAFPJ -- B5A1")]
    model: String,
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,jvctl_sim=debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let args = Args::parse();
    let config = SimulatorConfig {
        password: args.password,
        warmup: Duration::from_secs(args.warmup),
        cooldown: Duration::from_secs(args.cooldown),
        reply_delay: Duration::from_millis(args.reply_delay),
        model: args.model,
        ..SimulatorConfig::default()
    };

    let sim = match Simulator::bind(&args.listen, config).await {
        Ok(sim) => sim,
        Err(e) => {
            tracing::error!(addr = %args.listen, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };

    tokio::select! {
        result = sim.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "simulator stopped");
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }
}
