//! AVR emulator server binary.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: 0.0.0.0:28338, 10% lie probability, max position 15000
//! avr-server
//!
//! # Honest device on loopback with a short rail
//! avr-server --host 127.0.0.1 --port 4000 --lie-probability 0 --max-position 500
//! ```

use avr_core::{DeviceConfig, MotionProfile};
use avr_server::{DEFAULT_PORT, Server, ServerConfig};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// AVR positioning device emulator
#[derive(Parser, Debug)]
#[command(name = "avr-server")]
#[command(about = "Emulates an AVR positioning device over TCP")]
#[command(version)]
struct Args {
    /// IP address to listen on
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// TCP port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Chance, in percent, that a position query returns a wrong value
    #[arg(long, visible_alias = "ctl", default_value_t = 10, allow_negative_numbers = true)]
    lie_probability: i64,

    /// Highest position the device can reach
    #[arg(long, visible_alias = "maxpos", default_value_t = 15_000, allow_negative_numbers = true)]
    max_position: i64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let device = DeviceConfig::new(args.lie_probability, args.max_position)?;
    tracing::info!(
        lie_probability = device.lie_probability(),
        max_position = device.max_position(),
        "AVR emulator starting"
    );

    let config = ServerConfig {
        listen_host: args.host,
        listen_port: args.port,
        device,
        motion: MotionProfile::default(),
    };

    let server = Server::bind(config).await.inspect_err(|e| tracing::error!("{e}"))?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
    }

    Ok(())
}
