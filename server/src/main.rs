use clap::Parser;
use log::info;
use server::config::ServerConfig;
use server::network::Server;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,

    /// Simulation ticks per second
    #[arg(short, long, default_value_t = shared::TICK_RATE)]
    tick_rate: u32,

    /// Delay before a dead player respawns
    #[arg(long, default_value_t = shared::RESPAWN_DELAY_MS)]
    respawn_delay_ms: u64,

    /// Outbound messages buffered per session before dropping
    #[arg(long, default_value_t = 256)]
    queue_capacity: usize,

    /// Interval between server pings
    #[arg(long, default_value_t = 1000)]
    ping_interval_ms: u64,

    /// Close sessions that send nothing for this long
    #[arg(long, default_value_t = 10_000)]
    idle_timeout_ms: u64,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            host: self.host,
            port: self.port,
            tick_rate: self.tick_rate.max(1),
            respawn_delay: Duration::from_millis(self.respawn_delay_ms),
            queue_capacity: self.queue_capacity.max(1),
            ping_interval: Duration::from_millis(self.ping_interval_ms.max(1)),
            idle_timeout: Duration::from_millis(self.idle_timeout_ms.max(1)),
            ..ServerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.into_config();

    info!(
        "Starting server on {} at {} Hz",
        config.bind_addr(),
        config.tick_rate
    );

    let server = Server::bind(config).await?;
    server
        .run_until(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, shutting down");
            }
        })
        .await?;

    Ok(())
}
