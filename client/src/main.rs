use clap::Parser;
use client::game::ClientGameState;
use client::input::ScriptedInput;
use client::network::NetworkClient;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{default_player_zones, now_millis, Message, WorldMap, TICK_RATE};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8888")]
    server: String,

    /// Display name; defaults to the generated identity
    #[arg(short = 'n', long)]
    name: Option<String>,

    /// Ticks to play before leaving; 0 plays until Ctrl+C
    #[arg(short = 't', long, default_value_t = 3600)]
    ticks: u64,

    /// Seed for identity, spawn point and scripted input
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let identity = format!("bot-{:08x}", rng.gen::<u32>());
    let name = args.name.unwrap_or_else(|| identity.clone());

    info!("Starting client {} ({})", identity, name);
    info!("Connecting to: {}", args.server);

    let mut network = NetworkClient::connect(&args.server, identity.clone()).await?;
    let mut game = ClientGameState::spawn(
        identity,
        name,
        WorldMap::default_arena(),
        &default_player_zones(),
        &mut rng,
    );
    let mut input = ScriptedInput::new(rng.gen());
    network.send(game.join_message()).await?;

    let mut ticker = interval(Duration::from_secs_f64(1.0 / TICK_RATE as f64));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let report_every = u64::from(TICK_RATE) * 5;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut tick: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut shutdown => {
                info!("Received Ctrl+C, leaving");
                break;
            }
        }

        while let Some(envelope) = network.try_recv()? {
            game.apply_message(&envelope);
        }

        let now = now_millis();
        let intent = input.next_intent(game.local().position, game.nearest_target());
        game.apply_input(&intent, now);
        if intent.fire {
            if let Some(spawn) = game.fire(now) {
                network.send(Message::BulletSpawn(spawn)).await?;
            }
        }
        for hit in game.step_bullets() {
            network.send(Message::Hit(hit)).await?;
        }
        game.interpolate();
        network.send(game.local_update_message(now)).await?;

        if tick % report_every == 0 {
            network.ping().await?;
            let local = game.local();
            info!(
                "tick {}: at ({:.0}, {:.0}) hp {} ammo {} kills {}{} | {} players, {} creatures, rtt {}",
                tick,
                local.position.x,
                local.position.y,
                local.health,
                local.ammo,
                local.kills,
                if local.dead { " (dead)" } else { "" },
                game.players().count(),
                game.npcs().count(),
                network
                    .rtt_ms()
                    .map_or_else(|| "-".to_string(), |rtt| format!("{}ms", rtt))
            );
        }

        tick += 1;
        if args.ticks > 0 && tick >= args.ticks {
            info!("Played {} ticks, leaving", tick);
            break;
        }
    }

    if let Err(e) = network.leave().await {
        warn!("Could not send LEAVE: {}", e);
    }
    Ok(())
}
