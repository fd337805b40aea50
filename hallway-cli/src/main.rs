use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::Confirm;
use hallway_core::{BusEvent, ParticipantId, Position, RoomKey};
use hallway_session::{
    BusRoomJoiner, DurableSnapshotStore, EventBus, FallbackPolicy, HallwayConfig,
    InMemoryDocumentStore, InMemoryRealtimeStore, LinkState, MediaConstraints, MediaDevices,
    PeerConnectionFactory, PeerSession, PositionStore, PresenceEngine, RealtimeSnapshotStore,
    RestoreOutcome, RtcConnectionFactory, SessionContinuity, SignalingChannel,
    SyntheticMediaDevices, TransportConfig,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hallway")]
#[command(about = "Presence, peer calls and session resume for a shared 2D space")]
struct Cli {
    /// JSON file overriding the built-in configuration.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Negotiate a call between two in-process peers, then hang up.
    Call {
        #[arg(long, default_value = "spaceX")]
        space: String,

        #[arg(long, default_value = "room1")]
        room: String,

        /// Use the configured ICE servers instead of host candidates only.
        #[arg(long)]
        stun: bool,

        #[arg(long, default_value_t = 10)]
        timeout_secs: u64,
    },

    /// Walk an avatar to a point and print the committed moves.
    Walk {
        #[arg(long, value_parser = parse_position)]
        to: Position,

        #[arg(long, value_parser = parse_position, default_value = "100,100")]
        from: Position,
    },

    /// Save a session, simulate a reload and offer to resume it.
    Resume {
        #[arg(long, default_value = "room1")]
        room: String,

        #[arg(long, value_parser = parse_position, default_value = "500,500")]
        at: Position,

        #[arg(long, default_value = "fox")]
        avatar: String,

        /// Resume without asking.
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .try_init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => HallwayConfig::from_json_file(path)?,
        None => HallwayConfig::default(),
    };

    match cli.command {
        Commands::Call {
            space,
            room,
            stun,
            timeout_secs,
        } => {
            let transport = if stun {
                config.transport.clone()
            } else {
                TransportConfig::local_only()
            };
            let key = RoomKey::new(space, room);
            run_call(transport, key, Duration::from_secs(timeout_secs)).await
        }
        Commands::Walk { to, from } => run_walk(&config, from, to).await,
        Commands::Resume {
            room,
            at,
            avatar,
            yes,
        } => run_resume(&config, room, at, avatar, yes).await,
    }
}

async fn run_call(transport: TransportConfig, key: RoomKey, timeout: Duration) -> Result<()> {
    println!("{}", format!("📞 Negotiating call in {}...", key).green().bold());

    let store = InMemoryDocumentStore::new();
    let channel = SignalingChannel::new(Arc::new(store.clone()));
    let factory: Arc<dyn PeerConnectionFactory> = Arc::new(RtcConnectionFactory::new(transport));
    let devices: Arc<dyn MediaDevices> = Arc::new(SyntheticMediaDevices::default());

    let caller = PeerSession::new(
        channel.clone(),
        Arc::clone(&factory),
        Arc::clone(&devices),
        MediaConstraints::default(),
    );
    let callee = PeerSession::new(channel, factory, devices, MediaConstraints::default());

    caller
        .start_call(&key)
        .await
        .context("Caller failed to start the call")?;
    println!("   {} offer written", "✔".green());

    if let Err(e) = callee.join_call(&key).await {
        caller.hang_up().await;
        return Err(e).context("Callee failed to join");
    }
    println!("   {} answer written", "✔".green());

    let answered = tokio::time::timeout(timeout, caller.connected())
        .await
        .unwrap_or(false);
    if !answered {
        caller.hang_up().await;
        callee.hang_up().await;
        bail!("Caller never applied the answer");
    }
    println!("   {} signaling complete", "✔".green());

    let mut link = caller.subscribe_link();
    let linked = tokio::time::timeout(timeout, link.wait_for(|s| *s == LinkState::Connected))
        .await
        .map(|r| r.is_ok())
        .unwrap_or(false);
    if linked {
        println!("   {} media link up", "✔".green());
    } else {
        println!(
            "   {} media link still {:?}",
            "⚠".yellow(),
            caller.link_state()
        );
    }

    caller.hang_up().await;
    callee.hang_up().await;
    println!(
        "{}",
        format!(
            "✨ Call torn down ({} live subscriptions left)",
            store.total_watchers()
        )
        .green()
        .bold()
    );
    Ok(())
}

async fn run_walk(config: &HallwayConfig, from: Position, to: Position) -> Result<()> {
    let presence = &config.presence;
    let store = Arc::new(PositionStore::new(presence)?);
    let bus = EventBus::new();

    let moves = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&moves);
    let engine = PresenceEngine::new(ParticipantId::new(), store, bus.clone(), presence, from)
        .with_callback(Arc::new(move |p: Position| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n % 10 == 0 {
                println!("   {} ({:.1}, {:.1})", "→".cyan(), p.x, p.y);
            }
        }));

    let mut events = bus.subscribe();
    let zones = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                BusEvent::ZoneEntered { zone_id } => {
                    println!("   {} entered {}", "◆".magenta(), zone_id.bold())
                }
                BusEvent::ZoneLeft { zone_id } => println!("   {} left {}", "◇".magenta(), zone_id),
                _ => {}
            }
        }
    });

    let start = engine.position();
    println!(
        "{}",
        format!(
            "🚶 Walking from ({:.1}, {:.1}) to ({:.1}, {:.1})...",
            start.x, start.y, to.x, to.y
        )
        .green()
        .bold()
    );

    engine.start();
    engine.move_to(to);
    let arrival = async {
        while engine.target().is_some() {
            tokio::time::sleep(presence.frame_interval()).await;
        }
    };
    tokio::select! {
        _ = arrival => {}
        _ = tokio::signal::ctrl_c() => println!("{}", "Interrupted".yellow()),
    }
    engine.shutdown();
    zones.abort();

    let end = engine.position();
    println!(
        "{}",
        format!(
            "✨ Stopped at ({:.1}, {:.1}) after {} moves",
            end.x,
            end.y,
            moves.load(Ordering::SeqCst)
        )
        .green()
        .bold()
    );
    Ok(())
}

fn snapshot_policy(
    config: &HallwayConfig,
    realtime: &InMemoryRealtimeStore,
    durable: &InMemoryDocumentStore,
) -> FallbackPolicy {
    FallbackPolicy::standard(
        Arc::new(RealtimeSnapshotStore::new(Arc::new(realtime.clone()))),
        Arc::new(DurableSnapshotStore::new(Arc::new(durable.clone()))),
        &config.continuity,
    )
}

async fn run_resume(
    config: &HallwayConfig,
    room: String,
    at: Position,
    avatar: String,
    yes: bool,
) -> Result<()> {
    let realtime = InMemoryRealtimeStore::new();
    let durable = InMemoryDocumentStore::new();
    let participant = ParticipantId::new();

    println!("{}", "💾 Saving a session...".cyan());
    {
        let bus = EventBus::new();
        let continuity = SessionContinuity::new(
            participant,
            bus.clone(),
            snapshot_policy(config, &realtime, &durable),
            config.continuity.clone(),
        );
        continuity.track_position(at);
        continuity.start();
        bus.publish(BusEvent::CharacterSelected { avatar });
        bus.publish(BusEvent::RoomJoined { room_id: room });
        tokio::time::sleep(Duration::from_millis(50)).await;
        continuity.shutdown().await;
    }

    println!("{}", "🔄 Reloading...".cyan());
    let bus = EventBus::new();
    let continuity = SessionContinuity::new(
        participant,
        bus.clone(),
        snapshot_policy(config, &realtime, &durable),
        config.continuity.clone(),
    );

    let Some(snapshot) = continuity.load_latest().await else {
        println!("{}", "No previous session found, starting fresh.".yellow());
        return Ok(());
    };
    println!(
        "   Last seen in {} at ({:.1}, {:.1}) as {}",
        snapshot.room_id.bold(),
        snapshot.position.x,
        snapshot.position.y,
        snapshot.avatar.as_deref().unwrap_or("-")
    );

    let resume = yes
        || Confirm::new()
            .with_prompt("Resume where you left off?")
            .default(true)
            .interact()?;
    if !resume {
        println!("{}", "Starting fresh.".yellow());
        return Ok(());
    }

    let store = Arc::new(PositionStore::new(&config.presence)?);
    let engine = PresenceEngine::new(
        participant,
        Arc::clone(&store),
        bus.clone(),
        &config.presence,
        store.safe_fallback(),
    );
    let joiner = BusRoomJoiner::new(bus);

    match continuity.restore(&snapshot, &engine, &joiner).await {
        RestoreOutcome::Restored { position } => println!(
            "{}",
            format!(
                "✨ Back in {} at ({:.1}, {:.1})",
                snapshot.room_id, position.x, position.y
            )
            .green()
            .bold()
        ),
        RestoreOutcome::Fresh { notice } => println!("{}", notice.yellow().bold()),
    }
    Ok(())
}

fn parse_position(raw: &str) -> Result<Position, String> {
    let (x, y) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y but got '{raw}'"))?;
    let x: f64 = x.trim().parse().map_err(|_| format!("bad x coordinate '{x}'"))?;
    let y: f64 = y.trim().parse().map_err(|_| format!("bad y coordinate '{y}'"))?;
    Ok(Position::new(x, y))
}
