use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::Input;
use meshcall_client::{
    LocalMedia, LocalTrack, MeshConfig, MeshHandle, MeshStatus, RemoteStreams, RtcTransport,
    WsSignalingChannel,
};
use meshcall_core::{IceServerConfig, ParticipantId, RoomId, TrackKind, TrackSource};
use meshcall_relay::RelayConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "meshcall", version, about = "Full-mesh group calls over a signaling relay")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the signaling relay.
    Relay {
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: SocketAddr,
    },

    /// Print a fresh room id, and a meeting link when a base URL is given.
    Room {
        /// Address of the call page, e.g. `https://call.example.org/rooms`.
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Join a room with synthetic audio and video.
    Join {
        #[arg(long, default_value = "ws://127.0.0.1:8080")]
        relay: String,

        /// Prompted for when omitted.
        #[arg(long)]
        room: Option<String>,

        /// Defaults to a random id.
        #[arg(long)]
        id: Option<String>,

        /// STUN/TURN url; repeat for several. Uses a public STUN server by default.
        #[arg(long = "ice-server")]
        ice_servers: Vec<String>,

        /// Share a synthetic screen for this many seconds after joining.
        #[arg(long, value_name = "SECS")]
        share_screen: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Commands::Relay { bind } => {
            println!("{}", format!("Relay starting on {bind}").green().bold());
            meshcall_relay::serve(RelayConfig { bind }).await?;
        }

        Commands::Room { base_url } => {
            let room = RoomId::generate();
            println!("{}", room.as_str().cyan().bold());
            if let Some(base) = base_url {
                println!("{} {}", "Meeting link:".dimmed(), room.meeting_link(&base).underline());
            }
        }

        Commands::Join {
            relay,
            room,
            id,
            ice_servers,
            share_screen,
        } => {
            let room = match room {
                Some(room) => room,
                None => Input::<String>::new()
                    .with_prompt("Room id")
                    .interact_text()
                    .context("failed to read room id")?,
            };
            let participant = id.map(ParticipantId::from).unwrap_or_default();

            let mut config = MeshConfig::default();
            if !ice_servers.is_empty() {
                config = config.with_ice_servers(
                    ice_servers
                        .into_iter()
                        .map(|url| IceServerConfig {
                            urls: vec![url],
                            username: None,
                            credential: None,
                        })
                        .collect(),
                );
            }

            let share = share_screen.map(Duration::from_secs);
            run_call(&relay, RoomId::from(room), participant, config, share).await?;
        }
    }

    Ok(())
}

async fn run_call(
    relay: &str,
    room: RoomId,
    participant: ParticipantId,
    config: MeshConfig,
    share_screen: Option<Duration>,
) -> Result<()> {
    let (channel, inbound) = WsSignalingChannel::connect(relay, &participant).await?;
    let transport = RtcTransport::new(&config)?;
    let mesh = MeshHandle::spawn(
        participant.clone(),
        config,
        Arc::new(channel),
        inbound,
        Arc::new(transport),
    );

    let media = LocalMedia::new()
        .with_track(LocalTrack::sample(
            TrackKind::Audio,
            TrackSource::Microphone,
            participant.as_str(),
        ))
        .with_track(LocalTrack::sample(
            TrackKind::Video,
            TrackSource::Camera,
            participant.as_str(),
        ));

    mesh.join_room(room.clone(), media).await?;
    println!(
        "{} {} as {}",
        "Joined".green().bold(),
        room.as_str().cyan(),
        participant.as_str().yellow()
    );
    println!("{}", "Press Ctrl-C to leave.".dimmed());

    let mut participants = mesh.subscribe_participants();
    let mut streams = mesh.subscribe_streams();
    let mut status = mesh.subscribe_status();

    if let Some(duration) = share_screen {
        spawn_screen_share(mesh.clone(), participant.clone(), duration);
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("{}", "Leaving...".yellow());
                break;
            }

            Ok(()) = participants.changed() => {
                let roster = participants.borrow_and_update().clone();
                info!("Room roster: {:?}", roster);
                println!("{} {}", "Participants:".bold(), roster.len());
            }

            Ok(()) = streams.changed() => {
                let current = streams.borrow_and_update().clone();
                print_streams(&current);
            }

            Ok(()) = status.changed() => {
                let current = status.borrow_and_update().clone();
                if let MeshStatus::ChannelLost(reason) = current {
                    println!("{} {}", "Relay connection lost:".red().bold(), reason);
                    break;
                }
            }
        }
    }

    mesh.shutdown().await?;
    Ok(())
}

fn spawn_screen_share(
    mesh: MeshHandle,
    participant: ParticipantId,
    duration: Duration,
) {
    tokio::spawn(async move {
        let screen = LocalTrack::sample(TrackKind::Video, TrackSource::Screen, participant.as_str());
        let (ended_tx, ended_rx) = oneshot::channel();

        match mesh.share_transient(screen, ended_rx).await {
            Ok(report) if report.all_succeeded() => {
                println!("{} on {} links", "Sharing screen".magenta(), report.succeeded.len());
            }
            Ok(report) => warn!("Screen share failed on {:?}", report.failed),
            Err(e) => warn!("Screen share rejected: {}", e),
        }

        tokio::time::sleep(duration).await;
        info!("Ending screen share after {:?}", duration);
        let _ = ended_tx.send(());
    });
}

fn print_streams(streams: &RemoteStreams) {
    if streams.is_empty() {
        println!("{}", "No remote streams".dimmed());
        return;
    }
    for (participant, stream) in streams {
        let kinds: Vec<String> = stream.tracks.iter().map(|t| t.kind.to_string()).collect();
        println!(
            "  {} {} [{}]",
            "▶".green(),
            participant.as_str().yellow(),
            kinds.join(", ")
        );
    }
}
