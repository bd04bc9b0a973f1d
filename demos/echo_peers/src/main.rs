use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use gossip_reliability::{
    start_periodic_tasks, ChannelId, EventSink, ManagerConfig, MessageId, ReliabilityManager,
};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of messages peer A sends to peer B.
    #[arg(long, default_value_t = 5)]
    count: u64,
    /// Delay between sends.
    #[arg(long, default_value_t = 200)]
    interval_ms: u64,
}

/// Logs every callback at info level, tagged with the peer's name.
struct LoggingSink {
    peer: &'static str,
}

impl EventSink for LoggingSink {
    fn message_ready(&mut self, id: &MessageId) {
        info!(peer = self.peer, ?id, "message ready");
    }

    fn message_sent(&mut self, id: &MessageId) {
        info!(peer = self.peer, ?id, "message acknowledged");
    }

    fn missing_dependencies(&mut self, id: &MessageId, ids: &[MessageId]) {
        warn!(peer = self.peer, ?id, ?ids, "buffered pending dependencies");
    }

    fn periodic_sync(&mut self) {
        info!(peer = self.peer, "periodic sync tick");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let channel_id = ChannelId::from(b"echo-peers-demo".as_slice());
    let peer_a = ReliabilityManager::new(channel_id.clone(), ManagerConfig::default(), LoggingSink { peer: "a" })?;
    let peer_b = ReliabilityManager::new(channel_id, ManagerConfig::default(), LoggingSink { peer: "b" })?;

    let a_scheduler = start_periodic_tasks(peer_a.clone());
    let b_scheduler = start_periodic_tasks(peer_b.clone());

    let (to_b, mut from_a) = mpsc::unbounded_channel::<Vec<u8>>();
    let (to_a, mut from_b) = mpsc::unbounded_channel::<Vec<u8>>();

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_ctrlc = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received ctrl-c, shutting down");
            shutdown_ctrlc.store(true, Ordering::SeqCst);
        }
    });

    let b_receiver = peer_b.clone();
    let b_forward = tokio::spawn(async move {
        while let Some(frame) = from_a.recv().await {
            match b_receiver.unwrap_incoming(&frame) {
                Ok((payload, missing)) => {
                    info!(?payload, pending = missing.len(), "b received frame");
                    let reply = format!("ack:{}", String::from_utf8_lossy(&payload));
                    let reply_id = MessageId::from(reply.as_bytes());
                    if let Ok(reply_frame) = b_receiver.wrap_outgoing(reply.as_bytes(), reply_id) {
                        let _ = to_a.send(reply_frame);
                    }
                }
                Err(e) => warn!(error = %e, "b failed to decode frame"),
            }
        }
    });

    let a_receiver = peer_a.clone();
    let a_listen = tokio::spawn(async move {
        while let Some(frame) = from_b.recv().await {
            match a_receiver.unwrap_incoming(&frame) {
                Ok((payload, missing)) => {
                    info!(?payload, pending = missing.len(), "a received reply");
                }
                Err(e) => warn!(error = %e, "a failed to decode frame"),
            }
        }
    });

    for n in 0..args.count {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        let payload = format!("hello-{n}");
        let id = MessageId::from(payload.as_bytes());
        let frame = peer_a.wrap_outgoing(payload.as_bytes(), id)?;
        to_b.send(frame)?;
        tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
    }

    drop(to_b);
    tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;

    b_forward.abort();
    a_listen.abort();
    a_scheduler.shutdown().await;
    b_scheduler.shutdown().await;

    Ok(())
}
