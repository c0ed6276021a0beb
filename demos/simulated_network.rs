//! Minimal embedding example for outage-core
//!
//! Drives the monitor engine against a simulated network instead of a raw
//! socket, so it runs without privileges. One host answers throughout; the
//! other drops off the network for a few seconds and comes back.
//!
//! ```bash
//! cargo run -p demos --bin simulated_network
//! ```

use async_trait::async_trait;
use outage_core::packet::{EchoReply, EchoRequest};
use outage_core::traits::Transport;
use outage_core::{MemorySink, MonitorConfig, MonitorEngine, Result};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::info;

const STEADY: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 1);
const FLAKY: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 2);

/// Echoes requests to reachable hosts after a short delay
struct SimulatedNetwork {
    reachable: Mutex<HashSet<Ipv4Addr>>,
    replies_tx: mpsc::UnboundedSender<(Vec<u8>, Ipv4Addr)>,
    replies_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<(Vec<u8>, Ipv4Addr)>>,
}

impl SimulatedNetwork {
    fn new(hosts: &[Ipv4Addr]) -> Self {
        let (replies_tx, replies_rx) = mpsc::unbounded_channel();
        Self {
            reachable: Mutex::new(hosts.iter().copied().collect()),
            replies_tx,
            replies_rx: tokio::sync::Mutex::new(replies_rx),
        }
    }

    fn set_reachable(&self, host: Ipv4Addr, reachable: bool) {
        if let Ok(mut hosts) = self.reachable.lock() {
            if reachable {
                hosts.insert(host);
            } else {
                hosts.remove(&host);
            }
        }
    }

    fn is_reachable(&self, host: Ipv4Addr) -> bool {
        self.reachable
            .lock()
            .map(|hosts| hosts.contains(&host))
            .unwrap_or(false)
    }
}

#[async_trait]
impl Transport for SimulatedNetwork {
    async fn send(&self, target: Ipv4Addr, request: &EchoRequest) -> Result<()> {
        if !self.is_reachable(target) {
            return Ok(());
        }

        let reply = EchoReply::from(request).encode(request.payload);
        let tx = self.replies_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            let _ = tx.send((reply, target));
        });
        Ok(())
    }

    async fn receive(&self) -> Result<(Vec<u8>, Ipv4Addr)> {
        match self.replies_rx.lock().await.recv().await {
            Some(reply) => Ok(reply),
            None => std::future::pending().await,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let network = Arc::new(SimulatedNetwork::new(&[STEADY, FLAKY]));
    let sink = MemorySink::new();

    let (engine, events) = MonitorEngine::new(
        network.clone(),
        Arc::new(sink.clone()),
        MonitorConfig::new(vec![STEADY, FLAKY]),
    )?;

    let shutdown = CancellationToken::new();
    let engine_task = tokio::spawn(engine.run(shutdown.clone()));

    let printer = tokio::spawn(async move {
        let mut events = ReceiverStream::new(events);
        while let Some(event) = events.next().await {
            println!("event: {}", event);
        }
    });

    tokio::time::sleep(Duration::from_secs(2)).await;
    info!("Taking {} off the network", FLAKY);
    network.set_reachable(FLAKY, false);

    tokio::time::sleep(Duration::from_secs(4)).await;
    info!("Bringing {} back", FLAKY);
    network.set_reachable(FLAKY, true);

    tokio::time::sleep(Duration::from_secs(3)).await;
    shutdown.cancel();

    engine_task
        .await
        .map_err(|e| outage_core::Error::task(e.to_string()))??;
    let _ = printer.await;

    println!("\nRecorded log:");
    for record in sink.records().await {
        println!("| {:<80}| {:<26}|", record.message, record.timestamp);
    }

    Ok(())
}
