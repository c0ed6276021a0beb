//! Test doubles and common utilities for contract tests
//!
//! All doubles are driven by tokio's paused clock, so timing assertions
//! are exact up to scheduling order.

#![allow(dead_code)]

use async_trait::async_trait;
use outage_core::error::{Error, Result};
use outage_core::packet::{ECHO_PAYLOAD, EchoReply, EchoRequest};
use outage_core::sink::MemorySink;
use outage_core::traits::{EventSink, Transport};
use outage_core::{MonitorConfig, MonitorEngine, MonitorEvent};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// One request seen by the transport
#[derive(Debug, Clone, Copy)]
pub struct SentRequest {
    pub target: Ipv4Addr,
    pub request: EchoRequest,
    pub at: Instant,
}

/// A simulated network where reachable hosts echo after a fixed delay
///
/// Clones share state, so a test can keep a handle while the engine owns
/// another.
#[derive(Clone)]
pub struct LoopbackTransport {
    reachable: Arc<Mutex<HashSet<Ipv4Addr>>>,
    sent: Arc<Mutex<Vec<SentRequest>>>,
    reply_delay: Duration,
    fail_sends: Arc<AtomicBool>,
    inbound_tx: mpsc::UnboundedSender<(Vec<u8>, Ipv4Addr)>,
    inbound_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<(Vec<u8>, Ipv4Addr)>>>,
}

impl LoopbackTransport {
    /// Create a network with no reachable hosts
    pub fn new(reply_delay: Duration) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            reachable: Arc::new(Mutex::new(HashSet::new())),
            sent: Arc::new(Mutex::new(Vec::new())),
            reply_delay,
            fail_sends: Arc::new(AtomicBool::new(false)),
            inbound_tx,
            inbound_rx: Arc::new(tokio::sync::Mutex::new(inbound_rx)),
        }
    }

    pub fn set_reachable(&self, host: Ipv4Addr, reachable: bool) {
        let mut hosts = self.reachable.lock().unwrap();
        if reachable {
            hosts.insert(host);
        } else {
            hosts.remove(&host);
        }
    }

    /// Make every subsequent send fail
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Deliver raw bytes as if read from the socket
    pub fn inject(&self, bytes: Vec<u8>, source: Ipv4Addr) {
        let _ = self.inbound_tx.send((bytes, source));
    }

    /// Deliver a well-formed echo reply
    pub fn inject_reply(&self, reply: EchoReply, source: Ipv4Addr) {
        self.inject(reply.encode(ECHO_PAYLOAD), source);
    }

    /// All requests sent so far, oldest first
    pub fn sent(&self) -> Vec<SentRequest> {
        self.sent.lock().unwrap().clone()
    }

    /// Requests sent to one target, oldest first
    pub fn sent_to(&self, target: Ipv4Addr) -> Vec<SentRequest> {
        self.sent()
            .into_iter()
            .filter(|sent| sent.target == target)
            .collect()
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&self, target: Ipv4Addr, request: &EchoRequest) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::send("network is unreachable"));
        }

        self.sent.lock().unwrap().push(SentRequest {
            target,
            request: *request,
            at: Instant::now(),
        });

        if !self.reachable.lock().unwrap().contains(&target) {
            return Ok(());
        }

        let reply = EchoReply::from(request).encode(request.payload);
        if self.reply_delay.is_zero() {
            let _ = self.inbound_tx.send((reply, target));
        } else {
            let tx = self.inbound_tx.clone();
            let delay = self.reply_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send((reply, target));
            });
        }

        Ok(())
    }

    async fn receive(&self) -> Result<(Vec<u8>, Ipv4Addr)> {
        let mut rx = self.inbound_rx.lock().await;
        match rx.recv().await {
            Some(inbound) => Ok(inbound),
            None => std::future::pending().await,
        }
    }
}

/// A sink that fails every record after the first `allowed`
#[derive(Clone)]
pub struct FailingSink {
    inner: MemorySink,
    allowed: usize,
    attempts: Arc<AtomicUsize>,
}

impl FailingSink {
    pub fn new(allowed: usize) -> Self {
        Self {
            inner: MemorySink::new(),
            allowed,
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Records that were accepted
    pub fn accepted(&self) -> MemorySink {
        self.inner.clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSink for FailingSink {
    async fn record(&self, message: &str, timestamp: &str) -> Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt >= self.allowed {
            return Err(Error::sink("No space left on device"));
        }
        self.inner.record(message, timestamp).await
    }
}

/// A memory sink that counts flushes
#[derive(Clone, Default)]
pub struct FlushCountingSink {
    inner: MemorySink,
    flushes: Arc<AtomicUsize>,
}

impl FlushCountingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> MemorySink {
        self.inner.clone()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSink for FlushCountingSink {
    async fn record(&self, message: &str, timestamp: &str) -> Result<()> {
        self.inner.record(message, timestamp).await
    }

    async fn flush(&self) -> Result<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub const HOST_A: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
pub const HOST_B: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

/// Default configuration for the given targets
pub fn minimal_config(targets: &[Ipv4Addr]) -> MonitorConfig {
    MonitorConfig::new(targets.to_vec())
}

/// A running engine plus everything a test needs to steer it
pub struct Harness {
    pub shutdown: CancellationToken,
    pub handle: JoinHandle<Result<()>>,
    pub events: mpsc::Receiver<MonitorEvent>,
    pub started: Instant,
}

impl Harness {
    /// Cancel and wait for the engine's result
    pub async fn stop(self) -> Result<()> {
        self.shutdown.cancel();
        self.handle.await.map_err(|e| Error::task(e.to_string()))?
    }
}

/// Build and spawn an engine
pub fn spawn_engine<S>(transport: &LoopbackTransport, sink: S, config: MonitorConfig) -> Harness
where
    S: EventSink + 'static,
{
    let (engine, events) = MonitorEngine::new(Arc::new(transport.clone()), Arc::new(sink), config)
        .expect("engine construction succeeds");

    let shutdown = CancellationToken::new();
    let started = Instant::now();
    let handle = tokio::spawn(engine.run(shutdown.clone()));

    Harness {
        shutdown,
        handle,
        events,
        started,
    }
}

/// Assert `at` lies within a few milliseconds after `start + expected_ms`
pub fn assert_at(start: Instant, at: Instant, expected_ms: u64) {
    let elapsed = at.duration_since(start);
    let expected = Duration::from_millis(expected_ms);
    assert!(
        elapsed >= expected && elapsed < expected + Duration::from_millis(5),
        "expected ~{:?} after start, got {:?}",
        expected,
        elapsed
    );
}

/// Advance the paused clock
pub async fn advance_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
