//! Network listener.
//!
//! Binds a TCP endpoint that producers push framed JSON messages to. A
//! dedicated accept thread hands each producer connection to its own reader
//! thread; readers decode frames and publish [`ListenerEvent`]s on an
//! unbounded FIFO channel. The listener never touches the registry.
//!
//! Stopping is cooperative. Every blocking call (accept polling, socket
//! reads) is bounded by `poll_interval`, after which the shared running flag
//! is checked. Events already published before the flag is observed stay in
//! the channel.

mod connection;

use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{info, warn};

use crate::error::TransportError;
use crate::wire::frame::DEFAULT_MAX_FRAME_BYTES;
use crate::wire::WireMessage;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 5557;

/// Environment variable overriding the listen address.
pub const ADDR_ENV: &str = "PLOTTR_ADDR";

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Address to bind to.
    pub addr: SocketAddr,
    /// Largest accepted payload.
    pub max_frame_bytes: usize,
    /// Upper bound on any blocking wait before the stop flag is checked.
    pub poll_interval: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl ListenerConfig {
    /// Defaults, with the address taken from `PLOTTR_ADDR` when set.
    pub fn from_env() -> Result<Self, TransportError> {
        let mut cfg = Self::default();
        if let Ok(value) = std::env::var(ADDR_ENV) {
            cfg.addr = parse_addr(&value)?;
        }
        Ok(cfg)
    }
}

/// Parse `host:port`, or a bare port on the loopback interface.
pub fn parse_addr(value: &str) -> Result<SocketAddr, TransportError> {
    let value = value.trim();
    if let Ok(port) = value.parse::<u16>() {
        return Ok(SocketAddr::from(([127, 0, 0, 1], port)));
    }
    value.parse().map_err(|_| TransportError::InvalidAddress {
        value: value.to_string(),
    })
}

/// Observable listener activity.
#[derive(Debug, Clone, PartialEq)]
pub enum ListenerEvent {
    /// The accept loop is running.
    Listening {
        /// Bound address.
        addr: SocketAddr,
    },
    /// A producer opened a connection.
    ProducerConnected {
        /// Producer address.
        peer: SocketAddr,
    },
    /// A producer connection ended.
    ProducerDisconnected {
        /// Producer address.
        peer: SocketAddr,
    },
    /// A payload could not be decoded and was dropped.
    DecodeFailed {
        /// Producer address.
        peer: SocketAddr,
        /// Decoder diagnostic.
        error: String,
    },
    /// A well-formed payload without `id` was dropped.
    MissingIdentifier {
        /// Producer address.
        peer: SocketAddr,
    },
    /// A message is ready for structuring.
    DataAvailable {
        /// The message's `id`.
        dataset_id: String,
        /// Decoded message.
        message: WireMessage,
        /// Receive time.
        received_at: DateTime<Utc>,
    },
    /// The accept loop and all readers have exited.
    Stopped,
}

impl ListenerEvent {
    /// One-line human-readable description.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Listening { addr } => format!("Listening on {addr}..."),
            Self::ProducerConnected { peer } => format!("Producer connected: {peer}"),
            Self::ProducerDisconnected { peer } => format!("Producer disconnected: {peer}"),
            Self::DecodeFailed { peer, error } => format!("Received invalid data from {peer}: {error}"),
            Self::MissingIdentifier { peer } => format!("Received invalid data from {peer} (no ID)"),
            Self::DataAvailable { dataset_id, .. } => format!("Received data for dataset: {dataset_id}"),
            Self::Stopped => "Listener stopped".to_string(),
        }
    }
}

/// A bound, not yet running listener.
#[derive(Debug)]
pub struct Listener {
    socket: TcpListener,
    addr: SocketAddr,
    config: ListenerConfig,
    tx: Sender<ListenerEvent>,
    rx: Receiver<ListenerEvent>,
}

impl Listener {
    /// Bind the configured address.
    pub fn bind(config: ListenerConfig) -> Result<Self, TransportError> {
        let socket = TcpListener::bind(config.addr).map_err(|source| TransportError::Bind {
            addr: config.addr,
            source,
        })?;
        socket.set_nonblocking(true)?;
        let addr = socket.local_addr()?;
        let (tx, rx) = unbounded();

        Ok(Self {
            socket,
            addr,
            config,
            tx,
            rx,
        })
    }

    /// The actually bound address (resolves port 0).
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Receiving end of the event channel.
    ///
    /// The channel is multi-consumer: every clone competes for the same
    /// events, so hand it to exactly one consumer.
    #[must_use]
    pub fn events(&self) -> Receiver<ListenerEvent> {
        self.rx.clone()
    }

    /// Spawn the accept loop.
    pub fn start(self) -> Result<ListenerHandle, TransportError> {
        let running = Arc::new(AtomicBool::new(true));
        let Self {
            socket,
            addr,
            config,
            tx,
            rx,
        } = self;

        let thread_running = Arc::clone(&running);
        let accept = thread::Builder::new()
            .name("plottr-listener".to_string())
            .spawn(move || accept_loop(socket, addr, config, thread_running, tx))?;

        Ok(ListenerHandle {
            addr,
            running,
            events: rx,
            accept: Some(accept),
        })
    }
}

/// Handle to a running listener. Dropping it stops the listener.
#[derive(Debug)]
pub struct ListenerHandle {
    addr: SocketAddr,
    running: Arc<AtomicBool>,
    events: Receiver<ListenerEvent>,
    accept: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    /// The bound address.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Receiving end of the event channel; see [`Listener::events`].
    #[must_use]
    pub fn events(&self) -> Receiver<ListenerEvent> {
        self.events.clone()
    }

    /// False once `stop` was requested.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Request loop exit and wait for every listener thread to finish.
    ///
    /// Idempotent. Returns after `Stopped` has been published.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.accept.take() {
            if handle.join().is_err() {
                warn!("listener thread panicked");
            }
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(
    socket: TcpListener,
    addr: SocketAddr,
    config: ListenerConfig,
    running: Arc<AtomicBool>,
    tx: Sender<ListenerEvent>,
) {
    info!(%addr, "listening");
    let _ = tx.send(ListenerEvent::Listening { addr });

    let mut readers: Vec<JoinHandle<()>> = Vec::new();

    while running.load(Ordering::Acquire) {
        match socket.accept() {
            Ok((stream, peer)) => {
                let reader_running = Arc::clone(&running);
                let reader_tx = tx.clone();
                let reader_cfg = config.clone();
                let spawned = thread::Builder::new()
                    .name(format!("plottr-reader-{peer}"))
                    .spawn(move || connection::serve(stream, peer, &reader_cfg, &reader_running, &reader_tx));
                match spawned {
                    Ok(handle) => readers.push(handle),
                    Err(e) => warn!(%peer, error = %e, "failed to spawn reader thread; connection dropped"),
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                readers.retain(|h| !h.is_finished());
                thread::sleep(config.poll_interval);
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
                thread::sleep(config.poll_interval);
            }
        }
    }

    for handle in readers {
        if handle.join().is_err() {
            warn!("reader thread panicked");
        }
    }

    info!(%addr, "listener stopped");
    let _ = tx.send(ListenerEvent::Stopped);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_documented_port() {
        let cfg = ListenerConfig::default();
        assert_eq!(cfg.addr.port(), DEFAULT_PORT);
        assert!(cfg.addr.ip().is_loopback());
    }

    #[test]
    fn parse_addr_accepts_port_or_socket_addr() {
        assert_eq!(parse_addr("6000").unwrap(), "127.0.0.1:6000".parse::<SocketAddr>().unwrap());
        assert_eq!(parse_addr(" 0.0.0.0:7000 ").unwrap(), "0.0.0.0:7000".parse::<SocketAddr>().unwrap());
        assert!(matches!(
            parse_addr("localhost:x").unwrap_err(),
            TransportError::InvalidAddress { .. }
        ));
    }

    #[test]
    fn bind_resolves_ephemeral_port() {
        let listener = Listener::bind(ListenerConfig {
            addr: "127.0.0.1:0".parse().unwrap(),
            ..ListenerConfig::default()
        })
        .unwrap();
        assert_ne!(listener.local_addr().port(), 0);
    }

    #[test]
    fn stop_publishes_listening_then_stopped() {
        let listener = Listener::bind(ListenerConfig {
            addr: "127.0.0.1:0".parse().unwrap(),
            poll_interval: Duration::from_millis(5),
            ..ListenerConfig::default()
        })
        .unwrap();
        let events = listener.events();
        let mut handle = listener.start().unwrap();
        assert!(handle.is_running());

        handle.stop();
        assert!(!handle.is_running());

        let seen: Vec<ListenerEvent> = events.try_iter().collect();
        assert!(matches!(seen.first(), Some(ListenerEvent::Listening { .. })));
        assert_eq!(seen.last(), Some(&ListenerEvent::Stopped));
    }

    #[test]
    fn describe_mentions_dataset() {
        let event = ListenerEvent::DataAvailable {
            dataset_id: "rabi".to_string(),
            message: WireMessage::new("rabi"),
            received_at: Utc::now(),
        };
        assert_eq!(event.describe(), "Received data for dataset: rabi");
    }
}
