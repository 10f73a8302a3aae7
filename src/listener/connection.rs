//! Per-producer reader.

use std::io::{ErrorKind, Read};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use crossbeam_channel::Sender;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::wire::frame::FrameReader;
use crate::wire;

use super::{ListenerConfig, ListenerEvent};

const READ_CHUNK_BYTES: usize = 64 * 1024;

/// Read frames from one producer until it disconnects or the listener stops.
pub(super) fn serve(
    mut stream: TcpStream,
    peer: SocketAddr,
    config: &ListenerConfig,
    running: &AtomicBool,
    tx: &Sender<ListenerEvent>,
) {
    // Accepted sockets inherit non-blocking mode on some platforms.
    if let Err(e) = stream
        .set_nonblocking(false)
        .and_then(|()| stream.set_read_timeout(Some(config.poll_interval)))
    {
        warn!(%peer, error = %e, "failed to configure producer socket");
        return;
    }

    info!(%peer, "producer connected");
    let _ = tx.send(ListenerEvent::ProducerConnected { peer });

    let mut frames = FrameReader::new(config.max_frame_bytes);
    let mut chunk = vec![0u8; READ_CHUNK_BYTES];

    'read: while running.load(Ordering::Acquire) {
        let n = match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted) => {
                continue;
            }
            Err(e) => {
                warn!(%peer, error = %e, "producer read failed");
                break;
            }
        };

        frames.push(&chunk[..n]);
        loop {
            match frames.next_frame() {
                Ok(Some(payload)) => dispatch(&payload, peer, tx),
                Ok(None) => break,
                Err(e) => {
                    // Framing is lost; nothing after this point can be trusted.
                    warn!(%peer, error = %e, "closing producer connection");
                    let _ = tx.send(ListenerEvent::DecodeFailed {
                        peer,
                        error: e.to_string(),
                    });
                    break 'read;
                }
            }
        }
    }

    info!(%peer, "producer disconnected");
    let _ = tx.send(ListenerEvent::ProducerDisconnected { peer });
}

fn dispatch(payload: &[u8], peer: SocketAddr, tx: &Sender<ListenerEvent>) {
    debug!(%peer, bytes = payload.len(), "frame received");

    let event = match wire::decode(payload) {
        Ok(message) => {
            info!(%peer, dataset_id = %message.id, update = message.update, "received data");
            ListenerEvent::DataAvailable {
                dataset_id: message.id.clone(),
                message,
                received_at: Utc::now(),
            }
        }
        Err(TransportError::MissingIdentifier) => {
            warn!(%peer, "received invalid data (no ID)");
            ListenerEvent::MissingIdentifier { peer }
        }
        Err(e) => {
            warn!(%peer, error = %e, "received invalid data");
            ListenerEvent::DecodeFailed {
                peer,
                error: e.to_string(),
            }
        }
    };

    let _ = tx.send(event);
}
