//! Producer-side helpers.
//!
//! [`MessageBuilder`] assembles a [`WireMessage`] and validates it with the
//! same structuring rules the receiver applies, so a producer finds schema
//! mistakes before sending. [`DataSender`] pushes framed messages to a
//! listener.

use std::collections::BTreeMap;
use std::io::Write;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};

use tracing::debug;

use crate::error::{SchemaError, TransportError};
use crate::scalar::Scalar;
use crate::structure::structure_arrays;
use crate::wire::frame::write_frame;
use crate::wire::{self, ArrayDescriptor, WireMessage};

/// Builder for producer messages.
///
/// # Example
/// ```rust,ignore
/// let message = MessageBuilder::new("rabi")
///     .update(true)
///     .grid_axes([("time", vec![0.0, 1.0]), ("amp", vec![0.1, 0.2])])
///     .data("signal", [1.0, 0.5, 0.9, 0.4], ["time", "amp"])
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    id: String,
    update: bool,
    arrays: BTreeMap<String, ArrayDescriptor>,
}

impl MessageBuilder {
    /// Start a message for `id`. Defaults to a full reset (`update: false`).
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            update: false,
            arrays: BTreeMap::new(),
        }
    }

    /// Merge into existing data instead of replacing it.
    #[must_use]
    pub fn update(mut self, update: bool) -> Self {
        self.update = update;
        self
    }

    /// Add an axis array. A later array with the same name replaces it.
    #[must_use]
    pub fn axis<V: Into<Scalar>>(mut self, name: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        self.arrays.insert(name.into(), ArrayDescriptor::axis(values));
        self
    }

    /// Add a data array indexed by `axes`.
    #[must_use]
    pub fn data<V: Into<Scalar>, A: Into<String>>(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
        axes: impl IntoIterator<Item = A>,
    ) -> Self {
        self.arrays.insert(name.into(), ArrayDescriptor::data(values, axes));
        self
    }

    /// Add axis arrays spanning the full Cartesian product of the given
    /// coordinate lists, row-major (the last axis varies fastest).
    #[must_use]
    pub fn grid_axes<N, V>(mut self, axes: impl IntoIterator<Item = (N, Vec<V>)>) -> Self
    where
        N: Into<String>,
        V: Into<Scalar>,
    {
        let axes: Vec<(String, Vec<Scalar>)> = axes
            .into_iter()
            .map(|(name, values)| (name.into(), values.into_iter().map(Into::into).collect()))
            .collect();
        let total: usize = axes.iter().map(|(_, values)| values.len()).product();

        let mut stride = total;
        for (name, values) in axes {
            let len = values.len();
            let mut flat = Vec::with_capacity(total);
            if len > 0 {
                stride /= len;
                for i in 0..total {
                    flat.push(values[(i / stride) % len].clone());
                }
            }
            self.arrays.insert(name, ArrayDescriptor::Axis { values: flat });
        }
        self
    }

    /// Validate and produce the message.
    ///
    /// # Errors
    /// The first `SchemaError` the receiver would report for these arrays.
    pub fn build(self) -> Result<WireMessage, SchemaError> {
        structure_arrays(&self.arrays)?;
        Ok(WireMessage {
            id: self.id,
            update: self.update,
            datasets: if self.arrays.is_empty() {
                None
            } else {
                Some(self.arrays)
            },
        })
    }
}

/// A producer connection to a listener.
#[derive(Debug)]
pub struct DataSender {
    stream: TcpStream,
    peer: SocketAddr,
}

impl DataSender {
    /// Connect to a listener.
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        Ok(Self { stream, peer })
    }

    /// Address of the listener this sender is connected to.
    #[must_use]
    pub const fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Encode and send one message.
    pub fn send(&mut self, message: &WireMessage) -> Result<(), TransportError> {
        let payload = wire::encode(message)?;
        debug!(peer = %self.peer, dataset_id = %message.id, bytes = payload.len(), "sending");
        self.send_raw(&payload)
    }

    /// Send an arbitrary payload as one frame.
    pub fn send_raw(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        write_frame(&mut self.stream, payload)?;
        self.stream.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_axes_expand_row_major() {
        let message = MessageBuilder::new("g")
            .grid_axes([("x", vec![0, 1]), ("y", vec![10, 20, 30])])
            .data("v", [1, 2, 3, 4, 5, 6], ["x", "y"])
            .build()
            .unwrap();

        let arrays = message.datasets.unwrap();
        let ints = |name: &str| -> Vec<i64> {
            arrays[name].values().iter().filter_map(Scalar::as_int).collect()
        };
        assert_eq!(ints("x"), vec![0, 0, 0, 1, 1, 1]);
        assert_eq!(ints("y"), vec![10, 20, 30, 10, 20, 30]);
    }

    #[test]
    fn build_rejects_unknown_axis() {
        let err = MessageBuilder::new("bad")
            .data("v", [1.0], ["missing"])
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownAxis { .. }));
    }

    #[test]
    fn empty_builder_has_no_datasets() {
        let message = MessageBuilder::new("empty").update(true).build().unwrap();
        assert!(message.update);
        assert!(message.datasets.is_none());
    }

    #[test]
    fn sender_writes_decodable_frames() {
        use std::io::Read;
        use std::net::TcpListener;

        let socket = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut sender = DataSender::connect(socket.local_addr().unwrap()).unwrap();
        let (mut stream, _) = socket.accept().unwrap();

        let message = MessageBuilder::new("a").axis("x", [1]).data("v", [2.0], ["x"]).build().unwrap();
        sender.send(&message).unwrap();
        drop(sender);

        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).unwrap();
        let mut frames = crate::wire::frame::FrameReader::new(1024);
        frames.push(&bytes);
        let payload = frames.next_frame().unwrap().unwrap();
        assert_eq!(wire::decode(&payload).unwrap(), message);
    }
}
