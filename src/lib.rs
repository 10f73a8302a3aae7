//! # plottr - structured dataset ingestion
//!
//! plottr receives labeled numerical datasets that producer processes push
//! over a socket and incrementally builds, per dataset identifier, an
//! axis-indexed multi-dimensional representation ready for selection,
//! slicing and plotting.
//!
//! ## Pipeline
//!
//! - **Listener**: accepts producer connections, decodes framed JSON
//!   messages and publishes [`ListenerEvent`]s. Never touches the registry.
//! - **Ingestor**: the single writer; drains events in FIFO order and
//!   applies them to the registry.
//! - **Structuring**: turns flat named arrays into [`StructuredDataset`]s
//!   keyed by coordinate tuple.
//! - **Merge**: folds updates into existing datasets, last write wins.
//! - **Registry**: owns every dataset, publishes a [`RegistryChange`] per
//!   successful apply and serves read-only snapshots.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use plottr::{Ingestor, Listener, ListenerConfig, SharedRegistry};
//!
//! let registry = SharedRegistry::default();
//! let listener = Listener::bind(ListenerConfig::default())?;
//! let ingestor = Ingestor::spawn(listener.events(), registry.clone())?;
//! let changes = registry.subscribe();
//! let handle = listener.start()?;
//!
//! let change = changes.recv()?;
//! let signal = registry.get_structured_dataset(&change.dataset_id, "signal")?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod error;
pub mod ingest;
pub mod listener;
pub mod merge;
pub mod registry;
pub mod roles;
pub mod scalar;
pub mod structure;
pub mod wire;

pub use client::{DataSender, MessageBuilder};
pub use error::{PlottrError, PlottrResult, SchemaError, TransportError};
pub use ingest::{IngestCounts, Ingestor};
pub use listener::{Listener, ListenerConfig, ListenerEvent, ListenerHandle};
pub use merge::{merge, MergeStats};
pub use registry::{
    ChangeFeedConfig, ChangeKind, ChangeStream, DatasetRegistry, RegistryChange, RegistryEntry, SharedRegistry,
};
pub use roles::{AxisRole, AxisRoles};
pub use scalar::Scalar;
pub use structure::{structure, ArrayShape, AxisInfo, DenseGrid, StructuredDataset};
pub use wire::{ArrayDescriptor, WireMessage};
