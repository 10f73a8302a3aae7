//! Wire schema for producer messages.
//!
//! A producer sends one JSON document per payload:
//!
//! ```json
//! {
//!   "id": "rabi-scan",
//!   "update": true,
//!   "datasets": {
//!     "time":   { "values": [0, 1, 0, 1] },
//!     "amp":    { "values": [0.1, 0.1, 0.2, 0.2] },
//!     "signal": { "values": [1.0, 0.5, 0.9, 0.4], "axes": ["time", "amp"] }
//!   }
//! }
//! ```
//!
//! Descriptors without `axes` are axis arrays, descriptors with `axes` are
//! data arrays. The distinction is made once, here, and carried as a tagged
//! [`ArrayDescriptor`] from then on.

pub mod frame;

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::TransportError;
use crate::scalar::Scalar;

/// One named array in a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawDescriptor", into = "RawDescriptor")]
pub enum ArrayDescriptor {
    /// Coordinate values along one dimension.
    Axis {
        /// Flat coordinate sequence.
        values: Vec<Scalar>,
    },
    /// Values indexed by the positional zip of the referenced axes.
    Data {
        /// Flat value sequence.
        values: Vec<Scalar>,
        /// Referenced axis names, in coordinate-tuple order.
        axes: Vec<String>,
    },
}

impl ArrayDescriptor {
    /// Creates an axis descriptor.
    pub fn axis<V: Into<Scalar>>(values: impl IntoIterator<Item = V>) -> Self {
        Self::Axis {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a data descriptor.
    pub fn data<V: Into<Scalar>, A: Into<String>>(
        values: impl IntoIterator<Item = V>,
        axes: impl IntoIterator<Item = A>,
    ) -> Self {
        Self::Data {
            values: values.into_iter().map(Into::into).collect(),
            axes: axes.into_iter().map(Into::into).collect(),
        }
    }

    /// The flat value sequence of either variant.
    #[must_use]
    pub fn values(&self) -> &[Scalar] {
        match self {
            Self::Axis { values } | Self::Data { values, .. } => values,
        }
    }

    /// Referenced axis names for data arrays.
    #[must_use]
    pub fn axis_names(&self) -> Option<&[String]> {
        match self {
            Self::Axis { .. } => None,
            Self::Data { axes, .. } => Some(axes),
        }
    }

    /// True for axis arrays.
    pub const fn is_axis(&self) -> bool {
        matches!(self, Self::Axis { .. })
    }

    /// True for data arrays.
    pub const fn is_data(&self) -> bool {
        matches!(self, Self::Data { .. })
    }
}

#[derive(Serialize, Deserialize)]
struct RawDescriptor {
    values: Vec<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    axes: Option<Vec<String>>,
}

impl From<RawDescriptor> for ArrayDescriptor {
    fn from(raw: RawDescriptor) -> Self {
        match raw.axes {
            None => Self::Axis { values: raw.values },
            Some(axes) => Self::Data {
                values: raw.values,
                axes,
            },
        }
    }
}

impl From<ArrayDescriptor> for RawDescriptor {
    fn from(desc: ArrayDescriptor) -> Self {
        match desc {
            ArrayDescriptor::Axis { values } => Self { values, axes: None },
            ArrayDescriptor::Data { values, axes } => Self {
                values,
                axes: Some(axes),
            },
        }
    }
}

/// A decoded producer message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    /// Dataset identifier.
    pub id: String,
    /// Merge into the existing dataset instead of replacing it.
    #[serde(default)]
    pub update: bool,
    /// Named arrays; absent means "no structural change".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datasets: Option<BTreeMap<String, ArrayDescriptor>>,
}

impl WireMessage {
    /// Creates a message with no arrays.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            update: false,
            datasets: None,
        }
    }

    /// Names of the data arrays in this message.
    #[must_use]
    pub fn data_array_names(&self) -> Vec<&str> {
        self.datasets
            .iter()
            .flatten()
            .filter(|(_, d)| d.is_data())
            .map(|(n, _)| n.as_str())
            .collect()
    }
}

/// Same fields as `WireMessage`, but tolerant of a missing `id` so the
/// decoder can tell a malformed document from an anonymous one.
#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, deserialize_with = "null_as_false")]
    update: bool,
    #[serde(default)]
    datasets: Option<BTreeMap<String, ArrayDescriptor>>,
}

fn null_as_false<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

/// Decode one JSON payload.
///
/// # Errors
/// - `TransportError::Decode` if the payload is not a well-formed message.
/// - `TransportError::MissingIdentifier` if it is well-formed but has no `id`.
pub fn decode(payload: &[u8]) -> Result<WireMessage, TransportError> {
    let envelope: Envelope = serde_json::from_slice(payload)
        .map_err(|e| TransportError::decode(format!("invalid message JSON: {e}")))?;

    let id = envelope.id.ok_or(TransportError::MissingIdentifier)?;

    Ok(WireMessage {
        id,
        update: envelope.update,
        datasets: envelope.datasets,
    })
}

/// Encode a message as a JSON payload.
pub fn encode(message: &WireMessage) -> Result<Vec<u8>, TransportError> {
    serde_json::to_vec(message).map_err(|e| TransportError::decode(format!("serialize message: {e}")))
}
