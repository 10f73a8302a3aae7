//! Error types for plottr.
//!
//! All errors in plottr are strongly typed using thiserror.
//! Schema errors describe structurally inconsistent dataset descriptions,
//! transport errors describe problems at the socket/payload boundary.

use std::net::SocketAddr;

use thiserror::Error;

/// Structural errors in a dataset description.
///
/// Raised by structuring and merging. A message that fails with a schema
/// error is rejected as a whole and leaves the registry untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A data array references an axis name absent from the message.
    #[error("Array '{array}' references unknown axis '{axis}'")]
    UnknownAxis {
        /// Data array name.
        array: String,
        /// Missing axis name.
        axis: String,
    },

    /// A data array references another data array as an axis.
    #[error("Array '{array}' references '{axis}', which is a data array, not an axis")]
    NotAnAxis {
        /// Data array name.
        array: String,
        /// Referenced data array name.
        axis: String,
    },

    /// Referenced axis arrays have unequal lengths.
    #[error("Axes of array '{array}' have unequal lengths: '{axis}' has {actual} values, expected {expected}")]
    AxisLengthMismatch {
        /// Data array name.
        array: String,
        /// First axis whose length differs.
        axis: String,
        /// Length of the first referenced axis.
        expected: usize,
        /// Length of `axis`.
        actual: usize,
    },

    /// The value sequence disagrees with the referenced axes' length.
    #[error("Array '{array}' has {actual} values but its axes have {expected}")]
    ValueLengthMismatch {
        /// Data array name.
        array: String,
        /// Axis length.
        expected: usize,
        /// Value count.
        actual: usize,
    },

    /// A data array with `axes: []`.
    #[error("Array '{array}' declares an empty axis list")]
    EmptyAxisList {
        /// Data array name.
        array: String,
    },

    /// The same axis is referenced twice.
    #[error("Array '{array}' references axis '{axis}' more than once")]
    DuplicateAxis {
        /// Data array name.
        array: String,
        /// Repeated axis name.
        axis: String,
    },

    /// Merge-time conflict: the axis sequence differs from the stored one.
    #[error("Axis order conflict for '{array}': existing {existing:?}, incoming {incoming:?}")]
    AxisMismatch {
        /// Data array name.
        array: String,
        /// Stored axis order.
        existing: Vec<String>,
        /// Incoming axis order.
        incoming: Vec<String>,
    },

    /// The dense grid over the axis levels would exceed the cell limit.
    #[error("Dense grid for '{array}' would exceed {max_cells} cells")]
    GridTooLarge {
        /// Data array name.
        array: String,
        /// Cell limit in effect.
        max_cells: usize,
    },
}

impl SchemaError {
    /// Name of the array the error refers to.
    #[must_use]
    pub fn array(&self) -> &str {
        match self {
            Self::UnknownAxis { array, .. }
            | Self::NotAnAxis { array, .. }
            | Self::AxisLengthMismatch { array, .. }
            | Self::ValueLengthMismatch { array, .. }
            | Self::EmptyAxisList { array }
            | Self::DuplicateAxis { array, .. }
            | Self::AxisMismatch { array, .. }
            | Self::GridTooLarge { array, .. } => array,
        }
    }

    /// Returns true for merge-time axis-order conflicts.
    #[must_use]
    pub const fn is_axis_mismatch(&self) -> bool {
        matches!(self, Self::AxisMismatch { .. })
    }
}

/// Errors at the transport boundary.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The payload is not a well-formed message.
    #[error("Malformed payload: {message}")]
    Decode {
        /// Decoder diagnostic.
        message: String,
    },

    /// Well-formed payload without `id`.
    #[error("Payload has no dataset identifier ('id')")]
    MissingIdentifier,

    /// A frame header announced more bytes than allowed.
    #[error("Frame of {size} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge {
        /// Announced payload size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The listen socket could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An address string that is neither a port nor `host:port`.
    #[error("Invalid listen address '{value}'")]
    InvalidAddress {
        /// Offending input.
        value: String,
    },

    /// Socket or thread I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The other end of a channel went away.
    #[error("Channel disconnected: {path}")]
    Disconnected {
        /// Which channel.
        path: String,
    },
}

impl TransportError {
    /// Creates a decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Returns true if the error only affects a single payload and the
    /// connection can keep receiving.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Decode { .. } | Self::MissingIdentifier)
    }
}

/// Top-level error type for plottr.
#[derive(Debug, Error)]
pub enum PlottrError {
    /// See [`SchemaError`].
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// See [`TransportError`].
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Broken internal state, e.g. a poisoned lock.
    #[error("Internal error: {message}")]
    Internal {
        /// What went wrong.
        message: String,
    },
}

impl PlottrError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a schema error.
    #[must_use]
    pub const fn is_schema(&self) -> bool {
        matches!(self, Self::Schema(_))
    }

    /// Returns true if this is a transport error.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

/// Result type alias for plottr operations.
pub type PlottrResult<T> = Result<T, PlottrError>;
