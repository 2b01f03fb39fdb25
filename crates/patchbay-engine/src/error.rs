//! Engine error types.

use patchbay_dsp::ChainError;
use patchbay_sync::{ModelError, ObjectId, SyncError};
use thiserror::Error;

/// Malformed object construction arguments.
///
/// The object is not created; the engine substitutes an `errorbox`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArgumentError {
    /// A channel route is neither a number nor an `a:b` range.
    #[error("audio interface wrong arguments")]
    ChannelRoute,

    /// A channel number is zero or negative.
    #[error("audio interface null or negative channel")]
    NonPositiveChannel,

    /// A channel number or route count is above the supported maximum.
    #[error("audio interface supports at most {max} channels")]
    TooManyChannels {
        /// Highest accepted channel number.
        max: usize,
    },

    /// A number was expected.
    #[error("argument {index}: expected a number, got {got}")]
    NotANumber {
        /// Zero-based argument position.
        index: usize,
        /// The offending text.
        got: String,
    },

    /// More arguments than the class accepts.
    #[error("expected at most {max} arguments, got {got}")]
    TooMany {
        /// Accepted count.
        max: usize,
        /// Given count.
        got: usize,
    },
}

/// Errors raised by the registry, the patcher and the instance.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The box text is empty.
    #[error("empty object box")]
    EmptyText,

    /// No class with this name is registered.
    #[error("{0}: no such object")]
    UnknownClass(String),

    /// A class with this name is already registered.
    #[error("{0}: already registered")]
    DuplicateClass(String),

    /// The class rejected its arguments.
    #[error("{class}: {source}")]
    Argument {
        /// Class name.
        class: String,
        /// Why the arguments were rejected.
        #[source]
        source: ArgumentError,
    },

    /// The object does not exist in the patch.
    #[error("object {0} not found")]
    ObjectNotFound(ObjectId),

    /// The inlet index is past the object's inlets.
    #[error("object {id}: inlet {inlet} out of range ({count} inlets)")]
    InletOutOfRange {
        /// Object id.
        id: ObjectId,
        /// Requested inlet.
        inlet: usize,
        /// Number of inlets.
        count: usize,
    },

    /// Building or installing the DSP chain failed.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// The document manager refused the request.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// A document edit failed.
    #[error(transparent)]
    Model(#[from] ModelError),
}
