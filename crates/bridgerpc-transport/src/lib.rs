//! bridgerpc-transport - Envelope framing, JSON codec and chunked reassembly
//!
//! This crate provides:
//! - [`RpcEnvelope`] and [`ChunkInfo`] for message framing
//! - [`Codec`] trait and [`JsonCodec`] for the text wire format
//! - [`split_envelope`] and [`ChunkAssembler`] for oversized payloads

mod chunk;
mod codec;
mod envelope;

pub use chunk::{
    ChunkAssembler, ChunkOutcome, ReassemblyLimits, chunk_size_within, split_envelope, split_payload,
};
pub use codec::{Codec, CodecError, JsonCodec};
pub use envelope::{ChunkInfo, RpcEnvelope};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        ChunkAssembler, ChunkInfo, ChunkOutcome, Codec, CodecError, JsonCodec, ReassemblyLimits,
        RpcEnvelope, chunk_size_within, split_envelope,
    };
}
