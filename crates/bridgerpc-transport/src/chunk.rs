//! Chunk splitting and reassembly for oversized envelopes
//!
//! A sender whose encoded envelope exceeds the bridge ceiling splits the payload
//! with [`split_envelope`]; every piece carries the original correlation data
//! plus a [`ChunkInfo`]. The receiver feeds every inbound envelope through a
//! [`ChunkAssembler`], which passes unchunked envelopes straight through and
//! buffers chunks until their set is complete.
//!
//! Buffers are bounded three ways: by age, by the number of partial sets and by
//! total buffered bytes. Completed, corrupted and evicted set IDs are remembered
//! for one reassembly window so that stragglers are dropped quietly.

use crate::{ChunkInfo, Codec, CodecError, RpcEnvelope};
use bridgerpc_core::{ChannelConfig, protocol};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Split a payload into pieces of at most `chunk_size` bytes.
///
/// An empty payload, or a zero chunk size, yields the payload as one piece.
pub fn split_payload(payload: &[u8], chunk_size: usize) -> Vec<&[u8]> {
    if payload.is_empty() || chunk_size == 0 {
        return vec![payload];
    }
    payload.chunks(chunk_size).collect()
}

/// Split an envelope into one chunk envelope per payload piece, in index order.
///
/// Every chunk repeats the request ID, method and direction of `envelope` and
/// carries `chunk_set_id`, which the caller allocates fresh for each send.
pub fn split_envelope(
    envelope: &RpcEnvelope,
    chunk_size: usize,
    chunk_set_id: &str,
) -> Vec<RpcEnvelope> {
    let pieces = split_payload(envelope.payload(), chunk_size);
    let total_chunks = u32::try_from(pieces.len()).unwrap_or(u32::MAX);
    let original_size = envelope.payload().len() as u64;

    pieces
        .into_iter()
        .zip(0u32..)
        .map(|(piece, chunk_index)| {
            let info = ChunkInfo {
                chunk_set_id: chunk_set_id.to_string(),
                chunk_index,
                total_chunks,
                original_size,
            };
            envelope.chunk(info, piece.to_vec())
        })
        .collect()
}

/// Largest chunk payload that keeps every chunk of `envelope` within `max_frame`
///
/// Measured on a chunk carrying no payload and the widest possible indices,
/// so long method strings shrink the chunks instead of overflowing the frame.
/// The result is capped at `chunk_size` and stays a multiple of 3, so the
/// base64 text of a chunk never needs padding beyond its last piece.
pub fn chunk_size_within<C: Codec + ?Sized>(
    codec: &C,
    envelope: &RpcEnvelope,
    chunk_set_id: &str,
    chunk_size: usize,
    max_frame: usize,
) -> Result<usize, CodecError> {
    let widest = envelope.chunk(
        ChunkInfo {
            chunk_set_id: chunk_set_id.to_string(),
            chunk_index: u32::MAX,
            total_chunks: u32::MAX,
            original_size: envelope.payload().len() as u64,
        },
        Vec::new(),
    );
    let header = codec.encode(&widest)?.len();
    let size = (max_frame.saturating_sub(header) / 4 * 3).min(chunk_size / 3 * 3);
    if size == 0 {
        return Err(CodecError::Encode(format!(
            "method {} leaves no room for a chunk payload within {max_frame} bytes",
            envelope.method()
        )));
    }
    Ok(size)
}

/// Bounds applied to incomplete chunk sets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReassemblyLimits {
    /// Age after which a partial set is evicted
    pub timeout: Duration,
    /// Maximum number of partial sets
    pub max_chunk_sets: usize,
    /// Maximum bytes buffered across partial sets
    pub max_bytes: usize,
}

impl ReassemblyLimits {
    /// Limits taken from a channel configuration
    pub fn from_config(config: &ChannelConfig) -> Self {
        Self {
            timeout: config.reassembly_timeout(),
            max_chunk_sets: config.max_chunk_sets.max(1),
            max_bytes: config.max_reassembly_bytes,
        }
    }
}

impl Default for ReassemblyLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(protocol::DEFAULT_REASSEMBLY_TIMEOUT_MS),
            max_chunk_sets: protocol::DEFAULT_MAX_CHUNK_SETS,
            max_bytes: protocol::DEFAULT_MAX_REASSEMBLY_BYTES,
        }
    }
}

/// Result of feeding one envelope to a [`ChunkAssembler`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// A complete logical envelope, ready to dispatch or resolve
    Complete(RpcEnvelope),

    /// The chunk was stored; its set is still incomplete
    Pending,

    /// The chunk belongs to a set that already finished or was evicted
    Ignored,

    /// The chunk set failed validation and was discarded
    ///
    /// The correlation data is the set's own, taken from its first chunk,
    /// even when a chunk from another call is what broke it.
    Corrupted {
        request_id: String,
        method: String,
        is_request: bool,
        reason: String,
    },
}

struct PartialSet {
    /// Correlation data of the set, payload empty
    header: RpcEnvelope,
    total_chunks: u32,
    original_size: u64,
    pieces: BTreeMap<u32, Vec<u8>>,
    bytes: usize,
    started: Instant,
}

impl PartialSet {
    fn new(envelope: &RpcEnvelope, info: &ChunkInfo, now: Instant) -> Self {
        Self {
            header: envelope.reassembled(Vec::new()),
            total_chunks: info.total_chunks,
            original_size: info.original_size,
            pieces: BTreeMap::new(),
            bytes: 0,
            started: now,
        }
    }

    fn check_membership(&self, envelope: &RpcEnvelope, info: &ChunkInfo) -> Result<(), String> {
        if info.total_chunks != self.total_chunks || info.original_size != self.original_size {
            return Err(format!(
                "chunk {} disagrees on set shape ({} chunks/{} bytes, expected {}/{})",
                info.chunk_index,
                info.total_chunks,
                info.original_size,
                self.total_chunks,
                self.original_size
            ));
        }
        if envelope.request_id() != self.header.request_id()
            || envelope.method() != self.header.method()
            || envelope.is_request() != self.header.is_request()
        {
            return Err(format!(
                "chunk {} disagrees on correlation data",
                info.chunk_index
            ));
        }
        Ok(())
    }
}

/// Reassembles chunk sets received over one channel
pub struct ChunkAssembler {
    limits: ReassemblyLimits,
    sets: HashMap<String, PartialSet>,
    buffered_bytes: usize,
    retired: HashSet<String>,
    retired_order: VecDeque<(String, Instant)>,
}

impl ChunkAssembler {
    /// Create an assembler with the given bounds
    pub fn new(limits: ReassemblyLimits) -> Self {
        Self {
            limits,
            sets: HashMap::new(),
            buffered_bytes: 0,
            retired: HashSet::new(),
            retired_order: VecDeque::new(),
        }
    }

    pub fn limits(&self) -> &ReassemblyLimits {
        &self.limits
    }

    /// Number of incomplete chunk sets currently buffered
    pub fn pending_sets(&self) -> usize {
        self.sets.len()
    }

    /// Bytes currently buffered across incomplete chunk sets
    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes
    }

    /// Feed one inbound envelope
    pub fn accept(&mut self, envelope: RpcEnvelope) -> ChunkOutcome {
        self.accept_at(envelope, Instant::now())
    }

    /// Feed one inbound envelope, using `now` as the current time
    pub fn accept_at(&mut self, envelope: RpcEnvelope, now: Instant) -> ChunkOutcome {
        let Some(info) = envelope.chunk_info().cloned() else {
            return ChunkOutcome::Complete(envelope);
        };

        self.sweep_at(now);

        if self.retired.contains(&info.chunk_set_id) {
            debug!(
                chunk_set_id = %info.chunk_set_id,
                chunk_index = info.chunk_index,
                "ignoring chunk for a finished chunk set"
            );
            return ChunkOutcome::Ignored;
        }

        match self.store(&envelope, &info, now) {
            Ok(true) => self.complete(&info.chunk_set_id, now),
            Ok(false) => ChunkOutcome::Pending,
            Err(reason) => self.corrupt(&envelope, &info.chunk_set_id, reason, now),
        }
    }

    /// Evict partial sets older than the reassembly timeout
    ///
    /// Returns the IDs of the evicted sets.
    pub fn sweep(&mut self) -> Vec<String> {
        self.sweep_at(Instant::now())
    }

    /// [`ChunkAssembler::sweep`] with an explicit current time
    pub fn sweep_at(&mut self, now: Instant) -> Vec<String> {
        let expired: Vec<String> = self
            .sets
            .iter()
            .filter(|(_, set)| now.saturating_duration_since(set.started) >= self.limits.timeout)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            if let Some(set) = self.remove_set(id) {
                warn!(
                    chunk_set_id = %id,
                    request_id = %set.header.request_id(),
                    received = set.pieces.len(),
                    total = set.total_chunks,
                    "evicting incomplete chunk set after reassembly timeout"
                );
            }
            self.retire(id, now);
        }

        self.prune_retired(now);
        expired
    }

    /// Store the chunk; `Ok(true)` once its set has every index
    fn store(
        &mut self,
        envelope: &RpcEnvelope,
        info: &ChunkInfo,
        now: Instant,
    ) -> Result<bool, String> {
        check_shape(info, self.limits.max_bytes)?;
        let piece = envelope.payload();

        if let Some(set) = self.sets.get(&info.chunk_set_id) {
            set.check_membership(envelope, info)?;
            match set.pieces.get(&info.chunk_index) {
                Some(existing) if existing.as_slice() == piece => {
                    debug!(
                        chunk_set_id = %info.chunk_set_id,
                        chunk_index = info.chunk_index,
                        "ignoring duplicate chunk"
                    );
                    return Ok(false);
                }
                Some(_) => {
                    return Err(format!(
                        "chunk {} arrived twice with different content",
                        info.chunk_index
                    ));
                }
                None => {}
            }
            if (set.bytes + piece.len()) as u64 > set.original_size {
                return Err(format!(
                    "chunks exceed the declared size of {} bytes",
                    set.original_size
                ));
            }
        } else {
            while self.sets.len() >= self.limits.max_chunk_sets {
                if !self.evict_oldest(None, now) {
                    break;
                }
            }
            self.sets.insert(
                info.chunk_set_id.clone(),
                PartialSet::new(envelope, info, now),
            );
            if piece.len() as u64 > info.original_size {
                return Err(format!(
                    "chunks exceed the declared size of {} bytes",
                    info.original_size
                ));
            }
        }

        while self.buffered_bytes + piece.len() > self.limits.max_bytes {
            if !self.evict_oldest(Some(info.chunk_set_id.as_str()), now) {
                return Err("reassembly byte budget exhausted".to_string());
            }
        }

        let set = self
            .sets
            .get_mut(&info.chunk_set_id)
            .ok_or_else(|| "chunk set vanished during reassembly".to_string())?;
        set.pieces.insert(info.chunk_index, piece.to_vec());
        set.bytes += piece.len();
        self.buffered_bytes += piece.len();

        Ok(set.pieces.len() == set.total_chunks as usize)
    }

    fn complete(&mut self, chunk_set_id: &str, now: Instant) -> ChunkOutcome {
        let Some(set) = self.remove_set(chunk_set_id) else {
            return ChunkOutcome::Ignored;
        };
        self.retire(chunk_set_id, now);

        let mut payload = Vec::with_capacity(set.bytes);
        for piece in set.pieces.values() {
            payload.extend_from_slice(piece);
        }

        if payload.len() as u64 != set.original_size {
            let reason = format!(
                "reassembled {} bytes, expected {}",
                payload.len(),
                set.original_size
            );
            warn!(
                chunk_set_id,
                request_id = %set.header.request_id(),
                %reason,
                "discarding corrupted chunk set"
            );
            return ChunkOutcome::Corrupted {
                request_id: set.header.request_id().to_string(),
                method: set.header.method().to_string(),
                is_request: set.header.is_request(),
                reason,
            };
        }

        debug!(
            chunk_set_id,
            request_id = %set.header.request_id(),
            bytes = payload.len(),
            chunks = set.total_chunks,
            "chunk set reassembled"
        );
        ChunkOutcome::Complete(set.header.reassembled(payload))
    }

    /// Discard the set and report it under its owner's correlation data
    fn corrupt(
        &mut self,
        envelope: &RpcEnvelope,
        chunk_set_id: &str,
        reason: String,
        now: Instant,
    ) -> ChunkOutcome {
        let owner = match self.remove_set(chunk_set_id) {
            Some(set) => set.header,
            None => envelope.reassembled(Vec::new()),
        };
        self.retire(chunk_set_id, now);
        if owner.request_id() != envelope.request_id() {
            warn!(
                chunk_set_id,
                request_id = %envelope.request_id(),
                "dropping chunk that collides with another call's chunk set"
            );
        }
        warn!(
            chunk_set_id,
            request_id = %owner.request_id(),
            method = %owner.method(),
            %reason,
            "discarding corrupted chunk set"
        );
        ChunkOutcome::Corrupted {
            request_id: owner.request_id().to_string(),
            method: owner.method().to_string(),
            is_request: owner.is_request(),
            reason,
        }
    }

    /// Evict the oldest partial set other than `keep`; false when none is left
    fn evict_oldest(&mut self, keep: Option<&str>, now: Instant) -> bool {
        let oldest = self
            .sets
            .iter()
            .filter(|(id, _)| Some(id.as_str()) != keep)
            .min_by_key(|(_, set)| set.started)
            .map(|(id, _)| id.clone());

        let Some(id) = oldest else {
            return false;
        };
        if let Some(set) = self.remove_set(&id) {
            warn!(
                chunk_set_id = %id,
                request_id = %set.header.request_id(),
                buffered_bytes = self.buffered_bytes,
                "evicting chunk set to stay within reassembly limits"
            );
        }
        self.retire(&id, now);
        true
    }

    fn remove_set(&mut self, chunk_set_id: &str) -> Option<PartialSet> {
        let set = self.sets.remove(chunk_set_id)?;
        self.buffered_bytes = self.buffered_bytes.saturating_sub(set.bytes);
        Some(set)
    }

    fn retire(&mut self, chunk_set_id: &str, now: Instant) {
        if self.retired.insert(chunk_set_id.to_string()) {
            self.retired_order.push_back((chunk_set_id.to_string(), now));
        }
        let cap = self.limits.max_chunk_sets.saturating_mul(protocol::RETIRED_PER_CHUNK_SET);
        while self.retired_order.len() > cap {
            if let Some((id, _)) = self.retired_order.pop_front() {
                self.retired.remove(&id);
            }
        }
    }

    fn prune_retired(&mut self, now: Instant) {
        while let Some((id, at)) = self.retired_order.front() {
            if now.saturating_duration_since(*at) < self.limits.timeout {
                break;
            }
            self.retired.remove(id);
            self.retired_order.pop_front();
        }
    }
}

impl Default for ChunkAssembler {
    fn default() -> Self {
        Self::new(ReassemblyLimits::default())
    }
}

/// Reject chunk metadata that cannot describe a valid set
fn check_shape(info: &ChunkInfo, max_bytes: usize) -> Result<(), String> {
    if info.total_chunks == 0 {
        return Err("chunk set declares zero chunks".to_string());
    }
    if info.chunk_index >= info.total_chunks {
        return Err(format!(
            "chunk index {} is outside 0..{}",
            info.chunk_index, info.total_chunks
        ));
    }
    if info.original_size > max_bytes as u64 {
        return Err(format!(
            "declared size {} exceeds the reassembly budget of {} bytes",
            info.original_size, max_bytes
        ));
    }
    if u64::from(info.total_chunks) > info.original_size.max(1) {
        return Err(format!(
            "{} chunks cannot carry {} bytes",
            info.total_chunks, info.original_size
        ));
    }
    Ok(())
}
