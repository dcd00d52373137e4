//! Envelope codec.
//!
//! Every message addressed to a server thread, and every steal reply, is one
//! fixed-size little-endian frame:
//!
//! ```text
//! offset  size  field
//!      0     1  message kind
//!      1     1  task kind
//!      2     1  flags (bit 0: insert in front, bit 1: private, bit 2: has target)
//!      3     1  argument count
//!      4     4  home node
//!      8     4  source node
//!     12     4  source worker slot
//!     16     4  work id / broadcast id
//!     20     4  level
//!     24     4  target queue
//!     28     8  in-flight token
//!     36   24×16  arguments: count u32, datatype u8, convention u8, 2 reserved, 8-byte slot
//! ```

use smallvec::SmallVec;
use thiserror::Error;

use crate::runtime::task::{CallConv, Datatype, Descriptor, TaskKind, MAX_ARGS};

const HEADER_SIZE: usize = 36;
const ARG_SIZE: usize = 16;

/// Size of an encoded envelope in bytes.
pub const ENVELOPE_SIZE: usize = HEADER_SIZE + MAX_ARGS * ARG_SIZE;

const FLAG_FRONT: u8 = 0b001;
const FLAG_PRIVATE: u8 = 0b010;
const FLAG_TARGET: u8 = 0b100;

/// Message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    TerminateLocalServer,
    TerminateWorkers,
    StealRequest,
    DisableStealing,
    EnableStealing,
    ResetStatistics,
    Answer,
    NormalEnqueue,
    NoWork,
    Broadcast,
}

impl MessageKind {
    /// Tag used on the wire.
    pub fn as_tag(&self) -> u8 {
        match self {
            MessageKind::TerminateLocalServer => 120,
            MessageKind::TerminateWorkers => 121,
            MessageKind::StealRequest => 123,
            MessageKind::DisableStealing => 124,
            MessageKind::EnableStealing => 125,
            MessageKind::ResetStatistics => 126,
            MessageKind::Answer => 140,
            MessageKind::NormalEnqueue => 141,
            MessageKind::NoWork => 142,
            MessageKind::Broadcast => 145,
        }
    }

    /// Decode a wire tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            120 => Some(MessageKind::TerminateLocalServer),
            121 => Some(MessageKind::TerminateWorkers),
            123 => Some(MessageKind::StealRequest),
            124 => Some(MessageKind::DisableStealing),
            125 => Some(MessageKind::EnableStealing),
            126 => Some(MessageKind::ResetStatistics),
            140 => Some(MessageKind::Answer),
            141 => Some(MessageKind::NormalEnqueue),
            142 => Some(MessageKind::NoWork),
            145 => Some(MessageKind::Broadcast),
            _ => None,
        }
    }
}

/// Codec errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("envelope has {len} bytes, expected {expected}")]
    Truncated { len: usize, expected: usize },

    #[error("unknown message kind {0}")]
    UnknownKind(u8),

    #[error("unknown task kind {0}")]
    UnknownTaskKind(u8),

    #[error("unknown datatype tag {0}")]
    UnknownDatatype(u8),

    #[error("unknown calling convention tag {0}")]
    UnknownConvention(u8),

    #[error("envelope declares {0} arguments")]
    TooManyArguments(u8),
}

/// Argument metadata plus its inline value slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireArg {
    pub count: u32,
    pub dtype: Datatype,
    pub conv: CallConv,
    pub value: [u8; 8],
}

/// Decoded envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub kind: MessageKind,
    pub task_kind: TaskKind,
    pub home: u32,
    pub source: u32,
    pub source_worker: u32,
    pub work: u32,
    pub level: u32,
    pub target_queue: Option<u32>,
    pub insert_in_front: bool,
    pub insert_private: bool,
    pub token: u64,
    pub args: SmallVec<[WireArg; 4]>,
}

impl Envelope {
    /// Control message without a task.
    pub fn control(
        kind: MessageKind,
        node: usize,
        slot: usize,
    ) -> Self {
        Self {
            kind,
            task_kind: TaskKind::Detached,
            home: node as u32,
            source: node as u32,
            source_worker: slot as u32,
            work: 0,
            level: 0,
            target_queue: None,
            insert_in_front: false,
            insert_private: false,
            token: 0,
            args: SmallVec::new(),
        }
    }

    /// Envelope for `desc`, sent by `slot` on `node`.
    ///
    /// Inline values are read from home storage when `node` is the home node
    /// and from the working copies otherwise.
    pub fn describe(
        kind: MessageKind,
        desc: &Descriptor,
        node: usize,
        slot: usize,
    ) -> Self {
        let home = desc.is_home(node);
        let args = desc
            .args
            .iter()
            .map(|arg| {
                let value = if arg.is_inline() {
                    arg.storage(home).inline_bits().to_le_bytes()
                } else {
                    [0u8; 8]
                };
                WireArg {
                    count: arg.count as u32,
                    dtype: arg.dtype,
                    conv: arg.conv,
                    value,
                }
            })
            .collect();

        Self {
            kind,
            task_kind: desc.kind,
            home: desc.home_node as u32,
            source: node as u32,
            source_worker: slot as u32,
            work: desc.work.0,
            level: desc.level,
            target_queue: desc.target_queue.map(|q| q as u32),
            insert_in_front: desc.insert_in_front,
            insert_private: desc.insert_private,
            token: desc.token,
            args,
        }
    }

    /// Encode into a fixed-size frame.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![0u8; ENVELOPE_SIZE];
        let mut flags = 0u8;
        if self.insert_in_front {
            flags |= FLAG_FRONT;
        }
        if self.insert_private {
            flags |= FLAG_PRIVATE;
        }
        if self.target_queue.is_some() {
            flags |= FLAG_TARGET;
        }

        out[0] = self.kind.as_tag();
        out[1] = self.task_kind.as_tag();
        out[2] = flags;
        out[3] = self.args.len() as u8;
        put_u32(&mut out, 4, self.home);
        put_u32(&mut out, 8, self.source);
        put_u32(&mut out, 12, self.source_worker);
        put_u32(&mut out, 16, self.work);
        put_u32(&mut out, 20, self.level);
        put_u32(&mut out, 24, self.target_queue.unwrap_or(0));
        out[28..36].copy_from_slice(&self.token.to_le_bytes());

        for (i, arg) in self.args.iter().take(MAX_ARGS).enumerate() {
            let at = HEADER_SIZE + i * ARG_SIZE;
            put_u32(&mut out, at, arg.count);
            out[at + 4] = arg.dtype.as_tag();
            out[at + 5] = arg.conv.as_tag();
            out[at + 8..at + 16].copy_from_slice(&arg.value);
        }
        out
    }

    /// Decode a frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() != ENVELOPE_SIZE {
            return Err(WireError::Truncated {
                len: bytes.len(),
                expected: ENVELOPE_SIZE,
            });
        }

        let kind = MessageKind::from_tag(bytes[0]).ok_or(WireError::UnknownKind(bytes[0]))?;
        let task_kind =
            TaskKind::from_tag(bytes[1]).ok_or(WireError::UnknownTaskKind(bytes[1]))?;
        let flags = bytes[2];
        let narg = bytes[3];
        if narg as usize > MAX_ARGS {
            return Err(WireError::TooManyArguments(narg));
        }

        let mut args = SmallVec::new();
        for i in 0..narg as usize {
            let at = HEADER_SIZE + i * ARG_SIZE;
            let dtype = Datatype::from_tag(bytes[at + 4])
                .ok_or(WireError::UnknownDatatype(bytes[at + 4]))?;
            let conv = CallConv::from_tag(bytes[at + 5])
                .ok_or(WireError::UnknownConvention(bytes[at + 5]))?;
            let mut value = [0u8; 8];
            value.copy_from_slice(&bytes[at + 8..at + 16]);
            args.push(WireArg {
                count: get_u32(bytes, at),
                dtype,
                conv,
                value,
            });
        }

        let mut token = [0u8; 8];
        token.copy_from_slice(&bytes[28..36]);

        Ok(Self {
            kind,
            task_kind,
            home: get_u32(bytes, 4),
            source: get_u32(bytes, 8),
            source_worker: get_u32(bytes, 12),
            work: get_u32(bytes, 16),
            level: get_u32(bytes, 20),
            target_queue: (flags & FLAG_TARGET != 0).then(|| get_u32(bytes, 24)),
            insert_in_front: flags & FLAG_FRONT != 0,
            insert_private: flags & FLAG_PRIVATE != 0,
            token: u64::from_le_bytes(token),
            args,
        })
    }
}

#[inline]
fn put_u32(
    out: &mut [u8],
    at: usize,
    value: u32,
) {
    out[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

#[inline]
fn get_u32(
    bytes: &[u8],
    at: usize,
) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(raw)
}
