//! Task arguments and their marshalling contract.
//!
//! An argument is described at creation time by an [`ArgSpec`]: element count,
//! datatype, calling convention and the value or buffer it refers to.
//! [`marshal`] turns an `ArgSpec` into the [`Argument`] stored in a descriptor,
//! applying the convention rules:
//!
//! | convention  | storage on the home node            | shipped to a remote executor |
//! |-------------|-------------------------------------|------------------------------|
//! | `Copy`      | 4/8 byte scalar inline              | inside the envelope          |
//! | `CopyBlock` | private heap copy                   | as a payload                 |
//! | `Reference` | shared buffer                       | payload in, payload back     |
//! | `Result`    | shared buffer                       | nothing in, payload back     |
//! | `Address`   | shared buffer, read as-is           | payload in                   |
//! | `ByValue`   | scalar stored verbatim              | inside the envelope          |
//!
//! Work functions never see raw addresses; they get a [`TaskArgs`] view that
//! resolves each argument to home storage or to the remote working copy.

use super::buffer::Buffer;
use super::datatype::{from_bytes, to_bytes, Datatype, Element};
use crate::runtime::error::RuntimeError;

/// Maximum number of arguments of a task.
pub const MAX_ARGS: usize = 24;

/// Calling convention of an argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallConv {
    /// In: scalar copied into the descriptor.
    Copy,
    /// In: private heap copy of several elements.
    CopyBlock,
    /// In/out: caller storage, remote writes come back.
    Reference,
    /// Out: only the result travels back.
    Result,
    /// In: caller storage passed as-is.
    Address,
    /// In: scalar stored verbatim, no width check.
    ByValue,
}

impl CallConv {
    /// Tag used on the wire.
    #[inline]
    pub fn as_tag(&self) -> u8 {
        match self {
            CallConv::Copy => 1,
            CallConv::Reference => 2,
            CallConv::Result => 3,
            CallConv::Address => 4,
            CallConv::CopyBlock => 5,
            CallConv::ByValue => 6,
        }
    }

    /// Decode a wire tag.
    #[inline]
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(CallConv::Copy),
            2 => Some(CallConv::Reference),
            3 => Some(CallConv::Result),
            4 => Some(CallConv::Address),
            5 => Some(CallConv::CopyBlock),
            6 => Some(CallConv::ByValue),
            _ => None,
        }
    }
}

/// The value or location bound to an argument.
#[derive(Debug, Clone, Default)]
pub enum ArgValue {
    /// Nothing (zero-count arguments).
    #[default]
    None,
    /// An 8-byte little-endian scalar image.
    Scalar(u64),
    /// An owned byte image.
    Bytes(Vec<u8>),
    /// Caller storage.
    Buffer(Buffer),
}

/// Creation-time description of one argument.
#[derive(Debug, Clone)]
pub struct ArgSpec {
    /// Number of elements.
    pub count: usize,
    /// Element datatype.
    pub dtype: Datatype,
    /// Calling convention.
    pub conv: CallConv,
    /// Bound value or location.
    pub value: ArgValue,
}

impl ArgSpec {
    /// Build from raw parts.
    pub fn new(
        count: usize,
        dtype: Datatype,
        conv: CallConv,
        value: ArgValue,
    ) -> Self {
        Self {
            count,
            dtype,
            conv,
            value,
        }
    }

    /// A scalar passed by copy.
    pub fn copy<T: Element>(value: T) -> Self {
        Self::new(
            1,
            T::DATATYPE,
            CallConv::Copy,
            ArgValue::Bytes(to_bytes(&[value])),
        )
    }

    /// Several elements passed by copy; stored as a private block.
    pub fn copy_slice<T: Element>(values: &[T]) -> Self {
        Self::new(
            values.len(),
            T::DATATYPE,
            CallConv::Copy,
            ArgValue::Bytes(to_bytes(values)),
        )
    }

    /// A scalar stored verbatim in the descriptor.
    pub fn value<T: Element>(value: T) -> Self {
        let mut raw = [0u8; 8];
        value.write_le(&mut raw);
        Self::new(
            1,
            T::DATATYPE,
            CallConv::ByValue,
            ArgValue::Scalar(u64::from_le_bytes(raw)),
        )
    }

    /// In/out access to the whole buffer.
    pub fn reference(buffer: &Buffer) -> Self {
        Self::new(
            buffer.len(),
            buffer.datatype(),
            CallConv::Reference,
            ArgValue::Buffer(buffer.clone()),
        )
    }

    /// Output into the whole buffer.
    pub fn result(buffer: &Buffer) -> Self {
        Self::new(
            buffer.len(),
            buffer.datatype(),
            CallConv::Result,
            ArgValue::Buffer(buffer.clone()),
        )
    }

    /// Read-only access to the whole buffer without copying on the home node.
    pub fn address(buffer: &Buffer) -> Self {
        Self::new(
            buffer.len(),
            buffer.datatype(),
            CallConv::Address,
            ArgValue::Buffer(buffer.clone()),
        )
    }

    /// A zero-count argument: keeps its position, carries no data.
    pub fn empty(
        dtype: Datatype,
        conv: CallConv,
    ) -> Self {
        Self::new(0, dtype, conv, ArgValue::None)
    }
}

/// Storage behind an argument.
#[derive(Debug, Clone, Default)]
pub enum Slot {
    /// No storage.
    #[default]
    Empty,
    /// Scalar image held in the descriptor.
    Inline([u8; 8]),
    /// Owned heap bytes.
    Block(Vec<u8>),
    /// Caller storage.
    Shared(Buffer),
}

impl Slot {
    /// Run `f` over the slot bytes.
    pub fn read<R>(
        &self,
        f: impl FnOnce(&[u8]) -> R,
    ) -> R {
        match self {
            Slot::Empty => f(&[]),
            Slot::Inline(raw) => f(raw),
            Slot::Block(bytes) => f(bytes),
            Slot::Shared(buffer) => buffer.with_bytes(f),
        }
    }

    /// Run `f` over the slot bytes mutably.
    pub fn write<R>(
        &mut self,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> R {
        match self {
            Slot::Empty => f(&mut []),
            Slot::Inline(raw) => f(raw),
            Slot::Block(bytes) => f(bytes),
            Slot::Shared(buffer) => buffer.with_bytes_mut(f),
        }
    }

    /// Inline scalar image, or zero.
    #[inline]
    pub fn inline_bits(&self) -> u64 {
        match self {
            Slot::Inline(raw) => u64::from_le_bytes(*raw),
            _ => 0,
        }
    }

    /// Copy of the first `len` bytes.
    pub fn to_bytes(
        &self,
        len: usize,
    ) -> Vec<u8> {
        self.read(|bytes| bytes[..len.min(bytes.len())].to_vec())
    }
}

/// An argument bound into a descriptor.
#[derive(Debug, Clone)]
pub struct Argument {
    /// Number of elements.
    pub count: usize,
    /// Element datatype.
    pub dtype: Datatype,
    /// Calling convention (after `Copy` → `CopyBlock` reclassification).
    pub conv: CallConv,
    /// Storage on the home node.
    pub local: Slot,
    /// Working copy on a non-home executor.
    pub remote: Slot,
}

impl Argument {
    /// Argument with metadata only.
    pub fn bare(
        count: usize,
        dtype: Datatype,
        conv: CallConv,
    ) -> Self {
        Self {
            count,
            dtype,
            conv,
            local: Slot::Empty,
            remote: Slot::Empty,
        }
    }

    /// Payload size in bytes.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.count * self.dtype.size()
    }

    /// Value travels inside the envelope slot.
    #[inline]
    pub fn is_inline(&self) -> bool {
        self.count == 1 && matches!(self.conv, CallConv::Copy | CallConv::ByValue)
    }

    /// Input bytes must be shipped to a remote executor.
    #[inline]
    pub fn ships_input(&self) -> bool {
        self.count > 0 && !self.is_inline() && self.conv != CallConv::Result
    }

    /// Output bytes must be shipped back to the home node.
    #[inline]
    pub fn ships_output(&self) -> bool {
        self.count > 0 && matches!(self.conv, CallConv::Reference | CallConv::Result)
    }

    /// Storage seen by the executing work function.
    #[inline]
    pub fn storage(
        &self,
        home: bool,
    ) -> &Slot {
        if home {
            &self.local
        } else {
            &self.remote
        }
    }

    /// Mutable storage seen by the executing work function.
    #[inline]
    pub fn storage_mut(
        &mut self,
        home: bool,
    ) -> &mut Slot {
        if home {
            &mut self.local
        } else {
            &mut self.remote
        }
    }
}

fn mismatch(
    index: usize,
    reason: &'static str,
) -> RuntimeError {
    RuntimeError::ArgumentMismatch { index, reason }
}

/// Bind a creation-time `ArgSpec` into descriptor storage.
pub fn marshal(
    index: usize,
    spec: ArgSpec,
) -> Result<Argument, RuntimeError> {
    let ArgSpec {
        count,
        dtype,
        conv,
        value,
    } = spec;

    if count == 0 {
        return Ok(Argument::bare(0, dtype, conv));
    }

    let conv = if conv == CallConv::Copy && count > 1 {
        CallConv::CopyBlock
    } else {
        conv
    };
    let mut arg = Argument::bare(count, dtype, conv);
    let len = arg.byte_len();

    arg.local = match conv {
        CallConv::Copy => {
            let width = dtype.size();
            if width != 4 && width != 8 {
                return Err(RuntimeError::UnsupportedScalarWidth { index, width });
            }
            let mut raw = [0u8; 8];
            match value {
                ArgValue::Scalar(bits) => raw[..width].copy_from_slice(&bits.to_le_bytes()[..width]),
                ArgValue::Bytes(bytes) if bytes.len() >= width => {
                    raw[..width].copy_from_slice(&bytes[..width])
                }
                ArgValue::Buffer(buffer) if buffer.byte_len() >= width => {
                    raw[..width].copy_from_slice(&buffer.snapshot(Some(width)))
                }
                _ => return Err(mismatch(index, "copy argument needs a scalar value")),
            }
            Slot::Inline(raw)
        }
        CallConv::CopyBlock => match value {
            ArgValue::Bytes(mut bytes) if bytes.len() >= len => {
                bytes.truncate(len);
                Slot::Block(bytes)
            }
            ArgValue::Buffer(buffer) if buffer.byte_len() >= len => {
                Slot::Block(buffer.snapshot(Some(len)))
            }
            _ => return Err(mismatch(index, "copy block shorter than its element count")),
        },
        CallConv::Reference | CallConv::Result | CallConv::Address => match value {
            ArgValue::Buffer(buffer) if buffer.byte_len() >= len => Slot::Shared(buffer),
            ArgValue::Buffer(_) => {
                return Err(mismatch(index, "buffer shorter than its element count"))
            }
            _ => return Err(mismatch(index, "argument needs a buffer")),
        },
        // a single element always travels in the envelope slot
        CallConv::ByValue if count == 1 => {
            let mut raw = [0u8; 8];
            match value {
                ArgValue::Scalar(bits) => raw = bits.to_le_bytes(),
                ArgValue::Bytes(bytes) => {
                    let width = bytes.len().min(8);
                    raw[..width].copy_from_slice(&bytes[..width]);
                }
                ArgValue::Buffer(buffer) if buffer.byte_len() >= len => {
                    raw[..len].copy_from_slice(&buffer.snapshot(Some(len)));
                }
                _ => return Err(mismatch(index, "by-value argument needs a value")),
            }
            Slot::Inline(raw)
        }
        CallConv::ByValue => match value {
            ArgValue::Bytes(mut bytes) if bytes.len() >= len => {
                bytes.truncate(len);
                Slot::Block(bytes)
            }
            ArgValue::Buffer(buffer) if buffer.byte_len() >= len => Slot::Shared(buffer),
            _ => return Err(mismatch(index, "by-value argument needs a value")),
        },
    };

    Ok(arg)
}

/// Argument view handed to a work function.
#[derive(Debug)]
pub struct TaskArgs<'a> {
    args: &'a mut [Argument],
    home: bool,
}

impl<'a> TaskArgs<'a> {
    /// View over `args`; `home` selects home storage or working copies.
    pub fn new(
        args: &'a mut [Argument],
        home: bool,
    ) -> Self {
        Self { args, home }
    }

    /// Number of arguments.
    #[inline]
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Whether the task takes no arguments.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Whether the view resolves to home storage.
    #[inline]
    pub fn is_home(&self) -> bool {
        self.home
    }

    /// Element count of argument `index`.
    #[inline]
    pub fn count(
        &self,
        index: usize,
    ) -> usize {
        self.args[index].count
    }

    /// Datatype of argument `index`.
    #[inline]
    pub fn datatype(
        &self,
        index: usize,
    ) -> Datatype {
        self.args[index].dtype
    }

    /// Calling convention of argument `index`.
    #[inline]
    pub fn convention(
        &self,
        index: usize,
    ) -> CallConv {
        self.args[index].conv
    }

    /// Element size of argument `index` in bytes.
    #[inline]
    pub fn size_of(
        &self,
        index: usize,
    ) -> usize {
        self.args[index].dtype.size()
    }

    fn check_type<T: Element>(
        &self,
        index: usize,
    ) {
        assert_eq!(
            T::DATATYPE,
            self.args[index].dtype,
            "argument {} accessed with the wrong element type",
            index
        );
    }

    /// First element of argument `index`.
    ///
    /// # Panics
    /// Panics if the argument holds no element or `T` does not match its datatype.
    pub fn scalar<T: Element>(
        &self,
        index: usize,
    ) -> T {
        self.check_type::<T>(index);
        let arg = &self.args[index];
        assert!(arg.count > 0, "argument {} holds no element", index);
        arg.storage(self.home).read(T::read_le)
    }

    /// All elements of argument `index`.
    pub fn read<T: Element>(
        &self,
        index: usize,
    ) -> Vec<T> {
        self.check_type::<T>(index);
        let arg = &self.args[index];
        let len = arg.byte_len();
        arg.storage(self.home)
            .read(|bytes| from_bytes(&bytes[..len.min(bytes.len())]))
    }

    /// Overwrite the leading elements of argument `index`.
    ///
    /// # Panics
    /// Panics if more values than the argument's count are written.
    pub fn write<T: Element>(
        &mut self,
        index: usize,
        values: &[T],
    ) {
        self.check_type::<T>(index);
        let home = self.home;
        let arg = &mut self.args[index];
        assert!(
            values.len() <= arg.count,
            "argument {} holds {} elements, {} written",
            index,
            arg.count,
            values.len()
        );
        let image = to_bytes(values);
        arg.storage_mut(home)
            .write(|bytes| bytes[..image.len()].copy_from_slice(&image));
    }

    /// Overwrite the first element of argument `index`.
    pub fn set<T: Element>(
        &mut self,
        index: usize,
        value: T,
    ) {
        self.write(index, &[value]);
    }

    /// Raw bytes of argument `index`.
    pub fn with_bytes<R>(
        &self,
        index: usize,
        f: impl FnOnce(&[u8]) -> R,
    ) -> R {
        self.args[index].storage(self.home).read(f)
    }

    /// Raw mutable bytes of argument `index`.
    pub fn with_bytes_mut<R>(
        &mut self,
        index: usize,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> R {
        let home = self.home;
        self.args[index].storage_mut(home).write(f)
    }
}
