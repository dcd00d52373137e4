//! Abstract element datatypes carried by task arguments.
//!
//! Every argument declares the datatype of its elements so that the transport
//! knows how many bytes to ship and the receiving node can allocate a working
//! copy of the right size. The wire tags are fixed and must agree on every node.

use std::fmt;

/// Element datatype of a task argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Datatype {
    /// Raw byte.
    Byte,
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    Long,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
}

impl Datatype {
    /// Size of one element in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        match self {
            Datatype::Byte => 1,
            Datatype::Int | Datatype::Float => 4,
            Datatype::Long | Datatype::Double => 8,
        }
    }

    /// Tag used on the wire.
    #[inline]
    pub fn as_tag(&self) -> u8 {
        match self {
            Datatype::Byte => 3,
            Datatype::Int => 7,
            Datatype::Long => 9,
            Datatype::Float => 11,
            Datatype::Double => 12,
        }
    }

    /// Decode a wire tag.
    #[inline]
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            3 => Some(Datatype::Byte),
            7 => Some(Datatype::Int),
            9 => Some(Datatype::Long),
            11 => Some(Datatype::Float),
            12 => Some(Datatype::Double),
            _ => None,
        }
    }
}

impl fmt::Display for Datatype {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            Datatype::Byte => "byte",
            Datatype::Int => "int",
            Datatype::Long => "long",
            Datatype::Float => "float",
            Datatype::Double => "double",
        };
        write!(f, "{}", name)
    }
}

/// A plain value type that can live in an argument slot or buffer.
///
/// Values are stored little-endian so that byte images are identical on every
/// node of the cluster.
pub trait Element: Copy + Send + Sync + 'static {
    /// Datatype tag for this element type.
    const DATATYPE: Datatype;

    /// Write the little-endian image of `self` into `out`.
    fn write_le(
        self,
        out: &mut [u8],
    );

    /// Read a value from its little-endian image.
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_element {
    ($ty:ty, $dt:expr) => {
        impl Element for $ty {
            const DATATYPE: Datatype = $dt;

            #[inline]
            fn write_le(
                self,
                out: &mut [u8],
            ) {
                out[..std::mem::size_of::<$ty>()].copy_from_slice(&self.to_le_bytes());
            }

            #[inline]
            fn read_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(&bytes[..std::mem::size_of::<$ty>()]);
                <$ty>::from_le_bytes(raw)
            }
        }
    };
}

impl_element!(u8, Datatype::Byte);
impl_element!(i32, Datatype::Int);
impl_element!(i64, Datatype::Long);
impl_element!(f32, Datatype::Float);
impl_element!(f64, Datatype::Double);

/// Encode a slice of elements into a byte vector.
pub fn to_bytes<T: Element>(values: &[T]) -> Vec<u8> {
    let size = T::DATATYPE.size();
    let mut bytes = vec![0u8; values.len() * size];
    for (chunk, value) in bytes.chunks_exact_mut(size).zip(values) {
        value.write_le(chunk);
    }
    bytes
}

/// Decode a byte image into elements. Trailing partial elements are ignored.
pub fn from_bytes<T: Element>(bytes: &[u8]) -> Vec<T> {
    bytes
        .chunks_exact(T::DATATYPE.size())
        .map(T::read_le)
        .collect()
}
