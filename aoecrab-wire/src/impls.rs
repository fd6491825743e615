//! Impls for primitive and container types.

use crate::{AoeWireRead, AoeWireSized, AoeWireWrite, AoeWireWriteSized, WireError};

macro_rules! impl_primitive_wire_field {
    ($ty:ty, $size:expr) => {
        impl AoeWireWrite for $ty {
            fn pack_to_slice_unchecked<'buf>(&self, buf: &'buf mut [u8]) -> &'buf [u8] {
                let chunk = &mut buf[0..$size];

                chunk.copy_from_slice(&self.to_be_bytes());

                chunk
            }

            fn packed_len(&self) -> usize {
                $size
            }
        }

        impl AoeWireRead for $ty {
            fn unpack_from_slice(buf: &[u8]) -> Result<Self, WireError> {
                buf.get(0..$size)
                    .ok_or(WireError::ReadBufferTooShort)
                    .and_then(|raw| raw.try_into().map_err(|_| WireError::ReadBufferTooShort))
                    .map(Self::from_be_bytes)
            }
        }

        impl AoeWireSized for $ty {
            const PACKED_LEN: usize = $size;

            type Buffer = [u8; $size];

            fn buffer() -> Self::Buffer {
                [0u8; $size]
            }
        }

        impl AoeWireWriteSized for $ty {
            fn pack(&self) -> Self::Buffer {
                self.to_be_bytes()
            }
        }
    };
}

impl_primitive_wire_field!(u8, 1);
impl_primitive_wire_field!(u16, 2);
impl_primitive_wire_field!(u32, 4);
impl_primitive_wire_field!(u64, 8);

impl AoeWireWrite for bool {
    fn pack_to_slice_unchecked<'buf>(&self, buf: &'buf mut [u8]) -> &'buf [u8] {
        buf[0] = u8::from(*self);

        &buf[0..1]
    }

    fn packed_len(&self) -> usize {
        1
    }
}

impl AoeWireRead for bool {
    fn unpack_from_slice(buf: &[u8]) -> Result<Self, WireError> {
        buf.first()
            .map(|raw| *raw > 0)
            .ok_or(WireError::ReadBufferTooShort)
    }
}

impl AoeWireSized for bool {
    const PACKED_LEN: usize = 1;

    type Buffer = [u8; 1];

    fn buffer() -> Self::Buffer {
        [0u8; 1]
    }
}

impl<const N: usize> AoeWireWrite for [u8; N] {
    fn pack_to_slice_unchecked<'buf>(&self, buf: &'buf mut [u8]) -> &'buf [u8] {
        let chunk = &mut buf[0..N];

        chunk.copy_from_slice(self);

        chunk
    }

    fn packed_len(&self) -> usize {
        N
    }
}

impl<const N: usize> AoeWireRead for [u8; N] {
    fn unpack_from_slice(buf: &[u8]) -> Result<Self, WireError> {
        buf.get(0..N)
            .ok_or(WireError::ReadBufferTooShort)?
            .try_into()
            .map_err(|_| WireError::ArrayLength)
    }
}

impl<const N: usize> AoeWireSized for [u8; N] {
    const PACKED_LEN: usize = N;

    type Buffer = [u8; N];

    fn buffer() -> Self::Buffer {
        [0u8; N]
    }
}

impl AoeWireWrite for &[u8] {
    fn pack_to_slice_unchecked<'buf>(&self, buf: &'buf mut [u8]) -> &'buf [u8] {
        let chunk = &mut buf[0..self.len()];

        chunk.copy_from_slice(self);

        chunk
    }

    fn packed_len(&self) -> usize {
        self.len()
    }
}

/// Reads as many bytes as the buffer holds, failing if they do not fit in `N`.
impl<const N: usize> AoeWireRead for heapless::Vec<u8, N> {
    fn unpack_from_slice(buf: &[u8]) -> Result<Self, WireError> {
        heapless::Vec::from_slice(buf).map_err(|_| WireError::ArrayLength)
    }
}

impl<const N: usize> AoeWireWrite for heapless::Vec<u8, N> {
    fn pack_to_slice_unchecked<'buf>(&self, buf: &'buf mut [u8]) -> &'buf [u8] {
        let chunk = &mut buf[0..self.len()];

        chunk.copy_from_slice(self);

        chunk
    }

    fn packed_len(&self) -> usize {
        self.len()
    }
}
