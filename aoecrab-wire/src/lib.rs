//! Traits used to pack and unpack aoecrab structs to and from the wire.
//!
//! AoE carries every multi-byte integer in network (big endian) order, so all primitive impls in
//! this crate are big endian. Fields that the ATA specification defines byte by byte, like the six
//! LBA bytes, should be represented as byte arrays and assembled by the caller.
//!
//! # Examples
//!
//! ```rust
//! use aoecrab_wire::{AoeWireRead, AoeWireWrite};
//!
//! let mut buf = [0u8; 4];
//!
//! 0x0001_88a2u32.pack_to_slice(&mut buf).unwrap();
//!
//! assert_eq!(buf, [0x00, 0x01, 0x88, 0xa2]);
//! assert_eq!(u16::unpack_from_slice(&buf[2..]), Ok(0x88a2));
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(trivial_casts)]
#![deny(trivial_numeric_casts)]
#![deny(unused_import_braces)]
#![deny(unused_qualifications)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]

mod error;
mod impls;

pub use error::WireError;

/// A type to be received from the wire, according to AoE/ATA packing rules.
pub trait AoeWireRead: Sized {
    /// Unpack this type from the beginning of the given buffer.
    ///
    /// Trailing data after the packed length of the type is ignored.
    fn unpack_from_slice(buf: &[u8]) -> Result<Self, WireError>;
}

/// A type to be sent over the wire, according to AoE/ATA packing rules.
pub trait AoeWireWrite {
    /// Pack the type and write it into the beginning of `buf`.
    ///
    /// The caller must ensure `buf` is at least [`packed_len`](AoeWireWrite::packed_len) bytes
    /// long. Implementations may panic otherwise.
    fn pack_to_slice_unchecked<'buf>(&self, buf: &'buf mut [u8]) -> &'buf [u8];

    /// Pack the type and write it into the beginning of `buf`, returning an error if the buffer is
    /// too short.
    fn pack_to_slice<'buf>(&self, buf: &'buf mut [u8]) -> Result<&'buf [u8], WireError> {
        if buf.len() < self.packed_len() {
            return Err(WireError::WriteBufferTooShort);
        }

        Ok(self.pack_to_slice_unchecked(buf))
    }

    /// Get the length in bytes of this item when packed.
    fn packed_len(&self) -> usize;
}

/// A type with a fixed size on the wire.
pub trait AoeWireSized {
    /// Packed size in bytes.
    const PACKED_LEN: usize;

    /// Used to define an array of the correct length. This type should be an array `[u8; N]`
    /// where `N` is a fixed value or const generic as per the type this trait is implemented on.
    type Buffer: AsRef<[u8]> + AsMut<[u8]>;

    /// Create a buffer sized to contain the packed representation of this item.
    fn buffer() -> Self::Buffer;
}

/// Implemented for writeable types with a known size at compile time.
pub trait AoeWireWriteSized: AoeWireWrite + AoeWireSized {
    /// Pack this item to a fixed sized array.
    fn pack(&self) -> Self::Buffer;
}

/// A readable type that has a size known at compile time.
pub trait AoeWireReadSized: AoeWireRead + AoeWireSized {}

impl<T> AoeWireReadSized for T where T: AoeWireRead + AoeWireSized {}

/// A type that can be both written to and read from the wire.
pub trait AoeWireReadWrite: AoeWireRead + AoeWireWrite {}

impl<T> AoeWireReadWrite for T where T: AoeWireRead + AoeWireWrite {}
