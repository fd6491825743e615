//! Encode/decode error.

/// Wire encode/decode errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum WireError {
    /// The buffer to extract a type from is too short to do so.
    ReadBufferTooShort,
    /// The buffer to write the packed data into is too short.
    WriteBufferTooShort,
    /// A decoded value is not valid for the target type, e.g. an unknown command code with no
    /// catch-all representation.
    InvalidValue,
    /// A length field claims more data than the fixed capacity of the target container.
    ArrayLength,
}

#[cfg(feature = "std")]
impl std::error::Error for WireError {}

impl core::fmt::Display for WireError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            WireError::ReadBufferTooShort => {
                write!(f, "Read buffer too short to extract type from")
            }
            WireError::WriteBufferTooShort => {
                write!(f, "Write buffer too short to pack type into")
            }
            WireError::InvalidValue => f.write_str("Invalid decoded value"),
            WireError::ArrayLength => f.write_str("Length exceeds container capacity"),
        }
    }
}
