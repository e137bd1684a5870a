//! Error types for pktforge

use thiserror::Error;

/// Result type alias for pktforge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pktforge
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Requested sub-range lies outside the source buffer
    #[error("Bounds violation: offset {offset} + length {length} exceeds buffer of {available} bytes")]
    BoundsViolation {
        offset: usize,
        length: usize,
        available: usize,
    },

    /// A required layer or buffer was not supplied
    #[error("Missing reference: {0}")]
    MissingReference(String),

    /// Field value does not fit in its declared bit width
    #[error("Field '{field}' value {value} does not fit in {bits} bits")]
    FieldRange {
        field: &'static str,
        value: u64,
        bits: u32,
    },

    /// Option area longer than the header can announce
    #[error("{layer} options too long: {length} bytes after padding, at most {max}")]
    OptionsTooLong {
        layer: &'static str,
        length: usize,
        max: usize,
    },

    /// Encapsulation chain is malformed
    #[error("Structural violation: {0}")]
    StructuralViolation(String),

    /// Buffer too short for the fixed header of a layer
    #[error("Truncated {layer} header: need {needed} bytes, have {available}")]
    Truncated {
        layer: &'static str,
        needed: usize,
        available: usize,
    },

    /// Header fields are self-inconsistent
    #[error("Invalid {layer} header: {reason}")]
    InvalidHeader { layer: &'static str, reason: String },

    /// Address text could not be parsed
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

impl Error {
    /// Create a structural violation with a custom message
    pub fn structural<S: Into<String>>(msg: S) -> Self {
        Error::StructuralViolation(msg.into())
    }

    /// Create a missing reference error with a custom message
    pub fn missing<S: Into<String>>(msg: S) -> Self {
        Error::MissingReference(msg.into())
    }

    /// Create an invalid header error
    pub fn invalid_header<S: Into<String>>(layer: &'static str, reason: S) -> Self {
        Error::InvalidHeader {
            layer,
            reason: reason.into(),
        }
    }

    /// Fail with [`Error::FieldRange`] unless `value` fits in `bits` bits.
    pub fn check_width(field: &'static str, value: u64, bits: u32) -> Result<()> {
        if bits < 64 && value >> bits != 0 {
            return Err(Error::FieldRange { field, value, bits });
        }
        Ok(())
    }
}
