//! Definition of errors.

use std::error::Error;
use std::fmt;

/// A specialized Result type for Gazetteer.
pub type Result<T, E = GazetteerError> = std::result::Result<T, E>;

/// The error type for Gazetteer.
#[derive(Debug)]
pub enum GazetteerError {
    /// The error variant for [`InvalidInputError`].
    InvalidInput(InvalidInputError),

    /// The error variant for [`TryFromIntError`](std::num::TryFromIntError).
    TryFromInt(std::num::TryFromIntError),

    /// The error variant for [`ParseIntError`](std::num::ParseIntError).
    ParseInt(std::num::ParseIntError),

    /// The error variant for [`ParseFloatError`](std::num::ParseFloatError).
    ParseFloat(std::num::ParseFloatError),

    /// The error variant for [`DecodeError`](bincode::error::DecodeError).
    BincodeDecode(bincode::error::DecodeError),

    /// The error variant for [`EncodeError`](bincode::error::EncodeError).
    BincodeEncode(bincode::error::EncodeError),

    /// The error variant for [`quick_xml::Error`].
    Xml(quick_xml::Error),

    /// The error variant for [`serde_json::Error`].
    Json(serde_json::Error),

    /// The error variant for [`std::io::Error`].
    StdIo(std::io::Error),
}

impl GazetteerError {
    pub(crate) fn invalid_input<S>(arg: &'static str, msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::InvalidInput(InvalidInputError {
            arg,
            msg: msg.into(),
        })
    }
}

impl fmt::Display for GazetteerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidInput(e) => e.fmt(f),
            Self::TryFromInt(e) => e.fmt(f),
            Self::ParseInt(e) => e.fmt(f),
            Self::ParseFloat(e) => e.fmt(f),
            Self::BincodeDecode(e) => e.fmt(f),
            Self::BincodeEncode(e) => e.fmt(f),
            Self::Xml(e) => e.fmt(f),
            Self::Json(e) => e.fmt(f),
            Self::StdIo(e) => e.fmt(f),
        }
    }
}

impl Error for GazetteerError {}

/// Error used when the input is invalid.
#[derive(Debug)]
pub struct InvalidInputError {
    /// Name of the input.
    pub(crate) arg: &'static str,

    /// Error message.
    pub(crate) msg: String,
}

impl fmt::Display for InvalidInputError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "InvalidInputError: {}: {}", self.arg, self.msg)
    }
}

impl Error for InvalidInputError {}

impl From<std::num::TryFromIntError> for GazetteerError {
    fn from(error: std::num::TryFromIntError) -> Self {
        Self::TryFromInt(error)
    }
}

impl From<std::num::ParseIntError> for GazetteerError {
    fn from(error: std::num::ParseIntError) -> Self {
        Self::ParseInt(error)
    }
}

impl From<std::num::ParseFloatError> for GazetteerError {
    fn from(error: std::num::ParseFloatError) -> Self {
        Self::ParseFloat(error)
    }
}

impl From<bincode::error::DecodeError> for GazetteerError {
    fn from(error: bincode::error::DecodeError) -> Self {
        Self::BincodeDecode(error)
    }
}

impl From<bincode::error::EncodeError> for GazetteerError {
    fn from(error: bincode::error::EncodeError) -> Self {
        Self::BincodeEncode(error)
    }
}

impl From<quick_xml::Error> for GazetteerError {
    fn from(error: quick_xml::Error) -> Self {
        Self::Xml(error)
    }
}

impl From<serde_json::Error> for GazetteerError {
    fn from(error: serde_json::Error) -> Self {
        Self::Json(error)
    }
}

impl From<std::io::Error> for GazetteerError {
    fn from(error: std::io::Error) -> Self {
        Self::StdIo(error)
    }
}
