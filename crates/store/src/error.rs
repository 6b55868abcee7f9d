//! Error kinds shared by the persistence layer.
//!
//! Per the data-model/persistence split in the design: MemoryBuffer,
//! PhysicalLineIndex, and the viewport coordinate math never construct
//! this type — invalid inputs there return benign defaults. This type is
//! reserved for PageStore, WriteAheadLog, and AdaptivePersistence, whose
//! failure modes are real (disk I/O, corruption, closed handles).

use std::fmt;

/// Errors surfaced by PageStore, WriteAheadLog, and AdaptivePersistence.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corruption: {0}")]
    Corruption(String),

    #[error("not found")]
    NotFound,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("already closed")]
    AlreadyClosed,
}

impl Error {
    pub fn corrupt_header(what: impl fmt::Display) -> Self {
        Error::Corruption(format!("bad header: {what}"))
    }

    pub fn bad_offset(what: impl fmt::Display) -> Self {
        Error::Corruption(format!("bad offset: {what}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "nope");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_display() {
        assert_eq!(Error::NotFound.to_string(), "not found");
        assert_eq!(Error::AlreadyClosed.to_string(), "already closed");
    }
}
