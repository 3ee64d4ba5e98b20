use std::fmt::Display;

/// flatdb errors.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// The backing file cannot serve as a snapshot. A mapped snapshot must
    /// cover at least one byte.
    InvalidSize(u64),
    /// An operation that requires a mapped snapshot was attempted against a
    /// closed holder.
    NotOpen,
    /// Invalid user input, typically flag parsing errors.
    InvalidInput(String),
    /// An IO error.
    IO(String),
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::InvalidSize(size) => {
                write!(f, "invalid file size {size} (must be non-zero)")
            }
            Error::NotOpen => write!(f, "database must be open"),
            Error::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Error::IO(msg) => write!(f, "io error: {msg}"),
        }
    }
}

/// Constructs an Error::InvalidInput for the given format string.
#[macro_export]
macro_rules! errinput {
    ($($args:tt)*) => { $crate::error::Error::InvalidInput(format!($($args)*)).into() };
}

/// A flatdb Result returning Error.
pub type Result<T> = std::result::Result<T, Error>;

impl<T> From<Error> for Result<T> {
    fn from(error: Error) -> Self {
        Err(error)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IO(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::IO(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::IO(err.to_string())
    }
}
