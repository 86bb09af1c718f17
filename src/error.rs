//! Crate-wide error type and the `err_at!` macro used to build it with a
//! source location, so every fallible call site is tagged with where it
//! failed rather than relying on `?` alone to carry that context.

use std::{fmt, result};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    IOError(String),
    InvalidFile(String),
    InvalidInput(String),
    Corruption(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::IOError(msg) => write!(f, "IOError: {}", msg),
            Error::InvalidFile(msg) => write!(f, "InvalidFile: {}", msg),
            Error::InvalidInput(msg) => write!(f, "InvalidInput: {}", msg),
            Error::Corruption(msg) => write!(f, "Corruption: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

/// Build an [`Error`] tagged with `file!()`/`line!()`, in one of three
/// shapes:
///
/// - `err_at!(Corruption, msg: "fmt", args...)` — construct directly from a
///   formatted message.
/// - `err_at!(IOError, some_result)` — wrap a `Result`'s `Err` (if any),
///   passing `Ok` through unchanged.
/// - `err_at!(IOError, some_result, "context")` — same, with an extra
///   context string prefixed to the underlying error's `Display`.
#[macro_export]
macro_rules! err_at {
    ($variant:ident, msg: $($arg:expr),+ $(,)?) => {{
        Err($crate::Error::$variant(format!(
            "{}:{} {}", file!(), line!(), format!($($arg),+)
        )))
    }};
    ($variant:ident, $expr:expr) => {
        match $expr {
            Ok(val) => Ok(val),
            Err(err) => Err($crate::Error::$variant(format!(
                "{}:{} {}", file!(), line!(), err
            ))),
        }
    };
    ($variant:ident, $expr:expr, $ctx:expr) => {
        match $expr {
            Ok(val) => Ok(val),
            Err(err) => Err($crate::Error::$variant(format!(
                "{}:{} {}: {}", file!(), line!(), $ctx, err
            ))),
        }
    };
}
