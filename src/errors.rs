//! Crate wide result type, backed by `failure::Error`.

pub use failure::{Error, ResultExt};

pub type Result<T> = ::std::result::Result<T, Error>;
