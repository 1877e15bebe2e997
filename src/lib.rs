//! Lucent keeps GPU objects in sync with their CPU-side descriptions.
//!
//! See the `video` module for an overview.

#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

#[macro_use]
pub mod utils;
pub mod errors;
pub mod video;

pub mod prelude;
