pub use crate::errors::{Error, Result, ResultExt};
pub use crate::utils::prelude::{Color, Handle, HashValue, Rect};
pub use crate::video::prelude::*;
