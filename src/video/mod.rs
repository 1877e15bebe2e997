//! A retained-mode core of GPU resources and draw commands.
//!
//! Clients create logical resources (`Buffer`, `Texture`, `Program`, ...) and
//! mutate them from any thread. Each render thread owns a `RenderDriver`, which
//! lazily uploads whatever changed since its last upload, records draws into a
//! `RenderQueue` and reclaims native objects that are no longer referenced.
//!
//! ```text
//!        client threads                         render thread
//!  +--------------------------+       +------------------------------+
//!  | Buffer / Texture / ...   | ----> | RenderDriver                 |
//!  |   mutate, bump generation|       |   prepare_* -> native object |
//!  |   invalidate dirty region|       |   RenderQueue -> Device      |
//!  +--------------------------+       |   collect, upload pool       |
//!                                     +------------------------------+
//! ```

pub mod assets;
pub mod backends;
pub mod cache;
pub mod command;
pub mod dirty;
pub mod driver;
pub mod errors;
pub mod queue;
pub mod resource;
pub mod settings;
pub mod upload_pool;
pub mod worker;

pub mod prelude {
    pub use super::assets::prelude::*;
    pub use super::backends::Device;
    pub use super::command::{
        BlendFactor, BlendMode, BlendValue, CommandRef, Comparison, DepthStencil, DrawCall,
        Equation, PipelineCommand, Primitive, StencilTest,
    };
    pub use super::driver::{FrameStats, RenderDriver};
    pub use super::queue::FlushStats;
    pub use super::resource::{RenderThread, ResourceKind, Resources};
    pub use super::settings::{DriverParams, UploadPoolParams};
    pub use super::worker::Worker;
}
