use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::*;

/// Tuning knobs of the upload buffer pool.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadPoolParams {
    /// The smallest bucket in bytes, every allocation is rounded up to a power of
    /// two not less than this.
    pub min_bucket: usize,
    /// The largest bucket `preallocate` creates.
    pub max_preallocate_bucket: usize,
    /// Seconds a free buffer stays warm before the first trim pass may drop it.
    pub buffer_expiration: u64,
    /// Total pool size the first trim pass shrinks towards.
    pub target_size: usize,
    /// Hard ceiling of the pool size, enforced by the second trim pass.
    pub max_size: usize,
    /// Frames between two periodic trims. Zero disables trimming.
    pub trim_interval: u64,
    /// Bytes created eagerly when the driver starts.
    pub preallocate: usize,
}

impl Default for UploadPoolParams {
    fn default() -> Self {
        UploadPoolParams {
            min_bucket: 64 * 1024,
            max_preallocate_bucket: 4 * 1024 * 1024,
            buffer_expiration: 5,
            target_size: 16 * 1024 * 1024,
            max_size: 64 * 1024 * 1024,
            trim_interval: 60,
            preallocate: 0,
        }
    }
}

impl UploadPoolParams {
    /// Sizes the pool from the display layer's per-surface upload limit and its
    /// safety margin.
    pub fn with_upload_limit(upload_limit: usize, margin: usize) -> Self {
        UploadPoolParams {
            target_size: upload_limit,
            max_size: upload_limit + margin,
            ..Default::default()
        }
    }

    #[inline]
    pub fn buffer_expiration(&self) -> Duration {
        Duration::from_secs(self.buffer_expiration)
    }
}

/// The settings of the render driver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverParams {
    /// Bytes of texel data uploaded per frame at most.
    pub texture_upload_budget: u64,
    /// Buffer updates of at least this many bytes go through the upload pool.
    pub staging_threshold: usize,
    /// Expirations in seconds since last use, zero means never.
    pub buffer_expiration: u64,
    pub texture_expiration: u64,
    pub program_expiration: u64,
    pub vertex_array_expiration: u64,
    pub framebuffer_expiration: u64,
    pub render_buffer_expiration: u64,
    pub upload_pool: UploadPoolParams,
    /// Maximum number of textures bound to a single draw.
    pub max_texture_units: u32,
}

impl Default for DriverParams {
    fn default() -> Self {
        DriverParams {
            texture_upload_budget: 4 * 1024 * 1024 * 1024,
            staging_threshold: 256 * 1024,
            buffer_expiration: 0,
            texture_expiration: 0,
            program_expiration: 0,
            vertex_array_expiration: 0,
            framebuffer_expiration: 0,
            render_buffer_expiration: 0,
            upload_pool: UploadPoolParams::default(),
            max_texture_units: 8,
        }
    }
}

impl DriverParams {
    /// Parses settings from a JSON document, absent fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let params = serde_json::from_str(json)?;
        Ok(params)
    }

    pub fn to_json(&self) -> Result<String> {
        let json = serde_json::to_string_pretty(self)?;
        Ok(json)
    }
}
