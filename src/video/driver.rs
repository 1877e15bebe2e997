//! The render driver translates logical resources into native objects lazily,
//! records draws into the render queue and runs the frame lifecycle.
//!
//! There is one driver per render thread. Every driver owns its own caches, so
//! several render threads sharing the same `Resources` never race on native
//! objects, and the per-thread dirty regions make sure each of them uploads
//! every change exactly once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use smallvec::SmallVec;

use crate::errors::*;
use crate::utils::prelude::*;
use crate::video::assets::prelude::*;
use crate::video::backends::*;
use crate::video::cache::{Cached, CollectStats, HandleCache};
use crate::video::command::*;
use crate::video::errors::Error;
use crate::video::queue::{FlushStats, Pin, RenderQueue};
use crate::video::resource::{RenderThread, ResourceKind, Resources};
use crate::video::settings::DriverParams;
use crate::video::upload_pool::{UploadPool, UploadPoolStats};
use crate::video::worker::Worker;

#[derive(Debug)]
pub struct BufferSlot {
    pub native: Arc<NativeBuffer>,
    pub size: usize,
    pub usage: BufferUsage,
    /// Incremented every time the whole store is reallocated.
    pub respecifications: u64,
}

impl Cached for BufferSlot {
    fn is_shared(&self) -> bool {
        Arc::strong_count(&self.native) > 1
    }
}

#[derive(Debug)]
pub struct TextureSlot {
    pub native: NativeTexture,
    pub format: TextureFormat,
    pub dimensions: (u32, u32),
    /// The region still waiting for upload budget.
    pub pending: Option<Rect>,
    /// Whether the mip chain was built from the uploaded texels.
    pub mipmap: bool,
}

impl Cached for TextureSlot {}

/// Shaders are shared by source between the programs of a driver.
pub type ShaderKey = (ShaderStage, HashValue<str>);

#[derive(Debug)]
pub struct ShaderSlot {
    pub native: NativeShader,
    /// The number of program slots linked from this shader.
    pub programs: usize,
}

#[derive(Debug)]
pub struct ProgramSlot {
    pub native: NativeProgram,
    pub linked: bool,
    pub shaders: Vec<ShaderKey>,
    pub uniforms: FastHashMap<HashValue<str>, i32>,
    /// Sampler locations and their texture units.
    pub samplers: FastHashMap<HashValue<str>, (i32, u32)>,
}

impl Cached for ProgramSlot {}

#[derive(Debug)]
pub struct VertexArraySlot {
    pub native: NativeVertexArray,
    /// Referenced buffers, with the respecification count seen at the last
    /// rebuild.
    pub buffers: Vec<(BufferHandle, Arc<NativeBuffer>, u64)>,
    pub index: Option<IndexFormat>,
}

impl Cached for VertexArraySlot {}

#[derive(Debug)]
pub struct FrameBufferSlot {
    pub native: NativeFramebuffer,
    pub colors: Vec<NativeTexture>,
    pub depth_stencil: Option<NativeRenderBuffer>,
    pub dimensions: (u32, u32),
}

impl Cached for FrameBufferSlot {}

#[derive(Debug)]
pub struct RenderBufferSlot {
    pub native: NativeRenderBuffer,
    pub format: RenderBufferFormat,
    pub dimensions: (u32, u32),
}

impl Cached for RenderBufferSlot {}

/// Counters of a frame.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct FrameStats {
    pub draw_calls: usize,
    pub segments: usize,
    pub state_changes: usize,
    /// Bytes uploaded into buffers and textures.
    pub uploaded_bytes: usize,
    /// Texel bytes uploaded, counted against the texture upload budget.
    pub texture_bytes: u64,
    /// Draws which were not recorded, or rejected during flush.
    pub skipped: usize,
    pub destroyed: usize,
    pub soft_deleted: usize,
}

impl FrameStats {
    fn merge_flush(&mut self, v: &FlushStats) {
        self.draw_calls += v.draw_calls;
        self.segments += v.segments;
        self.state_changes += v.state_changes;
        self.skipped += v.failures;
    }

    fn merge_collect(&mut self, v: &CollectStats) {
        self.destroyed += v.destroyed;
        self.soft_deleted += v.soft_deleted;
    }
}

pub struct RenderDriver<D: Device + 'static> {
    device: D,
    resources: Resources,
    thread: RenderThread,
    params: DriverParams,

    buffers: HandleCache<BufferHandle, BufferSlot>,
    textures: HandleCache<TextureHandle, TextureSlot>,
    programs: HandleCache<ProgramHandle, ProgramSlot>,
    vertex_arrays: HandleCache<VertexArrayHandle, VertexArraySlot>,
    framebuffers: HandleCache<FrameBufferHandle, FrameBufferSlot>,
    render_buffers: HandleCache<RenderBufferHandle, RenderBufferSlot>,
    shaders: FastHashMap<ShaderKey, ShaderSlot>,

    pool: Arc<UploadPool>,
    queue: RenderQueue,
    worker: Option<Worker<D>>,

    surface_dimensions: (u32, u32),
    now: Instant,
    frames: u64,
    stats: FrameStats,
    last_stats: FrameStats,
}

fn expiration_or(v: Option<Duration>, secs: u64) -> Duration {
    v.unwrap_or_else(|| Duration::from_secs(secs))
}

/// Drops one reference to each of `keys`, deleting the shaders no program
/// links from anymore.
fn release_shaders<D: Device>(
    device: &mut D,
    shaders: &mut FastHashMap<ShaderKey, ShaderSlot>,
    keys: &[ShaderKey],
) {
    for key in keys {
        let unused = match shaders.get_mut(key) {
            Some(v) => {
                v.programs = v.programs.saturating_sub(1);
                v.programs == 0
            }
            None => false,
        };

        if unused {
            if let Some(v) = shaders.remove(key) {
                debug!("[RenderDriver] deletes {:?} shader {:?}.", key.0, v.native);
                device.delete_shader(v.native);
            }
        }
    }
}

impl<D: Device + 'static> RenderDriver<D> {
    /// Creates a driver, registering a new render thread in `resources`.
    pub fn new(device: D, resources: &Resources, params: DriverParams) -> Result<Self> {
        let thread = resources.register_thread();
        let pool = Arc::new(UploadPool::new(params.upload_pool));

        let mut driver = RenderDriver {
            device,
            resources: resources.clone(),
            thread,
            params,

            buffers: HandleCache::new(ResourceKind::Buffer),
            textures: HandleCache::new(ResourceKind::Texture),
            programs: HandleCache::new(ResourceKind::Program),
            vertex_arrays: HandleCache::new(ResourceKind::VertexArray),
            framebuffers: HandleCache::new(ResourceKind::FrameBuffer),
            render_buffers: HandleCache::new(ResourceKind::RenderBuffer),
            shaders: FastHashMap::default(),

            pool,
            queue: RenderQueue::new(),
            worker: None,

            surface_dimensions: (0, 0),
            now: Instant::now(),
            frames: 0,
            stats: FrameStats::default(),
            last_stats: FrameStats::default(),
        };

        if params.upload_pool.preallocate > 0 {
            let now = driver.now;
            driver
                .pool
                .preallocate(&mut driver.device, params.upload_pool.preallocate, now)?;
        }

        Ok(driver)
    }

    /// Moves periodic maintenance onto `worker`.
    pub fn with_worker(mut self, worker: Worker<D>) -> Self {
        self.worker = Some(worker);
        self
    }

    #[inline]
    pub fn worker(&self) -> Option<&Worker<D>> {
        self.worker.as_ref()
    }

    #[inline]
    pub fn device(&self) -> &D {
        &self.device
    }

    #[inline]
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    #[inline]
    pub fn params(&self) -> &DriverParams {
        &self.params
    }

    /// The index of the render thread this driver uploads for.
    #[inline]
    pub fn thread(&self) -> usize {
        self.thread.index()
    }

    #[inline]
    pub fn upload_pool(&self) -> &Arc<UploadPool> {
        &self.pool
    }

    #[inline]
    pub fn pool_stats(&self) -> UploadPoolStats {
        self.pool.stats()
    }

    /// The counters of the frame in progress.
    #[inline]
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// The counters of the last finished frame.
    #[inline]
    pub fn last_stats(&self) -> FrameStats {
        self.last_stats
    }

    /// The number of cached native objects of `kind`.
    pub fn cached(&self, kind: ResourceKind) -> usize {
        match kind {
            ResourceKind::Buffer => self.buffers.len(),
            ResourceKind::Texture => self.textures.len(),
            ResourceKind::Program => self.programs.len(),
            ResourceKind::VertexArray => self.vertex_arrays.len(),
            ResourceKind::FrameBuffer => self.framebuffers.len(),
            ResourceKind::RenderBuffer => self.render_buffers.len(),
            ResourceKind::Shader => self.shaders.len(),
        }
    }

    /// Sets the dimensions of the default framebuffer.
    pub fn set_surface_dimensions(&mut self, dimensions: (u32, u32)) {
        self.surface_dimensions = dimensions;
    }

    /// Uploads `buffer` if it changed since the last call, and returns its
    /// native object.
    pub fn prepare_buffer(&mut self, buffer: &Buffer) -> Result<NativeBuffer> {
        let handle = buffer.handle();
        let now = self.now;
        let thread = self.thread.index();

        if !self.buffers.contains(handle) {
            let generation = buffer.generation();
            let _ = buffer.take_dirty_region(thread);

            let (native, size, usage) = {
                let state = buffer.state();
                let native = self
                    .device
                    .create_buffer(state.usage, state.data.len(), Some(&state.data))?;
                (native, state.data.len(), state.usage)
            };

            let slot = BufferSlot {
                native: Arc::new(native),
                size,
                usage,
                respecifications: 0,
            };

            let expiration = expiration_or(buffer.expiration(), self.params.buffer_expiration);
            let entry = self.buffers.insert(handle, slot, expiration, now);
            entry.generation = generation;
            self.stats.uploaded_bytes += size;
            return Ok(native);
        }

        self.buffers.touch(handle, now);

        let threshold = self.params.staging_threshold;
        let device = &mut self.device;
        let pool = &self.pool;
        let stats = &mut self.stats;

        let entry = match self.buffers.get_mut(handle) {
            Some(entry) => entry,
            None => return Err(Error::InvalidHandle(ResourceKind::Buffer, handle.to_string()).into()),
        };

        if let Some(expiration) = buffer.expiration() {
            entry.expiration = expiration;
        }

        if !entry.is_stale(buffer.generation_ref()) {
            return Ok(*entry.value.native);
        }

        let generation = buffer.generation();
        let dirty = buffer.take_dirty_region(thread);
        let state = buffer.state();
        let slot = &mut entry.value;

        if slot.size != state.data.len() || slot.usage != state.usage {
            device.respecify_buffer(*slot.native, state.usage, state.data.len(), Some(&state.data))?;
            slot.size = state.data.len();
            slot.usage = state.usage;
            slot.respecifications += 1;
            stats.uploaded_bytes += slot.size;
        } else {
            let range = dirty.clamp(state.data.len());
            if !range.is_empty() {
                let bytes = &state.data[range.begin..range.end];

                if bytes.len() >= threshold {
                    let upload = pool.allocate(device, bytes.len(), now)?;
                    let result = pool
                        .write(device, upload, 0, bytes)
                        .and_then(|_| {
                            device.copy_buffer(upload.native(), 0, *slot.native, range.begin, bytes.len())
                        });

                    pool.release(device, upload, true, now);
                    result?;
                } else {
                    device.update_buffer(*slot.native, range.begin, bytes)?;
                }

                stats.uploaded_bytes += bytes.len();
            }
        }

        entry.generation = generation;
        Ok(*entry.value.native)
    }

    /// Uploads `texture` if it changed since the last call, limited by the
    /// texture upload budget of this frame, and returns its native object.
    pub fn prepare_texture(&mut self, texture: &Texture) -> Result<NativeTexture> {
        let handle = texture.handle();
        let now = self.now;
        let thread = self.thread.index();

        if !self.textures.contains(handle) {
            let generation = texture.generation();
            let parameters = texture.parameter_generation();
            let _ = texture.take_dirty_region(thread);

            let params = texture.state().params;
            let native = self.device.create_texture(&params)?;
            let rect = params.rect();
            let slot = TextureSlot {
                native,
                format: params.format,
                dimensions: params.dimensions,
                pending: Some(rect).filter(|v| !v.is_empty()),
                mipmap: false,
            };

            let expiration = expiration_or(texture.expiration(), self.params.texture_expiration);
            let entry = self.textures.insert(handle, slot, expiration, now);
            entry.generation = generation;
            entry.parameters = parameters;
        } else {
            self.textures.touch(handle, now);
        }

        let device = &mut self.device;
        let stats = &mut self.stats;
        let budget = self.params.texture_upload_budget;

        let entry = match self.textures.get_mut(handle) {
            Some(entry) => entry,
            None => return Err(Error::InvalidHandle(ResourceKind::Texture, handle.to_string()).into()),
        };

        if let Some(expiration) = texture.expiration() {
            entry.expiration = expiration;
        }

        let mut retired = None;
        if entry.is_stale(texture.generation_ref()) {
            let generation = texture.generation();
            let dirty = texture.take_dirty_region(thread);
            let state = texture.state();
            let slot = &mut entry.value;

            if slot.format != state.params.format || slot.dimensions != state.params.dimensions {
                let parameters = texture.parameter_generation();
                let fresh = TextureSlot {
                    native: device.create_texture(&state.params)?,
                    format: state.params.format,
                    dimensions: state.params.dimensions,
                    pending: Some(state.params.rect()).filter(|v| !v.is_empty()),
                    mipmap: false,
                };

                retired = Some(::std::mem::replace(slot, fresh));
                entry.parameters = parameters;
            } else if !dirty.is_empty() {
                slot.pending = Some(match slot.pending {
                    Some(pending) => pending.union(&dirty),
                    None => dirty,
                });
            }

            entry.generation = generation;
        }

        if let Some(old) = retired {
            debug!("[RenderDriver] reallocates storage of {}.", handle);
            self.textures.retire(old);
        }

        let entry = match self.textures.get_mut(handle) {
            Some(entry) => entry,
            None => return Err(Error::InvalidHandle(ResourceKind::Texture, handle.to_string()).into()),
        };

        if texture.parameters_ref().is_newer_than(entry.parameters) {
            let parameters = texture.parameter_generation();
            let sampler = texture.sampler();
            device.update_sampler(entry.value.native, &sampler)?;

            // Texels still pending build the chain once they are uploaded.
            if sampler.mipmap && !entry.value.mipmap && entry.value.pending.is_none() {
                device.generate_mipmaps(entry.value.native)?;
                entry.value.mipmap = true;
            }

            entry.parameters = parameters;
        }

        if let Some(pending) = entry.value.pending {
            let state = texture.state();
            let bpp = state.params.format.size() as u64;
            let row = u64::from(pending.w) * bpp;
            let remaining = budget.saturating_sub(stats.texture_bytes);

            let mut rows = if row == 0 {
                u64::from(pending.h)
            } else {
                (remaining / row).min(u64::from(pending.h))
            };

            // Uploads at least one row per frame, otherwise a single texture
            // larger than the budget would never finish.
            if rows == 0 && stats.texture_bytes == 0 {
                rows = 1;
            }

            if rows > 0 {
                let rect = Rect::new(pending.x, pending.y, pending.w, rows as u32);
                let texels = state.extract(rect);
                device.update_texture(entry.value.native, state.params.format, rect, &texels)?;

                stats.texture_bytes += row * rows;
                stats.uploaded_bytes += texels.len();

                entry.value.pending = if rows < u64::from(pending.h) {
                    Some(Rect::new(pending.x, pending.y + rows as u32, pending.w, pending.h - rows as u32))
                } else {
                    None
                };

                if entry.value.pending.is_none() {
                    if state.params.sampler.mipmap {
                        device.generate_mipmaps(entry.value.native)?;
                    }

                    entry.value.mipmap = state.params.sampler.mipmap;
                }
            }
        }

        Ok(entry.value.native)
    }

    /// Returns true if `texture` still has texels waiting for upload budget.
    pub fn is_texture_pending(&self, texture: &Texture) -> bool {
        self.textures
            .get(texture.handle())
            .map(|v| v.value.pending.is_some())
            .unwrap_or(false)
    }

    /// Returns the shader compiled from `source`, taking a reference to it.
    fn compile(&mut self, key: ShaderKey, source: &str) -> Result<NativeShader> {
        if let Some(v) = self.shaders.get_mut(&key) {
            v.programs += 1;
            return Ok(v.native);
        }

        let native = self.device.create_shader(key.0, source)?;
        debug!("[RenderDriver] compiled {:?} shader {:?}.", key.0, native);
        self.shaders.insert(key, ShaderSlot { native, programs: 1 });
        Ok(native)
    }

    fn link(&mut self, params: &ProgramParams) -> Result<ProgramSlot> {
        let vk: ShaderKey = (ShaderStage::Vertex, params.vs.as_str().into());
        let fk: ShaderKey = (ShaderStage::Fragment, params.fs.as_str().into());

        let vs = self.compile(vk, &params.vs)?;
        let fs = match self.compile(fk, &params.fs) {
            Ok(fs) => fs,
            Err(err) => {
                release_shaders(&mut self.device, &mut self.shaders, &[vk]);
                return Err(err);
            }
        };

        let native = match self.device.create_program(vs, fs) {
            Ok(native) => native,
            Err(err) => {
                release_shaders(&mut self.device, &mut self.shaders, &[vk, fk]);
                return Err(err);
            }
        };

        let mut uniforms: FastHashMap<HashValue<str>, i32> = FastHashMap::default();
        for name in &params.uniforms {
            match self.device.uniform_location(native, name) {
                Some(location) => {
                    uniforms.insert(name.into(), location);
                }
                None => warn!("[RenderDriver] uniform {} is not active in {:?}.", name, native),
            }
        }

        let mut samplers: FastHashMap<HashValue<str>, (i32, u32)> = FastHashMap::default();
        for (unit, name) in params.samplers.iter().enumerate() {
            match self.device.uniform_location(native, name) {
                Some(location) => {
                    samplers.insert(name.into(), (location, unit as u32));
                }
                None => warn!("[RenderDriver] sampler {} is not active in {:?}.", name, native),
            }
        }

        Ok(ProgramSlot {
            native,
            linked: true,
            shaders: vec![vk, fk],
            uniforms,
            samplers,
        })
    }

    /// Compiles and links `program` if it changed since the last call. Returns
    /// false if it failed to compile or link; the failure is logged and draws
    /// using it are skipped until its sources change.
    pub fn prepare_program(&mut self, program: &Program) -> Result<bool> {
        let handle = program.handle();
        let now = self.now;

        if let Some(entry) = self.programs.get_mut(handle) {
            if !entry.is_stale(program.generation_ref()) {
                if let Some(expiration) = program.expiration() {
                    entry.expiration = expiration;
                }

                let linked = entry.value.linked;
                self.programs.touch(handle, now);
                return Ok(linked);
            }
        }

        let generation = program.generation();
        let params = program.state().clone();

        let slot = match self.link(&params) {
            Ok(slot) => slot,
            Err(err) => {
                error!("[RenderDriver] failed to build {}, {}", handle, err);
                ProgramSlot {
                    native: NativeProgram::default(),
                    linked: false,
                    shaders: Vec::new(),
                    uniforms: FastHashMap::default(),
                    samplers: FastHashMap::default(),
                }
            }
        };

        let linked = slot.linked;
        let expiration = expiration_or(program.expiration(), self.params.program_expiration);

        let replaced = match self.programs.get_mut(handle) {
            Some(entry) => {
                entry.last_used = now;
                entry.expiration = expiration;
                entry.generation = generation;
                Some(::std::mem::replace(&mut entry.value, slot))
            }
            None => {
                let entry = self.programs.insert(handle, slot, expiration, now);
                entry.generation = generation;
                None
            }
        };

        if let Some(old) = replaced {
            self.programs.retire(old);
        }

        Ok(linked)
    }

    /// Builds `vertex_array` and the buffers it references, and returns its
    /// native object. The vertex array is rebuilt if it changed, or if any of
    /// its buffers was respecified.
    pub fn prepare_vertex_array(&mut self, vertex_array: &VertexArray) -> Result<NativeVertexArray> {
        let handle = vertex_array.handle();
        let now = self.now;

        let generation = vertex_array.generation();
        let state = vertex_array.state().clone();

        let mut handles: SmallVec<[BufferHandle; 4]> = SmallVec::new();
        for v in &state.attributes {
            if !handles.contains(&v.buffer) {
                handles.push(v.buffer);
            }
        }

        if let Some((index, _)) = state.index {
            if !handles.contains(&index) {
                handles.push(index);
            }
        }

        let mut buffers = Vec::with_capacity(handles.len());
        for &h in &handles {
            let buffer = match self.resources.buffer(h) {
                Some(buffer) => buffer,
                None => return Err(Error::InvalidHandle(ResourceKind::Buffer, h.to_string()).into()),
            };

            self.prepare_buffer(&buffer)?;
            let slot = match self.buffers.get(h) {
                Some(entry) => &entry.value,
                None => return Err(Error::InvalidHandle(ResourceKind::Buffer, h.to_string()).into()),
            };

            buffers.push((h, slot.native.clone(), slot.respecifications));
        }

        let resolve = |h: BufferHandle| {
            buffers
                .iter()
                .find(|v| v.0 == h)
                .map(|v| *v.1)
                .unwrap_or_default()
        };

        let attributes: Vec<_> = state
            .attributes
            .iter()
            .map(|v| NativeAttribute {
                location: v.location,
                buffer: resolve(v.buffer),
                format: v.format,
                size: v.size,
                normalized: v.normalized,
                stride: v.stride,
                offset: v.offset,
                divisor: v.divisor,
            }).collect();

        let index = state.index.map(|v| resolve(v.0));

        self.vertex_arrays.touch(handle, now);
        if let Some(entry) = self.vertex_arrays.get_mut(handle) {
            if let Some(expiration) = vertex_array.expiration() {
                entry.expiration = expiration;
            }

            let outdated = entry.value.buffers.len() != buffers.len()
                || entry
                    .value
                    .buffers
                    .iter()
                    .zip(buffers.iter())
                    .any(|(lhs, rhs)| lhs.0 != rhs.0 || *lhs.1 != *rhs.1 || lhs.2 != rhs.2);

            if entry.generation < generation || outdated {
                self.device
                    .update_vertex_array(entry.value.native, &attributes, index)?;
                entry.value.buffers = buffers;
                entry.value.index = state.index.map(|v| v.1);
                entry.generation = generation;
            }

            return Ok(entry.value.native);
        }

        let native = self.device.create_vertex_array(&attributes, index)?;
        let slot = VertexArraySlot {
            native,
            buffers,
            index: state.index.map(|v| v.1),
        };

        let expiration = expiration_or(vertex_array.expiration(), self.params.vertex_array_expiration);
        let entry = self.vertex_arrays.insert(handle, slot, expiration, now);
        entry.generation = generation;
        Ok(native)
    }

    pub fn prepare_render_buffer(&mut self, render_buffer: &RenderBuffer) -> Result<NativeRenderBuffer> {
        let handle = render_buffer.handle();
        let now = self.now;

        if let Some(entry) = self.render_buffers.get_mut(handle) {
            if !entry.is_stale(render_buffer.generation_ref()) {
                if let Some(expiration) = render_buffer.expiration() {
                    entry.expiration = expiration;
                }

                let native = entry.value.native;
                self.render_buffers.touch(handle, now);
                return Ok(native);
            }
        }

        let generation = render_buffer.generation();
        let state = render_buffer.state();
        let native = self
            .device
            .create_render_buffer(state.format, state.dimensions)?;

        let slot = RenderBufferSlot {
            native,
            format: state.format,
            dimensions: state.dimensions,
        };

        let expiration = expiration_or(render_buffer.expiration(), self.params.render_buffer_expiration);
        let replaced = match self.render_buffers.get_mut(handle) {
            Some(entry) => {
                entry.last_used = now;
                entry.expiration = expiration;
                entry.generation = generation;
                Some(::std::mem::replace(&mut entry.value, slot))
            }
            None => {
                let entry = self.render_buffers.insert(handle, slot, expiration, now);
                entry.generation = generation;
                None
            }
        };

        if let Some(old) = replaced {
            self.render_buffers.retire(old);
        }

        Ok(native)
    }

    /// Builds `framebuffer` and its attachments, and returns its native object
    /// together with its dimensions.
    pub fn prepare_framebuffer(&mut self, framebuffer: &FrameBuffer) -> Result<(NativeFramebuffer, (u32, u32))> {
        let handle = framebuffer.handle();
        let now = self.now;

        let generation = framebuffer.generation();
        let state = framebuffer.state().clone();

        let mut colors = Vec::with_capacity(state.colors.len());
        let mut dimensions = None;
        for &h in &state.colors {
            let texture = match self.resources.texture(h) {
                Some(texture) => texture,
                None => return Err(Error::InvalidHandle(ResourceKind::Texture, h.to_string()).into()),
            };

            colors.push(self.prepare_texture(&texture)?);
            dimensions = dimensions.or_else(|| Some(texture.dimensions()));
        }

        let mut depth_stencil = None;
        if let Some(h) = state.depth_stencil {
            let render_buffer = match self.resources.render_buffer(h) {
                Some(render_buffer) => render_buffer,
                None => return Err(Error::InvalidHandle(ResourceKind::RenderBuffer, h.to_string()).into()),
            };

            let native = self.prepare_render_buffer(&render_buffer)?;
            depth_stencil = Some((native, render_buffer.format()));
            dimensions = dimensions.or_else(|| Some(render_buffer.dimensions()));
        }

        let dimensions = dimensions.unwrap_or((0, 0));

        self.framebuffers.touch(handle, now);
        if let Some(entry) = self.framebuffers.get_mut(handle) {
            if let Some(expiration) = framebuffer.expiration() {
                entry.expiration = expiration;
            }

            let outdated = entry.value.colors != colors
                || entry.value.depth_stencil != depth_stencil.map(|v| v.0);

            if entry.generation >= generation && !outdated {
                return Ok((entry.value.native, entry.value.dimensions));
            }
        }

        let native = self.device.create_framebuffer(&colors, depth_stencil)?;
        let slot = FrameBufferSlot {
            native,
            colors,
            depth_stencil: depth_stencil.map(|v| v.0),
            dimensions,
        };

        let expiration = expiration_or(framebuffer.expiration(), self.params.framebuffer_expiration);
        let replaced = match self.framebuffers.get_mut(handle) {
            Some(entry) => {
                entry.expiration = expiration;
                entry.generation = generation;
                Some(::std::mem::replace(&mut entry.value, slot))
            }
            None => {
                let entry = self.framebuffers.insert(handle, slot, expiration, now);
                entry.generation = generation;
                None
            }
        };

        if let Some(old) = replaced {
            self.framebuffers.retire(old);
        }

        Ok((native, dimensions))
    }

    /// Closes the current queue segment and opens a new one, which starts by
    /// applying `command`.
    pub fn new_segment(&mut self, command: PipelineCommand) -> Result<()> {
        let command = match command {
            PipelineCommand::BindFrameBuffer(None) => StateCommand::BindFramebuffer {
                framebuffer: None,
                dimensions: self.surface_dimensions,
            },
            PipelineCommand::BindFrameBuffer(Some(framebuffer)) => {
                let (native, dimensions) = self.prepare_framebuffer(&framebuffer)?;
                let handle = framebuffer.handle();
                self.framebuffers.pin(handle);
                self.queue.pin(Pin::FrameBuffer(handle));

                StateCommand::BindFramebuffer {
                    framebuffer: Some(native),
                    dimensions,
                }
            }
            PipelineCommand::SetViewport(rect) => StateCommand::SetViewport(rect),
            PipelineCommand::SetScissor(rect) => StateCommand::SetScissor(rect),
            PipelineCommand::SetBlend(blend) => StateCommand::SetBlend(blend),
            PipelineCommand::SetDepthStencil(v) => StateCommand::SetDepthStencil(v),
            PipelineCommand::DrawBuffers(n) => StateCommand::DrawBuffers(n),
            PipelineCommand::Clear {
                color,
                depth,
                stencil,
            } => StateCommand::Clear {
                color,
                depth,
                stencil,
            },
        };

        self.queue.new_segment(Some(command));
        Ok(())
    }

    /// Resolves every resource of `dc`, uploading what changed, and records it
    /// into the current segment. Textures and uniforms without an active
    /// location are skipped with a warning.
    pub fn create_render_command(&mut self, dc: &DrawCall) -> Result<CommandRef> {
        match self.record(dc) {
            Ok(v) => Ok(v),
            Err(err) => {
                self.stats.skipped += 1;
                Err(err)
            }
        }
    }

    fn record(&mut self, dc: &DrawCall) -> Result<CommandRef> {
        let program = dc.program.handle();
        if !self.prepare_program(&dc.program)? {
            bail!("{} is not linked, the draw is skipped.", program);
        }

        let vertex_array = self.prepare_vertex_array(&dc.vertex_array)?;
        let uniform_buffer = match dc.uniform_buffer {
            Some(ref buffer) => Some((buffer.handle(), self.prepare_buffer(buffer)?)),
            None => None,
        };

        let (native, samplers, mut uniforms) = {
            let slot = match self.programs.get(program) {
                Some(entry) => &entry.value,
                None => return Err(Error::InvalidHandle(ResourceKind::Program, program.to_string()).into()),
            };

            let mut samplers: SmallVec<[(i32, u32, &Texture); 4]> = SmallVec::new();
            for &(name, ref texture) in &dc.textures {
                match slot.samplers.get(&name) {
                    Some(&(location, unit)) if unit < self.params.max_texture_units => {
                        samplers.push((location, unit, texture));
                    }
                    Some(&(_, unit)) => {
                        warn!("[RenderDriver] texture unit {} exceeds the limit, skipped.", unit);
                    }
                    None => warn!("[RenderDriver] sampler {:?} not found in {}, skipped.", name, program),
                }
            }

            let mut uniforms: SmallVec<[(i32, UniformValue); 8]> = SmallVec::new();
            for &(name, value) in &dc.uniforms {
                match slot.uniforms.get(&name) {
                    Some(&location) => uniforms.push((location, value)),
                    None => warn!("[RenderDriver] uniform {:?} not found in {}, skipped.", name, program),
                }
            }

            (slot.native, samplers, uniforms)
        };

        let mut textures: SmallVec<[(u32, NativeTexture); 4]> = SmallVec::new();
        let mut pins: SmallVec<[TextureHandle; 4]> = SmallVec::new();
        for (location, unit, texture) in samplers {
            let native = self.prepare_texture(texture)?;
            textures.push((unit, native));
            uniforms.push((location, UniformValue::I32(unit as i32)));
            pins.push(texture.handle());
        }

        textures.sort();

        let state = RenderState {
            program: native,
            vertex_array,
            uniform_buffer: uniform_buffer.map(|v| v.1),
            textures,
        };

        let command = RenderCommand {
            primitive: dc.primitive,
            first: dc.first,
            count: dc.count,
            index: dc.vertex_array.index_format(),
            uniforms: self.queue.store_uniforms(&uniforms),
        };

        self.programs.pin(program);
        self.queue.pin(Pin::Program(program));

        let handle = dc.vertex_array.handle();
        self.vertex_arrays.pin(handle);
        self.queue.pin(Pin::VertexArray(handle));

        if let Some((handle, _)) = uniform_buffer {
            self.buffers.pin(handle);
            self.queue.pin(Pin::Buffer(handle));
        }

        for handle in pins {
            self.textures.pin(handle);
            self.queue.pin(Pin::Texture(handle));
        }

        Ok(self.queue.push(state, command, dc.is_translucent()))
    }

    fn unpin(&mut self) {
        for pin in self.queue.take_pins() {
            match pin {
                Pin::Buffer(h) => self.buffers.unpin(h),
                Pin::Texture(h) => self.textures.unpin(h),
                Pin::Program(h) => self.programs.unpin(h),
                Pin::VertexArray(h) => self.vertex_arrays.unpin(h),
                Pin::FrameBuffer(h) => self.framebuffers.unpin(h),
            }
        }
    }

    /// Executes every recorded segment in order, and clears the queue.
    pub fn flush(&mut self) -> FlushStats {
        let stats = self.queue.flush(&mut self.device);
        self.unpin();
        self.stats.merge_flush(&stats);
        stats
    }

    /// Starts a new frame.
    pub fn pre_frame(&mut self) {
        self.pre_frame_at(Instant::now());
    }

    /// Starts a new frame at `now`: resets the frame counters and the upload
    /// budget, reclaims released resources and polls the fences of the upload
    /// pool.
    pub fn pre_frame_at(&mut self, now: Instant) {
        self.now = now;
        self.stats = FrameStats::default();

        if self.queue.len() > 0 {
            warn!(
                "[RenderDriver] discards {} commands which were never flushed.",
                self.queue.len()
            );
        }

        self.queue.clear();
        self.unpin();

        for v in self.thread.drain() {
            match v.kind {
                ResourceKind::Buffer => self.buffers.release(v.handle.into()),
                ResourceKind::Texture => self.textures.release(v.handle.into()),
                ResourceKind::Program => self.programs.release(v.handle.into()),
                ResourceKind::VertexArray => self.vertex_arrays.release(v.handle.into()),
                ResourceKind::FrameBuffer => self.framebuffers.release(v.handle.into()),
                ResourceKind::RenderBuffer => self.render_buffers.release(v.handle.into()),
                ResourceKind::Shader => {}
            }
        }

        self.collect();
        self.pool.advance_fences(&mut self.device);
    }

    /// Destroys the native objects of released and expired resources. Entries
    /// still referenced are only marked as expired and retried later.
    pub fn collect(&mut self) -> CollectStats {
        let now = self.now;
        let device = &mut self.device;
        let mut stats = CollectStats::default();

        let mut merge = |v: CollectStats| {
            stats.destroyed += v.destroyed;
            stats.soft_deleted += v.soft_deleted;
        };

        merge(self.framebuffers.collect(now, |v| device.delete_framebuffer(v.native)));
        merge(self.vertex_arrays.collect(now, |v| device.delete_vertex_array(v.native)));
        merge(self.buffers.collect(now, |v| device.delete_buffer(*v.native)));
        merge(self.textures.collect(now, |v| device.delete_texture(v.native)));
        merge(self.render_buffers.collect(now, |v| device.delete_render_buffer(v.native)));
        let shaders = &mut self.shaders;
        merge(self.programs.collect(now, |v| {
            if !v.native.is_null() {
                device.delete_program(v.native);
            }

            release_shaders(device, shaders, &v.shaders);
        }));

        if stats.destroyed > 0 {
            debug!("[RenderDriver] collected {} native objects.", stats.destroyed);
        }

        self.stats.merge_collect(&stats);
        stats
    }

    /// Ends the frame: finalizes the frame counters, and trims the upload pool
    /// every `trim_interval` frames.
    pub fn post_frame(&mut self) {
        self.frames += 1;
        self.last_stats = self.stats;

        let params = self.params.upload_pool;
        if params.trim_interval == 0 || self.frames % params.trim_interval != 0 {
            return;
        }

        let (target, max) = (params.target_size, params.max_size);
        if let Some(ref worker) = self.worker {
            let pool = self.pool.clone();
            let scheduled = worker.schedule(move |device: &mut D| {
                pool.trim(device, target, max, Instant::now());
            });

            if scheduled.is_ok() {
                return;
            }

            warn!("[RenderDriver] worker {} is gone, trims inline.", worker.name());
        }

        self.pool.trim(&mut self.device, target, max, self.now);
    }

    /// Drops the recorded commands and destroys every native object, used when
    /// the context is lost. Resources are rebuilt from scratch on next use.
    pub fn skip_frame_and_release_resources(&mut self) {
        info!("[RenderDriver] releases all the native resources.");

        self.queue.clear();
        drop(self.queue.take_pins());
        drop(self.thread.drain());

        let device = &mut self.device;
        self.framebuffers.clear(|v| device.delete_framebuffer(v.native));
        self.vertex_arrays.clear(|v| device.delete_vertex_array(v.native));
        self.buffers.clear(|v| device.delete_buffer(*v.native));
        self.textures.clear(|v| device.delete_texture(v.native));
        self.render_buffers.clear(|v| device.delete_render_buffer(v.native));
        let shaders = &mut self.shaders;
        self.programs.clear(|v| {
            if !v.native.is_null() {
                device.delete_program(v.native);
            }

            release_shaders(device, shaders, &v.shaders);
        });

        for (_, v) in self.shaders.drain() {
            device.delete_shader(v.native);
        }

        self.pool.clear(device);
    }
}

impl<D: Device + 'static> Drop for RenderDriver<D> {
    fn drop(&mut self) {
        self.worker.take();
        self.skip_frame_and_release_resources();
    }
}
