//! The backend of renderer, which should be responsible for only one thing:
//! executing native calls with low-level video APIs.
//!
//! Everything above this layer works in terms of the `Device` trait and the
//! plain native object ids declared here.

#[cfg(not(target_arch = "wasm32"))]
pub mod gl;
pub mod headless;

use std::ptr;

use crate::errors::*;
use crate::utils::prelude::*;
use crate::video::assets::prelude::*;
use crate::video::command::{Primitive, StateCommand};

macro_rules! impl_native {
    ($name:ident, $ty:ty) => {
        #[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub $ty);

        impl $name {
            /// Returns true if this is the null object of the native API.
            #[inline]
            pub fn is_null(self) -> bool {
                self.0 == 0
            }
        }
    };
}

impl_native!(NativeBuffer, u32);
impl_native!(NativeTexture, u32);
impl_native!(NativeShader, u32);
impl_native!(NativeProgram, u32);
impl_native!(NativeVertexArray, u32);
impl_native!(NativeFramebuffer, u32);
impl_native!(NativeRenderBuffer, u32);
impl_native!(NativeFence, u64);

/// A vertex attribute with its source buffer resolved.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct NativeAttribute {
    pub location: u32,
    pub buffer: NativeBuffer,
    pub format: VertexFormat,
    pub size: u8,
    pub normalized: bool,
    pub stride: u32,
    pub offset: u32,
    pub divisor: u32,
}

/// A persistent CPU mapping of a native buffer. It stays valid until the
/// buffer is deleted.
#[derive(Debug, Copy, Clone)]
pub struct MappedMemory {
    ptr: *mut u8,
    len: usize,
}

unsafe impl Send for MappedMemory {}
unsafe impl Sync for MappedMemory {}

impl MappedMemory {
    /// Wraps a mapping of `len` bytes starting at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for writes of `len` bytes for as long as this value,
    /// or any of its copies, is used.
    pub unsafe fn new(ptr: *mut u8, len: usize) -> Self {
        MappedMemory { ptr, len }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copies `bytes` into the mapping at `offset`.
    pub fn write(&self, offset: usize, bytes: &[u8]) {
        assert!(
            offset + bytes.len() <= self.len,
            "Mapped write [{}, {}) out of bounds {}.",
            offset,
            offset + bytes.len(),
            self.len
        );

        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.add(offset), bytes.len());
        }
    }
}

/// The native API surface consumed by render drivers.
///
/// Creation and upload calls return errors, while deletions and binds are
/// infallible from the caller's point of view. Implementations should log the
/// failures they can not report.
pub trait Device {
    fn create_buffer(
        &mut self,
        usage: BufferUsage,
        size: usize,
        data: Option<&[u8]>,
    ) -> Result<NativeBuffer>;

    /// Reallocates the whole store of `buffer`.
    fn respecify_buffer(
        &mut self,
        buffer: NativeBuffer,
        usage: BufferUsage,
        size: usize,
        data: Option<&[u8]>,
    ) -> Result<()>;

    fn update_buffer(&mut self, buffer: NativeBuffer, offset: usize, data: &[u8]) -> Result<()>;

    fn copy_buffer(
        &mut self,
        src: NativeBuffer,
        src_offset: usize,
        dst: NativeBuffer,
        dst_offset: usize,
        len: usize,
    ) -> Result<()>;

    /// Creates a staging buffer, with a persistent write mapping if the
    /// implementation supports one.
    fn create_upload_buffer(&mut self, size: usize)
        -> Result<(NativeBuffer, Option<MappedMemory>)>;

    fn delete_buffer(&mut self, buffer: NativeBuffer);

    fn create_texture(&mut self, params: &TextureParams) -> Result<NativeTexture>;

    /// Writes tightly packed texels into `rect`.
    fn update_texture(
        &mut self,
        texture: NativeTexture,
        format: TextureFormat,
        rect: Rect,
        texels: &[u8],
    ) -> Result<()>;

    fn update_sampler(&mut self, texture: NativeTexture, sampler: &SamplerParams) -> Result<()>;

    fn generate_mipmaps(&mut self, texture: NativeTexture) -> Result<()>;

    fn delete_texture(&mut self, texture: NativeTexture);

    /// Compiles a shader, the error carries the full compiler log.
    fn create_shader(&mut self, stage: ShaderStage, source: &str) -> Result<NativeShader>;

    fn delete_shader(&mut self, shader: NativeShader);

    /// Links a program, the error carries the full linker log.
    fn create_program(&mut self, vs: NativeShader, fs: NativeShader) -> Result<NativeProgram>;

    fn uniform_location(&mut self, program: NativeProgram, name: &str) -> Option<i32>;

    fn delete_program(&mut self, program: NativeProgram);

    fn create_vertex_array(
        &mut self,
        attributes: &[NativeAttribute],
        index: Option<NativeBuffer>,
    ) -> Result<NativeVertexArray>;

    /// Re-records the attribute bindings of an existing vertex array.
    fn update_vertex_array(
        &mut self,
        vertex_array: NativeVertexArray,
        attributes: &[NativeAttribute],
        index: Option<NativeBuffer>,
    ) -> Result<()>;

    fn delete_vertex_array(&mut self, vertex_array: NativeVertexArray);

    fn create_render_buffer(
        &mut self,
        format: RenderBufferFormat,
        dimensions: (u32, u32),
    ) -> Result<NativeRenderBuffer>;

    fn delete_render_buffer(&mut self, render_buffer: NativeRenderBuffer);

    fn create_framebuffer(
        &mut self,
        colors: &[NativeTexture],
        depth_stencil: Option<(NativeRenderBuffer, RenderBufferFormat)>,
    ) -> Result<NativeFramebuffer>;

    fn delete_framebuffer(&mut self, framebuffer: NativeFramebuffer);

    /// Inserts a completion fence after all the commands issued so far.
    fn insert_fence(&mut self) -> Result<NativeFence>;

    /// Polls `fence` without blocking.
    fn fence_signaled(&mut self, fence: NativeFence) -> bool;

    fn delete_fence(&mut self, fence: NativeFence);

    fn apply(&mut self, command: &StateCommand) -> Result<()>;

    fn bind_program(&mut self, program: Option<NativeProgram>);

    fn bind_vertex_array(&mut self, vertex_array: Option<NativeVertexArray>);

    fn bind_uniform_buffer(&mut self, slot: u32, buffer: Option<NativeBuffer>);

    fn bind_texture(&mut self, unit: u32, texture: Option<NativeTexture>);

    fn set_uniform(&mut self, location: i32, value: &UniformValue);

    fn draw(
        &mut self,
        primitive: Primitive,
        first: u32,
        count: u32,
        index: Option<IndexFormat>,
    ) -> Result<()>;

    /// Blocks until all the issued commands have been executed.
    fn finish(&mut self);
}
