//! The OpenGL implementation of `Device`.
//!
//! Function pointers are global to the process once loaded, so a device for a
//! context sharing objects with the render thread is created with
//! `GLDevice::current` after the shared context has been made current.

pub mod capabilities;
pub mod types;

use std::ffi::CString;
use std::os::raw::c_void;
use std::ptr;

use gl;
use gl::types::*;
use smallvec::SmallVec;

use crate::errors::*;
use crate::utils::prelude::*;
use crate::video::assets::prelude::*;
use crate::video::command::{Comparison, Primitive, StateCommand};
use crate::video::errors::Error;
use crate::video::resource::ResourceKind;

use self::capabilities::Capabilities;
use super::{
    Device, MappedMemory, NativeAttribute, NativeBuffer, NativeFence, NativeFramebuffer,
    NativeProgram, NativeRenderBuffer, NativeShader, NativeTexture, NativeVertexArray,
};

struct GLState {
    framebuffer: GLuint,
    dimensions: (u32, u32),
    depth_write: bool,
    program: GLuint,
    vertex_array: GLuint,
    active_texture: u32,
}

pub struct GLDevice {
    capabilities: Capabilities,
    state: GLState,
    fences: FastHashMap<u64, GLsync>,
    fence_ids: u64,
    attributes: FastHashMap<NativeVertexArray, SmallVec<[u32; 8]>>,
}

impl GLDevice {
    /// Loads the OpenGL functions with `loader`, then creates a device for the
    /// current context.
    ///
    /// # Safety
    ///
    /// A context must be current on the calling thread.
    pub unsafe fn new<F>(loader: F) -> Result<Self>
    where
        F: FnMut(&str) -> *const c_void,
    {
        gl::load_with(loader);
        Self::current()
    }

    /// Creates a device for the current context, with functions loaded already.
    ///
    /// # Safety
    ///
    /// A context must be current on the calling thread.
    pub unsafe fn current() -> Result<Self> {
        let capabilities = Capabilities::parse()?;
        capabilities.check()?;

        info!(
            "[GL] {:?} by {}, renderer {}.",
            capabilities.version, capabilities.vendor, capabilities.renderer
        );

        debug!("[GL] {:#?}", capabilities);

        gl::PixelStorei(gl::UNPACK_ALIGNMENT, 1);
        check()?;

        Ok(GLDevice {
            capabilities,
            state: GLState {
                framebuffer: 0,
                dimensions: (0, 0),
                depth_write: true,
                program: 0,
                vertex_array: 0,
                active_texture: 0,
            },
            fences: FastHashMap::default(),
            fence_ids: 0,
            attributes: FastHashMap::default(),
        })
    }

    #[inline]
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Converts a top-left `rect` into the bottom-left space of GL.
    fn flip(&self, rect: Rect) -> (GLint, GLint, GLsizei, GLsizei) {
        let y = self.state.dimensions.1.saturating_sub(rect.bottom());
        (rect.x as GLint, y as GLint, rect.w as GLsizei, rect.h as GLsizei)
    }

    unsafe fn bind_texture_2d(&mut self, texture: NativeTexture) {
        if self.state.active_texture != 0 {
            gl::ActiveTexture(gl::TEXTURE0);
            self.state.active_texture = 0;
        }

        gl::BindTexture(gl::TEXTURE_2D, texture.0);
    }

    unsafe fn bind_texture_params(&mut self, sampler: &SamplerParams) -> Result<()> {
        let mut wrap = sampler.wrap;
        if wrap == TextureWrap::Border && !self.capabilities.has_border_clamp() {
            warn!("[GL] Border clamp is not supported, fallbacks to clamp to edge.");
            wrap = TextureWrap::Clamp;
        }

        let wrap: GLenum = wrap.into();
        gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_S, wrap as GLint);
        gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_T, wrap as GLint);

        let (min, mag) = types::texture_filters(sampler);
        gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, min as GLint);
        gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, mag as GLint);

        if wrap == gl::CLAMP_TO_BORDER {
            let color: [f32; 4] = sampler.border_color.into();
            gl::TexParameterfv(gl::TEXTURE_2D, gl::TEXTURE_BORDER_COLOR, color.as_ptr());
        }

        check()
    }

    unsafe fn record_attributes(
        &mut self,
        vertex_array: NativeVertexArray,
        attributes: &[NativeAttribute],
        index: Option<NativeBuffer>,
    ) -> Result<()> {
        gl::BindVertexArray(vertex_array.0);

        if let Some(locations) = self.attributes.get(&vertex_array) {
            for &location in locations {
                gl::DisableVertexAttribArray(location);
            }
        }

        let mut locations = SmallVec::new();
        for v in attributes {
            gl::BindBuffer(gl::ARRAY_BUFFER, v.buffer.0);
            gl::EnableVertexAttribArray(v.location);
            gl::VertexAttribPointer(
                v.location,
                GLint::from(v.size),
                v.format.into(),
                v.normalized as GLboolean,
                v.stride as GLsizei,
                v.offset as *const c_void,
            );

            gl::VertexAttribDivisor(v.location, v.divisor);
            locations.push(v.location);
        }

        gl::BindBuffer(gl::ELEMENT_ARRAY_BUFFER, index.map(|v| v.0).unwrap_or(0));

        gl::BindVertexArray(self.state.vertex_array);
        gl::BindBuffer(gl::ARRAY_BUFFER, 0);

        self.attributes.insert(vertex_array, locations);
        check()
    }
}

impl Drop for GLDevice {
    fn drop(&mut self) {
        unsafe {
            for (_, sync) in self.fences.drain() {
                gl::DeleteSync(sync);
            }
        }
    }
}

impl Device for GLDevice {
    fn create_buffer(
        &mut self,
        usage: BufferUsage,
        size: usize,
        data: Option<&[u8]>,
    ) -> Result<NativeBuffer> {
        unsafe {
            let mut id = 0;
            gl::GenBuffers(1, &mut id);
            if id == 0 {
                return Err(Error::Allocation(ResourceKind::Buffer).into());
            }

            let buffer = NativeBuffer(id);
            if let Err(err) = self.respecify_buffer(buffer, usage, size, data) {
                gl::DeleteBuffers(1, &id);
                return Err(err);
            }

            Ok(buffer)
        }
    }

    fn respecify_buffer(
        &mut self,
        buffer: NativeBuffer,
        usage: BufferUsage,
        size: usize,
        data: Option<&[u8]>,
    ) -> Result<()> {
        if let Some(data) = data {
            if data.len() > size {
                return Err(Error::OutOfBounds(data.len(), size).into());
            }
        }

        unsafe {
            gl::BindBuffer(gl::COPY_WRITE_BUFFER, buffer.0);
            gl::BufferData(
                gl::COPY_WRITE_BUFFER,
                size as GLsizeiptr,
                ptr::null(),
                usage.into(),
            );

            if let Some(data) = data {
                gl::BufferSubData(
                    gl::COPY_WRITE_BUFFER,
                    0,
                    data.len() as GLsizeiptr,
                    data.as_ptr() as *const c_void,
                );
            }

            check()
        }
    }

    fn update_buffer(&mut self, buffer: NativeBuffer, offset: usize, data: &[u8]) -> Result<()> {
        unsafe {
            gl::BindBuffer(gl::COPY_WRITE_BUFFER, buffer.0);
            gl::BufferSubData(
                gl::COPY_WRITE_BUFFER,
                offset as GLintptr,
                data.len() as GLsizeiptr,
                data.as_ptr() as *const c_void,
            );

            check()
        }
    }

    fn copy_buffer(
        &mut self,
        src: NativeBuffer,
        src_offset: usize,
        dst: NativeBuffer,
        dst_offset: usize,
        len: usize,
    ) -> Result<()> {
        unsafe {
            gl::BindBuffer(gl::COPY_READ_BUFFER, src.0);
            gl::BindBuffer(gl::COPY_WRITE_BUFFER, dst.0);
            gl::CopyBufferSubData(
                gl::COPY_READ_BUFFER,
                gl::COPY_WRITE_BUFFER,
                src_offset as GLintptr,
                dst_offset as GLintptr,
                len as GLsizeiptr,
            );

            check()
        }
    }

    fn create_upload_buffer(
        &mut self,
        size: usize,
    ) -> Result<(NativeBuffer, Option<MappedMemory>)> {
        if !self.capabilities.has_persistent_mapping() {
            let buffer = self.create_buffer(BufferUsage::Stream, size, None)?;
            return Ok((buffer, None));
        }

        unsafe {
            let mut id = 0;
            gl::GenBuffers(1, &mut id);
            if id == 0 {
                return Err(Error::Allocation(ResourceKind::Buffer).into());
            }

            let flags = gl::MAP_WRITE_BIT | gl::MAP_PERSISTENT_BIT | gl::MAP_COHERENT_BIT;
            gl::BindBuffer(gl::COPY_READ_BUFFER, id);
            gl::BufferStorage(gl::COPY_READ_BUFFER, size as GLsizeiptr, ptr::null(), flags);
            let ptr = gl::MapBufferRange(gl::COPY_READ_BUFFER, 0, size as GLsizeiptr, flags);

            if let Err(err) = check() {
                gl::DeleteBuffers(1, &id);
                return Err(err);
            }

            if ptr.is_null() {
                gl::DeleteBuffers(1, &id);
                return Err(Error::Allocation(ResourceKind::Buffer).into());
            }

            Ok((NativeBuffer(id), Some(MappedMemory::new(ptr as *mut u8, size))))
        }
    }

    fn delete_buffer(&mut self, buffer: NativeBuffer) {
        unsafe {
            gl::DeleteBuffers(1, &buffer.0);
        }
    }

    fn create_texture(&mut self, params: &TextureParams) -> Result<NativeTexture> {
        unsafe {
            let mut id = 0;
            gl::GenTextures(1, &mut id);
            if id == 0 {
                return Err(Error::Allocation(ResourceKind::Texture).into());
            }

            let texture = NativeTexture(id);
            let (internal, format, pixel_type) =
                types::texture_format(params.format, &self.capabilities);

            self.bind_texture_2d(texture);
            gl::TexImage2D(
                gl::TEXTURE_2D,
                0,
                internal as GLint,
                params.dimensions.0 as GLsizei,
                params.dimensions.1 as GLsizei,
                0,
                format,
                pixel_type,
                ptr::null(),
            );

            let result = check().and_then(|_| self.bind_texture_params(&params.sampler));
            if let Err(err) = result {
                gl::DeleteTextures(1, &id);
                return Err(err);
            }

            Ok(texture)
        }
    }

    fn update_texture(
        &mut self,
        texture: NativeTexture,
        format: TextureFormat,
        rect: Rect,
        texels: &[u8],
    ) -> Result<()> {
        let len = rect.w as usize * rect.h as usize * format.size();
        if texels.len() != len {
            return Err(Error::OutOfBounds(texels.len(), len).into());
        }

        unsafe {
            let (_, format, pixel_type) = types::texture_format(format, &self.capabilities);
            self.bind_texture_2d(texture);
            gl::TexSubImage2D(
                gl::TEXTURE_2D,
                0,
                rect.x as GLint,
                rect.y as GLint,
                rect.w as GLsizei,
                rect.h as GLsizei,
                format,
                pixel_type,
                texels.as_ptr() as *const c_void,
            );

            check()
        }
    }

    fn update_sampler(&mut self, texture: NativeTexture, sampler: &SamplerParams) -> Result<()> {
        unsafe {
            self.bind_texture_2d(texture);
            self.bind_texture_params(sampler)
        }
    }

    fn generate_mipmaps(&mut self, texture: NativeTexture) -> Result<()> {
        unsafe {
            self.bind_texture_2d(texture);
            gl::GenerateMipmap(gl::TEXTURE_2D);
            check()
        }
    }

    fn delete_texture(&mut self, texture: NativeTexture) {
        unsafe {
            gl::DeleteTextures(1, &texture.0);
        }
    }

    fn create_shader(&mut self, stage: ShaderStage, source: &str) -> Result<NativeShader> {
        let src = CString::new(source.as_bytes())
            .map_err(|_| Error::ShaderCompile("source contains nul byte".into()))?;

        unsafe {
            let stage = match stage {
                ShaderStage::Vertex => gl::VERTEX_SHADER,
                ShaderStage::Fragment => gl::FRAGMENT_SHADER,
            };

            let shader = gl::CreateShader(stage);
            if shader == 0 {
                return Err(Error::Allocation(ResourceKind::Shader).into());
            }

            gl::ShaderSource(shader, 1, &src.as_ptr(), ptr::null());
            gl::CompileShader(shader);

            let mut status = GLint::from(gl::FALSE);
            gl::GetShaderiv(shader, gl::COMPILE_STATUS, &mut status);

            if status != GLint::from(gl::TRUE) {
                let mut len = 0;
                gl::GetShaderiv(shader, gl::INFO_LOG_LENGTH, &mut len);
                let mut buf = vec![0u8; len.max(1) as usize];
                gl::GetShaderInfoLog(
                    shader,
                    len,
                    ptr::null_mut(),
                    buf.as_mut_ptr() as *mut GLchar,
                );

                gl::DeleteShader(shader);
                return Err(Error::ShaderCompile(info_log(buf)).into());
            }

            Ok(NativeShader(shader))
        }
    }

    fn delete_shader(&mut self, shader: NativeShader) {
        unsafe {
            gl::DeleteShader(shader.0);
        }
    }

    fn create_program(&mut self, vs: NativeShader, fs: NativeShader) -> Result<NativeProgram> {
        unsafe {
            let program = gl::CreateProgram();
            if program == 0 {
                return Err(Error::Allocation(ResourceKind::Program).into());
            }

            gl::AttachShader(program, vs.0);
            gl::AttachShader(program, fs.0);
            gl::LinkProgram(program);
            gl::DetachShader(program, vs.0);
            gl::DetachShader(program, fs.0);

            let mut status = GLint::from(gl::FALSE);
            gl::GetProgramiv(program, gl::LINK_STATUS, &mut status);

            if status != GLint::from(gl::TRUE) {
                let mut len: GLint = 0;
                gl::GetProgramiv(program, gl::INFO_LOG_LENGTH, &mut len);
                let mut buf = vec![0u8; len.max(1) as usize];
                gl::GetProgramInfoLog(
                    program,
                    len,
                    ptr::null_mut(),
                    buf.as_mut_ptr() as *mut GLchar,
                );

                gl::DeleteProgram(program);
                return Err(Error::ProgramLink(info_log(buf)).into());
            }

            Ok(NativeProgram(program))
        }
    }

    fn uniform_location(&mut self, program: NativeProgram, name: &str) -> Option<i32> {
        let name = CString::new(name.as_bytes()).ok()?;
        let location = unsafe { gl::GetUniformLocation(program.0, name.as_ptr()) };
        if location < 0 {
            None
        } else {
            Some(location)
        }
    }

    fn delete_program(&mut self, program: NativeProgram) {
        unsafe {
            if self.state.program == program.0 {
                gl::UseProgram(0);
                self.state.program = 0;
            }

            gl::DeleteProgram(program.0);
        }
    }

    fn create_vertex_array(
        &mut self,
        attributes: &[NativeAttribute],
        index: Option<NativeBuffer>,
    ) -> Result<NativeVertexArray> {
        unsafe {
            let mut id = 0;
            gl::GenVertexArrays(1, &mut id);
            if id == 0 {
                return Err(Error::Allocation(ResourceKind::VertexArray).into());
            }

            let vertex_array = NativeVertexArray(id);
            if let Err(err) = self.record_attributes(vertex_array, attributes, index) {
                self.delete_vertex_array(vertex_array);
                return Err(err);
            }

            Ok(vertex_array)
        }
    }

    fn update_vertex_array(
        &mut self,
        vertex_array: NativeVertexArray,
        attributes: &[NativeAttribute],
        index: Option<NativeBuffer>,
    ) -> Result<()> {
        unsafe { self.record_attributes(vertex_array, attributes, index) }
    }

    fn delete_vertex_array(&mut self, vertex_array: NativeVertexArray) {
        self.attributes.remove(&vertex_array);

        unsafe {
            if self.state.vertex_array == vertex_array.0 {
                gl::BindVertexArray(0);
                self.state.vertex_array = 0;
            }

            gl::DeleteVertexArrays(1, &vertex_array.0);
        }
    }

    fn create_render_buffer(
        &mut self,
        format: RenderBufferFormat,
        dimensions: (u32, u32),
    ) -> Result<NativeRenderBuffer> {
        unsafe {
            let mut id = 0;
            gl::GenRenderbuffers(1, &mut id);
            if id == 0 {
                return Err(Error::Allocation(ResourceKind::RenderBuffer).into());
            }

            gl::BindRenderbuffer(gl::RENDERBUFFER, id);
            gl::RenderbufferStorage(
                gl::RENDERBUFFER,
                format.into(),
                dimensions.0 as GLsizei,
                dimensions.1 as GLsizei,
            );
            gl::BindRenderbuffer(gl::RENDERBUFFER, 0);

            if let Err(err) = check() {
                gl::DeleteRenderbuffers(1, &id);
                return Err(err);
            }

            Ok(NativeRenderBuffer(id))
        }
    }

    fn delete_render_buffer(&mut self, render_buffer: NativeRenderBuffer) {
        unsafe {
            gl::DeleteRenderbuffers(1, &render_buffer.0);
        }
    }

    fn create_framebuffer(
        &mut self,
        colors: &[NativeTexture],
        depth_stencil: Option<(NativeRenderBuffer, RenderBufferFormat)>,
    ) -> Result<NativeFramebuffer> {
        if colors.len() > self.capabilities.max_color_attachments as usize {
            let msg = format!("{} color attachments", colors.len());
            return Err(Error::Unsupported(msg).into());
        }

        unsafe {
            let mut id = 0;
            gl::GenFramebuffers(1, &mut id);
            if id == 0 {
                return Err(Error::Allocation(ResourceKind::FrameBuffer).into());
            }

            gl::BindFramebuffer(gl::FRAMEBUFFER, id);

            for (i, texture) in colors.iter().enumerate() {
                gl::FramebufferTexture2D(
                    gl::FRAMEBUFFER,
                    gl::COLOR_ATTACHMENT0 + i as GLenum,
                    gl::TEXTURE_2D,
                    texture.0,
                    0,
                );
            }

            if let Some((render_buffer, format)) = depth_stencil {
                gl::FramebufferRenderbuffer(
                    gl::FRAMEBUFFER,
                    types::attachment(format),
                    gl::RENDERBUFFER,
                    render_buffer.0,
                );
            }

            let status = gl::CheckFramebufferStatus(gl::FRAMEBUFFER);
            gl::BindFramebuffer(gl::FRAMEBUFFER, self.state.framebuffer);

            if status != gl::FRAMEBUFFER_COMPLETE {
                gl::DeleteFramebuffers(1, &id);
                let reason = match status {
                    gl::FRAMEBUFFER_INCOMPLETE_ATTACHMENT => "incomplete attachment".to_owned(),
                    gl::FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT => "missing attachment".to_owned(),
                    gl::FRAMEBUFFER_UNSUPPORTED => "unsupported".to_owned(),
                    v => format!("status 0x{:X}", v),
                };

                return Err(Error::IncompleteFramebuffer(reason).into());
            }

            check()?;
            Ok(NativeFramebuffer(id))
        }
    }

    fn delete_framebuffer(&mut self, framebuffer: NativeFramebuffer) {
        unsafe {
            if self.state.framebuffer == framebuffer.0 {
                gl::BindFramebuffer(gl::FRAMEBUFFER, 0);
                self.state.framebuffer = 0;
            }

            gl::DeleteFramebuffers(1, &framebuffer.0);
        }
    }

    fn insert_fence(&mut self) -> Result<NativeFence> {
        if !self.capabilities.has_fences() {
            return Err(Error::Unsupported("sync objects".into()).into());
        }

        unsafe {
            let sync = gl::FenceSync(gl::SYNC_GPU_COMMANDS_COMPLETE, 0);
            if sync.is_null() {
                check()?;
                bail!("[GL] Failed to create fence.");
            }

            gl::Flush();

            self.fence_ids += 1;
            self.fences.insert(self.fence_ids, sync);
            Ok(NativeFence(self.fence_ids))
        }
    }

    fn fence_signaled(&mut self, fence: NativeFence) -> bool {
        let sync = match self.fences.get(&fence.0) {
            Some(&v) => v,
            None => return true,
        };

        unsafe {
            match gl::ClientWaitSync(sync, 0, 0) {
                gl::ALREADY_SIGNALED | gl::CONDITION_SATISFIED => true,
                gl::TIMEOUT_EXPIRED => false,
                _ => {
                    warn!("[GL] Failed to poll fence {:?}.", fence);
                    true
                }
            }
        }
    }

    fn delete_fence(&mut self, fence: NativeFence) {
        if let Some(sync) = self.fences.remove(&fence.0) {
            unsafe {
                gl::DeleteSync(sync);
            }
        }
    }

    fn apply(&mut self, command: &StateCommand) -> Result<()> {
        unsafe {
            match *command {
                StateCommand::BindFramebuffer {
                    framebuffer,
                    dimensions,
                } => {
                    let id = framebuffer.map(|v| v.0).unwrap_or(0);
                    gl::BindFramebuffer(gl::FRAMEBUFFER, id);
                    gl::Viewport(0, 0, dimensions.0 as GLsizei, dimensions.1 as GLsizei);
                    self.state.framebuffer = id;
                    self.state.dimensions = dimensions;
                }

                StateCommand::SetViewport(rect) => {
                    let (x, y, w, h) = self.flip(rect);
                    gl::Viewport(x, y, w, h);
                }

                StateCommand::SetScissor(None) => gl::Disable(gl::SCISSOR_TEST),
                StateCommand::SetScissor(Some(rect)) => {
                    let (x, y, w, h) = self.flip(rect);
                    gl::Enable(gl::SCISSOR_TEST);
                    gl::Scissor(x, y, w, h);
                }

                StateCommand::SetBlend(None) => gl::Disable(gl::BLEND),
                StateCommand::SetBlend(Some(mode)) => {
                    gl::Enable(gl::BLEND);
                    gl::BlendFunc(mode.src.into(), mode.dst.into());
                    gl::BlendEquation(mode.equation.into());
                }

                StateCommand::SetDepthStencil(ds) => {
                    if ds.depth_test == Comparison::Always && !ds.depth_write {
                        gl::Disable(gl::DEPTH_TEST);
                    } else {
                        gl::Enable(gl::DEPTH_TEST);
                        gl::DepthFunc(ds.depth_test.into());
                    }

                    gl::DepthMask(ds.depth_write as GLboolean);
                    self.state.depth_write = ds.depth_write;

                    match ds.stencil {
                        Some(stencil) => {
                            gl::Enable(gl::STENCIL_TEST);
                            gl::StencilFunc(
                                stencil.comparison.into(),
                                stencil.reference,
                                stencil.mask,
                            );
                        }
                        None => gl::Disable(gl::STENCIL_TEST),
                    }
                }

                StateCommand::DrawBuffers(n) => {
                    if self.state.framebuffer != 0 {
                        let attachments: SmallVec<[GLenum; 8]> =
                            (0..n).map(|i| gl::COLOR_ATTACHMENT0 + i).collect();
                        gl::DrawBuffers(attachments.len() as GLsizei, attachments.as_ptr());
                    }
                }

                StateCommand::Clear {
                    color,
                    depth,
                    stencil,
                } => {
                    let mut bits = 0;
                    if let Some(v) = color {
                        bits |= gl::COLOR_BUFFER_BIT;
                        gl::ClearColor(v.0, v.1, v.2, v.3);
                    }

                    if let Some(v) = depth {
                        bits |= gl::DEPTH_BUFFER_BIT;
                        gl::ClearDepth(f64::from(v));
                        gl::DepthMask(gl::TRUE);
                    }

                    if let Some(v) = stencil {
                        bits |= gl::STENCIL_BUFFER_BIT;
                        gl::ClearStencil(v);
                    }

                    if bits != 0 {
                        gl::Clear(bits);
                    }

                    if depth.is_some() && !self.state.depth_write {
                        gl::DepthMask(gl::FALSE);
                    }
                }
            }

            check()
        }
    }

    fn bind_program(&mut self, program: Option<NativeProgram>) {
        let id = program.map(|v| v.0).unwrap_or(0);
        unsafe {
            gl::UseProgram(id);
        }

        self.state.program = id;
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<NativeVertexArray>) {
        let id = vertex_array.map(|v| v.0).unwrap_or(0);
        unsafe {
            gl::BindVertexArray(id);
        }

        self.state.vertex_array = id;
    }

    fn bind_uniform_buffer(&mut self, slot: u32, buffer: Option<NativeBuffer>) {
        if slot >= self.capabilities.max_uniform_buffers {
            warn!("[GL] Uniform buffer slot {} is not supported.", slot);
            return;
        }

        unsafe {
            gl::BindBufferBase(gl::UNIFORM_BUFFER, slot, buffer.map(|v| v.0).unwrap_or(0));
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<NativeTexture>) {
        unsafe {
            if self.state.active_texture != unit {
                gl::ActiveTexture(gl::TEXTURE0 + unit);
                self.state.active_texture = unit;
            }

            gl::BindTexture(gl::TEXTURE_2D, texture.map(|v| v.0).unwrap_or(0));
        }
    }

    fn set_uniform(&mut self, location: i32, value: &UniformValue) {
        unsafe {
            match *value {
                UniformValue::I32(v) => gl::Uniform1i(location, v),
                UniformValue::F32(v) => gl::Uniform1f(location, v),
                UniformValue::Vector2f(v) => gl::Uniform2fv(location, 1, v.as_ptr()),
                UniformValue::Vector3f(v) => gl::Uniform3fv(location, 1, v.as_ptr()),
                UniformValue::Vector4f(v) => gl::Uniform4fv(location, 1, v.as_ptr()),
                UniformValue::Matrix2f(ref v) => {
                    gl::UniformMatrix2fv(location, 1, gl::FALSE, v[0].as_ptr())
                }
                UniformValue::Matrix3f(ref v) => {
                    gl::UniformMatrix3fv(location, 1, gl::FALSE, v[0].as_ptr())
                }
                UniformValue::Matrix4f(ref v) => {
                    gl::UniformMatrix4fv(location, 1, gl::FALSE, v[0].as_ptr())
                }
            }
        }
    }

    fn draw(
        &mut self,
        primitive: Primitive,
        first: u32,
        count: u32,
        index: Option<IndexFormat>,
    ) -> Result<()> {
        unsafe {
            match index {
                Some(format) => {
                    let offset = first as usize * format.size();
                    gl::DrawElements(
                        primitive.into(),
                        count as GLsizei,
                        format.into(),
                        offset as *const c_void,
                    );
                }
                None => gl::DrawArrays(primitive.into(), first as GLint, count as GLsizei),
            }

            check()
        }
    }

    fn finish(&mut self) {
        unsafe {
            gl::Finish();
        }
    }
}

fn info_log(mut buf: Vec<u8>) -> String {
    while buf.last() == Some(&0) {
        buf.pop();
    }

    String::from_utf8_lossy(&buf).into_owned()
}

unsafe fn check() -> Result<()> {
    match gl::GetError() {
        gl::NO_ERROR => Ok(()),

        gl::INVALID_ENUM => {
            bail!("[GL] An unacceptable value is specified for an enumerated argument.")
        }

        gl::INVALID_VALUE => bail!("[GL] A numeric argument is out of range."),

        gl::INVALID_OPERATION => {
            bail!("[GL] The specified operation is not allowed in the current state.")
        }

        gl::INVALID_FRAMEBUFFER_OPERATION => bail!(
            "[GL] The command is trying to render to or read from the framebuffer while the \
             currently bound framebuffer is not framebuffer complete."
        ),

        gl::OUT_OF_MEMORY => bail!("[GL] There is not enough memory left to execute the command."),
        _ => bail!("[GL] Oops, Unknown OpenGL error."),
    }
}
