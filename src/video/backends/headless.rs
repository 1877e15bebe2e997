//! A device that executes nothing but records every call. Clones share the same
//! objects and call log, like contexts sharing resources.

use std::sync::{Arc, Mutex, MutexGuard};

use super::*;
use crate::video::errors::Error;

/// Shader sources containing this marker fail to compile.
pub const COMPILE_FAILURE_MARKER: &str = "#compile_failure";
/// Programs with a shader containing this marker fail to link.
pub const LINK_FAILURE_MARKER: &str = "#link_failure";

/// A native call issued to a `HeadlessDevice`.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateBuffer(NativeBuffer, usize),
    RespecifyBuffer(NativeBuffer, usize),
    UpdateBuffer(NativeBuffer, usize, usize),
    CopyBuffer {
        src: NativeBuffer,
        dst: NativeBuffer,
        dst_offset: usize,
        len: usize,
    },
    CreateUploadBuffer(NativeBuffer, usize),
    DeleteBuffer(NativeBuffer),
    CreateTexture(NativeTexture, (u32, u32)),
    UpdateTexture(NativeTexture, Rect),
    UpdateSampler(NativeTexture),
    GenerateMipmaps(NativeTexture),
    DeleteTexture(NativeTexture),
    CreateShader(NativeShader, ShaderStage),
    DeleteShader(NativeShader),
    CreateProgram(NativeProgram),
    DeleteProgram(NativeProgram),
    CreateVertexArray(NativeVertexArray),
    UpdateVertexArray(NativeVertexArray),
    DeleteVertexArray(NativeVertexArray),
    CreateRenderBuffer(NativeRenderBuffer),
    DeleteRenderBuffer(NativeRenderBuffer),
    CreateFramebuffer(NativeFramebuffer),
    DeleteFramebuffer(NativeFramebuffer),
    InsertFence(NativeFence),
    DeleteFence(NativeFence),
    Apply(StateCommand),
    BindProgram(Option<NativeProgram>),
    BindVertexArray(Option<NativeVertexArray>),
    BindUniformBuffer(u32, Option<NativeBuffer>),
    BindTexture(u32, Option<NativeTexture>),
    SetUniform(i32, UniformValue),
    Draw {
        primitive: Primitive,
        first: u32,
        count: u32,
    },
    Finish,
}

#[derive(Debug)]
struct TextureObject {
    params: TextureParams,
    texels: Vec<u8>,
}

#[derive(Default)]
struct HeadlessState {
    ids: u32,
    fences: u64,
    persistent_mapping: bool,
    calls: Vec<Call>,
    buffers: FastHashMap<NativeBuffer, Vec<u8>>,
    textures: FastHashMap<NativeTexture, TextureObject>,
    shaders: FastHashMap<NativeShader, String>,
    programs: FastHashMap<NativeProgram, (String, FastHashMap<String, i32>)>,
    vertex_arrays: FastHashMap<NativeVertexArray, Vec<NativeAttribute>>,
    render_buffers: FastHashMap<NativeRenderBuffer, (u32, u32)>,
    framebuffers: FastHashMap<NativeFramebuffer, usize>,
    pending_fences: FastHashMap<NativeFence, bool>,
}

impl HeadlessState {
    fn next(&mut self) -> u32 {
        self.ids += 1;
        self.ids
    }
}

/// A call recording device for tests and headless runs.
#[derive(Clone, Default)]
pub struct HeadlessDevice {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        HeadlessDevice::default()
    }

    /// Creates a device whose upload buffers are persistently mapped.
    pub fn with_persistent_mapping() -> Self {
        let device = HeadlessDevice::default();
        device.state().persistent_mapping = true;
        device
    }

    /// Returns a device sharing objects and call log with this one.
    pub fn share(&self) -> Self {
        self.clone()
    }

    fn state(&self) -> MutexGuard<HeadlessState> {
        self.state.lock().unwrap()
    }

    /// All the calls recorded so far.
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// The number of recorded calls matching `func`.
    pub fn count<F>(&self, func: F) -> usize
    where
        F: Fn(&Call) -> bool,
    {
        self.state().calls.iter().filter(|v| func(v)).count()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Signals every fence inserted so far.
    pub fn signal_fences(&self) {
        for v in self.state().pending_fences.values_mut() {
            *v = true;
        }
    }

    pub fn signal_fence(&self, fence: NativeFence) {
        if let Some(v) = self.state().pending_fences.get_mut(&fence) {
            *v = true;
        }
    }

    /// The number of fences not deleted yet.
    pub fn fences(&self) -> usize {
        self.state().pending_fences.len()
    }

    /// The current content of a buffer.
    pub fn buffer_contents(&self, buffer: NativeBuffer) -> Option<Vec<u8>> {
        self.state().buffers.get(&buffer).cloned()
    }

    /// The current texels of a texture.
    pub fn texture_contents(&self, texture: NativeTexture) -> Option<Vec<u8>> {
        self.state().textures.get(&texture).map(|v| v.texels.clone())
    }

    /// The number of live native objects of all kinds.
    pub fn live_objects(&self) -> usize {
        let state = self.state();
        state.buffers.len()
            + state.textures.len()
            + state.shaders.len()
            + state.programs.len()
            + state.vertex_arrays.len()
            + state.render_buffers.len()
            + state.framebuffers.len()
    }

    fn record(&self, call: Call) {
        self.state().calls.push(call);
    }
}

fn write(dst: &mut [u8], offset: usize, bytes: &[u8]) -> Result<()> {
    if offset + bytes.len() > dst.len() {
        return Err(Error::OutOfBounds(offset + bytes.len(), dst.len()).into());
    }

    dst[offset..offset + bytes.len()].copy_from_slice(bytes);
    Ok(())
}

impl Device for HeadlessDevice {
    fn create_buffer(
        &mut self,
        _: BufferUsage,
        size: usize,
        data: Option<&[u8]>,
    ) -> Result<NativeBuffer> {
        let mut state = self.state();
        let buffer = NativeBuffer(state.next());

        let mut contents = vec![0; size];
        if let Some(data) = data {
            write(&mut contents, 0, data)?;
        }

        state.buffers.insert(buffer, contents);
        state.calls.push(Call::CreateBuffer(buffer, size));
        Ok(buffer)
    }

    fn respecify_buffer(
        &mut self,
        buffer: NativeBuffer,
        _: BufferUsage,
        size: usize,
        data: Option<&[u8]>,
    ) -> Result<()> {
        let mut contents = vec![0; size];
        if let Some(data) = data {
            write(&mut contents, 0, data)?;
        }

        let mut state = self.state();
        match state.buffers.get_mut(&buffer) {
            Some(v) => *v = contents,
            None => return Err(format_err!("Buffer {:?} does not exist.", buffer)),
        }

        state.calls.push(Call::RespecifyBuffer(buffer, size));
        Ok(())
    }

    fn update_buffer(&mut self, buffer: NativeBuffer, offset: usize, data: &[u8]) -> Result<()> {
        let mut state = self.state();
        match state.buffers.get_mut(&buffer) {
            Some(v) => write(v, offset, data)?,
            None => return Err(format_err!("Buffer {:?} does not exist.", buffer)),
        }

        state
            .calls
            .push(Call::UpdateBuffer(buffer, offset, data.len()));
        Ok(())
    }

    fn copy_buffer(
        &mut self,
        src: NativeBuffer,
        src_offset: usize,
        dst: NativeBuffer,
        dst_offset: usize,
        len: usize,
    ) -> Result<()> {
        let mut state = self.state();
        let bytes = match state.buffers.get(&src) {
            Some(v) if src_offset + len <= v.len() => v[src_offset..src_offset + len].to_vec(),
            _ => return Err(format_err!("Invalid copy source {:?}.", src)),
        };

        match state.buffers.get_mut(&dst) {
            Some(v) => write(v, dst_offset, &bytes)?,
            None => return Err(format_err!("Buffer {:?} does not exist.", dst)),
        }

        state.calls.push(Call::CopyBuffer {
            src,
            dst,
            dst_offset,
            len,
        });
        Ok(())
    }

    fn create_upload_buffer(
        &mut self,
        size: usize,
    ) -> Result<(NativeBuffer, Option<MappedMemory>)> {
        let mut state = self.state();
        let buffer = NativeBuffer(state.next());
        state.buffers.insert(buffer, vec![0; size]);
        state.calls.push(Call::CreateUploadBuffer(buffer, size));

        let mapping = if state.persistent_mapping {
            let contents = state.buffers.get_mut(&buffer).map(|v| v.as_mut_ptr());
            // Upload buffers are never respecified, so the heap block stays put
            // until `delete_buffer`.
            contents.map(|ptr| unsafe { MappedMemory::new(ptr, size) })
        } else {
            None
        };

        Ok((buffer, mapping))
    }

    fn delete_buffer(&mut self, buffer: NativeBuffer) {
        let mut state = self.state();
        assert!(
            state.buffers.remove(&buffer).is_some(),
            "Double delete of {:?}.",
            buffer
        );
        state.calls.push(Call::DeleteBuffer(buffer));
    }

    fn create_texture(&mut self, params: &TextureParams) -> Result<NativeTexture> {
        let mut state = self.state();
        let texture = NativeTexture(state.next());
        let object = TextureObject {
            params: *params,
            texels: vec![0; params.len()],
        };

        state.textures.insert(texture, object);
        state
            .calls
            .push(Call::CreateTexture(texture, params.dimensions));
        Ok(texture)
    }

    fn update_texture(
        &mut self,
        texture: NativeTexture,
        format: TextureFormat,
        rect: Rect,
        texels: &[u8],
    ) -> Result<()> {
        let mut state = self.state();
        {
            let object = match state.textures.get_mut(&texture) {
                Some(v) => v,
                None => return Err(format_err!("Texture {:?} does not exist.", texture)),
            };

            if object.params.format != format || !object.params.rect().contains(&rect) {
                bail!("Invalid update of {:?} at {:?}.", texture, rect);
            }

            let bpp = format.size();
            let row = rect.w as usize * bpp;
            let stride = object.params.dimensions.0 as usize * bpp;
            if texels.len() != row * rect.h as usize {
                return Err(Error::OutOfBounds(texels.len(), row * rect.h as usize).into());
            }

            for (i, y) in (rect.y..rect.bottom()).enumerate() {
                let begin = y as usize * stride + rect.x as usize * bpp;
                object.texels[begin..begin + row].copy_from_slice(&texels[i * row..(i + 1) * row]);
            }
        }

        state.calls.push(Call::UpdateTexture(texture, rect));
        Ok(())
    }

    fn update_sampler(&mut self, texture: NativeTexture, sampler: &SamplerParams) -> Result<()> {
        let mut state = self.state();
        match state.textures.get_mut(&texture) {
            Some(v) => v.params.sampler = *sampler,
            None => return Err(format_err!("Texture {:?} does not exist.", texture)),
        }

        state.calls.push(Call::UpdateSampler(texture));
        Ok(())
    }

    fn generate_mipmaps(&mut self, texture: NativeTexture) -> Result<()> {
        self.record(Call::GenerateMipmaps(texture));
        Ok(())
    }

    fn delete_texture(&mut self, texture: NativeTexture) {
        let mut state = self.state();
        assert!(
            state.textures.remove(&texture).is_some(),
            "Double delete of {:?}.",
            texture
        );
        state.calls.push(Call::DeleteTexture(texture));
    }

    fn create_shader(&mut self, stage: ShaderStage, source: &str) -> Result<NativeShader> {
        if source.contains(COMPILE_FAILURE_MARKER) {
            let log = format!("0:1: error: {:?} shader rejected.", stage);
            return Err(Error::ShaderCompile(log).into());
        }

        let mut state = self.state();
        let shader = NativeShader(state.next());
        state.shaders.insert(shader, source.to_owned());
        state.calls.push(Call::CreateShader(shader, stage));
        Ok(shader)
    }

    fn delete_shader(&mut self, shader: NativeShader) {
        let mut state = self.state();
        assert!(
            state.shaders.remove(&shader).is_some(),
            "Double delete of {:?}.",
            shader
        );
        state.calls.push(Call::DeleteShader(shader));
    }

    fn create_program(&mut self, vs: NativeShader, fs: NativeShader) -> Result<NativeProgram> {
        let mut state = self.state();
        let source = match (state.shaders.get(&vs), state.shaders.get(&fs)) {
            (Some(vs), Some(fs)) => format!("{}\n{}", vs, fs),
            _ => return Err(format_err!("Shaders {:?} and {:?} must be compiled.", vs, fs)),
        };

        if source.contains(LINK_FAILURE_MARKER) {
            let log = "error: varyings do not match.".to_owned();
            return Err(Error::ProgramLink(log).into());
        }

        let program = NativeProgram(state.next());
        state
            .programs
            .insert(program, (source, FastHashMap::default()));
        state.calls.push(Call::CreateProgram(program));
        Ok(program)
    }

    fn uniform_location(&mut self, program: NativeProgram, name: &str) -> Option<i32> {
        let mut state = self.state();
        let (source, locations) = state.programs.get_mut(&program)?;
        if !source.contains(name) {
            return None;
        }

        let next = locations.len() as i32;
        Some(*locations.entry(name.to_owned()).or_insert(next))
    }

    fn delete_program(&mut self, program: NativeProgram) {
        let mut state = self.state();
        assert!(
            state.programs.remove(&program).is_some(),
            "Double delete of {:?}.",
            program
        );
        state.calls.push(Call::DeleteProgram(program));
    }

    fn create_vertex_array(
        &mut self,
        attributes: &[NativeAttribute],
        _: Option<NativeBuffer>,
    ) -> Result<NativeVertexArray> {
        let mut state = self.state();
        let vertex_array = NativeVertexArray(state.next());
        state.vertex_arrays.insert(vertex_array, attributes.to_vec());
        state.calls.push(Call::CreateVertexArray(vertex_array));
        Ok(vertex_array)
    }

    fn update_vertex_array(
        &mut self,
        vertex_array: NativeVertexArray,
        attributes: &[NativeAttribute],
        _: Option<NativeBuffer>,
    ) -> Result<()> {
        let mut state = self.state();
        match state.vertex_arrays.get_mut(&vertex_array) {
            Some(v) => *v = attributes.to_vec(),
            None => return Err(format_err!("Vertex array {:?} does not exist.", vertex_array)),
        }

        state.calls.push(Call::UpdateVertexArray(vertex_array));
        Ok(())
    }

    fn delete_vertex_array(&mut self, vertex_array: NativeVertexArray) {
        let mut state = self.state();
        assert!(
            state.vertex_arrays.remove(&vertex_array).is_some(),
            "Double delete of {:?}.",
            vertex_array
        );
        state.calls.push(Call::DeleteVertexArray(vertex_array));
    }

    fn create_render_buffer(
        &mut self,
        _: RenderBufferFormat,
        dimensions: (u32, u32),
    ) -> Result<NativeRenderBuffer> {
        let mut state = self.state();
        let render_buffer = NativeRenderBuffer(state.next());
        state.render_buffers.insert(render_buffer, dimensions);
        state.calls.push(Call::CreateRenderBuffer(render_buffer));
        Ok(render_buffer)
    }

    fn delete_render_buffer(&mut self, render_buffer: NativeRenderBuffer) {
        let mut state = self.state();
        assert!(
            state.render_buffers.remove(&render_buffer).is_some(),
            "Double delete of {:?}.",
            render_buffer
        );
        state.calls.push(Call::DeleteRenderBuffer(render_buffer));
    }

    fn create_framebuffer(
        &mut self,
        colors: &[NativeTexture],
        depth_stencil: Option<(NativeRenderBuffer, RenderBufferFormat)>,
    ) -> Result<NativeFramebuffer> {
        if colors.is_empty() && depth_stencil.is_none() {
            return Err(Error::IncompleteFramebuffer("no attachments".into()).into());
        }

        let mut state = self.state();
        let framebuffer = NativeFramebuffer(state.next());
        state.framebuffers.insert(framebuffer, colors.len());
        state.calls.push(Call::CreateFramebuffer(framebuffer));
        Ok(framebuffer)
    }

    fn delete_framebuffer(&mut self, framebuffer: NativeFramebuffer) {
        let mut state = self.state();
        assert!(
            state.framebuffers.remove(&framebuffer).is_some(),
            "Double delete of {:?}.",
            framebuffer
        );
        state.calls.push(Call::DeleteFramebuffer(framebuffer));
    }

    fn insert_fence(&mut self) -> Result<NativeFence> {
        let mut state = self.state();
        state.fences += 1;
        let fence = NativeFence(state.fences);
        state.pending_fences.insert(fence, false);
        state.calls.push(Call::InsertFence(fence));
        Ok(fence)
    }

    fn fence_signaled(&mut self, fence: NativeFence) -> bool {
        self.state()
            .pending_fences
            .get(&fence)
            .cloned()
            .unwrap_or(true)
    }

    fn delete_fence(&mut self, fence: NativeFence) {
        let mut state = self.state();
        assert!(
            state.pending_fences.remove(&fence).is_some(),
            "Double delete of {:?}.",
            fence
        );
        state.calls.push(Call::DeleteFence(fence));
    }

    fn apply(&mut self, command: &StateCommand) -> Result<()> {
        self.record(Call::Apply(command.clone()));
        Ok(())
    }

    fn bind_program(&mut self, program: Option<NativeProgram>) {
        self.record(Call::BindProgram(program));
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<NativeVertexArray>) {
        self.record(Call::BindVertexArray(vertex_array));
    }

    fn bind_uniform_buffer(&mut self, slot: u32, buffer: Option<NativeBuffer>) {
        self.record(Call::BindUniformBuffer(slot, buffer));
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<NativeTexture>) {
        self.record(Call::BindTexture(unit, texture));
    }

    fn set_uniform(&mut self, location: i32, value: &UniformValue) {
        self.record(Call::SetUniform(location, *value));
    }

    fn draw(
        &mut self,
        primitive: Primitive,
        first: u32,
        count: u32,
        _: Option<IndexFormat>,
    ) -> Result<()> {
        self.record(Call::Draw {
            primitive,
            first,
            count,
        });
        Ok(())
    }

    fn finish(&mut self) {
        self.record(Call::Finish);
    }
}
