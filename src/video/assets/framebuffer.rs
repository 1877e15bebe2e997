//! Render targets, made of color textures and an optional depth/stencil
//! render buffer.

use std::sync::{Arc, RwLock, RwLockReadGuard};

use serde::{Deserialize, Serialize};

use super::texture::TextureHandle;
use crate::video::resource::{ResourceHeader, Resources};

impl_handle!(FrameBufferHandle);
impl_handle!(RenderBufferHandle);

/// Formats of render buffers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderBufferFormat {
    RGBA8,
    Depth16,
    Depth24,
    Depth24Stencil8,
}

impl RenderBufferFormat {
    pub fn has_stencil(self) -> bool {
        self == RenderBufferFormat::Depth24Stencil8
    }

    pub fn is_color(self) -> bool {
        self == RenderBufferFormat::RGBA8
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) struct RenderBufferState {
    pub format: RenderBufferFormat,
    pub dimensions: (u32, u32),
}

#[derive(Debug)]
pub(crate) struct RenderBufferInner {
    pub header: ResourceHeader<RenderBufferHandle>,
    state: RwLock<RenderBufferState>,
}

/// Storage only attachment, usually used as depth/stencil buffer.
#[derive(Clone)]
pub struct RenderBuffer(Arc<RenderBufferInner>);

impl_resource!(RenderBuffer, RenderBufferInner, RenderBufferHandle);

impl RenderBuffer {
    pub fn new(resources: &Resources, format: RenderBufferFormat, dimensions: (u32, u32)) -> Self {
        let inner = resources.insert_render_buffer(move |header| RenderBufferInner {
            header,
            state: RwLock::new(RenderBufferState { format, dimensions }),
        });

        RenderBuffer(inner)
    }

    #[inline]
    pub fn format(&self) -> RenderBufferFormat {
        self.0.state.read().unwrap().format
    }

    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        self.0.state.read().unwrap().dimensions
    }

    pub fn resize(&self, dimensions: (u32, u32)) {
        self.0.state.write().unwrap().dimensions = dimensions;
        self.0.header.generation().bump();
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FrameBufferState {
    pub colors: Vec<TextureHandle>,
    pub depth_stencil: Option<RenderBufferHandle>,
}

#[derive(Debug)]
pub(crate) struct FrameBufferInner {
    pub header: ResourceHeader<FrameBufferHandle>,
    state: RwLock<FrameBufferState>,
}

/// A framebuffer referencing its attachments by handle.
#[derive(Clone)]
pub struct FrameBuffer(Arc<FrameBufferInner>);

impl_resource!(FrameBuffer, FrameBufferInner, FrameBufferHandle);

impl FrameBuffer {
    pub fn new(resources: &Resources) -> Self {
        let inner = resources.insert_framebuffer(|header| FrameBufferInner {
            header,
            state: RwLock::new(FrameBufferState::default()),
        });

        FrameBuffer(inner)
    }

    /// Appends a color attachment.
    pub fn attach_color(&self, texture: TextureHandle) {
        self.0.state.write().unwrap().colors.push(texture);
        self.0.header.generation().bump();
    }

    pub fn set_depth_stencil(&self, render_buffer: Option<RenderBufferHandle>) {
        self.0.state.write().unwrap().depth_stencil = render_buffer;
        self.0.header.generation().bump();
    }

    #[inline]
    pub fn colors(&self) -> Vec<TextureHandle> {
        self.0.state.read().unwrap().colors.clone()
    }

    #[inline]
    pub(crate) fn state(&self) -> RwLockReadGuard<FrameBufferState> {
        self.0.state.read().unwrap()
    }
}

impl RenderBuffer {
    #[inline]
    pub(crate) fn state(&self) -> RenderBufferState {
        *self.0.state.read().unwrap()
    }
}
