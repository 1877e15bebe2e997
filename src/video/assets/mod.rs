//! Logical resources, the client facing side of every GPU object.
//!
//! A logical resource is a cheaply cloneable reference to shared state. It owns
//! the CPU copy of its content, a typed handle and a generation. Render drivers
//! translate it into native objects lazily, see `RenderDriver`.

macro_rules! impl_resource {
    ($name:ident, $inner:ident, $handle:ident) => {
        impl $name {
            #[inline]
            pub(crate) fn from_inner(inner: ::std::sync::Arc<$inner>) -> Self {
                $name(inner)
            }

            /// Returns the stable identity of this resource.
            #[inline]
            pub fn handle(&self) -> $handle {
                self.0.header.handle()
            }

            /// Returns the current generation, bumped by every mutation.
            #[inline]
            pub fn generation(&self) -> u64 {
                self.0.header.generation().get()
            }

            /// Returns the expiration since last use, `None` if the driver's default
            /// of this kind applies.
            #[inline]
            pub fn expiration(&self) -> Option<::std::time::Duration> {
                self.0.header.expiration()
            }

            /// Sets the expiration since last use, zero means never.
            #[inline]
            pub fn set_expiration(&self, expiration: ::std::time::Duration) {
                self.0.header.set_expiration(expiration);
            }

            #[inline]
            pub(crate) fn generation_ref(&self) -> &crate::video::resource::Generation {
                self.0.header.generation()
            }
        }

        impl PartialEq for $name {
            fn eq(&self, rhs: &Self) -> bool {
                ::std::sync::Arc::ptr_eq(&self.0, &rhs.0)
            }
        }

        impl Eq for $name {}

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                write!(f, "{}", self.handle())
            }
        }
    };
}

pub mod buffer;
pub mod framebuffer;
pub mod program;
pub mod texture;
pub mod vertex_array;

pub mod prelude {
    pub use super::buffer::{Buffer, BufferHandle, BufferUsage};
    pub use super::framebuffer::{
        FrameBuffer, FrameBufferHandle, RenderBuffer, RenderBufferFormat, RenderBufferHandle,
    };
    pub use super::program::{Program, ProgramHandle, ProgramParams, ShaderStage, UniformValue};
    pub use super::texture::{
        SamplerParams, Texture, TextureFilter, TextureFormat, TextureHandle, TextureParams,
        TextureWrap,
    };
    pub use super::vertex_array::{
        IndexFormat, VertexArray, VertexArrayHandle, VertexAttribute, VertexFormat,
    };

    pub(crate) use super::buffer::BufferInner;
    pub(crate) use super::framebuffer::{FrameBufferInner, RenderBufferInner};
    pub(crate) use super::program::ProgramInner;
    pub(crate) use super::texture::TextureInner;
    pub(crate) use super::vertex_array::VertexArrayInner;
}
