//! Commands recorded into the render queue.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::utils::prelude::*;
use crate::video::assets::prelude::*;
use crate::video::backends::{
    NativeBuffer, NativeFramebuffer, NativeProgram, NativeTexture, NativeVertexArray,
};

/// Blend colors with alpha below this are classified as translucent.
pub const OPAQUE_ALPHA_THRESHOLD: f32 = 0.999;

/// Kinds of primitives.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Primitive {
    Points,
    Lines,
    LineStrip,
    Triangles,
    TriangleStrip,
}

/// A pixel-wise comparison function.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparison {
    Never,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Equal,
    NotEqual,
    Always,
}

/// Specifies how incoming RGBA values (source) and the RGBA in framebuffer
/// (destination) are combined.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Equation {
    Add,
    Subtract,
    ReverseSubtract,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendValue {
    SourceColor,
    SourceAlpha,
    DestinationColor,
    DestinationAlpha,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendFactor {
    Zero,
    One,
    Value(BlendValue),
    OneMinusValue(BlendValue),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlendMode {
    pub equation: Equation,
    pub src: BlendFactor,
    pub dst: BlendFactor,
}

impl BlendMode {
    /// Classic `src * a + dst * (1 - a)` alpha blending.
    pub fn alpha() -> Self {
        BlendMode {
            equation: Equation::Add,
            src: BlendFactor::Value(BlendValue::SourceAlpha),
            dst: BlendFactor::OneMinusValue(BlendValue::SourceAlpha),
        }
    }
}

/// Stencil test, with reference value and mask.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StencilTest {
    pub comparison: Comparison,
    pub reference: i32,
    pub mask: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepthStencil {
    pub depth_test: Comparison,
    pub depth_write: bool,
    pub stencil: Option<StencilTest>,
}

impl Default for DepthStencil {
    fn default() -> Self {
        DepthStencil {
            depth_test: Comparison::Always,
            depth_write: false,
            stencil: None,
        }
    }
}

/// A pipeline state change, with every resource resolved into native objects.
/// This is the entry action of a queue segment.
#[derive(Debug, Clone, PartialEq)]
pub enum StateCommand {
    /// Binds a framebuffer, `None` for the default surface.
    BindFramebuffer {
        framebuffer: Option<NativeFramebuffer>,
        dimensions: (u32, u32),
    },
    SetViewport(Rect),
    SetScissor(Option<Rect>),
    SetBlend(Option<BlendMode>),
    SetDepthStencil(DepthStencil),
    /// Enables the first `n` color attachments.
    DrawBuffers(u32),
    Clear {
        color: Option<Color>,
        depth: Option<f32>,
        stencil: Option<i32>,
    },
}

/// A pipeline state change as recorded by clients.
#[derive(Debug, Clone)]
pub enum PipelineCommand {
    BindFrameBuffer(Option<FrameBuffer>),
    SetViewport(Rect),
    SetScissor(Option<Rect>),
    SetBlend(Option<BlendMode>),
    SetDepthStencil(DepthStencil),
    DrawBuffers(u32),
    Clear {
        color: Option<Color>,
        depth: Option<f32>,
        stencil: Option<i32>,
    },
}

/// A draw described with logical resources. Textures and uniforms are bound by
/// name.
#[derive(Debug, Clone)]
pub struct DrawCall {
    pub program: Program,
    pub vertex_array: VertexArray,
    pub uniform_buffer: Option<Buffer>,
    pub textures: SmallVec<[(HashValue<str>, Texture); 4]>,
    pub uniforms: SmallVec<[(HashValue<str>, UniformValue); 8]>,
    pub primitive: Primitive,
    pub first: u32,
    pub count: u32,
    /// The blend color of the draw, an alpha below one makes it translucent.
    pub color: Color,
    pub force_translucent: bool,
}

impl DrawCall {
    pub fn new(program: Program, vertex_array: VertexArray, primitive: Primitive, count: u32) -> Self {
        DrawCall {
            program,
            vertex_array,
            uniform_buffer: None,
            textures: SmallVec::new(),
            uniforms: SmallVec::new(),
            primitive,
            first: 0,
            count,
            color: Color::white(),
            force_translucent: false,
        }
    }

    /// Binds `texture` to the sampler named `field`.
    pub fn set_texture<T: Into<HashValue<str>>>(&mut self, field: T, texture: Texture) {
        let field = field.into();
        for pair in &mut self.textures {
            if pair.0 == field {
                pair.1 = texture;
                return;
            }
        }

        self.textures.push((field, texture));
    }

    /// Sets the value of uniform variable named `field`.
    pub fn set_uniform_variable<F, V>(&mut self, field: F, variable: V)
    where
        F: Into<HashValue<str>>,
        V: Into<UniformValue>,
    {
        let field = field.into();
        let variable = variable.into();

        for pair in &mut self.uniforms {
            if pair.0 == field {
                pair.1 = variable;
                return;
            }
        }

        self.uniforms.push((field, variable));
    }

    /// Returns true if this draw must keep its submission order.
    pub fn is_translucent(&self) -> bool {
        self.force_translucent
            || self.color.alpha() < OPAQUE_ALPHA_THRESHOLD
            || self.textures.iter().any(|v| v.1.is_translucent())
    }
}

/// Points at a recorded command.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CommandRef {
    pub segment: usize,
    pub index: usize,
    pub translucent: bool,
}

/// The native objects a draw binds. Opaque draws are sorted by this, with
/// program first, then vertex array, uniform buffer and textures.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RenderState {
    pub program: NativeProgram,
    pub vertex_array: NativeVertexArray,
    pub uniform_buffer: Option<NativeBuffer>,
    pub textures: SmallVec<[(u32, NativeTexture); 4]>,
}

/// The draw part of a recorded command, uniforms live in the queue's data
/// buffer.
#[derive(Debug, Copy, Clone)]
pub struct RenderCommand {
    pub primitive: Primitive,
    pub first: u32,
    pub count: u32,
    pub index: Option<IndexFormat>,
    pub uniforms: DataBufferPtr<[(i32, UniformValue)]>,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::video::resource::Resources;

    fn draw(resources: &Resources) -> DrawCall {
        let program = Program::new(resources, ProgramParams::new("vs", "fs"));
        let vertex_array = VertexArray::new(resources);
        DrawCall::new(program, vertex_array, Primitive::Triangles, 3)
    }

    #[test]
    fn classification() {
        let resources = Resources::new();
        let mut dc = draw(&resources);
        assert!(!dc.is_translucent());

        dc.color = Color(1.0, 1.0, 1.0, 0.5);
        assert!(dc.is_translucent());

        let mut dc = draw(&resources);
        let texture = Texture::new(&resources, TextureFormat::RGBA8, (1, 1), None);
        dc.set_texture("u_Texture", texture.clone());
        assert!(!dc.is_translucent());
        texture.set_translucent(true);
        assert!(dc.is_translucent());

        let mut dc = draw(&resources);
        dc.force_translucent = true;
        assert!(dc.is_translucent());
    }

    #[test]
    fn uniforms() {
        let resources = Resources::new();
        let mut dc = draw(&resources);
        dc.set_uniform_variable("u_Alpha", 0.5f32);
        dc.set_uniform_variable("u_Alpha", 1.0f32);
        dc.set_uniform_variable("u_Index", 2i32);

        assert_eq!(dc.uniforms.len(), 2);
        assert_eq!(dc.uniforms[0].1, UniformValue::F32(1.0));
    }

    #[test]
    fn state_order() {
        let a = RenderState {
            program: NativeProgram(1),
            vertex_array: NativeVertexArray(2),
            ..Default::default()
        };

        let b = RenderState {
            program: NativeProgram(1),
            vertex_array: NativeVertexArray(1),
            uniform_buffer: Some(NativeBuffer(9)),
            ..Default::default()
        };

        let c = RenderState {
            program: NativeProgram(0),
            vertex_array: NativeVertexArray(9),
            ..Default::default()
        };

        let mut v = vec![a.clone(), b.clone(), c.clone()];
        v.sort();
        assert_eq!(v, vec![c, b, a]);
    }
}
