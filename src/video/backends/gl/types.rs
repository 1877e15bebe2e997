use gl;
use gl::types::*;

use crate::video::assets::prelude::*;
use crate::video::command::{BlendFactor, BlendValue, Comparison, Equation, Primitive};

use super::capabilities::{Capabilities, Version};

impl From<BufferUsage> for GLenum {
    fn from(usage: BufferUsage) -> Self {
        match usage {
            BufferUsage::Static => gl::STATIC_DRAW,
            BufferUsage::Dynamic => gl::DYNAMIC_DRAW,
            BufferUsage::Stream => gl::STREAM_DRAW,
        }
    }
}

impl From<Comparison> for GLenum {
    fn from(cmp: Comparison) -> Self {
        match cmp {
            Comparison::Never => gl::NEVER,
            Comparison::Less => gl::LESS,
            Comparison::LessOrEqual => gl::LEQUAL,
            Comparison::Greater => gl::GREATER,
            Comparison::GreaterOrEqual => gl::GEQUAL,
            Comparison::Equal => gl::EQUAL,
            Comparison::NotEqual => gl::NOTEQUAL,
            Comparison::Always => gl::ALWAYS,
        }
    }
}

impl From<Equation> for GLenum {
    fn from(eq: Equation) -> Self {
        match eq {
            Equation::Add => gl::FUNC_ADD,
            Equation::Subtract => gl::FUNC_SUBTRACT,
            Equation::ReverseSubtract => gl::FUNC_REVERSE_SUBTRACT,
        }
    }
}

impl From<BlendFactor> for GLenum {
    fn from(factor: BlendFactor) -> Self {
        match factor {
            BlendFactor::Zero => gl::ZERO,
            BlendFactor::One => gl::ONE,
            BlendFactor::Value(BlendValue::SourceColor) => gl::SRC_COLOR,
            BlendFactor::Value(BlendValue::SourceAlpha) => gl::SRC_ALPHA,
            BlendFactor::Value(BlendValue::DestinationColor) => gl::DST_COLOR,
            BlendFactor::Value(BlendValue::DestinationAlpha) => gl::DST_ALPHA,
            BlendFactor::OneMinusValue(BlendValue::SourceColor) => gl::ONE_MINUS_SRC_COLOR,
            BlendFactor::OneMinusValue(BlendValue::SourceAlpha) => gl::ONE_MINUS_SRC_ALPHA,
            BlendFactor::OneMinusValue(BlendValue::DestinationColor) => gl::ONE_MINUS_DST_COLOR,
            BlendFactor::OneMinusValue(BlendValue::DestinationAlpha) => gl::ONE_MINUS_DST_ALPHA,
        }
    }
}

impl From<VertexFormat> for GLenum {
    fn from(format: VertexFormat) -> Self {
        match format {
            VertexFormat::Byte => gl::BYTE,
            VertexFormat::UByte => gl::UNSIGNED_BYTE,
            VertexFormat::Short => gl::SHORT,
            VertexFormat::UShort => gl::UNSIGNED_SHORT,
            VertexFormat::Float => gl::FLOAT,
        }
    }
}

impl From<Primitive> for GLenum {
    fn from(primitive: Primitive) -> Self {
        match primitive {
            Primitive::Points => gl::POINTS,
            Primitive::Lines => gl::LINES,
            Primitive::LineStrip => gl::LINE_STRIP,
            Primitive::Triangles => gl::TRIANGLES,
            Primitive::TriangleStrip => gl::TRIANGLE_STRIP,
        }
    }
}

impl From<IndexFormat> for GLenum {
    fn from(format: IndexFormat) -> Self {
        match format {
            IndexFormat::U16 => gl::UNSIGNED_SHORT,
            IndexFormat::U32 => gl::UNSIGNED_INT,
        }
    }
}

impl From<TextureWrap> for GLenum {
    fn from(wrap: TextureWrap) -> Self {
        match wrap {
            TextureWrap::Repeat => gl::REPEAT,
            TextureWrap::Mirror => gl::MIRRORED_REPEAT,
            TextureWrap::Clamp => gl::CLAMP_TO_EDGE,
            TextureWrap::Border => gl::CLAMP_TO_BORDER,
        }
    }
}

/// Returns the `(min, mag)` filters of `sampler`.
pub fn texture_filters(sampler: &SamplerParams) -> (GLenum, GLenum) {
    let min = match (sampler.min_filter, sampler.mipmap) {
        (TextureFilter::Nearest, false) => gl::NEAREST,
        (TextureFilter::Linear, false) => gl::LINEAR,
        (TextureFilter::Nearest, true) => gl::NEAREST_MIPMAP_NEAREST,
        (TextureFilter::Linear, true) => gl::LINEAR_MIPMAP_LINEAR,
    };

    let mag = match sampler.mag_filter {
        TextureFilter::Nearest => gl::NEAREST,
        TextureFilter::Linear => gl::LINEAR,
    };

    (min, mag)
}

/// Returns the `(internal format, format, type)` triple of `format`.
pub fn texture_format(format: TextureFormat, caps: &Capabilities) -> (GLenum, GLenum, GLenum) {
    let sized = match caps.version {
        Version::GL(_, _) => true,
        Version::ES(major, _) => major >= 3,
    };

    if sized {
        match format {
            TextureFormat::R8 => (gl::R8, gl::RED, gl::UNSIGNED_BYTE),
            TextureFormat::RG8 => (gl::RG8, gl::RG, gl::UNSIGNED_BYTE),
            TextureFormat::RGB8 => (gl::RGB8, gl::RGB, gl::UNSIGNED_BYTE),
            TextureFormat::RGBA8 => (gl::RGBA8, gl::RGBA, gl::UNSIGNED_BYTE),
            TextureFormat::RGBA16F => (gl::RGBA16F, gl::RGBA, gl::HALF_FLOAT),
            TextureFormat::RGBA32F => (gl::RGBA32F, gl::RGBA, gl::FLOAT),
        }
    } else {
        match format {
            TextureFormat::R8 => (gl::RED, gl::RED, gl::UNSIGNED_BYTE),
            TextureFormat::RG8 => (gl::RG, gl::RG, gl::UNSIGNED_BYTE),
            TextureFormat::RGB8 => (gl::RGB, gl::RGB, gl::UNSIGNED_BYTE),
            TextureFormat::RGBA8 => (gl::RGBA, gl::RGBA, gl::UNSIGNED_BYTE),
            TextureFormat::RGBA16F => (gl::RGBA, gl::RGBA, gl::HALF_FLOAT),
            TextureFormat::RGBA32F => (gl::RGBA, gl::RGBA, gl::FLOAT),
        }
    }
}

impl From<RenderBufferFormat> for GLenum {
    fn from(format: RenderBufferFormat) -> Self {
        match format {
            RenderBufferFormat::RGBA8 => gl::RGBA8,
            RenderBufferFormat::Depth16 => gl::DEPTH_COMPONENT16,
            RenderBufferFormat::Depth24 => gl::DEPTH_COMPONENT24,
            RenderBufferFormat::Depth24Stencil8 => gl::DEPTH24_STENCIL8,
        }
    }
}

/// Returns the framebuffer attachment point of a render buffer `format`.
pub fn attachment(format: RenderBufferFormat) -> GLenum {
    match format {
        RenderBufferFormat::RGBA8 => gl::COLOR_ATTACHMENT0,
        RenderBufferFormat::Depth16 | RenderBufferFormat::Depth24 => gl::DEPTH_ATTACHMENT,
        RenderBufferFormat::Depth24Stencil8 => gl::DEPTH_STENCIL_ATTACHMENT,
    }
}
