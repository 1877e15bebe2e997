//! Two dimensional textures. A texture is a container of one image plus the
//! parameters describing how it is sampled.

use std::sync::{Arc, RwLock, RwLockReadGuard};

use serde::{Deserialize, Serialize};

use crate::utils::prelude::*;
use crate::video::dirty::DirtyRegion;
use crate::video::resource::{Generation, ResourceHeader, Resources};

impl_handle!(TextureHandle);

/// List of all the possible formats of texel data.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureFormat {
    R8,
    RG8,
    RGB8,
    RGBA8,
    RGBA16F,
    RGBA32F,
}

impl TextureFormat {
    /// Returns the size in bytes of a pixel of this format.
    pub fn size(self) -> usize {
        match self {
            TextureFormat::R8 => 1,
            TextureFormat::RG8 => 2,
            TextureFormat::RGB8 => 3,
            TextureFormat::RGBA8 => 4,
            TextureFormat::RGBA16F => 8,
            TextureFormat::RGBA32F => 16,
        }
    }

    /// Returns true if texels carry an alpha channel.
    pub fn has_alpha(self) -> bool {
        match self {
            TextureFormat::RGBA8 | TextureFormat::RGBA16F | TextureFormat::RGBA32F => true,
            _ => false,
        }
    }
}

/// Specify how the texture is used whenever the pixel being sampled.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureFilter {
    /// Returns the value of the texture element that is nearest to the center of
    /// the pixel being textured.
    Nearest,
    /// Returns the weighted average of the four texture elements that are
    /// closest to the center of the pixel being textured.
    Linear,
}

/// Sets the wrap parameter for texture.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureWrap {
    /// Samples at coord x + 1 map to coord x.
    Repeat,
    /// Samples at coord x + 1 map to coord 1 - x.
    Mirror,
    /// Samples at coord x + 1 map to coord 1.
    Clamp,
    /// Samples outside of the texture return the border color.
    Border,
}

/// Sampling parameters. Changing them never re-uploads texel data.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerParams {
    pub min_filter: TextureFilter,
    pub mag_filter: TextureFilter,
    pub wrap: TextureWrap,
    pub border_color: Color,
    pub mipmap: bool,
}

impl Default for SamplerParams {
    fn default() -> Self {
        SamplerParams {
            min_filter: TextureFilter::Linear,
            mag_filter: TextureFilter::Linear,
            wrap: TextureWrap::Clamp,
            border_color: Color::transparent(),
            mipmap: false,
        }
    }
}

/// The storage description of a native texture.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TextureParams {
    pub format: TextureFormat,
    pub dimensions: (u32, u32),
    pub sampler: SamplerParams,
}

impl TextureParams {
    #[inline]
    pub fn rect(&self) -> Rect {
        Rect::with_size(self.dimensions.0, self.dimensions.1)
    }

    /// Size in bytes of the texel data.
    #[inline]
    pub fn len(&self) -> usize {
        self.rect().area() as usize * self.format.size()
    }
}

#[derive(Debug)]
pub(crate) struct TextureState {
    pub params: TextureParams,
    pub data: Vec<u8>,
    pub translucent: bool,
}

impl TextureState {
    /// Copies the texels covered by `rect` into a tightly packed vector.
    pub fn extract(&self, rect: Rect) -> Vec<u8> {
        let bpp = self.params.format.size();
        let stride = self.params.dimensions.0 as usize * bpp;
        let row = rect.w as usize * bpp;

        let mut texels = Vec::with_capacity(row * rect.h as usize);
        for y in rect.y..rect.bottom() {
            let begin = y as usize * stride + rect.x as usize * bpp;
            texels.extend_from_slice(&self.data[begin..begin + row]);
        }

        texels
    }
}

#[derive(Debug)]
pub(crate) struct TextureInner {
    pub header: ResourceHeader<TextureHandle>,
    parameters: Generation,
    state: RwLock<TextureState>,
    dirty: DirtyRegion<Rect>,
}

/// A shared 2D image mirrored into a native texture object.
#[derive(Clone)]
pub struct Texture(Arc<TextureInner>);

impl_resource!(Texture, TextureInner, TextureHandle);

impl Texture {
    /// Creates a texture, zero initialized if `data` is `None`.
    pub fn new(
        resources: &Resources,
        format: TextureFormat,
        dimensions: (u32, u32),
        data: Option<Vec<u8>>,
    ) -> Self {
        let params = TextureParams {
            format,
            dimensions,
            sampler: SamplerParams::default(),
        };

        let data = data.unwrap_or_else(|| vec![0; params.len()]);
        assert_eq!(data.len(), params.len(), "Texel data size mismatch.");

        let inner = resources.insert_texture(move |header| TextureInner {
            dirty: DirtyRegion::new(header.threads()),
            header,
            parameters: Generation::new(),
            state: RwLock::new(TextureState {
                params,
                data,
                translucent: false,
            }),
        });

        Texture(inner)
    }

    #[inline]
    pub fn format(&self) -> TextureFormat {
        self.0.state.read().unwrap().params.format
    }

    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        self.0.state.read().unwrap().params.dimensions
    }

    #[inline]
    pub fn sampler(&self) -> SamplerParams {
        self.0.state.read().unwrap().params.sampler
    }

    /// The generation of the sampling parameters, independent of the data.
    #[inline]
    pub fn parameter_generation(&self) -> u64 {
        self.0.parameters.get()
    }

    /// Replaces format, dimensions and all the texels.
    pub fn set_data(&self, format: TextureFormat, dimensions: (u32, u32), data: Vec<u8>) {
        {
            let mut state = self.0.state.write().unwrap();
            state.params.format = format;
            state.params.dimensions = dimensions;
            assert_eq!(data.len(), state.params.len(), "Texel data size mismatch.");

            state.data = data;
            self.0.dirty.invalidate(state.params.rect());
        }

        self.0.header.generation().bump();
    }

    /// Overwrites the texels inside `rect`, `texels` are tightly packed rows.
    pub fn write_region(&self, rect: Rect, texels: &[u8]) {
        {
            let mut state = self.0.state.write().unwrap();
            assert!(
                state.params.rect().contains(&rect),
                "Region {:?} out of bounds.",
                rect
            );

            let bpp = state.params.format.size();
            let row = rect.w as usize * bpp;
            let stride = state.params.dimensions.0 as usize * bpp;
            assert_eq!(texels.len(), row * rect.h as usize);

            for (i, y) in (rect.y..rect.bottom()).enumerate() {
                let begin = y as usize * stride + rect.x as usize * bpp;
                state.data[begin..begin + row].copy_from_slice(&texels[i * row..(i + 1) * row]);
            }

            self.0.dirty.invalidate(rect);
        }

        self.0.header.generation().bump();
    }

    pub fn set_sampler(&self, sampler: SamplerParams) {
        {
            let mut state = self.0.state.write().unwrap();
            if state.params.sampler == sampler {
                return;
            }

            state.params.sampler = sampler;
        }

        self.0.parameters.bump();
    }

    pub fn set_filter(&self, min: TextureFilter, mag: TextureFilter) {
        let mut sampler = self.sampler();
        sampler.min_filter = min;
        sampler.mag_filter = mag;
        self.set_sampler(sampler);
    }

    pub fn set_wrap(&self, wrap: TextureWrap) {
        let mut sampler = self.sampler();
        sampler.wrap = wrap;
        self.set_sampler(sampler);
    }

    pub fn set_border_color(&self, color: Color) {
        let mut sampler = self.sampler();
        sampler.border_color = color;
        self.set_sampler(sampler);
    }

    pub fn set_mipmap(&self, mipmap: bool) {
        let mut sampler = self.sampler();
        sampler.mipmap = mipmap;
        self.set_sampler(sampler);
    }

    /// Draws sampling this texture are sorted into the translucent queue.
    #[inline]
    pub fn is_translucent(&self) -> bool {
        self.0.state.read().unwrap().translucent
    }

    pub fn set_translucent(&self, translucent: bool) {
        self.0.state.write().unwrap().translucent = translucent;
    }

    /// Returns and clears the pending dirty rectangle of render thread `thread`.
    #[inline]
    pub fn take_dirty_region(&self, thread: usize) -> Rect {
        self.0.dirty.take(thread)
    }

    #[inline]
    pub(crate) fn parameters_ref(&self) -> &Generation {
        &self.0.parameters
    }

    #[inline]
    pub(crate) fn state(&self) -> RwLockReadGuard<TextureState> {
        self.0.state.read().unwrap()
    }
}
