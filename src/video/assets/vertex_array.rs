//! Vertex layouts binding buffers to shader attributes.

use std::sync::{Arc, RwLock, RwLockReadGuard};

use serde::{Deserialize, Serialize};

use super::buffer::BufferHandle;
use crate::video::resource::{ResourceHeader, Resources};

impl_handle!(VertexArrayHandle);

/// Vertex component format.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VertexFormat {
    Byte,
    UByte,
    Short,
    UShort,
    Float,
}

impl VertexFormat {
    pub fn size(self) -> usize {
        match self {
            VertexFormat::Byte | VertexFormat::UByte => 1,
            VertexFormat::Short | VertexFormat::UShort => 2,
            VertexFormat::Float => 4,
        }
    }
}

/// Index format.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexFormat {
    U16,
    U32,
}

impl IndexFormat {
    pub fn size(self) -> usize {
        match self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }
}

/// An attribute fetched from `buffer`. Buffers are referenced by handle, a
/// vertex array never keeps them alive.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub buffer: BufferHandle,
    pub format: VertexFormat,
    pub size: u8,
    pub normalized: bool,
    pub stride: u32,
    pub offset: u32,
    pub divisor: u32,
}

impl VertexAttribute {
    pub fn new(location: u32, buffer: BufferHandle, format: VertexFormat, size: u8) -> Self {
        VertexAttribute {
            location,
            buffer,
            format,
            size,
            normalized: false,
            stride: 0,
            offset: 0,
            divisor: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct VertexArrayState {
    pub attributes: Vec<VertexAttribute>,
    pub index: Option<(BufferHandle, IndexFormat)>,
}

#[derive(Debug)]
pub(crate) struct VertexArrayInner {
    pub header: ResourceHeader<VertexArrayHandle>,
    state: RwLock<VertexArrayState>,
}

#[derive(Clone)]
pub struct VertexArray(Arc<VertexArrayInner>);

impl_resource!(VertexArray, VertexArrayInner, VertexArrayHandle);

impl VertexArray {
    pub fn new(resources: &Resources) -> Self {
        let inner = resources.insert_vertex_array(|header| VertexArrayInner {
            header,
            state: RwLock::new(VertexArrayState::default()),
        });

        VertexArray(inner)
    }

    /// Adds an attribute, replacing the one at the same location if any.
    pub fn add_attribute(&self, attribute: VertexAttribute) {
        {
            let mut state = self.0.state.write().unwrap();
            state.attributes.retain(|v| v.location != attribute.location);
            state.attributes.push(attribute);
        }

        self.0.header.generation().bump();
    }

    pub fn set_attributes(&self, attributes: Vec<VertexAttribute>) {
        self.0.state.write().unwrap().attributes = attributes;
        self.0.header.generation().bump();
    }

    pub fn set_index_buffer(&self, index: Option<(BufferHandle, IndexFormat)>) {
        self.0.state.write().unwrap().index = index;
        self.0.header.generation().bump();
    }

    #[inline]
    pub fn attributes(&self) -> Vec<VertexAttribute> {
        self.0.state.read().unwrap().attributes.clone()
    }

    #[inline]
    pub fn index_format(&self) -> Option<IndexFormat> {
        self.0.state.read().unwrap().index.map(|v| v.1)
    }

    #[inline]
    pub(crate) fn state(&self) -> RwLockReadGuard<VertexArrayState> {
        self.0.state.read().unwrap()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::video::assets::buffer::{Buffer, BufferUsage};

    #[test]
    fn non_owning() {
        let resources = Resources::new();
        let buffer = Buffer::new(&resources, BufferUsage::Static, vec![0; 16]);
        let handle = buffer.handle();

        let vertex_array = VertexArray::new(&resources);
        vertex_array.add_attribute(VertexAttribute::new(0, handle, VertexFormat::Float, 2));
        vertex_array.add_attribute(VertexAttribute::new(0, handle, VertexFormat::Float, 4));
        assert_eq!(vertex_array.attributes().len(), 1);
        assert_eq!(vertex_array.attributes()[0].size, 4);

        drop(buffer);
        assert!(resources.buffer(handle).is_none());
    }
}
