//! GPU programs made of a vertex and a fragment stage.

use std::sync::{Arc, RwLock, RwLockReadGuard};

use serde::{Deserialize, Serialize};

use crate::video::resource::{ResourceHeader, Resources};

impl_handle!(ProgramHandle);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

/// Uniform variable for program objects. Matrices are supplied in column major
/// order.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum UniformValue {
    I32(i32),
    F32(f32),
    Vector2f([f32; 2]),
    Vector3f([f32; 3]),
    Vector4f([f32; 4]),
    Matrix2f([[f32; 2]; 2]),
    Matrix3f([[f32; 3]; 3]),
    Matrix4f([[f32; 4]; 4]),
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        UniformValue::I32(v)
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::F32(v)
    }
}

impl From<[f32; 2]> for UniformValue {
    fn from(v: [f32; 2]) -> Self {
        UniformValue::Vector2f(v)
    }
}

impl From<[f32; 3]> for UniformValue {
    fn from(v: [f32; 3]) -> Self {
        UniformValue::Vector3f(v)
    }
}

impl From<[f32; 4]> for UniformValue {
    fn from(v: [f32; 4]) -> Self {
        UniformValue::Vector4f(v)
    }
}

impl From<[[f32; 4]; 4]> for UniformValue {
    fn from(v: [[f32; 4]; 4]) -> Self {
        UniformValue::Matrix4f(v)
    }
}

/// Sources of a program, plus the names of uniforms and samplers whose
/// locations are resolved once after linking.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgramParams {
    pub vs: String,
    pub fs: String,
    pub uniforms: Vec<String>,
    pub samplers: Vec<String>,
}

impl ProgramParams {
    pub fn new<T1: Into<String>, T2: Into<String>>(vs: T1, fs: T2) -> Self {
        ProgramParams {
            vs: vs.into(),
            fs: fs.into(),
            uniforms: Vec::new(),
            samplers: Vec::new(),
        }
    }

    pub fn with_uniform<T: Into<String>>(mut self, name: T) -> Self {
        self.uniforms.push(name.into());
        self
    }

    pub fn with_sampler<T: Into<String>>(mut self, name: T) -> Self {
        self.samplers.push(name.into());
        self
    }
}

#[derive(Debug)]
pub(crate) struct ProgramInner {
    pub header: ResourceHeader<ProgramHandle>,
    params: RwLock<ProgramParams>,
}

/// A shared program description, compiled and linked lazily by render drivers.
#[derive(Clone)]
pub struct Program(Arc<ProgramInner>);

impl_resource!(Program, ProgramInner, ProgramHandle);

impl Program {
    pub fn new(resources: &Resources, params: ProgramParams) -> Self {
        let inner = resources.insert_program(move |header| ProgramInner {
            header,
            params: RwLock::new(params),
        });

        Program(inner)
    }

    /// Replaces the sources and declarations, the program is relinked on its
    /// next use.
    pub fn set_params(&self, params: ProgramParams) {
        *self.0.params.write().unwrap() = params;
        self.0.header.generation().bump();
    }

    #[inline]
    pub fn params(&self) -> ProgramParams {
        self.0.params.read().unwrap().clone()
    }

    #[inline]
    pub(crate) fn state(&self) -> RwLockReadGuard<ProgramParams> {
        self.0.params.read().unwrap()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn params() {
        let resources = Resources::new();
        let params = ProgramParams::new("vs", "fs")
            .with_uniform("u_Color")
            .with_sampler("u_Texture");

        let program = Program::new(&resources, params.clone());
        assert_eq!(program.params(), params);

        let generation = program.generation();
        program.set_params(ProgramParams::new("vs2", "fs2"));
        assert!(program.generation() > generation);
        assert_eq!(program.state().vs, "vs2");
    }
}
