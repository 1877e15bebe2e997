use crate::video::resource::ResourceKind;

/// Typed failures of the render core. They are usually boxed into a
/// `failure::Error` once they leave the `video` module.
#[derive(Debug, Fail)]
pub enum Error {
    #[fail(display = "{:?} {} is invalid.", _0, _1)]
    InvalidHandle(ResourceKind, String),
    #[fail(display = "Failed to compile shader, errors: \n{}.", _0)]
    ShaderCompile(String),
    #[fail(display = "Failed to link program, errors: \n{}.", _0)]
    ProgramLink(String),
    #[fail(display = "Framebuffer is incomplete: {}.", _0)]
    IncompleteFramebuffer(String),
    #[fail(display = "Out of bounds, {} exceeds {}.", _0, _1)]
    OutOfBounds(usize, usize),
    #[fail(display = "OpenGL implementation doesn\'t support {}.", _0)]
    Unsupported(String),
    #[fail(display = "Failed to allocate native {:?}.", _0)]
    Allocation(ResourceKind),
    #[fail(display = "Worker thread has been terminated.")]
    WorkerTerminated,
}

pub type Result<T> = ::std::result::Result<T, Error>;
