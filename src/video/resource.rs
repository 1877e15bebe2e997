//! Identities, generations and release notifications of logical resources.
//!
//! Every logical resource (`Buffer`, `Texture`, ...) carries a typed handle that
//! stays stable for its whole lifetime, and a `Generation` that is bumped by all
//! of its mutating setters. Render drivers keep a copy of the generation that
//! was uploaded last, and `cached < current` is the only staleness test.
//!
//! Dropping the last clone of a logical resource never destroys native objects
//! synchronously. Instead, a `ReleasedResource` is pushed into the inbox of
//! every registered render thread, and each driver reclaims its own native copy
//! during its next garbage collection.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use crate::utils::prelude::*;
use crate::video::assets::prelude::*;

/// The closed set of resource kinds managed by render drivers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Buffer,
    Texture,
    Program,
    VertexArray,
    FrameBuffer,
    RenderBuffer,
    Shader,
}

/// A monotonic 64-bit version counter.
#[derive(Debug)]
pub struct Generation(AtomicU64);

impl Generation {
    /// The generation cached copies start with, older than any live generation.
    pub const UNUPLOADED: u64 = 0;

    pub fn new() -> Self {
        Generation(AtomicU64::new(1))
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Increments the generation and returns the new value.
    #[inline]
    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Returns true if a copy made at `cached` is stale.
    #[inline]
    pub fn is_newer_than(&self, cached: u64) -> bool {
        cached < self.get()
    }
}

impl Default for Generation {
    fn default() -> Self {
        Generation::new()
    }
}

/// Notification that the last reference of a logical resource has been dropped.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ReleasedResource {
    pub kind: ResourceKind,
    pub handle: Handle,
}

type Inbox = Arc<Mutex<Vec<ReleasedResource>>>;

/// The registration of a render thread, used to index per-thread dirty regions
/// and to receive release notifications.
#[derive(Debug, Clone)]
pub struct RenderThread {
    index: usize,
    inbox: Inbox,
}

impl RenderThread {
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Takes all the release notifications delivered so far.
    pub fn drain(&self) -> Vec<ReleasedResource> {
        let mut inbox = self.inbox.lock().unwrap();
        ::std::mem::replace(&mut *inbox, Vec::new())
    }
}

const INHERIT_EXPIRATION: u64 = u64::MAX;

/// The bookkeeping shared by every kind of logical resource.
#[derive(Debug)]
pub(crate) struct ResourceHeader<H: HandleLike> {
    handle: H,
    kind: ResourceKind,
    generation: Generation,
    expiration: AtomicU64,
    shared: Arc<Shared>,
}

impl<H> ResourceHeader<H>
where
    H: HandleLike + Into<Handle>,
{
    fn new(handle: H, kind: ResourceKind, shared: Arc<Shared>) -> Self {
        ResourceHeader {
            handle,
            kind,
            generation: Generation::new(),
            expiration: AtomicU64::new(INHERIT_EXPIRATION),
            shared,
        }
    }

    #[inline]
    pub fn handle(&self) -> H {
        self.handle
    }

    #[inline]
    pub fn generation(&self) -> &Generation {
        &self.generation
    }

    #[inline]
    pub fn threads(&self) -> Arc<AtomicUsize> {
        self.shared.threads.clone()
    }

    /// The expiration of this resource, `None` if it inherits the driver's
    /// default for its kind.
    pub fn expiration(&self) -> Option<Duration> {
        match self.expiration.load(Ordering::Relaxed) {
            INHERIT_EXPIRATION => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn set_expiration(&self, expiration: Duration) {
        let ms = expiration.as_secs() * 1000 + u64::from(expiration.subsec_millis());
        self.expiration
            .store(ms.min(INHERIT_EXPIRATION - 1), Ordering::Relaxed);
    }
}

impl<H: HandleLike> Drop for ResourceHeader<H> {
    fn drop(&mut self) {
        let handle = Handle::new(self.handle.index(), self.handle.version());
        self.shared.release(self.kind, handle);
    }
}

/// Typed handle allocation plus weak lookups of live resources.
pub(crate) struct Registry<H: HandleLike, T> {
    objects: Mutex<ObjectPool<H, Weak<T>>>,
}

impl<H: HandleLike, T> Registry<H, T> {
    fn new() -> Self {
        Registry {
            objects: Mutex::new(ObjectPool::new()),
        }
    }

    fn insert_with<F>(&self, func: F) -> Arc<T>
    where
        F: FnOnce(H) -> T,
    {
        let mut objects = self.objects.lock().unwrap();
        let handle = objects.create(Weak::new());
        let value = Arc::new(func(handle));
        if let Some(slot) = objects.get_mut(handle) {
            *slot = Arc::downgrade(&value);
        }

        value
    }

    fn get(&self, handle: H) -> Option<Arc<T>> {
        let objects = self.objects.lock().unwrap();
        objects.get(handle).and_then(Weak::upgrade)
    }

    fn free(&self, handle: H) {
        self.objects.lock().unwrap().free(handle);
    }

    fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

pub(crate) struct Shared {
    buffers: Registry<BufferHandle, BufferInner>,
    textures: Registry<TextureHandle, TextureInner>,
    programs: Registry<ProgramHandle, ProgramInner>,
    vertex_arrays: Registry<VertexArrayHandle, VertexArrayInner>,
    framebuffers: Registry<FrameBufferHandle, FrameBufferInner>,
    render_buffers: Registry<RenderBufferHandle, RenderBufferInner>,
    threads: Arc<AtomicUsize>,
    inboxes: RwLock<Vec<Inbox>>,
}

impl ::std::fmt::Debug for Shared {
    fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
        f.debug_struct("Shared")
            .field("threads", &self.threads.load(Ordering::Relaxed))
            .finish()
    }
}

impl Shared {
    fn release(&self, kind: ResourceKind, handle: Handle) {
        match kind {
            ResourceKind::Buffer => self.buffers.free(handle.into()),
            ResourceKind::Texture => self.textures.free(handle.into()),
            ResourceKind::Program => self.programs.free(handle.into()),
            ResourceKind::VertexArray => self.vertex_arrays.free(handle.into()),
            ResourceKind::FrameBuffer => self.framebuffers.free(handle.into()),
            ResourceKind::RenderBuffer => self.render_buffers.free(handle.into()),
            ResourceKind::Shader => {}
        }

        let inboxes = self.inboxes.read().unwrap();
        for inbox in inboxes.iter() {
            inbox.lock().unwrap().push(ReleasedResource { kind, handle });
        }
    }
}

/// The context scoped registry of logical resources. Cloning it is cheap, and
/// all the clones refer to the same registry.
#[derive(Debug, Clone)]
pub struct Resources {
    shared: Arc<Shared>,
}

impl Default for Resources {
    fn default() -> Self {
        Resources::new()
    }
}

macro_rules! impl_registry {
    ($field:ident, $lookup:ident, $insert:ident, $handle:ident, $inner:ident, $resource:ident, $kind:ident) => {
        impl Resources {
            /// Looks up a live resource by its handle.
            pub fn $lookup(&self, handle: $handle) -> Option<$resource> {
                self.shared.$field.get(handle).map($resource::from_inner)
            }

            pub(crate) fn $insert<F>(&self, func: F) -> Arc<$inner>
            where
                F: FnOnce(ResourceHeader<$handle>) -> $inner,
            {
                let shared = self.shared.clone();
                self.shared.$field.insert_with(move |handle| {
                    func(ResourceHeader::new(handle, ResourceKind::$kind, shared))
                })
            }
        }
    };
}

impl_registry!(buffers, buffer, insert_buffer, BufferHandle, BufferInner, Buffer, Buffer);
impl_registry!(textures, texture, insert_texture, TextureHandle, TextureInner, Texture, Texture);
impl_registry!(programs, program, insert_program, ProgramHandle, ProgramInner, Program, Program);
impl_registry!(
    vertex_arrays,
    vertex_array,
    insert_vertex_array,
    VertexArrayHandle,
    VertexArrayInner,
    VertexArray,
    VertexArray
);
impl_registry!(
    framebuffers,
    framebuffer,
    insert_framebuffer,
    FrameBufferHandle,
    FrameBufferInner,
    FrameBuffer,
    FrameBuffer
);
impl_registry!(
    render_buffers,
    render_buffer,
    insert_render_buffer,
    RenderBufferHandle,
    RenderBufferInner,
    RenderBuffer,
    RenderBuffer
);

impl Resources {
    pub fn new() -> Self {
        let shared = Shared {
            buffers: Registry::new(),
            textures: Registry::new(),
            programs: Registry::new(),
            vertex_arrays: Registry::new(),
            framebuffers: Registry::new(),
            render_buffers: Registry::new(),
            threads: Arc::new(AtomicUsize::new(0)),
            inboxes: RwLock::new(Vec::new()),
        };

        Resources {
            shared: Arc::new(shared),
        }
    }

    /// Registers a new render thread. Per-thread dirty regions grow a slot for
    /// it, and it receives release notifications from now on.
    pub fn register_thread(&self) -> RenderThread {
        let inbox = Arc::new(Mutex::new(Vec::new()));

        let mut inboxes = self.shared.inboxes.write().unwrap();
        inboxes.push(inbox.clone());
        let index = inboxes.len() - 1;
        self.shared.threads.store(inboxes.len(), Ordering::Release);

        info!("[Resources] render thread {} registered.", index);
        RenderThread { index, inbox }
    }

    /// The number of registered render threads.
    #[inline]
    pub fn threads(&self) -> usize {
        self.shared.threads.load(Ordering::Acquire)
    }

    /// The number of live logical resources of `kind`.
    pub fn len(&self, kind: ResourceKind) -> usize {
        match kind {
            ResourceKind::Buffer => self.shared.buffers.len(),
            ResourceKind::Texture => self.shared.textures.len(),
            ResourceKind::Program => self.shared.programs.len(),
            ResourceKind::VertexArray => self.shared.vertex_arrays.len(),
            ResourceKind::FrameBuffer => self.shared.framebuffers.len(),
            ResourceKind::RenderBuffer => self.shared.render_buffers.len(),
            ResourceKind::Shader => 0,
        }
    }
}
