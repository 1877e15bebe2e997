//! The render queue records draws into segments bounded by pipeline state
//! changes, and replays them into a device on flush.
//!
//! Inside a segment, opaque draws are sorted by their `RenderState` to cluster
//! identical bindings, while translucent draws keep their submission order.

use crate::utils::prelude::*;
use crate::video::assets::prelude::*;
use crate::video::backends::{Device, NativeBuffer, NativeProgram, NativeTexture, NativeVertexArray};
use crate::video::command::{CommandRef, RenderCommand, RenderState, StateCommand};

/// The state of a `RenderQueue`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum QueueState {
    Recording,
    Flushing,
}

/// A cache entry referenced by a recorded command. It stays pinned until the
/// command has been flushed or discarded.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Pin {
    Buffer(BufferHandle),
    Texture(TextureHandle),
    Program(ProgramHandle),
    VertexArray(VertexArrayHandle),
    FrameBuffer(FrameBufferHandle),
}

#[derive(Debug, Clone)]
struct Segment {
    entry: Option<StateCommand>,
    opaques: (usize, usize),
    translucents: (usize, usize),
}

/// Counters of a flush.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct FlushStats {
    pub segments: usize,
    pub draw_calls: usize,
    /// Entry actions plus the binds which were not eliminated.
    pub state_changes: usize,
    /// Draws dropped because the device rejected them.
    pub failures: usize,
}

impl FlushStats {
    pub fn merge(&mut self, rhs: &FlushStats) {
        self.segments += rhs.segments;
        self.draw_calls += rhs.draw_calls;
        self.state_changes += rhs.state_changes;
        self.failures += rhs.failures;
    }
}

pub struct RenderQueue {
    state: QueueState,
    segments: Vec<Segment>,
    opaques: Vec<(RenderState, RenderCommand)>,
    translucents: Vec<(RenderState, RenderCommand)>,
    bufs: DataBuffer,
    pins: Vec<Pin>,
}

impl Default for RenderQueue {
    fn default() -> Self {
        RenderQueue::new()
    }
}

impl RenderQueue {
    pub fn new() -> Self {
        RenderQueue {
            state: QueueState::Recording,
            segments: Vec::new(),
            opaques: Vec::with_capacity(64),
            translucents: Vec::with_capacity(64),
            bufs: DataBuffer::with_capacity(4 * 1024),
            pins: Vec::new(),
        }
    }

    #[inline]
    pub fn state(&self) -> QueueState {
        self.state
    }

    /// The number of recorded segments, including the current one.
    #[inline]
    pub fn segments(&self) -> usize {
        self.segments.len()
    }

    /// The number of recorded draws.
    #[inline]
    pub fn len(&self) -> usize {
        self.opaques.len() + self.translucents.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty() && self.opaques.is_empty() && self.translucents.is_empty()
    }

    /// Closes the current segment and opens a new one, whose commands run after
    /// `entry` has been applied.
    pub fn new_segment(&mut self, entry: Option<StateCommand>) {
        debug_assert_eq!(self.state, QueueState::Recording);

        self.segments.push(Segment {
            entry,
            opaques: (self.opaques.len(), self.opaques.len()),
            translucents: (self.translucents.len(), self.translucents.len()),
        });
    }

    /// Copies the resolved uniform values of a command into the queue.
    pub fn store_uniforms(&mut self, uniforms: &[(i32, UniformValue)]) -> DataBufferPtr<[(i32, UniformValue)]> {
        self.bufs.extend_from_slice(uniforms)
    }

    /// Appends a command to the current segment, opening an implicit one if
    /// nothing has been recorded yet.
    pub fn push(&mut self, state: RenderState, command: RenderCommand, translucent: bool) -> CommandRef {
        debug_assert_eq!(self.state, QueueState::Recording);

        if self.segments.is_empty() {
            self.new_segment(None);
        }

        let segment = self.segments.len() - 1;
        let current = &mut self.segments[segment];

        let index = if translucent {
            self.translucents.push((state, command));
            current.translucents.1 = self.translucents.len();
            current.translucents.1 - current.translucents.0 - 1
        } else {
            self.opaques.push((state, command));
            current.opaques.1 = self.opaques.len();
            current.opaques.1 - current.opaques.0 - 1
        };

        CommandRef {
            segment,
            index,
            translucent,
        }
    }

    /// Keeps `pin` until the recorded commands are gone.
    #[inline]
    pub fn pin(&mut self, pin: Pin) {
        self.pins.push(pin);
    }

    /// Takes the pins of flushed or discarded commands.
    pub fn take_pins(&mut self) -> Vec<Pin> {
        ::std::mem::replace(&mut self.pins, Vec::new())
    }

    /// Replays every segment into `device`, then clears the recorded commands.
    /// Pins are left for `take_pins`.
    pub fn flush<D: Device>(&mut self, device: &mut D) -> FlushStats {
        self.state = QueueState::Flushing;

        let mut stats = FlushStats::default();
        let mut binds = Bindings::default();

        for segment in &self.segments {
            stats.segments += 1;

            if let Some(ref entry) = segment.entry {
                match device.apply(entry) {
                    Ok(_) => stats.state_changes += 1,
                    Err(err) => warn!("[RenderQueue] failed to apply {:?}, {}.", entry, err),
                }
            }

            let opaques = &mut self.opaques[segment.opaques.0..segment.opaques.1];
            opaques.sort_by(|lhs, rhs| lhs.0.cmp(&rhs.0));

            let translucents = &self.translucents[segment.translucents.0..segment.translucents.1];
            for &(ref state, ref cmd) in opaques.iter().chain(translucents.iter()) {
                stats.state_changes += binds.bind(device, state);

                for &(location, ref value) in self.bufs.as_slice(cmd.uniforms) {
                    device.set_uniform(location, value);
                }

                match device.draw(cmd.primitive, cmd.first, cmd.count, cmd.index) {
                    Ok(_) => stats.draw_calls += 1,
                    Err(err) => {
                        warn!("[RenderQueue] failed to draw, {}.", err);
                        stats.failures += 1;
                    }
                }
            }
        }

        self.clear();
        self.state = QueueState::Recording;
        stats
    }

    /// Drops the recorded commands without executing them.
    pub fn clear(&mut self) {
        self.segments.clear();
        self.opaques.clear();
        self.translucents.clear();
        self.bufs.clear();
    }
}

/// The bindings issued so far during a flush.
#[derive(Default)]
struct Bindings {
    program: Option<NativeProgram>,
    vertex_array: Option<NativeVertexArray>,
    uniform_buffer: Option<Option<NativeBuffer>>,
    textures: FastHashMap<u32, NativeTexture>,
}

impl Bindings {
    fn bind<D: Device>(&mut self, device: &mut D, state: &RenderState) -> usize {
        let mut changes = 0;

        if self.program != Some(state.program) {
            device.bind_program(Some(state.program));
            self.program = Some(state.program);
            changes += 1;
        }

        if self.vertex_array != Some(state.vertex_array) {
            device.bind_vertex_array(Some(state.vertex_array));
            self.vertex_array = Some(state.vertex_array);
            changes += 1;
        }

        if self.uniform_buffer != Some(state.uniform_buffer) {
            device.bind_uniform_buffer(0, state.uniform_buffer);
            self.uniform_buffer = Some(state.uniform_buffer);
            changes += 1;
        }

        for &(unit, texture) in &state.textures {
            if self.textures.get(&unit) != Some(&texture) {
                device.bind_texture(unit, Some(texture));
                self.textures.insert(unit, texture);
                changes += 1;
            }
        }

        changes
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::video::backends::headless::{Call, HeadlessDevice};
    use crate::video::command::Primitive;

    fn state(program: u32, vertex_array: u32) -> RenderState {
        RenderState {
            program: NativeProgram(program),
            vertex_array: NativeVertexArray(vertex_array),
            ..Default::default()
        }
    }

    fn command(queue: &mut RenderQueue, first: u32) -> RenderCommand {
        RenderCommand {
            primitive: Primitive::Triangles,
            first,
            count: 3,
            index: None,
            uniforms: queue.store_uniforms(&[(0, UniformValue::I32(first as i32))]),
        }
    }

    fn draws(device: &HeadlessDevice) -> Vec<u32> {
        device
            .calls()
            .into_iter()
            .filter_map(|v| match v {
                Call::Draw { first, .. } => Some(first),
                _ => None,
            }).collect()
    }

    #[test]
    fn translucent_order() {
        let mut device = HeadlessDevice::new();
        let mut queue = RenderQueue::new();

        for (i, p) in [3, 1, 2].iter().enumerate() {
            let cmd = command(&mut queue, i as u32);
            let r = queue.push(state(*p, 1), cmd, true);
            assert_eq!(r.index, i);
            assert!(r.translucent);
        }

        let stats = queue.flush(&mut device);
        assert_eq!(stats.draw_calls, 3);
        assert_eq!(draws(&device), vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn opaque_grouping() {
        let mut device = HeadlessDevice::new();
        let mut queue = RenderQueue::new();

        for (i, p) in [2, 1, 2, 1].iter().enumerate() {
            let cmd = command(&mut queue, i as u32);
            queue.push(state(*p, 1), cmd, false);
        }

        queue.flush(&mut device);
        assert_eq!(draws(&device), vec![1, 3, 0, 2]);

        let binds = device.count(|v| match v {
            Call::BindProgram(_) => true,
            _ => false,
        });
        assert_eq!(binds, 2);
    }

    #[test]
    fn segments() {
        let mut device = HeadlessDevice::new();
        let mut queue = RenderQueue::new();

        let cmd = command(&mut queue, 0);
        queue.push(state(2, 1), cmd, false);
        queue.new_segment(Some(StateCommand::SetScissor(None)));
        let cmd = command(&mut queue, 1);
        let r = queue.push(state(1, 1), cmd, false);
        assert_eq!(r.segment, 1);
        assert_eq!(r.index, 0);
        assert_eq!(queue.segments(), 2);

        let stats = queue.flush(&mut device);
        assert_eq!(stats.segments, 2);

        let calls = device.calls();
        let apply = calls
            .iter()
            .position(|v| *v == Call::Apply(StateCommand::SetScissor(None)))
            .unwrap();
        let first = calls
            .iter()
            .position(|v| match v {
                Call::Draw { first: 0, .. } => true,
                _ => false,
            }).unwrap();
        assert!(first < apply);
        assert_eq!(draws(&device), vec![0, 1]);
        assert_eq!(queue.state(), QueueState::Recording);
    }

    #[test]
    fn pins() {
        let mut queue = RenderQueue::new();
        let h: ProgramHandle = Handle::new(1, 1).into();
        queue.pin(Pin::Program(h));
        queue.clear();
        assert_eq!(queue.take_pins(), vec![Pin::Program(h)]);
        assert!(queue.take_pins().is_empty());
    }
}
