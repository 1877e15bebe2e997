extern crate env_logger;
extern crate lucent;

use lucent::prelude::*;
use lucent::video::backends::headless::{Call, HeadlessDevice, COMPILE_FAILURE_MARKER, LINK_FAILURE_MARKER};
use lucent::video::command::StateCommand;

const VS: &str = "attribute vec2 a_Position; void main() {}";
const FS: &str = "uniform vec4 u_Color; uniform sampler2D u_Diffuse; uniform sampler2D u_Normal; void main() {}";

fn driver(device: &HeadlessDevice, resources: &Resources, params: DriverParams) -> RenderDriver<HeadlessDevice> {
    let _ = env_logger::try_init();
    RenderDriver::new(device.share(), resources, params).unwrap()
}

fn quad(resources: &Resources) -> (Buffer, VertexArray) {
    let buffer = Buffer::new(resources, BufferUsage::Static, vec![0; 32]);
    let vertex_array = VertexArray::new(resources);
    vertex_array.add_attribute(VertexAttribute::new(0, buffer.handle(), VertexFormat::Float, 2));
    (buffer, vertex_array)
}

#[test]
fn buffer_uploads_once() {
    let resources = Resources::new();
    let device = HeadlessDevice::new();
    let mut driver = driver(&device, &resources, DriverParams::default());

    let buffer = Buffer::new(&resources, BufferUsage::Dynamic, vec![1; 64]);
    let native = driver.prepare_buffer(&buffer).unwrap();
    assert_eq!(driver.prepare_buffer(&buffer).unwrap(), native);

    let creates = device.count(|v| match v {
        Call::CreateBuffer(..) => true,
        _ => false,
    });
    assert_eq!(creates, 1);

    device.clear_calls();
    buffer.write(8, &[9; 4]);
    driver.prepare_buffer(&buffer).unwrap();
    driver.prepare_buffer(&buffer).unwrap();
    assert_eq!(device.calls(), vec![Call::UpdateBuffer(native, 8, 4)]);
    assert_eq!(&device.buffer_contents(native).unwrap()[6..14], &[1, 1, 9, 9, 9, 9, 1, 1]);

    device.clear_calls();
    buffer.set_data(vec![2; 128]);
    assert_eq!(driver.prepare_buffer(&buffer).unwrap(), native);
    assert_eq!(device.calls(), vec![Call::RespecifyBuffer(native, 128)]);
}

#[test]
fn threads_upload_independently() {
    let resources = Resources::new();
    let d0 = HeadlessDevice::new();
    let d1 = HeadlessDevice::new();
    let mut r0 = driver(&d0, &resources, DriverParams::default());
    let mut r1 = driver(&d1, &resources, DriverParams::default());

    let buffer = Buffer::new(&resources, BufferUsage::Dynamic, vec![0; 50]);
    let n0 = r0.prepare_buffer(&buffer).unwrap();
    let n1 = r1.prepare_buffer(&buffer).unwrap();

    buffer.invalidate_region(10, 20);
    buffer.invalidate_region(40, 10);

    d0.clear_calls();
    d1.clear_calls();
    r0.prepare_buffer(&buffer).unwrap();
    assert_eq!(d0.calls(), vec![Call::UpdateBuffer(n0, 10, 40)]);
    assert!(d1.calls().is_empty());

    r1.prepare_buffer(&buffer).unwrap();
    assert_eq!(d1.calls(), vec![Call::UpdateBuffer(n1, 10, 40)]);
}

#[test]
fn staged_buffer_update() {
    let resources = Resources::new();
    let device = HeadlessDevice::new();

    let mut params = DriverParams::default();
    params.staging_threshold = 16;
    let mut driver = driver(&device, &resources, params);

    let buffer = Buffer::new(&resources, BufferUsage::Dynamic, vec![0; 64]);
    let native = driver.prepare_buffer(&buffer).unwrap();

    device.clear_calls();
    buffer.write(0, &[7; 32]);
    driver.prepare_buffer(&buffer).unwrap();

    let calls = device.calls();
    assert!(calls.iter().any(|v| match *v {
        Call::CreateUploadBuffer(_, size) => size == 65536,
        _ => false,
    }));
    assert!(calls.iter().any(|v| match *v {
        Call::CopyBuffer { dst, dst_offset, len, .. } => dst == native && dst_offset == 0 && len == 32,
        _ => false,
    }));
    assert_eq!(device.fences(), 1);
    let contents = device.buffer_contents(native).unwrap();
    assert_eq!(&contents[..32], &[7; 32][..]);
    assert_eq!(contents[32], 0);

    assert_eq!(driver.pool_stats().in_use, 1);
    driver.pre_frame();
    assert_eq!(driver.pool_stats().in_use, 1);

    device.signal_fences();
    driver.pre_frame();
    assert_eq!(driver.pool_stats().in_use, 0);
    assert_eq!(device.fences(), 0);

    buffer.write(32, &[3; 32]);
    driver.prepare_buffer(&buffer).unwrap();
    let uploads = device.count(|v| match v {
        Call::CreateUploadBuffer(..) => true,
        _ => false,
    });
    assert_eq!(uploads, 1);
}

#[test]
fn texture_budget_carry_over() {
    let resources = Resources::new();
    let device = HeadlessDevice::new();

    let mut params = DriverParams::default();
    params.texture_upload_budget = 64;
    let mut driver = driver(&device, &resources, params);

    let texels: Vec<u8> = (0..256).map(|v| v as u8).collect();
    let texture = Texture::new(&resources, TextureFormat::RGBA8, (8, 8), Some(texels.clone()));

    let mut frames = 0;
    let mut native;
    loop {
        driver.pre_frame();
        native = driver.prepare_texture(&texture).unwrap();
        assert!(driver.stats().texture_bytes <= 64);
        driver.post_frame();

        frames += 1;
        if !driver.is_texture_pending(&texture) {
            break;
        }

        assert!(frames < 16);
    }

    assert_eq!(frames, 4);
    assert_eq!(device.texture_contents(native).unwrap(), texels);

    let updates = device.count(|v| match v {
        Call::UpdateTexture(..) => true,
        _ => false,
    });
    assert_eq!(updates, 4);
}

#[test]
fn texture_budget_below_one_row() {
    let resources = Resources::new();
    let device = HeadlessDevice::new();

    let mut params = DriverParams::default();
    params.texture_upload_budget = 16;
    let mut driver = driver(&device, &resources, params);

    let a = Texture::new(&resources, TextureFormat::RGBA8, (8, 8), None);
    let b = Texture::new(&resources, TextureFormat::RGBA8, (8, 8), None);

    driver.pre_frame();
    driver.prepare_texture(&a).unwrap();
    driver.prepare_texture(&b).unwrap();
    assert_eq!(driver.stats().texture_bytes, 32);

    let native = driver.prepare_texture(&b).unwrap();
    assert!(driver.is_texture_pending(&b));
    assert_eq!(
        device.count(|v| *v == Call::UpdateTexture(native, Rect::new(0, 0, 8, 1))),
        0
    );

    driver.pre_frame();
    driver.prepare_texture(&b).unwrap();
    assert_eq!(
        device.count(|v| *v == Call::UpdateTexture(native, Rect::new(0, 0, 8, 1))),
        1
    );
}

#[test]
fn texture_region_and_sampler() {
    let resources = Resources::new();
    let device = HeadlessDevice::new();
    let mut driver = driver(&device, &resources, DriverParams::default());

    let texture = Texture::new(&resources, TextureFormat::R8, (4, 4), None);
    let native = driver.prepare_texture(&texture).unwrap();

    device.clear_calls();
    texture.set_filter(TextureFilter::Nearest, TextureFilter::Nearest);
    driver.prepare_texture(&texture).unwrap();
    assert_eq!(device.calls(), vec![Call::UpdateSampler(native)]);

    device.clear_calls();
    texture.write_region(Rect::new(1, 1, 2, 1), &[5, 6]);
    texture.write_region(Rect::new(2, 3, 1, 1), &[7]);
    driver.prepare_texture(&texture).unwrap();
    assert_eq!(device.calls(), vec![Call::UpdateTexture(native, Rect::new(1, 1, 2, 3))]);

    let texels = device.texture_contents(native).unwrap();
    assert_eq!(&texels[4..8], &[0, 5, 6, 0]);
    assert_eq!(texels[14], 7);
}

#[test]
fn texture_reallocation() {
    let resources = Resources::new();
    let device = HeadlessDevice::new();
    let mut driver = driver(&device, &resources, DriverParams::default());

    let texture = Texture::new(&resources, TextureFormat::RGBA8, (2, 2), None);
    let old = driver.prepare_texture(&texture).unwrap();

    texture.set_data(TextureFormat::RGBA8, (4, 4), vec![1; 64]);
    let new = driver.prepare_texture(&texture).unwrap();
    assert_ne!(old, new);
    assert_eq!(device.texture_contents(new).unwrap(), vec![1; 64]);
    assert_eq!(device.count(|v| *v == Call::DeleteTexture(old)), 0);

    driver.pre_frame();
    assert_eq!(device.count(|v| *v == Call::DeleteTexture(old)), 1);
    assert_eq!(driver.cached(ResourceKind::Texture), 1);
}

#[test]
fn mipmaps_after_upload() {
    let resources = Resources::new();
    let device = HeadlessDevice::new();
    let mut driver = driver(&device, &resources, DriverParams::default());

    let texture = Texture::new(&resources, TextureFormat::RGBA8, (4, 4), None);
    texture.set_mipmap(true);
    let native = driver.prepare_texture(&texture).unwrap();
    assert_eq!(device.count(|v| *v == Call::GenerateMipmaps(native)), 1);
}

#[test]
fn mipmaps_enabled_later() {
    let resources = Resources::new();
    let device = HeadlessDevice::new();
    let mut driver = driver(&device, &resources, DriverParams::default());

    let texture = Texture::new(&resources, TextureFormat::RGBA8, (4, 4), None);
    let native = driver.prepare_texture(&texture).unwrap();
    assert_eq!(device.count(|v| *v == Call::GenerateMipmaps(native)), 0);

    texture.set_mipmap(true);
    for _ in 0..2 {
        driver.pre_frame();
        driver.prepare_texture(&texture).unwrap();
    }

    assert_eq!(device.count(|v| *v == Call::UpdateSampler(native)), 1);
    assert_eq!(device.count(|v| *v == Call::GenerateMipmaps(native)), 1);

    // The chain is still valid while the texels are unchanged.
    texture.set_mipmap(false);
    driver.prepare_texture(&texture).unwrap();
    texture.set_mipmap(true);
    driver.prepare_texture(&texture).unwrap();

    assert_eq!(device.count(|v| *v == Call::UpdateSampler(native)), 3);
    assert_eq!(device.count(|v| *v == Call::GenerateMipmaps(native)), 1);
}

#[test]
fn program_failures() {
    let resources = Resources::new();
    let device = HeadlessDevice::new();
    let mut driver = driver(&device, &resources, DriverParams::default());

    let fs = format!("{}\n{}", FS, LINK_FAILURE_MARKER);
    let program = Program::new(&resources, ProgramParams::new(VS, fs));
    assert!(!driver.prepare_program(&program).unwrap());
    assert!(!driver.prepare_program(&program).unwrap());

    let (_buffer, vertex_array) = quad(&resources);
    let dc = DrawCall::new(program.clone(), vertex_array, Primitive::Triangles, 3);
    assert!(driver.create_render_command(&dc).is_err());
    assert_eq!(driver.stats().skipped, 1);

    let vs = format!("{}\n{}", VS, COMPILE_FAILURE_MARKER);
    program.set_params(ProgramParams::new(vs, FS));
    assert!(!driver.prepare_program(&program).unwrap());

    program.set_params(ProgramParams::new(VS, FS));
    assert!(driver.prepare_program(&program).unwrap());
    assert!(driver.create_render_command(&dc).is_ok());
}

#[test]
fn program_relink_retires_native() {
    let resources = Resources::new();
    let device = HeadlessDevice::new();
    let mut driver = driver(&device, &resources, DriverParams::default());

    let program = Program::new(&resources, ProgramParams::new(VS, FS));
    driver.prepare_program(&program).unwrap();

    program.set_params(ProgramParams::new(VS, format!("{} // v2", FS)));
    driver.prepare_program(&program).unwrap();

    let deletes = |device: &HeadlessDevice| {
        device.count(|v| match v {
            Call::DeleteProgram(..) => true,
            _ => false,
        })
    };

    assert_eq!(deletes(&device), 0);
    driver.pre_frame();
    assert_eq!(deletes(&device), 1);
    assert_eq!(driver.cached(ResourceKind::Program), 1);
}

#[test]
fn uniforms_and_samplers() {
    let resources = Resources::new();
    let device = HeadlessDevice::new();
    let mut driver = driver(&device, &resources, DriverParams::default());

    let params = ProgramParams::new(VS, FS)
        .with_uniform("u_Color")
        .with_uniform("u_Missing")
        .with_sampler("u_Diffuse")
        .with_sampler("u_Normal");
    let program = Program::new(&resources, params);

    let diffuse = Texture::new(&resources, TextureFormat::RGBA8, (1, 1), None);
    let normal = Texture::new(&resources, TextureFormat::RGBA8, (1, 1), None);

    let (_buffer, vertex_array) = quad(&resources);
    let mut dc = DrawCall::new(program, vertex_array, Primitive::Triangles, 6);
    dc.set_uniform_variable("u_Color", [1.0f32, 0.0, 0.0, 1.0]);
    dc.set_uniform_variable("u_Missing", 1.0f32);
    dc.set_uniform_variable("u_Unknown", 2i32);
    dc.set_texture("u_Normal", normal.clone());
    dc.set_texture("u_Diffuse", diffuse.clone());
    dc.set_texture("u_Specular", diffuse.clone());

    driver.create_render_command(&dc).unwrap();
    let n0 = driver.prepare_texture(&diffuse).unwrap();
    let n1 = driver.prepare_texture(&normal).unwrap();

    device.clear_calls();
    let stats = driver.flush();
    assert_eq!(stats.draw_calls, 1);

    let calls = device.calls();
    assert!(calls.contains(&Call::BindTexture(0, Some(n0))));
    assert!(calls.contains(&Call::BindTexture(1, Some(n1))));
    assert!(calls.contains(&Call::SetUniform(0, UniformValue::Vector4f([1.0, 0.0, 0.0, 1.0]))));

    let mut units: Vec<_> = calls
        .iter()
        .filter_map(|v| match *v {
            Call::SetUniform(_, UniformValue::I32(unit)) => Some(unit),
            _ => None,
        }).collect();
    units.sort();
    assert_eq!(units, vec![0, 1]);

    let uniforms = device.count(|v| match v {
        Call::SetUniform(..) => true,
        _ => false,
    });
    assert_eq!(uniforms, 3);
}

#[test]
fn texture_units_limit() {
    let resources = Resources::new();
    let device = HeadlessDevice::new();

    let mut params = DriverParams::default();
    params.max_texture_units = 1;
    let mut driver = driver(&device, &resources, params);

    let params = ProgramParams::new(VS, FS)
        .with_sampler("u_Diffuse")
        .with_sampler("u_Normal");
    let program = Program::new(&resources, params);
    let texture = Texture::new(&resources, TextureFormat::RGBA8, (1, 1), None);

    let (_buffer, vertex_array) = quad(&resources);
    let mut dc = DrawCall::new(program, vertex_array, Primitive::Triangles, 3);
    dc.set_texture("u_Diffuse", texture.clone());
    dc.set_texture("u_Normal", texture.clone());

    driver.create_render_command(&dc).unwrap();
    driver.flush();

    let binds = device.count(|v| match v {
        Call::BindTexture(..) => true,
        _ => false,
    });
    assert_eq!(binds, 1);
}

#[test]
fn vertex_array_follows_buffers() {
    let resources = Resources::new();
    let device = HeadlessDevice::new();
    let mut driver = driver(&device, &resources, DriverParams::default());

    let (buffer, vertex_array) = quad(&resources);
    let native = driver.prepare_vertex_array(&vertex_array).unwrap();
    assert_eq!(driver.cached(ResourceKind::Buffer), 1);

    device.clear_calls();
    driver.prepare_vertex_array(&vertex_array).unwrap();
    assert!(device.calls().is_empty());

    buffer.set_data(vec![0; 64]);
    driver.prepare_vertex_array(&vertex_array).unwrap();
    assert!(device.calls().contains(&Call::UpdateVertexArray(native)));

    device.clear_calls();
    let index = Buffer::new(&resources, BufferUsage::Static, vec![0; 12]);
    vertex_array.set_index_buffer(Some((index.handle(), IndexFormat::U16)));
    assert_eq!(driver.prepare_vertex_array(&vertex_array).unwrap(), native);
    assert!(device.calls().contains(&Call::UpdateVertexArray(native)));
    assert_eq!(driver.cached(ResourceKind::Buffer), 2);
}

#[test]
fn framebuffer_segments() {
    let resources = Resources::new();
    let device = HeadlessDevice::new();
    let mut driver = driver(&device, &resources, DriverParams::default());
    driver.set_surface_dimensions((640, 480));

    let color = Texture::new(&resources, TextureFormat::RGBA8, (32, 16), None);
    let depth = RenderBuffer::new(&resources, RenderBufferFormat::Depth24Stencil8, (32, 16));
    let framebuffer = FrameBuffer::new(&resources);
    framebuffer.attach_color(color.handle());
    framebuffer.set_depth_stencil(Some(depth.handle()));

    driver
        .new_segment(PipelineCommand::BindFrameBuffer(Some(framebuffer.clone())))
        .unwrap();
    driver
        .new_segment(PipelineCommand::BindFrameBuffer(None))
        .unwrap();

    device.clear_calls();
    let stats = driver.flush();
    assert_eq!(stats.segments, 2);

    let dimensions: Vec<_> = device
        .calls()
        .into_iter()
        .filter_map(|v| match v {
            Call::Apply(StateCommand::BindFramebuffer { framebuffer, dimensions }) => {
                Some((framebuffer.is_some(), dimensions))
            }
            _ => None,
        }).collect();
    assert_eq!(dimensions, vec![(true, (32, 16)), (false, (640, 480))]);

    depth.resize((64, 64));
    let (_, dimensions) = driver.prepare_framebuffer(&framebuffer).unwrap();
    assert_eq!(dimensions, (32, 16));

    let framebuffers = device.count(|v| match v {
        Call::CreateFramebuffer(..) => true,
        _ => false,
    });
    assert_eq!(framebuffers, 2);
}

#[test]
fn incomplete_framebuffer() {
    let resources = Resources::new();
    let device = HeadlessDevice::new();
    let mut driver = driver(&device, &resources, DriverParams::default());

    let framebuffer = FrameBuffer::new(&resources);
    assert!(driver.prepare_framebuffer(&framebuffer).is_err());
    assert!(driver
        .new_segment(PipelineCommand::BindFrameBuffer(Some(framebuffer)))
        .is_err());
}

#[test]
fn release_all() {
    let resources = Resources::new();
    let device = HeadlessDevice::new();
    let mut driver = driver(&device, &resources, DriverParams::default());

    let program = Program::new(&resources, ProgramParams::new(VS, FS));
    let texture = Texture::new(&resources, TextureFormat::RGBA8, (2, 2), None);
    let (buffer, vertex_array) = quad(&resources);

    driver.prepare_program(&program).unwrap();
    driver.prepare_texture(&texture).unwrap();
    driver.prepare_vertex_array(&vertex_array).unwrap();
    assert!(device.live_objects() > 0);

    driver.skip_frame_and_release_resources();
    assert_eq!(device.live_objects(), 0);

    let native = driver.prepare_buffer(&buffer).unwrap();
    assert!(device.buffer_contents(native).is_some());

    drop(driver);
    assert_eq!(device.live_objects(), 0);
}
