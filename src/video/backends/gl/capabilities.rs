use std::cmp;
use std::ffi;

use gl;
use gl::types::*;

use crate::errors::*;

/// Describes the OpenGL context profile.
#[derive(Debug, Copy, Clone)]
pub enum Profile {
    /// The context uses only future-compatible functions and definitions.
    Core,
    /// The context includes all immediate mode functions and definitions.
    Compatibility,
}

/// Describes a version.
///
/// A version can only be compared to another version if they belong to the same API.
/// For example, both `Version::GL(3, 0) >= Version::ES(3, 0)` and `Version::ES(3, 0) >=
/// Version::GL(3, 0)` return `false`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Version {
    /// Regular OpenGL.
    GL(u8, u8),
    /// OpenGL embedded system.
    ES(u8, u8),
}

impl PartialOrd for Version {
    #[inline]
    fn partial_cmp(&self, other: &Version) -> Option<cmp::Ordering> {
        let (es1, major1, minor1) = match *self {
            Version::GL(major, minor) => (false, major, minor),
            Version::ES(major, minor) => (true, major, minor),
        };

        let (es2, major2, minor2) = match *other {
            Version::GL(major, minor) => (false, major, minor),
            Version::ES(major, minor) => (true, major, minor),
        };

        if es1 != es2 {
            None
        } else {
            match major1.cmp(&major2) {
                cmp::Ordering::Equal => Some(minor1.cmp(&minor2)),
                v => Some(v),
            }
        }
    }
}

impl Version {
    /// Parses a `GL_VERSION` string like `4.5.0 NVIDIA 390.77` or `OpenGL ES 3.0 Mesa`.
    pub fn from_str(desc: &str) -> Result<Version> {
        let (es, desc) = if desc.starts_with("OpenGL ES ") {
            (true, &desc[10..])
        } else if desc.starts_with("OpenGL ES-") {
            (true, &desc[13..])
        } else {
            (false, desc)
        };

        let desc = desc
            .split(' ')
            .next()
            .ok_or_else(|| format_err!("[GL] Version string {} is malformed.", desc))?;

        let mut iter = desc.split('.');
        let mut next = || -> Result<u8> {
            let v = iter
                .next()
                .ok_or_else(|| format_err!("[GL] Version string {} is malformed.", desc))?;
            Ok(v.parse()?)
        };

        let major = next()?;
        let minor = next()?;

        if es {
            Ok(Version::ES(major, minor))
        } else {
            Ok(Version::GL(major, minor))
        }
    }

    /// Obtains the OpenGL version of the current context using the loaded functions.
    ///
    /// # Unsafe
    ///
    /// You must ensure that the functions belong to the current context, otherwise you will get
    /// an undefined behavior.
    pub unsafe fn parse() -> Result<Version> {
        Version::from_str(&parse_str(gl::VERSION)?)
    }
}

unsafe fn parse_str(id: GLenum) -> Result<String> {
    let s = gl::GetString(id);
    if s.is_null() {
        bail!("[GL] String of {} is null.", id);
    }

    String::from_utf8(ffi::CStr::from_ptr(s as *const _).to_bytes().to_vec())
        .map_err(|_| format_err!("[GL] String of {} is malformed.", id))
}

macro_rules! extensions {
    ($($string:expr => $field:ident,)+) => {
        /// Contains data about the list of extensions.
        #[derive(Debug, Clone, Copy, Default)]
        pub struct Extensions {
            $(
                pub $field: bool,
            )+
        }

        impl Extensions {
            /// Marks the extensions named in `strings`.
            pub fn from_names<'a, T>(strings: T) -> Extensions
            where
                T: IntoIterator<Item = &'a str>,
            {
                let mut extensions = Extensions::default();
                for extension in strings {
                    match extension {
                        $(
                            $string => extensions.$field = true,
                        )+
                        _ => ()
                    }
                }

                extensions
            }

            /// Returns the list of extensions supported by the current context.
            ///
            /// *Safety*: the OpenGL context corresponding to `gl` must be current in the thread.
            pub unsafe fn parse(version: Version) -> Result<Extensions> {
                let strings: Vec<String> = if version >= Version::GL(3, 0) || version >= Version::ES(3, 0) {
                    let mut num_extensions = 0;
                    gl::GetIntegerv(gl::NUM_EXTENSIONS, &mut num_extensions);

                    let mut strings = Vec::with_capacity(num_extensions as usize);
                    for i in 0..num_extensions {
                        let ext = gl::GetStringi(gl::EXTENSIONS, i as GLuint);
                        if !ext.is_null() {
                            let ext = ffi::CStr::from_ptr(ext as *const _);
                            strings.push(ext.to_string_lossy().into_owned());
                        }
                    }

                    strings
                } else {
                    parse_str(gl::EXTENSIONS)?
                        .split(' ')
                        .map(|e| e.to_owned())
                        .collect()
                };

                Ok(Extensions::from_names(strings.iter().map(|v| v.as_str())))
            }
        }
    }
}

extensions! {
    "GL_ARB_vertex_array_object" => gl_arb_vertex_array_object,
    "GL_OES_vertex_array_object" => gl_oes_vertex_array_object,
    "GL_ARB_framebuffer_object" => gl_arb_framebuffer_object,
    "GL_EXT_framebuffer_object" => gl_ext_framebuffer_object,
    "GL_NV_fbo_color_attachments" => gl_nv_fbo_color_attachments,
    "GL_ARB_uniform_buffer_object" => gl_arb_uniform_buffer_object,
    "GL_ARB_copy_buffer" => gl_arb_copy_buffer,
    "GL_ARB_sync" => gl_arb_sync,
    "GL_ARB_buffer_storage" => gl_arb_buffer_storage,
    "GL_EXT_buffer_storage" => gl_ext_buffer_storage,
    "GL_ARB_texture_border_clamp" => gl_arb_texture_border_clamp,
}

/// Represents the capabilities of the context.
///
/// Contrary to the state, these values never change.
#[derive(Debug)]
pub struct Capabilities {
    /// Returns a version or release number. Vendor-specific information may follow the version
    /// number.
    pub version: Version,

    /// The company responsible for this GL implementation.
    pub vendor: String,

    /// The name of the renderer. This name is typically specific to a particular
    /// configuration of a hardware platform.
    pub renderer: String,

    /// The list of OpenGL extensions support by this implementation.
    pub extensions: Extensions,

    /// The OpenGL context profile if available.
    ///
    /// The context profile is available from OpenGL 3.2 onwards. `None` if not supported.
    pub profile: Option<Profile>,

    /// Maximum number of textures that can be bound to a program.
    pub max_combined_texture_image_units: u32,

    /// Number of available buffer bind points for `GL_UNIFORM_BUFFER`.
    pub max_uniform_buffers: u32,

    /// Maximum number of color attachment bind points.
    pub max_color_attachments: u32,
}

impl Capabilities {
    pub unsafe fn parse() -> Result<Capabilities> {
        let version = Version::parse()?;
        let extensions = Extensions::parse(version)?;

        Ok(Capabilities {
            version,
            vendor: parse_str(gl::VENDOR)?,
            renderer: parse_str(gl::RENDERER)?,
            extensions,
            profile: Capabilities::parse_profile(version),
            max_combined_texture_image_units: Capabilities::parse_integer(
                gl::MAX_COMBINED_TEXTURE_IMAGE_UNITS,
                2,
            ),
            max_uniform_buffers: if version >= Version::GL(3, 1)
                || version >= Version::ES(3, 0)
                || extensions.gl_arb_uniform_buffer_object
            {
                Capabilities::parse_integer(gl::MAX_UNIFORM_BUFFER_BINDINGS, 0)
            } else {
                0
            },
            max_color_attachments: Capabilities::parse_color_attachments(version, &extensions),
        })
    }

    /// Checks the features every device relies on.
    pub fn check(&self) -> Result<()> {
        if self.version < Version::GL(3, 0)
            && self.version < Version::ES(3, 0)
            && !self.extensions.gl_arb_vertex_array_object
            && !self.extensions.gl_oes_vertex_array_object
        {
            bail!("The OpenGL implementation does not supports vertex array objects.");
        }

        if self.version < Version::GL(3, 0)
            && self.version < Version::ES(2, 0)
            && !self.extensions.gl_ext_framebuffer_object
            && !self.extensions.gl_arb_framebuffer_object
        {
            bail!("The OpenGL implementation does not supports framebuffer objects.");
        }

        if !self.has_copy_buffer() {
            bail!("The OpenGL implementation does not supports copying between buffers.");
        }

        Ok(())
    }

    /// Returns true if buffers could be persistently mapped.
    pub fn has_persistent_mapping(&self) -> bool {
        self.version >= Version::GL(4, 4)
            || self.extensions.gl_arb_buffer_storage
            || self.extensions.gl_ext_buffer_storage
    }

    /// Returns true if sync objects are available.
    pub fn has_fences(&self) -> bool {
        self.version >= Version::GL(3, 2) || self.version >= Version::ES(3, 0) || self.extensions.gl_arb_sync
    }

    pub fn has_copy_buffer(&self) -> bool {
        self.version >= Version::GL(3, 1) || self.version >= Version::ES(3, 0) || self.extensions.gl_arb_copy_buffer
    }

    pub fn has_border_clamp(&self) -> bool {
        self.version >= Version::GL(1, 3) || self.version >= Version::ES(3, 2) || self.extensions.gl_arb_texture_border_clamp
    }

    #[inline]
    unsafe fn parse_integer(name: GLenum, default: GLint) -> u32 {
        let mut val = default;
        gl::GetIntegerv(name, &mut val);
        val.max(0) as u32
    }

    #[inline]
    unsafe fn parse_profile(version: Version) -> Option<Profile> {
        if version >= Version::GL(3, 2) {
            let mut val = 0;
            gl::GetIntegerv(gl::CONTEXT_PROFILE_MASK, &mut val);
            let val = val as GLenum;
            if (val & gl::CONTEXT_COMPATIBILITY_PROFILE_BIT) != 0 {
                Some(Profile::Compatibility)
            } else if (val & gl::CONTEXT_CORE_PROFILE_BIT) != 0 {
                Some(Profile::Core)
            } else {
                None
            }
        } else {
            None
        }
    }

    #[inline]
    unsafe fn parse_color_attachments(version: Version, exts: &Extensions) -> u32 {
        if version >= Version::GL(3, 0)
            || version >= Version::ES(3, 0)
            || exts.gl_arb_framebuffer_object
            || exts.gl_ext_framebuffer_object
            || exts.gl_nv_fbo_color_attachments
        {
            Capabilities::parse_integer(gl::MAX_COLOR_ATTACHMENTS, 4)
        } else if version >= Version::ES(2, 0) {
            1
        } else {
            0
        }
    }
}
