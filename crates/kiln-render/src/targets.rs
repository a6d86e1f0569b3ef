//! Render targets and the resolution-dependent target set

/// Format of every intermediate color target
pub const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
pub const VELOCITY_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rg16Float;

const RA: wgpu::TextureUsages = wgpu::TextureUsages::RENDER_ATTACHMENT;
const TB: wgpu::TextureUsages = wgpu::TextureUsages::TEXTURE_BINDING;
const CS: wgpu::TextureUsages = wgpu::TextureUsages::COPY_SRC;
const CD: wgpu::TextureUsages = wgpu::TextureUsages::COPY_DST;

/// A 2D texture with its default view
pub struct RenderTarget {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub format: wgpu::TextureFormat,
    pub width: u32,
    pub height: u32,
}

impl RenderTarget {
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> Self {
        Self::with_mips(device, label, width, height, format, usage, 1)
    }

    pub fn with_mips(
        device: &wgpu::Device,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
        mip_level_count: u32,
    ) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            format,
            width,
            height,
        }
    }

    /// View of a single mip level
    pub fn mip_view(&self, level: u32) -> wgpu::TextureView {
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Mip View"),
            base_mip_level: level,
            mip_level_count: Some(1),
            ..Default::default()
        })
    }

    pub fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }
}

/// Copy the whole of `src` into `dst`; both must share size and format
pub fn copy_target(encoder: &mut wgpu::CommandEncoder, src: &RenderTarget, dst: &RenderTarget) {
    debug_assert_eq!((src.width, src.height), (dst.width, dst.height));
    debug_assert_eq!(src.format, dst.format);
    encoder.copy_texture_to_texture(
        src.texture.as_image_copy(),
        dst.texture.as_image_copy(),
        src.extent(),
    );
}

/// Every target whose size follows the output resolution. Always rebuilt as one unit.
pub struct FrameTargets {
    pub width: u32,
    pub height: u32,
    pub opaque_color: RenderTarget,
    pub velocity: RenderTarget,
    pub depth: RenderTarget,
    /// Opaque depth snapshot read by the transparent pass's own depth test
    pub depth_copy: RenderTarget,
    /// Opaque color after SSAO, then with transparency composited
    pub screen_color: RenderTarget,
    pub hdr_output: RenderTarget,
    pub aa_output: RenderTarget,
    pub history_color: RenderTarget,
    pub history_depth: RenderTarget,
    /// One linked-list head per pixel
    pub oit_heads: wgpu::Buffer,
}

impl FrameTargets {
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let color = |label: &str, usage| RenderTarget::new(device, label, width, height, HDR_FORMAT, usage);
        let depth = |label: &str, usage| RenderTarget::new(device, label, width, height, DEPTH_FORMAT, usage);

        let oit_heads = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("OIT Heads"),
            size: Self::heads_size(width, height),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        log::debug!("Created frame targets at {}x{}", width, height);

        Self {
            width,
            height,
            opaque_color: color("Opaque Color", RA | TB | CS | CD),
            velocity: RenderTarget::new(device, "Velocity", width, height, VELOCITY_FORMAT, RA | TB | CS),
            depth: depth("Depth", RA | TB | CS),
            depth_copy: depth("Depth Copy", TB | CD),
            screen_color: color("Screen Color", RA | TB | CS | CD),
            hdr_output: color("HDR Output", RA | TB | CS | CD),
            aa_output: color("AA Output", RA | TB | CS | CD),
            history_color: color("TAA History Color", TB | CD),
            history_depth: depth("TAA History Depth", TB | CD),
            oit_heads,
        }
    }

    pub fn pixel_count(&self) -> u32 {
        self.width * self.height
    }

    fn heads_size(width: u32, height: u32) -> u64 {
        (width as u64 * height as u64 * std::mem::size_of::<u32>() as u64).max(4)
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}
