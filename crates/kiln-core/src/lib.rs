//! Kiln Core - Foundational types for the Kiln renderer
//!
//! This crate holds everything the renderer needs that does not touch the GPU:
//! - `KilnError` and the `Result` alias
//! - `KilnConfig` / `FrameConfig` - per-session and per-frame settings loaded from TOML
//! - `BoundingBox` and `Frustum` - culling math shared with the compute shader
//! - `JitterSequence` - Halton(2, 3) sub-pixel jitter for TAA
//! - `PingPong` - two-slot rotating buffer for temporal resources
//! - CPU reference versions of the tone map, light adaptation and OIT composite

mod bounds;
mod config;
mod error;
mod frustum;
mod jitter;
mod oit;
mod ping_pong;
mod tonemap;

pub use bounds::BoundingBox;
pub use config::{
    AntiAliasing, CameraSettings, ClampMode, CullingSettings, FrameConfig, FxaaSettings,
    GeometrySettings, HdrSettings, KilnConfig, OitSettings, RendererSettings, ShadowSettings,
    SsaoSettings, TaaSettings,
};
pub use error::{KilnError, Result};
pub use frustum::Frustum;
pub use jitter::{halton, JitterSequence};
pub use oit::{
    composite_pixel, dropped_fragments, OitFragment, OitList, MAX_FRAGMENTS_PER_PIXEL, OIT_EMPTY,
};
pub use ping_pong::PingPong;
pub use tonemap::{adapt_luminance, luminance, reinhard_extended, tone_map_hdr};
