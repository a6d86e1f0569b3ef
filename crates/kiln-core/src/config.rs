//! Renderer configuration
//!
//! Two layers live in one TOML file:
//! - `[renderer]` holds setup-time settings (resolution, fixed target sizes, OIT capacity).
//!   Changing them means rebuilding the orchestrator.
//! - `[frame.*]` holds the per-frame flags and tunables. A `FrameConfig` value is handed to
//!   every tick, so toggling a feature never touches hidden renderer state.

use crate::{KilnError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level config file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KilnConfig {
    #[serde(default)]
    pub renderer: RendererSettings,
    #[serde(default)]
    pub frame: FrameConfig,
}

impl KilnConfig {
    /// Load and validate a config file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse and validate config from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: KilnConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty TOML
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.renderer.validate()?;
        self.frame.validate()
    }
}

/// Setup-time renderer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    pub width: u32,
    pub height: u32,
    /// Square shadow map edge length in texels
    pub shadow_map_size: u32,
    /// SSAO and SSAO blur targets are square and independent of the surface size
    pub ssao_size: u32,
    /// Bright-pass and bloom blur targets
    pub bloom_size: u32,
    /// Top mip of the luminance chain; the chain always ends at 1x1
    pub luminance_size: u32,
    /// Capacity of the OIT fragment list. Clamped to what the device can bind.
    pub oit_max_fragments: u32,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            shadow_map_size: 4096,
            ssao_size: 1024,
            bloom_size: 256,
            luminance_size: 64,
            oit_max_fragments: 4 * 1024 * 1024,
        }
    }
}

impl RendererSettings {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(KilnError::ConfigError(format!(
                "resolution must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        for (field, value) in [
            ("renderer.shadow_map_size", self.shadow_map_size),
            ("renderer.ssao_size", self.ssao_size),
            ("renderer.bloom_size", self.bloom_size),
            ("renderer.oit_max_fragments", self.oit_max_fragments),
        ] {
            if value == 0 {
                return Err(KilnError::ConfigError(format!("{field} must be non-zero")));
            }
        }
        if !self.luminance_size.is_power_of_two() {
            return Err(KilnError::ConfigError(format!(
                "renderer.luminance_size must be a power of two, got {}",
                self.luminance_size
            )));
        }
        Ok(())
    }

    /// Number of mips in the luminance chain, down to and including 1x1
    pub fn luminance_mip_count(&self) -> u32 {
        self.luminance_size.max(1).ilog2() + 1
    }
}

/// Per-frame flags and tunables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    pub geometry: GeometrySettings,
    pub shadows: ShadowSettings,
    pub culling: CullingSettings,
    pub ssao: SsaoSettings,
    pub hdr: HdrSettings,
    pub taa: TaaSettings,
    pub fxaa: FxaaSettings,
    pub oit: OitSettings,
    pub camera: CameraSettings,
}

/// The single anti-aliasing technique applied in a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AntiAliasing {
    Taa,
    Fxaa,
    None,
}

impl FrameConfig {
    /// TAA and FXAA are mutually exclusive; TAA wins when both are enabled.
    pub fn anti_aliasing(&self) -> AntiAliasing {
        if self.taa.enabled {
            AntiAliasing::Taa
        } else if self.fxaa.enabled {
            AntiAliasing::Fxaa
        } else {
            AntiAliasing::None
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=64).contains(&self.taa.jitter_sequence_length) {
            return Err(KilnError::ValueOutOfRange {
                field: "frame.taa.jitter_sequence_length".into(),
                min: 1.0,
                max: 64.0,
                value: self.taa.jitter_sequence_length as f64,
            });
        }
        if self.camera.z_near <= 0.0 || self.camera.z_near >= self.camera.z_far {
            return Err(KilnError::ConfigError(format!(
                "camera planes must satisfy 0 < z_near < z_far, got {} / {}",
                self.camera.z_near, self.camera.z_far
            )));
        }
        if !(1.0..179.0).contains(&self.camera.fov_degrees) {
            return Err(KilnError::ValueOutOfRange {
                field: "frame.camera.fov_degrees".into(),
                min: 1.0,
                max: 179.0,
                value: self.camera.fov_degrees as f64,
            });
        }
        if !(0.0..=1.0).contains(&self.taa.source_weight) {
            return Err(KilnError::ValueOutOfRange {
                field: "frame.taa.source_weight".into(),
                min: 0.0,
                max: 1.0,
                value: self.taa.source_weight as f64,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometrySettings {
    pub draw_opaque: bool,
    pub draw_transparent: bool,
}

impl Default for GeometrySettings {
    fn default() -> Self {
        Self {
            draw_opaque: true,
            draw_transparent: true,
        }
    }
}

/// Directional light shadows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowSettings {
    pub enabled: bool,
    /// Rotation of the light about the Z axis, in degrees
    pub light_theta: f32,
    /// Rotation of the light about the X axis, in degrees
    pub light_phi: f32,
}

/// Beyond this the light direction approaches the look-at up vector.
pub const MAX_LIGHT_PHI: f32 = 85.0;

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            light_theta: 0.0,
            light_phi: 0.0,
        }
    }
}

impl ShadowSettings {
    /// `light_phi` clamped away from the degenerate poles
    pub fn clamped_phi(&self) -> f32 {
        let phi = self.light_phi.clamp(-MAX_LIGHT_PHI, MAX_LIGHT_PHI);
        if phi != self.light_phi {
            log::warn!("light_phi {} clamped to {}", self.light_phi, phi);
        }
        phi
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CullingSettings {
    pub enabled: bool,
    /// Keep culling against the last unfrozen camera view
    pub freeze_view: bool,
}

impl Default for CullingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            freeze_view: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SsaoSettings {
    pub enabled: bool,
    pub blur: bool,
    pub scale: f32,
    pub bias: f32,
    pub radius: f32,
    pub attenuation_scale: f32,
    pub distance_scale: f32,
}

impl Default for SsaoSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            blur: true,
            scale: 1.5,
            bias: 0.15,
            radius: 0.05,
            attenuation_scale: 1.01,
            distance_scale: 0.6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HdrSettings {
    pub enabled: bool,
    pub exposure: f32,
    pub max_white: f32,
    pub bloom_strength: f32,
    pub adaptation_speed: f32,
}

impl Default for HdrSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            exposure: 0.9,
            max_white: 1.17,
            bloom_strength: 1.1,
            adaptation_speed: 0.1,
        }
    }
}

/// How the reprojected history color is constrained by the current neighbourhood
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClampMode {
    /// Use the history as-is
    None,
    /// Clamp to the 3x3 min/max box
    #[default]
    Clamp,
    /// Clip toward the box center along the history-to-center segment
    Clip,
    /// Clip against mean +/- standard deviation of the neighbourhood
    Variance,
}

impl ClampMode {
    /// Value consumed by the resolve shader
    pub fn as_u32(self) -> u32 {
        match self {
            ClampMode::None => 0,
            ClampMode::Clamp => 1,
            ClampMode::Clip => 2,
            ClampMode::Variance => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaaSettings {
    pub enabled: bool,
    pub jitter_sequence_length: u32,
    /// Blend weight of the current frame against history
    pub source_weight: f32,
    pub clamp_mode: ClampMode,
    /// Weight samples by inverse luminance to suppress flicker on bright edges
    pub luminance_weighting: bool,
}

impl Default for TaaSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            jitter_sequence_length: 8,
            source_weight: 0.1,
            clamp_mode: ClampMode::Clamp,
            luminance_weighting: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FxaaSettings {
    pub enabled: bool,
    /// Minimum absolute luma contrast that counts as an edge
    pub threshold: f32,
    /// Minimum contrast relative to the brightest neighbour
    pub relative_threshold: f32,
}

impl Default for FxaaSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 0.0312,
            relative_threshold: 0.125,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OitSettings {
    /// Read back the append counter and report fragments dropped past capacity
    pub count_overflow: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub fov_degrees: f32,
    pub z_near: f32,
    pub z_far: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            fov_degrees: 45.0,
            z_near: 0.1,
            z_far: 1000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn temp_config(name: &str, content: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "kiln_config_test_{}_{}",
            name,
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("kiln.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_defaults_match_reference_tunables() {
        let config = FrameConfig::default();
        assert!((config.ssao.scale - 1.5).abs() < 1e-6);
        assert!((config.ssao.bias - 0.15).abs() < 1e-6);
        assert!((config.hdr.exposure - 0.9).abs() < 1e-6);
        assert!((config.hdr.max_white - 1.17).abs() < 1e-6);
        assert_eq!(config.taa.jitter_sequence_length, 8);
        assert!(config.culling.enabled);
        assert!(!config.fxaa.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_from_file() {
        let path = temp_config(
            "load",
            r#"
[renderer]
width = 640
height = 480

[frame.hdr]
enabled = false
exposure = 1.5

[frame.taa]
clamp_mode = "variance"
"#,
        );
        let config = KilnConfig::load_from_file(&path).unwrap();

        assert_eq!(config.renderer.width, 640);
        assert_eq!(config.renderer.shadow_map_size, 4096);
        assert!(!config.frame.hdr.enabled);
        assert!((config.frame.hdr.exposure - 1.5).abs() < 1e-6);
        assert!((config.frame.hdr.bloom_strength - 1.1).abs() < 1e-6);
        assert_eq!(config.frame.taa.clamp_mode, ClampMode::Variance);

        std::fs::remove_file(&path).ok();
        std::fs::remove_dir(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = KilnConfig::default();
        config.frame.ssao.enabled = false;
        config.frame.fxaa.enabled = true;
        let text = config.to_toml_string().unwrap();
        let parsed = KilnConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_anti_aliasing_is_exclusive() {
        let mut config = FrameConfig::default();
        config.fxaa.enabled = true;
        assert_eq!(config.anti_aliasing(), AntiAliasing::Taa);
        config.taa.enabled = false;
        assert_eq!(config.anti_aliasing(), AntiAliasing::Fxaa);
        config.fxaa.enabled = false;
        assert_eq!(config.anti_aliasing(), AntiAliasing::None);
    }

    #[test]
    fn test_rejects_invalid_values() {
        let err = KilnConfig::from_toml_str("[frame.taa]\njitter_sequence_length = 0\n");
        assert!(matches!(err, Err(KilnError::ValueOutOfRange { .. })));

        let err = KilnConfig::from_toml_str("[frame.camera]\nz_near = 10.0\nz_far = 1.0\n");
        assert!(matches!(err, Err(KilnError::ConfigError(_))));

        let err = KilnConfig::from_toml_str("[renderer]\nluminance_size = 48\n");
        assert!(err.is_err());

        let err = KilnConfig::from_toml_str("[frame.hdr\nenabled = true");
        assert!(matches!(err, Err(KilnError::TomlParseError(_))));
    }

    #[test]
    fn test_luminance_mip_count() {
        let settings = RendererSettings::default();
        assert_eq!(settings.luminance_mip_count(), 7);
    }

    #[test]
    fn test_light_phi_is_clamped() {
        let shadows = ShadowSettings {
            light_phi: 120.0,
            ..Default::default()
        };
        assert!((shadows.clamped_phi() - MAX_LIGHT_PHI).abs() < 1e-6);
    }
}
