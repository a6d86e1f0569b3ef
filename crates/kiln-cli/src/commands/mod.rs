//! CLI command implementations

pub mod config;
pub mod cull;
pub mod render;

use anyhow::{Context, Result};
use glam::Vec3;
use kiln_core::KilnConfig;
use std::path::Path;

/// Load `path` if given, otherwise the defaults
pub fn load_config(path: Option<&str>) -> Result<KilnConfig> {
    match path {
        Some(path) => KilnConfig::load_from_file(Path::new(path))
            .with_context(|| format!("Failed to load config from {}", path)),
        None => Ok(KilnConfig::default()),
    }
}

pub fn vec3(values: &[f32]) -> Option<Vec3> {
    match values {
        [x, y, z] => Some(Vec3::new(*x, *y, *z)),
        _ => None,
    }
}

/// Camera eye and target, falling back to the default viewpoint
pub fn viewpoint(eye: Option<Vec3>, target: Option<Vec3>) -> (Vec3, Vec3) {
    (
        eye.unwrap_or(Vec3::new(-10.0, 3.0, 3.0)),
        target.unwrap_or(Vec3::new(0.0, 0.0, -1.0)),
    )
}
