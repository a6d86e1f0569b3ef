//! Kiln Scene - the static scene a renderer session draws
//!
//! A `SceneSnapshot` is produced once by a loader and stays immutable for the
//! session. From it this crate derives:
//! - one `DrawCommand` per draw, with material and draw slot packed in the base instance
//! - world-space bounding boxes per draw slot and the whole-scene box
//! - the opaque / transparent split of the command list
//!
//! `cull` is the CPU reference for the GPU culling pass, and `demo` builds a small
//! procedural scene for the CLI and tests.

pub mod cull;
pub mod demo;
mod draw;
mod material;
pub mod primitives;
mod snapshot;

pub use draw::{
    pack_base_instance, unpack_base_instance, DrawCommand, DrawPartition, IndirectCommands,
    MAX_DRAWS, MAX_MATERIALS,
};
pub use material::{MaterialDescription, INVALID_TEXTURE};
pub use snapshot::{DrawData, EnvironmentMap, MeshInfo, SceneSnapshot, TextureTable, Vertex};
