//! Indirect draw commands and the opaque / transparent partition

use crate::material::MaterialDescription;
use bytemuck::{Pod, Zeroable};

/// Draw slots are stored in the upper 16 bits of the base instance
pub const MAX_DRAWS: usize = 1 << 16;
/// Material indices are stored in the lower 16 bits of the base instance
pub const MAX_MATERIALS: usize = 1 << 16;

/// Argument block of one indexed indirect draw
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawCommand {
    pub index_count: u32,
    /// 1 when visible, 0 when culled
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    /// Material index in the low 16 bits, draw slot in the high 16 bits
    pub base_instance: u32,
}

impl DrawCommand {
    pub fn material_index(&self) -> u32 {
        unpack_base_instance(self.base_instance).0
    }

    pub fn draw_slot(&self) -> u32 {
        unpack_base_instance(self.base_instance).1
    }
}

pub fn pack_base_instance(material_index: u32, draw_slot: u32) -> u32 {
    debug_assert!((material_index as usize) < MAX_MATERIALS);
    debug_assert!((draw_slot as usize) < MAX_DRAWS);
    (material_index & 0xFFFF) | (draw_slot << 16)
}

/// Returns `(material_index, draw_slot)`
pub fn unpack_base_instance(base_instance: u32) -> (u32, u32) {
    (base_instance & 0xFFFF, base_instance >> 16)
}

/// An ordered list of draw commands. The list is fixed after construction; only the
/// instance counts change from frame to frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndirectCommands {
    commands: Vec<DrawCommand>,
}

impl IndirectCommands {
    pub fn new(commands: Vec<DrawCommand>) -> Self {
        Self { commands }
    }

    /// Commands matching `predicate`, order preserved
    pub fn select(&self, predicate: impl Fn(&DrawCommand) -> bool) -> IndirectCommands {
        IndirectCommands {
            commands: self.commands.iter().copied().filter(|c| predicate(c)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DrawCommand> {
        self.commands.iter()
    }

    pub fn as_slice(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn as_mut_slice(&mut self) -> &mut [DrawCommand] {
        &mut self.commands
    }

    /// Commands that currently draw
    pub fn visible_count(&self) -> u32 {
        self.commands.iter().filter(|c| c.instance_count > 0).count() as u32
    }

    /// Make every command draw again
    pub fn reset_instances(&mut self) {
        for c in &mut self.commands {
            c.instance_count = 1;
        }
    }
}

/// Two independent command lists, culled and drawn separately
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawPartition {
    pub opaque: IndirectCommands,
    pub transparent: IndirectCommands,
}

impl DrawPartition {
    pub fn by_material(all: &IndirectCommands, materials: &[MaterialDescription]) -> Self {
        let is_transparent = |c: &DrawCommand| {
            materials
                .get(c.material_index() as usize)
                .is_some_and(|m| m.is_transparent())
        };
        let partition = Self {
            opaque: all.select(|c| !is_transparent(c)),
            transparent: all.select(is_transparent),
        };
        log::debug!(
            "Partitioned {} draws into {} opaque / {} transparent",
            all.len(),
            partition.opaque.len(),
            partition.transparent.len()
        );
        partition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(material: u32, slot: u32) -> DrawCommand {
        DrawCommand {
            index_count: 36,
            instance_count: 1,
            first_index: 0,
            base_vertex: 0,
            base_instance: pack_base_instance(material, slot),
        }
    }

    #[test]
    fn test_layout_matches_indirect_args() {
        assert_eq!(std::mem::size_of::<DrawCommand>(), 20);
    }

    #[test]
    fn test_pack_round_trip() {
        let packed = pack_base_instance(0x1234, 0xBEEF);
        assert_eq!(unpack_base_instance(packed), (0x1234, 0xBEEF));
        assert_eq!(command(3, 9).material_index(), 3);
        assert_eq!(command(3, 9).draw_slot(), 9);
    }

    #[test]
    fn test_partition_by_transparency_flag() {
        let materials = vec![
            MaterialDescription::opaque([1.0; 4]),
            MaterialDescription::transparent([1.0; 4], 0.5),
        ];
        let all = IndirectCommands::new(vec![command(0, 0), command(1, 1), command(0, 2), command(1, 3)]);
        let part = DrawPartition::by_material(&all, &materials);

        let slots = |c: &IndirectCommands| c.iter().map(|c| c.draw_slot()).collect::<Vec<_>>();
        assert_eq!(slots(&part.opaque), vec![0, 2]);
        assert_eq!(slots(&part.transparent), vec![1, 3]);
        assert_eq!(part.opaque.len() + part.transparent.len(), all.len());
    }

    #[test]
    fn test_visible_count_and_reset() {
        let mut list = IndirectCommands::new(vec![command(0, 0), command(0, 1)]);
        list.as_mut_slice()[1].instance_count = 0;
        assert_eq!(list.visible_count(), 1);
        list.reset_instances();
        assert_eq!(list.visible_count(), 2);
    }
}
