//! Per-frame plan and the temporal state threaded between frames
//!
//! `FramePlan::build` turns a `FrameConfig` and the current `TemporalState` into the
//! exact list of stages the orchestrator records. Keeping this decision free of GPU
//! handles means every toggle combination can be checked without a device.

use crate::taa::TaaResolve;
use glam::{Mat4, Vec2};
use kiln_core::{AntiAliasing, FrameConfig, JitterSequence};

/// Stages of one frame, in recording order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FrameStage {
    ClearTargets,
    UpdateCamera,
    ComputeLightMatrices,
    Cull,
    Shadow,
    Geometry,
    Ssao,
    OitResolve,
    Hdr,
    AntiAlias,
    Present,
    FenceWait,
    SwapTemporal,
}

/// What a stage does this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassNode {
    ClearTargets { oit: bool },
    UpdateCamera { jitter: bool },
    ComputeLightMatrices { shadows: bool },
    /// Zero draw counts leave every command at its default instance count
    Cull { enabled: bool, freeze_view: bool },
    Shadow,
    Geometry { opaque: bool, transparent: bool },
    Ssao { blur: bool },
    /// SSAO off: opaque color is copied through
    CopyOpaque,
    OitResolve,
    ToneMap,
    /// HDR off: the composited color is copied through
    CopyHdr,
    Taa(TaaResolve),
    Fxaa,
    CopyAntiAlias,
    Present,
    FenceWait,
    SwapTemporal { luminance: bool },
}

impl PassNode {
    pub fn stage(&self) -> FrameStage {
        match self {
            PassNode::ClearTargets { .. } => FrameStage::ClearTargets,
            PassNode::UpdateCamera { .. } => FrameStage::UpdateCamera,
            PassNode::ComputeLightMatrices { .. } => FrameStage::ComputeLightMatrices,
            PassNode::Cull { .. } => FrameStage::Cull,
            PassNode::Shadow => FrameStage::Shadow,
            PassNode::Geometry { .. } => FrameStage::Geometry,
            PassNode::Ssao { .. } | PassNode::CopyOpaque => FrameStage::Ssao,
            PassNode::OitResolve => FrameStage::OitResolve,
            PassNode::ToneMap | PassNode::CopyHdr => FrameStage::Hdr,
            PassNode::Taa(_) | PassNode::Fxaa | PassNode::CopyAntiAlias => FrameStage::AntiAlias,
            PassNode::Present => FrameStage::Present,
            PassNode::FenceWait => FrameStage::FenceWait,
            PassNode::SwapTemporal { .. } => FrameStage::SwapTemporal,
        }
    }
}

/// Ordered passes for one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePlan {
    pub nodes: Vec<PassNode>,
    pub anti_aliasing: AntiAliasing,
}

impl FramePlan {
    pub fn build(config: &FrameConfig, temporal: &TemporalState) -> Self {
        let anti_aliasing = config.anti_aliasing();
        let taa = anti_aliasing == AntiAliasing::Taa;
        let transparent = config.geometry.draw_transparent;
        let mut nodes = Vec::with_capacity(13);

        nodes.push(PassNode::ClearTargets { oit: transparent });
        nodes.push(PassNode::UpdateCamera { jitter: taa });
        nodes.push(PassNode::ComputeLightMatrices {
            shadows: config.shadows.enabled,
        });
        nodes.push(PassNode::Cull {
            enabled: config.culling.enabled,
            freeze_view: config.culling.freeze_view,
        });
        if config.shadows.enabled {
            nodes.push(PassNode::Shadow);
        }
        nodes.push(PassNode::Geometry {
            opaque: config.geometry.draw_opaque,
            transparent,
        });
        nodes.push(if config.ssao.enabled {
            PassNode::Ssao {
                blur: config.ssao.blur,
            }
        } else {
            PassNode::CopyOpaque
        });
        if transparent {
            nodes.push(PassNode::OitResolve);
        }
        nodes.push(if config.hdr.enabled {
            PassNode::ToneMap
        } else {
            PassNode::CopyHdr
        });
        nodes.push(match anti_aliasing {
            AntiAliasing::Taa => PassNode::Taa(TaaResolve::for_history(temporal.history_valid())),
            AntiAliasing::Fxaa => PassNode::Fxaa,
            AntiAliasing::None => PassNode::CopyAntiAlias,
        });
        nodes.push(PassNode::Present);
        nodes.push(PassNode::FenceWait);
        nodes.push(PassNode::SwapTemporal {
            luminance: config.hdr.enabled,
        });

        Self {
            nodes,
            anti_aliasing,
        }
    }

    pub fn stages(&self) -> impl Iterator<Item = FrameStage> + '_ {
        self.nodes.iter().map(PassNode::stage)
    }

    pub fn contains(&self, node: PassNode) -> bool {
        self.nodes.contains(&node)
    }

    pub fn node(&self, stage: FrameStage) -> Option<PassNode> {
        self.nodes.iter().copied().find(|n| n.stage() == stage)
    }

    /// The adapted luminance pair swaps only when adaptation ran
    pub fn swaps_luminance(&self) -> bool {
        self.contains(PassNode::SwapTemporal { luminance: true })
    }
}

/// Everything carried from one frame to the next
#[derive(Debug, Clone)]
pub struct TemporalState {
    frame_index: u64,
    jitter: JitterSequence,
    history_valid: bool,
    prev_view: Mat4,
    prev_proj: Mat4,
    has_prev: bool,
}

impl TemporalState {
    pub fn new(jitter_length: u32) -> Self {
        Self {
            frame_index: 0,
            jitter: JitterSequence::new(jitter_length),
            history_valid: false,
            prev_view: Mat4::IDENTITY,
            prev_proj: Mat4::IDENTITY,
            has_prev: false,
        }
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn history_valid(&self) -> bool {
        self.history_valid
    }

    pub fn jitter_index(&self) -> u32 {
        self.jitter.index()
    }

    /// Next jitter sample. The sequence advances every frame; the offset is zero unless
    /// `apply` is set.
    pub fn next_jitter(&mut self, length: u32, width: u32, height: u32, apply: bool) -> Vec2 {
        if self.jitter.length() != length {
            self.jitter.set_length(length);
        }
        let (_, offset) = self.jitter.advance(width, height);
        if apply {
            offset
        } else {
            Vec2::ZERO
        }
    }

    /// Previous committed matrices, or the current ones on the first frame so the
    /// velocity buffer reads zero
    pub fn previous(&self, view: Mat4, proj: Mat4) -> (Mat4, Mat4) {
        if self.has_prev {
            (self.prev_view, self.prev_proj)
        } else {
            (view, proj)
        }
    }

    /// Drop TAA history, e.g. after a resize
    pub fn invalidate_history(&mut self) {
        self.history_valid = false;
    }

    /// Close the frame: remember the unjittered matrices and whether the AA stage left a
    /// usable history behind
    pub fn commit(&mut self, view: Mat4, proj: Mat4, anti_aliasing: AntiAliasing) {
        self.prev_view = view;
        self.prev_proj = proj;
        self.has_prev = true;
        self.history_valid = anti_aliasing == AntiAliasing::Taa;
        self.frame_index += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stages(config: &FrameConfig, temporal: &TemporalState) -> Vec<FrameStage> {
        FramePlan::build(config, temporal).stages().collect()
    }

    #[test]
    fn test_stages_are_strictly_ordered() {
        let temporal = TemporalState::new(8);
        let all = stages(&FrameConfig::default(), &temporal);
        assert!(all.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(all.first(), Some(&FrameStage::ClearTargets));
        assert_eq!(all.last(), Some(&FrameStage::SwapTemporal));
        assert_eq!(all.len(), 13);
    }

    #[test]
    fn test_disabled_features_are_skipped() {
        let mut config = FrameConfig::default();
        config.shadows.enabled = false;
        config.geometry.draw_transparent = false;
        config.ssao.enabled = false;
        config.hdr.enabled = false;
        config.taa.enabled = false;

        let plan = FramePlan::build(&config, &TemporalState::new(8));
        assert!(!plan.stages().any(|s| s == FrameStage::Shadow));
        assert!(!plan.stages().any(|s| s == FrameStage::OitResolve));
        assert!(plan.contains(PassNode::CopyOpaque));
        assert!(plan.contains(PassNode::CopyHdr));
        assert!(plan.contains(PassNode::CopyAntiAlias));
        assert!(!plan.swaps_luminance());
        assert!(plan.contains(PassNode::ClearTargets { oit: false }));
    }

    #[test]
    fn test_culling_disabled_still_records_zero_count_cull() {
        let mut config = FrameConfig::default();
        config.culling.enabled = false;
        let plan = FramePlan::build(&config, &TemporalState::new(8));
        assert_eq!(
            plan.node(FrameStage::Cull),
            Some(PassNode::Cull {
                enabled: false,
                freeze_view: false
            })
        );
    }

    #[test]
    fn test_taa_wins_over_fxaa() {
        let mut config = FrameConfig::default();
        config.fxaa.enabled = true;
        let plan = FramePlan::build(&config, &TemporalState::new(8));
        assert_eq!(plan.anti_aliasing, AntiAliasing::Taa);
        assert!(!plan.contains(PassNode::Fxaa));

        config.taa.enabled = false;
        let plan = FramePlan::build(&config, &TemporalState::new(8));
        assert!(plan.contains(PassNode::Fxaa));
    }

    #[test]
    fn test_first_frame_seeds_history() {
        let config = FrameConfig::default();
        let mut temporal = TemporalState::new(8);
        let plan = FramePlan::build(&config, &temporal);
        assert!(plan.contains(PassNode::Taa(TaaResolve::Seed)));

        temporal.commit(Mat4::IDENTITY, Mat4::IDENTITY, plan.anti_aliasing);
        let plan = FramePlan::build(&config, &temporal);
        assert!(plan.contains(PassNode::Taa(TaaResolve::Blend)));
    }

    #[test]
    fn test_reenabling_taa_reseeds() {
        let mut config = FrameConfig::default();
        let mut temporal = TemporalState::new(8);
        temporal.commit(Mat4::IDENTITY, Mat4::IDENTITY, AntiAliasing::Taa);
        assert!(temporal.history_valid());

        config.taa.enabled = false;
        temporal.commit(Mat4::IDENTITY, Mat4::IDENTITY, config.anti_aliasing());
        config.taa.enabled = true;
        let plan = FramePlan::build(&config, &temporal);
        assert!(plan.contains(PassNode::Taa(TaaResolve::Seed)));
    }

    #[test]
    fn test_resize_invalidates_history() {
        let mut temporal = TemporalState::new(8);
        temporal.commit(Mat4::IDENTITY, Mat4::IDENTITY, AntiAliasing::Taa);
        temporal.invalidate_history();
        assert!(!temporal.history_valid());
    }

    #[test]
    fn test_jitter_cycles_with_sequence_length() {
        let mut temporal = TemporalState::new(8);
        let first: Vec<Vec2> = (0..8).map(|_| temporal.next_jitter(8, 640, 480, true)).collect();
        assert_eq!(temporal.jitter_index(), 0);
        let second: Vec<Vec2> = (0..8).map(|_| temporal.next_jitter(8, 640, 480, true)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_jitter_advances_even_when_not_applied() {
        let mut temporal = TemporalState::new(4);
        assert_eq!(temporal.next_jitter(4, 100, 100, false), Vec2::ZERO);
        assert_eq!(temporal.jitter_index(), 1);
    }

    #[test]
    fn test_shorter_sequence_wraps_index() {
        let mut temporal = TemporalState::new(8);
        for _ in 0..6 {
            temporal.next_jitter(8, 100, 100, true);
        }
        temporal.next_jitter(4, 100, 100, true);
        assert!(temporal.jitter_index() < 4);
    }

    #[test]
    fn test_previous_matrices_commit_unjittered() {
        let mut temporal = TemporalState::new(8);
        let view = Mat4::from_translation(glam::Vec3::X);
        let proj = Mat4::perspective_rh(1.0, 1.0, 0.1, 10.0);
        assert_eq!(temporal.previous(view, proj), (view, proj));

        temporal.commit(view, proj, AntiAliasing::Taa);
        let (prev_view, prev_proj) = temporal.previous(Mat4::IDENTITY, Mat4::IDENTITY);
        assert_eq!(prev_view, view);
        assert_eq!(prev_proj, proj);
        assert_eq!(temporal.frame_index(), 1);
    }
}
