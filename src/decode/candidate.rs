use crate::{
    point::Point,
    pose::{Cell, Joint},
};
use ordered_float::NotNan;
use std::cmp::Ordering;

/// A heatmap peak: a cell that may hold `joint`.
///
/// Candidates order by confidence; equal confidences order the earlier cell
/// in row-major order first, then the lower joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub joint: Joint,
    pub cell: Cell,
    pub score: NotNan<f32>,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .cmp(&other.score)
            .then_with(|| other.cell.cmp(&self.cell))
            .then_with(|| other.joint.cmp(&self.joint))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A keypoint waiting to be attached to the pose being decoded.
#[derive(Debug, Clone, Copy)]
pub(super) struct KeypointWithScore {
    pub(super) point: Point,
    pub(super) cell: Cell,
    pub(super) joint: Joint,
    pub(super) score: NotNan<f32>,
    // Insertion counter, the last tie breaker.
    pub(super) order: usize,
}

impl Eq for KeypointWithScore {}

impl PartialEq for KeypointWithScore {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Ord for KeypointWithScore {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .cmp(&other.score)
            .then_with(|| other.joint.cmp(&self.joint))
            .then_with(|| other.order.cmp(&self.order))
    }
}

impl PartialOrd for KeypointWithScore {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
