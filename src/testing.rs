//! Synthetic network outputs for decoder tests.

use crate::{
    mapping::{CoordinateMapper, Size},
    output::PoseNetOutput,
    point::Point,
    pose::{
        constants::{EDGE_LIST, NUM_EDGES},
        Cell, Joint, NUM_JOINTS,
    },
};
use ndarray::{Array3, Axis};

/// `(dy, dx)` of every joint relative to a person's origin, in joint order.
///
/// Joints connected in the tree are at most two cells apart along either
/// axis, and a person spans 7 rows by 5 columns.
pub(crate) const LAYOUT: [(usize, usize); NUM_JOINTS] = [
    (0, 2), // nose
    (0, 3), // left eye
    (0, 1), // right eye
    (1, 4), // left ear
    (1, 0), // right ear
    (2, 3), // left shoulder
    (2, 1), // right shoulder
    (3, 4), // left elbow
    (3, 0), // right elbow
    (4, 4), // left wrist
    (4, 0), // right wrist
    (4, 3), // left hip
    (4, 1), // right hip
    (5, 3), // left knee
    (5, 1), // right knee
    (6, 3), // left ankle
    (6, 1), // right ankle
];

pub(crate) fn joint_cell(origin: Cell, joint: Joint) -> Cell {
    let (dy, dx) = LAYOUT[joint.idx()];
    Cell::new(origin.y + dy, origin.x + dx)
}

/// A person whose every joint has the same confidence.
pub(crate) fn uniform(score: f32) -> [f32; NUM_JOINTS] {
    [score; NUM_JOINTS]
}

pub(crate) fn heatmap_with_people(
    height: usize,
    width: usize,
    people: &[(Cell, [f32; NUM_JOINTS])],
) -> Array3<f32> {
    let mut heatmap = Array3::zeros((height, width, NUM_JOINTS));
    for &(origin, scores) in people {
        for joint in Joint::ALL {
            let Cell { y, x } = joint_cell(origin, joint);
            heatmap[(y, x, joint.idx())] = scores[joint.idx()];
        }
    }
    heatmap
}

/// People laid out per [`LAYOUT`] with zero offsets.
pub(crate) fn output_with_people(
    height: usize,
    width: usize,
    people: &[(Cell, [f32; NUM_JOINTS])],
) -> PoseNetOutput {
    PoseNetOutput::new(
        heatmap_with_people(height, width, people),
        Array3::zeros((height, width, 2 * NUM_JOINTS)),
    )
    .unwrap()
}

/// Displacement fields that move exactly along [`LAYOUT`] for every edge.
pub(crate) fn layout_displacements(height: usize, width: usize) -> (Array3<f32>, Array3<f32>) {
    let mut forward = Array3::zeros((height, width, 2 * NUM_EDGES));
    let mut backward = Array3::zeros((height, width, 2 * NUM_EDGES));
    for (edge, &(source, target)) in EDGE_LIST[..NUM_EDGES].iter().enumerate() {
        let (sy, sx) = LAYOUT[source.idx()];
        let (ty, tx) = LAYOUT[target.idx()];
        let dy = ty as f32 - sy as f32;
        let dx = tx as f32 - sx as f32;
        forward.index_axis_mut(Axis(2), edge).fill(dy);
        forward.index_axis_mut(Axis(2), NUM_EDGES + edge).fill(dx);
        backward.index_axis_mut(Axis(2), edge).fill(-dy);
        backward.index_axis_mut(Axis(2), NUM_EDGES + edge).fill(-dx);
    }
    (forward, backward)
}

/// A mapper for `output` scaling grid units by `scale` with no offset.
pub(crate) fn scaled_mapper(output: &PoseNetOutput, scale: f32) -> CoordinateMapper {
    let (height, width) = output.dim();
    CoordinateMapper::new(
        Size::new(width, height),
        Size::new(width * scale as usize, height * scale as usize),
        scale,
        scale,
        Point::default(),
    )
    .unwrap()
}
