use crate::{
    decode::candidate::Candidate,
    error::Error,
    pose::{Cell, Joint, NUM_JOINTS},
};
use ndarray::{s, ArrayView2, ArrayView3, Axis};
use ordered_float::NotNan;

/// Whether `score` at `(y, x)` dominates its `(2r + 1)²` window.
///
/// Neighbors scanned before `(y, x)` in row-major order must be strictly
/// lower, later ones no higher, so a plateau yields only its first cell.
fn score_is_max_in_local_window(
    score: f32,
    y: usize,
    x: usize,
    local_maximum_radius: usize,
    scores: ArrayView2<f32>,
) -> bool {
    let (height, width) = scores.dim();
    let y_start = y.saturating_sub(local_maximum_radius);
    let y_end = height.min(y.saturating_add(local_maximum_radius).saturating_add(1));
    let x_start = x.saturating_sub(local_maximum_radius);
    let x_end = width.min(x.saturating_add(local_maximum_radius).saturating_add(1));
    scores
        .slice(s![y_start..y_end, x_start..x_end])
        .indexed_iter()
        .all(|((dy, dx), &value)| {
            if (y_start + dy, x_start + dx) < (y, x) {
                value < score
            } else {
                value <= score
            }
        })
}

/// Find every heatmap cell at or above `score_threshold` that is a local
/// maximum of its joint channel.
///
/// Candidates come out in row-major scan order, joints innermost. The
/// heatmap must be `[height, width, NUM_JOINTS]`.
pub fn extract_candidates(
    heatmap: ArrayView3<f32>,
    score_threshold: f32,
    local_maximum_radius: usize,
) -> Result<Vec<Candidate>, Error> {
    let (height, width, channels) = heatmap.dim();
    if channels != NUM_JOINTS {
        return Err(Error::HeatmapChannels {
            expected: NUM_JOINTS,
            actual: channels,
        });
    }

    itertools::iproduct!(0..height, 0..width, 0..channels)
        .filter(|&(y, x, id)| {
            let score = heatmap[(y, x, id)];
            score >= score_threshold
                && score_is_max_in_local_window(
                    score,
                    y,
                    x,
                    local_maximum_radius,
                    heatmap.index_axis(Axis(2), id),
                )
        })
        .map(|(y, x, id)| {
            let score = heatmap[(y, x, id)];
            Ok(Candidate {
                joint: Joint::from_idx(id)?,
                cell: Cell::new(y, x),
                score: NotNan::new(score).map_err(|e| Error::ConstructNotNan(e, score))?,
            })
        })
        .collect()
}
