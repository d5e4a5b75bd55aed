use crate::{
    config::Configuration,
    decode::{build_keypoint, check_grid, extract_candidates, mean, Candidate, Decoder},
    error::Error,
    mapping::CoordinateMapper,
    output::PoseNetOutput,
    pose::{Keypoints, Pose, NUM_JOINTS},
};
use tracing::debug;

/// Decodes exactly one pose: the strongest peak of every joint channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct SinglePose;

impl Decoder for SinglePose {
    fn decode(
        &self,
        output: &PoseNetOutput,
        configuration: &Configuration,
        mapper: &CoordinateMapper,
    ) -> Result<Vec<Pose>, Error> {
        check_grid(output, mapper)?;

        let candidates = extract_candidates(
            output.heatmap(),
            configuration.joint_confidence_threshold(),
            configuration.local_maximum_radius(),
        )?;
        let num_candidates = candidates.len();

        let mut best: [Option<Candidate>; NUM_JOINTS] = [None; NUM_JOINTS];
        for candidate in candidates {
            let slot = &mut best[candidate.joint.idx()];
            if slot.map_or(true, |current| candidate > current) {
                *slot = Some(candidate);
            }
        }

        let mut keypoints: Keypoints = [None; NUM_JOINTS];
        let mut scores = Vec::with_capacity(NUM_JOINTS);
        for Candidate { joint, cell, .. } in best.iter().flatten().copied() {
            let keypoint = build_keypoint(output, mapper, cell, joint)?;
            scores.push(keypoint.score);
            keypoints[joint.idx()] = Some(keypoint);
        }

        let pose = Pose::new(keypoints, mean(&scores)?);
        debug!(
            message = "decoded single pose",
            candidates = num_candidates,
            keypoints = pose.len(),
            score = pose.score()
        );
        Ok(vec![pose])
    }
}
