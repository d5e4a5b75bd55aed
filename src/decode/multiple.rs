use crate::{
    config::Configuration,
    decode::{
        adjacency, build_keypoint, candidate::KeypointWithScore, check_grid, extract_candidates,
        mean, queue::PriorityQueue, Candidate, Decoder,
    },
    error::Error,
    mapping::CoordinateMapper,
    output::PoseNetOutput,
    point::Point,
    pose::{Cell, Joint, Keypoints, Pose, NUM_JOINTS},
};
use bitvec::{bitvec, prelude::BitSlice, vec::BitVec};
use ndarray::s;
use num_traits::cast::ToPrimitive;
use ordered_float::{NotNan, OrderedFloat};
use std::cmp::Reverse;
use tracing::{debug, trace};

/// Greedy multi-person decoder.
///
/// Every heatmap peak that clears the pose threshold is a potential root.
/// Roots are taken strongest first; each one grows a full skeleton by
/// walking the joint tree, then overlapping skeletons are rescored with soft
/// keypoint non-maximum suppression.
#[derive(Debug, Clone, Copy, Default)]
pub struct MultiplePoses;

#[derive(Debug, Clone, Copy, Default)]
struct DecodedKeypoint {
    cell: Cell,
    point: Point,
    score: f32,
}

type InstanceKeypoints = [DecodedKeypoint; NUM_JOINTS];

#[derive(Debug, Clone)]
struct Instance {
    keypoints: InstanceKeypoints,
    score: f32,
}

/// Indices of `scores`, highest score first. Equal scores keep their order.
fn decreasing_arg_sort(scores: &[f32]) -> Vec<usize> {
    let mut indices = (0..scores.len()).collect::<Vec<_>>();
    indices.sort_by_key(|&i| Reverse(OrderedFloat(scores[i])));
    indices
}

/// The strongest cell of `target` within `search_radius` of `center`.
fn search_target_cell(
    output: &PoseNetOutput,
    center: Cell,
    target: Joint,
    search_radius: usize,
) -> Cell {
    let scores = output.joint_heatmap(target);
    let (height, width) = scores.dim();
    let y_start = center.y.saturating_sub(search_radius);
    let y_end = height.min(center.y.saturating_add(search_radius).saturating_add(1));
    let x_start = center.x.saturating_sub(search_radius);
    let x_end = width.min(center.x.saturating_add(search_radius).saturating_add(1));
    scores
        .slice(s![y_start..y_end, x_start..x_end])
        .indexed_iter()
        .fold(None, |best: Option<(Cell, f32)>, ((dy, dx), &value)| match best {
            Some((_, best_value)) if value <= best_value => best,
            _ => Some((Cell::new(y_start + dy, x_start + dx), value)),
        })
        .map_or(center, |(cell, _)| cell)
}

/// Locate `target` starting from the decoded `source` position, moving along
/// directed edge `edge_id`.
fn find_target_cell(
    output: &PoseNetOutput,
    configuration: &Configuration,
    edge_id: usize,
    source: Point,
    target: Joint,
) -> Result<Cell, Error> {
    match output.displacement(edge_id, source)? {
        Some(displacement) => {
            let mut cell = output.nearest_cell(source + displacement)?;
            for _ in 0..configuration.refinement_steps() {
                cell = output.nearest_cell(output.refined_position(cell, target)?)?;
            }
            Ok(cell)
        }
        None => Ok(search_target_cell(
            output,
            output.nearest_cell(source)?,
            target,
            configuration.search_radius(),
        )),
    }
}

fn backtrack_decode_pose(
    output: &PoseNetOutput,
    configuration: &Configuration,
    root: Candidate,
    root_point: Point,
) -> Result<InstanceKeypoints, Error> {
    let mut keypoints = [DecodedKeypoint::default(); NUM_JOINTS];

    // Keypoints with higher score are decoded first.
    let mut decode_queue = PriorityQueue::new();
    let mut order = 0;
    decode_queue.push(KeypointWithScore {
        point: root_point,
        cell: root.cell,
        joint: root.joint,
        score: root.score,
        order,
    });

    let mut keypoint_decoded = bitvec![0; NUM_JOINTS];

    while let Some(KeypointWithScore {
        point,
        cell,
        joint,
        score,
        ..
    }) = decode_queue.pop()
    {
        let id = joint.idx();
        if keypoint_decoded[id] {
            continue;
        }

        keypoints[id] = DecodedKeypoint {
            cell,
            point,
            score: score.into_inner(),
        };
        keypoint_decoded.set(id, true);

        for (edge_id, target) in adjacency::neighbors(joint) {
            if keypoint_decoded[target.idx()] {
                continue;
            }

            let target_cell = find_target_cell(output, configuration, edge_id, point, target)?;
            let target_score = output.confidence(target_cell, target);

            order += 1;
            decode_queue.push(KeypointWithScore {
                point: output.refined_position(target_cell, target)?,
                cell: target_cell,
                joint: target,
                score: NotNan::new(target_score)
                    .map_err(|e| Error::ConstructNotNan(e, target_score))?,
                order,
            });
        }
    }
    Ok(keypoints)
}

/// Whether `point` is far enough from `joint` of every decoded instance to
/// start a new one.
fn pass_keypoint_nms(
    instances: &[Instance],
    joint: Joint,
    point: Point,
    squared_nms_radius: f32,
) -> bool {
    instances.iter().all(|instance| {
        point.squared_distance(instance.keypoints[joint.idx()].point) > squared_nms_radius
    })
}

/// Mark the keypoints of `current` that lie within the radius of the same
/// joint in `previous`. Bits already set stay set.
fn find_overlapping_keypoints(
    current: &InstanceKeypoints,
    previous: &InstanceKeypoints,
    squared_radius: f32,
    mask: &mut BitSlice,
) {
    current
        .iter()
        .zip(previous)
        .enumerate()
        .filter(|(_, (a, b))| a.point.squared_distance(b.point) <= squared_radius)
        .for_each(|(i, _)| mask.set(i, true))
}

/// Rescore instances, visited in `decreasing_indices` order.
///
/// Returns, per instance index, the new score and the mask of keypoints
/// suppressed by a higher-ranked instance.
fn perform_soft_keypoint_nms(
    decreasing_indices: &[usize],
    instances: &[Instance],
    squared_nms_radius: f32,
) -> Result<Vec<(f32, BitVec)>, Error> {
    let num_joints = NUM_JOINTS.to_f32().ok_or(Error::ConvertToF32)?;
    let mut rescored = vec![(0.0, bitvec![0; NUM_JOINTS]); instances.len()];

    for (i, &current_index) in decreasing_indices.iter().enumerate() {
        let mut keypoint_occluded = bitvec![0; NUM_JOINTS];
        for &previous_index in &decreasing_indices[..i] {
            find_overlapping_keypoints(
                &instances[current_index].keypoints,
                &instances[previous_index].keypoints,
                squared_nms_radius,
                &mut keypoint_occluded,
            );
        }

        let total_score = instances[current_index]
            .keypoints
            .iter()
            .enumerate()
            .filter(|&(index, _)| !keypoint_occluded[index])
            .map(|(_, keypoint)| keypoint.score)
            .sum::<f32>();
        rescored[current_index] = (total_score / num_joints, keypoint_occluded);
    }
    Ok(rescored)
}

fn build_pose(
    output: &PoseNetOutput,
    mapper: &CoordinateMapper,
    instance: &Instance,
    occluded: &BitSlice,
    score: f32,
    joint_confidence_threshold: f32,
) -> Result<Pose, Error> {
    let mut keypoints: Keypoints = [None; NUM_JOINTS];
    for (joint, decoded) in Joint::ALL.iter().copied().zip(&instance.keypoints) {
        if occluded[joint.idx()] || decoded.score < joint_confidence_threshold {
            continue;
        }
        keypoints[joint.idx()] = Some(build_keypoint(output, mapper, decoded.cell, joint)?);
    }
    Ok(Pose::new(keypoints, score))
}

impl Decoder for MultiplePoses {
    fn decode(
        &self,
        output: &PoseNetOutput,
        configuration: &Configuration,
        mapper: &CoordinateMapper,
    ) -> Result<Vec<Pose>, Error> {
        check_grid(output, mapper)?;

        let pose_threshold = configuration.pose_confidence_threshold();
        let squared_nms_radius = configuration.nms_radius().powi(2);

        // a root weaker than the pose threshold ends decoding, so those are
        // never queued
        let mut roots = extract_candidates(
            output.heatmap(),
            pose_threshold,
            configuration.local_maximum_radius(),
        )?
        .into_iter()
        .collect::<PriorityQueue<_>>();

        let mut instances: Vec<Instance> = Vec::new();
        let mut skipped = 0_usize;
        while let Some(root) = roots.pop() {
            let root_point = output.refined_position(root.cell, root.joint)?;
            if !pass_keypoint_nms(&instances, root.joint, root_point, squared_nms_radius) {
                skipped += 1;
                continue;
            }

            let keypoints = backtrack_decode_pose(output, configuration, root, root_point)?;
            let score = mean(&keypoints.iter().map(|k| k.score).collect::<Vec<_>>())?;
            trace!(
                message = "decoded instance",
                root = %root.joint,
                y = root.cell.y,
                x = root.cell.x,
                score
            );
            if score >= pose_threshold {
                instances.push(Instance { keypoints, score });
            }
        }

        let raw_scores = instances
            .iter()
            .map(|instance| instance.score)
            .collect::<Vec<_>>();
        let rescored = perform_soft_keypoint_nms(
            &decreasing_arg_sort(&raw_scores),
            &instances,
            squared_nms_radius,
        )?;
        let scores = rescored
            .iter()
            .map(|&(score, _)| score)
            .collect::<Vec<_>>();

        let poses = decreasing_arg_sort(&scores)
            .into_iter()
            .take_while(|&index| scores[index] >= pose_threshold)
            .take(configuration.max_pose_count())
            .map(|index| {
                let (score, occluded) = &rescored[index];
                build_pose(
                    output,
                    mapper,
                    &instances[index],
                    occluded,
                    *score,
                    configuration.joint_confidence_threshold(),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            message = "decoded poses",
            instances = instances.len(),
            skipped_roots = skipped,
            poses = poses.len()
        );
        Ok(poses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use assert_approx_eq::assert_approx_eq;
    use ndarray::Array3;

    fn keypoints_at(points: &[(f32, f32)], score: f32) -> InstanceKeypoints {
        let mut keypoints = [DecodedKeypoint::default(); NUM_JOINTS];
        for (keypoint, &(x, y)) in keypoints.iter_mut().zip(points.iter().cycle()) {
            keypoint.point = Point::new(x, y).unwrap();
            keypoint.score = score;
        }
        keypoints
    }

    fn instance(points: &[(f32, f32)], score: f32) -> Instance {
        Instance {
            keypoints: keypoints_at(points, score),
            score,
        }
    }

    mod decreasing_arg_sort {
        use super::*;

        #[test]
        fn is_stable() {
            assert_eq!(
                decreasing_arg_sort(&[0.2, 0.9, 0.5, 0.9]),
                vec![1, 3, 2, 0]
            );
        }

        #[test]
        fn empty() {
            assert!(decreasing_arg_sort(&[]).is_empty());
        }
    }

    mod search_target_cell {
        use super::*;

        #[test]
        fn ties_prefer_row_major_order() {
            let mut heatmap = Array3::zeros((5, 5, NUM_JOINTS));
            heatmap[(3, 1, Joint::LeftEye.idx())] = 0.5;
            heatmap[(1, 3, Joint::LeftEye.idx())] = 0.5;
            let output =
                PoseNetOutput::new(heatmap, Array3::zeros((5, 5, 2 * NUM_JOINTS))).unwrap();
            let cell = search_target_cell(&output, Cell::new(2, 2), Joint::LeftEye, 1);
            assert_eq!(cell, Cell::new(1, 3));
        }

        #[test]
        fn window_is_clipped() {
            let mut heatmap = Array3::zeros((4, 4, NUM_JOINTS));
            heatmap[(3, 3, Joint::Nose.idx())] = 0.2;
            heatmap[(0, 0, Joint::Nose.idx())] = 0.9;
            let output =
                PoseNetOutput::new(heatmap, Array3::zeros((4, 4, 2 * NUM_JOINTS))).unwrap();
            assert_eq!(
                search_target_cell(&output, Cell::new(3, 3), Joint::Nose, 2),
                Cell::new(3, 3)
            );
        }
    }

    mod pass_keypoint_nms {
        use super::*;

        #[test]
        fn rejects_points_within_radius() {
            let instances = vec![instance(&[(2.0, 2.0)], 0.9)];
            let squared_radius = 2.5_f32.powi(2);
            let near = Point::new(2.0, 4.0).unwrap();
            let far = Point::new(2.0, 5.0).unwrap();
            assert!(!pass_keypoint_nms(
                &instances,
                Joint::Nose,
                near,
                squared_radius
            ));
            assert!(pass_keypoint_nms(&instances, Joint::Nose, far, squared_radius));
            assert!(pass_keypoint_nms(&[], Joint::Nose, near, squared_radius));
        }
    }

    mod find_overlapping_keypoints {
        use super::*;

        #[test]
        fn accumulates_across_calls() {
            let current = keypoints_at(&[(0.0, 0.0)], 0.9);
            let mut near_nose = keypoints_at(&[(10.0, 10.0)], 0.9);
            near_nose[Joint::Nose.idx()].point = Point::new(1.0, 0.0).unwrap();
            let mut near_ankle = keypoints_at(&[(10.0, 10.0)], 0.9);
            near_ankle[Joint::RightAnkle.idx()].point = Point::new(0.0, 1.0).unwrap();

            let mut mask = bitvec![0; NUM_JOINTS];
            find_overlapping_keypoints(&current, &near_nose, 1.0, &mut mask);
            find_overlapping_keypoints(&current, &near_ankle, 1.0, &mut mask);
            assert_eq!(
                mask.iter_ones().collect::<Vec<_>>(),
                vec![Joint::Nose.idx(), Joint::RightAnkle.idx()]
            );
        }
    }

    mod perform_soft_keypoint_nms {
        use super::*;

        #[test]
        fn duplicate_instance_loses_its_score() {
            let instances = vec![
                instance(&[(3.0, 3.0)], 0.6),
                instance(&[(3.0, 3.0)], 0.8),
                instance(&[(30.0, 30.0)], 0.7),
            ];
            let rescored = perform_soft_keypoint_nms(&[1, 2, 0], &instances, 1.0).unwrap();
            assert_approx_eq!(rescored[1].0, 0.8);
            assert_approx_eq!(rescored[2].0, 0.7);
            assert_approx_eq!(rescored[0].0, 0.0);
            assert_eq!(rescored[0].1.count_ones(), NUM_JOINTS);
            assert_eq!(rescored[1].1.count_ones(), 0);
        }

        #[test]
        fn partial_overlap_only_drops_overlapping_joints() {
            let first = instance(&[(0.0, 0.0)], 0.9);
            let mut second = instance(&[(20.0, 20.0)], 0.9);
            second.keypoints[Joint::LeftWrist.idx()].point = Point::new(0.5, 0.0).unwrap();
            let rescored =
                perform_soft_keypoint_nms(&[0, 1], &[first, second], 1.0).unwrap();
            assert_approx_eq!(rescored[1].0, 0.9 * 16.0 / 17.0);
            assert_eq!(
                rescored[1].1.iter_ones().collect::<Vec<_>>(),
                vec![Joint::LeftWrist.idx()]
            );
        }
    }

    mod decode {
        use super::*;

        fn decode(output: &PoseNetOutput, configuration: &Configuration) -> Vec<Pose> {
            let mapper = testing::scaled_mapper(output, 16.0);
            MultiplePoses.decode(output, configuration, &mapper).unwrap()
        }

        #[test]
        fn separated_people_are_decoded_strongest_first() {
            let a = Cell::new(1, 1);
            let b = Cell::new(1, 9);
            let output = testing::output_with_people(
                10,
                16,
                &[(a, testing::uniform(0.8)), (b, testing::uniform(0.9))],
            );
            let poses = decode(&output, &Configuration::default());
            assert_eq!(poses.len(), 2);
            for (pose, origin, score) in [(&poses[0], b, 0.9), (&poses[1], a, 0.8)] {
                assert_eq!(pose.len(), NUM_JOINTS);
                assert_approx_eq!(pose.score(), score);
                for keypoint in pose.keypoints() {
                    assert_eq!(keypoint.cell, testing::joint_cell(origin, keypoint.joint));
                    assert_eq!(
                        keypoint.score,
                        output.confidence(keypoint.cell, keypoint.joint)
                    );
                }
            }
        }

        #[test]
        fn max_pose_count_keeps_the_higher_aggregate() {
            let a = Cell::new(1, 1);
            let b = Cell::new(1, 9);
            let mut b_scores = testing::uniform(0.6);
            b_scores[Joint::Nose.idx()] = 1.0;
            let output = testing::output_with_people(
                10,
                16,
                &[(a, testing::uniform(0.9)), (b, b_scores)],
            );
            let mut configuration = Configuration::default();
            configuration.set_max_pose_count(1).unwrap();

            let poses = decode(&output, &configuration);
            assert_eq!(poses.len(), 1);
            assert_approx_eq!(poses[0].score(), 0.9);
            assert_eq!(
                poses[0].get(Joint::Nose).unwrap().cell,
                testing::joint_cell(a, Joint::Nose)
            );
        }

        #[test]
        fn all_zero_heatmap_yields_nothing() {
            let output = testing::output_with_people(10, 16, &[]);
            assert!(decode(&output, &Configuration::default()).is_empty());
        }

        #[test]
        fn weak_people_are_dropped() {
            let mut scores = testing::uniform(0.3);
            scores[Joint::Nose.idx()] = 0.9;
            let output = testing::output_with_people(
                10,
                16,
                &[
                    (Cell::new(1, 1), testing::uniform(0.4)),
                    (Cell::new(1, 9), scores),
                ],
            );
            assert!(decode(&output, &Configuration::default()).is_empty());
        }

        #[test]
        fn weak_joints_are_omitted() {
            let mut scores = testing::uniform(0.9);
            scores[Joint::LeftAnkle.idx()] = 0.05;
            let output = testing::output_with_people(10, 16, &[(Cell::new(1, 1), scores)]);
            let poses = decode(&output, &Configuration::default());
            assert_eq!(poses.len(), 1);
            assert_eq!(poses[0].len(), NUM_JOINTS - 1);
            assert!(poses[0].get(Joint::LeftAnkle).is_none());
            assert_approx_eq!(poses[0].score(), (16.0 * 0.9 + 0.05) / 17.0);
        }

        #[test]
        fn search_follows_the_strongest_nearby_peak() {
            let origin = Cell::new(1, 1);
            let mut heatmap = testing::heatmap_with_people(10, 16, &[(origin, testing::uniform(0.9))]);
            heatmap[(5, 3, Joint::LeftWrist.idx())] = 0.95;
            let output =
                PoseNetOutput::new(heatmap, Array3::zeros((10, 16, 2 * NUM_JOINTS))).unwrap();

            let poses = decode(&output, &Configuration::default());
            assert_eq!(poses.len(), 1);
            assert_eq!(poses[0].get(Joint::LeftWrist).unwrap().cell, Cell::new(5, 3));
        }

        #[test]
        fn displacements_ignore_nearby_distractors() {
            let origin = Cell::new(1, 1);
            let mut heatmap = testing::heatmap_with_people(10, 16, &[(origin, testing::uniform(0.9))]);
            heatmap[(5, 3, Joint::LeftWrist.idx())] = 0.95;
            let (forward, backward) = testing::layout_displacements(10, 16);
            let output = PoseNetOutput::new(heatmap, Array3::zeros((10, 16, 2 * NUM_JOINTS)))
                .unwrap()
                .with_displacements(forward, backward)
                .unwrap();

            let poses = decode(&output, &Configuration::default());
            assert_eq!(poses.len(), 1);
            let pose = &poses[0];
            assert_eq!(pose.len(), NUM_JOINTS);
            assert_approx_eq!(pose.score(), 0.9);
            for keypoint in pose.keypoints() {
                assert_eq!(keypoint.cell, testing::joint_cell(origin, keypoint.joint));
            }
        }

        #[test]
        fn displacements_scale_with_output_stride() {
            let origin = Cell::new(1, 9);
            let output_stride = 8.0;
            let (forward, backward) = testing::layout_displacements(10, 16);
            let output = testing::output_with_people(10, 16, &[(origin, testing::uniform(0.7))])
                .with_displacements(forward * output_stride, backward * output_stride)
                .unwrap()
                .with_output_stride(output_stride)
                .unwrap();

            let poses = decode(&output, &Configuration::default());
            assert_eq!(poses.len(), 1);
            for keypoint in poses[0].keypoints() {
                assert_eq!(keypoint.cell, testing::joint_cell(origin, keypoint.joint));
            }
        }

        #[test]
        fn radii_wider_than_the_grid_cover_it_whole() {
            let origin = Cell::new(2, 5);
            let output = testing::output_with_people(10, 16, &[(origin, testing::uniform(0.75))]);
            let mut configuration = Configuration::default();
            configuration.set_search_radius(usize::MAX);
            configuration.set_local_maximum_radius(usize::MAX);

            let poses = decode(&output, &configuration);
            assert_eq!(poses.len(), 1);
            assert_eq!(poses[0].len(), NUM_JOINTS);
            for keypoint in poses[0].keypoints() {
                assert_eq!(keypoint.cell, testing::joint_cell(origin, keypoint.joint));
            }
        }

        fn noisy_output() -> PoseNetOutput {
            let heatmap = Array3::from_shape_fn((12, 14, NUM_JOINTS), |(y, x, c)| {
                ((y * 31 + x * 17 + c * 7) % 23) as f32 / 23.0
            });
            PoseNetOutput::new(heatmap, Array3::zeros((12, 14, 2 * NUM_JOINTS))).unwrap()
        }

        #[test]
        fn output_poses_never_share_a_nearby_joint() {
            let output = noisy_output();
            let mut configuration = Configuration::default();
            configuration.set_pose_confidence_threshold(0.3).unwrap();
            let squared_radius = configuration.nms_radius().powi(2);

            let poses = decode(&output, &configuration);
            assert!(poses.len() > 1);
            assert!(poses.len() <= configuration.max_pose_count());
            for (i, first) in poses.iter().enumerate() {
                for second in &poses[i + 1..] {
                    for keypoint in first.keypoints() {
                        if let Some(other) = second.get(keypoint.joint) {
                            assert!(keypoint.grid.squared_distance(other.grid) > squared_radius);
                        }
                    }
                }
            }
            for pair in poses.windows(2) {
                assert!(pair[0].score() >= pair[1].score());
            }
        }

        #[test]
        fn decoding_is_deterministic() {
            let output = noisy_output();
            let mut configuration = Configuration::default();
            configuration.set_pose_confidence_threshold(0.3).unwrap();
            assert_eq!(decode(&output, &configuration), decode(&output, &configuration));
        }
    }
}
