use crate::{error::Error, point::Point};
use num_traits::FromPrimitive;
use std::fmt;

#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    num_derive::FromPrimitive,
)]
pub enum Joint {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

pub const NUM_JOINTS: usize = 17;

impl Joint {
    /// Every joint, in channel order.
    pub const ALL: [Joint; NUM_JOINTS] = [
        Joint::Nose,
        Joint::LeftEye,
        Joint::RightEye,
        Joint::LeftEar,
        Joint::RightEar,
        Joint::LeftShoulder,
        Joint::RightShoulder,
        Joint::LeftElbow,
        Joint::RightElbow,
        Joint::LeftWrist,
        Joint::RightWrist,
        Joint::LeftHip,
        Joint::RightHip,
        Joint::LeftKnee,
        Joint::RightKnee,
        Joint::LeftAnkle,
        Joint::RightAnkle,
    ];

    /// The heatmap channel of this joint.
    #[inline]
    pub fn idx(self) -> usize {
        self as usize
    }

    pub fn from_idx(index: usize) -> Result<Self, Error> {
        Self::from_usize(index).ok_or(Error::ConvertUSizeToJoint(index))
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Nose => "nose",
            Self::LeftEye => "left eye",
            Self::RightEye => "right eye",
            Self::LeftEar => "left ear",
            Self::RightEar => "right ear",
            Self::LeftShoulder => "left shoulder",
            Self::RightShoulder => "right shoulder",
            Self::LeftElbow => "left elbow",
            Self::RightElbow => "right elbow",
            Self::LeftWrist => "left wrist",
            Self::RightWrist => "right wrist",
            Self::LeftHip => "left hip",
            Self::RightHip => "right hip",
            Self::LeftKnee => "left knee",
            Self::RightKnee => "right knee",
            Self::LeftAnkle => "left ankle",
            Self::RightAnkle => "right ankle",
        }
    }
}

impl fmt::Display for Joint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A grid cell of the model output, indexed row first.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Cell {
    pub y: usize,
    pub x: usize,
}

impl Cell {
    pub fn new(y: usize, x: usize) -> Self {
        Self { y, x }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Keypoint {
    pub joint: Joint,
    /// The heatmap cell the confidence was read from.
    pub cell: Cell,
    /// Offset-refined position in grid space.
    pub grid: Point,
    /// Position in source image pixels.
    pub position: Point,
    pub score: f32,
}

pub type Keypoints = [Option<Keypoint>; NUM_JOINTS];

/// A single detected skeleton.
///
/// Keypoints are stored by joint, so a pose can never hold two keypoints with
/// the same label.
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    keypoints: Keypoints,
    score: f32,
}

impl Pose {
    pub(crate) fn new(keypoints: Keypoints, score: f32) -> Self {
        Self { keypoints, score }
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn get(&self, joint: Joint) -> Option<&Keypoint> {
        self.keypoints[joint.idx()].as_ref()
    }

    /// Present keypoints in joint order.
    pub fn keypoints(&self) -> impl Iterator<Item = &Keypoint> + '_ {
        self.keypoints.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.keypoints().count()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.iter().all(Option::is_none)
    }

    /// Line segments a renderer should draw between present keypoints.
    pub fn bones(&self) -> impl Iterator<Item = (&Keypoint, &Keypoint)> + '_ {
        constants::SKELETON
            .iter()
            .filter_map(move |&(a, b)| Some((self.get(a)?, self.get(b)?)))
    }
}

pub mod constants {
    use crate::pose::Joint::{self, *};

    /// Number of undirected edges in the joint tree.
    pub const NUM_EDGES: usize = EDGE_LIST.len() / 2;

    /// Directed edges of the joint tree rooted at the nose, as
    /// `(source, target)`. The first half walks away from the nose; the second
    /// half reverses each of those edges in the same order.
    pub const EDGE_LIST: [(Joint, Joint); 32] = [
        // forward edges
        (Nose, LeftEye),
        (LeftEye, LeftEar),
        (Nose, RightEye),
        (RightEye, RightEar),
        (Nose, LeftShoulder),
        (LeftShoulder, LeftElbow),
        (LeftElbow, LeftWrist),
        (LeftShoulder, LeftHip),
        (LeftHip, LeftKnee),
        (LeftKnee, LeftAnkle),
        (Nose, RightShoulder),
        (RightShoulder, RightElbow),
        (RightElbow, RightWrist),
        (RightShoulder, RightHip),
        (RightHip, RightKnee),
        (RightKnee, RightAnkle),
        // backward edges
        (LeftEye, Nose),
        (LeftEar, LeftEye),
        (RightEye, Nose),
        (RightEar, RightEye),
        (LeftShoulder, Nose),
        (LeftElbow, LeftShoulder),
        (LeftWrist, LeftElbow),
        (LeftHip, LeftShoulder),
        (LeftKnee, LeftHip),
        (LeftAnkle, LeftKnee),
        (RightShoulder, Nose),
        (RightElbow, RightShoulder),
        (RightWrist, RightElbow),
        (RightHip, RightShoulder),
        (RightKnee, RightHip),
        (RightAnkle, RightKnee),
    ];

    /// Bones to draw for a detected pose.
    pub const SKELETON: [(Joint, Joint); 19] = [
        (Nose, LeftEye),
        (Nose, RightEye),
        (Nose, LeftEar),
        (Nose, RightEar),
        (LeftEar, LeftEye),
        (RightEar, RightEye),
        (LeftEye, RightEye),
        (LeftShoulder, RightShoulder),
        (LeftShoulder, LeftElbow),
        (LeftShoulder, LeftHip),
        (RightShoulder, RightElbow),
        (RightShoulder, RightHip),
        (LeftElbow, LeftWrist),
        (RightElbow, RightWrist),
        (LeftHip, RightHip),
        (LeftHip, LeftKnee),
        (RightHip, RightKnee),
        (LeftKnee, LeftAnkle),
        (RightKnee, RightAnkle),
    ];
}
