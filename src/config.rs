use crate::error::Error;
use crossbeam::sync::ShardedLock;
use std::{
    fmt,
    str::FromStr,
    sync::{Arc, PoisonError},
};

const DEFAULT_JOINT_CONFIDENCE_THRESHOLD: &str = "0.1";
const DEFAULT_POSE_CONFIDENCE_THRESHOLD: &str = "0.5";
const DEFAULT_NMS_RADIUS: &str = "2.5";
const DEFAULT_MAX_POSE_COUNT: &str = "15";
const DEFAULT_LOCAL_MAXIMUM_RADIUS: &str = "1";
const DEFAULT_REFINEMENT_STEPS: &str = "3";
const DEFAULT_SEARCH_RADIUS: &str = "2";

const JOINT_CONFIDENCE_THRESHOLD: &str = "joint confidence threshold";
const POSE_CONFIDENCE_THRESHOLD: &str = "pose confidence threshold";

fn check_unit_interval(name: &'static str, value: f32) -> Result<f32, Error> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(Error::ThresholdOutOfRange { name, value })
    }
}

fn check_nms_radius(value: f32) -> Result<f32, Error> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(Error::NmsRadius(value))
    }
}

fn check_max_pose_count(value: usize) -> Result<usize, Error> {
    if value == 0 {
        Err(Error::ZeroMaxPoseCount)
    } else {
        Ok(value)
    }
}

fn parse_joint_confidence_threshold(s: &str) -> Result<f32, Error> {
    check_unit_interval(
        JOINT_CONFIDENCE_THRESHOLD,
        s.parse()
            .map_err(|e| Error::Parse(JOINT_CONFIDENCE_THRESHOLD, e))?,
    )
}

fn parse_pose_confidence_threshold(s: &str) -> Result<f32, Error> {
    check_unit_interval(
        POSE_CONFIDENCE_THRESHOLD,
        s.parse()
            .map_err(|e| Error::Parse(POSE_CONFIDENCE_THRESHOLD, e))?,
    )
}

fn parse_nms_radius(s: &str) -> Result<f32, Error> {
    check_nms_radius(s.parse().map_err(|e| Error::Parse("nms radius", e))?)
}

fn parse_max_pose_count(s: &str) -> Result<usize, Error> {
    check_max_pose_count(
        s.parse()
            .map_err(|e| Error::ParseInt("max pose count", e))?,
    )
}

/// Thresholds and limits read by the decoders.
///
/// Every setter validates its argument and leaves the configuration untouched
/// when the value is rejected.
#[derive(Debug, Clone, Copy, PartialEq, structopt::StructOpt)]
pub struct Configuration {
    /// Minimum heatmap confidence for a joint to be reported.
    #[structopt(
        short = "j",
        long,
        default_value = DEFAULT_JOINT_CONFIDENCE_THRESHOLD,
        parse(try_from_str = parse_joint_confidence_threshold)
    )]
    joint_confidence_threshold: f32,

    /// Minimum aggregate confidence for a pose to be reported.
    #[structopt(
        short = "p",
        long,
        default_value = DEFAULT_POSE_CONFIDENCE_THRESHOLD,
        parse(try_from_str = parse_pose_confidence_threshold)
    )]
    pose_confidence_threshold: f32,

    /// Radius, in grid cells, within which two detections of the same joint
    /// are considered duplicates.
    #[structopt(
        short,
        long,
        default_value = DEFAULT_NMS_RADIUS,
        parse(try_from_str = parse_nms_radius)
    )]
    nms_radius: f32,

    /// Maximum number of poses returned in multiple pose mode.
    #[structopt(
        short,
        long,
        default_value = DEFAULT_MAX_POSE_COUNT,
        parse(try_from_str = parse_max_pose_count)
    )]
    max_pose_count: usize,

    /// Half-size of the window a heatmap peak must dominate.
    #[structopt(long, default_value = DEFAULT_LOCAL_MAXIMUM_RADIUS)]
    local_maximum_radius: usize,

    /// Number of offset refinements applied after following a displacement.
    #[structopt(short = "r", long, default_value = DEFAULT_REFINEMENT_STEPS)]
    refinement_steps: usize,

    /// Radius, in grid cells, searched for an adjacent joint when the model
    /// provides no displacement fields.
    #[structopt(long, default_value = DEFAULT_SEARCH_RADIUS)]
    search_radius: usize,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            joint_confidence_threshold: 0.1,
            pose_confidence_threshold: 0.5,
            nms_radius: 2.5,
            max_pose_count: 15,
            local_maximum_radius: 1,
            refinement_steps: 3,
            search_radius: 2,
        }
    }
}

impl Configuration {
    pub fn joint_confidence_threshold(&self) -> f32 {
        self.joint_confidence_threshold
    }

    pub fn pose_confidence_threshold(&self) -> f32 {
        self.pose_confidence_threshold
    }

    pub fn nms_radius(&self) -> f32 {
        self.nms_radius
    }

    pub fn max_pose_count(&self) -> usize {
        self.max_pose_count
    }

    pub fn local_maximum_radius(&self) -> usize {
        self.local_maximum_radius
    }

    pub fn refinement_steps(&self) -> usize {
        self.refinement_steps
    }

    pub fn search_radius(&self) -> usize {
        self.search_radius
    }

    pub fn set_joint_confidence_threshold(&mut self, value: f32) -> Result<(), Error> {
        self.joint_confidence_threshold = check_unit_interval(JOINT_CONFIDENCE_THRESHOLD, value)?;
        Ok(())
    }

    pub fn set_pose_confidence_threshold(&mut self, value: f32) -> Result<(), Error> {
        self.pose_confidence_threshold = check_unit_interval(POSE_CONFIDENCE_THRESHOLD, value)?;
        Ok(())
    }

    pub fn set_nms_radius(&mut self, value: f32) -> Result<(), Error> {
        self.nms_radius = check_nms_radius(value)?;
        Ok(())
    }

    pub fn set_max_pose_count(&mut self, value: usize) -> Result<(), Error> {
        self.max_pose_count = check_max_pose_count(value)?;
        Ok(())
    }

    pub fn set_local_maximum_radius(&mut self, value: usize) {
        self.local_maximum_radius = value;
    }

    pub fn set_refinement_steps(&mut self, value: usize) {
        self.refinement_steps = value;
    }

    pub fn set_search_radius(&mut self, value: usize) {
        self.search_radius = value;
    }
}

/// How poses are extracted from one inference.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Algorithm {
    /// Exactly one pose built from the strongest peak of every joint.
    Single,
    /// Up to `max_pose_count` poses assembled by greedy instance decoding.
    Multiple,
}

impl Default for Algorithm {
    fn default() -> Self {
        Self::Multiple
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(Self::Single),
            "multiple" => Ok(Self::Multiple),
            _ => Err(Error::UnknownAlgorithm(s.to_owned())),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Single => "single",
            Self::Multiple => "multiple",
        })
    }
}

/// Everything a decode call reads, captured at once.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Settings {
    pub configuration: Configuration,
    pub algorithm: Algorithm,
}

/// Settings shared between the thread that edits them and the engines that
/// decode with them.
///
/// Readers take a copy per call, so an edit never lands halfway through a
/// decode.
#[derive(Debug, Clone, Default)]
pub struct SharedSettings(Arc<ShardedLock<Settings>>);

impl SharedSettings {
    pub fn new(settings: Settings) -> Self {
        Self(Arc::new(ShardedLock::new(settings)))
    }

    pub fn snapshot(&self) -> Settings {
        *self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Edit the configuration. The shared value is replaced only if `update`
    /// succeeds, so a rejected setter leaves every field as it was.
    pub fn update<F>(&self, update: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Configuration) -> Result<(), Error>,
    {
        let mut settings = self.0.write().unwrap_or_else(PoisonError::into_inner);
        let mut configuration = settings.configuration;
        update(&mut configuration)?;
        settings.configuration = configuration;
        Ok(())
    }

    pub fn set_algorithm(&self, algorithm: Algorithm) {
        self.0
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .algorithm = algorithm;
    }
}
