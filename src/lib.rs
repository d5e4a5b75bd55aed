//! Turns raw PoseNet inference outputs into labeled skeletons.
//!
//! The model is run elsewhere; this crate starts from its heatmap and offset
//! tensors (plus, optionally, the displacement fields of multi-person
//! models), finds the joints, groups them into poses and maps them back onto
//! the camera image.

pub mod config;
pub mod decode;
pub mod engine;
pub mod error;
pub mod mapping;
pub mod output;
pub mod point;
pub mod pose;
pub mod stream;

#[cfg(test)]
mod testing;

pub use config::{Algorithm, Configuration, Settings, SharedSettings};
pub use decode::{extract_candidates, Candidate, Decoder, MultiplePoses, SinglePose};
pub use engine::{Engine, Timing};
pub use error::{Error, ErrorKind};
pub use mapping::{CoordinateMapper, Size};
pub use output::PoseNetOutput;
pub use point::Point;
pub use pose::{Cell, Joint, Keypoint, Pose};
pub use stream::{frame_channel, FrameConsumer, FrameGuard, FrameProducer, FrameResult};

/// Decode `output` in a single call, without an [`Engine`].
pub fn decode_poses(
    output: &PoseNetOutput,
    configuration: &Configuration,
    algorithm: Algorithm,
    mapper: &CoordinateMapper,
) -> Result<Vec<Pose>, Error> {
    algorithm.decode(output, configuration, mapper)
}
