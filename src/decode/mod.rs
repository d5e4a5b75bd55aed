use crate::{
    config::{Algorithm, Configuration},
    error::Error,
    mapping::CoordinateMapper,
    output::PoseNetOutput,
    pose::{Cell, Joint, Keypoint, Pose},
};
use num_traits::cast::ToPrimitive;

mod adjacency;
mod candidate;
mod multiple;
mod peaks;
mod queue;
mod single;

pub use candidate::Candidate;
pub use multiple::MultiplePoses;
pub use peaks::extract_candidates;
pub use single::SinglePose;

pub trait Decoder {
    /// Decode the poses present in one inference output.
    fn decode(
        &self,
        output: &PoseNetOutput,
        configuration: &Configuration,
        mapper: &CoordinateMapper,
    ) -> Result<Vec<Pose>, Error>;
}

impl Decoder for Algorithm {
    fn decode(
        &self,
        output: &PoseNetOutput,
        configuration: &Configuration,
        mapper: &CoordinateMapper,
    ) -> Result<Vec<Pose>, Error> {
        match self {
            Self::Single => SinglePose.decode(output, configuration, mapper),
            Self::Multiple => MultiplePoses.decode(output, configuration, mapper),
        }
    }
}

/// The mapper must have been built for the grid of `output`.
fn check_grid(output: &PoseNetOutput, mapper: &CoordinateMapper) -> Result<(), Error> {
    let grid = mapper.grid();
    if grid != output.dim() {
        return Err(Error::GridMismatch {
            expected: output.dim(),
            actual: grid,
        });
    }
    Ok(())
}

/// Build the keypoint for `joint` read from `cell`.
fn build_keypoint(
    output: &PoseNetOutput,
    mapper: &CoordinateMapper,
    cell: Cell,
    joint: Joint,
) -> Result<Keypoint, Error> {
    let grid = output.refined_position(cell, joint)?;
    Ok(Keypoint {
        joint,
        cell,
        grid,
        position: mapper.map(grid)?,
        score: output.confidence(cell, joint),
    })
}

fn mean(values: &[f32]) -> Result<f32, Error> {
    if values.is_empty() {
        return Ok(0.0);
    }
    Ok(values.iter().sum::<f32>() / values.len().to_f32().ok_or(Error::ConvertToF32)?)
}
