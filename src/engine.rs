use crate::{
    config::{Settings, SharedSettings},
    decode::Decoder,
    error::Error,
    mapping::CoordinateMapper,
    output::PoseNetOutput,
    pose::Pose,
};
use std::time::{Duration, Instant};
use tracing::{debug, debug_span};

/// Turns inference outputs into poses for one camera stream.
///
/// Settings are read once at the start of every call; edits made through
/// another [`SharedSettings`] handle apply from the next call on.
#[derive(Debug)]
pub struct Engine {
    settings: SharedSettings,
    mapper: CoordinateMapper,
    timing: Timing,
    frame_num: usize,
}

#[derive(Debug, Copy, Clone, Default)]
pub struct Timing {
    pub decode: Duration,
}

impl Engine {
    pub fn new(settings: SharedSettings, mapper: CoordinateMapper) -> Self {
        Self {
            settings,
            mapper,
            timing: Default::default(),
            frame_num: 0,
        }
    }

    pub fn settings(&self) -> &SharedSettings {
        &self.settings
    }

    pub fn mapper(&self) -> &CoordinateMapper {
        &self.mapper
    }

    /// Replace the mapper, e.g. after the camera resolution changed.
    pub fn set_mapper(&mut self, mapper: CoordinateMapper) {
        self.mapper = mapper;
    }

    /// Accumulated decode time over all calls.
    pub fn timing(&self) -> Timing {
        self.timing
    }

    /// Number of outputs decoded so far, failed ones included.
    pub fn frame_num(&self) -> usize {
        self.frame_num
    }

    pub fn detect_poses(&mut self, output: &PoseNetOutput) -> Result<Vec<Pose>, Error> {
        let Settings {
            configuration,
            algorithm,
        } = self.settings.snapshot();

        let span = debug_span!("detect_poses", frame = self.frame_num, %algorithm);
        let _enter = span.enter();

        let start_decode = Instant::now();
        let poses = algorithm.decode(output, &configuration, &self.mapper);
        let elapsed = start_decode.elapsed();
        self.timing.decode += elapsed;
        self.frame_num += 1;

        match &poses {
            Ok(poses) => debug!(
                message = "decoded frame",
                poses = poses.len(),
                ?elapsed
            ),
            Err(error) => debug!(message = "failed to decode frame", %error),
        }
        poses
    }
}

#[cfg(test)]
mod tests {
    use super::Engine;
    use crate::{
        config::{Algorithm, Settings, SharedSettings},
        error::ErrorKind,
        mapping::{CoordinateMapper, Size},
        output::PoseNetOutput,
        point::Point,
        pose::Cell,
        testing,
    };

    fn two_people() -> PoseNetOutput {
        testing::output_with_people(
            10,
            16,
            &[
                (Cell::new(1, 1), testing::uniform(0.9)),
                (Cell::new(1, 9), testing::uniform(0.8)),
            ],
        )
    }

    #[test]
    fn follows_the_selected_algorithm() {
        let output = two_people();
        let settings = SharedSettings::default();
        let mut engine = Engine::new(settings.clone(), testing::scaled_mapper(&output, 8.0));

        assert_eq!(engine.detect_poses(&output).unwrap().len(), 2);

        settings.set_algorithm(Algorithm::Single);
        assert_eq!(engine.detect_poses(&output).unwrap().len(), 1);

        settings.set_algorithm(Algorithm::Multiple);
        settings
            .update(|config| config.set_max_pose_count(1))
            .unwrap();
        assert_eq!(engine.detect_poses(&output).unwrap().len(), 1);
        assert_eq!(engine.frame_num(), 3);
    }

    #[test]
    fn failures_are_counted_and_reported() {
        let output = two_people();
        let mapper = CoordinateMapper::new(
            Size::new(4, 4),
            Size::new(64, 64),
            16.0,
            16.0,
            Point::default(),
        )
        .unwrap();
        let mut engine = Engine::new(SharedSettings::new(Settings::default()), mapper);
        let error = engine.detect_poses(&output).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidInput);
        assert_eq!(engine.frame_num(), 1);

        engine.set_mapper(testing::scaled_mapper(&output, 1.0));
        assert!(engine.detect_poses(&output).is_ok());
        assert_eq!(engine.mapper().grid(), (10, 16));
    }
}
