/// Broad classification of an [`Error`], used by callers to decide whether a
/// frame should be skipped, a setting rejected, or a bug reported.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or mismatched tensor data. Fatal to the call that saw it.
    InvalidInput,
    /// A configuration value outside its allowed range.
    InvalidArgument,
    /// An internal consistency check failed.
    OutOfRange,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("expected {expected} heatmap channels, got {actual}")]
    HeatmapChannels { expected: usize, actual: usize },

    #[error("expected {expected} offset channels, got {actual}")]
    OffsetChannels { expected: usize, actual: usize },

    #[error("expected {expected} displacement channels, got {actual}")]
    DisplacementChannels { expected: usize, actual: usize },

    #[error("tensor grid {actual:?} does not match heatmap grid {expected:?}")]
    GridMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("tensor grid must be non-empty, got {0:?}")]
    EmptyGrid((usize, usize)),

    #[error("failed to construct tensor of shape {1:?} from {2} values")]
    ConstructTensor(#[source] ndarray::ShapeError, [usize; 3], usize),

    #[error("found non-finite value {2} in {0} tensor at {1:?}")]
    NonFiniteInTensor(&'static str, (usize, usize, usize), f32),

    #[error("failed to construct NotNan from f32: {1}")]
    ConstructNotNan(#[source] ordered_float::FloatIsNan, f32),

    #[error("{name} must lie in [0, 1], got {value}")]
    ThresholdOutOfRange { name: &'static str, value: f32 },

    #[error("max pose count must be positive")]
    ZeroMaxPoseCount,

    #[error("nms radius must be positive and finite, got {0}")]
    NmsRadius(f32),

    #[error("output stride must be positive and finite, got {0}")]
    OutputStride(f32),

    #[error("mapper scale must be positive and finite, got {0}")]
    MapperScale(f32),

    #[error("image and model input dimensions must be non-zero, got {0:?}")]
    EmptyDimensions((usize, usize)),

    #[error("failed to parse {0}")]
    Parse(&'static str, #[source] std::num::ParseFloatError),

    #[error("failed to parse integer {0}")]
    ParseInt(&'static str, #[source] std::num::ParseIntError),

    #[error("unknown algorithm {0:?}, expected \"single\" or \"multiple\"")]
    UnknownAlgorithm(String),

    #[error("grid point ({x}, {y}) lies outside a {width}x{height} grid")]
    GridPointOutOfRange {
        x: f32,
        y: f32,
        width: usize,
        height: usize,
    },

    #[error("failed to convert usize value to joint: {0}")]
    ConvertUSizeToJoint(usize),

    #[error("failed to convert value to f32")]
    ConvertToF32,

    #[error("failed to convert value to usize")]
    ConvertToUSize,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::HeatmapChannels { .. }
            | Self::OffsetChannels { .. }
            | Self::DisplacementChannels { .. }
            | Self::GridMismatch { .. }
            | Self::EmptyGrid(_)
            | Self::ConstructTensor(..)
            | Self::NonFiniteInTensor(..)
            | Self::ConstructNotNan(..) => ErrorKind::InvalidInput,
            Self::ThresholdOutOfRange { .. }
            | Self::ZeroMaxPoseCount
            | Self::NmsRadius(_)
            | Self::OutputStride(_)
            | Self::MapperScale(_)
            | Self::EmptyDimensions(_)
            | Self::Parse(..)
            | Self::ParseInt(..)
            | Self::UnknownAlgorithm(_) => ErrorKind::InvalidArgument,
            Self::GridPointOutOfRange { .. }
            | Self::ConvertUSizeToJoint(_)
            | Self::ConvertToF32
            | Self::ConvertToUSize => ErrorKind::OutOfRange,
        }
    }
}
