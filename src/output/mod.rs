//! Typed access to the raw PoseNet inference output.
//!
//! Heatmaps are `[height, width, joints]`. Offsets are `[height, width,
//! 2 * joints]` with every y component first and every x component after
//! them. Displacements follow the same layout over the edges of the joint
//! tree: `[height, width, 2 * edges]`, one tensor per direction.

use crate::{
    error::Error,
    point::Point,
    pose::{constants::NUM_EDGES, Cell, Joint, NUM_JOINTS},
};
use ndarray::{Array3, ArrayView2, ArrayView3, Axis};
use num_traits::cast::ToPrimitive;

mod quantization;
mod sampling;

pub use quantization::{dequantize, dequantize_with_scale, QuantizationParams};

#[derive(Debug, Clone)]
struct Displacements {
    forward: Array3<f32>,
    backward: Array3<f32>,
}

/// One completed inference, read-only for the duration of a decode.
#[derive(Debug, Clone)]
pub struct PoseNetOutput {
    heatmap: Array3<f32>,
    offsets: Array3<f32>,
    displacements: Option<Displacements>,
    // Multiplier that brings offsets and displacements into grid units.
    vector_scale: f32,
}

fn check_finite(name: &'static str, tensor: ArrayView3<f32>) -> Result<(), Error> {
    match tensor.indexed_iter().find(|(_, value)| !value.is_finite()) {
        Some((index, &value)) => Err(Error::NonFiniteInTensor(name, index, value)),
        None => Ok(()),
    }
}

fn check_vector_field(
    name: &'static str,
    tensor: ArrayView3<f32>,
    grid: (usize, usize),
    expected_channels: usize,
    channel_error: fn(usize, usize) -> Error,
) -> Result<(), Error> {
    let (height, width, channels) = tensor.dim();
    if (height, width) != grid {
        return Err(Error::GridMismatch {
            expected: grid,
            actual: (height, width),
        });
    }
    if channels != expected_channels {
        return Err(channel_error(expected_channels, channels));
    }
    check_finite(name, tensor)
}

fn offset_channels(expected: usize, actual: usize) -> Error {
    Error::OffsetChannels { expected, actual }
}

fn displacement_channels(expected: usize, actual: usize) -> Error {
    Error::DisplacementChannels { expected, actual }
}

impl PoseNetOutput {
    /// Wrap a heatmap and its offsets.
    ///
    /// The heatmap should hold probabilities in `[0, 1]`. A logit heatmap
    /// must be squashed with [`PoseNetOutput::with_sigmoid`] before decoding.
    /// Every value of every tensor must be finite.
    pub fn new(heatmap: Array3<f32>, offsets: Array3<f32>) -> Result<Self, Error> {
        let (height, width, channels) = heatmap.dim();
        if height == 0 || width == 0 {
            return Err(Error::EmptyGrid((height, width)));
        }
        if channels != NUM_JOINTS {
            return Err(Error::HeatmapChannels {
                expected: NUM_JOINTS,
                actual: channels,
            });
        }
        check_finite("heatmap", heatmap.view())?;
        check_vector_field(
            "offset",
            offsets.view(),
            (height, width),
            2 * NUM_JOINTS,
            offset_channels,
        )?;

        Ok(Self {
            heatmap,
            offsets,
            displacements: None,
            vector_scale: 1.0,
        })
    }

    /// Build an output from flat row-major buffers.
    pub fn from_shape_vec(
        height: usize,
        width: usize,
        heatmap: Vec<f32>,
        offsets: Vec<f32>,
    ) -> Result<Self, Error> {
        Self::new(
            shaped(heatmap, [height, width, NUM_JOINTS])?,
            shaped(offsets, [height, width, 2 * NUM_JOINTS])?,
        )
    }

    /// Attach forward and backward displacement fields.
    pub fn with_displacements(
        mut self,
        forward: Array3<f32>,
        backward: Array3<f32>,
    ) -> Result<Self, Error> {
        let grid = self.dim();
        check_vector_field(
            "forward displacement",
            forward.view(),
            grid,
            2 * NUM_EDGES,
            displacement_channels,
        )?;
        check_vector_field(
            "backward displacement",
            backward.view(),
            grid,
            2 * NUM_EDGES,
            displacement_channels,
        )?;
        self.displacements = Some(Displacements { forward, backward });
        Ok(self)
    }

    /// Declare that offsets and displacements are expressed in model input
    /// pixels, `output_stride` pixels per grid cell.
    pub fn with_output_stride(mut self, output_stride: f32) -> Result<Self, Error> {
        if !output_stride.is_finite() || output_stride <= 0.0 {
            return Err(Error::OutputStride(output_stride));
        }
        self.vector_scale = output_stride.recip();
        Ok(self)
    }

    /// Treat the heatmap as logits and squash it into probabilities.
    pub fn with_sigmoid(mut self) -> Self {
        self.heatmap.mapv_inplace(sigmoid);
        self
    }

    /// `(height, width)` of the output grid.
    pub fn dim(&self) -> (usize, usize) {
        let (height, width, _) = self.heatmap.dim();
        (height, width)
    }

    pub fn grid_height(&self) -> usize {
        self.dim().0
    }

    pub fn grid_width(&self) -> usize {
        self.dim().1
    }

    pub fn heatmap(&self) -> ArrayView3<f32> {
        self.heatmap.view()
    }

    pub fn joint_heatmap(&self, joint: Joint) -> ArrayView2<f32> {
        self.heatmap.index_axis(Axis(2), joint.idx())
    }

    pub fn has_displacements(&self) -> bool {
        self.displacements.is_some()
    }

    #[inline]
    pub fn confidence(&self, Cell { y, x }: Cell, joint: Joint) -> f32 {
        self.heatmap[(y, x, joint.idx())]
    }

    /// The short-range offset of `joint` at `cell`, in grid units.
    pub fn offset(&self, Cell { y, x }: Cell, joint: Joint) -> Result<Point, Error> {
        let id = joint.idx();
        let dy = self.offsets[(y, x, id)];
        let dx = self.offsets[(y, x, NUM_JOINTS + id)];
        Point::new(dx * self.vector_scale, dy * self.vector_scale)
    }

    /// The position of `joint` inside `cell` after offset refinement, kept
    /// within the grid.
    pub fn refined_position(&self, cell: Cell, joint: Joint) -> Result<Point, Error> {
        let base = Point::new(
            cell.x.to_f32().ok_or(Error::ConvertToF32)?,
            cell.y.to_f32().ok_or(Error::ConvertToF32)?,
        )?;
        let (height, width) = self.float_dim()?;
        Ok((base + self.offset(cell, joint)?).clamp_to(width, height))
    }

    /// The cell containing the grid position `point`.
    pub fn nearest_cell(&self, point: Point) -> Result<Cell, Error> {
        let (height, width) = self.float_dim()?;
        let point = point.clamp_to(width, height);
        Ok(Cell {
            y: point.y().round().to_usize().ok_or(Error::ConvertToUSize)?,
            x: point.x().round().to_usize().ok_or(Error::ConvertToUSize)?,
        })
    }

    /// Sample the displacement along directed edge `edge_id` of
    /// [`EDGE_LIST`](crate::pose::constants::EDGE_LIST) at `point`, in grid
    /// units. `None` if the output carries no displacement fields.
    pub fn displacement(&self, edge_id: usize, point: Point) -> Result<Option<Point>, Error> {
        let displacements = match &self.displacements {
            Some(displacements) => displacements,
            None => return Ok(None),
        };
        let (field, edge) = if edge_id < NUM_EDGES {
            (&displacements.forward, edge_id)
        } else {
            (&displacements.backward, edge_id - NUM_EDGES)
        };
        let [dy, dx] = sampling::sample_tensor_at_channels(
            field.view(),
            point.y(),
            point.x(),
            [edge, NUM_EDGES + edge],
        )?;
        Ok(Some(Point::new(
            dx * self.vector_scale,
            dy * self.vector_scale,
        )?))
    }

    fn float_dim(&self) -> Result<(f32, f32), Error> {
        let (height, width) = self.dim();
        Ok((
            height.to_f32().ok_or(Error::ConvertToF32)?,
            width.to_f32().ok_or(Error::ConvertToF32)?,
        ))
    }
}

fn shaped(values: Vec<f32>, shape: [usize; 3]) -> Result<Array3<f32>, Error> {
    let len = values.len();
    Array3::from_shape_vec((shape[0], shape[1], shape[2]), values)
        .map_err(|e| Error::ConstructTensor(e, shape, len))
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
