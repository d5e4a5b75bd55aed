//! Projection from the model's output grid back into source image pixels.

use crate::{error::Error, point::Point};
use num_traits::cast::ToPrimitive;

/// Width and height of an image or grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: usize,
    pub height: usize,
}

impl Size {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    fn check_non_empty(self) -> Result<Self, Error> {
        if self.width == 0 || self.height == 0 {
            Err(Error::EmptyDimensions((self.width, self.height)))
        } else {
            Ok(self)
        }
    }

    fn to_f32(self) -> Result<(f32, f32), Error> {
        Ok((
            self.width.to_f32().ok_or(Error::ConvertToF32)?,
            self.height.to_f32().ok_or(Error::ConvertToF32)?,
        ))
    }
}

/// The affine map `pixel = grid * scale + offset`, clamped to the image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    grid: Size,
    image: Size,
    scale_x: f32,
    scale_y: f32,
    offset: Point,
}

fn check_scale(scale: f32) -> Result<f32, Error> {
    if scale.is_finite() && scale > 0.0 {
        Ok(scale)
    } else {
        Err(Error::MapperScale(scale))
    }
}

impl CoordinateMapper {
    pub fn new(
        grid: Size,
        image: Size,
        scale_x: f32,
        scale_y: f32,
        offset: Point,
    ) -> Result<Self, Error> {
        Ok(Self {
            grid: grid.check_non_empty()?,
            image: image.check_non_empty()?,
            scale_x: check_scale(scale_x)?,
            scale_y: check_scale(scale_y)?,
            offset,
        })
    }

    /// The model input was produced by stretching the image to
    /// `model_input`; one grid cell spans `output_stride` input pixels.
    pub fn from_resize(
        grid: Size,
        output_stride: f32,
        model_input: Size,
        image: Size,
    ) -> Result<Self, Error> {
        let output_stride = check_stride(output_stride)?;
        let (input_width, input_height) = model_input.check_non_empty()?.to_f32()?;
        let (image_width, image_height) = image.check_non_empty()?.to_f32()?;
        Self::new(
            grid,
            image,
            output_stride * image_width / input_width,
            output_stride * image_height / input_height,
            Point::default(),
        )
    }

    /// The model input was produced by an aspect-preserving resize of the
    /// image followed by centered padding up to `model_input`.
    pub fn from_letterbox(
        grid: Size,
        output_stride: f32,
        model_input: Size,
        image: Size,
    ) -> Result<Self, Error> {
        let output_stride = check_stride(output_stride)?;
        let (input_width, input_height) = model_input.check_non_empty()?.to_f32()?;
        let (image_width, image_height) = image.check_non_empty()?.to_f32()?;

        let scale = (input_width / image_width).min(input_height / image_height);
        let pad_x = (input_width - image_width * scale) / 2.0;
        let pad_y = (input_height - image_height * scale) / 2.0;

        Self::new(
            grid,
            image,
            output_stride / scale,
            output_stride / scale,
            Point::new(-pad_x / scale, -pad_y / scale)?,
        )
    }

    /// `(height, width)` of the grid this mapper accepts.
    pub fn grid(&self) -> (usize, usize) {
        (self.grid.height, self.grid.width)
    }

    pub fn image(&self) -> Size {
        self.image
    }

    /// Map a grid position to image pixels.
    ///
    /// Fails with an out-of-range error if `point` is not inside the grid.
    pub fn map(&self, point: Point) -> Result<Point, Error> {
        let (grid_width, grid_height) = self.grid.to_f32()?;
        let (x, y) = (point.x(), point.y());
        if !(0.0..=grid_width - 1.0).contains(&x) || !(0.0..=grid_height - 1.0).contains(&y) {
            return Err(Error::GridPointOutOfRange {
                x,
                y,
                width: self.grid.width,
                height: self.grid.height,
            });
        }
        let (image_width, image_height) = self.image.to_f32()?;
        Ok(Point::new(
            x * self.scale_x + self.offset.x(),
            y * self.scale_y + self.offset.y(),
        )?
        .clamp_to(image_width, image_height))
    }
}

fn check_stride(output_stride: f32) -> Result<f32, Error> {
    if output_stride.is_finite() && output_stride > 0.0 {
        Ok(output_stride)
    } else {
        Err(Error::OutputStride(output_stride))
    }
}
