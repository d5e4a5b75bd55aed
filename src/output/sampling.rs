use crate::error::Error;
use ndarray::ArrayView3;
use num_traits::cast::ToPrimitive;

/// Project `x` onto `[0, n - 1]` and return the bracketing indices along with
/// the interpolation weight of the upper one.
pub(super) fn build_linear_interpolation(x: f32, n: usize) -> Result<(usize, usize, f32), Error> {
    let x_proj = x.clamp(0.0, n.to_f32().ok_or(Error::ConvertToF32)? - 1.0);
    let floor_f = x_proj.floor();
    let ceil_f = x_proj.ceil();
    Ok((
        floor_f.to_usize().ok_or(Error::ConvertToUSize)?,
        ceil_f.to_usize().ok_or(Error::ConvertToUSize)?,
        x_proj - floor_f,
    ))
}

/// Bilinearly sample `tensor` (`[height, width, channels]`) at the fractional
/// grid position `(y, x)` for each of `channels`.
pub(super) fn sample_tensor_at_channels<const C: usize>(
    tensor: ArrayView3<f32>,
    y: f32,
    x: f32,
    channels: [usize; C],
) -> Result<[f32; C], Error> {
    let (height, width, _) = tensor.dim();
    let (y_floor, y_ceil, y_lerp) = build_linear_interpolation(y, height)?;
    let (x_floor, x_ceil, x_lerp) = build_linear_interpolation(x, width)?;
    let mut result = [0.0; C];
    for (dst, c) in result.iter_mut().zip(channels) {
        *dst = (1.0 - y_lerp)
            * ((1.0 - x_lerp) * tensor[(y_floor, x_floor, c)]
                + x_lerp * tensor[(y_floor, x_ceil, c)])
            + y_lerp
                * ((1.0 - x_lerp) * tensor[(y_ceil, x_floor, c)]
                    + x_lerp * tensor[(y_ceil, x_ceil, c)]);
    }
    Ok(result)
}
