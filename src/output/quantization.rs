use crate::error::Error;
use num_traits::ToPrimitive;
use std::str::FromStr;

/// Affine quantization parameters of a `u8` model output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantizationParams {
    pub scale: f32,
    pub zero_point: i32,
}

/// Parses `"<scale>:<zero_point>"`, e.g. `"0.0392:128"`.
impl FromStr for QuantizationParams {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scale, zero_point) = s.split_once(':').unwrap_or((s, "0"));
        Ok(Self {
            scale: scale
                .trim()
                .parse()
                .map_err(|e| Error::Parse("quantization scale", e))?,
            zero_point: zero_point
                .trim()
                .parse()
                .map_err(|e| Error::ParseInt("quantization zero point", e))?,
        })
    }
}

#[inline]
pub fn dequantize(values: &[u8], params: QuantizationParams) -> Result<Vec<f32>, Error> {
    dequantize_with_scale(values, params, 1.0)
}

/// Dequantize `values`, multiplying every result by an extra `scale`.
pub fn dequantize_with_scale(
    values: &[u8],
    QuantizationParams {
        scale: quant_scale,
        zero_point,
    }: QuantizationParams,
    mut scale: f32,
) -> Result<Vec<f32>, Error> {
    scale *= quant_scale;
    let zero_point = zero_point.to_f32().ok_or(Error::ConvertToF32)?;
    Ok(values
        .iter()
        .map(|&value| (f32::from(value) - zero_point) * scale)
        .collect())
}
