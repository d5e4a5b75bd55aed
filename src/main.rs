use anyhow::{anyhow, Context, Result};
use ndarray::Array3;
use posefinder::{
    output::{dequantize, QuantizationParams},
    pose::constants::NUM_EDGES,
    Algorithm, Configuration, CoordinateMapper, Engine, PoseNetOutput, Settings, SharedSettings,
    Size,
};
use std::path::{Path, PathBuf};
use structopt::StructOpt;
use tracing::{debug, info};
use tracing_subscriber::layer::SubscriberExt;

/// Decode poses from raw PoseNet output tensors.
///
/// Tensors are flat row-major dumps: little-endian f32, or u8 when a
/// quantization is given.
#[derive(structopt::StructOpt)]
struct Opt {
    #[structopt(flatten)]
    input: Input,

    #[structopt(short, long, default_value = "info", env = "RUST_LOG")]
    log_level: tracing_subscriber::filter::EnvFilter,
}

#[derive(structopt::StructOpt)]
struct Input {
    /// Heatmap tensor, [height, width, 17].
    heatmap: PathBuf,

    /// Offset tensor, [height, width, 34].
    offsets: PathBuf,

    /// Forward displacement tensor, [height, width, 32].
    #[structopt(long, requires = "backward")]
    forward: Option<PathBuf>,

    /// Backward displacement tensor, [height, width, 32].
    #[structopt(long, requires = "forward")]
    backward: Option<PathBuf>,

    #[structopt(short = "H", long)]
    grid_height: usize,

    #[structopt(short = "W", long)]
    grid_width: usize,

    /// Model input pixels per grid cell.
    #[structopt(short = "s", long, default_value = "16")]
    output_stride: f32,

    /// Offsets and displacements are already in grid cells, not pixels.
    #[structopt(long)]
    grid_units: bool,

    /// The heatmap holds logits rather than probabilities.
    #[structopt(long)]
    logits: bool,

    /// Read the heatmap as u8 with this "scale:zero_point".
    #[structopt(long)]
    heatmap_quantization: Option<QuantizationParams>,

    /// Read offsets and displacements as u8 with this "scale:zero_point".
    #[structopt(long)]
    offset_quantization: Option<QuantizationParams>,

    /// The width of the image the model expects.
    #[structopt(long, default_value = "257")]
    model_width: usize,

    /// The height of the image the model expects.
    #[structopt(long, default_value = "257")]
    model_height: usize,

    /// The width of the source frame.
    #[structopt(long)]
    image_width: usize,

    /// The height of the source frame.
    #[structopt(long)]
    image_height: usize,

    /// The frame was letterboxed into the model input instead of stretched.
    #[structopt(long)]
    letterbox: bool,

    /// "single" or "multiple".
    #[structopt(short, long, default_value = "multiple")]
    algorithm: Algorithm,

    #[structopt(flatten)]
    configuration: Configuration,
}

fn read_f32s(path: &Path) -> Result<Vec<f32>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    if bytes.len() % 4 != 0 {
        return Err(anyhow!(
            "{} holds {} bytes, not a whole number of f32 values",
            path.display(),
            bytes.len()
        ));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

fn read_tensor(path: &Path, quantization: Option<QuantizationParams>) -> Result<Vec<f32>> {
    match quantization {
        Some(params) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("failed reading {}", path.display()))?;
            dequantize(&bytes, params)
                .with_context(|| format!("failed dequantizing {}", path.display()))
        }
        None => read_f32s(path),
    }
}

fn read_displacements(opt: &Input, path: &Path) -> Result<Array3<f32>> {
    let values = read_tensor(path, opt.offset_quantization)?;
    let len = values.len();
    Array3::from_shape_vec((opt.grid_height, opt.grid_width, 2 * NUM_EDGES), values)
        .with_context(|| {
            format!(
                "{} holds {} values, expected a {}x{}x{} tensor",
                path.display(),
                len,
                opt.grid_height,
                opt.grid_width,
                2 * NUM_EDGES
            )
        })
}

fn load_output(opt: &Input) -> Result<PoseNetOutput> {
    let mut output = PoseNetOutput::from_shape_vec(
        opt.grid_height,
        opt.grid_width,
        read_tensor(&opt.heatmap, opt.heatmap_quantization)?,
        read_tensor(&opt.offsets, opt.offset_quantization)?,
    )
    .context("invalid network output")?;

    if let (Some(forward), Some(backward)) = (&opt.forward, &opt.backward) {
        output = output
            .with_displacements(
                read_displacements(opt, forward)?,
                read_displacements(opt, backward)?,
            )
            .context("invalid displacement fields")?;
    }
    if !opt.grid_units {
        output = output
            .with_output_stride(opt.output_stride)
            .context("invalid output stride")?;
    }
    if opt.logits {
        output = output.with_sigmoid();
    }
    Ok(output)
}

fn main() -> Result<()> {
    let Opt {
        input: opt,
        log_level,
    } = Opt::from_args();

    tracing::subscriber::set_global_default(
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(log_level),
    )?;

    let output = load_output(&opt)?;
    info!(
        message = "loaded network output",
        grid_height = opt.grid_height,
        grid_width = opt.grid_width,
        displacements = output.has_displacements()
    );

    let grid = Size::new(opt.grid_width, opt.grid_height);
    let model_input = Size::new(opt.model_width, opt.model_height);
    let image = Size::new(opt.image_width, opt.image_height);
    let mapper = if opt.letterbox {
        CoordinateMapper::from_letterbox(grid, opt.output_stride, model_input, image)
    } else {
        CoordinateMapper::from_resize(grid, opt.output_stride, model_input, image)
    }
    .context("failed constructing coordinate mapper")?;
    debug!(?mapper);

    let settings = SharedSettings::new(Settings {
        configuration: opt.configuration,
        algorithm: opt.algorithm,
    });
    let mut engine = Engine::new(settings, mapper);
    let poses = engine
        .detect_poses(&output)
        .context("failed detecting poses")?;

    info!(
        message = "decoded poses",
        algorithm = %opt.algorithm,
        poses = poses.len(),
        decode = ?engine.timing().decode
    );

    for (i, pose) in poses.iter().enumerate() {
        println!("pose {} score {:.3}", i, pose.score());
        for keypoint in pose.keypoints() {
            println!(
                "  {:<14} x {:>8.1} y {:>8.1} score {:.3}",
                keypoint.joint.name(),
                keypoint.position.x(),
                keypoint.position.y(),
                keypoint.score
            );
        }
    }
    Ok(())
}
