//! Minimum-curvature gridding through GMT.
//!
//! Samples are normalized to `[0, 1]`, written to a text file and gridded
//! by GMT `surface`; the result comes back as a native binary float grid
//! and is scaled back to the sample range. With a mask distance, GMT
//! `grdmask` blanks nodes far from every sample.
//!
//! All intermediate files live in a temporary directory owned by the
//! call, so concurrent calls never share paths.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use bon::Builder;
use ndarray::{Array1, ArrayView1};

use super::gmt_grid::{GmtGrid, GridFormatError};
use super::{check_steps, Bounds, Grid, InterpolationError};
use crate::config::{check_in_range, check_positive, ConfigError};
use crate::utils::{linspace, nan_min_max};

/// Errors raised while gridding with external programs.
#[derive(Debug, thiserror::Error)]
pub enum GriddingError {
    #[error(transparent)]
    Interpolation(#[from] InterpolationError),

    #[error("temporary file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` failed ({status}): {stderr}")]
    ToolFailed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("`{program}` did not write {}", path.display())]
    MissingOutput { program: String, path: PathBuf },

    #[error("`{program}` wrote an unreadable grid: {source}")]
    Format {
        program: String,
        #[source]
        source: GridFormatError,
    },

    #[error("`{program}` wrote a {actual:?} grid, expected {expected:?}")]
    ShapeMismatch {
        program: String,
        expected: (usize, usize),
        actual: (usize, usize),
    },
}

/// Options for [`minimum_curvature`].
#[derive(Debug, Clone, Builder)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
pub struct MinimumCurvatureConfig {
    /// Maximum `surface` iterations (`-N`). Default: 2000.
    #[builder(default = 2000)]
    pub iterations: u32,

    /// Tension in `[0, 1]` (`-T`). Default: 0.25.
    #[builder(default = 0.25)]
    pub tension: f64,

    /// Convergence limit (`-C`). Default: 0.01.
    #[builder(default = 0.01)]
    pub accuracy: f64,

    /// Nodes farther than this from every sample become NaN.
    pub mask: Option<f64>,

    /// Limit the surface to the sample range (`-Ll`/`-Lu`). Default: false.
    #[builder(default)]
    pub clip: bool,

    /// Gridding program. Default: `surface`.
    #[builder(into, default = "surface".to_owned())]
    pub surface_program: String,

    /// Masking program. Default: `grdmask`.
    #[builder(into, default = "grdmask".to_owned())]
    pub mask_program: String,
}

impl<S: minimum_curvature_config_builder::IsComplete> MinimumCurvatureConfigBuilder<S> {
    /// Build and validate the configuration.
    pub fn build(self) -> Result<MinimumCurvatureConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl Default for MinimumCurvatureConfig {
    fn default() -> Self {
        Self {
            iterations: 2000,
            tension: 0.25,
            accuracy: 0.01,
            mask: None,
            clip: false,
            surface_program: "surface".to_owned(),
            mask_program: "grdmask".to_owned(),
        }
    }
}

impl MinimumCurvatureConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.iterations == 0 {
            return Err(ConfigError::Zero("iterations"));
        }
        check_in_range("tension", self.tension, 0.0, 1.0)?;
        check_positive("accuracy", self.accuracy)?;
        if let Some(mask) = self.mask {
            check_positive("mask", mask)?;
        }
        Ok(())
    }
}

/// Gridline-registered region covering `bounds` with nodes at
/// `west + i * dx` for `i` in `0..=nx`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Region {
    west: f64,
    south: f64,
    dx: f64,
    dy: f64,
    nx: usize,
    ny: usize,
}

impl Region {
    fn new(bounds: &Bounds, dx: f64, dy: f64) -> Result<Self, InterpolationError> {
        check_steps(dx, dy)?;
        let nx = ((bounds.xmax - bounds.xmin) / dx).ceil() as usize;
        let ny = ((bounds.ymax - bounds.ymin) / dy).ceil() as usize;
        if nx == 0 || ny == 0 {
            return Err(InterpolationError::GridTooSmall);
        }
        Ok(Self {
            west: bounds.xmin - 0.5 * dx,
            south: bounds.ymin - 0.5 * dy,
            dx,
            dy,
            nx,
            ny,
        })
    }

    fn east(&self) -> f64 {
        self.west + self.nx as f64 * self.dx
    }

    fn north(&self) -> f64 {
        self.south + self.ny as f64 * self.dy
    }

    /// Grid shape as `(rows, columns)`.
    fn shape(&self) -> (usize, usize) {
        (self.ny + 1, self.nx + 1)
    }

    fn increment_arg(&self) -> String {
        format!("-I{}/{}", self.dx, self.dy)
    }

    fn region_arg(&self) -> String {
        format!("-R{}/{}/{}/{}", self.west, self.east(), self.south, self.north())
    }
}

/// Grid `(x, y, values)` samples by minimum curvature with tension.
///
/// The returned axes run from `xmin - dx/2` in steps of `dx` for
/// `ceil((xmax - xmin) / dx) + 1` nodes (likewise in y). Samples with a
/// non-finite value are not passed to GMT.
pub fn minimum_curvature(
    x: ArrayView1<'_, f64>,
    y: ArrayView1<'_, f64>,
    values: ArrayView1<'_, f64>,
    bounds: &Bounds,
    dx: f64,
    dy: f64,
    config: &MinimumCurvatureConfig,
) -> Result<Grid, GriddingError> {
    if x.len() != values.len() || y.len() != values.len() {
        return Err(InterpolationError::LengthMismatch {
            points: x.len().min(y.len()),
            values: values.len(),
        }
        .into());
    }
    let region = Region::new(bounds, dx, dy)?;
    let values = values.to_vec();
    let (min, max) = nan_min_max(&values).ok_or(InterpolationError::NoFiniteValues)?;
    let range = if max > min {
        max - min
    } else {
        log::warn!("all sample values equal {min}, skipping normalization");
        1.0
    };

    let dir = tempfile::tempdir()?;
    let samples = dir.path().join("samples.txt");
    let n_written = write_samples(&samples, x, y, &values, min, range)?;
    log::debug!("wrote {n_written} samples to {}", samples.display());

    let surface_out = dir.path().join("surface.grd");
    let mut args = vec![
        samples.display().to_string(),
        region.increment_arg(),
        region.region_arg(),
        format!("-N{}", config.iterations),
        format!("-T{}", config.tension),
        format!("-C{}", config.accuracy),
        format!("-G{}=bf", surface_out.display()),
    ];
    if config.clip {
        args.push("-Ll0".to_owned());
        args.push(format!("-Lu{}", (max - min) / range));
    }
    run_tool(&config.surface_program, &args)?;
    let mut grid = read_output(&config.surface_program, &surface_out, region.shape())?;
    grid.mapv_inplace(|v| v * range + min);

    if let Some(mask) = config.mask {
        let mask_out = dir.path().join("mask.grd");
        let args = vec![
            samples.display().to_string(),
            region.increment_arg(),
            region.region_arg(),
            format!("-S{mask}"),
            format!("-G{}=bf", mask_out.display()),
        ];
        run_tool(&config.mask_program, &args)?;
        let inside = read_output(&config.mask_program, &mask_out, region.shape())?;
        ndarray::Zip::from(&mut grid).and(&inside).for_each(|v, &m| {
            if m == 0.0 {
                *v = f64::NAN;
            }
        });
    }

    Ok(Grid {
        x: Array1::from(linspace(region.west, region.east(), region.nx + 1)),
        y: Array1::from(linspace(region.south, region.north(), region.ny + 1)),
        values: grid,
    })
}

fn write_samples(
    path: &Path,
    x: ArrayView1<'_, f64>,
    y: ArrayView1<'_, f64>,
    values: &[f64],
    min: f64,
    range: f64,
) -> std::io::Result<usize> {
    let mut out = BufWriter::new(std::fs::File::create(path)?);
    let mut n = 0;
    for ((xi, yi), v) in x.iter().zip(y.iter()).zip(values) {
        if v.is_finite() {
            writeln!(out, "{xi} {yi} {}", (v - min) / range)?;
            n += 1;
        }
    }
    out.flush()?;
    Ok(n)
}

fn run_tool(program: &str, args: &[String]) -> Result<(), GriddingError> {
    log::debug!("running {program} {}", args.join(" "));
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| GriddingError::Spawn {
            program: program.to_owned(),
            source,
        })?;
    if !output.status.success() {
        return Err(GriddingError::ToolFailed {
            program: program.to_owned(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        });
    }
    Ok(())
}

fn read_output(program: &str, path: &Path, expected: (usize, usize)) -> Result<ndarray::Array2<f64>, GriddingError> {
    if !path.exists() {
        return Err(GriddingError::MissingOutput {
            program: program.to_owned(),
            path: path.to_path_buf(),
        });
    }
    let grid = GmtGrid::read(path).map_err(|source| GriddingError::Format {
        program: program.to_owned(),
        source,
    })?;
    if grid.values.dim() != expected {
        return Err(GriddingError::ShapeMismatch {
            program: program.to_owned(),
            expected,
            actual: grid.values.dim(),
        });
    }
    Ok(grid.values)
}
