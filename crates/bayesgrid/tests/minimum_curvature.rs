//! Minimum-curvature gridding against stand-in GMT programs.
//!
//! The stand-ins are shell scripts that copy a prepared grid to the path
//! passed with `-G<path>=bf`, so the orchestration (arguments, temp files,
//! de-normalization, masking, error reporting) runs without GMT installed.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Mutex;

use approx::assert_abs_diff_eq;
use bayesgrid::interpolate::gmt_grid::GmtGrid;
use bayesgrid::{minimum_curvature, Bounds, GriddingError, MinimumCurvatureConfig};
use ndarray::{array, Array2};

// Writing an executable while another test forks can make exec fail with
// ETXTBSY, so tests that create and run scripts take turns.
static SCRIPTS: Mutex<()> = Mutex::new(());

fn scratch_dir() -> tempfile::TempDir {
    tempfile::tempdir_in(env!("CARGO_TARGET_TMPDIR")).unwrap()
}

fn fake_tool(dir: &Path, name: &str, fixture: &Path, status: i32) -> String {
    let script = format!(
        "#!/bin/sh\nfor arg in \"$@\"; do\n  case \"$arg\" in\n    -G*) out=\"${{arg#-G}}\"; out=\"${{out%=bf}}\";;\n  esac\ndone\ncp \"{}\" \"$out\"\nexit {status}\n",
        fixture.display()
    );
    let path = dir.join(name);
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.display().to_string()
}

/// Grid over the region `minimum_curvature` derives from `[0, 4] x [0, 2]`
/// with unit steps.
fn region_grid(values: Array2<f64>) -> GmtGrid {
    GmtGrid::new([-0.5, 3.5, -0.5, 1.5], [1.0, 1.0], values)
}

fn bounds() -> Bounds {
    Bounds::new(0.0, 4.0, 0.0, 2.0).unwrap()
}

#[test]
fn denormalizes_and_masks_tool_output() {
    let _guard = SCRIPTS.lock().unwrap_or_else(|e| e.into_inner());
    let dir = scratch_dir();
    let surface = dir.path().join("surface_fixture.bf");
    region_grid(Array2::from_shape_fn((3, 5), |(r, c)| (r * 5 + c) as f64 / 14.0))
        .write(&surface)
        .unwrap();
    let mask = dir.path().join("mask_fixture.bf");
    region_grid(Array2::from_shape_fn((3, 5), |(_, c)| if c == 0 { 0.0 } else { 1.0 }))
        .write(&mask)
        .unwrap();

    let config = MinimumCurvatureConfig::builder()
        .surface_program(fake_tool(dir.path(), "surface", &surface, 0))
        .mask_program(fake_tool(dir.path(), "grdmask", &mask, 0))
        .mask(1.0)
        .clip(true)
        .build()
        .unwrap();
    let x = array![0.0, 4.0, 2.0];
    let y = array![0.0, 0.0, 2.0];
    let v = array![10.0, 20.0, 30.0];
    let grid = minimum_curvature(x.view(), y.view(), v.view(), &bounds(), 1.0, 1.0, &config).unwrap();

    assert_eq!(grid.x.to_vec(), vec![-0.5, 0.5, 1.5, 2.5, 3.5]);
    assert_eq!(grid.y.to_vec(), vec![-0.5, 0.5, 1.5]);
    assert_eq!(grid.shape(), (3, 5));
    for ((r, c), value) in grid.values.indexed_iter() {
        if c == 0 {
            assert!(value.is_nan());
        } else {
            let expected = 10.0 + 20.0 * (r * 5 + c) as f64 / 14.0;
            assert_abs_diff_eq!(*value, expected, epsilon = 1e-4);
        }
    }
}

#[test]
fn failing_tool_reports_exit_status() {
    let _guard = SCRIPTS.lock().unwrap_or_else(|e| e.into_inner());
    let dir = scratch_dir();
    let fixture = dir.path().join("fixture.bf");
    region_grid(Array2::zeros((3, 5))).write(&fixture).unwrap();
    let config = MinimumCurvatureConfig::builder()
        .surface_program(fake_tool(dir.path(), "surface", &fixture, 3))
        .build()
        .unwrap();
    let v = array![0.0, 1.0, 2.0];
    let err = minimum_curvature(v.view(), v.view(), v.view(), &bounds(), 1.0, 1.0, &config).unwrap_err();
    assert!(matches!(err, GriddingError::ToolFailed { status, .. } if status.code() == Some(3)));
}

#[test]
fn grid_of_the_wrong_shape_is_rejected() {
    let _guard = SCRIPTS.lock().unwrap_or_else(|e| e.into_inner());
    let dir = scratch_dir();
    let fixture = dir.path().join("fixture.bf");
    region_grid(Array2::zeros((2, 2))).write(&fixture).unwrap();
    let config = MinimumCurvatureConfig::builder()
        .surface_program(fake_tool(dir.path(), "surface", &fixture, 0))
        .build()
        .unwrap();
    let v = array![0.0, 1.0, 2.0];
    let err = minimum_curvature(v.view(), v.view(), v.view(), &bounds(), 1.0, 1.0, &config).unwrap_err();
    assert!(matches!(
        err,
        GriddingError::ShapeMismatch { expected: (3, 5), actual: (2, 2), .. }
    ));
}

#[test]
fn tool_that_writes_nothing_is_reported() {
    let _guard = SCRIPTS.lock().unwrap_or_else(|e| e.into_inner());
    let config = MinimumCurvatureConfig::builder()
        .surface_program("true")
        .build()
        .unwrap();
    let v = array![0.0, 1.0, 2.0];
    let err = minimum_curvature(v.view(), v.view(), v.view(), &bounds(), 1.0, 1.0, &config).unwrap_err();
    assert!(matches!(err, GriddingError::MissingOutput { .. }));
}
