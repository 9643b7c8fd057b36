//! Snapshot capture from the fixed scene camera

use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat, RgbaImage};
use nalgebra::{Isometry3, Perspective3, Point3, Vector3};

use crate::backend::{CameraView, PhysicsBackend};
use crate::config::CameraConfig;
use crate::{Error, Result};

/// Build view and projection matrices for an orbiting camera
///
/// The eye sits `distance` away from `target`, swung `yaw` degrees around
/// world z and raised by `-pitch` degrees, with `roll` spinning the image
/// about the viewing axis. World z is up.
pub fn camera_view(config: &CameraConfig) -> CameraView {
    let (yaw, pitch, roll) = (
        config.yaw.to_radians(),
        config.pitch.to_radians(),
        config.roll.to_radians(),
    );
    let to_eye = Vector3::new(
        pitch.cos() * yaw.cos(),
        pitch.cos() * yaw.sin(),
        -pitch.sin(),
    );
    let target = Point3::from(config.target);
    let eye = target + to_eye * config.distance;

    // Rotate world-up about the viewing axis for roll
    let forward = (target - eye).normalize();
    let up = nalgebra::UnitQuaternion::from_axis_angle(&nalgebra::Unit::new_normalize(forward), roll)
        * Vector3::z();

    let view = Isometry3::look_at_rh(&eye, &target, &up).to_homogeneous();
    let projection = Perspective3::new(
        config.aspect(),
        config.fov.to_radians(),
        config.near,
        config.far,
    )
    .to_homogeneous();

    CameraView {
        view,
        projection,
        width: config.width,
        height: config.height,
    }
}

/// Render the scene and write it as an RGB image
///
/// The format follows the file extension and falls back to PNG. Parent
/// directories are created as needed. Nothing is cached: every call renders.
pub fn capture<B: PhysicsBackend + ?Sized>(
    backend: &mut B,
    camera: &CameraView,
    path: impl AsRef<Path>,
) -> Result<PathBuf> {
    let path = path.as_ref();
    let frame = backend.render(camera)?;
    if frame.width != camera.width || frame.height != camera.height {
        return Err(Error::Render(format!(
            "requested {}x{} frame, backend returned {}x{}",
            camera.width, camera.height, frame.width, frame.height
        )));
    }
    let expected = frame.expected_len();
    let (width, height) = (frame.width, frame.height);
    let rgba = RgbaImage::from_raw(width, height, frame.pixels).ok_or_else(|| {
        Error::Render(format!(
            "pixel buffer too short for {width}x{height} (expected {expected} bytes)"
        ))
    })?;
    let rgb = DynamicImage::ImageRgba8(rgba).into_rgb8();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| Error::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let format = ImageFormat::from_path(path).unwrap_or(ImageFormat::Png);
    rgb.save_with_format(path, format).map_err(|e| match e {
        image::ImageError::IoError(source) => Error::Io {
            path: path.to_path_buf(),
            source,
        },
        other => Error::Image(other.to_string()),
    })?;

    tracing::debug!(path = %path.display(), width, height, "saved snapshot");
    Ok(path.to_path_buf())
}
