use getset::Getters;
use thiserror::Error;

use crate::prelude::*;

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CameraError {
    #[error("camera is not ready")]
    NotReady,
    #[error("capturing photo failed: {0}")]
    CaptureFailed(String),
}

/// Anything that can tell whether it is ready and take a photo.
///
/// Detection never drives the camera lifecycle; it only asks for readiness
/// before starting and for a photo when a result is captured.
pub trait Camera: Send + Sync {
    fn is_ready(&self) -> bool;

    fn capture_photo(&mut self) -> Result<Photo, CameraError>;
}

#[derive(Clone, Debug, Eq, Getters, PartialEq)]
pub struct Photo {
    #[getset(get = "pub")]
    mime_type: String,
    #[getset(get = "pub")]
    bytes: Vec<u8>,
}

impl Photo {
    pub fn new<S: Into<String>>(mime_type: S, bytes: Vec<u8>) -> Self {
        Photo {
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            base64::encode(&self.bytes)
        )
    }
}

/// The camera feeding a view.
#[derive(Component)]
pub struct CameraDevice(Box<dyn Camera>);

impl std::fmt::Debug for CameraDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CameraDevice")
            .field(&if self.is_ready() { "ready" } else { "not ready" })
            .finish()
    }
}

impl CameraDevice {
    pub fn new<C: Camera + 'static>(camera: C) -> Self {
        CameraDevice(Box::new(camera))
    }

    pub fn is_ready(&self) -> bool {
        self.0.is_ready()
    }

    pub fn capture_photo(&mut self) -> Result<Photo, CameraError> {
        if !self.0.is_ready() {
            return Err(CameraError::NotReady);
        }
        self.0.capture_photo()
    }
}
