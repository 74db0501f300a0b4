use std::time::{Duration, Instant};

use discovery_core::camera::{Camera, CameraError, Photo};

const PHOTO_SIZE: usize = 4;

/// Stand-in for a real camera: it takes a moment to warm up and then takes
/// small generated pictures.
#[derive(Debug)]
pub struct SimulatedCamera {
    powered_on: Instant,
    warmup: Duration,
    shots: u32,
}

impl SimulatedCamera {
    pub fn new(warmup: Duration) -> Self {
        SimulatedCamera {
            powered_on: Instant::now(),
            warmup,
            shots: 0,
        }
    }

    /// A tiny binary PPM, shaded differently for every shot
    fn develop(&self) -> Vec<u8> {
        let mut image = format!("P6 {PHOTO_SIZE} {PHOTO_SIZE} 255\n").into_bytes();
        let shade = (self.shots.wrapping_mul(37) % 256) as u8;
        for y in 0..PHOTO_SIZE {
            for x in 0..PHOTO_SIZE {
                let ramp = ((x + y) * 255 / (2 * (PHOTO_SIZE - 1))) as u8;
                image.extend_from_slice(&[ramp, shade, 255 - ramp]);
            }
        }
        image
    }
}

impl Camera for SimulatedCamera {
    fn is_ready(&self) -> bool {
        self.powered_on.elapsed() >= self.warmup
    }

    fn capture_photo(&mut self) -> Result<Photo, CameraError> {
        if !self.is_ready() {
            return Err(CameraError::NotReady);
        }
        self.shots += 1;
        log::debug!("Simulated camera took shot #{}", self.shots);
        Ok(Photo::new("image/x-portable-pixmap", self.develop()))
    }
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;

    #[test]
    fn cold_camera_refuses_to_shoot() {
        let mut camera = SimulatedCamera::new(Duration::from_secs(3600));
        assert!(!camera.is_ready());
        assert_eq!(camera.capture_photo(), Err(CameraError::NotReady));
    }

    #[test]
    fn photos_are_valid_pixmaps() {
        let mut camera = SimulatedCamera::new(Duration::ZERO);
        let photo = camera.capture_photo().expect("warm camera should shoot");
        let header = b"P6 4 4 255\n";
        assert!(photo.bytes().starts_with(header));
        assert_eq!(
            photo.bytes().len(),
            header.len() + PHOTO_SIZE * PHOTO_SIZE * 3
        );
        let second = camera.capture_photo().expect("warm camera should shoot");
        assert_ne!(photo, second);
    }
}
