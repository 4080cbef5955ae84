//! `PoseCamera` trait: the camera + marker-detector collaborator.

use metaball_types::{CameraFrame, MetaballError, Pose};

/// A camera that reports the pose of a tracked marker together with the
/// encoded frame it was detected in.
///
/// Marker detection and pose estimation happen behind this trait; the
/// pipeline only consumes the result.
pub trait PoseCamera: Send {
    /// Stable identifier, e.g. `"web_camera"`.
    fn id(&self) -> &str;

    /// Block until the next frame is available and return the raw marker
    /// pose (translation + rotation vector) and the JPEG frame.
    ///
    /// # Errors
    ///
    /// Returns [`MetaballError::AcquisitionFailure`] when no frame could be
    /// read or no marker was detected in it.
    fn read_image_and_pose(&mut self) -> Result<(Pose, CameraFrame), MetaballError>;

    /// Release the device.  Called exactly once during teardown.
    fn release(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockCamera {
        released: bool,
    }

    impl PoseCamera for MockCamera {
        fn id(&self) -> &str {
            "mock"
        }

        fn read_image_and_pose(&mut self) -> Result<(Pose, CameraFrame), MetaballError> {
            if self.released {
                return Err(MetaballError::acquisition("mock", "released"));
            }
            Ok((
                Pose::new(1.0, 0.0, 0.0, 0.0, 0.0, 0.0),
                CameraFrame {
                    width: 2,
                    height: 2,
                    jpeg: vec![0xFF, 0xD8, 0xFF, 0xD9],
                },
            ))
        }

        fn release(&mut self) {
            self.released = true;
        }
    }

    #[test]
    fn mock_camera_is_usable_as_trait_object() {
        let mut cam: Box<dyn PoseCamera> = Box::new(MockCamera { released: false });
        assert_eq!(cam.id(), "mock");
        let (pose, frame) = cam.read_image_and_pose().unwrap();
        assert_eq!(pose.x, 1.0);
        assert_eq!(frame.jpeg.len(), 4);

        cam.release();
        assert!(matches!(
            cam.read_image_and_pose(),
            Err(MetaballError::AcquisitionFailure { .. })
        ));
    }
}
