use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::face_box::FaceBox;
use crate::shared::frame::Frame;

/// Decorator that runs detection every N frames, reusing the result in
/// between.
///
/// On skipped frames the box is linearly extrapolated from the velocity
/// observed between the two most recent real detections. A real miss
/// clears the velocity, so a lost face stays lost until the next real
/// detection.
pub struct SkipFrameDetector {
    inner: Box<dyn FaceDetector>,
    skip_interval: usize,
    frame_count: usize,
    last_box: Option<FaceBox>,
    /// (dx, dy) per frame between the last two real detections.
    velocity: Option<(f64, f64)>,
    frames_since_detect: usize,
}

impl SkipFrameDetector {
    pub fn new(inner: Box<dyn FaceDetector>, skip_interval: usize) -> Result<Self, &'static str> {
        if skip_interval < 1 {
            return Err("skip_interval must be >= 1");
        }
        Ok(Self {
            inner,
            skip_interval,
            frame_count: 0,
            last_box: None,
            velocity: None,
            frames_since_detect: 0,
        })
    }

    fn update_velocity(&mut self, detected: Option<FaceBox>) {
        self.velocity = match (self.last_box, detected) {
            (Some(prev), Some(next)) => Some((
                (next.x - prev.x) as f64 / self.skip_interval as f64,
                (next.y - prev.y) as f64 / self.skip_interval as f64,
            )),
            _ => None,
        };
    }

    fn extrapolate(&self, face: FaceBox, steps: usize, frame: &Frame) -> FaceBox {
        let Some((dx, dy)) = self.velocity else {
            return face;
        };
        let max_x = (frame.width() as i32 - face.width).max(0);
        let max_y = (frame.height() as i32 - face.height).max(0);
        FaceBox::new(
            (face.x + (dx * steps as f64) as i32).clamp(0, max_x),
            (face.y + (dy * steps as f64) as i32).clamp(0, max_y),
            face.width,
            face.height,
        )
    }
}

impl FaceDetector for SkipFrameDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Option<FaceBox>, Box<dyn std::error::Error>> {
        let due = self.frame_count % self.skip_interval == 0;
        self.frame_count += 1;

        if due {
            let detected = self.inner.detect(frame)?;
            self.update_velocity(detected);
            self.last_box = detected;
            self.frames_since_detect = 0;
            return Ok(detected);
        }

        self.frames_since_detect += 1;
        Ok(self
            .last_box
            .map(|face| self.extrapolate(face, self.frames_since_detect, frame)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeDetector {
        results: Vec<Option<FaceBox>>,
        call_count: usize,
    }

    impl FakeDetector {
        fn new(results: Vec<Option<FaceBox>>) -> Self {
            Self {
                results,
                call_count: 0,
            }
        }
    }

    impl FaceDetector for FakeDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Option<FaceBox>, Box<dyn std::error::Error>> {
            let result = self.results[self.call_count % self.results.len()];
            self.call_count += 1;
            Ok(result)
        }
    }

    struct FailingDetector;

    impl FaceDetector for FailingDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Option<FaceBox>, Box<dyn std::error::Error>> {
            Err("inference failed".into())
        }
    }

    fn frame(index: usize) -> Frame {
        Frame::new(vec![0u8; 100 * 100 * 3], 100, 100, 3, index)
    }

    fn face(x: i32, y: i32) -> Option<FaceBox> {
        Some(FaceBox::new(x, y, 20, 20))
    }

    #[test]
    fn test_interval_1_delegates_every_frame() {
        let inner = FakeDetector::new(vec![face(10, 20), None, face(30, 20)]);
        let mut detector = SkipFrameDetector::new(Box::new(inner), 1).unwrap();

        assert_eq!(detector.detect(&frame(0)).unwrap(), face(10, 20));
        assert_eq!(detector.detect(&frame(1)).unwrap(), None);
        assert_eq!(detector.detect(&frame(2)).unwrap(), face(30, 20));
    }

    #[test]
    fn test_skipped_frame_repeats_without_velocity() {
        let inner = FakeDetector::new(vec![face(10, 20)]);
        let mut detector = SkipFrameDetector::new(Box::new(inner), 2).unwrap();

        detector.detect(&frame(0)).unwrap();
        assert_eq!(detector.detect(&frame(1)).unwrap(), face(10, 20));
    }

    #[test]
    fn test_extrapolation_moves_box_on_skipped_frames() {
        // x: 10 at frame 0, 40 at frame 3 => 10 px/frame.
        let inner = FakeDetector::new(vec![face(10, 20), face(40, 20)]);
        let mut detector = SkipFrameDetector::new(Box::new(inner), 3).unwrap();

        for i in 0..4 {
            detector.detect(&frame(i)).unwrap();
        }
        assert_eq!(detector.detect(&frame(4)).unwrap(), face(50, 20));
        assert_eq!(detector.detect(&frame(5)).unwrap(), face(60, 20));
    }

    #[test]
    fn test_extrapolation_stays_inside_frame() {
        let inner = FakeDetector::new(vec![face(10, 10), face(2, 78)]);
        let mut detector = SkipFrameDetector::new(Box::new(inner), 2).unwrap();

        detector.detect(&frame(0)).unwrap();
        detector.detect(&frame(1)).unwrap();
        detector.detect(&frame(2)).unwrap(); // vel = (-4, 34) per frame
        assert_eq!(detector.detect(&frame(3)).unwrap(), face(0, 80));
    }

    #[test]
    fn test_real_miss_is_not_extrapolated() {
        let inner = FakeDetector::new(vec![face(10, 10), None]);
        let mut detector = SkipFrameDetector::new(Box::new(inner), 2).unwrap();

        detector.detect(&frame(0)).unwrap();
        detector.detect(&frame(1)).unwrap();
        assert_eq!(detector.detect(&frame(2)).unwrap(), None);
        assert_eq!(detector.detect(&frame(3)).unwrap(), None);
    }

    #[test]
    fn test_inner_error_propagates() {
        let mut detector = SkipFrameDetector::new(Box::new(FailingDetector), 2).unwrap();
        assert!(detector.detect(&frame(0)).is_err());
    }

    #[test]
    fn test_skip_interval_0_errors() {
        let inner = FakeDetector::new(vec![None]);
        assert!(SkipFrameDetector::new(Box::new(inner), 0).is_err());
    }
}
