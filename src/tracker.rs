//! Per-frame fingertip tracking on top of an external hand-landmark detector.

use log::debug;

use crate::config::Platform;
use crate::error::CardResult;

/// Landmark index of the index fingertip in the 21-point hand model.
pub const INDEX_FINGER_TIP: usize = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Default)]
pub struct Hand {
    pub landmarks: Vec<Landmark>,
}

impl Hand {
    pub fn index_tip(&self) -> Option<Landmark> {
        self.landmarks.get(INDEX_FINGER_TIP).copied()
    }
}

/// Handle to one captured frame. Pixel access belongs to the detector.
#[derive(Debug, Clone, Default)]
pub struct VideoFrame {
    pub seq: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorOptions {
    pub max_hands: usize,
    pub model_complexity: u8,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
}

impl DetectorOptions {
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Desktop => Self {
                max_hands: 1,
                model_complexity: 1,
                min_detection_confidence: 0.7,
                min_tracking_confidence: 0.5,
            },
            Platform::Mobile => Self {
                max_hands: 1,
                model_complexity: 0,
                min_detection_confidence: 0.6,
                min_tracking_confidence: 0.4,
            },
        }
    }
}

pub trait HandDetector {
    fn configure(&mut self, _options: &DetectorOptions) {}

    /// Zero or more hands; only the first is ever read.
    fn detect(&mut self, frame: &VideoFrame) -> CardResult<Vec<Hand>>;
}

/// Normalized, horizontally mirrored fingertip position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FingertipSample {
    pub x: f32,
    pub y: f32,
}

impl FingertipSample {
    /// Mirror a raw landmark for a front-facing camera.
    pub fn from_landmark(tip: Landmark) -> Self {
        Self {
            x: 1.0 - tip.x,
            y: tip.y,
        }
    }
}

#[derive(Debug)]
pub struct GestureTracker {
    hand_detected: bool,
}

impl Default for GestureTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl GestureTracker {
    pub fn new() -> Self {
        Self {
            hand_detected: false,
        }
    }

    pub fn hand_detected(&self) -> bool {
        self.hand_detected
    }

    /// Runs the detector on one frame. Returns the new sample only when a hand
    /// was found; detector failures count as "no hand".
    pub fn process(
        &mut self,
        detector: &mut dyn HandDetector,
        frame: &VideoFrame,
    ) -> Option<FingertipSample> {
        let hands = match detector.detect(frame) {
            Ok(h) => h,
            Err(e) => {
                debug!("tracker: {e}; treating frame {} as empty", frame.seq);
                Vec::new()
            }
        };

        match hands.first().and_then(Hand::index_tip) {
            Some(tip) => {
                let sample = FingertipSample::from_landmark(tip);
                self.hand_detected = true;
                Some(sample)
            }
            None => {
                self.hand_detected = false;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CardError;

    struct Fixed(CardResult<Vec<Hand>>);

    impl HandDetector for Fixed {
        fn detect(&mut self, _frame: &VideoFrame) -> CardResult<Vec<Hand>> {
            match &self.0 {
                Ok(h) => Ok(h.clone()),
                Err(e) => Err(CardError::Detector(e.to_string())),
            }
        }
    }

    fn hand_with_tip(x: f32, y: f32) -> Hand {
        let mut landmarks = vec![Landmark::default(); 21];
        landmarks[INDEX_FINGER_TIP] = Landmark { x, y };
        Hand { landmarks }
    }

    #[test]
    fn mirrors_index_tip() {
        let mut t = GestureTracker::new();
        let mut d = Fixed(Ok(vec![hand_with_tip(0.25, 0.4)]));
        let s = t.process(&mut d, &VideoFrame::default()).unwrap();
        assert_eq!(s, FingertipSample { x: 0.75, y: 0.4 });
        assert!(t.hand_detected());
    }

    #[test]
    fn no_hand_clears_flag() {
        let mut t = GestureTracker::new();
        t.process(&mut Fixed(Ok(vec![hand_with_tip(0.5, 0.5)])), &VideoFrame::default());
        assert!(t.hand_detected());
        let out = t.process(&mut Fixed(Ok(vec![])), &VideoFrame::default());
        assert!(out.is_none());
        assert!(!t.hand_detected());
    }

    #[test]
    fn detector_error_is_no_hand() {
        let mut t = GestureTracker::new();
        let mut d = Fixed(Err(CardError::Detector("model not loaded".into())));
        assert!(t.process(&mut d, &VideoFrame::default()).is_none());
        assert!(!t.hand_detected());
    }

    #[test]
    fn truncated_hand_is_no_hand() {
        let mut t = GestureTracker::new();
        let short = Hand {
            landmarks: vec![Landmark::default(); 5],
        };
        assert!(t.process(&mut Fixed(Ok(vec![short])), &VideoFrame::default()).is_none());
    }

    #[test]
    fn mobile_detector_is_lighter() {
        let m = DetectorOptions::for_platform(Platform::Mobile);
        let d = DetectorOptions::for_platform(Platform::Desktop);
        assert_eq!(m.max_hands, 1);
        assert!(m.model_complexity < d.model_complexity);
    }
}
