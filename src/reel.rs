//! The looping photo reel: strip construction and per-frame translation.

use log::{debug, warn};
use std::time::Duration;

use crate::config::{MediaKind, Moment, REEL_DURATION};
use crate::scheduler::CancelToken;
use crate::stage::{AudioHandle, ReelFrame, Stage};

/// Builds the strip: every moment once, then the same run again so the
/// wraparound at half the width is seamless.
pub fn build_strip(moments: &[Moment], placeholder: &str, stage: &mut dyn Stage) -> Vec<ReelFrame> {
    let mut frames: Vec<ReelFrame> = moments
        .iter()
        .map(|m| {
            let mut src = m.src.clone();
            if m.kind == MediaKind::Image {
                if let Err(e) = stage.load_image(&m.src) {
                    warn!("reel: {e}; using placeholder");
                    src = placeholder.to_string();
                }
            }
            ReelFrame {
                kind: m.kind,
                src,
                caption: m.caption.clone(),
                rating: m.rating.clone(),
                focus_y: m.focus_y,
            }
        })
        .collect();
    frames.extend_from_within(..);
    frames
}

#[derive(Debug)]
pub struct ReelSession {
    offset: f32,
    cycle_width: f32,
    speed: f32,
    measured: bool,
    paused: bool,
    last_time: Option<Duration>,
    audio: Option<AudioHandle>,
    token: CancelToken,
}

impl ReelSession {
    pub fn new(audio: Option<AudioHandle>) -> Self {
        Self {
            offset: 0.0,
            cycle_width: 1.0,
            speed: 0.0,
            measured: false,
            paused: false,
            last_time: None,
            audio,
            token: CancelToken::new(),
        }
    }

    /// Measures the inserted strip and starts the translation loop. One cycle
    /// is half the strip's width.
    pub fn measure(&mut self, strip_width: f32) {
        let half = strip_width / 2.0;
        self.cycle_width = if half > 0.0 { half } else { 1.0 };
        self.speed = self.cycle_width / REEL_DURATION.as_secs_f32();
        self.measured = true;
        self.last_time = None;
        debug!(
            "reel: cycle {:.1}px at {:.2}px/s",
            self.cycle_width, self.speed
        );
    }

    #[cfg(test)]
    pub fn offset(&self) -> f32 {
        self.offset
    }

    #[cfg(test)]
    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Hover only counts once the loop is running.
    pub fn set_hover(&mut self, hovering: bool) {
        if self.measured {
            self.paused = hovering;
        }
    }

    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    pub fn audio(&self) -> Option<AudioHandle> {
        self.audio
    }

    pub fn take_audio(&mut self) -> Option<AudioHandle> {
        self.audio.take()
    }

    /// One animation frame. Motion is driven by elapsed time, not frame
    /// count; the first frame after `measure` has no elapsed time. Returns
    /// false once the loop has been cancelled.
    pub fn frame(&mut self, now: Duration, stage: &mut dyn Stage) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        if !self.measured {
            return true;
        }
        let last = self.last_time.replace(now).unwrap_or(now);
        let dt = now.saturating_sub(last).as_secs_f32();

        if !self.paused {
            self.offset -= self.speed * dt;
            if self.offset <= -self.cycle_width {
                self.offset = 0.0;
            }
            stage.translate_reel(self.offset);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{Effect, RecordingStage};

    fn moments(n: usize) -> Vec<Moment> {
        (0..n)
            .map(|i| Moment {
                kind: MediaKind::Image,
                src: format!("assets/{i}.png"),
                caption: format!("caption {i}"),
                rating: "10/10".into(),
                focus_y: None,
            })
            .collect()
    }

    fn secs(v: f32) -> Duration {
        Duration::from_secs_f32(v)
    }

    #[test]
    fn strip_doubles_the_moments() {
        let mut stage = RecordingStage::default();
        let strip = build_strip(&moments(6), "ph", &mut stage);
        assert_eq!(strip.len(), 12);
        assert_eq!(strip[0], strip[6]);
        assert_eq!(strip[5].caption, "caption 5");
    }

    #[test]
    fn broken_images_fall_back_to_placeholder() {
        let mut stage = RecordingStage::default();
        stage.missing.insert("assets/1.png".into());
        let strip = build_strip(&moments(3), "ph", &mut stage);
        assert_eq!(strip[1].src, "ph");
        assert_eq!(strip[4].src, "ph");
        assert_eq!(strip[0].src, "assets/0.png");
    }

    #[test]
    fn videos_are_not_probed() {
        let mut stage = RecordingStage::default();
        let mut ms = moments(1);
        ms[0].kind = MediaKind::Video;
        stage.missing.insert(ms[0].src.clone());
        let strip = build_strip(&ms, "ph", &mut stage);
        assert_eq!(strip[0].src, ms[0].src);
    }

    #[test]
    fn speed_covers_half_the_strip_in_thirty_seconds() {
        let mut r = ReelSession::new(None);
        r.measure(600.0);
        assert_eq!(r.speed(), 10.0);
    }

    #[test]
    fn zero_width_strip_still_moves() {
        let mut r = ReelSession::new(None);
        r.measure(0.0);
        assert!(r.speed() > 0.0);
    }

    #[test]
    fn offset_wraps_to_zero_at_half_width() {
        let mut stage = RecordingStage::default();
        let mut r = ReelSession::new(None);
        r.measure(600.0);
        r.frame(secs(0.0), &mut stage);
        r.frame(secs(15.0), &mut stage);
        assert_eq!(r.offset(), -150.0);
        r.frame(secs(30.0), &mut stage);
        assert_eq!(r.offset(), 0.0);
        assert_eq!(stage.reel_offset, Some(0.0));
    }

    #[test]
    fn hover_freezes_without_catching_up() {
        let mut stage = RecordingStage::default();
        let mut r = ReelSession::new(None);
        r.measure(600.0);
        r.frame(secs(0.0), &mut stage);
        r.frame(secs(1.0), &mut stage);
        r.set_hover(true);
        r.frame(secs(5.0), &mut stage);
        assert_eq!(r.offset(), -10.0);
        r.set_hover(false);
        r.frame(secs(6.0), &mut stage);
        assert_eq!(r.offset(), -20.0);
    }

    #[test]
    fn strip_holds_still_until_measured() {
        let mut stage = RecordingStage::default();
        let mut r = ReelSession::new(None);
        r.set_hover(true);
        assert!(r.frame(secs(0.0), &mut stage));
        assert!(r.frame(secs(0.4), &mut stage));
        assert_eq!(stage.reel_offset, None);

        r.measure(600.0);
        r.frame(secs(0.5), &mut stage);
        assert_eq!(r.offset(), 0.0);
        assert_eq!(stage.reel_offset, Some(0.0));
        // hover from before the loop existed is not remembered
        r.frame(secs(1.5), &mut stage);
        assert_eq!(r.offset(), -10.0);
    }

    #[test]
    fn cancelled_reel_stops_translating() {
        let mut stage = RecordingStage::default();
        let mut r = ReelSession::new(None);
        r.measure(600.0);
        r.token().cancel();
        assert!(!r.frame(secs(1.0), &mut stage));
        assert_eq!(stage.reel_offset, None);
        assert_eq!(stage.count(|e| matches!(e, Effect::Reel(_))), 0);
    }
}
