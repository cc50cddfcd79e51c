//! The visible side of the card: every effect the core asks for goes through
//! a [`Stage`]. `LogStage` narrates to the log; `RecordingStage` keeps a list
//! for tests.

use anyhow::{Result, anyhow};
use log::{debug, info, trace, warn};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use crate::config::{AudioTrack, Letter, MediaKind};
use crate::error::{CardError, CardResult};
use crate::proximity::MatchPosition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CakeAsset {
    Lit,
    Unlit,
}

impl CakeAsset {
    pub fn path(self) -> &'static str {
        match self {
            CakeAsset::Lit => "assets/cake_lit.gif",
            CakeAsset::Unlit => "assets/cake_unlit.gif",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Element {
    Overlay,
    Title,
    Reel,
    Letter,
}

/// One call into the particle renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct Burst {
    pub particle_count: u32,
    pub angle: f32,
    pub spread: f32,
    pub start_velocity: f32,
    pub gravity: Option<f32>,
    pub ticks: Option<u32>,
    pub scalar: Option<f32>,
    pub origin: (f32, f32),
    pub colors: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Firefly {
    pub left_pct: f32,
    pub top_pct: f32,
    pub delay: Duration,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReelFrame {
    pub kind: MediaKind,
    pub src: String,
    pub caption: String,
    pub rating: String,
    pub focus_y: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fade {
    pub opacity: f32,
    pub scale: Option<f32>,
    pub transition: Option<Duration>,
}

impl Fade {
    pub fn to(opacity: f32) -> Self {
        Self {
            opacity,
            scale: None,
            transition: None,
        }
    }

    pub fn scaled(mut self, scale: f32) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn over(mut self, d: Duration) -> Self {
        self.transition = Some(d);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioHandle(pub u32);

pub trait Stage {
    fn set_cake(&mut self, asset: CakeAsset);
    fn move_match(&mut self, pos: MatchPosition);
    fn hide_match(&mut self);
    /// Blocking user-facing notice.
    fn alert(&mut self, message: &str);

    fn confetti(&mut self, burst: &Burst);

    /// Inserted transparent and hidden; `show` then `fade` reveal it.
    fn insert_overlay(&mut self, title: &str, fireflies: &[Firefly]);
    fn show(&mut self, el: Element);
    fn fade(&mut self, el: Element, fade: Fade);
    fn remove(&mut self, el: Element);

    fn load_image(&mut self, src: &str) -> CardResult<()>;
    fn insert_reel(&mut self, frames: &[ReelFrame]);
    /// Full scroll width of the inserted strip, duplicates included.
    fn reel_width(&self) -> f32;
    fn translate_reel(&mut self, offset: f32);

    fn attach_audio(&mut self, track: &AudioTrack) -> CardResult<AudioHandle>;
    fn play_audio(&mut self, handle: AudioHandle) -> CardResult<()>;
    fn stop_audio(&mut self, handle: AudioHandle);

    fn insert_letter(&mut self, letter: &Letter);
}

// --------- LogStage ----------

/// Narrates the card to the log. With an asset root, missing files are
/// reported the same way a browser would fail to load them.
pub struct LogStage {
    asset_root: Option<PathBuf>,
    frame_width: f32,
    frames: usize,
    next_audio: u32,
    autoplay_blocked: bool,
}

impl LogStage {
    pub fn new() -> Self {
        Self {
            asset_root: None,
            frame_width: 320.0,
            frames: 0,
            next_audio: 1,
            autoplay_blocked: false,
        }
    }

    pub fn with_assets(mut self, root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(anyhow!("asset root {} is not a directory", root.display()));
        }
        self.asset_root = Some(root.to_path_buf());
        Ok(self)
    }

    pub fn block_autoplay(mut self, blocked: bool) -> Self {
        self.autoplay_blocked = blocked;
        self
    }

    fn check(&self, src: &str) -> CardResult<()> {
        match &self.asset_root {
            Some(root) if !src.starts_with("http") && !root.join(src).exists() => {
                Err(CardError::MissingAsset(src.to_string()))
            }
            _ => Ok(()),
        }
    }
}

impl Default for LogStage {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for LogStage {
    fn set_cake(&mut self, asset: CakeAsset) {
        info!("stage: cake -> {}", asset.path());
    }

    fn move_match(&mut self, pos: MatchPosition) {
        trace!("stage: match at ({:.1}, {:.1})", pos.x, pos.y);
    }

    fn hide_match(&mut self) {
        info!("stage: match hidden");
    }

    fn alert(&mut self, message: &str) {
        warn!("stage: ALERT {message}");
    }

    fn confetti(&mut self, burst: &Burst) {
        trace!(
            "stage: confetti x{} angle {:.0}±{:.0} v{:.1} from ({:.2}, {:.2}) gravity {:?} ticks {:?} scalar {:?} {:?}",
            burst.particle_count,
            burst.angle,
            burst.spread / 2.0,
            burst.start_velocity,
            burst.origin.0,
            burst.origin.1,
            burst.gravity,
            burst.ticks,
            burst.scalar,
            burst.colors
        );
    }

    fn insert_overlay(&mut self, title: &str, fireflies: &[Firefly]) {
        info!("stage: overlay '{title}' with {} fireflies", fireflies.len());
        for f in fireflies {
            trace!(
                "stage: firefly at {:.0}%,{:.0}% delay {:.1}s cycle {:.1}s",
                f.left_pct,
                f.top_pct,
                f.delay.as_secs_f32(),
                f.duration.as_secs_f32()
            );
        }
    }

    fn show(&mut self, el: Element) {
        info!("stage: show {el:?}");
    }

    fn fade(&mut self, el: Element, fade: Fade) {
        match (fade.scale, fade.transition) {
            (None, None) => info!("stage: {el:?} opacity -> {}", fade.opacity),
            (scale, over) => info!(
                "stage: {el:?} opacity -> {} scale {:?} over {:?}",
                fade.opacity, scale, over
            ),
        }
    }

    fn remove(&mut self, el: Element) {
        info!("stage: removed {el:?}");
    }

    fn load_image(&mut self, src: &str) -> CardResult<()> {
        self.check(src)
    }

    fn insert_reel(&mut self, frames: &[ReelFrame]) {
        self.frames = frames.len();
        info!("stage: reel with {} frames", frames.len());
        for f in frames {
            debug!(
                "stage:   {:?} {} '{}' {} focus {:?}",
                f.kind, f.src, f.caption, f.rating, f.focus_y
            );
        }
    }

    fn reel_width(&self) -> f32 {
        self.frames as f32 * self.frame_width
    }

    fn translate_reel(&mut self, offset: f32) {
        trace!("stage: reel translateX({offset:.1}px)");
    }

    fn attach_audio(&mut self, track: &AudioTrack) -> CardResult<AudioHandle> {
        self.check(&track.src)?;
        let h = AudioHandle(self.next_audio);
        self.next_audio += 1;
        info!(
            "stage: audio {} attached (volume {}, loop {})",
            track.src, track.volume, track.looped
        );
        Ok(h)
    }

    fn play_audio(&mut self, handle: AudioHandle) -> CardResult<()> {
        if self.autoplay_blocked {
            return Err(CardError::PlaybackRejected {
                src: format!("audio#{}", handle.0),
                reason: "autoplay policy".into(),
            });
        }
        info!("stage: audio#{} playing", handle.0);
        Ok(())
    }

    fn stop_audio(&mut self, handle: AudioHandle) {
        info!("stage: audio#{} stopped", handle.0);
    }

    fn insert_letter(&mut self, letter: &Letter) {
        info!("stage: letter '{}'", letter.header);
        for line in letter.body.lines() {
            info!("stage:   {line}");
        }
        info!("stage:   {}", letter.signoff);
    }
}

// --------- RecordingStage ----------

#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Cake(CakeAsset),
    HideMatch,
    Alert(String),
    Confetti(Burst),
    Overlay { title: String, fireflies: usize },
    Show(Element),
    Fade(Element, Fade),
    Remove(Element),
    Reel(Vec<ReelFrame>),
    AudioAttached(AudioTrack),
    AudioPlaying(AudioHandle),
    AudioStopped(AudioHandle),
    Letter(Letter),
}

/// Keeps every effect except per-frame motion, which is summarised.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingStage {
    pub effects: Vec<Effect>,
    pub match_moves: Vec<MatchPosition>,
    pub reel_offset: Option<f32>,
    pub reel_width: f32,
    pub missing: std::collections::HashSet<String>,
    pub autoplay_blocked: bool,
}

#[cfg(test)]
impl RecordingStage {
    pub fn count(&self, pred: impl Fn(&Effect) -> bool) -> usize {
        self.effects.iter().filter(|e| pred(*e)).count()
    }
}

#[cfg(test)]
impl Stage for RecordingStage {
    fn set_cake(&mut self, asset: CakeAsset) {
        self.effects.push(Effect::Cake(asset));
    }

    fn move_match(&mut self, pos: MatchPosition) {
        self.match_moves.push(pos);
    }

    fn hide_match(&mut self) {
        self.effects.push(Effect::HideMatch);
    }

    fn alert(&mut self, message: &str) {
        self.effects.push(Effect::Alert(message.to_string()));
    }

    fn confetti(&mut self, burst: &Burst) {
        self.effects.push(Effect::Confetti(burst.clone()));
    }

    fn insert_overlay(&mut self, title: &str, fireflies: &[Firefly]) {
        self.effects.push(Effect::Overlay {
            title: title.to_string(),
            fireflies: fireflies.len(),
        });
    }

    fn show(&mut self, el: Element) {
        self.effects.push(Effect::Show(el));
    }

    fn fade(&mut self, el: Element, fade: Fade) {
        self.effects.push(Effect::Fade(el, fade));
    }

    fn remove(&mut self, el: Element) {
        self.effects.push(Effect::Remove(el));
    }

    fn load_image(&mut self, src: &str) -> CardResult<()> {
        if self.missing.contains(src) {
            return Err(CardError::MissingAsset(src.to_string()));
        }
        Ok(())
    }

    fn insert_reel(&mut self, frames: &[ReelFrame]) {
        self.effects.push(Effect::Reel(frames.to_vec()));
    }

    fn reel_width(&self) -> f32 {
        self.reel_width
    }

    fn translate_reel(&mut self, offset: f32) {
        self.reel_offset = Some(offset);
    }

    fn attach_audio(&mut self, track: &AudioTrack) -> CardResult<AudioHandle> {
        if self.missing.contains(&track.src) {
            return Err(CardError::MissingAsset(track.src.clone()));
        }
        self.effects.push(Effect::AudioAttached(track.clone()));
        Ok(AudioHandle(1))
    }

    fn play_audio(&mut self, handle: AudioHandle) -> CardResult<()> {
        if self.autoplay_blocked {
            return Err(CardError::PlaybackRejected {
                src: format!("audio#{}", handle.0),
                reason: "autoplay policy".into(),
            });
        }
        self.effects.push(Effect::AudioPlaying(handle));
        Ok(())
    }

    fn stop_audio(&mut self, handle: AudioHandle) {
        self.effects.push(Effect::AudioStopped(handle));
    }

    fn insert_letter(&mut self, letter: &Letter) {
        self.effects.push(Effect::Letter(letter.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_stage_reports_missing_assets_under_root() {
        let root = std::env::temp_dir();
        let mut stage = LogStage::new().with_assets(&root).unwrap();
        let err = stage.load_image("definitely/not/here.png").unwrap_err();
        assert!(matches!(err, CardError::MissingAsset(_)));
        assert!(stage.load_image("https://placehold.co/400x300").is_ok());
    }

    #[test]
    fn log_stage_without_root_trusts_everything() {
        let mut stage = LogStage::new();
        assert!(stage.load_image("assets/1.png").is_ok());
    }

    #[test]
    fn log_stage_width_follows_frame_count() {
        let mut stage = LogStage::new();
        let frame = ReelFrame {
            kind: MediaKind::Image,
            src: "a".into(),
            caption: "c".into(),
            rating: "r".into(),
            focus_y: None,
        };
        stage.insert_reel(&vec![frame; 4]);
        assert_eq!(stage.reel_width(), 1280.0);
    }
}
