use anyhow::{Result, anyhow};
use directories::UserDirs;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::error::{CardError, CardResult};

// --------- fixed thresholds ----------

/// Mean frequency-bin level (0..=255) that counts as blowing.
pub const BLOW_THRESHOLD: f32 = 70.0;
/// Match-tip to candle distance (px) below which the cake lights.
pub const LIGHT_DISTANCE: f32 = 20.0;
/// Inset (px) of the match inside the cake area.
pub const MATCH_PADDING: f32 = 20.0;
/// Match element size (px); also the margins kept free at the far edges.
pub const MATCH_WIDTH: f32 = 40.0;
pub const MATCH_HEIGHT: f32 = 60.0;
/// Candle anchor sits this far below the top of the cake image.
pub const CANDLE_OFFSET_Y: f32 = 10.0;
pub const INITIAL_MATCH_X: f32 = 250.0;
pub const INITIAL_MATCH_Y: f32 = 120.0;
pub const FFT_SIZE: usize = 256;

// --------- celebration timing ----------

pub const SIDE_BURST_WINDOW: Duration = Duration::from_millis(2500);
pub const TOP_SHOWER_PIECES: usize = 22;
pub const TOP_SHOWER_SPREAD: Duration = Duration::from_millis(1000);
pub const QUIET_ENDING_DELAY: Duration = Duration::from_millis(1000);
pub const REEL_DELAY: Duration = Duration::from_millis(1500);
pub const REEL_SETTLE: Duration = Duration::from_millis(500);
pub const REEL_DURATION: Duration = Duration::from_secs(30);
pub const REEL_FADE_OUT: Duration = Duration::from_millis(2000);
pub const LETTER_DELAY: Duration = Duration::from_millis(1000);
pub const FIREFLY_COUNT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Platform {
    #[default]
    Desktop,
    Mobile,
}

impl Platform {
    /// Requested camera resolution (width, height).
    pub fn camera_resolution(self) -> (u32, u32) {
        match self {
            Platform::Desktop => (300, 225),
            Platform::Mobile => (240, 180),
        }
    }

    /// Mobile browsers only grant the microphone after a user gesture.
    pub fn mic_needs_gesture(self) -> bool {
        matches!(self, Platform::Mobile)
    }
}

// --------- content manifest ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Image,
    Video,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Moment {
    #[serde(default)]
    pub kind: MediaKind,
    pub src: String,
    pub caption: String,
    pub rating: String,
    /// Vertical object-position in percent, for portrait crops.
    #[serde(default)]
    pub focus_y: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AudioTrack {
    pub src: String,
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default)]
    pub looped: bool,
}

fn default_volume() -> f32 {
    0.75
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Letter {
    pub header: String,
    pub body: String,
    pub signoff: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Manifest {
    pub title: String,
    pub placeholder: String,
    pub audio: AudioTrack,
    pub letter: Letter,
    #[serde(rename = "moment")]
    pub moments: Vec<Moment>,
}

impl Manifest {
    pub fn parse(text: &str) -> CardResult<Self> {
        let m: Manifest = toml::from_str(text).map_err(|e| CardError::Manifest(e.to_string()))?;
        m.validate()?;
        Ok(m)
    }

    pub fn builtin() -> CardResult<Self> {
        Self::parse(default_manifest_text())
    }

    pub fn validate(&self) -> CardResult<()> {
        if self.moments.is_empty() {
            return Err(CardError::Manifest("at least one moment is required".into()));
        }
        for (i, m) in self.moments.iter().enumerate() {
            if m.src.trim().is_empty() {
                return Err(CardError::Manifest(format!("moment {i} has an empty src")));
            }
            if let Some(f) = m.focus_y {
                if f > 100 {
                    return Err(CardError::Manifest(format!(
                        "moment {i} focus_y must be a percentage, got {f}"
                    )));
                }
            }
        }
        if self.audio.src.trim().is_empty() {
            return Err(CardError::Manifest("audio.src is empty".into()));
        }
        if !(0.0..=1.0).contains(&self.audio.volume) {
            return Err(CardError::Manifest(format!(
                "audio.volume must be in [0,1], got {}",
                self.audio.volume
            )));
        }
        if self.placeholder.trim().is_empty() {
            return Err(CardError::Manifest("placeholder is empty".into()));
        }
        Ok(())
    }

    /// Image sources worth warming up before the reel starts.
    pub fn preload_sources(&self) -> Vec<&str> {
        self.moments
            .iter()
            .filter(|m| m.kind == MediaKind::Image)
            .map(|m| m.src.as_str())
            .collect()
    }
}

fn default_manifest_text() -> &'static str {
    include_str!("../content/default.toml")
}

fn config_dir() -> Result<PathBuf> {
    let dirs = UserDirs::new().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(dirs.home_dir().join(".config").join("cakectl"))
}

pub fn default_manifest_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("manifest.toml"))
}

/// Loads `path`, or the user manifest (installing the built-in one on first use).
pub fn load_manifest(path: Option<&Path>) -> Result<Manifest> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match install_default() {
            Ok(p) => p,
            Err(e) => {
                warn!("could not install default manifest ({e}); using built-in content");
                return Ok(Manifest::builtin()?);
            }
        },
    };
    let txt = fs::read_to_string(&path)
        .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
    let manifest =
        Manifest::parse(&txt).map_err(|e| anyhow!("failed to parse {}: {e}", path.display()))?;
    info!(
        "loaded manifest {} ({} moments)",
        path.display(),
        manifest.moments.len()
    );
    Ok(manifest)
}

fn install_default() -> Result<PathBuf> {
    let path = default_manifest_path()?;
    if !path.exists() {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, default_manifest_text())?;
        info!("installed default manifest at {}", path.display());
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
title = "Hi"
placeholder = "https://placehold.co/400x300"

[audio]
src = "a.mp3"

[letter]
header = "h"
body = "b"
signoff = "s"

[[moment]]
src = "1.png"
caption = "one"
rating = "10/10"
"#;

    #[test]
    fn builtin_manifest_is_valid() {
        let m = Manifest::builtin().unwrap();
        assert_eq!(m.moments.len(), 6);
        assert_eq!(m.audio.volume, 0.75);
        assert!(!m.audio.looped);
    }

    #[test]
    fn defaults_fill_in() {
        let m = Manifest::parse(MINIMAL).unwrap();
        assert_eq!(m.moments[0].kind, MediaKind::Image);
        assert_eq!(m.moments[0].focus_y, None);
        assert_eq!(m.audio.volume, 0.75);
        assert_eq!(m.preload_sources(), vec!["1.png"]);
    }

    #[test]
    fn rejects_empty_reel() {
        let head = MINIMAL.split("[[moment]]").next().unwrap();
        let txt = format!("moment = []\n{head}");
        let err = Manifest::parse(&txt).unwrap_err();
        assert!(matches!(err, CardError::Manifest(_)));
    }

    #[test]
    fn rejects_loud_volume() {
        let txt = MINIMAL.replace("src = \"a.mp3\"", "src = \"a.mp3\"\nvolume = 1.5");
        assert!(Manifest::parse(&txt).is_err());
    }

    #[test]
    fn platform_resolutions() {
        assert_eq!(Platform::Desktop.camera_resolution(), (300, 225));
        assert_eq!(Platform::Mobile.camera_resolution(), (240, 180));
        assert!(Platform::Mobile.mic_needs_gesture());
        assert!(!Platform::Desktop.mic_needs_gesture());
    }
}
