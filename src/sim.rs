//! Simulated camera, microphone and detector, plus a script format for
//! replaying a session frame by frame.

use anyhow::{Result, anyhow};
use log::{debug, info};
use serde::Deserialize;
use std::{
    cell::RefCell,
    path::Path,
    rc::Rc,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use crate::error::{CardError, CardResult};
use crate::input::{CameraRequest, CameraStream, MediaDevices, Microphone};
use crate::machine::{CakeState, PresentationState, Transition};
use crate::proximity::Layout;
use crate::scheduler::ManualClock;
use crate::session::Card;
use crate::stage::Stage;
use crate::tracker::{DetectorOptions, Hand, HandDetector, INDEX_FINGER_TIP, Landmark, VideoFrame};

/// What the simulated world looks like right now.
#[derive(Debug, Clone, Default)]
pub struct SimInput {
    /// Raw (unmirrored) fingertip position, if a hand is in view.
    pub hand: Option<(f32, f32)>,
    /// Level written into every frequency bin.
    pub level: u8,
    pub detector_error: bool,
}

pub struct SimDevices {
    input: Rc<RefCell<SimInput>>,
    pub camera_ok: bool,
    pub microphone_ok: bool,
}

impl SimDevices {
    pub fn new(input: Rc<RefCell<SimInput>>) -> Self {
        Self {
            input,
            camera_ok: true,
            microphone_ok: true,
        }
    }
}

impl MediaDevices for SimDevices {
    fn open_camera(&mut self, request: &CameraRequest) -> CardResult<Box<dyn CameraStream>> {
        if !self.camera_ok {
            return Err(CardError::CameraUnavailable("permission denied".into()));
        }
        debug!("sim camera {}x{}", request.width, request.height);
        Ok(Box::new(SimCamera { seq: 0 }))
    }

    fn open_microphone(&mut self, _fft_size: usize) -> CardResult<Box<dyn Microphone>> {
        if !self.microphone_ok {
            return Err(CardError::MicrophoneUnavailable("permission denied".into()));
        }
        Ok(Box::new(SimMicrophone {
            input: self.input.clone(),
        }))
    }
}

struct SimCamera {
    seq: u64,
}

impl CameraStream for SimCamera {
    fn next_frame(&mut self) -> Option<VideoFrame> {
        self.seq += 1;
        Some(VideoFrame {
            seq: self.seq,
        })
    }

    fn stop(&mut self) {
        debug!("sim camera stopped after {} frames", self.seq);
    }
}

struct SimMicrophone {
    input: Rc<RefCell<SimInput>>,
}

impl Microphone for SimMicrophone {
    fn frequency_data(&mut self, bins: &mut [u8]) {
        bins.fill(self.input.borrow().level);
    }
}

pub struct SimDetector {
    input: Rc<RefCell<SimInput>>,
}

impl SimDetector {
    pub fn new(input: Rc<RefCell<SimInput>>) -> Self {
        Self { input }
    }
}

impl HandDetector for SimDetector {
    fn configure(&mut self, options: &DetectorOptions) {
        debug!(
            "sim detector: {} hand(s), complexity {}, detect {:.1} track {:.1}",
            options.max_hands,
            options.model_complexity,
            options.min_detection_confidence,
            options.min_tracking_confidence
        );
    }

    fn detect(&mut self, _frame: &VideoFrame) -> CardResult<Vec<Hand>> {
        let input = self.input.borrow();
        if input.detector_error {
            return Err(CardError::Detector("simulated failure".into()));
        }
        Ok(input
            .hand
            .map(|(x, y)| {
                let mut landmarks = vec![Landmark::default(); 21];
                landmarks[INDEX_FINGER_TIP] = Landmark { x, y };
                vec![Hand { landmarks }]
            })
            .unwrap_or_default())
    }
}

// --------- scripts ----------

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Step {
    pub at_ms: u64,
    #[serde(default)]
    pub hand: Option<[f32; 2]>,
    #[serde(default)]
    pub no_hand: bool,
    #[serde(default)]
    pub volume: Option<u8>,
    #[serde(default)]
    pub hover: Option<bool>,
    #[serde(default)]
    pub click: bool,
    #[serde(default)]
    pub detector_error: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    #[serde(default = "default_frame_ms")]
    pub frame_ms: u64,
    #[serde(default = "default_true")]
    pub camera: bool,
    #[serde(default = "default_true")]
    pub microphone: bool,
    #[serde(default)]
    pub layout: Option<Layout>,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

fn default_frame_ms() -> u64 {
    16
}

fn default_true() -> bool {
    true
}

impl Script {
    pub fn parse(text: &str) -> Result<Self> {
        let mut s: Script = toml::from_str(text)?;
        if s.frame_ms == 0 {
            return Err(anyhow!("frame_ms must be positive"));
        }
        s.steps.sort_by_key(|st| st.at_ms);
        Ok(s)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let txt = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
        Self::parse(&txt).map_err(|e| anyhow!("failed to parse {}: {e}", path.display()))
    }

    /// A hand drifts in to the candles, waits, then a loud breath. Assumes the
    /// default layout, where raw (0.5, 0.5) lands on the candle anchor.
    pub fn demo() -> Self {
        let mut steps = vec![Step {
            at_ms: 0,
            volume: Some(12),
            ..Step::default()
        }];
        let (from, to) = ((0.9f32, 0.85f32), (0.5f32, 0.5f32));
        let n = 40u64;
        for i in 0..=n {
            let t = i as f32 / n as f32;
            steps.push(Step {
                at_ms: 500 + i * 25,
                hand: Some([from.0 + (to.0 - from.0) * t, from.1 + (to.1 - from.1) * t]),
                ..Step::default()
            });
        }
        steps.push(Step {
            at_ms: 2200,
            no_hand: true,
            ..Step::default()
        });
        steps.push(Step {
            at_ms: 3000,
            volume: Some(95),
            ..Step::default()
        });
        steps.push(Step {
            at_ms: 3200,
            volume: Some(10),
            ..Step::default()
        });
        Self {
            frame_ms: 16,
            camera: true,
            microphone: true,
            layout: None,
            steps,
        }
    }

    pub fn last_step_ms(&self) -> u64 {
        self.steps.last().map(|s| s.at_ms).unwrap_or(0)
    }
}

/// How the replay advances time.
pub enum Pacing {
    /// Jump a manual clock one frame per tick.
    Virtual(ManualClock),
    /// Sleep a frame between ticks; stop early when the flag is raised.
    Realtime(Arc<AtomicBool>),
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Summary {
    pub frames: u64,
    pub lit_at_ms: Option<u128>,
    pub blown_at_ms: Option<u128>,
    pub finished: bool,
    pub interrupted: bool,
    /// Camera acquired at startup.
    pub camera: bool,
    /// Blow detection ran on at least one frame.
    pub listened: bool,
    pub cake: CakeState,
    pub presentation: PresentationState,
}

/// After the last scripted step, give the celebration this long to finish.
const GRACE: Duration = Duration::from_secs(45);

pub fn replay<S: Stage>(
    script: &Script,
    input: &Rc<RefCell<SimInput>>,
    card: &mut Card<S>,
    pacing: &Pacing,
) -> Summary {
    let frame = Duration::from_millis(script.frame_ms);
    let deadline = Duration::from_millis(script.last_step_ms()) + GRACE;
    let mut next = 0usize;
    let mut frames = 0u64;
    let mut interrupted = false;
    let mut listened = false;

    card.start();
    let camera = card.has_camera();
    loop {
        match pacing {
            Pacing::Virtual(clock) => clock.advance(frame),
            Pacing::Realtime(stop) => {
                if stop.load(Ordering::Relaxed) {
                    interrupted = true;
                    break;
                }
                thread::sleep(frame);
            }
        }
        let now = card.now();

        while let Some(step) = script.steps.get(next) {
            if Duration::from_millis(step.at_ms) > now {
                break;
            }
            apply_step(step, input, card);
            next += 1;
        }

        listened |= card.blow_detection_active();
        card.tick();
        frames += 1;

        if card.is_finished() || now > deadline {
            break;
        }
    }
    card.shutdown();

    let at = |want: Transition| {
        card.history()
            .iter()
            .find(|(t, _)| *t == want)
            .map(|(_, d)| d.as_millis())
    };
    let summary = Summary {
        frames,
        lit_at_ms: at(Transition::Lit),
        blown_at_ms: at(Transition::BlownOut),
        finished: card.is_finished(),
        interrupted,
        camera,
        listened,
        cake: card.cake(),
        presentation: card.presentation(),
    };
    info!(
        "replay: {} frames, cake {:?}, presentation {:?}",
        frames,
        card.cake(),
        card.presentation()
    );
    summary
}

fn apply_step<S: Stage>(step: &Step, input: &Rc<RefCell<SimInput>>, card: &mut Card<S>) {
    {
        let mut inp = input.borrow_mut();
        if let Some([x, y]) = step.hand {
            inp.hand = Some((x, y));
        }
        if step.no_hand {
            inp.hand = None;
        }
        if let Some(v) = step.volume {
            inp.level = v;
        }
        if let Some(e) = step.detector_error {
            inp.detector_error = e;
        }
    }
    if step.click {
        card.user_gesture();
    }
    if let Some(h) = step.hover {
        card.set_hover(h);
    }
}

impl Summary {
    pub fn completed(&self) -> bool {
        self.finished
            && self.cake == CakeState::BlownOut
            && self.presentation == PresentationState::Ended
    }
}
