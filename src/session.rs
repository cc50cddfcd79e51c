//! Per-frame driver: camera → tracker → proximity, microphone → audio level,
//! both into the event queue, then the machine and the celebration.

use log::{error, info, warn};
use rand::{SeedableRng, rngs::StdRng};
use std::time::Duration;

use crate::audio::AudioLevelEvaluator;
use crate::celebration::CelebrationSequencer;
use crate::config::{FFT_SIZE, Manifest, Platform};
use crate::input::{CameraRequest, MediaDevices, MediaSession};
use crate::machine::{CakeState, EventQueue, InteractionMachine, PresentationState, Transition};
use crate::proximity::{Layout, ProximityEvaluator};
use crate::scheduler::{CancelToken, Clock};
use crate::stage::Stage;
use crate::tracker::{DetectorOptions, GestureTracker, HandDetector};

pub const CAMERA_ALERT: &str = "Could not access webcam. Please allow camera permissions.";

#[derive(Debug, Clone)]
pub struct CardOptions {
    pub platform: Platform,
    pub layout: Layout,
    /// Fixed seed for the decorative randomness; entropy when `None`.
    pub seed: Option<u64>,
}

impl Default for CardOptions {
    fn default() -> Self {
        Self {
            platform: Platform::Desktop,
            layout: Layout::default(),
            seed: None,
        }
    }
}

pub struct Card<S: Stage> {
    platform: Platform,
    manifest: Manifest,
    clock: Box<dyn Clock>,
    devices: Box<dyn MediaDevices>,
    detector: Box<dyn HandDetector>,
    stage: S,
    media: MediaSession,
    tracker: GestureTracker,
    proximity: ProximityEvaluator,
    audio: Option<AudioLevelEvaluator>,
    mic_requested: bool,
    machine: InteractionMachine,
    queue: EventQueue,
    celebration: CelebrationSequencer,
    history: Vec<(Transition, Duration)>,
}

impl<S: Stage> Card<S> {
    pub fn new(
        options: CardOptions,
        manifest: Manifest,
        clock: Box<dyn Clock>,
        devices: Box<dyn MediaDevices>,
        detector: Box<dyn HandDetector>,
        stage: S,
    ) -> Self {
        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            platform: options.platform,
            celebration: CelebrationSequencer::new(manifest.clone(), rng),
            manifest,
            clock,
            devices,
            detector,
            stage,
            media: MediaSession::new(),
            tracker: GestureTracker::new(),
            proximity: ProximityEvaluator::new(options.layout),
            audio: None,
            mic_requested: false,
            machine: InteractionMachine::new(),
            queue: EventQueue::default(),
            history: Vec::new(),
        }
    }

    /// Page load: warm the reel images, park the match, acquire media.
    pub fn start(&mut self) {
        for src in self.manifest.preload_sources() {
            if let Err(e) = self.stage.load_image(src) {
                warn!("preload: {e}");
            }
        }
        self.stage.move_match(self.proximity.position());

        let request = CameraRequest::for_platform(self.platform);
        match self.devices.open_camera(&request) {
            Ok(cam) => {
                self.detector
                    .configure(&DetectorOptions::for_platform(self.platform));
                self.media.attach_camera(cam);
                info!(
                    "camera: {}x{} {:?}",
                    request.width, request.height, request.facing
                );
            }
            Err(e) => {
                error!("error accessing webcam: {e}");
                self.stage.alert(CAMERA_ALERT);
            }
        }

        if !self.platform.mic_needs_gesture() {
            self.enable_microphone();
        }
    }

    /// First tap/click on the page. Mobile needs it before the microphone.
    pub fn user_gesture(&mut self) {
        if !self.mic_requested {
            self.enable_microphone();
        }
    }

    fn enable_microphone(&mut self) {
        self.mic_requested = true;
        match self.devices.open_microphone(FFT_SIZE) {
            Ok(mic) => {
                self.media.attach_microphone(mic);
                self.audio = Some(AudioLevelEvaluator::new(CancelToken::new()));
                info!("microphone: blow detection active");
            }
            Err(e) => error!("error accessing microphone: {e}"),
        }
    }

    pub fn set_hover(&mut self, hovering: bool) {
        self.celebration.set_hover(hovering);
    }

    /// One rendered frame.
    pub fn tick(&mut self) {
        let now = self.clock.now();

        if let Some(cam) = self.media.camera() {
            if let Some(frame) = cam.next_frame() {
                let sample = self.tracker.process(self.detector.as_mut(), &frame);
                if let Some(pos) = self.proximity.evaluate(
                    self.tracker.hand_detected(),
                    sample,
                    self.machine.cake(),
                    &mut self.queue,
                ) {
                    self.stage.move_match(pos);
                }
            }
        }

        if let (Some(audio), Some(mic)) = (self.audio.as_mut(), self.media.microphone()) {
            audio.tick(mic, self.machine.cake(), &mut self.queue);
        }

        for t in self.machine.drain(&mut self.queue, &mut self.stage) {
            self.history.push((t, now));
            if t == Transition::BlownOut {
                if let Some(audio) = self.audio.as_ref() {
                    audio.token().cancel();
                }
                self.celebration
                    .start(now, &mut self.stage, &mut self.machine);
            }
        }

        self.celebration
            .tick(now, &mut self.stage, &mut self.machine);
    }

    /// Stops the frame loops and hands the camera and microphone back.
    pub fn shutdown(&mut self) {
        if let Some(audio) = self.audio.take() {
            audio.token().cancel();
        }
        self.media.release();
    }

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    pub fn cake(&self) -> CakeState {
        self.machine.cake()
    }

    pub fn presentation(&self) -> PresentationState {
        self.machine.presentation()
    }

    pub fn is_finished(&self) -> bool {
        self.celebration.is_finished()
    }

    pub fn history(&self) -> &[(Transition, Duration)] {
        &self.history
    }

    pub fn blow_detection_active(&self) -> bool {
        self.audio.as_ref().is_some_and(|a| a.is_active())
    }

    pub fn has_camera(&self) -> bool {
        self.media.has_camera()
    }

    #[cfg(test)]
    pub fn stage(&self) -> &S {
        &self.stage
    }

    #[cfg(test)]
    pub fn tracker(&self) -> &GestureTracker {
        &self.tracker
    }

    #[cfg(test)]
    pub fn proximity(&self) -> &ProximityEvaluator {
        &self.proximity
    }

    pub fn celebration(&self) -> &CelebrationSequencer {
        &self.celebration
    }
}
