//! The celebration that follows the blow-out.
//!
//! Each phase is armed on the scheduler relative to the one before it and
//! then left alone; nothing awaits anything. Side bursts and the top shower
//! overlap, the quiet ending comes a flat second later, and the reel and the
//! letter chain off the quiet ending.

use log::{debug, info, warn};
use rand::{Rng, rngs::StdRng};
use serde::Serialize;
use std::time::Duration;

use crate::config::{
    FIREFLY_COUNT, LETTER_DELAY, Manifest, QUIET_ENDING_DELAY, REEL_DELAY, REEL_DURATION,
    REEL_FADE_OUT, REEL_SETTLE, SIDE_BURST_WINDOW, TOP_SHOWER_PIECES, TOP_SHOWER_SPREAD,
};
use crate::machine::{InteractionMachine, PresentationState};
use crate::reel::{ReelSession, build_strip};
use crate::scheduler::Scheduler;
use crate::stage::{Burst, Element, Fade, Firefly, Stage};

const SIDE_COLORS: [&str; 5] = ["#ff6f91", "#ffc75f", "#845ec2", "#4d96ff", "#00c9a7"];
const SHOWER_COLORS: [&str; 6] = ["#ff595e", "#ffca3a", "#8ac926", "#1982c4", "#6a4c93", "#f72585"];

/// Timeline markers, recorded when each phase actually begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    SideBursts,
    TopShower,
    QuietEnding,
    OverlayVisible,
    ReelBuilt,
    ReelRevealed,
    ReelMoving,
    ReelEnded,
    ReelRemoved,
    LetterShown,
}

#[derive(Debug)]
enum Cue {
    ShowerPiece(Burst),
    QuietEnding,
    OverlayDisplay,
    OverlayFadeIn,
    StartReel,
    RevealReel,
    MeasureReel,
    EndSequence,
    RemoveReel,
    ShowLetter,
    FadeInLetter,
}

fn side_burst(angle: f32, origin_x: f32) -> Burst {
    Burst {
        particle_count: 6,
        angle,
        spread: 70.0,
        start_velocity: 35.0,
        gravity: None,
        ticks: None,
        scalar: None,
        origin: (origin_x, 0.5),
        colors: SIDE_COLORS.to_vec(),
    }
}

fn shower_piece(rng: &mut StdRng) -> Burst {
    Burst {
        particle_count: 1,
        angle: 80.0 + rng.gen_range(0.0..20.0),
        spread: 45.0,
        start_velocity: 14.0 + rng.gen_range(0.0..20.0),
        gravity: Some(0.45 + rng.gen_range(0.0..0.15)),
        ticks: Some(650 + rng.gen_range(0..200)),
        scalar: Some(1.1 + rng.gen_range(0.0..0.4)),
        origin: (rng.gen_range(0.0..1.0), -rng.gen_range(0.0..0.6)),
        colors: vec![SHOWER_COLORS[rng.gen_range(0..SHOWER_COLORS.len())]],
    }
}

fn fireflies(rng: &mut StdRng) -> Vec<Firefly> {
    (0..FIREFLY_COUNT)
        .map(|_| Firefly {
            left_pct: rng.gen_range(0.0..100.0),
            top_pct: rng.gen_range(0.0..100.0),
            delay: Duration::from_secs_f32(rng.gen_range(0.0..5.0)),
            duration: Duration::from_secs_f32(rng.gen_range(4.0..7.0)),
        })
        .collect()
}

pub struct CelebrationSequencer {
    manifest: Manifest,
    rng: StdRng,
    cues: Scheduler<Cue>,
    started: bool,
    side_bursts_until: Option<Duration>,
    last_side_burst: Duration,
    reel: Option<ReelSession>,
    marks: Vec<(Phase, Duration)>,
}

impl CelebrationSequencer {
    pub fn new(manifest: Manifest, rng: StdRng) -> Self {
        Self {
            manifest,
            rng,
            cues: Scheduler::new(),
            started: false,
            side_bursts_until: None,
            last_side_burst: Duration::ZERO,
            reel: None,
            marks: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Nothing left to fire.
    pub fn is_finished(&self) -> bool {
        self.started && self.cues.is_idle() && self.reel.is_none() && !self.bursting()
    }

    pub fn marks(&self) -> &[(Phase, Duration)] {
        &self.marks
    }

    pub fn mark_of(&self, phase: Phase) -> Option<Duration> {
        self.marks.iter().find(|(p, _)| *p == phase).map(|(_, t)| *t)
    }

    #[cfg(test)]
    pub fn reel(&self) -> Option<&ReelSession> {
        self.reel.as_ref()
    }

    pub fn set_hover(&mut self, hovering: bool) {
        if let Some(reel) = self.reel.as_mut() {
            reel.set_hover(hovering);
        }
    }

    fn bursting(&self) -> bool {
        self.side_bursts_until.is_some()
    }

    fn mark(&mut self, phase: Phase, at: Duration) {
        debug!("celebration: {phase:?} at {:.3}s", at.as_secs_f32());
        self.marks.push((phase, at));
    }

    /// Kicks off the pipeline at the blow-out moment. Only the first call counts.
    pub fn start(&mut self, now: Duration, stage: &mut dyn Stage, machine: &mut InteractionMachine) {
        if self.started {
            return;
        }
        self.started = true;
        machine.advance_presentation(PresentationState::Celebrating);
        info!("celebration: started");

        self.side_bursts_until = Some(now + SIDE_BURST_WINDOW);
        self.mark(Phase::SideBursts, now);
        self.fire_side_bursts(now, stage);

        for _ in 0..TOP_SHOWER_PIECES {
            let delay = TOP_SHOWER_SPREAD.mul_f32(self.rng.gen_range(0.0..1.0));
            let piece = shower_piece(&mut self.rng);
            self.cues.after(now, delay, Cue::ShowerPiece(piece));
        }
        self.mark(Phase::TopShower, now);

        self.cues.after(now, QUIET_ENDING_DELAY, Cue::QuietEnding);
    }

    /// One animation frame.
    pub fn tick(&mut self, now: Duration, stage: &mut dyn Stage, machine: &mut InteractionMachine) {
        if !self.started {
            return;
        }
        // Callbacks queued while handling this frame belong to the next one.
        let frame_cues = self.cues.take_frame_callbacks();

        while let Some((due, cue)) = self.cues.pop_due(now) {
            self.handle(cue, due, stage, machine);
        }
        for cue in frame_cues {
            self.handle(cue, now, stage, machine);
        }

        // One pair per frame. The frame that crosses the deadline still fires.
        if let Some(until) = self.side_bursts_until {
            if now > self.last_side_burst {
                self.fire_side_bursts(now, stage);
                if now >= until {
                    self.side_bursts_until = None;
                }
            }
        }

        if let Some(reel) = self.reel.as_mut() {
            reel.frame(now, stage);
        }
    }

    fn fire_side_bursts(&mut self, now: Duration, stage: &mut dyn Stage) {
        self.last_side_burst = now;
        stage.confetti(&side_burst(60.0, 0.0));
        stage.confetti(&side_burst(120.0, 1.0));
    }

    fn handle(&mut self, cue: Cue, at: Duration, stage: &mut dyn Stage, machine: &mut InteractionMachine) {
        match cue {
            Cue::ShowerPiece(burst) => stage.confetti(&burst),

            Cue::QuietEnding => {
                self.mark(Phase::QuietEnding, at);
                let flies = fireflies(&mut self.rng);
                stage.insert_overlay(&self.manifest.title, &flies);
                self.cues.next_frame(Cue::OverlayDisplay);
            }
            Cue::OverlayDisplay => {
                stage.show(Element::Overlay);
                self.cues.next_frame(Cue::OverlayFadeIn);
            }
            Cue::OverlayFadeIn => {
                self.mark(Phase::OverlayVisible, at);
                stage.fade(Element::Overlay, Fade::to(1.0));
                stage.fade(Element::Title, Fade::to(1.0));
                self.cues.after(at, REEL_DELAY, Cue::StartReel);
            }

            Cue::StartReel => {
                self.mark(Phase::ReelBuilt, at);
                let strip = build_strip(&self.manifest.moments, &self.manifest.placeholder, stage);
                stage.insert_reel(&strip);
                stage.fade(Element::Reel, Fade::to(0.0).scaled(0.9));

                let audio = match stage.attach_audio(&self.manifest.audio) {
                    Ok(h) => Some(h),
                    Err(e) => {
                        warn!("reel audio unavailable: {e}");
                        None
                    }
                };
                self.reel = Some(ReelSession::new(audio));
                self.cues.after(at, REEL_SETTLE, Cue::RevealReel);
            }
            Cue::RevealReel => {
                self.mark(Phase::ReelRevealed, at);
                stage.fade(
                    Element::Reel,
                    Fade::to(1.0).scaled(1.0).over(Duration::from_millis(1500)),
                );
                let audio = self.reel.as_ref().and_then(|r| r.audio());
                if let Some(h) = audio {
                    if let Err(e) = stage.play_audio(h) {
                        warn!("autoplay blocked for reel audio: {e}");
                    }
                }
                self.cues.next_frame(Cue::MeasureReel);
            }
            Cue::MeasureReel => {
                let width = stage.reel_width();
                if let Some(reel) = self.reel.as_mut() {
                    reel.measure(width);
                }
                self.mark(Phase::ReelMoving, at);
                machine.advance_presentation(PresentationState::ReelPlaying);
                self.cues.after(at, REEL_DURATION, Cue::EndSequence);
            }

            Cue::EndSequence => {
                self.mark(Phase::ReelEnded, at);
                if let Some(mut reel) = self.reel.take() {
                    reel.token().cancel();
                    if let Some(h) = reel.take_audio() {
                        stage.stop_audio(h);
                    }
                }
                stage.fade(Element::Reel, Fade::to(0.0).over(REEL_FADE_OUT));
                self.cues.after(at, REEL_FADE_OUT, Cue::RemoveReel);

                stage.fade(Element::Title, Fade::to(0.0));
                stage.insert_letter(&self.manifest.letter);
                self.cues.after(at, LETTER_DELAY, Cue::ShowLetter);
                machine.advance_presentation(PresentationState::Ended);
            }
            Cue::RemoveReel => {
                self.mark(Phase::ReelRemoved, at);
                stage.remove(Element::Reel);
            }
            Cue::ShowLetter => {
                stage.show(Element::Letter);
                self.cues.next_frame(Cue::FadeInLetter);
            }
            Cue::FadeInLetter => {
                self.mark(Phase::LetterShown, at);
                stage.fade(Element::Letter, Fade::to(1.0));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{Clock, ManualClock};
    use crate::stage::{Effect, RecordingStage};
    use rand::SeedableRng;

    const FRAME: Duration = Duration::from_millis(16);

    fn sequencer() -> CelebrationSequencer {
        CelebrationSequencer::new(Manifest::builtin().unwrap(), StdRng::seed_from_u64(7))
    }

    fn run_until(
        seq: &mut CelebrationSequencer,
        clock: &ManualClock,
        stage: &mut RecordingStage,
        machine: &mut InteractionMachine,
        limit: Duration,
    ) {
        while clock.now() < limit && !seq.is_finished() {
            clock.advance(FRAME);
            seq.tick(clock.now(), stage, machine);
        }
    }

    #[test]
    fn shower_has_22_single_particles_within_a_second() {
        let clock = ManualClock::new();
        let mut stage = RecordingStage::default();
        let mut machine = InteractionMachine::new();
        let mut seq = sequencer();
        seq.start(clock.now(), &mut stage, &mut machine);
        run_until(&mut seq, &clock, &mut stage, &mut machine, Duration::from_millis(1000));

        let singles = stage.count(|e| matches!(e, Effect::Confetti(b) if b.particle_count == 1));
        assert_eq!(singles, 22);
        let all_in_range = stage.effects.iter().all(|e| match e {
            Effect::Confetti(b) if b.particle_count == 1 => {
                (14.0..34.0).contains(&b.start_velocity)
                    && (80.0..100.0).contains(&b.angle)
                    && b.colors.len() == 1
                    && b.origin.1 <= 0.0
                    && b.origin.1 > -0.6
            }
            _ => true,
        });
        assert!(all_in_range);
    }

    #[test]
    fn side_bursts_stop_after_window() {
        let clock = ManualClock::new();
        let mut stage = RecordingStage::default();
        let mut machine = InteractionMachine::new();
        let mut seq = sequencer();
        seq.start(clock.now(), &mut stage, &mut machine);
        run_until(&mut seq, &clock, &mut stage, &mut machine, Duration::from_secs(4));

        let sides = stage.count(|e| matches!(e, Effect::Confetti(b) if b.particle_count == 6));
        // initial pair, one per 16ms frame up to 2.5s, and the frame crossing it
        assert_eq!(sides, 2 * (1 + 156 + 1));
        assert!(!seq.bursting());
    }

    #[test]
    fn full_timeline_offsets() {
        let clock = ManualClock::new();
        let mut stage = RecordingStage {
            reel_width: 3840.0,
            ..RecordingStage::default()
        };
        let mut machine = InteractionMachine::new();
        let mut seq = sequencer();
        seq.start(clock.now(), &mut stage, &mut machine);
        run_until(&mut seq, &clock, &mut stage, &mut machine, Duration::from_secs(60));

        assert!(seq.is_finished());
        assert_eq!(machine.presentation(), PresentationState::Ended);

        let at = |p| seq.mark_of(p).unwrap();
        assert_eq!(at(Phase::QuietEnding), Duration::from_secs(1));
        let reveal = at(Phase::OverlayVisible) - at(Phase::QuietEnding);
        assert!(reveal >= FRAME * 2 && reveal < FRAME * 3);
        assert_eq!(at(Phase::ReelBuilt) - at(Phase::OverlayVisible), REEL_DELAY);
        assert_eq!(at(Phase::ReelRevealed) - at(Phase::ReelBuilt), REEL_SETTLE);
        assert_eq!(at(Phase::ReelEnded) - at(Phase::ReelMoving), REEL_DURATION);
        assert_eq!(at(Phase::ReelRemoved) - at(Phase::ReelEnded), REEL_FADE_OUT);
        assert!(at(Phase::LetterShown) - at(Phase::ReelEnded) >= LETTER_DELAY);
    }

    #[test]
    fn reel_audio_is_attached_played_and_stopped() {
        let clock = ManualClock::new();
        let mut stage = RecordingStage::default();
        let mut machine = InteractionMachine::new();
        let mut seq = sequencer();
        seq.start(clock.now(), &mut stage, &mut machine);
        run_until(&mut seq, &clock, &mut stage, &mut machine, Duration::from_secs(60));

        let audio: Vec<_> = stage
            .effects
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    Effect::AudioAttached(_) | Effect::AudioPlaying(_) | Effect::AudioStopped(_)
                )
            })
            .collect();
        assert_eq!(audio.len(), 3);
        assert!(matches!(audio[2], Effect::AudioStopped(_)));
    }

    #[test]
    fn stage_gets_the_whole_letter_and_track() {
        let clock = ManualClock::new();
        let mut stage = RecordingStage::default();
        let mut machine = InteractionMachine::new();
        let mut manifest = Manifest::builtin().unwrap();
        manifest.audio.looped = true;
        let letter = manifest.letter.clone();
        let track = manifest.audio.clone();
        let mut seq = CelebrationSequencer::new(manifest, StdRng::seed_from_u64(7));
        seq.start(clock.now(), &mut stage, &mut machine);
        run_until(&mut seq, &clock, &mut stage, &mut machine, Duration::from_secs(60));

        assert_eq!(stage.count(|e| *e == Effect::AudioAttached(track.clone())), 1);
        let shown = stage.effects.iter().find_map(|e| match e {
            Effect::Letter(l) => Some(l.clone()),
            _ => None,
        });
        assert_eq!(shown, Some(letter));
    }

    #[test]
    fn blocked_or_missing_audio_does_not_stall() {
        let clock = ManualClock::new();
        let mut stage = RecordingStage {
            autoplay_blocked: true,
            ..RecordingStage::default()
        };
        stage.missing.insert("assets/2.png".into());
        let mut machine = InteractionMachine::new();
        let mut seq = sequencer();
        seq.start(clock.now(), &mut stage, &mut machine);
        run_until(&mut seq, &clock, &mut stage, &mut machine, Duration::from_secs(60));

        assert!(seq.mark_of(Phase::LetterShown).is_some());
        assert_eq!(stage.count(|e| matches!(e, Effect::AudioPlaying(_))), 0);
        let reel = stage.effects.iter().find_map(|e| match e {
            Effect::Reel(frames) => Some(frames.clone()),
            _ => None,
        });
        let frames = reel.unwrap();
        assert_eq!(frames.len(), 12);
        assert_eq!(frames[1].src, Manifest::builtin().unwrap().placeholder);
    }

    #[test]
    fn tick_on_the_start_frame_adds_no_second_pair() {
        let mut stage = RecordingStage::default();
        let mut machine = InteractionMachine::new();
        let mut seq = sequencer();
        let t0 = Duration::from_millis(500);
        seq.start(t0, &mut stage, &mut machine);
        seq.tick(t0, &mut stage, &mut machine);
        let sides = |s: &RecordingStage| {
            s.count(|e| matches!(e, Effect::Confetti(b) if b.particle_count == 6))
        };
        assert_eq!(sides(&stage), 2);
        seq.tick(t0 + FRAME, &mut stage, &mut machine);
        assert_eq!(sides(&stage), 4);
    }

    #[test]
    fn start_is_idempotent() {
        let mut stage = RecordingStage::default();
        let mut machine = InteractionMachine::new();
        let mut seq = sequencer();
        seq.start(Duration::ZERO, &mut stage, &mut machine);
        let after_first = stage.effects.len();
        seq.start(Duration::ZERO, &mut stage, &mut machine);
        assert_eq!(stage.effects.len(), after_first);
    }

    #[test]
    fn overlay_reveal_is_two_step() {
        let clock = ManualClock::new();
        let mut stage = RecordingStage::default();
        let mut machine = InteractionMachine::new();
        let mut seq = sequencer();
        seq.start(clock.now(), &mut stage, &mut machine);
        run_until(&mut seq, &clock, &mut stage, &mut machine, Duration::from_millis(1100));

        let overlay = stage
            .effects
            .iter()
            .position(|e| matches!(e, Effect::Overlay { fireflies: 20, .. }))
            .unwrap();
        let shown = stage
            .effects
            .iter()
            .position(|e| *e == Effect::Show(Element::Overlay))
            .unwrap();
        let faded = stage
            .effects
            .iter()
            .position(|e| matches!(e, Effect::Fade(Element::Overlay, f) if f.opacity == 1.0))
            .unwrap();
        assert!(overlay < shown && shown < faded);
    }
}
