//! Fingertip → match cursor placement, and the match-to-candle lighting check.

use crate::config::{
    CANDLE_OFFSET_Y, INITIAL_MATCH_X, INITIAL_MATCH_Y, LIGHT_DISTANCE, MATCH_HEIGHT, MATCH_PADDING,
    MATCH_WIDTH,
};
use crate::machine::{CakeState, CardEvent, EventQueue};
use crate::tracker::FingertipSample;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn distance(self, other: Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Page-space rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Deserialize)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn center_x(&self) -> f32 {
        self.left + self.width / 2.0
    }
}

/// Where things sit on the page. The match is positioned inside `cake_area`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize)]
pub struct Layout {
    pub cake_area: Rect,
    pub cake_image: Rect,
    #[serde(default = "default_match_size")]
    pub match_size: (f32, f32),
}

fn default_match_size() -> (f32, f32) {
    (MATCH_WIDTH, MATCH_HEIGHT)
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            cake_area: Rect::new(0.0, 0.0, 500.0, 400.0),
            cake_image: Rect::new(150.0, 160.0, 200.0, 200.0),
            match_size: default_match_size(),
        }
    }
}

impl Layout {
    /// Fixed reference point just above the candles.
    pub fn candle_anchor(&self) -> Point {
        Point {
            x: self.cake_image.center_x(),
            y: self.cake_image.top + CANDLE_OFFSET_Y,
        }
    }

    /// Page-space tip of the match (horizontal centre, top edge).
    pub fn match_tip(&self, pos: MatchPosition) -> Point {
        Point {
            x: self.cake_area.left + pos.x + self.match_size.0 / 2.0,
            y: self.cake_area.top + pos.y,
        }
    }
}

/// Match offset (px) relative to the cake area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchPosition {
    pub x: f32,
    pub y: f32,
}

impl Default for MatchPosition {
    fn default() -> Self {
        Self {
            x: INITIAL_MATCH_X,
            y: INITIAL_MATCH_Y,
        }
    }
}

impl MatchPosition {
    /// Pure mapping from a fingertip sample into the padded container.
    pub fn from_sample(sample: FingertipSample, area: &Rect) -> Self {
        let sx = sample.x.clamp(0.0, 1.0);
        let sy = sample.y.clamp(0.0, 1.0);
        let pad = MATCH_PADDING;
        Self {
            x: pad + sx * (area.width - pad * 2.0 - MATCH_WIDTH),
            y: pad + sy * (area.height - pad * 2.0 - MATCH_HEIGHT),
        }
    }
}

#[derive(Debug)]
pub struct ProximityEvaluator {
    layout: Layout,
    position: MatchPosition,
}

impl ProximityEvaluator {
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            position: MatchPosition::default(),
        }
    }

    pub fn position(&self) -> MatchPosition {
        self.position
    }

    /// Repositions the match and queues a light event when the tip reaches
    /// the candles. Returns the new position, or `None` when nothing moved.
    pub fn evaluate(
        &mut self,
        hand_detected: bool,
        sample: Option<FingertipSample>,
        cake: CakeState,
        queue: &mut EventQueue,
    ) -> Option<MatchPosition> {
        if !hand_detected {
            return None;
        }
        let sample = sample?;
        self.position = MatchPosition::from_sample(sample, &self.layout.cake_area);

        if cake == CakeState::Unlit && self.within_reach() {
            queue.push(CardEvent::Light);
        }
        Some(self.position)
    }

    pub fn tip_distance(&self) -> f32 {
        self.layout
            .match_tip(self.position)
            .distance(self.layout.candle_anchor())
    }

    fn within_reach(&self) -> bool {
        self.tip_distance() < LIGHT_DISTANCE
    }
}
