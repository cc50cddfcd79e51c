//! Camera and microphone acquisition, held for the lifetime of a session.

use log::info;

use crate::config::Platform;
use crate::error::CardResult;
use crate::tracker::VideoFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraRequest {
    pub width: u32,
    pub height: u32,
    pub facing: Facing,
}

impl CameraRequest {
    pub fn for_platform(platform: Platform) -> Self {
        let (width, height) = platform.camera_resolution();
        Self {
            width,
            height,
            facing: Facing::User,
        }
    }
}

pub trait CameraStream {
    /// The next frame, if one is ready.
    fn next_frame(&mut self) -> Option<VideoFrame>;
    fn stop(&mut self) {}
}

pub trait Microphone {
    /// Fill `bins` with byte-scaled frequency magnitudes.
    fn frequency_data(&mut self, bins: &mut [u8]);
    fn close(&mut self) {}
}

pub trait MediaDevices {
    fn open_camera(&mut self, request: &CameraRequest) -> CardResult<Box<dyn CameraStream>>;
    fn open_microphone(&mut self, fft_size: usize) -> CardResult<Box<dyn Microphone>>;
}

/// Owns whatever media the session acquired; releases it on drop.
#[derive(Default)]
pub struct MediaSession {
    camera: Option<Box<dyn CameraStream>>,
    microphone: Option<Box<dyn Microphone>>,
}

impl MediaSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach_camera(&mut self, camera: Box<dyn CameraStream>) {
        if let Some(mut old) = self.camera.replace(camera) {
            old.stop();
        }
    }

    pub fn attach_microphone(&mut self, mic: Box<dyn Microphone>) {
        if let Some(mut old) = self.microphone.replace(mic) {
            old.close();
        }
    }

    pub fn camera(&mut self) -> Option<&mut (dyn CameraStream + 'static)> {
        self.camera.as_deref_mut()
    }

    pub fn microphone(&mut self) -> Option<&mut (dyn Microphone + 'static)> {
        self.microphone.as_deref_mut()
    }

    pub fn has_camera(&self) -> bool {
        self.camera.is_some()
    }

    pub fn release(&mut self) {
        if let Some(mut cam) = self.camera.take() {
            cam.stop();
            info!("media: camera released");
        }
        if let Some(mut mic) = self.microphone.take() {
            mic.close();
            info!("media: microphone released");
        }
    }
}

impl Drop for MediaSession {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::Cell, rc::Rc};

    struct Cam(Rc<Cell<u32>>);

    impl CameraStream for Cam {
        fn next_frame(&mut self) -> Option<VideoFrame> {
            None
        }
        fn stop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    struct Mic(Rc<Cell<u32>>);

    impl Microphone for Mic {
        fn frequency_data(&mut self, bins: &mut [u8]) {
            bins.fill(0);
        }
        fn close(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn drop_releases_both_streams_once() {
        let stops = Rc::new(Cell::new(0));
        let closes = Rc::new(Cell::new(0));
        {
            let mut s = MediaSession::new();
            s.attach_camera(Box::new(Cam(stops.clone())));
            s.attach_microphone(Box::new(Mic(closes.clone())));
            s.release();
            assert!(!s.has_camera());
        }
        assert_eq!(stops.get(), 1);
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn replacing_a_camera_stops_the_old_one() {
        let stops = Rc::new(Cell::new(0));
        let mut s = MediaSession::new();
        s.attach_camera(Box::new(Cam(stops.clone())));
        s.attach_camera(Box::new(Cam(stops.clone())));
        assert_eq!(stops.get(), 1);
        drop(s);
        assert_eq!(stops.get(), 2);
    }

    #[test]
    fn request_faces_the_user() {
        let r = CameraRequest::for_platform(Platform::Mobile);
        assert_eq!((r.width, r.height, r.facing), (240, 180, Facing::User));
    }
}
