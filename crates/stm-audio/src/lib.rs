// Audio capture, DSP engines, and feature extraction for soundtomidi.

pub mod capture;
pub mod decode;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod extract;
pub mod fft;
pub mod filterbank;
pub mod onset;
pub mod tempo;
pub mod window;
pub mod yin;

pub use dispatcher::{Dispatcher, FrameAssembler};
pub use error::AudioError;
