/// Configuration, MIDI types, and decision policies for soundtomidi.
///
/// This crate contains all shared types, traits, and configuration logic
/// used across the soundtomidi workspace. It has no audio or device code.

pub mod config;
pub mod encode;
pub mod error;
pub mod midi;
pub mod policy;
pub mod traits;

pub use config::Settings;
pub use encode::{BpmEncoding, MidiEncoder};
pub use error::CoreError;
pub use midi::MidiEvent;
pub use traits::{FeatureExtractor, MidiSink, RecordingSink};
