//! # stm-midi
//!
//! MIDI side of soundtomidi: addresses extractor decisions on a channel and a
//! sysex prefix, sends them through midir, echoes them as text, and decodes
//! them back on the receiving end.

pub mod decode;
pub mod echo;
pub mod error;
pub mod monitor;
pub mod processor;
pub mod transport;

pub use decode::{FeatureDecoder, FeatureReading};
pub use error::MidiError;
pub use processor::MidiProcessor;
pub use transport::{MidiTransport, MidirOutput};
