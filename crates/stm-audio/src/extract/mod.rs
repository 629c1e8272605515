//! The five feature extractors.
//!
//! Each one owns an [`AnalysisWindow`](crate::window::AnalysisWindow), calls
//! its engine when the window fills, runs its decision policy and hands the
//! result to a [`MidiSink`](stm_core::traits::MidiSink) through a
//! [`MidiEncoder`](stm_core::encode::MidiEncoder).

mod bands;
mod beat;
mod pitch;
mod rms;
mod tempo;

pub use bands::BandExtractor;
pub use beat::BeatExtractor;
pub use pitch::{NoteFilter, PitchExtractor};
pub use rms::{RmsExtractor, rms};
pub use tempo::{MAX_BPM, MIN_BPM, TempoExtractor, correct_octave};
