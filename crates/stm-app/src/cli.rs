use std::path::PathBuf;

use clap::{Args, Parser};
use stm_core::config::{
    BandLayout, EchoFormat, OnsetMethod, PitchAlgorithm, parse_assignment, parse_byte_list,
    parse_controller, parse_keyword, parse_tolerance,
};
use stm_core::{BpmEncoding, CoreError, Settings};

/// soundtomidi: live audio to MIDI control change and sysex.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Lister les entrées audio puis quitter.
    #[arg(long, default_value_t = false)]
    pub list_devices: bool,

    /// Lister les ports MIDI (sortie et entrée) puis quitter.
    #[arg(long, default_value_t = false)]
    pub list_ports: bool,

    /// Écrire un fichier de configuration avec les valeurs par défaut puis quitter.
    /// Un fichier existant est d'abord sauvegardé.
    #[arg(long, default_value_t = false)]
    pub write_config: bool,

    /// Fichier de configuration TOML.
    #[arg(short, long, default_value = "soundtomidi.toml")]
    pub config: PathBuf,

    /// Entrée audio, "default" pour celle du système.
    #[arg(long)]
    pub device: Option<String>,

    /// Nombre de canaux ouverts sur l'entrée (seul le premier est analysé).
    #[arg(long)]
    pub channels: Option<u16>,

    /// Fréquence d'échantillonnage en Hz.
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Échantillons par frame.
    #[arg(long)]
    pub frame_size: Option<usize>,

    /// Afficher chaque message envoyé.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub echo: Option<bool>,

    /// Format de l'affichage : verbose, bytes, bin, hex.
    #[arg(long, value_parser = parse_keyword::<EchoFormat>)]
    pub echo_format: Option<EchoFormat>,

    /// Ouvrir un port MIDI de sortie.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub midi: Option<bool>,

    /// Port MIDI de sortie, "default" pour le premier trouvé.
    #[arg(long)]
    pub port: Option<String>,

    /// Canal MIDI de sortie (1-16).
    #[arg(long)]
    pub channel: Option<u8>,

    /// Octets fabricant en tête de chaque sysex ("0x7D" ou "0 0x20 0x29").
    #[arg(long)]
    pub manufacturer: Option<String>,

    /// Insérer le canal après les octets fabricant.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub sysex_channel: Option<bool>,

    #[command(flatten, next_help_heading = "Beats")]
    pub beats: BeatArgs,

    #[command(flatten, next_help_heading = "Tempo")]
    pub tempo: TempoArgs,

    #[command(flatten, next_help_heading = "RMS")]
    pub rms: RmsArgs,

    #[command(flatten, next_help_heading = "Frequencies")]
    pub frequencies: FrequencyArgs,

    #[command(flatten, next_help_heading = "Pitch")]
    pub pitch: PitchArgs,

    /// Analyser un fichier audio au lieu de l'entrée live.
    #[arg(long, help_heading = "Modes")]
    pub file: Option<PathBuf>,

    /// Avec --file : cadencer les frames en temps réel.
    #[arg(long, default_value_t = false, help_heading = "Modes")]
    pub realtime: bool,

    /// Écouter un port MIDI d'entrée et afficher les valeurs décodées.
    #[arg(
        long,
        num_args = 0..=1,
        default_missing_value = "default",
        value_name = "PORT",
        help_heading = "Modes"
    )]
    pub monitor: Option<String>,

    /// Niveau de log : error, warn, info, debug, trace.
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

/// Overrides for the `[beats]` section.
#[derive(Args, Debug, Default)]
pub struct BeatArgs {
    /// Détection des temps.
    #[arg(long = "beats", num_args = 0..=1, default_missing_value = "true")]
    pub beats_enabled: Option<bool>,

    /// Fonction d'onset : hfc, specflux, energy.
    #[arg(long, value_parser = parse_keyword::<OnsetMethod>)]
    pub beats_algorithm: Option<OnsetMethod>,

    #[arg(long)]
    pub beats_frame_multiplier: Option<usize>,

    #[arg(long)]
    pub beats_hop_multiplier: Option<f32>,

    /// Numéro de contrôleur, ou false.
    #[arg(long)]
    pub beats_controller: Option<String>,

    /// Commande sysex, ou false.
    #[arg(long)]
    pub beats_sysex: Option<String>,

    /// Valeurs envoyées à tour de rôle ("0 1 2 3"), false pour un compteur.
    #[arg(long)]
    pub beats_sequence: Option<String>,
}

/// Overrides for the `[tempo]` section.
#[derive(Args, Debug, Default)]
pub struct TempoArgs {
    /// Estimation du tempo.
    #[arg(long = "tempo", num_args = 0..=1, default_missing_value = "true")]
    pub tempo_enabled: Option<bool>,

    /// Fonction d'onset : hfc, specflux, energy.
    #[arg(long, value_parser = parse_keyword::<OnsetMethod>)]
    pub tempo_algorithm: Option<OnsetMethod>,

    #[arg(long)]
    pub tempo_frame_multiplier: Option<usize>,

    #[arg(long)]
    pub tempo_hop_multiplier: Option<f32>,

    /// Nombre de mesures moyennées.
    #[arg(long)]
    pub tempo_average: Option<usize>,

    /// Envoyer toutes les N estimations.
    #[arg(long)]
    pub tempo_count: Option<usize>,

    /// Numéro de contrôleur, ou false.
    #[arg(long)]
    pub tempo_controller: Option<String>,

    /// Encodage du CC : minus60.
    #[arg(long, value_parser = parse_keyword::<BpmEncoding>)]
    pub tempo_control_encoding: Option<BpmEncoding>,

    /// Commande sysex, ou false.
    #[arg(long)]
    pub tempo_sysex: Option<String>,

    /// Encodage du sysex : minus60, twobytes.
    #[arg(long, value_parser = parse_keyword::<BpmEncoding>)]
    pub tempo_sysex_encoding: Option<BpmEncoding>,
}

/// Overrides for the `[rms]` section.
#[derive(Args, Debug, Default)]
pub struct RmsArgs {
    /// Niveau RMS.
    #[arg(long = "rms", num_args = 0..=1, default_missing_value = "true")]
    pub rms_enabled: Option<bool>,

    #[arg(long)]
    pub rms_frame_multiplier: Option<usize>,

    #[arg(long)]
    pub rms_hop_multiplier: Option<f32>,

    /// Numéro de contrôleur, ou false.
    #[arg(long)]
    pub rms_controller: Option<String>,

    /// Commande sysex, ou false.
    #[arg(long)]
    pub rms_sysex: Option<String>,

    /// Décroissance du maximum glissant, dans [0, 1].
    #[arg(long)]
    pub rms_decay: Option<f32>,
}

/// Overrides for the `[frequencies]` section.
#[derive(Args, Debug, Default)]
pub struct FrequencyArgs {
    /// Énergie par bande de fréquence.
    #[arg(long = "frequencies", num_args = 0..=1, default_missing_value = "true")]
    pub frequencies_enabled: Option<bool>,

    #[arg(long)]
    pub frequencies_frame_multiplier: Option<usize>,

    #[arg(long)]
    pub frequencies_hop_multiplier: Option<f32>,

    /// Envoyer toutes les N mesures.
    #[arg(long)]
    pub frequencies_count: Option<usize>,

    /// octave, third-octave, ou une liste de fréquences en Hz.
    #[arg(long)]
    pub frequencies_bands: Option<String>,

    /// Commande sysex, ou false.
    #[arg(long)]
    pub frequencies_sysex: Option<String>,

    /// Décroissance du maximum glissant, dans [0, 1].
    #[arg(long)]
    pub frequencies_decay: Option<f32>,
}

/// Overrides for the `[pitch]` section.
#[derive(Args, Debug, Default)]
pub struct PitchArgs {
    /// Hauteur de note.
    #[arg(long = "pitch", num_args = 0..=1, default_missing_value = "true")]
    pub pitch_enabled: Option<bool>,

    /// Algorithme : yin.
    #[arg(long, value_parser = parse_keyword::<PitchAlgorithm>)]
    pub pitch_algorithm: Option<PitchAlgorithm>,

    #[arg(long)]
    pub pitch_frame_multiplier: Option<usize>,

    #[arg(long)]
    pub pitch_hop_multiplier: Option<f32>,

    /// Seuil YIN, ou false pour la valeur du moteur.
    #[arg(long)]
    pub pitch_tolerance: Option<String>,

    /// Mesures identiques requises avant un changement de note.
    #[arg(long)]
    pub pitch_count: Option<usize>,

    /// Note MIDI la plus basse acceptée.
    #[arg(long)]
    pub pitch_low_cutoff: Option<u8>,

    /// Note MIDI la plus haute acceptée.
    #[arg(long)]
    pub pitch_high_cutoff: Option<u8>,

    /// Ramener chaque note dans une seule octave.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub pitch_fold_octaves: Option<bool>,

    /// Première note de l'octave de repli.
    #[arg(long)]
    pub pitch_fold_offset: Option<u8>,

    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub pitch_note_on: Option<bool>,

    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub pitch_note_off: Option<bool>,

    /// Numéro de contrôleur, ou false.
    #[arg(long)]
    pub pitch_controller: Option<String>,

    /// Commande sysex, ou false.
    #[arg(long)]
    pub pitch_sysex: Option<String>,
}

impl Cli {
    /// Apply the command-line overrides on top of loaded settings, then
    /// validate the result the same way a settings file is validated.
    ///
    /// # Errors
    /// Returns [`CoreError::Config`] for a malformed value or when the merged
    /// settings break a constraint.
    pub fn apply(&self, settings: &mut Settings) -> Result<(), CoreError> {
        let soundcard = &mut settings.soundcard;
        override_with(&mut soundcard.input_device, self.device.clone());
        override_with(&mut soundcard.channels, self.channels);
        override_with(&mut soundcard.sample_rate, self.sample_rate);
        override_with(&mut soundcard.frame_size, self.frame_size);

        override_with(&mut settings.echo.enabled, self.echo);
        override_with(&mut settings.echo.format, self.echo_format);

        let midi = &mut settings.midi;
        override_with(&mut midi.enabled, self.midi);
        override_with(&mut midi.out_port, self.port.clone());
        override_with(&mut midi.out_channel, self.channel);
        override_with(&mut midi.manufacturer, parsed(self.manufacturer.as_deref(), parse_byte_list)?);
        override_with(&mut midi.sysex_channel, self.sysex_channel);

        self.beats.apply(settings)?;
        self.tempo.apply(settings)?;
        self.rms.apply(settings)?;
        self.frequencies.apply(settings)?;
        self.pitch.apply(settings)?;

        settings.validate()
    }
}

impl BeatArgs {
    fn apply(&self, settings: &mut Settings) -> Result<(), CoreError> {
        let beats = &mut settings.beats;
        override_with(&mut beats.enabled, self.beats_enabled);
        override_with(&mut beats.algorithm, self.beats_algorithm);
        override_with(&mut beats.window.frame_multiplier, self.beats_frame_multiplier);
        override_with(&mut beats.window.hop_multiplier, self.beats_hop_multiplier);
        override_with(&mut beats.controller, parsed(self.beats_controller.as_deref(), parse_controller)?);
        override_with(&mut beats.sysex, parsed(self.beats_sysex.as_deref(), parse_assignment)?);
        let sequence = parsed(self.beats_sequence.as_deref(), parse_assignment)?;
        override_with(&mut beats.sequence, sequence.map(Option::unwrap_or_default));
        Ok(())
    }
}

impl TempoArgs {
    fn apply(&self, settings: &mut Settings) -> Result<(), CoreError> {
        let tempo = &mut settings.tempo;
        override_with(&mut tempo.enabled, self.tempo_enabled);
        override_with(&mut tempo.algorithm, self.tempo_algorithm);
        override_with(&mut tempo.window.frame_multiplier, self.tempo_frame_multiplier);
        override_with(&mut tempo.window.hop_multiplier, self.tempo_hop_multiplier);
        override_with(&mut tempo.average, self.tempo_average);
        override_with(&mut tempo.count, self.tempo_count);
        override_with(&mut tempo.controller, parsed(self.tempo_controller.as_deref(), parse_controller)?);
        override_with(&mut tempo.control_encoding, self.tempo_control_encoding);
        override_with(&mut tempo.sysex, parsed(self.tempo_sysex.as_deref(), parse_assignment)?);
        override_with(&mut tempo.sysex_encoding, self.tempo_sysex_encoding);
        Ok(())
    }
}

impl RmsArgs {
    fn apply(&self, settings: &mut Settings) -> Result<(), CoreError> {
        let rms = &mut settings.rms;
        override_with(&mut rms.enabled, self.rms_enabled);
        override_with(&mut rms.window.frame_multiplier, self.rms_frame_multiplier);
        override_with(&mut rms.window.hop_multiplier, self.rms_hop_multiplier);
        override_with(&mut rms.controller, parsed(self.rms_controller.as_deref(), parse_controller)?);
        override_with(&mut rms.sysex, parsed(self.rms_sysex.as_deref(), parse_assignment)?);
        override_with(&mut rms.decay, self.rms_decay);
        Ok(())
    }
}

impl FrequencyArgs {
    fn apply(&self, settings: &mut Settings) -> Result<(), CoreError> {
        let freq = &mut settings.frequencies;
        override_with(&mut freq.enabled, self.frequencies_enabled);
        override_with(&mut freq.window.frame_multiplier, self.frequencies_frame_multiplier);
        override_with(&mut freq.window.hop_multiplier, self.frequencies_hop_multiplier);
        override_with(&mut freq.count, self.frequencies_count);
        override_with(&mut freq.bands, parsed(self.frequencies_bands.as_deref(), BandLayout::parse)?);
        override_with(&mut freq.sysex, parsed(self.frequencies_sysex.as_deref(), parse_assignment)?);
        override_with(&mut freq.decay, self.frequencies_decay);
        Ok(())
    }
}

impl PitchArgs {
    fn apply(&self, settings: &mut Settings) -> Result<(), CoreError> {
        let pitch = &mut settings.pitch;
        override_with(&mut pitch.enabled, self.pitch_enabled);
        override_with(&mut pitch.algorithm, self.pitch_algorithm);
        override_with(&mut pitch.window.frame_multiplier, self.pitch_frame_multiplier);
        override_with(&mut pitch.window.hop_multiplier, self.pitch_hop_multiplier);
        override_with(&mut pitch.tolerance, parsed(self.pitch_tolerance.as_deref(), parse_tolerance)?);
        override_with(&mut pitch.count, self.pitch_count);
        override_with(&mut pitch.low_cutoff, self.pitch_low_cutoff);
        override_with(&mut pitch.high_cutoff, self.pitch_high_cutoff);
        override_with(&mut pitch.fold_octaves, self.pitch_fold_octaves);
        override_with(&mut pitch.fold_offset, self.pitch_fold_offset);
        override_with(&mut pitch.note_on, self.pitch_note_on);
        override_with(&mut pitch.note_off, self.pitch_note_off);
        override_with(&mut pitch.controller, parsed(self.pitch_controller.as_deref(), parse_controller)?);
        override_with(&mut pitch.sysex, parsed(self.pitch_sysex.as_deref(), parse_assignment)?);
        Ok(())
    }
}

fn override_with<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

/// Run a text option through the parser the settings file uses.
fn parsed<T>(
    text: Option<&str>,
    parse: impl FnOnce(&str) -> Result<T, CoreError>,
) -> Result<Option<T>, CoreError> {
    text.map(parse).transpose()
}
