use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::encode::BpmEncoding;
use crate::error::CoreError;

/// Configuration complète, immuable après chargement.
///
/// Sérialisable en TOML. Chaque champ a une valeur par défaut saine ; les
/// assignations optionnelles (contrôleur, commande sysex) sont des `Option`
/// explicites, `None` désactivant la sortie correspondante.
///
/// # Exemple
/// ```
/// use stm_core::config::Settings;
/// let settings = Settings::default();
/// assert_eq!(settings.soundcard.frame_size, 512);
/// assert_eq!(settings.tempo.controller, Some(14));
/// assert!(settings.validate().is_ok());
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Settings {
    /// Audio capture parameters.
    pub soundcard: SoundcardSettings,
    /// Optional text echo of every outgoing message.
    pub echo: EchoSettings,
    /// MIDI output and sysex addressing.
    pub midi: MidiSettings,
    /// Tempo (BPM) extraction.
    pub tempo: TempoSettings,
    /// Beat onset extraction.
    pub beats: BeatSettings,
    /// Loudness extraction.
    pub rms: RmsSettings,
    /// Multiband energy extraction.
    pub frequencies: FrequencySettings,
    /// Fundamental pitch extraction.
    pub pitch: PitchSettings,
}

/// Audio capture parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct SoundcardSettings {
    /// Input device name, or `"default"` for the platform default.
    pub input_device: String,
    /// Number of channels to open; only the first one is analysed.
    pub channels: u16,
    /// Capture rate in Hz.
    pub sample_rate: u32,
    /// Samples per frame delivered to the extractors.
    pub frame_size: usize,
}

impl Default for SoundcardSettings {
    fn default() -> Self {
        Self {
            input_device: "default".into(),
            channels: 1,
            sample_rate: 44_100,
            frame_size: 512,
        }
    }
}

/// Format of the text echo.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EchoFormat {
    /// `control_change channel=13 control=14 value=68`
    #[default]
    Verbose,
    /// Decimal wire bytes: `[189, 14, 68]`
    Bytes,
    /// Wire bytes as 8-digit binary groups.
    Bin,
    /// Wire bytes as upper-case hex pairs.
    Hex,
}

/// Text echo settings.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EchoSettings {
    /// Echo every message to standard output.
    pub enabled: bool,
    /// How each message is rendered.
    pub format: EchoFormat,
}

/// MIDI output and sysex addressing.
#[derive(Clone, Debug, PartialEq)]
pub struct MidiSettings {
    /// Open a MIDI output port at all.
    pub enabled: bool,
    /// Port name, or `"default"` for the first port found.
    pub out_port: String,
    /// Output channel, 1-16.
    pub out_channel: u8,
    /// Manufacturer prefix bytes opening every sysex payload.
    pub manufacturer: Vec<u8>,
    /// Insert `out_channel − 1` after the manufacturer prefix.
    pub sysex_channel: bool,
}

impl Default for MidiSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            out_port: "default".into(),
            out_channel: 14,
            // 0x7D: MIDI "non-commercial / educational use" manufacturer ID
            manufacturer: vec![0x7D],
            sysex_channel: true,
        }
    }
}

impl MidiSettings {
    /// Zero-based channel carried by channel messages.
    #[must_use]
    pub fn channel_index(&self) -> u8 {
        self.out_channel.saturating_sub(1).min(15)
    }

    /// Addressing bytes placed before every sysex command.
    ///
    /// # Example
    /// ```
    /// use stm_core::config::MidiSettings;
    /// assert_eq!(MidiSettings::default().sysex_prefix(), vec![0x7D, 13]);
    /// ```
    #[must_use]
    pub fn sysex_prefix(&self) -> Vec<u8> {
        let mut prefix = self.manufacturer.clone();
        if self.sysex_channel {
            prefix.push(self.channel_index());
        }
        prefix
    }
}

/// Window and hop sizing, as multiples of the frame size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Windowing {
    /// Frames accumulated per analysis window (≥ 1).
    pub frame_multiplier: usize,
    /// Hop size as a fraction of the window, in (0, 1].
    pub hop_multiplier: f32,
}

impl Windowing {
    const fn new(frame_multiplier: usize, hop_multiplier: f32) -> Self {
        Self {
            frame_multiplier,
            hop_multiplier,
        }
    }

    /// Window length in samples.
    #[must_use]
    pub fn window_size(&self, frame_size: usize) -> usize {
        frame_size * self.frame_multiplier
    }

    /// Hop length in samples, at least 1.
    #[must_use]
    pub fn hop_size(&self, frame_size: usize) -> usize {
        ((self.window_size(frame_size) as f32 * self.hop_multiplier) as usize).max(1)
    }

    fn validate(&self, section: &str) -> Result<(), CoreError> {
        if self.frame_multiplier == 0 {
            return Err(CoreError::config(format!(
                "[{section}] frame_multiplier doit être ≥ 1"
            )));
        }
        if !(self.hop_multiplier > 0.0 && self.hop_multiplier <= 1.0) {
            return Err(CoreError::config(format!(
                "[{section}] hop_multiplier doit être dans ]0, 1] (reçu {})",
                self.hop_multiplier
            )));
        }
        Ok(())
    }
}

/// Onset detection function used by the tempo engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OnsetMethod {
    /// High frequency content.
    #[default]
    #[serde(alias = "default")]
    Hfc,
    /// Positive spectral flux.
    SpecFlux,
    /// Positive energy difference.
    Energy,
}

/// Pitch estimation algorithm.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PitchAlgorithm {
    /// YIN (de Cheveigné & Kawahara).
    #[default]
    #[serde(alias = "default")]
    Yin,
}

/// Tempo extraction settings.
#[derive(Clone, Debug, PartialEq)]
pub struct TempoSettings {
    /// Run this extractor.
    pub enabled: bool,
    /// Onset function driving the tempo engine.
    pub algorithm: OnsetMethod,
    /// Window and hop sizing.
    pub window: Windowing,
    /// Number of corrected BPM values averaged.
    pub average: usize,
    /// Number of averages voted over before a value is sent.
    pub count: usize,
    /// Controller for BPM, `None` disables control changes.
    pub controller: Option<u8>,
    /// Encoding of the control value.
    pub control_encoding: BpmEncoding,
    /// Sysex command bytes, `None` disables sysex.
    pub sysex: Option<Vec<u8>>,
    /// Encoding of the sysex data.
    pub sysex_encoding: BpmEncoding,
}

impl Default for TempoSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            algorithm: OnsetMethod::Hfc,
            window: Windowing::new(1, 0.5),
            average: 1,
            count: 1,
            controller: Some(14),
            control_encoding: BpmEncoding::Minus60,
            sysex: Some(vec![0x0B]),
            sysex_encoding: BpmEncoding::TwoBytes,
        }
    }
}

/// Beat extraction settings.
#[derive(Clone, Debug, PartialEq)]
pub struct BeatSettings {
    /// Run this extractor.
    pub enabled: bool,
    /// Onset function driving the beat engine.
    pub algorithm: OnsetMethod,
    /// Window and hop sizing.
    pub window: Windowing,
    /// Controller for the beat index, `None` disables control changes.
    pub controller: Option<u8>,
    /// Sysex command bytes, `None` disables sysex.
    pub sysex: Option<Vec<u8>>,
    /// Values handed out one per beat, looping.
    pub sequence: Vec<u8>,
}

impl Default for BeatSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            algorithm: OnsetMethod::Hfc,
            window: Windowing::new(1, 1.0),
            controller: Some(15),
            sysex: Some(vec![0x1B]),
            sequence: (0..8).collect(),
        }
    }
}

/// RMS extraction settings.
#[derive(Clone, Debug, PartialEq)]
pub struct RmsSettings {
    /// Run this extractor.
    pub enabled: bool,
    /// Window and hop sizing.
    pub window: Windowing,
    /// Controller for RMS, `None` disables control changes.
    pub controller: Option<u8>,
    /// Sysex command bytes, `None` disables sysex.
    pub sysex: Option<Vec<u8>>,
    /// Peak-decay factor in [0, 1]; 0 turns the floor off.
    pub decay: f32,
}

impl Default for RmsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            window: Windowing::new(4, 1.0),
            controller: Some(20),
            sysex: Some(vec![0x1F]),
            decay: 0.5,
        }
    }
}

/// Band edges for the frequency filter bank.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum BandLayout {
    /// 12 edges, 10 octave bands.
    Octave,
    /// 32 edges, 30 third-octave bands.
    #[default]
    ThirdOctave,
    /// Explicit edges in Hz; `n` edges give `n − 2` bands.
    Edges(Vec<f32>),
}

const OCTAVE_EDGES: [f32; 12] = [
    22.0, 31.5, 63.0, 125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0, 16000.0, 22720.0,
];

const THIRD_OCTAVE_EDGES: [f32; 32] = [
    22.4, 25.0, 31.5, 40.0, 50.0, 63.0, 80.0, 100.0, 125.0, 160.0, 200.0, 250.0, 315.0, 400.0,
    500.0, 630.0, 800.0, 1000.0, 1250.0, 1600.0, 2000.0, 2500.0, 3150.0, 4000.0, 5000.0, 6300.0,
    8000.0, 10000.0, 12500.0, 16000.0, 20000.0, 22390.0,
];

impl BandLayout {
    /// Edge frequencies in Hz, lower barrier and upper barrier included.
    #[must_use]
    pub fn edges(&self) -> &[f32] {
        match self {
            Self::Octave => &OCTAVE_EDGES,
            Self::ThirdOctave => &THIRD_OCTAVE_EDGES,
            Self::Edges(edges) => edges,
        }
    }

    /// Number of bands produced by these edges.
    ///
    /// # Example
    /// ```
    /// use stm_core::config::BandLayout;
    /// assert_eq!(BandLayout::Octave.band_count(), 10);
    /// assert_eq!(BandLayout::ThirdOctave.band_count(), 30);
    /// ```
    #[must_use]
    pub fn band_count(&self) -> usize {
        self.edges().len().saturating_sub(2)
    }

    /// Parse `"octave"`, `"third-octave"` or a comma/space separated edge list.
    ///
    /// # Errors
    /// Returns [`CoreError::Config`] for an unknown name or an invalid number.
    pub fn parse(text: &str) -> Result<Self, CoreError> {
        match text.trim() {
            "octave" => Ok(Self::Octave),
            "third-octave" | "third_octave" => Ok(Self::ThirdOctave),
            list => list
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|t| !t.is_empty())
                .map(|t| {
                    t.parse::<f32>().map_err(|_| {
                        CoreError::config(format!("[frequencies] bande invalide : '{t}'"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Self::Edges),
        }
    }

    fn validate(&self) -> Result<(), CoreError> {
        let edges = self.edges();
        if edges.len() < 3 {
            return Err(CoreError::config(
                "[frequencies] il faut au moins 3 fréquences (une bande)",
            ));
        }
        if edges.iter().any(|e| !e.is_finite() || *e <= 0.0)
            || edges.windows(2).any(|w| w[1] <= w[0])
        {
            return Err(CoreError::config(
                "[frequencies] les fréquences doivent être positives et strictement croissantes",
            ));
        }
        Ok(())
    }
}

/// Frequency band extraction settings.
#[derive(Clone, Debug, PartialEq)]
pub struct FrequencySettings {
    /// Run this extractor.
    pub enabled: bool,
    /// Window and hop sizing.
    pub window: Windowing,
    /// Spectral frames bucketed before one message is sent.
    pub count: usize,
    /// Filter bank edges.
    pub bands: BandLayout,
    /// Sysex command bytes, `None` disables output entirely.
    pub sysex: Option<Vec<u8>>,
    /// Peak-decay factor in [0, 1]; 0 turns the floor off.
    pub decay: f32,
}

impl Default for FrequencySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            window: Windowing::new(4, 1.0),
            count: 2,
            bands: BandLayout::ThirdOctave,
            sysex: Some(vec![0x0F]),
            decay: 0.8,
        }
    }
}

/// Pitch extraction settings.
#[allow(clippy::struct_excessive_bools)]
#[derive(Clone, Debug, PartialEq)]
pub struct PitchSettings {
    /// Run this extractor.
    pub enabled: bool,
    /// Pitch algorithm.
    pub algorithm: PitchAlgorithm,
    /// Window and hop sizing.
    pub window: Windowing,
    /// Confidence threshold handed to the engine, `None` keeps its default.
    pub tolerance: Option<f32>,
    /// Engine calls per decision.
    pub count: usize,
    /// Lowest note considered.
    pub low_cutoff: u8,
    /// Highest note considered.
    pub high_cutoff: u8,
    /// Fold notes into a single octave.
    pub fold_octaves: bool,
    /// Note number of the folded "C".
    pub fold_offset: u8,
    /// Send note on messages.
    pub note_on: bool,
    /// Send note off messages.
    pub note_off: bool,
    /// Controller for the note number, `None` disables control changes.
    pub controller: Option<u8>,
    /// Sysex command bytes, `None` disables sysex.
    pub sysex: Option<Vec<u8>>,
}

/// Highest fold offset keeping a folded note within 0-127.
pub const MAX_FOLD_OFFSET: u8 = 127 - 11;

impl Default for PitchSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            algorithm: PitchAlgorithm::Yin,
            window: Windowing::new(2, 0.5),
            tolerance: Some(0.5),
            count: 8,
            low_cutoff: 0,
            high_cutoff: 127,
            fold_octaves: false,
            fold_offset: 60,
            note_on: true,
            note_off: true,
            controller: Some(21),
            sysex: Some(vec![0x0C]),
        }
    }
}

impl Settings {
    /// Reject values that no extractor could work with.
    ///
    /// # Errors
    /// Returns the first [`CoreError::Config`] found.
    pub fn validate(&self) -> Result<(), CoreError> {
        let sc = &self.soundcard;
        if sc.frame_size == 0 || sc.sample_rate == 0 || sc.channels == 0 {
            return Err(CoreError::config(
                "[soundcard] frame_size, sample_rate et channels doivent être > 0",
            ));
        }
        if !(1..=16).contains(&self.midi.out_channel) {
            return Err(CoreError::config(format!(
                "[midi] out_channel doit être entre 1 et 16 (reçu {})",
                self.midi.out_channel
            )));
        }
        if self.midi.manufacturer.is_empty() {
            return Err(CoreError::config("[midi] manufacturer ne peut pas être vide"));
        }

        self.tempo.window.validate("tempo")?;
        if self.tempo.average == 0 || self.tempo.count == 0 {
            return Err(CoreError::config("[tempo] average et count doivent être ≥ 1"));
        }
        if self.tempo.control_encoding != BpmEncoding::Minus60 {
            return Err(CoreError::config(
                "[tempo] control_encoding : seul minus60 tient dans un contrôleur",
            ));
        }
        self.beats.window.validate("beats")?;
        self.rms.window.validate("rms")?;
        validate_decay("rms", self.rms.decay)?;

        let f = &self.frequencies;
        f.window.validate("frequencies")?;
        if f.count == 0 {
            return Err(CoreError::config("[frequencies] count doit être ≥ 1"));
        }
        validate_decay("frequencies", f.decay)?;
        f.bands.validate()?;

        let p = &self.pitch;
        p.window.validate("pitch")?;
        if p.count == 0 {
            return Err(CoreError::config("[pitch] count doit être ≥ 1"));
        }
        if let Some(t) = p.tolerance
            && !(t > 0.0 && t <= 1.0)
        {
            return Err(CoreError::config(format!(
                "[pitch] tolerance doit être dans ]0, 1] (reçu {t})"
            )));
        }
        if p.low_cutoff > p.high_cutoff || p.high_cutoff > 127 {
            return Err(CoreError::config(
                "[pitch] low_cutoff ≤ high_cutoff ≤ 127 requis",
            ));
        }
        if p.fold_offset > MAX_FOLD_OFFSET {
            return Err(CoreError::config(format!(
                "[pitch] fold_offset doit être ≤ {MAX_FOLD_OFFSET}"
            )));
        }
        Ok(())
    }

    /// Parse a TOML document, merge it over the defaults and validate.
    ///
    /// # Errors
    /// Returns [`CoreError::Config`] for malformed TOML or invalid values.
    ///
    /// # Example
    /// ```
    /// use stm_core::config::Settings;
    /// let s = Settings::from_toml_str("[tempo]\ncontroller = false\nsysex = \"0x0B 0x01\"").unwrap();
    /// assert_eq!(s.tempo.controller, None);
    /// assert_eq!(s.tempo.sysex, Some(vec![0x0B, 0x01]));
    /// ```
    pub fn from_toml_str(content: &str) -> Result<Self, CoreError> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| CoreError::config(e.to_string()))?;
        let mut settings = Self::default();
        file.merge_into(&mut settings)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Render these settings as a complete TOML document.
    ///
    /// # Errors
    /// Returns an error if serialisation fails.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(&ConfigFile::from(self))?)
    }
}

fn validate_decay(section: &str, decay: f32) -> Result<(), CoreError> {
    if (0.0..=1.0).contains(&decay) {
        Ok(())
    } else {
        Err(CoreError::config(format!(
            "[{section}] decay doit être dans [0, 1] (reçu {decay})"
        )))
    }
}

/// Parse a byte list such as `"0x7D"`, `"0x0B 0x01"` or `"11, 1"`.
///
/// Every byte must fit in 7 bits.
///
/// # Errors
/// Returns [`CoreError::Config`] for an empty list, a bad number or a byte > 127.
///
/// # Example
/// ```
/// use stm_core::config::parse_byte_list;
/// assert_eq!(parse_byte_list("0x7D 13").unwrap(), vec![0x7D, 13]);
/// assert!(parse_byte_list("0x80").is_err());
/// ```
pub fn parse_byte_list(text: &str) -> Result<Vec<u8>, CoreError> {
    let bytes = text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .map(parse_data_byte)
        .collect::<Result<Vec<_>, _>>()?;
    if bytes.is_empty() {
        return Err(CoreError::config("liste d'octets vide"));
    }
    Ok(bytes)
}

fn parse_data_byte(token: &str) -> Result<u8, CoreError> {
    let parsed = match token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => token.parse::<i64>(),
    };
    let value = parsed.map_err(|_| CoreError::config(format!("octet invalide : '{token}'")))?;
    data_byte(value, token)
}

fn data_byte(value: i64, what: &str) -> Result<u8, CoreError> {
    if (0..=127).contains(&value) {
        Ok(value as u8)
    } else {
        Err(CoreError::config(format!(
            "'{what}' hors de la plage MIDI 0-127"
        )))
    }
}

/// Parse a keyword value (`"specflux"`, `"twobytes"`, `"hex"`...) exactly as the
/// settings file reads it, aliases included.
///
/// # Errors
/// Returns [`CoreError::Config`] for an unknown keyword.
///
/// # Example
/// ```
/// use stm_core::config::{parse_keyword, OnsetMethod};
/// assert_eq!(parse_keyword::<OnsetMethod>("default").unwrap(), OnsetMethod::Hfc);
/// assert!(parse_keyword::<OnsetMethod>("fast").is_err());
/// ```
pub fn parse_keyword<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, CoreError> {
    use serde::de::IntoDeserializer;
    let de: serde::de::value::StrDeserializer<'_, serde::de::value::Error> =
        text.trim().into_deserializer();
    T::deserialize(de).map_err(|e| CoreError::config(e.to_string()))
}

/// Text assignment: `false` / `off` disable, anything else is a byte list.
fn raw_assign(text: &str) -> RawAssign {
    match text.trim() {
        "false" | "off" | "none" => RawAssign::Flag(false),
        other => RawAssign::Text(other.to_owned()),
    }
}

/// Parse a controller assignment given as text, `false` disabling it.
///
/// # Errors
/// Returns [`CoreError::Config`] unless the text is one 7-bit number or `false`.
///
/// # Example
/// ```
/// use stm_core::config::parse_controller;
/// assert_eq!(parse_controller("20").unwrap(), Some(20));
/// assert_eq!(parse_controller("false").unwrap(), None);
/// ```
pub fn parse_controller(text: &str) -> Result<Option<u8>, CoreError> {
    raw_assign(text).into_controller("controller")
}

/// Parse a sysex assignment given as text, `false` disabling it.
///
/// # Errors
/// Returns [`CoreError::Config`] for a malformed byte list.
///
/// # Example
/// ```
/// use stm_core::config::parse_assignment;
/// assert_eq!(parse_assignment("0x0B 1").unwrap(), Some(vec![0x0B, 1]));
/// assert_eq!(parse_assignment("off").unwrap(), None);
/// ```
pub fn parse_assignment(text: &str) -> Result<Option<Vec<u8>>, CoreError> {
    raw_assign(text).into_bytes("sysex")
}

/// Parse a pitch tolerance: a number, or `false` to keep the engine default.
///
/// # Errors
/// Returns [`CoreError::Config`] if the text is neither.
pub fn parse_tolerance(text: &str) -> Result<Option<f32>, CoreError> {
    match text.trim() {
        "false" | "off" | "none" => Ok(None),
        value => value
            .parse::<f32>()
            .map(Some)
            .map_err(|_| CoreError::config(format!("[pitch] tolerance invalide : '{value}'"))),
    }
}

fn format_byte_list(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("0x{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Écrit un fichier modèle contenant toutes les valeurs par défaut.
///
/// Un fichier existant est d'abord renommé en `<fichier>.<horodatage unix>` ;
/// renvoie alors le chemin de cette sauvegarde.
///
/// # Erreurs
/// Échoue si la sauvegarde ou l'écriture échoue.
pub fn write_template(path: &Path) -> Result<Option<PathBuf>> {
    let backup = if path.exists() {
        let mut name = path.as_os_str().to_owned();
        name.push(format!(".{}", chrono::Utc::now().timestamp()));
        let backup = PathBuf::from(name);
        std::fs::rename(path, &backup).with_context(|| {
            format!("Impossible de sauvegarder {} vers {}", path.display(), backup.display())
        })?;
        log::info!("Ancienne configuration sauvegardée : {}", backup.display());
        Some(backup)
    } else {
        None
    };

    let body = Settings::default().to_toml_string()?;
    let content = format!(
        "# soundtomidi settings. Every key is optional; missing keys use these defaults.\n\
         # Set `controller = false` or `sysex = false` to disable that output.\n\n{body}"
    );
    std::fs::write(path, content)
        .with_context(|| format!("Impossible d'écrire {}", path.display()))?;
    Ok(backup)
}

/// Charge un fichier TOML et fusionne avec les valeurs par défaut.
///
/// # Erreurs
/// Échoue si le fichier est illisible, mal formé ou invalide.
///
/// # Exemple
/// ```no_run
/// use stm_core::config::load_config;
/// use std::path::Path;
/// let settings = load_config(Path::new("soundtomidi.toml")).unwrap();
/// ```
pub fn load_config(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Impossible de lire {}", path.display()))?;
    Settings::from_toml_str(&content)
        .with_context(|| format!("Erreur de configuration dans {}", path.display()))
}

// === Représentation fichier ===

/// Controller or sysex assignment as written in the file.
///
/// `false` disables; a number or a byte string enables.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(untagged)]
enum RawAssign {
    Flag(bool),
    Number(i64),
    Bytes(Vec<i64>),
    Text(String),
}

impl RawAssign {
    fn into_controller(self, key: &str) -> Result<Option<u8>, CoreError> {
        match self {
            Self::Flag(false) => Ok(None),
            Self::Number(n) => data_byte(n, key).map(Some),
            Self::Text(t) => match parse_byte_list(&t)?.as_slice() {
                [c] => Ok(Some(*c)),
                _ => Err(CoreError::config(format!("{key} : un seul numéro attendu"))),
            },
            Self::Flag(true) | Self::Bytes(_) => Err(CoreError::config(format!(
                "{key} : numéro de contrôleur ou false attendu"
            ))),
        }
    }

    fn into_bytes(self, key: &str) -> Result<Option<Vec<u8>>, CoreError> {
        match self {
            Self::Flag(false) => Ok(None),
            Self::Number(n) => data_byte(n, key).map(|b| Some(vec![b])),
            Self::Bytes(list) if !list.is_empty() => list
                .into_iter()
                .map(|n| data_byte(n, key))
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Self::Text(t) => parse_byte_list(&t).map(Some),
            Self::Flag(true) | Self::Bytes(_) => Err(CoreError::config(format!(
                "{key} : octets ou false attendus"
            ))),
        }
    }

    fn from_controller(controller: Option<u8>) -> Self {
        controller.map_or(Self::Flag(false), |c| Self::Number(i64::from(c)))
    }

    fn from_bytes(bytes: Option<&[u8]>) -> Self {
        bytes.map_or(Self::Flag(false), |b| Self::Text(format_byte_list(b)))
    }
}

/// A list given either as a TOML array or a comma separated string.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(untagged)]
enum RawList {
    Numbers(Vec<f64>),
    Text(String),
}

/// Intermediate TOML layout, every section optional.
#[derive(Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    soundcard: Option<SoundcardSection>,
    echo: Option<EchoSection>,
    midi: Option<MidiSection>,
    tempo: Option<TempoSection>,
    beats: Option<BeatSection>,
    rms: Option<RmsSection>,
    frequencies: Option<FrequencySection>,
    pitch: Option<PitchSection>,
}

#[derive(Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct SoundcardSection {
    input_device: Option<String>,
    channels: Option<u16>,
    sample_rate: Option<u32>,
    frame_size: Option<usize>,
}

#[derive(Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct EchoSection {
    enabled: Option<bool>,
    format: Option<EchoFormat>,
}

#[derive(Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct MidiSection {
    enabled: Option<bool>,
    out_port: Option<String>,
    out_channel: Option<u8>,
    manufacturer: Option<RawAssign>,
    sysex_channel: Option<bool>,
}

#[derive(Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct TempoSection {
    enabled: Option<bool>,
    algorithm: Option<OnsetMethod>,
    frame_multiplier: Option<usize>,
    hop_multiplier: Option<f32>,
    average: Option<usize>,
    count: Option<usize>,
    controller: Option<RawAssign>,
    control_encoding: Option<BpmEncoding>,
    sysex: Option<RawAssign>,
    sysex_encoding: Option<BpmEncoding>,
}

#[derive(Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct BeatSection {
    enabled: Option<bool>,
    algorithm: Option<OnsetMethod>,
    frame_multiplier: Option<usize>,
    hop_multiplier: Option<f32>,
    controller: Option<RawAssign>,
    sysex: Option<RawAssign>,
    sequence: Option<RawAssign>,
}

#[derive(Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct RmsSection {
    enabled: Option<bool>,
    frame_multiplier: Option<usize>,
    hop_multiplier: Option<f32>,
    controller: Option<RawAssign>,
    sysex: Option<RawAssign>,
    decay: Option<f32>,
}

#[derive(Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct FrequencySection {
    enabled: Option<bool>,
    frame_multiplier: Option<usize>,
    hop_multiplier: Option<f32>,
    count: Option<usize>,
    bands: Option<RawList>,
    sysex: Option<RawAssign>,
    decay: Option<f32>,
}

#[derive(Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct PitchSection {
    enabled: Option<bool>,
    algorithm: Option<PitchAlgorithm>,
    frame_multiplier: Option<usize>,
    hop_multiplier: Option<f32>,
    tolerance: Option<RawTolerance>,
    count: Option<usize>,
    low_cutoff: Option<u8>,
    high_cutoff: Option<u8>,
    fold_octaves: Option<bool>,
    fold_offset: Option<u8>,
    note_on: Option<bool>,
    note_off: Option<bool>,
    controller: Option<RawAssign>,
    sysex: Option<RawAssign>,
}

/// Pitch tolerance: a number, or `false` to keep the engine default.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(untagged)]
enum RawTolerance {
    Flag(bool),
    Value(f32),
}

macro_rules! merge {
    ($target:expr, $value:expr) => {
        if let Some(v) = $value {
            $target = v;
        }
    };
}

impl ConfigFile {
    #[allow(clippy::too_many_lines)]
    fn merge_into(self, s: &mut Settings) -> Result<(), CoreError> {
        if let Some(c) = self.soundcard {
            merge!(s.soundcard.input_device, c.input_device);
            merge!(s.soundcard.channels, c.channels);
            merge!(s.soundcard.sample_rate, c.sample_rate);
            merge!(s.soundcard.frame_size, c.frame_size);
        }
        if let Some(e) = self.echo {
            merge!(s.echo.enabled, e.enabled);
            merge!(s.echo.format, e.format);
        }
        if let Some(m) = self.midi {
            merge!(s.midi.enabled, m.enabled);
            merge!(s.midi.out_port, m.out_port);
            merge!(s.midi.out_channel, m.out_channel);
            merge!(s.midi.sysex_channel, m.sysex_channel);
            if let Some(raw) = m.manufacturer {
                s.midi.manufacturer = raw
                    .into_bytes("[midi] manufacturer")?
                    .ok_or_else(|| CoreError::config("[midi] manufacturer est obligatoire"))?;
            }
        }
        if let Some(t) = self.tempo {
            merge!(s.tempo.enabled, t.enabled);
            merge!(s.tempo.algorithm, t.algorithm);
            merge!(s.tempo.window.frame_multiplier, t.frame_multiplier);
            merge!(s.tempo.window.hop_multiplier, t.hop_multiplier);
            merge!(s.tempo.average, t.average);
            merge!(s.tempo.count, t.count);
            merge!(s.tempo.control_encoding, t.control_encoding);
            merge!(s.tempo.sysex_encoding, t.sysex_encoding);
            if let Some(raw) = t.controller {
                s.tempo.controller = raw.into_controller("[tempo] controller")?;
            }
            if let Some(raw) = t.sysex {
                s.tempo.sysex = raw.into_bytes("[tempo] sysex")?;
            }
        }
        if let Some(b) = self.beats {
            merge!(s.beats.enabled, b.enabled);
            merge!(s.beats.algorithm, b.algorithm);
            merge!(s.beats.window.frame_multiplier, b.frame_multiplier);
            merge!(s.beats.window.hop_multiplier, b.hop_multiplier);
            if let Some(raw) = b.controller {
                s.beats.controller = raw.into_controller("[beats] controller")?;
            }
            if let Some(raw) = b.sysex {
                s.beats.sysex = raw.into_bytes("[beats] sysex")?;
            }
            if let Some(raw) = b.sequence {
                s.beats.sequence = raw.into_bytes("[beats] sequence")?.unwrap_or_default();
            }
        }
        if let Some(r) = self.rms {
            merge!(s.rms.enabled, r.enabled);
            merge!(s.rms.window.frame_multiplier, r.frame_multiplier);
            merge!(s.rms.window.hop_multiplier, r.hop_multiplier);
            merge!(s.rms.decay, r.decay);
            if let Some(raw) = r.controller {
                s.rms.controller = raw.into_controller("[rms] controller")?;
            }
            if let Some(raw) = r.sysex {
                s.rms.sysex = raw.into_bytes("[rms] sysex")?;
            }
        }
        if let Some(f) = self.frequencies {
            merge!(s.frequencies.enabled, f.enabled);
            merge!(s.frequencies.window.frame_multiplier, f.frame_multiplier);
            merge!(s.frequencies.window.hop_multiplier, f.hop_multiplier);
            merge!(s.frequencies.count, f.count);
            merge!(s.frequencies.decay, f.decay);
            if let Some(raw) = f.bands {
                s.frequencies.bands = match raw {
                    RawList::Text(t) => BandLayout::parse(&t)?,
                    RawList::Numbers(n) => BandLayout::Edges(n.into_iter().map(|e| e as f32).collect()),
                };
            }
            if let Some(raw) = f.sysex {
                s.frequencies.sysex = raw.into_bytes("[frequencies] sysex")?;
            }
        }
        if let Some(p) = self.pitch {
            merge!(s.pitch.enabled, p.enabled);
            merge!(s.pitch.algorithm, p.algorithm);
            merge!(s.pitch.window.frame_multiplier, p.frame_multiplier);
            merge!(s.pitch.window.hop_multiplier, p.hop_multiplier);
            merge!(s.pitch.count, p.count);
            merge!(s.pitch.low_cutoff, p.low_cutoff);
            merge!(s.pitch.high_cutoff, p.high_cutoff);
            merge!(s.pitch.fold_octaves, p.fold_octaves);
            merge!(s.pitch.fold_offset, p.fold_offset);
            merge!(s.pitch.note_on, p.note_on);
            merge!(s.pitch.note_off, p.note_off);
            match p.tolerance {
                Some(RawTolerance::Flag(false)) => s.pitch.tolerance = None,
                Some(RawTolerance::Value(v)) => s.pitch.tolerance = Some(v),
                Some(RawTolerance::Flag(true)) => {
                    return Err(CoreError::config(
                        "[pitch] tolerance : nombre ou false attendu",
                    ));
                }
                None => {}
            }
            if let Some(raw) = p.controller {
                s.pitch.controller = raw.into_controller("[pitch] controller")?;
            }
            if let Some(raw) = p.sysex {
                s.pitch.sysex = raw.into_bytes("[pitch] sysex")?;
            }
        }
        Ok(())
    }
}

impl From<&Settings> for ConfigFile {
    fn from(s: &Settings) -> Self {
        Self {
            soundcard: Some(SoundcardSection {
                input_device: Some(s.soundcard.input_device.clone()),
                channels: Some(s.soundcard.channels),
                sample_rate: Some(s.soundcard.sample_rate),
                frame_size: Some(s.soundcard.frame_size),
            }),
            echo: Some(EchoSection {
                enabled: Some(s.echo.enabled),
                format: Some(s.echo.format),
            }),
            midi: Some(MidiSection {
                enabled: Some(s.midi.enabled),
                out_port: Some(s.midi.out_port.clone()),
                out_channel: Some(s.midi.out_channel),
                manufacturer: Some(RawAssign::from_bytes(Some(&s.midi.manufacturer))),
                sysex_channel: Some(s.midi.sysex_channel),
            }),
            tempo: Some(TempoSection {
                enabled: Some(s.tempo.enabled),
                algorithm: Some(s.tempo.algorithm),
                frame_multiplier: Some(s.tempo.window.frame_multiplier),
                hop_multiplier: Some(s.tempo.window.hop_multiplier),
                average: Some(s.tempo.average),
                count: Some(s.tempo.count),
                controller: Some(RawAssign::from_controller(s.tempo.controller)),
                control_encoding: Some(s.tempo.control_encoding),
                sysex: Some(RawAssign::from_bytes(s.tempo.sysex.as_deref())),
                sysex_encoding: Some(s.tempo.sysex_encoding),
            }),
            beats: Some(BeatSection {
                enabled: Some(s.beats.enabled),
                algorithm: Some(s.beats.algorithm),
                frame_multiplier: Some(s.beats.window.frame_multiplier),
                hop_multiplier: Some(s.beats.window.hop_multiplier),
                controller: Some(RawAssign::from_controller(s.beats.controller)),
                sysex: Some(RawAssign::from_bytes(s.beats.sysex.as_deref())),
                sequence: Some(if s.beats.sequence.is_empty() {
                    RawAssign::Flag(false)
                } else {
                    RawAssign::Bytes(s.beats.sequence.iter().map(|&v| i64::from(v)).collect())
                }),
            }),
            rms: Some(RmsSection {
                enabled: Some(s.rms.enabled),
                frame_multiplier: Some(s.rms.window.frame_multiplier),
                hop_multiplier: Some(s.rms.window.hop_multiplier),
                controller: Some(RawAssign::from_controller(s.rms.controller)),
                sysex: Some(RawAssign::from_bytes(s.rms.sysex.as_deref())),
                decay: Some(s.rms.decay),
            }),
            frequencies: Some(FrequencySection {
                enabled: Some(s.frequencies.enabled),
                frame_multiplier: Some(s.frequencies.window.frame_multiplier),
                hop_multiplier: Some(s.frequencies.window.hop_multiplier),
                count: Some(s.frequencies.count),
                bands: Some(match &s.frequencies.bands {
                    BandLayout::Octave => RawList::Text("octave".into()),
                    BandLayout::ThirdOctave => RawList::Text("third-octave".into()),
                    BandLayout::Edges(e) => {
                        RawList::Numbers(e.iter().map(|&v| f64::from(v)).collect())
                    }
                }),
                sysex: Some(RawAssign::from_bytes(s.frequencies.sysex.as_deref())),
                decay: Some(s.frequencies.decay),
            }),
            pitch: Some(PitchSection {
                enabled: Some(s.pitch.enabled),
                algorithm: Some(s.pitch.algorithm),
                frame_multiplier: Some(s.pitch.window.frame_multiplier),
                hop_multiplier: Some(s.pitch.window.hop_multiplier),
                tolerance: Some(
                    s.pitch
                        .tolerance
                        .map_or(RawTolerance::Flag(false), RawTolerance::Value),
                ),
                count: Some(s.pitch.count),
                low_cutoff: Some(s.pitch.low_cutoff),
                high_cutoff: Some(s.pitch.high_cutoff),
                fold_octaves: Some(s.pitch.fold_octaves),
                fold_offset: Some(s.pitch.fold_offset),
                note_on: Some(s.pitch.note_on),
                note_off: Some(s.pitch.note_off),
                controller: Some(RawAssign::from_controller(s.pitch.controller)),
                sysex: Some(RawAssign::from_bytes(s.pitch.sysex.as_deref())),
            }),
        }
    }
}
