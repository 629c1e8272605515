use thiserror::Error;

/// Errors originating from the MIDI side: ports, connections, worker threads.
#[derive(Error, Debug)]
pub enum MidiError {
    /// The platform MIDI client could not be created.
    #[error("Initialisation MIDI impossible : {0}")]
    Init(String),

    /// No port carries the requested name.
    #[error("Port MIDI introuvable : {0}")]
    PortNotFound(String),

    /// The port exists but refused the connection.
    #[error("Connexion au port MIDI impossible : {0}")]
    Connect(String),

    /// A message could not be handed to the port.
    #[error("Envoi MIDI échoué : {0}")]
    Send(String),

    /// A worker thread could not be spawned.
    #[error("Thread MIDI : {0}")]
    Io(#[from] std::io::Error),
}

impl From<midir::InitError> for MidiError {
    fn from(e: midir::InitError) -> Self {
        Self::Init(e.to_string())
    }
}

impl From<midir::ConnectError<midir::MidiOutput>> for MidiError {
    fn from(e: midir::ConnectError<midir::MidiOutput>) -> Self {
        Self::Connect(e.to_string())
    }
}

impl From<midir::ConnectError<midir::MidiInput>> for MidiError {
    fn from(e: midir::ConnectError<midir::MidiInput>) -> Self {
        Self::Connect(e.to_string())
    }
}

impl From<midir::SendError> for MidiError {
    fn from(e: midir::SendError) -> Self {
        Self::Send(e.to_string())
    }
}
