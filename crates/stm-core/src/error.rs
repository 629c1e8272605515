use thiserror::Error;

/// Errors originating from the core module.
#[derive(Error, Debug, PartialEq)]
pub enum CoreError {
    /// Invalid configuration value or structure.
    #[error("Configuration invalide : {0}")]
    Config(String),

    /// A frame did not have the configured frame size.
    #[error("Taille de frame inattendue : {actual} échantillons (attendu {expected})")]
    ShapeMismatch {
        /// Configured frame size.
        expected: usize,
        /// Length of the frame actually received.
        actual: usize,
    },
}

impl CoreError {
    /// Shorthand for a [`CoreError::Config`] built from anything displayable.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
