use thiserror::Error;

/// Result type alias for field engine operations.
pub type Result<T> = std::result::Result<T, FieldEngineError>;

/// Errors raised while building or running field engines.
#[derive(Debug, Error)]
pub enum FieldEngineError {
    /// The parameters of an engine or of a histogram entry are invalid.
    /// Raised at construction, except for entries built literally and checked when sampled.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The destination slice cannot hold the field.
    #[error("Provided slice is shorter than the size of the field, want at least {want}, have {have}")]
    BufferTooShort { want: usize, have: usize },

    /// A histogram entry generated fewer bytes than the field size.
    #[error("Generated value is shorter than the size of the field, want {want}, have {have}")]
    ValueTooShort { want: usize, have: usize },

    /// The offset of a field lies past the end of the packet.
    #[error("Field offset {offset} is out of a packet of {len} bytes")]
    OffsetOutOfBounds { offset: usize, len: usize },

    /// The configuration document is not valid TOML or does not match the expected layout.
    /// Also raised for unknown keywords such as an unsupported `op`.
    #[error("Ill-formed configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

impl FieldEngineError {
    /// Whether the error comes from a destination or a generated value that is too short.
    /// A single engine whose `update` failed this way kept its state and can be retried.
    /// `FieldEngines::update` gives no such guarantee: the fields before the failing one
    /// have already advanced.
    pub fn is_size_error(&self) -> bool {
        matches!(
            self,
            FieldEngineError::BufferTooShort { .. }
                | FieldEngineError::ValueTooShort { .. }
                | FieldEngineError::OffsetOutOfBounds { .. }
        )
    }

    /// Whether the error comes from an invalid configuration, whichever way it was given:
    /// parameters, parsed keywords or a TOML document.
    pub fn is_config_error(&self) -> bool {
        matches!(self, FieldEngineError::InvalidConfig(_) | FieldEngineError::Toml(_))
    }
}
