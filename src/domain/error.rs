//! Domain error types.

/// Top-level error type for voltrader.
///
/// The three failure families of a backtest map onto these variants:
/// ledger precondition violations (`InvalidState`), bad input bars (`Data`)
/// and bad configuration (`ConfigParse`, `ConfigMissing`, `ConfigInvalid`).
#[derive(Debug, thiserror::Error)]
pub enum VoltraderError {
    #[error("invalid ledger state: {reason}")]
    InvalidState { reason: String },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl VoltraderError {
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        VoltraderError::InvalidState {
            reason: reason.into(),
        }
    }

    pub fn data(reason: impl Into<String>) -> Self {
        VoltraderError::Data {
            reason: reason.into(),
        }
    }

    pub fn config_invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        VoltraderError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            VoltraderError::ConfigParse { .. }
                | VoltraderError::ConfigMissing { .. }
                | VoltraderError::ConfigInvalid { .. }
        )
    }

    pub fn is_data_error(&self) -> bool {
        matches!(self, VoltraderError::Data { .. })
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self, VoltraderError::InvalidState { .. })
    }
}

impl From<&VoltraderError> for std::process::ExitCode {
    fn from(err: &VoltraderError) -> Self {
        let code: u8 = match err {
            VoltraderError::Io(_) | VoltraderError::Csv(_) => 1,
            VoltraderError::ConfigParse { .. }
            | VoltraderError::ConfigMissing { .. }
            | VoltraderError::ConfigInvalid { .. } => 2,
            VoltraderError::Data { .. } => 5,
            VoltraderError::InvalidState { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
