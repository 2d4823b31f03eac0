use orion_error::{ErrorCode, StructError, UvsReason};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreReason {
    #[error("formula syntax error at offset {position}: {message}")]
    FormulaSyntax { position: usize, message: String },
    #[error("missing dependency {0:?}")]
    MissingDependency(String),
    #[error("dependency {0:?} is unavailable")]
    UnavailableDependency(String),
    #[error("non-numeric state {state:?} for {entity}")]
    NonNumericState { entity: String, state: String },
    #[error("circular dependency: {0}")]
    CircularDependency(String),
    #[error("sensor configuration error: {0}")]
    SensorConfiguration(String),
    #[error("data validation error: {0}")]
    DataValidation(String),
    #[error("cache error: {0}")]
    Cache(String),
    #[error("cache invalidation error: {0}")]
    CacheInvalidation(String),
    #[error("sensor update error: {0}")]
    SensorUpdate(String),
    #[error("{0}")]
    Uvs(UvsReason),
}

impl From<UvsReason> for CoreReason {
    fn from(value: UvsReason) -> Self {
        Self::Uvs(value)
    }
}

impl ErrorCode for CoreReason {
    fn error_code(&self) -> i32 {
        match self {
            Self::FormulaSyntax { .. } => 1001,
            Self::MissingDependency(_) => 1002,
            Self::UnavailableDependency(_) => 1003,
            Self::NonNumericState { .. } => 1004,
            Self::CircularDependency(_) => 1005,
            Self::SensorConfiguration(_) => 1006,
            Self::DataValidation(_) => 1007,
            Self::Cache(_) => 1008,
            Self::CacheInvalidation(_) => 1009,
            Self::SensorUpdate(_) => 1010,
            Self::Uvs(u) => u.error_code(),
        }
    }
}

pub type CoreError = StructError<CoreReason>;
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreReason {
    /// True when a failure of this kind leaves the sensor retriable next
    /// cycle (previous value preserved) rather than aborting the load.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MissingDependency(_)
                | Self::UnavailableDependency(_)
                | Self::NonNumericState { .. }
                | Self::SensorUpdate(_)
                | Self::Cache(_)
                | Self::CacheInvalidation(_)
        )
    }
}

/// Map a parse failure into the core taxonomy.
pub fn syntax_error(err: &sf_lang::FormulaParseError) -> CoreError {
    StructError::from(CoreReason::FormulaSyntax {
        position: err.offset,
        message: err.message.clone(),
    })
}
