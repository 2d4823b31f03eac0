use orion_error::{ErrorCode, StructError, UvsReason};
use sf_core::error::CoreReason;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeReason {
    #[error("engine bootstrap error")]
    Bootstrap,
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("shutdown error")]
    Shutdown,
    #[error("{0}")]
    Core(CoreReason),
    #[error("{0}")]
    Uvs(UvsReason),
}

impl From<UvsReason> for RuntimeReason {
    fn from(value: UvsReason) -> Self {
        Self::Uvs(value)
    }
}

impl ErrorCode for RuntimeReason {
    fn error_code(&self) -> i32 {
        match self {
            Self::Bootstrap => 2001,
            Self::Configuration(_) => 2002,
            Self::Storage(_) => 2003,
            Self::Shutdown => 2004,
            Self::Core(c) => c.error_code(),
            Self::Uvs(u) => u.error_code(),
        }
    }
}

pub type RuntimeError = StructError<RuntimeReason>;
pub type RuntimeResult<T> = Result<T, RuntimeError>;
