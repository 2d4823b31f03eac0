#[macro_use]
mod log_macros;

pub mod bootstrap;
pub mod error;
pub mod manager;
pub mod signals;
pub mod storage;
pub mod tracing_init;

pub use bootstrap::bootstrap;
pub use error::{RuntimeError, RuntimeReason, RuntimeResult};
pub use manager::{CycleReport, SensorManager};
pub use signals::{HostSignals, NullSignals, StateTag, value_to_json};
pub use storage::{MemoryStorage, SensorStorage};
pub use tracing_init::init_tracing;
