pub mod logger;
pub mod events;

pub use self::logger::{Logger, LogLevel, LogCategory};
pub use self::events::{EventBus, PoolEvent, DeferReason};
