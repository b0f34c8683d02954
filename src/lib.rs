pub mod config;
pub mod enforcement;
pub mod host;
pub mod lifecycle;
pub mod logging;
pub mod manager;
pub mod players;
pub mod queue;
pub mod weapons;
pub mod worker;

pub const PLUGIN_NAME: &str = "Farming-Manager";
pub const ENFORCEMENT_TARGET: &str = "farming_manager::enforcement";
pub const ERROR_TARGET: &str = "farming_manager::error";
pub const EVENT_TARGET: &str = "farming_manager::events";
pub const CONSOLE_TARGET: &str = "farming_manager";

pub use config::{EnforcerConfig, FarmingConfig};
pub use manager::FarmingManager;
pub use queue::{KillEvent, KillQueue, QueueItem};
pub type Error = Box<dyn std::error::Error + Send + Sync>;
