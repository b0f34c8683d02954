//! Host adapters for the standalone binary
//!
//! Host events arrive as one YAML/JSON mapping per line, e.g.
//! `{event: kill, killer: A, victim: B, weapon: U_M98B}`. Outbound messages and
//! commands are written to the console log.

use crate::CONSOLE_TARGET;
use crate::config::ConfigResult;
use crate::enforcement::{CommandSink, EnforcementResult, Notifier};
use crate::manager::FarmingManager;
use crate::players::{PlayerStats, ServerInfo};
use crate::queue::KillEvent;
use crate::weapons::WeaponDefine;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// One event from the game server connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    Kill(KillEvent),
    Join { name: String },
    Leave { name: String },
    Roster { players: Vec<PlayerStats> },
    Reserved { players: Vec<String> },
    RoundOver,
    ServerInfo(ServerInfo),
}

impl HostEvent {
    /// Parse one input line
    ///
    /// # Errors
    /// Returns the parser error for a line that is not a known event.
    pub fn parse(line: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(line)
    }

    /// Hand the event to the matching manager callback
    pub fn apply(self, manager: &FarmingManager) {
        match self {
            Self::Kill(kill) => {
                if !manager.on_player_killed(kill) {
                    warn!(target: CONSOLE_TARGET, "Kill ignored, enforcement is not enabled");
                }
            }
            Self::Join { name } => manager.on_player_joined(&name),
            Self::Leave { name } => manager.on_player_left(&name),
            Self::Roster { players } => manager.on_roster(&players),
            Self::Reserved { players } => manager.on_reserved_slots(players),
            Self::RoundOver => manager.on_round_over(),
            Self::ServerInfo(info) => manager.on_server_info(info),
        }
    }
}

/// Load the engine weapon defines; a missing file yields none
///
/// # Errors
/// Returns an error if the file exists but cannot be read or parsed.
pub async fn load_weapon_defines(path: impl AsRef<Path>) -> ConfigResult<Vec<WeaponDefine>> {
    let path = path.as_ref();
    if !path.exists() {
        warn!("Weapon defines {} not found", path.display());
        return Ok(Vec::new());
    }
    let content = tokio::fs::read_to_string(path).await?;
    Ok(serde_yaml::from_str(&content)?)
}

/// Writes player messages and notifications to the console log
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn message_player(&self, player: &str, text: &str) -> EnforcementResult<()> {
        info!(target: CONSOLE_TARGET, player = %player, "say: {text}");
        Ok(())
    }

    async fn chat_log(&self, text: &str) -> EnforcementResult<()> {
        info!(target: CONSOLE_TARGET, "chat: {text}");
        Ok(())
    }

    async fn notify(&self, text: &str) -> EnforcementResult<()> {
        info!(target: CONSOLE_TARGET, "notify: {text}");
        Ok(())
    }
}

/// Writes admin commands to the console log instead of a server connection
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleCommandSink;

#[async_trait]
impl CommandSink for ConsoleCommandSink {
    async fn send(&self, words: Vec<String>) -> EnforcementResult<()> {
        info!(target: CONSOLE_TARGET, command = %words.join(" "), "Server command");
        Ok(())
    }
}
