//! Enforcement actions
//!
//! Punishment types, the request handed to a punishment backend, and the
//! effects an enforcer asks the outside world to perform.

use crate::enforcement::state::{NoticeLevel, WarningTier};
use crate::players::PlayerSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Punishment applied once a player runs out of warnings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PunishmentType {
    /// Admin kill recorded as a punishment
    Punish,
    #[default]
    Kill,
    Kick,
    /// Time-limited ban followed by a kick
    TempBan,
    /// Permanent ban followed by a kick
    PermanentBan,
}

impl fmt::Display for PunishmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Punish => write!(f, "Punish"),
            Self::Kill => write!(f, "Kill"),
            Self::Kick => write!(f, "Kick"),
            Self::TempBan => write!(f, "Temp Ban"),
            Self::PermanentBan => write!(f, "Permanent Ban"),
        }
    }
}

impl FromStr for PunishmentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "punish" => Ok(Self::Punish),
            "kill" => Ok(Self::Kill),
            "kick" => Ok(Self::Kick),
            "tempban" => Ok(Self::TempBan),
            "permanentban" | "permban" => Ok(Self::PermanentBan),
            _ => Err(format!("unknown punishment type {s}")),
        }
    }
}

impl PunishmentType {
    /// Whether the punishment goes through the server ban list
    #[must_use]
    pub const fn is_ban(self) -> bool {
        matches!(self, Self::TempBan | Self::PermanentBan)
    }
}

/// A decided punishment waiting for dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct PunishmentRequest {
    pub id: Uuid,
    pub enforcer_id: u32,
    pub target: PlayerSnapshot,
    /// Display name of the weapon that triggered the punishment
    pub weapon: String,
    pub punishment: PunishmentType,
    pub reason: String,
    /// Ban length for temporary bans
    pub duration_minutes: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl PunishmentRequest {
    pub fn new(
        enforcer_id: u32,
        target: PlayerSnapshot,
        weapon: impl Into<String>,
        punishment: PunishmentType,
        reason: impl Into<String>,
        temp_ban_minutes: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            enforcer_id,
            target,
            weapon: weapon.into(),
            punishment,
            reason: reason.into(),
            duration_minutes: (punishment == PunishmentType::TempBan).then_some(temp_ban_minutes),
            created_at: Utc::now(),
        }
    }
}

/// What a player-facing message is about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// First monitored kill under an enforcer
    Initial,
    Threshold(NoticeLevel),
    Warning(WarningTier),
    /// Announces the punishment that is about to be dispatched
    Punishment,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::Threshold(level) => write!(f, "notice {level}"),
            Self::Warning(tier) => write!(f, "warning {tier}"),
            Self::Punishment => write!(f, "punishment"),
        }
    }
}

/// Side effect requested by an enforcer
#[derive(Debug, Clone, PartialEq)]
pub enum EnforcementEffect {
    /// Message the player, optionally echoing it to the chat log
    Message {
        enforcer_id: u32,
        player: String,
        text: String,
        kind: MessageKind,
        log_to_chat: bool,
    },
    Punish(PunishmentRequest),
    /// Produced by a virtual enforcer instead of the wrapped effect
    Suppressed {
        enforcer_id: u32,
        effect: Box<EnforcementEffect>,
    },
}

impl EnforcementEffect {
    #[must_use]
    pub fn enforcer_id(&self) -> u32 {
        match self {
            Self::Message { enforcer_id, .. } | Self::Suppressed { enforcer_id, .. } => {
                *enforcer_id
            }
            Self::Punish(request) => request.enforcer_id,
        }
    }

    #[must_use]
    pub fn player(&self) -> &str {
        match self {
            Self::Message { player, .. } => player,
            Self::Punish(request) => &request.target.name,
            Self::Suppressed { effect, .. } => effect.player(),
        }
    }

    #[must_use]
    pub const fn is_suppressed(&self) -> bool {
        matches!(self, Self::Suppressed { .. })
    }

    /// Short label used in structured logs
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Message { kind, .. } => format!("message {kind}"),
            Self::Punish(request) => format!("punish {}", request.punishment),
            Self::Suppressed { effect, .. } => format!("suppressed {}", effect.describe()),
        }
    }
}
