//! Enforcement system
//!
//! Enforcers track monitored weapon usage per player and escalate from
//! notices to warnings to a punishment. Their decisions come out as
//! [`EnforcementEffect`]s which the [`EffectRunner`] delivers.

mod action;
mod dispatch;
mod enforcer;
mod error;
mod notify;
mod registry;
mod runner;
mod state;

pub use action::{EnforcementEffect, MessageKind, PunishmentRequest, PunishmentType};
pub use dispatch::{
    AdminCommandBackend, CommandSink, DelegatedBackend, ModerationRequest, ModerationService,
    PluginCallModeration, PunishmentBackend, PunishmentDispatcher,
};
pub use enforcer::Enforcer;
pub use error::{EnforcementError, EnforcementResult};
pub use notify::{DEFAULT_NOTIFICATION_TEMPLATE, NotificationTemplate, Notifier};
pub use registry::EnforcerRegistry;
pub use runner::EffectRunner;
pub use state::{
    Escalation, NoticeLevel, TrackingEntry, WarningCounter, WarningTier, WeaponStage, WeaponUsage,
};
