//! Per-player escalation state
//!
//! Every (enforcer, player, weapon) triple carries an explicit [`WeaponStage`]
//! that only ever moves forward, so threshold notices fire once. Warnings are
//! counted per (enforcer, player) in a [`WarningCounter`].

use crate::enforcement::{EnforcementError, EnforcementResult};
use std::fmt;

/// Threshold notices, in firing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NoticeLevel {
    Seventy,
    Ninety,
    Full,
}

impl NoticeLevel {
    pub const ALL: [Self; 3] = [Self::Seventy, Self::Ninety, Self::Full];

    /// Kill count at which this notice fires for a limit of `min_kills`
    #[must_use]
    pub fn threshold(self, min_kills: u32) -> u32 {
        let fraction = match self {
            Self::Seventy => 0.7,
            Self::Ninety => 0.9,
            Self::Full => return min_kills,
        };
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let count = (f64::from(min_kills) * fraction).round() as u32;
        count
    }

    #[must_use]
    pub const fn percent(self) -> u32 {
        match self {
            Self::Seventy => 70,
            Self::Ninety => 90,
            Self::Full => 100,
        }
    }
}

impl fmt::Display for NoticeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.percent())
    }
}

/// Where a player stands with one weapon under one enforcer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum WeaponStage {
    #[default]
    Tracking,
    Noticed(NoticeLevel),
    /// Past the kill limit, subject to warnings
    OverLimit,
}

impl fmt::Display for WeaponStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tracking => write!(f, "Tracking"),
            Self::Noticed(level) => write!(f, "Noticed({level})"),
            Self::OverLimit => write!(f, "OverLimit"),
        }
    }
}

/// Kill count and stage for one weapon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WeaponUsage {
    pub count: u32,
    pub stage: WeaponStage,
}

impl WeaponUsage {
    /// Move the stage forward; returns whether it changed
    ///
    /// # Errors
    /// Returns an error if `next` lies behind the current stage
    pub fn advance(&mut self, next: WeaponStage) -> EnforcementResult<bool> {
        if next < self.stage {
            return Err(EnforcementError::InvalidStateTransition {
                from: self.stage.to_string(),
                to: next.to_string(),
            });
        }
        let changed = next != self.stage;
        self.stage = next;
        Ok(changed)
    }

    /// Count one kill and return the notice it crosses, if any
    ///
    /// Coinciding thresholds fire only the highest notice.
    pub fn record_kill(&mut self, min_kills: u32) -> Option<NoticeLevel> {
        self.count = self.count.saturating_add(1);
        if self.count > min_kills {
            // OverLimit is the last stage, reachable from any other
            self.stage = WeaponStage::OverLimit;
            return None;
        }
        let level = NoticeLevel::ALL
            .into_iter()
            .rev()
            .find(|level| level.threshold(min_kills) == self.count)?;
        matches!(self.advance(WeaponStage::Noticed(level)), Ok(true)).then_some(level)
    }
}

/// Ordered weapon usage of one player under one enforcer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackingEntry {
    weapons: Vec<(String, WeaponUsage)>,
}

impl TrackingEntry {
    /// Count a kill with `weapon`, returning the new count and any notice
    pub fn record_kill(&mut self, weapon: &str, min_kills: u32) -> (u32, Option<NoticeLevel>) {
        let index = match self.weapons.iter().position(|(name, _)| name == weapon) {
            Some(index) => index,
            None => {
                self.weapons.push((weapon.to_string(), WeaponUsage::default()));
                self.weapons.len() - 1
            }
        };
        let usage = &mut self.weapons[index].1;
        let notice = usage.record_kill(min_kills);
        (usage.count, notice)
    }

    #[must_use]
    pub fn usage(&self, weapon: &str) -> Option<WeaponUsage> {
        self.weapons
            .iter()
            .find(|(name, _)| name == weapon)
            .map(|(_, usage)| *usage)
    }

    #[must_use]
    pub fn count(&self, weapon: &str) -> u32 {
        self.usage(weapon).map_or(0, |usage| usage.count)
    }

    #[must_use]
    pub fn total_kills(&self) -> u32 {
        self.weapons.iter().map(|(_, usage)| usage.count).sum()
    }

    pub fn weapons(&self) -> impl Iterator<Item = (&str, &WeaponUsage)> {
        self.weapons.iter().map(|(name, usage)| (name.as_str(), usage))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.weapons.is_empty()
    }
}

/// Wording of a warning message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningTier {
    First,
    Repeated,
    ChangePlaystyle,
    Final,
}

impl WarningTier {
    /// Tier for the `number`th warning (1-based) out of `max_warnings`
    #[must_use]
    pub fn for_warning(number: u32, max_warnings: u32) -> Self {
        if number == max_warnings {
            Self::Final
        } else if number == 1 {
            Self::First
        } else if number + 2 == max_warnings {
            Self::ChangePlaystyle
        } else {
            Self::Repeated
        }
    }
}

impl fmt::Display for WarningTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => write!(f, "first"),
            Self::Repeated => write!(f, "repeated"),
            Self::ChangePlaystyle => write!(f, "change playstyle"),
            Self::Final => write!(f, "final"),
        }
    }
}

/// Next step for a player over the limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    Warn { tier: WarningTier, number: u32 },
    Punish,
}

/// Warnings issued to one player under one enforcer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarningCounter {
    issued: u32,
}

impl WarningCounter {
    #[must_use]
    pub const fn issued(self) -> u32 {
        self.issued
    }

    /// Issue the next warning, or punish once `max_warnings` were issued
    pub fn escalate(&mut self, max_warnings: u32) -> Escalation {
        if self.issued >= max_warnings {
            return Escalation::Punish;
        }
        self.issued += 1;
        Escalation::Warn {
            tier: WarningTier::for_warning(self.issued, max_warnings),
            number: self.issued,
        }
    }
}
