//! Configuration
//!
//! Settings for the pipeline and one [`EnforcerConfig`] per configured
//! enforcer. Files are YAML; single options arrive as text from the host's
//! settings surface and are validated field by field.

use crate::enforcement::PunishmentType;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Unknown option: {0}")]
    UnknownOption(String),

    #[error("No enforcer with id {0}")]
    UnknownEnforcer(u32),

    #[error("Invalid value '{value}' for {option}: {reason}")]
    InvalidValue {
        option: String,
        value: String,
        reason: String,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

fn invalid(option: &str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        option: option.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// Lifecycle of a single enforcer
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EnforcerState {
    #[default]
    #[display("Disabled")]
    Disabled,
    #[display("Enabled")]
    Enabled,
    /// Dry run: state is tracked but nothing reaches players
    #[display("Virtual")]
    Virtual,
}

impl FromStr for EnforcerState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" => Ok(Self::Disabled),
            "enabled" => Ok(Self::Enabled),
            "virtual" => Ok(Self::Virtual),
            other => Err(format!("expected Disabled, Enabled or Virtual, got {other}")),
        }
    }
}

/// Which punishment backend executes decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackendKind {
    /// Issue admin commands directly
    #[default]
    Direct,
    /// Hand decisions to an external moderation plugin
    Delegated,
}

/// Limits that apply to one player under one enforcer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub min_kills: u32,
    pub max_warnings: u32,
}

/// Policy for one group of monitored weapons
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnforcerConfig {
    pub id: u32,
    pub state: EnforcerState,
    pub punishment: PunishmentType,
    /// Weapon display names this enforcer monitors
    pub weapons: BTreeSet<String>,
    pub min_kills: u32,
    pub max_warnings: u32,
    pub max_kdr: f64,
    /// Kills per minute gate, off when unset
    pub max_kpm: Option<f64>,
    /// Use the higher limits below for reserved-slot players
    pub reserved_limits: bool,
    pub reserved_min_kills: u32,
    pub reserved_max_warnings: u32,
    pub temp_ban_minutes: u32,
    pub chat_log: bool,
    pub initial_message: bool,
    pub percent_messages: bool,
    /// Keep tracking state across round changes
    pub persist_across_rounds: bool,
}

impl Default for EnforcerConfig {
    fn default() -> Self {
        Self {
            id: 0,
            state: EnforcerState::Disabled,
            punishment: PunishmentType::Kill,
            weapons: BTreeSet::new(),
            min_kills: 10,
            max_warnings: 2,
            max_kdr: 3.0,
            max_kpm: None,
            reserved_limits: false,
            reserved_min_kills: 15,
            reserved_max_warnings: 3,
            temp_ban_minutes: 60,
            chat_log: true,
            initial_message: true,
            percent_messages: true,
            persist_across_rounds: false,
        }
    }
}

fn parse_bool(option: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(option, value, "expected yes or no")),
    }
}

fn parse_number<T: FromStr>(option: &str, value: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| invalid(option, value, "not a number"))
}

fn parse_ratio(option: &str, value: &str) -> ConfigResult<f64> {
    let ratio: f64 = parse_number(option, value)?;
    if !ratio.is_finite() || ratio < 0.0 {
        return Err(invalid(option, value, "must be a positive number"));
    }
    Ok(ratio)
}

/// `"3. Enforcer 1|Min Kills"` -> `"min_kills"`
fn normalize_option(key: &str) -> String {
    let key = key.rsplit('|').next().unwrap_or(key);
    key.trim().to_ascii_lowercase().replace([' ', '-'], "_")
}

impl EnforcerConfig {
    #[must_use]
    pub fn new(id: u32) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// Limits for a player, taking the reserved-slot variants into account
    #[must_use]
    pub fn limits_for(&self, reserved: bool) -> Limits {
        if reserved && self.reserved_limits {
            Limits {
                min_kills: self.reserved_min_kills,
                max_warnings: self.reserved_max_warnings,
            }
        } else {
            Limits {
                min_kills: self.min_kills,
                max_warnings: self.max_warnings,
            }
        }
    }

    #[must_use]
    pub fn monitors(&self, weapon_name: &str) -> bool {
        self.weapons.contains(weapon_name)
    }

    /// Apply one text-encoded option. On error the previous value is kept.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownOption` for an unrecognised key and
    /// `ConfigError::InvalidValue` when the value fails to parse or validate.
    pub fn set_option(&mut self, key: &str, value: &str) -> ConfigResult<()> {
        let option = normalize_option(key);
        match option.as_str() {
            "state" => {
                self.state = value
                    .parse()
                    .map_err(|reason: String| invalid(&option, value, reason))?;
            }
            "punishment" => {
                self.punishment = value
                    .parse()
                    .map_err(|reason: String| invalid(&option, value, reason))?;
            }
            "weapons" => {
                self.weapons = value
                    .split(['|', ',', '\n'])
                    .map(monitored_name)
                    .filter(|name| !name.is_empty() && *name != "None")
                    .map(ToString::to_string)
                    .collect();
            }
            "min_kills" => {
                let kills: u32 = parse_number(&option, value)?;
                if kills == 0 {
                    return Err(invalid(&option, value, "must be at least 1"));
                }
                self.min_kills = kills;
            }
            "max_warnings" => self.max_warnings = parse_number(&option, value)?,
            "max_kdr" => self.max_kdr = parse_ratio(&option, value)?,
            "max_kpm" => {
                let kpm = parse_ratio(&option, value)?;
                self.max_kpm = (kpm > 0.0).then_some(kpm);
            }
            "reserved_limits" => self.reserved_limits = parse_bool(&option, value)?,
            "reserved_min_kills" => {
                let kills: u32 = parse_number(&option, value)?;
                if kills == 0 {
                    return Err(invalid(&option, value, "must be at least 1"));
                }
                self.reserved_min_kills = kills;
            }
            "reserved_max_warnings" => self.reserved_max_warnings = parse_number(&option, value)?,
            "temp_ban_minutes" => {
                let minutes: u32 = parse_number(&option, value)?;
                if minutes == 0 {
                    return Err(invalid(&option, value, "must be at least 1"));
                }
                self.temp_ban_minutes = minutes;
            }
            "chat_log" => self.chat_log = parse_bool(&option, value)?,
            "initial_message" => self.initial_message = parse_bool(&option, value)?,
            "percent_messages" => self.percent_messages = parse_bool(&option, value)?,
            "persist_across_rounds" => self.persist_across_rounds = parse_bool(&option, value)?,
            _ => return Err(ConfigError::UnknownOption(key.to_string())),
        }
        Ok(())
    }

    /// Clamp values a hand-edited file may carry, returning what was changed
    pub fn validate(&mut self) -> Vec<String> {
        let defaults = Self::default();
        let mut warnings = Vec::new();
        let id = self.id;

        if self.min_kills == 0 {
            warnings.push(format!("Enforcer {id}: min_kills 0 reset to {}", defaults.min_kills));
            self.min_kills = defaults.min_kills;
        }
        if self.reserved_min_kills == 0 {
            warnings.push(format!(
                "Enforcer {id}: reserved_min_kills 0 reset to {}",
                defaults.reserved_min_kills
            ));
            self.reserved_min_kills = defaults.reserved_min_kills;
        }
        if !self.max_kdr.is_finite() || self.max_kdr < 0.0 {
            warnings.push(format!(
                "Enforcer {id}: max_kdr {} reset to {}",
                self.max_kdr, defaults.max_kdr
            ));
            self.max_kdr = defaults.max_kdr;
        }
        if let Some(kpm) = self.max_kpm {
            if !kpm.is_finite() || kpm <= 0.0 {
                warnings.push(format!("Enforcer {id}: max_kpm {kpm} disabled"));
                self.max_kpm = None;
            }
        }
        if self.temp_ban_minutes == 0 {
            warnings.push(format!(
                "Enforcer {id}: temp_ban_minutes 0 reset to {}",
                defaults.temp_ban_minutes
            ));
            self.temp_ban_minutes = defaults.temp_ban_minutes;
        }

        let trimmed: BTreeSet<String> = self
            .weapons
            .iter()
            .map(|name| monitored_name(name).to_string())
            .filter(|name| !name.is_empty())
            .collect();
        if trimmed != self.weapons {
            warnings.push(format!("Enforcer {id}: weapon names cleaned up"));
            self.weapons = trimmed;
        }
        warnings
    }
}

/// Display name from a weapon choice, dropping any `Category\` prefix
fn monitored_name(choice: &str) -> &str {
    let choice = choice.trim();
    choice.rsplit('\\').next().unwrap_or(choice).trim()
}

/// Pipeline-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FarmingConfig {
    /// Delay between a punishment decision and the backend command
    pub settle_delay_secs: u64,
    /// How long the worker sleeps on an empty queue before rechecking state
    pub idle_wait_secs: u64,
    pub shutdown_poll_ms: u64,
    pub shutdown_max_attempts: u32,
    pub backend: BackendKind,
    /// Plugin receiving delegated moderation requests
    pub moderation_plugin: String,
    /// Identity reported as the source of delegated requests
    pub caller_identity: String,
    pub notification_template: String,
    /// Profile link with a `{name}` placeholder
    pub profile_url: String,
    pub weapon_defines_file: String,
    pub weapon_names_file: String,
    pub enforcers: Vec<EnforcerConfig>,
}

impl Default for FarmingConfig {
    fn default() -> Self {
        Self {
            settle_delay_secs: 3,
            idle_wait_secs: 5,
            shutdown_poll_ms: 500,
            shutdown_max_attempts: 120,
            backend: BackendKind::Direct,
            moderation_plugin: "AdKats".to_string(),
            caller_identity: crate::PLUGIN_NAME.to_string(),
            notification_template: crate::enforcement::DEFAULT_NOTIFICATION_TEMPLATE.to_string(),
            profile_url: "https://battlelog.battlefield.com/bf4/user/{name}/".to_string(),
            weapon_defines_file: "data/weapon_defines.yaml".to_string(),
            weapon_names_file: "data/weapon_names.json".to_string(),
            enforcers: Vec::new(),
        }
    }
}

impl FarmingConfig {
    /// Load the configuration from a YAML file
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path).await?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Clamp invalid values and drop duplicate enforcer ids
    pub fn validate(&mut self) -> Vec<String> {
        let defaults = Self::default();
        let mut warnings = Vec::new();

        if self.idle_wait_secs == 0 {
            warnings.push(format!("idle_wait_secs 0 reset to {}", defaults.idle_wait_secs));
            self.idle_wait_secs = defaults.idle_wait_secs;
        }
        if self.shutdown_poll_ms == 0 {
            warnings.push(format!("shutdown_poll_ms 0 reset to {}", defaults.shutdown_poll_ms));
            self.shutdown_poll_ms = defaults.shutdown_poll_ms;
        }
        if self.shutdown_max_attempts == 0 {
            warnings.push(format!(
                "shutdown_max_attempts 0 reset to {}",
                defaults.shutdown_max_attempts
            ));
            self.shutdown_max_attempts = defaults.shutdown_max_attempts;
        }

        let mut seen = HashSet::new();
        self.enforcers.retain(|enforcer| {
            let fresh = seen.insert(enforcer.id);
            if !fresh {
                warnings.push(format!("Duplicate enforcer id {} ignored", enforcer.id));
            }
            fresh
        });
        for enforcer in &mut self.enforcers {
            warnings.extend(enforcer.validate());
        }
        warnings
    }

    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    #[must_use]
    pub fn idle_wait(&self) -> Duration {
        Duration::from_secs(self.idle_wait_secs)
    }

    #[must_use]
    pub fn shutdown_poll(&self) -> Duration {
        Duration::from_millis(self.shutdown_poll_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weapons::{DamageCategory, WeaponDefine, WeaponDictionary, WeaponNames, WeaponScope};
    use std::collections::HashMap;

    #[test]
    fn test_weapon_choices_feed_monitored_set() {
        let dictionary = WeaponDictionary::populate(
            &[WeaponDefine {
                code: "U_M98B".into(),
                damage: DamageCategory::SniperRifle,
            }],
            HashMap::from([(
                "U_M98B".to_string(),
                WeaponNames {
                    readable_short: "M98B".into(),
                    readable_long: "Barrett M98B".into(),
                },
            )]),
        );
        let choices = dictionary.weapon_choices(WeaponScope::All);
        assert_eq!(choices, vec!["SniperRifle\\M98B".to_string()]);

        let mut config = EnforcerConfig::new(1);
        config.set_option("Weapons", &choices.join("|")).unwrap();
        assert!(config.monitors(dictionary.display_name("U_M98B")));

        let mut edited = EnforcerConfig::new(2);
        edited.weapons = ["SniperRifle\\M98B".to_string()].into_iter().collect();
        assert_eq!(edited.validate().len(), 1);
        assert!(edited.monitors("M98B"));
    }

    #[test]
    fn test_set_option_accepts_labels() {
        let mut config = EnforcerConfig::new(1);
        config.set_option("3. Enforcer 1|Min Kills", "25").unwrap();
        config.set_option("Max KDR", "4.5").unwrap();
        config.set_option("state", "virtual").unwrap();
        config.set_option("Punishment", "Temp Ban").unwrap();
        config.set_option("Weapons", "M98B|SRR-61| |None").unwrap();
        config.set_option("Persist Across Rounds", "Yes").unwrap();

        assert_eq!(config.min_kills, 25);
        assert!((config.max_kdr - 4.5).abs() < f64::EPSILON);
        assert_eq!(config.state, EnforcerState::Virtual);
        assert_eq!(config.punishment, PunishmentType::TempBan);
        assert_eq!(config.weapons.len(), 2);
        assert!(config.monitors("SRR-61"));
        assert!(config.persist_across_rounds);
    }

    #[test]
    fn test_set_option_keeps_previous_value_on_error() {
        let mut config = EnforcerConfig::new(1);
        config.set_option("min_kills", "12").unwrap();

        assert!(matches!(
            config.set_option("min_kills", "twelve"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(config.set_option("min_kills", "0").is_err());
        assert!(config.set_option("min_kills", "-4").is_err());
        assert_eq!(config.min_kills, 12);

        assert!(config.set_option("max_kdr", "NaN").is_err());
        assert!(config.set_option("max_kdr", "-1").is_err());
        assert!((config.max_kdr - 3.0).abs() < f64::EPSILON);

        assert!(config.set_option("chat_log", "maybe").is_err());
        assert!(config.chat_log);

        assert!(matches!(
            config.set_option("volume", "11"),
            Err(ConfigError::UnknownOption(_))
        ));
    }

    #[test]
    fn test_max_kpm_zero_disables_gate() {
        let mut config = EnforcerConfig::new(1);
        config.set_option("max_kpm", "2.5").unwrap();
        assert_eq!(config.max_kpm, Some(2.5));
        config.set_option("max_kpm", "0").unwrap();
        assert_eq!(config.max_kpm, None);
    }

    #[test]
    fn test_reserved_limits() {
        let mut config = EnforcerConfig::new(1);
        assert_eq!(config.limits_for(true).min_kills, 10);

        config.reserved_limits = true;
        assert_eq!(
            config.limits_for(true),
            Limits {
                min_kills: 15,
                max_warnings: 3
            }
        );
        assert_eq!(config.limits_for(false).min_kills, 10);
    }

    #[test]
    fn test_validate_clamps_and_dedupes() {
        let mut config = FarmingConfig {
            idle_wait_secs: 0,
            enforcers: vec![
                EnforcerConfig {
                    min_kills: 0,
                    max_kdr: f64::NAN,
                    ..EnforcerConfig::new(1)
                },
                EnforcerConfig::new(1),
                EnforcerConfig::new(2),
            ],
            ..Default::default()
        };

        let warnings = config.validate();
        assert_eq!(config.idle_wait_secs, 5);
        assert_eq!(config.enforcers.len(), 2);
        assert_eq!(config.enforcers[0].min_kills, 10);
        assert!((config.enforcers[0].max_kdr - 3.0).abs() < f64::EPSILON);
        assert!(warnings.iter().any(|w| w.contains("Duplicate enforcer id 1")));
        assert_eq!(warnings.len(), 4);
    }

    #[test]
    fn test_config_serialization() {
        let yaml = r"
settle_delay_secs: 5
backend: Delegated
enforcers:
  - id: 7
    state: Enabled
    punishment: PermanentBan
    weapons: [M98B, SRR-61]
    min_kills: 20
";
        let config: FarmingConfig = serde_yaml::from_str(yaml).expect("Failed to deserialize");
        assert_eq!(config.settle_delay(), Duration::from_secs(5));
        assert_eq!(config.backend, BackendKind::Delegated);
        assert_eq!(config.idle_wait_secs, 5);

        let enforcer = &config.enforcers[0];
        assert_eq!(enforcer.id, 7);
        assert_eq!(enforcer.punishment, PunishmentType::PermanentBan);
        assert_eq!(enforcer.min_kills, 20);
        assert_eq!(enforcer.max_warnings, 2);

        let serialized = serde_yaml::to_string(&config).expect("Failed to serialize");
        assert!(serialized.contains("backend: Delegated"));
        assert!(serialized.contains("punishment: PermanentBan"));
    }

    #[tokio::test]
    async fn test_load_missing_file_uses_defaults() {
        let config = FarmingConfig::load("does/not/exist.yaml").await.unwrap();
        assert_eq!(config, FarmingConfig::default());
    }
}
