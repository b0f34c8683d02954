//! The escalation engine
//!
//! An [`Enforcer`] owns the tracking and warning state of every player it has
//! seen and turns each monitored kill into a list of [`EnforcementEffect`]s.
//! It performs no I/O itself; the worker hands the effects to an
//! [`EffectRunner`](crate::enforcement::EffectRunner).

use crate::ENFORCEMENT_TARGET;
use crate::config::{EnforcerConfig, EnforcerState, Limits};
use crate::enforcement::action::{EnforcementEffect, MessageKind, PunishmentRequest};
use crate::enforcement::state::{
    Escalation, NoticeLevel, TrackingEntry, WarningCounter, WarningTier,
};
use crate::players::PlayerSnapshot;
use crate::worker::KillRecord;
use std::collections::HashMap;
use tracing::{debug, info};

/// Round to two decimals, the precision ratios are compared at
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// One configured enforcer and the state it accumulated
#[derive(Debug, Clone)]
pub struct Enforcer {
    config: EnforcerConfig,
    tracking: HashMap<String, TrackingEntry>,
    warnings: HashMap<String, WarningCounter>,
}

impl Enforcer {
    #[must_use]
    pub fn new(config: EnforcerConfig) -> Self {
        Self {
            config,
            tracking: HashMap::new(),
            warnings: HashMap::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.config.id
    }

    #[must_use]
    pub fn config(&self) -> &EnforcerConfig {
        &self.config
    }

    /// Enabled and virtual enforcers both take part in routing
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.config.state != EnforcerState::Disabled
    }

    #[must_use]
    pub fn monitors(&self, weapon_name: &str) -> bool {
        self.config.monitors(weapon_name)
    }

    /// Swap in a new configuration, keeping the accumulated state
    pub fn update_config(&mut self, config: EnforcerConfig) {
        self.config = config;
    }

    #[must_use]
    pub fn tracking(&self, player: &str) -> Option<&TrackingEntry> {
        self.tracking.get(player)
    }

    #[must_use]
    pub fn warnings(&self, player: &str) -> u32 {
        self.warnings.get(player).map_or(0, |counter| counter.issued())
    }

    #[must_use]
    pub fn tracked_players(&self) -> usize {
        self.tracking.len()
    }

    /// Count a monitored kill and escalate as far as the limits demand
    pub fn handle_kill(&mut self, record: &KillRecord) -> Vec<EnforcementEffect> {
        if !self.is_active() || !self.monitors(&record.weapon_name) {
            return Vec::new();
        }
        let killer = &record.killer;
        let weapon = record.weapon_name.as_str();
        let limits = self.config.limits_for(killer.reserved);

        let (first, count, notice) = {
            let entry = self.tracking.entry(killer.name.clone()).or_default();
            let first = entry.is_empty();
            let (count, notice) = entry.record_kill(weapon, limits.min_kills);
            (first, count, notice)
        };
        debug!(
            target: ENFORCEMENT_TARGET,
            enforcer_id = self.id(),
            player = %killer.name,
            weapon = %weapon,
            count = count,
            "Tracked monitored kill"
        );

        let mut effects = Vec::new();
        if first && self.config.initial_message {
            effects.push(self.message(killer, MessageKind::Initial, self.initial_text(weapon, limits)));
        }
        if let Some(level) = notice.filter(|_| self.config.percent_messages) {
            let text = threshold_text(weapon, count, limits.min_kills, level);
            effects.push(self.message(killer, MessageKind::Threshold(level), text));
        }
        if count > limits.min_kills && self.exceeds_ratio(killer) {
            effects.extend(self.escalate(killer, weapon, limits));
        }

        if self.config.state == EnforcerState::Virtual {
            let enforcer_id = self.id();
            effects = effects
                .into_iter()
                .map(|effect| EnforcementEffect::Suppressed {
                    enforcer_id,
                    effect: Box::new(effect),
                })
                .collect();
        }
        effects
    }

    /// Drop everything known about a player who left
    pub fn on_player_departed(&mut self, player: &str) -> bool {
        let tracked = self.tracking.remove(player).is_some();
        let warned = self.warnings.remove(player).is_some();
        tracked || warned
    }

    /// Clear all state unless the enforcer persists across rounds
    pub fn on_round_over(&mut self) -> bool {
        if self.config.persist_across_rounds {
            return false;
        }
        let cleared = !self.tracking.is_empty() || !self.warnings.is_empty();
        self.tracking.clear();
        self.warnings.clear();
        cleared
    }

    fn exceeds_ratio(&self, player: &PlayerSnapshot) -> bool {
        let kdr_hit = round2(player.kdr()) >= round2(self.config.max_kdr);
        let kpm_hit = self.config.max_kpm.is_some_and(|max| player.kpm >= max);
        kdr_hit || kpm_hit
    }

    fn escalate(
        &mut self,
        player: &PlayerSnapshot,
        weapon: &str,
        limits: Limits,
    ) -> Vec<EnforcementEffect> {
        let escalation = self
            .warnings
            .entry(player.name.clone())
            .or_default()
            .escalate(limits.max_warnings);

        match escalation {
            Escalation::Warn { tier, number } => {
                let text = self.warning_text(tier, number, limits.max_warnings, weapon);
                vec![self.message(player, MessageKind::Warning(tier), text)]
            }
            Escalation::Punish => {
                let reason = format!(
                    "Weapon farming {weapon} [KDR {:?}/{:?}]",
                    round2(player.kdr()),
                    round2(self.config.max_kdr)
                );
                info!(
                    target: ENFORCEMENT_TARGET,
                    enforcer_id = self.id(),
                    player = %player.name,
                    punishment = %self.config.punishment,
                    reason = %reason,
                    "Punishment decided"
                );
                let request = PunishmentRequest::new(
                    self.id(),
                    player.clone(),
                    weapon,
                    self.config.punishment,
                    reason.clone(),
                    self.config.temp_ban_minutes,
                );
                let text = format!("{}: {reason}", self.config.punishment);
                vec![
                    self.message(player, MessageKind::Punishment, text),
                    EnforcementEffect::Punish(request),
                ]
            }
        }
    }

    fn message(&self, player: &PlayerSnapshot, kind: MessageKind, text: String) -> EnforcementEffect {
        EnforcementEffect::Message {
            enforcer_id: self.id(),
            player: player.name.clone(),
            text,
            kind,
            log_to_chat: self.config.chat_log,
        }
    }

    fn initial_text(&self, weapon: &str, limits: Limits) -> String {
        format!(
            "{weapon} is limited by enforcer {}: more than {} kills at a KDR of {:.2} or higher is punished.",
            self.id(),
            limits.min_kills,
            self.config.max_kdr
        )
    }

    fn warning_text(&self, tier: WarningTier, number: u32, max: u32, weapon: &str) -> String {
        let punishment = self.config.punishment;
        match tier {
            WarningTier::First => format!(
                "WARNING {number}/{max}: you are over the {weapon} limit. Switch weapons or face a {punishment}."
            ),
            WarningTier::Repeated => {
                format!("WARNING {number}/{max}: still farming with {weapon}.")
            }
            WarningTier::ChangePlaystyle => format!(
                "WARNING {number}/{max}: change your playstyle now, {weapon} is over the limit."
            ),
            WarningTier::Final => format!(
                "FINAL WARNING {number}/{max}: your next {weapon} kill results in a {punishment}."
            ),
        }
    }
}

fn threshold_text(weapon: &str, count: u32, min_kills: u32, level: NoticeLevel) -> String {
    format!("{weapon}: {count}/{min_kills} kills, {level} of the limit.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enforcement::PunishmentType;
    use crate::weapons::DamageCategory;
    use chrono::Utc;

    const SNIPER: &str = "Sniper Rifle";

    fn config(state: EnforcerState) -> EnforcerConfig {
        EnforcerConfig {
            state,
            weapons: [SNIPER.to_string()].into_iter().collect(),
            min_kills: 10,
            max_warnings: 2,
            max_kdr: 5.0,
            ..EnforcerConfig::new(1)
        }
    }

    fn kill(killer: &str, kills: u32, deaths: u32, weapon: &str) -> KillRecord {
        KillRecord {
            killer: PlayerSnapshot {
                name: killer.to_string(),
                verbose_name: killer.to_string(),
                kills,
                deaths,
                ..Default::default()
            },
            victim: PlayerSnapshot {
                name: "Victim".to_string(),
                verbose_name: "Victim".to_string(),
                ..Default::default()
            },
            weapon_code: "U_M98B".to_string(),
            weapon_name: weapon.to_string(),
            category: DamageCategory::SniperRifle,
            timestamp: Utc::now(),
            is_suicide: false,
            is_teamkill: false,
            is_headshot: false,
        }
    }

    fn kinds(effects: &[EnforcementEffect]) -> Vec<String> {
        effects.iter().map(EnforcementEffect::describe).collect()
    }

    #[test]
    fn test_farming_scenario() {
        let mut enforcer = Enforcer::new(config(EnforcerState::Enabled));
        let mut timeline = Vec::new();
        for n in 1..=13 {
            let effects = enforcer.handle_kill(&kill("Farmer", 60, 10, SNIPER));
            if !effects.is_empty() {
                timeline.push((n, kinds(&effects)));
            }
            if let Some(EnforcementEffect::Punish(request)) = effects.last() {
                assert_eq!(request.punishment, PunishmentType::Kill);
                assert!(request.reason.contains(SNIPER));
                assert!(request.reason.contains("6.0/5.0"));
            }
        }

        assert_eq!(
            timeline,
            vec![
                (1, vec!["message initial".to_string()]),
                (7, vec!["message notice 70%".to_string()]),
                (9, vec!["message notice 90%".to_string()]),
                (10, vec!["message notice 100%".to_string()]),
                (11, vec!["message warning first".to_string()]),
                (12, vec!["message warning final".to_string()]),
                (
                    13,
                    vec!["message punishment".to_string(), "punish Kill".to_string()]
                ),
            ]
        );
        assert_eq!(enforcer.tracking("Farmer").map(|t| t.count(SNIPER)), Some(13));
        assert_eq!(enforcer.warnings("Farmer"), 2);
    }

    #[test]
    fn test_virtual_matches_enabled_without_visible_effects() {
        let mut enabled = Enforcer::new(config(EnforcerState::Enabled));
        let mut virtual_ = Enforcer::new(config(EnforcerState::Virtual));

        let mut visible = 0;
        let mut suppressed = 0;
        for _ in 0..14 {
            let record = kill("Farmer", 60, 10, SNIPER);
            visible += enabled.handle_kill(&record).len();
            let effects = virtual_.handle_kill(&record);
            assert!(effects.iter().all(EnforcementEffect::is_suppressed));
            suppressed += effects.len();
        }

        assert_eq!(visible, suppressed);
        assert_eq!(enabled.tracking("Farmer"), virtual_.tracking("Farmer"));
        assert_eq!(enabled.warnings("Farmer"), virtual_.warnings("Farmer"));
    }

    #[test]
    fn test_low_kdr_never_warns() {
        let mut enforcer = Enforcer::new(config(EnforcerState::Enabled));
        for _ in 0..20 {
            let effects = enforcer.handle_kill(&kill("Honest", 20, 10, SNIPER));
            assert!(
                effects
                    .iter()
                    .all(|e| !matches!(e, EnforcementEffect::Punish(_)))
            );
        }
        assert_eq!(enforcer.warnings("Honest"), 0);
        assert_eq!(enforcer.tracking("Honest").map(|t| t.count(SNIPER)), Some(20));
    }

    #[test]
    fn test_kdr_compared_at_two_decimals() {
        let mut enforcer = Enforcer::new(EnforcerConfig {
            min_kills: 1,
            max_kdr: 4.996,
            ..config(EnforcerState::Enabled)
        });
        enforcer.handle_kill(&kill("Edge", 4999, 1001, SNIPER));
        // 4.994 rounds to 4.99 and 4.996 to 5.00
        assert!(enforcer.handle_kill(&kill("Edge", 4994, 1000, SNIPER)).is_empty());
        let effects = enforcer.handle_kill(&kill("Edge", 5000, 1000, SNIPER));
        assert_eq!(kinds(&effects), vec!["message warning first"]);
    }

    #[test]
    fn test_kpm_gate() {
        let mut enforcer = Enforcer::new(EnforcerConfig {
            min_kills: 1,
            max_kpm: Some(2.0),
            initial_message: false,
            percent_messages: false,
            ..config(EnforcerState::Enabled)
        });
        let mut record = kill("Fast", 10, 10, SNIPER);
        record.killer.kpm = 2.5;
        enforcer.handle_kill(&record);
        let effects = enforcer.handle_kill(&record);
        assert_eq!(kinds(&effects), vec!["message warning first"]);
    }

    #[test]
    fn test_departure_and_rejoin_start_fresh() {
        let mut enforcer = Enforcer::new(config(EnforcerState::Enabled));
        for _ in 0..12 {
            enforcer.handle_kill(&kill("Farmer", 60, 10, SNIPER));
        }
        assert!(enforcer.on_player_departed("Farmer"));
        assert!(enforcer.tracking("Farmer").is_none());
        assert_eq!(enforcer.warnings("Farmer"), 0);
        assert!(!enforcer.on_player_departed("Farmer"));

        let effects = enforcer.handle_kill(&kill("Farmer", 60, 10, SNIPER));
        assert_eq!(kinds(&effects), vec!["message initial"]);
        assert_eq!(enforcer.tracking("Farmer").map(|t| t.count(SNIPER)), Some(1));
    }

    #[test]
    fn test_round_over_respects_persistence() {
        let mut enforcer = Enforcer::new(config(EnforcerState::Enabled));
        enforcer.handle_kill(&kill("Farmer", 60, 10, SNIPER));
        assert!(enforcer.on_round_over());
        assert_eq!(enforcer.tracked_players(), 0);

        let mut persistent = Enforcer::new(EnforcerConfig {
            persist_across_rounds: true,
            ..config(EnforcerState::Enabled)
        });
        for _ in 0..11 {
            persistent.handle_kill(&kill("Farmer", 60, 10, SNIPER));
        }
        assert!(!persistent.on_round_over());
        assert_eq!(persistent.tracking("Farmer").map(|t| t.count(SNIPER)), Some(11));
        assert_eq!(persistent.warnings("Farmer"), 1);
    }

    #[test]
    fn test_reserved_players_get_higher_limits() {
        let mut enforcer = Enforcer::new(EnforcerConfig {
            reserved_limits: true,
            reserved_min_kills: 12,
            reserved_max_warnings: 1,
            initial_message: false,
            percent_messages: false,
            ..config(EnforcerState::Enabled)
        });
        let mut record = kill("Vip", 60, 10, SNIPER);
        record.killer.reserved = true;

        let mut first_warning = None;
        for n in 1..=14 {
            let effects = enforcer.handle_kill(&record);
            if first_warning.is_none() && !effects.is_empty() {
                first_warning = Some((n, kinds(&effects)));
            }
        }
        assert_eq!(
            first_warning,
            Some((13, vec!["message warning final".to_string()]))
        );
        assert_eq!(enforcer.warnings("Vip"), 1);
    }

    #[test]
    fn test_zero_warnings_punishes_immediately() {
        let mut enforcer = Enforcer::new(EnforcerConfig {
            min_kills: 1,
            max_warnings: 0,
            punishment: PunishmentType::TempBan,
            temp_ban_minutes: 30,
            ..config(EnforcerState::Enabled)
        });
        enforcer.handle_kill(&kill("Farmer", 60, 10, SNIPER));
        let effects = enforcer.handle_kill(&kill("Farmer", 60, 10, SNIPER));
        match effects.last() {
            Some(EnforcementEffect::Punish(request)) => {
                assert_eq!(request.duration_minutes, Some(30));
                assert_eq!(request.target.name, "Farmer");
            }
            other => panic!("Expected punishment, got {other:?}"),
        }
    }

    #[test]
    fn test_unmonitored_or_disabled_is_ignored() {
        let mut enforcer = Enforcer::new(config(EnforcerState::Enabled));
        assert!(enforcer.handle_kill(&kill("Farmer", 60, 10, "M16A4")).is_empty());
        assert_eq!(enforcer.tracked_players(), 0);

        let mut disabled = Enforcer::new(config(EnforcerState::Disabled));
        assert!(disabled.handle_kill(&kill("Farmer", 60, 10, SNIPER)).is_empty());
        assert_eq!(disabled.tracked_players(), 0);
    }

    #[test]
    fn test_chat_log_flag_carried_on_messages() {
        let mut enforcer = Enforcer::new(EnforcerConfig {
            chat_log: false,
            ..config(EnforcerState::Enabled)
        });
        let effects = enforcer.handle_kill(&kill("Farmer", 60, 10, SNIPER));
        assert!(matches!(
            effects.first(),
            Some(EnforcementEffect::Message {
                log_to_chat: false,
                kind: MessageKind::Initial,
                ..
            })
        ));
    }
}
