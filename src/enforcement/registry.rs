//! Enforcer registry
//!
//! Holds the configured enforcers in configuration order and routes each kill
//! to at most one of them.

use crate::ENFORCEMENT_TARGET;
use crate::config::EnforcerConfig;
use crate::enforcement::{EnforcementEffect, EnforcementError, EnforcementResult, Enforcer};
use crate::worker::KillRecord;
use std::collections::HashMap;
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct EnforcerRegistry {
    enforcers: Vec<Enforcer>,
}

impl EnforcerRegistry {
    #[must_use]
    pub fn new(configs: Vec<EnforcerConfig>) -> Self {
        Self {
            enforcers: configs.into_iter().map(Enforcer::new).collect(),
        }
    }

    /// First active enforcer monitoring the kill's weapon
    #[must_use]
    pub fn route(&self, record: &KillRecord) -> Option<&Enforcer> {
        self.route_index(record).map(|index| &self.enforcers[index])
    }

    fn route_index(&self, record: &KillRecord) -> Option<usize> {
        self.enforcers
            .iter()
            .position(|enforcer| enforcer.is_active() && enforcer.monitors(&record.weapon_name))
    }

    /// Route a kill and let the matched enforcer escalate
    pub fn process(&mut self, record: &KillRecord) -> Vec<EnforcementEffect> {
        match self.route_index(record) {
            Some(index) => self.enforcers[index].handle_kill(record),
            None => {
                debug!(
                    target: ENFORCEMENT_TARGET,
                    weapon = %record.weapon_name,
                    "No enforcer monitors weapon"
                );
                Vec::new()
            }
        }
    }

    pub fn on_player_departed(&mut self, player: &str) {
        let cleared = self
            .enforcers
            .iter_mut()
            .filter_map(|enforcer| enforcer.on_player_departed(player).then_some(enforcer.id()))
            .collect::<Vec<_>>();
        if !cleared.is_empty() {
            debug!(
                target: ENFORCEMENT_TARGET,
                player = %player,
                enforcers = ?cleared,
                "Cleared tracking for departed player"
            );
        }
    }

    pub fn on_round_over(&mut self) {
        for enforcer in &mut self.enforcers {
            if enforcer.on_round_over() {
                info!(
                    target: ENFORCEMENT_TARGET,
                    enforcer_id = enforcer.id(),
                    "Round over, tracking reset"
                );
            }
        }
    }

    /// Replace the configurations; enforcers whose id survives keep their state
    pub fn reconfigure(&mut self, configs: Vec<EnforcerConfig>) {
        let mut previous: HashMap<u32, Enforcer> = self
            .enforcers
            .drain(..)
            .map(|enforcer| (enforcer.id(), enforcer))
            .collect();
        self.enforcers = configs
            .into_iter()
            .map(|config| match previous.remove(&config.id) {
                Some(mut enforcer) => {
                    enforcer.update_config(config);
                    enforcer
                }
                None => Enforcer::new(config),
            })
            .collect();
        for id in previous.keys() {
            info!(target: ENFORCEMENT_TARGET, enforcer_id = id, "Enforcer removed");
        }
    }

    /// # Errors
    /// Returns `EnforcementError::UnknownEnforcer` if no enforcer has this id
    pub fn get(&self, id: u32) -> EnforcementResult<&Enforcer> {
        self.enforcers
            .iter()
            .find(|enforcer| enforcer.id() == id)
            .ok_or(EnforcementError::UnknownEnforcer(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Enforcer> {
        self.enforcers.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.enforcers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.enforcers.is_empty()
    }
}
