//! Kill processing worker
//!
//! The single consumer of the [`KillQueue`]. Drains it in arrival order,
//! normalizes each kill against the player directory and weapon dictionary,
//! and feeds the enforcer registry. All enforcer state lives here, so no
//! locking is needed for it.

use crate::enforcement::{EffectRunner, EnforcementEffect, EnforcerRegistry};
use crate::lifecycle::LifecycleHandle;
use crate::logging::log_pipeline_error;
use crate::players::{PlayerDirectory, PlayerSnapshot};
use crate::queue::{KillEvent, KillQueue, QueueItem};
use crate::weapons::{DamageCategory, WeaponDictionary, WeaponError};
use crate::{CONSOLE_TARGET, ENFORCEMENT_TARGET};
use chrono::{DateTime, Utc};
use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const SLOW_BATCH: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Malformed kill: {0}")]
    Malformed(#[from] WeaponError),

    #[error("Escalation panicked: {0}")]
    Panicked(String),
}

/// A kill resolved against the directory and dictionary
#[derive(Debug, Clone, PartialEq)]
pub struct KillRecord {
    pub killer: PlayerSnapshot,
    pub victim: PlayerSnapshot,
    pub weapon_code: String,
    /// Short name, or the code when no name is known
    pub weapon_name: String,
    pub category: DamageCategory,
    pub timestamp: DateTime<Utc>,
    pub is_suicide: bool,
    pub is_teamkill: bool,
    pub is_headshot: bool,
}

impl fmt::Display for KillRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.killer.verbose_name, self.weapon_name, self.victim.verbose_name
        )
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Run `f`, turning a panic into a `PipelineError`
fn guarded<T>(f: impl FnOnce() -> T) -> Result<T, PipelineError> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| PipelineError::Panicked(panic_message(&*payload)))
}

pub struct KillProcessor {
    queue: Arc<KillQueue>,
    players: PlayerDirectory,
    weapons: Arc<WeaponDictionary>,
    registry: EnforcerRegistry,
    runner: EffectRunner,
    lifecycle: LifecycleHandle,
    idle_wait: Duration,
}

impl KillProcessor {
    pub fn new(
        queue: Arc<KillQueue>,
        players: PlayerDirectory,
        weapons: Arc<WeaponDictionary>,
        registry: EnforcerRegistry,
        runner: EffectRunner,
        lifecycle: LifecycleHandle,
        idle_wait: Duration,
    ) -> Self {
        Self {
            queue,
            players,
            weapons,
            registry,
            runner,
            lifecycle,
            idle_wait,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &EnforcerRegistry {
        &self.registry
    }

    /// Loop until the pipeline leaves the enabled state
    pub async fn run(mut self) {
        info!(target: CONSOLE_TARGET, "Kill processing started");
        while self.lifecycle.is_enabled() {
            let batch = self.queue.drain_all();
            if batch.is_empty() {
                self.queue.wait(self.idle_wait).await;
                continue;
            }

            let started = Instant::now();
            let size = batch.len();
            self.process_batch(batch);
            let elapsed = started.elapsed();
            if elapsed > SLOW_BATCH {
                warn!(
                    target: CONSOLE_TARGET,
                    items = size,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "Kill batch took longer than a second"
                );
            }
        }
        info!(target: CONSOLE_TARGET, "Kill processing stopped");
    }

    /// Handle a drained batch in order; failures skip only the failing item
    pub fn process_batch(&mut self, batch: Vec<QueueItem>) {
        for item in batch {
            self.process_item(item);
        }
    }

    pub fn process_item(&mut self, item: QueueItem) {
        match item {
            QueueItem::Kill(event) => match self.process_kill(&event) {
                Ok(effects) => {
                    if !effects.is_empty() {
                        self.runner.run(effects);
                    }
                }
                Err(e) => log_pipeline_error(&format!("kill {} -> {}", event.killer, event.victim), &e),
            },
            QueueItem::PlayerLeft(player) => self.registry.on_player_departed(&player),
            QueueItem::RoundOver => self.registry.on_round_over(),
            QueueItem::Reconfigure(configs) => {
                info!(target: ENFORCEMENT_TARGET, enforcers = configs.len(), "Enforcers reconfigured");
                self.registry.reconfigure(configs);
            }
        }
    }

    /// Normalize and route one kill
    ///
    /// # Errors
    /// Returns `PipelineError::Malformed` for a kill without a weapon code and
    /// `PipelineError::Panicked` if escalation panicked.
    pub fn process_kill(&mut self, event: &KillEvent) -> Result<Vec<EnforcementEffect>, PipelineError> {
        let Some(record) = self.normalize(event)? else {
            return Ok(Vec::new());
        };
        if record.is_suicide {
            return Ok(Vec::new());
        }
        debug!(target: ENFORCEMENT_TARGET, kill = %record, category = %record.category, "Kill");
        let registry = &mut self.registry;
        guarded(|| registry.process(&record))
    }

    /// `None` when either player is no longer known
    fn normalize(&self, event: &KillEvent) -> Result<Option<KillRecord>, PipelineError> {
        let (Some(killer), Some(victim)) = (
            self.players.snapshot(&event.killer),
            self.players.snapshot(&event.victim),
        ) else {
            debug!(
                target: ENFORCEMENT_TARGET,
                killer = %event.killer,
                victim = %event.victim,
                "Kill references an unknown player, skipped"
            );
            return Ok(None);
        };
        let category = self.weapons.classify(&event.weapon)?;
        let is_suicide = event.is_suicide
            || event.killer == event.victim
            || category == DamageCategory::Suicide;

        Ok(Some(KillRecord {
            killer,
            victim,
            weapon_code: event.weapon.clone(),
            weapon_name: self.weapons.display_name(&event.weapon).to_string(),
            category,
            timestamp: event.timestamp,
            is_suicide,
            is_teamkill: event.is_teamkill,
            is_headshot: event.is_headshot,
        }))
    }
}
