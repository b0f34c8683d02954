//! Farming manager
//!
//! Entry point for the host: coordinated enable/disable, and the callbacks
//! the game server connection invokes for kills, roster changes and round
//! transitions. Kill handling never blocks the caller beyond queueing.

use crate::config::{BackendKind, ConfigError, ConfigResult, EnforcerConfig, FarmingConfig};
use crate::enforcement::{
    AdminCommandBackend, CommandSink, DelegatedBackend, EffectRunner, EnforcerRegistry,
    NotificationTemplate, Notifier, PluginCallModeration, PunishmentBackend, PunishmentDispatcher,
};
use crate::lifecycle::{Lifecycle, LifecycleError, LifecycleResult, PluginState, TaskWatchdog};
use crate::logging::{log_console, log_host_event};
use crate::players::{PlayerDirectory, PlayerStats, ServerInfo};
use crate::queue::{KillEvent, KillQueue, QueueItem};
use crate::weapons::{WeaponDefine, WeaponDictionary, WeaponError, WeaponNameSource};
use crate::worker::KillProcessor;
use crate::{CONSOLE_TARGET, ERROR_TARGET};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::{error, warn};

/// Watchdog name of the kill processing worker
const WORKER_TASK: &str = "kill-processing";

#[derive(Debug, Error)]
pub enum StartupError {
    /// Enforcement does not start without weapon names
    #[error("Weapon names could not be loaded: {0}")]
    WeaponTable(#[from] WeaponError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Punishment backend selected by the configuration
pub fn build_backend(config: &FarmingConfig, sink: Arc<dyn CommandSink>) -> Arc<dyn PunishmentBackend> {
    match config.backend {
        BackendKind::Direct => Arc::new(AdminCommandBackend::new(sink)),
        BackendKind::Delegated => {
            let service = PluginCallModeration::new(sink, config.moderation_plugin.clone());
            Arc::new(DelegatedBackend::new(
                Arc::new(service),
                config.caller_identity.clone(),
            ))
        }
    }
}

pub struct FarmingManager {
    config: RwLock<FarmingConfig>,
    lifecycle: Lifecycle,
    watchdog: TaskWatchdog,
    queue: Arc<KillQueue>,
    players: PlayerDirectory,
    defines: Vec<WeaponDefine>,
    names: Arc<dyn WeaponNameSource>,
    backend: Arc<dyn PunishmentBackend>,
    notifier: Arc<dyn Notifier>,
    weapons: RwLock<Arc<WeaponDictionary>>,
}

impl FarmingManager {
    pub fn new(
        mut config: FarmingConfig,
        defines: Vec<WeaponDefine>,
        names: Arc<dyn WeaponNameSource>,
        backend: Arc<dyn PunishmentBackend>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        for warning in config.validate() {
            warn!(target: CONSOLE_TARGET, "{warning}");
        }
        Self {
            config: RwLock::new(config),
            lifecycle: Lifecycle::new(),
            watchdog: TaskWatchdog::new(),
            queue: Arc::new(KillQueue::new()),
            players: PlayerDirectory::new(),
            defines,
            names,
            backend,
            notifier,
            weapons: RwLock::new(Arc::new(WeaponDictionary::default())),
        }
    }

    fn config(&self) -> FarmingConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn state(&self) -> PluginState {
        self.lifecycle.state()
    }

    #[must_use]
    pub fn players(&self) -> &PlayerDirectory {
        &self.players
    }

    #[must_use]
    pub fn watchdog(&self) -> &TaskWatchdog {
        &self.watchdog
    }

    #[must_use]
    pub fn weapons(&self) -> Arc<WeaponDictionary> {
        Arc::clone(&self.weapons.read().unwrap_or_else(PoisonError::into_inner))
    }

    #[must_use]
    pub fn enforcers(&self) -> Vec<EnforcerConfig> {
        self.config().enforcers
    }

    /// Load weapon names, rebuild enforcement state and start the worker
    ///
    /// # Errors
    /// Fails closed with `StartupError::WeaponTable` when the names table is
    /// unavailable, leaving the pipeline disabled.
    pub async fn enable(&self) -> Result<(), StartupError> {
        self.lifecycle.transition(PluginState::Starting)?;

        let names = match self.names.fetch().await {
            Ok(names) => names,
            Err(e) => {
                error!(target: ERROR_TARGET, error = %e, "Weapon names unavailable, staying disabled");
                self.lifecycle.transition(PluginState::Disabled)?;
                return Err(e.into());
            }
        };
        let dictionary = Arc::new(WeaponDictionary::populate(&self.defines, names));
        *self.weapons.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&dictionary);

        let config = self.config();
        self.queue.clear();
        let dispatcher = PunishmentDispatcher::new(
            Arc::clone(&self.backend),
            config.settle_delay(),
            self.lifecycle.handle(),
            self.watchdog.clone(),
        );
        let runner = EffectRunner::new(
            Arc::clone(&self.notifier),
            dispatcher,
            NotificationTemplate::new(config.notification_template.clone(), config.profile_url.clone()),
            self.players.clone(),
            self.watchdog.clone(),
        );
        let processor = KillProcessor::new(
            Arc::clone(&self.queue),
            self.players.clone(),
            dictionary,
            EnforcerRegistry::new(config.enforcers.clone()),
            runner,
            self.lifecycle.handle(),
            config.idle_wait(),
        );

        self.lifecycle.transition(PluginState::Enabled)?;
        self.watchdog.spawn(WORKER_TASK, processor.run());
        log_console(format!(
            "Enabled with {} enforcers and {} weapons",
            config.enforcers.len(),
            self.weapons().len()
        ));
        Ok(())
    }

    /// Stop the worker and wait for it to exit
    ///
    /// Message and punishment tasks still in flight are left to finish on
    /// their own and only reported.
    ///
    /// # Errors
    /// Returns an error if the pipeline was not enabled, or if the worker was
    /// still alive after the configured number of shutdown polls.
    pub async fn disable(&self) -> LifecycleResult<()> {
        self.lifecycle.transition(PluginState::Stopping)?;
        self.queue.wake();
        let config = self.config();
        let result = self
            .watchdog
            .monitor_shutdown(WORKER_TASK, config.shutdown_poll(), config.shutdown_max_attempts)
            .await;
        if result.is_ok() && self.watchdog.count() > 0 {
            warn!(
                target: CONSOLE_TARGET,
                tasks = %self.watchdog.alive_names().join(" "),
                "Background tasks still finishing after shutdown"
            );
            self.watchdog.monitor();
        }
        self.lifecycle.transition(PluginState::Disabled)?;
        log_console("Disabled".to_string());
        result
    }

    /// Queue a kill; returns whether it was accepted
    pub fn on_player_killed(&self, event: KillEvent) -> bool {
        if self.lifecycle.state() != PluginState::Enabled {
            return false;
        }
        self.queue.enqueue(event);
        true
    }

    pub fn on_player_joined(&self, name: &str) {
        log_host_event("join", name);
        self.players.join(name);
    }

    pub fn on_player_left(&self, name: &str) {
        log_host_event("leave", name);
        self.players.leave(name);
        self.enqueue_if_enabled(QueueItem::PlayerLeft(name.to_string()));
    }

    /// Full roster refresh; players missing from it count as departed
    pub fn on_roster(&self, roster: &[PlayerStats]) {
        for name in self.players.refresh(roster) {
            log_host_event("departed", &name);
            self.enqueue_if_enabled(QueueItem::PlayerLeft(name));
        }
    }

    pub fn on_reserved_slots(&self, names: Vec<String>) {
        log_host_event("reserved", &format!("{} players", names.len()));
        self.players.set_reserved(names);
    }

    pub fn on_round_over(&self) {
        log_host_event("round_over", "");
        self.enqueue_if_enabled(QueueItem::RoundOver);
    }

    pub fn on_server_info(&self, info: ServerInfo) {
        log_host_event("server_info", &format!("{} {} {}", info.name, info.map, info.mode));
        self.players.set_server_info(info);
    }

    /// Replace all enforcer configurations
    pub fn update_enforcers(&self, enforcers: Vec<EnforcerConfig>) {
        let enforcers = {
            let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
            config.enforcers = enforcers;
            for warning in config.validate() {
                warn!(target: CONSOLE_TARGET, "{warning}");
            }
            config.enforcers.clone()
        };
        self.enqueue_if_enabled(QueueItem::Reconfigure(enforcers));
    }

    /// Apply one text option to one enforcer
    ///
    /// # Errors
    /// Returns `ConfigError::UnknownEnforcer` for an unknown id, or the
    /// option's parse error; the previous value is kept in both cases.
    pub fn set_enforcer_option(&self, id: u32, key: &str, value: &str) -> ConfigResult<()> {
        let enforcers = {
            let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
            let enforcer = config
                .enforcers
                .iter_mut()
                .find(|enforcer| enforcer.id == id)
                .ok_or(ConfigError::UnknownEnforcer(id))?;
            if let Err(e) = enforcer.set_option(key, value) {
                warn!(target: CONSOLE_TARGET, enforcer_id = id, error = %e, "Option rejected");
                return Err(e);
            }
            config.enforcers.clone()
        };
        self.enqueue_if_enabled(QueueItem::Reconfigure(enforcers));
        Ok(())
    }

    fn enqueue_if_enabled(&self, item: QueueItem) {
        if self.lifecycle.state() == PluginState::Enabled {
            self.queue.enqueue(item);
        }
    }
}
