//! Punishment dispatch
//!
//! Decided punishments are executed on a short-lived task after a settle
//! delay. Two interchangeable backends exist: one issuing admin commands
//! directly and one delegating to an external moderation plugin.

use crate::enforcement::{EnforcementResult, PunishmentRequest, PunishmentType};
use crate::{ENFORCEMENT_TARGET, ERROR_TARGET};
use crate::lifecycle::{LifecycleHandle, TaskWatchdog};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Raw command channel to the game server
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn send(&self, words: Vec<String>) -> EnforcementResult<()>;
}

/// Executes one punishment
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PunishmentBackend: Send + Sync {
    async fn execute(&self, request: &PunishmentRequest) -> EnforcementResult<()>;
}

fn words(parts: &[&str]) -> Vec<String> {
    parts.iter().map(ToString::to_string).collect()
}

/// Backend issuing admin commands directly
pub struct AdminCommandBackend {
    sink: Arc<dyn CommandSink>,
}

impl AdminCommandBackend {
    pub fn new(sink: Arc<dyn CommandSink>) -> Self {
        Self { sink }
    }

    /// Command sequence for a request, in execution order
    #[must_use]
    pub fn commands_for(request: &PunishmentRequest) -> Vec<Vec<String>> {
        let name = request.target.name.as_str();
        let reason = request.reason.as_str();
        let kick = words(&["admin.kickPlayer", name, reason]);
        match request.punishment {
            PunishmentType::Punish | PunishmentType::Kill => {
                vec![words(&["admin.killPlayer", name])]
            }
            PunishmentType::Kick => vec![kick],
            PunishmentType::TempBan => {
                let seconds = u64::from(request.duration_minutes.unwrap_or(0)) * 60;
                vec![
                    words(&["banList.add", "name", name, "seconds", &seconds.to_string(), reason]),
                    words(&["banList.save"]),
                    kick,
                ]
            }
            PunishmentType::PermanentBan => vec![
                words(&["banList.add", "name", name, "perm", reason]),
                words(&["banList.save"]),
                kick,
            ],
        }
    }
}

#[async_trait]
impl PunishmentBackend for AdminCommandBackend {
    async fn execute(&self, request: &PunishmentRequest) -> EnforcementResult<()> {
        for command in Self::commands_for(request) {
            self.sink.send(command).await?;
        }
        info!(
            target: ENFORCEMENT_TARGET,
            request_id = %request.id,
            player = %request.target.name,
            punishment = %request.punishment,
            "Punishment issued"
        );
        Ok(())
    }
}

/// Structured request understood by the moderation plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModerationRequest {
    pub source: String,
    pub command_type: String,
    pub target_name: String,
    pub target_guid: Option<String>,
    pub reason: String,
    pub duration_minutes: Option<u32>,
    pub record_id: String,
}

impl ModerationRequest {
    #[must_use]
    pub fn from_request(source: &str, request: &PunishmentRequest) -> Self {
        let command_type = match request.punishment {
            PunishmentType::Punish => "player_punish",
            PunishmentType::Kill => "player_kill",
            PunishmentType::Kick => "player_kick",
            PunishmentType::TempBan => "player_ban_temp",
            PunishmentType::PermanentBan => "player_ban_perm",
        };
        Self {
            source: source.to_string(),
            command_type: command_type.to_string(),
            target_name: request.target.name.clone(),
            target_guid: request.target.guid.clone(),
            reason: request.reason.clone(),
            duration_minutes: request.duration_minutes,
            record_id: request.id.to_string(),
        }
    }
}

/// External moderation service accepting structured requests
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModerationService: Send + Sync {
    async fn submit(&self, request: &ModerationRequest) -> EnforcementResult<()>;
}

/// Moderation service reached through a plugin call command
pub struct PluginCallModeration {
    sink: Arc<dyn CommandSink>,
    plugin: String,
}

impl PluginCallModeration {
    pub fn new(sink: Arc<dyn CommandSink>, plugin: impl Into<String>) -> Self {
        Self {
            sink,
            plugin: plugin.into(),
        }
    }
}

#[async_trait]
impl ModerationService for PluginCallModeration {
    async fn submit(&self, request: &ModerationRequest) -> EnforcementResult<()> {
        let payload = serde_json::to_string(request)?;
        self.sink
            .send(words(&[
                "procon.protected.plugins.call",
                &self.plugin,
                "IssueCommand",
                &payload,
            ]))
            .await
    }
}

/// Backend handing punishments to a moderation service
pub struct DelegatedBackend {
    service: Arc<dyn ModerationService>,
    source: String,
}

impl DelegatedBackend {
    pub fn new(service: Arc<dyn ModerationService>, source: impl Into<String>) -> Self {
        Self {
            service,
            source: source.into(),
        }
    }
}

#[async_trait]
impl PunishmentBackend for DelegatedBackend {
    async fn execute(&self, request: &PunishmentRequest) -> EnforcementResult<()> {
        let moderation = ModerationRequest::from_request(&self.source, request);
        self.service.submit(&moderation).await?;
        info!(
            target: ENFORCEMENT_TARGET,
            request_id = %request.id,
            player = %request.target.name,
            command_type = %moderation.command_type,
            "Punishment delegated"
        );
        Ok(())
    }
}

/// Runs punishments after the settle delay, off the worker
#[derive(Clone)]
pub struct PunishmentDispatcher {
    backend: Arc<dyn PunishmentBackend>,
    settle_delay: Duration,
    lifecycle: LifecycleHandle,
    watchdog: TaskWatchdog,
}

impl PunishmentDispatcher {
    pub fn new(
        backend: Arc<dyn PunishmentBackend>,
        settle_delay: Duration,
        lifecycle: LifecycleHandle,
        watchdog: TaskWatchdog,
    ) -> Self {
        Self {
            backend,
            settle_delay,
            lifecycle,
            watchdog,
        }
    }

    /// Fire and forget. A pipeline stop during the delay cancels the request;
    /// backend failures are only logged.
    pub fn dispatch(&self, request: PunishmentRequest) -> JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        let delay = self.settle_delay;
        let mut lifecycle = self.lifecycle.clone();
        self.watchdog.spawn("punishment-dispatch", async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = lifecycle.stopped() => {
                    info!(
                        target: ENFORCEMENT_TARGET,
                        request_id = %request.id,
                        player = %request.target.name,
                        "Pipeline stopped, punishment cancelled"
                    );
                    return;
                }
            }
            if let Err(e) = backend.execute(&request).await {
                error!(
                    target: ERROR_TARGET,
                    request_id = %request.id,
                    player = %request.target.name,
                    punishment = %request.punishment,
                    error = %e,
                    "Punishment dispatch failed"
                );
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enforcement::EnforcementError;
    use crate::lifecycle::{Lifecycle, PluginState};
    use crate::players::PlayerSnapshot;
    use mockall::predicate::eq;

    fn request(punishment: PunishmentType) -> PunishmentRequest {
        let target = PlayerSnapshot {
            name: "Farmer".to_string(),
            guid: Some("EA_1234".to_string()),
            ..Default::default()
        };
        PunishmentRequest::new(7, target, "M98B", punishment, "Weapon farming M98B", 60)
    }

    fn enabled_lifecycle() -> Lifecycle {
        let lifecycle = Lifecycle::new();
        lifecycle.transition(PluginState::Starting).unwrap();
        lifecycle.transition(PluginState::Enabled).unwrap();
        lifecycle
    }

    #[test]
    fn test_admin_command_shapes() {
        assert_eq!(
            AdminCommandBackend::commands_for(&request(PunishmentType::Kill)),
            vec![words(&["admin.killPlayer", "Farmer"])]
        );
        assert_eq!(
            AdminCommandBackend::commands_for(&request(PunishmentType::Kick)),
            vec![words(&["admin.kickPlayer", "Farmer", "Weapon farming M98B"])]
        );
        assert_eq!(
            AdminCommandBackend::commands_for(&request(PunishmentType::TempBan)),
            vec![
                words(&[
                    "banList.add",
                    "name",
                    "Farmer",
                    "seconds",
                    "3600",
                    "Weapon farming M98B"
                ]),
                words(&["banList.save"]),
                words(&["admin.kickPlayer", "Farmer", "Weapon farming M98B"]),
            ]
        );
        let perm = AdminCommandBackend::commands_for(&request(PunishmentType::PermanentBan));
        assert_eq!(perm[0][3], "perm");
        assert_eq!(perm.len(), 3);
    }

    #[tokio::test]
    async fn test_admin_backend_stops_at_first_failure() {
        let mut sink = MockCommandSink::new();
        sink.expect_send().times(1).returning(|words| {
            assert_eq!(words[0], "banList.add");
            Err(EnforcementError::Backend("ban list full".into()))
        });

        let backend = AdminCommandBackend::new(Arc::new(sink));
        let result = backend.execute(&request(PunishmentType::PermanentBan)).await;
        assert!(matches!(result, Err(EnforcementError::Backend(_))));
    }

    #[tokio::test]
    async fn test_delegated_backend_builds_request() {
        let original = request(PunishmentType::TempBan);
        let expected = ModerationRequest {
            source: "Farming-Manager".to_string(),
            command_type: "player_ban_temp".to_string(),
            target_name: "Farmer".to_string(),
            target_guid: Some("EA_1234".to_string()),
            reason: "Weapon farming M98B".to_string(),
            duration_minutes: Some(60),
            record_id: original.id.to_string(),
        };
        let mut service = MockModerationService::new();
        service
            .expect_submit()
            .with(eq(expected))
            .times(1)
            .returning(|_| Ok(()));

        let backend = DelegatedBackend::new(Arc::new(service), "Farming-Manager");
        backend.execute(&original).await.unwrap();
    }

    #[tokio::test]
    async fn test_plugin_call_encodes_json() {
        let mut sink = MockCommandSink::new();
        sink.expect_send()
            .withf(|words| {
                words.len() == 4
                    && words[0] == "procon.protected.plugins.call"
                    && words[1] == "AdKats"
                    && words[2] == "IssueCommand"
                    && words[3].contains("\"command_type\":\"player_kick\"")
            })
            .times(1)
            .returning(|_| Ok(()));

        let service = PluginCallModeration::new(Arc::new(sink), "AdKats");
        let moderation =
            ModerationRequest::from_request("Farming-Manager", &request(PunishmentType::Kick));
        service.submit(&moderation).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_waits_for_settle_delay() {
        let lifecycle = enabled_lifecycle();
        let mut backend = MockPunishmentBackend::new();
        backend.expect_execute().times(1).returning(|_| Ok(()));

        let dispatcher = PunishmentDispatcher::new(
            Arc::new(backend),
            Duration::from_secs(3),
            lifecycle.handle(),
            TaskWatchdog::new(),
        );
        let start = tokio::time::Instant::now();
        dispatcher.dispatch(request(PunishmentType::Kill)).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_cancelled_on_stop() {
        let lifecycle = enabled_lifecycle();
        let mut backend = MockPunishmentBackend::new();
        backend.expect_execute().times(0);
        let watchdog = TaskWatchdog::new();

        let dispatcher = PunishmentDispatcher::new(
            Arc::new(backend),
            Duration::from_secs(3),
            lifecycle.handle(),
            watchdog.clone(),
        );
        let handle = dispatcher.dispatch(request(PunishmentType::Kick));
        tokio::time::sleep(Duration::from_secs(1)).await;
        lifecycle.transition(PluginState::Stopping).unwrap();
        handle.await.unwrap();
        assert_eq!(watchdog.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_failure_is_contained() {
        let lifecycle = enabled_lifecycle();
        let mut backend = MockPunishmentBackend::new();
        backend
            .expect_execute()
            .times(1)
            .returning(|_| Err(EnforcementError::Backend("connection lost".into())));

        let dispatcher = PunishmentDispatcher::new(
            Arc::new(backend),
            Duration::from_secs(3),
            lifecycle.handle(),
            TaskWatchdog::new(),
        );
        assert!(dispatcher.dispatch(request(PunishmentType::Kill)).await.is_ok());
    }
}
