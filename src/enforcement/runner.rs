//! Executes enforcer effects
//!
//! Messages go out in order on one short-lived task per kill; punishments
//! are handed to the [`PunishmentDispatcher`]. Suppressed effects are only
//! logged.

use crate::ERROR_TARGET;
use crate::enforcement::{EnforcementEffect, NotificationTemplate, Notifier, PunishmentDispatcher};
use crate::lifecycle::TaskWatchdog;
use crate::logging::log_effect;
use crate::players::PlayerDirectory;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::error;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Outbound {
    Player { player: String, text: String },
    ChatLog(String),
    Notify(String),
}

#[derive(Clone)]
pub struct EffectRunner {
    notifier: Arc<dyn Notifier>,
    dispatcher: PunishmentDispatcher,
    template: NotificationTemplate,
    players: PlayerDirectory,
    watchdog: TaskWatchdog,
}

impl EffectRunner {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        dispatcher: PunishmentDispatcher,
        template: NotificationTemplate,
        players: PlayerDirectory,
        watchdog: TaskWatchdog,
    ) -> Self {
        Self {
            notifier,
            dispatcher,
            template,
            players,
            watchdog,
        }
    }

    /// Start every effect; the returned handles may be ignored
    pub fn run(&self, effects: Vec<EnforcementEffect>) -> Vec<JoinHandle<()>> {
        let mut outbound = Vec::new();
        let mut handles = Vec::new();

        for effect in effects {
            log_effect(&effect);
            match effect {
                EnforcementEffect::Message {
                    player,
                    text,
                    log_to_chat,
                    ..
                } => {
                    if log_to_chat {
                        outbound.push(Outbound::ChatLog(format!("{player}: {text}")));
                    }
                    outbound.push(Outbound::Player { player, text });
                }
                EnforcementEffect::Punish(request) => {
                    let server = self.players.server_info();
                    outbound.push(Outbound::Notify(self.template.render(&request, &server)));
                    handles.push(self.dispatcher.dispatch(request));
                }
                EnforcementEffect::Suppressed { .. } => {}
            }
        }

        if !outbound.is_empty() {
            let notifier = Arc::clone(&self.notifier);
            handles.push(
                self.watchdog
                    .spawn("notification", deliver(notifier, outbound)),
            );
        }
        handles
    }
}

async fn deliver(notifier: Arc<dyn Notifier>, outbound: Vec<Outbound>) {
    for item in outbound {
        let result = match &item {
            Outbound::Player { player, text } => notifier.message_player(player, text).await,
            Outbound::ChatLog(text) => notifier.chat_log(text).await,
            Outbound::Notify(text) => notifier.notify(text).await,
        };
        if let Err(e) = result {
            error!(target: ERROR_TARGET, error = %e, item = ?item, "Notification delivery failed");
        }
    }
}
