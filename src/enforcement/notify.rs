//! Player messages and external notifications

use crate::enforcement::{EnforcementResult, PunishmentRequest};
use crate::players::ServerInfo;
use async_trait::async_trait;

pub const DEFAULT_NOTIFICATION_TEMPLATE: &str = "%player% received %punishment% from enforcer \
%enforcer% on %server% (%map% / %mode%): %reason%. Kills %kills%, deaths %deaths%, KDR %kdr%, \
score %score%. %profile%";

/// Outbound message delivery
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Private message to one player
    async fn message_player(&self, player: &str, text: &str) -> EnforcementResult<()>;

    /// Line in the server's chat log
    async fn chat_log(&self, text: &str) -> EnforcementResult<()>;

    /// External notification, e.g. a webhook
    async fn notify(&self, text: &str) -> EnforcementResult<()>;
}

/// Text template with `%token%` placeholders
#[derive(Debug, Clone)]
pub struct NotificationTemplate {
    template: String,
    profile_url: String,
}

impl NotificationTemplate {
    pub fn new(template: impl Into<String>, profile_url: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            profile_url: profile_url.into(),
        }
    }

    #[must_use]
    pub fn profile_link(&self, player: &str) -> String {
        self.profile_url.replace("{name}", player)
    }

    #[must_use]
    pub fn render(&self, request: &PunishmentRequest, server: &ServerInfo) -> String {
        let target = &request.target;
        let replacements = [
            ("%player%", target.verbose_name.clone()),
            ("%enforcer%", request.enforcer_id.to_string()),
            ("%punishment%", request.punishment.to_string()),
            ("%reason%", request.reason.clone()),
            ("%kills%", target.kills.to_string()),
            ("%deaths%", target.deaths.to_string()),
            ("%kdr%", format!("{:.2}", target.kdr())),
            ("%score%", target.score.to_string()),
            ("%server%", server.name.clone()),
            ("%map%", server.map.clone()),
            ("%mode%", server.mode.clone()),
            ("%profile%", self.profile_link(&target.name)),
        ];
        replacements
            .iter()
            .fold(self.template.clone(), |text, (token, value)| {
                text.replace(token, value)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enforcement::PunishmentType;
    use crate::players::PlayerSnapshot;

    #[test]
    fn test_render_substitutes_every_token() {
        let target = PlayerSnapshot {
            name: "Farmer".into(),
            verbose_name: "[FM]Farmer".into(),
            kills: 30,
            deaths: 4,
            score: 4200,
            ..Default::default()
        };
        let request = PunishmentRequest::new(
            2,
            target,
            "M98B",
            PunishmentType::Kick,
            "Weapon farming M98B [KDR 7.5/5.0]",
            60,
        );
        let server = ServerInfo {
            name: "Test Server".into(),
            map: "MP_Prison".into(),
            mode: "ConquestLarge0".into(),
        };
        let template = NotificationTemplate::new(
            DEFAULT_NOTIFICATION_TEMPLATE,
            "https://battlelog.battlefield.com/bf4/user/{name}/",
        );

        let text = template.render(&request, &server);
        assert!(!text.contains('%'), "unreplaced token in {text}");
        assert!(text.starts_with("[FM]Farmer received Kick from enforcer 2 on Test Server"));
        assert!(text.contains("KDR 7.50"));
        assert!(text.contains("https://battlelog.battlefield.com/bf4/user/Farmer/"));
    }
}
