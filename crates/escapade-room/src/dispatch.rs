//! Turns fired actions into room events and webhook jobs.

use escapade_protocol::{
    HintReceived, LightboxPayload, MessagePayload, RoomId, ServerEvent, SoundPayload,
    VariableChange,
};
use escapade_rules::{Action, Fired};
use serde_json::json;
use tracing::{debug, warn};

use crate::{BroadcastChannel, WebhookJob, WebhookQueue};

/// `source` reported on events produced by rules.
pub const TRIGGER_SOURCE: &str = "trigger";

/// Performs fired actions for one room.
#[derive(Debug, Clone)]
pub struct ActionDispatcher {
    room_id: RoomId,
    webhooks: WebhookQueue,
}

impl ActionDispatcher {
    pub fn new(room_id: RoomId, webhooks: WebhookQueue) -> Self {
        Self { room_id, webhooks }
    }

    /// Performs each action in order: one publish or one queued webhook.
    pub fn dispatch_all(&self, fired: Vec<Fired>, channel: &mut BroadcastChannel) {
        for f in fired {
            self.dispatch(f, channel);
        }
    }

    pub fn dispatch(&self, fired: Fired, channel: &mut BroadcastChannel) {
        let Fired { action, context } = fired;
        let event = match action {
            Action::PlaySound(sound) => ServerEvent::PlaySound(SoundPayload {
                volume: sound.volume(),
                sound_id: sound.sound_id,
                file: sound.file,
            }),
            Action::ShowMessage(message) => ServerEvent::ShowMessage(MessagePayload {
                duration: message.duration(),
                text: message.text,
            }),
            Action::ShowMedia(media) => ServerEvent::ShowLightbox(LightboxPayload {
                auto_close_enabled: media.auto_close_enabled(),
                auto_close_seconds: media.auto_close_seconds(),
                media_id: media.media_id,
                headline: media.headline,
            }),
            Action::UpdateVariable(update) => ServerEvent::VariableUpdate(VariableChange {
                kind: update.kind().as_str().to_string(),
                name: update.name,
                value: update.value,
                source: TRIGGER_SOURCE.to_string(),
            }),
            Action::SendHint(hint) => ServerEvent::HintReceived(HintReceived {
                message: hint.message,
                timestamp: chrono::Utc::now().timestamp_millis(),
                source: TRIGGER_SOURCE.to_string(),
            }),
            Action::SendWebhook(hook) => {
                let body = json!({
                    "roomId": self.room_id,
                    "trigger": context,
                    "payload": hook.payload,
                });
                debug!(room_id = %self.room_id, url = %hook.url, "webhook queued");
                self.webhooks.enqueue(WebhookJob {
                    url: hook.url,
                    body,
                });
                return;
            }
            Action::Unrecognized { tag } => {
                warn!(room_id = %self.room_id, action = %tag, "unknown action, skipping");
                return;
            }
        };
        debug!(room_id = %self.room_id, event = event.name(), "action dispatched");
        channel.publish(event);
    }
}
