use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{ChannelMediaSender, InstanceHandle};
use crate::dto::{
    SendAudio, SendButtons, SendChannelMedia, SendContact, SendList, SendLocation, SendMedia,
    SendPoll, SendPtv, SendReaction, SendStatus, SendSticker, SendTemplate, SendText,
};
use crate::media::UploadedFile;

/// Instance that accepts every message without a transport behind it and
/// answers with a pending receipt. Used for configured instances until a real
/// session is attached, and for local testing of clients.
pub struct LoopbackInstance {
    name: String,
    channel_media: bool,
}

impl LoopbackInstance {
    pub fn new(name: &str, channel_media: bool) -> Self {
        Self {
            name: name.to_string(),
            channel_media,
        }
    }

    fn receipt<T: Serialize>(
        &self,
        message_type: &str,
        remote_jid: &str,
        payload: &T,
        file: Option<&UploadedFile>,
    ) -> Result<Value> {
        let id = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
        debug!(
            "Loopback '{}' accepted {} for {} ({})",
            self.name, message_type, remote_jid, id
        );

        let mut receipt = json!({
            "key": {
                "remoteJid": remote_jid,
                "fromMe": true,
                "id": id,
            },
            "instance": self.name,
            "messageType": message_type,
            "messageTimestamp": chrono::Utc::now().timestamp(),
            "status": "PENDING",
            "message": serde_json::to_value(payload)?,
        });
        if let Some(file) = file {
            receipt["file"] = json!({
                "fileName": file.file_name,
                "mimetype": file.mime_type,
                "size": file.data.len(),
            });
        }
        Ok(receipt)
    }
}

#[async_trait]
impl InstanceHandle for LoopbackInstance {
    async fn text_message(&self, data: SendText) -> Result<Value> {
        self.receipt("conversation", &data.number, &data, None)
    }

    async fn media_message(&self, data: SendMedia, file: Option<UploadedFile>) -> Result<Value> {
        let message_type = format!("{}Message", data.mediatype.as_str());
        self.receipt(&message_type, &data.number, &data, file.as_ref())
    }

    async fn ptv_message(&self, data: SendPtv, file: Option<UploadedFile>) -> Result<Value> {
        self.receipt("ptvMessage", &data.number, &data, file.as_ref())
    }

    async fn sticker_message(
        &self,
        data: SendSticker,
        file: Option<UploadedFile>,
    ) -> Result<Value> {
        self.receipt("stickerMessage", &data.number, &data, file.as_ref())
    }

    async fn audio_message(&self, data: SendAudio, file: Option<UploadedFile>) -> Result<Value> {
        self.receipt("audioMessage", &data.number, &data, file.as_ref())
    }

    async fn button_message(&self, data: SendButtons) -> Result<Value> {
        self.receipt("buttonsMessage", &data.number, &data, None)
    }

    async fn location_message(&self, data: SendLocation) -> Result<Value> {
        self.receipt("locationMessage", &data.number, &data, None)
    }

    async fn list_message(&self, data: SendList) -> Result<Value> {
        self.receipt("listMessage", &data.number, &data, None)
    }

    async fn contact_message(&self, data: SendContact) -> Result<Value> {
        let message_type = if data.contact.len() > 1 {
            "contactsArrayMessage"
        } else {
            "contactMessage"
        };
        self.receipt(message_type, &data.number, &data, None)
    }

    async fn reaction_message(&self, data: SendReaction) -> Result<Value> {
        let remote_jid = data.key.remote_jid.clone().unwrap_or_default();
        self.receipt("reactionMessage", &remote_jid, &data, None)
    }

    async fn poll_message(&self, data: SendPoll) -> Result<Value> {
        self.receipt("pollCreationMessage", &data.number, &data, None)
    }

    async fn status_message(&self, data: SendStatus, file: Option<UploadedFile>) -> Result<Value> {
        self.receipt("statusMessage", "status@broadcast", &data, file.as_ref())
    }

    async fn template_message(&self, data: SendTemplate) -> Result<Value> {
        self.receipt("templateMessage", &data.number, &data, None)
    }

    fn channel_media(&self) -> Option<&dyn ChannelMediaSender> {
        if self.channel_media {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl ChannelMediaSender for LoopbackInstance {
    async fn channel_media_message(&self, data: SendChannelMedia) -> Result<Value> {
        self.receipt("imageMessage", &data.number, &data, None)
    }
}
