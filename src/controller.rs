use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::dto::{
    MediaType, SendAudio, SendButtons, SendChannelMedia, SendContact, SendList, SendLocation,
    SendMedia, SendPoll, SendPtv, SendReaction, SendStatus, SendSticker, SendTemplate, SendText,
};
use crate::error::{SendError, AUDIO_URL_BASE64_OR_FILE, MEDIA_URL_OR_BASE64};
use crate::instance::{InstanceHandle, InstanceRegistry};
use crate::media::{self, MediaSource, UploadedFile};

pub type SendResult = Result<Value, SendError>;

/// Validates send requests and hands each one to the named instance.
#[derive(Clone)]
pub struct SendMessageController {
    registry: Arc<dyn InstanceRegistry>,
}

fn is_newsletter(number: &str) -> bool {
    number.contains("@newsletter")
}

impl SendMessageController {
    pub fn new(registry: Arc<dyn InstanceRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<dyn InstanceRegistry> {
        &self.registry
    }

    fn instance(&self, name: &str) -> Result<Arc<dyn InstanceHandle>, SendError> {
        self.registry
            .get(name)
            .ok_or_else(|| SendError::InstanceNotFound(name.to_string()))
    }

    pub async fn send_text(&self, instance: &str, data: SendText) -> SendResult {
        Ok(self.instance(instance)?.text_message(data).await?)
    }

    pub async fn send_template(&self, instance: &str, data: SendTemplate) -> SendResult {
        Ok(self.instance(instance)?.template_message(data).await?)
    }

    pub async fn send_media(
        &self,
        instance_name: &str,
        mut data: SendMedia,
        file: Option<UploadedFile>,
    ) -> SendResult {
        let instance = self.instance(instance_name)?;

        if is_newsletter(&data.number) && data.mediatype == MediaType::Image {
            if let Some(channel) = instance.channel_media() {
                let media = match &file {
                    Some(file) => file.to_base64(),
                    None => media::normalize_base64_media(data.media.as_deref()),
                };
                let source = media::classify(&media, None)
                    .ok_or(SendError::InvalidMedia(MEDIA_URL_OR_BASE64))?;

                info!(
                    action = "sendMedia",
                    instance = instance_name,
                    path = "channelMediaMessage",
                    media_type = source.as_str(),
                    media_length = media.len(),
                    "Routing newsletter image to channel path"
                );

                let payload = SendChannelMedia {
                    number: data.number,
                    media,
                    text: data.caption,
                    options: data.options,
                };
                return Ok(channel.channel_media_message(payload).await?);
            }
        }

        let media = media::normalize_base64_media(data.media.as_deref());

        if media::is_base64(&media)
            && data.file_name.is_none()
            && data.mediatype == MediaType::Document
        {
            return Err(SendError::MissingDocumentFileName);
        }

        let source = media::classify(&media, file.as_ref())
            .ok_or(SendError::InvalidMedia(MEDIA_URL_OR_BASE64))?;

        info!(
            action = "sendMedia",
            instance = instance_name,
            path = "mediaMessage",
            mediatype = data.mediatype.as_str(),
            media_type = source.as_str(),
            media_length = media.len(),
            "Dispatching media message"
        );

        if source != MediaSource::File {
            data.media = Some(media);
        }
        Ok(instance.media_message(data, file).await?)
    }

    pub async fn send_channel_media(&self, instance_name: &str, data: SendChannelMedia) -> SendResult {
        let media = media::normalize_base64_media(Some(&data.media));
        let source = media::classify(&media, None);

        info!(
            action = "sendChannelMedia",
            instance = instance_name,
            number = %data.number,
            is_newsletter = is_newsletter(&data.number),
            media_type = source.map(|s| s.as_str()).unwrap_or("invalid"),
            media_length = media.len(),
            has_text = data.text.is_some(),
            text_length = data.text.as_deref().map(str::len).unwrap_or(0),
            delay = data.options.delay,
            "Channel media request"
        );

        if source.is_none() {
            return Err(SendError::InvalidMedia(MEDIA_URL_OR_BASE64));
        }

        let instance = self.instance(instance_name)?;
        let payload = SendChannelMedia { media, ..data };

        if let Some(channel) = instance.channel_media() {
            info!(
                action = "sendChannelMedia",
                instance = instance_name,
                path = "channelMediaMessage"
            );
            return Ok(channel.channel_media_message(payload).await?);
        }

        warn!(
            action = "sendChannelMedia",
            instance = instance_name,
            path = "fallback-mediaMessage"
        );

        let mut options = payload.options;
        options.message_id = None;
        let fallback = SendMedia {
            number: payload.number,
            mediatype: MediaType::Image,
            mimetype: None,
            caption: payload.text,
            file_name: None,
            media: Some(payload.media),
            options,
        };
        Ok(instance.media_message(fallback, None).await?)
    }

    pub async fn send_ptv(
        &self,
        instance: &str,
        mut data: SendPtv,
        file: Option<UploadedFile>,
    ) -> SendResult {
        let video = media::normalize_base64_media(data.video.as_deref());
        let source = media::classify(&video, file.as_ref())
            .ok_or(SendError::InvalidMedia(MEDIA_URL_OR_BASE64))?;
        if source != MediaSource::File {
            data.video = Some(video);
        }
        Ok(self.instance(instance)?.ptv_message(data, file).await?)
    }

    pub async fn send_sticker(
        &self,
        instance: &str,
        mut data: SendSticker,
        file: Option<UploadedFile>,
    ) -> SendResult {
        let sticker = media::normalize_base64_media(data.sticker.as_deref());
        let source = media::classify(&sticker, file.as_ref())
            .ok_or(SendError::InvalidMedia(MEDIA_URL_OR_BASE64))?;
        if source != MediaSource::File {
            data.sticker = Some(sticker);
        }
        Ok(self.instance(instance)?.sticker_message(data, file).await?)
    }

    pub async fn send_audio(
        &self,
        instance: &str,
        mut data: SendAudio,
        file: Option<UploadedFile>,
    ) -> SendResult {
        let audio = media::normalize_base64_media(data.audio.as_deref());
        let Some(source) = media::classify(&audio, file.as_ref()) else {
            warn!(
                action = "sendWhatsAppAudio",
                instance,
                "Audio has no file buffer and is neither a URL nor base64"
            );
            return Err(SendError::InvalidMedia(AUDIO_URL_BASE64_OR_FILE));
        };
        if source != MediaSource::File {
            data.audio = Some(audio);
        }
        Ok(self.instance(instance)?.audio_message(data, file).await?)
    }

    pub async fn send_buttons(&self, instance: &str, data: SendButtons) -> SendResult {
        Ok(self.instance(instance)?.button_message(data).await?)
    }

    pub async fn send_location(&self, instance: &str, data: SendLocation) -> SendResult {
        Ok(self.instance(instance)?.location_message(data).await?)
    }

    pub async fn send_list(&self, instance: &str, data: SendList) -> SendResult {
        Ok(self.instance(instance)?.list_message(data).await?)
    }

    pub async fn send_contact(&self, instance: &str, data: SendContact) -> SendResult {
        Ok(self.instance(instance)?.contact_message(data).await?)
    }

    pub async fn send_reaction(&self, instance: &str, data: SendReaction) -> SendResult {
        if !media::is_emoji(&data.reaction) {
            return Err(SendError::InvalidReaction);
        }
        Ok(self.instance(instance)?.reaction_message(data).await?)
    }

    pub async fn send_poll(&self, instance: &str, data: SendPoll) -> SendResult {
        Ok(self.instance(instance)?.poll_message(data).await?)
    }

    pub async fn send_status(
        &self,
        instance: &str,
        data: SendStatus,
        file: Option<UploadedFile>,
    ) -> SendResult {
        Ok(self.instance(instance)?.status_message(data, file).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::{MessageKey, SendOptions};
    use crate::instance::{ChannelMediaSender, InstanceMonitor};
    use anyhow::Result;
    use async_trait::async_trait;
    use axum::body::Bytes;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records every call it receives as (method, payload, had_file).
    struct RecordingInstance {
        channel: bool,
        calls: Mutex<Vec<(String, Value, bool)>>,
    }

    impl RecordingInstance {
        fn new(channel: bool) -> Arc<Self> {
            Arc::new(Self {
                channel,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn record<T: serde::Serialize>(
            &self,
            method: &str,
            data: &T,
            file: Option<&UploadedFile>,
        ) -> Result<Value> {
            let payload = serde_json::to_value(data)?;
            self.calls
                .lock()
                .unwrap()
                .push((method.to_string(), payload, file.is_some()));
            Ok(json!({ "method": method }))
        }

        fn calls(&self) -> Vec<(String, Value, bool)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl InstanceHandle for RecordingInstance {
        async fn text_message(&self, data: SendText) -> Result<Value> {
            self.record("text", &data, None)
        }
        async fn media_message(&self, data: SendMedia, file: Option<UploadedFile>) -> Result<Value> {
            self.record("media", &data, file.as_ref())
        }
        async fn ptv_message(&self, data: SendPtv, file: Option<UploadedFile>) -> Result<Value> {
            self.record("ptv", &data, file.as_ref())
        }
        async fn sticker_message(
            &self,
            data: SendSticker,
            file: Option<UploadedFile>,
        ) -> Result<Value> {
            self.record("sticker", &data, file.as_ref())
        }
        async fn audio_message(&self, data: SendAudio, file: Option<UploadedFile>) -> Result<Value> {
            self.record("audio", &data, file.as_ref())
        }
        async fn button_message(&self, data: SendButtons) -> Result<Value> {
            self.record("buttons", &data, None)
        }
        async fn location_message(&self, data: SendLocation) -> Result<Value> {
            self.record("location", &data, None)
        }
        async fn list_message(&self, data: SendList) -> Result<Value> {
            self.record("list", &data, None)
        }
        async fn contact_message(&self, data: SendContact) -> Result<Value> {
            self.record("contact", &data, None)
        }
        async fn reaction_message(&self, data: SendReaction) -> Result<Value> {
            self.record("reaction", &data, None)
        }
        async fn poll_message(&self, data: SendPoll) -> Result<Value> {
            self.record("poll", &data, None)
        }
        async fn status_message(&self, data: SendStatus, file: Option<UploadedFile>) -> Result<Value> {
            self.record("status", &data, file.as_ref())
        }
        async fn template_message(&self, data: SendTemplate) -> Result<Value> {
            if data.name == "broken" {
                anyhow::bail!("template rejected upstream");
            }
            self.record("template", &data, None)
        }
        fn channel_media(&self) -> Option<&dyn ChannelMediaSender> {
            if self.channel {
                Some(self)
            } else {
                None
            }
        }
    }

    #[async_trait]
    impl ChannelMediaSender for RecordingInstance {
        async fn channel_media_message(&self, data: SendChannelMedia) -> Result<Value> {
            self.record("channel_media", &data, None)
        }
    }

    fn controller(instance: Arc<RecordingInstance>) -> SendMessageController {
        let monitor = InstanceMonitor::new();
        monitor.register("main", instance);
        SendMessageController::new(Arc::new(monitor))
    }

    fn media_request(number: &str, mediatype: MediaType, media: Option<&str>) -> SendMedia {
        SendMedia {
            number: number.to_string(),
            mediatype,
            mimetype: None,
            caption: Some("look".to_string()),
            file_name: None,
            media: media.map(str::to_string),
            options: SendOptions::default(),
        }
    }

    fn upload(data: &'static [u8]) -> UploadedFile {
        UploadedFile {
            file_name: Some("clip.bin".to_string()),
            mime_type: None,
            data: Bytes::from_static(data),
        }
    }

    fn reaction(value: &str) -> SendReaction {
        SendReaction {
            key: MessageKey {
                remote_jid: Some("123@s.whatsapp.net".to_string()),
                from_me: Some(true),
                id: "ABC".to_string(),
                participant: None,
            },
            reaction: value.to_string(),
        }
    }

    #[tokio::test]
    async fn test_unknown_instance() {
        let ctrl = controller(RecordingInstance::new(false));
        let err = ctrl
            .send_text(
                "ghost",
                SendText {
                    number: "1".to_string(),
                    text: "hi".to_string(),
                    options: SendOptions::default(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::InstanceNotFound(name) if name == "ghost"));
    }

    #[tokio::test]
    async fn test_media_url_dispatched() {
        let instance = RecordingInstance::new(false);
        let ctrl = controller(instance.clone());
        let result = ctrl
            .send_media(
                "main",
                media_request("1", MediaType::Image, Some("https://example.com/a.png")),
                None,
            )
            .await
            .unwrap();
        assert_eq!(result["method"], "media");
        assert_eq!(instance.calls()[0].1["media"], "https://example.com/a.png");
    }

    #[tokio::test]
    async fn test_media_data_uri_normalized_before_classification() {
        let instance = RecordingInstance::new(false);
        let ctrl = controller(instance.clone());
        ctrl.send_media(
            "main",
            media_request("1", MediaType::Image, Some("data:image/png;base64,AAAA")),
            None,
        )
        .await
        .unwrap();
        assert_eq!(instance.calls()[0].1["media"], "AAAA");
    }

    #[tokio::test]
    async fn test_media_without_source_rejected() {
        let instance = RecordingInstance::new(false);
        let ctrl = controller(instance.clone());
        for media in [None, Some("not a media value"), Some("")] {
            let err = ctrl
                .send_media("main", media_request("1", MediaType::Image, media), None)
                .await
                .unwrap_err();
            assert!(matches!(err, SendError::InvalidMedia(_)));
        }
        assert!(instance.calls().is_empty());
    }

    #[tokio::test]
    async fn test_media_file_accepted_without_media_field() {
        let instance = RecordingInstance::new(false);
        let ctrl = controller(instance.clone());
        ctrl.send_media(
            "main",
            media_request("1", MediaType::Video, None),
            Some(upload(b"\x00\x01")),
        )
        .await
        .unwrap();
        let calls = instance.calls();
        assert_eq!(calls[0].0, "media");
        assert!(calls[0].2);
    }

    #[tokio::test]
    async fn test_document_base64_requires_file_name() {
        let instance = RecordingInstance::new(false);
        let ctrl = controller(instance.clone());

        let err = ctrl
            .send_media(
                "main",
                media_request("1", MediaType::Document, Some("aGVsbG8=")),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::MissingDocumentFileName));

        let mut named = media_request("1", MediaType::Document, Some("aGVsbG8="));
        named.file_name = Some("hello.txt".to_string());
        ctrl.send_media("main", named, None).await.unwrap();
        assert_eq!(instance.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_document_url_needs_no_file_name() {
        let ctrl = controller(RecordingInstance::new(false));
        ctrl.send_media(
            "main",
            media_request("1", MediaType::Document, Some("https://example.com/r.pdf")),
            None,
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_newsletter_image_uses_channel_path() {
        let instance = RecordingInstance::new(true);
        let ctrl = controller(instance.clone());
        ctrl.send_media(
            "main",
            media_request(
                "120363@newsletter",
                MediaType::Image,
                Some("data:image/jpeg;base64,AAAA"),
            ),
            None,
        )
        .await
        .unwrap();

        let calls = instance.calls();
        assert_eq!(calls[0].0, "channel_media");
        assert_eq!(calls[0].1["media"], "AAAA");
        assert_eq!(calls[0].1["text"], "look");
    }

    #[tokio::test]
    async fn test_newsletter_image_file_encoded_for_channel() {
        let instance = RecordingInstance::new(true);
        let ctrl = controller(instance.clone());
        ctrl.send_media(
            "main",
            media_request("120363@newsletter", MediaType::Image, None),
            Some(upload(b"hello")),
        )
        .await
        .unwrap();
        assert_eq!(instance.calls()[0].1["media"], "aGVsbG8=");
    }

    #[tokio::test]
    async fn test_newsletter_image_invalid_media_rejected() {
        let instance = RecordingInstance::new(true);
        let ctrl = controller(instance.clone());
        let err = ctrl
            .send_media(
                "main",
                media_request("120363@newsletter", MediaType::Image, Some("???")),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::InvalidMedia(_)));
        assert!(instance.calls().is_empty());
    }

    #[tokio::test]
    async fn test_newsletter_without_capability_uses_media_path() {
        let instance = RecordingInstance::new(false);
        let ctrl = controller(instance.clone());
        ctrl.send_media(
            "main",
            media_request("120363@newsletter", MediaType::Image, Some("AAAA")),
            None,
        )
        .await
        .unwrap();
        assert_eq!(instance.calls()[0].0, "media");
    }

    #[tokio::test]
    async fn test_newsletter_video_uses_media_path() {
        let instance = RecordingInstance::new(true);
        let ctrl = controller(instance.clone());
        ctrl.send_media(
            "main",
            media_request("120363@newsletter", MediaType::Video, Some("AAAA")),
            None,
        )
        .await
        .unwrap();
        assert_eq!(instance.calls()[0].0, "media");
    }

    fn channel_request(media: &str) -> SendChannelMedia {
        SendChannelMedia {
            number: "120363@newsletter".to_string(),
            media: media.to_string(),
            text: Some("launch day".to_string()),
            options: SendOptions {
                delay: Some(100),
                message_id: Some("MSG1".to_string()),
                ..SendOptions::default()
            },
        }
    }

    #[tokio::test]
    async fn test_channel_media_supported() {
        let instance = RecordingInstance::new(true);
        let ctrl = controller(instance.clone());
        ctrl.send_channel_media("main", channel_request("data:image/png;base64,AAAA"))
            .await
            .unwrap();

        let calls = instance.calls();
        assert_eq!(calls[0].0, "channel_media");
        assert_eq!(calls[0].1["media"], "AAAA");
        assert_eq!(calls[0].1["messageId"], "MSG1");
    }

    #[tokio::test]
    async fn test_channel_media_fallback_maps_caption() {
        let instance = RecordingInstance::new(false);
        let ctrl = controller(instance.clone());
        ctrl.send_channel_media("main", channel_request("https://example.com/a.jpg"))
            .await
            .unwrap();

        let calls = instance.calls();
        assert_eq!(calls[0].0, "media");
        assert_eq!(calls[0].1["mediatype"], "image");
        assert_eq!(calls[0].1["caption"], "launch day");
        assert_eq!(calls[0].1["media"], "https://example.com/a.jpg");
        assert_eq!(calls[0].1["delay"], 100);
        assert!(calls[0].1.get("text").is_none());
    }

    #[tokio::test]
    async fn test_channel_media_invalid_rejected_before_lookup() {
        let ctrl = controller(RecordingInstance::new(true));
        let err = ctrl
            .send_channel_media("ghost", channel_request("not media"))
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::InvalidMedia(_)));
    }

    #[tokio::test]
    async fn test_ptv_and_sticker_sources() {
        let instance = RecordingInstance::new(false);
        let ctrl = controller(instance.clone());

        ctrl.send_ptv(
            "main",
            SendPtv {
                number: "1".to_string(),
                video: Some("https://example.com/v.mp4".to_string()),
                options: SendOptions::default(),
            },
            None,
        )
        .await
        .unwrap();

        let err = ctrl
            .send_sticker(
                "main",
                SendSticker {
                    number: "1".to_string(),
                    sticker: None,
                    options: SendOptions::default(),
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::InvalidMedia(_)));

        ctrl.send_sticker(
            "main",
            SendSticker {
                number: "1".to_string(),
                sticker: None,
                options: SendOptions::default(),
            },
            Some(upload(b"RIFF")),
        )
        .await
        .unwrap();

        let methods: Vec<String> = instance.calls().into_iter().map(|c| c.0).collect();
        assert_eq!(methods, vec!["ptv", "sticker"]);
    }

    #[tokio::test]
    async fn test_audio_accepts_any_uploaded_file() {
        let instance = RecordingInstance::new(false);
        let ctrl = controller(instance.clone());
        let request = SendAudio {
            number: "1".to_string(),
            audio: None,
            options: SendOptions::default(),
        };

        let err = ctrl
            .send_audio("main", request.clone(), None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), AUDIO_URL_BASE64_OR_FILE);

        ctrl.send_audio("main", request.clone(), Some(upload(b"")))
            .await
            .unwrap();
        ctrl.send_audio("main", request, Some(upload(b"OggS")))
            .await
            .unwrap();
        let calls = instance.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| c.2));
    }

    #[tokio::test]
    async fn test_reaction_validation() {
        let instance = RecordingInstance::new(false);
        let ctrl = controller(instance.clone());

        ctrl.send_reaction("main", reaction("")).await.unwrap();
        ctrl.send_reaction("main", reaction("👍")).await.unwrap();

        for bad in ["ab", "👍👍"] {
            let err = ctrl.send_reaction("main", reaction(bad)).await.unwrap_err();
            assert!(matches!(err, SendError::InvalidReaction));
        }
        assert_eq!(instance.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_status_forwards_file() {
        let instance = RecordingInstance::new(false);
        let ctrl = controller(instance.clone());
        ctrl.send_status(
            "main",
            SendStatus {
                kind: crate::dto::StatusType::Image,
                content: None,
                caption: Some("sunset".to_string()),
                background_color: None,
                font: None,
                all_contacts: Some(true),
                status_jid_list: None,
            },
            Some(upload(b"\xff\xd8")),
        )
        .await
        .unwrap();

        let calls = instance.calls();
        assert_eq!(calls[0].0, "status");
        assert_eq!(calls[0].1["type"], "image");
        assert!(calls[0].2);
    }

    #[tokio::test]
    async fn test_instance_failure_passed_through() {
        let ctrl = controller(RecordingInstance::new(false));
        let err = ctrl
            .send_template(
                "main",
                SendTemplate {
                    number: "1".to_string(),
                    name: "broken".to_string(),
                    language: "en_US".to_string(),
                    components: Vec::new(),
                    webhook_url: None,
                    options: SendOptions::default(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::Instance(_)));
        assert!(err.to_string().contains("template rejected upstream"));
    }
}
