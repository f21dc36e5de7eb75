pub mod loopback;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::dto::{
    SendAudio, SendButtons, SendChannelMedia, SendContact, SendList, SendLocation, SendMedia,
    SendPoll, SendPtv, SendReaction, SendStatus, SendSticker, SendTemplate, SendText,
};
use crate::media::UploadedFile;

/// A connected messaging session. Results are opaque to this crate and are
/// handed back to the caller unchanged.
#[async_trait]
pub trait InstanceHandle: Send + Sync {
    async fn text_message(&self, data: SendText) -> Result<Value>;
    async fn media_message(&self, data: SendMedia, file: Option<UploadedFile>) -> Result<Value>;
    async fn ptv_message(&self, data: SendPtv, file: Option<UploadedFile>) -> Result<Value>;
    async fn sticker_message(&self, data: SendSticker, file: Option<UploadedFile>)
        -> Result<Value>;
    async fn audio_message(&self, data: SendAudio, file: Option<UploadedFile>) -> Result<Value>;
    async fn button_message(&self, data: SendButtons) -> Result<Value>;
    async fn location_message(&self, data: SendLocation) -> Result<Value>;
    async fn list_message(&self, data: SendList) -> Result<Value>;
    async fn contact_message(&self, data: SendContact) -> Result<Value>;
    async fn reaction_message(&self, data: SendReaction) -> Result<Value>;
    async fn poll_message(&self, data: SendPoll) -> Result<Value>;
    async fn status_message(&self, data: SendStatus, file: Option<UploadedFile>) -> Result<Value>;
    async fn template_message(&self, data: SendTemplate) -> Result<Value>;

    /// Newsletter channel posting, when the session supports it.
    fn channel_media(&self) -> Option<&dyn ChannelMediaSender> {
        None
    }
}

/// Optional capability: post media directly to a newsletter channel.
#[async_trait]
pub trait ChannelMediaSender: Send + Sync {
    async fn channel_media_message(&self, data: SendChannelMedia) -> Result<Value>;
}

/// Lookup of live instances by name. Owned by whatever manages sessions.
pub trait InstanceRegistry: Send + Sync {
    fn get(&self, name: &str) -> Option<Arc<dyn InstanceHandle>>;
    fn names(&self) -> Vec<String>;
}

/// In-process registry of instance handles.
#[derive(Default)]
pub struct InstanceMonitor {
    instances: RwLock<HashMap<String, Arc<dyn InstanceHandle>>>,
}

impl InstanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str, handle: Arc<dyn InstanceHandle>) {
        info!("Registered instance: {}", name);
        self.write().insert(name.to_string(), handle);
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // Map updates are single inserts, so a poisoned lock is still consistent.
    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<dyn InstanceHandle>>> {
        self.instances.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<dyn InstanceHandle>>> {
        self.instances.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl InstanceRegistry for InstanceMonitor {
    fn get(&self, name: &str) -> Option<Arc<dyn InstanceHandle>> {
        self.read().get(name).cloned()
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }
}
