//! HTTP surface of the send-message API.

use axum::{
    extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use crate::controller::SendMessageController;
use crate::dto::{
    SendAudio, SendButtons, SendChannelMedia, SendContact, SendList, SendLocation, SendMedia,
    SendPoll, SendPtv, SendReaction, SendStatus, SendSticker, SendTemplate, SendText,
};
use crate::error::SendError;
use crate::media::UploadedFile;

/// Name of the multipart part carrying binary media.
const FILE_FIELD: &str = "file";

type Created = (StatusCode, Json<Value>);

fn created(result: Value) -> Created {
    (StatusCode::CREATED, Json(result))
}

/// A request body given either as JSON or as `multipart/form-data` with an
/// optional `file` part.
pub struct SendBody<T> {
    pub data: T,
    pub file: Option<UploadedFile>,
}

impl<S, T> FromRequest<S> for SendBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = SendError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("multipart/form-data"));

        if !is_multipart {
            let Json(data) = Json::<T>::from_request(req, state)
                .await
                .map_err(|e| SendError::BadBody(e.body_text()))?;
            return Ok(Self { data, file: None });
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| SendError::BadBody(e.body_text()))?;

        let mut fields = Map::new();
        let mut file = None;
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| SendError::BadBody(e.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == FILE_FIELD {
                let file_name = field.file_name().map(str::to_string);
                let mime_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| SendError::BadBody(e.body_text()))?;
                file = Some(UploadedFile {
                    file_name,
                    mime_type,
                    data,
                });
                continue;
            }
            let text = field
                .text()
                .await
                .map_err(|e| SendError::BadBody(e.body_text()))?;
            insert_form_field(&mut fields, &name, text);
        }

        let data = serde_json::from_value(Value::Object(fields))
            .map_err(|e| SendError::BadBody(format!("Invalid form fields: {e}")))?;
        Ok(Self { data, file })
    }
}

/// Form values are strings; JSON-looking values (`{...}`, `[...]`) are parsed,
/// and repeated or `name[]` fields collect into an array.
fn insert_form_field(fields: &mut Map<String, Value>, name: &str, text: String) {
    let (key, force_array) = match name.strip_suffix("[]") {
        Some(stripped) => (stripped, true),
        None => (name, false),
    };

    let trimmed = text.trim_start();
    let value = if trimmed.starts_with('{') || trimmed.starts_with('[') {
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    } else {
        Value::String(text)
    };

    match fields.get_mut(key) {
        Some(Value::Array(items)) if force_array || !value.is_array() => items.push(value),
        Some(existing) => {
            let previous = existing.take();
            *existing = Value::Array(vec![previous, value]);
        }
        None if force_array => {
            fields.insert(key.to_string(), Value::Array(vec![value]));
        }
        None => {
            fields.insert(key.to_string(), value);
        }
    }
}

pub fn router(controller: SendMessageController, body_limit: usize) -> Router {
    let message = Router::new()
        .route("/sendText/{instance}", post(send_text))
        .route("/sendMedia/{instance}", post(send_media))
        .route("/sendChannelMedia/{instance}", post(send_channel_media))
        .route("/sendPtv/{instance}", post(send_ptv))
        .route("/sendSticker/{instance}", post(send_sticker))
        .route("/sendWhatsAppAudio/{instance}", post(send_audio))
        .route("/sendButtons/{instance}", post(send_buttons))
        .route("/sendLocation/{instance}", post(send_location))
        .route("/sendList/{instance}", post(send_list))
        .route("/sendContact/{instance}", post(send_contact))
        .route("/sendReaction/{instance}", post(send_reaction))
        .route("/sendPoll/{instance}", post(send_poll))
        .route("/sendStatus/{instance}", post(send_status))
        .route("/sendTemplate/{instance}", post(send_template));

    Router::new()
        .route("/health", get(health))
        .route("/instances", get(list_instances))
        .nest("/message", message)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(controller)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_instances(State(ctrl): State<SendMessageController>) -> Json<Value> {
    Json(json!({ "instances": ctrl.registry().names() }))
}

// ── Handlers ───────────────────────────────────────────────────────────────────

async fn send_text(
    State(ctrl): State<SendMessageController>,
    Path(instance): Path<String>,
    body: SendBody<SendText>,
) -> Result<Created, SendError> {
    ctrl.send_text(&instance, body.data).await.map(created)
}

async fn send_media(
    State(ctrl): State<SendMessageController>,
    Path(instance): Path<String>,
    body: SendBody<SendMedia>,
) -> Result<Created, SendError> {
    ctrl.send_media(&instance, body.data, body.file)
        .await
        .map(created)
}

async fn send_channel_media(
    State(ctrl): State<SendMessageController>,
    Path(instance): Path<String>,
    body: SendBody<SendChannelMedia>,
) -> Result<Created, SendError> {
    ctrl.send_channel_media(&instance, body.data)
        .await
        .map(created)
}

async fn send_ptv(
    State(ctrl): State<SendMessageController>,
    Path(instance): Path<String>,
    body: SendBody<SendPtv>,
) -> Result<Created, SendError> {
    ctrl.send_ptv(&instance, body.data, body.file)
        .await
        .map(created)
}

async fn send_sticker(
    State(ctrl): State<SendMessageController>,
    Path(instance): Path<String>,
    body: SendBody<SendSticker>,
) -> Result<Created, SendError> {
    ctrl.send_sticker(&instance, body.data, body.file)
        .await
        .map(created)
}

async fn send_audio(
    State(ctrl): State<SendMessageController>,
    Path(instance): Path<String>,
    body: SendBody<SendAudio>,
) -> Result<Created, SendError> {
    ctrl.send_audio(&instance, body.data, body.file)
        .await
        .map(created)
}

async fn send_buttons(
    State(ctrl): State<SendMessageController>,
    Path(instance): Path<String>,
    body: SendBody<SendButtons>,
) -> Result<Created, SendError> {
    ctrl.send_buttons(&instance, body.data).await.map(created)
}

async fn send_location(
    State(ctrl): State<SendMessageController>,
    Path(instance): Path<String>,
    body: SendBody<SendLocation>,
) -> Result<Created, SendError> {
    ctrl.send_location(&instance, body.data).await.map(created)
}

async fn send_list(
    State(ctrl): State<SendMessageController>,
    Path(instance): Path<String>,
    body: SendBody<SendList>,
) -> Result<Created, SendError> {
    ctrl.send_list(&instance, body.data).await.map(created)
}

async fn send_contact(
    State(ctrl): State<SendMessageController>,
    Path(instance): Path<String>,
    body: SendBody<SendContact>,
) -> Result<Created, SendError> {
    ctrl.send_contact(&instance, body.data).await.map(created)
}

async fn send_reaction(
    State(ctrl): State<SendMessageController>,
    Path(instance): Path<String>,
    body: SendBody<SendReaction>,
) -> Result<Created, SendError> {
    ctrl.send_reaction(&instance, body.data).await.map(created)
}

async fn send_poll(
    State(ctrl): State<SendMessageController>,
    Path(instance): Path<String>,
    body: SendBody<SendPoll>,
) -> Result<Created, SendError> {
    ctrl.send_poll(&instance, body.data).await.map(created)
}

async fn send_status(
    State(ctrl): State<SendMessageController>,
    Path(instance): Path<String>,
    body: SendBody<SendStatus>,
) -> Result<Created, SendError> {
    ctrl.send_status(&instance, body.data, body.file)
        .await
        .map(created)
}

async fn send_template(
    State(ctrl): State<SendMessageController>,
    Path(instance): Path<String>,
    body: SendBody<SendTemplate>,
) -> Result<Created, SendError> {
    ctrl.send_template(&instance, body.data).await.map(created)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
