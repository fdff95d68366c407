//! TelegramTransport - Bot API `sendMessage` / `sendPhoto` over reqwest
//!
//! The bot token is part of every request URL. It is never logged and is
//! stripped from reqwest errors before they become failures.

use std::fmt;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use contracts::{
    ContractError, Delivery, MessagePayload, Recipient, TelegramSettings, Transport,
    TransportFailure,
};

/// Longest body excerpt kept in an `Http` failure
const MAX_BODY_EXCERPT: usize = 256;

/// Bot API response envelope
#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    ok: bool,
    #[serde(default)]
    result: Option<SentMessage>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

/// Live transport over the Telegram Bot API
#[derive(Clone)]
pub struct TelegramTransport {
    client: Client,
    api_base: String,
    token: String,
}

impl fmt::Debug for TelegramTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramTransport")
            .field("api_base", &self.api_base)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl TelegramTransport {
    /// Build a transport with its own HTTP client
    ///
    /// # Errors
    /// The HTTP client cannot be constructed (TLS backend failure)
    pub fn new(token: impl Into<String>, settings: &TelegramSettings) -> Result<Self, ContractError> {
        let client = Client::builder()
            .timeout(settings.request_timeout())
            .user_agent(concat!("broadcaster/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ContractError::transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn send_text(
        &self,
        recipient: Recipient,
        payload: &MessagePayload,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let mut body = json!({
            "chat_id": recipient.id(),
            "text": payload.text,
            "disable_web_page_preview": payload.disable_web_page_preview,
        });
        if let Some(mode) = payload.parse_mode.as_api_str() {
            body["parse_mode"] = json!(mode);
        }

        self.client
            .post(self.method_url("sendMessage"))
            .json(&body)
            .send()
            .await
    }

    async fn send_photo(
        &self,
        recipient: Recipient,
        payload: &MessagePayload,
        image: &contracts::ImageAttachment,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let photo = Part::stream_with_length(image.bytes.clone(), image.len() as u64)
            .file_name(image.file_name.clone());

        let mut form = Form::new()
            .text("chat_id", recipient.id().to_string())
            .text("caption", payload.text.clone());
        if let Some(mode) = payload.parse_mode.as_api_str() {
            form = form.text("parse_mode", mode);
        }
        let form = form.part("photo", photo);

        self.client
            .post(self.method_url("sendPhoto"))
            .multipart(form)
            .send()
            .await
    }
}

impl Transport for TelegramTransport {
    fn name(&self) -> &str {
        "telegram"
    }

    #[instrument(
        name = "telegram_send",
        skip(self, payload),
        fields(image = payload.has_image())
    )]
    async fn send(
        &self,
        recipient: Recipient,
        payload: &MessagePayload,
    ) -> Result<Delivery, TransportFailure> {
        let response = match &payload.image {
            Some(image) => self.send_photo(recipient, payload, image).await,
            None => self.send_text(recipient, payload).await,
        }
        .map_err(request_failure)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(request_failure)?;
        debug!(status, bytes = body.len(), "Bot API responded");

        parse_response(status, &body)
    }
}

/// Interpret a Bot API response
pub(crate) fn parse_response(status: u16, body: &str) -> Result<Delivery, TransportFailure> {
    let envelope: ApiEnvelope = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(e) if (200..300).contains(&status) => {
            return Err(TransportFailure::Decode {
                message: format!("unexpected response body: {e}"),
            });
        }
        Err(_) => {
            return Err(TransportFailure::Http {
                status,
                body: excerpt(body),
            });
        }
    };

    if envelope.ok {
        return Ok(Delivery {
            message_id: envelope.result.map(|m| m.message_id),
        });
    }

    Err(TransportFailure::Api {
        error_code: envelope.error_code.unwrap_or(i64::from(status)),
        description: envelope
            .description
            .unwrap_or_else(|| "no description".to_string()),
        retry_after: envelope.parameters.and_then(|p| p.retry_after),
    })
}

fn request_failure(err: reqwest::Error) -> TransportFailure {
    let err = err.without_url();
    if err.is_timeout() {
        TransportFailure::timeout(err.to_string())
    } else if err.is_connect() {
        TransportFailure::connect(err.to_string())
    } else if err.is_decode() || err.is_body() {
        TransportFailure::Decode {
            message: err.to_string(),
        }
    } else {
        TransportFailure::other(err.to_string())
    }
}

fn excerpt(body: &str) -> String {
    match body.char_indices().nth(MAX_BODY_EXCERPT) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}
