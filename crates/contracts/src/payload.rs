//! MessagePayload - the single message broadcast in a run

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Message formatting understood by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseMode {
    /// Telegram HTML subset (`<b>`, `<i>`, `<a href>` ...)
    #[default]
    Html,
    /// Sent verbatim
    Plain,
}

impl ParseMode {
    /// Value for the Bot API `parse_mode` field, `None` for plain text
    pub fn as_api_str(self) -> Option<&'static str> {
        match self {
            Self::Html => Some("HTML"),
            Self::Plain => None,
        }
    }
}

/// Image sent with the message text as caption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub file_name: String,
    pub bytes: Bytes,
}

impl ImageAttachment {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Message payload
///
/// Immutable for the duration of a run. The dispatcher shares it with every
/// send task through an `Arc`; image bytes are `Bytes`, so nothing is copied
/// per recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePayload {
    /// Message text, or the caption when an image is attached
    pub text: String,
    pub parse_mode: ParseMode,
    pub image: Option<ImageAttachment>,
    pub disable_web_page_preview: bool,
}

impl MessagePayload {
    /// Text-only HTML message
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parse_mode: ParseMode::Html,
            image: None,
            disable_web_page_preview: false,
        }
    }

    /// Attach an image; the text becomes its caption
    pub fn with_image(mut self, image: ImageAttachment) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_parse_mode(mut self, parse_mode: ParseMode) -> Self {
        self.parse_mode = parse_mode;
        self
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }
}
