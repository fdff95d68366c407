//! Transport implementations

mod mock;
mod telegram;

pub use mock::{MockCall, MockResponse, MockTransport};
pub use telegram::TelegramTransport;
