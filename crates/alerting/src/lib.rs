//! Alerting System
//!
//! Builds temperature alarm messages and fans them out to every configured
//! notification channel (email, Telegram bot, ntfy push), isolating each
//! channel's failure from the others.

mod channel;
mod email;
mod fanout;
mod message;
mod ntfy;
mod telegram;

pub use channel::{ChannelError, Delivery, NotificationChannel};
pub use email::{EmailChannel, EmailConfig};
pub use fanout::{ChannelOutcome, DispatchReport, FanoutConfig, NotificationFanout};
pub use message::{AlertMessage, AlertSeverity};
pub use ntfy::{NtfyPublisher, PushChannel, PushConfig, PushPublisher};
pub use telegram::{TelegramChannel, TelegramConfig};
