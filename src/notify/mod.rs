//! Order notifications
//!
//! Emails are sent by a [`NotificationDispatcher`] subscribed to the event
//! bus, never from the request handlers themselves.

pub mod dispatcher;
pub mod mailer;
pub mod templates;

pub use dispatcher::NotificationDispatcher;
#[cfg(feature = "email")]
pub use mailer::ResendMailer;
pub use mailer::{EmailMessage, LogMailer, Mailer, NotifyError, RecordingMailer};
