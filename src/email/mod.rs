//! Email content rendering and dispatch.

pub mod dispatch;
pub mod render;
pub mod templates;

pub use dispatch::{DispatchResult, Dispatcher, EmailTransport, OutgoingEmail, SmtpMailer};
pub use render::{EmailRenderer, RenderedEmail};
pub use templates::{EmailTemplate, TemplateStore};
