//! Core domain models and storage for webhook fan-out.
//!
//! Provides the notification, webhook and execution unit models, the
//! key-value store collaborator with its typed repositories, lifecycle hooks,
//! and the clock abstraction. The delivery crate builds the engine on top of
//! these types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod hooks;
pub mod models;
pub mod storage;
pub mod time;

pub use error::{CoreError, Result};
pub use hooks::{DeliveryHooks, MulticastHooks, NoOpHooks};
pub use models::{
    DeliveryFailure, ExecutionUnit, Namespace, NewNotification, Notification, NotificationId,
    UnitKey, WebhookUrl,
};
pub use time::{Clock, RealClock, TestClock};
