//! Notification fan-out for the ODV back-office
//!
//! The hub is the in-process end of the push channel: transports (a
//! websocket route, the CLI) subscribe to it and forward the JSON messages.

pub mod hub;

pub use hub::{NotificationHub, NotificationMessage, Subscription};
