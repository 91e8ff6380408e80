//! Client-side stores fed by the realtime channel.

pub mod notifications;

pub use notifications::NotificationStore;
