pub mod builder;
pub mod dispatch;
pub mod lifecycle;
pub mod location;
pub mod notifications;
pub mod tracker;
