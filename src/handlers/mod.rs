pub mod internal;
pub mod public;
pub mod webhooks;
