pub mod health;
pub mod messages;
pub mod public;
pub mod webchat;
pub mod webhooks;
