pub mod email;
pub mod error;
pub mod ingress;
pub mod telegram;
pub mod traits;
pub mod whatsapp;

pub use email::EmailChannel;
pub use error::ChannelError;
pub use ingress::{detect_provider, verify_handler, webhook_handler, IngressState, ProviderKind};
pub use telegram::TelegramChannel;
pub use traits::{Channel, ConfigOverride};
pub use whatsapp::WhatsAppChannel;
