//! Messaging gateway abstraction.
//!
//! The service never talks to WhatsApp directly. A gateway (Evolution API in production)
//! owns the WhatsApp sessions; we create named instances on it, pair them with a QR code,
//! list their groups and send text through them. Incoming traffic arrives separately as
//! webhooks (see [`crate::api::handlers::webhooks`]).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    config::MessagingConfig,
    db::models::instances::InstanceStatus,
    gateway::{GatewayError, Result},
};

pub mod dummy;
pub mod events;
pub mod evolution;

/// Create a messaging gateway from configuration
pub fn create_messaging_gateway(config: &MessagingConfig) -> std::result::Result<Box<dyn MessagingGateway>, GatewayError> {
    Ok(match config {
        MessagingConfig::Evolution(evolution_config) => Box::new(evolution::EvolutionGateway::new(evolution_config)?),
        MessagingConfig::Dummy(_) => Box::new(dummy::DummyGateway),
    })
}

/// Pairing material returned when an instance starts connecting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct QrCode {
    /// Numeric code for "link with phone number" pairing
    pub pairing_code: Option<String>,
    /// Raw QR payload
    pub code: Option<String>,
    /// QR code as a data-URL PNG
    pub base64: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedInstance {
    pub instance_name: String,
    pub gateway_instance_id: Option<String>,
    pub status: InstanceStatus,
    pub qr_code: Option<QrCode>,
}

/// A group the connected number belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GatewayGroup {
    /// Group JID, ending in `@g.us`
    pub jid: String,
    pub name: String,
    pub size: Option<i64>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub message_id: Option<String>,
}

/// Operations on a WhatsApp gateway, addressed by instance name.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Register a new instance. The gateway may already return a QR code.
    async fn create_instance(&self, instance_name: &str) -> Result<CreatedInstance>;

    /// Start (or restart) pairing and return the QR code.
    async fn connect(&self, instance_name: &str) -> Result<QrCode>;

    async fn connection_state(&self, instance_name: &str) -> Result<InstanceStatus>;

    async fn fetch_groups(&self, instance_name: &str) -> Result<Vec<GatewayGroup>>;

    /// Send a text message to a JID (a group or a contact).
    async fn send_text(&self, instance_name: &str, to: &str, text: &str) -> Result<SentMessage>;

    async fn logout(&self, instance_name: &str) -> Result<()>;

    async fn delete_instance(&self, instance_name: &str) -> Result<()>;
}
