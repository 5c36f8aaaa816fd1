//! Offline messaging gateway for local development.
//!
//! Every instance pairs instantly and sees the same two groups. Sent messages go nowhere.

use async_trait::async_trait;
use tracing::info;

use crate::{
    db::models::instances::InstanceStatus,
    gateway::Result,
    messaging::{CreatedInstance, GatewayGroup, MessagingGateway, QrCode, SentMessage},
};

pub struct DummyGateway;

pub const DUMMY_GROUPS: [(&str, &str); 2] = [
    ("120363000000000001@g.us", "Dummy Group One"),
    ("120363000000000002@g.us", "Dummy Group Two"),
];

fn dummy_qr(instance_name: &str) -> QrCode {
    QrCode {
        pairing_code: Some("DUMMY123".to_string()),
        code: Some(format!("dummy@{instance_name}")),
        base64: None,
    }
}

#[async_trait]
impl MessagingGateway for DummyGateway {
    async fn create_instance(&self, instance_name: &str) -> Result<CreatedInstance> {
        info!("Dummy gateway created instance {instance_name}");
        Ok(CreatedInstance {
            instance_name: instance_name.to_string(),
            gateway_instance_id: Some(format!("dummy-{instance_name}")),
            status: InstanceStatus::Created,
            qr_code: Some(dummy_qr(instance_name)),
        })
    }

    async fn connect(&self, instance_name: &str) -> Result<QrCode> {
        Ok(dummy_qr(instance_name))
    }

    async fn connection_state(&self, _instance_name: &str) -> Result<InstanceStatus> {
        Ok(InstanceStatus::Open)
    }

    async fn fetch_groups(&self, _instance_name: &str) -> Result<Vec<GatewayGroup>> {
        Ok(DUMMY_GROUPS
            .iter()
            .map(|(jid, name)| GatewayGroup {
                jid: jid.to_string(),
                name: name.to_string(),
                size: Some(2),
                description: None,
            })
            .collect())
    }

    async fn send_text(&self, instance_name: &str, to: &str, text: &str) -> Result<SentMessage> {
        info!("Dummy gateway: {instance_name} -> {to} ({} chars)", text.chars().count());
        Ok(SentMessage {
            message_id: Some(format!("dummy-{}", uuid::Uuid::new_v4().simple())),
        })
    }

    async fn logout(&self, _instance_name: &str) -> Result<()> {
        Ok(())
    }

    async fn delete_instance(&self, _instance_name: &str) -> Result<()> {
        Ok(())
    }
}
