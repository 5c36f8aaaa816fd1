//! Evolution API client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use crate::{
    config::EvolutionConfig,
    db::models::instances::InstanceStatus,
    gateway::{GatewayClient, Result},
    messaging::{CreatedInstance, GatewayGroup, MessagingGateway, QrCode, SentMessage},
};

const SERVICE: &str = "messaging";

/// Events we ask the gateway to deliver to `/webhooks/messaging`
const WEBHOOK_EVENTS: [&str; 2] = ["MESSAGES_UPSERT", "CONNECTION_UPDATE"];

pub struct EvolutionGateway {
    client: GatewayClient,
    webhook_url: Option<Url>,
    webhook_token: Option<String>,
}

impl EvolutionGateway {
    pub fn new(config: &EvolutionConfig) -> Result<Self> {
        Ok(Self {
            client: GatewayClient::new(SERVICE, &config.base_url, "apikey", &config.api_key, config.timeout)?,
            webhook_url: config.webhook_url.clone(),
            webhook_token: config.webhook_token.clone(),
        })
    }

    fn webhook(&self) -> Option<WebhookSettings<'_>> {
        let url = self.webhook_url.as_ref()?;
        Some(WebhookSettings {
            url: url.as_str(),
            by_events: false,
            base64: false,
            headers: self.webhook_token.as_deref().map(|token| WebhookHeaders { token }),
            events: &WEBHOOK_EVENTS,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateInstanceRequest<'a> {
    instance_name: &'a str,
    qrcode: bool,
    integration: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    webhook: Option<WebhookSettings<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookSettings<'a> {
    url: &'a str,
    by_events: bool,
    base64: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    headers: Option<WebhookHeaders<'a>>,
    events: &'a [&'a str],
}

#[derive(Debug, Serialize)]
struct WebhookHeaders<'a> {
    #[serde(rename = "x-webhook-token")]
    token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstanceInfo {
    instance_name: String,
    instance_id: Option<String>,
    status: Option<String>,
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateInstanceResponse {
    instance: InstanceInfo,
    qrcode: Option<QrCodeResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QrCodeResponse {
    pairing_code: Option<String>,
    code: Option<String>,
    base64: Option<String>,
}

impl From<QrCodeResponse> for QrCode {
    fn from(qr: QrCodeResponse) -> Self {
        Self {
            pairing_code: qr.pairing_code,
            code: qr.code,
            base64: qr.base64,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConnectionStateResponse {
    instance: InstanceInfo,
}

#[derive(Debug, Deserialize)]
struct GroupResponse {
    id: String,
    subject: Option<String>,
    size: Option<i64>,
    desc: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendTextRequest<'a> {
    number: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendTextResponse {
    key: Option<MessageKey>,
}

#[derive(Debug, Deserialize)]
struct MessageKey {
    id: Option<String>,
}

#[async_trait]
impl MessagingGateway for EvolutionGateway {
    #[instrument(skip(self), err)]
    async fn create_instance(&self, instance_name: &str) -> Result<CreatedInstance> {
        let request = CreateInstanceRequest {
            instance_name,
            qrcode: true,
            integration: "WHATSAPP-BAILEYS",
            webhook: self.webhook(),
        };
        let response: CreateInstanceResponse = self.client.post("instance/create", &request).await?;

        let status = response
            .instance
            .status
            .as_deref()
            .map(InstanceStatus::from_gateway_state)
            .unwrap_or(InstanceStatus::Created);

        Ok(CreatedInstance {
            instance_name: response.instance.instance_name,
            gateway_instance_id: response.instance.instance_id,
            status,
            qr_code: response.qrcode.map(QrCode::from),
        })
    }

    #[instrument(skip(self), err)]
    async fn connect(&self, instance_name: &str) -> Result<QrCode> {
        let response: QrCodeResponse = self.client.get(&format!("instance/connect/{instance_name}")).await?;
        Ok(response.into())
    }

    #[instrument(skip(self), err)]
    async fn connection_state(&self, instance_name: &str) -> Result<InstanceStatus> {
        let response: ConnectionStateResponse = self.client.get(&format!("instance/connectionState/{instance_name}")).await?;
        let state = response.instance.state.or(response.instance.status).unwrap_or_default();
        debug!("Instance {instance_name} reports state {state:?}");
        Ok(InstanceStatus::from_gateway_state(&state))
    }

    #[instrument(skip(self), err)]
    async fn fetch_groups(&self, instance_name: &str) -> Result<Vec<GatewayGroup>> {
        let response: Vec<GroupResponse> = self
            .client
            .get_with_query(&format!("group/fetchAllGroups/{instance_name}"), &[("getParticipants", "false")])
            .await?;

        Ok(response
            .into_iter()
            .map(|group| GatewayGroup {
                name: group.subject.filter(|s| !s.is_empty()).unwrap_or_else(|| group.id.clone()),
                jid: group.id,
                size: group.size,
                description: group.desc,
            })
            .collect())
    }

    #[instrument(skip(self, text), fields(length = text.len()), err)]
    async fn send_text(&self, instance_name: &str, to: &str, text: &str) -> Result<SentMessage> {
        let response: SendTextResponse = self
            .client
            .post(&format!("message/sendText/{instance_name}"), &SendTextRequest { number: to, text })
            .await?;

        Ok(SentMessage {
            message_id: response.key.and_then(|key| key.id),
        })
    }

    #[instrument(skip(self), err)]
    async fn logout(&self, instance_name: &str) -> Result<()> {
        let _: Value = self.client.delete(&format!("instance/logout/{instance_name}")).await?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn delete_instance(&self, instance_name: &str) -> Result<()> {
        let _: Value = self.client.delete(&format!("instance/delete/{instance_name}")).await?;
        Ok(())
    }
}
