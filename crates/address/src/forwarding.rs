use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use regforge_core::config::ForwardingConfig;

use crate::{AddressProvider, DisposableAddress, ProviderError};

/// Creates disposable addresses by posting a literal `to`-matcher forward
/// rule to the mail-routing API of the configured zone. The address the
/// backend accepted is read back from the created rule's matcher.
pub struct ForwardingRuleClient {
    http: reqwest::Client,
    config: ForwardingConfig,
}

#[derive(Debug, Deserialize)]
struct RulesResponse {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<RuleResult>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    message: String,
}

#[derive(Debug, Deserialize)]
struct RuleResult {
    matchers: Vec<RuleMatcher>,
}

#[derive(Debug, Deserialize)]
struct RuleMatcher {
    value: String,
}

impl ForwardingRuleClient {
    pub fn new(config: ForwardingConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;
        Ok(Self { http, config })
    }

    fn rules_url(&self) -> String {
        format!(
            "{}/zones/{}/email/routing/rules",
            self.config.api_base.trim_end_matches('/'),
            self.config.zone_id
        )
    }
}

#[async_trait]
impl AddressProvider for ForwardingRuleClient {
    async fn create(&self, label: &str) -> Result<DisposableAddress, ProviderError> {
        let address = format!("{}@{}", label, self.config.rules_domain);

        let payload = json!({
            "actions": [{ "type": "forward", "value": [self.config.target_mail] }],
            "enabled": true,
            "matchers": [{ "field": "to", "type": "literal", "value": address }],
            "name": format!("regforge {}", label),
        });

        debug!(address = %address, "creating forwarding rule");

        let response = self
            .http
            .post(self.rules_url())
            .header("X-Auth-Email", &self.config.auth_email)
            .header("X-Auth-Key", &self.config.auth_key)
            .json(&payload)
            .send()
            .await?;

        let body: RulesResponse = response.json().await?;
        let accepted = parse_created_address(body)?;

        info!(address = %accepted, "disposable address created");
        Ok(DisposableAddress {
            local_part: label.to_string(),
            address: accepted,
            created_at: Utc::now(),
        })
    }
}

/// Pull the accepted address out of the rule-creation response.
fn parse_created_address(body: RulesResponse) -> Result<String, ProviderError> {
    if !body.success {
        let message = body
            .errors
            .first()
            .map(|e| e.message.clone())
            .unwrap_or_else(|| "unknown error".to_string());
        return Err(ProviderError::Api(message));
    }

    body.result
        .and_then(|r| r.matchers.into_iter().next())
        .map(|m| m.value)
        .ok_or_else(|| ProviderError::Malformed("rule created but no matcher returned".into()))
}
