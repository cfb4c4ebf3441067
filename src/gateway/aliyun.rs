//! Aliyun implementation of the [`CloudGateway`] trait.
//!
//! Talks to the RPC-style OpenAPI endpoints directly over HTTPS:
//! traffic comes from CDT (`ListCdtInternetTraffic`), instance status
//! and lifecycle commands from ECS (`DescribeInstances`,
//! `StartInstance`, `StopInstance`). Every request is signed with the
//! account's key pair (HMAC-SHA1 over the canonicalized query string).

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{Client, Method};
use serde::Deserialize;
use sha1::Sha1;
use tracing::{instrument, trace};
use uuid::Uuid;

use super::{CloudGateway, GatewayError, GatewayResult};
use crate::config::Credentials;
use crate::{InstanceStatus, TrafficReading};

const ECS_ENDPOINT: &str = "https://ecs.aliyuncs.com";
const CDT_ENDPOINT: &str = "https://cdt.aliyuncs.com";

const ECS_VERSION: &str = "2014-05-26";
const CDT_VERSION: &str = "2021-08-13";

// RFC 3986 unreserved characters stay as-is, everything else is encoded.
const QUERY_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

type HmacSha1 = Hmac<Sha1>;

#[derive(Debug, Clone)]
pub struct AliyunGateway {
    client: Client,
    ecs_endpoint: String,
    cdt_endpoint: String,
}

impl Default for AliyunGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl AliyunGateway {
    pub fn new() -> AliyunGateway {
        Self::with_endpoints(ECS_ENDPOINT, CDT_ENDPOINT)
    }

    /// Overridable endpoints, primarily for pointing the gateway at a
    /// mock server.
    pub fn with_endpoints(ecs_endpoint: &str, cdt_endpoint: &str) -> AliyunGateway {
        Self {
            client: Client::new(),
            ecs_endpoint: ecs_endpoint.trim_end_matches('/').to_string(),
            cdt_endpoint: cdt_endpoint.trim_end_matches('/').to_string(),
        }
    }

    async fn call(
        &self,
        method: Method,
        endpoint: &str,
        version: &str,
        action: &str,
        credentials: &Credentials,
        extra_params: &[(&str, &str)],
    ) -> GatewayResult<String> {
        let mut params = BTreeMap::new();
        params.insert("Format".to_string(), "JSON".to_string());
        params.insert("Version".to_string(), version.to_string());
        params.insert("Action".to_string(), action.to_string());
        params.insert(
            "AccessKeyId".to_string(),
            credentials.access_key_id.clone(),
        );
        params.insert("RegionId".to_string(), credentials.region_id.clone());
        params.insert("SignatureMethod".to_string(), "HMAC-SHA1".to_string());
        params.insert("SignatureVersion".to_string(), "1.0".to_string());
        params.insert("SignatureNonce".to_string(), Uuid::new_v4().to_string());
        params.insert(
            "Timestamp".to_string(),
            Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        );
        for (key, value) in extra_params {
            params.insert((*key).to_string(), (*value).to_string());
        }

        let query = signed_query(method.as_str(), &credentials.access_key_secret, &params);
        let url = format!("{endpoint}/?{query}");

        trace!("{action}: calling {endpoint}");
        let response = self.client.request(method, &url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<ApiErrorBody>(&body) {
                Ok(err) => GatewayError::Api {
                    code: err.code,
                    message: err.message,
                },
                Err(_) => GatewayError::MalformedResponse(format!(
                    "{action} answered HTTP {status} with an unparseable body"
                )),
            });
        }

        Ok(body)
    }
}

#[async_trait]
impl CloudGateway for AliyunGateway {
    #[instrument(skip_all)]
    async fn query_traffic(&self, credentials: &Credentials) -> GatewayResult<TrafficReading> {
        let body = self
            .call(
                Method::POST,
                &self.cdt_endpoint,
                CDT_VERSION,
                "ListCdtInternetTraffic",
                credentials,
                &[],
            )
            .await?;

        let parsed: TrafficResponse = serde_json::from_str(&body)?;
        let total_bytes = parsed
            .traffic_details
            .iter()
            .map(|detail| detail.traffic)
            .sum();

        Ok(TrafficReading::from_bytes(total_bytes))
    }

    #[instrument(skip_all, fields(instance_id = %instance_id))]
    async fn query_instance_status(
        &self,
        credentials: &Credentials,
        instance_id: &str,
    ) -> GatewayResult<InstanceStatus> {
        let instance_ids = serde_json::to_string(&[instance_id])?;
        let body = self
            .call(
                Method::GET,
                &self.ecs_endpoint,
                ECS_VERSION,
                "DescribeInstances",
                credentials,
                &[("InstanceIds", &instance_ids)],
            )
            .await?;

        let parsed: DescribeInstancesResponse = serde_json::from_str(&body)?;
        let Some(instance) = parsed.instances.instance.first() else {
            return Err(GatewayError::InstanceNotFound(instance_id.to_string()));
        };

        Ok(InstanceStatus::from_api(&instance.status))
    }

    #[instrument(skip_all, fields(instance_id = %instance_id))]
    async fn start_instance(
        &self,
        credentials: &Credentials,
        instance_id: &str,
    ) -> GatewayResult<()> {
        self.call(
            Method::GET,
            &self.ecs_endpoint,
            ECS_VERSION,
            "StartInstance",
            credentials,
            &[("InstanceId", instance_id)],
        )
        .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(instance_id = %instance_id))]
    async fn stop_instance(
        &self,
        credentials: &Credentials,
        instance_id: &str,
    ) -> GatewayResult<()> {
        self.call(
            Method::GET,
            &self.ecs_endpoint,
            ECS_VERSION,
            "StopInstance",
            credentials,
            &[("InstanceId", instance_id)],
        )
        .await?;
        Ok(())
    }
}

/// Builds the final query string: canonicalized parameters plus the
/// `Signature` parameter, per the provider's RPC signing scheme.
fn signed_query(method: &str, access_key_secret: &str, params: &BTreeMap<String, String>) -> String {
    let canonical = params
        .iter()
        .map(|(key, value)| format!("{}={}", percent(key), percent(value)))
        .collect::<Vec<_>>()
        .join("&");

    let string_to_sign = format!("{method}&{}&{}", percent("/"), percent(&canonical));

    let mut mac = HmacSha1::new_from_slice(format!("{access_key_secret}&").as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(string_to_sign.as_bytes());
    let signature = BASE64.encode(mac.finalize().into_bytes());

    format!("{canonical}&Signature={}", percent(&signature))
}

fn percent(input: &str) -> String {
    utf8_percent_encode(input, QUERY_ENCODE).to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TrafficResponse {
    #[serde(default)]
    traffic_details: Vec<TrafficDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TrafficDetail {
    #[serde(default)]
    traffic: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstancesResponse {
    instances: InstanceList,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceList {
    #[serde(default)]
    instance: Vec<InstanceEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceEntry {
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiErrorBody {
    code: String,
    message: String,
}
