//! Aliyun OpenAPI client for ECS, BSS (billing) and CDT (traffic).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use spot_proto::{InstanceStatus, ProductTraffic, RawBillItem, RegionTraffic, TrackedInstance};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::signer::{Credentials, sign_request};
use crate::{
    BillingApi, ChargeType, ComputeApi, ProviderError, Result, StartOutcome, TrafficApi,
};

const ECS_VERSION: &str = "2014-05-26";
const ECS_GLOBAL_ENDPOINT: &str = "ecs.aliyuncs.com";
const BSS_ENDPOINT: &str = "business.aliyuncs.com";
const BSS_VERSION: &str = "2017-12-14";
const CDT_ENDPOINT: &str = "cdt.aliyuncs.com";
const CDT_VERSION: &str = "2021-08-13";

const INSTANCE_PAGE_SIZE: u32 = 100;
const BILL_PAGE_SIZE: u32 = 300;

/// Start errors with this code prefix mean the instance is no longer stopped.
const INCORRECT_STATUS_CODE: &str = "IncorrectInstanceStatus";

fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .expect("failed to build HTTP client")
}

fn ecs_endpoint(region_id: &str) -> String {
    format!("ecs.{region_id}.aliyuncs.com")
}

// ─── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    request_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RegionsResponse {
    regions: RegionList,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RegionList {
    region: Vec<RegionEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RegionEntry {
    region_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct InstancesResponse {
    instances: InstanceList,
    total_count: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct InstanceList {
    instance: Vec<InstanceEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct IpList {
    ip_address: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct EipAddress {
    ip_address: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct VpcAttributes {
    private_ip_address: IpList,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct InstanceEntry {
    instance_id: String,
    instance_name: String,
    region_id: String,
    status: String,
    spot_strategy: String,
    public_ip_address: IpList,
    eip_address: EipAddress,
    inner_ip_address: IpList,
    vpc_attributes: VpcAttributes,
}

fn first_non_empty(list: &[String]) -> Option<String> {
    list.iter().find(|s| !s.is_empty()).cloned()
}

impl From<InstanceEntry> for TrackedInstance {
    fn from(entry: InstanceEntry) -> Self {
        let public_address = first_non_empty(&entry.public_ip_address.ip_address).or_else(|| {
            Some(entry.eip_address.ip_address.clone()).filter(|ip| !ip.is_empty())
        });
        let private_address = first_non_empty(&entry.inner_ip_address.ip_address)
            .or_else(|| first_non_empty(&entry.vpc_attributes.private_ip_address.ip_address));
        let display_name = if entry.instance_name.is_empty() {
            entry.instance_id.clone()
        } else {
            entry.instance_name
        };

        TrackedInstance {
            id: entry.instance_id,
            display_name,
            region_id: entry.region_id,
            last_known_status: InstanceStatus::parse(&entry.status),
            public_address,
            private_address,
            spot_strategy: entry.spot_strategy,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct InstanceStatusResponse {
    instance_statuses: InstanceStatusList,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct InstanceStatusList {
    instance_status: Vec<InstanceStatusEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct InstanceStatusEntry {
    instance_id: String,
    status: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct BillResponse {
    success: bool,
    code: String,
    message: String,
    data: BillData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct BillData {
    total_count: u32,
    items: BillItems,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct BillItems {
    item: Vec<BillItemEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct BillItemEntry {
    #[serde(rename = "InstanceID")]
    instance_id: String,
    billing_item: String,
    pretax_amount: f64,
    currency: String,
    service_period: String,
    service_period_unit: String,
    instance_spec: String,
    product_code: String,
    product_detail: String,
}

impl From<BillItemEntry> for RawBillItem {
    fn from(e: BillItemEntry) -> Self {
        RawBillItem {
            instance_id: e.instance_id,
            item_name: e.billing_item,
            pretax_amount: e.pretax_amount,
            currency: e.currency,
            service_period: e.service_period,
            service_period_unit: e.service_period_unit,
            instance_spec: e.instance_spec,
            product_code: e.product_code,
            product_detail: e.product_detail,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct TrafficResponse {
    traffic_details: Vec<TrafficDetail>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct TrafficDetail {
    business_region_id: String,
    traffic: i64,
    product_traffic_details: Vec<ProductTrafficDetail>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct ProductTrafficDetail {
    product: String,
    traffic: i64,
}

fn clamp_bytes(raw: i64) -> u64 {
    u64::try_from(raw).unwrap_or(0)
}

impl From<TrafficDetail> for RegionTraffic {
    fn from(d: TrafficDetail) -> Self {
        RegionTraffic {
            region_id: d.business_region_id,
            bytes: clamp_bytes(d.traffic),
            products: d
                .product_traffic_details
                .into_iter()
                .map(|p| ProductTraffic {
                    product: p.product,
                    bytes: clamp_bytes(p.traffic),
                })
                .collect(),
        }
    }
}

// ─── Client ───────────────────────────────────────────────────────────────────

/// Signed HTTPS client for the Aliyun RPC-style OpenAPI.
#[derive(Debug, Clone)]
pub struct AliyunClient {
    credentials: Credentials,
    client: reqwest::Client,
}

impl AliyunClient {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            client: build_client(),
        }
    }

    /// Issue one signed call and decode the JSON body.
    async fn call<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        version: &str,
        action: &str,
        params: BTreeMap<String, String>,
    ) -> Result<T> {
        let nonce = uuid::Uuid::new_v4().to_string();
        let signed = sign_request(
            &self.credentials,
            endpoint,
            action,
            version,
            &params,
            Utc::now(),
            &nonce,
        )?;

        let url = if signed.query.is_empty() {
            format!("https://{}/", signed.host)
        } else {
            format!("https://{}/?{}", signed.host, signed.query)
        };

        let mut req = self.client.post(&url);
        for (name, value) in &signed.headers {
            req = req.header(*name, value);
        }

        debug!(endpoint, action, "calling provider API");
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;

        if !status.is_success() {
            return Err(match serde_json::from_slice::<ApiErrorBody>(&body) {
                Ok(err) => ProviderError::Api {
                    action: action.to_string(),
                    code: err.code,
                    message: err.message,
                    request_id: err.request_id,
                },
                Err(_) => ProviderError::Api {
                    action: action.to_string(),
                    code: status.as_u16().to_string(),
                    message: String::from_utf8_lossy(&body).into_owned(),
                    request_id: None,
                },
            });
        }

        serde_json::from_slice(&body).map_err(|e| ProviderError::Decode {
            action: action.to_string(),
            reason: e.to_string(),
        })
    }
}

fn params(pairs: &[(&str, String)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn instance_ids_param(instance_id: &str) -> String {
    serde_json::json!([instance_id]).to_string()
}

#[async_trait]
impl ComputeApi for AliyunClient {
    async fn list_regions(&self) -> Result<Vec<String>> {
        let resp: RegionsResponse = self
            .call(ECS_GLOBAL_ENDPOINT, ECS_VERSION, "DescribeRegions", BTreeMap::new())
            .await?;
        let regions: Vec<String> = resp
            .regions
            .region
            .into_iter()
            .map(|r| r.region_id)
            .filter(|r| !r.is_empty())
            .collect();
        info!(count = regions.len(), "listed regions");
        Ok(regions)
    }

    async fn list_instances(
        &self,
        region_id: &str,
        charge_type: ChargeType,
    ) -> Result<Vec<TrackedInstance>> {
        let endpoint = ecs_endpoint(region_id);
        let mut all = Vec::new();
        let mut page = 1u32;

        loop {
            let resp: InstancesResponse = self
                .call(
                    &endpoint,
                    ECS_VERSION,
                    "DescribeInstances",
                    params(&[
                        ("RegionId", region_id.to_string()),
                        ("InstanceChargeType", charge_type.as_str().to_string()),
                        ("PageNumber", page.to_string()),
                        ("PageSize", INSTANCE_PAGE_SIZE.to_string()),
                    ]),
                )
                .await?;

            let got = resp.instances.instance.len();
            all.extend(resp.instances.instance.into_iter().map(TrackedInstance::from));

            if got < INSTANCE_PAGE_SIZE as usize || all.len() >= resp.total_count as usize {
                break;
            }
            page += 1;
        }

        debug!(region = region_id, count = all.len(), "listed instances");
        Ok(all)
    }

    async fn instance_status(&self, region_id: &str, instance_id: &str) -> Result<InstanceStatus> {
        let resp: InstanceStatusResponse = self
            .call(
                &ecs_endpoint(region_id),
                ECS_VERSION,
                "DescribeInstanceStatus",
                params(&[
                    ("RegionId", region_id.to_string()),
                    ("InstanceId.1", instance_id.to_string()),
                ]),
            )
            .await?;

        resp.instance_statuses
            .instance_status
            .into_iter()
            .find(|s| s.instance_id == instance_id)
            .map(|s| InstanceStatus::parse(&s.status))
            .ok_or_else(|| ProviderError::NotFound(instance_id.to_string()))
    }

    async fn start_instance(&self, region_id: &str, instance_id: &str) -> Result<StartOutcome> {
        let result: Result<serde_json::Value> = self
            .call(
                &ecs_endpoint(region_id),
                ECS_VERSION,
                "StartInstance",
                params(&[("InstanceId", instance_id.to_string())]),
            )
            .await;

        match result {
            Ok(_) => Ok(StartOutcome::Accepted),
            Err(e) if e.code().is_some_and(|c| c.starts_with(INCORRECT_STATUS_CODE)) => {
                debug!(instance = instance_id, error = %e, "start rejected, instance not stopped");
                Ok(StartOutcome::AlreadyNotStopped)
            }
            Err(e) => Err(e),
        }
    }

    async fn describe_instance(
        &self,
        region_id: &str,
        instance_id: &str,
    ) -> Result<TrackedInstance> {
        let resp: InstancesResponse = self
            .call(
                &ecs_endpoint(region_id),
                ECS_VERSION,
                "DescribeInstances",
                params(&[
                    ("RegionId", region_id.to_string()),
                    ("InstanceIds", instance_ids_param(instance_id)),
                ]),
            )
            .await?;

        resp.instances
            .instance
            .into_iter()
            .map(TrackedInstance::from)
            .find(|i| i.id == instance_id)
            .ok_or_else(|| ProviderError::NotFound(instance_id.to_string()))
    }
}

#[async_trait]
impl BillingApi for AliyunClient {
    async fn query_instance_bill(&self, cycle: &str, product_code: &str) -> Result<Vec<RawBillItem>> {
        let mut all = Vec::new();
        let mut page = 1u32;

        loop {
            let resp: BillResponse = self
                .call(
                    BSS_ENDPOINT,
                    BSS_VERSION,
                    "QueryInstanceBill",
                    params(&[
                        ("BillingCycle", cycle.to_string()),
                        ("ProductCode", product_code.to_string()),
                        ("IsBillingItem", "true".to_string()),
                        ("PageNum", page.to_string()),
                        ("PageSize", BILL_PAGE_SIZE.to_string()),
                    ]),
                )
                .await?;

            if !resp.success {
                return Err(ProviderError::api("QueryInstanceBill", &resp.code, &resp.message));
            }

            let got = resp.data.items.item.len();
            all.extend(resp.data.items.item.into_iter().map(RawBillItem::from));

            if got == 0 || all.len() >= resp.data.total_count as usize {
                break;
            }
            page += 1;
        }

        info!(cycle, count = all.len(), "queried bill items");
        Ok(all)
    }
}

#[async_trait]
impl TrafficApi for AliyunClient {
    async fn query_internet_traffic(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RegionTraffic>> {
        let resp: TrafficResponse = self
            .call(
                CDT_ENDPOINT,
                CDT_VERSION,
                "ListCdtInternetTraffic",
                params(&[
                    ("StartTime", start.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
                    ("EndTime", end.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
                ]),
            )
            .await?;

        let regions: Vec<RegionTraffic> = resp
            .traffic_details
            .into_iter()
            .map(RegionTraffic::from)
            .collect();
        info!(regions = regions.len(), "queried internet traffic");
        Ok(regions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_prefers_public_ip_then_eip() {
        let json = r#"{
            "InstanceId": "i-1", "InstanceName": "web", "RegionId": "cn-hongkong",
            "Status": "Stopped", "SpotStrategy": "SpotAsPriceGo",
            "PublicIpAddress": {"IpAddress": []},
            "EipAddress": {"IpAddress": "8.8.4.4"},
            "InnerIpAddress": {"IpAddress": []},
            "VpcAttributes": {"PrivateIpAddress": {"IpAddress": ["172.16.0.5"]}}
        }"#;
        let entry: InstanceEntry = serde_json::from_str(json).expect("decode");
        let inst = TrackedInstance::from(entry);
        assert_eq!(inst.public_address.as_deref(), Some("8.8.4.4"));
        assert_eq!(inst.private_address.as_deref(), Some("172.16.0.5"));
        assert_eq!(inst.last_known_status, InstanceStatus::Stopped);
        assert_eq!(inst.display_name, "web");
    }

    #[test]
    fn test_instance_without_addresses() {
        let json = r#"{"InstanceId": "i-2", "Status": "Running", "SpotStrategy": "NoSpot"}"#;
        let entry: InstanceEntry = serde_json::from_str(json).expect("decode");
        let inst = TrackedInstance::from(entry);
        assert!(inst.public_address.is_none());
        assert!(inst.private_address.is_none());
        assert_eq!(inst.display_name, "i-2");
    }

    #[test]
    fn test_bill_response_decodes_instance_id_field() {
        let json = r#"{"Success": true, "Data": {"TotalCount": 1, "Items": {"Item": [
            {"InstanceID": "i-1", "BillingItem": "系统盘", "PretaxAmount": 0.12,
             "Currency": "CNY", "ServicePeriod": "3600", "ServicePeriodUnit": "秒"}
        ]}}}"#;
        let resp: BillResponse = serde_json::from_str(json).expect("decode");
        let items: Vec<RawBillItem> = resp.data.items.item.into_iter().map(RawBillItem::from).collect();
        assert_eq!(items[0].instance_id, "i-1");
        assert_eq!(items[0].item_name, "系统盘");
        assert_eq!(items[0].service_period_unit, "秒");
    }

    #[test]
    fn test_negative_traffic_is_clamped() {
        let json = r#"{"TrafficDetails": [{"BusinessRegionId": "cn-hongkong", "Traffic": -5,
            "ProductTrafficDetails": [{"Product": "eip", "Traffic": 42}]}]}"#;
        let resp: TrafficResponse = serde_json::from_str(json).expect("decode");
        let region = RegionTraffic::from(resp.traffic_details.into_iter().next().expect("one"));
        assert_eq!(region.bytes, 0);
        assert_eq!(region.products[0].bytes, 42);
    }

    #[test]
    fn test_instance_ids_param_is_json_array() {
        assert_eq!(instance_ids_param("i-abc"), r#"["i-abc"]"#);
    }
}
