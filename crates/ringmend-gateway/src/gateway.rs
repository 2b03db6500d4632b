//! Channel-backed [`ClusterApi`].

use std::sync::Arc;

use ringmend_channel::{Channel, Request};
use ringmend_core::RepairStatus;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::api::{ApiFuture, ClusterApi};
use crate::error::{GatewayError, GatewayResult};
use crate::paths;
use crate::wire::{EndpointState, RepairRequest, RingEntry, SimpleState, TableEntry};

#[derive(Clone)]
pub struct Gateway {
    channel: Arc<Channel>,
}

impl Gateway {
    pub fn new(channel: Arc<Channel>) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    async fn get_json<T: DeserializeOwned>(&self, request: Request) -> GatewayResult<T> {
        let response = self.channel.send(&request).await?;
        Ok(response.json()?)
    }

    async fn get_text(&self, request: Request) -> GatewayResult<String> {
        let response = self.channel.send(&request).await?;
        Ok(response.text()?)
    }

    async fn fetch_detailed(&self) -> GatewayResult<Vec<EndpointState>> {
        let states: Vec<EndpointState> = self.get_json(Request::get(paths::ENDPOINTS_DETAILED)).await?;
        self.channel
            .set_known_endpoints(states.iter().map(|s| s.addrs.clone()))
            .await;
        Ok(states)
    }

    async fn fetch_simple(&self) -> GatewayResult<Vec<SimpleState>> {
        let states: Vec<SimpleState> = self.get_json(Request::get(paths::ENDPOINTS_SIMPLE)).await?;
        self.channel
            .set_known_endpoints(states.iter().map(|s| s.key.clone()))
            .await;
        Ok(states)
    }

    async fn start_repair(&self, request: &RepairRequest) -> GatewayResult<String> {
        let call = Request::post(paths::repair_async(&request.keyspace))
            .param("keyspace", &request.keyspace)
            .param("primaryRange", "true")
            .param("parallelism", 0)
            .param("jobThreads", 1)
            .param("startToken", &request.range.start)
            .param("endToken", &request.range.end)
            .param_opt("columnFamilies", request.table.as_deref())
            .param_opt("dataCenters", request.datacenter.as_deref())
            .param("trace", "true")
            .target(request.endpoint.clone());

        let raw = self.get_text(call).await?;
        let job_id = raw.trim().trim_matches('"').trim().to_string();
        if job_id.is_empty() {
            return Err(GatewayError::Payload {
                operation: "repair_start",
                message: format!("empty job id from {}", request.endpoint),
            });
        }

        debug!(
            endpoint = %request.endpoint,
            keyspace = %request.keyspace,
            table = request.table.as_deref().unwrap_or("*"),
            %job_id,
            "repair job accepted"
        );
        Ok(job_id)
    }

    async fn fetch_status(
        &self,
        endpoint: &str,
        keyspace: &str,
        job_id: &str,
    ) -> GatewayResult<RepairStatus> {
        let call = Request::get(paths::repair_async(keyspace))
            .param("id", job_id)
            .target(endpoint);
        let raw = self.get_text(call).await?;
        Ok(RepairStatus::parse(&raw))
    }

    async fn fetch_active(&self, endpoint: &str) -> GatewayResult<Vec<String>> {
        let ids: Vec<serde_json::Value> = self
            .get_json(Request::get(paths::ACTIVE_REPAIR).target(endpoint))
            .await?;
        Ok(ids.into_iter().map(job_id_string).collect())
    }
}

/// Job ids arrive as numbers on current releases and strings on older ones.
fn job_id_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

impl ClusterApi for Gateway {
    fn cluster_name(&self) -> ApiFuture<'_, String> {
        Box::pin(self.get_json(Request::get(paths::CLUSTER_NAME)))
    }

    fn endpoints_live(&self) -> ApiFuture<'_, Vec<String>> {
        Box::pin(self.get_json(Request::get(paths::ENDPOINTS_LIVE)))
    }

    fn endpoints_down(&self) -> ApiFuture<'_, Vec<String>> {
        Box::pin(self.get_json(Request::get(paths::ENDPOINTS_DOWN)))
    }

    fn endpoints_detailed(&self) -> ApiFuture<'_, Vec<EndpointState>> {
        Box::pin(self.fetch_detailed())
    }

    fn endpoints_simple(&self) -> ApiFuture<'_, Vec<SimpleState>> {
        Box::pin(self.fetch_simple())
    }

    fn tokens<'a>(&'a self, endpoint: &'a str) -> ApiFuture<'a, Vec<String>> {
        Box::pin(self.get_json(Request::get(paths::tokens(endpoint))))
    }

    fn datacenter<'a>(&'a self, endpoint: &'a str) -> ApiFuture<'a, String> {
        Box::pin(self.get_json(Request::get(paths::DATACENTER).param("host", endpoint)))
    }

    fn describe_ring<'a>(&'a self, keyspace: &'a str) -> ApiFuture<'a, Vec<RingEntry>> {
        Box::pin(self.get_json(Request::get(paths::describe_ring(keyspace))))
    }

    fn tables(&self) -> ApiFuture<'_, Vec<TableEntry>> {
        Box::pin(self.get_json(Request::get(paths::COLUMN_FAMILY)))
    }

    fn repair_start<'a>(&'a self, request: &'a RepairRequest) -> ApiFuture<'a, String> {
        Box::pin(self.start_repair(request))
    }

    fn repair_status<'a>(
        &'a self,
        endpoint: &'a str,
        keyspace: &'a str,
        job_id: &'a str,
    ) -> ApiFuture<'a, RepairStatus> {
        Box::pin(self.fetch_status(endpoint, keyspace, job_id))
    }

    fn active_repair<'a>(&'a self, endpoint: &'a str) -> ApiFuture<'a, Vec<String>> {
        Box::pin(self.fetch_active(endpoint))
    }
}
