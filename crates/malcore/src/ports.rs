//! Client ports for the side-effecting systems an execution talks to.
//!
//! Implementations live outside this workspace; the engine only sees these
//! traits. Retry policy, if any, belongs in the implementations.

use crate::error::ClientError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignDraft {
    pub name: String,
    pub subject: String,
    pub body: String,
    pub from_email: String,
    pub to_segment_id: Option<String>,
    pub to_contact_ids: Option<Vec<String>>,
}

#[async_trait]
pub trait EmailCampaignClient: Send + Sync {
    /// Returns the new campaign id.
    async fn create_campaign(&self, draft: CampaignDraft) -> Result<String, ClientError>;

    async fn schedule_campaign(&self, campaign_id: &str, send_at: DateTime<Utc>) -> Result<(), ClientError>;

    async fn send_campaign(&self, campaign_id: &str) -> Result<(), ClientError>;
}

#[async_trait]
pub trait SegmentClient: Send + Sync {
    async fn add_contact_to_segment(&self, contact_id: &str, segment_id: &str) -> Result<(), ClientError>;

    async fn remove_contact_from_segment(&self, contact_id: &str, segment_id: &str) -> Result<(), ClientError>;

    async fn list_segment_contacts(&self, segment_id: &str) -> Result<Vec<String>, ClientError>;

    async fn tag_contact(&self, contact_id: &str, tag: &str) -> Result<(), ClientError>;
}

/// Snapshot of a campaign's numbers and lifecycle status
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignMetrics {
    pub campaign_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub metrics: HashMap<String, f64>,
}

impl CampaignMetrics {
    pub fn new(campaign_id: impl Into<String>) -> Self {
        Self {
            campaign_id: campaign_id.into(),
            ..Default::default()
        }
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}

#[async_trait]
pub trait MetricsClient: Send + Sync {
    async fn get_campaign_metrics(&self, campaign_id: &str) -> Result<CampaignMetrics, ClientError>;

    async fn update_campaign_status(&self, campaign_id: &str, status: &str) -> Result<(), ClientError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub release_id: String,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait TaskClient: Send + Sync {
    /// Returns the new task id.
    async fn create_task(&self, task: TaskDraft) -> Result<String, ClientError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeRecord {
    pub campaign_id: Option<String>,
    pub contact_id: Option<String>,
    pub outcome: String,
    pub metadata: serde_json::Value,
}

#[async_trait]
pub trait OutcomeLogClient: Send + Sync {
    async fn log_success_pattern(&self, record: OutcomeRecord) -> Result<(), ClientError>;

    async fn log_attempt(&self, record: OutcomeRecord) -> Result<(), ClientError>;
}
