use async_trait::async_trait;
use chrono::{DateTime, Utc};
use malcore::ports::{
    CampaignDraft, CampaignMetrics, EmailCampaignClient, MetricsClient, OutcomeLogClient, OutcomeRecord,
    SegmentClient, TaskClient, TaskDraft,
};
use malcore::{ClientError, ExecutionClients};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Campaign numbers and segment membership the dry run reads from.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Fixtures {
    pub campaigns: Vec<CampaignMetrics>,
    pub segments: HashMap<String, Vec<String>>,
}

/// Client ports that log writes instead of performing them.
pub struct DryRunBackend {
    metrics: Mutex<HashMap<String, CampaignMetrics>>,
    segments: Mutex<HashMap<String, Vec<String>>>,
    next_id: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl DryRunBackend {
    pub fn new(fixtures: Fixtures) -> Arc<Self> {
        let metrics = fixtures
            .campaigns
            .into_iter()
            .map(|m| (m.campaign_id.clone(), m))
            .collect();
        Arc::new(Self {
            metrics: Mutex::new(metrics),
            segments: Mutex::new(fixtures.segments),
            next_id: AtomicUsize::new(0),
        })
    }

    pub fn clients(self: &Arc<Self>) -> ExecutionClients {
        ExecutionClients {
            email: self.clone(),
            segments: self.clone(),
            metrics: self.clone(),
            tasks: self.clone(),
            outcomes: self.clone(),
        }
    }

    fn new_id(&self, prefix: &str) -> String {
        format!("dry-{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl EmailCampaignClient for DryRunBackend {
    async fn create_campaign(&self, draft: CampaignDraft) -> Result<String, ClientError> {
        let campaign_id = self.new_id("campaign");
        tracing::info!(%campaign_id, name = %draft.name, "[dry-run] create campaign");
        Ok(campaign_id)
    }

    async fn schedule_campaign(&self, campaign_id: &str, send_at: DateTime<Utc>) -> Result<(), ClientError> {
        tracing::info!(%campaign_id, %send_at, "[dry-run] schedule campaign");
        Ok(())
    }

    async fn send_campaign(&self, campaign_id: &str) -> Result<(), ClientError> {
        tracing::info!(%campaign_id, "[dry-run] send campaign");
        Ok(())
    }
}

#[async_trait]
impl SegmentClient for DryRunBackend {
    async fn add_contact_to_segment(&self, contact_id: &str, segment_id: &str) -> Result<(), ClientError> {
        tracing::info!(%contact_id, %segment_id, "[dry-run] add to segment");
        let mut segments = lock(&self.segments);
        let members = segments.entry(segment_id.to_string()).or_default();
        if !members.iter().any(|m| m == contact_id) {
            members.push(contact_id.to_string());
        }
        Ok(())
    }

    async fn remove_contact_from_segment(&self, contact_id: &str, segment_id: &str) -> Result<(), ClientError> {
        tracing::info!(%contact_id, %segment_id, "[dry-run] remove from segment");
        if let Some(members) = lock(&self.segments).get_mut(segment_id) {
            members.retain(|m| m != contact_id);
        }
        Ok(())
    }

    async fn list_segment_contacts(&self, segment_id: &str) -> Result<Vec<String>, ClientError> {
        Ok(lock(&self.segments).get(segment_id).cloned().unwrap_or_default())
    }

    async fn tag_contact(&self, contact_id: &str, tag: &str) -> Result<(), ClientError> {
        tracing::info!(%contact_id, %tag, "[dry-run] tag contact");
        Ok(())
    }
}

#[async_trait]
impl MetricsClient for DryRunBackend {
    async fn get_campaign_metrics(&self, campaign_id: &str) -> Result<CampaignMetrics, ClientError> {
        lock(&self.metrics)
            .get(campaign_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("campaign {} (add it to the fixtures file)", campaign_id)))
    }

    async fn update_campaign_status(&self, campaign_id: &str, status: &str) -> Result<(), ClientError> {
        tracing::info!(%campaign_id, %status, "[dry-run] update campaign status");
        lock(&self.metrics)
            .entry(campaign_id.to_string())
            .or_insert_with(|| CampaignMetrics::new(campaign_id))
            .status = Some(status.to_string());
        Ok(())
    }
}

#[async_trait]
impl TaskClient for DryRunBackend {
    async fn create_task(&self, task: TaskDraft) -> Result<String, ClientError> {
        let task_id = self.new_id("task");
        tracing::info!(%task_id, release_id = %task.release_id, title = %task.title, "[dry-run] create task");
        Ok(task_id)
    }
}

#[async_trait]
impl OutcomeLogClient for DryRunBackend {
    async fn log_success_pattern(&self, record: OutcomeRecord) -> Result<(), ClientError> {
        tracing::info!(outcome = %record.outcome, "[dry-run] log success pattern");
        Ok(())
    }

    async fn log_attempt(&self, record: OutcomeRecord) -> Result<(), ClientError> {
        tracing::info!(outcome = %record.outcome, "[dry-run] log attempt");
        Ok(())
    }
}
