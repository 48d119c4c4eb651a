use async_trait::async_trait;
use chrono::{DateTime, Utc};
use malcore::ports::{
    CampaignDraft, CampaignMetrics, EmailCampaignClient, MetricsClient, OutcomeLogClient, OutcomeRecord,
    SegmentClient, TaskClient, TaskDraft,
};
use malcore::{ClientError, ExecutionClients};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// One call made through a client port.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCall {
    CreateCampaign(CampaignDraft),
    ScheduleCampaign { campaign_id: String, send_at: DateTime<Utc> },
    SendCampaign(String),
    AddToSegment { contact_id: String, segment_id: String },
    RemoveFromSegment { contact_id: String, segment_id: String },
    ListSegment(String),
    TagContact { contact_id: String, tag: String },
    GetMetrics(String),
    UpdateCampaignStatus { campaign_id: String, status: String },
    CreateTask(TaskDraft),
    LogSuccess(OutcomeRecord),
    LogAttempt(OutcomeRecord),
}

impl ClientCall {
    /// Port method name, as used by `MockBackend::fail_on`.
    pub fn operation(&self) -> &'static str {
        match self {
            ClientCall::CreateCampaign(_) => "create_campaign",
            ClientCall::ScheduleCampaign { .. } => "schedule_campaign",
            ClientCall::SendCampaign(_) => "send_campaign",
            ClientCall::AddToSegment { .. } => "add_contact_to_segment",
            ClientCall::RemoveFromSegment { .. } => "remove_contact_from_segment",
            ClientCall::ListSegment(_) => "list_segment_contacts",
            ClientCall::TagContact { .. } => "tag_contact",
            ClientCall::GetMetrics(_) => "get_campaign_metrics",
            ClientCall::UpdateCampaignStatus { .. } => "update_campaign_status",
            ClientCall::CreateTask(_) => "create_task",
            ClientCall::LogSuccess(_) => "log_success_pattern",
            ClientCall::LogAttempt(_) => "log_attempt",
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self, ClientCall::ListSegment(_) | ClientCall::GetMetrics(_))
    }
}

/// In-memory stand-in for every client port.
///
/// Records each call, serves canned metrics and segment membership, and
/// fails selected operations on request.
#[derive(Default)]
pub struct MockBackend {
    calls: Mutex<Vec<ClientCall>>,
    metrics: Mutex<HashMap<String, CampaignMetrics>>,
    segments: Mutex<HashMap<String, Vec<String>>>,
    failing: Mutex<HashSet<String>>,
    next_id: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serve `metrics` for its campaign id.
    pub fn set_metrics(&self, metrics: CampaignMetrics) {
        lock(&self.metrics).insert(metrics.campaign_id.clone(), metrics);
    }

    pub fn set_segment<I, S>(&self, segment_id: &str, contacts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock(&self.segments).insert(segment_id.to_string(), contacts.into_iter().map(Into::into).collect());
    }

    /// Make every later call to `operation` fail with a request error.
    pub fn fail_on(&self, operation: &str) {
        lock(&self.failing).insert(operation.to_string());
    }

    pub fn calls(&self) -> Vec<ClientCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Calls that changed something on the far side.
    pub fn write_count(&self) -> usize {
        lock(&self.calls).iter().filter(|c| !c.is_read()).count()
    }

    pub fn calls_to(&self, operation: &str) -> Vec<ClientCall> {
        lock(&self.calls)
            .iter()
            .filter(|c| c.operation() == operation)
            .cloned()
            .collect()
    }

    /// Tags applied to `contact_id`, in call order.
    pub fn tags_for(&self, contact_id: &str) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                ClientCall::TagContact { contact_id: id, tag } if id == contact_id => Some(tag.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn segment_members(&self, segment_id: &str) -> Vec<String> {
        lock(&self.segments).get(segment_id).cloned().unwrap_or_default()
    }

    /// A client set where every port is this backend.
    pub fn clients(self: &Arc<Self>) -> ExecutionClients {
        ExecutionClients {
            email: self.clone(),
            segments: self.clone(),
            metrics: self.clone(),
            tasks: self.clone(),
            outcomes: self.clone(),
        }
    }

    fn record(&self, call: ClientCall) -> Result<(), ClientError> {
        let operation = call.operation();
        lock(&self.calls).push(call);
        if lock(&self.failing).contains(operation) {
            return Err(ClientError::Request(format!("{} unavailable", operation)));
        }
        Ok(())
    }

    fn new_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl EmailCampaignClient for MockBackend {
    async fn create_campaign(&self, draft: CampaignDraft) -> Result<String, ClientError> {
        self.record(ClientCall::CreateCampaign(draft))?;
        Ok(self.new_id("campaign"))
    }

    async fn schedule_campaign(&self, campaign_id: &str, send_at: DateTime<Utc>) -> Result<(), ClientError> {
        self.record(ClientCall::ScheduleCampaign {
            campaign_id: campaign_id.to_string(),
            send_at,
        })
    }

    async fn send_campaign(&self, campaign_id: &str) -> Result<(), ClientError> {
        self.record(ClientCall::SendCampaign(campaign_id.to_string()))
    }
}

#[async_trait]
impl SegmentClient for MockBackend {
    async fn add_contact_to_segment(&self, contact_id: &str, segment_id: &str) -> Result<(), ClientError> {
        self.record(ClientCall::AddToSegment {
            contact_id: contact_id.to_string(),
            segment_id: segment_id.to_string(),
        })?;
        let mut segments = lock(&self.segments);
        let members = segments.entry(segment_id.to_string()).or_default();
        if !members.iter().any(|m| m == contact_id) {
            members.push(contact_id.to_string());
        }
        Ok(())
    }

    async fn remove_contact_from_segment(&self, contact_id: &str, segment_id: &str) -> Result<(), ClientError> {
        self.record(ClientCall::RemoveFromSegment {
            contact_id: contact_id.to_string(),
            segment_id: segment_id.to_string(),
        })?;
        if let Some(members) = lock(&self.segments).get_mut(segment_id) {
            members.retain(|m| m != contact_id);
        }
        Ok(())
    }

    async fn list_segment_contacts(&self, segment_id: &str) -> Result<Vec<String>, ClientError> {
        self.record(ClientCall::ListSegment(segment_id.to_string()))?;
        Ok(self.segment_members(segment_id))
    }

    async fn tag_contact(&self, contact_id: &str, tag: &str) -> Result<(), ClientError> {
        self.record(ClientCall::TagContact {
            contact_id: contact_id.to_string(),
            tag: tag.to_string(),
        })
    }
}

#[async_trait]
impl MetricsClient for MockBackend {
    async fn get_campaign_metrics(&self, campaign_id: &str) -> Result<CampaignMetrics, ClientError> {
        self.record(ClientCall::GetMetrics(campaign_id.to_string()))?;
        lock(&self.metrics)
            .get(campaign_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("campaign {}", campaign_id)))
    }

    async fn update_campaign_status(&self, campaign_id: &str, status: &str) -> Result<(), ClientError> {
        self.record(ClientCall::UpdateCampaignStatus {
            campaign_id: campaign_id.to_string(),
            status: status.to_string(),
        })?;
        lock(&self.metrics)
            .entry(campaign_id.to_string())
            .or_insert_with(|| CampaignMetrics::new(campaign_id))
            .status = Some(status.to_string());
        Ok(())
    }
}

#[async_trait]
impl TaskClient for MockBackend {
    async fn create_task(&self, task: TaskDraft) -> Result<String, ClientError> {
        self.record(ClientCall::CreateTask(task))?;
        Ok(self.new_id("task"))
    }
}

#[async_trait]
impl OutcomeLogClient for MockBackend {
    async fn log_success_pattern(&self, record: OutcomeRecord) -> Result<(), ClientError> {
        self.record(ClientCall::LogSuccess(record))
    }

    async fn log_attempt(&self, record: OutcomeRecord) -> Result<(), ClientError> {
        self.record(ClientCall::LogAttempt(record))
    }
}
