use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

pub const MAILERLITE_API_BASE: &str = "https://connect.mailerlite.com/api";

#[derive(Debug, Error)]
pub enum DependencyError {
    #[error("Mailing list request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Mailing list returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Mailing list call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid mailing list URL: {0}")]
    Url(String),
}

/// Third-party mailing list holding one contact per author email.
#[async_trait]
pub trait MailingList: Send + Sync {
    async fn add_to_group(&self, email: &str, group_id: &str) -> Result<(), DependencyError>;

    async fn remove_from_group(&self, email: &str, group_id: &str) -> Result<(), DependencyError>;

    /// Audience size recorded for the contact. 0 when unknown.
    async fn subscriber_count(&self, email: &str) -> Result<u64, DependencyError>;
}

/// MailerLite API client
pub struct MailerLiteClient {
    api_key: String,
    base_url: Url,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SubscriberEnvelope {
    data: Subscriber,
}

#[derive(Debug, Deserialize)]
struct Subscriber {
    id: String,
    #[serde(default)]
    fields: serde_json::Map<String, Value>,
}

impl MailerLiteClient {
    pub fn new(api_key: String, timeout: Duration) -> anyhow::Result<Self> {
        Self::with_base_url(api_key, MAILERLITE_API_BASE, timeout)
    }

    pub fn with_base_url(api_key: String, base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        let base_url = Url::parse(base_url).context("Invalid MailerLite base URL")?;

        Ok(Self {
            api_key,
            base_url,
            client,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, DependencyError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| DependencyError::Url(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// `None` when the contact does not exist.
    async fn find_subscriber(&self, email: &str) -> Result<Option<Subscriber>, DependencyError> {
        let response = self
            .client
            .get(self.endpoint(&["subscribers", email])?)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response).await?;
        let envelope: SubscriberEnvelope = response.json().await?;
        Ok(Some(envelope.data))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, DependencyError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(DependencyError::Status { status, body })
}

/// Custom fields come back as strings or numbers depending on how they were set.
fn audience_field(fields: &serde_json::Map<String, Value>) -> u64 {
    match fields.get("audience_size") {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

#[async_trait]
impl MailingList for MailerLiteClient {
    async fn add_to_group(&self, email: &str, group_id: &str) -> Result<(), DependencyError> {
        // Upsert: adds the group without touching the contact's other groups
        let response = self
            .client
            .post(self.endpoint(&["subscribers"])?)
            .bearer_auth(&self.api_key)
            .json(&json!({ "email": email, "groups": [group_id] }))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn remove_from_group(&self, email: &str, group_id: &str) -> Result<(), DependencyError> {
        let Some(subscriber) = self.find_subscriber(email).await? else {
            return Ok(());
        };
        let response = self
            .client
            .delete(self.endpoint(&["subscribers", &subscriber.id, "groups", group_id])?)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(response).await?;
        Ok(())
    }

    async fn subscriber_count(&self, email: &str) -> Result<u64, DependencyError> {
        Ok(self
            .find_subscriber(email)
            .await?
            .map_or(0, |s| audience_field(&s.fields)))
    }
}

/// No-op mailing list for testing or when no API key is configured
pub struct NoopMailingList;

#[async_trait]
impl MailingList for NoopMailingList {
    async fn add_to_group(&self, email: &str, group_id: &str) -> Result<(), DependencyError> {
        debug!("NoopMailingList: add {} to {} skipped", email, group_id);
        Ok(())
    }

    async fn remove_from_group(&self, email: &str, group_id: &str) -> Result<(), DependencyError> {
        debug!("NoopMailingList: remove {} from {} skipped", email, group_id);
        Ok(())
    }

    async fn subscriber_count(&self, _email: &str) -> Result<u64, DependencyError> {
        Ok(0)
    }
}

/// Contact groups mirroring where an author's requests stand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactGroup {
    Pending,
    Approved,
    Rejected,
}

/// Group ids by role. An unset id skips that half of a move.
#[derive(Debug, Clone, Default)]
pub struct MailingGroups {
    pub pending: Option<String>,
    pub approved: Option<String>,
    pub rejected: Option<String>,
}

impl MailingGroups {
    pub fn id(&self, group: ContactGroup) -> Option<&str> {
        match group {
            ContactGroup::Pending => self.pending.as_deref(),
            ContactGroup::Approved => self.approved.as_deref(),
            ContactGroup::Rejected => self.rejected.as_deref(),
        }
    }
}

/// One queued move. `done` fires once both halves have run.
struct ContactMove {
    email: String,
    from_id: Option<String>,
    to: ContactGroup,
    to_id: Option<String>,
    done: oneshot::Sender<()>,
}

/// Best-effort wrapper around a [`MailingList`]. Every call is bounded by
/// `timeout`; failures are logged and never reach the caller.
#[derive(Clone)]
pub struct MailingListGateway {
    list: Arc<dyn MailingList>,
    groups: MailingGroups,
    timeout: Duration,
    moves: mpsc::UnboundedSender<ContactMove>,
}

impl MailingListGateway {
    /// Spawns the worker that applies moves one at a time in queue order.
    /// Must be called inside a Tokio runtime.
    pub fn new(list: Arc<dyn MailingList>, groups: MailingGroups, timeout: Duration) -> Self {
        let (moves, queue) = mpsc::unbounded_channel();
        tokio::spawn(run_moves(list.clone(), timeout, queue));
        Self {
            list,
            groups,
            timeout,
            moves,
        }
    }

    pub fn noop() -> Self {
        Self::new(Arc::new(NoopMailingList), MailingGroups::default(), Duration::from_secs(5))
    }

    /// Queue a move between groups. Moves run in the order they were queued,
    /// so a reject followed by a restore never lands reversed. The returned
    /// receiver resolves once the move has run; callers drop it.
    pub fn move_contact(&self, email: &str, from: Option<ContactGroup>, to: ContactGroup) -> oneshot::Receiver<()> {
        let (done, finished) = oneshot::channel();
        let job = ContactMove {
            email: email.to_string(),
            from_id: from.and_then(|g| self.groups.id(g)).map(str::to_string),
            to,
            to_id: self.groups.id(to).map(str::to_string),
            done,
        };
        if let Err(mpsc::error::SendError(job)) = self.moves.send(job) {
            warn!("Mailing list worker stopped, dropping move of {} to {:?}", job.email, job.to);
        }
        finished
    }

    /// Degrades to 0 on any failure.
    pub async fn subscriber_count(&self, email: &str) -> u64 {
        match bounded(self.timeout, self.list.subscriber_count(email)).await {
            Ok(count) => count,
            Err(e) => {
                warn!("Failed to fetch audience size for {}: {}", email, e);
                0
            }
        }
    }
}

async fn run_moves(list: Arc<dyn MailingList>, timeout: Duration, mut queue: mpsc::UnboundedReceiver<ContactMove>) {
    while let Some(job) = queue.recv().await {
        if let Some(group_id) = &job.from_id {
            if let Err(e) = bounded(timeout, list.remove_from_group(&job.email, group_id)).await {
                warn!("Failed to remove {} from mailing group {}: {}", job.email, group_id, e);
            }
        }
        if let Some(group_id) = &job.to_id {
            match bounded(timeout, list.add_to_group(&job.email, group_id)).await {
                Ok(()) => info!("Moved {} to mailing group {:?}", job.email, job.to),
                Err(e) => warn!("Failed to add {} to mailing group {}: {}", job.email, group_id, e),
            }
        }
        let _ = job.done.send(());
    }
    debug!("Mailing list worker stopped");
}

async fn bounded<T>(
    timeout: Duration,
    call: impl Future<Output = Result<T, DependencyError>>,
) -> Result<T, DependencyError> {
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| DependencyError::Timeout(timeout))?
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Records every call as `"add:<email>:<group>"`, `"remove:..."`.
    pub struct RecordingList {
        calls: mpsc::UnboundedSender<String>,
        pub audience: u64,
        pub fail: bool,
        pub delay: Option<Duration>,
    }

    impl RecordingList {
        pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
            let (calls, rx) = mpsc::unbounded_channel();
            (
                Self {
                    calls,
                    audience: 0,
                    fail: false,
                    delay: None,
                },
                rx,
            )
        }

        async fn record(&self, call: String) -> Result<(), DependencyError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let _ = self.calls.send(call);
            if self.fail {
                return Err(DependencyError::Url("unreachable".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl MailingList for RecordingList {
        async fn add_to_group(&self, email: &str, group_id: &str) -> Result<(), DependencyError> {
            self.record(format!("add:{email}:{group_id}")).await
        }

        async fn remove_from_group(&self, email: &str, group_id: &str) -> Result<(), DependencyError> {
            self.record(format!("remove:{email}:{group_id}")).await
        }

        async fn subscriber_count(&self, email: &str) -> Result<u64, DependencyError> {
            self.record(format!("count:{email}")).await?;
            Ok(self.audience)
        }
    }

    pub fn groups() -> MailingGroups {
        MailingGroups {
            pending: Some("g-pending".into()),
            approved: Some("g-approved".into()),
            rejected: Some("g-rejected".into()),
        }
    }

    /// Next recorded call, waiting briefly for background moves.
    pub async fn next_call(rx: &mut mpsc::UnboundedReceiver<String>) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.ok().flatten()
    }
}
