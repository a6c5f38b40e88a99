//! Reconciliation of a source dataset against a feature layer.
//!
//! A run walks a fixed state machine:
//!
//! 1. Resolve the credential into a token.
//! 2. Load the source records, then the remote index.
//! 3. For each source record, in order: look its name up in the index,
//!    apply the mapped update when there is a match, and classify it.
//!
//! Nothing persists between runs. Every error before or during step 3 aborts
//! the run and no partial report is returned.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use crate::auth::{Credential, CredentialProvider, DEFAULT_TOKEN_URL};
use crate::errors::ReconcileError;
use crate::feature_service::FeatureServiceClient;
use crate::mapping::FieldMapper;
use crate::models::{
    Outcome, ReconciliationPlan, ReconciliationReport, RemoteId, RemoteIndex, RunSummary,
    SourceRecord,
};
use crate::source::SourceLoader;

// ---------------------------------------------------------------------------
// Run state machine
// ---------------------------------------------------------------------------

/// States of a reconciliation run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Init,
    AuthResolved,
    Loaded,
    Reconciling,
    Done,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::AuthResolved => write!(f, "auth_resolved"),
            Self::Loaded => write!(f, "loaded"),
            Self::Reconciling => write!(f, "reconciling"),
            Self::Done => write!(f, "done"),
        }
    }
}

// ---------------------------------------------------------------------------
// Run configuration
// ---------------------------------------------------------------------------

/// Everything one run needs. Built directly or via
/// [`AppConfig::reconciliation_config`](crate::config::AppConfig::reconciliation_config).
#[derive(Debug, Clone)]
pub struct ReconciliationConfig {
    pub source_url: String,
    pub source_name_field: String,
    pub feature_service_url: String,
    pub remote_name_field: String,
    pub object_id_field: String,
    pub credential: Credential,
    pub token_url: String,
    pub timeout: Option<Duration>,
    pub strict_duplicates: bool,
}

impl ReconciliationConfig {
    /// Settings with the default field names (`name`, `pa_name`, `OBJECTID`).
    pub fn new(
        source_url: impl Into<String>,
        feature_service_url: impl Into<String>,
        credential: Credential,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            source_name_field: "name".into(),
            feature_service_url: feature_service_url.into(),
            remote_name_field: "pa_name".into(),
            object_id_field: "OBJECTID".into(),
            credential,
            token_url: DEFAULT_TOKEN_URL.into(),
            timeout: None,
            strict_duplicates: false,
        }
    }

    fn http_client(&self) -> Result<reqwest::Client, ReconcileError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("featuresync/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        builder.build().map_err(ReconcileError::Client)
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Run one reconciliation and return its report.
pub async fn reconcile(
    config: &ReconciliationConfig,
    mapper: &dyn FieldMapper,
) -> Result<ReconciliationReport, ReconcileError> {
    reconcile_with_summary(config, mapper)
        .await
        .map(|summary| summary.report)
}

/// Run one reconciliation and return the report with run metadata.
pub async fn reconcile_with_summary(
    config: &ReconciliationConfig,
    mapper: &dyn FieldMapper,
) -> Result<RunSummary, ReconcileError> {
    let run_id = Uuid::new_v4();
    let span = info_span!("reconcile", %run_id);

    async move {
        let started_at = Utc::now();
        let loaded = load(config).await?;

        transition(RunState::Reconciling);
        let report = apply_all(&loaded.client, &loaded.records, &loaded.index, mapper).await?;
        transition(RunState::Done);

        info!(
            sent = report.sent.len(),
            failures = report.failures.len(),
            errors = report.errors.len(),
            ambiguous = report.ambiguous.len(),
            "reconciliation completed"
        );

        Ok(RunSummary {
            run_id,
            auth_mode: config.credential.mode(),
            source_count: loaded.records.len(),
            index_size: loaded.index.len(),
            started_at,
            completed_at: Utc::now(),
            report,
        })
    }
    .instrument(span)
    .await
}

/// Authenticate and load both sides, then report what a run would match
/// without sending any update.
pub async fn plan(config: &ReconciliationConfig) -> Result<ReconciliationPlan, ReconcileError> {
    let loaded = load(config).await?;
    Ok(plan_matches(&loaded.records, &loaded.index))
}

/// Authenticate and fetch the remote index only.
pub async fn fetch_remote_index(
    config: &ReconciliationConfig,
) -> Result<RemoteIndex, ReconcileError> {
    let http = config.http_client()?;
    let client = connect(config, http).await?;
    Ok(client.query_index(config.strict_duplicates).await?)
}

/// Resolve the configured credential into a token.
pub async fn resolve_token(config: &ReconciliationConfig) -> Result<String, ReconcileError> {
    let provider = CredentialProvider::new(config.http_client()?, config.token_url.clone());
    Ok(provider.resolve(&config.credential).await?)
}

// ---------------------------------------------------------------------------
// Run phases
// ---------------------------------------------------------------------------

struct Loaded {
    client: FeatureServiceClient,
    records: Vec<SourceRecord>,
    index: RemoteIndex,
}

fn transition(state: RunState) {
    debug!(state = %state, "run state");
}

/// `Init -> AuthResolved`: one token for the whole run.
async fn connect(
    config: &ReconciliationConfig,
    http: reqwest::Client,
) -> Result<FeatureServiceClient, ReconcileError> {
    transition(RunState::Init);
    let provider = CredentialProvider::new(http.clone(), config.token_url.clone());
    let token = provider.resolve(&config.credential).await?;
    transition(RunState::AuthResolved);
    info!(mode = %config.credential.mode(), "credential resolved");

    Ok(FeatureServiceClient::new(
        http,
        config.feature_service_url.clone(),
        token,
        config.remote_name_field.clone(),
        config.object_id_field.clone(),
    ))
}

/// `AuthResolved -> Loaded`: source first, then the remote index.
async fn load(config: &ReconciliationConfig) -> Result<Loaded, ReconcileError> {
    let http = config.http_client()?;
    let client = connect(config, http.clone()).await?;

    let records = SourceLoader::new(http, config.source_name_field.clone())
        .load(&config.source_url)
        .await?;
    info!(records = records.len(), "source loaded");

    let index = client.query_index(config.strict_duplicates).await?;
    transition(RunState::Loaded);

    Ok(Loaded {
        client,
        records,
        index,
    })
}

/// `Reconciling`: classify every record in source order.
async fn apply_all(
    client: &FeatureServiceClient,
    records: &[SourceRecord],
    index: &RemoteIndex,
    mapper: &dyn FieldMapper,
) -> Result<ReconciliationReport, ReconcileError> {
    let mut report = ReconciliationReport::default();

    for record in records {
        let outcome = match index.get(&record.name) {
            None => Outcome::Unmatched,
            Some(id) => apply_one(client, record, id, mapper).await?,
        };
        debug!(name = %record.name, outcome = %outcome, "classified record");
        report.record(record.name.clone(), outcome);
    }

    Ok(report)
}

/// Map and send one matched record. Every fatal per-record failure leaves
/// the loop through here.
async fn apply_one(
    client: &FeatureServiceClient,
    record: &SourceRecord,
    id: &RemoteId,
    mapper: &dyn FieldMapper,
) -> Result<Outcome, ReconcileError> {
    let attributes = mapper
        .map(record)
        .map_err(|source| ReconcileError::Mapping {
            name: record.name.clone(),
            source,
        })?;

    let result = client
        .apply_update(id, attributes)
        .await
        .map_err(|source| ReconcileError::Update {
            name: record.name.clone(),
            source,
        })?;

    if let Some(ref message) = result.message {
        info!(name = %record.name, target = %id, message = %message, "update rejected");
    }
    Ok(result.outcome())
}

fn plan_matches(records: &[SourceRecord], index: &RemoteIndex) -> ReconciliationPlan {
    let mut plan = ReconciliationPlan::default();
    for record in records {
        match index.get(&record.name) {
            Some(id) => plan.matched.push((record.name.clone(), id.clone())),
            None => plan.failures.push(record.name.clone()),
        }
    }
    plan
}
