//! HTTP Swap Backend - Adapter for Swap Submission and Status Polling
//!
//! Implements the `SwapBackend` port on top of the shared `ApiClient`.
//! Both calls go out exactly once: the monitor owns the poll cadence,
//! and a submission is never resent.
//!
//! Only an explicit `{ error }` reply or a 4xx status counts as a
//! rejection. Timeouts, resets, 5xx and undecodable replies leave the
//! submission outcome unknown.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tracing::{debug, info, instrument};

use super::client::{ApiClient, ApiStatusError};
use super::types::{JobStatusEntry, JobStatusRequest, SubmitSwapRequest, SubmitSwapResponse};
use crate::domain::job::JobId;
use crate::domain::status::JobStatusReport;
use crate::ports::backend::{SwapBackend, SwapIntent, SwapRejected};

/// Swap backend reached over HTTP.
pub struct HttpSwapBackend {
    /// Shared client with auth + rate limiting.
    client: Arc<ApiClient>,
}

impl HttpSwapBackend {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }
}

/// Turn a refused `POST /swaps` into `SwapRejected`; keep everything else as is.
fn submission_error(err: anyhow::Error) -> anyhow::Error {
    match err.downcast_ref::<ApiStatusError>() {
        Some(status) if status.status.is_client_error() => SwapRejected::new(status.to_string()).into(),
        _ => err.context("Swap submission outcome unknown"),
    }
}

#[async_trait]
impl SwapBackend for HttpSwapBackend {
    #[instrument(skip(self, intent), fields(pay = %intent.pay_token, receive = %intent.receive_token))]
    async fn submit_swap(&self, intent: &SwapIntent) -> Result<JobId> {
        let body = SubmitSwapRequest {
            pay_token: intent.pay_token.clone(),
            pay_amount: intent.pay_amount.clone(),
            receive_token: intent.receive_token.clone(),
            receive_address: intent.receive_address.clone(),
            min_receive: intent.min_receive.clone(),
            transfer: intent.evidence.clone(),
        };

        let response: SubmitSwapResponse = self
            .client
            .post_json("/swaps", &body)
            .await
            .map_err(submission_error)?;

        match (response.job_id, response.error) {
            (Some(job_id), _) => {
                info!(job_id = %job_id, "Backend accepted swap");
                Ok(job_id)
            }
            (None, Some(error)) => Err(SwapRejected::new(error).into()),
            (None, None) => bail!("Backend reply carried neither job id nor error"),
        }
    }

    async fn job_status(&self, job_ids: &[JobId]) -> Result<Vec<JobStatusReport>> {
        let entries: Vec<JobStatusEntry> = self
            .client
            .post_json("/requests", &JobStatusRequest { job_ids })
            .await
            .context("Job status request failed")?;

        if entries.len() != job_ids.len() {
            bail!(
                "Backend answered {} statuses for {} job ids",
                entries.len(),
                job_ids.len()
            );
        }
        debug!(jobs = job_ids.len(), "Job statuses fetched");
        Ok(entries.into_iter().map(JobStatusReport::from).collect())
    }
}
