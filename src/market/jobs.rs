//! Job lifecycle behind a single facade.
//!
//! ```text
//!                 ┌──────────── JobFacade ────────────┐
//!  create_job ──> │ JobPoster                         │
//!  browse_jobs ─> │ JobBrowser     (all / by id / search)
//!  apply_to_job > │ JobApplicator  (apply / applicants)│ ──> notify (Strategy)
//!  assign/complete│ WorkApprover   (assign / approve) │ ──> WsMessage
//!                 └───────────────────────────────────┘
//! ```
//!
//! Subsystems own only a `DbHandle`; the facade adds event broadcast and
//! notifications on top of their results.

use anyhow::Result;
use serde::Serialize;
use tokio::sync::broadcast;

use super::db::DbHandle;
use super::models::*;
use super::notify::{self, NotificationReceipt};
use super::ws::{WsMessage, broadcast_message};
use crate::errors::MarketError;

// ── Facade results ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct JobResponse {
    pub success: bool,
    pub message: String,
    pub job: Job,
}

impl JobResponse {
    fn ok(message: &str, job: Job) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            job,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobListResponse {
    pub success: bool,
    pub jobs: Vec<Job>,
}

// ── Subsystems ────────────────────────────────────────────────────────

fn require_role(user: &User, role: Role) -> Result<()> {
    if user.role != role {
        return Err(MarketError::WrongRole {
            user_id: user.id,
            expected: role.as_str().to_string(),
        }
        .into());
    }
    Ok(())
}

fn require_transition(job: &Job, next: JobStatus, action: &str) -> Result<()> {
    if !job.status.can_transition_to(next) {
        return Err(MarketError::InvalidTransition {
            action: action.to_string(),
            status: job.status.as_str().to_string(),
        }
        .into());
    }
    Ok(())
}

pub struct JobPoster {
    db: DbHandle,
}

impl JobPoster {
    pub async fn post_job(&self, new: NewJob) -> Result<Job> {
        if !(new.budget.is_finite() && new.budget > 0.0) {
            return Err(MarketError::invalid("Budget must be a positive number").into());
        }
        if new.title.trim().is_empty() || new.description.trim().is_empty() {
            return Err(MarketError::invalid("All fields are required").into());
        }
        self.db
            .call(move |db| {
                let client = db.require_user(new.client_id)?;
                require_role(&client, Role::Client)?;
                db.create_job(&new)
            })
            .await
    }
}

pub struct JobBrowser {
    db: DbHandle,
}

impl JobBrowser {
    pub async fn all_jobs(&self) -> Result<Vec<Job>> {
        self.db.call(|db| db.list_jobs(&JobCriteria::default())).await
    }

    pub async fn job_by_id(&self, job_id: i64) -> Result<Option<Job>> {
        self.db.call(move |db| db.get_job(job_id)).await
    }

    pub async fn search_jobs(&self, criteria: JobCriteria) -> Result<Vec<Job>> {
        self.db.call(move |db| db.list_jobs(&criteria)).await
    }
}

pub struct JobApplicator {
    db: DbHandle,
}

impl JobApplicator {
    pub async fn apply_to_job(&self, job_id: i64, freelancer_id: i64) -> Result<Job> {
        self.db
            .call(move |db| {
                let job = db.require_job(job_id)?;
                let freelancer = db.require_user(freelancer_id)?;
                require_role(&freelancer, Role::Freelancer)?;
                if job.has_applicant(freelancer_id) {
                    return Err(MarketError::AlreadyApplied {
                        job_id,
                        freelancer_id,
                    }
                    .into());
                }
                if job.status != JobStatus::Open {
                    return Err(MarketError::InvalidTransition {
                        action: "apply to".to_string(),
                        status: job.status.as_str().to_string(),
                    }
                    .into());
                }
                db.add_applicant(job_id, freelancer_id)
            })
            .await
    }

    pub async fn applicants(&self, job_id: i64) -> Result<Vec<ApplicantView>> {
        self.db
            .call(move |db| {
                db.require_job(job_id)?;
                db.list_applicants(job_id)
            })
            .await
    }
}

pub struct WorkApprover {
    db: DbHandle,
}

impl WorkApprover {
    pub async fn assign_job(&self, job_id: i64, freelancer_id: i64) -> Result<Job> {
        self.db
            .call(move |db| {
                let job = db.require_job(job_id)?;
                let freelancer = db.require_user(freelancer_id)?;
                require_role(&freelancer, Role::Freelancer)?;
                require_transition(&job, JobStatus::InProgress, "assign")?;
                db.update_job_assignment(job_id, JobStatus::InProgress, freelancer_id)
            })
            .await
    }

    pub async fn approve_work(&self, job_id: i64, freelancer_id: i64) -> Result<Job> {
        self.db
            .call(move |db| {
                let job = db.require_job(job_id)?;
                let freelancer = db.require_user(freelancer_id)?;
                require_role(&freelancer, Role::Freelancer)?;
                require_transition(&job, JobStatus::Completed, "complete")?;
                if job.assigned_to.is_some_and(|assignee| assignee != freelancer_id) {
                    return Err(MarketError::AssignedElsewhere { job_id }.into());
                }
                db.update_job_assignment(job_id, JobStatus::Completed, freelancer_id)
            })
            .await
    }
}

// ── Facade ────────────────────────────────────────────────────────────

pub struct JobFacade {
    poster: JobPoster,
    browser: JobBrowser,
    applicator: JobApplicator,
    approver: WorkApprover,
    db: DbHandle,
    ws_tx: broadcast::Sender<String>,
}

impl JobFacade {
    pub fn new(db: DbHandle, ws_tx: broadcast::Sender<String>) -> Self {
        Self {
            poster: JobPoster { db: db.clone() },
            browser: JobBrowser { db: db.clone() },
            applicator: JobApplicator { db: db.clone() },
            approver: WorkApprover { db: db.clone() },
            db,
            ws_tx,
        }
    }

    pub async fn create_job(
        &self,
        title: String,
        description: String,
        budget: f64,
        client_id: i64,
    ) -> Result<JobResponse> {
        let job = self
            .poster
            .post_job(NewJob {
                title,
                description,
                budget,
                client_id,
            })
            .await?;
        tracing::info!(job_id = job.id, client_id, "job posted");
        broadcast_message(&self.ws_tx, &WsMessage::JobCreated { job: job.clone() });
        Ok(JobResponse::ok("Job created successfully", job))
    }

    /// Empty criteria lists everything; otherwise every set filter applies.
    pub async fn browse_jobs(&self, criteria: JobCriteria) -> Result<JobListResponse> {
        let jobs = if criteria.is_empty() {
            self.browser.all_jobs().await?
        } else {
            self.browser.search_jobs(criteria).await?
        };
        Ok(JobListResponse {
            success: true,
            jobs,
        })
    }

    pub async fn job_details(&self, job_id: i64) -> Result<Job> {
        self.browser
            .job_by_id(job_id)
            .await?
            .ok_or_else(|| MarketError::JobNotFound { id: job_id }.into())
    }

    pub async fn apply_to_job(&self, job_id: i64, freelancer_id: i64) -> Result<JobResponse> {
        let job = self.applicator.apply_to_job(job_id, freelancer_id).await?;
        tracing::info!(job_id, freelancer_id, "application submitted");
        broadcast_message(
            &self.ws_tx,
            &WsMessage::JobApplied {
                job_id,
                freelancer_id,
            },
        );
        self.notify_quietly(
            job.client_id,
            &format!("New application received for \"{}\"", job.title),
        )
        .await;
        Ok(JobResponse::ok("Application submitted successfully", job))
    }

    pub async fn applicants(&self, job_id: i64) -> Result<Vec<ApplicantView>> {
        self.applicator.applicants(job_id).await
    }

    pub async fn assign_job_to_freelancer(
        &self,
        job_id: i64,
        freelancer_id: i64,
    ) -> Result<JobResponse> {
        let job = self.approver.assign_job(job_id, freelancer_id).await?;
        tracing::info!(job_id, freelancer_id, "job assigned");
        broadcast_message(&self.ws_tx, &WsMessage::JobAssigned { job: job.clone() });
        self.notify_quietly(
            freelancer_id,
            &format!("You have been assigned to \"{}\"", job.title),
        )
        .await;
        Ok(JobResponse::ok("Job assigned successfully", job))
    }

    pub async fn complete_job(&self, job_id: i64, freelancer_id: i64) -> Result<JobResponse> {
        let job = self.approver.approve_work(job_id, freelancer_id).await?;
        tracing::info!(job_id, freelancer_id, "job completed");
        broadcast_message(&self.ws_tx, &WsMessage::JobCompleted { job: job.clone() });
        self.notify_quietly(
            freelancer_id,
            &format!("Your work on \"{}\" has been approved", job.title),
        )
        .await;
        Ok(JobResponse::ok("Job completed successfully", job))
    }

    /// Deliver `message` to a user, on `channel` or their preferred channel.
    pub async fn notify(
        &self,
        user_id: i64,
        message: &str,
        channel: Option<NotificationChannel>,
    ) -> Result<NotificationReceipt> {
        let user = self.db.call(move |db| db.require_user(user_id)).await?;
        let channel = channel.unwrap_or(user.preferred_notification);
        notify::dispatch(channel, &self.ws_tx, &user.address_for(channel), message).await
    }

    /// Lifecycle notifications are best effort; the state change already happened.
    async fn notify_quietly(&self, user_id: i64, message: &str) {
        if let Err(e) = self.notify(user_id, message, None).await {
            tracing::warn!(user_id, error = %e, "lifecycle notification failed");
        }
    }
}
