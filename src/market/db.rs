use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

use super::models::*;
use crate::errors::MarketError;

/// Async-safe handle to the marketplace database.
///
/// Wraps `MarketDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, keeping synchronous SQLite
/// I/O off the async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<MarketDb>>,
}

impl DbHandle {
    pub fn new(db: MarketDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&MarketDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

pub struct MarketDb {
    conn: Connection,
}

fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

const USER_COLUMNS: &str =
    "id, name, email, role, preferred_notification, bio, skills, created_at";

const JOB_SELECT: &str = "SELECT j.id, j.title, j.description, j.budget, j.client_id, j.status, j.assigned_to, j.created_at, u.name, u.email
     FROM jobs j LEFT JOIN users u ON u.id = j.client_id";

const PAYMENT_SELECT: &str = "SELECT p.id, p.amount, p.payment_type, p.status, p.job_id, p.from_user_id, p.to_user_id, p.transaction_id, p.created_at,
            j.title, fu.name, fu.email, tu.name, tu.email
     FROM payments p
     LEFT JOIN jobs j ON j.id = p.job_id
     LEFT JOIN users fu ON fu.id = p.from_user_id
     LEFT JOIN users tu ON tu.id = p.to_user_id";

impl MarketDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    email TEXT NOT NULL UNIQUE,
                    role TEXT NOT NULL,
                    preferred_notification TEXT NOT NULL DEFAULT 'email',
                    bio TEXT NOT NULL DEFAULT '',
                    skills TEXT NOT NULL DEFAULT '[]',
                    password_hash TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS jobs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL,
                    budget REAL NOT NULL,
                    client_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    status TEXT NOT NULL DEFAULT 'open',
                    assigned_to INTEGER REFERENCES users(id) ON DELETE SET NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS job_applicants (
                    job_id INTEGER NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
                    freelancer_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    applied_at TEXT NOT NULL,
                    PRIMARY KEY (job_id, freelancer_id)
                );

                CREATE TABLE IF NOT EXISTS payments (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    amount REAL NOT NULL,
                    payment_type TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'pending',
                    job_id INTEGER REFERENCES jobs(id) ON DELETE SET NULL,
                    from_user_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
                    to_user_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
                    transaction_id TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS password_resets (
                    token_hash TEXT PRIMARY KEY,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    expires_at INTEGER NOT NULL,
                    used INTEGER NOT NULL DEFAULT 0
                );

                CREATE INDEX IF NOT EXISTS idx_jobs_client ON jobs(client_id);
                CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
                CREATE INDEX IF NOT EXISTS idx_applicants_freelancer ON job_applicants(freelancer_id);
                CREATE INDEX IF NOT EXISTS idx_payments_job ON payments(job_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Users ─────────────────────────────────────────────────────────

    pub fn create_user(&self, new: &NewUser) -> Result<User> {
        let email = new.email.trim().to_lowercase();
        if self.email_exists(&email)? {
            return Err(MarketError::EmailTaken { email }.into());
        }
        self.conn
            .execute(
                "INSERT INTO users (name, email, role, preferred_notification, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    new.name.trim(),
                    email,
                    new.role.as_str(),
                    new.preferred_notification.as_str(),
                    new.password_hash,
                    now_timestamp(),
                ],
            )
            .context("Failed to insert user")?;
        let id = self.conn.last_insert_rowid();
        self.get_user(id)?.context("User not found after insert")
    }

    fn email_exists(&self, email: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row("SELECT id FROM users WHERE email = ?1", params![email], |row| {
                row.get(0)
            })
            .optional()
            .context("Failed to check email")?;
        Ok(found.is_some())
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                UserRow::from_row,
            )
            .optional()
            .context("Failed to query user")?;
        row.map(UserRow::into_user).transpose()
    }

    /// Fetch a user that must exist.
    pub fn require_user(&self, id: i64) -> Result<User> {
        self.get_user(id)?
            .ok_or_else(|| MarketError::UserNotFound { id }.into())
    }

    /// Newest first.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, id DESC"
            ))
            .context("Failed to prepare list_users")?;
        let rows = stmt
            .query_map([], UserRow::from_row)
            .context("Failed to query users")?;
        let mut users = Vec::new();
        for row in rows {
            users.push(row.context("Failed to read user row")?.into_user()?);
        }
        Ok(users)
    }

    /// Look up a user together with their stored password hash.
    pub fn get_credentials(&self, email: &str) -> Result<Option<(User, Option<String>)>> {
        let email = email.trim().to_lowercase();
        let row = self
            .conn
            .query_row(
                &format!("SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = ?1"),
                params![email],
                |row| Ok((UserRow::from_row(row)?, row.get::<_, Option<String>>(8)?)),
            )
            .optional()
            .context("Failed to query credentials")?;
        match row {
            Some((user, hash)) => Ok(Some((user.into_user()?, hash))),
            None => Ok(None),
        }
    }

    pub fn get_password_hash(&self, user_id: i64) -> Result<Option<String>> {
        let hash: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT password_hash FROM users WHERE id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query password hash")?;
        match hash {
            Some(h) => Ok(h),
            None => Err(MarketError::UserNotFound { id: user_id }.into()),
        }
    }

    pub fn set_password_hash(&self, user_id: i64, hash: &str) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE users SET password_hash = ?1 WHERE id = ?2",
                params![hash, user_id],
            )
            .context("Failed to update password")?;
        if changed == 0 {
            return Err(MarketError::UserNotFound { id: user_id }.into());
        }
        Ok(())
    }

    pub fn update_profile(&self, user_id: i64, update: &ProfileUpdate) -> Result<User> {
        let skills_json = match &update.skills {
            Some(skills) => Some(
                serde_json::to_string(skills).context("Failed to serialize skills")?,
            ),
            None => None,
        };
        let changed = self
            .conn
            .execute(
                "UPDATE users SET
                    name = COALESCE(?1, name),
                    bio = COALESCE(?2, bio),
                    skills = COALESCE(?3, skills),
                    preferred_notification = COALESCE(?4, preferred_notification)
                 WHERE id = ?5",
                params![
                    update.name.as_deref().map(str::trim),
                    update.bio,
                    skills_json,
                    update.preferred_notification.map(|c| c.as_str()),
                    user_id,
                ],
            )
            .context("Failed to update profile")?;
        if changed == 0 {
            return Err(MarketError::UserNotFound { id: user_id }.into());
        }
        self.require_user(user_id)
    }

    /// Returns `None` when the user does not exist.
    pub fn set_preferred_notification(
        &self,
        user_id: i64,
        channel: NotificationChannel,
    ) -> Result<Option<User>> {
        let changed = self
            .conn
            .execute(
                "UPDATE users SET preferred_notification = ?1 WHERE id = ?2",
                params![channel.as_str(), user_id],
            )
            .context("Failed to update notification preference")?;
        if changed == 0 {
            return Ok(None);
        }
        self.get_user(user_id)
    }

    pub fn delete_user(&self, user_id: i64) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM users WHERE id = ?1", params![user_id])
            .context("Failed to delete user")?;
        Ok(changed > 0)
    }

    // ── Password resets ───────────────────────────────────────────────

    pub fn store_reset_token(&self, user_id: i64, token_hash: &str, expires_at: i64) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO password_resets (token_hash, user_id, expires_at) VALUES (?1, ?2, ?3)",
                params![token_hash, user_id, expires_at],
            )
            .context("Failed to store reset token")?;
        Ok(())
    }

    /// Mark a live token as used and return its owner. Unknown, used and
    /// expired tokens all yield `None`.
    pub fn consume_reset_token(&self, token_hash: &str, now: i64) -> Result<Option<i64>> {
        let user_id: Option<i64> = self
            .conn
            .query_row(
                "SELECT user_id FROM password_resets
                 WHERE token_hash = ?1 AND used = 0 AND expires_at > ?2",
                params![token_hash, now],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query reset token")?;
        if user_id.is_some() {
            self.conn
                .execute(
                    "UPDATE password_resets SET used = 1 WHERE token_hash = ?1",
                    params![token_hash],
                )
                .context("Failed to consume reset token")?;
        }
        Ok(user_id)
    }

    // ── Jobs ──────────────────────────────────────────────────────────

    pub fn create_job(&self, new: &NewJob) -> Result<Job> {
        self.conn
            .execute(
                "INSERT INTO jobs (title, description, budget, client_id, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    new.title.trim(),
                    new.description.trim(),
                    new.budget,
                    new.client_id,
                    JobStatus::Open.as_str(),
                    now_timestamp(),
                ],
            )
            .context("Failed to insert job")?;
        let id = self.conn.last_insert_rowid();
        self.get_job(id)?.context("Job not found after insert")
    }

    pub fn get_job(&self, id: i64) -> Result<Option<Job>> {
        let row = self
            .conn
            .query_row(
                &format!("{JOB_SELECT} WHERE j.id = ?1"),
                params![id],
                JobRow::from_row,
            )
            .optional()
            .context("Failed to query job")?;
        match row {
            Some(r) => Ok(Some(self.hydrate_job(r)?)),
            None => Ok(None),
        }
    }

    /// Fetch a job that must exist.
    pub fn require_job(&self, id: i64) -> Result<Job> {
        self.get_job(id)?
            .ok_or_else(|| MarketError::JobNotFound { id }.into())
    }

    /// Jobs matching every set criterion, oldest first.
    pub fn list_jobs(&self, criteria: &JobCriteria) -> Result<Vec<Job>> {
        let mut clauses = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(status) = criteria.status {
            values.push(Value::Text(status.as_str().to_string()));
            clauses.push(format!("j.status = ?{}", values.len()));
        }
        if let Some(min_budget) = criteria.min_budget {
            values.push(Value::Real(min_budget));
            clauses.push(format!("j.budget >= ?{}", values.len()));
        }
        let mut sql = JOB_SELECT.to_string();
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY j.id");

        let rows = {
            let mut stmt = self.conn.prepare(&sql).context("Failed to prepare list_jobs")?;
            let mapped = stmt
                .query_map(params_from_iter(values.iter()), JobRow::from_row)
                .context("Failed to query jobs")?;
            let mut rows = Vec::new();
            for row in mapped {
                rows.push(row.context("Failed to read job row")?);
            }
            rows
        };
        rows.into_iter().map(|r| self.hydrate_job(r)).collect()
    }

    fn hydrate_job(&self, row: JobRow) -> Result<Job> {
        let applicants = self.job_applicants(row.id)?;
        row.into_job(applicants)
    }

    fn job_applicants(&self, job_id: i64) -> Result<Vec<Applicant>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT freelancer_id, applied_at FROM job_applicants
                 WHERE job_id = ?1 ORDER BY rowid",
            )
            .context("Failed to prepare job_applicants")?;
        let rows = stmt
            .query_map(params![job_id], |row| {
                Ok(Applicant {
                    freelancer_id: row.get(0)?,
                    applied_at: row.get(1)?,
                })
            })
            .context("Failed to query applicants")?;
        let mut applicants = Vec::new();
        for row in rows {
            applicants.push(row.context("Failed to read applicant row")?);
        }
        Ok(applicants)
    }

    pub fn add_applicant(&self, job_id: i64, freelancer_id: i64) -> Result<Job> {
        let job = self.require_job(job_id)?;
        if job.has_applicant(freelancer_id) {
            return Err(MarketError::AlreadyApplied {
                job_id,
                freelancer_id,
            }
            .into());
        }
        self.conn
            .execute(
                "INSERT INTO job_applicants (job_id, freelancer_id, applied_at) VALUES (?1, ?2, ?3)",
                params![job_id, freelancer_id, now_timestamp()],
            )
            .context("Failed to insert applicant")?;
        self.require_job(job_id)
    }

    /// Applicants with freelancer details. A missing job yields an empty list.
    pub fn list_applicants(&self, job_id: i64) -> Result<Vec<ApplicantView>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT u.id, u.name, u.email, a.applied_at
                 FROM job_applicants a JOIN users u ON u.id = a.freelancer_id
                 WHERE a.job_id = ?1 ORDER BY a.rowid",
            )
            .context("Failed to prepare list_applicants")?;
        let rows = stmt
            .query_map(params![job_id], |row| {
                Ok(ApplicantView {
                    freelancer: UserSummary {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        email: row.get(2)?,
                    },
                    applied_at: row.get(3)?,
                })
            })
            .context("Failed to query applicants")?;
        let mut applicants = Vec::new();
        for row in rows {
            applicants.push(row.context("Failed to read applicant row")?);
        }
        Ok(applicants)
    }

    pub fn update_job_assignment(
        &self,
        job_id: i64,
        status: JobStatus,
        assigned_to: i64,
    ) -> Result<Job> {
        let changed = self
            .conn
            .execute(
                "UPDATE jobs SET status = ?1, assigned_to = ?2 WHERE id = ?3",
                params![status.as_str(), assigned_to, job_id],
            )
            .context("Failed to update job")?;
        if changed == 0 {
            return Err(MarketError::JobNotFound { id: job_id }.into());
        }
        self.require_job(job_id)
    }

    // ── Payments ──────────────────────────────────────────────────────

    pub fn create_payment(&self, new: &NewPayment) -> Result<Payment> {
        if let Some(job_id) = new.job_id {
            self.require_job(job_id)?;
        }
        for user_id in [new.from_user_id, new.to_user_id].into_iter().flatten() {
            self.require_user(user_id)?;
        }
        self.conn
            .execute(
                "INSERT INTO payments (amount, payment_type, status, job_id, from_user_id, to_user_id, transaction_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    new.amount,
                    new.payment_type.as_str(),
                    new.status.as_str(),
                    new.job_id,
                    new.from_user_id,
                    new.to_user_id,
                    new.transaction_id,
                    now_timestamp(),
                ],
            )
            .context("Failed to insert payment")?;
        let id = self.conn.last_insert_rowid();
        self.get_payment(id)?
            .ok_or_else(|| MarketError::PaymentNotFound { id }.into())
    }

    pub fn get_payment(&self, id: i64) -> Result<Option<Payment>> {
        let row = self
            .conn
            .query_row(
                &format!("{PAYMENT_SELECT} WHERE p.id = ?1"),
                params![id],
                PaymentRow::from_row,
            )
            .optional()
            .context("Failed to query payment")?;
        row.map(PaymentRow::into_payment).transpose()
    }

    /// Newest first.
    pub fn list_payments(&self) -> Result<Vec<Payment>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "{PAYMENT_SELECT} ORDER BY p.created_at DESC, p.id DESC"
            ))
            .context("Failed to prepare list_payments")?;
        let rows = stmt
            .query_map([], PaymentRow::from_row)
            .context("Failed to query payments")?;
        let mut payments = Vec::new();
        for row in rows {
            payments.push(row.context("Failed to read payment row")?.into_payment()?);
        }
        Ok(payments)
    }
}

// ── Row adapters ──────────────────────────────────────────────────────

/// Intermediate row struct for reading users before converting the role,
/// channel and skills strings into typed values.
struct UserRow {
    id: i64,
    name: String,
    email: String,
    role: String,
    preferred_notification: String,
    bio: String,
    skills: String,
    created_at: String,
}

impl UserRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            role: row.get(3)?,
            preferred_notification: row.get(4)?,
            bio: row.get(5)?,
            skills: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn into_user(self) -> Result<User> {
        let role = Role::from_str(&self.role)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse user role")?;
        let preferred_notification = NotificationChannel::from_str(&self.preferred_notification)
            .context("Failed to parse notification preference")?;
        let skills: Vec<String> =
            serde_json::from_str(&self.skills).context("Failed to parse user skills JSON")?;
        Ok(User {
            id: self.id,
            name: self.name,
            email: self.email,
            role,
            preferred_notification,
            bio: self.bio,
            skills,
            created_at: self.created_at,
        })
    }
}

struct JobRow {
    id: i64,
    title: String,
    description: String,
    budget: f64,
    client_id: i64,
    status: String,
    assigned_to: Option<i64>,
    created_at: String,
    client_name: Option<String>,
    client_email: Option<String>,
}

impl JobRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            budget: row.get(3)?,
            client_id: row.get(4)?,
            status: row.get(5)?,
            assigned_to: row.get(6)?,
            created_at: row.get(7)?,
            client_name: row.get(8)?,
            client_email: row.get(9)?,
        })
    }

    fn into_job(self, applicants: Vec<Applicant>) -> Result<Job> {
        let status = JobStatus::from_str(&self.status)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse job status")?;
        let client = match (self.client_name, self.client_email) {
            (Some(name), Some(email)) => Some(UserSummary {
                id: self.client_id,
                name,
                email,
            }),
            _ => None,
        };
        Ok(Job {
            id: self.id,
            title: self.title,
            description: self.description,
            budget: self.budget,
            client_id: self.client_id,
            client,
            status,
            assigned_to: self.assigned_to,
            applicants,
            created_at: self.created_at,
        })
    }
}

struct PaymentRow {
    id: i64,
    amount: f64,
    payment_type: String,
    status: String,
    job_id: Option<i64>,
    from_user_id: Option<i64>,
    to_user_id: Option<i64>,
    transaction_id: Option<String>,
    created_at: String,
    job_title: Option<String>,
    from_name: Option<String>,
    from_email: Option<String>,
    to_name: Option<String>,
    to_email: Option<String>,
}

impl PaymentRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            amount: row.get(1)?,
            payment_type: row.get(2)?,
            status: row.get(3)?,
            job_id: row.get(4)?,
            from_user_id: row.get(5)?,
            to_user_id: row.get(6)?,
            transaction_id: row.get(7)?,
            created_at: row.get(8)?,
            job_title: row.get(9)?,
            from_name: row.get(10)?,
            from_email: row.get(11)?,
            to_name: row.get(12)?,
            to_email: row.get(13)?,
        })
    }

    fn into_payment(self) -> Result<Payment> {
        let payment_type = PaymentType::from_str(&self.payment_type)
            .context("Failed to parse payment type")?;
        let status = PaymentStatus::from_str(&self.status)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse payment status")?;
        let summary = |id: Option<i64>, name: Option<String>, email: Option<String>| {
            match (id, name, email) {
                (Some(id), Some(name), Some(email)) => Some(UserSummary { id, name, email }),
                _ => None,
            }
        };
        let job = match (self.job_id, self.job_title) {
            (Some(id), Some(title)) => Some(JobSummary { id, title }),
            _ => None,
        };
        Ok(Payment {
            id: self.id,
            amount: self.amount,
            payment_type,
            status,
            job_id: self.job_id,
            from_user_id: self.from_user_id,
            to_user_id: self.to_user_id,
            job,
            from_user: summary(self.from_user_id, self.from_name, self.from_email),
            to_user: summary(self.to_user_id, self.to_name, self.to_email),
            transaction_id: self.transaction_id,
            created_at: self.created_at,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
