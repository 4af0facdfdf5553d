use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::MarketError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Freelancer,
    Client,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Freelancer => "freelancer",
            Self::Client => "client",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "freelancer" => Ok(Self::Freelancer),
            "client" => Ok(Self::Client),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// Delivery channel for user notifications.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    #[default]
    Email,
    Sms,
    Push,
    InApp,
}

impl NotificationChannel {
    pub const ALL: [NotificationChannel; 4] = [Self::Email, Self::Sms, Self::Push, Self::InApp];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Push => "push",
            Self::InApp => "inapp",
        }
    }
}

impl FromStr for NotificationChannel {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "email" => Ok(Self::Email),
            "sms" => Ok(Self::Sms),
            "push" => Ok(Self::Push),
            "inapp" => Ok(Self::InApp),
            _ => Err(MarketError::UnknownNotificationType(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub preferred_notification: NotificationChannel,
    pub bio: String,
    pub skills: Vec<String>,
    pub created_at: String,
}

impl User {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }

    /// Address used when delivering on `channel`. In-app delivery is keyed
    /// by user id; every other channel goes to the email address.
    pub fn address_for(&self, channel: NotificationChannel) -> String {
        match channel {
            NotificationChannel::InApp => self.id.to_string(),
            _ => self.email.clone(),
        }
    }
}

/// The `{id, name, email}` projection embedded in jobs and payments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserSummary {
    pub id: i64,
    pub name: String,
    pub email: String,
}

/// Input for inserting a user row.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub preferred_notification: NotificationChannel,
    pub password_hash: Option<String>,
}

/// Partial profile update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub skills: Option<Vec<String>>,
    pub preferred_notification: Option<NotificationChannel>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Open,
    InProgress,
    Completed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
        }
    }

    /// `open -> in-progress -> completed`, plus direct approval of open work.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Open, Self::InProgress)
                | (Self::Open, Self::Completed)
                | (Self::InProgress, Self::InProgress)
                | (Self::InProgress, Self::Completed)
        )
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "in-progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Applicant {
    pub freelancer_id: i64,
    pub applied_at: String,
}

/// Applicant with the freelancer's contact details populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicantView {
    pub freelancer: UserSummary,
    pub applied_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub budget: f64,
    pub client_id: i64,
    pub client: Option<UserSummary>,
    pub status: JobStatus,
    pub assigned_to: Option<i64>,
    pub applicants: Vec<Applicant>,
    pub created_at: String,
}

impl Job {
    pub fn has_applicant(&self, freelancer_id: i64) -> bool {
        self.applicants.iter().any(|a| a.freelancer_id == freelancer_id)
    }
}

#[derive(Debug, Clone)]
pub struct NewJob {
    pub title: String,
    pub description: String,
    pub budget: f64,
    pub client_id: i64,
}

/// Browse filters. An all-`None` value means "every job".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCriteria {
    pub status: Option<JobStatus>,
    pub min_budget: Option<f64>,
}

impl JobCriteria {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.min_budget.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSummary {
    pub id: i64,
    pub title: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    CreditCard,
    PayPal,
    BankTransfer,
    Crypto,
}

impl PaymentType {
    pub const ALL: [PaymentType; 4] = [
        Self::CreditCard,
        Self::PayPal,
        Self::BankTransfer,
        Self::Crypto,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreditCard => "creditcard",
            Self::PayPal => "paypal",
            Self::BankTransfer => "banktransfer",
            Self::Crypto => "crypto",
        }
    }
}

impl FromStr for PaymentType {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "creditcard" => Ok(Self::CreditCard),
            "paypal" => Ok(Self::PayPal),
            "banktransfer" => Ok(Self::BankTransfer),
            "crypto" => Ok(Self::Crypto),
            _ => Err(MarketError::UnknownPaymentType(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid payment status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: i64,
    pub amount: f64,
    pub payment_type: PaymentType,
    pub status: PaymentStatus,
    pub job_id: Option<i64>,
    pub from_user_id: Option<i64>,
    pub to_user_id: Option<i64>,
    pub job: Option<JobSummary>,
    pub from_user: Option<UserSummary>,
    pub to_user: Option<UserSummary>,
    pub transaction_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub amount: f64,
    pub payment_type: PaymentType,
    pub status: PaymentStatus,
    pub job_id: Option<i64>,
    pub from_user_id: Option<i64>,
    pub to_user_id: Option<i64>,
    pub transaction_id: String,
}
