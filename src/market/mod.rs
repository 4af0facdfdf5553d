//! Marketplace back-end: users, jobs, payments and notifications.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Client  │ ───────> │  server.rs  (axum Router, ServerConfig)          │
//! │  (React) │ <─────── │    ├─ api.rs   (route handlers, AppState)        │
//! └──────────┘ WebSocket│    └─ auth.rs  (AuthUser extractor, /api/auth)   │
//!                       │         │                                        │
//!                       │         ├─ jobs.rs      Facade over the job      │
//!                       │         │               lifecycle subsystems     │
//!                       │         ├─ payments.rs  Factory of processors    │
//!                       │         └─ notify.rs    Strategy per channel     │
//!                       │                   │                              │
//!                       │                   v                              │
//!                       │  db.rs  (MarketDb on SQLite, DbHandle)           │
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module   | Responsibility                                            |
//! |----------|-----------------------------------------------------------|
//! | `models` | Shared types: `User`, `Job`, `Payment` and their enums    |
//! | `ws`     | `WsMessage` enum + `broadcast_message()` helper           |
//! | `extract`| `ApiJson`/`ApiPath`/`ApiQuery` with JSON error rejections |
//!
//! ## Typical Request Flow (assign a job)
//!
//! 1. `POST /api/jobs/assign` → `api::assign_job()`
//! 2. `JobFacade::assign_job_to_freelancer()` asks `WorkApprover` to check
//!    the freelancer's role and the job's status, then persists the change.
//! 3. The facade broadcasts `WsMessage::JobAssigned` and notifies the
//!    freelancer through `notify::dispatch` on their preferred channel.

pub mod api;
pub mod auth;
pub mod db;
pub mod extract;
pub mod jobs;
pub mod models;
pub mod notify;
pub mod payments;
pub mod server;
pub mod ws;
