//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `serve`  | `Serve`          |
//! | `db`     | `InitDb`         |
//! | `config` | `Config`         |
//! | `demo`   | `Demo`           |

pub mod config;
pub mod db;
pub mod demo;
pub mod serve;

pub use config::cmd_config;
pub use db::cmd_init_db;
pub use demo::cmd_demo;
pub use serve::{ServeOverrides, cmd_serve};
