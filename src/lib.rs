//! RoundUp client: profiles, interest groups, group chat and
//! recommendations on top of a managed backend.

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod groups;
pub mod messages;
pub mod profiles;
pub mod recommend;
pub mod session;
pub mod storage;
pub mod utils;

pub use app::{AppState, RoundUp};
pub use error::{Error, Result};
