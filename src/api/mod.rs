pub mod backend;
pub mod client;
pub mod events;
pub mod models;

pub use backend::Backend;
pub use client::ApiClient;
