pub mod client;
pub mod session;
pub mod types;

pub use client::{ApiQuery, FadcClient, QueryResult};
pub use session::SessionManager;
