mod client;
mod pagination;

pub use client::{ApiClient, ApiResponse, Auth, RetryPolicy, DEFAULT_BACKOFF_MS, DEFAULT_MAX_RETRIES};
pub use pagination::{query, PageStyle};

#[cfg(test)]
pub(crate) use client::test_client;
