mod client;
mod source;
mod types;

pub use client::GitLabClient;
pub use types::GlUser;
