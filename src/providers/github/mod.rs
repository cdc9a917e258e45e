mod client;
mod destination;
mod types;

pub use client::GitHubClient;
