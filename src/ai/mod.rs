//! External renamer backed by a hosted language model.

pub mod client;
pub mod credentials;
pub mod http_client;
pub mod prompts;
pub mod rate_limit;

pub use client::AnthropicRenamer;
pub use credentials::CredentialManager;
pub use rate_limit::RenameRateLimiter;
