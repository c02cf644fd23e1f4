//! Configuration for Questline
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use uuid::Uuid;

/// Questline - gamified challenge engine
///
/// Generates daily challenges, verifies user actions against them, and
/// maintains rolling verification status.
#[derive(Parser, Debug, Clone)]
#[command(name = "questline")]
#[command(about = "Challenge engine service: generation, verification, status tracking")]
pub struct Args {
    /// Unique node identifier for this instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "questline")]
    pub mongodb_db: String,

    /// API key for the external completion service
    ///
    /// Absence is tolerated at startup but generation and avatar
    /// verification will fail with a configuration error.
    #[arg(long, env = "COMPLETION_API_KEY")]
    pub completion_api_key: Option<String>,

    /// Base URL of the completion service (OpenAI-compatible chat endpoint)
    #[arg(long, env = "COMPLETION_API_URL", default_value = "https://api.openai.com/v1")]
    pub completion_api_url: String,

    /// Model used for challenge text generation
    #[arg(long, env = "COMPLETION_TEXT_MODEL", default_value = "gpt-4o-mini")]
    pub completion_text_model: String,

    /// Vision-capable model used for avatar verification
    #[arg(long, env = "COMPLETION_VISION_MODEL", default_value = "gpt-4o-mini")]
    pub completion_vision_model: String,

    /// Completion request timeout in seconds
    #[arg(long, env = "COMPLETION_TIMEOUT_SECS", default_value = "60")]
    pub completion_timeout_secs: u64,

    /// Reserved username that is always reported permanently verified
    #[arg(long, env = "RESERVED_VERIFIED_USERNAME", default_value = "mkwapp")]
    pub reserved_verified_username: String,

    /// Enable the in-process daily generation scheduler
    ///
    /// When enabled, a batch generation run fires at the daily refresh
    /// hour (03:00 local). Clients can still trigger generation on demand.
    #[arg(long, env = "SCHEDULER_ENABLED", default_value = "false")]
    pub scheduler_enabled: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Whether the external completion service is configured
    pub fn has_completion_credential(&self) -> bool {
        self.completion_api_key
            .as_deref()
            .map(|k| !k.is_empty())
            .unwrap_or(false)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.mongodb_uri.is_empty() {
            return Err("MONGODB_URI must not be empty".to_string());
        }

        if self.completion_api_url.is_empty() {
            return Err("COMPLETION_API_URL must not be empty".to_string());
        }

        if self.reserved_verified_username.is_empty() {
            return Err("RESERVED_VERIFIED_USERNAME must not be empty".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args::parse_from(["questline"])
    }

    #[test]
    fn test_defaults_validate() {
        assert!(base_args().validate().is_ok());
    }

    #[test]
    fn test_missing_credential_detected() {
        let args = base_args();
        assert!(!args.has_completion_credential());

        let mut args = base_args();
        args.completion_api_key = Some("sk-test".to_string());
        assert!(args.has_completion_credential());

        // Empty string counts as absent
        let mut args = base_args();
        args.completion_api_key = Some(String::new());
        assert!(!args.has_completion_credential());
    }

    #[test]
    fn test_empty_reserved_username_rejected() {
        let mut args = base_args();
        args.reserved_verified_username = String::new();
        assert!(args.validate().is_err());
    }
}
