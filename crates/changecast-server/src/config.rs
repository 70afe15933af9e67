//! Server configuration.

use clap::{ArgAction, Parser, ValueEnum};

use changecast_core::cdc::DEFAULT_BUFFER_SIZE;
use changecast_core::{AudiencePolicy, RouterConfig};
use changecast_proto::framing::MAX_MESSAGE_SIZE;

/// Default TCP address subscribers connect to.
pub const DEFAULT_PUBLISH_ADDRESS: &str = "tcp://0.0.0.0:9100";

/// Default TCP address the persistence layer pushes change events to.
pub const DEFAULT_INGEST_ADDRESS: &str = "tcp://127.0.0.1:9101";

/// changecast server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP address the publisher binds to (e.g., "tcp://0.0.0.0:9100").
    pub publish_tcp: Option<String>,

    /// IPC address the publisher binds to (e.g., "ipc:///tmp/changecast.sock").
    pub publish_ipc: Option<String>,

    /// Address the ingest socket binds to.
    pub ingest_address: String,

    /// Maximum message size in bytes, for both ingest and publish.
    pub max_message_size: usize,

    /// Buffered change events between ingest and the router.
    pub buffer_size: usize,

    /// Mapping of absent IDs to groups.
    pub audience_policy: AudiencePolicy,

    /// Reject events with no channel, user or author ID.
    pub strict: bool,
}

impl ServerConfig {
    /// Create a new server configuration with default addresses.
    pub fn new() -> Self {
        Self {
            publish_tcp: Some(DEFAULT_PUBLISH_ADDRESS.to_string()),
            publish_ipc: None,
            ingest_address: DEFAULT_INGEST_ADDRESS.to_string(),
            max_message_size: MAX_MESSAGE_SIZE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            audience_policy: AudiencePolicy::default(),
            strict: RouterConfig::default().strict,
        }
    }

    /// Set the publisher TCP address.
    pub fn with_publish_tcp(mut self, address: impl Into<String>) -> Self {
        self.publish_tcp = Some(address.into());
        self
    }

    /// Disable the publisher TCP address.
    pub fn without_tcp(mut self) -> Self {
        self.publish_tcp = None;
        self
    }

    /// Set the publisher IPC address.
    pub fn with_publish_ipc(mut self, address: impl Into<String>) -> Self {
        self.publish_ipc = Some(address.into());
        self
    }

    /// Set the ingest address.
    pub fn with_ingest_address(mut self, address: impl Into<String>) -> Self {
        self.ingest_address = address.into();
        self
    }

    /// Set the maximum message size.
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set the change buffer size.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    /// Set the audience policy.
    pub fn with_audience_policy(mut self, policy: AudiencePolicy) -> Self {
        self.audience_policy = policy;
        self
    }

    /// Enable or disable strict event validation.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Check if the publisher has at least one address.
    pub fn has_publish_address(&self) -> bool {
        self.publish_tcp.is_some() || self.publish_ipc.is_some()
    }

    /// Router configuration derived from this server configuration.
    pub fn router_config(&self) -> RouterConfig {
        RouterConfig::new()
            .with_policy(self.audience_policy)
            .with_strict(self.strict)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Audience policy as a command-line value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    /// Absent IDs broadcast to the placeholder group.
    Placeholder,
    /// Absent IDs are skipped.
    SkipAbsent,
}

impl From<PolicyArg> for AudiencePolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Placeholder => AudiencePolicy::Placeholder,
            PolicyArg::SkipAbsent => AudiencePolicy::SkipAbsent,
        }
    }
}

/// Command-line arguments for the server.
#[derive(Parser, Debug)]
#[command(name = "changecast-server")]
#[command(version, about = "changecast change broadcast server", long_about = None)]
pub struct Args {
    /// TCP address subscribers connect to.
    #[arg(long, default_value = DEFAULT_PUBLISH_ADDRESS)]
    pub publish: String,

    /// IPC address subscribers connect to (optional).
    #[arg(long)]
    pub publish_ipc: Option<String>,

    /// Disable the publisher TCP address (requires --publish-ipc).
    #[arg(long)]
    pub no_tcp: bool,

    /// Address the persistence layer pushes change events to.
    #[arg(long, default_value = DEFAULT_INGEST_ADDRESS)]
    pub ingest: String,

    /// Maximum message size in kilobytes.
    #[arg(long, default_value_t = MAX_MESSAGE_SIZE / 1024)]
    pub max_message_kb: usize,

    /// Change events buffered between ingest and routing.
    #[arg(long, default_value_t = DEFAULT_BUFFER_SIZE)]
    pub buffer_size: usize,

    /// How absent channel and user IDs map to groups.
    #[arg(long, value_enum, default_value_t = PolicyArg::Placeholder)]
    pub audience_policy: PolicyArg,

    /// Reject change events that carry no identity (default: on in debug builds).
    #[arg(
        long,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true",
        default_value_t = RouterConfig::default().strict
    )]
    pub strict: bool,
}

impl Args {
    /// Convert command-line arguments to server configuration.
    pub fn into_config(self) -> ServerConfig {
        let publish_tcp = if self.no_tcp {
            None
        } else {
            Some(self.publish)
        };

        ServerConfig {
            publish_tcp,
            publish_ipc: self.publish_ipc,
            ingest_address: self.ingest,
            max_message_size: self.max_message_kb * 1024,
            buffer_size: self.buffer_size.max(1),
            audience_policy: self.audience_policy.into(),
            strict: self.strict,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(
            config.publish_tcp,
            Some(DEFAULT_PUBLISH_ADDRESS.to_string())
        );
        assert!(config.publish_ipc.is_none());
        assert_eq!(config.ingest_address, DEFAULT_INGEST_ADDRESS);
        assert_eq!(config.max_message_size, MAX_MESSAGE_SIZE);
        assert_eq!(config.audience_policy, AudiencePolicy::Placeholder);
        assert!(config.has_publish_address());
    }

    #[test]
    fn test_config_builder() {
        let config = ServerConfig::new()
            .with_publish_tcp("tcp://127.0.0.1:8100")
            .with_publish_ipc("ipc:///tmp/changecast.sock")
            .with_ingest_address("ipc:///tmp/changecast-ingest.sock")
            .with_buffer_size(0)
            .with_audience_policy(AudiencePolicy::SkipAbsent)
            .with_strict(true);

        assert_eq!(config.publish_tcp.as_deref(), Some("tcp://127.0.0.1:8100"));
        assert_eq!(
            config.publish_ipc.as_deref(),
            Some("ipc:///tmp/changecast.sock")
        );
        assert_eq!(config.buffer_size, 1);

        let router = config.router_config();
        assert_eq!(router.policy, AudiencePolicy::SkipAbsent);
        assert!(router.strict);
    }

    #[test]
    fn test_no_publish_address() {
        let config = ServerConfig::new().without_tcp();
        assert!(!config.has_publish_address());
    }

    #[test]
    fn test_args_into_config() {
        let args = Args::parse_from([
            "changecast-server",
            "--no-tcp",
            "--publish-ipc",
            "ipc:///tmp/cc.sock",
            "--max-message-kb",
            "64",
            "--audience-policy",
            "skip-absent",
            "--strict",
        ]);
        let config = args.into_config();

        assert!(config.publish_tcp.is_none());
        assert_eq!(config.publish_ipc.as_deref(), Some("ipc:///tmp/cc.sock"));
        assert_eq!(config.ingest_address, DEFAULT_INGEST_ADDRESS);
        assert_eq!(config.max_message_size, 64 * 1024);
        assert_eq!(config.audience_policy, AudiencePolicy::SkipAbsent);
        assert!(config.strict);
    }

    #[test]
    fn test_args_defaults() {
        let config = Args::parse_from(["changecast-server"]).into_config();
        assert_eq!(config.publish_tcp.as_deref(), Some(DEFAULT_PUBLISH_ADDRESS));
        assert_eq!(config.max_message_size, MAX_MESSAGE_SIZE);
        assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE);
    }

    #[test]
    fn test_strict_default_matches_library() {
        let from_args = Args::parse_from(["changecast-server"]).into_config();
        assert_eq!(from_args.strict, ServerConfig::new().strict);
        assert_eq!(from_args.strict, RouterConfig::default().strict);
        assert_eq!(from_args.router_config().strict, RouterConfig::default().strict);
    }

    #[test]
    fn test_strict_flag_values() {
        let parse = |args: &[&str]| {
            let mut argv = vec!["changecast-server"];
            argv.extend_from_slice(args);
            Args::parse_from(argv).into_config().strict
        };

        assert!(parse(&["--strict"]));
        assert!(parse(&["--strict", "true"]));
        assert!(!parse(&["--strict", "false"]));
        assert!(!parse(&["--strict=false"]));
    }
}
