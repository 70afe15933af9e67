//! Broadcast routing for committed changes.
//!
//! [`BroadcastRouter::route`] turns one [`ChangeEvent`] into group sends:
//!
//! 1. An errored change is reported to its author, addressed by the raw
//!    `created_by_id`.
//! 2. The change is broadcast to its channel group and/or its user group,
//!    picked by the first matching rule:
//!    - no user group, a channel group: channel only
//!    - no channel group, a user group: user only
//!    - both groups: channel, then user
//!
//! Under [`AudiencePolicy::Placeholder`] an absent ID maps to the
//! placeholder group, so both groups always exist and every change goes to
//! two groups, even when both are the placeholder. [`AudiencePolicy::SkipAbsent`]
//! keeps absent IDs absent so the single-group rules apply.

use std::sync::Arc;

use tracing::{debug, warn};

use changecast_proto::{BroadcastMessage, ChangeEvent, GroupName};

use crate::error::Error;
use crate::metrics::RouterMetrics;
use crate::transport::GroupTransport;

/// How absent channel and user IDs map to audience groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudiencePolicy {
    /// Substitute the placeholder group for absent IDs.
    #[default]
    Placeholder,
    /// Skip the group of an absent ID.
    SkipAbsent,
}

impl AudiencePolicy {
    fn group(
        &self,
        id: Option<&str>,
        scope: impl Fn(Option<&str>) -> GroupName,
    ) -> Option<GroupName> {
        match self {
            AudiencePolicy::Placeholder => Some(scope(id)),
            AudiencePolicy::SkipAbsent => {
                id.filter(|id| !id.is_empty()).map(|id| scope(Some(id)))
            }
        }
    }
}

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Mapping of absent IDs to groups.
    pub policy: AudiencePolicy,
    /// Reject events that carry no identity instead of routing them.
    pub strict: bool,
}

impl RouterConfig {
    /// Create the default configuration.
    ///
    /// Strict validation is on in debug builds.
    pub fn new() -> Self {
        Self {
            policy: AudiencePolicy::default(),
            strict: cfg!(debug_assertions),
        }
    }

    /// Set the audience policy.
    pub fn with_policy(mut self, policy: AudiencePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Enable or disable strict event validation.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// One planned group send.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    /// Group or raw identity the message is addressed to.
    pub destination: GroupName,
    /// Message to deliver.
    pub message: BroadcastMessage,
}

impl Dispatch {
    fn new(destination: GroupName, message: BroadcastMessage) -> Self {
        Self {
            destination,
            message,
        }
    }
}

/// Routes change events to their audiences through a group transport.
///
/// The router keeps no per-event state; it can be shared across tasks and
/// called concurrently.
pub struct BroadcastRouter<T> {
    transport: T,
    config: RouterConfig,
    metrics: Arc<RouterMetrics>,
}

impl<T: GroupTransport> BroadcastRouter<T> {
    /// Create a router with the default configuration.
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, RouterConfig::default())
    }

    /// Create a router with the given configuration.
    pub fn with_config(transport: T, config: RouterConfig) -> Self {
        Self {
            transport,
            config,
            metrics: Arc::new(RouterMetrics::new()),
        }
    }

    /// Get a reference to the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get the router configuration.
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Get a reference to the router metrics.
    pub fn metrics(&self) -> &Arc<RouterMetrics> {
        &self.metrics
    }

    /// Compute the sends for an event without performing them.
    ///
    /// Sends are ordered error, channel, user.
    pub fn plan(&self, event: &ChangeEvent) -> Result<Vec<Dispatch>, Error> {
        if self.config.strict && !event.has_identity() {
            return Err(Error::MalformedEvent(
                "event has no channel, user or author id".to_string(),
            ));
        }

        let mut dispatches = Vec::with_capacity(3);

        if event.errored {
            match event.created_by_id.as_deref().filter(|id| !id.is_empty()) {
                Some(author) => dispatches.push(Dispatch::new(
                    GroupName::raw(author),
                    BroadcastMessage::error(event.payload.clone()),
                )),
                None if self.config.strict => {
                    return Err(Error::MalformedEvent(
                        "errored event has no author id".to_string(),
                    ));
                }
                None => {
                    warn!(
                        channel_id = ?event.channel_id,
                        user_id = ?event.user_id,
                        "errored change has no author, skipping error broadcast"
                    );
                }
            }
        }

        let channel_group = self
            .config
            .policy
            .group(event.channel_id.as_deref(), GroupName::channel);
        let user_group = self
            .config
            .policy
            .group(event.user_id.as_deref(), GroupName::user);

        let audience = match (channel_group, user_group) {
            (Some(channel), None) => vec![channel],
            (None, Some(user)) => vec![user],
            (Some(channel), Some(user)) => vec![channel, user],
            (None, None) => Vec::new(),
        };

        dispatches.extend(audience.into_iter().map(|group| {
            Dispatch::new(group, BroadcastMessage::change(event.payload.clone()))
        }));

        Ok(dispatches)
    }

    /// Route an event, sending each planned message in order.
    ///
    /// Stops at the first failed send and returns its error; later sends are
    /// not attempted.
    pub async fn route(&self, event: &ChangeEvent) -> Result<(), Error> {
        let dispatches = match self.plan(event) {
            Ok(dispatches) => dispatches,
            Err(e) => {
                self.metrics.record_malformed();
                return Err(e);
            }
        };

        for Dispatch {
            destination,
            message,
        } in dispatches
        {
            let is_error = message.is_error();
            debug!(destination = %destination, kind = %message.kind, "sending broadcast");

            if let Err(e) = self.transport.group_send(&destination, message).await {
                self.metrics.record_send_failure();
                return Err(e);
            }
            self.metrics.record_sent(is_error);
        }

        self.metrics.record_routed();
        Ok(())
    }
}

/// Shared router handle.
pub type SharedRouter<T> = Arc<BroadcastRouter<T>>;
