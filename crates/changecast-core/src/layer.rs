//! In-process channel layer.
//!
//! Consumers own a channel (a bounded mailbox) and join any number of
//! groups. A group send copies the message into the mailbox of every member.
//! Delivery is best effort: a member whose mailbox is full or closed misses
//! that message, and the send still succeeds.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use changecast_proto::{BroadcastMessage, GroupName};

use crate::error::Error;
use crate::transport::GroupTransport;

/// Default mailbox capacity per channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// Prefix of generated channel names.
pub const CHANNEL_PREFIX: &str = "specific.inmemory!";

/// Channel layer configuration.
#[derive(Debug, Clone)]
pub struct LayerConfig {
    /// Messages buffered per channel before new ones are dropped.
    pub capacity: usize,
    /// Reject group names that break the channel layer naming rules.
    pub validate_names: bool,
}

impl LayerConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self {
            capacity: DEFAULT_CHANNEL_CAPACITY,
            validate_names: true,
        }
    }

    /// Set the per-channel capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Enable or disable group name validation.
    pub fn with_validate_names(mut self, validate: bool) -> Self {
        self.validate_names = validate;
        self
    }
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half of a channel.
pub type Mailbox = mpsc::Receiver<BroadcastMessage>;

/// Group membership and per-channel mailboxes, all in memory.
pub struct InMemoryChannelLayer {
    /// Mailbox senders keyed by channel name.
    channels: RwLock<HashMap<String, mpsc::Sender<BroadcastMessage>>>,
    /// Members of each group.
    groups: RwLock<HashMap<GroupName, BTreeSet<String>>>,
    next_channel_id: AtomicU64,
    dropped: AtomicU64,
    config: LayerConfig,
}

impl InMemoryChannelLayer {
    /// Create a channel layer with the default configuration.
    pub fn new() -> Self {
        Self::with_config(LayerConfig::default())
    }

    /// Create a channel layer with the given configuration.
    pub fn with_config(config: LayerConfig) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
            next_channel_id: AtomicU64::new(1),
            dropped: AtomicU64::new(0),
            config,
        }
    }

    /// Open a new channel and return its name and mailbox.
    pub async fn new_channel(&self) -> (String, Mailbox) {
        let id = self.next_channel_id.fetch_add(1, Ordering::SeqCst);
        let name = format!("{}{}", CHANNEL_PREFIX, id);
        let (tx, rx) = mpsc::channel(self.config.capacity);

        self.channels.write().await.insert(name.clone(), tx);
        debug!(channel = %name, "channel opened");

        (name, rx)
    }

    /// Add a channel to a group.
    pub async fn group_add(&self, group: &GroupName, channel: &str) -> Result<(), Error> {
        self.check_name(group)?;

        let mut groups = self.groups.write().await;
        groups
            .entry(group.clone())
            .or_default()
            .insert(channel.to_string());

        debug!(group = %group, channel, "channel joined group");
        Ok(())
    }

    /// Remove a channel from a group.
    pub async fn group_discard(&self, group: &GroupName, channel: &str) -> Result<(), Error> {
        self.check_name(group)?;

        let mut groups = self.groups.write().await;
        if let Some(members) = groups.get_mut(group) {
            members.remove(channel);
            if members.is_empty() {
                groups.remove(group);
            }
        }

        debug!(group = %group, channel, "channel left group");
        Ok(())
    }

    /// Close a channel and remove it from every group.
    pub async fn discard_channel(&self, channel: &str) {
        self.channels.write().await.remove(channel);

        let mut groups = self.groups.write().await;
        groups.retain(|_, members| {
            members.remove(channel);
            !members.is_empty()
        });

        debug!(channel, "channel closed");
    }

    /// Get the members of a group.
    pub async fn group_members(&self, group: &GroupName) -> Vec<String> {
        let groups = self.groups.read().await;
        groups
            .get(group)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Get the number of groups with at least one member.
    pub async fn group_count(&self) -> usize {
        self.groups.read().await.len()
    }

    /// Get the number of open channels.
    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }

    /// Get the number of copies dropped on full or closed mailboxes.
    pub fn dropped_messages(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn check_name(&self, group: &GroupName) -> Result<(), Error> {
        if self.config.validate_names {
            group.validate()?;
        }
        Ok(())
    }

    async fn deliver(&self, group: &GroupName, message: BroadcastMessage) -> Result<(), Error> {
        self.check_name(group)?;

        let members = self.group_members(group).await;
        if members.is_empty() {
            debug!(group = %group, "group has no members");
            return Ok(());
        }

        let channels = self.channels.read().await;
        for member in &members {
            let Some(tx) = channels.get(member) else {
                debug!(group = %group, channel = %member, "member has no open channel");
                continue;
            };

            match tx.try_send(message.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(group = %group, channel = %member, "channel full, dropping message");
                }
                Err(TrySendError::Closed(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    debug!(group = %group, channel = %member, "channel closed, dropping message");
                }
            }
        }

        tracing::trace!(group = %group, members = members.len(), "group send");
        Ok(())
    }
}

impl Default for InMemoryChannelLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl GroupTransport for InMemoryChannelLayer {
    async fn group_send(
        &self,
        destination: &GroupName,
        message: BroadcastMessage,
    ) -> Result<(), Error> {
        self.deliver(destination, message).await
    }
}

/// Shared channel layer handle.
pub type SharedChannelLayer = Arc<InMemoryChannelLayer>;
