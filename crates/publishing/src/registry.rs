//! Channel name → adapter lookup with a guaranteed Manual fallback.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::adapter::ChannelAdapter;
use crate::channel::Channel;
use crate::manual::ManualAdapter;

/// Result of resolving a channel.
#[derive(Clone)]
pub struct ResolvedAdapter {
    pub adapter: Arc<dyn ChannelAdapter>,
    /// True when the Manual fallback was used instead of a channel-specific adapter.
    pub fallback: bool,
}

impl ResolvedAdapter {
    /// Whether this adapter only supports the approval (packaging) path.
    pub fn is_manual(&self) -> bool {
        self.adapter.channel().eq_ignore_ascii_case(Channel::MANUAL)
    }
}

impl core::fmt::Debug for ResolvedAdapter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ResolvedAdapter")
            .field("channel", &self.adapter.channel())
            .field("fallback", &self.fallback)
            .finish()
    }
}

/// Registry of channel adapters.
///
/// The Manual adapter is always present and serves every channel that has no
/// registered adapter, or whose adapter reports it cannot publish.
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn ChannelAdapter>>,
    fallback: Arc<dyn ChannelAdapter>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        let fallback: Arc<dyn ChannelAdapter> = Arc::new(ManualAdapter::new());
        let mut adapters = HashMap::new();
        adapters.insert(Channel::MANUAL.to_ascii_lowercase(), fallback.clone());
        Self { adapters, fallback }
    }

    /// Register (or replace) the adapter for its channel.
    pub fn register(&mut self, adapter: Arc<dyn ChannelAdapter>) {
        self.adapters
            .insert(adapter.channel().to_ascii_lowercase(), adapter);
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn ChannelAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn resolve(&self, channel: &Channel) -> ResolvedAdapter {
        match self.adapters.get(&channel.key()) {
            Some(adapter) if adapter.can_publish() => ResolvedAdapter {
                adapter: adapter.clone(),
                fallback: false,
            },
            Some(_) => {
                debug!(channel = %channel, "adapter cannot publish; falling back to manual");
                self.fallback_for()
            }
            None => {
                debug!(channel = %channel, "no adapter registered; falling back to manual");
                self.fallback_for()
            }
        }
    }

    fn fallback_for(&self) -> ResolvedAdapter {
        ResolvedAdapter {
            adapter: self.fallback.clone(),
            fallback: true,
        }
    }

    /// Registered channel names, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .adapters
            .values()
            .map(|a| a.channel().to_string())
            .collect();
        names.sort();
        names
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
