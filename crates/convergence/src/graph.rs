//! Notification graph - explicit edges from triggers to targets
//!
//! Notifications are a side channel over the declaration-order walk, not a
//! topological reordering, so no general cycle analysis happens here. The
//! one shape rejected outright is a resource notifying itself: with delayed
//! timing that would re-queue forever.

use crate::error::{Error, Result};
use crate::registry::ResourceRegistry;
use crate::resource::ResourceId;
use crate::types::{Action, NotifyTiming};
use std::collections::HashMap;

/// One notification edge: run `target` with `action` when the source updates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub target: ResourceId,
    pub timing: NotifyTiming,
    pub action: Action,
}

/// Adjacency structure from source resources to their notifications
#[derive(Debug, Default)]
pub struct NotificationGraph {
    edges: HashMap<ResourceId, Vec<Notification>>,
    len: usize,
}

impl NotificationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an edge; rejects self-notification
    pub fn add(&mut self, source: ResourceId, notification: Notification) -> Result<()> {
        if source == notification.target {
            return Err(Error::NotificationCycle { resource: source });
        }
        self.edges.entry(source).or_default().push(notification);
        self.len += 1;
        Ok(())
    }

    /// Edges registered against a source, in registration order
    pub fn notifications_for(&self, source: &ResourceId) -> &[Notification] {
        self.edges.get(source).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Check that every edge endpoint names a registered resource
    pub fn validate(&self, registry: &ResourceRegistry) -> Result<()> {
        for (source, notifications) in &self.edges {
            registry.lookup(source)?;
            for notification in notifications {
                registry.lookup(&notification.target)?;
            }
        }
        Ok(())
    }

    /// All edges as (source, notification) pairs, grouped by source
    pub fn iter(&self) -> impl Iterator<Item = (&ResourceId, &Notification)> {
        self.edges
            .iter()
            .flat_map(|(source, notifications)| notifications.iter().map(move |n| (source, n)))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
