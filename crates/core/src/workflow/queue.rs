//! # Target Queue
//!
//! FIFO of container names awaiting component-level generation.
//!
//! The queue distinguishes *uninitialized* (the container definition has not
//! been consumed yet) from *initialized and empty* (all targets done, or none
//! discovered). The router relies on that difference to decide between
//! populating the queue and terminating, so the inner state is private and
//! only changes through [`TargetQueue::populate`] and
//! [`TargetQueue::complete_current`].

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::state::schema::StructuredDefinition;

/// Whether any component targets remain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    HasWork,
    Done,
}

/// Queue of component-level targets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetQueue {
    pending: Option<VecDeque<String>>,
}

impl TargetQueue {
    /// A queue that has not been populated yet
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.pending.is_some()
    }

    /// Build the queue from the container-level structured definition.
    ///
    /// Container elements are queued in discovery order, without duplicates.
    /// Elements that do not fit the schema are skipped individually; only a
    /// definition that is not YAML at all yields an empty (initialized) queue.
    /// The queue is populated at most once; later calls leave it unchanged.
    /// Returns the number of targets queued by this call.
    pub fn populate(&mut self, container_definition: &str) -> usize {
        if self.is_initialized() {
            tracing::warn!("Target queue already populated, ignoring repopulation");
            return 0;
        }

        let names = match StructuredDefinition::scan_container_names(container_definition) {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!("Could not read containers for the target queue: {}", e);
                Vec::new()
            }
        };

        let mut pending = VecDeque::with_capacity(names.len());
        for name in names {
            if pending.contains(&name) {
                tracing::warn!(container = %name, "Duplicate container name, queued once");
                continue;
            }
            pending.push_back(name);
        }

        tracing::info!(targets = ?pending, "Target queue populated");
        let count = pending.len();
        self.pending = Some(pending);
        count
    }

    /// The target currently being generated (front of the queue)
    pub fn current(&self) -> Option<&str> {
        self.pending
            .as_ref()
            .and_then(|q| q.front())
            .map(String::as_str)
    }

    /// Pop the finished target. No-op on an empty or uninitialized queue.
    pub fn complete_current(&mut self) -> Option<String> {
        let finished = self.pending.as_mut().and_then(VecDeque::pop_front);
        if let Some(name) = &finished {
            tracing::info!(container = %name, remaining = self.len(), "Target completed");
        }
        finished
    }

    pub fn status(&self) -> QueueStatus {
        if self.len() > 0 {
            QueueStatus::HasWork
        } else {
            QueueStatus::Done
        }
    }

    /// Number of targets still waiting (including the current one)
    pub fn len(&self) -> usize {
        self.pending.as_ref().map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Targets still waiting, front first
    pub fn remaining(&self) -> impl Iterator<Item = &str> {
        self.pending.iter().flatten().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container_yaml(names: &[&str]) -> String {
        let mut yaml = String::from("level: container\nelements:\n  - type: person\n    name: Customer\n");
        for name in names {
            yaml.push_str(&format!("  - type: container\n    name: \"{}\"\n", name));
        }
        yaml
    }

    #[test]
    fn test_new_queue_is_uninitialized() {
        let queue = TargetQueue::new();
        assert!(!queue.is_initialized());
        assert_eq!(queue.status(), QueueStatus::Done);
        assert_eq!(queue.current(), None);
    }

    #[test]
    fn test_populate_in_discovery_order() {
        let mut queue = TargetQueue::new();
        let count = queue.populate(&container_yaml(&["Web App", "Booking API", "Database"]));

        assert_eq!(count, 3);
        assert!(queue.is_initialized());
        assert_eq!(queue.current(), Some("Web App"));
        assert_eq!(
            queue.remaining().collect::<Vec<_>>(),
            vec!["Web App", "Booking API", "Database"]
        );
        assert_eq!(queue.status(), QueueStatus::HasWork);
    }

    #[test]
    fn test_drain_then_noop() {
        let mut queue = TargetQueue::new();
        let n = queue.populate(&container_yaml(&["A", "B", "C"]));

        for expected in ["A", "B", "C"].iter().take(n) {
            assert_eq!(queue.complete_current().as_deref(), Some(*expected));
        }
        assert_eq!(queue.status(), QueueStatus::Done);
        assert!(queue.is_initialized());

        assert_eq!(queue.complete_current(), None);
        assert_eq!(queue.status(), QueueStatus::Done);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_malformed_definition_yields_empty_initialized_queue() {
        let mut queue = TargetQueue::new();
        assert_eq!(queue.populate("elements: [not: valid"), 0);

        assert!(queue.is_initialized());
        assert_eq!(queue.status(), QueueStatus::Done);
    }

    #[test]
    fn test_unknown_element_kinds_do_not_hide_containers() {
        let yaml = r#"
level: container
elements:
  - type: container
    name: Web App
  - type: database
    name: Bookings DB
  - type: container
    name: Booking API
"#;
        let mut queue = TargetQueue::new();

        assert_eq!(queue.populate(yaml), 2);
        assert_eq!(
            queue.remaining().collect::<Vec<_>>(),
            vec!["Web App", "Booking API"]
        );
    }

    #[test]
    fn test_lenient_level_tag_and_unnamed_entries() {
        let yaml = r#"
level: Container
elements:
  - type: Container
    name: Worker
  - type: container
    description: no name given
  - type: unit
    name: " Gateway "
"#;
        let mut queue = TargetQueue::new();

        assert_eq!(queue.populate(yaml), 2);
        assert_eq!(queue.remaining().collect::<Vec<_>>(), vec!["Worker", "Gateway"]);
    }

    #[test]
    fn test_prose_definition_yields_empty_initialized_queue() {
        let mut queue = TargetQueue::new();
        assert_eq!(queue.populate("The system has a web app and an API."), 0);
        assert!(queue.is_initialized());
    }

    #[test]
    fn test_no_containers_yields_done() {
        let mut queue = TargetQueue::new();
        assert_eq!(queue.populate(&container_yaml(&[])), 0);
        assert!(queue.is_initialized());
        assert_eq!(queue.status(), QueueStatus::Done);
    }

    #[test]
    fn test_populate_only_once() {
        let mut queue = TargetQueue::new();
        queue.populate(&container_yaml(&["A"]));
        queue.complete_current();

        assert_eq!(queue.populate(&container_yaml(&["B", "C"])), 0);
        assert_eq!(queue.status(), QueueStatus::Done);
    }

    #[test]
    fn test_duplicates_queued_once() {
        let mut queue = TargetQueue::new();
        assert_eq!(queue.populate(&container_yaml(&["API", "Web", "API"])), 2);
        assert_eq!(queue.remaining().collect::<Vec<_>>(), vec!["API", "Web"]);
    }

    #[test]
    fn test_complete_on_uninitialized_is_noop() {
        let mut queue = TargetQueue::new();
        assert_eq!(queue.complete_current(), None);
        assert!(!queue.is_initialized());
    }
}
