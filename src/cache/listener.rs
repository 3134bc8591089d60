use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::cache::{AssignmentIndex, AssignmentService};
use crate::config::Config;

/// Payload-less signal that a sibling entity store finished a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    SubjectsChanged,
    TeachersChanged,
    GroupsChanged,
    ClassroomsChanged,
}

impl Topic {
    pub const ALL: [Topic; 4] = [
        Topic::SubjectsChanged,
        Topic::TeachersChanged,
        Topic::GroupsChanged,
        Topic::ClassroomsChanged,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Topic::SubjectsChanged => "subjects-changed",
            Topic::TeachersChanged => "teachers-changed",
            Topic::GroupsChanged => "groups-changed",
            Topic::ClassroomsChanged => "classrooms-changed",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fan-out of [`Topic`] signals to every subscriber.
#[derive(Debug, Clone)]
pub struct ChangeBus {
    tx: broadcast::Sender<Topic>,
}

impl ChangeBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.bus_capacity)
    }

    /// Returns how many subscribers will see the signal; zero is not an error.
    pub fn publish(&self, topic: Topic) -> usize {
        let receivers = self.tx.send(topic).unwrap_or(0);
        tracing::debug!(%topic, receivers, "change published");
        receivers
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Topic> {
        self.tx.subscribe()
    }
}

/// Reloads the index whenever a sibling entity changes.
///
/// Every signal costs one full load. There is no per-subject or per-teacher
/// dependency tracking.
pub struct InvalidationListener<S> {
    service: Arc<S>,
    index: Arc<AssignmentIndex>,
    rx: broadcast::Receiver<Topic>,
}

impl<S: AssignmentService + 'static> InvalidationListener<S> {
    /// Subscribes immediately, so signals published after this call are not missed.
    pub fn new(bus: &ChangeBus, service: Arc<S>, index: Arc<AssignmentIndex>) -> Self {
        Self {
            service,
            index,
            rx: bus.subscribe(),
        }
    }

    /// Runs until every bus handle is dropped. Returns the number of reloads issued.
    pub async fn run(mut self) -> usize {
        let mut reloads = 0;
        loop {
            match self.rx.recv().await {
                Ok(topic) => {
                    self.reload(topic.name()).await;
                    reloads += 1;
                }
                // Missed signals all mean the same thing: reload once.
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "invalidation listener lagged");
                    self.reload("lagged").await;
                    reloads += 1;
                }
                Err(RecvError::Closed) => break,
            }
        }
        tracing::debug!(reloads, "invalidation listener stopped");
        reloads
    }

    pub fn spawn(self) -> JoinHandle<usize> {
        tokio::spawn(self.run())
    }

    async fn reload(&self, cause: &str) {
        self.index.mark_stale();
        if let Err(e) = self.index.load(self.service.as_ref()).await {
            tracing::warn!(cause, error = %e, "reload after invalidation failed; keeping previous snapshot");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::testing::{record, FakeService};
    use crate::cache::{CacheKey, Day, IndexState};

    async fn setup(capacity: usize) -> (ChangeBus, Arc<FakeService>, Arc<AssignmentIndex>) {
        let service = Arc::new(FakeService::with_records(vec![record(
            1,
            2,
            Day::Monday,
            0,
            9,
            4,
            "MAT",
            "#fff",
        )]));
        let index = Arc::new(AssignmentIndex::new());
        index.load(service.as_ref()).await.expect("initial load");
        (ChangeBus::new(capacity), service, index)
    }

    #[tokio::test]
    async fn each_signal_issues_exactly_one_load() {
        let (bus, service, index) = setup(8).await;
        let listener = InvalidationListener::new(&bus, Arc::clone(&service), Arc::clone(&index));

        assert_eq!(bus.publish(Topic::SubjectsChanged), 1);
        drop(bus);

        let reloads = listener.run().await;
        assert_eq!(reloads, 1);
        assert_eq!(service.fetches(), 2);
        assert_eq!(index.state(), IndexState::Loaded);
    }

    #[tokio::test]
    async fn subject_change_refreshes_denormalized_color() {
        let (bus, service, index) = setup(8).await;
        let key = CacheKey::new(2, Day::Monday, 0);
        let handle = InvalidationListener::new(&bus, Arc::clone(&service), Arc::clone(&index)).spawn();

        service.recolor_subject(9, "#f00");
        assert_eq!(index.get(&key).map(|e| e.subject_color), Some("#fff".to_string()));
        bus.publish(Topic::SubjectsChanged);
        drop(bus);

        assert_eq!(handle.await.expect("listener task"), 1);
        assert_eq!(index.get(&key).map(|e| e.subject_color), Some("#f00".to_string()));
    }

    #[tokio::test]
    async fn every_topic_triggers_a_reload() {
        let (bus, service, index) = setup(8).await;
        let listener = InvalidationListener::new(&bus, Arc::clone(&service), index);
        for topic in Topic::ALL {
            bus.publish(topic);
        }
        drop(bus);

        assert_eq!(listener.run().await, 4);
        assert_eq!(service.fetches(), 5);
    }

    #[tokio::test]
    async fn lagged_receiver_reloads_once_for_missed_signals() {
        let (bus, service, index) = setup(1).await;
        let listener = InvalidationListener::new(&bus, Arc::clone(&service), index);
        bus.publish(Topic::TeachersChanged);
        bus.publish(Topic::GroupsChanged);
        bus.publish(Topic::ClassroomsChanged);
        drop(bus);

        // Two signals overflowed the buffer of one: one lag reload plus the one kept.
        assert_eq!(listener.run().await, 2);
        assert_eq!(service.fetches(), 3);
    }

    #[tokio::test]
    async fn failed_reload_keeps_snapshot_and_listener_alive() {
        let (bus, service, index) = setup(8).await;
        let listener = InvalidationListener::new(&bus, Arc::clone(&service), Arc::clone(&index));
        service.fail_fetch(true);
        bus.publish(Topic::GroupsChanged);
        bus.publish(Topic::GroupsChanged);
        drop(bus);

        assert_eq!(listener.run().await, 2);
        assert_eq!(index.state(), IndexState::Stale);
        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn configured_capacity_bounds_the_buffer() {
        let config = Config {
            bus_capacity: 2,
            ..Config::default()
        };
        let bus = ChangeBus::from_config(&config);
        let mut rx = bus.subscribe();
        for topic in Topic::ALL {
            bus.publish(topic);
        }
        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(2))));
        assert_eq!(rx.recv().await.ok(), Some(Topic::GroupsChanged));
    }

    #[test]
    fn topic_names_match_wire_form() {
        for topic in Topic::ALL {
            let wire = serde_json::to_value(topic).expect("encode");
            assert_eq!(wire, serde_json::json!(topic.name()));
        }
    }
}
