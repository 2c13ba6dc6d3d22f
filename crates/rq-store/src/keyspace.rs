//! Redis key layout used by RQ, and a registry of alternative layouts.
//!
//! RQ deployments may subclass its worker, queue and job types with
//! different key prefixes. Rather than loading those classes, the
//! exporter selects a layout by name from a [`KeyspaceRegistry`] that is
//! populated at startup.

use std::collections::BTreeMap;

use crate::error::{StoreError, StoreResult};

/// Name of the stock RQ layout.
pub const DEFAULT_KEYSPACE: &str = "rq";

/// Key prefixes for worker records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerKeyspace {
    /// Prefix of each worker hash (`rq:worker:<name>`).
    pub worker_prefix: String,
    /// Set holding every registered worker key.
    pub workers_key: String,
}

impl Default for WorkerKeyspace {
    fn default() -> Self {
        Self {
            worker_prefix: "rq:worker:".to_string(),
            workers_key: "rq:workers".to_string(),
        }
    }
}

impl WorkerKeyspace {
    /// Strip the worker prefix from a key, rejecting foreign keys.
    pub fn worker_name<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.worker_prefix.as_str())
            .filter(|name| !name.is_empty())
    }
}

/// Key prefixes for queues, their registries and jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueKeyspace {
    /// Prefix of each queue list (`rq:queue:<name>`).
    pub queue_prefix: String,
    /// Set holding every known queue key.
    pub queues_key: String,
    /// Prefix of each job hash (`rq:job:<id>`).
    pub job_prefix: String,
    /// Prefix shared by the per-queue registries (`rq:wip:<name>`, ...).
    pub registry_prefix: String,
}

impl Default for QueueKeyspace {
    fn default() -> Self {
        Self {
            queue_prefix: "rq:queue:".to_string(),
            queues_key: "rq:queues".to_string(),
            job_prefix: "rq:job:".to_string(),
            registry_prefix: "rq:".to_string(),
        }
    }
}

impl QueueKeyspace {
    pub fn queue_key(&self, queue: &str) -> String {
        format!("{}{queue}", self.queue_prefix)
    }

    /// Strip the queue prefix from a key, rejecting foreign keys.
    pub fn queue_name<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.queue_prefix.as_str())
            .filter(|name| !name.is_empty())
    }

    pub fn job_key(&self, id: &str) -> String {
        format!("{}{id}", self.job_prefix)
    }

    pub fn started_registry(&self, queue: &str) -> String {
        format!("{}wip:{queue}", self.registry_prefix)
    }

    pub fn finished_registry(&self, queue: &str) -> String {
        format!("{}finished:{queue}", self.registry_prefix)
    }

    pub fn failed_registry(&self, queue: &str) -> String {
        format!("{}failed:{queue}", self.registry_prefix)
    }

    pub fn deferred_registry(&self, queue: &str) -> String {
        format!("{}deferred:{queue}", self.registry_prefix)
    }

    pub fn scheduled_registry(&self, queue: &str) -> String {
        format!("{}scheduled:{queue}", self.registry_prefix)
    }
}

/// Maps configuration keys to known worker and queue layouts.
#[derive(Debug, Clone, Default)]
pub struct KeyspaceRegistry {
    workers: BTreeMap<String, WorkerKeyspace>,
    queues: BTreeMap<String, QueueKeyspace>,
}

impl KeyspaceRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the stock `rq` layout and the `custom` layout
    /// (`rq:custom:worker:`, `rq:custom:queue:`, `rq:custom:job:`).
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.workers.insert(DEFAULT_KEYSPACE.to_string(), WorkerKeyspace::default());
        registry.queues.insert(DEFAULT_KEYSPACE.to_string(), QueueKeyspace::default());
        registry.workers.insert(
            "custom".to_string(),
            WorkerKeyspace {
                worker_prefix: "rq:custom:worker:".to_string(),
                ..WorkerKeyspace::default()
            },
        );
        registry.queues.insert(
            "custom".to_string(),
            QueueKeyspace {
                queue_prefix: "rq:custom:queue:".to_string(),
                job_prefix: "rq:custom:job:".to_string(),
                ..QueueKeyspace::default()
            },
        );
        registry
    }

    /// Register a worker layout. Registering a key twice is an error.
    pub fn register_worker(&mut self, key: &str, keyspace: WorkerKeyspace) -> StoreResult<()> {
        if self.workers.contains_key(key) {
            return Err(StoreError::Config(format!(
                "worker keyspace already registered: {key}"
            )));
        }
        self.workers.insert(key.to_string(), keyspace);
        Ok(())
    }

    /// Register a queue layout. Registering a key twice is an error.
    pub fn register_queue(&mut self, key: &str, keyspace: QueueKeyspace) -> StoreResult<()> {
        if self.queues.contains_key(key) {
            return Err(StoreError::Config(format!(
                "queue keyspace already registered: {key}"
            )));
        }
        self.queues.insert(key.to_string(), keyspace);
        Ok(())
    }

    /// Look up a worker layout; `None` selects the stock layout.
    pub fn worker(&self, key: Option<&str>) -> StoreResult<WorkerKeyspace> {
        let key = key.unwrap_or(DEFAULT_KEYSPACE);
        self.workers.get(key).cloned().ok_or_else(|| {
            StoreError::Config(format!(
                "unknown worker keyspace: {key} (known: {})",
                join_keys(self.workers.keys())
            ))
        })
    }

    /// Look up a queue layout; `None` selects the stock layout.
    pub fn queue(&self, key: Option<&str>) -> StoreResult<QueueKeyspace> {
        let key = key.unwrap_or(DEFAULT_KEYSPACE);
        self.queues.get(key).cloned().ok_or_else(|| {
            StoreError::Config(format!(
                "unknown queue keyspace: {key} (known: {})",
                join_keys(self.queues.keys())
            ))
        })
    }
}

fn join_keys<'a>(keys: impl Iterator<Item = &'a String>) -> String {
    keys.map(String::as_str).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_matches_rq() {
        let q = QueueKeyspace::default();
        assert_eq!(q.queue_key("default"), "rq:queue:default");
        assert_eq!(q.job_key("abc"), "rq:job:abc");
        assert_eq!(q.started_registry("default"), "rq:wip:default");
        assert_eq!(q.finished_registry("default"), "rq:finished:default");
        assert_eq!(q.failed_registry("default"), "rq:failed:default");
        assert_eq!(q.deferred_registry("default"), "rq:deferred:default");
        assert_eq!(q.scheduled_registry("default"), "rq:scheduled:default");
    }

    #[test]
    fn names_are_stripped_from_matching_keys_only() {
        let w = WorkerKeyspace::default();
        assert_eq!(w.worker_name("rq:worker:alpha"), Some("alpha"));
        assert_eq!(w.worker_name("rq:custom:worker:alpha"), None);
        assert_eq!(w.worker_name("rq:worker:"), None);

        let q = QueueKeyspace::default();
        assert_eq!(q.queue_name("rq:queue:high"), Some("high"));
        assert_eq!(q.queue_name("rq:custom:queue:high"), None);
    }

    #[test]
    fn builtins_resolve_by_key() {
        let registry = KeyspaceRegistry::with_builtins();
        assert_eq!(registry.worker(None).unwrap(), WorkerKeyspace::default());
        assert_eq!(
            registry.worker(Some("custom")).unwrap().worker_prefix,
            "rq:custom:worker:"
        );
        let custom = registry.queue(Some("custom")).unwrap();
        assert_eq!(custom.queue_prefix, "rq:custom:queue:");
        assert_eq!(custom.job_prefix, "rq:custom:job:");
        assert_eq!(custom.queues_key, "rq:queues");
    }

    #[test]
    fn unknown_key_is_config_error() {
        let registry = KeyspaceRegistry::with_builtins();
        let err = registry.queue(Some("acme")).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("acme"));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = KeyspaceRegistry::with_builtins();
        let err = registry
            .register_worker("rq", WorkerKeyspace::default())
            .unwrap_err();
        assert!(err.is_config());

        registry
            .register_queue(
                "acme",
                QueueKeyspace {
                    queue_prefix: "acme:queue:".to_string(),
                    ..QueueKeyspace::default()
                },
            )
            .unwrap();
        assert_eq!(
            registry.queue(Some("acme")).unwrap().queue_key("x"),
            "acme:queue:x"
        );
    }
}
