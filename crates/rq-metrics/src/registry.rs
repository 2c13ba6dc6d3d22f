//! The long-lived registry every scrape is served from.

use std::collections::BTreeSet;

use prometheus::proto::MetricFamily;
use prometheus::{Encoder, Registry, TextEncoder};
use tracing::{debug, info};

use crate::collector::MetricSource;
use crate::error::{CollectError, CollectResult};

/// Owns the registered [`MetricSource`]s and a prometheus [`Registry`]
/// holding process-level metrics such as the collection timer.
///
/// Built once at startup and shared by `Arc`; registration happens before
/// the registry is shared.
pub struct MetricsRegistry {
    registry: Registry,
    sources: Vec<Box<dyn MetricSource>>,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            sources: Vec::new(),
        }
    }

    /// The underlying prometheus registry, for registering self-metrics.
    pub fn prometheus(&self) -> &Registry {
        &self.registry
    }

    /// Add a source after checking its family names are unused, then run
    /// one collection so a broken store fails at startup.
    pub fn register(&mut self, source: Box<dyn MetricSource>) -> CollectResult<()> {
        let known = self.known_names();
        let names = source.family_names();
        if let Some(dup) = names.iter().find(|name| known.contains(*name)) {
            return Err(CollectError::DuplicateFamily(dup.clone()));
        }

        let families = source.collect()?;
        info!(
            families = families.len(),
            "metric source registered"
        );
        self.sources.push(source);
        Ok(())
    }

    fn known_names(&self) -> BTreeSet<String> {
        self.sources
            .iter()
            .flat_map(|s| s.family_names())
            .chain(
                self.registry
                    .gather()
                    .into_iter()
                    .map(|f| f.get_name().to_string()),
            )
            .collect()
    }

    /// Run every source and merge with the registry's own metrics.
    ///
    /// Any source error fails the whole gather; nothing partial is returned.
    pub fn gather(&self) -> CollectResult<Vec<MetricFamily>> {
        let mut families = Vec::new();
        for source in &self.sources {
            families.extend(source.collect()?);
        }
        families.extend(self.registry.gather());
        families.retain(|f| !f.get_metric().is_empty());
        families.sort_by(|a, b| a.get_name().cmp(b.get_name()));
        debug!(families = families.len(), "metrics gathered");
        Ok(families)
    }

    /// Prometheus text exposition of [`gather`](Self::gather).
    pub fn render(&self) -> CollectResult<String> {
        let families = self.gather()?;
        let mut buf = Vec::new();
        TextEncoder::new().encode(&families, &mut buf)?;
        String::from_utf8(buf).map_err(|e| CollectError::Encode(e.to_string()))
    }
}
