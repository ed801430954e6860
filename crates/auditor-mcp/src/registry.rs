//! Flat tool namespace across all connected workers.
//!
//! The registry is populated once at session start from each worker's
//! discovery response and is the single lookup point for dispatch: a tool
//! name resolves to the bridge that owns it. Name collisions across workers
//! are explicit errors with first-registration-wins semantics; a later
//! worker can never silently shadow an earlier one.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use auditor_core::AgentEvent;

use crate::bridge::WorkerBridge;
use crate::config::WorkerConfig;
use crate::error::RegistryError;
use crate::schema::ToolDescriptor;

struct RegisteredTool {
    worker: String,
    descriptor: ToolDescriptor,
}

/// Single lookup namespace over every successfully connected worker.
#[derive(Default)]
pub struct ToolRegistry {
    workers: HashMap<String, Arc<WorkerBridge>>,
    tools: HashMap<String, RegisteredTool>,
    // Registration order, so the catalogue is stable across turns.
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a worker's descriptors to the namespace. Collisions are returned
    /// (and logged) rather than applied: the existing registration stays.
    pub fn register(
        &mut self,
        bridge: Arc<WorkerBridge>,
        descriptors: Vec<ToolDescriptor>,
    ) -> Vec<RegistryError> {
        let worker = bridge.name().to_string();
        self.workers.insert(worker.clone(), bridge);

        let mut collisions = Vec::new();
        for descriptor in descriptors {
            if let Some(existing) = self.tools.get(&descriptor.name) {
                let collision = RegistryError::DuplicateTool {
                    tool: descriptor.name.clone(),
                    worker: worker.clone(),
                    existing: existing.worker.clone(),
                };
                tracing::warn!("{collision}; keeping the first registration");
                collisions.push(collision);
                continue;
            }
            self.order.push(descriptor.name.clone());
            self.tools.insert(
                descriptor.name.clone(),
                RegisteredTool {
                    worker: worker.clone(),
                    descriptor,
                },
            );
        }
        collisions
    }

    /// Resolve a tool name to its owning bridge and descriptor.
    pub fn resolve(&self, name: &str) -> Option<(Arc<WorkerBridge>, &ToolDescriptor)> {
        let registered = self.tools.get(name)?;
        let bridge = self.workers.get(&registered.worker)?;
        Some((Arc::clone(bridge), &registered.descriptor))
    }

    /// Snapshot of the catalogue exposed to the decision client. Reflects
    /// only successfully connected workers, in registration order.
    pub fn describe_all(&self) -> Vec<ToolDescriptor> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|registered| registered.descriptor.clone())
            .collect()
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Terminate every worker. Safe to call even for bridges that never
    /// completed startup, and safe to call more than once.
    pub async fn shutdown_all(&self) {
        for bridge in self.workers.values() {
            bridge.shutdown().await;
        }
    }
}

/// Spawn every enabled worker from the roster and build the registry.
///
/// A worker that fails to spawn, handshake or answer discovery contributes
/// zero entries; the failure is logged and surfaced as an event, and the
/// session continues with the remaining tools.
pub async fn connect_workers(
    configs: &BTreeMap<String, WorkerConfig>,
    events: &UnboundedSender<AgentEvent>,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    for (name, config) in configs {
        if !config.enabled {
            continue;
        }
        let bridge = match WorkerBridge::spawn(name, config).await {
            Ok(bridge) => Arc::new(bridge),
            Err(e) => {
                tracing::warn!("skipping worker '{name}': {e}");
                let _ = events.send(AgentEvent::WorkerFailed {
                    worker: name.clone(),
                    error: e.to_string(),
                });
                continue;
            }
        };
        let records = match bridge.list_tools().await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("discovery failed for worker '{name}': {e}");
                let _ = events.send(AgentEvent::WorkerFailed {
                    worker: name.clone(),
                    error: e.to_string(),
                });
                bridge.shutdown().await;
                continue;
            }
        };

        let descriptors: Vec<ToolDescriptor> = records
            .iter()
            .map(|record| ToolDescriptor::from_record(name, record))
            .collect();
        let declared = descriptors.len();
        let collisions = registry.register(bridge, descriptors);
        for collision in &collisions {
            if let RegistryError::DuplicateTool { tool, .. } = collision {
                let _ = events.send(AgentEvent::ToolCollision {
                    worker: name.clone(),
                    tool: tool.clone(),
                });
            }
        }
        let _ = events.send(AgentEvent::WorkerConnected {
            worker: name.clone(),
            tool_count: declared - collisions.len(),
        });
        tracing::info!(
            "connected worker '{name}' ({} tools)",
            declared - collisions.len()
        );
    }

    registry
}
