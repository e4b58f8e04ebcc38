//! Project snapshots: the immutable result of executing a cell prefix.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use serde::Serialize;
use uuid::Uuid;

use super::pool::{InstancePool, Resource, ResourceId, ResourceKind};

/// Id of the root workflow of every project.
pub const MAIN_WORKFLOW_ID: &str = "main";

/// A module instantiated in the main workflow.
#[derive(Debug, Clone)]
pub struct ModuleInstance {
    pub id: String,
    pub toolbox: String,
    pub kind: String,
    /// Live resource running this module.
    pub resource: ResourceId,
}

/// A connection between two modules of the main workflow.
#[derive(Debug, Clone)]
pub struct Connection {
    pub from: String,
    pub to: String,
    /// Subscription carrying data along the connection.
    pub resource: ResourceId,
}

/// The root workflow: modules and their connections.
#[derive(Debug, Clone)]
pub struct Workflow {
    pub id: String,
    pub modules: Vec<ModuleInstance>,
    pub connections: Vec<Connection>,
}

impl Default for Workflow {
    fn default() -> Self {
        Self {
            id: MAIN_WORKFLOW_ID.to_string(),
            modules: Vec::new(),
            connections: Vec::new(),
        }
    }
}

/// A reusable group of modules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroDef {
    pub id: String,
    pub modules: Vec<String>,
}

/// A named view bound to a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    pub name: String,
    pub module: String,
}

/// A named pool of workers.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    pub name: String,
    pub workers: Vec<ResourceId>,
}

/// A named sub-workflow running in its own instance pool.
#[derive(Debug, Clone)]
pub struct Worksheet {
    pub name: String,
    pub modules: Vec<String>,
    pub pool: InstancePool,
}

impl Worksheet {
    /// A worksheet is running while any of its resources is.
    pub fn is_running(&self) -> bool {
        self.pool.running_count() > 0
    }
}

/// Toolboxes loaded into the project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    pub toolboxes: Vec<String>,
}

/// The workflow project after executing a prefix of cells.
///
/// Snapshots are shared as `Arc<ProjectSnapshot>` and never mutated once
/// published; execution derives a new snapshot with [`ProjectSnapshot::fork`].
#[derive(Debug, Clone)]
pub struct ProjectSnapshot {
    id: Uuid,
    pub workflow: Workflow,
    pub macros: Vec<MacroDef>,
    pub views: Vec<View>,
    pub worker_pools: Vec<WorkerPool>,
    pub worksheets: Vec<Worksheet>,
    pub environment: Environment,
    pub pool: InstancePool,
    /// Resources dropped while this snapshot was a draft. Always empty once
    /// published.
    retired: InstancePool,
}

impl Default for ProjectSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl ProjectSnapshot {
    /// The canonical empty project.
    pub fn empty() -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow: Workflow::default(),
            macros: Vec::new(),
            views: Vec::new(),
            worker_pools: Vec::new(),
            worksheets: Vec::new(),
            environment: Environment::default(),
            pool: InstancePool::new(),
            retired: InstancePool::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Copy this snapshot under a fresh identity, sharing all resources.
    pub fn fork(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            retired: InstancePool::new(),
            ..self.clone()
        }
    }

    pub fn module(&self, id: &str) -> Option<&ModuleInstance> {
        self.workflow.modules.iter().find(|m| m.id == id)
    }

    pub fn has_macro(&self, id: &str) -> bool {
        self.macros.iter().any(|m| m.id == id)
    }

    pub fn view(&self, name: &str) -> Option<&View> {
        self.views.iter().find(|v| v.name == name)
    }

    pub fn worksheet(&self, name: &str) -> Option<&Worksheet> {
        self.worksheets.iter().find(|w| w.name == name)
    }

    pub fn has_toolbox(&self, name: &str) -> bool {
        self.environment.toolboxes.iter().any(|t| t == name)
    }

    /// Every resource referenced by this snapshot, worksheets included.
    pub fn resource_ids(&self) -> FxHashSet<ResourceId> {
        self.pool
            .ids()
            .chain(self.worksheets.iter().flat_map(|w| w.pool.ids()))
            .collect()
    }

    /// Stop every resource of this snapshot whose id is not in `keep`.
    pub fn stop(&self, keep: &FxHashSet<ResourceId>) -> usize {
        self.pool.stop_except(keep) + self.stop_worksheets(keep)
    }

    /// Stop the worksheets running under this snapshot, sparing `keep`.
    pub fn stop_worksheets(&self, keep: &FxHashSet<ResourceId>) -> usize {
        self.worksheets
            .iter()
            .map(|w| w.pool.stop_except(keep))
            .sum()
    }

    /// Stop the resources this draft dropped, sparing `keep`.
    ///
    /// Resources that were created and dropped within one run appear in no
    /// snapshot, so nothing else would ever stop them.
    pub(crate) fn stop_retired(&mut self, keep: &FxHashSet<ResourceId>) -> usize {
        std::mem::take(&mut self.retired).stop_except(keep)
    }

    fn retire(&mut self, resources: impl IntoIterator<Item = Arc<Resource>>) {
        for resource in resources {
            self.retired.adopt(resource);
        }
    }

    /// Compare everything but resource identities.
    pub fn same_contents(&self, other: &ProjectSnapshot) -> bool {
        let modules = |s: &ProjectSnapshot| -> Vec<(String, String, String)> {
            s.workflow
                .modules
                .iter()
                .map(|m| (m.id.clone(), m.toolbox.clone(), m.kind.clone()))
                .collect()
        };
        let connections = |s: &ProjectSnapshot| -> Vec<(String, String)> {
            s.workflow
                .connections
                .iter()
                .map(|c| (c.from.clone(), c.to.clone()))
                .collect()
        };
        let pools = |s: &ProjectSnapshot| -> Vec<(String, usize)> {
            s.worker_pools
                .iter()
                .map(|p| (p.name.clone(), p.workers.len()))
                .collect()
        };
        let worksheets = |s: &ProjectSnapshot| -> Vec<(String, Vec<String>)> {
            s.worksheets
                .iter()
                .map(|w| (w.name.clone(), w.modules.clone()))
                .collect()
        };

        modules(self) == modules(other)
            && connections(self) == connections(other)
            && self.macros == other.macros
            && self.views == other.views
            && pools(self) == pools(other)
            && worksheets(self) == worksheets(other)
            && self.environment == other.environment
    }

    /// A serializable overview for UIs and the CLI.
    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            id: self.id,
            modules: self
                .workflow
                .modules
                .iter()
                .map(|m| format!("{} ({}/{})", m.id, m.toolbox, m.kind))
                .collect(),
            connections: self
                .workflow
                .connections
                .iter()
                .map(|c| format!("{} -> {}", c.from, c.to))
                .collect(),
            macros: self.macros.iter().map(|m| m.id.clone()).collect(),
            views: self.views.iter().map(|v| v.name.clone()).collect(),
            worker_pools: self
                .worker_pools
                .iter()
                .map(|p| (p.name.clone(), p.workers.len()))
                .collect(),
            worksheets: self
                .worksheets
                .iter()
                .filter(|w| w.is_running())
                .map(|w| w.name.clone())
                .collect(),
            toolboxes: self.environment.toolboxes.clone(),
            running_resources: self.pool.running_count(),
        }
    }

    // =========================================================================
    // Mutations used while a code cell builds its result
    // =========================================================================

    pub(crate) fn install_toolbox(&mut self, toolbox: &str) {
        if !self.has_toolbox(toolbox) {
            self.environment.toolboxes.push(toolbox.to_string());
        }
    }

    pub(crate) fn add_module(&mut self, id: &str, kind: &str) -> Result<(), String> {
        if self.module(id).is_some() {
            return Err(format!("module '{}' already exists", id));
        }
        let (toolbox, kind) = kind
            .split_once('/')
            .filter(|(t, k)| !t.is_empty() && !k.is_empty())
            .ok_or_else(|| format!("module kind '{}' must look like 'toolbox/kind'", kind))?;
        if !self.has_toolbox(toolbox) {
            return Err(format!(
                "toolbox '{}' is not installed; call env.install(\"{}\") first",
                toolbox, toolbox
            ));
        }

        let resource = self.pool.spawn(ResourceKind::Module {
            module_id: id.to_string(),
        });
        self.workflow.modules.push(ModuleInstance {
            id: id.to_string(),
            toolbox: toolbox.to_string(),
            kind: kind.to_string(),
            resource: resource.id(),
        });
        Ok(())
    }

    pub(crate) fn remove_module(&mut self, id: &str) -> Result<(), String> {
        let position = self
            .workflow
            .modules
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| format!("unknown module '{}'", id))?;
        let module = self.workflow.modules.remove(position);

        let mut released: FxHashSet<ResourceId> = FxHashSet::default();
        released.insert(module.resource);
        self.workflow.connections.retain(|c| {
            let touches = c.from == id || c.to == id;
            if touches {
                released.insert(c.resource);
            }
            !touches
        });
        let dropped = self.pool.release(|r| released.contains(&r.id()));
        self.retire(dropped);

        for macro_def in &mut self.macros {
            macro_def.modules.retain(|m| m != id);
        }
        self.views.retain(|v| v.module != id);
        Ok(())
    }

    pub(crate) fn connect(&mut self, from: &str, to: &str) -> Result<(), String> {
        for id in [from, to] {
            if self.module(id).is_none() {
                return Err(format!("unknown module '{}'", id));
            }
        }
        if self
            .workflow
            .connections
            .iter()
            .any(|c| c.from == from && c.to == to)
        {
            return Err(format!("'{}' is already connected to '{}'", from, to));
        }

        let resource = self.pool.spawn(ResourceKind::Subscription {
            from: from.to_string(),
            to: to.to_string(),
        });
        self.workflow.connections.push(Connection {
            from: from.to_string(),
            to: to.to_string(),
            resource: resource.id(),
        });
        Ok(())
    }

    pub(crate) fn define_macro(&mut self, id: &str, modules: Vec<String>) -> Result<(), String> {
        if self.has_macro(id) {
            return Err(format!("macro '{}' already exists", id));
        }
        if modules.is_empty() {
            return Err(format!("macro '{}' needs at least one module", id));
        }
        if let Some(unknown) = modules.iter().find(|m| self.module(m).is_none()) {
            return Err(format!("unknown module '{}'", unknown));
        }
        self.macros.push(MacroDef {
            id: id.to_string(),
            modules,
        });
        Ok(())
    }

    pub(crate) fn add_view(&mut self, name: &str, module: &str) -> Result<(), String> {
        if self.view(name).is_some() {
            return Err(format!("view '{}' already exists", name));
        }
        if self.module(module).is_none() {
            return Err(format!("unknown module '{}'", module));
        }
        self.views.push(View {
            name: name.to_string(),
            module: module.to_string(),
        });
        Ok(())
    }

    pub(crate) fn spawn_workers(
        &mut self,
        pool_name: &str,
        count: usize,
        max_workers: usize,
    ) -> Result<(), String> {
        let existing = self
            .worker_pools
            .iter()
            .find(|p| p.name == pool_name)
            .map_or(0, |p| p.workers.len());
        if existing + count > max_workers {
            return Err(format!(
                "worker pool '{}' would hold {} workers (max {})",
                pool_name,
                existing + count,
                max_workers
            ));
        }

        let spawned: Vec<ResourceId> = (0..count)
            .map(|_| {
                self.pool
                    .spawn(ResourceKind::Worker {
                        pool: pool_name.to_string(),
                    })
                    .id()
            })
            .collect();
        match self.worker_pools.iter_mut().find(|p| p.name == pool_name) {
            Some(pool) => pool.workers.extend(spawned),
            None => self.worker_pools.push(WorkerPool {
                name: pool_name.to_string(),
                workers: spawned,
            }),
        }
        Ok(())
    }

    pub(crate) fn run_worksheet(&mut self, name: &str, modules: Vec<String>) -> Result<(), String> {
        if let Some(unknown) = modules.iter().find(|m| self.module(m).is_none()) {
            return Err(format!("unknown module '{}'", unknown));
        }

        let mut pool = InstancePool::new();
        for id in &modules {
            pool.spawn(ResourceKind::Module {
                module_id: id.clone(),
            });
        }
        for connection in &self.workflow.connections {
            if modules.contains(&connection.from) && modules.contains(&connection.to) {
                pool.spawn(ResourceKind::Subscription {
                    from: connection.from.clone(),
                    to: connection.to.clone(),
                });
            }
        }

        // Re-running a worksheet supersedes the previous run.
        if let Some(position) = self.worksheets.iter().position(|w| w.name == name) {
            let previous = self.worksheets.remove(position);
            self.retire(previous.pool.resources().iter().cloned());
        }
        self.worksheets.push(Worksheet {
            name: name.to_string(),
            modules,
            pool,
        });
        Ok(())
    }
}

/// Serializable overview of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotSummary {
    pub id: Uuid,
    pub modules: Vec<String>,
    pub connections: Vec<String>,
    pub macros: Vec<String>,
    pub views: Vec<String>,
    pub worker_pools: Vec<(String, usize)>,
    pub worksheets: Vec<String>,
    pub toolboxes: Vec<String>,
    pub running_resources: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project_with_modules() -> ProjectSnapshot {
        let mut project = ProjectSnapshot::empty();
        project.install_toolbox("std");
        project.add_module("a", "std/source").unwrap();
        project.add_module("b", "std/filter").unwrap();
        project.connect("a", "b").unwrap();
        project
    }

    #[test]
    fn test_add_module_requires_toolbox() {
        let mut project = ProjectSnapshot::empty();
        let err = project.add_module("a", "std/source").unwrap_err();
        assert!(err.contains("not installed"));

        project.install_toolbox("std");
        project.add_module("a", "std/source").unwrap();
        assert_eq!(project.pool.len(), 1);
    }

    #[test]
    fn test_add_module_rejects_bad_kind() {
        let mut project = ProjectSnapshot::empty();
        project.install_toolbox("std");
        assert!(project.add_module("a", "source").is_err());
        assert!(project.add_module("a", "std/").is_err());
    }

    #[test]
    fn test_remove_module_releases_connections() {
        let mut project = project_with_modules();
        project.add_view("out", "b").unwrap();
        project.define_macro("m", vec!["a".into(), "b".into()]).unwrap();

        project.remove_module("b").unwrap();

        assert!(project.workflow.connections.is_empty());
        assert!(project.views.is_empty());
        assert_eq!(project.macros[0].modules, vec!["a".to_string()]);
        assert_eq!(project.pool.len(), 1);
    }

    #[test]
    fn test_spawn_workers_respects_limit() {
        let mut project = ProjectSnapshot::empty();
        project.spawn_workers("cpu", 2, 3).unwrap();
        assert!(project.spawn_workers("cpu", 2, 3).is_err());
        project.spawn_workers("cpu", 1, 3).unwrap();
        assert_eq!(project.worker_pools[0].workers.len(), 3);
    }

    #[test]
    fn test_worksheet_has_own_pool() {
        let mut project = project_with_modules();
        project
            .run_worksheet("ws", vec!["a".into(), "b".into()])
            .unwrap();

        let worksheet = project.worksheet("ws").unwrap();
        // Two modules plus the connection between them
        assert_eq!(worksheet.pool.len(), 3);
        assert!(worksheet.is_running());
        assert_eq!(project.resource_ids().len(), 6);
    }

    #[test]
    fn test_rerun_worksheet_retires_previous_pool() {
        let mut project = project_with_modules();
        project.run_worksheet("ws", vec!["a".into()]).unwrap();
        let first = project.worksheet("ws").unwrap().pool.resources().to_vec();

        project.run_worksheet("ws", vec!["a".into()]).unwrap();
        let second = project.worksheet("ws").unwrap().pool.resources().to_vec();

        assert_eq!(project.stop_retired(&project.resource_ids()), 1);
        assert!(first.iter().all(|r| !r.is_running()));
        assert!(second.iter().all(|r| r.is_running()));
        assert_eq!(project.stop_retired(&FxHashSet::default()), 0);
    }

    #[test]
    fn test_removed_module_is_retired() {
        let mut project = project_with_modules();
        let resource = project.module("b").unwrap().resource;
        let handle = project.pool.get(resource).cloned().unwrap();

        project.remove_module("b").unwrap();

        // The module and its connection
        assert_eq!(project.stop_retired(&project.resource_ids()), 2);
        assert!(!handle.is_running());
        assert!(project.module("a").is_some());
        assert_eq!(project.pool.running_count(), 1);
    }

    #[test]
    fn test_retired_spares_keep_set() {
        let base = project_with_modules();
        let mut draft = base.fork();
        draft.remove_module("b").unwrap();

        assert_eq!(draft.stop_retired(&base.resource_ids()), 0);
        assert_eq!(base.pool.running_count(), 3);
    }

    #[test]
    fn test_fork_starts_with_nothing_retired() {
        let mut project = project_with_modules();
        project.remove_module("b").unwrap();

        let mut forked = project.fork();
        assert_eq!(forked.stop_retired(&FxHashSet::default()), 0);
    }

    #[test]
    fn test_fork_shares_resources() {
        let project = project_with_modules();
        let forked = project.fork();

        assert_ne!(project.id(), forked.id());
        assert_eq!(project.resource_ids(), forked.resource_ids());
        assert!(project.same_contents(&forked));
    }

    #[test]
    fn test_same_contents_ignores_resource_ids() {
        assert!(project_with_modules().same_contents(&project_with_modules()));

        let mut other = project_with_modules();
        other.add_view("v", "a").unwrap();
        assert!(!project_with_modules().same_contents(&other));
    }

    #[test]
    fn test_stop_spares_keep_set() {
        let project = project_with_modules();
        let keep: FxHashSet<ResourceId> = project.workflow.modules.iter().map(|m| m.resource).collect();

        assert_eq!(project.stop(&keep), 1);
        assert_eq!(project.pool.running_count(), 2);
    }
}
