//! Open tabs and module panels, pruned against the displayed snapshot.
//!
//! Every tab carries a liveness rule chosen when it is opened. After a new
//! snapshot is displayed, [`TabManager::reconcile`] closes the tabs whose
//! entity is gone.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::project::{MAIN_WORKFLOW_ID, ProjectSnapshot};

/// Custom liveness check.
pub type Predicate = Arc<dyn Fn(&ProjectSnapshot) -> bool + Send + Sync>;

/// Rule deciding whether a tab still refers to something in a snapshot.
#[derive(Clone)]
pub enum Liveness {
    /// The root workflow is always present.
    Always,
    /// Alive while the macro is defined.
    Macro(String),
    /// Alive while the worksheet is running.
    Worksheet(String),
    View(String),
    Module(String),
    Toolbox(String),
    Custom(Predicate),
}

impl Liveness {
    pub fn is_alive(&self, snapshot: &ProjectSnapshot) -> bool {
        match self {
            Self::Always => true,
            Self::Macro(id) => snapshot.has_macro(id),
            Self::Worksheet(name) => snapshot.worksheet(name).is_some_and(|w| w.is_running()),
            Self::View(name) => snapshot.view(name).is_some(),
            Self::Module(id) => snapshot.module(id).is_some(),
            Self::Toolbox(name) => snapshot.has_toolbox(name),
            Self::Custom(predicate) => predicate(snapshot),
        }
    }
}

impl fmt::Debug for Liveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => write!(f, "Always"),
            Self::Macro(id) => f.debug_tuple("Macro").field(id).finish(),
            Self::Worksheet(name) => f.debug_tuple("Worksheet").field(name).finish(),
            Self::View(name) => f.debug_tuple("View").field(name).finish(),
            Self::Module(id) => f.debug_tuple("Module").field(id).finish(),
            Self::Toolbox(name) => f.debug_tuple("Toolbox").field(name).finish(),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabCategory {
    Workflow,
    Macro,
    Worksheet,
    View,
    Module,
    Toolbox,
}

/// An open tab.
#[derive(Debug, Clone)]
pub struct Tab {
    pub id: String,
    pub category: TabCategory,
    pub name: String,
    pub liveness: Liveness,
}

impl Tab {
    pub fn new(
        id: impl Into<String>,
        category: TabCategory,
        name: impl Into<String>,
        liveness: Liveness,
    ) -> Self {
        Self {
            id: id.into(),
            category,
            name: name.into(),
            liveness,
        }
    }

    /// The root workflow tab.
    pub fn workflow() -> Self {
        Self::new(
            format!("workflow:{}", MAIN_WORKFLOW_ID),
            TabCategory::Workflow,
            MAIN_WORKFLOW_ID,
            Liveness::Always,
        )
    }

    pub fn macro_def(id: &str) -> Self {
        Self::new(
            format!("macro:{}", id),
            TabCategory::Macro,
            id,
            Liveness::Macro(id.to_string()),
        )
    }

    pub fn worksheet(name: &str) -> Self {
        Self::new(
            format!("worksheet:{}", name),
            TabCategory::Worksheet,
            name,
            Liveness::Worksheet(name.to_string()),
        )
    }

    pub fn view(name: &str) -> Self {
        Self::new(
            format!("view:{}", name),
            TabCategory::View,
            name,
            Liveness::View(name.to_string()),
        )
    }

    pub fn module(id: &str) -> Self {
        Self::new(
            format!("module:{}", id),
            TabCategory::Module,
            id,
            Liveness::Module(id.to_string()),
        )
    }

    pub fn toolbox(name: &str) -> Self {
        Self::new(
            format!("toolbox:{}", name),
            TabCategory::Toolbox,
            name,
            Liveness::Toolbox(name.to_string()),
        )
    }

    pub fn info(&self) -> TabInfo {
        TabInfo {
            id: self.id.clone(),
            category: self.category,
            name: self.name.clone(),
        }
    }
}

/// Serializable description of an open tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabInfo {
    pub id: String,
    pub category: TabCategory,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelKind {
    View,
    Journal,
    Documentation,
}

/// Module ids with an open side panel, per panel kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModulePanels {
    pub views: Vec<String>,
    pub journals: Vec<String>,
    pub documentation: Vec<String>,
}

impl ModulePanels {
    fn list_mut(&mut self, kind: PanelKind) -> &mut Vec<String> {
        match kind {
            PanelKind::View => &mut self.views,
            PanelKind::Journal => &mut self.journals,
            PanelKind::Documentation => &mut self.documentation,
        }
    }

    /// Drop panels of modules missing from `snapshot`. Returns how many closed.
    fn prune(&mut self, snapshot: &ProjectSnapshot) -> usize {
        let mut closed = 0;
        for list in [&mut self.views, &mut self.journals, &mut self.documentation] {
            let before = list.len();
            list.retain(|id| snapshot.module(id).is_some());
            closed += before - list.len();
        }
        closed
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty() && self.journals.is_empty() && self.documentation.is_empty()
    }
}

/// Tracks open tabs, the selected tab and module panels.
#[derive(Debug, Clone, Default)]
pub struct TabManager {
    open: Vec<Tab>,
    selected: Option<String>,
    panels: ModulePanels,
}

impl TabManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `tab` and select it. An already open tab is only selected.
    ///
    /// Returns `true` if the tab was newly opened.
    pub fn open_tab(&mut self, tab: Tab) -> bool {
        let id = tab.id.clone();
        let opened = !self.open.iter().any(|t| t.id == id);
        if opened {
            self.open.push(tab);
        }
        self.selected = Some(id);
        opened
    }

    /// Close a tab. When it was selected, the first remaining tab is selected.
    pub fn close_tab(&mut self, id: &str) -> bool {
        let before = self.open.len();
        self.open.retain(|t| t.id != id);
        let closed = self.open.len() != before;
        if closed && self.selected.as_deref() == Some(id) {
            self.selected = self.open.first().map(|t| t.id.clone());
        }
        closed
    }

    /// Select an open tab. Returns `false` if no such tab is open.
    pub fn select(&mut self, id: &str) -> bool {
        if self.open.iter().any(|t| t.id == id) {
            self.selected = Some(id.to_string());
            true
        } else {
            false
        }
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.open
    }

    pub fn infos(&self) -> Vec<TabInfo> {
        self.open.iter().map(Tab::info).collect()
    }

    pub fn panels(&self) -> &ModulePanels {
        &self.panels
    }

    /// Returns `true` if the panel was newly opened.
    pub fn open_panel(&mut self, kind: PanelKind, module_id: &str) -> bool {
        let list = self.panels.list_mut(kind);
        if list.iter().any(|id| id == module_id) {
            return false;
        }
        list.push(module_id.to_string());
        true
    }

    pub fn close_panel(&mut self, kind: PanelKind, module_id: &str) -> bool {
        let list = self.panels.list_mut(kind);
        let before = list.len();
        list.retain(|id| id != module_id);
        list.len() != before
    }

    /// Close every tab and panel whose entity is absent from `snapshot`.
    ///
    /// Returns the ids of the closed tabs and the number of closed panels.
    pub fn reconcile(&mut self, snapshot: &ProjectSnapshot) -> (Vec<String>, usize) {
        let mut closed = Vec::new();
        self.open.retain(|tab| {
            let alive = tab.liveness.is_alive(snapshot);
            if !alive {
                closed.push(tab.id.clone());
            }
            alive
        });

        if let Some(selected) = &self.selected
            && closed.contains(selected)
        {
            self.selected = self.open.first().map(|t| t.id.clone());
        }

        let panels = self.panels.prune(snapshot);
        if !closed.is_empty() || panels > 0 {
            tracing::debug!("Closed {} tabs and {} panels", closed.len(), panels);
        }
        (closed, panels)
    }
}
