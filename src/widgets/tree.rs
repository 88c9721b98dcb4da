//! Lazily loaded repository tree with drill-down selection.
//!
//! Nodes are keyed by [`NodeId`]; the path a node stands for is kept as node
//! metadata and never recomputed from the id. Children of a node are fetched
//! the first time it is expanded, one request per node, and shown in server
//! order.

use std::collections::HashMap;
use std::rc::Rc;

use serde::Deserialize;

use super::{path_url, ElementData, Widget, WidgetContext, WidgetError};
use crate::events::{Event, EventBus, Listener};
use crate::nav::NodeId;
use crate::net::{Fenced, Fetcher, Pending, Poll};

/// Synthetic child the page renderer appends to content paths.
const CONTENT_SUFFIX: &str = "/jcr:content";
const RESYNC_SLOT: &str = "ancestor";

/// One entry of a node descriptor response.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct NodeDescriptor {
    pub path: String,
    #[serde(rename = "type", default)]
    pub node_type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(rename = "resourceType", default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub children: Vec<NodeDescriptor>,
    /// Filled in locally from `path`.
    #[serde(skip)]
    pub id: Option<NodeId>,
}

impl NodeDescriptor {
    /// Derive the id of this entry and of its direct children.
    pub fn augment(mut self) -> Self {
        self.id = Some(NodeId::encode(&self.path));
        for child in &mut self.children {
            child.id = Some(NodeId::encode(&child.path));
        }
        self
    }
}

#[derive(Debug, Deserialize)]
struct AncestorDescriptor {
    path: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TreeNode {
    pub id: NodeId,
    pub path: String,
    pub name: String,
    pub text: String,
    pub node_type: String,
    pub resource_type: Option<String>,
    /// `None` until the node's descriptor arrived.
    pub children: Option<Vec<NodeId>>,
    pub opened: bool,
}

impl TreeNode {
    fn from_descriptor(desc: &NodeDescriptor) -> Self {
        let name = desc.name.clone().unwrap_or_else(|| {
            desc.path
                .rsplit('/')
                .find(|s| !s.is_empty())
                .unwrap_or("/")
                .to_string()
        });
        Self {
            id: NodeId::encode(&desc.path),
            path: desc.path.clone(),
            text: desc.text.clone().unwrap_or_else(|| name.clone()),
            name,
            node_type: desc.node_type.clone().unwrap_or_default(),
            resource_type: desc.resource_type.clone(),
            children: None,
            opened: false,
        }
    }

    fn refresh(&mut self, desc: &NodeDescriptor) {
        let fresh = Self::from_descriptor(desc);
        self.path = fresh.path;
        self.name = fresh.name;
        self.text = fresh.text;
        self.node_type = fresh.node_type;
        self.resource_type = fresh.resource_type;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selection {
    Empty,
    Loading(String),
    Selected(String),
}

struct Drilldown {
    segments: Vec<String>,
    /// Segments already walked.
    depth: usize,
    suppress: bool,
    waiting_on: Option<NodeId>,
}

pub struct Tree {
    tree_url: String,
    page_url: Option<String>,
    bus: Rc<EventBus>,
    fetcher: Fetcher,
    root: NodeId,
    nodes: HashMap<NodeId, TreeNode>,
    loads: HashMap<NodeId, Pending<NodeDescriptor>>,
    drilldown: Option<Drilldown>,
    selection: Selection,
    selected: Option<NodeId>,
    resync: Vec<Fenced<AncestorDescriptor>>,
    resync_epoch: u64,
}

pub(super) fn build(el: &ElementData, ctx: &WidgetContext) -> Result<Widget, WidgetError> {
    let tree_url = ctx.resolve(el.require_data("tree-url")?)?;
    let mut tree = Tree::new(Rc::clone(&ctx.bus), ctx.fetcher.clone(), &tree_url);
    tree.page_url = el.data("page-url").map(str::to_string);
    if let Some(path) = el.data("path") {
        // one PathSelected for the initial path, once it resolves
        tree.open_node(path, false);
    }
    Ok(Widget::Tree(Rc::new(std::cell::RefCell::new(tree))))
}

impl Tree {
    /// A tree reading descriptors from `tree_url`; the root load starts
    /// immediately.
    pub fn new(bus: Rc<EventBus>, fetcher: Fetcher, tree_url: &str) -> Self {
        let mut tree = Self {
            tree_url: tree_url.trim_end_matches('/').to_string(),
            page_url: None,
            bus,
            fetcher,
            root: NodeId::encode("/"),
            nodes: HashMap::new(),
            loads: HashMap::new(),
            drilldown: None,
            selection: Selection::Empty,
            selected: None,
            resync: Vec::new(),
            resync_epoch: 0,
        };
        let root = tree.root.clone();
        tree.request_children(&root, "/");
        tree
    }

    /// Page the selected path is shown under, if the markup named one.
    pub fn page_url(&self) -> Option<&str> {
        self.page_url.as_deref()
    }

    pub fn root(&self) -> Option<&TreeNode> {
        self.nodes.get(&self.root)
    }

    pub fn node(&self, id: &NodeId) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    /// Loaded children of `id` in server order.
    pub fn children(&self, id: &NodeId) -> Vec<&TreeNode> {
        self.nodes
            .get(id)
            .and_then(|n| n.children.as_ref())
            .map(|ids| ids.iter().filter_map(|c| self.nodes.get(c)).collect())
            .unwrap_or_default()
    }

    pub fn is_loading(&self, id: &NodeId) -> bool {
        self.loads.contains_key(id)
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selected_id(&self) -> Option<&NodeId> {
        self.selected.as_ref()
    }

    pub fn selected_path(&self) -> Option<&str> {
        match &self.selection {
            Selection::Selected(path) => Some(path),
            _ => None,
        }
    }

    fn descriptor_url(&self, path: &str) -> String {
        path_url(&self.tree_url, path)
    }

    /// Fetch the descriptor of `path` unless a load for it is in flight.
    fn request_children(&mut self, id: &NodeId, path: &str) {
        if self.loads.contains_key(id) {
            return;
        }
        let url = self.descriptor_url(path);
        log::debug!("tree load {}", url);
        let pending = self.fetcher.json::<NodeDescriptor>(&url);
        self.loads.insert(id.clone(), pending);
    }

    /// Expand or collapse a node. Expanding a node whose children are not
    /// known yet loads them; the node opens when they arrive.
    pub fn toggle(&mut self, id: &NodeId) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        if node.opened {
            node.opened = false;
        } else if node.children.is_some() {
            node.opened = true;
        } else {
            let path = node.path.clone();
            self.request_children(id, &path);
        }
    }

    /// User selection of a rendered node.
    pub fn select(&mut self, id: &NodeId) {
        if let Some(path) = self.nodes.get(id).map(|n| n.path.clone()) {
            self.open_node(&path, false);
        }
    }

    /// Drill down to `path`: expand every ancestor from the root, loading
    /// children on the way, then select the final node. Emits `PathSelected`
    /// on completion unless `suppress` is set.
    pub fn open_node(&mut self, path: &str, suppress: bool) {
        self.selected = None;
        let segments: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        log::debug!("open {} ({} segments)", path, segments.len());
        self.selection = Selection::Loading(path.to_string());
        self.drilldown = Some(Drilldown {
            segments,
            depth: 0,
            suppress,
            waiting_on: None,
        });
        self.advance();
    }

    /// Walk the drill-down as far as loaded nodes allow.
    fn advance(&mut self) {
        loop {
            let Some(dd) = self.drilldown.as_ref() else {
                return;
            };
            if dd.waiting_on.is_some() {
                return;
            }
            let current = NodeId::encode(&format!("/{}", dd.segments[..dd.depth].join("/")));
            let Some(node) = self.nodes.get(&current) else {
                if current == self.root {
                    // root not there yet (first load or after reload)
                    self.request_children(&current, "/");
                    self.wait_for(current);
                } else {
                    log::debug!("drill-down stopped, no node {}", current);
                    self.abort_drilldown();
                }
                return;
            };
            let is_last = dd.depth == dd.segments.len();
            if node.children.is_none() {
                let path = node.path.clone();
                self.request_children(&current, &path);
                self.wait_for(current);
                return;
            }
            if is_last {
                self.finish_drilldown(current);
                return;
            }
            if let Some(node) = self.nodes.get_mut(&current) {
                node.opened = true;
            }
            if let Some(dd) = self.drilldown.as_mut() {
                dd.depth += 1;
            }
        }
    }

    fn wait_for(&mut self, id: NodeId) {
        if let Some(dd) = self.drilldown.as_mut() {
            dd.waiting_on = Some(id);
        }
    }

    fn abort_drilldown(&mut self) {
        self.drilldown = None;
        self.selection = Selection::Empty;
    }

    fn finish_drilldown(&mut self, id: NodeId) {
        let Some(dd) = self.drilldown.take() else {
            return;
        };
        let Some(node) = self.nodes.get_mut(&id) else {
            self.selection = Selection::Empty;
            return;
        };
        node.opened = true;
        let path = node.path.clone();
        self.selected = Some(id);
        self.selection = Selection::Selected(path.clone());
        if !dd.suppress {
            self.bus.emit(Event::PathSelected(path));
        }
    }

    /// Store a descriptor: refresh the node itself and replace its child
    /// list, keeping already loaded grandchildren.
    fn apply(&mut self, id: &NodeId, desc: NodeDescriptor) {
        let desc = desc.augment();
        let child_ids: Vec<NodeId> = desc
            .children
            .iter()
            .filter_map(|c| c.id.clone())
            .collect();
        for child in &desc.children {
            let child_id = NodeId::encode(&child.path);
            match self.nodes.get_mut(&child_id) {
                Some(existing) => existing.refresh(child),
                None => {
                    self.nodes.insert(child_id, TreeNode::from_descriptor(child));
                }
            }
        }
        let node = self
            .nodes
            .entry(id.clone())
            .or_insert_with(|| TreeNode::from_descriptor(&desc));
        node.refresh(&desc);
        node.children = Some(child_ids);
        node.opened = true;
    }

    /// Collect finished loads and advance a waiting drill-down. Loops until
    /// nothing more is ready, so answers that arrive synchronously chain.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        loop {
            let mut ready = Vec::new();
            self.loads.retain(|id, pending| match pending.poll() {
                Poll::Waiting => true,
                Poll::Ready(result) => {
                    ready.push((id.clone(), result));
                    false
                }
            });
            let resynced = self.poll_resync();
            changed |= resynced;
            if ready.is_empty() && !resynced {
                return changed;
            }
            changed = true;
            for (id, result) in ready {
                let waited = self
                    .drilldown
                    .as_ref()
                    .and_then(|dd| dd.waiting_on.as_ref())
                    == Some(&id);
                match result {
                    Ok(desc) => {
                        self.apply(&id, desc);
                        if waited {
                            if let Some(dd) = self.drilldown.as_mut() {
                                dd.waiting_on = None;
                            }
                            self.advance();
                        }
                    }
                    Err(e) => {
                        log::debug!("tree load for {} failed: {}", id, e);
                        if let Some(node) = self.nodes.get_mut(&id) {
                            node.opened = false;
                        }
                        if waited {
                            self.abort_drilldown();
                        }
                    }
                }
            }
        }
    }

    /// Drop every node and refetch from the root. A selected path is
    /// re-opened quietly once the tree is back.
    pub fn reload(&mut self) {
        let previous = self.selected_path().map(str::to_string);
        log::debug!("tree reload");
        self.nodes.clear();
        self.loads.clear();
        self.drilldown = None;
        self.selected = None;
        self.selection = Selection::Empty;
        let root = self.root.clone();
        self.request_children(&root, "/");
        if let Some(path) = previous {
            self.open_node(&path, true);
        }
    }

    /// The detail pane moved to `location`: ask the server which node it
    /// belongs to and select that node if it differs.
    pub fn on_page_changed(&mut self, location: &str) {
        self.resync_epoch += 1;
        let url = format!(
            "{}?url={}",
            self.tree_url,
            urlencoding::encode(location)
        );
        log::debug!("tree resync {}", url);
        self.resync.push(Fenced {
            slot: RESYNC_SLOT.to_string(),
            epoch: self.resync_epoch,
            pending: self.fetcher.json(&url),
        });
    }

    fn poll_resync(&mut self) -> bool {
        let mut changed = false;
        for (_, epoch, result) in crate::net::pending::drain_ready(&mut self.resync) {
            if epoch != self.resync_epoch {
                log::debug!("dropping stale ancestor answer");
                continue;
            }
            let ancestor = match result {
                Ok(a) => a,
                Err(e) => {
                    log::debug!("ancestor lookup failed: {}", e);
                    continue;
                }
            };
            let current = self
                .selected_path()
                .map(|p| p.strip_suffix(CONTENT_SUFFIX).unwrap_or(p).to_string());
            if current.as_deref() != Some(ancestor.path.as_str()) {
                self.open_node(&ancestor.path, false);
                changed = true;
            }
        }
        changed
    }
}

impl Listener for Tree {
    fn on_event(&mut self, event: &Event) {
        match event {
            Event::PathSelect(path) => {
                if self.selected_path() != Some(path.as_str()) {
                    self.open_node(path, false);
                }
            }
            Event::PageChanged(location) => self.on_page_changed(location),
            _ => {}
        }
    }
}
