//! Widgets attached to server-rendered markup.
//!
//! A [`Registry`] pairs CSS selectors with factories. [`WidgetHost`] scans a
//! slot's HTML once, builds a widget for every matching element and keeps it
//! in a side table keyed by `(slot, element ordinal, kind)`. Replacing a
//! slot's content detaches its widgets; dropping them unsubscribes them from
//! the bus.

pub mod favorites;
pub mod logfile;
pub mod navbar;
pub mod query;
pub mod status;
pub mod tabs;
pub mod tree;
pub mod view;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use scraper::{ElementRef, Html, Selector};

use crate::events::EventBus;
use crate::nav::location::escape_path;
use crate::nav::Parameters;
use crate::net::Fetcher;
use crate::prefs::PreferenceStore;

pub use favorites::Favorites;
pub use logfile::LogTail;
pub use navbar::{PathLink, ToolLink};
pub use query::QueryConsole;
pub use status::StatusLine;
pub use tabs::ResumingTabs;
pub use tree::Tree;
pub use view::DetailView;

/// Error while building a widget from its element
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetError {
    pub message: String,
}

impl WidgetError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for WidgetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Everything a widget needs from its surroundings, handed over at
/// construction.
pub struct WidgetContext {
    pub bus: Rc<EventBus>,
    pub prefs: PreferenceStore,
    pub fetcher: Fetcher,
    pub base_url: url::Url,
    pub tail_interval: Duration,
    pub history_max: usize,
    /// Parameters of the address the session started at.
    pub initial_parameters: Parameters,
}

impl WidgetContext {
    /// Resolve a possibly relative URL against the server.
    pub fn resolve(&self, reference: &str) -> Result<String, WidgetError> {
        self.base_url
            .join(reference)
            .map(String::from)
            .map_err(|e| WidgetError::new(format!("Invalid URL {}: {}", reference, e)))
    }
}

/// `base + path` with the characters that would end a URL path escaped.
pub fn path_url(base: &str, path: &str) -> String {
    format!("{}{}", base, escape_path(path))
}

/// Owned copy of the element a widget is built from.
#[derive(Clone, Debug, Default)]
pub struct ElementData {
    pub tag: String,
    pub attributes: HashMap<String, String>,
    pub inner_html: String,
    pub text: String,
    /// Ids of the enclosing elements, nearest first.
    pub ancestor_ids: Vec<String>,
}

impl ElementData {
    pub fn from_element(el: ElementRef<'_>) -> Self {
        let ancestor_ids = el
            .ancestors()
            .filter_map(ElementRef::wrap)
            .filter_map(|a| a.value().id().map(str::to_string))
            .collect();
        Self {
            tag: el.value().name().to_string(),
            attributes: el
                .value()
                .attrs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            inner_html: el.inner_html(),
            text: el.text().collect(),
            ancestor_ids,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
    }

    /// `data-<name>` attribute.
    pub fn data(&self, name: &str) -> Option<&str> {
        self.attr(&format!("data-{}", name))
    }

    pub fn require_data(&self, name: &str) -> Result<&str, WidgetError> {
        self.data(name).ok_or_else(|| {
            WidgetError::new(format!("<{}> lacks data-{}", self.tag, name))
        })
    }

    pub fn within(&self, id: &str) -> bool {
        self.ancestor_ids.iter().any(|a| a == id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WidgetKind {
    Tree,
    View,
    Tabs,
    Logfile,
    Query,
    Favorites,
    StatusLine,
    PathLink,
    ToolLink,
}

impl WidgetKind {
    pub fn default_selector(self) -> &'static str {
        match self {
            WidgetKind::Tree => ".dashboard-browser__tree",
            WidgetKind::View => ".dashboard-browser__view",
            WidgetKind::Tabs => ".resuming-tabs",
            WidgetKind::Logfile => ".dashboard-widget__logfile textarea",
            WidgetKind::Query => ".dashboard-widget__query",
            WidgetKind::Favorites => ".dashboard-widget__favorites",
            WidgetKind::StatusLine => ".dashboard__status-line",
            WidgetKind::PathLink => ".composum-dashboard__navbar .path-link",
            WidgetKind::ToolLink => ".composum-dashboard__navbar .tool-link",
        }
    }

    pub const ALL: [WidgetKind; 9] = [
        WidgetKind::Tree,
        WidgetKind::View,
        WidgetKind::Tabs,
        WidgetKind::Logfile,
        WidgetKind::Query,
        WidgetKind::Favorites,
        WidgetKind::StatusLine,
        WidgetKind::PathLink,
        WidgetKind::ToolLink,
    ];
}

/// A live widget instance.
#[derive(Clone)]
pub enum Widget {
    Tree(Rc<RefCell<Tree>>),
    View(Rc<RefCell<DetailView>>),
    Tabs(Rc<RefCell<ResumingTabs>>),
    Logfile(Rc<RefCell<LogTail>>),
    Query(Rc<RefCell<QueryConsole>>),
    Favorites(Rc<RefCell<Favorites>>),
    StatusLine(Rc<RefCell<StatusLine>>),
    PathLink(Rc<RefCell<PathLink>>),
    ToolLink(Rc<RefCell<ToolLink>>),
}

impl Widget {
    pub fn kind(&self) -> WidgetKind {
        match self {
            Widget::Tree(_) => WidgetKind::Tree,
            Widget::View(_) => WidgetKind::View,
            Widget::Tabs(_) => WidgetKind::Tabs,
            Widget::Logfile(_) => WidgetKind::Logfile,
            Widget::Query(_) => WidgetKind::Query,
            Widget::Favorites(_) => WidgetKind::Favorites,
            Widget::StatusLine(_) => WidgetKind::StatusLine,
            Widget::PathLink(_) => WidgetKind::PathLink,
            Widget::ToolLink(_) => WidgetKind::ToolLink,
        }
    }

    fn subscribe(&self, bus: &EventBus) {
        match self {
            Widget::Tree(w) => bus.subscribe(w),
            Widget::View(w) => bus.subscribe(w),
            Widget::Query(w) => bus.subscribe(w),
            Widget::Favorites(w) => bus.subscribe(w),
            Widget::StatusLine(w) => bus.subscribe(w),
            Widget::PathLink(w) => bus.subscribe(w),
            Widget::ToolLink(w) => bus.subscribe(w),
            Widget::Tabs(_) | Widget::Logfile(_) => {}
        }
    }

    /// Collect finished fetches and run timers. Returns true when anything
    /// changed.
    pub fn poll(&self, now: Instant) -> bool {
        match self {
            Widget::Tree(w) => w.borrow_mut().poll(),
            Widget::View(w) => w.borrow_mut().poll(),
            Widget::Logfile(w) => w.borrow_mut().poll(now),
            Widget::Query(w) => w.borrow_mut().poll(),
            Widget::Tabs(_)
            | Widget::Favorites(_)
            | Widget::StatusLine(_)
            | Widget::PathLink(_)
            | Widget::ToolLink(_) => false,
        }
    }
}

pub type Factory = fn(&ElementData, &WidgetContext) -> Result<Widget, WidgetError>;

struct Registration {
    kind: WidgetKind,
    selector: Selector,
    factory: Factory,
}

/// Ordered `(selector, factory)` pairs.
#[derive(Default)]
pub struct Registry {
    registrations: Vec<Registration>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in widget under its default selector.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for kind in WidgetKind::ALL {
            let factory: Factory = match kind {
                WidgetKind::Tree => tree::build,
                WidgetKind::View => view::build,
                WidgetKind::Tabs => tabs::build,
                WidgetKind::Logfile => logfile::build,
                WidgetKind::Query => query::build,
                WidgetKind::Favorites => favorites::build,
                WidgetKind::StatusLine => status::build,
                WidgetKind::PathLink => navbar::build_path_link,
                WidgetKind::ToolLink => navbar::build_tool_link,
            };
            if let Err(e) = registry.register(kind, kind.default_selector(), factory) {
                log::error!("{}", e);
            }
        }
        registry
    }

    pub fn register(
        &mut self,
        kind: WidgetKind,
        css: &str,
        factory: Factory,
    ) -> Result<(), WidgetError> {
        let selector = Selector::parse(css)
            .map_err(|e| WidgetError::new(format!("bad selector {}: {:?}", css, e)))?;
        self.registrations.push(Registration {
            kind,
            selector,
            factory,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WidgetKey {
    pub slot: String,
    pub ordinal: usize,
    pub kind: WidgetKind,
}

struct Attached {
    key: WidgetKey,
    widget: Widget,
    element: ElementData,
}

/// Side table of attached widgets.
pub struct WidgetHost {
    registry: Registry,
    attached: Vec<Attached>,
}

impl WidgetHost {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            attached: Vec::new(),
        }
    }

    /// Attach a widget to every matching element of `html`. Elements already
    /// carrying a widget of the same kind are skipped. Returns how many
    /// widgets were attached.
    pub fn initialize(&mut self, slot: &str, html: &str, ctx: &WidgetContext) -> usize {
        let document = Html::parse_document(html);
        let mut matches = Vec::new();
        for (ordinal, node) in document.tree.nodes().enumerate() {
            let Some(el) = ElementRef::wrap(node) else {
                continue;
            };
            for reg in &self.registry.registrations {
                if reg.selector.matches(&el) {
                    matches.push((ordinal, reg.kind, reg.factory, ElementData::from_element(el)));
                }
            }
        }

        let mut count = 0;
        for (ordinal, kind, factory, element) in matches {
            let key = WidgetKey {
                slot: slot.to_string(),
                ordinal,
                kind,
            };
            if self.attached.iter().any(|a| a.key == key) {
                continue;
            }
            match factory(&element, ctx) {
                Ok(widget) => {
                    log::debug!("attached {:?} in {} at #{}", kind, slot, ordinal);
                    widget.subscribe(&ctx.bus);
                    self.attached.push(Attached {
                        key,
                        widget,
                        element,
                    });
                    count += 1;
                }
                Err(e) => log::warn!("{:?} in {} not attached: {}", kind, slot, e),
            }
        }
        count
    }

    /// Drop every widget of `slot`.
    pub fn detach(&mut self, slot: &str) -> usize {
        let before = self.attached.len();
        self.attached.retain(|a| a.key.slot != slot);
        before - self.attached.len()
    }

    /// First widget of `kind`, in attach order.
    pub fn get(&self, kind: WidgetKind) -> Option<&Widget> {
        self.attached
            .iter()
            .find(|a| a.key.kind == kind)
            .map(|a| &a.widget)
    }

    pub fn find(&self, slot: &str, kind: WidgetKind) -> Option<&Widget> {
        self.attached
            .iter()
            .find(|a| a.key.slot == slot && a.key.kind == kind)
            .map(|a| &a.widget)
    }

    /// Widgets whose element sits inside the element with id `id`.
    pub fn within(&self, id: &str) -> impl Iterator<Item = &Widget> + '_ {
        let id = id.to_string();
        self.attached
            .iter()
            .filter(move |a| a.element.within(&id))
            .map(|a| &a.widget)
    }

    pub fn widgets(&self) -> impl Iterator<Item = &Widget> {
        self.attached.iter().map(|a| &a.widget)
    }

    pub fn len(&self) -> usize {
        self.attached.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attached.is_empty()
    }

    pub fn poll(&self, now: Instant) -> bool {
        let mut changed = false;
        for widget in self.widgets() {
            changed |= widget.poll(now);
        }
        changed
    }

    pub fn tree(&self) -> Option<Rc<RefCell<Tree>>> {
        match self.get(WidgetKind::Tree) {
            Some(Widget::Tree(w)) => Some(Rc::clone(w)),
            _ => None,
        }
    }

    pub fn view(&self) -> Option<Rc<RefCell<DetailView>>> {
        match self.get(WidgetKind::View) {
            Some(Widget::View(w)) => Some(Rc::clone(w)),
            _ => None,
        }
    }

    pub fn query(&self) -> Option<Rc<RefCell<QueryConsole>>> {
        match self.get(WidgetKind::Query) {
            Some(Widget::Query(w)) => Some(Rc::clone(w)),
            _ => None,
        }
    }

    pub fn favorites(&self) -> Option<Rc<RefCell<Favorites>>> {
        match self.get(WidgetKind::Favorites) {
            Some(Widget::Favorites(w)) => Some(Rc::clone(w)),
            _ => None,
        }
    }

    pub fn status_line(&self) -> Option<Rc<RefCell<StatusLine>>> {
        match self.get(WidgetKind::StatusLine) {
            Some(Widget::StatusLine(w)) => Some(Rc::clone(w)),
            _ => None,
        }
    }

    pub fn logfiles(&self) -> Vec<Rc<RefCell<LogTail>>> {
        self.widgets()
            .filter_map(|w| match w {
                Widget::Logfile(l) => Some(Rc::clone(l)),
                _ => None,
            })
            .collect()
    }

    pub fn path_links(&self) -> Vec<Rc<RefCell<PathLink>>> {
        self.widgets()
            .filter_map(|w| match w {
                Widget::PathLink(l) => Some(Rc::clone(l)),
                _ => None,
            })
            .collect()
    }

    pub fn tool_links(&self) -> Vec<Rc<RefCell<ToolLink>>> {
        self.widgets()
            .filter_map(|w| match w {
                Widget::ToolLink(l) => Some(Rc::clone(l)),
                _ => None,
            })
            .collect()
    }

    pub fn tab_sets(&self) -> Vec<Rc<RefCell<ResumingTabs>>> {
        self.widgets()
            .filter_map(|w| match w {
                Widget::Tabs(t) => Some(Rc::clone(t)),
                _ => None,
            })
            .collect()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::net::MockTransport;
    use std::sync::Arc;

    const PAGE: &str = r#"
        <div class="dashboard__status-line"></div>
        <div class="dashboard-browser__tree" data-tree-url="/bin/tree.json"></div>
        <div class="dashboard-browser__tree"></div>
        <div class="resuming-tabs" data-tabs-id="logs">
          <div class="resuming-tabs_pane" id="error-log">
            <div class="dashboard-widget__logfile"><textarea data-tail="/bin/tail/error">x</textarea></div>
          </div>
        </div>
    "#;

    #[test]
    fn attaches_matching_elements_once() {
        let mock = Arc::new(MockTransport::new());
        mock.respond("http://cms.test/bin/tree.json/", r#"{"path":"/","children":[]}"#);
        let ctx = context(&mock);
        let mut host = WidgetHost::new(Registry::with_defaults());

        // the second tree lacks data-tree-url and is skipped
        assert_eq!(host.initialize("page", PAGE, &ctx), 4);
        assert_eq!(host.initialize("page", PAGE, &ctx), 0);
        assert!(host.tree().is_some());
        assert!(host.find("page", WidgetKind::Logfile).is_some());
        assert_eq!(host.within("error-log").count(), 1);
    }

    #[test]
    fn detach_drops_a_slot() {
        let mock = Arc::new(MockTransport::new());
        let ctx = context(&mock);
        let mut host = WidgetHost::new(Registry::with_defaults());
        host.initialize("page", r#"<div class="dashboard__status-line"></div>"#, &ctx);
        host.initialize("view", r#"<div class="dashboard__status-line"></div>"#, &ctx);
        assert_eq!(host.len(), 2);
        assert_eq!(host.detach("view"), 1);
        assert!(host.find("view", WidgetKind::StatusLine).is_none());
        assert!(host.get(WidgetKind::StatusLine).is_some());
    }

    #[test]
    fn bad_selector_is_rejected() {
        let mut registry = Registry::new();
        assert!(registry.register(WidgetKind::Tree, "[[[", tree::build).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn path_url_escapes_url_delimiters() {
        assert_eq!(path_url("/bin/tree.json", "/a b/c?d#e"), "/bin/tree.json/a%20b/c%3Fd%23e");
    }
}
