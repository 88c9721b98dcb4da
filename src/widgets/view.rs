//! Detail pane for the selected path.
//!
//! Two modes, picked by the markup:
//! - fragment: `GET view-url + path` returns the whole pane, tabs included;
//! - tabbed: `GET view-url` returns the tab frame once, then each tab pane is
//!   fetched lazily from the tab template (`#id#` replaced by the tab id) plus
//!   the path.
//!
//! Every slot carries a request epoch; an answer whose epoch is no longer
//! current is dropped.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::{path_url, ElementData, Widget, WidgetContext, WidgetError};
use crate::dom::extract::{self, PathLink, TabLink};
use crate::dom::{parser, DomNode};
use crate::events::{Event, EventBus, Listener};
use crate::net::pending::drain_ready;
use crate::net::{Fenced, Fetcher};
use crate::prefs::Profile;

pub const ASPECT: &str = "browser";
const TAB_KEY: &str = "currentTab";
const TAB_TOKEN: &str = "#id#";
const FRAME_SLOT: &str = "frame";
const VIEW_SLOT: &str = "view";
const FRAME_TABS: &str = ".dashboard-browser__tabs .nav-link";
const FRAGMENT_TABS: &str = ".nav-tabs .nav-link";

/// Loaded HTML plus what the UI needs to render it.
#[derive(Clone, Debug)]
pub struct Pane {
    pub html: Rc<str>,
    pub dom: DomNode,
    pub links: Vec<PathLink>,
}

impl Pane {
    pub fn new(html: &str) -> Self {
        Self {
            html: Rc::from(html),
            dom: parser::parse_fragment(html),
            links: extract::path_links(html),
        }
    }
}

pub struct DetailView {
    base: url::Url,
    view_url: String,
    tab_template: Option<String>,
    bus: Rc<EventBus>,
    fetcher: Fetcher,
    profile: Profile,
    current_path: Option<String>,
    tabs: Vec<TabLink>,
    active_tab: Option<String>,
    frame_ready: bool,
    /// Fragment mode content.
    content: Option<Pane>,
    /// Tabbed mode panes by tab id.
    panes: HashMap<String, Pane>,
    /// Tabs whose pane shows the current path.
    fresh: HashSet<String>,
    in_flight: Vec<Fenced<String>>,
    epochs: HashMap<String, u64>,
}

pub(super) fn build(el: &ElementData, ctx: &WidgetContext) -> Result<Widget, WidgetError> {
    let view_url = el.require_data("view-url")?;
    let view = DetailView::new(
        ctx,
        view_url,
        el.data("view-tab").map(str::to_string),
    );
    Ok(Widget::View(Rc::new(RefCell::new(view))))
}

impl DetailView {
    pub fn new(ctx: &WidgetContext, view_url: &str, tab_template: Option<String>) -> Self {
        let mut view = Self {
            base: ctx.base_url.clone(),
            view_url: view_url.to_string(),
            tab_template,
            bus: Rc::clone(&ctx.bus),
            fetcher: ctx.fetcher.clone(),
            profile: Profile::new(&ctx.prefs, ASPECT),
            current_path: None,
            tabs: Vec::new(),
            active_tab: None,
            frame_ready: false,
            content: None,
            panes: HashMap::new(),
            fresh: HashSet::new(),
            in_flight: Vec::new(),
            epochs: HashMap::new(),
        };
        if view.is_tabbed() {
            let url = view.view_url.clone();
            view.request(FRAME_SLOT, &url);
        }
        view
    }

    pub fn is_tabbed(&self) -> bool {
        self.tab_template.is_some()
    }

    pub fn current_path(&self) -> Option<&str> {
        self.current_path.as_deref()
    }

    pub fn tabs(&self) -> &[TabLink] {
        &self.tabs
    }

    pub fn active_tab(&self) -> Option<&str> {
        self.active_tab.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// What the pane shows right now.
    pub fn active_pane(&self) -> Option<&Pane> {
        if self.is_tabbed() {
            self.active_tab.as_ref().and_then(|id| self.panes.get(id))
        } else {
            self.content.as_ref()
        }
    }

    /// The part of the pane belonging to the active tab: the tab's own
    /// element in fragment mode, when the fragment has one.
    pub fn active_tab_node(&self) -> Option<&DomNode> {
        let pane = self.active_pane()?;
        if self.is_tabbed() {
            return Some(&pane.dom);
        }
        self.active_tab
            .as_deref()
            .and_then(|id| pane.dom.find_by_id(id))
            .or(Some(&pane.dom))
    }

    fn absolute(&self, reference: &str) -> Option<String> {
        match self.base.join(reference) {
            Ok(url) => Some(url.into()),
            Err(e) => {
                log::warn!("bad view URL {}: {}", reference, e);
                None
            }
        }
    }

    fn request(&mut self, slot: &str, reference: &str) {
        let Some(url) = self.absolute(reference) else {
            return;
        };
        let epoch = self.epochs.entry(slot.to_string()).or_insert(0);
        *epoch += 1;
        log::debug!("view load {} ({} #{})", url, slot, epoch);
        self.in_flight.push(Fenced {
            slot: slot.to_string(),
            epoch: *epoch,
            pending: self.fetcher.text(&url),
        });
    }

    /// Show `path`. Nothing happens when it is already shown, unless `force`.
    pub fn on_path_selected(&mut self, path: &str, force: bool) {
        if !force && self.current_path.as_deref() == Some(path) {
            return;
        }
        self.current_path = Some(path.to_string());
        if self.is_tabbed() {
            self.fresh.clear();
            if self.frame_ready {
                if let Some(id) = self.active_tab.clone() {
                    self.load_tab(&id);
                }
            }
        } else {
            let url = path_url(&self.view_url, path);
            self.request(VIEW_SLOT, &url);
        }
    }

    /// Reload the current path.
    pub fn reload(&mut self) {
        if let Some(path) = self.current_path.clone() {
            self.on_path_selected(&path, true);
        }
    }

    fn load_tab(&mut self, id: &str) {
        let (Some(template), Some(path)) = (&self.tab_template, &self.current_path) else {
            return;
        };
        let url = path_url(&template.replace(TAB_TOKEN, id), path);
        self.request(&format!("tab:{}", id), &url);
    }

    /// Switch tabs. The choice is remembered; an outdated pane is reloaded.
    pub fn select_tab(&mut self, id: &str) {
        if !self.tabs.iter().any(|t| t.id == id) {
            return;
        }
        self.active_tab = Some(id.to_string());
        if let Err(e) = self.profile.set(TAB_KEY, id) {
            log::warn!("could not store tab: {}", e);
        }
        if self.is_tabbed() && !self.fresh.contains(id) {
            self.load_tab(id);
        }
    }

    /// Tab to show after the tab list changed: the stored one, then
    /// `fallback`, then the first.
    fn pick_tab(&self, fallback: Option<&str>) -> Option<String> {
        let stored: Option<String> = self.profile.get(TAB_KEY);
        let picked = [stored.as_deref(), fallback]
            .into_iter()
            .flatten()
            .find(|id| self.tabs.iter().any(|t| t.id == *id))
            .map(str::to_string);
        picked.or_else(|| self.tabs.first().map(|t| t.id.clone()))
    }

    /// An embedded path link was followed.
    pub fn follow_link(&self, path: &str) {
        self.bus.emit(Event::PathSelect(path.to_string()));
    }

    /// The pane navigated to a location outside the tree's control.
    pub fn navigate_external(&self, location: &str) {
        self.bus.emit(Event::PageChanged(location.to_string()));
    }

    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        loop {
            let ready = drain_ready(&mut self.in_flight);
            if ready.is_empty() {
                return changed;
            }
            for (slot, epoch, result) in ready {
                if self.epochs.get(&slot) != Some(&epoch) {
                    log::debug!("dropping stale {} answer #{}", slot, epoch);
                    continue;
                }
                match result {
                    Ok(html) => {
                        self.apply(&slot, &html);
                        changed = true;
                    }
                    Err(e) => log::debug!("view load for {} failed: {}", slot, e),
                }
            }
        }
    }

    fn apply(&mut self, slot: &str, html: &str) {
        if slot == FRAME_SLOT {
            self.tabs = extract::tabs(html, FRAME_TABS);
            self.active_tab = self.pick_tab(None);
            self.frame_ready = true;
            if let Some(id) = self.active_tab.clone() {
                self.load_tab(&id);
            }
        } else if slot == VIEW_SLOT {
            let pane = Pane::new(html);
            self.tabs = extract::tabs(html, FRAGMENT_TABS);
            let marked = self.tabs.iter().find(|t| t.active).map(|t| t.id.clone());
            let keep = self.active_tab.clone().or(marked);
            self.active_tab = self.pick_tab(keep.as_deref());
            self.bus.emit(Event::ContentLoaded {
                slot: VIEW_SLOT.to_string(),
                html: Rc::clone(&pane.html),
            });
            self.content = Some(pane);
        } else if let Some(id) = slot.strip_prefix("tab:") {
            let pane = Pane::new(html);
            self.bus.emit(Event::ContentLoaded {
                slot: format!("view:{}", id),
                html: Rc::clone(&pane.html),
            });
            self.panes.insert(id.to_string(), pane);
            self.fresh.insert(id.to_string());
        }
    }
}

impl Listener for DetailView {
    fn on_event(&mut self, event: &Event) {
        if let Event::PathSelected(path) = event {
            self.on_path_selected(path, false);
        }
    }
}
