//! Composition root: one bus, one preference store, one fetcher, shared by
//! every widget found on the dashboard page.

use std::cell::{Ref, RefCell};
use std::rc::Rc;
use std::time::Instant;

use crate::config::{ConfigError, DashboardConfig};
use crate::events::{Event, EventBus, Listener};
use crate::nav::HistoryBridge;
use crate::dom::parser::parse_fragment;
use crate::dom::DomNode;
use crate::net::pending::drain_ready;
use crate::net::{Fenced, Fetcher, Pending, Poll};
use crate::prefs::{PreferenceStore, Profile};
use crate::widgets::{
    DetailView, Favorites, LogTail, PathLink, QueryConsole, Registry, ResumingTabs, StatusLine,
    ToolLink, Tree, Widget, WidgetContext, WidgetHost,
};

pub const PAGE_SLOT: &str = "page";
/// Slot of the open tool panel's markup.
pub const TOOL_SLOT: &str = "tool";
const TOOL_KEY: &str = "currentTool";
/// Upper bound on poll/dispatch rounds per pump.
const MAX_ROUNDS: usize = 16;

/// Queues `ContentLoaded` payloads until the dashboard can mount them.
#[derive(Default)]
struct ContentCollector {
    loaded: Vec<(String, Rc<str>)>,
}

impl Listener for ContentCollector {
    fn on_event(&mut self, event: &Event) {
        if let Event::ContentLoaded { slot, html } = event {
            self.loaded.retain(|(s, _)| s != slot);
            self.loaded.push((slot.clone(), Rc::clone(html)));
        }
    }
}

/// The tool panel: fetches the tool's markup, hands it to the dashboard
/// for mounting and remembers the open tool across sessions.
struct ToolPanel {
    profile: Profile,
    bus: Rc<EventBus>,
    fetcher: Fetcher,
    base_url: url::Url,
    current: Option<String>,
    content: Option<DomNode>,
    epoch: u64,
    in_flight: Vec<Fenced<String>>,
}

impl ToolPanel {
    fn new(profile: Profile, bus: Rc<EventBus>, fetcher: Fetcher, base_url: url::Url) -> Self {
        let stored: Option<String> = profile.get(TOOL_KEY);
        let mut panel = Self {
            profile,
            bus,
            fetcher,
            base_url,
            current: None,
            content: None,
            epoch: 0,
            in_flight: Vec::new(),
        };
        if let Some(tool) = stored.filter(|t| !t.is_empty()) {
            panel.show(Some(&tool));
        }
        panel
    }

    fn toggle(&mut self, tool: &str) {
        if self.current.as_deref() == Some(tool) {
            self.show(None);
        } else {
            self.show(Some(tool));
        }
    }

    /// Load `tool`, or close the panel. A tool counts as open once its
    /// markup arrived.
    fn show(&mut self, tool: Option<&str>) {
        self.epoch += 1;
        self.in_flight.clear();
        let Some(tool) = tool else {
            self.current = None;
            self.content = None;
            if let Err(e) = self.profile.remove(TOOL_KEY) {
                log::warn!("could not store tool state: {}", e);
            }
            self.bus.emit(Event::ContentLoaded {
                slot: TOOL_SLOT.to_string(),
                html: Rc::from(""),
            });
            self.bus.emit(Event::ToolShown(None));
            return;
        };
        match self.base_url.join(tool) {
            Ok(url) => {
                log::debug!("loading tool {}", url);
                self.in_flight.push(Fenced {
                    slot: tool.to_string(),
                    epoch: self.epoch,
                    pending: self.fetcher.text(url.as_str()),
                });
            }
            Err(e) => log::warn!("tool {} not loaded: {}", tool, e),
        }
    }

    fn poll(&mut self) -> bool {
        let mut changed = false;
        for (tool, epoch, result) in drain_ready(&mut self.in_flight) {
            if epoch != self.epoch {
                log::debug!("dropping stale tool {}", tool);
                continue;
            }
            match result {
                Ok(html) => {
                    if let Err(e) = self.profile.set(TOOL_KEY, &tool) {
                        log::warn!("could not store tool state: {}", e);
                    }
                    self.content = Some(parse_fragment(&html));
                    self.current = Some(tool.clone());
                    self.bus.emit(Event::ContentLoaded {
                        slot: TOOL_SLOT.to_string(),
                        html: Rc::from(html),
                    });
                    self.bus.emit(Event::ToolShown(Some(tool)));
                }
                Err(e) => log::warn!("tool {} failed: {}", tool, e),
            }
            changed = true;
        }
        changed
    }
}

impl Listener for ToolPanel {
    fn on_event(&mut self, event: &Event) {
        if let Event::ToolToggle(tool) = event {
            self.toggle(tool);
        }
    }
}

pub struct Dashboard {
    ctx: WidgetContext,
    host: WidgetHost,
    history: Rc<RefCell<HistoryBridge>>,
    content: Rc<RefCell<ContentCollector>>,
    tools: Rc<RefCell<ToolPanel>>,
    page_url: String,
    page: Option<Pending<String>>,
    page_error: Option<String>,
}

impl Dashboard {
    pub fn new(
        config: &DashboardConfig,
        fetcher: Fetcher,
        prefs: PreferenceStore,
    ) -> Result<Self, ConfigError> {
        let base_url = url::Url::parse(&config.server).map_err(|e| ConfigError {
            message: format!("Invalid server {}: {}", config.server, e),
        })?;
        let page_url = config.page_url()?.to_string();
        let bus = EventBus::new();

        let start = format!("{}/", config.page.trim_end_matches('/'));
        let history = Rc::new(RefCell::new(HistoryBridge::new(
            Rc::clone(&bus),
            &config.page,
            &start,
        )));
        let initial_parameters = history
            .borrow()
            .current_state()
            .map(|s| s.parameters)
            .unwrap_or_default();
        let content = Rc::new(RefCell::new(ContentCollector::default()));
        let tools = Rc::new(RefCell::new(ToolPanel::new(
            Profile::new(&prefs, crate::widgets::view::ASPECT),
            Rc::clone(&bus),
            fetcher.clone(),
            base_url.clone(),
        )));
        bus.subscribe(&history);
        bus.subscribe(&content);
        bus.subscribe(&tools);

        let ctx = WidgetContext {
            bus,
            prefs,
            fetcher,
            base_url,
            tail_interval: config.tail_interval(),
            history_max: config.history_max,
            initial_parameters,
        };
        Ok(Self {
            ctx,
            host: WidgetHost::new(Registry::with_defaults()),
            history,
            content,
            tools,
            page_url,
            page: None,
            page_error: None,
        })
    }

    /// Start fetching the dashboard page; widgets attach once it arrives.
    pub fn load_page(&mut self) {
        log::info!("loading {}", self.page_url);
        self.page_error = None;
        self.page = Some(self.ctx.fetcher.text(&self.page_url));
    }

    pub fn page_error(&self) -> Option<&str> {
        self.page_error.as_deref()
    }

    pub fn is_loading_page(&self) -> bool {
        self.page.is_some()
    }

    /// Replace the widgets of `slot` with the ones found in `html`.
    pub fn mount(&mut self, slot: &str, html: &str) -> usize {
        let dropped = self.host.detach(slot);
        let attached = self.host.initialize(slot, html, &self.ctx);
        log::debug!("{}: {} widgets dropped, {} attached", slot, dropped, attached);
        if slot == PAGE_SLOT {
            if let Some(tree) = self.host.tree() {
                if let Some(page_url) = tree.borrow().page_url() {
                    self.history.borrow_mut().set_page_url(page_url);
                }
            }
        }
        attached
    }

    /// Collect finished fetches, run timers and deliver events until things
    /// settle. Returns true when anything changed.
    pub fn pump(&mut self, now: Instant) -> bool {
        let mut changed = self.poll_page();
        for _ in 0..MAX_ROUNDS {
            let mut progressed = self.host.poll(now);
            progressed |= self.tools.borrow_mut().poll();
            progressed |= self.ctx.bus.dispatch() > 0;

            let loaded = std::mem::take(&mut self.content.borrow_mut().loaded);
            for (slot, html) in loaded {
                self.mount(&slot, &html);
                progressed = true;
            }
            progressed |= self.reveal_tabs();

            changed |= progressed;
            if !progressed {
                break;
            }
        }
        changed
    }

    fn poll_page(&mut self) -> bool {
        let Some(page) = &self.page else {
            return false;
        };
        let result = match page.poll() {
            Poll::Waiting => return false,
            Poll::Ready(result) => result,
        };
        self.page = None;
        match result {
            Ok(html) => {
                self.mount(PAGE_SLOT, &html);
            }
            Err(e) => {
                log::error!("dashboard page failed: {}", e);
                self.page_error = Some(e.to_string());
            }
        }
        true
    }

    /// Logs inside a tab jump to their end the first time the tab shows.
    fn reveal_tabs(&self) -> bool {
        let mut revealed = false;
        for tabs in self.host.tab_sets() {
            for id in tabs.borrow_mut().take_first_shown() {
                for widget in self.host.within(&id) {
                    if let Widget::Logfile(log) = widget {
                        log.borrow_mut().mark_shown();
                        revealed = true;
                    }
                }
            }
        }
        revealed
    }

    pub fn bus(&self) -> &Rc<EventBus> {
        &self.ctx.bus
    }

    pub fn host(&self) -> &WidgetHost {
        &self.host
    }

    pub fn history(&self) -> Ref<'_, HistoryBridge> {
        self.history.borrow()
    }

    /// Address of the current history entry.
    pub fn address(&self) -> String {
        self.history.borrow().current_address().to_string()
    }

    pub fn select_path(&self, path: &str) {
        self.ctx.bus.emit(Event::PathSelect(path.to_string()));
    }

    pub fn back(&self) -> bool {
        self.history.borrow_mut().back()
    }

    pub fn forward(&self) -> bool {
        self.history.borrow_mut().forward()
    }

    pub fn toggle_tool(&self, tool: &str) {
        self.ctx.bus.emit(Event::ToolToggle(tool.to_string()));
    }

    /// Uri of the open tool, once its markup has loaded.
    pub fn current_tool(&self) -> Option<String> {
        self.tools.borrow().current.clone()
    }

    pub fn tool_content(&self) -> Option<Ref<'_, DomNode>> {
        Ref::filter_map(self.tools.borrow(), |t| t.content.as_ref()).ok()
    }

    pub fn is_loading_tool(&self) -> bool {
        !self.tools.borrow().in_flight.is_empty()
    }

    /// Reload the tree and the detail view.
    pub fn reload(&self) {
        if let Some(tree) = self.host.tree() {
            tree.borrow_mut().reload();
        }
        if let Some(view) = self.host.view() {
            view.borrow_mut().reload();
        }
    }

    pub fn tree(&self) -> Option<Rc<RefCell<Tree>>> {
        self.host.tree()
    }

    pub fn view(&self) -> Option<Rc<RefCell<DetailView>>> {
        self.host.view()
    }

    pub fn query(&self) -> Option<Rc<RefCell<QueryConsole>>> {
        self.host.query()
    }

    pub fn favorites(&self) -> Option<Rc<RefCell<Favorites>>> {
        self.host.favorites()
    }

    pub fn status_line(&self) -> Option<Rc<RefCell<StatusLine>>> {
        self.host.status_line()
    }

    pub fn logfiles(&self) -> Vec<Rc<RefCell<LogTail>>> {
        self.host.logfiles()
    }

    pub fn tab_sets(&self) -> Vec<Rc<RefCell<ResumingTabs>>> {
        self.host.tab_sets()
    }

    pub fn path_links(&self) -> Vec<Rc<RefCell<PathLink>>> {
        self.host.path_links()
    }

    pub fn tool_links(&self) -> Vec<Rc<RefCell<ToolLink>>> {
        self.host.tool_links()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Recorder;
    use crate::net::MockTransport;
    use crate::widgets::WidgetKind;
    use std::sync::Arc;

    const SERVER: &str = "http://cms.test";

    const TOOL: &str = "/bin/tools/info.html";

    const PAGE: &str = r#"<html><body>
        <nav class="composum-dashboard__navbar">
          <a class="path-link" data-path-uri="/bin/edit.html${path}[.html]" data-target="_blank">Edit</a>
          <a class="tool-link" data-tool-uri="/bin/tools/info.html">Info</a>
        </nav>
        <div class="dashboard__status-line"></div>
        <div class="dashboard-browser__tree" data-tree-url="/bin/tree.json" data-path="/content/page1"></div>
        <div class="dashboard-browser__view" data-view-url="/bin/view.html"></div>
        <div class="dashboard-widget__favorites">
          <ul class="dashboard-widget__favorites-groups">
            <li><a class="nav-link" id="history">History</a></li>
          </ul>
        </div>
    </body></html>"#;

    fn serve(mock: &MockTransport) {
        mock.respond(&format!("{}/apps/dashboard/browser.html", SERVER), PAGE);
        mock.respond(
            &format!("{}/bin/tree.json/", SERVER),
            r#"{"path":"/","children":[{"path":"/content"}]}"#,
        );
        mock.respond(
            &format!("{}/bin/tree.json/content", SERVER),
            r#"{"path":"/content","children":[{"path":"/content/page1"},{"path":"/content/page2"}]}"#,
        );
        mock.respond(
            &format!("{}/bin/tree.json/content/page1", SERVER),
            r#"{"path":"/content/page1","children":[]}"#,
        );
        mock.respond(
            &format!("{}/bin/tree.json/content/page2", SERVER),
            r#"{"path":"/content/page2","children":[]}"#,
        );
        mock.respond(
            &format!("{}/bin/view.html/content/page1", SERVER),
            r#"<p>page one</p><a class="path" href="/content/page2">next</a>
               <div class="dashboard__status-line">nested</div>"#,
        );
        mock.respond(&format!("{}/bin/view.html/content/page2", SERVER), "<p>page two</p>");
        mock.respond(&format!("{}/bin/view.html/", SERVER), "<p>root</p>");
        mock.respond(
            &format!("{}{}", SERVER, TOOL),
            r#"<h3>Info</h3><div class="dashboard__status-line">tool</div>"#,
        );
    }

    fn dashboard(mock: &Arc<MockTransport>, prefs: PreferenceStore) -> Dashboard {
        let config = DashboardConfig {
            server: SERVER.into(),
            ..Default::default()
        };
        let mut dashboard = Dashboard::new(&config, Fetcher::inline(mock.clone()), prefs).unwrap();
        dashboard.load_page();
        dashboard.pump(Instant::now());
        dashboard
    }

    fn shown(dashboard: &Dashboard) -> String {
        let view = dashboard.view().unwrap();
        let view = view.borrow();
        view.active_pane().map(|p| p.dom.collect_text()).unwrap_or_default()
    }

    #[test]
    fn initial_path_flows_to_every_widget() {
        let mock = Arc::new(MockTransport::new());
        serve(&mock);
        let dashboard = dashboard(&mock, PreferenceStore::in_memory());

        let tree = dashboard.tree().unwrap();
        assert_eq!(tree.borrow().selected_path(), Some("/content/page1"));
        assert!(shown(&dashboard).contains("page one"));
        assert_eq!(
            dashboard.status_line().unwrap().borrow().value(),
            "/content/page1"
        );
        assert_eq!(dashboard.address(), "/apps/dashboard/browser.html/content/page1");
        assert_eq!(dashboard.history().session().len(), 2);
        assert_eq!(
            dashboard.favorites().unwrap().borrow().history(),
            &["/content/page1"]
        );
        // the status line inside the loaded pane got its own widget
        assert!(dashboard
            .host()
            .find("view", WidgetKind::StatusLine)
            .is_some());
    }

    #[test]
    fn links_back_and_forward() {
        let mock = Arc::new(MockTransport::new());
        serve(&mock);
        let mut dashboard = dashboard(&mock, PreferenceStore::in_memory());

        let link = dashboard.view().unwrap().borrow().active_pane().unwrap().links[0].path.clone();
        dashboard.view().unwrap().borrow().follow_link(&link);
        dashboard.pump(Instant::now());
        assert!(shown(&dashboard).contains("page two"));
        assert_eq!(dashboard.history().session().len(), 3);

        assert!(dashboard.back());
        dashboard.pump(Instant::now());
        assert!(shown(&dashboard).contains("page one"));
        assert_eq!(dashboard.history().session().len(), 3);
        assert!(dashboard.history().session().can_go_forward());

        assert!(dashboard.forward());
        dashboard.pump(Instant::now());
        assert!(shown(&dashboard).contains("page two"));
        assert_eq!(
            dashboard.tree().unwrap().borrow().selected_path(),
            Some("/content/page2")
        );
    }

    #[test]
    fn tool_widgets_attach_and_detach_on_toggle() {
        let mock = Arc::new(MockTransport::new());
        serve(&mock);
        let prefs = PreferenceStore::in_memory();
        let mut first = dashboard(&mock, prefs.clone());
        let link = Rc::clone(&first.tool_links()[0]);
        assert!(!link.borrow().is_active());

        link.borrow().toggle();
        first.pump(Instant::now());
        assert_eq!(first.current_tool().as_deref(), Some(TOOL));
        assert!(link.borrow().is_active());
        assert!(first.host().find(TOOL_SLOT, WidgetKind::StatusLine).is_some());
        assert!(first.tool_content().unwrap().collect_text().contains("Info"));

        // the open tool comes back after a restart
        let mut second = dashboard(&mock, prefs);
        assert_eq!(second.current_tool().as_deref(), Some(TOOL));
        assert!(second.host().find(TOOL_SLOT, WidgetKind::StatusLine).is_some());
        assert!(second.tool_links()[0].borrow().is_active());

        second.toggle_tool(TOOL);
        second.pump(Instant::now());
        assert_eq!(second.current_tool(), None);
        assert!(second.tool_content().is_none());
        assert!(second.host().find(TOOL_SLOT, WidgetKind::StatusLine).is_none());
        assert!(!second.tool_links()[0].borrow().is_active());
    }

    #[test]
    fn failed_tool_stays_closed() {
        let mock = Arc::new(MockTransport::new());
        serve(&mock);
        mock.fail(&format!("{}{}", SERVER, TOOL), 500);
        let mut dashboard = dashboard(&mock, PreferenceStore::in_memory());
        dashboard.toggle_tool(TOOL);
        dashboard.pump(Instant::now());
        assert_eq!(dashboard.current_tool(), None);
        assert!(!dashboard.is_loading_tool());
        assert!(!dashboard.tool_links()[0].borrow().is_active());
    }

    #[test]
    fn path_link_follows_the_selection() {
        let mock = Arc::new(MockTransport::new());
        serve(&mock);
        let dashboard = dashboard(&mock, PreferenceStore::in_memory());
        let link = Rc::clone(&dashboard.path_links()[0]);
        assert_eq!(
            link.borrow().url().as_deref(),
            Some("http://cms.test/bin/edit.html/content/page1.html")
        );
        assert_eq!(link.borrow().target(), Some("_blank"));
    }

    #[test]
    fn selection_reaches_early_and_late_listeners_once_in_order() {
        let mock = Arc::new(MockTransport::new());
        serve(&mock);
        let config = DashboardConfig {
            server: SERVER.into(),
            ..Default::default()
        };
        let mut dashboard =
            Dashboard::new(&config, Fetcher::inline(mock.clone()), PreferenceStore::in_memory()).unwrap();
        // subscribed before any widget exists
        let early = Recorder::new();
        dashboard.bus().subscribe(&early);
        dashboard.load_page();
        dashboard.pump(Instant::now());
        // subscribed after every widget
        let late = Recorder::new();
        dashboard.bus().subscribe(&late);
        early.borrow_mut().events.clear();
        let entries = dashboard.history().session().len();

        dashboard.select_path("/content/page2");
        dashboard.pump(Instant::now());

        for recorder in [&early, &late] {
            let recorder = recorder.borrow();
            let names: Vec<_> = recorder
                .events
                .iter()
                .map(Event::name)
                .filter(|n| n.starts_with("path:"))
                .collect();
            assert_eq!(names, vec!["path:select", "path:selected"]);
            assert_eq!(recorder.selected_paths(), vec!["/content/page2".to_string()]);
        }
        assert_eq!(dashboard.history().session().len(), entries + 1);
        assert_eq!(dashboard.address(), "/apps/dashboard/browser.html/content/page2");
        assert!(shown(&dashboard).contains("page two"));
        assert_eq!(
            dashboard.status_line().unwrap().borrow().value(),
            "/content/page2"
        );
    }

    #[test]
    fn page_failure_is_reported() {
        let mock = Arc::new(MockTransport::new());
        mock.fail(&format!("{}/apps/dashboard/browser.html", SERVER), 404);
        let dashboard = dashboard(&mock, PreferenceStore::in_memory());
        assert!(dashboard.page_error().is_some());
        assert!(dashboard.host().is_empty());
    }
}
