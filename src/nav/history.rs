//! Navigation history bridge.
//!
//! Keeps a session history of addresses (the desktop stand-in for the
//! browser address bar) in step with tree selections and query changes.
//! Entries are `page_url + path (?query)`, composed and parsed with the
//! grammar in [`super::location`].

use std::rc::Rc;

use crate::events::{Event, EventBus, Listener};

use super::location::{compose, encode_parameters, escape_path, unescape_path, Location, Parameters};

/// The externally observable "current location".
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct NavigationState {
    pub path: String,
    pub parameters: Parameters,
}

/// Back/forward stack of addresses.
#[derive(Clone, Debug)]
pub struct SessionHistory {
    entries: Vec<String>,
    index: usize,
}

impl SessionHistory {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            entries: vec![initial.into()],
            index: 0,
        }
    }

    pub fn current(&self) -> &str {
        &self.entries[self.index]
    }

    /// Push an entry, dropping any forward history first.
    pub fn push(&mut self, entry: String) {
        self.entries.truncate(self.index + 1);
        self.entries.push(entry);
        self.index = self.entries.len() - 1;
    }

    pub fn can_go_back(&self) -> bool {
        self.index > 0
    }

    pub fn can_go_forward(&self) -> bool {
        self.index + 1 < self.entries.len()
    }

    pub fn back(&mut self) -> Option<&str> {
        if self.can_go_back() {
            self.index -= 1;
            Some(self.current())
        } else {
            None
        }
    }

    pub fn forward(&mut self) -> Option<&str> {
        if self.can_go_forward() {
            self.index += 1;
            Some(self.current())
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}

pub struct HistoryBridge {
    session: SessionHistory,
    page_url: String,
    bus: Rc<EventBus>,
}

impl HistoryBridge {
    /// `page_url` is the dashboard page the selected path is appended to,
    /// e.g. `/apps/dashboard/browser.html`. `initial` is the address the
    /// session starts at.
    pub fn new(bus: Rc<EventBus>, page_url: &str, initial: &str) -> Self {
        Self {
            session: SessionHistory::new(initial),
            page_url: page_url.trim_end_matches('/').to_string(),
            bus,
        }
    }

    /// Show paths under a different page from now on. Recorded entries
    /// under the old page are moved to the new one.
    pub fn set_page_url(&mut self, page_url: &str) {
        let page_url = page_url.trim_end_matches('/').to_string();
        if page_url == self.page_url {
            return;
        }
        let old = std::mem::replace(&mut self.page_url, page_url);
        let rebased: Vec<String> = self
            .session
            .entries
            .iter()
            .map(|entry| self.rebase(entry, &old))
            .collect();
        log::debug!("history moved from {} to {}", old, self.page_url);
        self.session.entries = rebased;
    }

    fn rebase(&self, entry: &str, old: &str) -> String {
        let Some(location) = Location::parse(entry) else {
            return entry.to_string();
        };
        match location.path.strip_prefix(old) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => compose(
                &location.server,
                &format!("{}{}", escape_path(&self.page_url), rest),
                &location.query,
            ),
            _ => entry.to_string(),
        }
    }

    pub fn page_url(&self) -> &str {
        &self.page_url
    }

    pub fn session(&self) -> &SessionHistory {
        &self.session
    }

    pub fn current_address(&self) -> &str {
        self.session.current()
    }

    /// Address a path is shown under; reserved characters in the path are
    /// escaped so they cannot turn into a query.
    pub fn address_for(&self, path: &str) -> String {
        escape_path(&format!("{}{}", self.page_url, path))
    }

    fn current_location(&self) -> Location {
        Location::parse(self.session.current()).unwrap_or_else(|| Location {
            uri: self.page_url.clone(),
            server: String::new(),
            path: self.page_url.clone(),
            name: String::new(),
            query: String::new(),
            parameters: Parameters::new(),
        })
    }

    /// Record a path selection. The current query is carried over. No-op
    /// when the path is already current.
    pub fn push_path(&mut self, path: &str) -> bool {
        let current = self.current_location();
        let Some(next) = Location::parse(&self.address_for(path)) else {
            log::debug!("not recording unparsable path {}", path);
            return false;
        };
        if next.path == current.path {
            return false;
        }
        let entry = compose(&current.server, &next.path, &current.query);
        log::debug!("history push {}", entry);
        self.session.push(entry);
        true
    }

    /// Record auxiliary parameters under the current path. No-op when the
    /// encoded query is unchanged.
    pub fn push_query(&mut self, parameters: &Parameters) -> bool {
        let current = self.current_location();
        let query = encode_parameters(parameters);
        if current.query == query {
            return false;
        }
        let entry = current.with_query(&query);
        log::debug!("history push {}", entry);
        self.session.push(entry);
        true
    }

    /// Parse an entry back into the state that produced it.
    pub fn parse_entry(&self, entry: &str) -> Option<NavigationState> {
        let location = Location::parse(entry)?;
        let full = unescape_path(&location.path);
        let path = full.strip_prefix(&self.page_url).unwrap_or(&full);
        let path = if path.is_empty() { "/" } else { path };
        Some(NavigationState {
            path: path.to_string(),
            parameters: location.parameters,
        })
    }

    pub fn current_state(&self) -> Option<NavigationState> {
        self.parse_entry(self.session.current())
    }

    /// Step back and replay the entry.
    pub fn back(&mut self) -> bool {
        let entry = self.session.back().map(str::to_string);
        entry.map(|e| self.restore(&e)).unwrap_or(false)
    }

    /// Step forward and replay the entry.
    pub fn forward(&mut self) -> bool {
        let entry = self.session.forward().map(str::to_string);
        entry.map(|e| self.restore(&e)).unwrap_or(false)
    }

    /// Re-trigger the selection and query events an entry stands for.
    fn restore(&self, entry: &str) -> bool {
        let Some(state) = self.parse_entry(entry) else {
            log::debug!("ignoring unparsable history entry {}", entry);
            return false;
        };
        self.bus.emit(Event::PathSelect(state.path));
        if !state.parameters.is_empty() {
            self.bus.emit(Event::QueryChange(state.parameters));
        }
        true
    }
}

impl Listener for HistoryBridge {
    fn on_event(&mut self, event: &Event) {
        match event {
            Event::PathSelected(path) => {
                self.push_path(path);
            }
            Event::QuerySubmitted(parameters) => {
                self.push_query(parameters);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Recorder;

    const PAGE: &str = "/apps/dashboard/browser.html";

    fn bridge() -> (Rc<EventBus>, HistoryBridge) {
        let bus = EventBus::new();
        let bridge = HistoryBridge::new(bus.clone(), PAGE, "/apps/dashboard/browser.html/");
        (bus, bridge)
    }

    fn params(pairs: &[(&str, &str)]) -> Parameters {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn pushing_the_same_path_twice_records_once() {
        let (_bus, mut bridge) = bridge();
        assert!(bridge.push_path("/content"));
        assert!(!bridge.push_path("/content"));
        assert_eq!(bridge.session().len(), 2);
        assert_eq!(bridge.current_address(), "/apps/dashboard/browser.html/content");
    }

    #[test]
    fn path_push_keeps_the_query() {
        let (_bus, mut bridge) = bridge();
        bridge.push_query(&params(&[("query", "a")]));
        bridge.push_path("/content");
        assert_eq!(bridge.current_address(), "/apps/dashboard/browser.html/content?query=a");
    }

    #[test]
    fn query_change_without_path_change_pushes_once() {
        let (_bus, mut bridge) = bridge();
        bridge.push_path("/content");
        let before = bridge.session().len();
        assert!(bridge.push_query(&params(&[("query", "a")])));
        assert!(bridge.push_query(&params(&[("query", "b")])));
        assert!(!bridge.push_query(&params(&[("query", "b")])));
        assert_eq!(bridge.session().len(), before + 2);
        let state = bridge.current_state().unwrap();
        assert_eq!(state.path, "/content");
        assert_eq!(state.parameters, params(&[("query", "b")]));
    }

    #[test]
    fn entries_round_trip() {
        let (_bus, mut bridge) = bridge();
        let parameters = params(&[("query", "select * from [nt:file]"), ("arg1", "/x y")]);
        bridge.push_path("/content/page 1");
        bridge.push_query(&parameters);
        let state = bridge.parse_entry(bridge.current_address()).unwrap();
        assert_eq!(
            state,
            NavigationState {
                path: "/content/page 1".into(),
                parameters,
            }
        );
    }

    #[test]
    fn reserved_characters_stay_in_the_path() {
        let (bus, mut bridge) = bridge();
        let recorder = Recorder::new();
        bus.subscribe(&recorder);
        bridge.push_query(&params(&[("query", "q")]));
        assert!(bridge.push_path("/content/what?now"));
        assert!(bridge.push_path("/content/100% #1"));
        assert_eq!(
            bridge.session().entries()[2],
            "/apps/dashboard/browser.html/content/what%3Fnow?query=q"
        );
        let state = bridge.current_state().unwrap();
        assert_eq!(state.path, "/content/100% #1");
        assert_eq!(state.parameters, params(&[("query", "q")]));

        assert!(bridge.back());
        bus.dispatch();
        assert_eq!(recorder.borrow().events[0], Event::PathSelect("/content/what?now".into()));
        // the same path again is no new entry
        assert!(!bridge.push_path("/content/what?now"));
    }

    #[test]
    fn moving_the_page_rebases_recorded_entries() {
        let (bus, mut bridge) = bridge();
        let recorder = Recorder::new();
        bus.subscribe(&recorder);
        bridge.set_page_url("/bin/browser.html/");
        assert_eq!(bridge.current_address(), "/bin/browser.html/");
        bridge.push_path("/content");
        let first = bridge.session().entries()[0].clone();
        assert_eq!(bridge.parse_entry(&first).unwrap().path, "/");

        assert!(bridge.back());
        bus.dispatch();
        assert_eq!(recorder.borrow().events, vec![Event::PathSelect("/".into())]);
        assert!(!bridge.push_path("/"));
    }

    #[test]
    fn root_path_round_trips() {
        let (_bus, mut bridge) = bridge();
        bridge.push_path("/content");
        bridge.push_path("/");
        assert_eq!(bridge.current_state().unwrap().path, "/");
    }

    #[test]
    fn back_and_forward_replay_events() {
        let (bus, mut bridge) = bridge();
        let recorder = Recorder::new();
        bus.subscribe(&recorder);

        bridge.push_path("/content");
        bridge.push_query(&params(&[("query", "q")]));
        bridge.push_path("/apps");

        assert!(bridge.back());
        bus.dispatch();
        assert_eq!(
            recorder.borrow().events,
            vec![
                Event::PathSelect("/content".into()),
                Event::QueryChange(params(&[("query", "q")])),
            ]
        );

        recorder.borrow_mut().events.clear();
        assert!(bridge.forward());
        assert!(!bridge.forward());
        bus.dispatch();
        assert_eq!(recorder.borrow().events[0], Event::PathSelect("/apps".into()));
    }

    #[test]
    fn push_after_back_drops_forward_entries() {
        let (_bus, mut bridge) = bridge();
        bridge.push_path("/a");
        bridge.push_path("/b");
        bridge.back();
        bridge.push_path("/c");
        assert!(!bridge.session().can_go_forward());
        assert_eq!(bridge.session().len(), 3);
    }

    #[test]
    fn listens_for_selection_and_queries() {
        let (_bus, mut bridge) = bridge();
        bridge.on_event(&Event::PathSelected("/content".into()));
        bridge.on_event(&Event::PathSelected("/content".into()));
        bridge.on_event(&Event::QuerySubmitted(params(&[("query", "x")])));
        assert_eq!(bridge.session().len(), 3);
    }
}
