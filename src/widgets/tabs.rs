//! Tab sets that come back on the tab last shown.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::{ElementData, Widget, WidgetContext, WidgetError};
use crate::dom::extract::{self, TabLink};
use crate::prefs::Profile;

const TAB_KEY: &str = "currentTab";
const NAV_LINKS: &str = ".resuming-tabs_nav .nav-link, .nav-tabs .nav-link";

pub struct ResumingTabs {
    profile: Profile,
    tabs: Vec<TabLink>,
    panes: HashMap<String, Rc<str>>,
    active: Option<String>,
    shown: HashSet<String>,
    first_shown: Vec<String>,
}

pub(super) fn build(el: &ElementData, ctx: &WidgetContext) -> Result<Widget, WidgetError> {
    let aspect = el.require_data("tabs-id")?;
    let tabs = extract::tabs(&el.inner_html, NAV_LINKS);
    let panes: HashMap<String, Rc<str>> = tabs
        .iter()
        .filter_map(|t| {
            extract::pane_html(&el.inner_html, "", &t.id).map(|html| (t.id.clone(), Rc::from(html)))
        })
        .collect();
    let widget = ResumingTabs::new(Profile::new(&ctx.prefs, aspect), tabs, panes);
    Ok(Widget::Tabs(Rc::new(RefCell::new(widget))))
}

impl ResumingTabs {
    /// Restores the stored tab, or the first one.
    pub fn new(profile: Profile, tabs: Vec<TabLink>, panes: HashMap<String, Rc<str>>) -> Self {
        let mut widget = Self {
            profile,
            tabs,
            panes,
            active: None,
            shown: HashSet::new(),
            first_shown: Vec::new(),
        };
        let stored: Option<String> = widget.profile.get(TAB_KEY);
        widget.show_tab(stored.as_deref().unwrap_or_default(), true);
        widget
    }

    pub fn tabs(&self) -> &[TabLink] {
        &self.tabs
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn pane(&self, id: &str) -> Option<&Rc<str>> {
        self.panes.get(id)
    }

    /// Show tab `id`; with `force` an unknown id falls back to the first tab.
    /// Returns the id shown.
    pub fn show_tab(&mut self, id: &str, force: bool) -> Option<String> {
        let target = if self.tabs.iter().any(|t| t.id == id) {
            id.to_string()
        } else if force {
            self.tabs.first()?.id.clone()
        } else {
            return None;
        };
        if let Err(e) = self.profile.set(TAB_KEY, &target) {
            log::warn!("could not store tab of {}: {}", self.profile.aspect(), e);
        }
        if self.shown.insert(target.clone()) {
            self.first_shown.push(target.clone());
        }
        self.active = Some(target.clone());
        Some(target)
    }

    /// Tabs shown for the first time since the last call.
    pub fn take_first_shown(&mut self) -> Vec<String> {
        std::mem::take(&mut self.first_shown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::PreferenceStore;

    fn tab(id: &str) -> TabLink {
        TabLink {
            id: id.into(),
            label: id.to_uppercase(),
            active: false,
        }
    }

    #[test]
    fn resumes_the_stored_tab() {
        let store = PreferenceStore::in_memory();
        let mut tabs = ResumingTabs::new(
            Profile::new(&store, "logs"),
            vec![tab("error"), tab("access")],
            HashMap::new(),
        );
        assert_eq!(tabs.active(), Some("error"));
        assert_eq!(tabs.show_tab("access", false).as_deref(), Some("access"));
        assert_eq!(tabs.show_tab("gone", false), None);

        let again = ResumingTabs::new(
            Profile::new(&store, "logs"),
            vec![tab("error"), tab("access")],
            HashMap::new(),
        );
        assert_eq!(again.active(), Some("access"));
    }

    #[test]
    fn vanished_tab_falls_back_to_first() {
        let store = PreferenceStore::in_memory();
        Profile::new(&store, "logs").set(TAB_KEY, "old").unwrap();
        let tabs = ResumingTabs::new(Profile::new(&store, "logs"), vec![tab("a")], HashMap::new());
        assert_eq!(tabs.active(), Some("a"));
    }

    #[test]
    fn reports_each_tab_once_on_first_show() {
        let store = PreferenceStore::in_memory();
        let mut tabs = ResumingTabs::new(
            Profile::new(&store, "logs"),
            vec![tab("a"), tab("b")],
            HashMap::new(),
        );
        assert_eq!(tabs.take_first_shown(), vec!["a"]);
        tabs.show_tab("b", false);
        tabs.show_tab("a", false);
        tabs.show_tab("b", false);
        assert_eq!(tabs.take_first_shown(), vec!["b"]);
    }

    #[test]
    fn builds_from_markup() {
        let store = PreferenceStore::in_memory();
        let html = r#"<ul class="resuming-tabs_nav"><li><a class="nav-link" aria-controls="e">Error</a></li></ul>
            <div class="resuming-tabs_pane" id="e"><textarea>x</textarea></div>"#;
        let tabs = extract::tabs(html, NAV_LINKS);
        let panes: HashMap<String, Rc<str>> = [("e".to_string(), Rc::from(extract::pane_html(html, "", "e").unwrap()))]
            .into_iter()
            .collect();
        let widget = ResumingTabs::new(Profile::new(&store, "logs"), tabs, panes);
        assert_eq!(widget.tabs()[0].label, "Error");
        assert!(widget.pane("e").unwrap().contains("textarea"));
    }
}
