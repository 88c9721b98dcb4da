//! Favorite paths and the visit history, grouped into tabs.

use std::cell::RefCell;
use std::rc::Rc;

use regex::Regex;
use scraper::{Html, Selector};

use super::{ElementData, Widget, WidgetContext, WidgetError};
use crate::events::{Event, EventBus, Listener};
use crate::prefs::Profile;

pub const ASPECT: &str = "favorites";
/// Group listing the visit history instead of the selection.
pub const HISTORY_GROUP: &str = "history";
const SELECTION_KEY: &str = "selection";
const HISTORY_KEY: &str = "history";
const TAB_KEY: &str = "currentTab";
const GROUP_LINKS: &str = ".dashboard-widget__favorites-groups .nav-link";

/// A tab of the favorites panel. Without a pattern it holds every favorite.
#[derive(Clone, Debug)]
pub struct FavoriteGroup {
    pub id: String,
    pub label: String,
    pub pattern: Option<Regex>,
}

impl FavoriteGroup {
    pub fn new(id: &str, label: &str, pattern: Option<&str>) -> Result<Self, WidgetError> {
        let pattern = pattern
            .filter(|p| !p.is_empty())
            .map(Regex::new)
            .transpose()
            .map_err(|e| WidgetError::new(format!("bad pattern in group {}: {}", id, e)))?;
        Ok(Self {
            id: id.to_string(),
            label: label.to_string(),
            pattern,
        })
    }

    fn accepts(&self, path: &str) -> bool {
        self.pattern.as_ref().map_or(true, |p| p.is_match(path))
    }
}

fn groups_from_markup(html: &str) -> Result<Vec<FavoriteGroup>, WidgetError> {
    let selector = Selector::parse(GROUP_LINKS)
        .map_err(|e| WidgetError::new(format!("bad selector {}: {:?}", GROUP_LINKS, e)))?;
    let document = Html::parse_fragment(html);
    let mut groups = Vec::new();
    for link in document.select(&selector) {
        let Some(id) = link.value().id() else {
            continue;
        };
        let label = link.text().collect::<String>().trim().to_string();
        groups.push(FavoriteGroup::new(id, &label, link.value().attr("data-pattern"))?);
    }
    Ok(groups)
}

pub struct Favorites {
    profile: Profile,
    bus: Rc<EventBus>,
    selection: Vec<String>,
    history: Vec<String>,
    history_max: usize,
    current_path: Option<String>,
    groups: Vec<FavoriteGroup>,
    active_group: Option<String>,
}

pub(super) fn build(el: &ElementData, ctx: &WidgetContext) -> Result<Widget, WidgetError> {
    let groups = groups_from_markup(&el.inner_html)?;
    let history_max = match el.data("history-max") {
        Some(max) => max
            .parse()
            .map_err(|_| WidgetError::new(format!("bad data-history-max {}", max)))?,
        None => ctx.history_max,
    };
    let favorites = Favorites::new(
        Profile::new(&ctx.prefs, ASPECT),
        Rc::clone(&ctx.bus),
        groups,
        history_max,
    );
    Ok(Widget::Favorites(Rc::new(RefCell::new(favorites))))
}

impl Favorites {
    pub fn new(
        profile: Profile,
        bus: Rc<EventBus>,
        groups: Vec<FavoriteGroup>,
        history_max: usize,
    ) -> Self {
        let mut favorites = Self {
            selection: profile.get(SELECTION_KEY).unwrap_or_default(),
            history: profile.get(HISTORY_KEY).unwrap_or_default(),
            profile,
            bus,
            history_max,
            current_path: None,
            groups,
            active_group: None,
        };
        let stored: Option<String> = favorites.profile.get(TAB_KEY);
        favorites.show_group(stored.as_deref().unwrap_or_default(), true);
        favorites
    }

    pub fn groups(&self) -> &[FavoriteGroup] {
        &self.groups
    }

    pub fn active_group(&self) -> Option<&str> {
        self.active_group.as_deref()
    }

    pub fn current_path(&self) -> Option<&str> {
        self.current_path.as_deref()
    }

    pub fn selection(&self) -> &[String] {
        &self.selection
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn is_favorite(&self, path: &str) -> bool {
        self.selection.iter().any(|p| p == path)
    }

    /// Whether the current path is a favorite.
    pub fn current_is_favorite(&self) -> bool {
        self.current_path
            .as_deref()
            .is_some_and(|p| self.is_favorite(p))
    }

    fn store(&mut self, key: &str) {
        let value = match key {
            SELECTION_KEY => &self.selection,
            _ => &self.history,
        };
        let value = value.clone();
        if let Err(e) = self.profile.set(key, value) {
            log::warn!("could not store favorites {}: {}", key, e);
        }
    }

    /// Remember a visit. Consecutive visits of one path count once.
    pub fn on_path_selected(&mut self, path: &str) {
        self.current_path = Some(path.to_string());
        if self.history.last().map(String::as_str) == Some(path) {
            return;
        }
        self.history.push(path.to_string());
        if self.history_max > 0 && self.history.len() > self.history_max {
            let excess = self.history.len() - self.history_max;
            self.history.drain(..excess);
        }
        self.store(HISTORY_KEY);
    }

    /// Add or remove the current path. Returns whether it is a favorite now.
    pub fn toggle_favorite(&mut self) -> Option<bool> {
        let path = self.current_path.clone()?;
        let now_favorite = match self.selection.iter().position(|p| *p == path) {
            Some(index) => {
                self.selection.remove(index);
                false
            }
            None => {
                self.selection.push(path);
                self.selection.sort();
                true
            }
        };
        self.store(SELECTION_KEY);
        Some(now_favorite)
    }

    /// Switch groups; with `force` an unknown id falls back to the first.
    pub fn show_group(&mut self, id: &str, force: bool) {
        let target = if self.groups.iter().any(|g| g.id == id) {
            id.to_string()
        } else if force {
            match self.groups.first() {
                Some(g) => g.id.clone(),
                None => return,
            }
        } else {
            return;
        };
        if let Err(e) = self.profile.set(TAB_KEY, &target) {
            log::warn!("could not store favorites tab: {}", e);
        }
        self.active_group = Some(target);
    }

    fn active(&self) -> Option<&FavoriteGroup> {
        let id = self.active_group.as_deref()?;
        self.groups.iter().find(|g| g.id == id)
    }

    /// Paths listed under the active group: the history newest first, or
    /// the favorites the group's pattern accepts.
    pub fn entries(&self) -> Vec<String> {
        if self.active_group.as_deref() == Some(HISTORY_GROUP) {
            return self.history.iter().rev().cloned().collect();
        }
        let group = self.active();
        self.selection
            .iter()
            .filter(|p| group.map_or(true, |g| g.accepts(p)))
            .cloned()
            .collect()
    }

    /// Empty the history group, or drop the favorites of the active group.
    pub fn clear(&mut self) {
        if self.active_group.as_deref() == Some(HISTORY_GROUP) {
            self.history.clear();
            self.store(HISTORY_KEY);
            return;
        }
        let group = self.active().cloned();
        self.selection
            .retain(|p| !group.as_ref().map_or(true, |g| g.accepts(p)));
        self.store(SELECTION_KEY);
    }

    pub fn select(&self, path: &str) {
        self.bus.emit(Event::PathSelect(path.to_string()));
    }
}

impl Listener for Favorites {
    fn on_event(&mut self, event: &Event) {
        if let Event::PathSelected(path) = event {
            self.on_path_selected(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::PreferenceStore;

    const MARKUP: &str = r#"
        <ul class="nav dashboard-widget__favorites-groups">
          <li><a class="nav-link" id="all">All</a></li>
          <li><a class="nav-link" id="content" data-pattern="^/content/">Content</a></li>
          <li><a class="nav-link" id="history">History</a></li>
        </ul>"#;

    fn favorites(store: &PreferenceStore, max: usize) -> Favorites {
        Favorites::new(
            Profile::new(store, ASPECT),
            EventBus::new(),
            groups_from_markup(MARKUP).unwrap(),
            max,
        )
    }

    #[test]
    fn reads_groups() {
        let groups = groups_from_markup(MARKUP).unwrap();
        let ids: Vec<_> = groups.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["all", "content", "history"]);
        assert!(groups[1].accepts("/content/a"));
        assert!(!groups[1].accepts("/apps/a"));
        assert!(groups[0].accepts("/apps/a"));
    }

    #[test]
    fn history_is_capped_and_newest_first() {
        let store = PreferenceStore::in_memory();
        let mut fav = favorites(&store, 3);
        for path in ["/a", "/b", "/b", "/c", "/d"] {
            fav.on_path_selected(path);
        }
        assert_eq!(fav.history(), &["/b", "/c", "/d"]);
        fav.show_group(HISTORY_GROUP, false);
        assert_eq!(fav.entries(), vec!["/d", "/c", "/b"]);

        let reloaded = favorites(&store, 3);
        assert_eq!(reloaded.history(), &["/b", "/c", "/d"]);
        assert_eq!(reloaded.active_group(), Some(HISTORY_GROUP));
    }

    #[test]
    fn toggle_keeps_selection_sorted() {
        let store = PreferenceStore::in_memory();
        let mut fav = favorites(&store, 200);
        assert_eq!(fav.toggle_favorite(), None);
        for path in ["/content/b", "/apps/x", "/content/a"] {
            fav.on_path_selected(path);
            assert_eq!(fav.toggle_favorite(), Some(true));
        }
        assert_eq!(fav.selection(), &["/apps/x", "/content/a", "/content/b"]);
        assert!(fav.current_is_favorite());
        assert_eq!(fav.toggle_favorite(), Some(false));
        assert!(!fav.is_favorite("/content/a"));

        let stored: Vec<String> = Profile::new(&store, ASPECT).get(SELECTION_KEY).unwrap();
        assert_eq!(stored, vec!["/apps/x", "/content/b"]);
    }

    #[test]
    fn clear_only_touches_the_active_group() {
        let store = PreferenceStore::in_memory();
        let mut fav = favorites(&store, 200);
        for path in ["/content/a", "/apps/x"] {
            fav.on_path_selected(path);
            fav.toggle_favorite();
        }
        fav.show_group("content", false);
        assert_eq!(fav.entries(), vec!["/content/a"]);
        fav.clear();
        assert_eq!(fav.selection(), &["/apps/x"]);

        fav.show_group(HISTORY_GROUP, false);
        fav.clear();
        assert!(fav.history().is_empty());
        assert_eq!(fav.selection(), &["/apps/x"]);
    }

    #[test]
    fn first_group_is_the_default() {
        let store = PreferenceStore::in_memory();
        let fav = favorites(&store, 200);
        assert_eq!(fav.active_group(), Some("all"));
    }

    #[test]
    fn bad_pattern_is_an_error() {
        assert!(FavoriteGroup::new("x", "X", Some("(")).is_err());
    }
}
