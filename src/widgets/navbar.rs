//! Navbar links: external views of the current path and tool toggles.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::OnceLock;

use regex::Regex;

use super::{ElementData, Widget, WidgetContext, WidgetError};
use crate::events::{Event, EventBus, Listener};
use crate::nav::location::escape_path;

const PATH_TOKEN: &str = "${path}";

fn extension() -> &'static Regex {
    static EXTENSION: OnceLock<Regex> = OnceLock::new();
    EXTENSION.get_or_init(|| Regex::new(r"\.[^.]+$").expect("extension pattern is a valid regex"))
}

fn optional_group() -> &'static Regex {
    static GROUP: OnceLock<Regex> = OnceLock::new();
    GROUP.get_or_init(|| Regex::new(r"\[([^\]]*)\]").expect("group pattern is a valid regex"))
}

fn label(el: &ElementData) -> String {
    let text = el.text.trim();
    if text.is_empty() {
        el.attr("title").unwrap_or_default().to_string()
    } else {
        text.to_string()
    }
}

/// Opens the current path in another view, e.g. `/bin/edit.html${path}[.html]`.
///
/// `${path}` is replaced by the selected path. Bracketed parts are kept
/// only when the path has no extension of its own.
pub struct PathLink {
    label: String,
    path_uri: String,
    target: Option<String>,
    base_url: url::Url,
    current: Option<String>,
}

pub(super) fn build_path_link(el: &ElementData, ctx: &WidgetContext) -> Result<Widget, WidgetError> {
    let link = PathLink::new(
        &label(el),
        el.require_data("path-uri")?,
        el.data("target"),
        ctx.base_url.clone(),
    );
    Ok(Widget::PathLink(Rc::new(RefCell::new(link))))
}

impl PathLink {
    pub fn new(label: &str, path_uri: &str, target: Option<&str>, base_url: url::Url) -> Self {
        Self {
            label: label.to_string(),
            path_uri: path_uri.to_string(),
            target: target.map(str::to_string),
            base_url,
            current: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Window the link opens in; `None` for the default.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Location for the current path, `None` while nothing is selected.
    pub fn url(&self) -> Option<String> {
        let path = self.current.as_deref()?;
        let keep = if extension().is_match(path) { "" } else { "$1" };
        let url = self.path_uri.replace(PATH_TOKEN, &escape_path(path));
        let url = optional_group().replace_all(&url, keep);
        match self.base_url.join(&url) {
            Ok(resolved) => Some(resolved.into()),
            Err(e) => {
                log::warn!("path link {} unusable: {}", url, e);
                None
            }
        }
    }
}

impl Listener for PathLink {
    fn on_event(&mut self, event: &Event) {
        if let Event::PathSelected(path) = event {
            self.current = Some(path.clone());
        }
    }
}

/// Toggles the tool panel showing `data-tool-uri`; active while that tool
/// is open.
pub struct ToolLink {
    label: String,
    tool_uri: String,
    active: bool,
    bus: Rc<EventBus>,
}

pub(super) fn build_tool_link(el: &ElementData, ctx: &WidgetContext) -> Result<Widget, WidgetError> {
    let link = ToolLink {
        label: label(el),
        tool_uri: el.require_data("tool-uri")?.to_string(),
        active: false,
        bus: Rc::clone(&ctx.bus),
    };
    Ok(Widget::ToolLink(Rc::new(RefCell::new(link))))
}

impl ToolLink {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn tool_uri(&self) -> &str {
        &self.tool_uri
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn toggle(&self) {
        self.bus.emit(Event::ToolToggle(self.tool_uri.clone()));
    }
}

impl Listener for ToolLink {
    fn on_event(&mut self, event: &Event) {
        if let Event::ToolShown(shown) = event {
            self.active = shown.as_deref() == Some(self.tool_uri.as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Recorder;
    use crate::net::MockTransport;
    use crate::widgets::testing::{context, SERVER};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn path_link(uri: &str) -> PathLink {
        PathLink::new("Edit", uri, Some("_blank"), url::Url::parse(SERVER).unwrap())
    }

    #[test]
    fn path_link_needs_a_selection() {
        let link = path_link("/bin/edit.html${path}");
        assert_eq!(link.url(), None);
    }

    #[test]
    fn path_link_substitutes_the_path() {
        let mut link = path_link("/bin/edit.html${path}[.html]");
        link.on_event(&Event::PathSelected("/content/page1".into()));
        assert_eq!(link.url().as_deref(), Some("http://cms.test/bin/edit.html/content/page1.html"));

        // a path with its own extension drops the optional part
        link.on_event(&Event::PathSelected("/content/dam/logo.png".into()));
        assert_eq!(link.url().as_deref(), Some("http://cms.test/bin/edit.html/content/dam/logo.png"));
        assert_eq!(link.target(), Some("_blank"));
    }

    #[test]
    fn path_link_escapes_reserved_characters() {
        let mut link = path_link("/crx/de#${path}");
        link.on_event(&Event::PathSelected("/content/a b".into()));
        assert_eq!(link.url().as_deref(), Some("http://cms.test/crx/de#/content/a%20b"));
    }

    #[test]
    fn tool_link_toggles_and_tracks_the_open_tool() {
        let mock = Arc::new(MockTransport::new());
        let ctx = context(&mock);
        let recorder = Recorder::new();
        ctx.bus.subscribe(&recorder);
        let el = ElementData {
            tag: "a".into(),
            attributes: HashMap::from([("data-tool-uri".to_string(), "/bin/favorites.html".to_string())]),
            text: " Favorites ".into(),
            ..Default::default()
        };
        let Ok(Widget::ToolLink(link)) = build_tool_link(&el, &ctx) else {
            panic!("tool link not built");
        };
        assert_eq!(link.borrow().label(), "Favorites");

        link.borrow().toggle();
        ctx.bus.dispatch();
        assert_eq!(recorder.borrow().events, vec![Event::ToolToggle("/bin/favorites.html".into())]);

        link.borrow_mut().on_event(&Event::ToolShown(Some("/bin/favorites.html".into())));
        assert!(link.borrow().is_active());
        link.borrow_mut().on_event(&Event::ToolShown(Some("/bin/other.html".into())));
        assert!(!link.borrow().is_active());
    }

    #[test]
    fn tool_link_requires_its_uri() {
        let mock = Arc::new(MockTransport::new());
        let ctx = context(&mock);
        assert!(build_tool_link(&ElementData::default(), &ctx).is_err());
    }
}
