//! Query console: a query with up to three `$n` arguments, sent as a GET
//! form and answered with an HTML result table.

use std::cell::RefCell;
use std::rc::Rc;

use scraper::{Html, Selector};

use super::view::Pane;
use super::{path_url, ElementData, Widget, WidgetContext, WidgetError};
use crate::events::{Event, EventBus, Listener};
use crate::nav::location::encode_parameters;
use crate::nav::Parameters;
use crate::net::pending::drain_ready;
use crate::net::{Fenced, Fetcher};

pub const ARGUMENTS: usize = 3;
const RESULT_SLOT: &str = "result";
const POPOVER_SLOT: &str = "popover";

/// Form details read from the console markup.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryForm {
    pub action: String,
    pub query: String,
    pub templates: Vec<String>,
    pub popover_url: Option<String>,
}

impl QueryForm {
    pub fn from_markup(el: &ElementData) -> Result<Self, WidgetError> {
        let document = Html::parse_fragment(&el.inner_html);
        let select = |css: &str| {
            Selector::parse(css).map_err(|e| WidgetError::new(format!("bad selector {}: {:?}", css, e)))
        };
        let form_sel = select(".dashboard-widget__query-form")?;
        let query_sel = select("input[name=\"query\"], textarea[name=\"query\"]")?;
        let template_sel = select(".query-templates .dropdown-item")?;

        let form = document
            .select(&form_sel)
            .next()
            .ok_or_else(|| WidgetError::new("query console without form"))?;
        let action = form
            .value()
            .attr("action")
            .filter(|a| !a.is_empty())
            .ok_or_else(|| WidgetError::new("query form without action"))?;
        let query = form
            .select(&query_sel)
            .next()
            .map(|q| {
                q.value()
                    .attr("value")
                    .map(str::to_string)
                    .unwrap_or_else(|| q.text().collect())
            })
            .unwrap_or_default();
        let templates = document
            .select(&template_sel)
            .map(|t| t.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        Ok(Self {
            action: action.to_string(),
            query,
            templates,
            popover_url: el.data("popover-uri").map(str::to_string),
        })
    }
}

pub struct QueryConsole {
    action: String,
    popover_url: Option<String>,
    bus: Rc<EventBus>,
    fetcher: Fetcher,
    pub query: String,
    pub args: [String; ARGUMENTS],
    templates: Vec<String>,
    result: Option<Pane>,
    popover: Option<(String, String)>,
    in_flight: Vec<Fenced<String>>,
    result_epoch: u64,
    popover_epoch: u64,
}

pub(super) fn build(el: &ElementData, ctx: &WidgetContext) -> Result<Widget, WidgetError> {
    let form = QueryForm::from_markup(el)?;
    let mut console = QueryConsole::new(ctx, &form)?;
    console.announce();
    if let Some(query) = ctx.initial_parameters.get("query") {
        console.change_query(query);
    }
    Ok(Widget::Query(Rc::new(RefCell::new(console))))
}

impl QueryConsole {
    pub fn new(ctx: &WidgetContext, form: &QueryForm) -> Result<Self, WidgetError> {
        let popover_url = match &form.popover_url {
            Some(url) => Some(ctx.resolve(url)?),
            None => None,
        };
        Ok(Self {
            action: ctx.resolve(&form.action)?,
            popover_url,
            bus: Rc::clone(&ctx.bus),
            fetcher: ctx.fetcher.clone(),
            query: form.query.clone(),
            args: Default::default(),
            templates: form.templates.clone(),
            result: None,
            popover: None,
            in_flight: Vec::new(),
            result_epoch: 0,
            popover_epoch: 0,
        })
    }

    pub fn templates(&self) -> &[String] {
        &self.templates
    }

    pub fn result(&self) -> Option<&Pane> {
        self.result.as_ref()
    }

    /// Preview loaded for a result row: `(path, text)`.
    pub fn popover(&self) -> Option<(&str, &str)> {
        self.popover.as_ref().map(|(p, t)| (p.as_str(), t.as_str()))
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.iter().any(|f| f.slot == RESULT_SLOT)
    }

    /// Argument `index` (0-based) is shown while the query mentions `$<index+1>`.
    pub fn arg_visible(&self, index: usize) -> bool {
        index < ARGUMENTS && self.query.contains(&format!("${}", index + 1))
    }

    /// Replace the query. Empty input leaves it alone.
    pub fn change_query(&mut self, query: &str) {
        if !query.is_empty() {
            self.query = query.to_string();
        }
    }

    pub fn apply_template(&mut self, index: usize) {
        if let Some(template) = self.templates.get(index).cloned() {
            self.change_query(&template);
        }
    }

    /// Request URL of the form as it stands. Hidden arguments are still
    /// part of the form and go along when filled in.
    pub fn form_url(&self) -> String {
        let mut params = Parameters::new();
        params.insert("_charset_".into(), "UTF-8".into());
        params.insert("query".into(), self.query.clone());
        for (i, arg) in self.args.iter().enumerate() {
            if !arg.is_empty() {
                params.insert(format!("arg{}", i + 1), arg.clone());
            }
        }
        format!("{}?{}", self.action, encode_parameters(&params))
    }

    pub fn submit(&mut self) {
        self.result_epoch += 1;
        let url = self.form_url();
        log::debug!("query {}", url);
        self.in_flight.push(Fenced {
            slot: RESULT_SLOT.to_string(),
            epoch: self.result_epoch,
            pending: self.fetcher.text(&url),
        });
    }

    /// Load the preview of a result row.
    pub fn preview(&mut self, path: &str) {
        let Some(base) = &self.popover_url else {
            return;
        };
        let url = path_url(base, path);
        self.popover_epoch += 1;
        self.popover = Some((path.to_string(), String::new()));
        self.in_flight.push(Fenced {
            slot: POPOVER_SLOT.to_string(),
            epoch: self.popover_epoch,
            pending: self.fetcher.text(&url),
        });
    }

    pub fn close_preview(&mut self) {
        self.popover = None;
    }

    pub fn follow_link(&self, path: &str) {
        self.bus.emit(Event::PathSelect(path.to_string()));
    }

    /// Record a non-empty query in history.
    fn announce(&self) {
        if !self.query.is_empty() {
            let mut params = Parameters::new();
            params.insert("query".into(), self.query.clone());
            self.bus.emit(Event::QuerySubmitted(params));
        }
    }

    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        for (slot, epoch, result) in drain_ready(&mut self.in_flight) {
            let current = if slot == POPOVER_SLOT {
                self.popover_epoch
            } else {
                self.result_epoch
            };
            if epoch != current {
                log::debug!("dropping stale {} answer", slot);
                continue;
            }
            let text = match result {
                Ok(text) => text,
                Err(e) => {
                    log::debug!("{} failed: {}", slot, e);
                    continue;
                }
            };
            changed = true;
            if slot == POPOVER_SLOT {
                if let Some((_, preview)) = self.popover.as_mut() {
                    *preview = text;
                }
                continue;
            }
            let pane = Pane::new(&text);
            self.bus.emit(Event::ContentLoaded {
                slot: "query".to_string(),
                html: Rc::clone(&pane.html),
            });
            self.result = Some(pane);
            self.announce();
        }
        changed
    }
}

impl Listener for QueryConsole {
    fn on_event(&mut self, event: &Event) {
        if let Event::QueryChange(params) = event {
            if let Some(query) = params.get("query") {
                self.change_query(query);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Recorder;
    use crate::nav::HistoryBridge;
    use crate::net::MockTransport;
    use crate::widgets::testing::{context, SERVER};
    use std::collections::HashMap;
    use std::sync::Arc;

    const MARKUP: &str = r#"
        <form class="dashboard-widget__query-form" action="/bin/query.html">
          <input name="query" value="">
          <input name="arg1" class="hidden"><input name="arg2" class="hidden"><input name="arg3" class="hidden">
          <div class="query-templates">
            <a class="dropdown-item">SELECT * FROM [nt:base] WHERE ISDESCENDANTNODE('$1')</a>
            <a class="dropdown-item">/jcr:root/content//*</a>
          </div>
        </form>
        <div class="dashboard-widget__query-result"></div>"#;

    fn element() -> ElementData {
        ElementData {
            tag: "div".into(),
            attributes: HashMap::from([("data-popover-uri".to_string(), "/bin/preview.txt".to_string())]),
            inner_html: MARKUP.into(),
            ..Default::default()
        }
    }

    #[test]
    fn reads_form_markup() {
        let form = QueryForm::from_markup(&element()).unwrap();
        assert_eq!(form.action, "/bin/query.html");
        assert_eq!(form.templates.len(), 2);
        assert_eq!(form.popover_url.as_deref(), Some("/bin/preview.txt"));
    }

    #[test]
    fn arguments_follow_placeholders() {
        let mock = Arc::new(MockTransport::new());
        let ctx = context(&mock);
        let mut console = QueryConsole::new(&ctx, &QueryForm::from_markup(&element()).unwrap()).unwrap();
        console.apply_template(0);
        assert!(console.arg_visible(0));
        assert!(!console.arg_visible(1));
        console.args[0] = "/content".into();
        assert_eq!(
            console.form_url(),
            format!(
                "{}/bin/query.html?_charset_=UTF-8&query={}&arg1=%2Fcontent",
                SERVER,
                urlencoding::encode("SELECT * FROM [nt:base] WHERE ISDESCENDANTNODE('$1')")
            )
        );
    }

    #[test]
    fn hidden_arguments_are_still_sent() {
        let mock = Arc::new(MockTransport::new());
        let ctx = context(&mock);
        let mut console = QueryConsole::new(&ctx, &QueryForm::from_markup(&element()).unwrap()).unwrap();
        console.change_query("/jcr:root/content//*");
        console.args[1] = "kept".into();
        assert!(!console.arg_visible(1));
        assert!(console.form_url().ends_with("&arg2=kept"));
        console.args[1].clear();
        assert!(!console.form_url().contains("arg2"));
    }

    #[test]
    fn empty_query_input_is_ignored() {
        let mock = Arc::new(MockTransport::new());
        let ctx = context(&mock);
        let mut console = QueryConsole::new(&ctx, &QueryForm::from_markup(&element()).unwrap()).unwrap();
        console.apply_template(0);
        console.change_query("");
        assert!(console.query.starts_with("SELECT"));
    }

    #[test]
    fn result_load_records_the_query() {
        let mock = Arc::new(MockTransport::new());
        let ctx = context(&mock);
        let recorder = Recorder::new();
        ctx.bus.subscribe(&recorder);
        let mut console = QueryConsole::new(&ctx, &QueryForm::from_markup(&element()).unwrap()).unwrap();
        console.change_query("/jcr:root/content//*");
        mock.respond(&console.form_url(), r#"<table><tr><td><a class="path" data-path="/content/a">a</a></td></tr></table>"#);
        console.submit();
        console.poll();
        ctx.bus.dispatch();

        assert_eq!(console.result().unwrap().links[0].path, "/content/a");
        let submitted: Vec<_> = recorder
            .borrow()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::QuerySubmitted(p) => p.get("query").cloned(),
                _ => None,
            })
            .collect();
        assert_eq!(submitted, vec!["/jcr:root/content//*"]);
    }

    #[test]
    fn query_change_pushes_history_once_without_moving_the_path() {
        let mock = Arc::new(MockTransport::new());
        let ctx = context(&mock);
        let page = "/apps/dashboard/browser.html";
        let history = Rc::new(RefCell::new(HistoryBridge::new(
            Rc::clone(&ctx.bus),
            page,
            &format!("{}/content?query=a", page),
        )));
        ctx.bus.subscribe(&history);
        let mut console = QueryConsole::new(&ctx, &QueryForm::from_markup(&element()).unwrap()).unwrap();
        console.change_query("b");
        mock.respond(&console.form_url(), "<p>none</p>");
        console.submit();
        console.poll();
        ctx.bus.dispatch();

        let history = history.borrow();
        assert_eq!(history.session().len(), 2);
        let state = history.current_state().unwrap();
        assert_eq!(state.path, "/content");
        assert_eq!(state.parameters.get("query").map(String::as_str), Some("b"));
    }

    #[test]
    fn restored_parameters_set_the_query() {
        let mock = Arc::new(MockTransport::new());
        let ctx = context(&mock);
        let mut console = QueryConsole::new(&ctx, &QueryForm::from_markup(&element()).unwrap()).unwrap();
        let mut params = Parameters::new();
        params.insert("query".into(), "x $2".into());
        console.on_event(&Event::QueryChange(params));
        assert_eq!(console.query, "x $2");
        assert!(console.arg_visible(1));
        console.on_event(&Event::QueryChange(Parameters::new()));
        assert_eq!(console.query, "x $2");
    }

    #[test]
    fn preview_loads_row_text() {
        let mock = Arc::new(MockTransport::new());
        mock.respond(&format!("{}/bin/preview.txt/content/a", SERVER), "jcr:primaryType=cq:Page");
        let ctx = context(&mock);
        let mut console = QueryConsole::new(&ctx, &QueryForm::from_markup(&element()).unwrap()).unwrap();
        console.preview("/content/a");
        console.poll();
        assert_eq!(console.popover(), Some(("/content/a", "jcr:primaryType=cq:Page")));
    }
}
