//! Selector-driven lookups over server-rendered fragments.

use scraper::{ElementRef, Html, Selector};

/// A tab handle found in a nav strip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TabLink {
    /// Pane id the tab controls (`aria-controls`, else the link's own `id`).
    pub id: String,
    pub label: String,
    pub active: bool,
}

/// An embedded link to a repository path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathLink {
    pub path: String,
    pub label: String,
}

fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(sel) => Some(sel),
        Err(e) => {
            log::warn!("bad selector {}: {:?}", css, e);
            None
        }
    }
}

fn text_of(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Undo the `_jcr_` mangling some views apply to namespaced names.
pub fn normalize_path(path: &str) -> String {
    path.replace("/_jcr_", "/jcr:")
}

/// Tabs matched by `css` (e.g. `.nav-tabs .nav-link`) in document order.
pub fn tabs(html: &str, css: &str) -> Vec<TabLink> {
    let Some(sel) = selector(css) else {
        return Vec::new();
    };
    let document = Html::parse_fragment(html);
    document
        .select(&sel)
        .filter_map(|el| {
            let attrs = el.value();
            let id = attrs.attr("aria-controls").or_else(|| attrs.attr("id"))?;
            Some(TabLink {
                id: id.to_string(),
                label: text_of(&el),
                active: attrs.classes().any(|c| c == "active"),
            })
        })
        .collect()
}

/// Inner HTML of the pane with the given id below `container_css`.
pub fn pane_html(html: &str, container_css: &str, id: &str) -> Option<String> {
    let id_sel = format!("[id=\"{}\"]", id.replace('"', "\\\""));
    let css = if container_css.is_empty() {
        id_sel
    } else {
        format!("{} {}", container_css, id_sel)
    };
    let sel = selector(&css)?;
    let document = Html::parse_fragment(html);
    let found = document.select(&sel).next().map(|el| el.inner_html());
    found
}

/// Every `a.path` link, resolved to its repository path.
pub fn path_links(html: &str) -> Vec<PathLink> {
    let Some(sel) = selector("a.path") else {
        return Vec::new();
    };
    let document = Html::parse_fragment(html);
    document
        .select(&sel)
        .filter_map(|el| {
            let attrs = el.value();
            let raw = attrs
                .attr("data-path")
                .or_else(|| attrs.attr("href"))
                .filter(|p| !p.is_empty() && *p != "#")?;
            Some(PathLink {
                path: normalize_path(raw),
                label: text_of(&el),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIEW: &str = r##"
        <div class="dashboard-browser__tabs">
          <ul class="nav nav-tabs">
            <li><a class="nav-link active" id="props-tab" aria-controls="properties">Properties</a></li>
            <li><a class="nav-link" aria-controls="json">JSON</a></li>
            <li><a class="nav-link" id="xml">XML</a></li>
          </ul>
        </div>
        <div class="dashboard-browser__tabs-content">
          <div class="tab-pane" id="properties"><b>props</b></div>
          <div class="tab-pane" id="json">{}</div>
        </div>
        <p><a class="path" data-path="/content/_jcr_content">jcr:content</a>
           <a class="path" href="/apps">apps</a>
           <a class="path" href="#">nothing</a>
           <a href="/ignored">plain</a></p>
    "##;

    #[test]
    fn finds_tabs_in_order() {
        let found = tabs(VIEW, ".nav-tabs .nav-link");
        let ids: Vec<_> = found.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["properties", "json", "xml"]);
        assert!(found[0].active);
        assert_eq!(found[1].label, "JSON");
    }

    #[test]
    fn finds_pane_content() {
        let html = pane_html(VIEW, ".dashboard-browser__tabs-content", "properties").unwrap();
        assert_eq!(html, "<b>props</b>");
        assert!(pane_html(VIEW, ".dashboard-browser__tabs-content", "missing").is_none());
    }

    #[test]
    fn finds_path_links() {
        let links = path_links(VIEW);
        assert_eq!(
            links,
            vec![
                PathLink { path: "/content/jcr:content".into(), label: "jcr:content".into() },
                PathLink { path: "/apps".into(), label: "apps".into() },
            ]
        );
    }

    #[test]
    fn bad_selector_yields_nothing() {
        assert!(tabs(VIEW, "[[[").is_empty());
    }
}
