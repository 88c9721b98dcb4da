//! Generic egui helpers for showing server-rendered fragments.
//!
//! `render_dom_node` walks a `DomNode` tree and maps the handful of tags the
//! dashboard views use onto egui widgets. Clicks on links are reported back
//! instead of being acted on here.

use eframe::egui;
use dashboard_browser::dom::{DomNode, NodeType};

/// A link the user clicked inside a fragment.
#[derive(Clone, Debug, PartialEq)]
pub enum Clicked {
    /// `a.path`: a repository path.
    Path(String),
    /// Any other link: a location outside the tree.
    External(String),
}

const LINK_COLOR: egui::Color32 = egui::Color32::from_rgb(0, 100, 200);

// ─── Fragment rendering ───────────────────────────────────────────────────────

/// Recursively render a `DomNode` tree using egui widgets.
pub fn render_dom_node(ui: &mut egui::Ui, node: &DomNode, depth: usize, clicked: &mut Option<Clicked>) {
    if node.node_type == NodeType::Text {
        let text = node.text.trim();
        if !text.is_empty() {
            ui.label(text);
        }
        return;
    }

    match node.tag.as_str() {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let text = node.collect_text();
            if !text.is_empty() {
                let size = match node.tag.as_str() {
                    "h1" => 24.0,
                    "h2" => 20.0,
                    _ => 16.0,
                };
                ui.heading(egui::RichText::new(text).size(size).strong());
                ui.add_space(4.0);
            }
        }
        "p" | "label" | "span" | "td" | "th" | "dt" | "dd" if is_inline_only(node) => {
            let text = node.collect_text();
            if !text.is_empty() {
                let rt = egui::RichText::new(text);
                ui.label(if node.tag == "th" { rt.strong() } else { rt });
            }
        }
        "pre" | "code" | "textarea" => {
            let text = node.collect_text();
            ui.label(egui::RichText::new(text).monospace());
        }
        "a" => render_link(ui, node, clicked),
        "tr" => {
            ui.horizontal_wrapped(|ui| {
                for child in &node.children {
                    render_dom_node(ui, child, depth + 1, clicked);
                    ui.add_space(8.0);
                }
            });
        }
        "li" => {
            ui.horizontal_wrapped(|ui| {
                ui.label("  \u{2022}");
                for child in &node.children {
                    render_dom_node(ui, child, depth + 1, clicked);
                }
            });
        }
        "hr" => {
            ui.separator();
        }
        "br" => {
            ui.add_space(4.0);
        }
        "script" | "style" | "template" | "button" | "input" => {}
        _ => {
            for child in &node.children {
                render_dom_node(ui, child, depth + 1, clicked);
            }
        }
    }
}

fn render_link(ui: &mut egui::Ui, node: &DomNode, clicked: &mut Option<Clicked>) {
    let text = node.collect_text();
    let target = match node.link_path() {
        Some(path) => Some(Clicked::Path(path)),
        None => node
            .attr("href")
            .filter(|h| !h.is_empty() && !h.starts_with('#'))
            .map(|h| Clicked::External(h.to_string())),
    };
    let Some(target) = target else {
        if !text.is_empty() {
            ui.label(text);
        }
        return;
    };
    let hover = match &target {
        Clicked::Path(p) | Clicked::External(p) => p.clone(),
    };
    let label = if text.is_empty() { hover.clone() } else { text };
    let link = ui.add(
        egui::Label::new(egui::RichText::new(label).color(LINK_COLOR).underline())
            .sense(egui::Sense::click()),
    );
    if link.clicked() {
        *clicked = Some(target);
    }
    link.on_hover_cursor(egui::CursorIcon::PointingHand)
        .on_hover_text(hover);
}

/// True when the node holds no links or block elements, so it can be shown
/// as one label.
fn is_inline_only(node: &DomNode) -> bool {
    node.children.iter().all(|c| {
        c.node_type == NodeType::Text
            || (matches!(c.tag.as_str(), "b" | "i" | "em" | "strong" | "small" | "span")
                && is_inline_only(c))
    })
}

// ─── Text utilities ───────────────────────────────────────────────────────────

/// Truncate `s` to at most `max_chars` Unicode scalar values, appending `"..."` if truncated.
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let t: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", t)
    }
}

/// Last segment of a repository path, `/` for the root.
pub fn path_name(path: &str) -> &str {
    path.rsplit('/').find(|s| !s.is_empty()).unwrap_or("/")
}
