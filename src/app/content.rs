//! Panel rendering for `DashboardApp`.
//!
//! - `draw_tree`       - left panel, lazily expanded repository tree
//! - `draw_view`       - central detail view with its tab strip
//! - `draw_tool`       - right tool panel (favorites or plain markup)
//! - `draw_bottom`     - log tails (optionally inside resuming tabs) and the
//!                       query console
//! - `draw_status`     - status line

use std::cell::RefCell;
use std::rc::Rc;

use eframe::egui;

use dashboard_browser::dashboard::TOOL_SLOT;
use dashboard_browser::nav::NodeId;
use dashboard_browser::widgets::favorites::Favorites;
use dashboard_browser::widgets::logfile::{LogTail, Viewport};
use dashboard_browser::widgets::query::ARGUMENTS;
use dashboard_browser::widgets::tree::Tree;
use dashboard_browser::widgets::{Widget, WidgetKind};

use super::DashboardApp;
use crate::ui::{path_name, render_dom_node, truncate_str, Clicked};

enum TreeAction {
    Toggle(NodeId),
    Select(NodeId),
}

fn draw_tree_node(ui: &mut egui::Ui, tree: &Tree, id: &NodeId, actions: &mut Vec<TreeAction>) {
    let Some(node) = tree.node(id) else {
        return;
    };
    let selected = tree.selected_id() == Some(id);
    ui.horizontal(|ui| {
        let marker = if tree.is_loading(id) {
            "\u{22EF}"
        } else if node.opened {
            "\u{25BE}"
        } else if node.children.as_ref().is_some_and(|c| c.is_empty()) {
            " "
        } else {
            "\u{25B8}"
        };
        if ui.small_button(marker).clicked() {
            actions.push(TreeAction::Toggle(id.clone()));
        }
        let label = ui
            .selectable_label(selected, &node.text)
            .on_hover_text(format!("{}\n{}", node.path, node.node_type));
        if label.clicked() {
            actions.push(TreeAction::Select(id.clone()));
        }
    });
    if node.opened {
        ui.indent(id.as_str(), |ui| {
            for child in tree.children(id) {
                draw_tree_node(ui, tree, &child.id, actions);
            }
        });
    }
}

impl DashboardApp {
    // ── Tree ─────────────────────────────────────────────────────────────────

    pub fn draw_tree(&mut self, ui: &mut egui::Ui) {
        let Some(tree) = self.dashboard.tree() else {
            ui.weak("no tree on this page");
            return;
        };
        let mut actions = Vec::new();
        egui::ScrollArea::vertical()
            .id_salt("tree")
            .auto_shrink([false; 2])
            .show(ui, |ui| {
                let tree = tree.borrow();
                match tree.root() {
                    Some(root) => {
                        let root = root.id.clone();
                        draw_tree_node(ui, &tree, &root, &mut actions);
                    }
                    None => {
                        ui.spinner();
                    }
                }
            });
        let mut tree = tree.borrow_mut();
        for action in actions {
            match action {
                TreeAction::Toggle(id) => tree.toggle(&id),
                TreeAction::Select(id) => tree.select(&id),
            }
        }
    }

    // ── Detail view ──────────────────────────────────────────────────────────

    pub fn draw_view(&mut self, ui: &mut egui::Ui) {
        if self.dashboard.is_loading_page() {
            ui.centered_and_justified(|ui| ui.spinner());
            return;
        }
        if let Some(ref err) = self.error {
            ui.colored_label(egui::Color32::from_rgb(200, 60, 60), err);
        }
        let Some(view) = self.dashboard.view() else {
            return;
        };

        let mut tab_clicked = None;
        let mut clicked = None;
        {
            let view = view.borrow();
            ui.horizontal(|ui| {
                if let Some(path) = view.current_path() {
                    ui.strong(path_name(path)).on_hover_text(path);
                }
                if view.is_loading() {
                    ui.spinner();
                }
            });
            ui.horizontal_wrapped(|ui| {
                for tab in view.tabs() {
                    let active = view.active_tab() == Some(tab.id.as_str());
                    if ui.selectable_label(active, &tab.label).clicked() {
                        tab_clicked = Some(tab.id.clone());
                    }
                }
            });
            ui.separator();
            egui::ScrollArea::both()
                .id_salt("view")
                .auto_shrink([false; 2])
                .show(ui, |ui| match view.active_tab_node() {
                    Some(node) => render_dom_node(ui, node, 0, &mut clicked),
                    None => {
                        ui.weak("nothing selected");
                    }
                });
        }

        if let Some(id) = tab_clicked {
            view.borrow_mut().select_tab(&id);
        }
        match clicked {
            Some(Clicked::Path(path)) => view.borrow().follow_link(&path),
            Some(Clicked::External(location)) => view.borrow().navigate_external(&location),
            None => {}
        }
    }

    // ── Tool panel ───────────────────────────────────────────────────────────

    pub fn draw_tool(&mut self, ui: &mut egui::Ui) {
        if let Some(Widget::Favorites(favorites)) = self.dashboard.host().find(TOOL_SLOT, WidgetKind::Favorites) {
            let favorites = Rc::clone(favorites);
            draw_favorites(ui, &favorites);
            return;
        }
        let mut clicked = None;
        if let Some(content) = self.dashboard.tool_content() {
            egui::ScrollArea::vertical()
                .id_salt("tool")
                .show(ui, |ui| render_dom_node(ui, &content, 0, &mut clicked));
        }
        match clicked {
            Some(Clicked::Path(path)) => self.dashboard.select_path(&path),
            Some(Clicked::External(location)) => ui.ctx().open_url(egui::OpenUrl::new_tab(location)),
            None => {}
        }
    }

    // ── Logs and query ───────────────────────────────────────────────────────

    pub fn has_bottom(&self) -> bool {
        !self.dashboard.logfiles().is_empty() || self.dashboard.query().is_some()
    }

    pub fn draw_bottom(&mut self, ui: &mut egui::Ui) {
        let mut tabbed: Vec<Rc<RefCell<LogTail>>> = Vec::new();
        for (i, tabs) in self.dashboard.tab_sets().into_iter().enumerate() {
            let mut show = None;
            {
                let tabs = tabs.borrow();
                ui.horizontal(|ui| {
                    for tab in tabs.tabs() {
                        let active = tabs.active() == Some(tab.id.as_str());
                        if ui.selectable_label(active, &tab.label).clicked() {
                            show = Some(tab.id.clone());
                        }
                    }
                });
            }
            if let Some(id) = show {
                tabs.borrow_mut().show_tab(&id, false);
            }
            let tabs = tabs.borrow();
            for tab in tabs.tabs() {
                let active = tabs.active() == Some(tab.id.as_str());
                for (j, log) in self.logs_within(&tab.id).into_iter().enumerate() {
                    // logs inside inactive panes stay hidden
                    if active {
                        draw_log(ui, &log, ("tabbed-log", i, j));
                    }
                    tabbed.push(log);
                }
            }
        }
        for (i, log) in self.dashboard.logfiles().into_iter().enumerate() {
            if !tabbed.iter().any(|t| Rc::ptr_eq(t, &log)) {
                draw_log(ui, &log, ("log", i, 0));
            }
        }

        if self.dashboard.query().is_some() {
            ui.separator();
            self.draw_query(ui);
        }
    }

    fn logs_within(&self, id: &str) -> Vec<Rc<RefCell<LogTail>>> {
        self.dashboard
            .host()
            .within(id)
            .filter_map(|w| match w {
                Widget::Logfile(l) => Some(Rc::clone(l)),
                _ => None,
            })
            .collect()
    }

    fn draw_query(&mut self, ui: &mut egui::Ui) {
        let Some(console) = self.dashboard.query() else {
            return;
        };
        let mut submit = false;
        let mut template = None;
        let mut clicked = None;
        let mut preview = None;
        let mut close_preview = false;
        {
            let mut c = console.borrow_mut();
            ui.horizontal(|ui| {
                let response = ui.add_sized(
                    [ui.available_width() - 160.0, 24.0],
                    egui::TextEdit::singleline(&mut c.query)
                        .hint_text("query")
                        .font(egui::TextStyle::Monospace),
                );
                if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                    submit = true;
                }
                egui::ComboBox::from_id_salt("query_templates")
                    .selected_text("Templates")
                    .show_ui(ui, |ui| {
                        for (i, t) in c.templates().iter().enumerate() {
                            if ui.selectable_label(false, truncate_str(t, 60)).clicked() {
                                template = Some(i);
                            }
                        }
                    });
                if ui.button("Run").clicked() {
                    submit = true;
                }
                if c.is_loading() {
                    ui.spinner();
                }
            });
            ui.horizontal(|ui| {
                for i in 0..ARGUMENTS {
                    if c.arg_visible(i) {
                        ui.add_sized(
                            [140.0, 22.0],
                            egui::TextEdit::singleline(&mut c.args[i]).hint_text(format!("${}", i + 1)),
                        );
                    }
                }
            });
            egui::ScrollArea::vertical()
                .id_salt("query_result")
                .max_height(220.0)
                .show(ui, |ui| {
                    if let Some(result) = c.result() {
                        render_dom_node(ui, &result.dom, 0, &mut clicked);
                        ui.separator();
                        ui.horizontal_wrapped(|ui| {
                            for link in &result.links {
                                if ui.small_button("\u{2139}").on_hover_text(&link.path).clicked() {
                                    preview = Some(link.path.clone());
                                }
                            }
                        });
                    }
                });
            if let Some((path, text)) = c.popover() {
                egui::Window::new(path_name(path))
                    .id(egui::Id::new("query_preview"))
                    .collapsible(false)
                    .show(ui.ctx(), |ui| {
                        ui.label(egui::RichText::new(text).monospace());
                        if ui.button("Close").clicked() {
                            close_preview = true;
                        }
                    });
            }
        }

        let mut c = console.borrow_mut();
        if let Some(i) = template {
            c.apply_template(i);
        }
        if submit {
            c.submit();
        }
        if let Some(path) = preview {
            c.preview(&path);
        }
        if close_preview {
            c.close_preview();
        }
        if let Some(Clicked::Path(path)) = clicked {
            c.follow_link(&path);
        }
    }

    // ── Status ───────────────────────────────────────────────────────────────

    pub fn draw_status(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let value = self
                .dashboard
                .status_line()
                .map(|s| s.borrow().value().to_string())
                .unwrap_or_default();
            ui.monospace(value);
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.weak(truncate_str(&self.address_shown, 80));
            });
        });
    }
}

fn draw_favorites(ui: &mut egui::Ui, favorites: &Rc<RefCell<Favorites>>) {
    let mut group_clicked = None;
    let mut selected = None;
    let mut clear = false;
    {
        let favorites = favorites.borrow();
        ui.horizontal_wrapped(|ui| {
            for group in favorites.groups() {
                let active = favorites.active_group() == Some(group.id.as_str());
                if ui.selectable_label(active, &group.label).clicked() {
                    group_clicked = Some(group.id.clone());
                }
            }
        });
        ui.separator();
        egui::ScrollArea::vertical()
            .id_salt("favorites")
            .max_height(ui.available_height() - 32.0)
            .show(ui, |ui| {
                for path in favorites.entries() {
                    let current = favorites.current_path() == Some(path.as_str());
                    if ui
                        .selectable_label(current, truncate_str(&path, 48))
                        .on_hover_text(&path)
                        .clicked()
                    {
                        selected = Some(path);
                    }
                }
            });
        ui.separator();
        clear = ui.button("Clear").clicked();
    }

    let mut favorites = favorites.borrow_mut();
    if let Some(id) = group_clicked {
        favorites.show_group(&id, false);
    }
    if clear {
        favorites.clear();
    }
    if let Some(path) = selected {
        favorites.select(&path);
    }
}

/// A log buffer in a scroll area whose geometry is fed back into the tail,
/// so it knows whether to follow new lines.
fn draw_log(ui: &mut egui::Ui, log: &Rc<RefCell<LogTail>>, salt: (&str, usize, usize)) {
    let mut log = log.borrow_mut();
    let jump = log.take_scroll_request();
    let output = egui::ScrollArea::vertical()
        .id_salt(salt)
        .max_height(200.0)
        .auto_shrink([false, true])
        .show(ui, |ui| {
            ui.add(egui::Label::new(egui::RichText::new(log.text()).monospace()).wrap());
            if jump {
                ui.scroll_to_cursor(Some(egui::Align::BOTTOM));
            }
        });
    log.set_viewport(Viewport {
        scroll_top: output.state.offset.y,
        client_height: output.inner_rect.height(),
        scroll_height: output.content_size.y,
    });
}
