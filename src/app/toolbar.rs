//! Toolbar rendering for `DashboardApp`.
//!
//! Draws the back/forward buttons, the address bar, reload, the favorite
//! toggle for the current path, the page's path and tool links and the
//! dark-mode switch.

use eframe::egui;

use super::DashboardApp;

impl DashboardApp {
    /// Render the top toolbar strip.
    pub fn draw_toolbar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.add_space(4.0);

            // Back / Forward
            let (can_back, can_fwd) = {
                let history = self.dashboard.history();
                (history.session().can_go_back(), history.session().can_go_forward())
            };
            if ui
                .add_enabled(
                    can_back,
                    egui::Button::new("\u{25C0}").min_size(egui::vec2(28.0, 24.0)),
                )
                .clicked()
            {
                self.go_back();
            }
            if ui
                .add_enabled(
                    can_fwd,
                    egui::Button::new("\u{25B6}").min_size(egui::vec2(28.0, 24.0)),
                )
                .clicked()
            {
                self.go_forward();
            }

            // Address bar
            let response = ui.add_sized(
                [ui.available_width() - 200.0, 24.0],
                egui::TextEdit::singleline(&mut self.address_input)
                    .hint_text("/content/...")
                    .font(egui::TextStyle::Monospace),
            );
            if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                self.navigate();
            }
            if ui.button("Go").clicked() {
                self.navigate();
            }

            if ui.button("\u{27F3}").on_hover_text("Reload").clicked() {
                self.reload();
            }

            // Favorite toggle for the current path
            if let Some(favorites) = self.dashboard.favorites() {
                let (has_path, is_favorite) = {
                    let f = favorites.borrow();
                    (f.current_path().is_some(), f.current_is_favorite())
                };
                let star = if is_favorite { "\u{2605}" } else { "\u{2606}" };
                if ui
                    .add_enabled(has_path, egui::Button::new(star))
                    .on_hover_text("Toggle favorite")
                    .clicked()
                {
                    favorites.borrow_mut().toggle_favorite();
                }
            }

            // Navbar links found on the page
            for link in self.dashboard.path_links() {
                let link = link.borrow();
                let url = link.url();
                if ui
                    .add_enabled(url.is_some(), egui::Button::new(link.label()))
                    .clicked()
                {
                    if let Some(url) = url {
                        ui.ctx().open_url(egui::OpenUrl {
                            url,
                            new_tab: link.target().is_some(),
                        });
                    }
                }
            }
            for link in self.dashboard.tool_links() {
                let link = link.borrow();
                let mut active = link.is_active();
                if ui.toggle_value(&mut active, link.label()).changed() {
                    link.toggle();
                }
            }

            // Dark mode toggle
            let dark_label = if self.dark_mode { "\u{263E}" } else { "\u{2600}" };
            if ui.button(dark_label).clicked() {
                self.dark_mode = !self.dark_mode;
            }
        });
    }
}
