//! Navigation methods for `DashboardApp`.
//!
//! Covers history (`go_back`, `go_forward`), the address bar (`navigate`)
//! and the per-frame pump that drives fetches, timers and events.

use std::time::Instant;

use eframe::egui;

use dashboard_browser::events::Event;

use super::DashboardApp;

impl DashboardApp {
    /// Navigate one step back in history.
    pub fn go_back(&mut self) {
        self.dashboard.back();
    }

    /// Navigate one step forward in history.
    pub fn go_forward(&mut self) {
        self.dashboard.forward();
    }

    /// Select whatever the address bar names: a full dashboard address or a
    /// bare repository path.
    pub fn navigate(&mut self) {
        let input = self.address_input.trim().to_string();
        if input.is_empty() {
            return;
        }
        let state = {
            let history = self.dashboard.history();
            if input.contains(history.page_url()) {
                history.parse_entry(&input)
            } else {
                None
            }
        };
        match state {
            Some(state) => {
                self.dashboard.select_path(&state.path);
                if !state.parameters.is_empty() {
                    self.dashboard.bus().emit(Event::QueryChange(state.parameters));
                }
            }
            None if input.starts_with('/') => self.dashboard.select_path(&input),
            None => {
                self.error = Some(format!("Not a repository path: {}", input));
                return;
            }
        }
        self.error = None;
    }

    /// Run one round of fetch polling and event delivery, then mirror the
    /// current history entry into the address bar.
    pub fn pump(&mut self, ctx: &egui::Context) {
        if self.dashboard.pump(Instant::now()) {
            ctx.request_repaint();
        }
        let address = self.dashboard.address();
        if address != self.address_shown {
            self.address_input = address.clone();
            self.address_shown = address;
        }
        if let Some(e) = self.dashboard.page_error() {
            self.error = Some(e.to_string());
        }
    }

    pub fn reload(&mut self) {
        if self.dashboard.host().is_empty() && !self.dashboard.is_loading_page() {
            self.error = None;
            self.dashboard.load_page();
        } else {
            self.dashboard.reload();
        }
    }
}
