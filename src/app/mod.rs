//! `DashboardApp` - the top-level egui application state.
//!
//! This module declares the `DashboardApp` struct and its constructor.
//! All methods are split across the sibling sub-modules:
//!
//! - `navigation` - history, address bar, pumping the dashboard
//! - `toolbar`    - address bar and controls
//! - `content`    - tree, detail view, tool, logs and query panels

pub mod content;
pub mod navigation;
pub mod toolbar;

use std::sync::Arc;
use std::time::Duration;

use eframe::egui;

use dashboard_browser::config::{ConfigError, DashboardConfig};
use dashboard_browser::dashboard::Dashboard;
use dashboard_browser::net::{Fetcher, HttpTransport};
use dashboard_browser::prefs::{FileStorage, PreferenceStore};

// ─── Application state ───────────────────────────────────────────────────────

pub struct DashboardApp {
    pub dashboard: Dashboard,
    pub address_input: String,
    /// Address last copied into `address_input`.
    pub address_shown: String,
    pub dark_mode: bool,
    pub error: Option<String>,
    /// Upper bound between frames so timers fire without input.
    pub tick: Duration,
}

impl DashboardApp {
    pub fn new(cc: &eframe::CreationContext<'_>, config: DashboardConfig) -> Result<Self, ConfigError> {
        let transport = HttpTransport::new(config.request_timeout()).map_err(|e| ConfigError {
            message: format!("HTTP client: {}", e),
        })?;
        let egui_ctx = cc.egui_ctx.clone();
        let fetcher = Fetcher::threaded(Arc::new(transport))
            .with_wake(Arc::new(move || egui_ctx.request_repaint()));
        let storage = config.storage_path();
        log::info!("preferences at {}", storage.display());
        let prefs = PreferenceStore::new(FileStorage::new(storage));

        let mut dashboard = Dashboard::new(&config, fetcher, prefs)?;
        dashboard.load_page();
        let address = dashboard.address();

        Ok(Self {
            dashboard,
            address_input: address.clone(),
            address_shown: address,
            dark_mode: false,
            error: None,
            tick: Duration::from_secs(1).min(config.tail_interval()),
        })
    }

    pub fn tool_open(&self) -> bool {
        self.dashboard.current_tool().is_some()
    }

    pub fn apply_visuals(&self, ctx: &egui::Context) {
        if self.dark_mode {
            ctx.set_visuals(egui::Visuals::dark());
        } else {
            ctx.set_visuals(egui::Visuals::light());
        }
    }
}
