use std::path::PathBuf;

use eframe::egui;

use dashboard_browser::config::DashboardConfig;

mod app;
mod ui;

use app::DashboardApp;

fn main() {
    env_logger::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = match DashboardConfig::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}, using defaults", e);
            DashboardConfig::default()
        }
    };
    log::info!("dashboard page {}", config.page);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([1280.0, 800.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Repository Dashboard",
        options,
        Box::new(|cc| match DashboardApp::new(cc, config) {
            Ok(app) => Ok(Box::new(app) as Box<dyn eframe::App>),
            Err(e) => Err(e.message.into()),
        }),
    )
    .expect("Failed to start the dashboard");
}

impl eframe::App for DashboardApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.pump(ctx);
        self.apply_visuals(ctx);

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            self.draw_toolbar(ui);
        });

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            self.draw_status(ui);
        });

        if self.has_bottom() {
            egui::TopBottomPanel::bottom("console")
                .resizable(true)
                .default_height(240.0)
                .show(ctx, |ui| {
                    self.draw_bottom(ui);
                });
        }

        egui::SidePanel::left("tree")
            .resizable(true)
            .default_width(280.0)
            .show(ctx, |ui| {
                self.draw_tree(ui);
            });

        if self.tool_open() {
            egui::SidePanel::right("tool")
                .default_width(240.0)
                .show(ctx, |ui| {
                    self.draw_tool(ui);
                });
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            self.draw_view(ui);
        });

        ctx.request_repaint_after(self.tick);
    }
}
