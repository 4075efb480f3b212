mod api;
mod app;
mod error;
mod export;
mod format;
mod import;
mod reports;
mod session;
mod storage;
mod ui;
mod utils;

use adw::prelude::*;
use adw::Application;
use tracing_subscriber::EnvFilter;

pub const APP_ID: &str = "com.callops.Console";

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Also installs the `log` bridge, so `log::info!` lands here too.
    if let Err(e) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        eprintln!("logging already initialised: {e}");
    }
}

fn main() -> glib::ExitCode {
    init_logging();
    log::info!("starting {} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let app = Application::builder().application_id(APP_ID).build();
    app.connect_activate(|app| {
        crate::app::build_ui(app);
    });
    app.run()
}
