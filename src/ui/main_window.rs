use adw::prelude::*;
use adw::Application;
use gtk4 as gtk;
use std::cell::RefCell;
use std::rc::Rc;

use crate::api::client::ApiClient;
use crate::api::events::RealtimeConfig;
use crate::api::models::BatchStatus;
use crate::api::queries::{Fetch, Queries};
use crate::api::subscription::{self, ConsoleEvent, Transport};
use crate::app::AppState;
use crate::session::SessionService;
use crate::storage::LocalCache;
use crate::ui::accounts::AccountsView;
use crate::ui::batches::BatchesView;
use crate::ui::dashboard::DashboardView;
use crate::ui::jobs::JobsView;
use crate::ui::reports::ReportsView;
use crate::ui::sidebar::{Page, Sidebar};
use crate::ui::Console;

const HEALTH_CHECK_SECS: u32 = 60;

struct Views {
    dashboard: Rc<DashboardView>,
    accounts: Rc<AccountsView>,
    batches: Rc<BatchesView>,
    jobs: Rc<JobsView>,
    reports: Rc<ReportsView>,
}

#[allow(deprecated)]
pub fn show_main_window(app: &Application) {
    let state = AppState::load();
    if !state.is_signed_in() {
        crate::ui::login::show_login_window(app);
        return;
    }
    let client = match ApiClient::from_state(&state) {
        Ok(c) => c,
        Err(e) => {
            log::error!("stored server address is unusable: {e}");
            crate::ui::login::show_login_window(app);
            return;
        }
    };

    let window = adw::ApplicationWindow::builder()
        .application(app)
        .title("CallOps Console")
        .default_width(1100)
        .default_height(720)
        .build();

    let overlay = adw::ToastOverlay::new();

    let cache = match LocalCache::open_default() {
        Ok(c) => Some(RefCell::new(c)),
        Err(e) => {
            log::warn!("running without local cache: {e}");
            None
        }
    };
    let console = Rc::new(Console {
        queries: Queries::new(client.clone()),
        settings: state.settings.clone(),
        toasts: overlay.clone(),
        cache,
    });

    let split = adw::Flap::builder()
        .reveal_flap(true)
        .locked(true)
        .modal(false)
        .build();

    let sidebar = Rc::new(Sidebar::new());
    split.set_flap(Some(&sidebar.widget()));

    let views = Rc::new(Views {
        dashboard: Rc::new(DashboardView::new(console.clone())),
        accounts: AccountsView::new(console.clone()),
        batches: BatchesView::new(console.clone()),
        jobs: JobsView::new(console.clone()),
        reports: ReportsView::new(console.clone()),
    });

    let stack = gtk::Stack::new();
    stack.set_transition_type(gtk::StackTransitionType::Crossfade);
    stack.add_named(&views.dashboard.widget(), Some(Page::Dashboard.name()));
    stack.add_named(&views.accounts.widget(), Some(Page::Accounts.name()));
    stack.add_named(&views.batches.widget(), Some(Page::Batches.name()));
    stack.add_named(&views.jobs.widget(), Some(Page::Jobs.name()));
    stack.add_named(&views.reports.widget(), Some(Page::Reports.name()));
    split.set_content(Some(&stack));

    overlay.set_child(Some(&split));

    let container = gtk::Box::new(gtk::Orientation::Vertical, 0);
    let header = adw::HeaderBar::new();
    let title = adw::WindowTitle::new("CallOps Console", &state.base_url);
    header.set_title_widget(Some(&title));

    let toggle = gtk::ToggleButton::new();
    toggle.set_icon_name("sidebar-show-symbolic");
    toggle.set_active(true);
    toggle.bind_property("active", &split, "reveal-flap").bidirectional().build();
    header.pack_start(&toggle);

    let health = gtk::Label::new(Some("API …"));
    health.add_css_class("dim-label");
    header.pack_start(&health);

    let logout_btn = gtk::Button::with_label("Sign out");
    header.pack_end(&logout_btn);
    if let Some(user) = &state.user_data {
        let who = gtk::Label::new(Some(&user.name));
        who.add_css_class("dim-label");
        header.pack_end(&who);
    }
    let live = gtk::Label::new(Some("Polling"));
    live.add_css_class("dim-label");
    header.pack_end(&live);

    container.append(&header);
    container.append(&overlay);
    window.set_content(Some(&container));

    {
        let views = views.clone();
        let stack = stack.clone();
        sidebar.connect_page_selected(move |page| {
            stack.set_visible_child_name(page.name());
            match page {
                Page::Dashboard => views.dashboard.refresh(),
                Page::Accounts => views.accounts.refresh(Fetch::Cached),
                Page::Batches => views.batches.refresh(Fetch::Cached),
                Page::Jobs => views.jobs.refresh(Fetch::Cached),
                Page::Reports => {}
            }
        });
    }
    sidebar.select(Page::Dashboard);
    views.accounts.load();
    views.batches.load();
    window.present();

    // Health check now and then on a timer that dies with the window.
    let check_health = {
        let queries = console.queries.clone();
        let health = health.clone();
        move || {
            let queries = queries.clone();
            let health = health.clone();
            crate::utils::run_async_to_main(async move { queries.health().await }, move |res| match res {
                Ok(h) if h.is_ok() => health.set_label(&match &h.version {
                    Some(v) => format!("API ok ({v})"),
                    None => "API ok".to_string(),
                }),
                Ok(h) => health.set_label(&format!("API {}", h.status)),
                Err(e) => {
                    log::warn!("health check failed: {e}");
                    health.set_label("API unreachable");
                }
            });
        }
    };
    check_health();
    let health_timer = Rc::new(RefCell::new(Some(glib::timeout_add_seconds_local(
        HEALTH_CHECK_SECS,
        move || {
            check_health();
            glib::ControlFlow::Continue
        },
    ))));

    let realtime = match RealtimeConfig::from_base(client.base_url(), client.token(), &state.settings) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            log::warn!("realtime disabled: {e}");
            None
        }
    };
    let mut feed = subscription::start(
        crate::utils::RUNTIME.handle(),
        console.queries.clone(),
        &state.settings,
        realtime,
    );
    let stopper = feed.stopper();
    {
        let views = views.clone();
        let console = console.clone();
        let live = live.clone();
        let stack = stack.clone();
        glib::MainContext::default().spawn_local(async move {
            while let Some(event) = feed.recv().await {
                match event {
                    ConsoleEvent::Connection(conn) => {
                        live.set_tooltip_text(Some(&conn.label()));
                        live.set_label(match *feed.transport.borrow() {
                            Transport::Websocket => "Live",
                            Transport::Polling => "Polling",
                        });
                    }
                    ConsoleEvent::StatsUpdated(stats) => views.dashboard.set_stats(&stats),
                    ConsoleEvent::BatchesUpdated(batches) => views.batches.set_batches(&batches),
                    ConsoleEvent::BatchChanged { batch_id, status } => {
                        if matches!(status, BatchStatus::Completed | BatchStatus::Error) {
                            let name = views.batches.batch_name(&batch_id).unwrap_or(batch_id);
                            console.toast(&format!("Batch {name}: {}", status.label()));
                        }
                    }
                    ConsoleEvent::JobChanged { job_id, .. } => {
                        log::debug!("job update pushed for {job_id:?}");
                        if stack.visible_child_name().as_deref() == Some(Page::Jobs.name()) {
                            views.jobs.refresh(Fetch::Network);
                        }
                    }
                    ConsoleEvent::Other(ev) => log::debug!("unhandled realtime event {}", ev.event_type),
                }
            }
            log::debug!("update feed ended");
        });
    }

    {
        let health_timer = health_timer.clone();
        let stopper = stopper.clone();
        window.connect_close_request(move |_| {
            stopper.stop();
            if let Some(id) = health_timer.borrow_mut().take() {
                id.remove();
            }
            glib::Propagation::Proceed
        });
    }

    {
        let app = app.clone();
        let window = window.clone();
        let console = console.clone();
        logout_btn.connect_clicked(move |btn| {
            btn.set_sensitive(false);
            stopper.stop();
            if let Some(id) = health_timer.borrow_mut().take() {
                id.remove();
            }
            console.queries.clear();
            if let Some(cache) = &console.cache {
                if let Err(e) = cache.borrow().clear() {
                    log::warn!("could not clear local cache: {e}");
                }
            }
            let app = app.clone();
            let window = window.clone();
            let console = console.clone();
            crate::utils::run_async_to_main(
                async move { SessionService::local().logout().await },
                move |res| {
                    if let Err(e) = res {
                        console.toast(&format!("Sign-out incomplete: {e}"));
                    }
                    crate::ui::login::show_login_window(&app);
                    window.close();
                },
            );
        });
    }
}
