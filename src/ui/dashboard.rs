use gtk4::prelude::*;
use gtk4 as gtk;

use crate::api::models::DashboardStats;
use crate::api::queries::Fetch;
use crate::ui::ConsoleRef;

struct Card {
    value: gtk::Label,
}

impl Card {
    fn new(grid: &gtk::Grid, title: &str, col: i32, row: i32) -> Self {
        let frame = gtk::Box::new(gtk::Orientation::Vertical, 4);
        frame.add_css_class("card");
        frame.set_hexpand(true);
        let caption = gtk::Label::new(Some(title));
        caption.add_css_class("dim-label");
        caption.set_halign(gtk::Align::Start);
        caption.set_margin_top(12);
        caption.set_margin_start(12);
        let value = gtk::Label::new(Some("-"));
        value.add_css_class("title-1");
        value.set_halign(gtk::Align::Start);
        value.set_margin_bottom(12);
        value.set_margin_start(12);
        frame.append(&caption);
        frame.append(&value);
        grid.attach(&frame, col, row, 1, 1);
        Self { value }
    }
}

pub struct DashboardView {
    root: gtk::Box,
    console: ConsoleRef,
    cards: Vec<Card>,
    updated: gtk::Label,
}

impl DashboardView {
    const TITLES: [&'static str; 8] = [
        "Accounts",
        "Active batches",
        "Jobs",
        "Pending",
        "In progress",
        "Completed",
        "Success rate",
        "Total cost",
    ];

    pub fn new(console: ConsoleRef) -> Self {
        let root = crate::ui::page_box();
        root.append(&crate::ui::page_title("Dashboard"));

        let grid = gtk::Grid::new();
        grid.set_row_spacing(12);
        grid.set_column_spacing(12);
        let cards = Self::TITLES
            .iter()
            .enumerate()
            .map(|(i, title)| Card::new(&grid, title, (i % 4) as i32, (i / 4) as i32))
            .collect();
        root.append(&grid);

        let updated = gtk::Label::new(None);
        updated.add_css_class("dim-label");
        updated.set_halign(gtk::Align::Start);
        root.append(&updated);

        Self {
            root,
            console,
            cards,
            updated,
        }
    }

    pub fn widget(&self) -> gtk::Widget {
        self.root.clone().upcast()
    }

    pub fn set_stats(&self, stats: &DashboardStats) {
        let c = &self.console;
        // Some backends send a ratio, others a percentage.
        let rate = if stats.success_rate > 1.0 { stats.success_rate / 100.0 } else { stats.success_rate };
        let values = [
            format!("{} / {}", c.count(stats.active_accounts), c.count(stats.total_accounts)),
            format!("{} / {}", c.count(stats.active_batches), c.count(stats.total_batches)),
            c.count(stats.total_jobs),
            c.count(stats.pending_jobs),
            c.count(stats.in_progress_jobs),
            c.count(stats.completed_jobs),
            crate::format::format_percent(rate, &c.settings.locale),
            c.money(stats.total_cost),
        ];
        for (card, value) in self.cards.iter().zip(values) {
            card.value.set_label(&value);
        }
        self.updated.set_label(&format!(
            "Calls today: {}. Updated {}",
            c.count(stats.calls_today),
            chrono::Local::now().format("%H:%M:%S")
        ));
    }

    /// Uses the cached figures while they are fresh.
    pub fn refresh(self: &std::rc::Rc<Self>) {
        let this = self.clone();
        let queries = self.console.queries.clone();
        crate::utils::run_async_to_main(
            async move { queries.dashboard_stats(Fetch::Cached).await },
            move |res| match res {
                Ok(stats) => this.set_stats(&stats),
                Err(e) => this.console.toast(&format!("Failed to load dashboard: {e}")),
            },
        );
    }
}
