use adw::prelude::*;
use gtk4 as gtk;
use std::rc::Rc;

use crate::api::models::JobFilter;
use crate::api::queries::Fetch;
use crate::reports::FinancialSummary;
use crate::ui::{clear_list, ConsoleRef};

const REPORT_LIMIT: u32 = 1000;

pub struct ReportsView {
    root: gtk::Box,
    batch_filter: gtk::Entry,
    figures: gtk::ListBox,
    statuses: gtk::ListBox,
    console: ConsoleRef,
}

impl ReportsView {
    pub fn new(console: ConsoleRef) -> Rc<Self> {
        let root = crate::ui::page_box();
        root.append(&crate::ui::page_title("Reports"));

        let controls = gtk::Box::new(gtk::Orientation::Horizontal, 8);
        let batch_filter = gtk::Entry::new();
        batch_filter.set_placeholder_text(Some("Batch id (empty for all)"));
        batch_filter.set_hexpand(true);
        let generate = gtk::Button::with_label("Generate");
        generate.add_css_class("suggested-action");
        controls.append(&batch_filter);
        controls.append(&generate);
        root.append(&controls);

        let figures = gtk::ListBox::new();
        figures.add_css_class("boxed-list");
        figures.set_selection_mode(gtk::SelectionMode::None);
        let statuses = gtk::ListBox::new();
        statuses.add_css_class("boxed-list");
        statuses.set_selection_mode(gtk::SelectionMode::None);

        let body = gtk::Box::new(gtk::Orientation::Vertical, 12);
        body.append(&figures);
        let by_status = gtk::Label::new(Some("Jobs by status"));
        by_status.add_css_class("heading");
        by_status.set_halign(gtk::Align::Start);
        body.append(&by_status);
        body.append(&statuses);
        root.append(&crate::ui::scrolled(&body));

        let view = Rc::new(Self {
            root,
            batch_filter,
            figures,
            statuses,
            console,
        });
        {
            let view = view.clone();
            generate.connect_clicked(move |_| view.generate());
        }
        view
    }

    pub fn widget(&self) -> gtk::Widget {
        self.root.clone().upcast()
    }

    pub fn generate(self: &Rc<Self>) {
        let batch = self.batch_filter.text().trim().to_string();
        let filter = JobFilter {
            batch_id: (!batch.is_empty()).then_some(batch),
            limit: Some(REPORT_LIMIT),
            ..JobFilter::default()
        };
        let this = self.clone();
        let queries = self.console.queries.clone();
        crate::utils::run_async_to_main(
            async move {
                let jobs = queries.jobs(&filter, Fetch::Cached).await?;
                Ok::<_, crate::error::ApiError>(FinancialSummary::from_jobs(&jobs))
            },
            move |res| match res {
                Ok(summary) => this.show(&summary),
                Err(e) => this.console.toast(&format!("Could not build report: {e}")),
            },
        );
    }

    fn show(&self, s: &FinancialSummary) {
        let c = &self.console;
        let locale = &c.settings.locale;
        clear_list(&self.figures);
        let rows = [
            ("Jobs", c.count(s.jobs as u64)),
            ("Total debt", c.money(s.total_debt)),
            ("Agreed to pay", c.money(s.total_agreed)),
            ("Shortfall", c.money(s.total_shortfall)),
            ("Recovery rate", crate::format::format_percent(s.recovery_rate(), locale)),
            ("Completion rate", crate::format::format_percent(s.completion_rate(), locale)),
            (
                "Average call",
                s.average_duration_secs.map_or_else(|| "-".into(), crate::format::format_duration),
            ),
            ("Call cost", c.money(s.total_cost)),
        ];
        for (title, value) in rows {
            self.figures.append(&figure_row(title, &value));
        }

        clear_list(&self.statuses);
        if s.by_status.is_empty() {
            self.statuses.append(&crate::ui::empty_row("No jobs in range"));
        }
        for (status, n) in &s.by_status {
            self.statuses.append(&figure_row(status, &c.count(*n as u64)));
        }
    }
}

fn figure_row(title: &str, value: &str) -> adw::ActionRow {
    let row = adw::ActionRow::builder().title(glib::markup_escape_text(title).as_str()).build();
    let value = gtk::Label::new(Some(value));
    value.add_css_class("numeric");
    row.add_suffix(&value);
    row
}
