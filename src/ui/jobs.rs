use adw::prelude::*;
use gtk4 as gtk;
use std::cell::RefCell;
use std::rc::Rc;

use crate::api::models::{Job, JobFilter, JobStatus};
use crate::api::queries::Fetch;
use crate::export::ExportFormat;
use crate::ui::{clear_list, ConsoleRef};

const PAGE_SIZE: u32 = 200;

pub struct JobsView {
    root: gtk::Box,
    list: gtk::ListBox,
    status_filter: gtk::DropDown,
    batch_filter: gtk::Entry,
    summary: gtk::Label,
    console: ConsoleRef,
    jobs: RefCell<Vec<Job>>,
    // Native dialogs are freed when the last reference goes.
    chooser: RefCell<Option<gtk::FileChooserNative>>,
}

impl JobsView {
    pub fn new(console: ConsoleRef) -> Rc<Self> {
        let root = crate::ui::page_box();
        let header = gtk::Box::new(gtk::Orientation::Horizontal, 8);
        let title = crate::ui::page_title("Jobs");
        title.set_hexpand(true);
        header.append(&title);
        let export_csv = gtk::Button::with_label("Export CSV");
        let export_xls = gtk::Button::with_label("Export Excel");
        header.append(&export_csv);
        header.append(&export_xls);
        root.append(&header);

        let filters = gtk::Box::new(gtk::Orientation::Horizontal, 8);
        let statuses = JobStatus::FILTERABLE;
        let mut labels = vec!["All statuses"];
        labels.extend(statuses.iter().map(|s| s.label()));
        let status_filter = gtk::DropDown::from_strings(&labels);
        let batch_filter = gtk::Entry::new();
        batch_filter.set_placeholder_text(Some("Batch id"));
        batch_filter.set_hexpand(true);
        let apply = gtk::Button::with_label("Apply");
        filters.append(&status_filter);
        filters.append(&batch_filter);
        filters.append(&apply);
        root.append(&filters);

        let summary = gtk::Label::new(None);
        summary.add_css_class("dim-label");
        summary.set_halign(gtk::Align::Start);
        root.append(&summary);

        let list = gtk::ListBox::new();
        list.add_css_class("boxed-list");
        list.set_selection_mode(gtk::SelectionMode::None);
        root.append(&crate::ui::scrolled(&list));

        let view = Rc::new(Self {
            root,
            list,
            status_filter,
            batch_filter,
            summary,
            console,
            jobs: RefCell::new(Vec::new()),
            chooser: RefCell::new(None),
        });
        {
            let view = view.clone();
            apply.connect_clicked(move |_| view.refresh(Fetch::Network));
        }
        {
            let view2 = view.clone();
            view.batch_filter.connect_activate(move |_| view2.refresh(Fetch::Network));
        }
        for (btn, format) in [(export_csv, ExportFormat::Csv), (export_xls, ExportFormat::Xls)] {
            let view = view.clone();
            btn.connect_clicked(move |btn| view.export(btn, format));
        }
        view
    }

    pub fn widget(&self) -> gtk::Widget {
        self.root.clone().upcast()
    }

    pub fn filter(&self) -> JobFilter {
        let status = match self.status_filter.selected() {
            0 | gtk::INVALID_LIST_POSITION => None,
            i => JobStatus::FILTERABLE.get(i as usize - 1).cloned(),
        };
        let batch = self.batch_filter.text().trim().to_string();
        JobFilter {
            batch_id: (!batch.is_empty()).then_some(batch),
            status,
            limit: Some(PAGE_SIZE),
            ..JobFilter::default()
        }
    }

    pub fn refresh(self: &Rc<Self>, mode: Fetch) {
        let this = self.clone();
        let queries = self.console.queries.clone();
        let filter = self.filter();
        crate::utils::run_async_to_main(async move { queries.jobs(&filter, mode).await }, move |res| match res {
            Ok(jobs) => this.set_jobs(jobs),
            Err(e) => this.console.toast(&format!("Failed to load jobs: {e}")),
        });
    }

    fn set_jobs(self: &Rc<Self>, jobs: Vec<Job>) {
        clear_list(&self.list);
        self.summary.set_label(&format!("{} jobs", self.console.count(jobs.len() as u64)));
        if jobs.is_empty() {
            self.list.append(&crate::ui::empty_row("No jobs match these filters"));
        }
        for job in &jobs {
            self.list.append(&self.job_row(job));
        }
        *self.jobs.borrow_mut() = jobs;
    }

    fn job_row(self: &Rc<Self>, job: &Job) -> adw::ExpanderRow {
        let c = &self.console;
        let f = &job.finance;
        let row = adw::ExpanderRow::builder()
            .title(glib::markup_escape_text(&format!("{} · {}", job.contact.name, job.contact.phone)).as_str())
            .subtitle(
                glib::markup_escape_text(&format!(
                    "{} · debt {} · agreed {} · shortfall {}",
                    job.status.label(),
                    c.money_opt(f.debt),
                    c.money_opt(f.agreed_amount),
                    c.money_opt(f.shortfall()),
                ))
                .as_str(),
            )
            .build();

        if let Some(result) = &job.result {
            let details = [
                ("Summary", result.summary.clone()),
                ("Sentiment", result.sentiment.clone()),
                ("Duration", result.duration_seconds.map(crate::format::format_duration)),
                ("Cost", result.cost.map(|v| c.money(v))),
                ("Recording", result.recording_url.clone()),
            ];
            for (label, value) in details {
                if let Some(value) = value {
                    let detail = adw::ActionRow::builder()
                        .title(label)
                        .subtitle(glib::markup_escape_text(&value).as_str())
                        .subtitle_selectable(true)
                        .build();
                    row.add_row(&detail);
                }
            }
        }
        let when = adw::ActionRow::builder()
            .title("Updated")
            .subtitle(
                crate::format::format_timestamp(job.updated_at.as_ref().or(job.created_at.as_ref()), &c.settings.locale)
                    .as_str(),
            )
            .build();
        row.add_row(&when);

        if matches!(job.status, JobStatus::Failed | JobStatus::Cancelled) {
            let retry = gtk::Button::with_label("Retry");
            retry.set_valign(gtk::Align::Center);
            let view = self.clone();
            let id = job.id.clone();
            retry.connect_clicked(move |_| view.retry(&id));
            row.add_suffix(&retry);
        }
        let delete = gtk::Button::from_icon_name("user-trash-symbolic");
        delete.set_valign(gtk::Align::Center);
        delete.set_tooltip_text(Some("Delete job"));
        {
            let view = self.clone();
            let id = job.id.clone();
            delete.connect_clicked(move |btn| {
                let view = view.clone();
                let id = id.clone();
                crate::ui::confirm(btn, "Delete job?", "The job and its call result are removed.", move || {
                    view.delete(&id)
                });
            });
        }
        row.add_suffix(&delete);
        row
    }

    fn retry(self: &Rc<Self>, id: &str) {
        let this = self.clone();
        let queries = self.console.queries.clone();
        let id = id.to_string();
        crate::utils::run_async_to_main(async move { queries.retry_job(&id).await }, move |res| match res {
            Ok(()) => {
                this.console.toast("Job queued for retry");
                this.refresh(Fetch::Network);
            }
            Err(e) => this.console.toast(&format!("Retry failed: {e}")),
        });
    }

    fn delete(self: &Rc<Self>, id: &str) {
        let this = self.clone();
        let queries = self.console.queries.clone();
        let id = id.to_string();
        crate::utils::run_async_to_main(async move { queries.delete_job(&id).await }, move |res| match res {
            Ok(()) => {
                this.console.toast("Job deleted");
                this.refresh(Fetch::Network);
            }
            Err(e) => this.console.toast(&format!("Delete failed: {e}")),
        });
    }

    #[allow(deprecated)]
    fn export(self: &Rc<Self>, anchor: &gtk::Button, format: ExportFormat) {
        if self.jobs.borrow().is_empty() {
            self.console.toast("Nothing to export");
            return;
        }
        let parent = anchor.root().and_then(|r| r.downcast::<gtk::Window>().ok());
        let chooser = gtk::FileChooserNative::new(
            Some("Export jobs"),
            parent.as_ref(),
            gtk::FileChooserAction::Save,
            Some("Export"),
            Some("Cancel"),
        );
        chooser.set_current_name(&format!(
            "jobs-{}.{}",
            chrono::Local::now().format("%Y%m%d-%H%M"),
            format.extension()
        ));
        let view = self.clone();
        chooser.connect_response(move |dialog, response| {
            if response == gtk::ResponseType::Accept {
                if let Some(path) = dialog.file().and_then(|f| f.path()) {
                    let path = if path.extension().is_none() {
                        path.with_extension(format.extension())
                    } else {
                        path
                    };
                    match crate::export::write_jobs(&path, &view.jobs.borrow()) {
                        Ok(_) => view.console.toast(&format!("Saved {}", path.display())),
                        Err(e) => view.console.toast(&e.to_string()),
                    }
                }
            }
            dialog.destroy();
            view.chooser.borrow_mut().take();
        });
        chooser.show();
        *self.chooser.borrow_mut() = Some(chooser);
    }
}
