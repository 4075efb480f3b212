use adw::prelude::*;
use gtk4 as gtk;
use std::cell::RefCell;
use std::rc::Rc;

use crate::api::models::{Batch, BatchStatus};
use crate::api::queries::Fetch;
use crate::ui::{clear_list, ConsoleRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchAction {
    Pause,
    Resume,
    Cancel,
    Delete,
}

impl BatchAction {
    fn label(self) -> &'static str {
        match self {
            BatchAction::Pause => "Pause",
            BatchAction::Resume => "Resume",
            BatchAction::Cancel => "Cancel",
            BatchAction::Delete => "Delete",
        }
    }

    fn done(self) -> &'static str {
        match self {
            BatchAction::Pause => "Batch paused",
            BatchAction::Resume => "Batch resumed",
            BatchAction::Cancel => "Batch cancelled",
            BatchAction::Delete => "Batch deleted",
        }
    }

    /// Actions that make sense for a batch in `status`. The backend still
    /// decides whether the transition is allowed.
    fn available(status: &BatchStatus) -> &'static [BatchAction] {
        match status {
            BatchStatus::Running => &[BatchAction::Pause, BatchAction::Cancel],
            BatchStatus::Paused | BatchStatus::Pending => &[BatchAction::Resume, BatchAction::Cancel],
            BatchStatus::Completed | BatchStatus::Cancelled | BatchStatus::Error => &[BatchAction::Delete],
            BatchStatus::Unknown(_) => &[BatchAction::Delete],
        }
    }
}

pub struct BatchesView {
    root: gtk::Box,
    list: gtk::ListBox,
    console: ConsoleRef,
    current: RefCell<Vec<Batch>>,
}

impl BatchesView {
    pub fn new(console: ConsoleRef) -> Rc<Self> {
        let root = crate::ui::page_box();
        let header = gtk::Box::new(gtk::Orientation::Horizontal, 8);
        let title = crate::ui::page_title("Batches");
        title.set_hexpand(true);
        header.append(&title);
        let import_btn = gtk::Button::with_label("Import contacts…");
        import_btn.add_css_class("suggested-action");
        header.append(&import_btn);
        root.append(&header);

        let list = gtk::ListBox::new();
        list.add_css_class("boxed-list");
        list.set_selection_mode(gtk::SelectionMode::None);
        root.append(&crate::ui::scrolled(&list));

        let view = Rc::new(Self {
            root,
            list,
            console,
            current: RefCell::new(Vec::new()),
        });
        {
            let view = view.clone();
            import_btn.connect_clicked(move |btn| {
                let parent = btn.root().and_then(|r| r.downcast::<gtk::Window>().ok());
                let after = view.clone();
                crate::ui::import_wizard::ImportWizardWindow::open(
                    parent.as_ref(),
                    view.console.clone(),
                    move || after.refresh(Fetch::Network),
                );
            });
        }
        view
    }

    pub fn widget(&self) -> gtk::Widget {
        self.root.clone().upcast()
    }

    pub fn load(self: &Rc<Self>) {
        if let Some(cache) = &self.console.cache {
            match cache.borrow().batches(None, None) {
                Ok(cached) if !cached.is_empty() => self.set_batches(&cached),
                Ok(_) => {}
                Err(e) => log::warn!("batch cache unavailable: {e}"),
            }
        }
        self.refresh(Fetch::Cached);
    }

    pub fn refresh(self: &Rc<Self>, mode: Fetch) {
        let this = self.clone();
        let queries = self.console.queries.clone();
        crate::utils::run_async_to_main(async move { queries.batches(None, mode).await }, move |res| match res {
            Ok(batches) => this.set_batches(&batches),
            Err(e) => this.console.toast(&format!("Failed to load batches: {e}")),
        });
    }

    /// Also called with every update the feed delivers.
    pub fn set_batches(self: &Rc<Self>, batches: &[Batch]) {
        if let Some(cache) = &self.console.cache {
            if let Err(e) = cache.borrow_mut().replace_batches(batches) {
                log::warn!("could not cache batches: {e}");
            }
        }
        *self.current.borrow_mut() = batches.to_vec();
        clear_list(&self.list);
        if batches.is_empty() {
            self.list.append(&crate::ui::empty_row("No batches yet. Import a contact file to start one."));
            return;
        }
        for batch in batches {
            self.list.append(&self.batch_row(batch));
        }
    }

    pub fn batch_name(&self, id: &str) -> Option<String> {
        self.current.borrow().iter().find(|b| b.id == id).map(|b| b.name.clone())
    }

    fn batch_row(self: &Rc<Self>, batch: &Batch) -> adw::ActionRow {
        let s = &batch.stats;
        let c = &self.console;
        let subtitle = format!(
            "{} · {} of {} contacts done, {} failed · {}",
            batch.status.label(),
            c.count(s.completed),
            c.count(s.total_contacts),
            c.count(s.failed),
            c.money(s.total_cost),
        );
        let row = adw::ActionRow::builder()
            .title(glib::markup_escape_text(&batch.name).as_str())
            .subtitle(glib::markup_escape_text(&subtitle).as_str())
            .build();

        let progress = gtk::ProgressBar::new();
        progress.set_fraction(s.progress());
        progress.set_width_request(120);
        progress.set_valign(gtk::Align::Center);
        row.add_suffix(&progress);

        for action in BatchAction::available(&batch.status) {
            let action = *action;
            let btn = gtk::Button::with_label(action.label());
            btn.set_valign(gtk::Align::Center);
            if matches!(action, BatchAction::Cancel | BatchAction::Delete) {
                btn.add_css_class("destructive-action");
            }
            let view = self.clone();
            let id = batch.id.clone();
            let name = batch.name.clone();
            btn.connect_clicked(move |btn| match action {
                BatchAction::Pause | BatchAction::Resume => view.run(action, &id),
                BatchAction::Cancel | BatchAction::Delete => {
                    let view = view.clone();
                    let id = id.clone();
                    crate::ui::confirm(
                        btn,
                        &format!("{} batch?", action.label()),
                        &format!("“{name}” cannot be restarted afterwards."),
                        move || view.run(action, &id),
                    );
                }
            });
            row.add_suffix(&btn);
        }
        row
    }

    fn forget(&self, id: &str) {
        if let Some(cache) = &self.console.cache {
            if let Err(e) = cache.borrow().remove_batch(id) {
                log::warn!("could not drop batch {id} from cache: {e}");
            }
        }
        self.current.borrow_mut().retain(|b| b.id != id);
    }

    fn run(self: &Rc<Self>, action: BatchAction, id: &str) {
        let this = self.clone();
        let queries = self.console.queries.clone();
        let id = id.to_string();
        let id_done = id.clone();
        crate::utils::run_async_to_main(
            async move {
                match action {
                    BatchAction::Pause => queries.pause_batch(&id).await,
                    BatchAction::Resume => queries.resume_batch(&id).await,
                    BatchAction::Cancel => queries.cancel_batch(&id, Some("Cancelled from console")).await,
                    BatchAction::Delete => queries.delete_batch(&id).await,
                }
            },
            move |res| match res {
                Ok(()) => {
                    if action == BatchAction::Delete {
                        this.forget(&id_done);
                    }
                    this.console.toast(action.done());
                    this.refresh(Fetch::Network);
                }
                Err(e) => this.console.toast(&format!("{} failed: {e}", action.label())),
            },
        );
    }
}
