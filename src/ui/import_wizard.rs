//! Three-step contact import: pick a file, map its columns, configure and
//! submit the batch.

use adw::prelude::*;
use gtk4 as gtk;
use gtk::gdk;
use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::{Rc, Weak};

use crate::api::models::Account;
use crate::api::queries::Fetch;
use crate::import::preview::sample_csv;
use crate::import::uploader::{CandidateFile, ACCEPTED_TYPES};
use crate::import::wizard::{ImportWizard, WizardStep};
use crate::import::{ColumnMapping, DetectedFormat, Field, ValidationError};
use crate::ui::{clear_list, ConsoleRef};

const NOT_MAPPED: &str = "(not mapped)";

fn step_name(step: WizardStep) -> &'static str {
    match step {
        WizardStep::SelectFile => "file",
        WizardStep::MapColumns => "mapping",
        WizardStep::Configure => "configure",
        WizardStep::Submitted => "done",
    }
}

pub struct ImportWizardWindow {
    window: adw::Window,
    console: ConsoleRef,
    wizard: RefCell<ImportWizard>,
    stack: gtk::Stack,
    busy: gtk::Spinner,
    file_status: gtk::Label,
    format_choice: gtk::DropDown,
    fields_box: gtk::Box,
    sample_grid: gtk::Grid,
    mapped_label: gtk::Label,
    errors: gtk::ListBox,
    to_configure: gtk::Button,
    account_choice: gtk::DropDown,
    accounts: RefCell<Vec<Account>>,
    batch_name: gtk::Entry,
    description: gtk::Entry,
    allow_duplicates: gtk::Switch,
    max_attempts: gtk::SpinButton,
    submit: gtk::Button,
    result: gtk::Label,
    // Set while widgets are updated from code, so their signals are ignored.
    syncing: Cell<bool>,
    chooser: RefCell<Option<gtk::FileChooserNative>>,
    on_created: Box<dyn Fn()>,
}

impl ImportWizardWindow {
    pub fn open<F: Fn() + 'static>(parent: Option<&gtk::Window>, console: ConsoleRef, on_created: F) -> Rc<Self> {
        let window = adw::Window::builder()
            .title("Import contacts")
            .default_width(720)
            .default_height(560)
            .modal(true)
            .build();
        window.set_transient_for(parent);

        let stack = gtk::Stack::new();
        stack.set_transition_type(gtk::StackTransitionType::SlideLeftRight);
        stack.set_vexpand(true);

        let busy = gtk::Spinner::new();
        let header = adw::HeaderBar::new();
        header.pack_end(&busy);

        let max_attempts = gtk::SpinButton::with_range(1.0, 10.0, 1.0);
        let wizard = ImportWizard::new(console.settings.upload_max_bytes);
        max_attempts.set_value(wizard.call_settings.max_attempts as f64);

        let view = Rc::new(Self {
            window,
            console,
            wizard: RefCell::new(wizard),
            stack,
            busy,
            file_status: gtk::Label::new(None),
            format_choice: gtk::DropDown::from_strings(
                &DetectedFormat::ALL.iter().map(|f| f.label()).collect::<Vec<_>>(),
            ),
            fields_box: gtk::Box::new(gtk::Orientation::Vertical, 6),
            sample_grid: gtk::Grid::new(),
            mapped_label: gtk::Label::new(None),
            errors: gtk::ListBox::new(),
            to_configure: gtk::Button::with_label("Next"),
            account_choice: gtk::DropDown::from_strings(&[]),
            accounts: RefCell::new(Vec::new()),
            batch_name: gtk::Entry::new(),
            description: gtk::Entry::new(),
            allow_duplicates: gtk::Switch::new(),
            max_attempts,
            submit: gtk::Button::with_label("Create batch"),
            result: gtk::Label::new(None),
            syncing: Cell::new(false),
            chooser: RefCell::new(None),
            on_created: Box::new(on_created),
        });

        view.stack.add_named(&view.file_page(), Some(step_name(WizardStep::SelectFile)));
        view.stack.add_named(&view.mapping_page(), Some(step_name(WizardStep::MapColumns)));
        view.stack.add_named(&view.configure_page(), Some(step_name(WizardStep::Configure)));
        view.stack.add_named(&view.done_page(), Some(step_name(WizardStep::Submitted)));

        let content = gtk::Box::new(gtk::Orientation::Vertical, 0);
        content.append(&header);
        content.append(&view.stack);
        let overlay = adw::ToastOverlay::new();
        overlay.set_child(Some(&content));
        view.window.set_content(Some(&overlay));
        {
            // The window owns the view for as long as it is open.
            let keep = view.clone();
            view.window.connect_close_request(move |_| {
                keep.chooser.borrow_mut().take();
                glib::Propagation::Proceed
            });
        }
        view.load_accounts();
        view.window.present();
        view
    }

    fn toast(&self, message: &str) {
        let overlay = self.window.content().and_then(|c| c.downcast::<adw::ToastOverlay>().ok());
        match overlay {
            Some(o) => o.add_toast(adw::Toast::new(message)),
            None => self.console.toast(message),
        }
    }

    fn show_step(&self, step: WizardStep) {
        self.stack.set_visible_child_name(step_name(step));
    }

    fn set_busy(&self, busy: bool) {
        self.busy.set_spinning(busy);
        self.submit.set_sensitive(!busy);
    }

    // ---- step 1 ----

    fn file_page(self: &Rc<Self>) -> gtk::Box {
        let page = crate::ui::page_box();
        page.append(&crate::ui::page_title("Choose a contact file"));

        let hint = gtk::Label::new(Some(&format!(
            "Excel or CSV ({}), up to {} MB. Drop it here or browse.",
            ACCEPTED_TYPES.iter().map(|(ext, _)| format!(".{ext}")).collect::<Vec<_>>().join(", "),
            self.console.settings.upload_max_bytes / (1024 * 1024)
        )));
        hint.set_wrap(true);
        hint.set_halign(gtk::Align::Start);
        page.append(&hint);

        let drop_zone = gtk::Box::new(gtk::Orientation::Vertical, 8);
        drop_zone.add_css_class("card");
        drop_zone.set_vexpand(true);
        drop_zone.set_valign(gtk::Align::Fill);
        let icon = gtk::Image::from_icon_name("document-send-symbolic");
        icon.set_pixel_size(64);
        icon.set_vexpand(true);
        icon.set_valign(gtk::Align::End);
        drop_zone.append(&icon);
        let browse = gtk::Button::with_label("Browse…");
        browse.set_halign(gtk::Align::Center);
        browse.set_vexpand(true);
        browse.set_valign(gtk::Align::Start);
        drop_zone.append(&browse);
        page.append(&drop_zone);

        self.file_status.set_halign(gtk::Align::Start);
        self.file_status.add_css_class("dim-label");
        page.append(&self.file_status);

        let target = gtk::DropTarget::new(gdk::FileList::static_type(), gdk::DragAction::COPY);
        {
            let view = Rc::downgrade(self);
            target.connect_drop(move |_, value, _, _| {
                let (Some(view), Ok(files)) = (view.upgrade(), value.get::<gdk::FileList>()) else {
                    return false;
                };
                let paths: Vec<PathBuf> = files.files().iter().filter_map(|f| f.path()).collect();
                view.take_files(paths);
                true
            });
        }
        drop_zone.add_controller(target);

        {
            let view = Rc::downgrade(self);
            browse.connect_clicked(move |_| {
                if let Some(view) = view.upgrade() {
                    view.browse();
                }
            });
        }
        page
    }

    #[allow(deprecated)]
    fn browse(self: &Rc<Self>) {
        let chooser = gtk::FileChooserNative::new(
            Some("Choose contact file"),
            Some(&self.window),
            gtk::FileChooserAction::Open,
            Some("Open"),
            Some("Cancel"),
        );
        let filter = gtk::FileFilter::new();
        filter.set_name(Some("Spreadsheets"));
        for (ext, mime) in ACCEPTED_TYPES {
            filter.add_pattern(&format!("*.{ext}"));
            filter.add_mime_type(mime);
        }
        chooser.add_filter(&filter);
        let view = Rc::downgrade(self);
        chooser.connect_response(move |dialog, response| {
            if let Some(view) = view.upgrade() {
                if response == gtk::ResponseType::Accept {
                    let paths: Vec<PathBuf> = dialog.file().and_then(|f| f.path()).into_iter().collect();
                    view.take_files(paths);
                }
                view.chooser.borrow_mut().take();
            }
            dialog.destroy();
        });
        chooser.show();
        *self.chooser.borrow_mut() = Some(chooser);
    }

    fn take_files(self: &Rc<Self>, paths: Vec<PathBuf>) {
        if self.wizard.borrow().uploader().is_uploading() {
            return;
        }
        let candidates: Result<Vec<CandidateFile>, _> = paths.iter().map(|p| CandidateFile::from_path(p)).collect();
        let candidates = match candidates {
            Ok(c) => c,
            Err(rejection) => {
                self.toast(&rejection.to_string());
                return;
            }
        };

        let selected = {
            let mut w = self.wizard.borrow_mut();
            // Edits in the entry decide whether the name still follows the file.
            w.batch_name = self.batch_name.text().to_string();
            w.select_files(&candidates).map(|f| (f.name.clone(), f.is_csv))
        };
        let (name, is_csv) = match selected {
            Ok(s) => s,
            Err(block) => {
                self.file_status.set_label(&block.to_string());
                self.toast(&block.to_string());
                return;
            }
        };
        self.set_busy(false);
        self.file_status.set_label(&format!("Reading {name}…"));
        self.batch_name.set_text(&self.wizard.borrow().batch_name);

        if is_csv {
            let preview = self.wizard.borrow().file().map(|f| sample_csv(&f.bytes));
            match preview {
                Some(Ok(preview)) => {
                    let fresh = self.wizard.borrow().mapper().is_none();
                    self.wizard.borrow_mut().apply_local_preview(preview);
                    self.after_preview(fresh, &name);
                }
                Some(Err(e)) => {
                    log::warn!("csv sample failed for {name}: {e}");
                    self.file_status.set_label(&format!("{name} could not be read as CSV"));
                }
                None => {}
            }
            return;
        }

        let request = match self.wizard.borrow().preview_request() {
            Ok(r) => r,
            Err(block) => {
                self.toast(&block.to_string());
                return;
            }
        };
        let selection = self.wizard.borrow().selection();
        self.set_busy(true);
        let queries = self.console.queries.clone();
        let view = Rc::downgrade(self);
        crate::utils::run_async_to_main(async move { queries.preview_excel(&request).await }, move |res| {
            let Some(view) = view.upgrade() else {
                return;
            };
            if view.wizard.borrow().selection() != selection {
                log::debug!("dropping preview of {name}, another file was chosen");
                return;
            }
            view.set_busy(false);
            match res {
                Ok(preview) => {
                    let fresh = view.wizard.borrow().mapper().is_none();
                    view.wizard.borrow_mut().apply_remote_preview(selection, preview);
                    view.after_preview(fresh, &name);
                }
                Err(e) => {
                    view.file_status.set_label(&format!("Preview failed: {e}"));
                    view.toast(&format!("Could not preview {name}: {e}"));
                }
            }
        });
    }

    fn after_preview(self: &Rc<Self>, fresh_mapper: bool, name: &str) {
        if fresh_mapper {
            self.connect_mapper();
        }
        let (total, format) = {
            let w = self.wizard.borrow();
            (w.total_rows(), w.mapper().map(|m| m.format()).unwrap_or_default())
        };
        self.file_status.set_label(&format!("{name}: {} rows", self.console.count(total)));
        self.syncing.set(true);
        let pos = DetectedFormat::ALL.iter().position(|f| *f == format).unwrap_or(0);
        self.format_choice.set_selected(pos as u32);
        self.syncing.set(false);
        self.rebuild_mapping();
        self.show_step(WizardStep::MapColumns);
    }

    // ---- step 2 ----

    fn mapping_page(self: &Rc<Self>) -> gtk::Box {
        let page = crate::ui::page_box();
        page.append(&crate::ui::page_title("Map columns"));

        let format_row = gtk::Box::new(gtk::Orientation::Horizontal, 8);
        format_row.append(&gtk::Label::new(Some("File type")));
        format_row.append(&self.format_choice);
        page.append(&format_row);
        {
            let view = Rc::downgrade(self);
            self.format_choice.connect_selected_notify(move |dd| {
                let Some(view) = view.upgrade() else {
                    return;
                };
                if view.syncing.get() {
                    return;
                }
                if let Some(format) = DetectedFormat::ALL.get(dd.selected() as usize) {
                    view.wizard.borrow_mut().set_format(*format);
                    view.rebuild_mapping();
                }
            });
        }

        let body = gtk::Box::new(gtk::Orientation::Vertical, 12);
        self.sample_grid.set_column_spacing(12);
        self.sample_grid.set_row_spacing(4);
        body.append(&self.sample_grid);
        body.append(&self.fields_box);
        self.mapped_label.set_halign(gtk::Align::Start);
        self.mapped_label.add_css_class("dim-label");
        body.append(&self.mapped_label);
        self.errors.add_css_class("boxed-list");
        self.errors.set_selection_mode(gtk::SelectionMode::None);
        body.append(&self.errors);
        page.append(&crate::ui::scrolled(&body));

        let nav = gtk::Box::new(gtk::Orientation::Horizontal, 8);
        nav.set_halign(gtk::Align::End);
        let back = gtk::Button::with_label("Back");
        self.to_configure.add_css_class("suggested-action");
        nav.append(&back);
        nav.append(&self.to_configure);
        page.append(&nav);

        {
            let view = Rc::downgrade(self);
            back.connect_clicked(move |_| {
                if let Some(view) = view.upgrade() {
                    let step = view.wizard.borrow_mut().back();
                    view.show_step(step);
                }
            });
        }
        {
            let view = Rc::downgrade(self);
            self.to_configure.connect_clicked(move |_| {
                let Some(view) = view.upgrade() else {
                    return;
                };
                let advanced = view.wizard.borrow_mut().advance();
                match advanced {
                    Ok(step) => view.show_step(step),
                    Err(block) => view.toast(&block.to_string()),
                }
            });
        }
        page
    }

    /// Mapper callbacks run while the wizard is mutably borrowed, so they only
    /// touch widgets.
    fn connect_mapper(self: &Rc<Self>) {
        let mapping_view = Rc::downgrade(self);
        let validation_view = Rc::downgrade(self);
        let mut wizard = self.wizard.borrow_mut();
        let Some(mapper) = wizard.mapper_mut() else {
            return;
        };
        mapper.connect_mapping_changed(move |mapping: &ColumnMapping| {
            if let Some(view) = mapping_view.upgrade() {
                view.mapped_label.set_label(&format!("{} of {} fields mapped", mapping.len(), Field::ALL.len()));
            }
        });
        mapper.connect_validation_changed(move |errors: &[ValidationError]| {
            if let Some(view) = validation_view.upgrade() {
                view.show_errors(errors);
            }
        });
    }

    fn show_errors(&self, errors: &[ValidationError]) {
        clear_list(&self.errors);
        for e in errors {
            let row = adw::ActionRow::builder()
                .title(glib::markup_escape_text(&e.message).as_str())
                .build();
            if !e.is_missing_required() {
                row.set_subtitle(&glib::markup_escape_text(&format!("Row {}, {}: “{}”", e.row + 1, e.column, e.value)));
            }
            let icon = gtk::Image::from_icon_name(if e.is_missing_required() {
                "dialog-error-symbolic"
            } else {
                "dialog-warning-symbolic"
            });
            row.add_prefix(&icon);
            self.errors.append(&row);
        }
        self.errors.set_visible(!errors.is_empty());
        self.to_configure
            .set_sensitive(!errors.iter().any(ValidationError::is_missing_required));
    }

    fn rebuild_mapping(self: &Rc<Self>) {
        while let Some(child) = self.fields_box.first_child() {
            self.fields_box.remove(&child);
        }
        while let Some(child) = self.sample_grid.first_child() {
            self.sample_grid.remove(&child);
        }

        let (columns, mapping, required, rows, errors) = {
            let w = self.wizard.borrow();
            let Some(m) = w.mapper() else {
                return;
            };
            (
                m.columns().to_vec(),
                m.mapping().clone(),
                m.required_fields(),
                m.rows().to_vec(),
                m.errors().to_vec(),
            )
        };

        for (col, name) in columns.iter().enumerate() {
            let head = gtk::Label::new(Some(name));
            head.add_css_class("heading");
            head.set_halign(gtk::Align::Start);
            self.sample_grid.attach(&head, col as i32, 0, 1, 1);
            for (r, row) in rows.iter().enumerate() {
                let cell = gtk::Label::new(row.get(name));
                cell.set_halign(gtk::Align::Start);
                cell.set_ellipsize(gtk::pango::EllipsizeMode::End);
                cell.set_max_width_chars(24);
                self.sample_grid.attach(&cell, col as i32, r as i32 + 1, 1, 1);
            }
        }

        let mut choices: Vec<&str> = vec![NOT_MAPPED];
        choices.extend(columns.iter().map(String::as_str));
        self.syncing.set(true);
        for field in Field::ALL {
            let line = gtk::Box::new(gtk::Orientation::Horizontal, 8);
            let label = gtk::Label::new(Some(&if required.contains(&field) {
                format!("{} *", field.label())
            } else {
                field.label().to_string()
            }));
            label.set_width_chars(16);
            label.set_xalign(0.0);
            let dropdown = gtk::DropDown::from_strings(&choices);
            dropdown.set_hexpand(true);
            let selected = mapping
                .get(&field)
                .and_then(|c| columns.iter().position(|x| x == c))
                .map_or(0, |i| i + 1);
            dropdown.set_selected(selected as u32);
            {
                let view = Rc::downgrade(self);
                let columns = columns.clone();
                dropdown.connect_selected_notify(move |dd| {
                    let Some(view) = view.upgrade() else {
                        return;
                    };
                    if view.syncing.get() {
                        return;
                    }
                    let column = match dd.selected() {
                        0 | gtk::INVALID_LIST_POSITION => None,
                        i => columns.get(i as usize - 1).map(String::as_str),
                    };
                    if let Some(mapper) = view.wizard.borrow_mut().mapper_mut() {
                        mapper.set_field(field, column);
                    }
                });
            }
            line.append(&label);
            line.append(&dropdown);
            self.fields_box.append(&line);
        }
        self.syncing.set(false);

        self.mapped_label
            .set_label(&format!("{} of {} fields mapped", mapping.len(), Field::ALL.len()));
        self.show_errors(&errors);
    }

    // ---- step 3 ----

    fn configure_page(self: &Rc<Self>) -> gtk::Box {
        let page = crate::ui::page_box();
        page.append(&crate::ui::page_title("Batch settings"));

        let group = gtk::ListBox::new();
        group.add_css_class("boxed-list");
        group.set_selection_mode(gtk::SelectionMode::None);
        let labelled = |title: &str, widget: &gtk::Widget| {
            let row = adw::ActionRow::builder().title(title).build();
            widget.set_valign(gtk::Align::Center);
            row.add_suffix(widget);
            group.append(&row);
        };
        labelled("Account", self.account_choice.upcast_ref());
        self.batch_name.set_width_chars(28);
        labelled("Batch name", self.batch_name.upcast_ref());
        self.description.set_width_chars(28);
        labelled("Description", self.description.upcast_ref());
        labelled("Call attempts per contact", self.max_attempts.upcast_ref());
        labelled("Allow duplicate phones", self.allow_duplicates.upcast_ref());
        page.append(&group);

        let spacer = gtk::Box::new(gtk::Orientation::Vertical, 0);
        spacer.set_vexpand(true);
        page.append(&spacer);

        let nav = gtk::Box::new(gtk::Orientation::Horizontal, 8);
        nav.set_halign(gtk::Align::End);
        let back = gtk::Button::with_label("Back");
        self.submit.add_css_class("suggested-action");
        nav.append(&back);
        nav.append(&self.submit);
        page.append(&nav);

        {
            let view = Rc::downgrade(self);
            back.connect_clicked(move |_| {
                if let Some(view) = view.upgrade() {
                    let step = view.wizard.borrow_mut().back();
                    view.show_step(step);
                }
            });
        }
        {
            let view = Rc::downgrade(self);
            self.submit.connect_clicked(move |_| {
                if let Some(view) = view.upgrade() {
                    view.submit();
                }
            });
        }
        page
    }

    fn load_accounts(self: &Rc<Self>) {
        let queries = self.console.queries.clone();
        let view: Weak<Self> = Rc::downgrade(self);
        crate::utils::run_async_to_main(async move { queries.accounts(Fetch::Cached).await }, move |res| {
            let Some(view) = view.upgrade() else {
                return;
            };
            match res {
                Ok(accounts) => {
                    let names: Vec<&str> = accounts.iter().map(|a| a.name.as_str()).collect();
                    view.account_choice.set_model(Some(&gtk::StringList::new(&names)));
                    *view.accounts.borrow_mut() = accounts;
                }
                Err(e) => view.toast(&format!("Could not load accounts: {e}")),
            }
        });
    }

    fn submit(self: &Rc<Self>) {
        if self.wizard.borrow().uploader().is_uploading() {
            return;
        }
        let account_id = self
            .accounts
            .borrow()
            .get(self.account_choice.selected() as usize)
            .map(|a| a.id.clone())
            .unwrap_or_default();
        let upload = {
            let mut w = self.wizard.borrow_mut();
            w.account_id = account_id;
            w.batch_name = self.batch_name.text().to_string();
            w.description = self.description.text().to_string();
            w.allow_duplicates = self.allow_duplicates.is_active();
            w.call_settings.max_attempts = self.max_attempts.value_as_int().max(1) as u32;
            w.build_upload()
        };
        let upload = match upload {
            Ok(u) => u,
            Err(block) => {
                self.toast(&block.to_string());
                return;
            }
        };

        self.wizard.borrow_mut().set_uploading(true);
        self.set_busy(true);
        let queries = self.console.queries.clone();
        let view = Rc::downgrade(self);
        crate::utils::run_async_to_main(
            async move { queries.create_batch_from_excel(&upload).await },
            move |res| {
                let Some(view) = view.upgrade() else {
                    return;
                };
                view.wizard.borrow_mut().set_uploading(false);
                view.set_busy(false);
                match res {
                    Ok(created) => {
                        log::info!("batch {} created with {} jobs", created.batch_id, created.jobs_created);
                        view.wizard.borrow_mut().mark_submitted();
                        let mut text = format!("Created {} jobs.", view.console.count(created.jobs_created));
                        if created.duplicates_skipped > 0 {
                            text.push_str(&format!(
                                " Skipped {} duplicate contacts.",
                                view.console.count(created.duplicates_skipped)
                            ));
                        }
                        view.result.set_label(&text);
                        view.show_step(WizardStep::Submitted);
                        (view.on_created)();
                    }
                    Err(e) => view.toast(&format!("Upload failed: {e}")),
                }
            },
        );
    }

    // ---- done ----

    fn done_page(self: &Rc<Self>) -> gtk::Box {
        let page = crate::ui::page_box();
        page.set_valign(gtk::Align::Center);
        let icon = gtk::Image::from_icon_name("emblem-ok-symbolic");
        icon.set_pixel_size(64);
        page.append(&icon);
        page.append(&crate::ui::page_title("Batch created"));
        self.result.set_wrap(true);
        page.append(&self.result);
        let close = gtk::Button::with_label("Close");
        close.set_halign(gtk::Align::Center);
        close.add_css_class("pill");
        let window = self.window.clone();
        close.connect_clicked(move |_| window.close());
        page.append(&close);
        page
    }
}
