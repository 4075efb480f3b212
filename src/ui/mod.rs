pub mod accounts;
pub mod batches;
pub mod dashboard;
pub mod import_wizard;
pub mod jobs;
pub mod login;
pub mod main_window;
pub mod reports;
pub mod sidebar;

use adw::prelude::*;
use gtk4 as gtk;
use std::cell::RefCell;
use std::rc::Rc;

use crate::api::queries::Queries;
use crate::app::Settings;
use crate::storage::LocalCache;

/// What every view needs: the query layer, display settings, somewhere to
/// report errors and the local list cache.
pub struct Console {
    pub queries: Queries,
    pub settings: Settings,
    pub toasts: adw::ToastOverlay,
    pub cache: Option<RefCell<LocalCache>>,
}

pub type ConsoleRef = Rc<Console>;

impl Console {
    pub fn toast(&self, message: &str) {
        self.toasts.add_toast(adw::Toast::new(message));
    }

    pub fn money(&self, value: f64) -> String {
        crate::format::format_currency(value, &self.settings.currency, &self.settings.locale)
    }

    pub fn money_opt(&self, value: Option<f64>) -> String {
        crate::format::format_optional_currency(value, &self.settings.currency, &self.settings.locale)
    }

    pub fn count(&self, value: u64) -> String {
        crate::format::format_count(value, &self.settings.locale)
    }
}

pub fn clear_list(list: &gtk::ListBox) {
    while let Some(child) = list.first_child() {
        list.remove(&child);
    }
}

pub fn page_box() -> gtk::Box {
    let root = gtk::Box::new(gtk::Orientation::Vertical, 12);
    root.set_margin_top(12);
    root.set_margin_bottom(12);
    root.set_margin_start(12);
    root.set_margin_end(12);
    root
}

pub fn page_title(text: &str) -> gtk::Label {
    let title = gtk::Label::new(Some(text));
    title.add_css_class("title-2");
    title.set_halign(gtk::Align::Start);
    title
}

pub fn scrolled(child: &impl IsA<gtk::Widget>) -> gtk::ScrolledWindow {
    gtk::ScrolledWindow::builder()
        .vexpand(true)
        .hexpand(true)
        .child(child)
        .build()
}

pub fn empty_row(text: &str) -> gtk::ListBoxRow {
    let row = gtk::ListBoxRow::new();
    row.set_activatable(false);
    let label = gtk::Label::new(Some(text));
    label.add_css_class("dim-label");
    label.set_margin_top(12);
    label.set_margin_bottom(12);
    row.set_child(Some(&label));
    row
}

/// Asks before a destructive action and runs `on_yes` if confirmed.
pub fn confirm<F: Fn() + 'static>(parent: &impl IsA<gtk::Widget>, heading: &str, body: &str, on_yes: F) {
    let window = parent.root().and_then(|r| r.downcast::<gtk::Window>().ok());
    let dialog = adw::MessageDialog::new(window.as_ref(), Some(heading), Some(body));
    dialog.add_responses(&[("cancel", "Cancel"), ("confirm", "Confirm")]);
    dialog.set_response_appearance("confirm", adw::ResponseAppearance::Destructive);
    dialog.set_default_response(Some("cancel"));
    dialog.set_close_response("cancel");
    dialog.connect_response(None, move |_, response| {
        if response == "confirm" {
            on_yes();
        }
    });
    dialog.present();
}
