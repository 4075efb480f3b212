use gtk4::prelude::*;
use gtk4 as gtk;

/// Top-level pages, in sidebar order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Dashboard,
    Accounts,
    Batches,
    Jobs,
    Reports,
}

impl Page {
    pub const ALL: [Page; 5] = [Page::Dashboard, Page::Accounts, Page::Batches, Page::Jobs, Page::Reports];

    pub fn name(self) -> &'static str {
        match self {
            Page::Dashboard => "dashboard",
            Page::Accounts => "accounts",
            Page::Batches => "batches",
            Page::Jobs => "jobs",
            Page::Reports => "reports",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Page::Dashboard => "Dashboard",
            Page::Accounts => "Accounts",
            Page::Batches => "Batches",
            Page::Jobs => "Jobs",
            Page::Reports => "Reports",
        }
    }

    fn icon(self) -> &'static str {
        match self {
            Page::Dashboard => "view-grid-symbolic",
            Page::Accounts => "system-users-symbolic",
            Page::Batches => "view-list-symbolic",
            Page::Jobs => "call-start-symbolic",
            Page::Reports => "x-office-spreadsheet-symbolic",
        }
    }
}

pub struct Sidebar {
    root: gtk::Box,
    list: gtk::ListBox,
}

impl Sidebar {
    pub fn new() -> Self {
        let root = gtk::Box::new(gtk::Orientation::Vertical, 6);
        root.set_margin_top(8);
        root.set_margin_bottom(8);
        root.set_margin_start(8);
        root.set_margin_end(8);
        root.set_width_request(200);

        let title = gtk::Label::new(Some("Operations"));
        title.add_css_class("heading");
        title.set_halign(gtk::Align::Start);
        root.append(&title);

        let list = gtk::ListBox::new();
        list.add_css_class("navigation-sidebar");
        list.set_selection_mode(gtk::SelectionMode::Single);
        for page in Page::ALL {
            let row = gtk::ListBoxRow::new();
            let inner = gtk::Box::new(gtk::Orientation::Horizontal, 8);
            inner.set_margin_top(8);
            inner.set_margin_bottom(8);
            inner.set_margin_start(8);
            inner.set_margin_end(8);
            inner.append(&gtk::Image::from_icon_name(page.icon()));
            let label = gtk::Label::new(Some(page.title()));
            label.set_halign(gtk::Align::Start);
            inner.append(&label);
            row.set_child(Some(&inner));
            list.append(&row);
        }
        root.append(&list);

        Self { root, list }
    }

    pub fn widget(&self) -> gtk::Widget {
        self.root.clone().upcast()
    }

    pub fn connect_page_selected<F: Fn(Page) + 'static>(&self, f: F) {
        self.list.connect_row_selected(move |_, row| {
            if let Some(page) = row.and_then(|r| Page::ALL.get(r.index() as usize)) {
                f(*page);
            }
        });
    }

    pub fn select(&self, page: Page) {
        if let Some(pos) = Page::ALL.iter().position(|p| *p == page) {
            if let Some(row) = self.list.row_at_index(pos as i32) {
                self.list.select_row(Some(&row));
            }
        }
    }
}
