use adw::prelude::*;
use gtk4 as gtk;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::api::models::{Account, AccountStatus, NewAccount, PlanType};
use crate::api::queries::Fetch;
use crate::ui::{clear_list, ConsoleRef};

pub struct AccountsView {
    root: gtk::Box,
    list: gtk::ListBox,
    console: ConsoleRef,
}

impl AccountsView {
    pub fn new(console: ConsoleRef) -> Rc<Self> {
        let root = crate::ui::page_box();
        let header = gtk::Box::new(gtk::Orientation::Horizontal, 8);
        let title = crate::ui::page_title("Accounts");
        title.set_hexpand(true);
        header.append(&title);
        let new_btn = gtk::Button::with_label("New account");
        new_btn.add_css_class("suggested-action");
        header.append(&new_btn);
        root.append(&header);

        let list = gtk::ListBox::new();
        list.add_css_class("boxed-list");
        list.set_selection_mode(gtk::SelectionMode::None);
        root.append(&crate::ui::scrolled(&list));

        let view = Rc::new(Self { root, list, console });
        {
            let view = view.clone();
            new_btn.connect_clicked(move |btn| view.show_create_dialog(btn));
        }
        view
    }

    pub fn widget(&self) -> gtk::Widget {
        self.root.clone().upcast()
    }

    /// Draws the cached list at once, then refreshes from the backend.
    pub fn load(self: &Rc<Self>) {
        if let Some(cache) = &self.console.cache {
            match cache.borrow().accounts(None) {
                Ok(cached) if !cached.is_empty() => self.set_accounts(&cached),
                Ok(_) => {}
                Err(e) => log::warn!("account cache unavailable: {e}"),
            }
        }
        self.refresh(Fetch::Cached);
    }

    pub fn refresh(self: &Rc<Self>, mode: Fetch) {
        let this = self.clone();
        let queries = self.console.queries.clone();
        crate::utils::run_async_to_main(async move { queries.accounts(mode).await }, move |res| match res {
            Ok(accounts) => {
                if let Some(cache) = &this.console.cache {
                    if let Err(e) = cache.borrow_mut().replace_accounts(&accounts) {
                        log::warn!("could not cache accounts: {e}");
                    }
                }
                this.set_accounts(&accounts);
            }
            Err(e) => this.console.toast(&format!("Failed to load accounts: {e}")),
        });
    }

    pub fn set_accounts(self: &Rc<Self>, accounts: &[Account]) {
        clear_list(&self.list);
        if accounts.is_empty() {
            self.list.append(&crate::ui::empty_row("No accounts yet"));
            return;
        }
        for account in accounts {
            self.list.append(&self.account_row(account));
        }
    }

    fn balance_text(&self, account: &Account) -> String {
        let b = &account.balance;
        match b.plan {
            PlanType::Minutes => format!(
                "{} of {} minutes left",
                crate::format::format_number(b.remaining, 0, &self.console.settings.locale),
                crate::format::format_number(b.total, 0, &self.console.settings.locale),
            ),
            _ => format!("{} credits left, {} spent", self.console.money(b.remaining), self.console.money(b.spent)),
        }
    }

    fn account_row(self: &Rc<Self>, account: &Account) -> adw::ActionRow {
        let row = adw::ActionRow::builder()
            .title(glib::markup_escape_text(&account.name).as_str())
            .subtitle(format!("{} · {}", account.status, self.balance_text(account)).as_str())
            .build();

        let fraction = if account.balance.total > 0.0 {
            (account.balance.remaining / account.balance.total).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let level = gtk::LevelBar::for_interval(0.0, 1.0);
        level.set_value(fraction);
        level.set_width_request(100);
        level.set_valign(gtk::Align::Center);
        row.add_suffix(&level);

        let (label, suspend) = match account.status {
            AccountStatus::Suspended | AccountStatus::Inactive => ("Activate", false),
            _ => ("Suspend", true),
        };
        let action = gtk::Button::with_label(label);
        action.set_valign(gtk::Align::Center);
        if suspend {
            action.add_css_class("destructive-action");
        }
        {
            let view = self.clone();
            let id = account.id.clone();
            let name = account.name.clone();
            action.connect_clicked(move |btn| {
                if suspend {
                    let view = view.clone();
                    let id = id.clone();
                    crate::ui::confirm(
                        btn,
                        "Suspend account?",
                        &format!("Calls for {name} stop until the account is activated again."),
                        move || view.set_suspended(&id, true),
                    );
                } else {
                    view.set_suspended(&id, false);
                }
            });
        }
        row.add_suffix(&action);
        row
    }

    fn set_suspended(self: &Rc<Self>, id: &str, suspend: bool) {
        let this = self.clone();
        let queries = self.console.queries.clone();
        let id = id.to_string();
        crate::utils::run_async_to_main(
            async move {
                if suspend {
                    queries.suspend_account(&id, Some("Suspended from console")).await
                } else {
                    queries.activate_account(&id).await
                }
            },
            move |res| match res {
                Ok(()) => {
                    this.console.toast(if suspend { "Account suspended" } else { "Account activated" });
                    this.refresh(Fetch::Network);
                }
                Err(e) => this.console.toast(&format!("Account update failed: {e}")),
            },
        );
    }

    fn show_create_dialog(self: &Rc<Self>, anchor: &gtk::Button) {
        let parent = anchor.root().and_then(|r| r.downcast::<gtk::Window>().ok());
        let dialog = adw::MessageDialog::new(parent.as_ref(), Some("New account"), None);

        let form = gtk::Box::new(gtk::Orientation::Vertical, 8);
        let name = gtk::Entry::new();
        name.set_placeholder_text(Some("Account name"));
        let plan = gtk::DropDown::from_strings(&["Credits", "Minutes"]);
        let amount = gtk::SpinButton::with_range(0.0, 10_000_000.0, 100.0);
        amount.set_digits(0);
        let amount_label = gtk::Label::new(Some("Initial balance"));
        amount_label.set_halign(gtk::Align::Start);
        form.append(&name);
        form.append(&plan);
        form.append(&amount_label);
        form.append(&amount);
        dialog.set_extra_child(Some(&form));
        dialog.add_responses(&[("cancel", "Cancel"), ("create", "Create")]);
        dialog.set_response_appearance("create", adw::ResponseAppearance::Suggested);
        dialog.set_default_response(Some("create"));
        dialog.set_close_response("cancel");

        let view = self.clone();
        dialog.connect_response(None, move |_, response| {
            if response != "create" {
                return;
            }
            let account_name = name.text().trim().to_string();
            if account_name.is_empty() {
                view.console.toast("An account needs a name.");
                return;
            }
            let minutes = plan.selected() == 1;
            let initial = Some(amount.value()).filter(|v| *v > 0.0);
            let req = NewAccount {
                account_name,
                plan_type: if minutes { PlanType::Minutes } else { PlanType::Credits },
                initial_credits: if minutes { None } else { initial },
                initial_minutes: if minutes { initial } else { None },
                features: BTreeMap::new(),
            };
            let this = view.clone();
            let queries = view.console.queries.clone();
            crate::utils::run_async_to_main(
                async move { queries.create_account(&req).await },
                move |res| match res {
                    Ok(account) => {
                        this.console.toast(&format!("Created {}", account.name));
                        this.refresh(Fetch::Network);
                    }
                    Err(e) => this.console.toast(&format!("Could not create account: {e}")),
                },
            );
        });
        dialog.present();
    }
}
