use adw::prelude::*;
use adw::Application;
use gtk4 as gtk;
use std::rc::Rc;

use crate::session::{Credentials, SessionService};

pub fn show_login_window(app: &Application) {
    let window = adw::ApplicationWindow::builder()
        .application(app)
        .title("CallOps Sign in")
        .default_width(420)
        .default_height(320)
        .resizable(false)
        .build();

    let toast_overlay = adw::ToastOverlay::new();

    let root = gtk::Box::new(gtk::Orientation::Vertical, 12);
    root.set_margin_top(24);
    root.set_margin_bottom(24);
    root.set_margin_start(24);
    root.set_margin_end(24);

    let title = gtk::Label::new(Some("Sign in to the operations console"));
    title.add_css_class("title-2");
    title.set_halign(gtk::Align::Start);
    root.append(&title);

    let saved = crate::app::AppState::load();

    let server_entry = gtk::Entry::new();
    server_entry.set_placeholder_text(Some("API server (e.g. https://api.example.com)"));
    server_entry.set_hexpand(true);
    server_entry.set_text(&saved.base_url);

    let user_entry = gtk::Entry::new();
    user_entry.set_placeholder_text(Some("Username or email"));
    user_entry.set_hexpand(true);

    let pass_entry = gtk::PasswordEntry::new();
    pass_entry.set_placeholder_text(Some("Password"));
    pass_entry.set_show_peek_icon(true);
    pass_entry.set_hexpand(true);

    let form = gtk::Box::new(gtk::Orientation::Vertical, 8);
    form.append(&server_entry);
    form.append(&user_entry);
    form.append(&pass_entry);
    root.append(&form);

    let status = gtk::Label::new(None);
    status.add_css_class("dim-label");
    status.set_halign(gtk::Align::Start);
    root.append(&status);

    let login_btn = gtk::Button::with_label("Sign in");
    login_btn.add_css_class("suggested-action");
    login_btn.set_halign(gtk::Align::End);
    root.append(&login_btn);

    toast_overlay.set_child(Some(&root));
    let container = gtk::Box::new(gtk::Orientation::Vertical, 0);
    let header = adw::HeaderBar::new();
    header.set_title_widget(Some(&gtk::Label::new(Some("CallOps Console"))));
    container.append(&header);
    container.append(&toast_overlay);
    window.set_content(Some(&container));

    let on_connect = {
        let app = app.clone();
        let window = window.clone();
        let overlay = toast_overlay.clone();
        let server_entry = server_entry.clone();
        let user_entry = user_entry.clone();
        let pass_entry = pass_entry.clone();
        let login_btn = login_btn.clone();
        move || {
            let server = server_entry.text().to_string();
            let credentials = Credentials {
                username: user_entry.text().to_string(),
                password: pass_entry.text().to_string(),
            };
            if server.trim().is_empty() || credentials.username.trim().is_empty() {
                overlay.add_toast(adw::Toast::new("Please enter the server address and a username."));
                return;
            }

            status.set_label("Signing in…");
            login_btn.set_sensitive(false);

            let status_label = status.clone();
            let app2 = app.clone();
            let window2 = window.clone();
            let overlay2 = overlay.clone();
            let login_btn2 = login_btn.clone();
            crate::utils::run_async_to_main(
                async move {
                    let session = SessionService::local().login(&server, &credentials).await?;
                    // The session is kept whatever the health check says;
                    // the header shows reachability once inside.
                    let base = crate::utils::normalize_url(&server);
                    let reachable = match crate::api::client::ApiClient::new(&base, Some(session.token.clone())) {
                        Ok(client) => client.health().await.map(|h| h.is_ok()).unwrap_or(false),
                        Err(_) => false,
                    };
                    Ok::<_, crate::session::SessionError>((session, reachable))
                },
                move |res| match res {
                    Ok((session, reachable)) => {
                        log::info!("session ready for {} (api reachable: {reachable})", session.user.name);
                        status_label.set_label(if reachable { "Connected" } else { "Signed in (API unreachable)" });
                        crate::ui::main_window::show_main_window(&app2);
                        window2.close();
                    }
                    Err(err) => {
                        log::warn!("sign-in failed: {err}");
                        status_label.set_label("Sign-in failed");
                        login_btn2.set_sensitive(true);
                        overlay2.add_toast(adw::Toast::new(&err.to_string()));
                    }
                },
            );
        }
    };

    let on_connect: Rc<dyn Fn()> = Rc::new(on_connect);
    {
        let on_connect = on_connect.clone();
        login_btn.connect_clicked(move |_| (on_connect)());
    }
    for entry in [&server_entry, &user_entry] {
        let on_connect = on_connect.clone();
        entry.connect_activate(move |_| (on_connect)());
    }
    {
        let on_connect = on_connect.clone();
        pass_entry.connect_activate(move |_| (on_connect)());
    }

    window.present();
}
