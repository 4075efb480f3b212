use once_cell::sync::Lazy;

pub static RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build Tokio runtime")
});

/// Runs `fut` on the shared runtime and hands its output to `on_done` on the
/// GTK main loop. If the runtime task dies the callback is skipped.
pub fn run_async_to_main<T, Fut, F>(fut: Fut, on_done: F)
where
    T: Send + 'static,
    Fut: std::future::Future<Output = T> + Send + 'static,
    F: FnOnce(T) + 'static,
{
    let handle = RUNTIME.spawn(fut);
    glib::MainContext::default().spawn_local(async move {
        match handle.await {
            Ok(value) => on_done(value),
            Err(e) => log::error!("background task failed: {e}"),
        }
    });
}

pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::normalize_url;

    #[test]
    fn adds_scheme_and_strips_slash() {
        assert_eq!(normalize_url(" api.example.com/ "), "https://api.example.com");
        assert_eq!(normalize_url("http://localhost:8000"), "http://localhost:8000");
        assert_eq!(normalize_url("   "), "");
    }
}
