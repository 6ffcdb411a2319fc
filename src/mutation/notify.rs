//! User-visible warnings for failed mutations.

/// Surface a transient warning to the user.
pub trait Notifier: Send + Sync {
    fn warn(&self, title: &str, detail: &str);
}

/// Logs warnings through `tracing`. Used by the CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn warn(&self, title: &str, detail: &str) {
        tracing::warn!(detail, "{title}");
    }
}
