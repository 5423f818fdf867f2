//! User-visible notices (toast-style), fire-and-forget

/// Notification surface the coordinator reports outcomes to
pub trait Notifier: Send + Sync {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
}

/// Notifier that only writes to the log; useful headless
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn success(&self, message: &str) {
        log::info!("{}", message);
    }

    fn error(&self, message: &str) {
        log::error!("{}", message);
    }
}
