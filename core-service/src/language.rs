//! Display language shared by every localized read.

use bridge_traits::Locale;
use tokio::sync::watch;
use tracing::info;

/// Current display locale, observable by presentation.
///
/// Cloning shares the same channel.
#[derive(Clone)]
pub struct LanguageState {
    sender: watch::Sender<Locale>,
}

impl LanguageState {
    pub fn new(initial: Locale) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    pub fn current(&self) -> Locale {
        *self.sender.borrow()
    }

    /// Switch the locale. Returns `false` when it was already selected.
    pub fn set(&self, locale: Locale) -> bool {
        let changed = self.sender.send_if_modified(|current| {
            if *current == locale {
                false
            } else {
                *current = locale;
                true
            }
        });

        if changed {
            info!(locale = locale.code(), "Display language changed");
        }
        changed
    }

    /// Receiver that sees the current locale and every later change
    pub fn subscribe(&self) -> watch::Receiver<Locale> {
        self.sender.subscribe()
    }
}

impl Default for LanguageState {
    fn default() -> Self {
        Self::new(Locale::BASE)
    }
}

impl std::fmt::Debug for LanguageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageState")
            .field("current", &self.current())
            .finish()
    }
}
