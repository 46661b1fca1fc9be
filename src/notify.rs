//! Seam between the session substrate and whatever renders it
//!
//! The substrate never draws. Everything a user sees goes through this
//! trait; the console binary implements it, tests install recorders.

use crate::session::poller::RunningStatus;
use std::sync::Arc;

/// Fire-and-forget trigger into another module, registered at bootstrap
/// once the target module has loaded.
pub type RefreshHook = Arc<dyn Fn() + Send + Sync>;

/// Rendering surface the session layer talks to.
pub trait ViewSink: Send + Sync {
    /// A dialog-class event arrived with no dialog open. `messages`
    /// holds everything accumulated for the dialog so far.
    fn error_dialog_opened(&self, messages: &[String]);

    /// A dialog-class event arrived while the dialog was already open.
    fn error_dialog_appended(&self, message: &str);

    /// The session ended; credentials are gone.
    fn show_login(&self);

    /// A session is active; present the file browser.
    fn show_browser(&self);

    /// The appliance accepted a power-off request.
    fn announce_shutdown(&self);

    /// Fresh data from the status poller.
    fn render_status(&self, status: &RunningStatus);
}
