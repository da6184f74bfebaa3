//! Open engine instances and their release tracking
//!
//! Clearing the handle's slot does not free an engine: every running engine
//! call holds its own `Arc<Instance>`. An open or close that must not race the
//! previous instance waits on that instance's [`Release`], which is marked
//! only after the engine itself has been dropped.

use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use quarry_storage::Engine;
use tracing::warn;

/// How long a waiter blocks before logging that a release is slow
const SLOW_RELEASE: Duration = Duration::from_secs(5);

/// Marked once an instance (or a failed attempt to open one) is gone.
#[derive(Default)]
pub(crate) struct Release {
    released: Mutex<bool>,
    signal: Condvar,
}

impl Release {
    /// A fresh release and the token that marks it when dropped.
    pub(crate) fn pair() -> (Arc<Release>, ReleaseToken) {
        let release = Arc::new(Release::default());
        let token = ReleaseToken(Arc::clone(&release));
        (release, token)
    }

    pub(crate) fn is_released(&self) -> bool {
        *self.released.lock()
    }

    /// Block until the instance this tracks has been dropped.
    pub(crate) fn wait(&self) {
        let mut released = self.released.lock();
        while !*released {
            if self.signal.wait_for(&mut released, SLOW_RELEASE).timed_out() && !*released {
                warn!(
                    target: "quarry::db",
                    "Still waiting for the previous instance to be released"
                );
            }
        }
    }

    fn mark(&self) {
        *self.released.lock() = true;
        self.signal.notify_all();
    }
}

/// Marks its [`Release`] on drop.
pub(crate) struct ReleaseToken(Arc<Release>);

impl ReleaseToken {
    pub(crate) fn release(&self) -> &Arc<Release> {
        &self.0
    }
}

impl Drop for ReleaseToken {
    fn drop(&mut self) {
        self.0.mark();
    }
}

/// An engine together with the token marking its release.
///
/// Fields drop in declaration order: the engine (and with it any directory
/// lock) goes before the token is marked.
pub(crate) struct Instance {
    engine: Arc<dyn Engine>,
    token: ReleaseToken,
}

impl Instance {
    pub(crate) fn new(engine: Arc<dyn Engine>, token: ReleaseToken) -> Self {
        Instance { engine, token }
    }

    pub(crate) fn release(&self) -> &Arc<Release> {
        self.token.release()
    }
}

impl Deref for Instance {
    type Target = dyn Engine;

    fn deref(&self) -> &Self::Target {
        &*self.engine
    }
}
