//! examwatch: exam-proctoring backend.
//!
//! Violation reports flow in through the HTTP layer, get a severity weight
//! from [`severity::SeverityTable`] and are stored per session. Finishing a
//! session hands it to [`finalizer::SessionFinalizer`], which reduces the
//! stored records into a verdict with [`reducer::VerdictReducer`].

pub mod config;
pub mod error;
pub mod finalizer;
pub mod handlers;
pub mod models;
pub mod reducer;
pub mod routes;
pub mod severity;
pub mod store;

use std::sync::Arc;

use finalizer::SessionFinalizer;
use reducer::VerdictReducer;
use severity::SeverityTable;
use store::SessionStore;

pub struct AppState {
    pub store: Arc<dyn SessionStore>,
    pub severity: SeverityTable,
    pub finalizer: SessionFinalizer,
}

impl AppState {
    pub fn new(
        store: Arc<dyn SessionStore>,
        severity: SeverityTable,
        reducer: VerdictReducer,
    ) -> Self {
        Self {
            finalizer: SessionFinalizer::new(store.clone(), reducer),
            store,
            severity,
        }
    }
}
