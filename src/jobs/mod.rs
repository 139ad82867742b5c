//! Job handlers invoked by the dispatcher once a queued job is popped
//! (spec §4.4-4.6). Each handler re-reads its state from the canonical
//! store rather than trusting in-memory state, so it can resume after a
//! worker restart.

pub mod reconcile;
pub mod scan;
pub mod sync;

use crate::adapters::AdapterRegistry;
use crate::onboarding::OnboardingCoordinator;
use crate::store::CanonicalStore;
use std::sync::Arc;

/// Shared dependencies threaded through every job handler.
#[derive(Clone)]
pub struct JobContext {
    pub store: Arc<CanonicalStore>,
    pub registry: Arc<AdapterRegistry>,
    pub onboarding: Arc<OnboardingCoordinator>,
}
