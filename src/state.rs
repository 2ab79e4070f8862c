use std::time::Duration;

use crate::classifier::Classifier;
use crate::store::Store;

// Shared, read-only per-connection context; built once at startup
pub struct AppState {
    pub classifier: Classifier<Store>,
    pub io_timeout: Duration, // bound for each client read and write
}

impl AppState {
    pub fn store_kind(&self) -> &'static str {
        self.classifier.rate_limiter().store().kind()
    }
}
