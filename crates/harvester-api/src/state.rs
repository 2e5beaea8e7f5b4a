use std::sync::Arc;

use harvester_common::SigningKey;
use harvester_storage::MetricStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MetricStore>,
    pub key: Option<SigningKey>,
}

impl AppState {
    pub fn new(store: Arc<MetricStore>, key: Option<SigningKey>) -> Self {
        Self { store, key }
    }
}
