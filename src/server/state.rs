use std::sync::Arc;
use std::time::Instant;

use crate::broker::{Broker, TracingHooks};
use crate::config::Settings;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub broker: Broker,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let broker = Broker::with_hooks(settings.broker.clone(), Arc::new(TracingHooks));
        Self::with_broker(settings, broker)
    }

    pub fn with_broker(settings: Settings, broker: Broker) -> Self {
        Self {
            settings: Arc::new(settings),
            broker,
            start_time: Instant::now(),
        }
    }
}
