use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::config::RouteSettings;
use crate::engine::builder::{estimator_from_settings, StopDurationEstimator};
use crate::models::event::{LocationPing, Notification, RouteEvent};
use crate::observability::metrics::Metrics;
use crate::store::{InMemoryRouteStore, RouteStore};

pub struct AppState {
    pub store: Arc<dyn RouteStore>,
    pub settings: RouteSettings,
    pub estimator: Box<dyn StopDurationEstimator>,
    /// Last-known driver position per route; not versioned with the route.
    pub locations: DashMap<Uuid, LocationPing>,
    pub notification_tx: mpsc::Sender<Notification>,
    pub route_events_tx: broadcast::Sender<RouteEvent>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        settings: RouteSettings,
        notification_queue_size: usize,
        event_buffer_size: usize,
    ) -> (Self, mpsc::Receiver<Notification>) {
        Self::with_store(
            Arc::new(InMemoryRouteStore::new()),
            settings,
            notification_queue_size,
            event_buffer_size,
        )
    }

    pub fn with_store(
        store: Arc<dyn RouteStore>,
        settings: RouteSettings,
        notification_queue_size: usize,
        event_buffer_size: usize,
    ) -> (Self, mpsc::Receiver<Notification>) {
        let (notification_tx, notification_rx) = mpsc::channel(notification_queue_size);
        let (route_events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        (
            Self {
                store,
                estimator: estimator_from_settings(&settings),
                settings,
                locations: DashMap::new(),
                notification_tx,
                route_events_tx,
                metrics: Metrics::new(),
            },
            notification_rx,
        )
    }
}
