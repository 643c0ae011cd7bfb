use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{info, warn};

use crate::models::event::Notification;
use crate::state::AppState;

/// Fire-and-forget: a full or closed queue drops the notification with a
/// warning and never fails the transition that produced it.
pub fn enqueue_notification(state: &AppState, notification: Notification) {
    match state.notification_tx.try_send(notification) {
        Ok(()) => {}
        Err(TrySendError::Full(dropped)) => {
            warn!(
                route_id = %dropped.route_id,
                event = dropped.event.as_str(),
                "notification queue full; dropping notification"
            );
        }
        Err(TrySendError::Closed(dropped)) => {
            warn!(
                route_id = %dropped.route_id,
                event = dropped.event.as_str(),
                "notification worker stopped; dropping notification"
            );
        }
    }
}

/// Drains the queue and hands each notification to the push sender.
/// Delivery mechanics live outside this service; here they are logged.
pub async fn run_notification_worker(
    state: Arc<AppState>,
    mut notification_rx: mpsc::Receiver<Notification>,
) {
    info!("notification worker started");

    while let Some(notification) = notification_rx.recv().await {
        state
            .metrics
            .notifications_total
            .with_label_values(&[notification.event.as_str()])
            .inc();

        info!(
            route_id = %notification.route_id,
            stop_id = ?notification.stop_id,
            event = notification.event.as_str(),
            actor = %notification.actor,
            timestamp = %notification.timestamp,
            "notification dispatched"
        );
    }

    warn!("notification worker stopped: queue channel closed");
}
