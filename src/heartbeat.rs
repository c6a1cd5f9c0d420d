//! Keep-alive driven by the heartbeat config fields.
//!
//! The client itself never sends heartbeats. Callers that want them spawn a
//! [`Heartbeat`], which sends `{}` under the configured message name at the
//! configured interval while the socket is open. It never opens a socket on
//! its own, so it cannot undo an explicit `close()`.

use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::client::SocketClient;

/// Running keep-alive task. Stops when dropped.
#[derive(Debug)]
pub struct Heartbeat {
    task: JoinHandle<()>,
}

impl Heartbeat {
    /// Start the keep-alive for `client`. `None` when heartbeat is not
    /// configured or its interval is zero.
    #[must_use]
    pub fn spawn(client: &SocketClient) -> Option<Self> {
        let config = client.config().heartbeat.clone()?;
        if config.interval.is_zero() {
            warn!(name = %config.message_name, "heartbeat: zero interval; not started");
            return None;
        }
        let client = client.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !client.send_if_open(&config.message_name, Value::Object(Map::new())) {
                    debug!(name = %config.message_name, "heartbeat: not sent");
                }
            }
        });

        Some(Self { task })
    }

    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
#[path = "heartbeat_test.rs"]
mod tests;
