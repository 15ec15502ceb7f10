//
// Copyright 2025-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Store health monitoring

use crate::store::PlayerStore;
use metrics::gauge;
use presence_common::api::HealthResponse;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Tracks whether the backing store answered its most recent ping
#[derive(Clone)]
pub struct HealthMonitor {
    store: Arc<dyn PlayerStore>,
    serving: Arc<AtomicBool>,
}

impl HealthMonitor {
    pub fn new(store: Arc<dyn PlayerStore>) -> Self {
        Self {
            store,
            serving: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_serving(&self) -> bool {
        self.serving.load(Ordering::Acquire)
    }

    pub fn status(&self) -> HealthResponse {
        HealthResponse {
            serving: self.is_serving(),
            store: self.store.name().to_string(),
        }
    }

    /// Ping the store once and record the result
    pub async fn check(&self) -> bool {
        let healthy = match self.store.ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(store = self.store.name(), "Store health check failed: {}", e);
                false
            }
        };
        let previous = self.serving.swap(healthy, Ordering::AcqRel);
        if previous != healthy {
            tracing::info!(store = self.store.name(), healthy, "Store health changed");
        }
        gauge!("presence_store_healthy").set(if healthy { 1.0 } else { 0.0 });
        healthy
    }

    /// Ping on `interval` until `shutdown` fires
    pub async fn run(self, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.check().await;
                }
            }
        }
        self.serving.store(false, Ordering::Release);
        tracing::debug!("Health monitor stopped");
    }
}
