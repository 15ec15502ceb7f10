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

//! Event intake listener
//!
//! Accepts TCP connections carrying newline-delimited JSON envelopes. Each
//! line is one delivery; once the dispatcher has processed it the listener
//! writes `ACK <seq>` back, where `seq` counts deliveries on that connection
//! starting at 1.

use crate::dispatcher::DispatchHandle;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use metrics::gauge;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Longest accepted envelope line
const MAX_LINE_LENGTH: usize = 64 * 1024;

pub struct EventIntake {
    listener: TcpListener,
    dispatch: DispatchHandle,
    shutdown: CancellationToken,
    connections: TaskTracker,
}

impl EventIntake {
    pub async fn bind(
        addr: SocketAddr,
        dispatch: DispatchHandle,
        shutdown: CancellationToken,
    ) -> std::io::Result<Self> {
        tracing::info!("Binding event intake to {}", addr);
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            dispatch,
            shutdown,
            connections: TaskTracker::new(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until shutdown, then wait for open connections to
    /// finish their in-flight delivery.
    pub async fn run(self) {
        tracing::info!("Event intake listening on {:?}", self.listener.local_addr().ok());
        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer_addr)) => {
                    tracing::info!("New intake connection from {}", peer_addr);
                    let dispatch = self.dispatch.clone();
                    let shutdown = self.shutdown.clone();
                    self.connections.spawn(async move {
                        gauge!("presence_intake_connections").increment(1.0);
                        serve_connection(stream, peer_addr, dispatch, shutdown).await;
                        gauge!("presence_intake_connections").decrement(1.0);
                        tracing::info!("Intake connection closed: {}", peer_addr);
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept intake connection: {}", e);
                }
            }
        }

        tracing::info!("Event intake stopping, waiting for connections");
        self.connections.close();
        self.connections.wait().await;
        tracing::info!("Event intake stopped");
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    dispatch: DispatchHandle,
    shutdown: CancellationToken,
) {
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    let mut seq: u64 = 0;

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = framed.next() => next,
        };

        let line = match next {
            None => break,
            Some(Ok(line)) => line,
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                seq += 1;
                tracing::warn!(%peer_addr, seq, "Discarding oversized delivery");
                if framed.send(format!("ACK {seq}")).await.is_err() {
                    break;
                }
                continue;
            }
            Some(Err(LinesCodecError::Io(e))) => {
                tracing::warn!(%peer_addr, "Intake read failed: {}", e);
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }
        seq += 1;

        let outcome = dispatch.dispatch(line.as_bytes(), Utc::now()).await;
        tracing::trace!(%peer_addr, seq, %outcome, "Delivery processed");

        if let Err(e) = framed.send(format!("ACK {seq}")).await {
            tracing::warn!(%peer_addr, "Failed to acknowledge delivery {}: {}", seq, e);
            break;
        }
    }
}
