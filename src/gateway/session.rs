/* MIRAGE Proxy (AGPL-3.0)

Copyright (C) 2025 - 404 Contributors

This program is free software: you can redistribute it and/or modify
it under the terms of the GNU Affero General Public License as published by
the Free Software Foundation, either version 3 of the License, or
(at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU Affero General Public License for more details.

You should have received a copy of the GNU Affero General Public License
along with this program.  If not, see <https://www.gnu.org/licenses/>.

*/

//! Session loop: three cooperating tasks over one WebSocket.
//!
//! - reader: decodes one JSON job per channel message and feeds the job
//!   queue; a decode error logs and closes the session.
//! - worker: spawns a dispatcher per job, never blocking on a request.
//! - writer: sole owner of the sink; writes whole frames serially, so
//!   bytes of distinct frames never interleave (frames from different
//!   request ids may interleave at frame granularity).
//!
//! Both queues are bounded; a full frame queue blocks dispatchers, which
//! throttles downstream reads.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::WebSocketStream;
use uuid::Uuid;

use crate::config::settings::SessionConfig;
use crate::telemetry::TelemetrySink;

use super::dispatch;
use super::job::JobEnvelope;

/// Drives one caller session until its channel closes.
pub async fn run(ws: WebSocketStream<TcpStream>, config: SessionConfig, telemetry: TelemetrySink) {
    let session_id = Uuid::now_v7();
    telemetry.emit("session_open", session_id, serde_json::json!({}));

    let (mut sink, mut stream) = ws.split();
    let (job_tx, mut job_rx) = mpsc::channel::<JobEnvelope>(config.job_queue_depth);
    let (frame_tx, mut frame_rx) = mpsc::channel::<Vec<u8>>(config.frame_queue_depth);

    // Reader: owns the read half exclusively.
    let reader = tokio::spawn(async move {
        while let Some(message) = stream.next().await {
            let payload = match message {
                Ok(Message::Binary(data)) => data,
                Ok(Message::Text(text)) => text.into_bytes(),
                Ok(Message::Close(_)) => break,
                Ok(_) => continue, // ping/pong handled by the protocol layer
                Err(err) => {
                    tracing::debug!(%session_id, error = %err, "session read ended");
                    break;
                }
            };

            let envelope: JobEnvelope = match serde_json::from_slice(&payload) {
                Ok(envelope) => envelope,
                Err(err) => {
                    tracing::warn!(%session_id, error = %err, "undecodable job, closing session");
                    break;
                }
            };

            if job_tx.send(envelope).await.is_err() {
                break;
            }
        }
        // job_tx drops here; the worker drains and exits.
    });

    // Worker: one dispatcher task per job, dispatched in arrival order.
    let worker_config = config.clone();
    let worker_telemetry = telemetry.clone();
    let worker = tokio::spawn(async move {
        while let Some(envelope) = job_rx.recv().await {
            tokio::spawn(dispatch::dispatch(
                envelope,
                worker_config.clone(),
                frame_tx.clone(),
                worker_telemetry.clone(),
                session_id,
            ));
        }
        // frame_tx clones die with the dispatchers; the writer drains then exits.
    });

    // Writer: runs on this task, exclusive owner of the write half.
    while let Some(buf) = frame_rx.recv().await {
        if let Err(err) = sink.send(Message::Binary(buf)).await {
            tracing::warn!(%session_id, error = %err, "frame write failed, closing session");
            break;
        }
    }

    reader.abort();
    worker.abort();
    telemetry.emit("session_closed", session_id, serde_json::json!({}));
}
