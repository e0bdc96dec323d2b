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

//! Per-job dispatcher.
//!
//! One task per accepted job. Frame sequence per request id is
//! `response → data → end`, or a single `error`. Transport failures never
//! touch the session; they become error frames and the task exits. Panics
//! are fenced behind a nested task so a bug in the request path cannot
//! take the writer down with it.

use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

use crate::config::settings::SessionConfig;
use crate::proxy::{body, request::RequestPlan, transport};
use crate::telemetry::TelemetrySink;
use crate::utils::TransportError;

use super::frame;
use super::job::JobEnvelope;

/// Runs one job to completion, emitting frames into the session's queue.
pub async fn dispatch(
    envelope: JobEnvelope,
    config: SessionConfig,
    frames: mpsc::Sender<Vec<u8>>,
    telemetry: TelemetrySink,
    session_id: Uuid,
) {
    let request_id = envelope.request_id.clone();
    let url = envelope.options.url.clone();

    let worker = tokio::spawn(run_job(envelope, config, frames.clone()));
    let outcome = match worker.await {
        Ok(result) => result,
        Err(join_err) if join_err.is_panic() => Err(TransportError::HttpProtocolFail(format!(
            "dispatcher panicked handling {url}"
        ))),
        Err(_) => return, // cancelled during shutdown
    };

    if let Err(err) = outcome {
        telemetry.emit(
            "job_failed",
            session_id,
            serde_json::json!({
                "request_id": request_id,
                "kind": err.kind_label(),
                "status": err.synthetic_status(),
            }),
        );
        let buf = frame::error_frame(&request_id, err.synthetic_status(), &err.to_string());
        let _ = frames.send(buf).await;
    } else {
        telemetry.emit(
            "job_complete",
            session_id,
            serde_json::json!({ "request_id": request_id }),
        );
    }
}

async fn run_job(
    envelope: JobEnvelope,
    config: SessionConfig,
    frames: mpsc::Sender<Vec<u8>>,
) -> Result<(), TransportError> {
    let request_id = envelope.request_id;
    let plan = RequestPlan::from_job(&envelope.options, &config)?;

    let deadline = plan.timeout;
    let response = match timeout(deadline, transport::execute(&plan, config.max_redirects)).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(TransportError::Timeout(format!(
                "no complete response within {}ms",
                deadline.as_millis()
            )))
        }
    };

    let content_encoding: Vec<String> = response
        .header_values("content-encoding")
        .iter()
        .map(|v| v.to_string())
        .collect();
    let content_type = response.header("content-type").unwrap_or("").to_string();

    let decoded = body::decode_body(&response.body, &content_encoding, &content_type);

    if frames
        .send(frame::response_frame(&request_id, response.status, &response.headers))
        .await
        .is_err()
    {
        return Ok(()); // session is gone, nothing left to report to
    }
    if frames
        .send(frame::data_frame(&request_id, &decoded))
        .await
        .is_err()
    {
        return Ok(());
    }
    let _ = frames.send(frame::end_frame(&request_id)).await;
    Ok(())
}
