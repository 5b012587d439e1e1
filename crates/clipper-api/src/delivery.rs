//! Output delivery.
//!
//! A completed clip is already fully written to its scratch area when it
//! gets here, so the size is known and the body is sent with an exact
//! `Content-Length`. The scratch area rides along inside the body stream
//! and is removed once the body is finished or dropped.

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use futures_util::StreamExt;
use tokio_util::io::ReaderStream;

use clipper_media::{ClipOutput, JobResult};
use clipper_models::JobId;

use crate::error::{ApiError, ApiResult};
use crate::metrics;

/// Response header naming the job that produced the clip.
pub const JOB_ID_HEADER: &str = "x-clip-job-id";

/// Turn a terminal job result into the HTTP response.
pub async fn deliver(result: JobResult, job_id: &JobId) -> ApiResult<Response> {
    match result {
        JobResult::Completed(output) => stream_output(output).await,
        JobResult::Failed(failure) => Err(ApiError::job(failure, job_id)),
    }
}

async fn stream_output(output: ClipOutput) -> ApiResult<Response> {
    let job_id = output.job_id().clone();
    let format = output.format();
    let (path, len, scratch) = output.into_parts();

    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|e| ApiError::internal(format!("failed to open clip output: {}", e)))?;

    let stream = ReaderStream::new(file).map(move |chunk| {
        // Owning the scratch area here keeps the file until the body is done
        let _ = &scratch;
        chunk
    });

    let disposition = format!("inline; filename=\"clip-{}.{}\"", job_id, format.extension());
    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, format.content_type())
        .header(header::CONTENT_LENGTH, len)
        .header(
            header::CONTENT_DISPOSITION,
            HeaderValue::from_str(&disposition).map_err(|e| ApiError::internal(e.to_string()))?,
        )
        .header(
            JOB_ID_HEADER,
            HeaderValue::from_str(job_id.as_str()).map_err(|e| ApiError::internal(e.to_string()))?,
        )
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::internal(format!("failed to build clip response: {}", e)))?;

    metrics::record_clip_bytes(format.as_str(), len);
    Ok(response)
}
