use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::IntoResponse;
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::error::{RedactError, RedactResult};
use crate::models::job::ItemResult;
use crate::models::redact::{InlineOptions, RedactStorageRequest};
use crate::models::region::{OutputFormat, Region};
use crate::services::orchestrator::ItemContext;
use crate::services::pipeline::{ProcessedImage, RedactionInput};

struct InlineUpload {
    image: Vec<u8>,
    content_type: Option<String>,
    options: InlineOptions,
}

/// POST /api/v1/redact: redact an uploaded image and return the result.
///
/// Multipart parts: `image` (file), `regions` (JSON array), and optional
/// `format` / `quality` text fields.
pub async fn redact_inline(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> RedactResult<impl IntoResponse> {
    let upload = read_upload(multipart?).await?;
    upload.options.validate()?;

    metrics::counter!("redact_requests_total", "route" => "inline").increment(1);

    let pipeline = state.pipeline.clone();
    let processed = tokio::task::spawn_blocking(move || {
        pipeline.run(&RedactionInput {
            source: &upload.image,
            declared_type: upload.content_type.as_deref(),
            regions: &upload.options.regions,
            format: upload.options.format,
            quality: upload.options.quality,
        })
    })
    .await
    .map_err(|e| RedactError::internal(format!("pipeline task failed: {e}")))??;

    metrics::histogram!("redact_processing_seconds")
        .record(processed.processing_duration_ms as f64 / 1000.0);
    tracing::info!(
        content_hash = %processed.content_hash,
        width = processed.width,
        height = processed.height,
        duration_ms = processed.processing_duration_ms,
        "Inline redaction complete"
    );

    let headers = response_headers(&processed)?;
    Ok((headers, processed.buffer))
}

/// POST /api/v1/redact/storage: redact a stored object into another key.
pub async fn redact_storage(
    State(state): State<AppState>,
    payload: Result<Json<RedactStorageRequest>, JsonRejection>,
) -> RedactResult<Json<ItemResult>> {
    let Json(request) = payload?;
    metrics::counter!("redact_requests_total", "route" => "storage").increment(1);

    let result = state
        .orchestrator
        .process_single(&request, ItemContext::default())
        .await?;

    tracing::info!(
        input = %request.input,
        output = %result.output,
        content_hash = %result.content_hash,
        skipped = result.skipped,
        "Storage redaction complete"
    );
    Ok(Json(result))
}

async fn read_upload(mut multipart: Multipart) -> RedactResult<InlineUpload> {
    let mut image = None;
    let mut content_type = None;
    let mut regions: Option<Vec<Region>> = None;
    let mut format = None;
    let mut quality = None;

    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("image") => {
                content_type = field.content_type().map(str::to_string);
                image = Some(field.bytes().await?.to_vec());
            }
            Some("regions") => {
                let text = field_text(field).await?;
                regions = Some(
                    serde_json::from_str(&text)
                        .map_err(|e| RedactError::validation(format!("invalid regions: {e}")))?,
                );
            }
            Some("format") => {
                let text = field_text(field).await?;
                format = Some(
                    text.trim()
                        .parse::<OutputFormat>()
                        .map_err(|_| RedactError::validation(format!("unknown format '{text}'")))?,
                );
            }
            Some("quality") => {
                let text = field_text(field).await?;
                quality = Some(
                    text.trim()
                        .parse::<u8>()
                        .map_err(|_| RedactError::validation(format!("invalid quality '{text}'")))?,
                );
            }
            _ => {}
        }
    }

    Ok(InlineUpload {
        image: image.ok_or_else(|| RedactError::validation("missing 'image' part"))?,
        content_type,
        options: InlineOptions {
            regions: regions.ok_or_else(|| RedactError::validation("missing 'regions' part"))?,
            format,
            quality,
        },
    })
}

async fn field_text(field: axum::extract::multipart::Field<'_>) -> RedactResult<String> {
    Ok(field.text().await?)
}

fn response_headers(processed: &ProcessedImage) -> RedactResult<HeaderMap> {
    let value = |v: String| {
        HeaderValue::from_str(&v).map_err(|e| RedactError::internal(format!("bad header: {e}")))
    };

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(processed.format.content_type()),
    );
    headers.insert(header::ETAG, value(format!("\"{}\"", processed.content_hash))?);
    headers.insert("x-content-hash", value(processed.content_hash.clone())?);
    headers.insert(
        "x-processing-duration-ms",
        value(processed.processing_duration_ms.to_string())?,
    );
    headers.insert("x-image-width", value(processed.width.to_string())?);
    headers.insert("x-image-height", value(processed.height.to_string())?);
    Ok(headers)
}
