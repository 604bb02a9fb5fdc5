// server/src/errors.rs

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use payconfirm::{Error as PipelineError, TransitionError, VerifyError};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Validation Error: {0}")]
  Validation(String),

  #[error("Authentication Failed: {0}")]
  Auth(String),

  #[error("Forbidden: {0}")]
  Forbidden(String),

  #[error("Resource Not Found: {0}")]
  NotFound(String),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Database Error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error("Payment Pipeline Error: {source}")]
  Pipeline {
    #[from]
    source: PipelineError,
  },

  #[error("Internal Server Error: {0}")]
  Internal(String),
}

impl From<TransitionError> for AppError {
  fn from(err: TransitionError) -> Self {
    AppError::Pipeline {
      source: PipelineError::Transition(err),
    }
  }
}

impl From<anyhow::Error> for AppError {
  fn from(err: anyhow::Error) -> Self {
    match err.downcast::<sqlx::Error>() {
      Ok(sqlx_err) => AppError::Sqlx(sqlx_err),
      Err(other) => AppError::Internal(other.to_string()),
    }
  }
}

fn pipeline_status(err: &PipelineError) -> StatusCode {
  match err {
    PipelineError::Verify(VerifyError::PayloadTooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
    PipelineError::Verify(_) => StatusCode::UNAUTHORIZED,
    PipelineError::Payload(_) | PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
    PipelineError::OrderNotFound(_) => StatusCode::NOT_FOUND,
    PipelineError::Transition(t) => match t {
      TransitionError::OrderNotFound(_) => StatusCode::NOT_FOUND,
      TransitionError::Illegal { .. } | TransitionError::Conflict { .. } => StatusCode::CONFLICT,
      TransitionError::Validation(_) => StatusCode::BAD_REQUEST,
      TransitionError::Forbidden(_) => StatusCode::FORBIDDEN,
      TransitionError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    },
    PipelineError::Upstream(_) => StatusCode::BAD_GATEWAY,
    _ => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Validation(_) => StatusCode::BAD_REQUEST,
      AppError::Auth(_) => StatusCode::UNAUTHORIZED,
      AppError::Forbidden(_) => StatusCode::FORBIDDEN,
      AppError::NotFound(_) => StatusCode::NOT_FOUND,
      AppError::Pipeline { source } => pipeline_status(source),
      AppError::Config(_) | AppError::Sqlx(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  fn error_response(&self) -> HttpResponse {
    let status = self.status_code();
    if status.is_server_error() {
      tracing::error!(application_error = %self, "Responding with error");
    } else {
      tracing::warn!(application_error = %self, status = status.as_u16(), "Rejecting request");
    }
    // Internal details stay in the logs.
    let body = match self {
      AppError::Sqlx(_) => json!({ "error": "Database operation failed" }),
      AppError::Config(_) | AppError::Internal(_) => json!({ "error": "An internal error occurred" }),
      AppError::Pipeline { source } if status.is_server_error() => match source {
        PipelineError::Upstream(_) => json!({ "error": "Payment processor unavailable" }),
        _ => json!({ "error": "Payment processing error" }),
      },
      AppError::Pipeline {
        source: PipelineError::Verify(_),
      } => json!({ "error": "Webhook verification failed" }),
      other => json!({ "error": other.to_string() }),
    };
    HttpResponse::build(status).json(body)
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;
  use payconfirm::model::OrderStatus;
  use uuid::Uuid;

  #[test]
  fn pipeline_errors_map_to_http_statuses() {
    let cases: Vec<(AppError, StatusCode)> = vec![
      (
        PipelineError::Verify(VerifyError::SignatureMismatch).into(),
        StatusCode::UNAUTHORIZED,
      ),
      (
        PipelineError::Verify(VerifyError::PayloadTooLarge { size: 10, limit: 5 }).into(),
        StatusCode::PAYLOAD_TOO_LARGE,
      ),
      (
        TransitionError::Illegal {
          order_id: Uuid::nil(),
          from: OrderStatus::Completed,
          to: OrderStatus::Pending,
        }
        .into(),
        StatusCode::CONFLICT,
      ),
      (TransitionError::OrderNotFound(Uuid::nil()).into(), StatusCode::NOT_FOUND),
      (TransitionError::Forbidden("cap".into()).into(), StatusCode::FORBIDDEN),
      (PipelineError::Payload("bad json".into()).into(), StatusCode::BAD_REQUEST),
      (AppError::Forbidden("cron".into()), StatusCode::FORBIDDEN),
    ];
    for (err, expected) in cases {
      assert_eq!(err.status_code(), expected, "{}", err);
    }
  }
}
