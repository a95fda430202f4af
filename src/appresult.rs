use axum::{Json, http::StatusCode, response::{IntoResponse, Response}};
use serde_json::json;
use tracing::error;

use crate::error::BattleError;

pub type AppResult<T> = Result<T, AppError>;
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

fn status_of(err: &BattleError) -> StatusCode {
    use BattleError::*;
    match err {
        InvalidArgument(_) => StatusCode::BAD_REQUEST,
        EntryNotFound => StatusCode::NOT_FOUND,
        RoomFull | RoomClosed | VotingNotActive | AlreadyVoted => StatusCode::CONFLICT,
        Storage(_) | ImageStore(_) | Serialization(_) | Contention(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match self.0.downcast_ref::<BattleError>() {
            Some(err) => (status_of(err), err.code()),
            None => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            error!("{}\n\n{}", self.0, self.0.backtrace());
        }

        (
            status,
            Json(json!({ "error": code, "message": self.0.to_string() })),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_errors_map_to_client_statuses() {
        let cases = [
            (BattleError::invalid("bad"), StatusCode::BAD_REQUEST),
            (BattleError::EntryNotFound, StatusCode::NOT_FOUND),
            (BattleError::RoomFull, StatusCode::CONFLICT),
            (BattleError::AlreadyVoted, StatusCode::CONFLICT),
            (BattleError::VotingNotActive, StatusCode::CONFLICT),
            (
                BattleError::Contention("r".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn foreign_errors_are_internal() {
        let res = AppError::from(anyhow::anyhow!("boom")).into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
