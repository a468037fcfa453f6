use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use log::debug;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::config::EngineConfig;
use crate::models::{
    AttendanceLog, AttendanceStatus, ClassId, LogId, Session, SessionId, SessionWithLogs, Student,
    UserId,
};

use super::{ApiError, Backend, RecognitionReply};

/// HTTP client for the attendance backend's REST routes.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            bearer_token: config.bearer_token.clone(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match &self.bearer_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn expect_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, response).await);
        }
        response
            .json::<T>()
            .await
            .map_err(|err| ApiError::Malformed(err.to_string()))
    }
}

/// Build a `Status` error, pulling FastAPI's `{"detail": ...}` body when
/// it is there.
async fn status_error(status: StatusCode, response: Response) -> ApiError {
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|value| value.get("detail").cloned())
        .and_then(|detail| detail.as_str().map(str::to_string))
        .unwrap_or(body);
    ApiError::Status {
        status: status.as_u16(),
        message,
    }
}

fn jpeg_data_url(jpeg: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", BASE64.encode(jpeg))
}

#[async_trait]
impl Backend for HttpBackend {
    async fn create_session(
        &self,
        class_id: ClassId,
        duration_minutes: i64,
    ) -> Result<Session, ApiError> {
        let response = self
            .request(Method::POST, &format!("/classes/{class_id}/sessions/start"))
            .json(&json!({ "duration_minutes": duration_minutes }))
            .send()
            .await?;
        Self::expect_json(response).await
    }

    async fn end_session(&self, session_id: SessionId) -> Result<Session, ApiError> {
        let response = self
            .request(Method::POST, &format!("/sessions/{session_id}/end"))
            .send()
            .await?;
        Self::expect_json(response).await
    }

    async fn get_session(&self, session_id: SessionId) -> Result<SessionWithLogs, ApiError> {
        let response = self
            .request(Method::GET, &format!("/sessions/{session_id}"))
            .send()
            .await?;
        Self::expect_json(response).await
    }

    async fn list_class_sessions(&self, class_id: ClassId) -> Result<Vec<Session>, ApiError> {
        let response = self
            .request(Method::GET, &format!("/classes/{class_id}/sessions/"))
            .send()
            .await?;
        Self::expect_json(response).await
    }

    async fn recognize_face(
        &self,
        session_id: SessionId,
        jpeg: &[u8],
    ) -> Result<RecognitionReply, ApiError> {
        let response = self
            .request(Method::POST, &format!("/sessions/{session_id}/recognize/"))
            .json(&json!({ "image_base64": jpeg_data_url(jpeg) }))
            .send()
            .await?;

        // 404 is the service's "no face / no enrolled match" reply, an
        // expected empty poll rather than a failure.
        if response.status() == StatusCode::NOT_FOUND {
            debug!("recognize: no match for session {session_id}");
            return Ok(RecognitionReply::NoMatch);
        }

        #[derive(serde::Deserialize)]
        struct RecognizeResponse {
            #[serde(flatten)]
            log: AttendanceLog,
            confidence: Option<f32>,
        }

        let reply: RecognizeResponse = Self::expect_json(response).await?;
        Ok(RecognitionReply::Matched {
            log: reply.log,
            confidence: reply.confidence,
        })
    }

    async fn set_attendance_status(
        &self,
        session_id: SessionId,
        user_id: UserId,
        status: AttendanceStatus,
    ) -> Result<AttendanceLog, ApiError> {
        let response = self
            .request(
                Method::PUT,
                &format!("/sessions/{session_id}/users/{user_id}/status"),
            )
            .json(&json!({ "status": status.as_str() }))
            .send()
            .await?;
        Self::expect_json(response).await
    }

    async fn set_log_status(
        &self,
        log_id: LogId,
        status: AttendanceStatus,
    ) -> Result<AttendanceLog, ApiError> {
        let response = self
            .request(Method::PUT, &format!("/logs/{log_id}/status"))
            .json(&json!({ "status": status.as_str() }))
            .send()
            .await?;
        Self::expect_json(response).await
    }

    async fn get_class_roster(&self, class_id: ClassId) -> Result<Vec<Student>, ApiError> {
        let response = self
            .request(Method::GET, &format!("/classes/{class_id}/students/"))
            .send()
            .await?;
        Self::expect_json(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_carries_jpeg_mime_prefix() {
        let url = jpeg_data_url(&[0xff, 0xd8, 0xff]);
        assert!(url.starts_with("data:image/jpeg;base64,"));
        assert!(url.len() > "data:image/jpeg;base64,".len());
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let config = EngineConfig {
            api_base_url: "http://example.test/api/".to_string(),
            ..EngineConfig::default()
        };
        let backend = HttpBackend::new(&config);
        assert_eq!(backend.base_url, "http://example.test/api");
    }
}
