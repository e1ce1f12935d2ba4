//! Error types for redis-info-collector
//!
//! This module defines the error types used throughout the application.
//! Conditions that are only reported (malformed report lines, unknown config
//! keys, missing fields) are logged where they happen and never surface here.

use thiserror::Error;

/// INFO 조회 에러 타입
#[derive(Error, Debug)]
pub enum FetchError {
    /// 서버 연결 실패
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// 소켓 읽기/쓰기 실패
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// 타임아웃 (밀리초)
    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    /// 서버가 에러 응답을 반환함
    #[error("Server replied with error: {0}")]
    Server(String),

    /// 예상하지 못한 RESP 응답
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl FetchError {
    /// 다음 틱에서 재연결로 복구될 수 있는 에러인지 확인
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            FetchError::Connect { .. } | FetchError::Io(_) | FetchError::Timeout(_)
        )
    }
}

/// Metric sink errors
#[derive(Error, Debug)]
pub enum SinkError {
    /// Writing to the output stream failed
    #[error("Failed to write metric: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client could not be built
    #[error("Failed to initialize HTTP client: {0}")]
    HttpClientInit(#[source] reqwest::Error),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[source] reqwest::Error),

    /// Endpoint answered with a non-success status
    #[error("HTTP error status: {0}")]
    HttpStatus(u16),

    /// Payload could not be encoded
    #[error("Failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors that abort the remainder of a read tick
#[derive(Error, Debug)]
pub enum DispatchError {
    /// A selected field holds something other than an integer
    #[error("Value of '{key}' on node '{node}' is not an integer: {value:?}")]
    NonNumeric {
        node: String,
        key: String,
        value: String,
    },

    /// The sink rejected a metric
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Fetch error
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Dispatch error
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Sink error
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;
