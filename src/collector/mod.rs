//! Redis INFO 수집 모듈
//!
//! 서버의 INFO 리포트를 조회하고 필드 매핑으로 파싱합니다.
//!
//! # Example
//!
//! ```ignore
//! use redis_info_collector::collector::{parse_info, InfoClient};
//!
//! let client = InfoClient::new("localhost", 6379, 5000);
//! if let Some(lines) = client.fetch_info().await? {
//!     let info = parse_info(&lines);
//! }
//! ```

mod client;
mod parser;

pub use client::InfoClient;
pub use parser::{
    parse_info, parse_integer, parse_report, FieldLookup, FieldValue, ParsedInfo, RawReport,
    SubRecord,
};

use crate::error::FetchError;
use crate::registry::Node;

/// 노드의 INFO 리포트를 가져오는 조회 계층
///
/// `Ok(None)`은 "데이터 없음"이고, 빈 리포트와 구분됩니다.
#[allow(async_fn_in_trait)]
pub trait InfoSource {
    /// 노드 하나의 리포트 조회
    async fn fetch(&self, node: &Node) -> Result<Option<RawReport>, FetchError>;
}

/// 노드에 붙어 있는 `InfoClient`로 실제 서버를 조회
#[derive(Debug, Clone, Copy, Default)]
pub struct LiveSource;

impl InfoSource for LiveSource {
    async fn fetch(&self, node: &Node) -> Result<Option<RawReport>, FetchError> {
        node.client().fetch_info().await
    }
}
