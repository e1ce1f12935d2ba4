//! Redis INFO 응답 파서
//!
//! 줄 단위 INFO 리포트를 필드명 → 값 매핑으로 변환합니다.
//!
//! ```text
//! # Server
//! uptime_in_seconds:86400
//! db0:keys=10,expires=0,avg_ttl=0
//! ```

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use tracing::warn;

/// 서버 버전에 따라 이름이 바뀐 필드 (구 이름 ← 신 이름)
const CHANGES_SINCE_LAST_SAVE: &str = "changes_since_last_save";
const RDB_CHANGES_SINCE_LAST_SAVE: &str = "rdb_changes_since_last_save";

/// 서버에서 받은 원본 리포트 (줄 단위)
pub type RawReport = Vec<String>;

/// 다중 값 필드 (예: `db0:keys=10,expires=0`)
pub type SubRecord = BTreeMap<String, String>;

/// 파싱된 필드 값
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// 단일 문자열 값
    Scalar(String),
    /// 콤마로 구분된 `k=v` 목록
    Record(SubRecord),
}

impl FieldValue {
    /// 다중 값 참조
    pub fn as_record(&self) -> Option<&SubRecord> {
        match self {
            FieldValue::Record(r) => Some(r),
            FieldValue::Scalar(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Scalar(s) => f.write_str(s),
            FieldValue::Record(r) => {
                for (i, (k, v)) in r.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}={}", k, v)?;
                }
                Ok(())
            }
        }
    }
}

/// 정수 변환 - 앞뒤 공백과 부호만 허용
pub fn parse_integer(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}

/// 필드명으로 원본 텍스트를 조회할 수 있는 매핑
///
/// `ParsedInfo`와 `SubRecord` 모두 메트릭 발행 대상이 됩니다.
pub trait FieldLookup {
    /// 필드의 원본 텍스트 (없으면 `None`)
    fn raw(&self, key: &str) -> Option<Cow<'_, str>>;
}

impl FieldLookup for SubRecord {
    fn raw(&self, key: &str) -> Option<Cow<'_, str>> {
        self.get(key).map(|v| Cow::Borrowed(v.as_str()))
    }
}

/// 한 번의 INFO 조회 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedInfo {
    fields: BTreeMap<String, FieldValue>,
    /// 형식이 잘못되어 건너뛴 줄
    warnings: Vec<String>,
}

impl ParsedInfo {
    /// 빈 결과 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 필드 조회
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// 필드 존재 여부
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// 필드 개수
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// 필드가 하나도 없는지 확인
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// 필드명 순으로 순회
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// 파싱 중 건너뛴 줄 목록
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

impl FieldLookup for ParsedInfo {
    fn raw(&self, key: &str) -> Option<Cow<'_, str>> {
        self.fields.get(key).map(|v| match v {
            FieldValue::Scalar(s) => Cow::Borrowed(s.as_str()),
            FieldValue::Record(_) => Cow::Owned(v.to_string()),
        })
    }
}

/// INFO 응답 줄 목록 파싱
///
/// - 빈 줄과 `#`으로 시작하는 줄은 무시
/// - 첫 번째 `:` 기준으로 키/값 분리, `:`가 없으면 경고 후 건너뜀
/// - 값에 `,`가 있으면 `SubRecord`로 변환 (각 토큰은 마지막 `=` 기준 분리)
/// - 같은 키가 반복되면 마지막 값이 남음
pub fn parse_info<I, S>(lines: I) -> ParsedInfo
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut info = ParsedInfo::new();

    for line in lines {
        let line = line.as_ref();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, raw)) = line.split_once(':') else {
            warn!(line = %line, "Bad format for info line");
            info.warnings.push(line.to_string());
            continue;
        };

        let value = if raw.contains(',') {
            FieldValue::Record(parse_sub_record(raw))
        } else {
            FieldValue::Scalar(raw.to_string())
        };

        info.fields.insert(key.to_string(), value);
    }

    if !info.fields.contains_key(CHANGES_SINCE_LAST_SAVE) {
        if let Some(value) = info.fields.get(RDB_CHANGES_SINCE_LAST_SAVE).cloned() {
            info.fields.insert(CHANGES_SINCE_LAST_SAVE.to_string(), value);
        }
    }

    info
}

/// 원본 bulk string 파싱 (`\r\n`, `\n` 모두 허용)
pub fn parse_report(text: &str) -> ParsedInfo {
    parse_info(text.lines())
}

fn parse_sub_record(raw: &str) -> SubRecord {
    raw.split(',')
        .map(|token| match token.rsplit_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (token.to_string(), String::new()),
        })
        .collect()
}
