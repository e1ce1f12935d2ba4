//! Redis INFO 클라이언트
//!
//! 노드마다 하나의 TCP 연결을 재사용하며 타임아웃을 지원하는 비동기 클라이언트입니다.
//! 연결은 첫 조회 시점에 열리고, 에러가 나면 버려진 뒤 다음 조회에서 다시 열립니다.

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use super::parser::RawReport;
use crate::error::FetchError;

/// `INFO` 명령 (RESP 배열 인코딩)
const INFO_COMMAND: &[u8] = b"*1\r\n$4\r\nINFO\r\n";

/// bulk string 최대 길이 (Redis `proto-max-bulk-len` 기본값)
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// RESP 응답 값 (INFO에 필요한 것만)
#[derive(Debug, Clone, PartialEq)]
enum Reply {
    /// `+OK`
    Simple(String),
    /// `-ERR ...`
    Error(String),
    /// `:1000`
    Integer(i64),
    /// `$6\r\nfoobar` (`$-1`이면 `None`)
    Bulk(Option<Vec<u8>>),
    /// `*N` (요소는 읽지 않음)
    Array(i64),
}

impl Reply {
    /// INFO 응답이 아닐 때 에러 메시지용 설명
    fn describe(&self) -> String {
        match self {
            Reply::Simple(s) => format!("simple string {:?}", s),
            Reply::Error(e) => format!("error {:?}", e),
            Reply::Integer(n) => format!("integer {}", n),
            Reply::Bulk(Some(body)) => format!("bulk string of {} bytes", body.len()),
            Reply::Bulk(None) => "null bulk string".to_string(),
            Reply::Array(n) => format!("array of {} elements", n),
        }
    }
}

/// Redis INFO 클라이언트
#[derive(Debug)]
pub struct InfoClient {
    host: String,
    port: u16,
    timeout: Duration,
    conn: Mutex<Option<BufReader<TcpStream>>>,
}

impl InfoClient {
    /// 새 클라이언트 생성 (소켓은 아직 열지 않음)
    ///
    /// # Arguments
    /// * `host` - 서버 호스트명
    /// * `port` - 서버 포트
    /// * `timeout_ms` - 조회 한 번의 타임아웃 (밀리초)
    pub fn new(host: &str, port: u16, timeout_ms: u64) -> Self {
        Self {
            host: host.to_string(),
            port,
            timeout: Duration::from_millis(timeout_ms),
            conn: Mutex::new(None),
        }
    }

    /// `host:port` 문자열
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// 재사용 가능한 연결이 열려 있는지 확인
    pub async fn is_connected(&self) -> bool {
        self.conn.lock().await.is_some()
    }

    /// INFO 조회
    ///
    /// 서버가 null bulk string을 반환하면 `Ok(None)`입니다.
    #[instrument(skip(self), fields(addr = %self.address()))]
    pub async fn fetch_info(&self) -> Result<Option<RawReport>, FetchError> {
        let mut slot = self.conn.lock().await;
        let timeout_ms = self.timeout.as_millis() as u64;

        // 요청 중에는 연결을 꺼내 두고, 성공했을 때만 되돌려 놓는다.
        // 에러나 타임아웃이면 연결은 그대로 drop된다.
        let taken = slot.take();
        let result = tokio::time::timeout(self.timeout, async move {
            let mut conn = match taken {
                Some(conn) => conn,
                None => self.connect().await?,
            };
            let reply = request(&mut conn).await?;
            Ok::<_, FetchError>((conn, reply))
        })
        .await
        .unwrap_or(Err(FetchError::Timeout(timeout_ms)));

        let (conn, reply) = match result {
            Ok(ok) => ok,
            Err(e) => {
                if e.is_connection_error() {
                    debug!(error = %e, "Connection dropped, reconnecting on next fetch");
                }
                return Err(e);
            }
        };
        *slot = Some(conn);

        match reply {
            Reply::Bulk(Some(body)) => {
                let text = String::from_utf8_lossy(&body);
                Ok(Some(text.lines().map(str::to_string).collect()))
            }
            Reply::Bulk(None) => Ok(None),
            Reply::Error(message) => Err(FetchError::Server(message)),
            other => Err(FetchError::Protocol(format!(
                "unexpected reply to INFO: {}",
                other.describe()
            ))),
        }
    }

    async fn connect(&self) -> Result<BufReader<TcpStream>, FetchError> {
        debug!("Opening connection");
        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|source| FetchError::Connect {
                addr: self.address(),
                source,
            })?;
        stream.set_nodelay(true)?;
        Ok(BufReader::new(stream))
    }
}

async fn request(conn: &mut BufReader<TcpStream>) -> Result<Reply, FetchError> {
    conn.get_mut().write_all(INFO_COMMAND).await?;
    conn.get_mut().flush().await?;
    read_reply(conn).await
}

/// RESP 응답 하나 읽기
async fn read_reply<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Reply, FetchError> {
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Err(FetchError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed",
        )));
    }

    let line = line.trim_end_matches(&['\r', '\n'][..]);
    let Some(type_byte) = line.chars().next() else {
        return Err(FetchError::Protocol("empty RESP line".to_string()));
    };
    let content = &line[type_byte.len_utf8()..];

    match type_byte {
        '+' => Ok(Reply::Simple(content.to_string())),
        '-' => Ok(Reply::Error(content.to_string())),
        ':' => Ok(Reply::Integer(parse_length(content)?)),
        '*' => Ok(Reply::Array(parse_length(content)?)),
        '$' => {
            let len = parse_length(content)?;
            if len < 0 {
                return Ok(Reply::Bulk(None));
            }
            if len > MAX_BULK_LEN {
                return Err(FetchError::Protocol(format!(
                    "bulk length {} exceeds {} bytes",
                    len, MAX_BULK_LEN
                )));
            }

            let mut data = vec![0u8; len as usize];
            reader.read_exact(&mut data).await?;

            let mut crlf = [0u8; 2];
            reader.read_exact(&mut crlf).await?;

            Ok(Reply::Bulk(Some(data)))
        }
        other => Err(FetchError::Protocol(format!(
            "unknown RESP type byte {:?}",
            other
        ))),
    }
}

fn parse_length(content: &str) -> Result<i64, FetchError> {
    content
        .parse()
        .map_err(|_| FetchError::Protocol(format!("invalid RESP integer {:?}", content)))
}
