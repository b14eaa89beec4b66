//! 전송 종료 정책
//!
//! 어댑터마다 "더 이상 페이로드 없음"을 알리는 방법이 다르다.
//!
//! | 정책 | 송신측 종료 표시 | 수신측 인식 |
//! |---|---|---|
//! | [`ConnectionClose`] | 없음 (연결 종료) | 0 바이트 read |
//! | [`InlineFlag`] | `is_last = true` 청크 | `is_last` 플래그 |
//! | [`Sentinel`] | 빈 청크 | 빈 페이로드 |

use bytes::Bytes;

use crate::chunk::Chunk;

/// 종료 정책
pub trait TerminationPolicy: Send + Sync {
    /// 정책 이름 (로그용)
    fn name(&self) -> &'static str;

    /// 마지막 데이터 청크 뒤에 보낼 종료 청크
    ///
    /// `None` 이면 전송 수단 자체(연결 종료)가 종료를 알린다.
    fn end_marker(&self) -> Option<Chunk>;

    /// 수신한 청크가 종료 표시인지 확인
    fn is_end(&self, chunk: &Chunk) -> bool;
}

/// 연결 종료 감지 (Raw Stream)
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionClose;

impl TerminationPolicy for ConnectionClose {
    fn name(&self) -> &'static str {
        "connection-close"
    }

    fn end_marker(&self) -> Option<Chunk> {
        None
    }

    fn is_end(&self, chunk: &Chunk) -> bool {
        chunk.is_empty()
    }
}

/// 인라인 플래그 (Streaming RPC)
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineFlag;

impl TerminationPolicy for InlineFlag {
    fn name(&self) -> &'static str {
        "inline-flag"
    }

    fn end_marker(&self) -> Option<Chunk> {
        Some(Chunk::last(Bytes::new()))
    }

    fn is_end(&self, chunk: &Chunk) -> bool {
        chunk.is_last
    }
}

/// 빈 청크 sentinel (Message Passing)
#[derive(Debug, Clone, Copy, Default)]
pub struct Sentinel;

impl TerminationPolicy for Sentinel {
    fn name(&self) -> &'static str {
        "sentinel"
    }

    fn end_marker(&self) -> Option<Chunk> {
        Some(Chunk::empty())
    }

    fn is_end(&self, chunk: &Chunk) -> bool {
        chunk.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_close() {
        let policy = ConnectionClose;
        assert!(policy.end_marker().is_none());
        assert!(policy.is_end(&Chunk::empty()));
        assert!(!policy.is_end(&Chunk::data(Bytes::from_static(b"x"))));
    }

    #[test]
    fn test_inline_flag() {
        let policy = InlineFlag;
        let marker = policy.end_marker().unwrap();
        assert!(marker.is_last && marker.is_empty());
        assert!(policy.is_end(&marker));

        // 마지막 청크가 페이로드를 실어도 종료
        assert!(policy.is_end(&Chunk::last(Bytes::from_static(b"tail"))));
        // 플래그 없는 빈 청크는 종료가 아님
        assert!(!policy.is_end(&Chunk::empty()));
    }

    #[test]
    fn test_sentinel() {
        let policy = Sentinel;
        let marker = policy.end_marker().unwrap();
        assert!(marker.is_empty());
        assert!(policy.is_end(&marker));
        assert!(!policy.is_end(&Chunk::data(Bytes::from_static(b"x"))));
    }
}
