//! 에러 타입 정의

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use crate::session::SessionState;

/// CFT 전송 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("직렬화 에러: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("원본 파일 없음: {path:?} ({reason})")]
    SourceNotFound { path: PathBuf, reason: String },

    #[error("연결 거부: {addr}")]
    ConnectionRefused { addr: SocketAddr },

    #[error("전송 실패: {0}")]
    TransportFailure(String),

    #[error("연결 종료")]
    ConnectionClosed,

    #[error("출력 파일 쓰기 실패: {path:?}: {source}")]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("유효하지 않은 파일 이름: {0:?}")]
    InvalidFilename(String),

    #[error("파일 이름 길이 초과: {len} bytes (최대 {max})")]
    FilenameTooLong { len: usize, max: usize },

    #[error("메타데이터 없음")]
    MissingMetadata,

    #[error("청크 크기 초과: {len} bytes (최대 {max})")]
    ChunkTooLarge { len: usize, max: usize },

    #[error("이미 종료된 세션")]
    AlreadyTerminated,

    #[error("유효하지 않은 상태 전이: {from:?} -> {to:?}")]
    InvalidTransition { from: SessionState, to: SessionState },

    #[error("크기 불일치: expected {expected} bytes, got {got} bytes")]
    SizeMismatch { expected: u64, got: u64 },

    #[error("유효하지 않은 매직 넘버: expected {expected:08X}, got {got:08X}")]
    InvalidMagicNumber { expected: u32, got: u32 },

    #[error("유효하지 않은 프로토콜 버전: expected {expected}, got {got}")]
    InvalidVersion { expected: u8, got: u8 },

    #[error("CRC 불일치: expected {expected:08X}, got {got:08X}")]
    CrcMismatch { expected: u32, got: u32 },

    #[error("프레임 크기 초과: {len} bytes (최대 {max})")]
    FrameTooLarge { len: usize, max: usize },

    #[error("예상하지 못한 메시지: expected {expected}, got {got}")]
    UnexpectedMessage { expected: String, got: String },

    #[error("유효하지 않은 rank: {rank} (world size {size})")]
    InvalidRank { rank: usize, size: usize },

    #[error("채널 에러")]
    ChannelError,

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// 원본 파일 열기 실패 에러 생성
    pub fn source_not_found(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::SourceNotFound {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
