//! 전송 설정

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::{
    Error, Result, MAX_CHUNK, MAX_FILENAME_LEN, MPI_RECEIVED_PREFIX, RAW_STREAM_ADDR,
    RECEIVED_PREFIX, RPC_ADDR, RPC_WORKERS,
};

/// CFT 전송 설정
///
/// 기본값은 프로토콜 고정 상수와 같다. 환경 변수나 설정 파일은 읽지 않는다.
#[derive(Debug, Clone)]
pub struct Config {
    /// 청크 크기 (바이트, 최대 [`MAX_CHUNK`])
    pub chunk_size: usize,

    /// Raw Stream 파일 이름 최대 길이 (바이트)
    pub max_filename_len: usize,

    /// Raw Stream 주소
    pub raw_addr: SocketAddr,

    /// Streaming RPC 주소
    pub rpc_addr: SocketAddr,

    /// RPC 워커 풀 크기
    pub rpc_workers: usize,

    /// 수신 파일 저장 디렉터리
    pub output_dir: PathBuf,

    /// Raw Stream 수신 파일 접두사
    pub raw_prefix: String,

    /// RPC 수신 파일 접두사
    pub rpc_prefix: String,

    /// Message Passing 수신 파일 접두사
    pub mpi_prefix: String,

    /// `.part` 임시 파일에 쓰고 완료 시 rename
    pub atomic_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: MAX_CHUNK,
            max_filename_len: MAX_FILENAME_LEN,
            raw_addr: default_raw_addr(),
            rpc_addr: default_rpc_addr(),
            rpc_workers: RPC_WORKERS,
            output_dir: PathBuf::from("."),
            raw_prefix: RECEIVED_PREFIX.to_string(),
            rpc_prefix: RECEIVED_PREFIX.to_string(),
            mpi_prefix: MPI_RECEIVED_PREFIX.to_string(),
            atomic_output: false,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 수신 디렉터리 지정
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// 임의 포트 루프백 설정 (테스트용)
    pub fn ephemeral() -> Self {
        Self {
            raw_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            rpc_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            ..Self::default()
        }
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK {
            return Err(Error::InvalidConfig(format!(
                "chunk_size {} (1..={} 필요)",
                self.chunk_size, MAX_CHUNK
            )));
        }
        if self.max_filename_len == 0 || self.max_filename_len > u16::MAX as usize {
            return Err(Error::InvalidConfig(format!(
                "max_filename_len {}",
                self.max_filename_len
            )));
        }
        if self.rpc_workers == 0 {
            return Err(Error::InvalidConfig("rpc_workers 0".into()));
        }
        Ok(())
    }
}

/// 문자열 주소 파싱 (고정 상수용)
pub fn default_raw_addr() -> SocketAddr {
    RAW_STREAM_ADDR
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 65432)))
}

/// 문자열 주소 파싱 (고정 상수용)
pub fn default_rpc_addr() -> SocketAddr {
    RPC_ADDR
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 50051)))
}
