//! # CFT (Chunked File Transfer)
//!
//! 파일 하나를 세 가지 전송 수단으로 옮기는 청크 전송 프로토콜
//!
//! ## 핵심 특징
//! - **공통 Framer/Reassembler**: 파일을 최대 4096 바이트 청크로 분할, 순서대로 조립
//! - **메타데이터 분리**: 파일 이름/크기는 페이로드와 별도로 한 번만 전달
//! - **종료 정책 추상화**: 연결 종료 / 인라인 플래그 / 빈 청크 sentinel
//! - **Raw Stream**: TCP 위 단순 바이트 스트림, 순차 accept 루프
//! - **Streaming RPC**: 클라이언트 스트리밍 `UploadFile` 호출, 고정 크기 워커 풀
//! - **Message Passing**: rank/tag 기반 블로킹 통신자, 명시적 abort 마커

pub mod chunk;
pub mod codec;
pub mod comm;
pub mod config;
pub mod error;
pub mod framer;
pub mod message;
pub mod message_passing;
pub mod raw_stream;
pub mod reassembler;
pub mod rpc;
pub mod session;
pub mod stats;
pub mod termination;

pub use chunk::{Chunk, Metadata};
pub use comm::{Communicator, Rank, Tag, World};
pub use config::Config;
pub use error::{Error, Result};
pub use framer::ChunkFramer;
pub use message::{FileChunk, UploadResponse};
pub use message_passing::{MetadataMessage, ReceiveOutcome};
pub use raw_stream::{RawStreamClient, RawStreamServer};
pub use reassembler::{Reassembler, Received, Step};
pub use rpc::{RpcClient, RpcServer};
pub use session::{Outcome, Role, SessionState, TransferSession};
pub use stats::TransferStats;
pub use termination::{ConnectionClose, InlineFlag, Sentinel, TerminationPolicy};

/// 프로토콜 버전
pub const PROTOCOL_VERSION: u8 = 1;

/// 최대 청크 크기 (바이트), 모든 어댑터 공통
pub const MAX_CHUNK: usize = 4096;

/// Raw Stream 파일 이름 메시지 최대 길이 (바이트)
pub const MAX_FILENAME_LEN: usize = 1024;

/// 매직 넘버 (RPC 프레임 식별용)
pub const MAGIC_NUMBER: u32 = 0x43465450; // "CFTP"

/// Raw Stream 기본 주소
pub const RAW_STREAM_ADDR: &str = "127.0.0.1:65432";

/// Streaming RPC 기본 주소
pub const RPC_ADDR: &str = "127.0.0.1:50051";

/// Streaming RPC 워커 풀 크기
pub const RPC_WORKERS: usize = 10;

/// Raw Stream / RPC 수신 파일 접두사
pub const RECEIVED_PREFIX: &str = "received_";

/// Message Passing 수신 파일 접두사
pub const MPI_RECEIVED_PREFIX: &str = "mpi_recv_";
