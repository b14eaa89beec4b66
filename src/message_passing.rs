//! Message Passing 어댑터
//!
//! rank 0 이 송신, rank 1 이 수신, 나머지 rank 는 대기만 한다.
//!
//! ```text
//! TAG_METADATA: MetadataMessage::Transfer { filename, size } | MetadataMessage::Abort
//! TAG_DATA:     [payload ≤ 4096] ... [빈 payload]
//! ```
//!
//! 원본 파일이 없으면 송신측은 메타데이터 대신 `Abort` 를 보내고,
//! 수신측은 데이터를 읽지 않고 끝낸다.

use std::path::Path;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::chunk::{Chunk, Metadata};
use crate::comm::{Communicator, Rank, TAG_DATA, TAG_METADATA};
use crate::framer::ChunkFramer;
use crate::reassembler::{Reassembler, Received, Step};
use crate::session::{Role, TransferSession};
use crate::stats::TransferStats;
use crate::termination::Sentinel;
use crate::{Config, Error, Result};

/// 송신 rank
pub const SENDER_RANK: Rank = 0;

/// 수신 rank
pub const RECEIVER_RANK: Rank = 1;

/// 메타데이터 채널 메시지
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataMessage {
    /// 전송 시작
    Transfer(Metadata),

    /// 보낼 파일 없음
    Abort,
}

/// 수신 결과
#[derive(Debug)]
pub enum ReceiveOutcome {
    /// 파일 저장 완료
    Received(Received),

    /// 송신측 중단, 출력 없음
    Aborted,
}

/// rank 별 실행 결과
#[derive(Debug)]
pub enum RankOutcome {
    Sent(TransferStats),
    Received(ReceiveOutcome),
    Idle,
}

/// 중단 마커 전송
pub fn send_abort(comm: &Communicator, dest: Rank) -> Result<()> {
    comm.send_value(dest, TAG_METADATA, &MetadataMessage::Abort)
}

/// 파일 송신
///
/// 원본을 열 수 없으면 `Abort` 를 보낸 뒤 에러 반환 ([`Error::SourceNotFound`] 등).
pub fn send_file(
    comm: &Communicator,
    dest: Rank,
    path: &Path,
    config: &Config,
) -> Result<TransferStats> {
    let mut session = TransferSession::new(Role::Sender);

    let framer = match ChunkFramer::open(path, config.chunk_size, Sentinel) {
        Ok(framer) => framer,
        Err(e) => {
            // 메타데이터를 만들 수 없으면 수신측이 기다리지 않도록 항상 abort
            error!(rank = comm.rank(), "{}", e);
            send_abort(comm, dest)?;
            let _ = session.abort(&e);
            return Err(e);
        }
    };

    let metadata = framer.metadata().clone();
    info!(
        rank = comm.rank(),
        dest,
        "전송 시작: {} ({} bytes)",
        metadata.filename,
        metadata.size
    );
    comm.send_value(dest, TAG_METADATA, &MetadataMessage::Transfer(metadata))?;
    session.metadata_exchanged()?;

    for chunk in framer {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                // 수신측이 멈추지 않도록 종료 표시는 보낸다 (크기 검증에서 실패)
                let _ = comm.send(dest, TAG_DATA, &[]);
                let _ = session.abort(&e);
                return Err(e);
            }
        };

        comm.send(dest, TAG_DATA, &chunk.payload)?;
        if !chunk.is_empty() {
            session.record_chunk(chunk.len())?;
        }
    }

    session.complete()?;
    let stats = session.stats().clone();
    info!(rank = comm.rank(), "전송 완료: {}", stats.summary());
    Ok(stats)
}

/// 파일 수신
///
/// 받은 바이트 수가 메타데이터 크기와 다르면 [`Error::SizeMismatch`].
pub fn receive_file(
    comm: &Communicator,
    source: Rank,
    config: &Config,
) -> Result<ReceiveOutcome> {
    info!(rank = comm.rank(), "rank {} 대기 중", source);

    let metadata = match comm.recv_value::<MetadataMessage>(source, TAG_METADATA)? {
        MetadataMessage::Transfer(metadata) => metadata,
        MetadataMessage::Abort => {
            warn!(rank = comm.rank(), "송신측 중단 (파일 없음)");
            return Ok(ReceiveOutcome::Aborted);
        }
    };

    let mut reassembler = Reassembler::new(Sentinel, config, &config.mpi_prefix);
    let path = reassembler.begin(&metadata.filename, Some(metadata.size))?;
    info!(
        rank = comm.rank(),
        "수신 파일: {:?} ({} bytes 예상, {} chunks)",
        path,
        metadata.size,
        metadata.expected_chunks(config.chunk_size)
    );

    loop {
        let payload: Bytes = match comm.recv(source, TAG_DATA) {
            Ok(payload) => payload,
            Err(e) => {
                reassembler.abort(&e);
                return Err(e);
            }
        };

        if let Step::Done(received) = reassembler.push(Chunk::data(payload))? {
            info!(
                rank = comm.rank(),
                "저장 완료: {:?} | {}",
                received.path,
                received.stats.summary()
            );
            return Ok(ReceiveOutcome::Received(received));
        }
    }
}

/// rank 에 맞는 역할 실행
///
/// 송신 rank 에 파일이 없으면 `Abort` 를 보내고 [`Error::InvalidConfig`].
pub fn run_rank(comm: &Communicator, file: Option<&Path>, config: &Config) -> Result<RankOutcome> {
    if comm.size() < 2 {
        if comm.rank() == SENDER_RANK {
            error!("최소 2개의 rank 필요 (현재 {})", comm.size());
        }
        return Err(Error::InvalidRank {
            rank: RECEIVER_RANK,
            size: comm.size(),
        });
    }

    match comm.rank() {
        SENDER_RANK => match file {
            Some(path) => send_file(comm, RECEIVER_RANK, path, config).map(RankOutcome::Sent),
            None => {
                error!("전송할 파일이 지정되지 않음");
                send_abort(comm, RECEIVER_RANK)?;
                Err(Error::InvalidConfig("전송할 파일 없음".into()))
            }
        },
        RECEIVER_RANK => receive_file(comm, SENDER_RANK, config).map(RankOutcome::Received),
        rank => {
            info!(rank, "대기 rank, 0 과 1 만 전송에 참여");
            Ok(RankOutcome::Idle)
        }
    }
}
