//! Rank 기반 블로킹 통신자
//!
//! 같은 프로세스 안의 스레드들이 rank 로 서로를 지정하고 tag 로 채널을 구분한다.
//!
//! - `send` 는 버퍼링되어 즉시 반환
//! - `recv` 는 (source, tag) 가 맞는 메시지가 올 때까지 블로킹 (타임아웃 없음)
//! - 같은 (source, tag) 쌍 사이에서는 보낸 순서대로 받는다

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::trace;

use crate::{Error, Result};

/// 참여자 번호
pub type Rank = usize;

/// 논리 채널 번호
pub type Tag = u32;

/// 메타데이터 채널
pub const TAG_METADATA: Tag = 1;

/// 데이터 채널
pub const TAG_DATA: Tag = 2;

/// 전달 단위
#[derive(Debug)]
struct Envelope {
    source: Rank,
    tag: Tag,
    payload: Bytes,
}

/// 통신자 묶음 생성기
pub struct World;

impl World {
    /// `size` 개의 rank 를 가진 통신자 생성 (index == rank)
    pub fn new(size: usize) -> Result<Vec<Communicator>> {
        if size == 0 {
            return Err(Error::InvalidRank { rank: 0, size });
        }

        let (senders, inboxes): (Vec<_>, Vec<_>) =
            (0..size).map(|_| unbounded::<Envelope>()).unzip();
        let peers = Arc::new(senders);

        Ok(inboxes
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| Communicator {
                rank,
                size,
                peers: peers.clone(),
                inbox,
                pending: Mutex::new(VecDeque::new()),
            })
            .collect())
    }
}

/// rank 하나의 통신 끝점
pub struct Communicator {
    rank: Rank,
    size: usize,
    peers: Arc<Vec<Sender<Envelope>>>,
    inbox: Receiver<Envelope>,
    /// 아직 요청되지 않은 (source, tag) 의 메시지
    pending: Mutex<VecDeque<Envelope>>,
}

impl Communicator {
    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn check_rank(&self, rank: Rank) -> Result<()> {
        if rank >= self.size {
            return Err(Error::InvalidRank {
                rank,
                size: self.size,
            });
        }
        Ok(())
    }

    /// 바이트 메시지 전송
    pub fn send(&self, dest: Rank, tag: Tag, payload: &[u8]) -> Result<()> {
        self.check_rank(dest)?;
        trace!(src = self.rank, dest, tag, len = payload.len(), "send");

        let envelope = Envelope {
            source: self.rank,
            tag,
            payload: Bytes::copy_from_slice(payload),
        };
        self.peers[dest]
            .send(envelope)
            .map_err(|_| Error::ChannelError)
    }

    /// (source, tag) 가 맞는 메시지 수신
    ///
    /// 맞지 않는 메시지는 보관했다가 나중 `recv` 에 돌려준다.
    pub fn recv(&self, source: Rank, tag: Tag) -> Result<Bytes> {
        self.check_rank(source)?;

        {
            let mut pending = self.pending.lock();
            if let Some(pos) = pending
                .iter()
                .position(|e| e.source == source && e.tag == tag)
            {
                if let Some(envelope) = pending.remove(pos) {
                    return Ok(envelope.payload);
                }
            }
        }

        loop {
            let envelope = self.inbox.recv().map_err(|_| Error::ChannelError)?;
            if envelope.source == source && envelope.tag == tag {
                trace!(dest = self.rank, source, tag, len = envelope.payload.len(), "recv");
                return Ok(envelope.payload);
            }
            self.pending.lock().push_back(envelope);
        }
    }

    /// 구조화된 값 전송 (bincode)
    pub fn send_value<T: Serialize>(&self, dest: Rank, tag: Tag, value: &T) -> Result<()> {
        let bytes = bincode::serialize(value)?;
        self.send(dest, tag, &bytes)
    }

    /// 구조화된 값 수신 (bincode)
    pub fn recv_value<T: DeserializeOwned>(&self, source: Rank, tag: Tag) -> Result<T> {
        let bytes = self.recv(source, tag)?;
        Ok(bincode::deserialize(&bytes)?)
    }
}
