//! 전송 세션 상태 머신
//!
//! `Init → MetadataExchanged → Streaming → {Complete, Aborted}`
//!
//! 종료 상태(Complete, Aborted)에서는 어떤 전이도 허용하지 않는다.

use tracing::{debug, warn};

use crate::stats::TransferStats;
use crate::{Error, Result};

/// 세션 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// 생성됨, 원본 확인 완료 (송신측) 또는 수신 대기 (수신측)
    Init,

    /// 메타데이터 교환 완료, 출력 경로 결정됨
    MetadataExchanged,

    /// 청크 교환 중
    Streaming,

    /// 종료 표시 인식, 출력 저장 완료
    Complete,

    /// 실패로 중단
    Aborted,
}

impl SessionState {
    /// 종료 상태 여부
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Complete | SessionState::Aborted)
    }

    fn can_transition_to(&self, to: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, to),
            (Init, MetadataExchanged)
                | (Init, Aborted)
                | (MetadataExchanged, Streaming)
                | (MetadataExchanged, Complete)
                | (MetadataExchanged, Aborted)
                | (Streaming, Streaming)
                | (Streaming, Complete)
                | (Streaming, Aborted)
        )
    }
}

/// 세션 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Pending,
    Success { bytes: u64 },
    Failure { reason: String },
}

/// 세션 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

/// 파일 하나의 전송 시도
///
/// 어댑터 인스턴스 하나가 소유하며 세션 간에 공유하지 않는다.
#[derive(Debug)]
pub struct TransferSession {
    role: Role,
    state: SessionState,
    outcome: Outcome,
    stats: TransferStats,
}

impl TransferSession {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            state: SessionState::Init,
            outcome: Outcome::Pending,
            stats: TransferStats::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    /// 지금까지 전송된 바이트 (단조 증가)
    pub fn bytes_transferred(&self) -> u64 {
        self.stats.total_bytes
    }

    fn transition(&mut self, to: SessionState) -> Result<()> {
        if self.state.is_terminal() {
            return Err(Error::AlreadyTerminated);
        }
        if !self.state.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                from: self.state,
                to,
            });
        }
        if self.state != to {
            debug!("{:?} 세션: {:?} -> {:?}", self.role, self.state, to);
        }
        self.state = to;
        Ok(())
    }

    /// 메타데이터 교환 완료
    pub fn metadata_exchanged(&mut self) -> Result<()> {
        self.transition(SessionState::MetadataExchanged)
    }

    /// 데이터 청크 기록
    pub fn record_chunk(&mut self, len: usize) -> Result<()> {
        self.transition(SessionState::Streaming)?;
        self.stats.record_chunk(len);
        Ok(())
    }

    /// 완료 처리, 총 바이트 반환
    pub fn complete(&mut self) -> Result<u64> {
        self.transition(SessionState::Complete)?;
        self.stats.finish();
        let bytes = self.stats.total_bytes;
        self.outcome = Outcome::Success { bytes };
        Ok(bytes)
    }

    /// 중단 처리
    pub fn abort(&mut self, reason: impl ToString) -> Result<()> {
        self.transition(SessionState::Aborted)?;
        self.stats.finish();
        let reason = reason.to_string();
        warn!("{:?} 세션 중단: {}", self.role, reason);
        self.outcome = Outcome::Failure { reason };
        Ok(())
    }
}
