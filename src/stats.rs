//! 전송 통계

use std::time::{Duration, Instant};

/// 세션 하나의 전송 통계
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 종료 시간 (완료/중단 시 기록)
    pub end_time: Option<Instant>,

    /// 총 전송 바이트
    pub total_bytes: u64,

    /// 총 데이터 청크 수 (종료 표시 제외)
    pub total_chunks: u64,

    /// 가장 큰 청크 크기
    pub max_chunk_len: usize,
}

impl TransferStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            end_time: None,
            total_bytes: 0,
            total_chunks: 0,
            max_chunk_len: 0,
        }
    }

    /// 데이터 청크 기록
    pub fn record_chunk(&mut self, size: usize) {
        self.total_chunks += 1;
        self.total_bytes += size as u64;
        self.max_chunk_len = self.max_chunk_len.max(size);
    }

    /// 종료 시간 기록 (처음 한 번만)
    pub fn finish(&mut self) {
        if self.end_time.is_none() {
            self.end_time = Some(Instant::now());
        }
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        match self.end_time {
            Some(end) => end.duration_since(self.start_time),
            None => self.start_time.elapsed(),
        }
    }

    /// 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.total_bytes as f64 / elapsed
    }

    /// 평균 청크 크기
    pub fn average_chunk_len(&self) -> f64 {
        if self.total_chunks == 0 {
            return 0.0;
        }
        self.total_bytes as f64 / self.total_chunks as f64
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.3}s | Chunks: {} | Bytes: {} | Avg chunk: {:.0} B | Throughput: {:.2} MB/s",
            self.elapsed().as_secs_f64(),
            self.total_chunks,
            self.total_bytes,
            self.average_chunk_len(),
            self.throughput() / 1_000_000.0,
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}
