//! Reassembler (수신측)
//!
//! 메타데이터를 먼저 받아 출력 경로를 정하고, 받은 순서대로 페이로드를 쌓는다.
//! 종료 정책이 종료 표시를 인식하면 출력을 저장하고 더 이상 청크를 받지 않는다.
//!
//! 중간에 실패하면 이미 쓴 바이트는 디스크에 남는다 (rollback 없음).
//! `atomic_output` 설정 시에는 `.part` 파일에 쓰고 완료 시에만 rename 한다.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use bytes::BytesMut;
use tracing::{debug, info, warn};

use crate::chunk::{output_path, Chunk};
use crate::session::{Role, TransferSession};
use crate::stats::TransferStats;
use crate::termination::TerminationPolicy;
use crate::{Config, Error, Result};

/// 청크 하나 처리 결과
#[derive(Debug)]
pub enum Step {
    /// 다음 청크 필요
    More,

    /// 종료 표시 인식, 출력 저장 완료
    Done(Received),
}

/// 완료된 수신 결과
#[derive(Debug, Clone)]
pub struct Received {
    /// 송신측이 알린 파일 이름
    pub filename: String,

    /// 저장된 출력 파일 경로
    pub path: PathBuf,

    /// 저장된 바이트 수
    pub bytes: u64,

    /// 전송 통계
    pub stats: TransferStats,
}

/// 출력 대상
enum Sink {
    /// 메모리에 모았다가 완료 시 한 번에 쓰기
    Buffered(BytesMut),

    /// 받는 즉시 파일에 쓰기
    Streamed(BufWriter<File>),
}

struct Target {
    filename: String,
    final_path: PathBuf,
    write_path: PathBuf,
    expected_size: Option<u64>,
    sink: Sink,
}

/// 수신측 청크 조립기
pub struct Reassembler<P: TerminationPolicy> {
    policy: P,
    session: TransferSession,
    output_dir: PathBuf,
    prefix: String,
    chunk_size: usize,
    atomic: bool,
    buffered: bool,
    target: Option<Target>,
}

impl<P: TerminationPolicy> Reassembler<P> {
    /// 파일에 바로 쓰는 조립기 생성
    pub fn new(policy: P, config: &Config, prefix: &str) -> Self {
        Self {
            policy,
            session: TransferSession::new(Role::Receiver),
            output_dir: config.output_dir.clone(),
            prefix: prefix.to_string(),
            chunk_size: config.chunk_size,
            atomic: config.atomic_output,
            buffered: false,
            target: None,
        }
    }

    /// 메모리 버퍼 모드로 전환 (메타데이터 수신 전에만 의미 있음)
    pub fn buffered(mut self) -> Self {
        self.buffered = true;
        self
    }

    pub fn session(&self) -> &TransferSession {
        &self.session
    }

    /// 결정된 출력 경로
    pub fn output_path(&self) -> Option<&Path> {
        self.target.as_ref().map(|t| t.final_path.as_path())
    }

    /// 지금까지 받은 바이트 수
    pub fn bytes_received(&self) -> u64 {
        self.session.bytes_transferred()
    }

    /// 메타데이터 소비, 출력 경로 결정
    ///
    /// `expected_size` 가 주어지면 완료 시 받은 바이트 수와 비교한다.
    pub fn begin(&mut self, filename: &str, expected_size: Option<u64>) -> Result<PathBuf> {
        if self.session.state().is_terminal() {
            return Err(Error::AlreadyTerminated);
        }
        if self.target.is_some() {
            return Err(Error::InvalidTransition {
                from: self.session.state(),
                to: crate::SessionState::MetadataExchanged,
            });
        }

        let final_path = match output_path(&self.output_dir, &self.prefix, filename) {
            Ok(path) => path,
            Err(e) => {
                let _ = self.session.abort(&e);
                return Err(e);
            }
        };
        let write_path = if self.atomic {
            part_path(&final_path)
        } else {
            final_path.clone()
        };

        let sink = if self.buffered {
            Sink::Buffered(BytesMut::new())
        } else {
            match File::create(&write_path) {
                Ok(file) => Sink::Streamed(BufWriter::new(file)),
                Err(source) => {
                    let e = Error::WriteFailure {
                        path: write_path,
                        source,
                    };
                    let _ = self.session.abort(&e);
                    return Err(e);
                }
            }
        };

        self.session.metadata_exchanged()?;
        debug!(
            "수신 시작: {} -> {:?} (정책 {})",
            filename,
            final_path,
            self.policy.name()
        );

        self.target = Some(Target {
            filename: filename.to_string(),
            final_path: final_path.clone(),
            write_path,
            expected_size,
            sink,
        });

        Ok(final_path)
    }

    /// 청크 하나 처리
    pub fn push(&mut self, chunk: Chunk) -> Result<Step> {
        if self.session.state().is_terminal() {
            return Err(Error::AlreadyTerminated);
        }

        let Some(target) = self.target.as_mut() else {
            let _ = self.session.abort("메타데이터 없이 청크 수신");
            return Err(Error::MissingMetadata);
        };

        if chunk.len() > self.chunk_size {
            let e = Error::ChunkTooLarge {
                len: chunk.len(),
                max: self.chunk_size,
            };
            let _ = self.session.abort(&e);
            return Err(e);
        }

        if !chunk.is_empty() {
            let written = match &mut target.sink {
                Sink::Buffered(buf) => {
                    buf.extend_from_slice(&chunk.payload);
                    Ok(())
                }
                Sink::Streamed(writer) => writer.write_all(&chunk.payload),
            };
            if let Err(source) = written {
                let e = Error::WriteFailure {
                    path: target.write_path.clone(),
                    source,
                };
                let _ = self.session.abort(&e);
                return Err(e);
            }
            self.session.record_chunk(chunk.len())?;
        }

        if self.policy.is_end(&chunk) {
            return self.finish().map(Step::Done);
        }

        Ok(Step::More)
    }

    /// 전송 수단 실패 등으로 세션 중단
    ///
    /// 이미 쓴 바이트는 그대로 남는다.
    pub fn abort(&mut self, reason: impl ToString) {
        if self.session.state().is_terminal() {
            return;
        }
        if let Some(Target {
            sink: Sink::Streamed(writer),
            ..
        }) = self.target.as_mut()
        {
            let _ = writer.flush();
        }
        let _ = self.session.abort(reason);
    }

    fn finish(&mut self) -> Result<Received> {
        let Some(target) = self.target.take() else {
            return Err(Error::MissingMetadata);
        };
        let bytes = self.session.bytes_transferred();

        let stored = match target.sink {
            Sink::Buffered(buf) => std::fs::write(&target.write_path, &buf),
            Sink::Streamed(mut writer) => writer.flush(),
        };
        if let Err(source) = stored {
            let e = Error::WriteFailure {
                path: target.write_path,
                source,
            };
            let _ = self.session.abort(&e);
            return Err(e);
        }

        if let Some(expected) = target.expected_size {
            if expected != bytes {
                let e = Error::SizeMismatch {
                    expected,
                    got: bytes,
                };
                let _ = self.session.abort(&e);
                return Err(e);
            }
        }

        if target.write_path != target.final_path {
            if let Err(source) = std::fs::rename(&target.write_path, &target.final_path) {
                let e = Error::WriteFailure {
                    path: target.final_path,
                    source,
                };
                let _ = self.session.abort(&e);
                return Err(e);
            }
        }

        self.session.complete()?;
        let stats = self.session.stats().clone();
        info!(
            "파일 저장 완료: {:?} ({} bytes, {} chunks)",
            target.final_path, bytes, stats.total_chunks
        );

        Ok(Received {
            filename: target.filename,
            path: target.final_path,
            bytes,
            stats,
        })
    }
}

impl<P: TerminationPolicy> Drop for Reassembler<P> {
    fn drop(&mut self) {
        if !self.session.state().is_terminal() && self.target.is_some() {
            warn!("수신 세션이 종료 표시 없이 해제됨: {:?}", self.output_path());
        }
    }
}

/// `<path>.part`
fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use crate::termination::{ConnectionClose, InlineFlag, Sentinel};
    use bytes::Bytes;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> Config {
        Config::default().with_output_dir(dir.path())
    }

    fn done(step: Step) -> Received {
        match step {
            Step::Done(received) => received,
            Step::More => panic!("종료 표시가 인식되지 않음"),
        }
    }

    #[test]
    fn test_sentinel_reassembly() {
        let dir = TempDir::new().unwrap();
        let mut r = Reassembler::new(Sentinel, &config_in(&dir), "mpi_recv_");
        let path = r.begin("data.bin", Some(6)).unwrap();
        assert_eq!(path, dir.path().join("mpi_recv_data.bin"));

        assert!(matches!(r.push(Chunk::data(Bytes::from_static(b"abc"))).unwrap(), Step::More));
        assert!(matches!(r.push(Chunk::data(Bytes::from_static(b"def"))).unwrap(), Step::More));
        let received = done(r.push(Chunk::empty()).unwrap());

        assert_eq!(received.bytes, 6);
        assert_eq!(received.stats.total_chunks, 2);
        assert_eq!(std::fs::read(&path).unwrap(), b"abcdef");
        assert_eq!(r.session().state(), SessionState::Complete);
    }

    #[test]
    fn test_nothing_accepted_after_termination() {
        let dir = TempDir::new().unwrap();
        let mut r = Reassembler::new(ConnectionClose, &config_in(&dir), "received_");
        r.begin("a.txt", None).unwrap();
        r.push(Chunk::data(Bytes::from_static(b"hello"))).unwrap();
        done(r.push(Chunk::empty()).unwrap());

        let result = r.push(Chunk::data(Bytes::from_static(b"trailing")));
        assert!(matches!(result, Err(Error::AlreadyTerminated)));
        assert_eq!(std::fs::read(dir.path().join("received_a.txt")).unwrap(), b"hello");
    }

    #[test]
    fn test_inline_flag_with_final_payload() {
        let dir = TempDir::new().unwrap();
        let mut r = Reassembler::new(InlineFlag, &config_in(&dir), "received_").buffered();
        r.begin("b.txt", None).unwrap();

        // 버퍼 모드는 완료 전까지 파일을 만들지 않음
        r.push(Chunk::data(Bytes::from_static(b"head-"))).unwrap();
        assert!(!dir.path().join("received_b.txt").exists());

        let received = done(r.push(Chunk::last(Bytes::from_static(b"tail"))).unwrap());
        assert_eq!(received.bytes, 9);
        assert_eq!(std::fs::read(&received.path).unwrap(), b"head-tail");
    }

    #[test]
    fn test_empty_payload_without_flag_is_not_end() {
        let dir = TempDir::new().unwrap();
        let mut r = Reassembler::new(InlineFlag, &config_in(&dir), "received_").buffered();
        r.begin("c.txt", None).unwrap();
        assert!(matches!(r.push(Chunk::empty()).unwrap(), Step::More));
        let received = done(r.push(Chunk::last(Bytes::new())).unwrap());
        assert_eq!(received.bytes, 0);
        assert!(received.path.exists());
    }

    #[test]
    fn test_zero_length_file() {
        let dir = TempDir::new().unwrap();
        let mut r = Reassembler::new(Sentinel, &config_in(&dir), "mpi_recv_");
        r.begin("empty.txt", Some(0)).unwrap();
        let received = done(r.push(Chunk::empty()).unwrap());
        assert_eq!(received.bytes, 0);
        assert_eq!(std::fs::metadata(&received.path).unwrap().len(), 0);
    }

    #[test]
    fn test_chunk_before_metadata() {
        let dir = TempDir::new().unwrap();
        let mut r = Reassembler::new(Sentinel, &config_in(&dir), "mpi_recv_");
        let result = r.push(Chunk::data(Bytes::from_static(b"x")));
        assert!(matches!(result, Err(Error::MissingMetadata)));
        assert_eq!(r.session().state(), SessionState::Aborted);
    }

    #[test]
    fn test_metadata_only_once() {
        let dir = TempDir::new().unwrap();
        let mut r = Reassembler::new(Sentinel, &config_in(&dir), "mpi_recv_");
        r.begin("a", None).unwrap();
        assert!(r.begin("b", None).is_err());
    }

    #[test]
    fn test_oversized_chunk_aborts() {
        let dir = TempDir::new().unwrap();
        let mut r = Reassembler::new(Sentinel, &config_in(&dir), "mpi_recv_");
        r.begin("big.bin", None).unwrap();
        let result = r.push(Chunk::data(Bytes::from(vec![0u8; crate::MAX_CHUNK + 1])));
        assert!(matches!(result, Err(Error::ChunkTooLarge { .. })));
        assert_eq!(r.session().state(), SessionState::Aborted);
    }

    #[test]
    fn test_size_mismatch_aborts_and_keeps_partial() {
        let dir = TempDir::new().unwrap();
        let mut r = Reassembler::new(Sentinel, &config_in(&dir), "mpi_recv_");
        let path = r.begin("short.bin", Some(10)).unwrap();
        r.push(Chunk::data(Bytes::from_static(b"12345"))).unwrap();
        let result = r.push(Chunk::empty());
        assert!(matches!(result, Err(Error::SizeMismatch { expected: 10, got: 5 })));
        assert_eq!(r.session().state(), SessionState::Aborted);
        assert_eq!(std::fs::read(path).unwrap(), b"12345");
    }

    #[test]
    fn test_invalid_filename_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let mut r = Reassembler::new(ConnectionClose, &config_in(&dir), "received_");
        assert!(matches!(r.begin("..", None), Err(Error::InvalidFilename(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_unwritable_output_dir() {
        let dir = TempDir::new().unwrap();
        let config = Config::default().with_output_dir(dir.path().join("missing_dir"));
        let mut r = Reassembler::new(ConnectionClose, &config, "received_");

        assert!(matches!(r.begin("a.txt", None), Err(Error::WriteFailure { .. })));
        assert_eq!(r.session().state(), SessionState::Aborted);
        assert!(matches!(
            r.push(Chunk::data(Bytes::from_static(b"x"))),
            Err(Error::AlreadyTerminated)
        ));
    }

    #[test]
    fn test_atomic_output_renames_on_complete() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.atomic_output = true;

        let mut r = Reassembler::new(Sentinel, &config, "mpi_recv_");
        let path = r.begin("atomic.bin", None).unwrap();
        r.push(Chunk::data(Bytes::from_static(b"xyz"))).unwrap();

        let part = dir.path().join("mpi_recv_atomic.bin.part");
        assert!(part.exists());
        assert!(!path.exists());

        done(r.push(Chunk::empty()).unwrap());
        assert!(!part.exists());
        assert_eq!(std::fs::read(&path).unwrap(), b"xyz");
    }

    #[test]
    fn test_abort_keeps_partial_output() {
        let dir = TempDir::new().unwrap();
        let mut r = Reassembler::new(ConnectionClose, &config_in(&dir), "received_");
        let path = r.begin("partial.bin", None).unwrap();
        r.push(Chunk::data(Bytes::from_static(b"partial"))).unwrap();
        r.abort("connection reset");

        assert_eq!(r.session().state(), SessionState::Aborted);
        assert_eq!(std::fs::read(path).unwrap(), b"partial");
    }
}
