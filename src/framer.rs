//! 청크 Framer (송신측)
//!
//! 파일을 `chunk_size` 블록 단위로 순서대로 읽어 청크를 만든다.
//! 데이터 청크가 끝나면 종료 정책의 종료 청크를 정확히 한 번 내보낸다
//! (연결 종료 정책이면 내보내지 않음). 한 번 끝난 Framer 는 다시 시작할 수 없다.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::iter::FusedIterator;
use std::path::Path;

use bytes::BytesMut;
use tracing::debug;

use crate::chunk::{wire_filename, Chunk, Metadata};
use crate::termination::TerminationPolicy;
use crate::{Error, Result, MAX_CHUNK};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FramerState {
    Reading,
    Done,
}

/// 청크 Framer
pub struct ChunkFramer<P: TerminationPolicy> {
    file: File,
    metadata: Metadata,
    chunk_size: usize,
    policy: P,
    offset: u64,
    data_chunks: u64,
    state: FramerState,
}

impl<P: TerminationPolicy> ChunkFramer<P> {
    /// 원본 파일 열기
    ///
    /// 파일이 없거나 읽을 수 없으면 [`Error::SourceNotFound`].
    /// 이 경우 호출자는 전송 수단을 데이터 전송에 사용하면 안 된다.
    pub fn open(path: &Path, chunk_size: usize, policy: P) -> Result<Self> {
        if chunk_size == 0 || chunk_size > MAX_CHUNK {
            return Err(Error::InvalidConfig(format!(
                "chunk_size {chunk_size} (1..={MAX_CHUNK} 필요)"
            )));
        }

        let fs_meta = std::fs::metadata(path).map_err(|e| Error::source_not_found(path, e))?;
        if !fs_meta.is_file() {
            return Err(Error::source_not_found(path, "일반 파일 아님"));
        }

        let file = File::open(path).map_err(|e| Error::source_not_found(path, e))?;
        let metadata = Metadata::new(wire_filename(path)?, fs_meta.len());

        debug!(
            "Framer 열림: {} ({} bytes, 정책 {})",
            metadata.filename,
            metadata.size,
            policy.name()
        );

        Ok(Self {
            file,
            metadata,
            chunk_size,
            policy,
            offset: 0,
            data_chunks: 0,
            state: FramerState::Reading,
        })
    }

    /// 전송 메타데이터
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// 종료 정책
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// 지금까지 읽은 바이트 수
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// 지금까지 내보낸 데이터 청크 수
    pub fn data_chunks(&self) -> u64 {
        self.data_chunks
    }

    /// 블록 하나 읽기 (EOF 가 아니면 항상 chunk_size 만큼 채움)
    fn read_block(&mut self) -> std::io::Result<BytesMut> {
        let mut buf = BytesMut::zeroed(self.chunk_size);
        let mut filled = 0;

        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        buf.truncate(filled);
        Ok(buf)
    }
}

impl<P: TerminationPolicy> Iterator for ChunkFramer<P> {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == FramerState::Done {
            return None;
        }

        match self.read_block() {
            Ok(block) if block.is_empty() => {
                self.state = FramerState::Done;
                self.policy.end_marker().map(Ok)
            }
            Ok(block) => {
                self.offset += block.len() as u64;
                self.data_chunks += 1;
                Some(Ok(Chunk::data(block.freeze())))
            }
            Err(e) => {
                self.state = FramerState::Done;
                Some(Err(Error::Io(e)))
            }
        }
    }
}

impl<P: TerminationPolicy> FusedIterator for ChunkFramer<P> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::termination::{ConnectionClose, InlineFlag, Sentinel};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn create_test_file(dir: &TempDir, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn test_10000_bytes_sentinel() {
        let dir = TempDir::new().unwrap();
        let data: Vec<u8> = (0..10_000).map(|i| (i % 251) as u8).collect();
        let path = create_test_file(&dir, "data.bin", &data);

        let framer = ChunkFramer::open(&path, MAX_CHUNK, Sentinel).unwrap();
        assert_eq!(framer.metadata(), &Metadata::new("data.bin", 10_000));

        let chunks: Vec<Chunk> = framer.map(|c| c.unwrap()).collect();
        let sizes: Vec<usize> = chunks.iter().map(Chunk::len).collect();
        assert_eq!(sizes, vec![4096, 4096, 1808, 0]);

        // 순서 보존
        let joined: Vec<u8> = chunks.iter().flat_map(|c| c.payload.to_vec()).collect();
        assert_eq!(joined, data);
    }

    #[test]
    fn test_empty_file_yields_only_terminator() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(&dir, "empty.txt", b"");

        let chunks: Vec<Chunk> = ChunkFramer::open(&path, MAX_CHUNK, InlineFlag)
            .unwrap()
            .map(|c| c.unwrap())
            .collect();
        assert_eq!(chunks, vec![Chunk::last(bytes::Bytes::new())]);
    }

    #[test]
    fn test_connection_close_has_no_marker() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(&dir, "a.txt", &[7u8; 5000]);

        let mut framer = ChunkFramer::open(&path, MAX_CHUNK, ConnectionClose).unwrap();
        let chunks: Vec<Chunk> = framer.by_ref().map(|c| c.unwrap()).collect();
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| !c.is_empty()));
        assert_eq!(framer.data_chunks(), 2);
        assert_eq!(framer.offset(), 5000);

        // 재시작 불가
        assert!(framer.next().is_none());
    }

    #[test]
    fn test_exact_multiple_of_chunk_size() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(&dir, "b.bin", &[1u8; 8192]);

        let chunks: Vec<Chunk> = ChunkFramer::open(&path, MAX_CHUNK, Sentinel)
            .unwrap()
            .map(|c| c.unwrap())
            .collect();
        let data_chunks = chunks.iter().filter(|c| !c.is_empty()).count();
        assert_eq!(data_chunks, 2);
        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn test_missing_source() {
        let dir = TempDir::new().unwrap();
        let result = ChunkFramer::open(&dir.path().join("nope.txt"), MAX_CHUNK, Sentinel);
        assert!(matches!(result, Err(Error::SourceNotFound { .. })));

        // 디렉터리도 원본으로 사용할 수 없음
        let result = ChunkFramer::open(dir.path(), MAX_CHUNK, Sentinel);
        assert!(matches!(result, Err(Error::SourceNotFound { .. })));
    }

    #[test]
    fn test_invalid_chunk_size() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(&dir, "c.bin", b"abc");
        assert!(ChunkFramer::open(&path, 0, Sentinel).is_err());
        assert!(ChunkFramer::open(&path, MAX_CHUNK + 1, Sentinel).is_err());
    }
}
