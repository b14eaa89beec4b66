//! 메타데이터와 청크 정의
//!
//! - Metadata: 전송 전에 한 번만 전달되는 파일 이름/크기
//! - Chunk: 최대 [`MAX_CHUNK`](crate::MAX_CHUNK) 바이트 페이로드 + 인라인 종료 플래그

use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// 전송 메타데이터
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// 원본 파일 이름 (경로 제외)
    pub filename: String,

    /// 파일 크기 (바이트)
    pub size: u64,
}

impl Metadata {
    pub fn new(filename: impl Into<String>, size: u64) -> Self {
        Self {
            filename: filename.into(),
            size,
        }
    }

    /// 예상 데이터 청크 수
    pub fn expected_chunks(&self, chunk_size: usize) -> u64 {
        expected_chunk_count(self.size, chunk_size)
    }
}

/// 청크 (전송 단위)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 페이로드 (0 ~ MAX_CHUNK 바이트)
    pub payload: Bytes,

    /// 마지막 청크 여부 (인라인 플래그 방식에서만 의미 있음)
    pub is_last: bool,
}

impl Chunk {
    /// 데이터 청크
    pub fn data(payload: Bytes) -> Self {
        Self {
            payload,
            is_last: false,
        }
    }

    /// 플래그가 설정된 마지막 청크
    pub fn last(payload: Bytes) -> Self {
        Self {
            payload,
            is_last: true,
        }
    }

    /// 빈 청크 (sentinel / 연결 종료 표현)
    pub fn empty() -> Self {
        Self::data(Bytes::new())
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// 크기 `size` 파일의 데이터 청크 수 (ceil(size / chunk_size))
pub fn expected_chunk_count(size: u64, chunk_size: usize) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    size.div_ceil(chunk_size as u64)
}

/// 송신측 파일 이름 (경로의 마지막 요소)
pub fn wire_filename(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_owned)
        .ok_or_else(|| Error::InvalidFilename(path.to_string_lossy().into_owned()))
}

/// 수신한 파일 이름 정리
///
/// 마지막 경로 요소만 남긴다. 빈 이름, `.`, `..` 은 거부.
pub fn sanitize_filename(name: &str) -> Result<String> {
    if name.contains('\0') {
        return Err(Error::InvalidFilename(name.to_string()));
    }

    Path::new(name)
        .file_name()
        .and_then(|base| base.to_str())
        .map(str::to_owned)
        .ok_or_else(|| Error::InvalidFilename(name.to_string()))
}

/// 수신 파일 경로 (`<dir>/<prefix><basename>`)
pub fn output_path(dir: &Path, prefix: &str, filename: &str) -> Result<PathBuf> {
    let base = sanitize_filename(filename)?;
    Ok(dir.join(format!("{prefix}{base}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_chunk_count() {
        assert_eq!(expected_chunk_count(0, 4096), 0);
        assert_eq!(expected_chunk_count(1, 4096), 1);
        assert_eq!(expected_chunk_count(4096, 4096), 1);
        assert_eq!(expected_chunk_count(4097, 4096), 2);
        assert_eq!(expected_chunk_count(10_000, 4096), 3);
        assert_eq!(Metadata::new("a", 8192).expected_chunks(4096), 2);
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("report.pdf").unwrap(), "report.pdf");
        assert_eq!(sanitize_filename("dir/report.pdf").unwrap(), "report.pdf");
        assert_eq!(sanitize_filename("/etc/passwd").unwrap(), "passwd");

        assert!(sanitize_filename("").is_err());
        assert!(sanitize_filename("..").is_err());
        assert!(sanitize_filename(".").is_err());
        assert!(sanitize_filename("a\0b").is_err());
    }

    #[test]
    fn test_output_path_prefix() {
        let path = output_path(Path::new("/tmp/out"), "received_", "../a.txt").unwrap();
        assert_eq!(path, PathBuf::from("/tmp/out/received_a.txt"));

        let path = output_path(Path::new("."), "mpi_recv_", "data.bin").unwrap();
        assert_eq!(path, PathBuf::from("./mpi_recv_data.bin"));
    }

    #[test]
    fn test_wire_filename() {
        assert_eq!(wire_filename(Path::new("/some/dir/test_file.txt")).unwrap(), "test_file.txt");
        assert!(wire_filename(Path::new("/")).is_err());
    }

    #[test]
    fn test_chunk_constructors() {
        assert!(Chunk::empty().is_empty());
        assert!(!Chunk::empty().is_last);
        assert!(Chunk::last(Bytes::new()).is_last);
        assert_eq!(Chunk::data(Bytes::from_static(b"abc")).len(), 3);
    }
}
