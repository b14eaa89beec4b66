//! Raw Stream 어댑터
//!
//! # Wire format
//!
//! ```text
//! [2 bytes BE: name_len (1..=1024)]
//! [name_len bytes: 파일 이름 UTF-8]
//! [payload bytes ...]
//! [송신측 연결 종료]
//! ```
//!
//! 크기는 보내지 않는다. 수신측은 0 바이트 read 를 종료로 인식한다.
//! 원본 파일이 없으면 송신측은 연결하지 않으며 수신측에는 아무것도 알리지 않는다.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chunk::Chunk;
use crate::framer::ChunkFramer;
use crate::reassembler::{Reassembler, Received, Step};
use crate::session::{Role, TransferSession};
use crate::stats::TransferStats;
use crate::termination::ConnectionClose;
use crate::{Config, Error, Result};

/// accept 실패 후 재시도 대기
pub(crate) const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// 파일 이름 메시지 기록
pub async fn write_filename<W: AsyncWrite + Unpin>(
    writer: &mut W,
    filename: &str,
    max_len: usize,
) -> Result<()> {
    let bytes = filename.as_bytes();
    if bytes.is_empty() {
        return Err(Error::InvalidFilename(filename.to_string()));
    }
    if bytes.len() > max_len {
        return Err(Error::FilenameTooLong {
            len: bytes.len(),
            max: max_len,
        });
    }

    writer.write_u16(bytes.len() as u16).await?;
    writer.write_all(bytes).await?;
    Ok(())
}

/// 파일 이름 메시지 읽기
///
/// 이름 전에 연결이 닫히면 [`Error::MissingMetadata`].
pub async fn read_filename<R: AsyncRead + Unpin>(reader: &mut R, max_len: usize) -> Result<String> {
    let len = match reader.read_u16().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(Error::MissingMetadata)
        }
        Err(e) => return Err(e.into()),
    };

    if len == 0 {
        return Err(Error::InvalidFilename(String::new()));
    }
    if len > max_len {
        return Err(Error::FilenameTooLong { len, max: max_len });
    }

    let mut buf = vec![0u8; len];
    match reader.read_exact(&mut buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(Error::MissingMetadata)
        }
        Err(e) => return Err(e.into()),
    }

    String::from_utf8(buf).map_err(|e| {
        Error::InvalidFilename(String::from_utf8_lossy(e.as_bytes()).into_owned())
    })
}

/// Raw Stream 수신 서버
///
/// 연결을 하나씩 끝까지 처리한 뒤 다음 연결을 받는다.
pub struct RawStreamServer {
    config: Config,
    cancel: CancellationToken,
}

impl RawStreamServer {
    pub fn new(config: Config, cancel: CancellationToken) -> Self {
        Self { config, cancel }
    }

    /// 리스너 바인딩
    pub async fn bind(&self) -> Result<TcpListener> {
        self.config.validate()?;
        let listener = TcpListener::bind(self.config.raw_addr).await?;
        info!("Raw Stream 서버 대기: {}", listener.local_addr()?);
        Ok(listener)
    }

    /// 순차 accept 루프
    ///
    /// 취소되면 리스너를 닫고 종료한다. 진행 중 세션은 버려진다.
    /// 완료된 세션 수를 반환한다.
    pub async fn serve(&self, listener: TcpListener) -> Result<u64> {
        let mut completed = 0u64;

        loop {
            let (stream, addr) = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                result = listener.accept() => match result {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("accept 에러: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                },
            };

            info!(%addr, "연결 수락");

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    warn!(%addr, "종료 요청, 진행 중 세션 중단");
                    break;
                }
                result = self.receive(stream) => match result {
                    Ok(received) => {
                        completed += 1;
                        info!(
                            %addr,
                            "파일 수신 완료: {:?} ({} bytes) | {}",
                            received.path,
                            received.bytes,
                            received.stats.summary()
                        );
                    }
                    Err(e) => warn!(%addr, "세션 실패: {}", e),
                },
            }

            debug!(%addr, "연결 종료");
        }

        info!("Raw Stream 서버 종료 ({} 세션 완료)", completed);
        Ok(completed)
    }

    /// 연결 하나에서 파일 하나 수신
    pub async fn receive<S: AsyncRead + Unpin>(&self, mut stream: S) -> Result<Received> {
        let filename = read_filename(&mut stream, self.config.max_filename_len).await?;
        info!("수신 파일: {}", filename);

        let mut reassembler =
            Reassembler::new(ConnectionClose, &self.config, &self.config.raw_prefix);
        reassembler.begin(&filename, None)?;

        let mut buf = vec![0u8; self.config.chunk_size];
        loop {
            let n = match stream.read(&mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    reassembler.abort(&e);
                    return Err(Error::TransportFailure(e.to_string()));
                }
            };

            let chunk = if n == 0 {
                Chunk::empty()
            } else {
                Chunk::data(Bytes::copy_from_slice(&buf[..n]))
            };

            if let Step::Done(received) = reassembler.push(chunk)? {
                return Ok(received);
            }
        }
    }
}

/// Raw Stream 송신 클라이언트
pub struct RawStreamClient {
    config: Config,
}

impl RawStreamClient {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// 설정된 주소로 파일 전송
    pub async fn send_file(&self, path: &Path) -> Result<TransferStats> {
        self.send_file_to(self.config.raw_addr, path).await
    }

    /// 파일 전송
    ///
    /// 원본을 열 수 없으면 연결하지 않고 [`Error::SourceNotFound`] 반환.
    pub async fn send_file_to(&self, addr: SocketAddr, path: &Path) -> Result<TransferStats> {
        let mut session = TransferSession::new(Role::Sender);
        let framer = ChunkFramer::open(path, self.config.chunk_size, ConnectionClose)?;
        let filename = framer.metadata().filename.clone();

        if filename.len() > self.config.max_filename_len {
            return Err(Error::FilenameTooLong {
                len: filename.len(),
                max: self.config.max_filename_len,
            });
        }

        let mut stream = TcpStream::connect(addr).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::ConnectionRefused => Error::ConnectionRefused { addr },
            _ => Error::Io(e),
        })?;
        info!("서버 연결: {}", addr);

        if let Err(e) = write_filename(&mut stream, &filename, self.config.max_filename_len).await {
            let _ = session.abort(&e);
            return Err(e);
        }
        session.metadata_exchanged()?;
        info!("파일 전송: {} ({} bytes)", filename, framer.metadata().size);

        for chunk in framer {
            let sent = match chunk {
                Ok(chunk) => stream
                    .write_all(&chunk.payload)
                    .await
                    .map(|_| chunk.len())
                    .map_err(|e| Error::TransportFailure(e.to_string())),
                Err(e) => Err(e),
            };

            match sent {
                Ok(len) => session.record_chunk(len)?,
                Err(e) => {
                    // 정상 종료와 구분되도록 RST 로 끊는다
                    let _ = stream.set_linger(Some(Duration::ZERO));
                    let _ = session.abort(&e);
                    return Err(e);
                }
            }
        }

        if let Err(e) = stream.shutdown().await {
            let e = Error::TransportFailure(e.to_string());
            let _ = session.abort(&e);
            return Err(e);
        }

        session.complete()?;
        let stats = session.stats().clone();
        info!("전송 완료: {} | {}", filename, stats.summary());
        Ok(stats)
    }
}
