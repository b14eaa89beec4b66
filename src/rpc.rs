//! Streaming RPC 어댑터
//!
//! 클라이언트 스트리밍 호출 `UploadFile(stream FileChunk) -> UploadResponse`.
//!
//! - 파일 이름은 모든 청크에 실리고 첫 청크에서 출력 경로를 정한다
//! - `is_last` 플래그가 종료 표시
//! - 서버는 고정 크기 워커 풀로 호출을 동시에 처리한다
//! - 성공/실패는 `UploadResponse` 로 송신측에 돌려준다
//!
//! 같은 출력 이름으로 동시에 들어온 두 호출은 보호하지 않는다 (경고만 남김).

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::{SinkExt, Stream, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::codec::FrameCodec;
use crate::framer::ChunkFramer;
use crate::message::{CallMessage, FileChunk, Message, UploadResponse};
use crate::raw_stream::ACCEPT_BACKOFF;
use crate::reassembler::{Reassembler, Step};
use crate::session::{Role, TransferSession};
use crate::termination::InlineFlag;
use crate::{Config, Error, Result};

/// 진행 중 호출 (call id -> 파일 이름)
type InFlight = DashMap<u64, String>;

/// 대기 중인 호출
struct PendingCall {
    id: u64,
    addr: SocketAddr,
    stream: TcpStream,
}

/// Streaming RPC 서버
pub struct RpcServer {
    config: Config,
    cancel: CancellationToken,
    in_flight: Arc<InFlight>,
    next_call_id: AtomicU64,
}

impl RpcServer {
    pub fn new(config: Config, cancel: CancellationToken) -> Self {
        Self {
            config,
            cancel,
            in_flight: Arc::new(DashMap::new()),
            next_call_id: AtomicU64::new(1),
        }
    }

    /// 리스너 바인딩
    pub async fn bind(&self) -> Result<TcpListener> {
        self.config.validate()?;
        let listener = TcpListener::bind(self.config.rpc_addr).await?;
        info!("RPC 서버 시작: {}", listener.local_addr()?);
        Ok(listener)
    }

    /// 진행 중 호출 수
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// accept 루프 + 워커 풀
    ///
    /// 모든 워커가 바쁘면 새 호출은 큐에서 기다린다. 취소되면 진행 중 호출도 중단한다.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let workers = self.config.rpc_workers;
        let (call_tx, call_rx) = mpsc::channel::<PendingCall>(workers);
        let call_rx = Arc::new(Mutex::new(call_rx));

        let mut pool = JoinSet::new();
        for worker_id in 0..workers {
            let call_rx = call_rx.clone();
            let config = self.config.clone();
            let in_flight = self.in_flight.clone();

            pool.spawn(async move {
                loop {
                    let next = call_rx.lock().await.recv().await;
                    let Some(call) = next else { break };

                    let span = info_span!("upload", call = call.id, worker = worker_id);
                    handle_call(call, &config, &in_flight).instrument(span).await;
                }
            });
        }

        info!("워커 풀: {} 워커", workers);

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

            let id = self.next_call_id.fetch_add(1, Ordering::SeqCst);
            debug!(%addr, call = id, "호출 대기열 추가");

            let call = PendingCall { id, addr, stream };
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                sent = call_tx.send(call) => {
                    if sent.is_err() {
                        return Err(Error::ChannelError);
                    }
                }
            }
        }

        drop(call_tx);
        pool.abort_all();
        while pool.join_next().await.is_some() {}

        info!("RPC 서버 종료");
        Ok(())
    }
}

/// 호출 하나 처리 (워커에서 실행)
async fn handle_call(call: PendingCall, config: &Config, in_flight: &InFlight) {
    let PendingCall { id, addr, stream } = call;
    let (reader, writer) = stream.into_split();
    let mut frames_in = FramedRead::new(reader, FrameCodec::new());
    let mut frames_out = FramedWrite::new(writer, FrameCodec::new());

    let response = match frames_in.next().await {
        Some(Ok(Message::Call(call))) if call.is_upload_file() => {
            info!(%addr, "{} 호출", call.path());
            upload_file(&mut frames_in, config, in_flight, id).await
        }
        Some(Ok(Message::Call(call))) => {
            UploadResponse::failed(format!("unknown method: {}", call.path()))
        }
        Some(Ok(other)) => UploadResponse::failed(format!(
            "Error: expected Call, got {}",
            other.name()
        )),
        Some(Err(e)) => UploadResponse::failed(format!("Error: {e}")),
        None => {
            debug!(%addr, "호출 전에 연결 종료");
            return;
        }
    };

    in_flight.remove(&id);

    if response.success {
        info!("{}", response.message);
    } else {
        warn!("업로드 실패: {}", response.message);
    }

    if let Err(e) = frames_out.send(Message::UploadResponse(response)).await {
        warn!(%addr, "응답 전송 실패: {}", e);
    }
}

/// `UploadFile` 본문
///
/// 첫 청크에서 파일 이름을 얻고, `is_last` 청크를 받으면 더 읽지 않는다.
pub async fn upload_file<S>(
    frames: &mut S,
    config: &Config,
    in_flight: &InFlight,
    call_id: u64,
) -> UploadResponse
where
    S: Stream<Item = Result<Message>> + Unpin,
{
    let mut reassembler = Reassembler::new(InlineFlag, config, &config.rpc_prefix).buffered();
    let mut filename: Option<String> = None;

    loop {
        let chunk = match frames.next().await {
            Some(Ok(Message::FileChunk(chunk))) => chunk,
            Some(Ok(other)) => {
                let e = Error::UnexpectedMessage {
                    expected: "FileChunk".into(),
                    got: other.name().into(),
                };
                reassembler.abort(&e);
                return UploadResponse::failed(format!("Error: {e}"));
            }
            Some(Err(e)) => {
                reassembler.abort(&e);
                return UploadResponse::failed(format!("Error: {e}"));
            }
            None if filename.is_none() => {
                return UploadResponse::failed("No filename received");
            }
            None => {
                let e = Error::TransportFailure("마지막 청크 전에 스트림 종료".into());
                reassembler.abort(&e);
                return UploadResponse::failed(format!("Error: {e}"));
            }
        };

        if filename.is_none() {
            info!("수신 파일: {}", chunk.filename);
            if in_flight.iter().any(|entry| entry.value() == &chunk.filename) {
                warn!("같은 이름의 업로드가 진행 중: {}", chunk.filename);
            }
            in_flight.insert(call_id, chunk.filename.clone());

            if let Err(e) = reassembler.begin(&chunk.filename, None) {
                return UploadResponse::failed(format!("Error: {e}"));
            }
            filename = Some(chunk.filename.clone());
        } else if filename.as_deref() != Some(chunk.filename.as_str()) {
            // 파일 이름은 첫 청크 기준
            debug!("청크 파일 이름 불일치 무시: {}", chunk.filename);
        }

        if chunk.is_last {
            debug!("마지막 청크 수신");
        }

        match reassembler.push(chunk.into_chunk()) {
            Ok(Step::More) => {}
            Ok(Step::Done(received)) => {
                return UploadResponse::ok(format!(
                    "File {} uploaded successfully ({} bytes)",
                    received.filename, received.bytes
                ));
            }
            Err(e) => return UploadResponse::failed(format!("Error: {e}")),
        }
    }
}

/// Streaming RPC 클라이언트
pub struct RpcClient {
    config: Config,
    addr: SocketAddr,
}

impl RpcClient {
    /// 설정된 주소로 연결하는 클라이언트
    pub fn new(config: Config) -> Self {
        let addr = config.rpc_addr;
        Self { config, addr }
    }

    pub fn with_addr(config: Config, addr: SocketAddr) -> Self {
        Self { config, addr }
    }

    /// 파일 업로드
    ///
    /// 원본을 열 수 없으면 호출하지 않고 [`Error::SourceNotFound`] 반환.
    /// 서버가 실패를 알리면 `success == false` 응답을 그대로 돌려준다.
    pub async fn upload_file(&self, path: &Path) -> Result<UploadResponse> {
        let mut session = TransferSession::new(Role::Sender);
        let framer = ChunkFramer::open(path, self.config.chunk_size, InlineFlag)?;
        let filename = framer.metadata().filename.clone();
        if filename.len() > self.config.max_filename_len {
            return Err(Error::FilenameTooLong {
                len: filename.len(),
                max: self.config.max_filename_len,
            });
        }
        info!(
            "전송 준비: {} ({} bytes)",
            filename,
            framer.metadata().size
        );

        let addr = self.addr;
        let stream = TcpStream::connect(addr).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::ConnectionRefused => Error::ConnectionRefused { addr },
            _ => Error::Io(e),
        })?;
        info!("서버 연결: {}", addr);

        let (reader, writer) = stream.into_split();
        let mut frames_in = FramedRead::new(reader, FrameCodec::new());
        let mut frames_out = FramedWrite::new(writer, FrameCodec::new());

        if let Err(e) = frames_out.send(Message::Call(CallMessage::upload_file())).await {
            let _ = session.abort(&e);
            return Err(e);
        }
        session.metadata_exchanged()?;

        for (index, chunk) in framer.enumerate() {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    let _ = session.abort(&e);
                    return Err(e);
                }
            };

            let len = chunk.len();
            if !chunk.is_last {
                debug!("청크 {} 전송 ({} bytes)", index + 1, len);
            }

            let msg = Message::FileChunk(FileChunk::new(filename.as_str(), &chunk));
            if let Err(e) = frames_out.send(msg).await {
                let e = Error::TransportFailure(e.to_string());
                let _ = session.abort(&e);
                return Err(e);
            }
            if len > 0 {
                session.record_chunk(len)?;
            }
        }

        let response = match frames_in.next().await {
            Some(Ok(Message::UploadResponse(response))) => response,
            Some(Ok(other)) => {
                let e = Error::UnexpectedMessage {
                    expected: "UploadResponse".into(),
                    got: other.name().into(),
                };
                let _ = session.abort(&e);
                return Err(e);
            }
            Some(Err(e)) => {
                let _ = session.abort(&e);
                return Err(e);
            }
            None => {
                let _ = session.abort(Error::ConnectionClosed);
                return Err(Error::ConnectionClosed);
            }
        };

        if response.success {
            session.complete()?;
            info!("업로드 성공: {} | {}", response.message, session.stats().summary());
        } else {
            let _ = session.abort(&response.message);
            warn!("업로드 실패: {}", response.message);
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tempfile::TempDir;

    fn chunk(name: &str, content: &[u8], is_last: bool) -> Result<Message> {
        Ok(Message::FileChunk(FileChunk {
            filename: name.into(),
            content: content.to_vec(),
            is_last,
        }))
    }

    #[tokio::test]
    async fn test_upload_file_success() {
        let dir = TempDir::new().unwrap();
        let config = Config::default().with_output_dir(dir.path());
        let in_flight = InFlight::new();

        let mut frames = stream::iter(vec![
            chunk("a.txt", b"hello ", false),
            chunk("a.txt", b"world", false),
            chunk("a.txt", b"", true),
        ]);

        let response = upload_file(&mut frames, &config, &in_flight, 1).await;
        assert!(response.success, "{}", response.message);
        assert_eq!(response.message, "File a.txt uploaded successfully (11 bytes)");
        assert_eq!(
            std::fs::read(dir.path().join("received_a.txt")).unwrap(),
            b"hello world"
        );
    }

    #[tokio::test]
    async fn test_upload_stops_at_last_chunk() {
        let dir = TempDir::new().unwrap();
        let config = Config::default().with_output_dir(dir.path());
        let in_flight = InFlight::new();

        let mut frames = stream::iter(vec![
            chunk("b.txt", b"data", true),
            chunk("b.txt", b"after-end", false),
        ]);

        let response = upload_file(&mut frames, &config, &in_flight, 1).await;
        assert!(response.success);
        assert_eq!(std::fs::read(dir.path().join("received_b.txt")).unwrap(), b"data");

        // 종료 이후 메시지는 읽지 않은 채 남아 있음
        assert!(frames.next().await.is_some());
    }

    #[tokio::test]
    async fn test_upload_without_chunks() {
        let dir = TempDir::new().unwrap();
        let config = Config::default().with_output_dir(dir.path());
        let mut frames = stream::iter(Vec::<Result<Message>>::new());

        let response = upload_file(&mut frames, &config, &InFlight::new(), 1).await;
        assert!(!response.success);
        assert_eq!(response.message, "No filename received");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_upload_stream_closed_early() {
        let dir = TempDir::new().unwrap();
        let config = Config::default().with_output_dir(dir.path());
        let mut frames = stream::iter(vec![chunk("c.txt", b"partial", false)]);

        let response = upload_file(&mut frames, &config, &InFlight::new(), 1).await;
        assert!(!response.success);
        // 버퍼 모드라 출력 파일이 생기지 않음
        assert!(!dir.path().join("received_c.txt").exists());
    }

    #[tokio::test]
    async fn test_upload_rejects_unexpected_message() {
        let dir = TempDir::new().unwrap();
        let config = Config::default().with_output_dir(dir.path());
        let mut frames = stream::iter(vec![
            chunk("d.txt", b"x", false),
            Ok(Message::Call(CallMessage::upload_file())),
        ]);

        let response = upload_file(&mut frames, &config, &InFlight::new(), 1).await;
        assert!(!response.success);
        assert!(response.message.contains("Call"));
    }

    #[tokio::test]
    async fn test_in_flight_tracking() {
        let dir = TempDir::new().unwrap();
        let config = Config::default().with_output_dir(dir.path());
        let in_flight = InFlight::new();
        in_flight.insert(7, "same.txt".into());

        let mut frames = stream::iter(vec![chunk("same.txt", b"1", true)]);
        let response = upload_file(&mut frames, &config, &in_flight, 8).await;

        // 경고만 남기고 업로드는 진행
        assert!(response.success);
        assert_eq!(in_flight.get(&8).map(|e| e.value().clone()), Some("same.txt".into()));
    }

    #[tokio::test]
    async fn test_long_filename_rejected_before_call() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("long_name.txt");
        std::fs::write(&path, b"data").unwrap();

        let mut config = Config::default();
        config.max_filename_len = 8;
        // 아무도 듣지 않는 주소, 연결을 시도했다면 ConnectionRefused
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let result = RpcClient::with_addr(config, addr).upload_file(&path).await;
        assert!(matches!(
            result,
            Err(Error::FilenameTooLong { len: 13, max: 8 })
        ));
    }

    #[tokio::test]
    async fn test_missing_source_makes_no_call() {
        let dir = TempDir::new().unwrap();
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let client = RpcClient::with_addr(Config::default(), addr);
        let result = client.upload_file(&dir.path().join("missing.txt")).await;
        assert!(matches!(result, Err(Error::SourceNotFound { .. })));
    }
}
