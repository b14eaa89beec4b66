//! Streaming RPC 메시지 정의
//!
//! 호출 하나는 TCP 연결 하나를 사용한다.
//!
//! ```text
//! client → server: Call { FileTransferService/UploadFile }
//! client → server: FileChunk { filename, content, is_last } ...
//! server → client: UploadResponse { success, message }
//! ```

use bytes::{Buf, BufMut, Bytes};
use serde::{Deserialize, Serialize};

use crate::chunk::Chunk;
use crate::{Error, Result, MAGIC_NUMBER, PROTOCOL_VERSION};

/// 서비스 이름
pub const SERVICE_NAME: &str = "FileTransferService";

/// 업로드 메서드 이름
pub const METHOD_UPLOAD_FILE: &str = "UploadFile";

/// 헤더 길이: magic(4) + version(1) + msg_type(1) + payload_len(4) + crc32(4)
pub const HEADER_LEN: usize = 14;

/// 메시지 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// 호출 시작 (서비스/메서드 지정)
    Call = 1,

    /// 파일 청크 (클라이언트 스트림)
    FileChunk = 2,

    /// 업로드 결과 (서버 응답)
    UploadResponse = 3,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(MessageType::Call),
            2 => Some(MessageType::FileChunk),
            3 => Some(MessageType::UploadResponse),
            _ => None,
        }
    }
}

/// 프레임 헤더
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    /// 매직 넘버
    pub magic: u32,

    /// 프로토콜 버전
    pub version: u8,

    /// 메시지 타입
    pub msg_type: MessageType,

    /// 페이로드 길이 (헤더 제외)
    pub payload_len: u32,

    /// 페이로드 CRC32
    pub crc32: u32,
}

impl MessageHeader {
    pub fn new(msg_type: MessageType, payload: &[u8]) -> Self {
        Self {
            magic: MAGIC_NUMBER,
            version: PROTOCOL_VERSION,
            msg_type,
            payload_len: payload.len() as u32,
            crc32: crc32fast::hash(payload),
        }
    }

    /// 헤더 기록 (big-endian)
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u32(self.magic);
        dst.put_u8(self.version);
        dst.put_u8(self.msg_type as u8);
        dst.put_u32(self.payload_len);
        dst.put_u32(self.crc32);
    }

    /// 헤더 파싱 (`src` 는 최소 [`HEADER_LEN`] 바이트)
    pub fn decode(mut src: &[u8]) -> Result<Self> {
        if src.len() < HEADER_LEN {
            return Err(Error::TransportFailure(format!(
                "헤더 길이 부족: {} bytes",
                src.len()
            )));
        }

        let magic = src.get_u32();
        if magic != MAGIC_NUMBER {
            return Err(Error::InvalidMagicNumber {
                expected: MAGIC_NUMBER,
                got: magic,
            });
        }

        let version = src.get_u8();
        if version != PROTOCOL_VERSION {
            return Err(Error::InvalidVersion {
                expected: PROTOCOL_VERSION,
                got: version,
            });
        }

        let raw_type = src.get_u8();
        let msg_type = MessageType::from_u8(raw_type).ok_or_else(|| Error::UnexpectedMessage {
            expected: "known message type".into(),
            got: format!("type {raw_type}"),
        })?;

        Ok(Self {
            magic,
            version,
            msg_type,
            payload_len: src.get_u32(),
            crc32: src.get_u32(),
        })
    }

    /// 페이로드 CRC 검증
    pub fn verify(&self, payload: &[u8]) -> Result<()> {
        let got = crc32fast::hash(payload);
        if got != self.crc32 {
            return Err(Error::CrcMismatch {
                expected: self.crc32,
                got,
            });
        }
        Ok(())
    }
}

/// 호출 시작 메시지
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallMessage {
    pub service: String,
    pub method: String,
}

impl CallMessage {
    /// `FileTransferService/UploadFile` 호출
    pub fn upload_file() -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
            method: METHOD_UPLOAD_FILE.to_string(),
        }
    }

    pub fn is_upload_file(&self) -> bool {
        self.service == SERVICE_NAME && self.method == METHOD_UPLOAD_FILE
    }

    /// `service/method` 형식 경로
    pub fn path(&self) -> String {
        format!("{}/{}", self.service, self.method)
    }
}

/// 파일 청크 메시지
///
/// 파일 이름은 모든 청크에 실린다. 크기는 보내지 않는다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChunk {
    pub filename: String,
    pub content: Vec<u8>,
    pub is_last: bool,
}

impl FileChunk {
    pub fn new(filename: impl Into<String>, chunk: &Chunk) -> Self {
        Self {
            filename: filename.into(),
            content: chunk.payload.to_vec(),
            is_last: chunk.is_last,
        }
    }

    /// 조립기용 청크로 변환
    pub fn into_chunk(self) -> Chunk {
        Chunk {
            payload: Bytes::from(self.content),
            is_last: self.is_last,
        }
    }
}

/// 업로드 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
}

impl UploadResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// 통합 메시지 enum
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Call(CallMessage),
    FileChunk(FileChunk),
    UploadResponse(UploadResponse),
}

impl Message {
    /// 메시지 타입 반환
    pub fn msg_type(&self) -> MessageType {
        match self {
            Message::Call(_) => MessageType::Call,
            Message::FileChunk(_) => MessageType::FileChunk,
            Message::UploadResponse(_) => MessageType::UploadResponse,
        }
    }

    /// 로그/에러용 이름
    pub fn name(&self) -> &'static str {
        match self {
            Message::Call(_) => "Call",
            Message::FileChunk(_) => "FileChunk",
            Message::UploadResponse(_) => "UploadResponse",
        }
    }

    /// 페이로드 직렬화
    pub fn encode_payload(&self) -> Result<Vec<u8>> {
        let payload = match self {
            Message::Call(m) => bincode::serialize(m)?,
            Message::FileChunk(m) => bincode::serialize(m)?,
            Message::UploadResponse(m) => bincode::serialize(m)?,
        };
        Ok(payload)
    }

    /// 페이로드 역직렬화
    pub fn decode_payload(msg_type: MessageType, payload: &[u8]) -> Result<Self> {
        let message = match msg_type {
            MessageType::Call => Message::Call(bincode::deserialize(payload)?),
            MessageType::FileChunk => Message::FileChunk(bincode::deserialize(payload)?),
            MessageType::UploadResponse => {
                Message::UploadResponse(bincode::deserialize(payload)?)
            }
        };
        Ok(message)
    }
}
