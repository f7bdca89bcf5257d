//! 에러 타입 정의

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use crate::packet::SequenceNumber;

/// RFT 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("직렬화 에러: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("잘못된 패킷: {len} bytes (헤더 최소 {min} bytes)")]
    MalformedPacket { len: usize, min: usize },

    #[error("소켓 바인드 실패: {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("주소 변환 실패: {host}: {source}")]
    AddressResolution {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("주소 없음: {host}")]
    NoAddress { host: String },

    #[error("파일 열기 실패: {path:?}: {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("전송 실패: seq={sequence}: {source}")]
    SendFailed {
        sequence: SequenceNumber,
        #[source]
        source: std::io::Error,
    },

    #[error("파일 읽기 실패: {0}")]
    ReadFailed(#[source] std::io::Error),

    #[error("파일 쓰기 실패: {0}")]
    WriteFailed(#[source] std::io::Error),

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
