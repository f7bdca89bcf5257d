//! 패킷 포맷 정의
//!
//! 모든 데이터그램은 고정 8바이트 헤더 + 페이로드로 구성된다.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                  Flags (bit0 LAST, bit1 ACK)                  |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Payload ...                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! 필드는 호스트 바이트 순서로 기록된다 (네트워크 순서 변환 없음).
//! 엔디안이 다른 호스트 간에는 호환되지 않는다.

use std::fmt;
use std::ops::BitOr;

use bincode::Options;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// 시퀀스 번호 (첫 데이터 패킷 = 0)
pub type SequenceNumber = u32;

/// 직렬화된 헤더 크기: seq(4) + flags(4)
pub const HEADER_LEN: usize = 8;

/// 헤더 직렬화 옵션 (고정 폭 정수, 호스트 엔디안)
fn header_codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_native_endian()
}

/// 헤더 플래그 비트 집합
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Flags(u32);

impl Flags {
    /// 플래그 없음 (일반 데이터 패킷)
    pub const EMPTY: Flags = Flags(0);

    /// 마지막 패킷 (bit0)
    pub const IS_LAST_PACKET: Flags = Flags(1 << 0);

    /// 확인 응답 (bit1)
    pub const IS_ACK: Flags = Flags(1 << 1);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// `flag` 비트를 추가한 새 값 반환
    pub const fn with(self, flag: Flags) -> Self {
        Self(self.0 | flag.0)
    }

    /// `flag`의 모든 비트가 설정되어 있는지 확인
    pub const fn contains(self, flag: Flags) -> bool {
        self.0 & flag.0 == flag.0
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        self.with(rhs)
    }
}

/// 패킷 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// 파일 데이터
    Data,

    /// 데이터 ACK
    DataAck,

    /// 종료 패킷
    Closing,

    /// 종료 ACK (IS_ACK | IS_LAST_PACKET)
    ClosingAck,
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PacketKind::Data => "data",
            PacketKind::DataAck => "ack",
            PacketKind::Closing => "closing",
            PacketKind::ClosingAck => "closing-ack",
        };
        f.write_str(name)
    }
}

/// 패킷 헤더 (전송마다 새로 생성되는 불변 값)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketHeader {
    /// 시퀀스 번호
    pub sequence_number: SequenceNumber,

    /// 플래그
    pub flags: Flags,
}

impl PacketHeader {
    pub const fn new(sequence_number: SequenceNumber, flags: Flags) -> Self {
        Self {
            sequence_number,
            flags,
        }
    }

    /// 헤더를 고정 폭 바이트로 직렬화
    pub fn encode(&self) -> Result<[u8; HEADER_LEN]> {
        let mut buf = [0u8; HEADER_LEN];
        header_codec().serialize_into(&mut buf[..], self)?;
        Ok(buf)
    }

    /// 바이트 앞부분에서 헤더 역직렬화
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::MalformedPacket {
                len: bytes.len(),
                min: HEADER_LEN,
            });
        }

        Ok(header_codec().deserialize(&bytes[..HEADER_LEN])?)
    }

    pub fn is_ack(&self) -> bool {
        self.flags.contains(Flags::IS_ACK)
    }

    pub fn is_last_packet(&self) -> bool {
        self.flags.contains(Flags::IS_LAST_PACKET)
    }

    /// 플래그 조합으로 패킷 종류 판별
    pub fn kind(&self) -> PacketKind {
        match (self.is_ack(), self.is_last_packet()) {
            (false, false) => PacketKind::Data,
            (true, false) => PacketKind::DataAck,
            (false, true) => PacketKind::Closing,
            (true, true) => PacketKind::ClosingAck,
        }
    }
}

/// 패킷 (헤더 + 페이로드)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Bytes,
}

impl Packet {
    /// 데이터 패킷
    pub fn data(sequence_number: SequenceNumber, payload: Bytes) -> Self {
        Self {
            header: PacketHeader::new(sequence_number, Flags::EMPTY),
            payload,
        }
    }

    /// 데이터 ACK
    pub fn ack(sequence_number: SequenceNumber) -> Self {
        Self::control(sequence_number, Flags::IS_ACK)
    }

    /// 종료 패킷
    pub fn closing(sequence_number: SequenceNumber) -> Self {
        Self::control(sequence_number, Flags::IS_LAST_PACKET)
    }

    /// 종료 ACK
    pub fn closing_ack(sequence_number: SequenceNumber) -> Self {
        Self::control(sequence_number, Flags::IS_ACK | Flags::IS_LAST_PACKET)
    }

    fn control(sequence_number: SequenceNumber, flags: Flags) -> Self {
        Self {
            header: PacketHeader::new(sequence_number, flags),
            payload: Bytes::new(),
        }
    }

    pub fn sequence_number(&self) -> SequenceNumber {
        self.header.sequence_number
    }

    pub fn kind(&self) -> PacketKind {
        self.header.kind()
    }

    /// 와이어 포맷으로 직렬화
    pub fn encode(&self) -> Result<Bytes> {
        let header = self.header.encode()?;
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        buf.put_slice(&header);
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }

    /// 데이터그램에서 패킷 역직렬화
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = PacketHeader::decode(bytes)?;
        Ok(Self {
            header,
            payload: Bytes::copy_from_slice(&bytes[HEADER_LEN..]),
        })
    }
}
