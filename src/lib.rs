//! # RFT (Reliable File Transfer)
//!
//! UDP 위의 stop-and-wait ARQ 파일 전송
//!
//! ## 핵심 특징
//! - **stop-and-wait**: 한 번에 하나의 패킷만 전송 중, ACK 확인 후 다음 청크
//! - **적응형 타임아웃**: Jacobson/Karels RTT 추정, 타임아웃 시 지수 백오프
//! - **종료 핸드셰이크**: 제한 횟수만큼 종료 패킷 재전송 후 확인 여부 보고
//! - **순서 보장 수신**: 중복은 재ACK, 앞선 패킷은 폐기
//!
//! ## 패킷 형식
//! ```text
//! +----------------------+----------------------+-----------------+
//! | sequence_number: u32 | flags: u32           | payload ...     |
//! +----------------------+----------------------+-----------------+
//! ```
//! 헤더 8바이트, 호스트 바이트 순서. 데이터그램 하나가 패킷 하나.

pub mod config;
pub mod error;
pub mod packet;
pub mod receiver;
pub mod rto;
pub mod sender;
pub mod session;
pub mod simulator;
pub mod stats;
pub mod transport;

pub use config::Config;
pub use error::{Error, Result};
pub use packet::{Flags, Packet, PacketHeader, PacketKind, SequenceNumber, HEADER_LEN};
pub use receiver::{Disposition, ReceiveReport, Receiver};
pub use rto::RtoEstimator;
pub use sender::{Sender, SenderState, TransferReport, TransferStatus};
pub use session::{ReceiverSession, SenderSession};
pub use stats::TransferStats;
pub use transport::{Transport, UdpTransport};

/// 데이터그램 최대 크기 (헤더 포함)
pub const DATAGRAM_SIZE: usize = 1024;

/// 기본 청크 크기 (바이트)
pub const DEFAULT_CHUNK_SIZE: usize = DATAGRAM_SIZE - HEADER_LEN;

/// 처리율 보고 기준 링크 용량 (bits/sec)
pub const DEFAULT_LINK_CAPACITY_BPS: u64 = 20_971_520; // 20 Mbit
