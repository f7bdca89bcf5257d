//! 프로토콜 설정

use std::time::Duration;

use crate::packet::HEADER_LEN;
use crate::{Error, Result, DEFAULT_CHUNK_SIZE, DEFAULT_LINK_CAPACITY_BPS};

/// UDP 데이터그램 최대 페이로드 (IPv4 기준)
///
/// 수신자는 송신측 청크 크기를 알 수 없으므로 항상 이 크기로 받는다.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// RFT 프로토콜 설정
///
/// 송신자/수신자 상태 머신은 생성 시 이 값을 받아 그대로 사용한다.
#[derive(Debug, Clone)]
pub struct Config {
    /// 데이터 패킷당 최대 페이로드 크기 (바이트, 송신측 전용)
    pub chunk_max_bytes: usize,

    /// 초기 RTT 추정값
    pub expected_rtt: Duration,

    /// RTO 하한 (update 시에만 적용)
    pub min_timeout: Duration,

    /// RTO 상한 (update 시에만 적용, backoff에는 적용 안 함)
    pub max_timeout: Duration,

    /// 종료 핸드쉐이크 최대 전송 횟수
    pub closing_max_attempts: u32,

    /// 종료 ACK 대기 타임아웃 (RTO와 무관한 고정값)
    pub closing_timeout: Duration,

    /// 종료 ACK 전송 후 수신자가 재전송된 종료 패킷에 응답하는 시간
    /// 0이면 종료 패킷 수신 즉시 루프 종료
    pub closing_linger: Duration,

    /// 처리율 리포트용 링크 용량 (bits/sec)
    pub link_capacity_bps: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_max_bytes: DEFAULT_CHUNK_SIZE,
            expected_rtt: Duration::from_millis(50),
            min_timeout: Duration::from_millis(5),
            max_timeout: Duration::from_millis(300),
            closing_max_attempts: 10,
            closing_timeout: Duration::from_millis(100),
            closing_linger: Duration::ZERO,
            link_capacity_bps: DEFAULT_LINK_CAPACITY_BPS,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 수신 버퍼 크기 (헤더 + 최대 청크)
    pub fn recv_buffer_size(&self) -> usize {
        HEADER_LEN + self.chunk_max_bytes
    }

    /// 설정값 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk_max_bytes == 0 {
            return Err(Error::InvalidConfig("chunk_max_bytes는 0일 수 없음".into()));
        }
        if self.recv_buffer_size() > MAX_DATAGRAM_SIZE {
            return Err(Error::InvalidConfig(format!(
                "chunk_max_bytes {} 가 UDP 데이터그램 크기를 초과",
                self.chunk_max_bytes
            )));
        }
        if self.min_timeout > self.max_timeout {
            return Err(Error::InvalidConfig(format!(
                "min_timeout {:?} > max_timeout {:?}",
                self.min_timeout, self.max_timeout
            )));
        }
        if self.closing_max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "closing_max_attempts는 1 이상이어야 함".into(),
            ));
        }
        Ok(())
    }

    /// 로컬 네트워크용 설정
    pub fn lan() -> Self {
        Self {
            chunk_max_bytes: 1400 - HEADER_LEN,
            expected_rtt: Duration::from_millis(5),
            closing_timeout: Duration::from_millis(50),
            ..Self::default()
        }
    }

    /// 불안정한 네트워크용 설정
    pub fn unstable_network() -> Self {
        Self {
            chunk_max_bytes: 512,             // 작은 청크
            expected_rtt: Duration::from_millis(150),
            closing_max_attempts: 20,
            closing_timeout: Duration::from_millis(250),
            closing_linger: Duration::from_secs(2),
            ..Self::default()
        }
    }
}
