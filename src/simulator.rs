//! 네트워크 시뮬레이터 (테스트용)
//!
//! - [`MemoryTransport`]: 프로세스 내부 채널로 연결된 전송 쌍
//! - [`LossyTransport`]: 송신 경로에 손실/중복을 주입하는 래퍼
//!
//! 손실은 시드 고정 RNG와 패킷 단위 드롭 규칙 두 가지로 지정한다.
//! 재현 가능한 테스트를 위해 시드는 항상 명시한다.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tracing::trace;

use crate::packet::{PacketHeader, PacketKind, SequenceNumber};
use crate::transport::Transport;

type Datagram = (Bytes, SocketAddr);

/// 메모리 채널 기반 전송
///
/// UDP처럼 동작한다: 피어가 없거나 주소가 다르면 조용히 버려지고,
/// 버퍼보다 큰 데이터그램은 잘린다.
#[derive(Debug)]
pub struct MemoryTransport {
    addr: SocketAddr,
    peer: SocketAddr,
    tx: mpsc::UnboundedSender<Datagram>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Datagram>>,
}

impl MemoryTransport {
    /// 서로 연결된 전송 쌍 생성
    pub fn pair(a: SocketAddr, b: SocketAddr) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();

        let left = Self {
            addr: a,
            peer: b,
            tx: a_tx,
            rx: tokio::sync::Mutex::new(a_rx),
        };
        let right = Self {
            addr: b,
            peer: a,
            tx: b_tx,
            rx: tokio::sync::Mutex::new(b_rx),
        };
        (left, right)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send_to(&self, datagram: &[u8], dest: SocketAddr) -> io::Result<usize> {
        if dest == self.peer {
            // 수신측이 닫혀 있어도 UDP처럼 성공으로 처리
            let _ = self.tx.send((Bytes::copy_from_slice(datagram), self.addr));
        }
        Ok(datagram.len())
    }

    async fn recv_from(
        &self,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> io::Result<Option<(usize, SocketAddr)>> {
        let mut rx = self.rx.lock().await;

        let next = async {
            match rx.recv().await {
                Some(datagram) => datagram,
                // 피어가 사라지면 더 이상 도착하지 않음
                None => std::future::pending().await,
            }
        };

        let (datagram, from) = match timeout {
            Some(limit) => match tokio::time::timeout(limit, next).await {
                Ok(datagram) => datagram,
                Err(_) => return Ok(None),
            },
            None => next.await,
        };

        let len = datagram.len().min(buf.len());
        buf[..len].copy_from_slice(&datagram[..len]);
        Ok(Some((len, from)))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.addr)
    }
}

/// 무작위 장애 설정
///
/// 확률은 0.0 ~ 1.0
#[derive(Debug, Clone)]
pub struct FaultConfig {
    /// 패킷 손실 확률
    pub loss_rate: f64,

    /// 패킷 중복 확률
    pub duplicate_rate: f64,

    /// RNG 시드
    pub seed: u64,
}

impl Default for FaultConfig {
    fn default() -> Self {
        // 장애 없음 (투명 통과)
        Self {
            loss_rate: 0.0,
            duplicate_rate: 0.0,
            seed: 0,
        }
    }
}

impl FaultConfig {
    pub fn lossy(loss_rate: f64, seed: u64) -> Self {
        Self {
            loss_rate,
            seed,
            ..Self::default()
        }
    }
}

/// 특정 패킷을 지정 횟수만큼 버리는 규칙
#[derive(Debug, Clone)]
struct DropRule {
    kind: PacketKind,
    sequence: Option<SequenceNumber>,
    remaining: u32,
}

impl DropRule {
    fn matches(&self, header: &PacketHeader) -> bool {
        self.remaining > 0
            && header.kind() == self.kind
            && self.sequence.map_or(true, |seq| seq == header.sequence_number)
    }
}

/// 송신 기록
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentRecord {
    pub header: PacketHeader,
    pub payload_len: usize,
    pub delivered: bool,
}

#[derive(Debug)]
struct FaultState {
    rng: StdRng,
    rules: Vec<DropRule>,
    log: Vec<SentRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Deliver,
    Drop,
    Duplicate,
}

/// 송신 경로 장애 주입 래퍼
#[derive(Debug)]
pub struct LossyTransport<T> {
    inner: T,
    config: FaultConfig,
    state: Mutex<FaultState>,
}

impl<T: Transport> LossyTransport<T> {
    pub fn new(inner: T, config: FaultConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            inner,
            config,
            state: Mutex::new(FaultState {
                rng,
                rules: Vec::new(),
                log: Vec::new(),
            }),
        }
    }

    /// 장애 없이 기록만 하는 래퍼
    pub fn passthrough(inner: T) -> Self {
        Self::new(inner, FaultConfig::default())
    }

    /// `kind` 패킷 (`sequence`가 `None`이면 모든 시퀀스)을 `count`번 버림
    pub fn drop_next(&self, kind: PacketKind, sequence: Option<SequenceNumber>, count: u32) {
        self.state.lock().rules.push(DropRule {
            kind,
            sequence,
            remaining: count,
        });
    }

    /// 지금까지 송신 시도된 패킷 기록
    pub fn sent(&self) -> Vec<SentRecord> {
        self.state.lock().log.clone()
    }

    /// 조건에 맞는 송신 시도 횟수
    pub fn count_sent(&self, kind: PacketKind, sequence: Option<SequenceNumber>) -> usize {
        self.state
            .lock()
            .log
            .iter()
            .filter(|r| r.header.kind() == kind)
            .filter(|r| sequence.map_or(true, |seq| seq == r.header.sequence_number))
            .count()
    }

    fn judge(&self, datagram: &[u8]) -> Verdict {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let header = match PacketHeader::decode(datagram) {
            Ok(header) => header,
            Err(_) => return Verdict::Deliver,
        };

        let mut verdict = Verdict::Deliver;
        if let Some(rule) = state.rules.iter_mut().find(|rule| rule.matches(&header)) {
            rule.remaining -= 1;
            verdict = Verdict::Drop;
        } else if self.config.loss_rate > 0.0 && state.rng.gen_bool(self.config.loss_rate) {
            verdict = Verdict::Drop;
        } else if self.config.duplicate_rate > 0.0
            && state.rng.gen_bool(self.config.duplicate_rate)
        {
            verdict = Verdict::Duplicate;
        }

        state.log.push(SentRecord {
            header,
            payload_len: datagram.len().saturating_sub(crate::packet::HEADER_LEN),
            delivered: verdict != Verdict::Drop,
        });

        trace!(
            "시뮬레이터: {} seq={} -> {:?}",
            header.kind(),
            header.sequence_number,
            verdict
        );
        verdict
    }
}

#[async_trait]
impl<T: Transport> Transport for LossyTransport<T> {
    async fn send_to(&self, datagram: &[u8], dest: SocketAddr) -> io::Result<usize> {
        match self.judge(datagram) {
            Verdict::Deliver => self.inner.send_to(datagram, dest).await,
            Verdict::Drop => Ok(datagram.len()),
            Verdict::Duplicate => {
                self.inner.send_to(datagram, dest).await?;
                self.inner.send_to(datagram, dest).await
            }
        }
    }

    async fn recv_from(
        &self,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> io::Result<Option<(usize, SocketAddr)>> {
        self.inner.recv_from(buf, timeout).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Packet;

    fn addrs() -> (SocketAddr, SocketAddr) {
        (
            "10.0.0.1:4000".parse().unwrap(),
            "10.0.0.2:5000".parse().unwrap(),
        )
    }

    #[tokio::test]
    async fn test_memory_pair_delivers_with_source_addr() {
        let (a_addr, b_addr) = addrs();
        let (a, b) = MemoryTransport::pair(a_addr, b_addr);

        a.send_to(b"hello", b_addr).await.unwrap();

        let mut buf = [0u8; 64];
        let (len, from) = b.recv_from(&mut buf, None).await.unwrap().unwrap();
        assert_eq!(&buf[..len], b"hello");
        assert_eq!(from, a_addr);
    }

    #[tokio::test]
    async fn test_memory_wrong_dest_is_lost() {
        let (a_addr, b_addr) = addrs();
        let (a, b) = MemoryTransport::pair(a_addr, b_addr);

        a.send_to(b"nowhere", "10.9.9.9:1".parse().unwrap())
            .await
            .unwrap();

        let mut buf = [0u8; 64];
        let result = b
            .recv_from(&mut buf, Some(Duration::from_millis(10)))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_memory_closed_peer_times_out() {
        let (a_addr, b_addr) = addrs();
        let (a, b) = MemoryTransport::pair(a_addr, b_addr);
        drop(a);

        let mut buf = [0u8; 8];
        let result = b
            .recv_from(&mut buf, Some(Duration::from_millis(10)))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_drop_rule_applies_exact_count() {
        let (a_addr, b_addr) = addrs();
        let (a, b) = MemoryTransport::pair(a_addr, b_addr);
        let lossy = LossyTransport::passthrough(a);
        lossy.drop_next(PacketKind::DataAck, Some(3), 1);

        for seq in [2u32, 3, 3, 4] {
            let bytes = Packet::ack(seq).encode().unwrap();
            lossy.send_to(&bytes, b_addr).await.unwrap();
        }

        let mut received = Vec::new();
        let mut buf = [0u8; 64];
        while let Some((len, _)) = b
            .recv_from(&mut buf, Some(Duration::from_millis(10)))
            .await
            .unwrap()
        {
            received.push(Packet::decode(&buf[..len]).unwrap().sequence_number());
        }

        assert_eq!(received, vec![2, 3, 4]);
        assert_eq!(lossy.count_sent(PacketKind::DataAck, Some(3)), 2);
        assert_eq!(lossy.sent().iter().filter(|r| !r.delivered).count(), 1);
    }

    #[tokio::test]
    async fn test_seeded_loss_is_reproducible() {
        async fn pattern(seed: u64) -> Vec<bool> {
            let (a_addr, b_addr) = addrs();
            let (a, _b) = MemoryTransport::pair(a_addr, b_addr);
            let lossy = LossyTransport::new(a, FaultConfig::lossy(0.5, seed));
            for seq in 0..32u32 {
                let bytes = Packet::ack(seq).encode().unwrap();
                lossy.send_to(&bytes, b_addr).await.unwrap();
            }
            lossy.sent().iter().map(|r| r.delivered).collect()
        }

        let first = pattern(42).await;
        assert_eq!(first, pattern(42).await);
        assert!(first.iter().any(|d| *d));
        assert!(first.iter().any(|d| !*d));
    }
}
