//! 송신자 상태 머신
//!
//! Stop-and-wait: 한 번에 하나의 데이터 패킷만 ACK 대기 상태로 둔다.
//!
//! ```text
//! ReadChunk ──▶ AwaitAck ──ack──▶ ReadChunk
//!     │            │  ▲
//!     │         timeout (backoff 후 같은 청크 재전송)
//!     │            └──┘
//!     └─EOF/예산 소진─▶ Closing ──▶ Done | Failed
//! ```
//!
//! - 데이터 재전송 횟수에는 제한이 없다
//! - 종료 핸드쉐이크는 `closing_max_attempts`번까지만 시도한다

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::packet::{Packet, PacketHeader, PacketKind, SequenceNumber};
use crate::rto::RtoEstimator;
use crate::stats::TransferStats;
use crate::transport::Transport;
use crate::{Config, Error, Result};

/// 송신자 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    /// 원본에서 다음 청크 읽기
    ReadChunk,

    /// 현재 청크 전송 후 ACK 대기
    AwaitAck,

    /// 종료 핸드쉐이크 진행 중
    Closing,

    /// 종료 ACK 확인
    Done,

    /// 종료 ACK 미확인 또는 에러
    Failed,
}

/// 전송 완료 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// 수신자가 종료 패킷을 확인함
    Complete { closing_attempts: u32 },

    /// 종료 재시도 소진. 데이터는 모두 ACK 받았지만 수신자 종료는 확인 못함
    Unconfirmed { closing_attempts: u32 },
}

impl TransferStatus {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, TransferStatus::Complete { .. })
    }

    pub fn closing_attempts(&self) -> u32 {
        match *self {
            TransferStatus::Complete { closing_attempts }
            | TransferStatus::Unconfirmed { closing_attempts } => closing_attempts,
        }
    }
}

/// 송신 결과
#[derive(Debug, Clone)]
pub struct TransferReport {
    pub status: TransferStatus,

    /// ACK 받은 데이터 패킷 수 (= 종료 패킷의 시퀀스 번호)
    pub data_packets: SequenceNumber,

    pub stats: TransferStats,
}

/// 응답 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reply {
    /// 기다리던 ACK
    Matched,

    /// 이미 처리한 시퀀스의 ACK
    Stale,

    /// 관계 없는 패킷
    Unrelated,
}

fn classify_reply(header: &PacketHeader, kind: PacketKind, sequence: SequenceNumber) -> Reply {
    if header.kind() != kind {
        return Reply::Unrelated;
    }
    if header.sequence_number == sequence {
        Reply::Matched
    } else if header.sequence_number < sequence {
        Reply::Stale
    } else {
        Reply::Unrelated
    }
}

/// 송신자
pub struct Sender<T> {
    config: Config,
    transport: T,
    peer: SocketAddr,
    rto: RtoEstimator,

    /// 현재 전송 중인 (또는 다음) 시퀀스 번호
    sequence: SequenceNumber,

    state: SenderState,
    stats: TransferStats,
    recv_buf: Vec<u8>,
}

impl<T: Transport> Sender<T> {
    /// 새 송신자 생성
    pub fn new(config: Config, transport: T, peer: SocketAddr) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            rto: RtoEstimator::from_config(&config),
            recv_buf: vec![0u8; config.recv_buffer_size()],
            config,
            transport,
            peer,
            sequence: 0,
            state: SenderState::ReadChunk,
            stats: TransferStats::new(),
        })
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    pub fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    pub fn rto(&self) -> &RtoEstimator {
        &self.rto
    }

    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// `source`에서 최대 `bytes_to_transfer` 바이트를 읽어 전송
    ///
    /// 원본이 먼저 끝나면 그 시점까지만 보내고 종료 핸드쉐이크로 넘어간다.
    pub async fn send<R>(&mut self, mut source: R, bytes_to_transfer: u64) -> Result<TransferReport>
    where
        R: AsyncRead + Unpin,
    {
        info!(
            "전송 시작: peer={}, {} bytes, chunk={} bytes",
            self.peer, bytes_to_transfer, self.config.chunk_max_bytes
        );

        let result = self.run(&mut source, bytes_to_transfer).await;
        self.stats.finish();

        let status = match result {
            Ok(status) => status,
            Err(e) => {
                self.state = SenderState::Failed;
                warn!("전송 중단: seq={}: {}", self.sequence, e);
                return Err(e);
            }
        };

        info!("{}", self.stats.summary(self.config.link_capacity_bps));

        Ok(TransferReport {
            status,
            data_packets: self.sequence,
            stats: self.stats.clone(),
        })
    }

    async fn run<R>(&mut self, source: &mut R, bytes_to_transfer: u64) -> Result<TransferStatus>
    where
        R: AsyncRead + Unpin,
    {
        let mut remaining = bytes_to_transfer;

        loop {
            self.state = SenderState::ReadChunk;
            let chunk = self.read_chunk(source, remaining).await?;
            if chunk.is_empty() {
                if remaining > 0 {
                    warn!("원본이 예상보다 짧음: {} bytes 남음", remaining);
                }
                break;
            }
            remaining -= chunk.len() as u64;

            self.state = SenderState::AwaitAck;
            self.transmit_until_acked(chunk).await?;
        }

        self.state = SenderState::Closing;
        let status = self.close().await?;
        self.state = if status.is_confirmed() {
            SenderState::Done
        } else {
            SenderState::Failed
        };
        Ok(status)
    }

    /// 최대 청크 크기 또는 남은 예산만큼 읽기
    async fn read_chunk<R>(&self, source: &mut R, remaining: u64) -> Result<Bytes>
    where
        R: AsyncRead + Unpin,
    {
        let want = remaining.min(self.config.chunk_max_bytes as u64) as usize;
        let mut buf = vec![0u8; want];
        let mut filled = 0;

        while filled < want {
            let n = source
                .read(&mut buf[filled..])
                .await
                .map_err(Error::ReadFailed)?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        buf.truncate(filled);
        Ok(Bytes::from(buf))
    }

    /// 현재 시퀀스로 청크를 보내고 ACK 받을 때까지 재전송
    async fn transmit_until_acked(&mut self, payload: Bytes) -> Result<()> {
        let sequence = self.sequence;
        let payload_len = payload.len() as u64;
        let datagram = Packet::data(sequence, payload).encode()?;
        let mut attempts = 0u32;

        loop {
            self.transport
                .send_to(&datagram, self.peer)
                .await
                .map_err(|source| Error::SendFailed { sequence, source })?;
            let sent_at = Instant::now();

            attempts += 1;
            self.stats.packets_sent += 1;
            self.stats.bytes_sent += payload_len;
            if attempts > 1 {
                self.stats.retransmissions += 1;
            }

            let timeout = self.rto.timeout();
            trace!("seq={} 전송 (시도 {}), RTO={:?}", sequence, attempts, timeout);

            match self
                .await_reply(PacketKind::DataAck, sequence, sent_at, timeout)
                .await?
            {
                Some(rtt) => {
                    let next_timeout = self.rto.update(rtt);
                    self.stats.record_rtt(rtt);
                    self.stats.bytes_delivered += payload_len;
                    self.sequence = self.sequence.wrapping_add(1);
                    debug!(
                        "seq={} ACK: rtt={:?}, 다음 RTO={:?}",
                        sequence, rtt, next_timeout
                    );
                    return Ok(());
                }
                None => {
                    self.stats.timeouts += 1;
                    let next_timeout = self.rto.backoff();
                    debug!(
                        "seq={} 타임아웃 ({:?}), 재전송 RTO={:?}",
                        sequence, timeout, next_timeout
                    );
                }
            }
        }
    }

    /// 종료 핸드쉐이크
    async fn close(&mut self) -> Result<TransferStatus> {
        let sequence = self.sequence;
        let datagram = Packet::closing(sequence).encode()?;
        let max_attempts = self.config.closing_max_attempts;
        let timeout = self.config.closing_timeout;

        for attempt in 1..=max_attempts {
            self.transport
                .send_to(&datagram, self.peer)
                .await
                .map_err(|source| Error::SendFailed { sequence, source })?;
            let sent_at = Instant::now();
            self.stats.closing_attempts = attempt;

            if self
                .await_reply(PacketKind::ClosingAck, sequence, sent_at, timeout)
                .await?
                .is_some()
            {
                info!("종료 확인: seq={}, 시도 {}회", sequence, attempt);
                return Ok(TransferStatus::Complete {
                    closing_attempts: attempt,
                });
            }

            debug!("종료 ACK 대기 타임아웃 ({}/{})", attempt, max_attempts);
        }

        warn!(
            "종료 ACK 미수신: {}회 시도 후 포기 (수신 완료 여부 미확인)",
            max_attempts
        );
        Ok(TransferStatus::Unconfirmed {
            closing_attempts: max_attempts,
        })
    }

    /// `sent_at`부터 `timeout` 안에 `kind`/`sequence` 응답을 기다림
    ///
    /// 도착하면 RTT를 반환. 이전 시퀀스 ACK나 무관한 패킷은 무시하고
    /// 남은 시간 동안 계속 기다린다.
    async fn await_reply(
        &mut self,
        kind: PacketKind,
        sequence: SequenceNumber,
        sent_at: Instant,
        timeout: Duration,
    ) -> Result<Option<Duration>> {
        loop {
            let remaining = timeout.saturating_sub(sent_at.elapsed());
            if remaining.is_zero() {
                return Ok(None);
            }

            let (len, from) = match self
                .transport
                .recv_from(&mut self.recv_buf, Some(remaining))
                .await?
            {
                Some(received) => received,
                None => return Ok(None),
            };

            let header = match PacketHeader::decode(&self.recv_buf[..len]) {
                Ok(header) => header,
                Err(e) => {
                    self.stats.malformed_packets += 1;
                    debug!("잘못된 응답 무시 ({}): {}", from, e);
                    continue;
                }
            };

            match classify_reply(&header, kind, sequence) {
                Reply::Matched => return Ok(Some(sent_at.elapsed())),
                Reply::Stale => {
                    self.stats.stale_acks += 1;
                    trace!(
                        "이전 {} 무시: seq={} (대기 seq={})",
                        kind,
                        header.sequence_number,
                        sequence
                    );
                }
                Reply::Unrelated => {
                    trace!(
                        "무관한 패킷 무시: {} seq={} from {}",
                        header.kind(),
                        header.sequence_number,
                        from
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Flags;
    use crate::simulator::MemoryTransport;

    fn addrs() -> (SocketAddr, SocketAddr) {
        (
            "10.0.0.1:4000".parse().unwrap(),
            "10.0.0.2:5000".parse().unwrap(),
        )
    }

    fn test_config() -> Config {
        Config {
            chunk_max_bytes: 4,
            expected_rtt: Duration::from_millis(20),
            closing_max_attempts: 3,
            closing_timeout: Duration::from_millis(40),
            ..Config::default()
        }
    }

    /// 수신측 흉내: 받은 패킷을 돌려줌
    async fn recv_packet(peer: &MemoryTransport) -> Packet {
        let mut buf = vec![0u8; 64];
        let (len, _) = peer.recv_from(&mut buf, None).await.unwrap().unwrap();
        Packet::decode(&buf[..len]).unwrap()
    }

    async fn reply(peer: &MemoryTransport, packet: Packet, to: SocketAddr) {
        peer.send_to(&packet.encode().unwrap(), to).await.unwrap();
    }

    #[test]
    fn test_classify_reply() {
        let ack = |seq| PacketHeader::new(seq, Flags::IS_ACK);
        assert_eq!(classify_reply(&ack(5), PacketKind::DataAck, 5), Reply::Matched);
        assert_eq!(classify_reply(&ack(4), PacketKind::DataAck, 5), Reply::Stale);
        assert_eq!(classify_reply(&ack(6), PacketKind::DataAck, 5), Reply::Unrelated);

        let data = PacketHeader::new(5, Flags::EMPTY);
        assert_eq!(classify_reply(&data, PacketKind::DataAck, 5), Reply::Unrelated);

        let closing_ack = PacketHeader::new(5, Flags::IS_ACK | Flags::IS_LAST_PACKET);
        assert_eq!(classify_reply(&closing_ack, PacketKind::DataAck, 5), Reply::Unrelated);
        assert_eq!(
            classify_reply(&closing_ack, PacketKind::ClosingAck, 5),
            Reply::Matched
        );
        assert_eq!(classify_reply(&ack(5), PacketKind::ClosingAck, 5), Reply::Unrelated);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let (a, b) = addrs();
        let (transport, _peer) = MemoryTransport::pair(a, b);
        let config = Config {
            chunk_max_bytes: 0,
            ..Config::default()
        };
        assert!(matches!(
            Sender::new(config, transport, b),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_ack_does_not_advance_or_resend() {
        let (a, b) = addrs();
        let (transport, peer) = MemoryTransport::pair(a, b);
        let mut sender = Sender::new(test_config(), transport, b).unwrap();

        let peer_task = tokio::spawn(async move {
            let first = recv_packet(&peer).await;
            assert_eq!(first.sequence_number(), 0);
            reply(&peer, Packet::ack(0), a).await;

            let second = recv_packet(&peer).await;
            assert_eq!(second.sequence_number(), 1);
            // 이전 ACK 중복 도착 후 정상 ACK
            reply(&peer, Packet::ack(0), a).await;
            reply(&peer, Packet::ack(1), a).await;

            let closing = recv_packet(&peer).await;
            assert_eq!(closing.kind(), PacketKind::Closing);
            assert_eq!(closing.sequence_number(), 2);
            reply(&peer, Packet::closing_ack(2), a).await;
        });

        let report = sender.send(&b"abcdefgh"[..], 8).await.unwrap();
        peer_task.await.unwrap();

        assert_eq!(report.status, TransferStatus::Complete { closing_attempts: 1 });
        assert_eq!(report.data_packets, 2);
        assert_eq!(report.stats.stale_acks, 1);
        assert_eq!(report.stats.retransmissions, 0);
        assert_eq!(report.stats.bytes_delivered, 8);
        assert_eq!(sender.state(), SenderState::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_resends_same_chunk_with_backoff() {
        let (a, b) = addrs();
        let (transport, peer) = MemoryTransport::pair(a, b);
        let mut sender = Sender::new(test_config(), transport, b).unwrap();

        let peer_task = tokio::spawn(async move {
            // 두 번 무시 후 세 번째에 ACK
            let first = recv_packet(&peer).await;
            let second = recv_packet(&peer).await;
            let third = recv_packet(&peer).await;
            assert_eq!(first, second);
            assert_eq!(second, third);
            assert_eq!(third.payload.as_ref(), b"abc");
            reply(&peer, Packet::ack(0), a).await;

            let closing = recv_packet(&peer).await;
            reply(&peer, Packet::closing_ack(closing.sequence_number()), a).await;
        });

        let report = sender.send(&b"abc"[..], 3).await.unwrap();
        peer_task.await.unwrap();

        assert!(report.status.is_confirmed());
        assert_eq!(report.stats.timeouts, 2);
        assert_eq!(report.stats.retransmissions, 2);
        assert_eq!(report.stats.packets_sent, 3);
        assert_eq!(report.stats.bytes_sent, 9);
        assert_eq!(report.stats.bytes_delivered, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_byte_budget_limits_transfer() {
        let (a, b) = addrs();
        let (transport, peer) = MemoryTransport::pair(a, b);
        let mut sender = Sender::new(test_config(), transport, b).unwrap();

        let peer_task = tokio::spawn(async move {
            let mut payloads = Vec::new();
            loop {
                let packet = recv_packet(&peer).await;
                let seq = packet.sequence_number();
                if packet.kind() == PacketKind::Closing {
                    reply(&peer, Packet::closing_ack(seq), a).await;
                    return payloads;
                }
                payloads.push(packet.payload.to_vec());
                reply(&peer, Packet::ack(seq), a).await;
            }
        });

        let report = sender.send(&b"0123456789"[..], 6).await.unwrap();
        let payloads = peer_task.await.unwrap();

        assert_eq!(payloads, vec![b"0123".to_vec(), b"45".to_vec()]);
        assert_eq!(report.data_packets, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closing_unconfirmed_after_max_attempts() {
        let (a, b) = addrs();
        let (transport, peer) = MemoryTransport::pair(a, b);
        let mut sender = Sender::new(test_config(), transport, b).unwrap();

        // 빈 원본: 곧바로 종료 핸드쉐이크, 수신측은 응답하지 않음
        let report = sender.send(tokio::io::empty(), 100).await.unwrap();

        assert_eq!(report.status, TransferStatus::Unconfirmed { closing_attempts: 3 });
        assert_eq!(report.data_packets, 0);
        assert_eq!(sender.state(), SenderState::Failed);

        let mut closings = 0;
        let mut buf = vec![0u8; 64];
        while let Some((len, _)) = peer
            .recv_from(&mut buf, Some(Duration::from_millis(1)))
            .await
            .unwrap()
        {
            let packet = Packet::decode(&buf[..len]).unwrap();
            assert_eq!(packet.kind(), PacketKind::Closing);
            assert_eq!(packet.sequence_number(), 0);
            closings += 1;
        }
        assert_eq!(closings, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rtt_updates_rto() {
        let (a, b) = addrs();
        let (transport, peer) = MemoryTransport::pair(a, b);
        let mut sender = Sender::new(test_config(), transport, b).unwrap();

        let peer_task = tokio::spawn(async move {
            loop {
                let packet = recv_packet(&peer).await;
                let seq = packet.sequence_number();
                tokio::time::sleep(Duration::from_millis(10)).await;
                if packet.kind() == PacketKind::Closing {
                    reply(&peer, Packet::closing_ack(seq), a).await;
                    return;
                }
                reply(&peer, Packet::ack(seq), a).await;
            }
        });

        sender.send(&b"abcd"[..], 4).await.unwrap();
        peer_task.await.unwrap();

        // 20ms 초기값에 약 10ms 샘플 1개: est≈18.75, dev≈2.5, RTO≈28.75ms
        let rto = sender.rto().timeout();
        assert!(rto > Duration::from_millis(26) && rto < Duration::from_millis(30));
        assert!(sender.rto().estimated_rtt() < Duration::from_millis(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_ack_keeps_original_deadline() {
        let (a, b) = addrs();
        let (transport, peer) = MemoryTransport::pair(a, b);
        let mut sender = Sender::new(test_config(), transport, b).unwrap();

        let peer_task = tokio::spawn(async move {
            let first = recv_packet(&peer).await;
            reply(&peer, Packet::ack(first.sequence_number()), a).await;

            // seq=1 전송 시각 기준으로 측정
            let second = recv_packet(&peer).await;
            assert_eq!(second.sequence_number(), 1);
            let sent_at = Instant::now();

            // RTO(37.5ms)의 약 0.8배 시점에 이전 ACK만 보냄
            tokio::time::sleep(Duration::from_millis(30)).await;
            reply(&peer, Packet::ack(0), a).await;

            let resent = recv_packet(&peer).await;
            let waited = sent_at.elapsed();
            assert_eq!(resent, second);
            reply(&peer, Packet::ack(1), a).await;

            let closing = recv_packet(&peer).await;
            reply(&peer, Packet::closing_ack(closing.sequence_number()), a).await;
            waited
        });

        let report = sender.send(&b"abcdefgh"[..], 8).await.unwrap();
        let waited = peer_task.await.unwrap();

        // 20ms 초기값에 0ms 샘플: est=17.5, dev=5, RTO=37.5ms
        // 이전 ACK가 타이머를 다시 시작했다면 약 67.5ms
        assert!(waited >= Duration::from_millis(37), "{:?}", waited);
        assert!(waited < Duration::from_millis(45), "{:?}", waited);
        assert_eq!(report.stats.stale_acks, 1);
        assert_eq!(report.stats.timeouts, 1);
        assert_eq!(report.stats.retransmissions, 1);
    }
}
