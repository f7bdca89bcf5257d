//! 수신자 상태 머신
//!
//! 단일 수신 루프. 순서가 맞지 않는 데이터는 버퍼링하지 않는다.
//! 송신측 윈도우가 1이므로 `next_expected` 하나로 순서와 중복이 모두 걸러진다.
//!
//! | 수신 패킷                    | 처리                              |
//! |------------------------------|-----------------------------------|
//! | 종료 패킷                    | 종료 ACK 1회 전송 후 루프 종료    |
//! | seq == next_expected         | 기록, ACK, next_expected 증가     |
//! | seq <  next_expected         | 기록 없이 ACK만 재전송            |
//! | seq >  next_expected         | 폐기 (ACK 없음)                   |

use std::net::SocketAddr;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, trace, warn};

use crate::config::MAX_DATAGRAM_SIZE;
use crate::packet::{Packet, PacketHeader, PacketKind, SequenceNumber};
use crate::stats::TransferStats;
use crate::transport::Transport;
use crate::{Config, Error, Result};

/// 수신 패킷 처리 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// 새 데이터: 기록 후 ACK
    Deliver,

    /// 이미 받은 데이터: ACK만 재전송
    Reack,

    /// 앞선 데이터 또는 데이터가 아닌 패킷: 폐기
    Drop,

    /// 종료 패킷: 종료 ACK 후 종료
    Finish,
}

/// 헤더와 다음 기대 시퀀스로 처리 방식 결정
pub fn classify(header: &PacketHeader, next_expected: SequenceNumber) -> Disposition {
    match header.kind() {
        PacketKind::Closing => Disposition::Finish,
        PacketKind::DataAck | PacketKind::ClosingAck => Disposition::Drop,
        PacketKind::Data => {
            if header.sequence_number == next_expected {
                Disposition::Deliver
            } else if header.sequence_number < next_expected {
                Disposition::Reack
            } else {
                Disposition::Drop
            }
        }
    }
}

/// 수신 결과
#[derive(Debug, Clone)]
pub struct ReceiveReport {
    /// 종료 패킷의 시퀀스 번호
    pub closing_sequence: SequenceNumber,

    /// 기록한 데이터 패킷 수
    pub data_packets: SequenceNumber,

    /// 송신자 주소 (종료 패킷 기준)
    pub peer: SocketAddr,

    pub stats: TransferStats,
}

/// 수신자
pub struct Receiver<T> {
    config: Config,
    transport: T,
    next_expected: SequenceNumber,
    stats: TransferStats,
    recv_buf: Vec<u8>,
}

impl<T: Transport> Receiver<T> {
    /// 새 수신자 생성
    pub fn new(config: Config, transport: T) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            // 청크 크기가 다른 송신자의 데이터그램도 잘리지 않도록 최대 크기
            recv_buf: vec![0u8; MAX_DATAGRAM_SIZE],
            config,
            transport,
            next_expected: 0,
            stats: TransferStats::new(),
        })
    }

    pub fn next_expected(&self) -> SequenceNumber {
        self.next_expected
    }

    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.transport.local_addr()?)
    }

    /// 종료 패킷이 올 때까지 수신하여 `sink`에 순서대로 기록
    ///
    /// 수신 대기에는 타임아웃이 없다. 송신자가 사라지면 프로세스가 종료될
    /// 때까지 기다린다.
    pub async fn receive<W>(&mut self, mut sink: W) -> Result<ReceiveReport>
    where
        W: AsyncWrite + Unpin,
    {
        info!("수신 대기: {}", self.transport.local_addr()?);

        loop {
            let (len, from) = match self.transport.recv_from(&mut self.recv_buf, None).await? {
                Some(received) => received,
                None => continue,
            };

            let packet = match Packet::decode(&self.recv_buf[..len]) {
                Ok(packet) => packet,
                Err(e) => {
                    self.stats.malformed_packets += 1;
                    warn!("잘못된 패킷 무시 ({}): {}", from, e);
                    continue;
                }
            };
            let sequence = packet.sequence_number();

            match classify(&packet.header, self.next_expected) {
                Disposition::Deliver => {
                    sink.write_all(&packet.payload)
                        .await
                        .map_err(Error::WriteFailed)?;
                    self.stats.bytes_delivered += packet.payload.len() as u64;
                    self.stats.packets_received += 1;
                    trace!("seq={} 기록: {} bytes", sequence, packet.payload.len());

                    self.send_ack(Packet::ack(sequence), from).await;
                    self.next_expected = self.next_expected.wrapping_add(1);
                }
                Disposition::Reack => {
                    self.stats.duplicate_packets += 1;
                    debug!(
                        "중복 패킷 seq={} (기대 seq={}), ACK 재전송",
                        sequence, self.next_expected
                    );
                    self.send_ack(Packet::ack(sequence), from).await;
                }
                Disposition::Drop => {
                    self.stats.dropped_packets += 1;
                    debug!(
                        "{} seq={} 폐기 (기대 seq={})",
                        packet.kind(),
                        sequence,
                        self.next_expected
                    );
                }
                Disposition::Finish => {
                    sink.flush().await.map_err(Error::WriteFailed)?;
                    info!("마지막 패킷 수신: seq={}", sequence);
                    self.send_ack(Packet::closing_ack(sequence), from).await;

                    if !self.config.closing_linger.is_zero() {
                        self.linger().await?;
                    }

                    self.stats.finish();
                    info!("{}", self.stats.summary(self.config.link_capacity_bps));

                    return Ok(ReceiveReport {
                        closing_sequence: sequence,
                        data_packets: self.next_expected,
                        peer: from,
                        stats: self.stats.clone(),
                    });
                }
            }
        }
    }

    /// 종료 후 대기: 재전송된 종료 패킷과 늦은 중복 데이터에만 응답
    async fn linger(&mut self) -> Result<()> {
        let linger = self.config.closing_linger;
        debug!("종료 후 {:?} 동안 대기", linger);

        while let Some((len, from)) = self
            .transport
            .recv_from(&mut self.recv_buf, Some(linger))
            .await?
        {
            let header = match PacketHeader::decode(&self.recv_buf[..len]) {
                Ok(header) => header,
                Err(_) => continue,
            };

            match classify(&header, self.next_expected) {
                Disposition::Finish => {
                    debug!("종료 패킷 재수신: seq={}", header.sequence_number);
                    self.send_ack(Packet::closing_ack(header.sequence_number), from)
                        .await;
                }
                Disposition::Reack => {
                    self.send_ack(Packet::ack(header.sequence_number), from).await;
                }
                Disposition::Deliver | Disposition::Drop => {}
            }
        }

        Ok(())
    }

    /// ACK 전송 (실패해도 계속: 송신측 재전송으로 복구됨)
    async fn send_ack(&mut self, ack: Packet, to: SocketAddr) {
        let datagram = match ack.encode() {
            Ok(datagram) => datagram,
            Err(e) => {
                warn!("ACK 직렬화 실패: {}", e);
                return;
            }
        };

        match self.transport.send_to(&datagram, to).await {
            Ok(_) => self.stats.acks_sent += 1,
            Err(e) => warn!("ACK 전송 실패 seq={}: {}", ack.sequence_number(), e),
        }
    }
}
