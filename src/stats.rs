//! 전송 통계

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// 최근 RTT 샘플 보관 개수
const RTT_WINDOW: usize = 10;

/// 세션 전송 통계
///
/// 송신자와 수신자가 같은 구조를 쓰되 각자 해당하는 항목만 채운다.
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 종료 시간 (진행 중이면 None)
    pub finish_time: Option<Instant>,

    /// 데이터 패킷 전송 횟수 (송신측, 재전송 포함)
    pub packets_sent: u64,

    /// 기록한 데이터 패킷 수 (수신측)
    pub packets_received: u64,

    /// 재전송 횟수
    pub retransmissions: u64,

    /// ACK 대기 타임아웃 횟수
    pub timeouts: u64,

    /// 무시된 이전 시퀀스 ACK 수
    pub stale_acks: u64,

    /// 전송한 페이로드 바이트 (재전송 포함)
    pub bytes_sent: u64,

    /// 유효 바이트 (송신: ACK 확인된 바이트, 수신: 파일에 기록된 바이트)
    pub bytes_delivered: u64,

    /// 보낸 ACK 수 (수신측)
    pub acks_sent: u64,

    /// 중복 수신 패킷 수 (수신측, 재ACK 대상)
    pub duplicate_packets: u64,

    /// 순서 건너뛴 패킷 수 (수신측, 폐기)
    pub dropped_packets: u64,

    /// 헤더보다 짧은 데이터그램 수
    pub malformed_packets: u64,

    /// 종료 패킷 전송 횟수
    pub closing_attempts: u32,

    /// 최근 RTT 샘플
    rtt_samples: VecDeque<Duration>,
}

impl TransferStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            finish_time: None,
            packets_sent: 0,
            packets_received: 0,
            retransmissions: 0,
            timeouts: 0,
            stale_acks: 0,
            bytes_sent: 0,
            bytes_delivered: 0,
            acks_sent: 0,
            duplicate_packets: 0,
            dropped_packets: 0,
            malformed_packets: 0,
            closing_attempts: 0,
            rtt_samples: VecDeque::with_capacity(RTT_WINDOW),
        }
    }

    /// RTT 샘플 기록
    pub fn record_rtt(&mut self, rtt: Duration) {
        if self.rtt_samples.len() >= RTT_WINDOW {
            self.rtt_samples.pop_front();
        }
        self.rtt_samples.push_back(rtt);
    }

    /// 최근 RTT 평균
    pub fn average_rtt(&self) -> Option<Duration> {
        if self.rtt_samples.is_empty() {
            return None;
        }
        let total: Duration = self.rtt_samples.iter().sum();
        Some(total / self.rtt_samples.len() as u32)
    }

    /// 전송 종료 시간 기록
    pub fn finish(&mut self) {
        if self.finish_time.is_none() {
            self.finish_time = Some(Instant::now());
        }
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        match self.finish_time {
            Some(end) => end.duration_since(self.start_time),
            None => self.start_time.elapsed(),
        }
    }

    /// 유효 처리율 (bits/sec)
    pub fn throughput_bps(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        (self.bytes_delivered * 8) as f64 / elapsed
    }

    /// 유효 처리율 (Mb/s)
    pub fn throughput_mbps(&self) -> f64 {
        self.throughput_bps() / 1_000_000.0
    }

    /// 링크 용량 대비 사용률 (%)
    pub fn bandwidth_utilization(&self, link_capacity_bps: u64) -> f64 {
        if link_capacity_bps == 0 {
            return 0.0;
        }
        self.throughput_bps() / link_capacity_bps as f64 * 100.0
    }

    /// 재전송 비율
    pub fn retransmission_rate(&self) -> f64 {
        if self.packets_sent == 0 {
            return 0.0;
        }
        self.retransmissions as f64 / self.packets_sent as f64
    }

    /// 통계 요약 문자열
    pub fn summary(&self, link_capacity_bps: u64) -> String {
        format!(
            "Elapsed: {:.2}s | Bytes: {}/{} | Throughput: {:.2} Mb/s | Utilization: {:.2}% | Packets: {}/{} | Retransmits: {} ({:.1}%) | Timeouts: {}",
            self.elapsed().as_secs_f64(),
            self.bytes_delivered,
            self.bytes_sent,
            self.throughput_mbps(),
            self.bandwidth_utilization(link_capacity_bps),
            self.packets_sent,
            self.packets_received,
            self.retransmissions,
            self.retransmission_rate() * 100.0,
            self.timeouts,
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rtt_window() {
        let mut stats = TransferStats::new();
        assert!(stats.average_rtt().is_none());

        for ms in 1..=20u64 {
            stats.record_rtt(Duration::from_millis(ms));
        }
        // 마지막 10개(11..=20)의 평균
        assert_eq!(stats.average_rtt(), Some(Duration::from_micros(15_500)));
    }

    #[test]
    fn test_throughput_and_utilization() {
        let mut stats = TransferStats::new();
        stats.bytes_delivered = 2_621_440; // 20 Mbit
        stats.finish_time = Some(stats.start_time + Duration::from_secs(1));

        assert!((stats.throughput_bps() - 20_971_520.0).abs() < 1e-6);
        assert!((stats.bandwidth_utilization(20_971_520) - 100.0).abs() < 1e-9);
        assert_eq!(stats.bandwidth_utilization(0), 0.0);
    }

    #[test]
    fn test_retransmission_rate() {
        let mut stats = TransferStats::new();
        assert_eq!(stats.retransmission_rate(), 0.0);

        stats.packets_sent = 10;
        stats.retransmissions = 1;
        assert!((stats.retransmission_rate() - 0.1).abs() < 1e-9);
        assert!(stats.summary(1).contains("Retransmits: 1"));
        assert!(stats.summary(1).contains("Packets: 10/0"));
    }

    #[test]
    fn test_finish_is_sticky() {
        let mut stats = TransferStats::new();
        stats.finish();
        let first = stats.finish_time;
        std::thread::sleep(Duration::from_millis(2));
        stats.finish();
        assert_eq!(stats.finish_time, first);
    }
}
