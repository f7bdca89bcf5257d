//! 재전송 타임아웃(RTO) 추정기
//!
//! Jacobson/Karels 방식:
//! - `estimated = (1-α)·estimated + α·sample`, α = 0.125
//! - `deviation = (1-β)·deviation + β·|sample - estimated|`, β = 0.25
//! - `timeout = clamp(estimated + 4·deviation, min, max)`
//!
//! 타임아웃 시에는 `backoff()`로 RTO를 2배로 늘린다. 이때 상한은 적용하지
//! 않는다. 상한은 다음 `update()`에서 다시 적용된다.

use std::time::Duration;

use crate::Config;

/// 평균 RTT 가중치
pub const ALPHA: f64 = 0.125;

/// 편차 가중치
pub const BETA: f64 = 0.25;

/// RTO 계산 시 편차 배수
pub const DEVIATION_WEIGHT: f64 = 4.0;

/// RTO 추정 상태 (송신자 전용)
#[derive(Debug, Clone)]
pub struct RtoEstimator {
    /// 평활 RTT (초)
    estimated_rtt: f64,

    /// RTT 편차 (초)
    deviation_rtt: f64,

    /// 현재 재전송 타임아웃
    current_timeout: Duration,

    min_timeout: Duration,
    max_timeout: Duration,
}

impl RtoEstimator {
    pub fn new(expected_rtt: Duration, min_timeout: Duration, max_timeout: Duration) -> Self {
        Self {
            estimated_rtt: expected_rtt.as_secs_f64(),
            deviation_rtt: 0.0,
            current_timeout: expected_rtt,
            min_timeout,
            max_timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.expected_rtt, config.min_timeout, config.max_timeout)
    }

    /// RTT 샘플 반영 후 새 타임아웃 반환
    pub fn update(&mut self, sample_rtt: Duration) -> Duration {
        let sample = sample_rtt.as_secs_f64();
        let difference = sample - self.estimated_rtt;

        self.estimated_rtt = self.estimated_rtt * (1.0 - ALPHA) + ALPHA * sample;
        self.deviation_rtt = self.deviation_rtt * (1.0 - BETA) + BETA * difference.abs();

        let raw = self.estimated_rtt + DEVIATION_WEIGHT * self.deviation_rtt;
        self.current_timeout = Duration::from_secs_f64(raw.max(0.0))
            .max(self.min_timeout)
            .min(self.max_timeout);
        self.current_timeout
    }

    /// 타임아웃 발생: RTO 2배 (상한 없음)
    pub fn backoff(&mut self) -> Duration {
        self.current_timeout = self.current_timeout.saturating_mul(2);
        self.current_timeout
    }

    pub fn timeout(&self) -> Duration {
        self.current_timeout
    }

    pub fn estimated_rtt(&self) -> Duration {
        Duration::from_secs_f64(self.estimated_rtt)
    }

    pub fn deviation_rtt(&self) -> Duration {
        Duration::from_secs_f64(self.deviation_rtt)
    }
}
