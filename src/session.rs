//! 파일 전송 세션
//!
//! 주소 해석, 소켓 바인딩, 파일 열기를 묶어서 실행 파일과 통합 테스트가
//! 같은 경로로 전송을 시작하도록 한다.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;

use tokio::fs::File;
use tokio::io::{BufReader, BufWriter};
use tracing::{debug, info};

use crate::receiver::{ReceiveReport, Receiver};
use crate::sender::{Sender, TransferReport};
use crate::transport::{Transport, UdpTransport};
use crate::{Config, Error, Result};

/// 호스트 이름 해석 (IPv4 우선)
pub async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|source| Error::AddressResolution {
            host: host.to_string(),
            source,
        })?
        .collect();

    let chosen = addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| Error::NoAddress {
            host: host.to_string(),
        })?;

    debug!("{}:{} -> {}", host, port, chosen);
    Ok(chosen)
}

/// 피어 주소와 같은 계열의 임의 포트 주소
fn unspecified_for(peer: &SocketAddr) -> SocketAddr {
    match peer {
        SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
    }
}

/// 송신 세션
pub struct SenderSession {
    sender: Sender<UdpTransport>,
}

impl SenderSession {
    /// 수신자 주소를 해석하고 임시 포트에 바인딩
    pub async fn connect(host: &str, port: u16, config: Config) -> Result<Self> {
        let peer = resolve(host, port).await?;
        let transport = UdpTransport::bind(unspecified_for(&peer)).await?;
        info!("수신자: {} (로컬 {})", peer, transport.local_addr()?);

        Ok(Self {
            sender: Sender::new(config, transport, peer)?,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.sender.peer()
    }

    /// 파일 앞부분 `bytes_to_transfer` 바이트 전송
    pub async fn send_path(
        &mut self,
        path: impl AsRef<Path>,
        bytes_to_transfer: u64,
    ) -> Result<TransferReport> {
        let path = path.as_ref();
        let file = File::open(path).await.map_err(|source| Error::FileOpen {
            path: path.to_path_buf(),
            source,
        })?;

        info!("전송 시작: {:?} ({} bytes)", path, bytes_to_transfer);
        self.sender.send(BufReader::new(file), bytes_to_transfer).await
    }
}

/// 수신 세션
pub struct ReceiverSession {
    receiver: Receiver<UdpTransport>,
}

impl ReceiverSession {
    /// 모든 인터페이스의 `port`에 바인딩 (0이면 OS가 할당)
    pub async fn bind(port: u16, config: Config) -> Result<Self> {
        let transport = UdpTransport::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))).await?;
        Ok(Self {
            receiver: Receiver::new(config, transport)?,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.receiver.local_addr()
    }

    /// 종료 패킷까지 수신하여 `path`에 기록 (기존 파일은 덮어씀)
    pub async fn receive_to_path(&mut self, path: impl AsRef<Path>) -> Result<ReceiveReport> {
        let path = path.as_ref();
        let file = File::create(path).await.map_err(|source| Error::FileOpen {
            path: path.to_path_buf(),
            source,
        })?;

        let report = self.receiver.receive(BufWriter::new(file)).await?;
        info!("수신 완료: {:?} ({} bytes)", path, report.stats.bytes_delivered);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_literal_and_localhost() {
        let addr = resolve("127.0.0.1", 9000).await.unwrap();
        assert_eq!(addr, "127.0.0.1:9000".parse().unwrap());

        let addr = resolve("localhost", 9001).await.unwrap();
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 9001);
    }

    #[tokio::test]
    async fn test_resolve_failure() {
        let result = resolve("no-such-host.invalid", 9000).await;
        assert!(matches!(
            result,
            Err(Error::AddressResolution { .. }) | Err(Error::NoAddress { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_file_is_reported() {
        let mut session = SenderSession::connect("127.0.0.1", 9, Config::default())
            .await
            .unwrap();
        let result = session.send_path("/nonexistent/rft/input.bin", 10).await;
        assert!(matches!(result, Err(Error::FileOpen { .. })));
    }
}
