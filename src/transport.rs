//! 데이터그램 전송 계층
//!
//! 손실/재정렬이 있을 수 있는 best-effort 채널. 수신 타임아웃은 소켓 옵션이
//! 아니라 매 호출마다 인자로 전달한다.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::debug;

use crate::{Error, Result};

/// 데이터그램 송수신 추상화
#[async_trait]
pub trait Transport: Send + Sync {
    /// 데이터그램 하나를 `dest`로 전송
    async fn send_to(&self, datagram: &[u8], dest: SocketAddr) -> io::Result<usize>;

    /// 데이터그램 하나 수신
    ///
    /// `timeout`이 `None`이면 무기한 대기. 시간 내에 도착하지 않으면 `Ok(None)`.
    async fn recv_from(
        &self,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> io::Result<Option<(usize, SocketAddr)>>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send_to(&self, datagram: &[u8], dest: SocketAddr) -> io::Result<usize> {
        (**self).send_to(datagram, dest).await
    }

    async fn recv_from(
        &self,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> io::Result<Option<(usize, SocketAddr)>> {
        (**self).recv_from(buf, timeout).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        (**self).local_addr()
    }
}

/// tokio UDP 소켓 기반 전송
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// `addr`에 바인딩 (포트 0이면 OS가 할당)
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| Error::Bind { addr, source })?;
        debug!("UDP 소켓 바인딩: {}", socket.local_addr()?);
        Ok(Self { socket })
    }

    pub fn from_socket(socket: UdpSocket) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send_to(&self, datagram: &[u8], dest: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(datagram, dest).await
    }

    async fn recv_from(
        &self,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> io::Result<Option<(usize, SocketAddr)>> {
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.socket.recv_from(buf)).await {
                Ok(result) => result.map(Some),
                Err(_) => Ok(None),
            },
            None => self.socket.recv_from(buf).await.map(Some),
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}
