//! RFT 송신자 - stop-and-wait ARQ 파일 전송
//!
//! 사용법:
//!   rft-sender [OPTIONS] <RECEIVER_HOST> <RECEIVER_PORT> <FILE> <BYTES>
//!
//! 예시:
//!   # 파일 앞 1MB 전송
//!   cargo run --release --bin rft-sender -- 127.0.0.1 9000 data.bin 1048576
//!
//!   # 손실이 많은 링크
//!   cargo run --release --bin rft-sender -- --preset unstable host 9000 data.bin 1048576

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use rft::{Config, SenderSession, TransferStatus};

/// 송신자 실행 설정
struct SenderArgs {
    host: String,
    port: u16,
    file_path: PathBuf,
    bytes_to_transfer: u64,
    config: Config,
}

const USAGE: &str = r#"RFT Sender - stop-and-wait ARQ 파일 전송 (UDP)

파일 앞부분 BYTES 바이트를 청크 단위로 전송한다.
각 청크는 ACK를 받을 때까지 적응형 타임아웃으로 재전송된다.

사용법:
  rft-sender [OPTIONS] <RECEIVER_HOST> <RECEIVER_PORT> <FILE> <BYTES>

옵션:
  --preset <NAME>            default | lan | unstable
  --chunk-size <BYTES>       패킷당 최대 페이로드 (기본: 1016)
  --rtt <MS>                 초기 RTT 추정값 (기본: 50)
  --closing-attempts <N>     종료 패킷 최대 전송 횟수 (기본: 10)
  --closing-timeout <MS>     종료 ACK 대기 시간 (기본: 100)
  -h, --help                 이 도움말 출력

종료 코드:
  0  전송 및 종료 확인 완료
  2  데이터 전송 완료, 종료 ACK 미확인
  1  에러

로그 레벨은 RUST_LOG로 지정 (기본: info)
"#;

fn parse_args() -> Result<SenderArgs, String> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::default();
    let mut positional = Vec::new();

    // 프리셋을 먼저 적용해야 개별 옵션이 덮어쓸 수 있음
    if let Some(i) = args.iter().position(|a| a == "--preset") {
        let name = args.get(i + 1).ok_or("--preset 값 필요")?;
        config = preset(name)?;
    }

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--preset" => {
                i += 1;
            }
            "--chunk-size" => {
                config.chunk_max_bytes = value(&args, i)?;
                i += 1;
            }
            "--rtt" => {
                config.expected_rtt = Duration::from_millis(value(&args, i)?);
                i += 1;
            }
            "--closing-attempts" => {
                config.closing_max_attempts = value(&args, i)?;
                i += 1;
            }
            "--closing-timeout" => {
                config.closing_timeout = Duration::from_millis(value(&args, i)?);
                i += 1;
            }
            "--help" | "-h" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            other if other.starts_with('-') => {
                return Err(format!("알 수 없는 옵션: {}", other));
            }
            other => positional.push(other.to_string()),
        }
        i += 1;
    }

    if positional.len() != 4 {
        return Err(format!(
            "인자 4개 필요, {}개 받음\n\n{}",
            positional.len(),
            USAGE
        ));
    }

    Ok(SenderArgs {
        host: positional[0].clone(),
        port: positional[1]
            .parse()
            .map_err(|_| format!("잘못된 포트: {}", positional[1]))?,
        file_path: PathBuf::from(&positional[2]),
        bytes_to_transfer: positional[3]
            .parse()
            .map_err(|_| format!("잘못된 바이트 수: {}", positional[3]))?,
        config,
    })
}

fn value<T: std::str::FromStr>(args: &[String], i: usize) -> Result<T, String> {
    let raw = args
        .get(i + 1)
        .ok_or_else(|| format!("{} 값 필요", args[i]))?;
    raw.parse()
        .map_err(|_| format!("{} 값이 올바르지 않음: {}", args[i], raw))
}

fn preset(name: &str) -> Result<Config, String> {
    match name {
        "default" => Ok(Config::default()),
        "lan" => Ok(Config::lan()),
        "unstable" => Ok(Config::unstable_network()),
        other => Err(format!("알 수 없는 프리셋: {}", other)),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}", message);
            return Ok(ExitCode::from(1));
        }
    };

    info!("RFT Sender starting...");
    info!("Receiver: {}:{}", args.host, args.port);
    info!("File: {:?} ({} bytes)", args.file_path, args.bytes_to_transfer);
    info!("Chunk size: {} bytes", args.config.chunk_max_bytes);

    let SenderArgs {
        host,
        port,
        file_path,
        bytes_to_transfer,
        config,
    } = args;
    let outcome = async move {
        let mut session = SenderSession::connect(&host, port, config).await?;
        session.send_path(&file_path, bytes_to_transfer).await
    }
    .await;

    match outcome {
        Ok(report) => match report.status {
            TransferStatus::Complete { closing_attempts } => {
                info!(
                    "Transfer complete: {} data packets, closing confirmed after {} attempt(s)",
                    report.data_packets, closing_attempts
                );
                Ok(ExitCode::SUCCESS)
            }
            TransferStatus::Unconfirmed { closing_attempts } => {
                warn!(
                    "Data delivered but closing ack not received after {} attempt(s)",
                    closing_attempts
                );
                Ok(ExitCode::from(2))
            }
        },
        Err(e) => {
            error!("Transfer failed: {}", e);
            Ok(ExitCode::from(1))
        }
    }
}
