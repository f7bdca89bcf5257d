//! RFT 수신자 - stop-and-wait ARQ 파일 수신
//!
//! 사용법:
//!   rft-receiver [OPTIONS] <UDP_PORT> <FILE>
//!
//! 예시:
//!   cargo run --release --bin rft-receiver -- 9000 received.bin

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use rft::{Config, ReceiverSession};

/// 수신자 실행 설정
struct ReceiverArgs {
    port: u16,
    file_path: PathBuf,
    config: Config,
}

const USAGE: &str = r#"RFT Receiver - stop-and-wait ARQ 파일 수신 (UDP)

종료 패킷을 받을 때까지 수신한 데이터를 순서대로 FILE에 기록한다.
기존 파일은 덮어쓴다.

사용법:
  rft-receiver [OPTIONS] <UDP_PORT> <FILE>

옵션:
  --linger <MS>          종료 후 재전송된 종료 패킷에 응답하는 시간 (기본: 0)
  -h, --help             이 도움말 출력

로그 레벨은 RUST_LOG로 지정 (기본: info)
"#;

fn parse_args() -> Result<ReceiverArgs, String> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::default();
    let mut positional = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--linger" => {
                config.closing_linger = Duration::from_millis(value(&args, i)?);
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

    if positional.len() != 2 {
        return Err(format!(
            "인자 2개 필요, {}개 받음\n\n{}",
            positional.len(),
            USAGE
        ));
    }

    Ok(ReceiverArgs {
        port: positional[0]
            .parse()
            .map_err(|_| format!("잘못된 포트: {}", positional[0]))?,
        file_path: PathBuf::from(&positional[1]),
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

    info!("RFT Receiver starting...");
    info!("Output: {:?}", args.file_path);

    let ReceiverArgs {
        port,
        file_path,
        config,
    } = args;
    let outcome = async move {
        let mut session = ReceiverSession::bind(port, config).await?;
        info!("Listening on {}", session.local_addr()?);
        session.receive_to_path(&file_path).await
    }
    .await;

    match outcome {
        Ok(report) => {
            info!(
                "Received {} bytes in {} packets from {}",
                report.stats.bytes_delivered, report.data_packets, report.peer
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("Receive failed: {}", e);
            Ok(ExitCode::from(1))
        }
    }
}
