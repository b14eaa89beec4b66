//! CFT Raw Stream 클라이언트 (송신자)
//!
//! 파일 이름을 보낸 뒤 내용을 4096 바이트씩 쓰고 연결을 닫는다.
//!
//! 사용법:
//!   cargo run --release --bin cft-raw-client -- <FILE> [OPTIONS]

use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cft::{Config, Error, RawStreamClient};

/// 클라이언트 설정
struct ClientConfig {
    file_path: Option<PathBuf>,
    config: Config,
}

fn parse_args() -> ClientConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = ClientConfig {
        file_path: None,
        config: Config::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--server" | "-s" => {
                if i + 1 < args.len() {
                    config.config.raw_addr = args[i + 1]
                        .parse::<SocketAddr>()
                        .expect("유효한 주소 필요");
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!(
                    r#"CFT Raw Stream Client - 파일 송신 클라이언트

사용법:
  cargo run --release --bin cft-raw-client -- <FILE> [OPTIONS]

옵션:
  -s, --server <ADDR>   서버 주소 (기본: 127.0.0.1:65432)
  -h, --help            이 도움말 출력
"#
                );
                std::process::exit(0);
            }
            path => {
                config.file_path = Some(PathBuf::from(path));
            }
        }
        i += 1;
    }

    config
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let client_config = parse_args();
    let Some(path) = client_config.file_path else {
        error!("전송할 파일 경로 필요 (--help 참고)");
        std::process::exit(1);
    };

    let client = RawStreamClient::new(client_config.config);
    match client.send_file(&path).await {
        Ok(stats) => {
            info!("Transfer complete: {}", stats.summary());
            Ok(())
        }
        Err(e @ Error::SourceNotFound { .. }) => {
            // 서버에는 알리지 않는다
            error!("{}", e);
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}
