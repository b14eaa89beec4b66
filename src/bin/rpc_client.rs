//! CFT Streaming RPC 클라이언트
//!
//! 파일을 `FileChunk` 스트림으로 업로드하고 서버 응답을 출력한다.
//!
//! 사용법:
//!   cargo run --release --bin cft-rpc-client -- <FILE> [OPTIONS]

use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cft::{Config, Error, RpcClient};

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
                    config.config.rpc_addr = args[i + 1]
                        .parse::<SocketAddr>()
                        .expect("유효한 주소 필요");
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!(
                    r#"CFT RPC Client - 스트리밍 업로드 클라이언트

사용법:
  cargo run --release --bin cft-rpc-client -- <FILE> [OPTIONS]

옵션:
  -s, --server <ADDR>   서버 주소 (기본: 127.0.0.1:50051)
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
        error!("업로드할 파일 경로 필요 (--help 참고)");
        std::process::exit(1);
    };

    let client = RpcClient::new(client_config.config);
    match client.upload_file(&path).await {
        Ok(response) if response.success => {
            info!("Server response: {}", response.message);
            Ok(())
        }
        Ok(response) => {
            warn!("Server response: {}", response.message);
            std::process::exit(1);
        }
        Err(e @ Error::SourceNotFound { .. }) => {
            error!("{}", e);
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}
