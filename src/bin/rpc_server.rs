//! CFT Streaming RPC 서버
//!
//! `FileTransferService/UploadFile` 호출을 고정 크기 워커 풀로 처리한다.
//!
//! 사용법:
//!   cargo run --release --bin cft-rpc-server -- [OPTIONS]

use std::net::SocketAddr;
use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cft::{Config, RpcServer};

fn parse_args() -> Config {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => {
                if i + 1 < args.len() {
                    config.rpc_addr = args[i + 1]
                        .parse::<SocketAddr>()
                        .expect("유효한 주소 필요");
                    i += 1;
                }
            }
            "--output-dir" | "-o" => {
                if i + 1 < args.len() {
                    config.output_dir = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--workers" | "-w" => {
                if i + 1 < args.len() {
                    config.rpc_workers = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--atomic" => {
                config.atomic_output = true;
            }
            "--help" | "-h" => {
                println!(
                    r#"CFT RPC Server - 스트리밍 업로드 서버

사용법:
  cargo run --release --bin cft-rpc-server -- [OPTIONS]

옵션:
  -b, --bind <ADDR>        바인드 주소 (기본: 127.0.0.1:50051)
  -o, --output-dir <DIR>   저장 디렉터리 (기본: .)
  -w, --workers <N>        워커 수 (기본: 10)
  --atomic                 .part 파일에 쓰고 완료 시 rename
  -h, --help               이 도움말 출력
"#
                );
                std::process::exit(0);
            }
            _ => {}
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

    let config = parse_args();
    info!("CFT RPC Server starting...");
    info!("Workers: {}", config.rpc_workers);

    let cancel = CancellationToken::new();
    let server = RpcServer::new(config, cancel.clone());
    let listener = server.bind().await?;

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("종료 요청 수신");
            cancel.cancel();
        }
    });

    server.serve(listener).await?;
    Ok(())
}
