//! CFT Raw Stream 서버 (수신자)
//!
//! TCP 연결 하나당 파일 하나를 받아 `received_<이름>` 으로 저장한다.
//! 연결은 하나씩 순서대로 처리한다.
//!
//! 사용법:
//!   cargo run --release --bin cft-raw-server -- [OPTIONS]

use std::net::SocketAddr;
use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cft::{Config, RawStreamServer};

fn parse_args() -> Config {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => {
                if i + 1 < args.len() {
                    config.raw_addr = args[i + 1]
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
            "--atomic" => {
                config.atomic_output = true;
            }
            "--help" | "-h" => {
                println!(
                    r#"CFT Raw Stream Server - 파일 수신 서버

TCP 연결마다 [이름 길이][파일 이름][데이터...] 를 받고
송신측이 연결을 닫으면 received_<이름> 으로 저장

사용법:
  cargo run --release --bin cft-raw-server -- [OPTIONS]

옵션:
  -b, --bind <ADDR>        바인드 주소 (기본: 127.0.0.1:65432)
  -o, --output-dir <DIR>   저장 디렉터리 (기본: .)
  --atomic                 .part 파일에 쓰고 완료 시 rename
  -h, --help               이 도움말 출력

로그 레벨은 RUST_LOG 로 조정 (기본: info)
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
    info!("CFT Raw Stream Server starting...");
    info!("Output dir: {:?}", config.output_dir);

    let cancel = CancellationToken::new();
    let server = RawStreamServer::new(config, cancel.clone());
    let listener = server.bind().await?;

    // Ctrl+C 로 종료
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("종료 요청 수신");
            cancel.cancel();
        }
    });

    let completed = server.serve(listener).await?;
    info!("Sessions completed: {}", completed);
    Ok(())
}
