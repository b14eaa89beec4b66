//! CFT Message Passing 전송
//!
//! 프로세스 안에 N 개의 rank 를 스레드로 띄운다.
//! rank 0 이 파일을 보내고 rank 1 이 `mpi_recv_<이름>` 으로 저장한다.
//!
//! 사용법:
//!   cargo run --release --bin cft-mpi-transfer -- <FILE> [OPTIONS]

use std::path::PathBuf;
use std::thread;

use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cft::message_passing::{run_rank, RankOutcome};
use cft::{Config, ReceiveOutcome, World};

/// 실행 설정
struct MpiConfig {
    ranks: usize,
    file_path: Option<PathBuf>,
    config: Config,
}

fn parse_args() -> MpiConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = MpiConfig {
        ranks: 2,
        file_path: None,
        config: Config::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--ranks" | "-n" => {
                if i + 1 < args.len() {
                    config.ranks = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--output-dir" | "-o" => {
                if i + 1 < args.len() {
                    config.config.output_dir = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--atomic" => {
                config.config.atomic_output = true;
            }
            "--help" | "-h" => {
                println!(
                    r#"CFT Message Passing Transfer

사용법:
  cargo run --release --bin cft-mpi-transfer -- <FILE> [OPTIONS]

옵션:
  -n, --ranks <N>          rank 수 (기본: 2, 최소 2)
  -o, --output-dir <DIR>   저장 디렉터리 (기본: .)
  --atomic                 .part 파일에 쓰고 완료 시 rename
  -h, --help               이 도움말 출력
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

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_thread_names(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mpi_config = parse_args();
    let world = World::new(mpi_config.ranks)?;
    info!("World size: {}", world.len());

    let mut handles = Vec::with_capacity(world.len());
    for comm in world {
        let file = mpi_config.file_path.clone();
        let config = mpi_config.config.clone();

        let handle = thread::Builder::new()
            .name(format!("rank-{}", comm.rank()))
            .spawn(move || run_rank(&comm, file.as_deref(), &config))?;
        handles.push(handle);
    }

    let mut failed = false;
    for (rank, handle) in handles.into_iter().enumerate() {
        match handle.join() {
            Ok(Ok(RankOutcome::Sent(stats))) => info!(rank, "송신 완료: {}", stats.summary()),
            Ok(Ok(RankOutcome::Received(ReceiveOutcome::Received(received)))) => {
                info!(rank, "수신 완료: {:?} ({} bytes)", received.path, received.bytes)
            }
            Ok(Ok(RankOutcome::Received(ReceiveOutcome::Aborted))) => {
                info!(rank, "송신측 중단으로 종료")
            }
            Ok(Ok(RankOutcome::Idle)) => {}
            Ok(Err(e)) => {
                error!(rank, "실패: {}", e);
                failed = true;
            }
            Err(_) => {
                error!(rank, "스레드 패닉");
                failed = true;
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
    Ok(())
}
