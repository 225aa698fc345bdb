//! imgstream 데모 - 로컬 파일을 청크 단위로 스트리밍
//!
//! 프로바이더 스레드가 입력 파일을 청크로 나누어 섞인 순서로 전달하고,
//! 스트리머가 이를 출력 파일에 기록. 완료 후 CRC32로 결과 검증
//!
//! 사용법:
//!   cargo run --release --bin stream-demo -- [OPTIONS]
//!
//! 예시:
//!   cargo run --release --bin stream-demo -- --input app.bin --output out.bin
//!   cargo run --release --bin stream-demo -- -i app.bin -o out.bin --chunk-size 512 --slots 4

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use rand::seq::SliceRandom;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use imgstream::{ChunkId, ChunkInfo, Config, Error, FileSink, SessionId, Streamer};

/// 데모 설정
struct DemoConfig {
    input_path: Option<PathBuf>,
    output_path: PathBuf,
    chunk_size: usize,
    config: Config,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            input_path: None,
            output_path: PathBuf::from("received.bin"),
            chunk_size: 1024,
            config: Config::default(),
        }
    }
}

fn parse_args() -> DemoConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = DemoConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--input" | "-i" => {
                if i + 1 < args.len() {
                    config.input_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--output" | "-o" => {
                if i + 1 < args.len() {
                    config.output_path = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--chunk-size" => {
                if i + 1 < args.len() {
                    config.chunk_size = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--slots" => {
                if i + 1 < args.len() {
                    config.config.max_chunks = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--timeout-ms" => {
                if i + 1 < args.len() {
                    config.config.inter_chunk_timeout_ms =
                        args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--period-ms" => {
                if i + 1 < args.len() {
                    config.config.requesting_period_ms =
                        args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!(
                    r#"stream-demo - 청크 기반 이미지 스트리밍 데모

입력 파일을 청크로 나누어 임의 순서로 전달하고 출력 파일로 재조립

사용법:
  cargo run --release --bin stream-demo -- [OPTIONS]

옵션:
  -i, --input <PATH>     입력 이미지 (없으면 1MB 테스트 데이터 생성)
  -o, --output <PATH>    출력 경로 (기본: received.bin)
  --chunk-size <BYTES>   청크 크기 (기본: 1024)
  --slots <N>            청크 슬롯 수 (기본: 8)
  --timeout-ms <MS>      청크 간 타임아웃 (기본: 5000)
  --period-ms <MS>       이미지 재요청 주기 (기본: 1000)
  -h, --help             이 도움말 출력
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

/// 테스트용 이미지 생성
fn generate_image(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

/// 프로바이더: 청크를 섞인 순서로 전달, Busy면 상태 조회로 슬롯을 비우고 재시도
fn provide(streamer: &Streamer, session_id: SessionId, image: &Bytes, chunk_size: usize) {
    let mut order: Vec<usize> = (0..image.len().div_ceil(chunk_size)).collect();
    order.shuffle(&mut rand::thread_rng());

    let mut statuses = vec![ChunkInfo::default(); streamer.capacity()];
    let last = order.len().saturating_sub(1);

    for (n, &index) in order.iter().enumerate() {
        let start = index * chunk_size;
        let end = (start + chunk_size).min(image.len());
        // 원본 버퍼를 공유 (복사 없음)
        let data = image.slice(start..end);

        loop {
            match streamer.chunk_enqueue(
                session_id,
                index as ChunkId,
                start as u64,
                data.clone(),
                n == last,
            ) {
                Ok(()) => break,
                Err(Error::Busy) => {
                    if let Err(e) = streamer.chunk_status_req(session_id, &mut statuses) {
                        warn!("상태 조회 실패: {}", e);
                        return;
                    }
                    thread::sleep(Duration::from_micros(100));
                }
                Err(e) => {
                    warn!("청크 전달 중단: chunk={}, {}", index, e);
                    return;
                }
            }
        }
    }

    info!("프로바이더: {} 청크 전달 완료", order.len());
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let demo = parse_args();
    if demo.chunk_size == 0 {
        return Err("chunk-size는 0일 수 없음".into());
    }

    let image = match &demo.input_path {
        Some(path) => Bytes::from(std::fs::read(path)?),
        None => Bytes::from(generate_image(1024 * 1024)),
    };
    if image.is_empty() {
        return Err("빈 입력 이미지".into());
    }
    let expected_crc = crc32fast::hash(&image);

    info!(
        "이미지: {} bytes, CRC32 {:08X}, 청크 {} bytes, 슬롯 {}",
        image.len(),
        expected_crc,
        demo.chunk_size,
        demo.config.max_chunks
    );

    let streamer = Arc::new(Streamer::new(demo.config.clone())?);

    // 누락 이미지 요청 -> 프로바이더 스레드로 세션 ID 전달
    let (request_tx, request_rx) = crossbeam_channel::unbounded::<SessionId>();
    streamer.subscribe_missing_image(move |resource_id, session_id| {
        info!(
            "이미지 요청: resource={}, session={}",
            String::from_utf8_lossy(resource_id),
            session_id
        );
        let _ = request_tx.send(session_id);
    })?;

    let provider_streamer = streamer.clone();
    let provider_image = image.clone();
    let chunk_size = demo.chunk_size;
    let provider = thread::spawn(move || {
        if let Ok(session_id) = request_rx.recv() {
            provide(&provider_streamer, session_id, &provider_image, chunk_size);
        }
    });

    let mut sink = FileSink::create(&demo.output_path)?;
    let result = streamer.stream_default(b"demo-image", &mut sink);
    streamer.unsubscribe_missing_image();
    let _ = provider.join();

    let stats = match result {
        Ok(stats) => stats,
        Err(e) => {
            error!("스트리밍 실패: {}", e);
            return Err(e.into());
        }
    };
    sink.sync()?;

    info!("{}", stats.summary());

    let written = std::fs::read(&demo.output_path)?;
    let actual_crc = crc32fast::hash(&written);
    if written.len() == image.len() && actual_crc == expected_crc {
        info!("검증 성공: CRC32 {:08X}", actual_crc);
        Ok(())
    } else {
        error!(
            "검증 실패: expected {} bytes / {:08X}, got {} bytes / {:08X}",
            image.len(),
            expected_crc,
            written.len(),
            actual_crc
        );
        Err("출력 이미지 불일치".into())
    }
}
