//! phonelink 송신기 (폰 시뮬레이터)
//!
//! 폰 앱 대신 SensorData / ARCameraData / UIEvent 를 주기적으로 보낸다.
//! 센서 값에는 약간의 노이즈를 섞는다.
//!
//! 사용법:
//!   cargo run --release --bin phonelink-sender -- [OPTIONS]
//!
//! 예시:
//!   # 로컬 리스너로 30Hz 송신
//!   cargo run --release --bin phonelink-sender -- --remote 127.0.0.1
//!
//!   # 이미지 한 장을 사이드 채널로 보내고 종료
//!   cargo run --release --bin phonelink-sender -- -r 127.0.0.1 --side-port 9982 --image frame.png --count 1

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use phonelink::payload::{
    data_types, ArCameraData, Quat, SensorData, UiEventData, UiEventType, Vec3,
};
use phonelink::{Config, DataBus, DataSink, DataSource, SideChannel, SourceHandle, DEFAULT_LOCAL_PORT};

/// 송신기 설정
struct SenderConfig {
    remote: String,
    remote_port: u16,
    rate_hz: u32,
    count: Option<u64>,
    side_port: Option<u16>,
    image: Option<PathBuf>,
    config: Config,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            remote: "127.0.0.1".to_string(),
            remote_port: DEFAULT_LOCAL_PORT,
            rate_hz: 30,
            count: None,
            side_port: None,
            image: None,
            config: Config::phone(),
        }
    }
}

fn parse_args() -> SenderConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = SenderConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--remote" | "-r" => {
                if i + 1 < args.len() {
                    config.remote = args[i + 1].clone();
                    i += 1;
                }
            }
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    config.remote_port = args[i + 1].parse().expect("유효한 포트 필요");
                    i += 1;
                }
            }
            "--rate" => {
                if i + 1 < args.len() {
                    config.rate_hz = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--count" | "-n" => {
                if i + 1 < args.len() {
                    config.count = Some(args[i + 1].parse().expect("유효한 숫자 필요"));
                    i += 1;
                }
            }
            "--side-port" => {
                if i + 1 < args.len() {
                    config.side_port = Some(args[i + 1].parse().expect("유효한 포트 필요"));
                    i += 1;
                }
            }
            "--image" | "-i" => {
                if i + 1 < args.len() {
                    config.image = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--chunk-size" => {
                if i + 1 < args.len() {
                    config.config.image_chunk_size = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--raw-images" => {
                config.config.chunked_images = false;
            }
            "--help" | "-h" => {
                println!(
                    r#"phonelink sender - 폰 시뮬레이터

SensorData / ARCameraData 를 주기적으로, UIEvent 를 1초마다 보낸다.

사용법:
  cargo run --release --bin phonelink-sender -- [OPTIONS]

옵션:
  -r, --remote <IP>        헤드셋 주소 (기본: 127.0.0.1)
  -p, --port <PORT>        헤드셋 포트 (기본: 9981)
  --rate <HZ>              송신 주기 (기본: 30)
  -n, --count <N>          N번 송신 후 종료 (기본: Ctrl+C까지)
  --side-port <PORT>       사이드 채널 포트 (이미지/텍스트)
  -i, --image <PATH>       시작 시 사이드 채널로 보낼 이미지
  --chunk-size <BYTES>     이미지 청크 크기 (기본: 1024)
  --raw-images             이미지를 청크 없이 한 프레임으로 보냄
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

/// 노이즈 섞인 센서 값
fn sample_sensor<R: Rng>(rng: &mut R, t: f32) -> SensorData {
    let mut noise = |scale: f32| rng.gen_range(-scale..scale);
    SensorData {
        acceleration: Vec3::new(noise(0.05), -1.0 + noise(0.05), noise(0.05)),
        gyroscope: Vec3::new(noise(0.01), (t * 0.5).sin() * 0.2, noise(0.01)),
        gravity: Vec3::new(0.0, -1.0, 0.0),
        device_attitude: Quat::new(0.0, (t * 0.25).sin(), 0.0, (t * 0.25).cos()),
        magnetic_heading: (t * 10.0) % 360.0,
        true_heading: (t * 10.0 + 3.0) % 360.0,
        heading_accuracy: 5.0 + noise(1.0),
    }
}

fn sample_camera(t: f32) -> ArCameraData {
    ArCameraData {
        position: Vec3::new(t.cos() * 0.3, 1.5, t.sin() * 0.3),
        rotation: Quat::new(0.0, (t * 0.5).sin(), 0.0, (t * 0.5).cos()),
    }
}

async fn send_image(
    sender_config: &SenderConfig,
    port: u16,
    path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let image = std::fs::read(path)?;
    let mut side = SideChannel::new(sender_config.config.clone());
    side.connect(&sender_config.remote, port, 0).await?;

    let sent = side.send_image(&image)?;
    side.send_text(&format!("ImageSent|{}", image.len()))?;
    info!("이미지 송신: {} ({} bytes, wire {} bytes)", path.display(), image.len(), sent);

    side.close().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let sender_config = parse_args();

    info!("phonelink sender starting...");
    info!("Remote: {}:{}", sender_config.remote, sender_config.remote_port);

    let sensor = Arc::new(SourceHandle::new(data_types::SENSOR_DATA));
    let camera = Arc::new(SourceHandle::new(data_types::AR_CAMERA_DATA));
    let ui = Arc::new(SourceHandle::new(data_types::UI_EVENT));
    let sources: Vec<Arc<dyn DataSource>> = vec![sensor.clone(), camera.clone(), ui.clone()];

    let mut bus = DataBus::new(
        sender_config.config.clone(),
        sources,
        Vec::<Arc<dyn DataSink>>::new(),
    )?;
    let local = bus
        .connect(&sender_config.remote, sender_config.remote_port)
        .await?;
    info!("로컬 주소: {}", local);

    if let (Some(port), Some(path)) = (sender_config.side_port, sender_config.image.as_ref()) {
        if let Err(e) = send_image(&sender_config, port, path).await {
            warn!("이미지 송신 실패: {}", e);
        }
    }

    let rate_hz = sender_config.rate_hz.max(1);
    let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / rate_hz as f64));
    let mut rng = rand::thread_rng();
    let mut sent = 0u64;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C 수신, 종료");
                break;
            }
            _ = interval.tick() => {
                // 링크 상태 변경을 소스에 반영
                bus.tick();

                let t = sent as f32 / rate_hz as f32;
                sensor.emit_json(&sample_sensor(&mut rng, t))?;
                camera.emit_json(&sample_camera(t))?;

                if sent % rate_hz as u64 == 0 {
                    let event = UiEventData::new(
                        UiEventType::ButtonClick,
                        "AlignButton",
                        sent.to_string(),
                    );
                    ui.emit_json(&event)?;
                }

                sent += 1;
                if sender_config.count.is_some_and(|count| sent >= count) {
                    break;
                }
            }
        }
    }

    bus.shutdown().await;

    let stats = bus.stats();
    info!("=== 송신 통계 ===");
    info!("{}", stats.summary());

    Ok(())
}
