//! phonelink 리스너 (헤드셋측)
//!
//! 폰에서 오는 타입 패킷을 받아 로그로 출력한다.
//! - 알려진 데이터 타입(SensorData, UIEvent, ...)은 JSON으로 디코딩
//! - 사이드 채널(`IMG|`/`TXT|`) 수신 선택
//!
//! 사용법:
//!   cargo run --release --bin phonelink-listener -- [OPTIONS]
//!
//! 예시:
//!   # 기본 포트에서 수신
//!   cargo run --release --bin phonelink-listener
//!
//!   # 사이드 채널 + 이미지 저장
//!   cargo run --release --bin phonelink-listener -- --side-port 9982 --image-out frame.png

use std::future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use phonelink::payload::{
    data_types, ArCameraData, JsonSink, ObjectUpdateData, PinchEventData, SceneData, SensorData,
    UiEventData,
};
use phonelink::{Config, DataBus, DataSink, DataSource, SideChannel};

/// 리스너 설정
struct ListenerConfig {
    side_port: Option<u16>,
    image_out: Option<PathBuf>,
    duration: Option<Duration>,
    stats_interval: Duration,
    config: Config,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            side_port: None,
            image_out: None,
            duration: None,
            stats_interval: Duration::from_secs(5),
            config: Config::headset(),
        }
    }
}

fn parse_args() -> ListenerConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = ListenerConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    config.config.local_port = args[i + 1].parse().expect("유효한 포트 필요");
                    i += 1;
                }
            }
            "--side-port" => {
                if i + 1 < args.len() {
                    config.side_port = Some(args[i + 1].parse().expect("유효한 포트 필요"));
                    i += 1;
                }
            }
            "--image-out" | "-o" => {
                if i + 1 < args.len() {
                    config.image_out = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--raw-images" => {
                config.config.chunked_images = false;
            }
            "--duration" | "-d" => {
                if i + 1 < args.len() {
                    let secs: u64 = args[i + 1].parse().expect("유효한 숫자 필요");
                    config.duration = Some(Duration::from_secs(secs));
                    i += 1;
                }
            }
            "--queue" => {
                if i + 1 < args.len() {
                    config.config.inbound_queue_capacity =
                        Some(args[i + 1].parse().expect("유효한 숫자 필요"));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!(
                    r#"phonelink listener - 헤드셋측 수신기

폰에서 오는 타입 패킷을 받아 데이터 타입별로 로그를 남긴다.

사용법:
  cargo run --release --bin phonelink-listener -- [OPTIONS]

옵션:
  -p, --port <PORT>        수신 포트 (기본: 9981)
  --side-port <PORT>       사이드 채널(IMG|/TXT|) 수신 포트
  -o, --image-out <PATH>   마지막으로 받은 이미지 저장 경로
  --raw-images             IMG| 프레임을 청크 없이 통째로 받음
  -d, --duration <SECS>    지정 시간 후 종료 (기본: Ctrl+C까지)
  --queue <N>              수신 큐 용량 (기본: 무제한)
  -h, --help               이 도움말 출력

로그 레벨은 RUST_LOG로 조정 (예: RUST_LOG=phonelink=debug)
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

fn sinks() -> Vec<Arc<dyn DataSink>> {
    vec![
        Arc::new(JsonSink::new(data_types::SENSOR_DATA, |_: &str, data: SensorData| {
            info!(
                "SensorData: accel=({:.2}, {:.2}, {:.2}), heading={:.1}",
                data.acceleration.x, data.acceleration.y, data.acceleration.z, data.magnetic_heading
            );
            Ok(())
        })),
        Arc::new(JsonSink::new(data_types::UI_EVENT, |_: &str, event: UiEventData| {
            info!(
                "UIEvent: {} id={} value={}",
                event.event_type, event.element_id, event.value
            );
            Ok(())
        })),
        Arc::new(JsonSink::new(
            data_types::SCREEN_GESTURE,
            |_: &str, gesture: PinchEventData| {
                info!(
                    "ScreenGesture: {:?} distance={:.1}",
                    gesture.phase,
                    gesture.distance()
                );
                Ok(())
            },
        )),
        Arc::new(JsonSink::new(
            data_types::AR_CAMERA_DATA,
            |_: &str, camera: ArCameraData| {
                info!(
                    "ARCameraData: pos=({:.2}, {:.2}, {:.2})",
                    camera.position.x, camera.position.y, camera.position.z
                );
                Ok(())
            },
        )),
        Arc::new(JsonSink::new(
            data_types::OBJECT_UPDATE,
            |_: &str, update: ObjectUpdateData| {
                info!("ObjectUpdate: id={}", update.id);
                Ok(())
            },
        )),
        Arc::new(JsonSink::new(data_types::SCENE_DATA, |_: &str, scene: SceneData| {
            info!("SceneData: {} objects", scene.objects.len());
            Ok(())
        })),
    ]
}

async fn open_side_channel(
    port: u16,
    config: &Config,
    image_out: Option<PathBuf>,
) -> phonelink::Result<SideChannel> {
    let mut side = SideChannel::new(config.clone());
    side.on_text(|text| info!("TXT| {}", text));
    side.on_image(move |image: Bytes| {
        info!("IMG| {} bytes", image.len());
        if let Some(path) = &image_out {
            if let Err(e) = std::fs::write(path, &image) {
                warn!("이미지 저장 실패: {}: {}", path.display(), e);
            }
        }
    });

    let local = side.listen(port).await?;
    info!("사이드 채널 수신: {}", local);
    Ok(side)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let listener_config = parse_args();
    let config = listener_config.config.clone();

    info!("phonelink listener starting...");

    let mut bus = DataBus::new(config.clone(), Vec::<Arc<dyn DataSource>>::new(), sinks())?;
    let local = bus.listen().await?;
    info!("수신 대기: {}", local);

    let mut side = match listener_config.side_port {
        Some(port) => Some(open_side_channel(port, &config, listener_config.image_out.clone()).await?),
        None => None,
    };

    let deadline = async {
        match listener_config.duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut interval = tokio::time::interval(config.tick_interval());
    let mut last_stats = Instant::now();

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Ctrl+C 수신, 종료");
                break;
            }
            _ = &mut deadline => break,
            _ = interval.tick() => {
                bus.tick();
                if let Some(side) = side.as_mut() {
                    side.poll();
                }

                if last_stats.elapsed() >= listener_config.stats_interval {
                    info!("{}", bus.stats().summary());
                    last_stats = Instant::now();
                }
            }
        }
    }

    bus.shutdown().await;
    if let Some(side) = side.as_mut() {
        side.close().await;
    }

    let stats = bus.stats();
    info!("=== 수신 통계 ===");
    info!("{}", stats.summary());
    for (data_type, count) in &stats.received_by_type {
        info!("  {}: {}", data_type, count);
    }

    Ok(())
}
