//! # phonelink
//!
//! 폰 ↔ 헤드셋 간 데이터 타입 라우팅 UDP 메시지 버스
//!
//! ## 핵심 특징
//! - **타입 패킷**: `i32_le(타입 길이) ++ 데이터 타입 ++ 페이로드`, 데이터그램 하나에 프레임 하나
//! - **다대다 라우팅**: 데이터 타입별 싱크 목록, 소스는 전송 계층으로 중계
//! - **틱 기반 디스패치**: 비동기 수신 → 수신 큐 → 호스트 틱에서 동기 처리
//! - **청크 재조립**: 한 데이터그램을 넘는 페이로드(이미지 등)를 순서 무관하게 조립
//! - **사이드 채널**: `IMG|` / `TXT|` 태그 프레임
//! - **최선 노력 송신**: ACK, 재시도 없음

pub mod bus;
pub mod chunk;
pub mod codec;
pub mod config;
pub mod error;
pub mod payload;
pub mod queue;
pub mod registry;
pub mod side_channel;
pub mod source;
pub mod stats;
pub mod tick;
pub mod transport;

pub use bus::DataBus;
pub use chunk::{split_payload, Chunk, ChunkHeader, ChunkReassembler, ChunkSplitter};
pub use codec::{FrameCodec, TaggedCodec, TaggedFrame, TypedCodec, TypedPacket};
pub use config::Config;
pub use error::{Error, Result, SendPrecondition};
pub use queue::{InboundProducer, InboundQueue};
pub use registry::{DataSink, DataSource, Dispatch, Emitter, Registry};
pub use side_channel::SideChannel;
pub use source::SourceHandle;
pub use stats::{LinkStats, StatsSnapshot};
pub use tick::{TickLoop, TickReport};
pub use transport::{LinkState, Outbound, Transport};

/// 기본 로컬 포트
pub const DEFAULT_LOCAL_PORT: u16 = 9981;

/// 데이터그램 최대 크기 (수신 버퍼)
pub const MAX_DATAGRAM_SIZE: usize = 65535;

/// 기본 이미지 청크 크기 (바이트)
pub const DEFAULT_IMAGE_CHUNK_SIZE: usize = 1024;
