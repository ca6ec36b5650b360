//! 태그 사이드 채널
//!
//! `TXT|` 텍스트 명령과 `IMG|` 이미지 전송용 좁은 채널.
//! 이미지는 청크 조각으로 나눠 보내고 받는 쪽에서 재조립한다 (`chunked_images`).

use std::net::SocketAddr;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::chunk::{ChunkReassembler, ChunkSplitter};
use crate::codec::{TaggedCodec, TaggedFrame};
use crate::queue::InboundQueue;
use crate::stats::LinkStats;
use crate::transport::{LinkState, Transport};
use crate::{Config, Error, Result};

type TextCallback = Box<dyn FnMut(&str) + Send>;
type ImageCallback = Box<dyn FnMut(Bytes) + Send>;

/// 한 번의 poll 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SideChannelReport {
    pub texts: usize,
    pub images: usize,
    /// 재조립 중 버린 조각 수
    pub dropped_fragments: usize,
}

/// 사이드 채널 엔드포인트
pub struct SideChannel {
    transport: Transport<TaggedCodec>,
    queue: InboundQueue<TaggedFrame>,
    reassembler: ChunkReassembler,
    splitter: ChunkSplitter,
    chunked_images: bool,
    on_text: Option<TextCallback>,
    on_image: Option<ImageCallback>,
}

impl SideChannel {
    pub fn new(config: Config) -> Self {
        let reassembler = ChunkReassembler::new().with_stall_timeout(config.stall_timeout());
        let splitter = ChunkSplitter::new(config.image_chunk_size);
        let chunked_images = config.chunked_images;
        let (transport, queue) = Transport::with_queue(TaggedCodec, config);

        Self {
            transport,
            queue,
            reassembler,
            splitter,
            chunked_images,
            on_text: None,
            on_image: None,
        }
    }

    /// 로컬 포트에서 수신 시작
    pub async fn listen(&self, local_port: u16) -> Result<SocketAddr> {
        self.transport.initialize_local(local_port).await
    }

    /// 원격 엔드포인트와 함께 시작
    pub async fn connect(
        &self,
        remote_address: &str,
        remote_port: u16,
        local_port: u16,
    ) -> Result<SocketAddr> {
        self.transport
            .initialize_with_remote(remote_address, remote_port, local_port)
            .await
    }

    pub fn set_remote_endpoint(&self, address: &str, port: u16) -> Result<()> {
        self.transport.set_remote_endpoint(address, port)
    }

    /// 텍스트 수신 콜백
    pub fn on_text<F>(&mut self, callback: F)
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.on_text = Some(Box::new(callback));
    }

    /// 이미지 수신 콜백 (재조립 완료 후)
    pub fn on_image<F>(&mut self, callback: F)
    where
        F: FnMut(Bytes) + Send + 'static,
    {
        self.on_image = Some(Box::new(callback));
    }

    /// 텍스트 송신
    pub fn send_text(&self, text: &str) -> Result<usize> {
        self.transport.send_text(text)
    }

    /// 이미지 송신
    ///
    /// 청크 모드면 조각마다 `IMG|` 프레임 하나. 보낸 바이트 합계를 돌려준다.
    ///
    /// 전제조건은 첫 조각 전에 한 번만 본다. 그 뒤로는 중간에 실패해도 나머지
    /// 조각을 모두 보내고 실패 수를 [`Error::IncompleteSend`]로 알린다.
    pub fn send_image(&self, image: &[u8]) -> Result<usize> {
        if !self.chunked_images {
            return self
                .transport
                .send_tagged(&TaggedFrame::Image(Bytes::copy_from_slice(image)));
        }

        let fragments = self.splitter.split_datagrams(image)?;
        self.transport.check_ready()?;

        let total = fragments.len();
        let mut sent = 0;
        let mut failed = 0;
        for fragment in fragments {
            match self.transport.send_tagged(&TaggedFrame::Image(fragment)) {
                Ok(bytes) => sent += bytes,
                Err(_) => failed += 1,
            }
        }

        if failed > 0 {
            warn!("이미지 송신 일부 실패: {}/{} fragments", failed, total);
            return Err(Error::IncompleteSend { failed, total });
        }
        debug!("이미지 송신: {} bytes, {} fragments", image.len(), total);
        Ok(sent)
    }

    /// 수신된 프레임 처리
    ///
    /// 호스트 틱에서 호출한다. 콜백은 여기서만 불린다.
    pub fn poll(&mut self) -> SideChannelReport {
        let mut report = SideChannelReport::default();

        for frame in self.queue.drain() {
            match frame {
                TaggedFrame::Text(text) => {
                    report.texts += 1;
                    debug!("텍스트 수신: {}", text);
                    if let Some(callback) = self.on_text.as_mut() {
                        callback(&text);
                    }
                }
                TaggedFrame::Image(content) => {
                    let image = if self.chunked_images {
                        match self.reassembler.receive(&content) {
                            Ok(image) => image,
                            Err(e) => {
                                report.dropped_fragments += 1;
                                warn!("이미지 조각 드롭: {}", e);
                                None
                            }
                        }
                    } else {
                        Some(content)
                    };

                    if let Some(image) = image {
                        report.images += 1;
                        info!("이미지 수신: {} bytes", image.len());
                        if let Some(callback) = self.on_image.as_mut() {
                            callback(image);
                        }
                    }
                }
            }
        }

        report
    }

    /// 수신 정지, 진행 중인 이미지 폐기
    pub async fn close(&mut self) {
        self.transport.shutdown().await;
        self.reassembler.reset();
    }

    pub fn link_state(&self) -> LinkState {
        self.transport.link_state()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn stats(&self) -> &std::sync::Arc<LinkStats> {
        self.transport.stats()
    }

    /// 재조립 상태
    pub fn reassembler(&self) -> &ChunkReassembler {
        &self.reassembler
    }
}
