//! 수신 큐
//!
//! 수신 태스크(다수 생산자)에서 틱 루프(단일 소비자)로 디코딩된 패킷을 넘긴다.
//! 양쪽 모두 블로킹하지 않는다.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::warn;

use crate::{Error, Result};

/// 큐 생산자 (복제 가능)
#[derive(Debug)]
pub struct InboundProducer<T> {
    tx: Sender<T>,
}

impl<T> Clone for InboundProducer<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> InboundProducer<T> {
    /// 패킷 삽입 (논블로킹)
    ///
    /// 용량 제한 큐가 가득 차면 새 패킷을 버리고 `Ok(false)`를 돌려준다.
    pub fn push(&self, item: T) -> Result<bool> {
        match self.tx.try_send(item) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => {
                warn!("수신 큐가 가득 참, 패킷 드롭");
                Ok(false)
            }
            Err(TrySendError::Disconnected(_)) => Err(Error::QueueClosed),
        }
    }
}

/// 큐 소비자
#[derive(Debug)]
pub struct InboundQueue<T> {
    rx: Receiver<T>,
}

impl<T> InboundQueue<T> {
    /// 무제한 큐 생성
    pub fn unbounded() -> (InboundProducer<T>, Self) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (InboundProducer { tx }, Self { rx })
    }

    /// 용량 제한 큐 생성
    pub fn bounded(capacity: usize) -> (InboundProducer<T>, Self) {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        (InboundProducer { tx }, Self { rx })
    }

    /// 용량 설정에 따라 생성
    pub fn with_capacity(capacity: Option<usize>) -> (InboundProducer<T>, Self) {
        match capacity {
            Some(capacity) => Self::bounded(capacity),
            None => Self::unbounded(),
        }
    }

    /// 하나 꺼내기
    pub fn try_pop(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// 비어 있을 때까지 꺼내기 (FIFO)
    pub fn drain(&self) -> impl Iterator<Item = T> + '_ {
        self.rx.try_iter()
    }

    /// 최대 `limit`개 꺼내기 (0이면 제한 없음)
    pub fn drain_up_to(&self, limit: usize) -> impl Iterator<Item = T> + '_ {
        let limit = if limit == 0 { usize::MAX } else { limit };
        self.rx.try_iter().take(limit)
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_fifo_drain() {
        let (producer, queue) = InboundQueue::unbounded();
        for i in 0..10 {
            producer.push(i).unwrap();
        }

        let drained: Vec<i32> = queue.drain().collect();
        assert_eq!(drained, (0..10).collect::<Vec<_>>());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_up_to() {
        let (producer, queue) = InboundQueue::unbounded();
        for i in 0..5 {
            producer.push(i).unwrap();
        }

        assert_eq!(queue.drain_up_to(2).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.drain_up_to(0).collect::<Vec<_>>(), vec![2, 3, 4]);
    }

    #[test]
    fn test_bounded_drops_when_full() {
        let (producer, queue) = InboundQueue::bounded(2);
        assert!(producer.push(1).unwrap());
        assert!(producer.push(2).unwrap());
        assert!(!producer.push(3).unwrap());

        assert_eq!(queue.drain().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_closed_queue() {
        let (producer, queue) = InboundQueue::<u8>::unbounded();
        drop(queue);
        assert!(matches!(producer.push(1), Err(Error::QueueClosed)));
    }

    #[test]
    fn test_concurrent_producers_no_loss() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 10_000;

        let (producer, queue) = InboundQueue::unbounded();
        let done = Arc::new(AtomicBool::new(false));

        let handles: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let producer = producer.clone();
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        producer.push((p, i)).unwrap();
                    }
                })
            })
            .collect();

        let done_flag = done.clone();
        let consumer = thread::spawn(move || {
            let mut seen = vec![Vec::new(); PRODUCERS];
            loop {
                let finished = done_flag.load(Ordering::SeqCst);
                for (p, i) in queue.drain() {
                    seen[p].push(i);
                }
                if finished && queue.is_empty() {
                    break;
                }
                thread::yield_now();
            }
            seen
        });

        for handle in handles {
            handle.join().unwrap();
        }
        done.store(true, Ordering::SeqCst);

        let seen = consumer.join().unwrap();
        for per_producer in seen {
            // 생산자별 순서 유지, 손실/중복 없음
            assert_eq!(per_producer, (0..PER_PRODUCER).collect::<Vec<_>>());
        }
    }
}
