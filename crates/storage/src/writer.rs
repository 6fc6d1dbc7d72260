//! 배치 writer
//!
//! [`BufferedWriter`]는 항목을 순서대로 모았다가 개수가 임계값에 도달하면
//! 모인 배치 전체를 한 번의 호출로 [`BatchSink`]에 넘기고 버퍼를 비웁니다.
//!
//! - 임계값 도달: 자동 플러시, 플러시된 항목 반환
//! - 명시적 [`flush`](BufferedWriter::flush): 남은 항목 플러시
//! - 빈 버퍼 플러시: 싱크를 호출하지 않음
//!
//! [`scoped`]는 본문이 정상 종료하든 에러로 종료하든 마지막에 반드시 플러시합니다.
//!
//! # 사용 예시
//! ```ignore
//! use oastats_storage::writer::scoped;
//!
//! scoped(sink, 1_000, async |writer| {
//!     for record in records {
//!         writer.write(record).await?;
//!     }
//!     Ok::<_, StorageError>(())
//! })
//! .await?;
//! ```

use std::future::Future;

use metrics::counter;
use tracing::{debug, warn};

use oastats_core::metrics as m;

use crate::error::StorageError;

/// 배치를 한 번에 받는 하위 저장소
pub trait BatchSink<T>: Send {
    /// 배치 하나를 전송합니다. 빈 배치로는 호출되지 않습니다.
    fn send_batch(&mut self, batch: &[T]) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// 메트릭/로그 레이블
    fn name(&self) -> &'static str {
        "sink"
    }
}

impl<T, S> BatchSink<T> for &mut S
where
    S: BatchSink<T> + ?Sized,
{
    fn send_batch(&mut self, batch: &[T]) -> impl Future<Output = Result<(), StorageError>> + Send {
        (**self).send_batch(batch)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// 임계값 기반 배치 writer
pub struct BufferedWriter<T, S> {
    sink: S,
    buffer: Vec<T>,
    threshold: usize,
}

impl<T, S: BatchSink<T>> BufferedWriter<T, S> {
    /// 싱크와 임계값으로 writer를 생성합니다. 임계값 0은 1로 취급합니다.
    pub fn new(sink: S, threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            sink,
            buffer: Vec::with_capacity(threshold.min(16_384)),
            threshold,
        }
    }

    /// 항목 하나를 추가합니다.
    ///
    /// 버퍼가 임계값에 도달하면 플러시하고 플러시된 배치를 반환합니다.
    pub async fn write(&mut self, item: T) -> Result<Option<Vec<T>>, StorageError> {
        self.buffer.push(item);
        if self.buffer.len() >= self.threshold {
            return self.flush().await;
        }
        Ok(None)
    }

    /// 남은 항목을 플러시합니다. 버퍼가 비어 있으면 아무 일도 하지 않습니다.
    ///
    /// 싱크가 실패하면 버퍼는 그대로 유지됩니다.
    pub async fn flush(&mut self) -> Result<Option<Vec<T>>, StorageError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        self.sink.send_batch(&self.buffer).await?;
        let batch = std::mem::take(&mut self.buffer);

        let sink = self.sink.name();
        counter!(m::WRITER_BATCHES_FLUSHED_TOTAL, m::LABEL_SINK => sink).increment(1);
        counter!(m::WRITER_ITEMS_WRITTEN_TOTAL, m::LABEL_SINK => sink)
            .increment(batch.len() as u64);
        debug!(sink, items = batch.len(), "flushed batch");

        Ok(Some(batch))
    }

    /// 버퍼에 남은 항목 수
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}

impl<T, S> Drop for BufferedWriter<T, S> {
    fn drop(&mut self) {
        if !self.buffer.is_empty() {
            warn!(
                pending = self.buffer.len(),
                "buffered writer dropped with unflushed items"
            );
        }
    }
}

/// writer를 만들어 본문에 빌려주고, 본문이 끝나면 반드시 플러시합니다.
///
/// 본문이 에러를 반환해도 플러시를 시도하며, 이때 플러시 실패는 경고로만 남기고
/// 본문의 에러를 반환합니다.
pub async fn scoped<T, S, F, R, E>(sink: S, threshold: usize, body: F) -> Result<R, E>
where
    S: BatchSink<T>,
    F: AsyncFnOnce(&mut BufferedWriter<T, S>) -> Result<R, E>,
    E: From<StorageError>,
{
    let mut writer = BufferedWriter::new(sink, threshold);
    let result = body(&mut writer).await;
    let flushed = writer.flush().await;

    match (result, flushed) {
        (Ok(value), Ok(_)) => Ok(value),
        (Ok(_), Err(e)) => Err(e.into()),
        (Err(e), Ok(_)) => Err(e),
        (Err(e), Err(flush_err)) => {
            warn!(error = %flush_err, "final flush failed after body error");
            Err(e)
        }
    }
}

#[cfg(test)]
pub use recording::RecordingSink;

#[cfg(test)]
mod recording {
    use super::BatchSink;
    use crate::error::StorageError;

    /// 받은 배치를 그대로 기록하는 테스트용 싱크
    #[derive(Debug, Default)]
    pub struct RecordingSink<T> {
        pub batches: Vec<Vec<T>>,
        pub fail: bool,
    }

    impl<T> RecordingSink<T> {
        pub fn new() -> Self {
            Self {
                batches: Vec::new(),
                fail: false,
            }
        }

        pub fn failing() -> Self {
            Self {
                batches: Vec::new(),
                fail: true,
            }
        }

        pub fn items(&self) -> usize {
            self.batches.iter().map(Vec::len).sum()
        }
    }

    impl<T: Clone + Send + Sync> BatchSink<T> for RecordingSink<T> {
        async fn send_batch(&mut self, batch: &[T]) -> Result<(), StorageError> {
            if self.fail {
                return Err(StorageError::Query("recording sink failure".to_owned()));
            }
            self.batches.push(batch.to_vec());
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }
}
