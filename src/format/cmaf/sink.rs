use async_trait::async_trait;
use bytes::Bytes;
use log::warn;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Receiver of chunk-push and segment-completion notifications.
///
/// Implemented by the outbound delivery layer; the packetization core
/// only ever calls it through the decoupling queue, so a slow sink can
/// never stall frame ingestion.
#[async_trait]
pub trait ChunkedTransferSink: Send + Sync {
    /// Called for every partial, in-progress chunk payload.
    async fn on_chunk_push(
        &self,
        app_name: &str,
        stream_name: &str,
        file_name: &str,
        is_video: bool,
        chunk: Bytes,
    );

    /// Called once per finalized segment.
    async fn on_segment_complete(
        &self,
        app_name: &str,
        stream_name: &str,
        file_name: &str,
        is_video: bool,
    );
}

#[derive(Debug)]
pub(crate) enum SinkEvent {
    ChunkPush {
        file_name: String,
        is_video: bool,
        chunk: Bytes,
    },
    SegmentComplete {
        file_name: String,
        is_video: bool,
    },
}

/// Bounded fire-and-forget queue in front of the sink. Events are
/// dropped with a warning when the queue is full; closing the queue
/// makes any later push a silent no-op.
pub(crate) struct SinkDispatcher {
    tx: Mutex<Option<mpsc::Sender<SinkEvent>>>,
}

impl SinkDispatcher {
    pub(crate) fn spawn(
        app_name: String,
        stream_name: String,
        sink: Arc<dyn ChunkedTransferSink>,
        capacity: usize,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel(capacity);

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    SinkEvent::ChunkPush {
                        file_name,
                        is_video,
                        chunk,
                    } => {
                        sink.on_chunk_push(&app_name, &stream_name, &file_name, is_video, chunk)
                            .await;
                    }
                    SinkEvent::SegmentComplete {
                        file_name,
                        is_video,
                    } => {
                        sink.on_segment_complete(&app_name, &stream_name, &file_name, is_video)
                            .await;
                    }
                }
            }
        });

        Self {
            tx: Mutex::new(Some(tx)),
        }
    }

    pub(crate) fn push(&self, event: SinkEvent) {
        let guard = self.tx.lock();
        if let Some(tx) = guard.as_ref() {
            if let Err(err) = tx.try_send(event) {
                warn!("dropping sink notification: {}", err);
            }
        }
    }

    pub(crate) fn close(&self) {
        self.tx.lock().take();
    }
}
