use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use tracing::{debug, info, instrument};

use crate::{BlobCodec, ByteStream, ChainClient, ContentKey, StorageMode, StoreError, StoreResult};

/// Rebuilds content by fetching its chunks one after another
#[derive(Clone)]
pub struct DownloadReconstructor {
    chain: Arc<dyn ChainClient>,
    codec: BlobCodec,
}

impl DownloadReconstructor {
    pub fn new(chain: Arc<dyn ChainClient>, codec: BlobCodec) -> Self {
        Self { chain, codec }
    }

    /// Decoded chunks of `key` in ascending index order.
    ///
    /// The stream ends after the first error.
    pub fn stream(&self, key: ContentKey) -> ByteStream {
        let chain = self.chain.clone();
        let codec = self.codec;
        let stream = async_stream::stream! {
            let count = match chain.count_chunks(&key).await {
                Ok(0) => {
                    yield Err(StoreError::download(format!("No chunks stored for {}", key)));
                    return;
                }
                Ok(count) => count,
                Err(e) => {
                    yield Err(StoreError::download(format!("Failed to count chunks of {}: {}", key, e)));
                    return;
                }
            };

            let mode = match chain.storage_mode(&key).await {
                Ok(mode) => mode,
                Err(e) => {
                    yield Err(StoreError::download(format!("Failed to read storage mode of {}: {}", key, e)));
                    return;
                }
            };
            debug!(%key, count, ?mode, "Fetching chunks");

            for index in 0..count {
                let raw = match chain.read_chunk(&key, index).await {
                    Ok(raw) => raw,
                    Err(e) => {
                        yield Err(StoreError::download(format!("Failed to fetch chunk {} of {}: {}", index, key, e)));
                        return;
                    }
                };

                let declared = match mode {
                    StorageMode::Blob => match chain.chunk_size(&key, index).await {
                        Ok(size) => Some(size),
                        Err(e) => {
                            yield Err(StoreError::download(format!("Failed to read size of chunk {} of {}: {}", index, key, e)));
                            return;
                        }
                    },
                    StorageMode::Calldata => None,
                };

                match decode_chunk(&codec, mode, raw, declared) {
                    Ok(bytes) => yield Ok(bytes),
                    Err(e) => {
                        yield Err(StoreError::download(format!("Chunk {} of {} is malformed: {}", index, key, e)));
                        return;
                    }
                }
            }
        };
        Box::pin(stream)
    }

    /// Whole content of `key`; any failed chunk fails the download
    #[instrument(skip(self), fields(key = %key))]
    pub async fn download(&self, key: ContentKey) -> StoreResult<Bytes> {
        let mut stream = self.stream(key);
        let mut out = BytesMut::new();
        let mut chunks = 0u64;
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk?);
            chunks += 1;
        }
        info!(chunks, bytes = out.len(), "Download complete");
        Ok(out.freeze())
    }
}

fn decode_chunk(codec: &BlobCodec, mode: StorageMode, raw: Bytes, declared: Option<u64>) -> StoreResult<Bytes> {
    match mode {
        StorageMode::Blob => {
            let unit = codec.unit_from_bytes(raw)?;
            let size = declared.ok_or_else(|| StoreError::invalid("Blob chunk has no declared size"))?;
            codec.decode_sized(&unit, size as usize)
        }
        StorageMode::Calldata => Ok(raw),
    }
}
