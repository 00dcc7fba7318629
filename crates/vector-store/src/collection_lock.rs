use crate::error::{Result, VectorStoreError};
use fs2::FileExt;
use std::fs::OpenOptions;
use std::path::Path;
use std::time::{Duration, Instant};

const RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Exclusive advisory lock serializing writers of one collection file across
/// processes. Released on drop.
pub(crate) struct CollectionWriteLock {
    file: std::fs::File,
}

impl Drop for CollectionWriteLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Blocking; call from `spawn_blocking`. Polls until `timeout`, then gives
/// up with `StoreUnavailable`.
pub(crate) fn acquire_collection_write_lock(
    path: &Path,
    timeout: Duration,
) -> Result<CollectionWriteLock> {
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
        .map_err(|err| {
            VectorStoreError::store_io(format!("open collection lock {}", path.display()), err)
        })?;

    let start = Instant::now();
    let contended = fs2::lock_contended_error().raw_os_error();
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => break,
            Err(err) if err.raw_os_error() == contended => {
                if start.elapsed() >= timeout {
                    return Err(VectorStoreError::StoreUnavailable(format!(
                        "timed out waiting for collection lock {} after {} ms",
                        path.display(),
                        timeout.as_millis()
                    )));
                }
                std::thread::sleep(RETRY_INTERVAL);
            }
            Err(err) => {
                return Err(VectorStoreError::store_io(
                    format!("acquire collection lock {}", path.display()),
                    err,
                ));
            }
        }
    }
    let waited = start.elapsed();
    if waited.as_millis() > 100 {
        log::debug!("Waited {waited:?} for collection lock {}", path.display());
    }

    Ok(CollectionWriteLock { file })
}
