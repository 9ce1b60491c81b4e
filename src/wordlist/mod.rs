use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, BufReader};
use tokio::sync::{mpsc, Mutex};

const READ_CHUNK_SIZE: usize = 64 * 1024;
const STREAM_DEPTH: usize = 64;

/// A Wordlist is a mutex-guarded, file-backed stream of payload lines. The
/// file handle is shared between `count` and `stream`; the mutex guarantees
/// only one of them touches the cursor at a time.
pub struct Wordlist {
    file: Option<Arc<Mutex<File>>>,
}

impl Wordlist {
    pub async fn open(path: &Path) -> std::io::Result<Self> {
        let file = File::open(path).await?;
        Ok(Self {
            file: Some(Arc::new(Mutex::new(file))),
        })
    }

    /// A wordlist with no backing file: `stream` closes immediately and
    /// `count` reports zero.
    pub fn empty() -> Self {
        Self { file: None }
    }

    /// Streams payload lines as they come off the file, one channel message
    /// per newline-separated segment. The mutex is held for the entire life
    /// of the stream, so concurrent streams serialize instead of interleaving.
    /// The cursor is left at end-of-file; it is not rewound.
    pub fn stream(&self) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(STREAM_DEPTH);
        let Some(file) = self.file.clone() else {
            // No wordlist: dropping the sender closes the channel right away.
            return rx;
        };

        tokio::spawn(async move {
            let mut guard = file.lock_owned().await;
            let mut reader = BufReader::new(&mut *guard);
            let mut buf = Vec::new();
            // A file with N newlines carries N+1 segments, the final one
            // possibly empty. Tracking the trailing newline keeps the stream
            // in lockstep with `count`.
            let mut ended_with_newline = true;
            loop {
                buf.clear();
                let read = match reader.read_until(b'\n', &mut buf).await {
                    Ok(read) => read,
                    Err(_) => break,
                };
                if read == 0 {
                    if ended_with_newline {
                        let _ = tx.send(String::new()).await;
                    }
                    break;
                }
                ended_with_newline = buf.last() == Some(&b'\n');
                if ended_with_newline {
                    buf.pop();
                }
                if buf.last() == Some(&b'\r') {
                    buf.pop();
                }
                let line = String::from_utf8_lossy(&buf).into_owned();
                if tx.send(line).await.is_err() {
                    break;
                }
            }
        });

        rx
    }

    /// Counts the payload lines in the wordlist: the number of newline bytes
    /// plus one. The file is rewound to the start afterwards so a stream can
    /// follow a count.
    pub async fn count(&self) -> std::io::Result<usize> {
        let Some(file) = &self.file else {
            return Ok(0);
        };

        // Never start a count in the middle of a stream.
        let mut guard = file.lock().await;
        let mut count = 1usize;
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        loop {
            let read = guard.read(&mut buf).await?;
            if read == 0 {
                break;
            }
            count += buf[..read].iter().filter(|&&byte| byte == b'\n').count();
        }

        guard.seek(SeekFrom::Start(0)).await?;
        Ok(count)
    }
}
