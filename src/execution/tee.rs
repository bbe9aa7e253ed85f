//! Copying a command's output to the console and a capture buffer

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;

const TEE_CHUNK_SIZE: usize = 8 * 1024;

/// Read `reader` to EOF, forwarding every chunk to `console` and returning
/// everything that was read
pub async fn tee<R, W>(mut reader: R, mut console: W) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut captured = Vec::new();
    let mut chunk = vec![0u8; TEE_CHUNK_SIZE];

    loop {
        let read = reader.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        console.write_all(&chunk[..read]).await?;
        console.flush().await?;
        captured.extend_from_slice(&chunk[..read]);
    }

    Ok(captured)
}

/// Drain `reader` without echoing it
pub async fn read_all<R>(reader: Option<R>) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut captured = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut captured).await?;
    }
    Ok(captured)
}

/// A spawned tee task, aborted if dropped before it is joined
pub struct TeeWorker {
    handle: JoinHandle<io::Result<Vec<u8>>>,
}

impl TeeWorker {
    pub fn spawn<R, W>(reader: R, console: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            handle: tokio::spawn(tee(reader, console)),
        }
    }

    pub async fn join(mut self) -> io::Result<Vec<u8>> {
        match (&mut self.handle).await {
            Ok(captured) => captured,
            Err(e) => Err(io::Error::other(e)),
        }
    }
}

impl Drop for TeeWorker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
