//! Demultiplexing SSH channel messages into byte streams

use russh::client::Msg;
use russh::{Channel, ChannelMsg};
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::watch;
use tracing::debug;

const PIPE_CAPACITY: usize = 64 * 1024;

/// Exit status reported when the remote sent none (e.g. killed by a signal)
pub const NO_EXIT_STATUS: i32 = -1;

/// Split a channel into stdout and stderr readers plus an exit-status watch
///
/// The status is published only after both pipes are closed, so a reader
/// that sees the status has already seen every byte of output.
pub fn spawn_pump(
    mut channel: Channel<Msg>,
) -> (DuplexStream, DuplexStream, watch::Receiver<Option<i32>>) {
    let (mut out_tx, out_rx) = tokio::io::duplex(PIPE_CAPACITY);
    let (mut err_tx, err_rx) = tokio::io::duplex(PIPE_CAPACITY);
    let (status_tx, status_rx) = watch::channel(None);

    tokio::spawn(async move {
        let mut stdout_open = true;
        let mut stderr_open = true;
        let mut exit_status = None;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } if stdout_open => {
                    // The reader went away, keep draining the channel
                    stdout_open = out_tx.write_all(data).await.is_ok();
                }
                ChannelMsg::ExtendedData { ref data, ext: 1 } if stderr_open => {
                    stderr_open = err_tx.write_all(data).await.is_ok();
                }
                ChannelMsg::ExitStatus { exit_status: code } => {
                    exit_status = Some(code as i32);
                }
                ChannelMsg::ExitSignal { signal_name, .. } => {
                    debug!("Remote command terminated by signal {:?}", signal_name);
                }
                _ => {}
            }
        }

        drop(out_tx);
        drop(err_tx);
        let _ = status_tx.send(Some(exit_status.unwrap_or(NO_EXIT_STATUS)));
    });

    (out_rx, err_rx, status_rx)
}

/// Consume a channel to its end, returning the exit status and stderr text
pub async fn drain(channel: &mut Channel<Msg>) -> (i32, String) {
    let mut exit_status = None;
    let mut stderr = Vec::new();

    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::ExtendedData { ref data, ext: 1 } => stderr.extend_from_slice(data),
            ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code as i32),
            _ => {}
        }
    }

    (
        exit_status.unwrap_or(NO_EXIT_STATUS),
        String::from_utf8_lossy(&stderr).trim().to_string(),
    )
}
