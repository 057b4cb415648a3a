use anyhow::Result;
use platform_abci::messages::{Request, Response};
use platform_abci::{dispatch, Application};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Serves JSON-lines requests until the reader is exhausted. Returns the
/// number of requests answered.
pub async fn serve<A, R, W>(app: &A, reader: R, mut writer: W) -> Result<u64>
where
    A: Application + ?Sized,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut handled = 0;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(line) {
            Ok(request) => {
                debug!(method = request.method(), "request received");
                dispatch(app, request).await
            }
            Err(err) => {
                warn!(error = %err, "malformed request line");
                Response::Exception {
                    error: format!("malformed request: {err}"),
                }
            }
        };

        let mut encoded = serde_json::to_vec(&response)?;
        encoded.push(b'\n');
        writer.write_all(&encoded).await?;
        writer.flush().await?;
        handled += 1;
    }

    Ok(handled)
}
