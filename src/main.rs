use anyhow::{Context, Result};
use std::io;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use panel_core::transport::{Envelope, FileRenderTarget, LineTransport};
use panel_core::AppState;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();

    let app_state = AppState::new()?;
    let output_dir = app_state.config.read().output_dir()?;

    let render = FileRenderTarget::new(&output_dir)?;
    let transport = LineTransport::new(io::stdout());
    let mut channel = app_state.channel(transport, render);

    app_state
        .console
        .write()
        .log_info(&format!("Rendering targets into {}", output_dir.display()));

    // Reader task feeds the single event loop below
    let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
    let console = app_state.console.clone();
    let reader = tokio::spawn(async move {
        let mut stdin = BufReader::new(tokio::io::stdin());
        let mut line = Vec::new();
        loop {
            line.clear();
            let read = stdin
                .read_until(b'\n', &mut line)
                .await
                .context("Failed to read stdin")?;
            if read == 0 {
                break;
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match Envelope::decode_bytes(&line) {
                Ok(envelope) => {
                    if tx.send(envelope).is_err() {
                        break;
                    }
                }
                Err(e) => console.write().log_error(&format!("{:#}", e)),
            }
        }
        Ok::<(), anyhow::Error>(())
    });

    while let Some(envelope) = rx.recv().await {
        channel.dispatch(envelope);
    }

    reader.await.context("Reader task panicked")??;

    if channel.is_connected() {
        channel.on_disconnect();
    }
    Ok(())
}
