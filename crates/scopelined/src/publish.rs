//! State stream server.
//!
//! Every client gets one length-delimited welcome frame (JSON) followed by a
//! binary state frame per published tick.

use futures::SinkExt;
use scopeline::sample::StateSnapshot;
use scopeline::wire::encode_state_frame;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::bytes::Bytes;
use tokio_util::codec::{FramedWrite, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub async fn serve(
    listener: TcpListener,
    welcome: Arc<String>,
    states: broadcast::Receiver<Arc<StateSnapshot>>,
    cancel: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, addr)) => {
                info!("Client connected: {}", addr);
                let welcome = Arc::clone(&welcome);
                let rx = states.resubscribe();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, welcome, rx, cancel).await {
                        warn!("Client {} dropped: {}", addr, e);
                    } else {
                        info!("Client disconnected: {}", addr);
                    }
                });
            }
            Err(e) => error!("Accept failed: {}", e),
        }
    }
}

pub async fn handle_client(
    stream: TcpStream,
    welcome: Arc<String>,
    mut states: broadcast::Receiver<Arc<StateSnapshot>>,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let mut frames = FramedWrite::new(stream, LengthDelimitedCodec::new());
    frames.send(Bytes::from(welcome.as_bytes().to_vec())).await?;

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = states.recv() => next,
        };
        match next {
            Ok(snapshot) => {
                let frame = encode_state_frame(snapshot.timestamp, &snapshot.values);
                frames.send(Bytes::from(frame)).await?;
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Slow client skipped {} state frame(s)", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use scopeline::wire::{read_state_frame, Welcome};
    use tokio_util::codec::{FramedRead, LengthDelimitedCodec};

    #[tokio::test]
    async fn welcome_then_state_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = broadcast::channel(8);
        let cancel = CancellationToken::new();
        let welcome = Arc::new(r#"{"mapping":{"a":0},"sample_rate_msec":33}"#.to_string());
        let server = tokio::spawn(serve(listener, welcome, rx, cancel.clone()));

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut frames = FramedRead::new(stream, LengthDelimitedCodec::new());

        let first = frames.next().await.unwrap().unwrap();
        let hello: Welcome = serde_json::from_slice(&first).unwrap();
        assert_eq!(hello.sample_rate_msec, 33);
        assert_eq!(hello.mapping.get("a"), Some(&0));

        // the client task subscribes on accept; the welcome proves it exists
        tx.send(Arc::new(StateSnapshot { values: vec![1.0, -2.0], timestamp: 4.5 }))
            .unwrap();
        let frame = frames.next().await.unwrap().unwrap();
        let (t, values) = read_state_frame(&mut &frame[..]).unwrap();
        assert_eq!(t, 4.5);
        assert_eq!(values, vec![1.0, -2.0]);

        cancel.cancel();
        server.await.unwrap();
        assert!(frames.next().await.is_none());
    }
}
