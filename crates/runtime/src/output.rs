//! Ordered output of a turn.
//!
//! [`TurnOutput`] is the writing half held by the orchestrator; [`TurnStream`]
//! is the reading half handed to the transport layer. Everything written is
//! delivered in write order: text, result markers, error markers and
//! follow-up text all share the one channel.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::TurnError;
use crate::marker;

const OUTPUT_BUFFER: usize = 32;

/// Create a connected output pair.
pub fn channel() -> (TurnOutput, TurnStream) {
    let (tx, rx) = mpsc::channel(OUTPUT_BUFFER);
    (
        TurnOutput { tx },
        TurnStream {
            inner: ReceiverStream::new(rx),
        },
    )
}

/// Writing half of a turn's output.
#[derive(Debug)]
pub struct TurnOutput {
    tx: mpsc::Sender<Result<String, TurnError>>,
}

impl TurnOutput {
    /// Append plain text. Empty text is not sent.
    pub async fn text(&self, text: impl Into<String>) -> Result<(), TurnError> {
        let text = text.into();
        if text.is_empty() {
            return Ok(());
        }
        self.send(Ok(text)).await
    }

    pub async fn tool_result(&self, name: &str, body: &str) -> Result<(), TurnError> {
        self.send(Ok(marker::result_marker(name, body))).await
    }

    pub async fn tool_error(&self, name: &str, message: &str) -> Result<(), TurnError> {
        self.send(Ok(marker::error_marker(name, message))).await
    }

    /// Terminate the stream with an error item.
    pub async fn fail(self, err: TurnError) {
        // Nobody is listening if this fails.
        let _ = self.tx.send(Err(err)).await;
    }

    /// Resolves once the reading half has been dropped.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn send(&self, item: Result<String, TurnError>) -> Result<(), TurnError> {
        self.tx.send(item).await.map_err(|_| TurnError::Cancelled)
    }
}

/// Reading half of a turn's output.
///
/// Ends cleanly when the turn is done, or after a single `Err` item when it
/// failed.
#[derive(Debug)]
pub struct TurnStream {
    inner: ReceiverStream<Result<String, TurnError>>,
}

impl Stream for TurnStream {
    type Item = Result<String, TurnError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelError;
    use futures::StreamExt;

    #[tokio::test]
    async fn items_arrive_in_write_order() {
        let (out, stream) = channel();
        tokio::spawn(async move {
            out.text("Hello ").await.unwrap();
            out.text("").await.unwrap();
            out.tool_result("weather", "22C").await.unwrap();
            out.tool_error("search", "tool not found: search").await.unwrap();
        });

        let items: Vec<String> = stream.map(|i| i.unwrap()).collect().await;
        assert_eq!(
            items,
            vec![
                "Hello ".to_string(),
                marker::result_marker("weather", "22C"),
                marker::error_marker("search", "tool not found: search"),
            ]
        );
    }

    #[tokio::test]
    async fn fail_ends_with_error_item() {
        let (out, mut stream) = channel();
        out.text("partial").await.unwrap();
        out.fail(TurnError::Model(ModelError::Network("reset".into())))
            .await;

        assert_eq!(stream.next().await.unwrap().unwrap(), "partial");
        assert!(matches!(
            stream.next().await,
            Some(Err(TurnError::Model(ModelError::Network(_))))
        ));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn dropped_reader_cancels_writes() {
        let (out, stream) = channel();
        drop(stream);
        out.closed().await;
        assert!(out.is_closed());
        assert!(matches!(out.text("x").await, Err(TurnError::Cancelled)));
    }
}
