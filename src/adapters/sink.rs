use std::io;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use tokio::sync::oneshot;

use crate::ports::transport::ResponseSink;

/// Collects a response in memory and hands it over once it is complete.
///
/// The finished `http::Response` is delivered on the receiver returned by
/// [`ChannelSink::new`]. If the sink is dropped before `end`, the receiver
/// observes a closed channel.
#[derive(Debug)]
pub struct ChannelSink {
    status: StatusCode,
    headers: HeaderMap,
    body: BytesMut,
    tx: Option<oneshot::Sender<http::Response<Bytes>>>,
}

impl ChannelSink {
    pub fn new() -> (Self, oneshot::Receiver<http::Response<Bytes>>) {
        let (tx, rx) = oneshot::channel();

        let sink = Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: BytesMut::new(),
            tx: Some(tx),
        };

        (sink, rx)
    }
}

#[async_trait]
impl ResponseSink for ChannelSink {
    fn set_status_code(&mut self, status: StatusCode) {
        self.status = status;
    }

    fn set_header(&mut self, name: &HeaderName, value: &HeaderValue) {
        self.headers.insert(name.clone(), value.clone());
    }

    async fn write(&mut self, chunk: Bytes) -> io::Result<()> {
        if self.tx.is_none() {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "write after end of response",
            ));
        }
        self.body.extend_from_slice(&chunk);
        Ok(())
    }

    async fn end(&mut self) -> io::Result<()> {
        let tx = self.tx.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "response already ended")
        })?;

        let mut response = http::Response::new(self.body.split().freeze());
        *response.status_mut() = self.status;
        *response.headers_mut() = std::mem::take(&mut self.headers);

        tx.send(response)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "response receiver dropped"))
    }
}
