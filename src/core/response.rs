use bytes::Bytes;
use futures_util::StreamExt;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use serde::Serialize;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

use crate::{
    core::media::MediaType,
    error::{Error, HandlerResult},
    ports::transport::ResponseSink,
};

/// The outgoing side of a request cycle.
///
/// Status and headers can be changed freely until one of the terminal
/// operations (`end`, `send` and the helpers built on it, `redirect`,
/// `stream`) runs. After that the response is *sent*: later changes are
/// ignored and another terminal operation fails with
/// [`Error::AlreadySent`].
pub struct Response {
    sink: Box<dyn ResponseSink>,
    status: StatusCode,
    headers: HeaderMap,
    sent: bool,
}

impl Response {
    pub fn new(sink: Box<dyn ResponseSink>) -> Self {
        Self {
            sink,
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            sent: false,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    pub fn is_sent(&self) -> bool {
        self.sent
    }

    pub fn set_status(&mut self, status: StatusCode) -> &mut Self {
        if self.warn_if_sent("status") {
            return self;
        }
        self.status = status;
        self
    }

    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) -> &mut Self {
        if self.warn_if_sent(name.as_str()) {
            return self;
        }
        self.headers.insert(name, value);
        self
    }

    /// Set a header from runtime strings.
    pub fn try_set_header(&mut self, name: &str, value: &str) -> Result<&mut Self, Error> {
        let name =
            HeaderName::try_from(name).map_err(|_| Error::InvalidHeader(name.to_string()))?;
        let value =
            HeaderValue::try_from(value).map_err(|_| Error::InvalidHeader(name.to_string()))?;
        Ok(self.set_header(name, value))
    }

    pub fn remove_header(&mut self, name: impl header::AsHeaderName) -> Option<HeaderValue> {
        if self.sent {
            return None;
        }
        self.headers.remove(name)
    }

    pub fn set_type(&mut self, media: MediaType) -> &mut Self {
        self.set_header(header::CONTENT_TYPE, media.header_value())
    }

    pub fn set_length(&mut self, len: u64) -> &mut Self {
        self.set_header(header::CONTENT_LENGTH, HeaderValue::from(len))
    }

    /// Finish the response without a body.
    pub async fn end(&mut self) -> HandlerResult {
        self.begin()?;
        self.finish().await
    }

    /// Send `body` with `status`.
    ///
    /// `Content-Length` is always set from the body (0 when there is none);
    /// `Content-Type` only when `media` is given.
    pub async fn send(
        &mut self,
        status: StatusCode,
        body: Option<Bytes>,
        media: Option<MediaType>,
    ) -> HandlerResult {
        self.ensure_unsent()?;

        let body = body.unwrap_or_default();

        self.set_status(status);
        if let Some(media) = media {
            self.set_type(media);
        }
        self.set_length(body.len() as u64);

        self.begin()?;

        if !body.is_empty() {
            self.sink.write(body).await.map_err(Error::Transport)?;
        }

        self.finish().await
    }

    pub async fn text(&mut self, status: StatusCode, body: impl Into<String>) -> HandlerResult {
        let body = Bytes::from(body.into());
        self.send(status, Some(body), Some(MediaType::Text)).await
    }

    pub async fn html(&mut self, status: StatusCode, body: impl Into<String>) -> HandlerResult {
        let body = Bytes::from(body.into());
        self.send(status, Some(body), Some(MediaType::Html)).await
    }

    /// Pretty-printed JSON followed by a newline.
    ///
    /// A value serializing to `null` (such as `None`) is an absent payload:
    /// the headers go out with `Content-Length: 0` and no body.
    pub async fn json<T>(&mut self, status: StatusCode, value: &T) -> HandlerResult
    where
        T: Serialize + ?Sized,
    {
        self.ensure_unsent()?;

        let mut body = serde_json::to_string_pretty(value)?;
        if body == "null" {
            return self.send(status, None, Some(MediaType::Json)).await;
        }
        body.push('\n');

        self.send(status, Some(Bytes::from(body)), Some(MediaType::Json))
            .await
    }

    /// URL-encoded key/value pairs followed by a newline. No pairs at all is
    /// an absent payload and sends an empty body.
    pub async fn form<I, K, V>(&mut self, status: StatusCode, pairs: I) -> HandlerResult
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let pairs: Vec<String> = pairs
            .into_iter()
            .map(|(k, v)| {
                format!(
                    "{}={}",
                    urlencoding::encode(k.as_ref()),
                    urlencoding::encode(v.as_ref())
                )
            })
            .collect();

        if pairs.is_empty() {
            return self.send(status, None, Some(MediaType::Form)).await;
        }

        let mut body = pairs.join("&");
        body.push('\n');

        self.send(status, Some(Bytes::from(body)), Some(MediaType::Form))
            .await
    }

    /// Raw bytes labelled `application/octet-stream`.
    pub async fn buffer(&mut self, status: StatusCode, body: impl Into<Bytes>) -> HandlerResult {
        self.send(status, Some(body.into()), Some(MediaType::Binary))
            .await
    }

    /// Permanent (301) redirect.
    pub async fn redirect(&mut self, location: &str) -> HandlerResult {
        self.redirect_with(StatusCode::MOVED_PERMANENTLY, location)
            .await
    }

    pub async fn redirect_with(&mut self, status: StatusCode, location: &str) -> HandlerResult {
        self.ensure_unsent()?;

        let value = HeaderValue::try_from(location)
            .map_err(|_| Error::InvalidHeader(header::LOCATION.to_string()))?;

        self.set_status(status);
        self.set_header(header::LOCATION, value);
        self.end().await
    }

    /// Stream `reader` as the body using the status and headers set so far.
    pub async fn stream<R>(&mut self, reader: R) -> HandlerResult
    where
        R: AsyncRead + Unpin + Send,
    {
        self.begin()?;

        let mut chunks = ReaderStream::new(reader);

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(Error::Transport)?;
            self.sink.write(chunk).await.map_err(Error::Transport)?;
        }

        self.finish().await
    }

    fn ensure_unsent(&self) -> HandlerResult {
        if self.sent {
            tracing::error!(status = %self.status, "Response already sent");
            return Err(Error::AlreadySent);
        }
        Ok(())
    }

    /// Flip to the sent state and push the head to the sink.
    fn begin(&mut self) -> HandlerResult {
        self.ensure_unsent()?;
        self.sent = true;

        self.sink.set_status_code(self.status);
        for (name, value) in &self.headers {
            self.sink.set_header(name, value);
        }

        Ok(())
    }

    async fn finish(&mut self) -> HandlerResult {
        self.sink.end().await.map_err(Error::Transport)
    }

    fn warn_if_sent(&self, field: &str) -> bool {
        if self.sent {
            tracing::warn!(field, "Ignoring change to a response that was already sent");
        }
        self.sent
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("sent", &self.sent)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sink::ChannelSink;

    fn response() -> (Response, tokio::sync::oneshot::Receiver<http::Response<Bytes>>) {
        let (sink, rx) = ChannelSink::new();
        (Response::new(Box::new(sink)), rx)
    }

    #[tokio::test]
    async fn test_defaults() {
        let (res, _rx) = response();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().is_empty());
        assert!(!res.is_sent());
    }

    #[tokio::test]
    async fn test_json() {
        let (mut res, rx) = response();
        res.json(StatusCode::OK, &serde_json::json!({ "foo": "bar" }))
            .await
            .unwrap();
        assert!(res.is_sent());

        let out = rx.await.unwrap();
        assert_eq!(out.status(), StatusCode::OK);
        assert_eq!(
            out.headers()[header::CONTENT_TYPE],
            "application/json; charset=utf-8"
        );
        assert_eq!(out.headers()[header::CONTENT_LENGTH], "19");
        assert_eq!(out.body(), "{\n  \"foo\": \"bar\"\n}\n");
    }

    #[tokio::test]
    async fn test_text_and_status() {
        let (mut res, rx) = response();
        res.text(StatusCode::CREATED, "done").await.unwrap();

        let out = rx.await.unwrap();
        assert_eq!(out.status(), StatusCode::CREATED);
        assert_eq!(
            out.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(out.body(), "done");
    }

    #[tokio::test]
    async fn test_form() {
        let (mut res, rx) = response();
        res.form(StatusCode::OK, [("a", "1"), ("b", "x y")])
            .await
            .unwrap();

        let out = rx.await.unwrap();
        assert_eq!(out.body(), "a=1&b=x%20y\n");
    }

    #[tokio::test]
    async fn test_json_absent_payload() {
        let (mut res, rx) = response();
        res.json(StatusCode::OK, &Option::<serde_json::Value>::None)
            .await
            .unwrap();

        let out = rx.await.unwrap();
        assert_eq!(
            out.headers()[header::CONTENT_TYPE],
            "application/json; charset=utf-8"
        );
        assert_eq!(out.headers()[header::CONTENT_LENGTH], "0");
        assert!(out.body().is_empty());

        let (mut res, rx) = response();
        res.json(StatusCode::OK, &Some(1)).await.unwrap();
        assert_eq!(rx.await.unwrap().body(), "1\n");
    }

    #[tokio::test]
    async fn test_form_absent_payload() {
        let (mut res, rx) = response();
        res.form(StatusCode::OK, Vec::<(String, String)>::new())
            .await
            .unwrap();

        let out = rx.await.unwrap();
        assert_eq!(
            out.headers()[header::CONTENT_TYPE],
            "application/x-www-form-urlencoded; charset=utf-8"
        );
        assert_eq!(out.headers()[header::CONTENT_LENGTH], "0");
        assert!(out.body().is_empty());
    }

    #[tokio::test]
    async fn test_text_html_buffer_absent_payload() {
        let (mut res, rx) = response();
        res.text(StatusCode::OK, "").await.unwrap();
        let out = rx.await.unwrap();
        assert_eq!(out.headers()[header::CONTENT_TYPE], "text/plain; charset=utf-8");
        assert_eq!(out.headers()[header::CONTENT_LENGTH], "0");
        assert!(out.body().is_empty());

        let (mut res, rx) = response();
        res.html(StatusCode::OK, String::new()).await.unwrap();
        let out = rx.await.unwrap();
        assert_eq!(out.headers()[header::CONTENT_TYPE], "text/html; charset=utf-8");
        assert_eq!(out.headers()[header::CONTENT_LENGTH], "0");
        assert!(out.body().is_empty());

        let (mut res, rx) = response();
        res.buffer(StatusCode::OK, Bytes::new()).await.unwrap();
        let out = rx.await.unwrap();
        assert_eq!(out.headers()[header::CONTENT_TYPE], "application/octet-stream");
        assert_eq!(out.headers()[header::CONTENT_LENGTH], "0");
        assert!(out.body().is_empty());
    }

    #[tokio::test]
    async fn test_send_without_body() {
        let (mut res, rx) = response();
        res.send(StatusCode::NO_CONTENT, None, None).await.unwrap();

        let out = rx.await.unwrap();
        assert_eq!(out.status(), StatusCode::NO_CONTENT);
        assert_eq!(out.headers()[header::CONTENT_LENGTH], "0");
        assert!(out.headers().get(header::CONTENT_TYPE).is_none());
        assert!(out.body().is_empty());
    }

    #[tokio::test]
    async fn test_redirect() {
        let (mut res, rx) = response();
        res.redirect("/elsewhere").await.unwrap();

        let out = rx.await.unwrap();
        assert_eq!(out.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(out.headers()[header::LOCATION], "/elsewhere");

        let (mut res, rx) = response();
        res.redirect_with(StatusCode::FOUND, "/temp").await.unwrap();
        assert_eq!(rx.await.unwrap().status(), StatusCode::FOUND);
    }

    #[tokio::test]
    async fn test_second_terminal_operation_fails() {
        let (mut res, _rx) = response();
        res.end().await.unwrap();

        assert!(matches!(res.end().await, Err(Error::AlreadySent)));
        assert!(matches!(
            res.text(StatusCode::OK, "again").await,
            Err(Error::AlreadySent)
        ));
        assert!(matches!(
            res.redirect("/x").await,
            Err(Error::AlreadySent)
        ));
    }

    #[tokio::test]
    async fn test_changes_after_send_are_ignored() {
        let (mut res, _rx) = response();
        res.text(StatusCode::OK, "x").await.unwrap();

        res.set_status(StatusCode::IM_A_TEAPOT);
        res.set_header(header::ETAG, HeaderValue::from_static("\"v1\""));
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.header(header::ETAG).is_none());
    }

    #[tokio::test]
    async fn test_stream() {
        let (mut res, rx) = response();
        res.set_type(MediaType::Binary);
        res.stream(&b"streamed bytes"[..]).await.unwrap();

        let out = rx.await.unwrap();
        assert_eq!(out.body(), "streamed bytes");
        assert_eq!(
            out.headers()[header::CONTENT_TYPE],
            "application/octet-stream"
        );
    }

    #[tokio::test]
    async fn test_invalid_header() {
        let (mut res, _rx) = response();
        assert!(matches!(
            res.try_set_header("bad header", "x"),
            Err(Error::InvalidHeader(_))
        ));
        res.try_set_header("x-custom", "yes").unwrap();
        assert_eq!(res.header("x-custom").unwrap(), "yes");
    }
}
