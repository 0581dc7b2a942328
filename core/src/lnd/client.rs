//! HTTP and websocket transport for the LND REST API.

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};

use super::types::ApiError;
use crate::config::LndConfig;
use crate::error::{Error, Result};
use crate::transport::{MessageStream, StreamMethod, Transport, TransportFuture};

const MACAROON_HEADER: &str = "grpc-metadata-macaroon";

/// LND REST client.
///
/// Requests go through reqwest, streaming calls through websockets on the
/// same host. Both carry the macaroon header.
#[derive(Debug, Clone)]
pub struct RestTransport {
    base_url: String,
    macaroon: String,
    client: reqwest::Client,
    tls: Option<native_tls::TlsConnector>,
}

impl RestTransport {
    /// Create a new transport.
    ///
    /// No connection is made until the first request.
    pub fn new(config: &LndConfig) -> Result<Self> {
        config.validate()?;

        let mut builder = reqwest::Client::builder();
        let mut tls = None;
        if let Some(pem) = &config.tls_cert_pem {
            let cert = reqwest::Certificate::from_pem(pem.as_bytes())
                .map_err(|e| Error::Config(format!("Invalid TLS certificate: {}", e)))?;
            builder = builder.add_root_certificate(cert);

            let cert = native_tls::Certificate::from_pem(pem.as_bytes())
                .map_err(|e| Error::Config(format!("Invalid TLS certificate: {}", e)))?;
            let connector = native_tls::TlsConnector::builder()
                .add_root_certificate(cert)
                .build()
                .map_err(|e| Error::Config(format!("Failed to build TLS connector: {}", e)))?;
            tls = Some(connector);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            macaroon: config.macaroon.clone(),
            client,
            tls,
        })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn stream_url(&self, path: &str, method: StreamMethod) -> String {
        let base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.base_url.clone()
        };

        match method {
            StreamMethod::Get => format!("{}/{}", base, path),
            StreamMethod::Post => format!("{}/{}?method=POST", base, path),
        }
    }

    async fn send_json(&self, request: reqwest::RequestBuilder, path: &str) -> Result<Value> {
        let response = request
            .header(MACAROON_HEADER, &self.macaroon)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to send request to {}: {}", path, e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Network(format!("Failed to read response: {}", e)))?;

        log::debug!("{} response ({}): {}", path, status, text);

        if !status.is_success() {
            let message = serde_json::from_str::<ApiError>(&text)
                .ok()
                .map(|e| e.message)
                .filter(|m| !m.is_empty())
                .unwrap_or(text);
            return Err(Error::Api {
                endpoint: path.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text)
            .map_err(|e| Error::Parse(format!("Failed to parse response: {}. Body: {}", e, text)))
    }
}

impl Transport for RestTransport {
    fn get<'a>(&'a self, path: &'a str) -> TransportFuture<'a, Value> {
        Box::pin(async move {
            let request = self.client.get(self.url(path));
            self.send_json(request, path).await
        })
    }

    fn post<'a>(&'a self, path: &'a str, body: Value) -> TransportFuture<'a, Value> {
        Box::pin(async move {
            log::debug!("POST {}: {}", path, body);
            let request = self.client.post(self.url(path)).json(&body);
            self.send_json(request, path).await
        })
    }

    fn open_stream<'a>(
        &'a self,
        path: &'a str,
        method: StreamMethod,
    ) -> TransportFuture<'a, Box<dyn MessageStream>> {
        Box::pin(async move {
            let url = self.stream_url(path, method);
            let mut request = url
                .as_str()
                .into_client_request()
                .map_err(|e| Error::Network(format!("Invalid stream URL {}: {}", url, e)))?;
            let macaroon = HeaderValue::from_str(&self.macaroon)
                .map_err(|e| Error::Config(format!("Invalid macaroon header: {}", e)))?;
            request.headers_mut().insert(MACAROON_HEADER, macaroon);

            let connector = self.tls.clone().map(Connector::NativeTls);
            let (inner, response) =
                tokio_tungstenite::connect_async_tls_with_config(request, None, false, connector)
                    .await
                    .map_err(|e| Error::Network(format!("Failed to open {} stream: {}", path, e)))?;
            log::debug!("{} {} stream opened ({})", method, path, response.status());

            Ok(Box::new(WsStream {
                inner,
                path: path.to_string(),
            }) as Box<dyn MessageStream>)
        })
    }
}

struct WsStream {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
    path: String,
}

impl MessageStream for WsStream {
    fn send(&mut self, message: Value) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            log::debug!("{} send: {}", self.path, message);
            self.inner
                .send(Message::Text(message.to_string()))
                .await
                .map_err(|e| Error::Network(format!("Failed to send on {}: {}", self.path, e)))
        })
    }

    fn receive(&mut self) -> TransportFuture<'_, Option<Value>> {
        Box::pin(async move {
            while let Some(message) = self.inner.next().await {
                match message {
                    Ok(Message::Text(text)) => return Ok(Some(serde_json::from_str(&text)?)),
                    Ok(Message::Binary(bytes)) => return Ok(Some(serde_json::from_slice(&bytes)?)),
                    Ok(Message::Close(frame)) => {
                        log::debug!("{} closed by node: {:?}", self.path, frame);
                        return Ok(None);
                    }
                    // ping/pong
                    Ok(_) => continue,
                    Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => return Ok(None),
                    Err(e) => {
                        return Err(Error::Network(format!(
                            "Failed to receive on {}: {}",
                            self.path, e
                        )));
                    }
                }
            }
            Ok(None)
        })
    }

    fn close(&mut self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            match self.inner.close(None).await {
                Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
                Err(e) => Err(Error::Network(format!(
                    "Failed to close {}: {}",
                    self.path, e
                ))),
            }
        })
    }
}
