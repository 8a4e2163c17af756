// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{http, Method, Request, StatusCode};
use reliable_delivery::Record;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::http_utils::{log_and_create_http_response, verify_request_content_length, HttpResponse};
use crate::wire::decode_reading;

pub const DATA_ENDPOINT_PATH: &str = "/data";
pub const RESPONSE_ENDPOINT_PATH: &str = "/response";
pub const DEFAULT_DATA_ACK: &str = "Data received";

/// Receives records accepted by the ingress server.
#[async_trait]
pub trait RecordSink {
    async fn accept(&self, record: Record);
}

/// A started tier: where its ingress listens and the tasks it spawned.
pub struct RunningTier {
    pub local_addr: Option<SocketAddr>,
    pub tasks: Vec<JoinHandle<()>>,
}

impl RunningTier {
    /// Waits for every task of the tier to finish.
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                error!("Tier task failed: {e}");
            }
        }
    }
}

struct Routes {
    readings: Arc<dyn RecordSink + Send + Sync>,
    alerts: Option<Arc<dyn RecordSink + Send + Sync>>,
    data_ack: String,
    max_request_content_length: usize,
}

/// HTTP/1 server in front of a tier.
///
/// `POST /data` takes a JSON reading, `POST /response` (only when an alert sink is
/// installed) takes a plain text alert.
pub struct IngressServer {
    routes: Routes,
}

impl IngressServer {
    pub fn new(
        readings: Arc<dyn RecordSink + Send + Sync>,
        max_request_content_length: usize,
    ) -> Self {
        IngressServer {
            routes: Routes {
                readings,
                alerts: None,
                data_ack: DEFAULT_DATA_ACK.to_string(),
                max_request_content_length,
            },
        }
    }

    pub fn with_alerts(mut self, alerts: Arc<dyn RecordSink + Send + Sync>) -> Self {
        self.routes.alerts = Some(alerts);
        self
    }

    /// Sets the message acknowledging an accepted reading.
    pub fn with_data_ack(mut self, message: impl Into<String>) -> Self {
        self.routes.data_ack = message.into();
        self
    }

    pub async fn bind(port: u16) -> io::Result<TcpListener> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        TcpListener::bind(&addr).await
    }

    /// Serves on `listener` from a background task.
    pub fn spawn(self, listener: TcpListener, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.serve(listener, cancel).await {
                error!("Ingress server failed: {e}");
            }
        })
    }

    /// Accepts connections on `listener` until `cancel` fires.
    pub async fn serve(
        self,
        listener: TcpListener,
        cancel: CancellationToken,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let routes = Arc::new(self.routes);
        let service = service_fn(move |req: Request<Incoming>| {
            // called for each http request
            let routes = Arc::clone(&routes);
            async move { routes.handle(req).await }
        });

        if let Ok(addr) = listener.local_addr() {
            debug!("Ingress server listening on {addr}");
        }

        let server = hyper::server::conn::http1::Builder::new();
        let mut joinset = tokio::task::JoinSet::new();

        loop {
            let conn = tokio::select! {
                _ = cancel.cancelled() => break,
                con_res = listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("Server error: {e}");
                        return Err(e.into());
                    }
                    Ok((conn, _)) => conn,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => match finished {
                    Err(e) if e.is_panic() => {
                        error!("Connection handler panicked: {:?}", e);
                        continue;
                    },
                    Ok(()) | Err(_) => continue,
                },
            };
            let conn = hyper_util::rt::TokioIo::new(conn);
            let server = server.clone();
            let service = service.clone();
            joinset.spawn(async move {
                if let Err(e) = server.serve_connection(conn, service).await {
                    debug!("Connection error: {e}");
                }
            });
        }

        joinset.shutdown().await;
        debug!("Ingress server stopped");
        Ok(())
    }
}

impl Routes {
    async fn handle(&self, req: Request<Incoming>) -> http::Result<HttpResponse> {
        let accepts_alerts = self.alerts.is_some();
        match (req.method(), req.uri().path()) {
            (&Method::POST, DATA_ENDPOINT_PATH) => self.data_handler(req).await,
            (&Method::POST, RESPONSE_ENDPOINT_PATH) if accepts_alerts => {
                self.response_handler(req).await
            }
            (_, DATA_ENDPOINT_PATH) => method_not_allowed(),
            (_, RESPONSE_ENDPOINT_PATH) if accepts_alerts => method_not_allowed(),
            _ => log_and_create_http_response("Not found", StatusCode::NOT_FOUND),
        }
    }

    async fn data_handler(&self, req: Request<Incoming>) -> http::Result<HttpResponse> {
        let body = match self.read_body(req, "Error processing data").await {
            Ok(body) => body,
            Err(response) => return response,
        };
        match decode_reading(&body) {
            Ok(record) => {
                self.readings.accept(record).await;
                log_and_create_http_response(&self.data_ack, StatusCode::OK)
            }
            Err(e) => log_and_create_http_response(
                &format!("Error processing data: {e}"),
                StatusCode::BAD_REQUEST,
            ),
        }
    }

    async fn response_handler(&self, req: Request<Incoming>) -> http::Result<HttpResponse> {
        let body = match self.read_body(req, "Error processing warning").await {
            Ok(body) => body,
            Err(response) => return response,
        };
        let text = match String::from_utf8(body.to_vec()) {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            _ => {
                return log_and_create_http_response(
                    "Error processing warning: body must be non-empty UTF-8 text",
                    StatusCode::BAD_REQUEST,
                );
            }
        };
        if let Some(alerts) = &self.alerts {
            alerts.accept(Record::alert(text)).await;
        }
        log_and_create_http_response("Warning received", StatusCode::OK)
    }

    async fn read_body(
        &self,
        req: Request<Incoming>,
        error_message_prefix: &str,
    ) -> Result<Bytes, http::Result<HttpResponse>> {
        let (parts, body) = req.into_parts();
        if let Some(response) = verify_request_content_length(
            &parts.headers,
            self.max_request_content_length,
            error_message_prefix,
        ) {
            return Err(response);
        }

        match Limited::new(body, self.max_request_content_length)
            .collect()
            .await
        {
            Ok(collected) => Ok(collected.to_bytes()),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                Err(log_and_create_http_response(
                    &format!("{error_message_prefix}: Payload too large"),
                    StatusCode::PAYLOAD_TOO_LARGE,
                ))
            }
            Err(e) => Err(log_and_create_http_response(
                &format!("{error_message_prefix}: Error reading request body: {e}"),
                StatusCode::BAD_REQUEST,
            )),
        }
    }
}

fn method_not_allowed() -> http::Result<HttpResponse> {
    log_and_create_http_response("Method not allowed", StatusCode::METHOD_NOT_ALLOWED)
}
