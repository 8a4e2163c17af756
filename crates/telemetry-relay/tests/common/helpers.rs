// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::{sleep, timeout};

/// Send an HTTP request over TCP and return the response
pub async fn send_tcp_request(
    addr: SocketAddr,
    uri: &str,
    method: &str,
    content_type: &str,
    body: Vec<u8>,
) -> Result<Response<hyper::body::Incoming>, Box<dyn std::error::Error>> {
    let stream = timeout(
        Duration::from_secs(2),
        tokio::net::TcpStream::connect(("127.0.0.1", addr.port())),
    )
    .await??;

    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

    tokio::spawn(async move {
        let _ = conn.await;
    });

    let request = Request::builder()
        .uri(uri)
        .method(method)
        .header("Host", "localhost")
        .header("Content-Type", content_type)
        .header("Content-Length", body.len().to_string())
        .body(Full::new(Bytes::from(body)))?;
    let response = timeout(Duration::from_secs(2), sender.send_request(request)).await??;

    Ok(response)
}

/// Post a JSON reading to the `/data` endpoint and return the status code
#[allow(dead_code)]
pub async fn post_reading(addr: SocketAddr, sensor_id: &str, temperature: f64) -> u16 {
    let body = serde_json::json!({
        "sensorId": sensor_id,
        "temperature": temperature,
        "timestamp": "2024.05.17.10.30.00",
    })
    .to_string();
    send_tcp_request(addr, "/data", "POST", "application/json", body.into_bytes())
        .await
        .expect("request failed")
        .status()
        .as_u16()
}

#[allow(dead_code)]
pub async fn response_body(response: Response<hyper::body::Incoming>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Poll `check` until it holds or two seconds have passed
#[allow(dead_code)]
pub async fn wait_until<F: FnMut() -> bool>(mut check: F) -> bool {
    let poll = async {
        while !check() {
            sleep(Duration::from_millis(20)).await;
        }
    };
    timeout(Duration::from_secs(2), poll).await.is_ok()
}
