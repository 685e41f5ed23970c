//! 웹훅 싱크 — 크기 트리거 배치 HTTP POST
//!
//! 탐지 결과를 내부 버퍼에 쌓고, 버퍼 크기가 임계값에 도달하면 호출자
//! 스레드에서 인라인으로 플러시합니다. 플러시 실패 시 버퍼는 유지되어
//! 다음 handle/close에서 재전송됩니다 (프로세스 수명 내 at-least-once,
//! 재시도 백오프 없음).
//!
//! # 순서 보장
//!
//! 배치 내 알림은 handle 호출 순서를 따르고, 배치 간 순서는 단조입니다.
//! 버퍼 크기는 플러시 사이에 감소하지 않으며, 성공한 플러시 직후에만
//! 비워집니다.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;

use wasmward_core::error::{SinkError, WasmwardError};
use wasmward_core::event::DetectionResult;
use wasmward_core::metrics as m;
use wasmward_core::sink::Sink;

/// 기본 배치 플러시 임계값
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// 기본 HTTP 요청 타임아웃 (초)
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// 웹훅 싱크 빌더
pub struct WebhookSinkBuilder {
    url: String,
    headers: BTreeMap<String, String>,
    batch_size: usize,
    timeout: Duration,
}

impl WebhookSinkBuilder {
    /// 대상 URL로 빌더를 생성합니다.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// 추가 요청 헤더를 설정합니다.
    pub fn headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// 배치 플러시 임계값을 설정합니다.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// HTTP 요청 타임아웃을 설정합니다.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 웹훅 싱크를 빌드합니다.
    pub fn build(self) -> Result<WebhookSink, WasmwardError> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| SinkError::WebhookTransport(e.to_string()))?;
        Ok(WebhookSink {
            client,
            url: self.url,
            headers: self.headers,
            batch_size: self.batch_size,
            batch: Mutex::new(Vec::with_capacity(self.batch_size)),
        })
    }
}

/// 웹훅 싱크
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
    headers: BTreeMap<String, String>,
    batch_size: usize,
    batch: Mutex<Vec<DetectionResult>>,
}

impl WebhookSink {
    /// 현재 버퍼에 쌓인 결과 수를 반환합니다.
    pub async fn buffered(&self) -> usize {
        self.batch.lock().await.len()
    }

    /// 버퍼 내용을 하나의 배치로 전송합니다.
    ///
    /// 성공하면 버퍼를 비우고 (할당 용량은 유지), 실패하면 버퍼를 그대로
    /// 남겨 다음 기회에 재전송합니다. 빈 버퍼는 전송하지 않습니다.
    async fn flush_locked(
        &self,
        batch: &mut Vec<DetectionResult>,
    ) -> Result<(), WasmwardError> {
        if batch.is_empty() {
            return Ok(());
        }

        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "alerts": &*batch,
            "count": batch.len(),
        });

        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        let response = request.json(&payload).send().await.map_err(|e| {
            metrics::counter!(m::SINK_WEBHOOK_FLUSH_FAILURES_TOTAL).increment(1);
            SinkError::WebhookTransport(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            metrics::counter!(m::SINK_WEBHOOK_FLUSH_FAILURES_TOTAL).increment(1);
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::WebhookRejected {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        metrics::counter!(m::SINK_WEBHOOK_FLUSHES_TOTAL).increment(1);
        tracing::info!(
            count = batch.len(),
            url = %self.url,
            "sent alert batch to webhook"
        );
        batch.clear();
        Ok(())
    }
}

impl Sink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn handle(&self, result: &DetectionResult) -> Result<(), WasmwardError> {
        let mut batch = self.batch.lock().await;
        batch.push(result.clone());

        if batch.len() >= self.batch_size {
            return self.flush_locked(&mut batch).await;
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), WasmwardError> {
        let mut batch = self.batch.lock().await;
        self.flush_locked(&mut batch).await
    }
}
