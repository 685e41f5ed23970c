//! 로그 싱크 — 탐지 결과를 평탄화된 JSON으로 기록
//!
//! 탐지 결과의 평탄화된 뷰를 pretty JSON으로 직렬화하여 선택적 파일에
//! 기록하고, 동시에 warn 레벨 구조화 로그 레코드를 남깁니다.
//! 파일 쓰기는 배타 락 아래에서 직렬화됩니다.

use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use wasmward_core::error::{SinkError, WasmwardError};
use wasmward_core::event::{DetectionResult, EventPayload};
use wasmward_core::sink::Sink;

/// 로그 싱크
///
/// 결과 하나당 pretty JSON 객체 하나를 기록하고 `\n`으로 끝맺습니다.
/// 파일 경로가 지정되지 않으면 구조화 로그 레코드만 남깁니다.
pub struct LogSink {
    file: Mutex<Option<tokio::fs::File>>,
}

impl LogSink {
    /// 새 로그 싱크를 생성합니다.
    ///
    /// `log_file`이 지정되면 append 모드로 엽니다 (없으면 생성).
    pub async fn new(log_file: Option<&str>) -> Result<Self, WasmwardError> {
        let file = match log_file {
            Some(path) => Some(
                tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await
                    .map_err(|e| SinkError::Io(format!("failed to open {path}: {e}")))?,
            ),
            None => None,
        };
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// 탐지 결과의 평탄화된 뷰를 구성합니다.
    ///
    /// 이벤트에 프로세스/네트워크/파일 서브레코드가 있으면 최상위로
    /// 끌어올려 소비자가 중첩 구조를 파고들 필요가 없게 합니다.
    fn flatten(result: &DetectionResult) -> Result<serde_json::Value, SinkError> {
        let mut entry = serde_json::Map::new();
        entry.insert(
            "timestamp".to_owned(),
            serde_json::Value::String(Utc::now().to_rfc3339()),
        );
        entry.insert(
            "rule_name".to_owned(),
            serde_json::Value::String(result.rule_name.clone()),
        );
        entry.insert(
            "severity".to_owned(),
            serde_json::Value::String(result.severity.as_str().to_owned()),
        );
        entry.insert("threat".to_owned(), serde_json::Value::Bool(result.threat));
        entry.insert(
            "confidence".to_owned(),
            serde_json::json!(result.confidence),
        );
        entry.insert(
            "description".to_owned(),
            serde_json::Value::String(result.description.clone()),
        );
        entry.insert(
            "event_type".to_owned(),
            serde_json::Value::String(result.event.kind.as_str().to_owned()),
        );
        entry.insert(
            "event_id".to_owned(),
            serde_json::Value::String(result.event.id.clone()),
        );
        entry.insert(
            "source".to_owned(),
            serde_json::Value::String(result.event.source.clone()),
        );

        if let Some(metadata) = &result.metadata {
            entry.insert(
                "metadata".to_owned(),
                serde_json::to_value(metadata)
                    .map_err(|e| SinkError::Serialize(e.to_string()))?,
            );
        }

        // 이벤트 종류별 서브레코드를 최상위로 복사
        let sub = match &result.event.data {
            EventPayload::Process(p) => Some(("process", serde_json::to_value(&p.process))),
            EventPayload::Network(p) => Some(("network", serde_json::to_value(&p.network))),
            EventPayload::File(p) => Some(("file", serde_json::to_value(&p.file))),
            EventPayload::Generic(_) => None,
        };
        if let Some((key, value)) = sub {
            entry.insert(
                key.to_owned(),
                value.map_err(|e| SinkError::Serialize(e.to_string()))?,
            );
        }

        Ok(serde_json::Value::Object(entry))
    }
}

impl Sink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn handle(&self, result: &DetectionResult) -> Result<(), WasmwardError> {
        let entry = Self::flatten(result)?;
        let line = serde_json::to_string_pretty(&entry)
            .map_err(|e| SinkError::Serialize(e.to_string()))?;

        let mut guard = self.file.lock().await;
        if let Some(file) = guard.as_mut() {
            file.write_all(line.as_bytes())
                .await
                .map_err(|e| SinkError::Io(e.to_string()))?;
            file.write_all(b"\n")
                .await
                .map_err(|e| SinkError::Io(e.to_string()))?;
        }
        drop(guard);

        tracing::warn!(
            rule = %result.rule_name,
            severity = %result.severity,
            confidence = result.confidence,
            event_type = %result.event.kind,
            event_id = %result.event.id,
            "{}",
            result.description,
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), WasmwardError> {
        let mut guard = self.file.lock().await;
        if let Some(mut file) = guard.take() {
            file.flush()
                .await
                .map_err(|e| SinkError::Io(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasmward_core::event::{AttrMap, Event, EventKind, EventPayload, ProcessPayload};
    use wasmward_core::types::{ProcessInfo, Severity};

    fn sample_result() -> DetectionResult {
        let event = Event::process(
            "process_collector",
            ProcessPayload {
                action: Some("create".to_owned()),
                process: ProcessInfo {
                    pid: 77,
                    ppid: 1,
                    name: "nc".to_owned(),
                    executable: "/usr/bin/nc".to_owned(),
                    command_line: "nc -l 4444".to_owned(),
                    user: "1000".to_owned(),
                    group: "1000".to_owned(),
                },
                extra: AttrMap::new(),
            },
        );
        DetectionResult::from_threat_level("shellwatch", 6, event).unwrap()
    }

    #[tokio::test]
    async fn writes_flattened_json_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detections.log");
        let path_str = path.to_str().unwrap().to_owned();

        let sink = LogSink::new(Some(path_str.as_str())).await.unwrap();
        sink.handle(&sample_result()).await.unwrap();
        sink.handle(&sample_result()).await.unwrap();
        sink.close().await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        // pretty JSON 객체들의 연접 — 스트림 디시리얼라이저로 파싱
        let objects: Vec<serde_json::Value> = serde_json::Deserializer::from_str(&raw)
            .into_iter::<serde_json::Value>()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(objects.len(), 2);

        let first = &objects[0];
        assert_eq!(first["rule_name"], "shellwatch");
        assert_eq!(first["severity"], "high");
        assert_eq!(first["threat"], true);
        assert_eq!(first["event_type"], "process");
        // 프로세스 서브레코드가 최상위로 평탄화됨
        assert_eq!(first["process"]["pid"], 77);
        assert_eq!(first["process"]["command_line"], "nc -l 4444");
        // metadata 미설정 시 키 자체가 없음
        assert!(first.get("metadata").is_none());
    }

    #[tokio::test]
    async fn works_without_file() {
        let sink = LogSink::new(None).await.unwrap();
        sink.handle(&sample_result()).await.unwrap();
        sink.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let sink = LogSink::new(None).await.unwrap();
        sink.close().await.unwrap();
        sink.close().await.unwrap();
    }

    #[tokio::test]
    async fn metadata_is_included_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detections.log");
        let path_str = path.to_str().unwrap().to_owned();

        let mut result = sample_result();
        let mut meta = AttrMap::new();
        meta.insert(
            "pattern".to_owned(),
            wasmward_core::event::AttrValue::from("nc"),
        );
        result.metadata = Some(meta);

        let sink = LogSink::new(Some(path_str.as_str())).await.unwrap();
        sink.handle(&result).await.unwrap();
        sink.close().await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let object: serde_json::Value = serde_json::Deserializer::from_str(&raw)
            .into_iter::<serde_json::Value>()
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(object["metadata"]["pattern"], "nc");
    }

    #[test]
    fn flatten_generic_payload_has_no_subrecord() {
        let event = Event::new(
            EventKind::Network,
            "synthetic",
            EventPayload::Generic(AttrMap::new()),
        );
        let result = DetectionResult::from_threat_level("r", 2, event).unwrap();
        let value = LogSink::flatten(&result).unwrap();
        assert!(value.get("process").is_none());
        assert!(value.get("network").is_none());
        assert!(value.get("file").is_none());
        assert_eq!(value["severity"], Severity::Low.as_str());
    }
}
