//! 프로세스 수집기 — 프로세스 테이블 폴링
//!
//! 주기적으로 `<proc_root>`를 스캔하여 새로 나타난 PID마다 프로세스
//! 이벤트를 발행합니다. 커맨드라인이 의심 패턴(정규식)에 매칭되면
//! `suspicious_activity` 액션과 매칭된 패턴을 붙입니다.
//!
//! 첫 스캔은 기준선으로만 사용됩니다 — 수집기 시작 시점에 이미 떠 있던
//! 프로세스는 이벤트를 만들지 않습니다.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use wasmward_core::collector::{Collector, CollectorStatus};
use wasmward_core::config::ProcessCollectorConfig;
use wasmward_core::error::{PipelineError, WasmwardError};
use wasmward_core::event::{AttrMap, AttrValue, Event, ProcessPayload};
use wasmward_core::types::ProcessInfo;

/// 수집기 이름 — 발행하는 이벤트의 source 레이블로도 사용됩니다.
pub const PROCESS_COLLECTOR_NAME: &str = "process_collector";

/// 프로세스 수집기
pub struct ProcessCollector {
    config: ProcessCollectorConfig,
    patterns: Vec<Regex>,
    // 시작 시 폴링 태스크로 이동 — 태스크 종료가 곧 스트림 종료
    tx: Option<mpsc::Sender<Event>>,
    rx: Option<mpsc::Receiver<Event>>,
    cancel: Option<CancellationToken>,
    status: CollectorStatus,
}

impl ProcessCollector {
    /// 새 프로세스 수집기를 생성합니다.
    ///
    /// 의심 패턴은 생성 시점에 컴파일되며, 잘못된 정규식은 에러를
    /// 반환합니다.
    pub fn new(
        config: ProcessCollectorConfig,
        channel_capacity: usize,
    ) -> Result<Self, WasmwardError> {
        let patterns = config
            .suspicious_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    WasmwardError::Pipeline(PipelineError::Collector {
                        name: PROCESS_COLLECTOR_NAME.to_owned(),
                        reason: format!("invalid suspicious pattern '{p}': {e}"),
                    })
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let (tx, rx) = mpsc::channel(channel_capacity.max(1));
        Ok(Self {
            config,
            patterns,
            tx: Some(tx),
            rx: Some(rx),
            cancel: None,
            status: CollectorStatus::Idle,
        })
    }

    async fn poll_loop(
        config: ProcessCollectorConfig,
        patterns: Vec<Regex>,
        tx: mpsc::Sender<Event>,
        cancel: CancellationToken,
    ) {
        let proc_root = PathBuf::from(&config.proc_root);
        let mut interval = tokio::time::interval(Duration::from_millis(config.poll_interval_ms));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // 기준선 스캔 — 이미 떠 있는 프로세스는 이벤트화하지 않음
        let mut known = scan_pids(&proc_root).await;
        debug!(count = known.len(), "process collector baseline scan complete");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("process collector received shutdown signal");
                    break;
                }
                _ = interval.tick() => {
                    let current = scan_pids(&proc_root).await;

                    for pid in current.difference(&known) {
                        let Some(info) = read_process_info(&proc_root, *pid).await else {
                            // 스캔과 읽기 사이에 프로세스가 사라질 수 있음
                            continue;
                        };

                        let matched = patterns
                            .iter()
                            .find(|re| re.is_match(&info.command_line) || re.is_match(&info.name));

                        let mut extra = AttrMap::new();
                        let action = match matched {
                            Some(re) => {
                                extra.insert("pattern".to_owned(), AttrValue::from(re.as_str()));
                                extra.insert("risk_level".to_owned(), AttrValue::from("medium"));
                                "suspicious_activity"
                            }
                            None => "create",
                        };

                        let event = Event::process(
                            PROCESS_COLLECTOR_NAME,
                            ProcessPayload {
                                action: Some(action.to_owned()),
                                process: info,
                                extra,
                            },
                        );

                        if tx.try_send(event).is_err() {
                            warn!("collector channel full, dropping process event");
                        }
                    }

                    known = current;
                }
            }
        }
    }
}

impl Collector for ProcessCollector {
    fn name(&self) -> &str {
        PROCESS_COLLECTOR_NAME
    }

    fn start(&mut self, cancel: CancellationToken) -> Result<(), WasmwardError> {
        let tx = self.tx.take().ok_or_else(|| {
            WasmwardError::Pipeline(PipelineError::Collector {
                name: PROCESS_COLLECTOR_NAME.to_owned(),
                reason: "collector already started".to_owned(),
            })
        })?;
        let config = self.config.clone();
        let patterns = self.patterns.clone();
        self.cancel = Some(cancel.clone());
        self.status = CollectorStatus::Running;

        tokio::spawn(Self::poll_loop(config, patterns, tx, cancel));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), WasmwardError> {
        if let Some(cancel) = &self.cancel {
            cancel.cancel();
        }
        self.status = CollectorStatus::Stopped;
        Ok(())
    }

    fn take_events(&mut self) -> Option<mpsc::Receiver<Event>> {
        self.rx.take()
    }

    fn status(&self) -> CollectorStatus {
        self.status.clone()
    }
}

/// 프로세스 테이블에서 현재 PID 집합을 스캔합니다.
async fn scan_pids(proc_root: &Path) -> HashSet<i32> {
    let mut pids = HashSet::new();
    let Ok(mut entries) = tokio::fs::read_dir(proc_root).await else {
        return pids;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if let Some(pid) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<i32>().ok())
        {
            pids.insert(pid);
        }
    }
    pids
}

/// `<proc_root>/<pid>/{stat,cmdline,exe,status}`에서 프로세스 정보를 조립합니다.
///
/// 프로세스가 이미 사라졌거나 stat을 읽을 수 없으면 `None`을 반환합니다.
async fn read_process_info(proc_root: &Path, pid: i32) -> Option<ProcessInfo> {
    let pid_dir = proc_root.join(pid.to_string());

    let stat = tokio::fs::read_to_string(pid_dir.join("stat")).await.ok()?;
    let (name, ppid) = parse_stat(&stat)?;

    let command_line = match tokio::fs::read(pid_dir.join("cmdline")).await {
        Ok(raw) => String::from_utf8_lossy(&raw)
            .replace('\0', " ")
            .trim()
            .to_owned(),
        Err(_) => String::new(),
    };

    let executable = tokio::fs::read_link(pid_dir.join("exe"))
        .await
        .map(|p| p.display().to_string())
        .unwrap_or_default();

    let status = tokio::fs::read_to_string(pid_dir.join("status"))
        .await
        .unwrap_or_default();
    let user = parse_status_id(&status, "Uid:");
    let group = parse_status_id(&status, "Gid:");

    Some(ProcessInfo {
        pid,
        ppid,
        name,
        executable,
        command_line,
        user,
        group,
    })
}

/// stat 라인에서 (프로세스명, PPID)를 파싱합니다.
///
/// 프로세스명은 괄호로 감싸여 있고 공백을 포함할 수 있으므로,
/// 마지막 `)`를 기준으로 자릅니다.
fn parse_stat(stat: &str) -> Option<(String, i32)> {
    let open = stat.find('(')?;
    let close = stat.rfind(')')?;
    let name = stat.get(open + 1..close)?.to_owned();

    // `)` 이후: state ppid pgrp ...
    let mut rest = stat.get(close + 1..)?.split_whitespace();
    let _state = rest.next()?;
    let ppid = rest.next()?.parse::<i32>().ok()?;

    Some((name, ppid))
}

/// status 파일에서 `Uid:`/`Gid:` 라인의 real ID를 추출합니다.
fn parse_status_id(status: &str, tag: &str) -> String {
    status
        .lines()
        .find(|line| line.starts_with(tag))
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("unknown")
        .to_owned()
}
