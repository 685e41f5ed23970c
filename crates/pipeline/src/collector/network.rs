//! 네트워크 수집기 — 커널 TCP 테이블 폴링
//!
//! 주기적으로 `<proc_root>/net/tcp`와 `tcp6`를 파싱하여 ESTABLISHED
//! 상태의 의심 연결(의심 포트 또는 비사설 목적지)마다 네트워크 이벤트를
//! 발행합니다.
//!
//! 연결 단위로 중복을 제거합니다 — 같은 연결이 여러 폴링에 걸쳐 보여도
//! 이벤트는 한 번만 발행됩니다 (at-most-once). 연결이 사라졌다가 다시
//! 나타나면 새 연결로 취급합니다.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use wasmward_core::collector::{Collector, CollectorStatus};
use wasmward_core::config::NetworkCollectorConfig;
use wasmward_core::error::{PipelineError, WasmwardError};
use wasmward_core::event::{AttrMap, AttrValue, Event, NetworkPayload};
use wasmward_core::types::NetworkInfo;

/// 수집기 이름 — 발행하는 이벤트의 source 레이블로도 사용됩니다.
pub const NETWORK_COLLECTOR_NAME: &str = "network_collector";

/// ESTABLISHED 상태 코드 (커널 TCP 테이블의 st 필드)
const TCP_ESTABLISHED: &str = "01";

/// TCP 테이블의 연결 엔트리 하나
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ConnEntry {
    protocol: &'static str,
    local: (IpAddr, u16),
    remote: (IpAddr, u16),
}

/// 네트워크 수집기
pub struct NetworkCollector {
    config: NetworkCollectorConfig,
    tx: Option<mpsc::Sender<Event>>,
    rx: Option<mpsc::Receiver<Event>>,
    cancel: Option<CancellationToken>,
    status: CollectorStatus,
}

impl NetworkCollector {
    /// 새 네트워크 수집기를 생성합니다.
    pub fn new(config: NetworkCollectorConfig, channel_capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(channel_capacity.max(1));
        Self {
            config,
            tx: Some(tx),
            rx: Some(rx),
            cancel: None,
            status: CollectorStatus::Idle,
        }
    }

    async fn poll_loop(
        config: NetworkCollectorConfig,
        tx: mpsc::Sender<Event>,
        cancel: CancellationToken,
    ) {
        let proc_root = PathBuf::from(&config.proc_root);
        let mut interval = tokio::time::interval(Duration::from_millis(config.poll_interval_ms));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // 직전 폴링에서 관측한 의심 연결 집합 (연결 단위 중복 제거)
        let mut previous: HashSet<ConnEntry> = HashSet::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("network collector received shutdown signal");
                    break;
                }
                _ = interval.tick() => {
                    let mut current = HashSet::new();

                    for protocol in ["tcp", "tcp6"] {
                        let path = proc_root.join("net").join(protocol);
                        let Ok(table) = tokio::fs::read_to_string(&path).await else {
                            continue;
                        };
                        for entry in parse_tcp_table(&table, protocol) {
                            if is_suspicious(
                                &entry.remote.0,
                                entry.remote.1,
                                &config.suspicious_ports,
                            ) {
                                current.insert(entry);
                            }
                        }
                    }

                    for entry in current.difference(&previous) {
                        let mut extra = AttrMap::new();
                        extra.insert("risk_level".to_owned(), AttrValue::from("high"));

                        let event = Event::network(
                            NETWORK_COLLECTOR_NAME,
                            NetworkPayload {
                                action: None,
                                network: NetworkInfo {
                                    protocol: entry.protocol.to_owned(),
                                    source_ip: entry.local.0.to_string(),
                                    source_port: entry.local.1,
                                    dest_ip: entry.remote.0.to_string(),
                                    dest_port: entry.remote.1,
                                    direction: "outbound".to_owned(),
                                    data_size: 0,
                                    process_name: String::new(),
                                },
                                extra,
                            },
                        );

                        if tx.try_send(event).is_err() {
                            warn!("collector channel full, dropping network event");
                        }
                    }

                    previous = current;
                }
            }
        }
    }
}

impl Collector for NetworkCollector {
    fn name(&self) -> &str {
        NETWORK_COLLECTOR_NAME
    }

    fn start(&mut self, cancel: CancellationToken) -> Result<(), WasmwardError> {
        let tx = self.tx.take().ok_or_else(|| {
            WasmwardError::Pipeline(PipelineError::Collector {
                name: NETWORK_COLLECTOR_NAME.to_owned(),
                reason: "collector already started".to_owned(),
            })
        })?;
        let config = self.config.clone();
        self.cancel = Some(cancel.clone());
        self.status = CollectorStatus::Running;

        tokio::spawn(Self::poll_loop(config, tx, cancel));
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

/// 커널 TCP 테이블에서 ESTABLISHED 연결을 파싱합니다.
fn parse_tcp_table(table: &str, protocol: &str) -> Vec<ConnEntry> {
    let protocol: &'static str = if protocol == "tcp6" { "tcp6" } else { "tcp" };
    let mut entries = Vec::new();

    for line in table.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 || fields[3] != TCP_ESTABLISHED {
            continue;
        }
        let Some(local) = parse_hex_endpoint(fields[1]) else {
            continue;
        };
        let Some(remote) = parse_hex_endpoint(fields[2]) else {
            continue;
        };
        entries.push(ConnEntry {
            protocol,
            local,
            remote,
        });
    }

    entries
}

/// `IP:PORT` 16진 주소 쌍을 파싱합니다.
///
/// 커널은 주소를 네이티브 엔디언 32비트 워드의 16진 문자열로 출력하므로,
/// 각 워드를 리틀엔디언 바이트 순서로 되돌려 복원합니다.
fn parse_hex_endpoint(addr: &str) -> Option<(IpAddr, u16)> {
    let (ip_hex, port_hex) = addr.split_once(':')?;
    let port = u16::from_str_radix(port_hex, 16).ok()?;

    let ip = match ip_hex.len() {
        8 => {
            let word = u32::from_str_radix(ip_hex, 16).ok()?;
            IpAddr::V4(Ipv4Addr::from(word.to_le_bytes()))
        }
        32 => {
            let mut bytes = [0u8; 16];
            for (i, chunk) in ip_hex.as_bytes().chunks(8).enumerate() {
                let chunk = std::str::from_utf8(chunk).ok()?;
                let word = u32::from_str_radix(chunk, 16).ok()?;
                bytes[i * 4..(i + 1) * 4].copy_from_slice(&word.to_le_bytes());
            }
            IpAddr::V6(Ipv6Addr::from(bytes))
        }
        _ => return None,
    };

    Some((ip, port))
}

/// 원격 목적지가 의심스러운지 판정합니다.
///
/// 의심 포트 목록에 있거나, 사설/루프백 범위를 벗어난 목적지이면
/// 의심으로 판정합니다.
fn is_suspicious(remote_ip: &IpAddr, remote_port: u16, suspicious_ports: &[u16]) -> bool {
    if suspicious_ports.contains(&remote_port) {
        return true;
    }

    match remote_ip {
        IpAddr::V4(v4) => {
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_unspecified()
                || v4.is_link_local())
        }
        IpAddr::V6(v6) => {
            let unique_local = (v6.segments()[0] & 0xfe00) == 0xfc00;
            let link_local = (v6.segments()[0] & 0xffc0) == 0xfe80;
            !(v6.is_loopback() || v6.is_unspecified() || unique_local || link_local)
        }
    }
}
