//! Host CPU monitoring with threshold-triggered restart.
//!
//! Samples overall CPU usage on an interval and keeps a fixed-capacity
//! history ring. When usage crosses the configured threshold the monitor
//! arms a one-shot restart latch and exits the process after a delay,
//! leaving the supervisor (systemd, container runtime) to bring it back.
//! All state lives in an explicit struct behind the handle; nothing here
//! is process-global.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use sysinfo::System;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration};
use tracing::{info, warn};

use crate::config::MonitorConfig;
use crate::models::{CpuReading, CpuReport, SystemInfo};

#[derive(Debug, Default)]
struct MonitorState {
    history: VecDeque<CpuReading>,
    restart_scheduled: bool,
}

/// Cloneable read/report handle shared with the web layer.
#[derive(Clone)]
pub struct MonitorHandle {
    state: Arc<RwLock<MonitorState>>,
}

impl MonitorHandle {
    pub async fn restart_scheduled(&self) -> bool {
        self.state.read().await.restart_scheduled
    }

    /// Build the CPU report served by `GET /system/cpu`.
    pub async fn report(&self, history_len: usize) -> CpuReport {
        let state = self.state.read().await;
        let current = state.history.back().map(|r| r.usage).unwrap_or(0.0);
        let average = if state.history.is_empty() {
            0.0
        } else {
            let sum: f64 = state.history.iter().map(|r| r.usage).sum();
            round2(sum / state.history.len() as f64)
        };
        let history: Vec<CpuReading> = state
            .history
            .iter()
            .rev()
            .take(history_len)
            .rev()
            .copied()
            .collect();
        drop(state);

        CpuReport {
            current,
            average,
            history,
            system_info: gather_system_info(),
            restart_scheduled: self.restart_scheduled().await,
        }
    }
}

pub struct CpuMonitor {
    config: MonitorConfig,
    state: Arc<RwLock<MonitorState>>,
    system: System,
}

impl CpuMonitor {
    pub fn new(config: MonitorConfig) -> (Self, MonitorHandle) {
        let state = Arc::new(RwLock::new(MonitorState::default()));
        let handle = MonitorHandle {
            state: state.clone(),
        };
        let monitor = Self {
            config,
            state,
            system: System::new(),
        };
        (monitor, handle)
    }

    /// Sampling loop; run on its own task.
    pub async fn start(mut self) {
        let mut ticker = interval(Duration::from_secs(self.config.sample_interval_secs));
        loop {
            ticker.tick().await;
            self.system.refresh_cpu_usage();
            let usage = round2(self.system.global_cpu_info().cpu_usage() as f64);

            let schedule_restart = {
                let mut state = self.state.write().await;
                record_sample(&mut state, usage, self.config.history_size);
                usage > self.config.restart_threshold_percent && !arm_restart_latch(&mut state)
            };

            if schedule_restart {
                warn!(
                    "High CPU usage detected: {}%. Scheduling restart in {} seconds",
                    usage, self.config.restart_delay_secs
                );
                let delay = Duration::from_secs(self.config.restart_delay_secs);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    info!("Restarting server due to sustained high CPU usage");
                    // The process supervisor restarts the service
                    std::process::exit(0);
                });
            }
        }
    }
}

/// Push one sample, evicting the oldest past capacity.
fn record_sample(state: &mut MonitorState, usage: f64, capacity: usize) {
    state.history.push_back(CpuReading {
        usage,
        timestamp: Utc::now(),
    });
    while state.history.len() > capacity {
        state.history.pop_front();
    }
}

/// Arm the one-shot restart latch. Returns the previous value, so the first
/// caller to arm it sees `false`.
fn arm_restart_latch(state: &mut MonitorState) -> bool {
    std::mem::replace(&mut state.restart_scheduled, true)
}

fn gather_system_info() -> SystemInfo {
    let mut system = System::new();
    system.refresh_memory();
    let load = System::load_average();

    SystemInfo {
        platform: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        total_memory: system.total_memory(),
        free_memory: system.free_memory(),
        uptime: System::uptime(),
        load_average: [load.one, load.five, load.fifteen],
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
