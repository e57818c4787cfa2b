#[cfg(feature = "cli")]
use std::sync::Mutex;
use std::time::{Duration, Instant};
#[cfg(feature = "cli")]
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// 各階段的耗時與記憶體快照
#[derive(Debug, Clone)]
pub struct PhaseStats {
    pub phase: String,
    pub elapsed: Duration,
    pub memory_mb: Option<u64>,
}

/// 比價流程的資源監控，停用時所有方法都是空操作
pub struct ProcessMonitor {
    enabled: bool,
    started: Instant,
    #[cfg(feature = "cli")]
    system: Mutex<System>,
    #[cfg(feature = "cli")]
    pid: Option<Pid>,
    phases: std::sync::Mutex<Vec<PhaseStats>>,
}

impl ProcessMonitor {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            started: Instant::now(),
            #[cfg(feature = "cli")]
            system: Mutex::new(System::new()),
            #[cfg(feature = "cli")]
            pid: sysinfo::get_current_pid().ok(),
            phases: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[cfg(feature = "cli")]
    fn memory_mb(&self) -> Option<u64> {
        let pid = self.pid?;
        let mut system = self.system.lock().ok()?;
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        system.process(pid).map(|p| p.memory() / 1024 / 1024)
    }

    #[cfg(not(feature = "cli"))]
    fn memory_mb(&self) -> Option<u64> {
        None
    }

    /// 記錄一個階段結束時的狀態
    pub fn record_phase(&self, phase: &str) {
        if !self.enabled {
            return;
        }

        let stats = PhaseStats {
            phase: phase.to_string(),
            elapsed: self.started.elapsed(),
            memory_mb: self.memory_mb(),
        };

        match stats.memory_mb {
            Some(mb) => tracing::info!("📊 {} - Memory: {}MB, Time: {:?}", phase, mb, stats.elapsed),
            None => tracing::info!("📊 {} - Time: {:?}", phase, stats.elapsed),
        }

        if let Ok(mut phases) = self.phases.lock() {
            phases.push(stats);
        }
    }

    pub fn phases(&self) -> Vec<PhaseStats> {
        self.phases.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn log_final_stats(&self) {
        if !self.enabled {
            return;
        }
        let peak = self.phases().iter().filter_map(|p| p.memory_mb).max();
        tracing::info!(
            "📊 Final Stats - Total Time: {:?}, Peak Memory: {}",
            self.started.elapsed(),
            peak.map(|mb| format!("{}MB", mb))
                .unwrap_or_else(|| "n/a".to_string())
        );
    }
}

impl Default for ProcessMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}
