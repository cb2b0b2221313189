use chrono::Utc;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::config::AppConfig;
use crate::engine::{CycleReport, Engine};
use crate::error::Result;
use crate::poller::SessionPoller;
use crate::signal::Signals;

const SLEEP_STEP: Duration = Duration::from_secs(1);

/// Fixed-interval driver: poll, run one engine cycle, sleep.
pub struct Daemon {
    config_path: PathBuf,
    engine: Engine,
    poller: SessionPoller,
    signals: Signals,
}

impl Daemon {
    pub fn new(config_path: &Path, config: AppConfig, signals: Signals) -> Result<Self> {
        let poller = SessionPoller::from_config(&config)?;
        Ok(Self {
            config_path: config_path.to_path_buf(),
            engine: Engine::new(config),
            poller,
            signals,
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn run(&mut self) {
        info!("Service started. Waiting for streams...");
        while !self.signals.shutdown_requested() {
            self.tick();
            self.sleep_interval();
        }
        info!("Service stopped");
    }

    /// Apply a pending reload, then run one cycle.
    pub fn tick(&mut self) -> CycleReport {
        if self.signals.take_reload() {
            self.reload();
        }
        let report = self.engine.run_cycle(&mut self.poller, Utc::now());
        debug!(
            "Cycle: {} active, {} copied, {} moved back, {} queued, {} errors",
            report.active, report.promoted, report.demoted, report.queued, report.errors
        );
        report
    }

    /// A configuration that fails to load leaves the running one in place.
    fn reload(&mut self) {
        let config = match AppConfig::load(&self.config_path) {
            Ok(config) => config,
            Err(e) => {
                error!("Config reload failed, keeping previous configuration: {}", e);
                return;
            }
        };
        if let Err(e) = self.poller.reconfigure(&config) {
            error!("Config reload failed, keeping previous configuration: {}", e);
            return;
        }
        self.engine.reload(config);
        info!("Configuration reloaded from {}", self.config_path.display());
    }

    fn sleep_interval(&self) {
        let interval = Duration::from_secs(self.engine.config().check_interval_secs.max(1));
        let started = Instant::now();
        while !self.signals.shutdown_requested() {
            let elapsed = started.elapsed();
            if elapsed >= interval {
                break;
            }
            thread::sleep(SLEEP_STEP.min(interval - elapsed));
        }
    }
}
