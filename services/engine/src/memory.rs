//! Soft memory ceiling for runtime admissions

use crate::error::EngineError;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Source of the engine's current memory footprint
pub trait MemoryProbe: Send + Sync {
    fn used_bytes(&self) -> anyhow::Result<u64>;
}

/// Resident set size of this process
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessMemoryProbe;

impl MemoryProbe for ProcessMemoryProbe {
    fn used_bytes(&self) -> anyhow::Result<u64> {
        torq_health_check::process_memory_bytes()
    }
}

/// Settable probe for tests and embedding
#[derive(Debug, Default)]
pub struct FixedMemoryProbe {
    bytes: AtomicU64,
}

impl FixedMemoryProbe {
    pub fn new(bytes: u64) -> Self {
        Self {
            bytes: AtomicU64::new(bytes),
        }
    }

    pub fn set(&self, bytes: u64) {
        self.bytes.store(bytes, Ordering::Relaxed);
    }
}

impl MemoryProbe for FixedMemoryProbe {
    fn used_bytes(&self) -> anyhow::Result<u64> {
        Ok(self.bytes.load(Ordering::Relaxed))
    }
}

/// Switches new admissions off while usage is above the ceiling.
///
/// Running workers are never touched.
pub struct AdmissionGate {
    probe: Arc<dyn MemoryProbe>,
    limit_bytes: u64,
    open: AtomicBool,
    last_sample: AtomicU64,
}

impl AdmissionGate {
    pub fn new(probe: Arc<dyn MemoryProbe>, limit_bytes: u64) -> Self {
        Self {
            probe,
            limit_bytes,
            open: AtomicBool::new(true),
            last_sample: AtomicU64::new(0),
        }
    }

    pub fn limit_bytes(&self) -> u64 {
        self.limit_bytes
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn last_sample(&self) -> u64 {
        self.last_sample.load(Ordering::Relaxed)
    }

    /// Sample the probe and update the gate. A failed sample keeps the
    /// previous decision.
    pub fn evaluate(&self) -> bool {
        let used = match self.probe.used_bytes() {
            Ok(used) => used,
            Err(e) => {
                warn!("Failed to sample memory usage, keeping admission state: {}", e);
                return self.is_open();
            }
        };
        self.last_sample.store(used, Ordering::Relaxed);

        let open = used <= self.limit_bytes;
        let was_open = self.open.swap(open, Ordering::AcqRel);
        if was_open && !open {
            warn!(
                used_bytes = used,
                limit_bytes = self.limit_bytes,
                "Memory ceiling exceeded, rejecting new strategy admissions"
            );
        } else if !was_open && open {
            info!(
                used_bytes = used,
                limit_bytes = self.limit_bytes,
                "Memory back under ceiling, admissions reopened"
            );
        }
        open
    }

    /// Fresh evaluation for one admission request
    pub fn admit(&self) -> Result<(), EngineError> {
        if self.evaluate() {
            return Ok(());
        }
        Err(EngineError::AdmissionRejected {
            reason: format!(
                "memory usage {} bytes exceeds ceiling {} bytes",
                self.last_sample(),
                self.limit_bytes
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingProbe;

    impl MemoryProbe for FailingProbe {
        fn used_bytes(&self) -> anyhow::Result<u64> {
            Err(anyhow::anyhow!("no procfs"))
        }
    }

    #[test]
    fn test_gate_follows_usage() {
        let probe = Arc::new(FixedMemoryProbe::new(100));
        let gate = AdmissionGate::new(probe.clone(), 1_000);
        assert!(gate.admit().is_ok());

        probe.set(2_000);
        assert!(matches!(
            gate.admit(),
            Err(EngineError::AdmissionRejected { .. })
        ));
        assert!(!gate.is_open());

        probe.set(500);
        assert!(gate.evaluate());
        assert_eq!(gate.last_sample(), 500);
    }

    #[test]
    fn test_probe_failure_keeps_state() {
        let gate = AdmissionGate::new(Arc::new(FailingProbe), 1_000);
        assert!(gate.evaluate());
        assert!(gate.admit().is_ok());
    }

    #[test]
    fn test_process_probe_reports_usage() {
        assert!(ProcessMemoryProbe.used_bytes().unwrap() > 0);
    }
}
