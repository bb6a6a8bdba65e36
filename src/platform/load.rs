//! Load signal policies
//!
//! The engine asks whether the device is under load to decide when to
//! demand handshake cookies.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Decides whether the device is under resource pressure
pub trait LoadPolicy: Send + Sync {
    fn is_under_load(&self) -> bool;
}

/// Always reports no load, so cookie replies are never demanded
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverUnderLoad;

impl LoadPolicy for NeverUnderLoad {
    fn is_under_load(&self) -> bool {
        false
    }
}

/// Load flag raised and cleared by the application
#[derive(Debug, Default)]
pub struct ManualLoad {
    under_load: AtomicBool,
}

impl ManualLoad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, under_load: bool) {
        let previous = self.under_load.swap(under_load, Ordering::Relaxed);
        if previous != under_load {
            tracing::info!("Load signal changed: under_load={}", under_load);
        }
    }
}

impl LoadPolicy for ManualLoad {
    fn is_under_load(&self) -> bool {
        self.under_load.load(Ordering::Relaxed)
    }
}

impl<P: LoadPolicy + ?Sized> LoadPolicy for Arc<P> {
    fn is_under_load(&self) -> bool {
        (**self).is_under_load()
    }
}
