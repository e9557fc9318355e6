use sqlx::PgPool;
use std::time::Instant;

use crate::observer::error::{ObserverError, ObserverWarning};
use crate::observer::traits::{ObserverRing, Signal};

/// State flowing through the pipeline for one signal
#[derive(Debug, Clone)]
pub struct ObserverContext {
    pub signal: Signal,
    pub pool: PgPool,

    // Performance tracking
    pub start_time: Instant,
    pub current_ring: Option<ObserverRing>,

    // Error and warning accumulation
    pub errors: Vec<ObserverError>,
    pub warnings: Vec<ObserverWarning>,
}

impl ObserverContext {
    pub fn new(signal: Signal, pool: PgPool) -> Self {
        Self {
            signal,
            pool,
            start_time: Instant::now(),
            current_ring: None,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: ObserverError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ObserverWarning) {
        self.warnings.push(warning);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn execution_time(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }
}
