use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::agent::classifier::Classifier;
use crate::agent::dedup::Screening;
use crate::agent::features::FeatureVector;

/// Process-wide trading state shared by the dedup filter, the gate and the
/// agent loop.
#[derive(Debug, Default)]
pub struct TradingSession {
    in_flight: AtomicBool,
    ready: AtomicBool,
    halted: AtomicBool,
    trending_word: RwLock<String>,
}

impl TradingSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
        info!("Trading session ready");
    }

    /// Ready and not halted.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst) && !self.is_halted()
    }

    /// Stop admitting trades for the rest of the process lifetime.
    pub fn halt(&self) {
        if !self.halted.swap(true, Ordering::SeqCst) {
            warn!("Trading session halted");
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    pub fn trade_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Claim the single trade slot. `None` while another trade holds it.
    pub fn try_admit(self: &Arc<Self>) -> Option<AdmissionPermit> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| AdmissionPermit {
                session: Arc::clone(self),
            })
    }

    pub fn set_trending_word(&self, word: &str) {
        *self.trending_word.write() = word.to_string();
    }

    pub fn trending_word(&self) -> String {
        self.trending_word.read().clone()
    }
}

/// Holds the trade slot; releases it on drop, whatever the trade outcome.
#[derive(Debug)]
pub struct AdmissionPermit {
    session: Arc<TradingSession>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.session.in_flight.store(false, Ordering::SeqCst);
        debug!("Trade slot released");
    }
}

#[derive(Debug)]
pub enum Decision {
    Skip(&'static str),
    /// Another trade is in flight; the event is dropped, not queued.
    Busy,
    Admit(AdmissionPermit),
}

pub struct DecisionGate {
    classifier: Arc<dyn Classifier>,
    session: Arc<TradingSession>,
}

impl DecisionGate {
    pub fn new(classifier: Arc<dyn Classifier>, session: Arc<TradingSession>) -> Self {
        Self { classifier, session }
    }

    pub fn evaluate(&self, screening: &Screening, features: &FeatureVector) -> Decision {
        if !screening.is_admitted() {
            return Decision::Skip("not admitted by dedup filter");
        }
        if self.session.is_halted() {
            return Decision::Skip("session halted");
        }
        if self.session.trade_in_flight() {
            return Decision::Busy;
        }

        match self.classifier.should_buy(features) {
            Ok(true) => {}
            Ok(false) => return Decision::Skip("classifier declined"),
            Err(e) => {
                warn!("Classifier failed, treating as no-buy: {}", e);
                return Decision::Skip("classifier error");
            }
        }

        match self.session.try_admit() {
            Some(permit) => Decision::Admit(permit),
            None => Decision::Busy,
        }
    }
}
