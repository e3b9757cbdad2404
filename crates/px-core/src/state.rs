//! Hot-swappable routing state.
//!
//! Recompilation builds a complete new snapshot and then swaps it in. Readers
//! on the request path always see either the old or the new snapshot in full.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::decision::{decide, ActiveProfileState, Decision, ProxyRequest};
use crate::types::BypassConfig;

/// One complete, immutable view of the routing inputs.
#[derive(Debug, Clone, Default)]
pub struct RoutingSnapshot {
    /// Incremented on every swap
    pub generation: u64,
    pub profile: Arc<ActiveProfileState>,
    pub bypass: Arc<BypassConfig>,
}

impl RoutingSnapshot {
    pub fn decide(&self, request: &ProxyRequest<'_>) -> Decision {
        decide(request, &self.profile, &self.bypass)
    }
}

/// Uses `ArcSwap` for lock-free reads and atomic replacement.
pub struct HotProfileState {
    inner: ArcSwap<RoutingSnapshot>,
}

impl HotProfileState {
    pub fn new(profile: ActiveProfileState, bypass: BypassConfig) -> Self {
        Self {
            inner: ArcSwap::new(Arc::new(RoutingSnapshot {
                generation: 0,
                profile: Arc::new(profile),
                bypass: Arc::new(bypass),
            })),
        }
    }

    /// Current snapshot. Holding it keeps that generation alive.
    pub fn load(&self) -> Arc<RoutingSnapshot> {
        self.inner.load_full()
    }

    pub fn generation(&self) -> u64 {
        self.inner.load().generation
    }

    /// Route a request against the current snapshot.
    pub fn decide(&self, request: &ProxyRequest<'_>) -> Decision {
        self.inner.load().decide(request)
    }

    /// Swap in a profile and a bypass list together. Returns the new generation.
    pub fn replace(&self, profile: ActiveProfileState, bypass: BypassConfig) -> u64 {
        let profile = Arc::new(profile);
        let bypass = Arc::new(bypass);
        self.swap(|_| RoutingSnapshot {
            generation: 0,
            profile: Arc::clone(&profile),
            bypass: Arc::clone(&bypass),
        })
    }

    /// Swap in a freshly compiled profile. Returns the new generation.
    pub fn replace_profile(&self, profile: ActiveProfileState) -> u64 {
        let profile = Arc::new(profile);
        self.swap(|current| RoutingSnapshot {
            generation: 0,
            profile: Arc::clone(&profile),
            bypass: Arc::clone(&current.bypass),
        })
    }

    pub fn replace_bypass(&self, bypass: BypassConfig) -> u64 {
        let bypass = Arc::new(bypass);
        self.swap(|current| RoutingSnapshot {
            generation: 0,
            profile: Arc::clone(&current.profile),
            bypass: Arc::clone(&bypass),
        })
    }

    fn swap<F>(&self, build: F) -> u64
    where
        F: Fn(&RoutingSnapshot) -> RoutingSnapshot,
    {
        // the closure may rerun on contention; the generation always follows
        // the snapshot it replaces
        let previous = self.inner.rcu(|current| {
            let mut next = build(current);
            next.generation = current.generation + 1;
            next
        });
        let generation = previous.generation + 1;
        log::debug!("routing state swapped to generation {generation}");
        generation
    }
}

impl std::fmt::Debug for HotProfileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HotProfileState")
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}
