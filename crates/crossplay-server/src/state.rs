use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::RwLock;

use crossplay_core::player::PlayerId;

use crate::config::ServerConfig;
use crate::entitlements::{ConfigEntitlements, SharedEntitlements};
use crate::game_loop::SessionContext;
use crate::rate_limit::IpRateLimiter;
use crate::room_manager::{RoomManager, SharedRoomManager};
use crate::vocabulary::SharedVocabulary;

pub type IpConnectionCounts = Arc<Mutex<HashMap<IpAddr, usize>>>;

#[derive(Clone)]
pub struct AppState {
    pub rooms: SharedRoomManager,
    pub config: Arc<ServerConfig>,
    pub ws_connection_count: Arc<AtomicUsize>,
    pub ws_per_ip: IpConnectionCounts,
    pub api_limiter: Arc<IpRateLimiter>,
    next_conn_id: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(config: ServerConfig, vocabulary: SharedVocabulary) -> Self {
        let entitlements: SharedEntitlements =
            Arc::new(ConfigEntitlements::new(&config.entitlements));
        let ctx = SessionContext::new(&config.game, vocabulary, entitlements);
        let api_limiter = IpRateLimiter::new(
            config.limits.api_rate_limit_burst as f64,
            config.limits.api_rate_limit_per_sec,
        );
        Self {
            rooms: Arc::new(RwLock::new(RoomManager::new(ctx))),
            config: Arc::new(config),
            ws_connection_count: Arc::new(AtomicUsize::new(0)),
            ws_per_ip: Arc::new(Mutex::new(HashMap::new())),
            api_limiter: Arc::new(api_limiter),
            next_conn_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Allocate an identifier for a new connection. Participants reuse it as
    /// their player ID.
    pub fn next_conn_id(&self) -> PlayerId {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Counts one open WebSocket for as long as it lives.
pub struct ConnectionGuard {
    count: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    pub fn new(count: Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::Relaxed);
        Self { count }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Holds one of an IP's connection slots; released on drop.
pub struct IpConnectionGuard {
    ip: IpAddr,
    counts: IpConnectionCounts,
}

impl IpConnectionGuard {
    pub fn try_acquire(ip: IpAddr, counts: IpConnectionCounts, max_per_ip: usize) -> Option<Self> {
        {
            let mut map = counts.lock().unwrap_or_else(PoisonError::into_inner);
            let open = map.entry(ip).or_insert(0);
            if *open >= max_per_ip {
                return None;
            }
            *open += 1;
        }
        Some(Self { ip, counts })
    }
}

impl Drop for IpConnectionGuard {
    fn drop(&mut self) {
        let mut map = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(open) = map.get_mut(&self.ip) {
            *open = open.saturating_sub(1);
            if *open == 0 {
                map.remove(&self.ip);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_guard_counts() {
        let count = Arc::new(AtomicUsize::new(0));
        let a = ConnectionGuard::new(Arc::clone(&count));
        let b = ConnectionGuard::new(Arc::clone(&count));
        assert_eq!(count.load(Ordering::Relaxed), 2);
        drop(a);
        drop(b);
        assert_eq!(count.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn ip_guard_enforces_limit_and_releases() {
        let counts: IpConnectionCounts = Arc::new(Mutex::new(HashMap::new()));
        let ip: IpAddr = "10.1.1.1".parse().unwrap();
        let first = IpConnectionGuard::try_acquire(ip, Arc::clone(&counts), 2).unwrap();
        let _second = IpConnectionGuard::try_acquire(ip, Arc::clone(&counts), 2).unwrap();
        assert!(IpConnectionGuard::try_acquire(ip, Arc::clone(&counts), 2).is_none());

        let other: IpAddr = "10.1.1.2".parse().unwrap();
        assert!(IpConnectionGuard::try_acquire(other, Arc::clone(&counts), 2).is_some());

        drop(first);
        assert!(IpConnectionGuard::try_acquire(ip, Arc::clone(&counts), 2).is_some());
    }

    #[test]
    fn conn_ids_are_distinct() {
        let state = AppState::new(
            ServerConfig::default(),
            Arc::new(crate::vocabulary::StaticVocabularySource::builtin().unwrap()),
        );
        let a = state.next_conn_id();
        let b = state.clone().next_conn_id();
        assert_ne!(a, b);
        assert!(a >= 1);
    }
}
