//! Shared application state.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;

use crate::config::ServerConfig;
use crate::core::realtime::{GeminiLive, LiveConnector};
use crate::core::tools::LocalToolExecutor;
use crate::store::{MemoryStore, ResumptionStore};

/// Why a new live session was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectionLimitError {
    #[error("Gateway at capacity, no live session available")]
    GlobalLimitReached,

    #[error("Too many live sessions from this address")]
    PerIpLimitReached,
}

/// A reserved live-session slot. Dropping it gives the slot back, so a
/// failed upgrade or a panicking session cannot leak it.
#[derive(Debug)]
pub struct ConnectionSlot {
    state: Arc<AppState>,
    ip: IpAddr,
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.state.release_connection(self.ip);
    }
}

/// State shared by every route and every live session.
///
/// The memory and resumption stores are process-wide: all sessions read and
/// write the same documents.
pub struct AppState {
    pub config: ServerConfig,
    pub memory: MemoryStore,
    pub resumption: ResumptionStore,
    pub tools: Arc<LocalToolExecutor>,
    pub connector: Arc<dyn LiveConnector>,

    ws_connections: AtomicUsize,
    ip_connections: DashMap<IpAddr, u32>,
}

impl AppState {
    /// Build state from configuration, loading persisted documents from the
    /// configured paths and connecting to the real upstream.
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let memory = MemoryStore::open(Some(config.memory_path.clone()));
        let resumption = ResumptionStore::open(Some(config.session_handle_path.clone()));
        let connector = Arc::new(GeminiLive::new(config.gemini_live_config()));
        Self::with_parts(config, memory, resumption, connector)
    }

    /// Build state around explicit stores and upstream connector.
    pub fn with_parts(
        config: ServerConfig,
        memory: MemoryStore,
        resumption: ResumptionStore,
        connector: Arc<dyn LiveConnector>,
    ) -> Arc<Self> {
        let tools = Arc::new(LocalToolExecutor::new(
            config.weather_config(),
            memory.clone(),
        ));

        Arc::new(Self {
            config,
            memory,
            resumption,
            tools,
            connector,
            ws_connections: AtomicUsize::new(0),
            ip_connections: DashMap::new(),
        })
    }

    /// Reserve a live-session slot for `ip`, held until the returned guard
    /// is dropped.
    pub fn try_acquire_connection(
        self: &Arc<Self>,
        ip: IpAddr,
    ) -> Result<ConnectionSlot, ConnectionLimitError> {
        self.reserve(ip)?;
        Ok(ConnectionSlot {
            state: Arc::clone(self),
            ip,
        })
    }

    fn reserve(&self, ip: IpAddr) -> Result<(), ConnectionLimitError> {
        if let Some(max) = self.config.max_websocket_connections {
            let acquired = self
                .ws_connections
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                    (current < max).then_some(current + 1)
                });
            if acquired.is_err() {
                return Err(ConnectionLimitError::GlobalLimitReached);
            }
        } else {
            self.ws_connections.fetch_add(1, Ordering::AcqRel);
        }

        match self.ip_connections.entry(ip) {
            Entry::Occupied(mut entry) => {
                if *entry.get() >= self.config.max_connections_per_ip {
                    self.ws_connections.fetch_sub(1, Ordering::AcqRel);
                    return Err(ConnectionLimitError::PerIpLimitReached);
                }
                *entry.get_mut() += 1;
            }
            Entry::Vacant(entry) => {
                if self.config.max_connections_per_ip == 0 {
                    self.ws_connections.fetch_sub(1, Ordering::AcqRel);
                    return Err(ConnectionLimitError::PerIpLimitReached);
                }
                entry.insert(1);
            }
        }

        Ok(())
    }

    fn release_connection(&self, ip: IpAddr) {
        let _ = self
            .ws_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_sub(1)
            });

        if let Entry::Occupied(mut entry) = self.ip_connections.entry(ip) {
            if *entry.get() <= 1 {
                entry.remove();
            } else {
                *entry.get_mut() -= 1;
            }
        }
    }

    pub fn ws_connection_count(&self) -> usize {
        self.ws_connections.load(Ordering::Acquire)
    }

    pub fn ip_connection_count(&self, ip: &IpAddr) -> u32 {
        self.ip_connections.get(ip).map(|c| *c).unwrap_or(0)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("address", &self.config.address())
            .field("ws_connections", &self.ws_connection_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn state_with_limits(global: Option<usize>, per_ip: u32) -> Arc<AppState> {
        let mut config = ServerConfig::default();
        config.max_websocket_connections = global;
        config.max_connections_per_ip = per_ip;
        let connector = Arc::new(GeminiLive::new(config.gemini_live_config()));
        AppState::with_parts(
            config,
            MemoryStore::in_memory(),
            ResumptionStore::in_memory(),
            connector,
        )
    }

    #[test]
    fn test_slots_per_address() {
        let state = state_with_limits(Some(10), 2);
        let ip: IpAddr = Ipv4Addr::new(10, 0, 0, 7).into();

        let first = state.try_acquire_connection(ip).unwrap();
        let second = state.try_acquire_connection(ip).unwrap();
        assert_eq!(state.ws_connection_count(), 2);
        assert_eq!(state.ip_connection_count(&ip), 2);

        assert_eq!(
            state.try_acquire_connection(ip).unwrap_err(),
            ConnectionLimitError::PerIpLimitReached
        );
        assert_eq!(state.ws_connection_count(), 2);

        drop(first);
        assert_eq!(state.ip_connection_count(&ip), 1);
        let third = state.try_acquire_connection(ip).unwrap();

        drop(second);
        drop(third);
        assert_eq!(state.ws_connection_count(), 0);
        assert_eq!(state.ip_connection_count(&ip), 0);
    }

    #[test]
    fn test_global_capacity() {
        let state = state_with_limits(Some(3), 10);
        let held: Vec<ConnectionSlot> = (1..=3)
            .map(|i| {
                state
                    .try_acquire_connection(Ipv4Addr::new(10, 0, 1, i).into())
                    .unwrap()
            })
            .collect();

        let late: IpAddr = Ipv4Addr::new(10, 0, 1, 9).into();
        assert_eq!(
            state.try_acquire_connection(late).unwrap_err(),
            ConnectionLimitError::GlobalLimitReached
        );
        assert_eq!(state.ip_connection_count(&late), 0);

        drop(held);
        assert!(state.try_acquire_connection(late).is_ok());
    }

    #[test]
    fn test_zero_per_ip_limit_refuses_everyone() {
        let state = state_with_limits(None, 0);
        assert_eq!(
            state
                .try_acquire_connection(Ipv4Addr::LOCALHOST.into())
                .unwrap_err(),
            ConnectionLimitError::PerIpLimitReached
        );
        assert_eq!(state.ws_connection_count(), 0);
    }

    #[test]
    fn test_unlimited_global() {
        let state = state_with_limits(None, 100);
        let ip: IpAddr = Ipv4Addr::LOCALHOST.into();
        let slots: Vec<_> = (0..50)
            .map(|_| state.try_acquire_connection(ip).unwrap())
            .collect();
        assert_eq!(state.ws_connection_count(), 50);
        drop(slots);
        assert_eq!(state.ws_connection_count(), 0);
    }
}
