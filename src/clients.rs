//! Client subscription registry
//!
//! Tracks which remote clients asked for pad data on which slots and hands
//! out the per-(client, slot) packet counters. A client is identified by the
//! id it puts in its requests together with the address it sends from.
//!
//! Subscriptions expire [`SUBSCRIPTION_TIMEOUT`] after the last matching
//! request. Expired entries are pruned lazily whenever the registry is
//! queried, never on a timer.

use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::gamepad::SLOT_COUNT;

/// How long a slot subscription lives without a refreshing request
pub const SUBSCRIPTION_TIMEOUT: Duration = Duration::from_secs(5);

/// One logical subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientKey {
    pub client_id: u32,
    pub endpoint: SocketAddr,
}

/// A subscriber together with the packet counter to use for one response
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClientCounter {
    pub key: ClientKey,
    pub packet_counter: u32,
}

#[derive(Debug, Clone, Copy)]
struct SlotSubscription {
    last_request: Instant,
    packet_counter: u32,
}

#[derive(Debug, Default)]
struct ClientSubscription {
    slots: [Option<SlotSubscription>; SLOT_COUNT],
}

impl ClientSubscription {
    fn refresh(&mut self, slot: usize, now: Instant) {
        if let Some(subscription) = self.slots[slot].as_mut() {
            subscription.last_request = now;
        } else {
            self.slots[slot] = Some(SlotSubscription {
                last_request: now,
                packet_counter: 0,
            });
        }
    }

    /// Drop expired slots, returns whether any slot is left
    fn expire(&mut self, now: Instant) -> bool {
        for entry in self.slots.iter_mut() {
            let expired = matches!(
                entry,
                Some(subscription)
                    if now.saturating_duration_since(subscription.last_request) > SUBSCRIPTION_TIMEOUT
            );
            if expired {
                *entry = None;
            }
        }
        self.slots.iter().any(Option::is_some)
    }
}

/// Registry of active pad data subscribers
#[derive(Debug, Default)]
pub struct ActiveClients {
    clients: BTreeMap<ClientKey, ClientSubscription>,
}

impl ActiveClients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pad data request
    ///
    /// An empty `requested_slots` refreshes all four slots. Slots outside
    /// `0..4` are ignored.
    pub fn update_request(&mut self, endpoint: SocketAddr, client_id: u32, requested_slots: &BTreeSet<u8>) {
        self.update_request_at(Instant::now(), endpoint, client_id, requested_slots);
    }

    pub fn update_request_at(
        &mut self,
        now: Instant,
        endpoint: SocketAddr,
        client_id: u32,
        requested_slots: &BTreeSet<u8>,
    ) {
        let slots: Vec<usize> = if requested_slots.is_empty() {
            (0..SLOT_COUNT).collect()
        } else {
            requested_slots
                .iter()
                .map(|&slot| slot as usize)
                .filter(|&slot| slot < SLOT_COUNT)
                .collect()
        };
        if slots.is_empty() {
            return;
        }

        let key = ClientKey { client_id, endpoint };
        let subscription = self.clients.entry(key).or_insert_with(|| {
            tracing::debug!(client_id, %endpoint, "New pad data subscriber");
            ClientSubscription::default()
        });
        for slot in slots {
            subscription.refresh(slot, now);
        }
    }

    /// Subscribers for each changed slot, with their next packet counter
    ///
    /// Expired subscriptions are pruned first. Every returned counter is
    /// consumed: the stored counter is incremented, so successive calls hand
    /// out strictly increasing values per (client, slot).
    pub fn relevant_endpoints(&mut self, changed_slots: &BTreeSet<u8>) -> BTreeMap<u8, BTreeSet<ClientCounter>> {
        self.relevant_endpoints_at(Instant::now(), changed_slots)
    }

    pub fn relevant_endpoints_at(
        &mut self,
        now: Instant,
        changed_slots: &BTreeSet<u8>,
    ) -> BTreeMap<u8, BTreeSet<ClientCounter>> {
        self.cleanup(now);

        let mut relevant: BTreeMap<u8, BTreeSet<ClientCounter>> = BTreeMap::new();
        for &slot in changed_slots {
            debug_assert!((slot as usize) < SLOT_COUNT, "slot {slot} out of range");
            if slot as usize >= SLOT_COUNT {
                continue;
            }

            for (key, subscription) in self.clients.iter_mut() {
                if let Some(entry) = subscription.slots[slot as usize].as_mut() {
                    relevant.entry(slot).or_default().insert(ClientCounter {
                        key: *key,
                        packet_counter: entry.packet_counter,
                    });
                    entry.packet_counter = entry.packet_counter.wrapping_add(1);
                }
            }
        }
        relevant
    }

    /// Whether at least one client is still subscribed to anything
    pub fn has_active_clients(&mut self) -> bool {
        self.has_active_clients_at(Instant::now())
    }

    pub fn has_active_clients_at(&mut self, now: Instant) -> bool {
        self.cleanup(now);
        !self.clients.is_empty()
    }

    /// Number of tracked clients, expired ones included until the next query
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    fn cleanup(&mut self, now: Instant) {
        let before = self.clients.len();
        self.clients.retain(|_, subscription| subscription.expire(now));

        let removed = before - self.clients.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = self.clients.len(), "Pruned inactive clients");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn slots(items: &[u8]) -> BTreeSet<u8> {
        items.iter().copied().collect()
    }

    fn counters_for(result: &BTreeMap<u8, BTreeSet<ClientCounter>>, slot: u8) -> Vec<(u32, u32)> {
        result
            .get(&slot)
            .map(|set| set.iter().map(|c| (c.key.client_id, c.packet_counter)).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_empty_request_subscribes_all_slots() {
        let mut clients = ActiveClients::new();
        let now = Instant::now();
        clients.update_request_at(now, addr(1000), 7, &BTreeSet::new());

        let result = clients.relevant_endpoints_at(now, &slots(&[0, 1, 2, 3]));
        for slot in 0..4 {
            assert_eq!(counters_for(&result, slot), vec![(7, 0)]);
        }
    }

    #[test]
    fn test_slot_request_only_subscribes_that_slot() {
        let mut clients = ActiveClients::new();
        let now = Instant::now();
        clients.update_request_at(now, addr(1000), 7, &slots(&[2]));

        let result = clients.relevant_endpoints_at(now, &slots(&[0, 1, 2, 3]));
        assert_eq!(result.len(), 1);
        assert_eq!(counters_for(&result, 2), vec![(7, 0)]);
    }

    #[test]
    fn test_out_of_range_slot_is_ignored() {
        let mut clients = ActiveClients::new();
        let now = Instant::now();
        clients.update_request_at(now, addr(1000), 7, &slots(&[9]));
        assert!(clients.is_empty());
        assert!(!clients.has_active_clients_at(now));

        clients.update_request_at(now, addr(1000), 7, &slots(&[4, 2]));
        assert_eq!(clients.len(), 1);
        let result = clients.relevant_endpoints_at(now, &slots(&[2]));
        assert_eq!(counters_for(&result, 2), vec![(7, 0)]);
    }

    #[test]
    fn test_subscription_expires_after_timeout() {
        let mut clients = ActiveClients::new();
        let t = Instant::now();
        clients.update_request_at(t, addr(1000), 1, &slots(&[2]));

        let at_limit = clients.relevant_endpoints_at(t + SUBSCRIPTION_TIMEOUT, &slots(&[2]));
        assert_eq!(counters_for(&at_limit, 2).len(), 1);

        let after = clients.relevant_endpoints_at(
            t + SUBSCRIPTION_TIMEOUT + Duration::from_millis(1),
            &slots(&[2]),
        );
        assert!(after.is_empty());
        assert!(clients.is_empty());
    }

    #[test]
    fn test_refresh_extends_subscription() {
        let mut clients = ActiveClients::new();
        let t = Instant::now();
        clients.update_request_at(t, addr(1000), 1, &slots(&[0]));
        clients.update_request_at(t + Duration::from_secs(4), addr(1000), 1, &slots(&[0]));

        let result = clients.relevant_endpoints_at(t + Duration::from_secs(8), &slots(&[0]));
        assert_eq!(counters_for(&result, 0), vec![(1, 0)]);
    }

    #[test]
    fn test_partial_expiry_keeps_client() {
        let mut clients = ActiveClients::new();
        let t = Instant::now();
        clients.update_request_at(t, addr(1000), 1, &slots(&[0]));
        clients.update_request_at(t + Duration::from_secs(4), addr(1000), 1, &slots(&[1]));

        let later = t + Duration::from_secs(6);
        let result = clients.relevant_endpoints_at(later, &slots(&[0, 1]));
        assert!(result.get(&0).is_none());
        assert_eq!(counters_for(&result, 1), vec![(1, 0)]);
        assert_eq!(clients.len(), 1);
    }

    #[test]
    fn test_counters_increase_without_gaps() {
        let mut clients = ActiveClients::new();
        let t = Instant::now();
        clients.update_request_at(t, addr(1000), 1, &BTreeSet::new());

        for expected in 0..10 {
            let result = clients.relevant_endpoints_at(t, &slots(&[3]));
            assert_eq!(counters_for(&result, 3), vec![(1, expected)]);
        }

        // Other slots keep their own counter
        let result = clients.relevant_endpoints_at(t, &slots(&[0]));
        assert_eq!(counters_for(&result, 0), vec![(1, 0)]);
    }

    #[test]
    fn test_refresh_keeps_counter() {
        let mut clients = ActiveClients::new();
        let t = Instant::now();
        clients.update_request_at(t, addr(1000), 1, &slots(&[0]));
        clients.relevant_endpoints_at(t, &slots(&[0]));
        clients.update_request_at(t, addr(1000), 1, &slots(&[0]));

        let result = clients.relevant_endpoints_at(t, &slots(&[0]));
        assert_eq!(counters_for(&result, 0), vec![(1, 1)]);
    }

    #[test]
    fn test_same_id_from_different_endpoints_are_distinct() {
        let mut clients = ActiveClients::new();
        let t = Instant::now();
        clients.update_request_at(t, addr(1000), 5, &slots(&[0]));
        clients.update_request_at(t, addr(1001), 5, &slots(&[0]));
        clients.relevant_endpoints_at(t, &slots(&[0]));

        let result = clients.relevant_endpoints_at(t, &slots(&[0]));
        let entries = result.get(&0).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|c| c.packet_counter == 1));
        let ports: Vec<u16> = entries.iter().map(|c| c.key.endpoint.port()).collect();
        assert_eq!(ports, vec![1000, 1001]);
    }

    #[test]
    fn test_has_active_clients_prunes() {
        let mut clients = ActiveClients::new();
        let t = Instant::now();
        assert!(!clients.has_active_clients_at(t));

        clients.update_request_at(t, addr(1000), 1, &BTreeSet::new());
        assert!(clients.has_active_clients_at(t + Duration::from_secs(1)));
        assert!(!clients.has_active_clients_at(t + Duration::from_secs(6)));
    }
}
