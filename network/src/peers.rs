//! The peer container.
//!
//! Tracks every known peer with its contact history, representative weight
//! hint, and protocol version. One primary map is keyed by endpoint;
//! secondary orderings (by contact recency, by stalest rep request, by
//! weight) are derived on demand; the container never holds more than a
//! few thousand entries.

use crate::reserved::reserved_address;
use crate::syn_cookies::SynCookies;
use chr_types::{
    Account, Amount, NetworkId, PublicKey, Signature, Timestamp, NODE_ID_VERSION,
    PROTOCOL_VERSION_MIN,
};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::net::{Ipv6Addr, SocketAddrV6};

/// How many endpoints a representative crawl probes when enough rep weight
/// is already visible.
const REP_CRAWL_WARM: usize = 10;
/// Probe count while still searching for representatives.
const REP_CRAWL_COLD: usize = 40;

/// Everything known about one peer.
#[derive(Clone, Debug)]
pub struct PeerInfo {
    pub endpoint: SocketAddrV6,
    pub last_contact: Timestamp,
    pub last_attempt: Timestamp,
    pub last_bootstrap_attempt: Timestamp,
    pub last_rep_request: Timestamp,
    pub last_rep_response: Timestamp,
    pub rep_weight: Amount,
    pub probable_rep_account: Account,
    pub network_version: u8,
    pub node_id: Option<Account>,
}

impl PeerInfo {
    fn new(endpoint: SocketAddrV6, network_version: u8, now: Timestamp) -> Self {
        Self {
            endpoint,
            last_contact: now,
            last_attempt: now,
            last_bootstrap_attempt: Timestamp::EPOCH,
            last_rep_request: Timestamp::EPOCH,
            last_rep_response: Timestamp::EPOCH,
            rep_weight: Amount::ZERO,
            probable_rep_account: Account::ZERO,
            network_version,
            node_id: None,
        }
    }

    pub fn is_legacy(&self) -> bool {
        self.network_version < NODE_ID_VERSION
    }
}

type PeerObserver = Box<dyn Fn(SocketAddrV6) + Send>;
type DisconnectObserver = Box<dyn Fn() + Send>;

pub struct PeerContainer {
    self_endpoint: SocketAddrV6,
    network: NetworkId,
    peers: HashMap<SocketAddrV6, PeerInfo>,
    /// Outgoing contact attempts within the current window.
    attempts: HashMap<SocketAddrV6, Timestamp>,
    syn_cookies: SynCookies,
    legacy_peers: usize,
    max_peers_per_ip: usize,
    max_legacy_peers_per_ip: usize,
    max_legacy_peers: usize,
    /// Observed rep weight at which the crawler narrows its probe set.
    pub online_weight_minimum: Amount,
    /// Fired for every newly admitted peer.
    pub peer_observer: PeerObserver,
    /// Fired when a purge leaves the container empty.
    pub disconnect_observer: DisconnectObserver,
}

impl PeerContainer {
    pub fn new(
        self_endpoint: SocketAddrV6,
        network: NetworkId,
        max_peers_per_ip: usize,
        max_legacy_peers_per_ip: usize,
        max_legacy_peers: usize,
    ) -> Self {
        Self {
            self_endpoint,
            network,
            peers: HashMap::new(),
            attempts: HashMap::new(),
            syn_cookies: SynCookies::new(max_peers_per_ip),
            legacy_peers: 0,
            max_peers_per_ip,
            max_legacy_peers_per_ip,
            max_legacy_peers,
            online_weight_minimum: Amount::ZERO,
            peer_observer: Box::new(|_| {}),
            disconnect_observer: Box::new(|| {}),
        }
    }

    // ── Admission ───────────────────────────────────────────────────────

    /// A datagram arrived from `endpoint`. Legacy peers are inserted
    /// outright (subject to caps); modern peers get `true` back when a
    /// node-id handshake should be initiated.
    pub fn contacted(&mut self, endpoint: &SocketAddrV6, version: u8, now: Timestamp) -> bool {
        if version < NODE_ID_VERSION {
            self.insert(endpoint, version, now);
            return false;
        }
        !self.known_peer(endpoint) && self.count_by_ip(endpoint.ip()) < self.max_peers_per_ip
    }

    /// Admit or refresh a peer. Returns `true` when the endpoint was NOT
    /// newly inserted: invalid address, outdated version, cap overflow, or
    /// an already-known peer (whose `last_contact` is refreshed).
    pub fn insert(&mut self, endpoint: &SocketAddrV6, version: u8, now: Timestamp) -> bool {
        if self.not_a_peer(endpoint, false) {
            return true;
        }
        if version < PROTOCOL_VERSION_MIN {
            return true;
        }
        if let Some(existing) = self.peers.get_mut(endpoint) {
            existing.last_contact = now;
            // The stored network_version stays: upgrading a legacy record
            // would need a handshake and legacy-cap rebalancing.
            return true;
        }

        let is_legacy = version < NODE_ID_VERSION;
        if is_legacy && self.legacy_peers >= self.max_legacy_peers {
            return true;
        }
        if self.network.filters_private_ranges() {
            let ip_peers = self.count_by_ip(endpoint.ip());
            let legacy_ip_peers = self
                .peers
                .values()
                .filter(|peer| peer.endpoint.ip() == endpoint.ip() && peer.is_legacy())
                .count();
            if ip_peers >= self.max_peers_per_ip
                || (is_legacy && legacy_ip_peers >= self.max_legacy_peers_per_ip)
            {
                return true;
            }
        } else if self.count_by_ip(endpoint.ip()) >= self.max_peers_per_ip {
            return true;
        }

        if is_legacy {
            self.legacy_peers += 1;
        }
        self.peers
            .insert(*endpoint, PeerInfo::new(*endpoint, version, now));
        tracing::debug!(peer = %endpoint, version, "peer inserted");
        (self.peer_observer)(*endpoint);
        false
    }

    /// Whether `endpoint` can never be a peer: unspecified, reserved, or
    /// ourselves.
    pub fn not_a_peer(&self, endpoint: &SocketAddrV6, blacklist_loopback: bool) -> bool {
        endpoint.ip().is_unspecified()
            || reserved_address(endpoint, self.network, blacklist_loopback)
            || *endpoint == self.self_endpoint
    }

    pub fn known_peer(&self, endpoint: &SocketAddrV6) -> bool {
        self.peers.contains_key(endpoint)
    }

    /// Record an outgoing contact attempt. Returns `true` when the attempt
    /// should NOT be made: invalid endpoint, already known, or already
    /// attempted within the current window.
    pub fn reachout(&mut self, endpoint: &SocketAddrV6, now: Timestamp) -> bool {
        if self.not_a_peer(endpoint, false) {
            return true;
        }
        let mut error = self.known_peer(endpoint);
        error |= self.attempts.contains_key(endpoint);
        self.attempts.insert(*endpoint, now);
        error
    }

    // ── Syn cookies ─────────────────────────────────────────────────────

    pub fn assign_syn_cookie(
        &mut self,
        endpoint: &SocketAddrV6,
        now: Timestamp,
    ) -> Option<[u8; 32]> {
        self.syn_cookies.assign(endpoint, now)
    }

    /// Returns `true` when the response is invalid.
    pub fn validate_syn_cookie(
        &mut self,
        endpoint: &SocketAddrV6,
        node_id: &Account,
        signature: &Signature,
    ) -> bool {
        self.syn_cookies.validate(endpoint, node_id, signature)
    }

    pub fn purge_syn_cookies(&mut self, cutoff: Timestamp) {
        self.syn_cookies.purge(cutoff);
    }

    // ── Sampling ────────────────────────────────────────────────────────

    /// Up to `count` endpoints drawn uniformly at random with a bounded
    /// number of attempts, topped up in most-recent-contact order.
    pub fn random_set(&self, count: usize) -> HashSet<SocketAddrV6> {
        let mut result = HashSet::with_capacity(count);
        if self.peers.is_empty() || count == 0 {
            return result;
        }
        let endpoints: Vec<&SocketAddrV6> = self.peers.keys().collect();
        let mut rng = rand::thread_rng();
        let random_cutoff = count * 2;
        for _ in 0..random_cutoff {
            if result.len() >= count {
                break;
            }
            let index = rng.gen_range(0..endpoints.len());
            result.insert(*endpoints[index]);
        }
        if result.len() < count {
            let mut by_contact: Vec<&PeerInfo> = self.peers.values().collect();
            by_contact.sort_by(|a, b| b.last_contact.cmp(&a.last_contact));
            for peer in by_contact {
                if result.len() >= count {
                    break;
                }
                result.insert(peer.endpoint);
            }
        }
        result
    }

    /// Fill a keepalive's peer array from a random sample, padding with
    /// unspecified endpoints.
    pub fn random_fill(&self, target: &mut [SocketAddrV6; 8]) {
        let sample = self.random_set(target.len());
        let empty = SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, 0, 0, 0);
        target.fill(empty);
        for (slot, endpoint) in target.iter_mut().zip(sample) {
            *slot = endpoint;
        }
    }

    /// Broadcasting to √n random peers reaches the whole network with high
    /// probability.
    pub fn list_fanout(&self) -> Vec<SocketAddrV6> {
        self.random_set(self.size_sqrt()).into_iter().collect()
    }

    /// Every peer, shuffled. The fallback broadcast target.
    pub fn list(&self) -> Vec<PeerInfo> {
        let mut result: Vec<PeerInfo> = self.peers.values().cloned().collect();
        result.shuffle(&mut rand::thread_rng());
        result
    }

    /// Endpoints to probe for representative identity, stalest request
    /// first. Ten when enough rep weight is visible, forty while cold.
    pub fn rep_crawl(&self) -> Vec<SocketAddrV6> {
        let max_count = if self.total_weight() > self.online_weight_minimum {
            REP_CRAWL_WARM
        } else {
            REP_CRAWL_COLD
        };
        let mut by_request: Vec<&PeerInfo> = self.peers.values().collect();
        by_request.sort_by(|a, b| a.last_rep_request.cmp(&b.last_rep_request));
        by_request
            .into_iter()
            .take(max_count)
            .map(|peer| peer.endpoint)
            .collect()
    }

    /// Up to `count` known representatives, heaviest first.
    pub fn representatives(&self, count: usize) -> Vec<PeerInfo> {
        let mut reps: Vec<PeerInfo> = self
            .peers
            .values()
            .filter(|peer| !peer.rep_weight.is_zero())
            .cloned()
            .collect();
        reps.sort_by(|a, b| b.rep_weight.cmp(&a.rep_weight));
        reps.truncate(count);
        reps
    }

    // ── Representative bookkeeping ──────────────────────────────────────

    /// Note an outgoing rep probe to `endpoint`.
    pub fn rep_request(&mut self, endpoint: &SocketAddrV6, now: Timestamp) {
        if let Some(peer) = self.peers.get_mut(endpoint) {
            peer.last_rep_request = now;
        }
    }

    /// A confirm_ack arrived from a known peer: stamp the response and keep
    /// the heaviest account seen from that endpoint. Returns `true` when
    /// the weight hint improved.
    pub fn rep_response(
        &mut self,
        endpoint: &SocketAddrV6,
        rep_account: Account,
        weight: Amount,
        now: Timestamp,
    ) -> bool {
        let Some(peer) = self.peers.get_mut(endpoint) else {
            return false;
        };
        peer.last_rep_response = now;
        if peer.rep_weight < weight {
            peer.rep_weight = weight;
            peer.probable_rep_account = rep_account;
            return true;
        }
        false
    }

    /// Sum of rep weight hints, counting each probable representative
    /// account once even when it answers from several endpoints.
    pub fn total_weight(&self) -> Amount {
        let mut seen: HashSet<Account> = HashSet::new();
        let mut result = Amount::ZERO;
        for peer in self.peers.values() {
            if seen.insert(peer.probable_rep_account) {
                result = result.saturating_add(peer.rep_weight);
            }
        }
        result
    }

    // ── Aging ───────────────────────────────────────────────────────────

    /// Evict peers not heard from since `cutoff` and stale contact
    /// attempts. Returns the evicted peers; fires the disconnect observer
    /// when nobody is left.
    pub fn purge_list(&mut self, cutoff: Timestamp, now: Timestamp) -> Vec<PeerInfo> {
        let evicted_endpoints: Vec<SocketAddrV6> = self
            .peers
            .values()
            .filter(|peer| peer.last_contact < cutoff)
            .map(|peer| peer.endpoint)
            .collect();
        let mut evicted = Vec::with_capacity(evicted_endpoints.len());
        for endpoint in evicted_endpoints {
            if let Some(peer) = self.peers.remove(&endpoint) {
                if peer.is_legacy() {
                    debug_assert!(self.legacy_peers > 0);
                    self.legacy_peers = self.legacy_peers.saturating_sub(1);
                }
                evicted.push(peer);
            }
        }
        for peer in self.peers.values_mut() {
            peer.last_attempt = now;
        }
        self.attempts.retain(|_, attempted| *attempted >= cutoff);
        if self.peers.is_empty() {
            (self.disconnect_observer)();
        }
        evicted
    }

    // ── Introspection ───────────────────────────────────────────────────

    pub fn size(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn size_sqrt(&self) -> usize {
        (self.size() as f64).sqrt().ceil() as usize
    }

    pub fn legacy_peers(&self) -> usize {
        self.legacy_peers
    }

    pub fn get(&self, endpoint: &SocketAddrV6) -> Option<&PeerInfo> {
        self.peers.get(endpoint)
    }

    /// Record a validated node identity for a peer.
    pub fn set_node_id(&mut self, endpoint: &SocketAddrV6, node_id: Account) {
        if let Some(peer) = self.peers.get_mut(endpoint) {
            peer.node_id = Some(node_id);
        }
    }

    fn count_by_ip(&self, ip: &Ipv6Addr) -> usize {
        self.peers
            .values()
            .filter(|peer| peer.endpoint.ip() == ip)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const MODERN: u8 = NODE_ID_VERSION;
    const LEGACY: u8 = PROTOCOL_VERSION_MIN;

    fn self_endpoint() -> SocketAddrV6 {
        SocketAddrV6::new(Ipv6Addr::new(0x2001, 0, 0, 0, 0, 0, 0, 0xFFFF), 8275, 0, 0)
    }

    fn container() -> PeerContainer {
        PeerContainer::new(self_endpoint(), NetworkId::Test, 10, 5, 500)
    }

    fn live_container() -> PeerContainer {
        PeerContainer::new(self_endpoint(), NetworkId::Live, 10, 5, 500)
    }

    fn endpoint(tail: u16, port: u16) -> SocketAddrV6 {
        SocketAddrV6::new(Ipv6Addr::new(0x2001, 0, 0, 0, 0, 0, 0, tail), port, 0, 0)
    }

    fn now() -> Timestamp {
        Timestamp::new(10_000)
    }

    #[test]
    fn insert_and_refresh() {
        let mut peers = container();
        let ep = endpoint(1, 100);
        assert!(!peers.insert(&ep, MODERN, now()));
        assert_eq!(peers.size(), 1);
        // Re-insert refreshes last_contact but reports not-new
        let later = Timestamp::new(20_000);
        assert!(peers.insert(&ep, MODERN, later));
        assert_eq!(peers.get(&ep).unwrap().last_contact, later);
    }

    #[test]
    fn self_and_unspecified_rejected() {
        let mut peers = container();
        let myself = self_endpoint();
        assert!(peers.insert(&myself, MODERN, now()));
        let unspecified = SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, 1, 0, 0);
        assert!(peers.insert(&unspecified, MODERN, now()));
        assert_eq!(peers.size(), 0);
    }

    #[test]
    fn outdated_version_rejected() {
        let mut peers = container();
        assert!(peers.insert(&endpoint(1, 100), PROTOCOL_VERSION_MIN - 1, now()));
        assert_eq!(peers.size(), 0);
    }

    #[test]
    fn per_ip_cap_on_live() {
        let mut peers = live_container();
        // 11 distinct ports on one public IP: exactly 10 admitted
        let ip = Ipv6Addr::new(0x2001, 0x4860, 0, 0, 0, 0, 0, 1);
        let mut admitted = 0;
        for port in 0..11u16 {
            let ep = SocketAddrV6::new(ip, 1000 + port, 0, 0);
            if !peers.insert(&ep, MODERN, now()) {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 10);
        assert_eq!(peers.size(), 10);
    }

    #[test]
    fn legacy_caps_enforced() {
        let mut peers = PeerContainer::new(self_endpoint(), NetworkId::Test, 10, 5, 2);
        assert!(!peers.insert(&endpoint(1, 1), LEGACY, now()));
        assert!(!peers.insert(&endpoint(2, 1), LEGACY, now()));
        assert_eq!(peers.legacy_peers(), 2);
        // Global legacy cap reached
        assert!(peers.insert(&endpoint(3, 1), LEGACY, now()));
        // Modern peers are unaffected
        assert!(!peers.insert(&endpoint(4, 1), MODERN, now()));
    }

    #[test]
    fn contacted_inserts_legacy_and_flags_modern() {
        let mut peers = container();
        let legacy = endpoint(1, 1);
        assert!(!peers.contacted(&legacy, LEGACY, now()));
        assert!(peers.known_peer(&legacy));

        let modern = endpoint(2, 1);
        assert!(peers.contacted(&modern, MODERN, now()));
        assert!(!peers.known_peer(&modern));
        // Already-known modern peers need no handshake
        peers.insert(&modern, MODERN, now());
        assert!(!peers.contacted(&modern, MODERN, now()));
    }

    #[test]
    fn reachout_window() {
        let mut peers = container();
        let ep = endpoint(5, 5);
        assert!(!peers.reachout(&ep, now()));
        assert!(peers.reachout(&ep, now()));
        // Known peers are not reached out to
        let known = endpoint(6, 6);
        peers.insert(&known, MODERN, now());
        assert!(peers.reachout(&known, now()));
    }

    #[test]
    fn purge_evicts_stale_and_fires_disconnect() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        let mut peers = container();
        peers.disconnect_observer = Box::new(move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        peers.insert(&endpoint(1, 1), MODERN, Timestamp::new(100));
        peers.insert(&endpoint(2, 1), MODERN, Timestamp::new(900));

        let evicted = peers.purge_list(Timestamp::new(500), Timestamp::new(1_000));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].endpoint, endpoint(1, 1));
        assert_eq!(peers.size(), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        let evicted = peers.purge_list(Timestamp::new(2_000), Timestamp::new(2_000));
        assert_eq!(evicted.len(), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn purge_decrements_legacy_count() {
        let mut peers = container();
        peers.insert(&endpoint(1, 1), LEGACY, Timestamp::new(100));
        assert_eq!(peers.legacy_peers(), 1);
        peers.purge_list(Timestamp::new(500), Timestamp::new(500));
        assert_eq!(peers.legacy_peers(), 0);
    }

    #[test]
    fn random_set_bounded_and_filled() {
        let mut peers = container();
        for tail in 1..=20u16 {
            peers.insert(&endpoint(tail, 1), MODERN, now());
        }
        let sample = peers.random_set(5);
        assert!(sample.len() <= 5);
        assert!(!sample.is_empty());
        // Requesting more than exist returns everyone
        let all = peers.random_set(100);
        assert_eq!(all.len(), 20);
    }

    #[test]
    fn fanout_is_sqrt_sized() {
        let mut peers = container();
        for tail in 1..=16u16 {
            peers.insert(&endpoint(tail, 1), MODERN, now());
        }
        assert_eq!(peers.size_sqrt(), 4);
        assert_eq!(peers.list_fanout().len(), 4);
    }

    #[test]
    fn random_fill_pads_with_unspecified() {
        let mut peers = container();
        peers.insert(&endpoint(1, 1), MODERN, now());
        let mut target = [SocketAddrV6::new(Ipv6Addr::LOCALHOST, 9, 0, 0); 8];
        peers.random_fill(&mut target);
        assert_eq!(target[0], endpoint(1, 1));
        assert!(target[1..]
            .iter()
            .all(|slot| slot.ip().is_unspecified() && slot.port() == 0));
    }

    #[test]
    fn rep_response_keeps_heaviest() {
        let mut peers = container();
        let ep = endpoint(1, 1);
        peers.insert(&ep, MODERN, now());
        let rep_a = PublicKey([0xA; 32]);
        let rep_b = PublicKey([0xB; 32]);

        assert!(peers.rep_response(&ep, rep_a, Amount::raw(100), now()));
        assert!(!peers.rep_response(&ep, rep_b, Amount::raw(50), now()));
        let info = peers.get(&ep).unwrap();
        assert_eq!(info.probable_rep_account, rep_a);
        assert_eq!(info.rep_weight, Amount::raw(100));

        // Unknown endpoints are ignored
        assert!(!peers.rep_response(&endpoint(9, 9), rep_a, Amount::raw(999), now()));
    }

    #[test]
    fn total_weight_counts_each_account_once() {
        let mut peers = container();
        let rep = PublicKey([0xA; 32]);
        for tail in 1..=2u16 {
            let ep = endpoint(tail, 1);
            peers.insert(&ep, MODERN, now());
            peers.rep_response(&ep, rep, Amount::raw(100), now());
        }
        assert_eq!(peers.total_weight(), Amount::raw(100));
    }

    #[test]
    fn rep_crawl_orders_by_stalest_request() {
        let mut peers = container();
        peers.online_weight_minimum = Amount::raw(1_000);
        for tail in 1..=50u16 {
            peers.insert(&endpoint(tail, 1), MODERN, now());
        }
        // Cold: no rep weight observed yet, crawl 40
        assert_eq!(peers.rep_crawl().len(), 40);

        peers.rep_request(&endpoint(1, 1), Timestamp::new(99_999));
        let crawl = peers.rep_crawl();
        // The freshly probed peer sorts last
        assert_ne!(crawl[0], endpoint(1, 1));

        // Warm: observed weight above the minimum narrows to 10
        peers.rep_response(
            &endpoint(2, 1),
            PublicKey([0xC; 32]),
            Amount::raw(5_000),
            now(),
        );
        assert_eq!(peers.rep_crawl().len(), 10);
    }

    #[test]
    fn representatives_sorted_by_weight() {
        let mut peers = container();
        for (tail, weight) in [(1u16, 50u128), (2, 200), (3, 100)] {
            let ep = endpoint(tail, 1);
            peers.insert(&ep, MODERN, now());
            peers.rep_response(&ep, PublicKey([tail as u8; 32]), Amount::raw(weight), now());
        }
        // A peer with no weight is excluded
        peers.insert(&endpoint(4, 1), MODERN, now());

        let reps = peers.representatives(10);
        assert_eq!(reps.len(), 3);
        assert_eq!(reps[0].rep_weight, Amount::raw(200));
        assert_eq!(reps[1].rep_weight, Amount::raw(100));
        assert_eq!(reps[2].rep_weight, Amount::raw(50));

        assert_eq!(peers.representatives(2).len(), 2);
    }

    #[test]
    fn peer_observer_fires_on_admission() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        let mut peers = container();
        peers.peer_observer = Box::new(move |_| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });
        peers.insert(&endpoint(1, 1), MODERN, now());
        peers.insert(&endpoint(1, 1), MODERN, now());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn syn_cookie_flow_through_container() {
        let mut peers = container();
        let ep = endpoint(1, 1);
        let cookie = peers.assign_syn_cookie(&ep, now()).unwrap();
        let keys = chr_crypto::generate_keypair();
        let signature = chr_crypto::sign_message(&cookie, &keys.private);
        assert!(!peers.validate_syn_cookie(&ep, &keys.public, &signature));
        assert!(peers.validate_syn_cookie(&ep, &keys.public, &signature));
    }
}
