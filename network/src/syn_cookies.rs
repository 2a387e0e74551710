//! Syn-cookie identity challenges.
//!
//! A peer proving its node identity is handed a random 256-bit challenge
//! keyed by endpoint and must return it signed by its node key. A per-IP
//! counter caps outstanding challenges so one address cannot hold the
//! table hostage.

use chr_crypto::verify_signature;
use chr_types::{Account, Signature, Timestamp};
use rand::RngCore;
use std::collections::HashMap;
use std::net::{Ipv6Addr, SocketAddrV6};

struct CookieInfo {
    cookie: [u8; 32],
    created_at: Timestamp,
}

pub struct SynCookies {
    cookies: HashMap<SocketAddrV6, CookieInfo>,
    per_ip: HashMap<Ipv6Addr, usize>,
    max_per_ip: usize,
}

impl SynCookies {
    pub fn new(max_per_ip: usize) -> Self {
        Self {
            cookies: HashMap::new(),
            per_ip: HashMap::new(),
            max_per_ip,
        }
    }

    /// Issue a fresh challenge for `endpoint`. `None` when the per-IP cap
    /// is exhausted or a challenge is already outstanding.
    pub fn assign(&mut self, endpoint: &SocketAddrV6, now: Timestamp) -> Option<[u8; 32]> {
        let ip_count = self.per_ip.entry(*endpoint.ip()).or_insert(0);
        if *ip_count >= self.max_per_ip {
            return None;
        }
        if self.cookies.contains_key(endpoint) {
            return None;
        }
        let mut cookie = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut cookie);
        self.cookies.insert(
            *endpoint,
            CookieInfo {
                cookie,
                created_at: now,
            },
        );
        *ip_count += 1;
        Some(cookie)
    }

    /// Check a signed challenge response. Returns `true` when INVALID (no
    /// challenge outstanding, or the signature fails). A valid response
    /// consumes the cookie and releases its per-IP slot.
    pub fn validate(
        &mut self,
        endpoint: &SocketAddrV6,
        node_id: &Account,
        signature: &Signature,
    ) -> bool {
        let Some(info) = self.cookies.get(endpoint) else {
            return true;
        };
        if !verify_signature(&info.cookie, signature, node_id) {
            return true;
        }
        self.cookies.remove(endpoint);
        self.release_ip_slot(*endpoint.ip());
        false
    }

    /// Drop challenges issued before `cutoff`.
    pub fn purge(&mut self, cutoff: Timestamp) {
        let expired: Vec<SocketAddrV6> = self
            .cookies
            .iter()
            .filter(|(_, info)| info.created_at < cutoff)
            .map(|(endpoint, _)| *endpoint)
            .collect();
        for endpoint in expired {
            self.cookies.remove(&endpoint);
            self.release_ip_slot(*endpoint.ip());
        }
    }

    fn release_ip_slot(&mut self, ip: Ipv6Addr) {
        match self.per_ip.get_mut(&ip) {
            Some(count) if *count > 0 => {
                *count -= 1;
                if *count == 0 {
                    self.per_ip.remove(&ip);
                }
            }
            _ => {
                debug_assert!(false, "more syn cookies released than assigned for {ip}");
                tracing::error!(%ip, "syn cookie accounting underflow");
            }
        }
    }

    pub fn cookies_count(&self) -> usize {
        self.cookies.len()
    }

    /// Outstanding challenge count for one IP.
    pub fn cookies_per_ip(&self, ip: &Ipv6Addr) -> usize {
        self.per_ip.get(ip).copied().unwrap_or(0)
    }
}
