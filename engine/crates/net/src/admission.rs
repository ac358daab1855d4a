use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    pub max_connections_total: usize,
    pub max_connections_per_ip: usize,
    pub max_packets_per_second: u32,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_connections_total: 1000,
            max_connections_per_ip: 8,
            max_packets_per_second: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("server at max connections")]
    TotalLimitReached,
    #[error("too many connections from this IP")]
    IpLimitReached,
}

/// Tracks connection counts per IP and in total.
#[derive(Debug)]
pub struct ConnectionLimiter {
    config: AdmissionConfig,
    total: usize,
    per_ip: BTreeMap<IpAddr, usize>,
}

pub type SharedLimiter = Arc<Mutex<ConnectionLimiter>>;

impl ConnectionLimiter {
    pub fn new(config: AdmissionConfig) -> SharedLimiter {
        Arc::new(Mutex::new(Self {
            config,
            total: 0,
            per_ip: BTreeMap::new(),
        }))
    }

    pub fn try_admit(&mut self, ip: IpAddr) -> Result<(), Rejection> {
        if self.total >= self.config.max_connections_total {
            return Err(Rejection::TotalLimitReached);
        }
        let count = self.per_ip.entry(ip).or_insert(0);
        if *count >= self.config.max_connections_per_ip {
            return Err(Rejection::IpLimitReached);
        }
        *count += 1;
        self.total += 1;
        Ok(())
    }

    pub fn release(&mut self, ip: IpAddr) {
        if let Some(count) = self.per_ip.get_mut(&ip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.per_ip.remove(&ip);
            }
        }
        self.total = self.total.saturating_sub(1);
    }

    pub fn total_connections(&self) -> usize {
        self.total
    }
}

/// Holds one admitted slot; released on drop so every exit path of a
/// session task gives it back.
#[derive(Debug)]
pub struct ConnectionGuard {
    limiter: SharedLimiter,
    ip: IpAddr,
}

impl ConnectionGuard {
    pub fn admit(limiter: &SharedLimiter, ip: IpAddr) -> Result<Self, Rejection> {
        limiter
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .try_admit(ip)?;
        Ok(Self {
            limiter: limiter.clone(),
            ip,
        })
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.limiter
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .release(self.ip);
    }
}

/// Per-session token bucket over decoded packets.
#[derive(Debug)]
pub struct PacketThrottle {
    max_per_second: u32,
    tokens: u32,
    last_refill: Instant,
}

impl PacketThrottle {
    pub fn new(max_per_second: u32) -> Self {
        Self {
            max_per_second,
            tokens: max_per_second,
            last_refill: Instant::now(),
        }
    }

    /// Consumes one token. Returns false when the bucket is empty.
    pub fn try_consume(&mut self) -> bool {
        if self.max_per_second == 0 {
            return true;
        }
        self.refill();
        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        let new_tokens = (elapsed.as_secs_f64() * self.max_per_second as f64) as u32;
        if new_tokens > 0 {
            self.tokens = self.tokens.saturating_add(new_tokens).min(self.max_per_second);
            self.last_refill = now;
        }
    }
}
