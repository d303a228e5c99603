use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use actix_extensible_rate_limit::backend::{Backend, Decision, SimpleInput, SimpleOutput};
use tracing::*;

use super::error::Error;

pub const SWEEP_PERIOD: Duration = Duration::from_secs(10 * 60);
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);
/// Refill window handed to the middleware: `rate` requests per minute.
pub const RATE_INTERVAL: Duration = Duration::from_secs(60);

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last_seen: Instant,
}

/// Outcome of one token request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grant {
    pub allowed: bool,
    pub tokens: f64,
}

struct Inner {
    clients: Mutex<HashMap<String, Bucket>>,
    burst: f64,
    clock: Arc<dyn Clock>,
}

/// Token bucket per client holding at most `burst` tokens, refilled
/// continuously at the rate carried by each [`SimpleInput`].
///
/// Clones share the same buckets, so every worker sees one client map.
#[derive(Clone)]
pub struct TokenBucket {
    inner: Arc<Inner>,
}

impl TokenBucket {
    pub fn new(burst: u32) -> Self {
        Self::with_clock(burst, Arc::new(SystemClock))
    }

    pub fn with_clock(burst: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                clients: Mutex::new(HashMap::new()),
                burst: f64::from(burst),
                clock,
            }),
        }
    }

    /// Takes one token for `client`, refilling `per_second` tokens for every elapsed second.
    pub fn take(&self, client: &str, per_second: f64) -> Grant {
        let now = self.inner.clock.now();
        let burst = self.inner.burst;
        let mut clients = self
            .inner
            .clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let Some(bucket) = clients.get_mut(client) else {
            let tokens = (burst - 1.0).max(0.0);
            clients.insert(
                client.to_string(),
                Bucket {
                    tokens,
                    last_seen: now,
                },
            );
            return Grant {
                allowed: burst >= 1.0,
                tokens,
            };
        };

        let elapsed = now.saturating_duration_since(bucket.last_seen).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * per_second).min(burst);
        bucket.last_seen = now;

        let allowed = bucket.tokens >= 1.0;
        if allowed {
            bucket.tokens -= 1.0;
        }
        Grant {
            allowed,
            tokens: bucket.tokens,
        }
    }

    /// Gives back a token taken for a request that should not count.
    pub fn refund(&self, client: &str) {
        let mut clients = self
            .inner
            .clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(bucket) = clients.get_mut(client) {
            bucket.tokens = (bucket.tokens + 1.0).min(self.inner.burst);
        }
    }

    /// Forgets clients idle for longer than `idle`, returning how many were removed.
    pub fn sweep(&self, idle: Duration) -> usize {
        let now = self.inner.clock.now();
        let mut clients = self
            .inner
            .clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let before = clients.len();
        clients.retain(|_, bucket| now.saturating_duration_since(bucket.last_seen) <= idle);
        before - clients.len()
    }

    pub fn clients(&self) -> usize {
        self.inner
            .clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let bucket = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_PERIOD);
            interval.tick().await;
            loop {
                interval.tick().await;
                let removed = bucket.sweep(IDLE_TIMEOUT);
                if removed > 0 {
                    debug!("Rate limiter forgot {removed} idle clients");
                }
            }
        })
    }
}

impl Backend<SimpleInput> for TokenBucket {
    type Output = SimpleOutput;
    type RollbackToken = String;
    type Error = Error;

    async fn request(
        &self,
        input: SimpleInput,
    ) -> Result<(Decision, Self::Output, Self::RollbackToken), Self::Error> {
        let per_second = input.max_requests as f64 / input.interval.as_secs_f64().max(f64::EPSILON);
        let grant = self.take(&input.key, per_second);
        if !grant.allowed {
            warn!("Rate limit exceeded for {}", input.key);
        }

        // Time until the bucket is full again
        let missing = (self.inner.burst - grant.tokens).max(0.0);
        let refill = if per_second > 0.0 {
            Duration::from_secs_f64(missing / per_second)
        } else {
            Duration::ZERO
        };

        let output = SimpleOutput {
            limit: self.inner.burst as u64,
            remaining: grant.tokens.floor() as u64,
            reset: (self.inner.clock.now() + refill).into(),
        };
        let decision = if grant.allowed {
            Decision::Allowed
        } else {
            Decision::Denied
        };

        Ok((decision, output, input.key))
    }

    async fn rollback(&self, client: Self::RollbackToken) -> Result<(), Self::Error> {
        self.refund(&client);
        Ok(())
    }
}
