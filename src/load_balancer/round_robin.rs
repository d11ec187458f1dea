//! Round-robin balancer.
//!
//! Holds the ordered backend list and a shared cursor. Selection starts at
//! `cursor % N`, skips dead backends, and moves the cursor one past the
//! backend it returns.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::config::ProxyConfig;
use crate::load_balancer::backend::{Backend, HttpBackend};
use crate::load_balancer::BalancerError;
use crate::observability::metrics;

/// Round-robin load balancer over a fixed, non-empty backend list.
#[derive(Debug)]
pub struct Balancer {
    listen_port: String,
    backends: Vec<Arc<dyn Backend>>,
    cursor: AtomicUsize,
}

impl Balancer {
    /// Create a balancer with the cursor at zero. Rejects an empty list.
    pub fn new(
        listen_port: impl Into<String>,
        backends: Vec<Arc<dyn Backend>>,
    ) -> Result<Self, BalancerError> {
        if backends.is_empty() {
            return Err(BalancerError::NoBackends);
        }
        Ok(Self {
            listen_port: listen_port.into(),
            backends,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Build HTTP backends for every configured origin, in order.
    pub fn from_config(
        config: &ProxyConfig,
        client: reqwest::Client,
    ) -> Result<Self, BalancerError> {
        let backends = config
            .backends
            .iter()
            .map(|b| {
                HttpBackend::new(&b.address, client.clone())
                    .map(|backend| Arc::new(backend) as Arc<dyn Backend>)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(config.listener.port.clone(), backends)
    }

    pub fn listen_port(&self) -> &str {
        &self.listen_port
    }

    pub fn backends(&self) -> &[Arc<dyn Backend>] {
        &self.backends
    }

    /// Current raw cursor value (for diagnostics).
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }

    /// Pick the next live backend.
    ///
    /// Probes at most N slots starting at `cursor % N`. On success the cursor
    /// lands one past the chosen slot, so every call advances it by at least
    /// one. Concurrent callers race on a compare-and-swap; a loser re-reads
    /// the cursor and searches again, so no advance is lost.
    pub fn select_next(&self) -> Result<Arc<dyn Backend>, BalancerError> {
        let len = self.backends.len();
        let mut current = self.cursor.load(Ordering::Relaxed);

        loop {
            let found = (0..len).find(|offset| {
                self.backends[current.wrapping_add(*offset) % len].is_alive()
            });

            let Some(offset) = found else {
                self.cursor.fetch_add(1, Ordering::Relaxed);
                return Err(BalancerError::NoLiveBackend { backends: len });
            };

            let next = current.wrapping_add(offset).wrapping_add(1);
            match self
                .cursor
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => {
                    let index = current.wrapping_add(offset) % len;
                    return Ok(self.backends[index].clone());
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Select a backend and hand the request to it.
    ///
    /// No live backend means 503; upstream failures arrive already mapped by
    /// the backend and are relayed unchanged.
    pub async fn route_request(&self, request: Request<Body>) -> Response {
        let start = Instant::now();

        let backend = match self.select_next() {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(error = %e, "No backend available");
                metrics::record_no_live_backend();
                return (StatusCode::SERVICE_UNAVAILABLE, "No live backends").into_response();
            }
        };

        tracing::info!(backend = %backend.address(), "Forwarding request");
        let response = backend.forward(request).await;

        metrics::record_request(backend.address().as_str(), response.status().as_u16(), start);
        response
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::load_balancer::backend::LivenessControl;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicBool;
    use url::Url;

    /// In-memory backend that answers with its own name.
    #[derive(Debug)]
    pub(crate) struct StubBackend {
        name: &'static str,
        address: Url,
        alive: AtomicBool,
    }

    impl StubBackend {
        pub(crate) fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                address: Url::parse(&format!("http://{name}.test")).unwrap(),
                alive: AtomicBool::new(true),
            })
        }
    }

    #[async_trait]
    impl Backend for StubBackend {
        fn address(&self) -> &Url {
            &self.address
        }

        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        async fn forward(&self, _request: Request<Body>) -> Response {
            self.name.into_response()
        }

        fn liveness(&self) -> Option<&dyn LivenessControl> {
            Some(self)
        }
    }

    impl LivenessControl for StubBackend {
        fn set_alive(&self, alive: bool) -> bool {
            self.alive.swap(alive, Ordering::SeqCst)
        }
    }

    fn balancer(names: &[&'static str]) -> (Balancer, Vec<Arc<StubBackend>>) {
        let stubs: Vec<_> = names.iter().map(|&n| StubBackend::new(n)).collect();
        let backends = stubs.iter().map(|s| s.clone() as Arc<dyn Backend>).collect();
        (Balancer::new("8000", backends).unwrap(), stubs)
    }

    fn host(backend: &Arc<dyn Backend>) -> String {
        backend.address().host_str().unwrap().trim_end_matches(".test").to_string()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn empty_backend_list_is_rejected() {
        assert!(matches!(Balancer::new("8000", Vec::new()), Err(BalancerError::NoBackends)));
    }

    #[test]
    fn cycles_in_list_order_and_wraps() {
        let (lb, _) = balancer(&["a", "b", "c"]);
        let picks: Vec<_> = (0..4).map(|_| host(&lb.select_next().unwrap())).collect();
        assert_eq!(picks, ["a", "b", "c", "a"]);
    }

    #[test]
    fn skips_a_dead_backend() {
        let (lb, stubs) = balancer(&["a", "b", "c"]);
        stubs[1].set_alive(false);

        let picks: Vec<_> = (0..6).map(|_| host(&lb.select_next().unwrap())).collect();
        assert_eq!(picks, ["a", "c", "a", "c", "a", "c"]);
    }

    #[test]
    fn dead_backend_rejoins_rotation() {
        let (lb, stubs) = balancer(&["a", "b", "c"]);
        stubs[1].set_alive(false);
        assert_eq!(host(&lb.select_next().unwrap()), "a");
        assert_eq!(host(&lb.select_next().unwrap()), "c");

        stubs[1].set_alive(true);
        let picks: Vec<_> = (0..3).map(|_| host(&lb.select_next().unwrap())).collect();
        assert_eq!(picks, ["a", "b", "c"]);
    }

    #[test]
    fn all_dead_terminates_with_error() {
        let (lb, stubs) = balancer(&["a", "b"]);
        for s in &stubs {
            s.set_alive(false);
        }

        let before = lb.cursor();
        assert!(matches!(
            lb.select_next(),
            Err(BalancerError::NoLiveBackend { backends: 2 })
        ));
        assert!(lb.cursor() > before);
    }

    #[test]
    fn every_call_advances_the_cursor() {
        let (lb, stubs) = balancer(&["a", "b", "c"]);
        stubs[0].set_alive(false);
        for _ in 0..10 {
            let before = lb.cursor();
            lb.select_next().unwrap();
            assert!(lb.cursor() > before);
        }
    }

    #[test]
    fn distribution_is_uniform() {
        let (lb, _) = balancer(&["a", "b", "c", "d"]);
        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..10_000 {
            *counts.entry(host(&lb.select_next().unwrap())).or_default() += 1;
        }
        assert_eq!(counts.len(), 4);
        assert!(counts.values().all(|&c| c == 2_500));
    }

    #[test]
    fn concurrent_selection_loses_no_increment() {
        let (lb, _) = balancer(&["a", "b", "c"]);
        let lb = Arc::new(lb);
        let threads = 8;
        let per_thread = 3_000;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let lb = lb.clone();
                std::thread::spawn(move || {
                    let mut local: HashMap<String, usize> = HashMap::new();
                    for _ in 0..per_thread {
                        *local.entry(host(&lb.select_next().unwrap())).or_default() += 1;
                    }
                    local
                })
            })
            .collect();

        let mut totals: HashMap<String, usize> = HashMap::new();
        for h in handles {
            for (k, v) in h.join().unwrap() {
                *totals.entry(k).or_default() += v;
            }
        }

        assert_eq!(lb.cursor(), threads * per_thread);
        assert!(totals.values().all(|&c| c == threads * per_thread / 3));
    }

    #[tokio::test]
    async fn routes_a_b_c_then_wraps() {
        let (lb, _) = balancer(&["a", "b", "c"]);
        let mut seen = Vec::new();
        for _ in 0..4 {
            let req = Request::builder().uri("/").body(Body::empty()).unwrap();
            seen.push(body_text(lb.route_request(req).await).await);
        }
        assert_eq!(seen, ["a", "b", "c", "a"]);
    }

    #[tokio::test]
    async fn routes_around_dead_backend() {
        let (lb, stubs) = balancer(&["a", "b", "c"]);
        stubs[1].set_alive(false);
        let mut seen = Vec::new();
        for _ in 0..4 {
            let req = Request::builder().uri("/").body(Body::empty()).unwrap();
            seen.push(body_text(lb.route_request(req).await).await);
        }
        assert_eq!(seen, ["a", "c", "a", "c"]);
    }

    #[tokio::test]
    async fn no_live_backend_is_service_unavailable() {
        let (lb, stubs) = balancer(&["a"]);
        stubs[0].set_alive(false);
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        assert_eq!(lb.route_request(req).await.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn from_config_preserves_order() {
        let mut config = ProxyConfig::default();
        config.listener.port = "8123".into();
        let lb = Balancer::from_config(&config, reqwest::Client::new()).unwrap();
        assert_eq!(lb.listen_port(), "8123");
        let hosts: Vec<_> = lb
            .backends()
            .iter()
            .map(|b| b.address().host_str().unwrap().to_string())
            .collect();
        assert_eq!(hosts, ["www.facebook.com", "www.bing.com", "www.duckduckgo.com"]);
    }

    #[test]
    fn from_config_rejects_bad_address() {
        let mut config = ProxyConfig::default();
        config.backends[1].address = "bing".into();
        assert!(matches!(
            Balancer::from_config(&config, reqwest::Client::new()),
            Err(BalancerError::InvalidAddress(_))
        ));
    }
}
