//! Image Memcache - soak runner
//!
//! Drives a memory cache with synthetic bitmaps and logs its statistics.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use image_memcache::{CacheConfig, Invalidation, MemoryCache, PixelFootprint};

/// Interval between statistics reports.
const REPORT_INTERVAL: Duration = Duration::from_secs(2);

/// Number of distinct keys the workload cycles through.
const KEY_SPACE: u64 = 4096;

/// Decoded bitmap stand-in used by the workload.
#[derive(Debug)]
struct Bitmap {
    width: u32,
    height: u32,
    scale: u32,
}

impl PixelFootprint for Bitmap {
    fn width(&self) -> f64 {
        f64::from(self.width)
    }

    fn height(&self) -> f64 {
        f64::from(self.height)
    }

    fn scale(&self) -> f64 {
        f64::from(self.scale)
    }
}

/// Main entry point for the soak runner.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the cache with pixel costing and an invalidation source
/// 4. Spawn writer and reader workloads plus a stats reporter
/// 5. On SIGINT/SIGTERM, signal memory pressure and shut down
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "image_memcache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting image memcache soak runner");

    let config = CacheConfig::from_env();
    info!(
        cost_limit = config.cost_limit,
        count_limit = config.count_limit,
        age_limit = ?config.age_limit,
        sweep_interval = ?config.sweep_interval,
        "Configuration loaded"
    );

    let (signals, _) = broadcast::channel(4);
    let cache = Arc::new(
        MemoryCache::<Arc<Bitmap>>::builder()
            .config(config)
            .pixel_cost()
            .invalidation_source(signals.subscribe())
            .build()
            .context("failed to build memory cache")?,
    );

    let mut workload = JoinSet::new();
    for worker in 0..2u64 {
        workload.spawn(write_loop(Arc::clone(&cache), worker));
    }
    for worker in 0..4u64 {
        workload.spawn(read_loop(Arc::clone(&cache), worker));
    }
    workload.spawn(report_loop(Arc::clone(&cache)));

    shutdown_signal().await;

    if signals.send(Invalidation::MemoryPressure).is_err() {
        warn!("no cache subscribed to invalidation signals");
    }
    workload.shutdown().await;
    cache.flush().await;

    let stats = serde_json::to_string(&cache.stats()).context("failed to encode stats")?;
    info!(%stats, "Soak runner shutdown complete");
    Ok(())
}

async fn write_loop(cache: Arc<MemoryCache<Arc<Bitmap>>>, worker: u64) {
    let mut n = worker;
    loop {
        let side = 16 + (n % 64) as u32 * 8;
        let bitmap = Bitmap {
            width: side,
            height: side,
            scale: 1 + (n % 3) as u32,
        };
        cache.put(format!("image-{}", n % KEY_SPACE), Arc::new(bitmap));
        n = n.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407) >> 1;
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

async fn read_loop(cache: Arc<MemoryCache<Arc<Bitmap>>>, worker: u64) {
    let mut n = worker.wrapping_add(7);
    loop {
        // Skew reads toward a small hot set
        let key = if n % 4 == 0 { n % KEY_SPACE } else { n % 64 };
        let _ = cache.get(&format!("image-{}", key));
        n = n.wrapping_mul(2862933555777941757).wrapping_add(3037000493) >> 1;
        tokio::time::sleep(Duration::from_micros(500)).await;
    }
}

async fn report_loop(cache: Arc<MemoryCache<Arc<Bitmap>>>) {
    let mut ticker = tokio::time::interval(REPORT_INTERVAL);
    loop {
        ticker.tick().await;
        let stats = cache.stats();
        let hit_rate = format!("{:.1}%", stats.hit_rate() * 100.0);
        match serde_json::to_string(&stats) {
            Ok(stats) => info!(%stats, %hit_rate, "cache stats"),
            Err(err) => warn!(error = %err, "failed to encode stats"),
        }
    }
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
