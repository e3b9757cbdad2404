use std::cmp::Ordering;
use std::time::Instant;

use px_compiler::Settings;
use px_core::decision::{decide, ActiveProfileState, ProxyRequest};
use px_core::state::HotProfileState;
use px_core::types::BypassConfig;

pub struct BenchOptions {
    pub settings_path: String,
    pub profile: Option<String>,
    pub iterations: usize,
    pub requests: usize,
}

struct BenchResult {
    iterations: usize,
    total_ms: f64,
    avg_us: f64,
    p50_us: f64,
    p95_us: f64,
    p99_us: f64,
    ops_per_sec: u64,
}

const DEFAULT_SEED: u32 = 0xc0ffee;

pub fn run(opts: BenchOptions) -> Result<(), String> {
    println!("============================================================");
    println!("Proxy Rules Benchmark");
    println!("============================================================");

    let text = std::fs::read_to_string(&opts.settings_path)
        .map_err(|e| format!("Failed to read '{}': {}", opts.settings_path, e))?;
    let settings = Settings::from_json(&text).map_err(|e| e.to_string())?;
    let profile = match &opts.profile {
        Some(id) => settings.profile(id).ok_or_else(|| format!("Profile '{id}' not found"))?,
        None => settings.active_profile(false).map_err(|e| e.to_string())?,
    };

    let start = Instant::now();
    let compiled = settings.compile(profile);
    println!(
        "Compiled profile '{}' in {:.2}ms ({} rules, {} errors)",
        profile.profile_name,
        start.elapsed().as_secs_f64() * 1000.0,
        compiled.state.compiled_rules.len(),
        compiled.errors.len()
    );

    let rule_hosts: Vec<String> = profile
        .proxy_rules
        .iter()
        .filter(|rule| rule.enabled)
        .filter_map(|rule| rule.rule_text())
        .filter(|text| !text.contains(['*', '/', '^', '\\', '(', '<']))
        .map(str::to_string)
        .collect();
    let urls = generate_urls(&rule_hosts, opts.requests, DEFAULT_SEED);

    println!("Warmup...");
    for url in &urls {
        let _ = decide(&ProxyRequest::new(url), &compiled.state, &settings.bypass);
    }

    println!("------------------------------------------------------------");
    println!("Benchmark: decide ({} urls, {} iterations)", urls.len(), opts.iterations);
    println!("------------------------------------------------------------");
    let direct = run_decide(&compiled.state, &settings.bypass, &urls, opts.iterations);
    println!("{}", format_result("decide", &direct));

    println!("------------------------------------------------------------");
    println!("Benchmark: hot state ({} urls, {} iterations)", urls.len(), opts.iterations);
    println!("------------------------------------------------------------");
    let hot = HotProfileState::new(compiled.state.clone(), settings.bypass.clone());
    let swapped = run_hot(&hot, &urls, opts.iterations);
    println!("{}", format_result("HotProfileState::decide", &swapped));

    println!("============================================================");
    Ok(())
}

fn run_decide(state: &ActiveProfileState, bypass: &BypassConfig, urls: &[String], iterations: usize) -> BenchResult {
    measure(urls, iterations, |url| {
        let _ = decide(&ProxyRequest::new(url), state, bypass);
    })
}

fn run_hot(hot: &HotProfileState, urls: &[String], iterations: usize) -> BenchResult {
    measure(urls, iterations, |url| {
        let _ = hot.decide(&ProxyRequest::new(url));
    })
}

fn measure(urls: &[String], iterations: usize, mut op: impl FnMut(&str)) -> BenchResult {
    let mut latencies = Vec::with_capacity(urls.len() * iterations);

    for _ in 0..iterations {
        for url in urls {
            let start = Instant::now();
            op(url);
            latencies.push(start.elapsed().as_secs_f64() * 1_000_000.0);
        }
    }

    latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let total_ops = latencies.len();
    let total_ms = latencies.iter().sum::<f64>() / 1000.0;
    let avg_us = if latencies.is_empty() { 0.0 } else { latencies.iter().sum::<f64>() / total_ops as f64 };

    BenchResult {
        iterations: total_ops,
        total_ms,
        avg_us,
        p50_us: percentile(&latencies, 0.50),
        p95_us: percentile(&latencies, 0.95),
        p99_us: percentile(&latencies, 0.99),
        ops_per_sec: if total_ms > 0.0 { (total_ops as f64 / (total_ms / 1000.0)) as u64 } else { 0 },
    }
}

fn format_result(name: &str, result: &BenchResult) -> String {
    format!(
        "{}:\n  Iterations: {}\n  Total time: {:.2}ms\n  Avg latency: {:.2}μs\n  P50 latency: {:.2}μs\n  P95 latency: {:.2}μs\n  P99 latency: {:.2}μs\n  Throughput:  {} ops/sec",
        name,
        result.iterations,
        result.total_ms,
        result.avg_us,
        result.p50_us,
        result.p95_us,
        result.p99_us,
        result.ops_per_sec,
    )
}

fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let idx = ((values.len() as f64) * p).ceil() as usize;
    let idx = idx.saturating_sub(1).min(values.len() - 1);
    values[idx]
}

fn create_rng(seed: u32) -> impl FnMut() -> f64 {
    let mut state = seed;
    move || {
        state = state.wrapping_mul(1664525).wrapping_add(1013904223);
        (state as f64) / (u32::MAX as f64)
    }
}

fn pick<T: Clone>(items: &[T], rand: &mut impl FnMut() -> f64) -> T {
    let idx = (rand() * items.len() as f64).floor() as usize;
    items[idx.min(items.len() - 1)].clone()
}

/// Mix of URLs on rule hosts (and their subdomains) and unrelated sites.
fn generate_urls(rule_hosts: &[String], count: usize, seed: u32) -> Vec<String> {
    const OTHER_DOMAINS: &[&str] = &[
        "example.com",
        "github.com",
        "stackoverflow.com",
        "wikipedia.org",
        "mozilla.org",
        "localhost",
        "192.168.1.10",
        "intranet.local",
    ];
    const SUBDOMAINS: &[&str] = &["", "www.", "cdn.", "api.", "static.img."];
    const PATHS: &[&str] = &["/", "/index.html", "/assets/main.js", "/api/v1/data?q=1", "/images/logo.png"];
    const SCHEMES: &[&str] = &["https", "http", "wss"];

    let mut rng = create_rng(seed);
    let mut urls = Vec::with_capacity(count);

    for _ in 0..count {
        let host = if !rule_hosts.is_empty() && rng() < 0.4 {
            format!("{}{}", pick(SUBDOMAINS, &mut rng), pick(rule_hosts, &mut rng))
        } else {
            pick(OTHER_DOMAINS, &mut rng).to_string()
        };
        urls.push(format!("{}://{}{}", pick(SCHEMES, &mut rng), host, pick(PATHS, &mut rng)));
    }

    urls
}
