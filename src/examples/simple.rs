//! Simple example of using proxy-sampler as a library.

use proxy_sampler::{render, HttpProber, OutputFormat, ProbeConfig, WorkerPool};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = ProbeConfig::builder()
        .endpoint("https://httpbin.org/ip")
        .proxies(vec![
            "http://127.0.0.1:3128",
            "socks5h://127.0.0.1:9050",
        ])
        .concurrency(2)
        // spacing between requests of the same worker
        .delay(Duration::from_millis(200))
        .timeout(Duration::from_secs(5))
        .output(OutputFormat::Json)
        .include_body(true)
        .build()?;

    let pool = WorkerPool::from_config(HttpProber::from_config(&config)?, &config)?;

    println!("Probing {} proxies...", config.proxies.len());
    let report = pool
        .run_report(config.targets(), |result, tally| {
            println!("[{}/{}] {} -> {}", tally.total(), config.proxies.len(), result.proxy, result.status_code);
        })
        .await;

    println!("{}", render(&report, config.output)?);

    Ok(())
}
