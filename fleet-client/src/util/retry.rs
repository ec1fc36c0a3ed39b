/// Evaluate a future-producing expression up to `$attempts` times, sleeping
/// `$delay_secs` between failed attempts. Yields the last `Result`.
#[macro_export]
macro_rules! retry_async {
    ($attempts:expr, $delay_secs:expr, $fut:expr) => {{
        let mut attempt: u32 = 1;
        loop {
            match $fut.await {
                Ok(value) => break Ok(value),
                Err(e) if attempt < $attempts => {
                    tracing::warn!(
                        "Attempt {} failed: {}. Retrying in {}s",
                        attempt,
                        e,
                        $delay_secs
                    );
                    attempt += 1;
                    tokio::time::sleep(std::time::Duration::from_secs($delay_secs)).await;
                }
                Err(e) => break Err(e),
            }
        }
    }};
}
