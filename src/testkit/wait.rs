//! Waiting on state that background tasks converge to.

use std::time::Duration;

use tokio::time::{sleep, Instant};

const WAIT_LIMIT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Poll `condition` until it holds or a few seconds pass.
///
/// Returns whether the condition was observed.
pub async fn eventually<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + WAIT_LIMIT;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(POLL_INTERVAL).await;
    }
}
