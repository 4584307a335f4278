use std::time::Duration;

use crate::error::Error;

const MAX_RETRIES: u32 = 3;
const BACKOFF_MILLIS: &[u64] = &[200, 1000, 5000];

/// Only store connectivity problems are worth retrying. Upsert rejections
/// and configuration problems fail the run immediately.
pub fn is_transient(e: &Error) -> bool {
    matches!(e, Error::Database(_))
}

/// Retry a store-call expression with capped backoff on transient errors.
///
/// Usage: `retry_store!(repository::recent_events(&db, days))`
///
/// The expression is re-evaluated on each attempt, so it must construct a
/// fresh future each time. This is a macro because async closures returning
/// borrowed futures can't satisfy `Fn`.
macro_rules! retry_store {
    ($expr:expr) => {{
        let mut _attempt: u32 = 0;
        loop {
            match $expr.await {
                Ok(val) => break Ok::<_, $crate::error::Error>(val),
                Err(e) => {
                    if $crate::job::retry::is_transient(&e) && _attempt < 3 {
                        $crate::job::retry::backoff_sleep(_attempt).await;
                        _attempt += 1;
                    } else {
                        break Err(e);
                    }
                }
            }
        }
    }};
}

pub(crate) use retry_store;

/// Sleep for the backoff slot of the given attempt.
pub async fn backoff_sleep(attempt: u32) {
    let wait = BACKOFF_MILLIS
        .get(attempt as usize)
        .copied()
        .unwrap_or(5000);
    log::warn!(
        "Transient store error. Waiting {wait}ms before retry {}/{}",
        attempt + 1,
        MAX_RETRIES
    );
    tokio::time::sleep(Duration::from_millis(wait)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_transient() {
        assert!(is_transient(&Error::Database("locked".into())));
        assert!(!is_transient(&Error::Upsert("constraint".into())));
        assert!(!is_transient(&Error::Config("missing".into())));
    }
}
