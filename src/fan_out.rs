//! Run one lookup per key, a bounded number at a time
use futures::future::join_all;
use std::future::Future;
use tokio::sync::Semaphore;

/// Run `op` for every key with at most `limit` running at once, and
/// report every outcome in the order of `keys`.
///
/// Each key's `op` waits for a permit before it starts and gives it
/// back when it finishes, whichever way it finishes.  This returns
/// only once every key is done.
pub async fn fan_out_each<'k, K, R, E, F, Fut>(
    keys: &'k [K],
    limit: usize,
    op: F,
) -> Vec<Result<R, E>>
where
    F: Fn(&'k K) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let semaphore = Semaphore::new(limit.max(1));
    let semaphore = &semaphore;
    let op = &op;
    join_all(keys.iter().map(|key| async move {
        // The semaphore is never closed, so this always gets a permit
        let _permit = semaphore.acquire().await.ok();
        op(key).await
    }))
    .await
}

/// All or nothing: the results in key order, or the error of the
/// first key (in key order, not time order) that failed.
///
/// Results that did arrive are thrown away when any key fails, and
/// only one error is ever reported.  `fan_out_each` keeps them all.
pub async fn fan_out<'k, K, R, E, F, Fut>(keys: &'k [K], limit: usize, op: F) -> Result<Vec<R>, E>
where
    F: Fn(&'k K) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    fan_out_each(keys, limit, op).await.into_iter().collect()
}
