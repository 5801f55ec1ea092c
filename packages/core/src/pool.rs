use std::collections::VecDeque;
use std::sync::Mutex;

/// Runs `work` over `items` on at most `jobs` threads, preserving input
/// order in the result. Falls back to a plain loop for a single job.
///
/// Workers pull from a shared queue, so uneven item costs still keep all
/// threads busy. `work` must not panic; a panicking closure propagates out
/// of the scope and takes the caller down with it.
pub fn run_parallel<T, R, F>(items: Vec<T>, jobs: usize, work: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Send + Sync,
{
    let total = items.len();
    if total == 0 {
        return Vec::new();
    }

    if jobs <= 1 || total == 1 {
        return items.into_iter().map(work).collect();
    }

    let queue: Mutex<VecDeque<(usize, T)>> = Mutex::new(items.into_iter().enumerate().collect());
    let results: Mutex<Vec<Option<R>>> = Mutex::new((0..total).map(|_| None).collect());
    let workers = jobs.min(total);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let next = queue.lock().expect("pool queue poisoned").pop_front();
                let Some((index, item)) = next else {
                    break;
                };
                let out = work(item);
                results.lock().expect("pool results poisoned")[index] = Some(out);
            });
        }
    });

    results
        .into_inner()
        .expect("pool results poisoned")
        .into_iter()
        .map(|slot| slot.expect("pool worker skipped a slot"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_preserves_order() {
        let items: Vec<u32> = (0..100).collect();
        let doubled = run_parallel(items, 4, |n| n * 2);
        assert_eq!(doubled.len(), 100);
        for (i, v) in doubled.iter().enumerate() {
            assert_eq!(*v, (i as u32) * 2);
        }
    }

    #[test]
    fn test_bounded_concurrency() {
        let live = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        run_parallel((0..32).collect::<Vec<_>>(), 3, |_| {
            let now = live.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(2));
            live.fetch_sub(1, Ordering::SeqCst);
        });

        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn test_every_item_processed_once() {
        let seen: Vec<usize> = run_parallel((0..50).collect::<Vec<_>>(), 8, |n| n);
        let unique: HashSet<usize> = seen.iter().copied().collect();
        assert_eq!(unique.len(), 50);
    }

    #[test]
    fn test_single_job_and_empty_input() {
        assert_eq!(run_parallel(vec![1, 2, 3], 1, |n| n + 1), vec![2, 3, 4]);
        assert!(run_parallel(Vec::<u8>::new(), 4, |n| n).is_empty());
    }
}
