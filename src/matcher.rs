//! Thread-safe façade over the order book.
//!
//! A [`Matcher`] serializes every public operation behind a single book lock,
//! so the visible effect of any add/cancel/modify/snapshot is atomic with
//! respect to every other one. It also owns the background pruner that
//! cancels good-for-day orders at the configured daily cutoff; dropping the
//! matcher signals the pruner and joins it before the book is released.

use crate::clock::{Clock, SystemClock};
use crate::config::PruneConfig;
use crate::order::book::tree_map::TreeMap;
use crate::order::book::Depth;
use crate::order::{Id, Order, OrderModify};
use crate::trade::Trade;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use time::{OffsetDateTime, PrimitiveDateTime, Time};
use tracing::{debug, info};

/// Slack added to the cutoff wait so the sweep runs just past the boundary.
const PRUNE_JITTER: Duration = Duration::from_millis(100);

/// State shared between the façade and the pruner thread.
struct Shared {
    book: Mutex<TreeMap>,
    stop: Mutex<bool>,
    stop_cv: Condvar,
    clock: Box<dyn Clock>,
    cutoff: Time,
}

/// Public, thread-safe interface to a single-instrument order book.
pub struct Matcher {
    shared: Arc<Shared>,
    pruner: Option<JoinHandle<()>>,
}

impl Matcher {
    /// Build a matcher with the default 16:00 cutoff and the system clock.
    pub fn new() -> Self {
        Matcher::with_config(PruneConfig::default(), Box::new(SystemClock))
    }

    /// Build a matcher with an explicit prune schedule and time source.
    pub fn with_config(prune: PruneConfig, clock: Box<dyn Clock>) -> Self {
        let shared = Arc::new(Shared {
            book: Mutex::new(TreeMap::new()),
            stop: Mutex::new(false),
            stop_cv: Condvar::new(),
            clock,
            cutoff: prune.cutoff(),
        });

        let pruner = thread::spawn({
            let shared = Arc::clone(&shared);
            move || prune_loop(&shared)
        });

        Matcher {
            shared,
            pruner: Some(pruner),
        }
    }

    /// Add an order and return the trades it produced.
    ///
    /// An empty result means the order rests, was rejected by its
    /// time-in-force policy, or simply did not cross.
    pub fn add_order(&self, order: Order) -> Vec<Trade> {
        self.shared.book.lock().unwrap().add(order)
    }

    /// Cancel an order by id. Unknown ids are a silent no-op.
    pub fn cancel_order(&self, id: Id) {
        self.shared.book.lock().unwrap().cancel(id);
    }

    /// Cancel a batch of orders under a single lock acquisition.
    pub fn cancel_orders(&self, ids: &[Id]) {
        let mut book = self.shared.book.lock().unwrap();
        for id in ids {
            book.cancel(*id);
        }
    }

    /// Replace a resting order with new side/price/quantity, keeping its id
    /// and its original time-in-force. Unknown ids are a silent no-op.
    pub fn modify_order(&self, modify: OrderModify) -> Vec<Trade> {
        let mut book = self.shared.book.lock().unwrap();
        let Some(order_type) = book.lookup(modify.id).map(|order| order.order_type) else {
            debug!(order_id = modify.id, "modify for unknown order id ignored");
            return Vec::new();
        };

        book.cancel(modify.id);
        book.add(modify.into_order(order_type))
    }

    /// Number of live orders in the book.
    pub fn len(&self) -> usize {
        self.shared.book.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.book.lock().unwrap().is_empty()
    }

    /// Aggregated depth up to `limit` levels per side.
    pub fn depth(&self, limit: usize) -> Depth {
        self.shared.book.lock().unwrap().depth(limit)
    }

    /// Aggregated depth across all levels.
    pub fn snapshot(&self) -> Depth {
        self.depth(usize::MAX)
    }

    /// Copy of a live order, or `None` once it filled or was cancelled.
    pub fn lookup(&self, id: Id) -> Option<Order> {
        self.shared.book.lock().unwrap().lookup(id).cloned()
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Matcher::new()
    }
}

impl Drop for Matcher {
    fn drop(&mut self) {
        *self.shared.stop.lock().unwrap() = true;
        self.shared.stop_cv.notify_all();
        if let Some(handle) = self.pruner.take() {
            let _ = handle.join();
        }
    }
}

/// Background loop that cancels good-for-day orders at the daily cutoff.
///
/// Parks on a timed condition wait until the next cutoff (plus jitter) or
/// until shutdown is signalled. On a timeout it collects the day-order ids
/// under the book lock, releases it, then cancels the batch in one further
/// acquisition.
fn prune_loop(shared: &Shared) {
    loop {
        let wait = duration_until_cutoff(shared.clock.now(), shared.cutoff) + PRUNE_JITTER;

        let stopped = shared.stop.lock().unwrap();
        let (stopped, result) = shared.stop_cv.wait_timeout(stopped, wait).unwrap();
        if *stopped {
            return;
        }
        drop(stopped);

        if !result.timed_out() {
            // Woken without shutdown: recompute the cutoff and keep waiting.
            continue;
        }

        let ids = shared.book.lock().unwrap().day_order_ids();
        if ids.is_empty() {
            continue;
        }

        info!(
            count = ids.len(),
            "sweeping good-for-day orders at the daily cutoff"
        );
        let mut book = shared.book.lock().unwrap();
        for id in &ids {
            book.cancel(*id);
        }
    }
}

/// Time remaining until the next occurrence of `cutoff` in `now`'s offset.
/// Rolls over to the next day once the cutoff has passed.
fn duration_until_cutoff(now: OffsetDateTime, cutoff: Time) -> Duration {
    let mut date = now.date();
    if now.time() >= cutoff {
        date = date.next_day().unwrap();
    }
    let next = PrimitiveDateTime::new(date, cutoff).assume_offset(now.offset());

    (next - now).try_into().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{OrderType, Side};
    use crate::trade::Fill;
    use std::time::Instant;
    use time::macros::{datetime, time};

    struct FixedClock(OffsetDateTime);

    impl Clock for FixedClock {
        fn now(&self) -> OffsetDateTime {
            self.0
        }
    }

    fn gtc(id: Id, side: Side, price: i32, qty: u32) -> Order {
        Order::new(OrderType::GoodTillCancel, id, side, price, qty)
    }

    /// A matcher whose pruner will not fire during the test.
    fn idle_matcher() -> Matcher {
        Matcher::with_config(
            PruneConfig::default(),
            Box::new(FixedClock(datetime!(2024-03-01 03:00:00 UTC))),
        )
    }

    #[test]
    fn add_cancel_and_size_round_trip() {
        let matcher = idle_matcher();
        assert!(matcher.is_empty());

        matcher.add_order(gtc(1, Side::Buy, 100, 10));
        matcher.add_order(gtc(2, Side::Buy, 101, 5));
        assert_eq!(matcher.len(), 2);

        matcher.cancel_order(1);
        matcher.cancel_order(999);
        assert_eq!(matcher.len(), 1);

        matcher.cancel_orders(&[2, 2, 3]);
        assert!(matcher.is_empty());
    }

    #[test]
    fn modify_replaces_the_order_and_can_cross() {
        let matcher = idle_matcher();
        matcher.add_order(gtc(1, Side::Buy, 100, 10));
        matcher.add_order(gtc(2, Side::Buy, 100, 10));

        let trades = matcher.modify_order(OrderModify::new(2, Side::Sell, 100, 10));
        assert_eq!(
            trades,
            vec![Trade {
                bid: Fill {
                    order_id: 1,
                    price: 100,
                    quantity: 10
                },
                ask: Fill {
                    order_id: 2,
                    price: 100,
                    quantity: 10
                },
            }],
            "flipping the second bid to a sell should cross the first"
        );
        assert!(matcher.is_empty());
    }

    #[test]
    fn modify_preserves_the_original_time_in_force() {
        let matcher = idle_matcher();
        matcher.add_order(Order::new(OrderType::GoodForDay, 1, Side::Buy, 100, 10));

        matcher.modify_order(OrderModify::new(1, Side::Buy, 101, 10));
        let order = matcher.lookup(1).expect("modified order should rest");
        assert_eq!(order.order_type, OrderType::GoodForDay);
        assert_eq!(order.price, 101);
    }

    #[test]
    fn modify_of_unknown_order_is_a_noop() {
        let matcher = idle_matcher();
        let trades = matcher.modify_order(OrderModify::new(42, Side::Buy, 100, 10));
        assert!(trades.is_empty());
        assert!(matcher.is_empty());
    }

    #[test]
    fn noop_modify_leaves_an_equivalent_book() {
        let matcher = idle_matcher();
        matcher.add_order(gtc(1, Side::Buy, 100, 10));
        let before = matcher.snapshot();

        let trades = matcher.modify_order(OrderModify::new(1, Side::Buy, 100, 10));
        assert!(trades.is_empty());
        assert_eq!(matcher.len(), 1);

        let after = matcher.snapshot();
        assert_eq!(before.bids, after.bids);
        assert_eq!(before.asks, after.asks);
    }

    #[test]
    fn snapshot_covers_all_levels() {
        let matcher = idle_matcher();
        for (i, price) in (100..110).enumerate() {
            matcher.add_order(gtc(i as Id + 1, Side::Sell, price, 1));
        }

        let snapshot = matcher.snapshot();
        assert_eq!(snapshot.asks.len(), 10);
        assert_eq!(snapshot.asks[0].price, 100, "asks must lead with the best");
        assert!(snapshot.bids.is_empty());
    }

    #[test]
    fn concurrent_producers_observe_a_consistent_book() {
        let matcher = idle_matcher();

        thread::scope(|scope| {
            for worker in 0u64..4 {
                let matcher = &matcher;
                scope.spawn(move || {
                    for i in 0..50 {
                        let id = worker * 1_000 + i;
                        matcher.add_order(gtc(id, Side::Buy, 100 - worker as i32, 1));
                    }
                });
            }
        });

        assert_eq!(matcher.len(), 200, "every producer's orders must land");
        let depth = matcher.depth(10);
        assert_eq!(depth.bids.len(), 4);
        assert_eq!(depth.bids[0].quantity, 50);
    }

    #[test]
    fn pruner_sweeps_day_orders_at_the_cutoff() {
        // 200ms before the default cutoff, so the sweep fires almost
        // immediately after the jitter.
        let matcher = Matcher::with_config(
            PruneConfig::default(),
            Box::new(FixedClock(datetime!(2024-03-01 15:59:59.9 UTC))),
        );
        matcher.add_order(Order::new(OrderType::GoodForDay, 1, Side::Buy, 100, 10));
        matcher.add_order(Order::new(OrderType::GoodForDay, 2, Side::Sell, 200, 10));
        matcher.add_order(gtc(3, Side::Sell, 1_000, 10));

        let deadline = Instant::now() + Duration::from_secs(5);
        while matcher.len() != 1 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }

        assert_eq!(matcher.len(), 1, "only the good-till-cancel order survives");
        assert!(matcher.lookup(3).is_some());
    }

    #[test]
    fn drop_joins_the_pruner_promptly() {
        let matcher = idle_matcher();
        matcher.add_order(gtc(1, Side::Buy, 100, 10));

        let started = Instant::now();
        drop(matcher);
        assert!(
            started.elapsed() < Duration::from_secs(2),
            "shutdown must not wait for the cutoff"
        );
    }

    #[test]
    fn cutoff_wait_rolls_over_past_the_boundary() {
        let cutoff = time!(16:00);

        let before = datetime!(2024-03-01 10:00:00 UTC);
        assert_eq!(
            duration_until_cutoff(before, cutoff),
            Duration::from_secs(6 * 60 * 60)
        );

        let after = datetime!(2024-03-01 17:00:00 UTC);
        assert_eq!(
            duration_until_cutoff(after, cutoff),
            Duration::from_secs(23 * 60 * 60)
        );

        let exactly = datetime!(2024-03-01 16:00:00 UTC);
        assert_eq!(
            duration_until_cutoff(exactly, cutoff),
            Duration::from_secs(24 * 60 * 60),
            "at the cutoff the next sweep is tomorrow's"
        );
    }
}
