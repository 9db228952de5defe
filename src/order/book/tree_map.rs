//! Order book implementation backed by BTreeMap price levels.
//!
//! This module provides a price-time priority limit order book using two
//! BTreeMaps (bids and asks, with best bid = highest key and best ask =
//! lowest key). Each price level maintains a FIFO queue of orders via indices
//! into a Slab, avoiding frequent allocations and allowing O(1)
//! insertion/removal within a level. A separate per-price aggregate index
//! (live count + total remaining quantity) makes fill-or-kill feasibility a
//! walk over levels instead of orders.
//!
//! Matching is performed by crossing the best bid and best ask while prices
//! overlap; each execution prices both legs at the involved order's own limit.

use crate::order::book::{Depth, LevelInfo};
use crate::order::{Id, Order, OrderType, Price, Quantity, Side};
use crate::trade::{Fill, Trade};
use slab::Slab;
use std::cmp;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Linked-list anchors for a single price level.
///
/// Orders are chained through slab indices to preserve arrival order (time
/// priority) while keeping removal at any position O(1). Per-price aggregates
/// live in the book's level-data index, not here.
#[derive(Debug, Default)]
struct PriceLevel {
    head: Option<usize>,
    tail: Option<usize>,
}

impl PriceLevel {
    /// Append an order node to the back of the level's FIFO queue. The
    /// `order_idx` must reference a valid entry in `orders`.
    fn push(&mut self, orders: &mut Slab<OrderNode>, order_idx: usize) {
        match self.tail {
            Some(tail) => {
                orders[tail].next = Some(order_idx);
                orders[order_idx].prev = Some(tail);
                self.tail = Some(order_idx);
            }
            None => {
                self.head = Some(order_idx);
                self.tail = Some(order_idx);
                orders[order_idx].prev = None;
            }
        }
    }

    /// Unchain a specific order node from the level's queue. The node must be
    /// currently linked in this level.
    fn remove(&mut self, orders: &mut Slab<OrderNode>, order_idx: usize) {
        let prev = orders[order_idx].prev;
        let next = orders[order_idx].next;

        if let Some(p) = prev {
            orders[p].next = next;
        } else {
            self.head = next;
        }
        if let Some(n) = next {
            orders[n].prev = prev;
        } else {
            self.tail = prev;
        }
        orders[order_idx].prev = None;
        orders[order_idx].next = None;
    }

    fn is_empty(&self) -> bool {
        self.head.is_none()
    }
}

/// Node representing an individual order stored in a slab and linked within a
/// price level's FIFO queue.
#[derive(Debug, Clone)]
struct OrderNode {
    order: Order,
    next: Option<usize>,
    prev: Option<usize>,
}

/// How a book mutation affects the per-price aggregates.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum LevelDataAction {
    /// A new order arrived at the price.
    Add,
    /// An order left the price (cancel, or the closing step of a full fill).
    Remove,
    /// Part of an order executed; the order itself stays.
    Match,
}

/// Aggregate state for one price across both sides. A price is live on at
/// most one side at a time, so a single map covers the whole book.
#[derive(Debug, Default, PartialEq, Eq)]
struct LevelData {
    count: usize,
    quantity: Quantity,
}

/// BTreeMap-backed order book implementing price-time priority with
/// time-in-force handling.
#[derive(Debug, Default)]
pub struct TreeMap {
    bids: BTreeMap<Price, PriceLevel>,
    asks: BTreeMap<Price, PriceLevel>,
    orders: Slab<OrderNode>,
    order_indexes: HashMap<Id, usize>,
    level_data: HashMap<Price, LevelData>,
}

impl TreeMap {
    /// Create a new, empty book.
    pub fn new() -> Self {
        TreeMap::default()
    }

    /// Number of live orders in the book.
    pub fn len(&self) -> usize {
        self.order_indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order_indexes.is_empty()
    }

    /// Get a live order by its id.
    pub fn lookup(&self, id: Id) -> Option<&Order> {
        let idx = self.order_indexes.get(&id)?;

        Some(&self.orders[*idx].order)
    }

    /// Ids of all resting good-for-day orders, for the end-of-day sweep.
    pub fn day_order_ids(&self) -> Vec<Id> {
        self.order_indexes
            .iter()
            .filter(|(_, &idx)| self.orders[idx].order.order_type == OrderType::GoodForDay)
            .map(|(&id, _)| id)
            .collect()
    }

    /// Insert a new order, applying its time-in-force policy, then match.
    ///
    /// - Duplicate ids are ignored.
    /// - `Market` orders are repriced at the worst opposite price so the
    ///   limit-based matching loop can sweep the whole opposing side; with no
    ///   opposite liquidity the order is rejected.
    /// - `FillAndKill` must be crossable right now, `FillOrKill` must be
    ///   fully fillable right now; otherwise the order is rejected.
    ///
    /// All rejections are silent: the order is not enqueued and no trades are
    /// returned.
    pub fn add(&mut self, mut order: Order) -> Vec<Trade> {
        if self.order_indexes.contains_key(&order.id) {
            warn!(order_id = order.id, "order id already exists, skipping add");
            return Vec::new();
        }

        if order.remaining() == 0 {
            debug!(order_id = order.id, "zero-quantity order rejected");
            return Vec::new();
        }

        if order.order_type == OrderType::Market {
            let worst_opposite = match order.side {
                Side::Buy => self.asks.last_key_value().map(|(price, _)| *price),
                Side::Sell => self.bids.first_key_value().map(|(price, _)| *price),
            };
            match worst_opposite {
                Some(price) => order.to_limit(price),
                None => {
                    debug!(
                        order_id = order.id,
                        "market order with no opposite liquidity rejected"
                    );
                    return Vec::new();
                }
            }
        }

        if order.order_type == OrderType::FillAndKill && !self.can_match(order.side, order.price) {
            debug!(
                order_id = order.id,
                "fill-and-kill order has nothing to match, rejected"
            );
            return Vec::new();
        }

        if order.order_type == OrderType::FillOrKill
            && !self.can_fully_fill(order.side, order.price, order.remaining())
        {
            debug!(
                order_id = order.id,
                "fill-or-kill order cannot be fully filled, rejected"
            );
            return Vec::new();
        }

        self.enqueue(order);
        self.match_orders()
    }

    /// Cancel an order by id. Unknown ids are a no-op.
    pub fn cancel(&mut self, id: Id) -> Option<Order> {
        let Some(&idx) = self.order_indexes.get(&id) else {
            debug!(order_id = id, "cancel for unknown order id ignored");
            return None;
        };

        let price = self.orders[idx].order.price;
        let remaining = self.orders[idx].order.remaining();
        let order = self.unlink(idx);
        self.update_level_data(price, remaining, LevelDataAction::Remove);
        Some(order)
    }

    /// Return a snapshot of depth up to `limit` levels per side.
    pub fn depth(&self, limit: usize) -> Depth {
        Depth {
            bids: self
                .bids
                .iter()
                .rev()
                .take(limit)
                .map(|(price, _)| LevelInfo {
                    price: *price,
                    quantity: self.level_data[price].quantity,
                })
                .collect(),
            asks: self
                .asks
                .iter()
                .take(limit)
                .map(|(price, _)| LevelInfo {
                    price: *price,
                    quantity: self.level_data[price].quantity,
                })
                .collect(),
        }
    }

    /// Append the order to its side at its price and write through every
    /// index: level chain, order index, and level-data aggregates.
    fn enqueue(&mut self, order: Order) {
        let id = order.id;
        let side = order.side;
        let price = order.price;
        let quantity = order.remaining();

        let idx = self.orders.insert(OrderNode {
            order,
            next: None,
            prev: None,
        });
        self.order_indexes.insert(id, idx);
        let level = match side {
            Side::Buy => self.bids.entry(price).or_default(),
            Side::Sell => self.asks.entry(price).or_default(),
        };
        level.push(&mut self.orders, idx);
        self.update_level_data(price, quantity, LevelDataAction::Add);
    }

    /// Remove an order node from its level chain and from the book,
    /// cleaning up empty price levels. Does not touch level-data; callers
    /// account for the removal themselves.
    fn unlink(&mut self, idx: usize) -> Order {
        let side = self.orders[idx].order.side;
        let price = self.orders[idx].order.price;

        let level = match side {
            Side::Buy => self.bids.get_mut(&price).unwrap(),
            Side::Sell => self.asks.get_mut(&price).unwrap(),
        };
        level.remove(&mut self.orders, idx);
        if level.is_empty() {
            match side {
                Side::Buy => self.bids.remove(&price),
                Side::Sell => self.asks.remove(&price),
            };
        }

        let node = self.orders.remove(idx);
        self.order_indexes.remove(&node.order.id);
        node.order
    }

    /// Write-through update of the per-price aggregate index. The entry is
    /// dropped as soon as its live count reaches zero.
    fn update_level_data(&mut self, price: Price, quantity: Quantity, action: LevelDataAction) {
        let data = self.level_data.entry(price).or_default();

        match action {
            LevelDataAction::Add => {
                data.count += 1;
                data.quantity += quantity;
            }
            LevelDataAction::Remove => {
                data.count -= 1;
                data.quantity -= quantity;
            }
            LevelDataAction::Match => {
                data.quantity -= quantity;
            }
        }

        if data.count == 0 {
            self.level_data.remove(&price);
        }
    }

    /// Aggregate bookkeeping for one leg of an execution.
    fn on_matched(&mut self, price: Price, quantity: Quantity, fully_filled: bool) {
        let action = if fully_filled {
            LevelDataAction::Remove
        } else {
            LevelDataAction::Match
        };
        self.update_level_data(price, quantity, action);
    }

    /// Whether a new order on `side` at `price` would cross the book.
    fn can_match(&self, side: Side, price: Price) -> bool {
        match side {
            Side::Buy => self
                .asks
                .first_key_value()
                .is_some_and(|(ask, _)| price >= *ask),
            Side::Sell => self
                .bids
                .last_key_value()
                .is_some_and(|(bid, _)| price <= *bid),
        }
    }

    /// Whether an order on `side` at `price` can be filled in full right now.
    ///
    /// Walks the level-data index in arbitrary order, skipping own-side
    /// prices (relative to the best opposite price) and prices worse than the
    /// incoming limit; aggregate fill is commutative over the eligible
    /// levels, so the walk order does not matter.
    fn can_fully_fill(&self, side: Side, price: Price, quantity: Quantity) -> bool {
        if !self.can_match(side, price) {
            return false;
        }

        let threshold = match side {
            Side::Buy => *self.asks.first_key_value().unwrap().0,
            Side::Sell => *self.bids.last_key_value().unwrap().0,
        };

        let mut required = quantity;
        for (level_price, level_data) in &self.level_data {
            let own_side = match side {
                Side::Buy => *level_price < threshold,
                Side::Sell => *level_price > threshold,
            };
            if own_side {
                continue;
            }

            let worse_than_limit = match side {
                Side::Buy => *level_price > price,
                Side::Sell => *level_price < price,
            };
            if worse_than_limit {
                continue;
            }

            if required <= level_data.quantity {
                return true;
            }
            required -= level_data.quantity;
        }

        false
    }

    /// Central matching loop.
    ///
    /// While the best bid price reaches the best ask price, fill the head
    /// orders of both levels by the smaller remaining quantity, emit a trade
    /// priced per leg at each order's own limit, and remove orders that
    /// filled completely. Afterwards, a fill-and-kill left at the top of
    /// either side is cancelled rather than rested.
    fn match_orders(&mut self) -> Vec<Trade> {
        let mut trades = Vec::new();

        loop {
            let (bid_price, bid_idx) = match self.bids.last_key_value() {
                Some((price, level)) => (*price, level.head.unwrap()),
                None => break,
            };
            let (ask_price, ask_idx) = match self.asks.first_key_value() {
                Some((price, level)) => (*price, level.head.unwrap()),
                None => break,
            };

            if bid_price < ask_price {
                break;
            }

            let quantity = cmp::min(
                self.orders[bid_idx].order.remaining(),
                self.orders[ask_idx].order.remaining(),
            );

            self.orders[bid_idx]
                .order
                .fill(quantity)
                .expect("fill quantity is bounded by both remaining quantities");
            self.orders[ask_idx]
                .order
                .fill(quantity)
                .expect("fill quantity is bounded by both remaining quantities");

            let bid = &self.orders[bid_idx].order;
            let ask = &self.orders[ask_idx].order;
            trades.push(Trade {
                bid: Fill {
                    order_id: bid.id,
                    price: bid.price,
                    quantity,
                },
                ask: Fill {
                    order_id: ask.id,
                    price: ask.price,
                    quantity,
                },
            });
            let bid_filled = bid.is_filled();
            let ask_filled = ask.is_filled();

            self.on_matched(bid_price, quantity, bid_filled);
            self.on_matched(ask_price, quantity, ask_filled);

            if bid_filled {
                self.unlink(bid_idx);
            }
            if ask_filled {
                self.unlink(ask_idx);
            }
        }

        // A fill-and-kill that partially filled must not rest.
        if let Some((_, level)) = self.bids.last_key_value() {
            let idx = level.head.unwrap();
            if self.orders[idx].order.order_type == OrderType::FillAndKill {
                let id = self.orders[idx].order.id;
                self.cancel(id);
            }
        }
        if let Some((_, level)) = self.asks.first_key_value() {
            let idx = level.head.unwrap();
            if self.orders[idx].order.order_type == OrderType::FillAndKill {
                let id = self.orders[idx].order.id;
                self.cancel(id);
            }
        }

        trades
    }
}
