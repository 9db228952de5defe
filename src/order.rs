//! Order representation and the value types shared across the book.

use thiserror::Error;

/// Direction of an order.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

/// Time-in-force and execution policy of an order.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OrderType {
    /// Rests until filled or explicitly cancelled.
    GoodTillCancel,
    /// Rests until the daily cutoff, then swept by the pruner.
    GoodForDay,
    /// Fills whatever crosses immediately, the rest is cancelled.
    FillAndKill,
    /// Fills completely and immediately, or is rejected.
    FillOrKill,
    /// Executes against whatever the opposite side offers right now.
    Market,
}

pub type Id = u64;
/// Limit price in minimum-tick units.
pub type Price = i32;
pub type Quantity = u32;

/// Order-level errors.
#[derive(Error, Debug)]
pub enum Error {
    /// A fill exceeded the order's remaining quantity. Indicates a matching
    /// engine bug; callers should treat this as fatal.
    #[error("order #{id} cannot be filled for more than its remaining quantity (requested {requested}, remaining {remaining})")]
    Overfill {
        id: Id,
        requested: Quantity,
        remaining: Quantity,
    },
}

/// A single order tracked by the book.
///
/// Identity (id, side, type, price, initial quantity) is fixed at creation;
/// only the executed quantity changes as the order fills. A `Market` order
/// carries a placeholder price until [`Order::to_limit`] reprices it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub id: Id,
    pub order_type: OrderType,
    pub side: Side,
    pub price: Price,
    /// Quantity at creation time.
    pub quantity: Quantity,
    /// Cumulative executed quantity.
    pub executed: Quantity,
}

impl Order {
    pub fn new(order_type: OrderType, id: Id, side: Side, price: Price, quantity: Quantity) -> Self {
        Order {
            id,
            order_type,
            side,
            price,
            quantity,
            executed: 0,
        }
    }

    /// Create a price-less market order. The price field is a placeholder
    /// until the book reprices the order at the worst opposite price.
    pub fn market(id: Id, side: Side, quantity: Quantity) -> Self {
        Order::new(OrderType::Market, id, side, 0, quantity)
    }

    pub fn remaining(&self) -> Quantity {
        self.quantity - self.executed
    }

    pub fn filled(&self) -> Quantity {
        self.executed
    }

    pub fn is_filled(&self) -> bool {
        self.remaining() == 0
    }

    /// Execute `quantity` against this order.
    pub fn fill(&mut self, quantity: Quantity) -> Result<(), Error> {
        if quantity > self.remaining() {
            return Err(Error::Overfill {
                id: self.id,
                requested: quantity,
                remaining: self.remaining(),
            });
        }

        self.executed += quantity;
        Ok(())
    }

    /// Reprice a market order as a marketable good-till-cancel limit.
    /// Only legal before the order is enqueued.
    pub fn to_limit(&mut self, price: Price) {
        assert!(
            matches!(self.order_type, OrderType::Market),
            "only market orders can be repriced"
        );
        self.price = price;
        self.order_type = OrderType::GoodTillCancel;
    }
}

/// Cancel-and-replace descriptor for amending a resting order.
///
/// Carries everything except the order type, which is taken from the live
/// order at modify time.
#[derive(Debug, Copy, Clone)]
pub struct OrderModify {
    pub id: Id,
    pub side: Side,
    pub price: Price,
    pub quantity: Quantity,
}

impl OrderModify {
    pub fn new(id: Id, side: Side, price: Price, quantity: Quantity) -> Self {
        OrderModify {
            id,
            side,
            price,
            quantity,
        }
    }

    /// Build the replacement order, reusing the id and the existing order's type.
    pub fn into_order(self, order_type: OrderType) -> Order {
        Order::new(order_type, self.id, self.side, self.price, self.quantity)
    }
}

pub mod book;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_reduces_remaining_and_tracks_executed() {
        let mut order = Order::new(OrderType::GoodTillCancel, 1, Side::Buy, 100, 10);
        assert_eq!(order.remaining(), 10);
        assert!(!order.is_filled());

        order.fill(4).unwrap();
        assert_eq!(order.remaining(), 6, "remaining after partial fill");
        assert_eq!(order.filled(), 4, "executed after partial fill");

        order.fill(6).unwrap();
        assert!(order.is_filled(), "order should be filled after full fill");
    }

    #[test]
    fn fill_beyond_remaining_is_an_overfill() {
        let mut order = Order::new(OrderType::GoodTillCancel, 7, Side::Sell, 100, 5);
        order.fill(3).unwrap();

        let err = order.fill(3).unwrap_err();
        match err {
            Error::Overfill {
                id,
                requested,
                remaining,
            } => {
                assert_eq!(id, 7);
                assert_eq!(requested, 3);
                assert_eq!(remaining, 2);
            }
        }
        assert_eq!(order.remaining(), 2, "failed fill must not change the order");
    }

    #[test]
    fn market_order_reprices_to_limit() {
        let mut order = Order::market(3, Side::Sell, 8);
        assert_eq!(order.order_type, OrderType::Market);

        order.to_limit(105);
        assert_eq!(order.order_type, OrderType::GoodTillCancel);
        assert_eq!(order.price, 105);
        assert_eq!(order.remaining(), 8, "repricing must not touch quantities");
    }

    #[test]
    fn modify_builds_replacement_with_existing_type() {
        let modify = OrderModify::new(9, Side::Sell, 120, 3);
        let order = modify.into_order(OrderType::GoodForDay);

        assert_eq!(order.id, 9);
        assert_eq!(order.side, Side::Sell);
        assert_eq!(order.price, 120);
        assert_eq!(order.quantity, 3);
        assert_eq!(order.order_type, OrderType::GoodForDay);
        assert_eq!(order.executed, 0, "replacement starts unexecuted");
    }
}
