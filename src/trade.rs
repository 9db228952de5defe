//! Trade representation produced by the matching engine.
//!
//! A Trade pairs the bid and ask legs of one execution. Each leg records the
//! order involved, the price it executed at (the order's own limit price),
//! and the executed quantity.

use crate::order;

/// One leg of an execution.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Fill {
    /// The order this leg belongs to.
    pub order_id: order::Id,
    /// Execution price for this leg.
    pub price: order::Price,
    /// Executed quantity for this leg.
    pub quantity: order::Quantity,
}

/// A single execution between a bid and an ask.
///
/// Both legs always carry the same quantity; the prices may differ when the
/// aggressor crossed through the resting order's level.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Trade {
    pub bid: Fill,
    pub ask: Fill,
}
