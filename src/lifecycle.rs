//! Role-gated order status transitions
use crate::error::MarketError;
use crate::flows::StatusFlows;
use crate::order::Order;
use crate::types::{Actor, OrderStatus, Role};

/// Validates order status changes against the configured flow tables.
#[derive(Debug, Clone, Default)]
pub struct OrderLifecycle {
    flows: StatusFlows,
}

impl OrderLifecycle {
    pub fn new(flows: StatusFlows) -> Self {
        Self { flows }
    }

    pub fn flows(&self) -> &StatusFlows {
        &self.flows
    }

    /// Checks whether `actor` may move `order` to `target` from its current
    /// status. Performs no mutation.
    pub fn check_transition(
        &self,
        order: &Order,
        target: OrderStatus,
        actor: &Actor,
    ) -> Result<(), MarketError> {
        let is_farmer = actor.role == Role::Farmer && actor.id == order.farmer_id;
        let is_dealer = actor.role == Role::Dealer && actor.id == order.dealer_id;

        if !is_farmer && !is_dealer {
            return Err(MarketError::Forbidden(format!(
                "not a party to order {}",
                order.id
            )));
        }

        let current = order.status;
        if target == current {
            return Err(MarketError::InvalidTransition(format!(
                "order is already {current}"
            )));
        }

        let next = self.flows.next_status(order.delivery_mode, current);

        if is_farmer {
            self.check_farmer(current, next, target)
        } else {
            self.check_dealer(current, next, target)
        }
    }

    fn check_farmer(
        &self,
        current: OrderStatus,
        next: Option<OrderStatus>,
        target: OrderStatus,
    ) -> Result<(), MarketError> {
        if target == OrderStatus::Cancelled {
            if self.flows.farmer_can_cancel(current) {
                return Ok(());
            }
            return Err(MarketError::InvalidTransition(format!(
                "farmer cannot cancel an order that is {current}"
            )));
        }

        match next {
            Some(next) if next == target => Ok(()),
            Some(next) => Err(MarketError::InvalidTransition(format!(
                "cannot move from {current} to {target}, next status is {next}"
            ))),
            None => Err(MarketError::InvalidTransition(format!(
                "no further status after {current}"
            ))),
        }
    }

    fn check_dealer(
        &self,
        current: OrderStatus,
        next: Option<OrderStatus>,
        target: OrderStatus,
    ) -> Result<(), MarketError> {
        match target {
            OrderStatus::Cancelled if self.flows.dealer_can_cancel(current) => Ok(()),
            OrderStatus::Cancelled => Err(MarketError::InvalidTransition(format!(
                "dealer cannot cancel an order that is {current}"
            ))),
            OrderStatus::Delivered if next == Some(OrderStatus::Delivered) => Ok(()),
            OrderStatus::Delivered => Err(MarketError::InvalidTransition(format!(
                "delivery can only be confirmed as the final step, order is {current}"
            ))),
            other => Err(MarketError::Forbidden(format!(
                "dealer cannot set status {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::tests::order_in;
    use crate::types::DeliveryMode;

    use OrderStatus::*;

    fn farmer() -> Actor {
        Actor::new("farmer_a", Role::Farmer)
    }

    fn dealer() -> Actor {
        Actor::new("dealer_a", Role::Dealer)
    }

    #[test]
    fn farmer_advances_one_step() {
        let lifecycle = OrderLifecycle::default();
        let order = order_in(DeliveryMode::FarmerDelivery, Placed);

        assert!(lifecycle.check_transition(&order, Packed, &farmer()).is_ok());
        assert!(matches!(
            lifecycle.check_transition(&order, Shipped, &farmer()),
            Err(MarketError::InvalidTransition(_))
        ));
    }

    #[test]
    fn farmer_cannot_take_pickup_statuses_on_door_delivery() {
        let lifecycle = OrderLifecycle::default();
        let order = order_in(DeliveryMode::FarmerDelivery, Packed);

        assert!(lifecycle.check_transition(&order, OutForPickup, &farmer()).is_err());
        assert!(lifecycle.check_transition(&order, ReadyForDelivery, &farmer()).is_ok());
    }

    #[test]
    fn no_op_is_rejected_before_role_rules() {
        let lifecycle = OrderLifecycle::default();
        let order = order_in(DeliveryMode::FarmerDelivery, Packed);

        assert!(matches!(
            lifecycle.check_transition(&order, Packed, &dealer()),
            Err(MarketError::InvalidTransition(_))
        ));
    }

    #[test]
    fn farmer_cancellation_window() {
        let lifecycle = OrderLifecycle::default();

        let packed = order_in(DeliveryMode::DealerPickup, Packed);
        assert!(lifecycle.check_transition(&packed, Cancelled, &farmer()).is_ok());

        let picked = order_in(DeliveryMode::DealerPickup, OutForPickup);
        assert!(matches!(
            lifecycle.check_transition(&picked, Cancelled, &farmer()),
            Err(MarketError::InvalidTransition(_))
        ));
    }

    #[test]
    fn dealer_rules() {
        let lifecycle = OrderLifecycle::default();

        let placed = order_in(DeliveryMode::MeetPoint, Placed);
        assert!(lifecycle.check_transition(&placed, Cancelled, &dealer()).is_ok());
        assert!(matches!(
            lifecycle.check_transition(&placed, Packed, &dealer()),
            Err(MarketError::Forbidden(_))
        ));
        assert!(matches!(
            lifecycle.check_transition(&placed, Delivered, &dealer()),
            Err(MarketError::InvalidTransition(_))
        ));

        let packed = order_in(DeliveryMode::MeetPoint, Packed);
        assert!(matches!(
            lifecycle.check_transition(&packed, Cancelled, &dealer()),
            Err(MarketError::InvalidTransition(_))
        ));

        let ready = order_in(DeliveryMode::MeetPoint, ReadyForDelivery);
        assert!(lifecycle.check_transition(&ready, Delivered, &dealer()).is_ok());
    }

    #[test]
    fn terminal_states_have_no_exit() {
        let lifecycle = OrderLifecycle::default();

        for terminal in [Delivered, Cancelled] {
            let order = order_in(DeliveryMode::ThirdParty, terminal);
            for target in OrderStatus::ALL {
                assert!(lifecycle.check_transition(&order, target, &farmer()).is_err());
                assert!(lifecycle.check_transition(&order, target, &dealer()).is_err());
            }
        }
    }

    #[test]
    fn outsiders_are_forbidden() {
        let lifecycle = OrderLifecycle::default();
        let order = order_in(DeliveryMode::FarmerDelivery, Placed);

        let stranger = Actor::new("farmer_b", Role::Farmer);
        assert!(matches!(
            lifecycle.check_transition(&order, Packed, &stranger),
            Err(MarketError::Forbidden(_))
        ));

        // right id, wrong role
        let impostor = Actor::new("farmer_a", Role::Dealer);
        assert!(matches!(
            lifecycle.check_transition(&order, Cancelled, &impostor),
            Err(MarketError::Forbidden(_))
        ));

        let admin = Actor::new("farmer_a", Role::Admin);
        assert!(lifecycle.check_transition(&order, Packed, &admin).is_err());
    }

    #[test]
    fn injected_flows_replace_the_defaults() {
        let flows = StatusFlows::empty()
            .set_flow(DeliveryMode::FarmerDelivery, vec![Placed, Shipped, Delivered])
            .set_farmer_cancellable(vec![Placed]);
        let lifecycle = OrderLifecycle::new(flows);
        let order = order_in(DeliveryMode::FarmerDelivery, Placed);

        assert!(lifecycle.check_transition(&order, Shipped, &farmer()).is_ok());
        assert!(lifecycle.check_transition(&order, Packed, &farmer()).is_err());
        // dealers have no cancellation rights in this table
        assert!(lifecycle.check_transition(&order, Cancelled, &dealer()).is_err());
    }
}
