//! Order status flow tables
//!
//! Each delivery mode has a single linear flow. A status's only legal
//! successor is the next element of its mode's flow; cancellation is handled
//! separately through the role-specific cancellable sets.
use std::collections::HashMap;

use crate::types::{DeliveryMode, OrderStatus};

use OrderStatus::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusFlows {
    flows: HashMap<DeliveryMode, Vec<OrderStatus>>,
    farmer_cancellable: Vec<OrderStatus>,
    dealer_cancellable: Vec<OrderStatus>,
}

impl Default for StatusFlows {
    fn default() -> Self {
        let door_delivery = vec![
            Placed,
            Packed,
            ReadyForDelivery,
            Shipped,
            OutForDelivery,
            Delivered,
        ];

        Self::empty()
            .set_flow(DeliveryMode::FarmerDelivery, door_delivery.clone())
            .set_flow(
                DeliveryMode::DealerPickup,
                vec![Placed, Packed, OutForPickup, Picked, Delivered],
            )
            .set_flow(DeliveryMode::ThirdParty, door_delivery)
            .set_flow(
                DeliveryMode::MeetPoint,
                vec![Placed, Packed, ReadyForDelivery, Delivered],
            )
            .set_farmer_cancellable(vec![Placed, Packed])
            .set_dealer_cancellable(vec![Placed])
    }
}

impl StatusFlows {
    /// A table with no flows and no cancellation rights. Build it up with the
    /// `set_*` methods.
    pub fn empty() -> Self {
        Self {
            flows: HashMap::new(),
            farmer_cancellable: vec![],
            dealer_cancellable: vec![],
        }
    }
    pub fn set_flow(mut self, mode: DeliveryMode, flow: Vec<OrderStatus>) -> Self {
        self.flows.insert(mode, flow);
        self
    }
    pub fn set_farmer_cancellable(mut self, statuses: Vec<OrderStatus>) -> Self {
        self.farmer_cancellable = statuses;
        self
    }
    pub fn set_dealer_cancellable(mut self, statuses: Vec<OrderStatus>) -> Self {
        self.dealer_cancellable = statuses;
        self
    }

    /// The flow for `mode`, falling back to the farmer delivery flow when the
    /// table has no entry for it.
    pub fn flow_for(&self, mode: DeliveryMode) -> &[OrderStatus] {
        self.flows
            .get(&mode)
            .or_else(|| self.flows.get(&DeliveryMode::FarmerDelivery))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn position(&self, mode: DeliveryMode, status: OrderStatus) -> Option<usize> {
        self.flow_for(mode).iter().position(|s| *s == status)
    }

    /// The single status that may follow `current`, or `None` when `current`
    /// is the end of the flow or not part of it at all.
    pub fn next_status(&self, mode: DeliveryMode, current: OrderStatus) -> Option<OrderStatus> {
        let flow = self.flow_for(mode);
        let idx = self.position(mode, current)?;
        flow.get(idx + 1).copied()
    }

    pub fn farmer_can_cancel(&self, current: OrderStatus) -> bool {
        self.farmer_cancellable.contains(&current)
    }

    pub fn dealer_can_cancel(&self, current: OrderStatus) -> bool {
        self.dealer_cancellable.contains(&current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_flows_end_in_delivered() {
        let flows = StatusFlows::default();
        for mode in DeliveryMode::ALL {
            let flow = flows.flow_for(mode);
            assert_eq!(flow.first(), Some(&Placed));
            assert_eq!(flow.last(), Some(&Delivered));
            assert!(!flow.contains(&Cancelled));
        }
    }

    #[test]
    fn next_status_walks_the_flow() {
        let flows = StatusFlows::default();

        assert_eq!(
            flows.next_status(DeliveryMode::DealerPickup, Packed),
            Some(OutForPickup)
        );
        assert_eq!(
            flows.next_status(DeliveryMode::MeetPoint, ReadyForDelivery),
            Some(Delivered)
        );
        assert_eq!(flows.next_status(DeliveryMode::MeetPoint, Delivered), None);
        assert_eq!(flows.next_status(DeliveryMode::FarmerDelivery, Cancelled), None);
        // pickup statuses are not part of the door delivery flow
        assert_eq!(flows.next_status(DeliveryMode::FarmerDelivery, Picked), None);
    }

    #[test]
    fn missing_mode_falls_back_to_farmer_delivery() {
        let flows = StatusFlows::empty().set_flow(
            DeliveryMode::FarmerDelivery,
            vec![Placed, Delivered],
        );

        assert_eq!(flows.flow_for(DeliveryMode::ThirdParty), &[Placed, Delivered]);
        assert_eq!(
            flows.next_status(DeliveryMode::DealerPickup, Placed),
            Some(Delivered)
        );
    }

    #[test]
    fn cancellation_rights() {
        let flows = StatusFlows::default();

        assert!(flows.farmer_can_cancel(Placed));
        assert!(flows.farmer_can_cancel(Packed));
        assert!(!flows.farmer_can_cancel(ReadyForDelivery));
        assert!(flows.dealer_can_cancel(Placed));
        assert!(!flows.dealer_can_cancel(Packed));
    }
}
