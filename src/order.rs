//! Orders and their status operations
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::MarketError;
use crate::request::Request;
use crate::service::MarketService;
use crate::store::Record;
use crate::types::{Actor, DeliveryDate, DeliveryMode, OrderStatus, Role, TimeStamp};
use crate::utils::new_uuid_to_bech32;

/// Index tree mapping a request id to the order holding it, stored as
/// `{order_id}@{taken_at_nanos}`.
const ORDER_SLOTS: &str = "order_slots";

/// How long a slot may point at an order record that was never written
/// before another placement may take it over.
const SLOT_GRACE_SECS: i64 = 30;

#[derive(minicbor::Encode, minicbor::Decode, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub request_id: String,
    #[n(2)]
    pub dealer_id: String,
    #[n(3)]
    pub dealer_name: String,
    #[n(4)]
    pub farmer_id: String,
    #[n(5)]
    pub farmer_name: String,
    #[n(6)]
    pub product: String,
    #[n(7)]
    pub product_image: String,
    #[n(8)]
    pub quantity: f64,
    #[n(9)]
    pub agreed_price: f64,
    #[n(10)]
    pub delivery_date: Option<DeliveryDate>,
    #[n(11)]
    pub delivery_mode: DeliveryMode,
    #[n(12)]
    pub delivery_cost: f64,
    #[n(13)]
    pub meeting_place: String,
    #[n(14)]
    pub notes: String,
    #[n(15)]
    pub status: OrderStatus,
    #[n(16)]
    pub status_history: Vec<StatusHistoryEntry>,
    #[n(17)]
    pub terms_hash: Option<String>, // digest of the matched deal terms, if negotiated
    #[n(18)]
    pub created_at: TimeStamp<Utc>,
}

#[derive(minicbor::Encode, minicbor::Decode, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryEntry {
    #[n(0)]
    pub status: OrderStatus,
    #[n(1)]
    pub updated_by_role: Role,
    #[n(2)]
    pub updated_at: TimeStamp<Utc>,
}

/// Commercial terms an order is placed with.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderTerms {
    pub quantity: f64,
    pub agreed_price: f64,
    pub delivery_date: Option<DeliveryDate>,
    pub delivery_mode: DeliveryMode,
    pub delivery_cost: f64,
    pub meeting_place: String,
    pub notes: String,
    pub terms_hash: Option<String>,
}

/// Result of trying to place an order for a request.
#[derive(Debug)]
pub(crate) enum Placement {
    Placed(Order),
    /// The request already has a live order; nothing was written.
    Existing(Order),
}

/// A parsed `order_slots` entry.
#[derive(Debug, Clone, Copy, PartialEq)]
struct OrderSlot<'a> {
    order_id: &'a str,
    taken_at: Option<DateTime<Utc>>,
}

impl<'a> OrderSlot<'a> {
    fn parse(raw: &'a str) -> Self {
        match raw.split_once('@') {
            Some((order_id, nanos)) => Self {
                order_id,
                taken_at: nanos.parse::<i64>().ok().map(DateTime::from_timestamp_nanos),
            },
            None => Self {
                order_id: raw,
                taken_at: None,
            },
        }
    }

    fn encode(order_id: &str, taken_at: DateTime<Utc>) -> Result<String, MarketError> {
        let nanos = taken_at
            .timestamp_nanos_opt()
            .ok_or_else(|| MarketError::Internal("slot timestamp out of range".into()))?;
        Ok(format!("{order_id}@{nanos}"))
    }

    /// Whether a slot with no order record may still be filled by its
    /// placement. Slots without a readable timestamp never are.
    fn is_pending(&self, now: DateTime<Utc>) -> bool {
        self.taken_at
            .is_some_and(|taken_at| now - taken_at < TimeDelta::seconds(SLOT_GRACE_SECS))
    }
}

impl Record for Order {
    const TREE: &'static str = "orders";
    const ENTITY: &'static str = "Order";

    fn key(&self) -> &str {
        &self.id
    }
}

impl Order {
    /// Builds a new order in `placed` status for `request`, with the first
    /// history entry attributed to `placed_by`.
    pub fn place(
        request: &Request,
        farmer_id: &str,
        farmer_name: &str,
        terms: OrderTerms,
        placed_by: Role,
    ) -> Result<Self, MarketError> {
        if !terms.quantity.is_finite() || terms.quantity <= 0.0 {
            return Err(MarketError::InvalidInput(
                "order quantity must be positive".into(),
            ));
        }
        if !terms.agreed_price.is_finite() || terms.agreed_price < 0.0 {
            return Err(MarketError::InvalidInput(
                "agreed price must be a finite non-negative number".into(),
            ));
        }

        let now = TimeStamp::new();

        Ok(Self {
            id: new_uuid_to_bech32("order_")?,
            request_id: request.id.clone(),
            dealer_id: request.dealer_id.clone(),
            dealer_name: request.dealer_name.clone(),
            farmer_id: farmer_id.to_string(),
            farmer_name: farmer_name.to_string(),
            product: request.product.clone(),
            product_image: request.product_image.clone(),
            quantity: terms.quantity,
            agreed_price: terms.agreed_price,
            delivery_date: terms.delivery_date,
            delivery_mode: terms.delivery_mode,
            delivery_cost: terms.delivery_cost,
            meeting_place: terms.meeting_place,
            notes: terms.notes,
            status: OrderStatus::Placed,
            status_history: vec![StatusHistoryEntry {
                status: OrderStatus::Placed,
                updated_by_role: placed_by,
                updated_at: now.clone(),
            }],
            terms_hash: terms.terms_hash,
            created_at: now,
        })
    }

    /// Records a status change. Callers validate the transition first.
    pub fn apply_status(&mut self, status: OrderStatus, role: Role) {
        self.status = status;
        self.status_history.push(StatusHistoryEntry {
            status,
            updated_by_role: role,
            updated_at: TimeStamp::new(),
        });
    }

    pub fn is_party(&self, actor: &Actor) -> bool {
        match actor.role {
            Role::Farmer => self.farmer_id == actor.id,
            Role::Dealer => self.dealer_id == actor.id,
            Role::Admin => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status != OrderStatus::Cancelled
    }
}

impl MarketService {
    /// Moves an order to `new_status`, given by name.
    pub fn update_order_status(
        &self,
        order_id: &str,
        new_status: &str,
        actor: &Actor,
    ) -> Result<Order, MarketError> {
        let target: OrderStatus = new_status.parse()?;
        self.set_order_status(order_id, target, actor)
    }

    /// Moves an order to `target`. The transition is validated against the
    /// status stored at write time.
    pub fn set_order_status(
        &self,
        order_id: &str,
        target: OrderStatus,
        actor: &Actor,
    ) -> Result<Order, MarketError> {
        let lifecycle = &self.lifecycle;
        let mut previous = None;

        let order = self.store.update::<Order, _>(order_id, |order| {
            lifecycle.check_transition(order, target, actor)?;
            previous = Some(order.status);
            order.apply_status(target, actor.role);
            Ok(())
        })?;

        info!(
            order_id = %order.id,
            from = ?previous,
            to = %target,
            role = %actor.role,
            "order status updated"
        );

        Ok(order)
    }

    pub fn get_order(&self, order_id: &str, actor: &Actor) -> Result<Order, MarketError> {
        let order = self.store.fetch::<Order>(order_id)?;
        if !order.is_party(actor) {
            return Err(MarketError::Forbidden(format!(
                "not a party to order {order_id}"
            )));
        }
        Ok(order)
    }

    /// Orders the actor is a party to, newest first.
    pub fn my_orders(&self, actor: &Actor) -> Result<Vec<Order>, MarketError> {
        if actor.role == Role::Admin {
            return Err(MarketError::Forbidden(
                "only farmers and dealers have orders".into(),
            ));
        }

        let mut orders = self.store.scan::<Order>(|order| order.is_party(actor))?;
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    /// The live (non-cancelled) order holding `request_id`, if any.
    pub fn active_order_for_request(&self, request_id: &str) -> Result<Option<Order>, MarketError> {
        let Some(holder) = self.store.index_get(ORDER_SLOTS, request_id)? else {
            return Ok(None);
        };
        let slot = OrderSlot::parse(&holder);
        Ok(self
            .store
            .load::<Order>(slot.order_id)?
            .filter(Order::is_active))
    }

    /// Persists `order` unless its request is already held by a live order.
    ///
    /// The request's slot in the order index is taken by compare-and-swap
    /// before the order record is written, so at most one live order per
    /// request can ever be placed. A slot whose order was cancelled can be
    /// taken over, as can one whose order record was never written within
    /// the grace period.
    pub(crate) fn place_order(&self, order: Order) -> Result<Placement, MarketError> {
        let claim = OrderSlot::encode(&order.id, Utc::now())?;

        loop {
            let holder = self.store.index_get(ORDER_SLOTS, &order.request_id)?;

            if let Some(raw) = holder.as_deref() {
                let slot = OrderSlot::parse(raw);
                match self.store.load::<Order>(slot.order_id)? {
                    Some(existing) if existing.is_active() => {
                        return Ok(Placement::Existing(existing));
                    }
                    Some(_) => {}
                    None if slot.is_pending(Utc::now()) => {
                        return Err(MarketError::Conflict(format!(
                            "an order for request {} is being placed",
                            order.request_id
                        )));
                    }
                    None => {
                        warn!(
                            request_id = %order.request_id,
                            abandoned_order_id = slot.order_id,
                            "reclaiming abandoned order slot"
                        );
                    }
                }
            }

            let taken = self.store.index_swap(
                ORDER_SLOTS,
                &order.request_id,
                holder.as_deref(),
                Some(claim.as_str()),
            )?;
            if !taken {
                warn!(request_id = %order.request_id, "order slot changed concurrently, re-checking");
                continue;
            }

            if let Err(err) = self.store.save(&order) {
                // give the slot back so the request is not wedged
                if let Err(release) = self.store.index_swap(
                    ORDER_SLOTS,
                    &order.request_id,
                    Some(claim.as_str()),
                    holder.as_deref(),
                ) {
                    tracing::error!(
                        request_id = %order.request_id,
                        error = %release,
                        "failed to release order slot"
                    );
                }
                return Err(err);
            }

            info!(
                order_id = %order.id,
                request_id = %order.request_id,
                farmer_id = %order.farmer_id,
                dealer_id = %order.dealer_id,
                "order placed"
            );
            return Ok(Placement::Placed(order));
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// An order between `farmer_a` and `dealer_a` sitting in `status`.
    pub(crate) fn order_in(mode: DeliveryMode, status: OrderStatus) -> Order {
        Order {
            id: "order_test".into(),
            request_id: "request_test".into(),
            dealer_id: "dealer_a".into(),
            dealer_name: "Dealer A".into(),
            farmer_id: "farmer_a".into(),
            farmer_name: "Farmer A".into(),
            product: "wheat".into(),
            product_image: "🌾".into(),
            quantity: 100.0,
            agreed_price: 2600.0,
            delivery_date: None,
            delivery_mode: mode,
            delivery_cost: 0.0,
            meeting_place: "Market Yard".into(),
            notes: String::new(),
            status,
            status_history: vec![StatusHistoryEntry {
                status,
                updated_by_role: Role::Farmer,
                updated_at: TimeStamp::new(),
            }],
            terms_hash: None,
            created_at: TimeStamp::new(),
        }
    }

    #[test]
    fn apply_status_appends_history() {
        let mut order = order_in(DeliveryMode::FarmerDelivery, OrderStatus::Placed);
        order.apply_status(OrderStatus::Packed, Role::Farmer);

        assert_eq!(order.status, OrderStatus::Packed);
        assert_eq!(order.status_history.len(), 2);
        assert_eq!(order.status_history[1].status, OrderStatus::Packed);
        assert_eq!(order.status_history[1].updated_by_role, Role::Farmer);
    }

    #[test]
    fn order_encoding() {
        let original = order_in(DeliveryMode::MeetPoint, OrderStatus::ReadyForDelivery);

        let encoding = minicbor::to_vec(&original).unwrap();
        let decode: Order = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn slot_entries_round_trip() {
        let taken_at = DateTime::from_timestamp_nanos(1_700_000_000_000_000_000);
        let raw = OrderSlot::encode("order_1abc", taken_at).unwrap();
        let slot = OrderSlot::parse(&raw);

        assert_eq!(slot.order_id, "order_1abc");
        assert_eq!(slot.taken_at, Some(taken_at));
        assert!(slot.is_pending(taken_at + TimeDelta::seconds(1)));
        assert!(!slot.is_pending(taken_at + TimeDelta::seconds(SLOT_GRACE_SECS)));

        // entries without a timestamp can always be reclaimed
        let bare = OrderSlot::parse("order_1abc");
        assert_eq!(bare.taken_at, None);
        assert!(!bare.is_pending(taken_at));
    }

    #[test]
    fn parties_are_matched_by_role_and_id() {
        let order = order_in(DeliveryMode::FarmerDelivery, OrderStatus::Placed);

        assert!(order.is_party(&Actor::new("farmer_a", Role::Farmer)));
        assert!(order.is_party(&Actor::new("dealer_a", Role::Dealer)));
        assert!(!order.is_party(&Actor::new("dealer_a", Role::Farmer)));
        assert!(!order.is_party(&Actor::new("farmer_a", Role::Admin)));
    }
}
