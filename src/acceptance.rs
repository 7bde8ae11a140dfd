//! Accepting a dealer's request outright, without negotiation
//!
//! Acceptance is two writes that cannot share a transaction: the request is
//! claimed (`open -> accepted`) by compare-and-swap, then the order is placed.
//! If placing the order fails, the claim is undone unless some other path has
//! already produced a live order for the request.
use tracing::{error, info, warn};

use crate::error::MarketError;
use crate::order::{Order, OrderTerms, Placement};
use crate::request::Request;
use crate::service::MarketService;
use crate::types::{Actor, DeliveryMode, RequestStatus, Role};

impl MarketService {
    /// Turns an open request into a placed order for the accepting farmer.
    ///
    /// `agreed_price` defaults to the request's `max_price`.
    pub fn accept_request(
        &self,
        request_id: &str,
        agreed_price: Option<f64>,
        actor: &Actor,
    ) -> Result<Order, MarketError> {
        if actor.role != Role::Farmer {
            return Err(MarketError::Forbidden(
                "only farmers can accept requests".into(),
            ));
        }
        if let Some(price) = agreed_price
            && (!price.is_finite() || price < 0.0)
        {
            return Err(MarketError::InvalidInput(
                "agreedPrice must be a valid non-negative number".into(),
            ));
        }

        let request = self.claim_request(request_id)?;

        match self.order_for_claim(&request, agreed_price, actor) {
            Ok(order) => {
                info!(
                    request_id = %request.id,
                    order_id = %order.id,
                    farmer_id = %actor.id,
                    "request accepted"
                );
                Ok(order)
            }
            Err(err) => Err(self.compensate_claim(&request.id, err)),
        }
    }

    /// Moves the request from `open` to `accepted`, or fails with `Conflict`
    /// if it is no longer open.
    fn claim_request(&self, request_id: &str) -> Result<Request, MarketError> {
        self.store.update::<Request, _>(request_id, |request| {
            if request.status != RequestStatus::Open {
                return Err(MarketError::Conflict(format!(
                    "request {request_id} is no longer open"
                )));
            }
            request.status = RequestStatus::Accepted;
            Ok(())
        })
    }

    fn order_for_claim(
        &self,
        request: &Request,
        agreed_price: Option<f64>,
        actor: &Actor,
    ) -> Result<Order, MarketError> {
        let farmer_name = self.display_name(&actor.id)?;

        let terms = OrderTerms {
            quantity: request.quantity as f64,
            agreed_price: agreed_price.unwrap_or(request.max_price),
            delivery_date: request.required_date,
            delivery_mode: DeliveryMode::FarmerDelivery,
            delivery_cost: 0.0,
            meeting_place: request.location.clone(),
            notes: String::new(),
            terms_hash: None,
        };
        let order = Order::place(request, &actor.id, &farmer_name, terms, Role::Farmer)?;

        match self.place_order(order)? {
            Placement::Placed(order) => Ok(order),
            Placement::Existing(existing) => Err(MarketError::Conflict(format!(
                "request {} already has order {}",
                request.id, existing.id
            ))),
        }
    }

    /// Reopens a claimed request after a failed order creation, then hands
    /// back the original error.
    ///
    /// The request stays accepted if any live order holds it. A chat deal
    /// may land while this runs, so the order index is consulted inside the
    /// atomic update and again after the revert.
    fn compensate_claim(&self, request_id: &str, cause: MarketError) -> MarketError {
        warn!(request_id, error = %cause, "order creation failed after claim, compensating");

        let mut held_by = None;
        let reverted = self.store.update::<Request, _>(request_id, |request| {
            held_by = self.active_order_for_request(request_id)?.map(|order| order.id);
            if held_by.is_none() && request.status == RequestStatus::Accepted {
                request.status = RequestStatus::Open;
            }
            Ok(())
        });
        if let Err(revert) = reverted {
            error!(request_id, error = %revert, "failed to reopen request, leaving it accepted");
            return cause;
        }
        if let Some(order_id) = held_by {
            info!(request_id, order_id = %order_id, "request already has a live order, keeping claim");
            return cause;
        }

        // an order placed after the revert read the slot keeps its request
        match self.active_order_for_request(request_id) {
            Ok(None) => {}
            Ok(Some(order)) => {
                info!(request_id, order_id = %order.id, "order landed during compensation, restoring claim");
                let restored = self.store.update::<Request, _>(request_id, |request| {
                    request.status = RequestStatus::Accepted;
                    Ok(())
                });
                if let Err(restore) = restored {
                    error!(request_id, error = %restore, "failed to restore request claim");
                }
            }
            Err(lookup) => {
                error!(request_id, error = %lookup, "could not re-check for a live order");
            }
        }

        cause
    }
}
