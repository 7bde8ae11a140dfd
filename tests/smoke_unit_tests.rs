//! Smoke Screen Unit tests for marketplace components
//!
//! These tests span the codebase, checking behaviour in isolation from the
//! integration scenarios. They are intended as a smoke screen and mostly
//! cover the happy path.

use std::collections::HashMap;

use agri_market::{
    chat::DealProposal,
    error::{ErrorKind, MarketError},
    flows::StatusFlows,
    msp::MspLookup,
    request::RequestDraft,
    types::{DeliveryDate, DeliveryMode, OrderStatus, RequestStatus, Role, TimeStamp},
    utils::{new_uuid_to_bech32, normalize_product},
};
use chrono::{Datelike, NaiveDate};

// UTILS MODULE TESTS
mod utils_tests {
    use super::*;

    /// Each record kind gets its own human-readable prefix
    #[test]
    fn ids_carry_record_prefix() {
        for hrp in ["order_", "request_", "chat_", "user_"] {
            let id = new_uuid_to_bech32(hrp).unwrap();
            assert!(id.starts_with(&format!("{hrp}1")));
        }
    }

    #[test]
    fn generates_unique_ids() {
        let id1 = new_uuid_to_bech32("order_").unwrap();
        let id2 = new_uuid_to_bech32("order_").unwrap();
        assert_ne!(id1, id2);
    }

    #[test]
    fn product_names_are_catalog_keys() {
        assert_eq!(normalize_product(" Basmati Rice "), "basmati rice");
    }
}

// TYPES MODULE TESTS
mod types_tests {
    use super::*;

    #[test]
    fn statuses_parse_from_wire_names() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!(matches!(
            "lost".parse::<OrderStatus>(),
            Err(MarketError::InvalidStatus(_))
        ));
    }

    #[test]
    fn roles_and_modes_parse() {
        assert_eq!("dealer".parse::<Role>().unwrap(), Role::Dealer);
        assert_eq!(
            "meet_point".parse::<DeliveryMode>().unwrap(),
            DeliveryMode::MeetPoint
        );
        assert!("courier".parse::<DeliveryMode>().is_err());
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&OrderStatus::ReadyForDelivery).unwrap();
        assert_eq!(json, "\"ready_for_delivery\"");
        let json = serde_json::to_string(&RequestStatus::Open).unwrap();
        assert_eq!(json, "\"open\"");
    }

    #[test]
    fn delivery_date_keeps_calendar_day() {
        let date = DeliveryDate::parse("2025-03-01T23:59:59.000Z").unwrap();
        assert_eq!(date.to_naive_date(), NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert_eq!(date.to_string(), "2025-03-01");
        assert!(DeliveryDate::parse("01/03/2025").is_err());
    }

    #[test]
    fn timestamps_are_current() {
        let now = TimeStamp::new();
        assert!(now.to_datetime_utc().year() >= 2025);
    }
}

// FLOWS MODULE TESTS
mod flows_tests {
    use super::*;

    #[test]
    fn pickup_flow_skips_shipping() {
        let flows = StatusFlows::default();
        assert_eq!(
            flows.next_status(DeliveryMode::DealerPickup, OrderStatus::Packed),
            Some(OrderStatus::OutForPickup)
        );
        assert_eq!(
            flows.next_status(DeliveryMode::MeetPoint, OrderStatus::ReadyForDelivery),
            Some(OrderStatus::Delivered)
        );
        assert_eq!(
            flows.next_status(DeliveryMode::ThirdParty, OrderStatus::Cancelled),
            None
        );
    }
}

// REQUEST AND DEAL INPUT TESTS
mod input_tests {
    use super::*;

    #[test]
    fn request_draft_from_json() {
        let draft: RequestDraft = serde_json::from_str(
            r#"{"product":"Wheat","quantity":1000,"minPrice":2600,"maxPrice":2700,"location":"Indore","requiredDate":"2025-04-10"}"#,
        )
        .unwrap();
        let msp: HashMap<String, f64> = HashMap::from([("wheat".into(), 2585.0)]);

        let request = draft.validate_and_finalise("dealer_a", "Dealer A", &msp).unwrap();
        assert_eq!(request.product, "Wheat");
        assert_eq!(request.status, RequestStatus::Open);
        assert_eq!(msp.msp_price(&request.product).unwrap(), Some(2585.0));
    }

    #[test]
    fn deal_proposal_from_json() {
        let proposal: DealProposal = serde_json::from_str(
            r#"{"finalQuantity":500,"pricePerKg":20,"deliveryDate":"2025-03-01","deliveryMode":"farmer_delivery","meetingPlace":"Market Yard"}"#,
        )
        .unwrap();
        let (terms, notes) = proposal.validate().unwrap();

        assert_eq!(terms.final_quantity, 500.0);
        assert_eq!(terms.delivery_cost, 0.0);
        assert!(notes.is_empty());
        assert_eq!(terms.digest().unwrap().len(), 64);
    }
}

// ERROR MODULE TESTS
mod error_tests {
    use super::*;

    #[test]
    fn kinds_collapse_storage_details() {
        assert_eq!(
            MarketError::Encoding("bad cbor".into()).kind(),
            ErrorKind::Internal
        );
        assert_eq!(
            MarketError::InvalidStatus("x".into()).kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            MarketError::not_found("Order", "order_x").to_string(),
            "Order not found: order_x"
        );
    }
}
