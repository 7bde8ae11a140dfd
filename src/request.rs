//! Dealer purchase requests
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::MarketError;
use crate::msp::MspLookup;
use crate::service::MarketService;
use crate::store::Record;
use crate::types::{Actor, DeliveryDate, RequestStatus, Role, TimeStamp};
use crate::utils::new_uuid_to_bech32;

const DEFAULT_PRODUCT_IMAGE: &str = "🌾";

#[derive(minicbor::Encode, minicbor::Decode, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub dealer_id: String,
    #[n(2)]
    pub product: String,
    #[n(3)]
    pub product_image: String,
    #[n(4)]
    pub quantity: u64,
    #[n(5)]
    pub min_price: f64,
    #[n(6)]
    pub max_price: f64,
    #[n(7)]
    pub location: String,
    #[n(8)]
    pub description: String,
    #[n(9)]
    pub required_date: Option<DeliveryDate>,
    #[n(10)]
    pub mobile: String,
    #[n(11)]
    pub dealer_name: String, // snapshot at creation
    #[n(12)]
    pub status: RequestStatus,
    #[n(13)]
    pub created_at: TimeStamp<Utc>,
}

// Used for constructing new requests, either from JSON or with the setters
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RequestDraft {
    pub product: String,
    pub product_image: Option<String>,
    pub quantity: u64,
    pub min_price: f64,
    pub max_price: f64,
    pub location: String,
    pub description: String,
    pub required_date: Option<String>,
    pub mobile: String,
}

impl Record for Request {
    const TREE: &'static str = "requests";
    const ENTITY: &'static str = "Request";

    fn key(&self) -> &str {
        &self.id
    }
}

impl RequestDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_product(mut self, product: &str) -> Self {
        self.product = product.to_string();
        self
    }
    pub fn set_product_image(mut self, image: &str) -> Self {
        self.product_image = Some(image.to_string());
        self
    }
    pub fn set_quantity(mut self, quantity: u64) -> Self {
        self.quantity = quantity;
        self
    }
    pub fn set_price_range(mut self, min_price: f64, max_price: f64) -> Self {
        self.min_price = min_price;
        self.max_price = max_price;
        self
    }
    pub fn set_location(mut self, location: &str) -> Self {
        self.location = location.to_string();
        self
    }
    pub fn set_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }
    pub fn set_required_date(mut self, date: &str) -> Self {
        self.required_date = Some(date.to_string());
        self
    }
    pub fn set_mobile(mut self, mobile: &str) -> Self {
        self.mobile = mobile.to_string();
        self
    }

    /// Checks fields and the MSP price floor, then builds an open request.
    ///
    /// The floor is only checked here: later MSP changes never invalidate an
    /// existing request.
    pub fn validate_and_finalise<M: MspLookup + ?Sized>(
        self,
        dealer_id: &str,
        dealer_name: &str,
        msp: &M,
    ) -> Result<Request, MarketError> {
        let product = self.product.trim();
        if product.is_empty() {
            return Err(MarketError::InvalidInput("product is required".into()));
        }
        if self.location.trim().is_empty() {
            return Err(MarketError::InvalidInput("location is required".into()));
        }
        if self.quantity == 0 {
            return Err(MarketError::InvalidInput("quantity must be positive".into()));
        }
        for (field, price) in [("minPrice", self.min_price), ("maxPrice", self.max_price)] {
            if !price.is_finite() || price < 0.0 {
                return Err(MarketError::InvalidInput(format!(
                    "{field} must be a finite non-negative number"
                )));
            }
        }
        if self.min_price > self.max_price {
            return Err(MarketError::InvalidInput(
                "minPrice cannot exceed maxPrice".into(),
            ));
        }
        if let Some(floor) = msp.msp_price(product)?
            && self.min_price <= floor
        {
            return Err(MarketError::InvalidInput(format!(
                "minPrice must be above the MSP of {floor} for {product}"
            )));
        }

        let required_date = match self.required_date.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(DeliveryDate::parse(raw)?),
            _ => None,
        };

        let product_image = self
            .product_image
            .filter(|image| !image.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PRODUCT_IMAGE.to_string());

        Ok(Request {
            id: new_uuid_to_bech32("request_")?,
            dealer_id: dealer_id.to_string(),
            product: product.to_string(),
            product_image,
            quantity: self.quantity,
            min_price: self.min_price,
            max_price: self.max_price,
            location: self.location.trim().to_string(),
            description: self.description,
            required_date,
            mobile: self.mobile,
            dealer_name: dealer_name.to_string(),
            status: RequestStatus::Open,
            created_at: TimeStamp::new(),
        })
    }
}

impl MarketService {
    /// Posts a new buy request on behalf of a dealer.
    pub fn create_request(&self, draft: RequestDraft, actor: &Actor) -> Result<Request, MarketError> {
        if actor.role != Role::Dealer {
            return Err(MarketError::Forbidden(
                "only dealers can post requests".into(),
            ));
        }

        let dealer_name = self.display_name(&actor.id)?;
        let request = draft.validate_and_finalise(&actor.id, &dealer_name, self.msp.as_ref())?;
        self.store.save(&request)?;

        info!(
            request_id = %request.id,
            dealer_id = %request.dealer_id,
            product = %request.product,
            "request created"
        );
        Ok(request)
    }

    pub fn get_request(&self, request_id: &str) -> Result<Request, MarketError> {
        self.store.fetch(request_id)
    }

    /// Requests still open for acceptance, newest first.
    pub fn open_requests(&self) -> Result<Vec<Request>, MarketError> {
        let mut requests = self
            .store
            .scan::<Request>(|r| r.status == RequestStatus::Open)?;
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }
}
