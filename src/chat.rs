//! Chats between a farmer and a dealer, and deal negotiation inside them
//!
//! Each side submits deal terms independently. Once both sides have a live
//! submission and the normalised terms are equal, the chat is converted into
//! an order for the chat's request.
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::MarketError;
use crate::order::{Order, OrderTerms, Placement};
use crate::request::Request;
use crate::service::MarketService;
use crate::store::Record;
use crate::types::{Actor, DeliveryDate, DeliveryMode, NumberInput, RequestStatus, Role, TimeStamp};
use crate::utils::new_uuid_to_bech32;

/// Index tree mapping a chat's parties and subject to the chat id.
const CHAT_KEYS: &str = "chat_keys";

#[derive(minicbor::Encode, minicbor::Decode, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[n(0)]
    pub sender_id: String,
    #[n(1)]
    pub sender_role: Role,
    #[n(2)]
    pub text: String,
    #[n(3)]
    pub created_at: TimeStamp<Utc>,
}

/// The six fields both sides must agree on.
#[derive(minicbor::Encode, minicbor::Decode, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DealTerms {
    #[n(0)]
    pub final_quantity: f64,
    #[n(1)]
    pub price_per_kg: f64,
    #[n(2)]
    pub delivery_date: DeliveryDate,
    #[n(3)]
    pub delivery_mode: DeliveryMode,
    #[n(4)]
    pub delivery_cost: f64,
    #[n(5)]
    pub meeting_place: String,
}

#[derive(minicbor::Encode, minicbor::Decode, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DealSubmission {
    #[n(0)]
    pub submitted_by_role: Role,
    #[n(1)]
    pub submitted_by: String,
    #[n(2)]
    #[serde(flatten)]
    pub terms: DealTerms,
    #[n(3)]
    pub notes: String,
    #[n(4)]
    pub terms_hash: String,
    #[n(5)]
    pub submitted_at: TimeStamp<Utc>,
}

/// Deal terms as sent by a client, before validation. Numeric fields may
/// arrive as numbers or as numeric text.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DealProposal {
    pub final_quantity: NumberInput,
    pub price_per_kg: NumberInput,
    pub delivery_date: String,
    pub delivery_mode: String,
    pub delivery_cost: Option<NumberInput>,
    pub meeting_place: String,
    pub notes: Option<String>,
}

#[derive(minicbor::Encode, minicbor::Decode, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub request_id: Option<String>,
    #[n(2)]
    pub order_id: Option<String>,
    #[n(3)]
    pub farmer_id: String,
    #[n(4)]
    pub dealer_id: String,
    #[n(5)]
    pub messages: Vec<Message>,
    #[n(6)]
    pub deal_submissions: Vec<DealSubmission>,
    #[n(7)]
    pub last_message_at: TimeStamp<Utc>,
    #[n(8)]
    pub created_at: TimeStamp<Utc>,
}

/// Parameters for opening a chat. The actor's own side comes from its role.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct OpenChat {
    pub other_user_id: String,
    pub request_id: Option<String>,
    pub order_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DealOutcome {
    /// Only one side has a live submission.
    Waiting,
    /// Both sides submitted but the terms differ.
    Mismatch,
    Matched { order: Order, already_placed: bool },
}

impl Record for Chat {
    const TREE: &'static str = "chats";
    const ENTITY: &'static str = "Chat";

    fn key(&self) -> &str {
        &self.id
    }
}

impl DealTerms {
    /// Terms in the form they are compared and hashed in.
    pub fn normalized(&self) -> Self {
        Self {
            final_quantity: self.final_quantity + 0.0,
            price_per_kg: self.price_per_kg + 0.0, // folds -0.0 into 0.0
            delivery_date: self.delivery_date,
            delivery_mode: self.delivery_mode,
            delivery_cost: self.delivery_cost + 0.0,
            meeting_place: self.meeting_place.trim().to_lowercase(),
        }
    }

    pub fn matches(&self, other: &DealTerms) -> bool {
        self.normalized() == other.normalized()
    }

    /// sha256 of the normalised terms' CBOR encoding. Matching terms always
    /// share a digest.
    pub fn digest(&self) -> Result<String, MarketError> {
        let cbor = minicbor::to_vec(self.normalized())?;
        Ok(sha256::digest(&cbor))
    }
}

impl DealProposal {
    /// Checks required fields and fills defaults.
    pub fn validate(self) -> Result<(DealTerms, String), MarketError> {
        let final_quantity = self.final_quantity.value("finalQuantity")?;
        if final_quantity <= 0.0 {
            return Err(MarketError::InvalidInput(
                "finalQuantity must be positive".into(),
            ));
        }
        let price_per_kg = self.price_per_kg.value("pricePerKg")?;
        if price_per_kg <= 0.0 {
            return Err(MarketError::InvalidInput(
                "pricePerKg must be a positive number".into(),
            ));
        }
        if self.delivery_date.trim().is_empty() {
            return Err(MarketError::InvalidInput("deliveryDate is required".into()));
        }
        if self.delivery_mode.trim().is_empty() {
            return Err(MarketError::InvalidInput("deliveryMode is required".into()));
        }
        let meeting_place = self.meeting_place.trim();
        if meeting_place.is_empty() {
            return Err(MarketError::InvalidInput("meetingPlace is required".into()));
        }

        let delivery_cost = match &self.delivery_cost {
            Some(cost) => cost.value("deliveryCost")?,
            None => 0.0,
        };
        if delivery_cost < 0.0 {
            return Err(MarketError::InvalidInput(
                "deliveryCost must be a valid non-negative number".into(),
            ));
        }

        let terms = DealTerms {
            final_quantity,
            price_per_kg,
            delivery_date: DeliveryDate::parse(&self.delivery_date)?,
            delivery_mode: self.delivery_mode.trim().parse()?,
            delivery_cost,
            meeting_place: meeting_place.to_string(),
        };
        Ok((terms, self.notes.unwrap_or_default()))
    }
}

impl Chat {
    fn new(
        farmer_id: &str,
        dealer_id: &str,
        request_id: Option<&str>,
        order_id: Option<&str>,
    ) -> Result<Self, MarketError> {
        let now = TimeStamp::new();
        Ok(Self {
            id: new_uuid_to_bech32("chat_")?,
            request_id: request_id.map(str::to_string),
            order_id: order_id.map(str::to_string),
            farmer_id: farmer_id.to_string(),
            dealer_id: dealer_id.to_string(),
            messages: Vec::new(),
            deal_submissions: Vec::new(),
            last_message_at: now.clone(),
            created_at: now,
        })
    }

    pub fn is_participant(&self, user_id: &str) -> bool {
        self.farmer_id == user_id || self.dealer_id == user_id
    }

    /// The side `actor` occupies in this chat. The role must agree with the
    /// id: a farmer can only act on the farmer side.
    pub fn side_of(&self, actor: &Actor) -> Result<Role, MarketError> {
        match actor.role {
            Role::Farmer if self.farmer_id == actor.id => Ok(Role::Farmer),
            Role::Dealer if self.dealer_id == actor.id => Ok(Role::Dealer),
            _ => Err(MarketError::Forbidden(format!(
                "not a participant in chat {}",
                self.id
            ))),
        }
    }

    pub fn submission_for(&self, role: Role) -> Option<&DealSubmission> {
        self.deal_submissions
            .iter()
            .find(|s| s.submitted_by_role == role)
    }

    fn matches_subject(&self, request_id: Option<&str>, order_id: Option<&str>) -> bool {
        request_id.is_none_or(|id| self.request_id.as_deref() == Some(id))
            && order_id.is_none_or(|id| self.order_id.as_deref() == Some(id))
    }
}

impl DealOutcome {
    pub fn is_matched(&self) -> bool {
        matches!(self, DealOutcome::Matched { .. })
    }

    pub fn message(&self) -> &'static str {
        match self {
            DealOutcome::Waiting => "Deal submitted, waiting for the other side",
            DealOutcome::Mismatch => "Deal terms do not match, negotiate again",
            DealOutcome::Matched {
                already_placed: true,
                ..
            } => "Deal already matched, order was placed earlier",
            DealOutcome::Matched { .. } => "Deal matched, order placed",
        }
    }
}

fn chat_key(farmer_id: &str, dealer_id: &str, request_id: Option<&str>, order_id: Option<&str>) -> String {
    format!(
        "{farmer_id}:{dealer_id}:request:{}:order:{}",
        request_id.unwrap_or_default(),
        order_id.unwrap_or_default()
    )
}

// empty ids from clients count as absent
fn non_empty(id: &Option<String>) -> Option<&str> {
    id.as_deref().map(str::trim).filter(|id| !id.is_empty())
}

impl MarketService {
    /// Returns the chat between the actor and `other_user_id` about the given
    /// request and/or order, creating it if none exists yet.
    pub fn create_or_get_chat(&self, open: &OpenChat, actor: &Actor) -> Result<Chat, MarketError> {
        let other = open.other_user_id.trim();
        let request_id = non_empty(&open.request_id);
        let order_id = non_empty(&open.order_id);

        if other.is_empty() || (request_id.is_none() && order_id.is_none()) {
            return Err(MarketError::InvalidInput(
                "otherUserId and either requestId or orderId are required".into(),
            ));
        }

        let (farmer_id, dealer_id) = match actor.role {
            Role::Farmer => (actor.id.as_str(), other),
            Role::Dealer => (other, actor.id.as_str()),
            Role::Admin => {
                return Err(MarketError::Forbidden(
                    "only farmer and dealer chats are supported".into(),
                ));
            }
        };

        if let Some(request_id) = request_id {
            let request = self.store.fetch::<Request>(request_id)?;
            if request.dealer_id != dealer_id {
                return Err(MarketError::Forbidden("dealer mismatch for request".into()));
            }
        }
        if let Some(order_id) = order_id {
            let order = self.store.fetch::<Order>(order_id)?;
            if order.dealer_id != dealer_id || order.farmer_id != farmer_id {
                return Err(MarketError::Forbidden(
                    "participants mismatch for order".into(),
                ));
            }
        }

        if let Some(chat) = self.find_chat(farmer_id, dealer_id, request_id, order_id)? {
            return Ok(chat);
        }

        let chat = Chat::new(farmer_id, dealer_id, request_id, order_id)?;
        let key = chat_key(farmer_id, dealer_id, request_id, order_id);

        if self.store.index_swap(CHAT_KEYS, &key, None, Some(chat.id.as_str()))? {
            if let Err(err) = self.store.save(&chat) {
                if let Err(release) =
                    self.store
                        .index_swap(CHAT_KEYS, &key, Some(chat.id.as_str()), None)
                {
                    tracing::error!(chat_id = %chat.id, error = %release, "failed to release chat key");
                }
                return Err(err);
            }
            info!(chat_id = %chat.id, farmer_id, dealer_id, "chat created");
            return Ok(chat);
        }

        // another caller created the same chat first
        warn!(farmer_id, dealer_id, "concurrent chat creation, returning existing chat");
        let winner = match self.store.index_get(CHAT_KEYS, &key)? {
            Some(id) => self.store.load::<Chat>(&id)?,
            None => None,
        };
        winner.ok_or_else(|| MarketError::Conflict("chat is being created, retry".into()))
    }

    fn find_chat(
        &self,
        farmer_id: &str,
        dealer_id: &str,
        request_id: Option<&str>,
        order_id: Option<&str>,
    ) -> Result<Option<Chat>, MarketError> {
        let chats = self.store.scan::<Chat>(|chat| {
            chat.farmer_id == farmer_id
                && chat.dealer_id == dealer_id
                && chat.matches_subject(request_id, order_id)
        })?;
        Ok(chats.into_iter().min_by(|a, b| a.created_at.cmp(&b.created_at)))
    }

    pub fn send_message(&self, chat_id: &str, text: &str, actor: &Actor) -> Result<Message, MarketError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(MarketError::InvalidInput("message text is required".into()));
        }

        let message = Message {
            sender_id: actor.id.clone(),
            sender_role: actor.role,
            text: text.to_string(),
            created_at: TimeStamp::new(),
        };

        self.store.update::<Chat, _>(chat_id, |chat| {
            if !chat.is_participant(&actor.id) {
                return Err(MarketError::Forbidden(format!(
                    "not a participant in chat {chat_id}"
                )));
            }
            chat.messages.push(message.clone());
            chat.last_message_at = message.created_at.clone();
            Ok(())
        })?;

        Ok(message)
    }

    pub fn chat_messages(&self, chat_id: &str, actor: &Actor) -> Result<Vec<Message>, MarketError> {
        let chat = self.store.fetch::<Chat>(chat_id)?;
        if !chat.is_participant(&actor.id) {
            return Err(MarketError::Forbidden(format!(
                "not a participant in chat {chat_id}"
            )));
        }
        Ok(chat.messages)
    }

    /// The actor's chats, most recently active first.
    pub fn my_chats(&self, actor: &Actor) -> Result<Vec<Chat>, MarketError> {
        let mut chats = match actor.role {
            Role::Farmer => self.store.scan::<Chat>(|c| c.farmer_id == actor.id)?,
            Role::Dealer => self.store.scan::<Chat>(|c| c.dealer_id == actor.id)?,
            Role::Admin => {
                return Err(MarketError::Forbidden(
                    "only farmer and dealer chats are supported".into(),
                ));
            }
        };
        chats.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        Ok(chats)
    }

    /// Records the actor's deal terms, replacing its previous submission, and
    /// converts the chat into an order once both sides agree.
    pub fn submit_deal(
        &self,
        chat_id: &str,
        proposal: DealProposal,
        actor: &Actor,
    ) -> Result<DealOutcome, MarketError> {
        let side = self.store.fetch::<Chat>(chat_id)?.side_of(actor)?;
        let (terms, notes) = proposal.validate()?;

        let submission = DealSubmission {
            submitted_by_role: side,
            submitted_by: actor.id.clone(),
            terms_hash: terms.digest()?,
            terms,
            notes,
            submitted_at: TimeStamp::new(),
        };

        let chat = self.store.update::<Chat, _>(chat_id, |chat| {
            chat.deal_submissions
                .retain(|s| s.submitted_by_role != side);
            chat.deal_submissions.push(submission.clone());
            Ok(())
        })?;

        let (Some(farmer), Some(dealer)) = (
            chat.submission_for(Role::Farmer),
            chat.submission_for(Role::Dealer),
        ) else {
            return Ok(DealOutcome::Waiting);
        };

        if !farmer.terms.matches(&dealer.terms) {
            info!(chat_id, "deal terms do not match");
            return Ok(DealOutcome::Mismatch);
        }

        let (order, already_placed) = self.convert_deal(&chat, farmer, dealer, actor.role)?;
        Ok(DealOutcome::Matched {
            order,
            already_placed,
        })
    }

    fn convert_deal(
        &self,
        chat: &Chat,
        farmer: &DealSubmission,
        dealer: &DealSubmission,
        matched_by: Role,
    ) -> Result<(Order, bool), MarketError> {
        let request_id = match (&chat.request_id, &chat.order_id) {
            (Some(request_id), _) => request_id.clone(),
            (None, Some(order_id)) => self.store.fetch::<Order>(order_id)?.request_id,
            (None, None) => {
                return Err(MarketError::Internal(format!(
                    "chat {} has no request or order",
                    chat.id
                )));
            }
        };

        if let Some(existing) = self.active_order_for_request(&request_id)? {
            return self.existing_deal_order(chat, existing);
        }

        let request = self.store.fetch::<Request>(&request_id)?;
        let farmer_name = self.display_name(&chat.farmer_id)?;

        let notes = if farmer.notes.is_empty() {
            dealer.notes.clone()
        } else {
            farmer.notes.clone()
        };
        let order_terms = OrderTerms {
            quantity: farmer.terms.final_quantity,
            agreed_price: farmer.terms.price_per_kg,
            delivery_date: Some(farmer.terms.delivery_date),
            delivery_mode: farmer.terms.delivery_mode,
            delivery_cost: farmer.terms.delivery_cost,
            meeting_place: farmer.terms.meeting_place.clone(),
            notes,
            terms_hash: Some(farmer.terms_hash.clone()),
        };
        let order = Order::place(&request, &chat.farmer_id, &farmer_name, order_terms, matched_by)?;

        match self.place_order(order)? {
            Placement::Placed(order) => {
                self.finish_conversion(chat, &order)?;
                info!(chat_id = %chat.id, order_id = %order.id, "deal matched");
                Ok((order, false))
            }
            Placement::Existing(existing) => self.existing_deal_order(chat, existing),
        }
    }

    // A live order already exists: it is this deal's order only if it is
    // between the same two parties.
    fn existing_deal_order(&self, chat: &Chat, existing: Order) -> Result<(Order, bool), MarketError> {
        if existing.farmer_id != chat.farmer_id || existing.dealer_id != chat.dealer_id {
            return Err(MarketError::Conflict(format!(
                "request {} already has an order with another party",
                existing.request_id
            )));
        }
        self.finish_conversion(chat, &existing)?;
        Ok((existing, true))
    }

    /// Marks the request accepted and links the order to the chat. Safe to
    /// repeat.
    fn finish_conversion(&self, chat: &Chat, order: &Order) -> Result<(), MarketError> {
        self.store
            .update::<Request, _>(&order.request_id, |request| {
                request.status = RequestStatus::Accepted;
                Ok(())
            })?;
        self.store.update::<Chat, _>(&chat.id, |chat| {
            chat.order_id = Some(order.id.clone());
            Ok(())
        })?;
        Ok(())
    }
}
