//! Shared value types: actors, roles, statuses and timestamps
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::MarketError;

#[derive(
    minicbor::Encode, minicbor::Decode, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[n(0)]
    Farmer,
    #[n(1)]
    Dealer,
    #[n(2)]
    Admin,
}

/// The authenticated principal behind every operation. Supplied by the
/// identity collaborator and trusted as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

#[derive(
    minicbor::Encode, minicbor::Decode, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    #[n(0)]
    FarmerDelivery,
    #[n(1)]
    DealerPickup,
    #[n(2)]
    ThirdParty,
    #[n(3)]
    MeetPoint,
}

#[derive(
    minicbor::Encode, minicbor::Decode, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[n(0)]
    Placed,
    #[n(1)]
    Packed,
    #[n(2)]
    ReadyForDelivery,
    #[n(3)]
    Shipped,
    #[n(4)]
    OutForDelivery,
    #[n(5)]
    OutForPickup,
    #[n(6)]
    Picked,
    #[n(7)]
    Delivered,
    #[n(8)]
    Cancelled,
}

#[derive(
    minicbor::Encode, minicbor::Decode, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    #[n(0)]
    Open,
    #[n(1)]
    Accepted,
    #[n(2)]
    Closed,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

/// A calendar date with no time-of-day component.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct DeliveryDate(NaiveDate);

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Farmer => "farmer",
            Role::Dealer => "dealer",
            Role::Admin => "admin",
        }
    }
}

impl DeliveryMode {
    pub const ALL: [DeliveryMode; 4] = [
        DeliveryMode::FarmerDelivery,
        DeliveryMode::DealerPickup,
        DeliveryMode::ThirdParty,
        DeliveryMode::MeetPoint,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMode::FarmerDelivery => "farmer_delivery",
            DeliveryMode::DealerPickup => "dealer_pickup",
            DeliveryMode::ThirdParty => "third_party",
            DeliveryMode::MeetPoint => "meet_point",
        }
    }
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 9] = [
        OrderStatus::Placed,
        OrderStatus::Packed,
        OrderStatus::ReadyForDelivery,
        OrderStatus::Shipped,
        OrderStatus::OutForDelivery,
        OrderStatus::OutForPickup,
        OrderStatus::Picked,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Placed => "placed",
            OrderStatus::Packed => "packed",
            OrderStatus::ReadyForDelivery => "ready_for_delivery",
            OrderStatus::Shipped => "shipped",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::OutForPickup => "out_for_pickup",
            OrderStatus::Picked => "picked",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Open => "open",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Closed => "closed",
        }
    }
}

impl FromStr for Role {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "farmer" => Ok(Role::Farmer),
            "dealer" => Ok(Role::Dealer),
            "admin" => Ok(Role::Admin),
            other => Err(MarketError::InvalidInput(format!("unknown role '{other}'"))),
        }
    }
}

impl FromStr for DeliveryMode {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeliveryMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| MarketError::InvalidInput(format!("unknown delivery mode '{s}'")))
    }
}

impl FromStr for OrderStatus {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| MarketError::InvalidStatus(format!("'{s}' is not an order status")))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

// chrono's `Utc` is not `Ord`, so ordering is defined on the inner instant
impl PartialOrd for TimeStamp<Utc> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeStamp<Utc> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl Serialize for TimeStamp<Utc> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

impl DeliveryDate {
    /// Parses the date-only prefix (`YYYY-MM-DD`) of a date or datetime
    /// string. Anything after the tenth character is ignored.
    pub fn parse(raw: &str) -> Result<Self, MarketError> {
        let raw = raw.trim();
        let prefix = raw.get(..10).unwrap_or(raw);

        NaiveDate::parse_from_str(prefix, "%Y-%m-%d")
            .map(DeliveryDate)
            .map_err(|_| MarketError::InvalidInput(format!("'{raw}' is not a valid date")))
    }
    pub fn to_naive_date(&self) -> NaiveDate {
        self.0
    }
}

impl From<NaiveDate> for DeliveryDate {
    fn from(value: NaiveDate) -> Self {
        DeliveryDate(value)
    }
}

impl fmt::Display for DeliveryDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl Serialize for DeliveryDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// stored as days since the common era
impl<C> minicbor::Encode<C> for DeliveryDate {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.i32(self.0.num_days_from_ce())?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for DeliveryDate {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let days = d.i32()?;

        NaiveDate::from_num_days_from_ce_opt(days)
            .map(DeliveryDate)
            .ok_or(minicbor::decode::Error::message(
                "failed to convert day count to a calendar date",
            ))
    }
}

/// A numeric field as clients send it: a JSON number, or numeric text from
/// an unparsed form field.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum NumberInput {
    Number(f64),
    Text(String),
    Other(serde_json::Value),
}

impl NumberInput {
    /// The finite value of the field, or `InvalidInput` naming `field`.
    pub fn value(&self, field: &str) -> Result<f64, MarketError> {
        let parsed = match self {
            NumberInput::Number(n) => Some(*n),
            NumberInput::Text(text) => text.trim().parse::<f64>().ok(),
            NumberInput::Other(_) => None,
        };
        parsed
            .filter(|n| n.is_finite())
            .ok_or_else(|| MarketError::InvalidInput(format!("{field} must be a number")))
    }
}

impl Default for NumberInput {
    fn default() -> Self {
        NumberInput::Number(0.0)
    }
}

impl From<f64> for NumberInput {
    fn from(value: f64) -> Self {
        NumberInput::Number(value)
    }
}

impl From<&str> for NumberInput {
    fn from(value: &str) -> Self {
        NumberInput::Text(value.to_string())
    }
}
