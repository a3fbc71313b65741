use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::Date;

use crate::{Symbol, UtcDateTime, ValidationError};

/// Instrument category. Determines the metadata shape and the bar table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Equity,
    #[serde(alias = "cryptocurrency")]
    Crypto,
    #[serde(alias = "commodityfuture")]
    CommodityFuture,
}

impl AssetClass {
    pub const ALL: [Self; 3] = [Self::Equity, Self::Crypto, Self::CommodityFuture];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Equity => "equity",
            Self::Crypto => "crypto",
            Self::CommodityFuture => "commodity_future",
        }
    }
}

impl Display for AssetClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetClass {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "equity" => Ok(Self::Equity),
            "crypto" | "cryptocurrency" => Ok(Self::Crypto),
            "commodity_future" | "commodityfuture" | "future" => Ok(Self::CommodityFuture),
            other => Err(ValidationError::InvalidAssetClass {
                value: other.to_owned(),
            }),
        }
    }
}

/// Store-assigned asset identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(pub i64);

impl AssetId {
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl Display for AssetId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Either form of asset lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AssetKey {
    Id(AssetId),
    Symbol { symbol: Symbol, class: AssetClass },
}

impl Display for AssetKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "asset_id={id}"),
            Self::Symbol { symbol, class } => write!(f, "{symbol}/{class}"),
        }
    }
}

impl From<AssetId> for AssetKey {
    fn from(value: AssetId) -> Self {
        Self::Id(value)
    }
}

/// Equity reference data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquityMeta {
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub exchange: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shares_outstanding: Option<u64>,
}

/// Cryptocurrency reference data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circulating_supply: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_supply: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_supply: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Commodity future contract reference data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FutureMeta {
    #[serde(default)]
    pub commodity_name: String,
    #[serde(default)]
    pub base_future_code: String,
    #[serde(default, with = "iso_date")]
    pub expiration_date: Option<Date>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Class-specific asset metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum AssetMetadata {
    Equity(EquityMeta),
    #[serde(alias = "cryptocurrency")]
    Crypto(CryptoMeta),
    #[serde(alias = "commodityfuture")]
    CommodityFuture(FutureMeta),
}

impl AssetMetadata {
    pub const fn class(&self) -> AssetClass {
        match self {
            Self::Equity(_) => AssetClass::Equity,
            Self::Crypto(_) => AssetClass::Crypto,
            Self::CommodityFuture(_) => AssetClass::CommodityFuture,
        }
    }

    /// Check required fields and normalize free-form values.
    pub fn validated(self) -> Result<Self, ValidationError> {
        match self {
            Self::Equity(meta) => {
                let class = AssetClass::Equity;
                Ok(Self::Equity(EquityMeta {
                    company_name: required_text(class, "company_name", meta.company_name)?,
                    exchange: required_text(class, "exchange", meta.exchange)?,
                    currency: meta.currency.as_deref().map(validate_currency_code).transpose()?,
                    industry: optional_text(meta.industry),
                    description: optional_text(meta.description),
                    market_cap: meta.market_cap,
                    shares_outstanding: meta.shares_outstanding,
                }))
            }
            Self::Crypto(meta) => {
                if let (Some(circulating), Some(max)) = (meta.circulating_supply, meta.max_supply) {
                    if circulating > max {
                        return Err(ValidationError::SupplyExceedsMax);
                    }
                }
                Ok(Self::Crypto(CryptoMeta {
                    name: required_text(AssetClass::Crypto, "name", meta.name)?,
                    description: optional_text(meta.description),
                    ..meta
                }))
            }
            Self::CommodityFuture(meta) => {
                let class = AssetClass::CommodityFuture;
                let expiration_date = meta.expiration_date.ok_or(ValidationError::MissingField {
                    class: class.as_str().to_owned(),
                    field: "expiration_date",
                })?;
                Ok(Self::CommodityFuture(FutureMeta {
                    commodity_name: required_text(class, "commodity_name", meta.commodity_name)?,
                    base_future_code: required_text(class, "base_future_code", meta.base_future_code)?
                        .to_ascii_uppercase(),
                    expiration_date: Some(expiration_date),
                    exchange: optional_text(meta.exchange),
                    currency: meta.currency.as_deref().map(validate_currency_code).transpose()?,
                    industry: optional_text(meta.industry),
                    description: optional_text(meta.description),
                }))
            }
        }
    }

    /// Apply a partial patch, returning the validated result.
    pub fn apply(&self, patch: &MetadataPatch) -> Result<Self, ValidationError> {
        let patched = match (self, patch) {
            (Self::Equity(meta), MetadataPatch::Equity(patch)) => {
                let mut meta = meta.clone();
                set(&mut meta.company_name, &patch.company_name);
                set(&mut meta.exchange, &patch.exchange);
                set_opt(&mut meta.currency, &patch.currency);
                set_opt(&mut meta.industry, &patch.industry);
                set_opt(&mut meta.description, &patch.description);
                set_opt(&mut meta.market_cap, &patch.market_cap);
                set_opt(&mut meta.shares_outstanding, &patch.shares_outstanding);
                Self::Equity(meta)
            }
            (Self::Crypto(meta), MetadataPatch::Crypto(patch)) => {
                let mut meta = meta.clone();
                set(&mut meta.name, &patch.name);
                set_opt(&mut meta.circulating_supply, &patch.circulating_supply);
                set_opt(&mut meta.total_supply, &patch.total_supply);
                set_opt(&mut meta.max_supply, &patch.max_supply);
                set_opt(&mut meta.market_cap, &patch.market_cap);
                set_opt(&mut meta.description, &patch.description);
                Self::Crypto(meta)
            }
            (Self::CommodityFuture(meta), MetadataPatch::CommodityFuture(patch)) => {
                let mut meta = meta.clone();
                set(&mut meta.commodity_name, &patch.commodity_name);
                set(&mut meta.base_future_code, &patch.base_future_code);
                set_opt(&mut meta.expiration_date, &patch.expiration_date);
                set_opt(&mut meta.exchange, &patch.exchange);
                set_opt(&mut meta.currency, &patch.currency);
                set_opt(&mut meta.industry, &patch.industry);
                set_opt(&mut meta.description, &patch.description);
                Self::CommodityFuture(meta)
            }
            (current, patch) => {
                return Err(ValidationError::MetadataClassMismatch {
                    class: patch.class().as_str().to_owned(),
                    expected: current.class().as_str().to_owned(),
                })
            }
        };
        patched.validated()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquityPatch {
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub exchange: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub market_cap: Option<u64>,
    #[serde(default)]
    pub shares_outstanding: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub circulating_supply: Option<u64>,
    #[serde(default)]
    pub total_supply: Option<u64>,
    #[serde(default)]
    pub max_supply: Option<u64>,
    #[serde(default)]
    pub market_cap: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuturePatch {
    #[serde(default)]
    pub commodity_name: Option<String>,
    #[serde(default)]
    pub base_future_code: Option<String>,
    #[serde(default, with = "iso_date")]
    pub expiration_date: Option<Date>,
    #[serde(default)]
    pub exchange: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Partial metadata update, tagged with the class it targets.
///
/// Fields left as `None` keep their stored value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum MetadataPatch {
    Equity(EquityPatch),
    #[serde(alias = "cryptocurrency")]
    Crypto(CryptoPatch),
    #[serde(alias = "commodityfuture")]
    CommodityFuture(FuturePatch),
}

impl MetadataPatch {
    pub const fn class(&self) -> AssetClass {
        match self {
            Self::Equity(_) => AssetClass::Equity,
            Self::Crypto(_) => AssetClass::Crypto,
            Self::CommodityFuture(_) => AssetClass::CommodityFuture,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Equity(patch) => patch == &EquityPatch::default(),
            Self::Crypto(patch) => patch == &CryptoPatch::default(),
            Self::CommodityFuture(patch) => patch == &FuturePatch::default(),
        }
    }
}

/// Partial update of an asset.
///
/// `asset_class` exists so that callers sending a class change get a
/// precise rejection instead of having the field silently ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetPatch {
    #[serde(default)]
    pub symbol: Option<Symbol>,
    #[serde(default, alias = "type", alias = "class")]
    pub asset_class: Option<AssetClass>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub metadata: Option<MetadataPatch>,
}

impl AssetPatch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.asset_class.is_some() {
            return Err(ValidationError::ImmutableClass);
        }
        if let Some(name) = &self.display_name {
            if name.trim().is_empty() {
                return Err(ValidationError::EmptyField {
                    field: "display_name",
                });
            }
        }
        let metadata_empty = self.metadata.as_ref().map_or(true, MetadataPatch::is_empty);
        if self.symbol.is_none() && self.display_name.is_none() && metadata_empty {
            return Err(ValidationError::EmptyPatch);
        }
        Ok(())
    }
}

/// A registered instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub symbol: Symbol,
    pub class: AssetClass,
    pub display_name: String,
    pub metadata: AssetMetadata,
    pub created_at: UtcDateTime,
    pub updated_at: UtcDateTime,
}

impl Asset {
    pub fn key(&self) -> AssetKey {
        AssetKey::Symbol {
            symbol: self.symbol.clone(),
            class: self.class,
        }
    }
}

/// Validate and normalize currency to uppercase 3-letter code.
pub fn validate_currency_code(input: &str) -> Result<String, ValidationError> {
    let normalized = input.trim().to_ascii_uppercase();
    let is_valid = normalized.len() == 3 && normalized.chars().all(|ch| ch.is_ascii_alphabetic());

    if !is_valid {
        return Err(ValidationError::InvalidCurrency {
            value: input.to_owned(),
        });
    }

    Ok(normalized)
}

/// Validate a display name, returning it trimmed.
pub fn validate_display_name(input: &str) -> Result<String, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField {
            field: "display_name",
        });
    }
    Ok(trimmed.to_owned())
}

fn required_text(
    class: AssetClass,
    field: &'static str,
    value: String,
) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField {
            class: class.as_str().to_owned(),
            field,
        });
    }
    Ok(trimmed.to_owned())
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn set<T: Clone>(target: &mut T, value: &Option<T>) {
    if let Some(value) = value {
        *target = value.clone();
    }
}

fn set_opt<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
    if value.is_some() {
        target.clone_from(value);
    }
}

mod iso_date {
    use serde::de::Error as DeError;
    use serde::{Deserialize, Deserializer, Serializer};
    use time::macros::format_description;
    use time::Date;

    pub fn serialize<S>(value: &Option<Date>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(date) => {
                let text = date
                    .format(format_description!("[year]-[month]-[day]"))
                    .map_err(serde::ser::Error::custom)?;
                serializer.serialize_some(&text)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Date>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<String>::deserialize(deserializer)?;
        value
            .map(|text| {
                // Timestamps are accepted too; only the date part is kept.
                let date_part = text.trim().get(..10).unwrap_or(text.trim());
                Date::parse(date_part, format_description!("[year]-[month]-[day]")).map_err(
                    |_| D::Error::custom(format!("date must be YYYY-MM-DD: '{text}'")),
                )
            })
            .transpose()
    }
}
