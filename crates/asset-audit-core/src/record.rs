//! Asset Records as supplied by the data layer
//!
//! Each asset class has its own record shape. Dates and amounts are carried in
//! lenient wrappers so a malformed value never fails deserialization of the
//! whole batch; the Metric Deriver decides how to coerce them. Text cells
//! read null as empty and numbers as their literal, and an unreadable owner
//! key becomes `None`.
//!
//! Field names accept both the English keys used by this crate and the keys
//! of the source inventory exports (`fecha_adquisicion`, `valor_adquisicion`, ...).

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Accepted textual date layouts, tried in order after RFC 3339.
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// The four non-current asset classes audited by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Machinery,
    RealEstate,
    Intangible,
    OtherAsset,
}

impl AssetClass {
    pub const ALL: [AssetClass; 4] = [
        AssetClass::Machinery,
        AssetClass::RealEstate,
        AssetClass::Intangible,
        AssetClass::OtherAsset,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Machinery => "machinery",
            Self::RealEstate => "real_estate",
            Self::Intangible => "intangible",
            Self::OtherAsset => "other_asset",
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A date as found in the source data.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DateField {
    /// Column absent or null
    #[default]
    Missing,
    /// Present but not a recognizable date
    Invalid(String),
    Valid(NaiveDate),
}

impl DateField {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Missing;
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
            return Self::Valid(dt.date_naive());
        }
        for format in DATETIME_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
                return Self::Valid(dt.date());
            }
        }
        for format in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
                return Self::Valid(date);
            }
        }
        Self::Invalid(trimmed.to_string())
    }

    pub fn valid(&self) -> Option<NaiveDate> {
        match self {
            Self::Valid(date) => Some(*date),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

impl From<NaiveDate> for DateField {
    fn from(date: NaiveDate) -> Self {
        Self::Valid(date)
    }
}

impl Serialize for DateField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Missing => serializer.serialize_none(),
            Self::Invalid(raw) => serializer.serialize_str(raw),
            Self::Valid(date) => serializer.collect_str(&date.format("%Y-%m-%d")),
        }
    }
}

impl<'de> Deserialize<'de> for DateField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<Value>::deserialize(deserializer)?;
        Ok(match raw {
            None | Some(Value::Null) => Self::Missing,
            Some(Value::String(s)) => Self::parse(&s),
            Some(other) => Self::Invalid(other.to_string()),
        })
    }
}

/// A numeric amount as found in the source data.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Numeric {
    #[default]
    Missing,
    Invalid(String),
    Value(f64),
}

impl Numeric {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(v) if v.is_finite() => Self::Value(v),
            _ => Self::Invalid(trimmed.to_string()),
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Value(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

impl From<f64> for Numeric {
    fn from(v: f64) -> Self {
        if v.is_finite() {
            Self::Value(v)
        } else {
            Self::Invalid(v.to_string())
        }
    }
}

impl Serialize for Numeric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Missing => serializer.serialize_none(),
            Self::Invalid(raw) => serializer.serialize_str(raw),
            Self::Value(v) => serializer.serialize_f64(*v),
        }
    }
}

impl<'de> Deserialize<'de> for Numeric {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<Value>::deserialize(deserializer)?;
        Ok(match raw {
            None | Some(Value::Null) => Self::Missing,
            Some(Value::Number(n)) => match n.as_f64() {
                Some(v) => Self::from(v),
                None => Self::Invalid(n.to_string()),
            },
            Some(Value::String(s)) => Self::parse(&s),
            Some(other) => Self::Invalid(other.to_string()),
        })
    }
}

/// Text cell: null becomes empty, numbers and booleans keep their literal form.
fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    })
}

/// Integer key: whole floats such as `3001.0` are accepted, anything else is dropped.
fn lenient_key<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::Number(n)) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|v| v.fract() == 0.0 && *v >= 0.0 && *v <= u64::MAX as f64)
                .map(|v| v as u64)
        }),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Batch column: a null batch is an empty one.
fn lenient_batch<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Machinery and equipment inventory entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineryRecord {
    #[serde(default, alias = "id_equipo", deserialize_with = "lenient_text")]
    pub id: String,
    #[serde(default, alias = "tipo_equipo", deserialize_with = "lenient_text")]
    pub equipment_type: String,
    #[serde(default, alias = "descripcion", deserialize_with = "lenient_text")]
    pub description: String,
    #[serde(default, alias = "ubicacion", deserialize_with = "lenient_text")]
    pub location: String,
    #[serde(default, alias = "estado", deserialize_with = "lenient_text")]
    pub status: String,
    #[serde(default, alias = "fecha_adquisicion")]
    pub acquisition_date: DateField,
    #[serde(default, alias = "valor_adquisicion")]
    pub acquisition_value: Numeric,
    #[serde(default, alias = "vida_util_anios")]
    pub useful_life_years: Numeric,
    #[serde(default, alias = "fecha_fin_vida_util")]
    pub end_of_life_date: DateField,
}

/// Real estate inventory entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealEstateRecord {
    #[serde(default, alias = "id_inmueble", deserialize_with = "lenient_text")]
    pub id: String,
    #[serde(default, alias = "tipo_inmueble", deserialize_with = "lenient_text")]
    pub property_type: String,
    #[serde(default, alias = "direccion", deserialize_with = "lenient_text")]
    pub address: String,
    #[serde(default, alias = "ubicacion", deserialize_with = "lenient_text")]
    pub location: String,
    #[serde(default, alias = "estado", deserialize_with = "lenient_text")]
    pub status: String,
    #[serde(default, alias = "fecha_adquisicion")]
    pub acquisition_date: DateField,
    #[serde(default, alias = "valor_adquisicion")]
    pub acquisition_value: Numeric,
    #[serde(default, alias = "superficie_m2")]
    pub surface_area: Numeric,
    #[serde(default, alias = "fecha_fin_vida_util")]
    pub end_of_life_date: DateField,
}

/// Intangible asset entry with the amortization figures kept by the books.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntangibleRecord {
    #[serde(default, alias = "activo_id", deserialize_with = "lenient_text")]
    pub id: String,
    #[serde(default, alias = "empresa_id", deserialize_with = "lenient_key")]
    pub owner_id: Option<u64>,
    #[serde(default, alias = "nombre_empresa_propietaria", deserialize_with = "lenient_text")]
    pub owner_name: String,
    #[serde(default, alias = "cuit_empresa_propietaria", deserialize_with = "lenient_text")]
    pub owner_tax_id: String,
    #[serde(default, alias = "tipo_activo_intangible", deserialize_with = "lenient_text")]
    pub asset_type: String,
    #[serde(default, alias = "estado_activo", deserialize_with = "lenient_text")]
    pub status: String,
    #[serde(default, alias = "fecha_adquisicion")]
    pub acquisition_date: DateField,
    #[serde(default, alias = "costo_adquisicion")]
    pub cost: Numeric,
    #[serde(default, alias = "vida_util_anios")]
    pub useful_life_years: Numeric,
    #[serde(default, alias = "amortizacion_acumulada_simulada")]
    pub simulated_accumulated_amortization: Numeric,
    #[serde(default, alias = "valor_neto_contable_simulado")]
    pub simulated_net_book_value: Numeric,
}

/// Miscellaneous long-term asset (receivables, investments, deferred taxes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtherAssetRecord {
    #[serde(default, alias = "id_activo", deserialize_with = "lenient_text")]
    pub id: String,
    #[serde(default, alias = "tipo_activo", deserialize_with = "lenient_text")]
    pub asset_type: String,
    #[serde(default, alias = "monto")]
    pub amount: Numeric,
    #[serde(default, alias = "moneda", deserialize_with = "lenient_text")]
    pub currency: String,
    #[serde(default, alias = "fecha_registro")]
    pub registration_date: DateField,
    #[serde(default, alias = "descripcion", deserialize_with = "lenient_text")]
    pub description: String,
}

/// One batch per asset class, as handed over by the data supplier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    #[serde(default, alias = "maquinarias", deserialize_with = "lenient_batch")]
    pub machinery: Vec<MachineryRecord>,
    #[serde(default, alias = "inmuebles", deserialize_with = "lenient_batch")]
    pub real_estate: Vec<RealEstateRecord>,
    #[serde(default, alias = "intangibles", deserialize_with = "lenient_batch")]
    pub intangibles: Vec<IntangibleRecord>,
    #[serde(default, alias = "otros_activos", deserialize_with = "lenient_batch")]
    pub other_assets: Vec<OtherAssetRecord>,
}

impl Portfolio {
    pub fn len(&self) -> usize {
        self.machinery.len() + self.real_estate.len() + self.intangibles.len() + self.other_assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
