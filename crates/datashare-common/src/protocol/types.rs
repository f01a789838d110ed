//! Aggregate protocol types: URIs, templates, batch results, published data,
//! result sets and change notifications.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{DataShareError, Result};
use super::marshal::{Marshal, Unmarshal};
use super::parcel::{Parcel, ParcelReader};
use super::value::ValueObject;

/// Per-item result codes carried in [`OperationResult`].
pub mod result_code {
    pub const OK: i32 = 0;
    /// The URI is empty or not of the form `scheme:...`.
    pub const E_URI_INVALID: i32 = 1;
    /// The same observer is already subscribed under that key.
    pub const E_DUPLICATE: i32 = 2;
    /// Subscribe named a template that was never added.
    pub const E_TEMPLATE_NOT_FOUND: i32 = 3;
    /// No subscription exists under that key.
    pub const E_SUBSCRIBER_NOT_EXIST: i32 = 4;
    /// The subscription's template has been deleted.
    pub const E_TEMPLATE_STALE: i32 = 5;
    /// The provider rejected the item for its own reasons.
    pub const E_PROVIDER: i32 = 6;
}

/// Identifier of a data resource, e.g. `datashare:///com.example/contacts`.
///
/// Construction does not validate; [`Uri::is_well_formed`] does. The registry
/// reports malformed URIs per item instead of failing a whole batch.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uri(String);

impl Uri {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    /// Builds a URI, failing with a parameter error if it is malformed.
    pub fn parse(uri: impl Into<String>) -> Result<Self> {
        let uri = Self(uri.into());
        if !uri.is_well_formed() {
            return Err(DataShareError::Parameter(format!("invalid uri '{}'", uri.0)));
        }
        Ok(uri)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Non-empty, free of whitespace and control characters, and starting
    /// with `<scheme>:` where the scheme is `[A-Za-z][A-Za-z0-9+.-]*`.
    pub fn is_well_formed(&self) -> bool {
        let s = self.0.as_str();
        if s.is_empty() || s.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return false;
        }
        let Some((scheme, _)) = s.split_once(':') else {
            return false;
        };
        let mut chars = scheme.chars();
        match chars.next() {
            Some(first) if first.is_ascii_alphabetic() => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-'))
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Uri {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Uri {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for Uri {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Marshal for Uri {
    fn marshal(&self, parcel: &mut Parcel) -> Result<()> {
        parcel.write_string(&self.0)
    }
}

impl Unmarshal for Uri {
    const MIN_WIRE_SIZE: usize = 4;

    fn unmarshal(reader: &mut ParcelReader<'_>) -> Result<Self> {
        Ok(Self(reader.read_string()?))
    }
}

/// Key of one subscriber's template.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TemplateId {
    pub subscriber_id: i64,
    pub bundle_name: String,
}

impl TemplateId {
    pub fn new(subscriber_id: i64, bundle_name: impl Into<String>) -> Self {
        Self { subscriber_id, bundle_name: bundle_name.into() }
    }
}

impl Marshal for TemplateId {
    fn marshal(&self, parcel: &mut Parcel) -> Result<()> {
        parcel.write_i64(self.subscriber_id);
        parcel.write_string(&self.bundle_name)
    }
}

impl Unmarshal for TemplateId {
    const MIN_WIRE_SIZE: usize = 12;

    fn unmarshal(reader: &mut ParcelReader<'_>) -> Result<Self> {
        Ok(Self { subscriber_id: reader.read_i64()?, bundle_name: reader.read_string()? })
    }
}

/// One named sub-query of a template.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PredicateTemplateNode {
    pub key: String,
    pub select_sql: String,
}

impl PredicateTemplateNode {
    pub fn new(key: impl Into<String>, select_sql: impl Into<String>) -> Self {
        Self { key: key.into(), select_sql: select_sql.into() }
    }
}

impl Marshal for PredicateTemplateNode {
    fn marshal(&self, parcel: &mut Parcel) -> Result<()> {
        parcel.write_string(&self.key)?;
        parcel.write_string(&self.select_sql)
    }
}

impl Unmarshal for PredicateTemplateNode {
    const MIN_WIRE_SIZE: usize = 8;

    fn unmarshal(reader: &mut ParcelReader<'_>) -> Result<Self> {
        Ok(Self { key: reader.read_string()?, select_sql: reader.read_string()? })
    }
}

/// Named sub-queries plus a scheduler expression, bound to a [`TemplateId`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Template {
    pub predicates: Vec<PredicateTemplateNode>,
    pub scheduler: String,
}

impl Template {
    pub fn new(predicates: Vec<PredicateTemplateNode>, scheduler: impl Into<String>) -> Self {
        Self { predicates, scheduler: scheduler.into() }
    }
}

impl Marshal for Template {
    fn marshal(&self, parcel: &mut Parcel) -> Result<()> {
        self.predicates.marshal(parcel)?;
        parcel.write_string(&self.scheduler)
    }
}

impl Unmarshal for Template {
    const MIN_WIRE_SIZE: usize = 8;

    fn unmarshal(reader: &mut ParcelReader<'_>) -> Result<Self> {
        Ok(Self { predicates: reader.read()?, scheduler: reader.read_string()? })
    }
}

/// Outcome for one URI of a batch call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub uri: String,
    pub code: i32,
}

impl OperationResult {
    pub fn new(uri: impl Into<String>, code: i32) -> Self {
        Self { uri: uri.into(), code }
    }

    pub fn ok(uri: impl Into<String>) -> Self {
        Self::new(uri, result_code::OK)
    }

    pub fn is_ok(&self) -> bool {
        self.code == result_code::OK
    }
}

impl Marshal for OperationResult {
    fn marshal(&self, parcel: &mut Parcel) -> Result<()> {
        parcel.write_string(&self.uri)?;
        parcel.write_i32(self.code);
        Ok(())
    }
}

impl Unmarshal for OperationResult {
    const MIN_WIRE_SIZE: usize = 8;

    fn unmarshal(reader: &mut ParcelReader<'_>) -> Result<Self> {
        Ok(Self { uri: reader.read_string()?, code: reader.read_i32()? })
    }
}

const PUBLISHED_STRING: u8 = 0;
const PUBLISHED_BLOB: u8 = 1;

/// Payload of a published data item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishedValue {
    String(String),
    Blob(Vec<u8>),
}

impl Marshal for PublishedValue {
    fn marshal(&self, parcel: &mut Parcel) -> Result<()> {
        match self {
            PublishedValue::String(s) => {
                parcel.write_u8(PUBLISHED_STRING);
                parcel.write_string(s)
            }
            PublishedValue::Blob(b) => {
                parcel.write_u8(PUBLISHED_BLOB);
                parcel.write_blob(b)
            }
        }
    }
}

impl Unmarshal for PublishedValue {
    const MIN_WIRE_SIZE: usize = 5;

    fn unmarshal(reader: &mut ParcelReader<'_>) -> Result<Self> {
        match reader.read_u8()? {
            PUBLISHED_STRING => Ok(PublishedValue::String(reader.read_string()?)),
            PUBLISHED_BLOB => Ok(PublishedValue::Blob(reader.read_blob()?)),
            tag => Err(DataShareError::corrupt(format!("unknown published value tag {}", tag))),
        }
    }
}

/// One key-tagged item of published data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedDataItem {
    pub key: String,
    pub subscriber_id: i64,
    pub value: PublishedValue,
}

impl PublishedDataItem {
    pub fn new(key: impl Into<String>, subscriber_id: i64, value: PublishedValue) -> Self {
        Self { key: key.into(), subscriber_id, value }
    }
}

impl Marshal for PublishedDataItem {
    fn marshal(&self, parcel: &mut Parcel) -> Result<()> {
        parcel.write_string(&self.key)?;
        parcel.write_i64(self.subscriber_id);
        self.value.marshal(parcel)
    }
}

impl Unmarshal for PublishedDataItem {
    const MIN_WIRE_SIZE: usize = 17;

    fn unmarshal(reader: &mut ParcelReader<'_>) -> Result<Self> {
        Ok(Self { key: reader.read_string()?, subscriber_id: reader.read_i64()?, value: reader.read()? })
    }
}

/// A versioned batch of published items.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Data {
    pub items: Vec<PublishedDataItem>,
    pub version: i32,
}

impl Marshal for Data {
    fn marshal(&self, parcel: &mut Parcel) -> Result<()> {
        self.items.marshal(parcel)?;
        parcel.write_i32(self.version);
        Ok(())
    }
}

impl Unmarshal for Data {
    const MIN_WIRE_SIZE: usize = 8;

    fn unmarshal(reader: &mut ParcelReader<'_>) -> Result<Self> {
        Ok(Self { items: reader.read()?, version: reader.read_i32()? })
    }
}

/// Rows returned by a query.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<ValueObject>>,
}

impl ResultSet {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value at `row` for the named column.
    pub fn get(&self, row: usize, column: &str) -> Option<&ValueObject> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)
    }
}

impl Marshal for ResultSet {
    fn marshal(&self, parcel: &mut Parcel) -> Result<()> {
        self.columns.marshal(parcel)?;
        self.rows.marshal(parcel)
    }
}

impl Unmarshal for ResultSet {
    const MIN_WIRE_SIZE: usize = 8;

    fn unmarshal(reader: &mut ParcelReader<'_>) -> Result<Self> {
        let columns: Vec<String> = reader.read()?;
        let rows: Vec<Vec<ValueObject>> = reader.read()?;
        if let Some(row) = rows.iter().find(|row| row.len() != columns.len()) {
            return Err(DataShareError::corrupt(format!(
                "row has {} values for {} columns",
                row.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }
}

/// Cross-process handle to an observer: the host endpoint and a host-local id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObserverRef {
    pub endpoint: String,
    pub id: u64,
}

impl ObserverRef {
    pub fn new(endpoint: impl Into<String>, id: u64) -> Self {
        Self { endpoint: endpoint.into(), id }
    }
}

impl fmt::Display for ObserverRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.endpoint, self.id)
    }
}

impl Marshal for ObserverRef {
    fn marshal(&self, parcel: &mut Parcel) -> Result<()> {
        parcel.write_string(&self.endpoint)?;
        parcel.write_u64(self.id);
        Ok(())
    }
}

impl Unmarshal for ObserverRef {
    const MIN_WIRE_SIZE: usize = 12;

    fn unmarshal(reader: &mut ParcelReader<'_>) -> Result<Self> {
        Ok(Self { endpoint: reader.read_string()?, id: reader.read_u64()? })
    }
}

/// Change pushed to RDB-template subscribers.
///
/// `data` holds one JSON document per template sub-query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RdbChangeNode {
    pub uri: String,
    pub template_id: TemplateId,
    pub data: Vec<String>,
}

impl Marshal for RdbChangeNode {
    fn marshal(&self, parcel: &mut Parcel) -> Result<()> {
        parcel.write_string(&self.uri)?;
        self.template_id.marshal(parcel)?;
        self.data.marshal(parcel)
    }
}

impl Unmarshal for RdbChangeNode {
    fn unmarshal(reader: &mut ParcelReader<'_>) -> Result<Self> {
        Ok(Self { uri: reader.read_string()?, template_id: reader.read()?, data: reader.read()? })
    }
}

/// Change pushed to published-data subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedDataChangeNode {
    pub bundle_name: String,
    pub items: Vec<PublishedDataItem>,
}

impl Marshal for PublishedDataChangeNode {
    fn marshal(&self, parcel: &mut Parcel) -> Result<()> {
        parcel.write_string(&self.bundle_name)?;
        self.items.marshal(parcel)
    }
}

impl Unmarshal for PublishedDataChangeNode {
    fn unmarshal(reader: &mut ParcelReader<'_>) -> Result<Self> {
        Ok(Self { bundle_name: reader.read_string()?, items: reader.read()? })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_well_formed() {
        for ok in ["datashare:///com.example/contacts", "a:b", "x-y.z+1:/path", "datashareproxy://bundle/key"] {
            assert!(Uri::from(ok).is_well_formed(), "{} rejected", ok);
        }
        for bad in ["", "no-scheme", ":missing", "1abc:/x", "data share:///x", "datashare:///a\nb", "da_ta:/x"] {
            assert!(!Uri::from(bad).is_well_formed(), "{:?} accepted", bad);
        }
    }

    #[test]
    fn test_uri_parse() {
        assert!(Uri::parse("datashare:///a").is_ok());
        assert!(matches!(Uri::parse(""), Err(DataShareError::Parameter(_))));
    }

    #[test]
    fn test_template_round_trip() {
        let template = Template::new(
            vec![
                PredicateTemplateNode::new("adults", "select name from people where age >= 18"),
                PredicateTemplateNode::new("count", "select count(*) from people"),
            ],
            "0 */5 * * *",
        );
        let id = TemplateId::new(11, "com.example.app");

        let mut parcel = Parcel::new();
        parcel.write(&id).unwrap();
        parcel.write(&template).unwrap();

        let mut reader = parcel.reader();
        assert_eq!(reader.read::<TemplateId>().unwrap(), id);
        assert_eq!(reader.read::<Template>().unwrap(), template);
    }

    #[test]
    fn test_published_data_round_trip() {
        let data = Data {
            items: vec![
                PublishedDataItem::new("weather", 1, PublishedValue::String("sunny".into())),
                PublishedDataItem::new("icon", 1, PublishedValue::Blob(vec![0x89, 0x50])),
            ],
            version: 3,
        };
        let mut parcel = Parcel::new();
        parcel.write(&data).unwrap();
        assert_eq!(parcel.reader().read::<Data>().unwrap(), data);
    }

    #[test]
    fn test_unknown_published_tag() {
        let mut parcel = Parcel::new();
        parcel.write_u8(9);
        parcel.write_string("x").unwrap();
        assert!(parcel.reader().read::<PublishedValue>().is_err());
    }

    #[test]
    fn test_result_set_round_trip_and_lookup() {
        let rs = ResultSet {
            columns: vec!["name".into(), "age".into()],
            rows: vec![
                vec![ValueObject::from("Rose"), ValueObject::from(22i64)],
                vec![ValueObject::from("Ann"), ValueObject::Null],
            ],
        };
        let mut parcel = Parcel::new();
        parcel.write(&rs).unwrap();
        let decoded: ResultSet = parcel.reader().read().unwrap();
        assert_eq!(decoded, rs);
        assert_eq!(decoded.get(0, "age"), Some(&ValueObject::Int64(22)));
        assert_eq!(decoded.get(1, "missing"), None);
    }

    #[test]
    fn test_result_set_ragged_row_rejected() {
        let mut parcel = Parcel::new();
        parcel.write(&vec!["a".to_string(), "b".to_string()]).unwrap();
        parcel.write(&vec![vec![ValueObject::from(1i64)]]).unwrap();
        assert!(parcel.reader().read::<ResultSet>().is_err());
    }

    #[test]
    fn test_change_nodes_round_trip() {
        let rdb = RdbChangeNode {
            uri: "datashare:///a".into(),
            template_id: TemplateId::new(1, "b"),
            data: vec![r#"{"adults":[]}"#.into()],
        };
        let published = PublishedDataChangeNode {
            bundle_name: "b".into(),
            items: vec![PublishedDataItem::new("k", 2, PublishedValue::String("v".into()))],
        };
        let observer = ObserverRef::new("127.0.0.1:4000", 7);

        let mut parcel = Parcel::new();
        parcel.write(&rdb).unwrap();
        parcel.write(&published).unwrap();
        parcel.write(&observer).unwrap();

        let mut reader = parcel.reader();
        assert_eq!(reader.read::<RdbChangeNode>().unwrap(), rdb);
        assert_eq!(reader.read::<PublishedDataChangeNode>().unwrap(), published);
        assert_eq!(reader.read::<ObserverRef>().unwrap(), observer);
        assert_eq!(observer.to_string(), "127.0.0.1:4000#7");
    }
}
