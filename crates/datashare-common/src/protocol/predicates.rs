//! Predicates: the filter and sort description carried by update, delete and
//! query calls.
//!
//! Wire layout:
//!
//! ```text
//! i32 operation count
//!   per operation: i64 operation code, i64 parameter count,
//!                  3 x PredicateObject (unused slots are Null)
//! string where clause
//! i32 count + strings   where args
//! string order
//! i64 setting mode
//! ```

use super::error::{DataShareError, Result};
use super::marshal::{Marshal, Unmarshal};
use super::parcel::{Parcel, ParcelReader};
use super::value::{PredicateObject, ValueObject};

/// Predicate operations understood by providers.
///
/// Codes start at 1; 0 is reserved as "invalid" and never decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    EqualTo = 1,
    NotEqualTo = 2,
    GreaterThan = 3,
    LessThan = 4,
    GreaterThanOrEqualTo = 5,
    LessThanOrEqualTo = 6,
    And = 7,
    Or = 8,
    IsNull = 9,
    IsNotNull = 10,
    In = 11,
    NotIn = 12,
    Like = 13,
    Unlike = 14,
    OrderByAsc = 15,
    OrderByDesc = 16,
    Limit = 17,
    Offset = 18,
    BeginWrap = 19,
    EndWrap = 20,
    GroupBy = 21,
    IndexedBy = 22,
    Contains = 23,
    Glob = 24,
    Between = 25,
    NotBetween = 26,
    KeyPrefix = 27,
    InKeys = 28,
    Distinct = 29,
}

impl OperationType {
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        use OperationType::*;
        let op = match code {
            1 => EqualTo,
            2 => NotEqualTo,
            3 => GreaterThan,
            4 => LessThan,
            5 => GreaterThanOrEqualTo,
            6 => LessThanOrEqualTo,
            7 => And,
            8 => Or,
            9 => IsNull,
            10 => IsNotNull,
            11 => In,
            12 => NotIn,
            13 => Like,
            14 => Unlike,
            15 => OrderByAsc,
            16 => OrderByDesc,
            17 => Limit,
            18 => Offset,
            19 => BeginWrap,
            20 => EndWrap,
            21 => GroupBy,
            22 => IndexedBy,
            23 => Contains,
            24 => Glob,
            25 => Between,
            26 => NotBetween,
            27 => KeyPrefix,
            28 => InKeys,
            29 => Distinct,
            _ => return None,
        };
        Some(op)
    }
}

/// Number of parameters an operation carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ParameterCount {
    Zero = 0,
    One = 1,
    Two = 2,
    Three = 3,
}

impl ParameterCount {
    pub fn from_count(count: i64) -> Option<Self> {
        match count {
            0 => Some(ParameterCount::Zero),
            1 => Some(ParameterCount::One),
            2 => Some(ParameterCount::Two),
            3 => Some(ParameterCount::Three),
            _ => None,
        }
    }

    pub fn as_usize(self) -> usize {
        self as usize
    }
}

/// One predicate operation with up to three parameters.
///
/// The parameter count always equals the number of non-Null parameters; the
/// constructor and the decoder both enforce it.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationItem {
    operation: OperationType,
    parameter_count: ParameterCount,
    params: [PredicateObject; 3],
}

impl OperationItem {
    /// Builds an item from its present parameters.
    ///
    /// Fails if more than three parameters are given or if any of them is Null.
    pub fn new(operation: OperationType, params: Vec<PredicateObject>) -> Result<Self> {
        if params.len() > 3 {
            return Err(DataShareError::Parameter(format!(
                "{:?} takes at most 3 parameters, got {}",
                operation,
                params.len()
            )));
        }
        if params.iter().any(PredicateObject::is_null) {
            return Err(DataShareError::Parameter(format!("{:?} parameter must not be null", operation)));
        }
        let parameter_count = ParameterCount::from_count(params.len() as i64)
            .ok_or_else(|| DataShareError::Parameter("invalid parameter count".to_string()))?;
        let mut slots: [PredicateObject; 3] = Default::default();
        for (slot, param) in slots.iter_mut().zip(params) {
            *slot = param;
        }
        Ok(Self { operation, parameter_count, params: slots })
    }

    pub fn operation(&self) -> OperationType {
        self.operation
    }

    pub fn parameter_count(&self) -> ParameterCount {
        self.parameter_count
    }

    /// The present parameters, in slot order.
    pub fn params(&self) -> &[PredicateObject] {
        &self.params[..self.parameter_count.as_usize()]
    }

    /// Field name for field-first operations (`EqualTo`, `In`, ...).
    pub fn field(&self) -> Option<&str> {
        match self.params.first() {
            Some(PredicateObject::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl Marshal for OperationItem {
    fn marshal(&self, parcel: &mut Parcel) -> Result<()> {
        parcel.write_i64(self.operation.code());
        parcel.write_i64(self.parameter_count as i64);
        for param in &self.params {
            param.marshal(parcel)?;
        }
        Ok(())
    }
}

impl Unmarshal for OperationItem {
    // two i64 headers plus three one-byte Null tags
    const MIN_WIRE_SIZE: usize = 19;

    fn unmarshal(reader: &mut ParcelReader<'_>) -> Result<Self> {
        let code = reader.read_i64()?;
        let operation = OperationType::from_code(code)
            .ok_or_else(|| DataShareError::corrupt(format!("operation code {} out of range", code)))?;
        let count = reader.read_i64()?;
        let parameter_count = ParameterCount::from_count(count)
            .ok_or_else(|| DataShareError::corrupt(format!("parameter count {} out of range", count)))?;

        let params: [PredicateObject; 3] = [reader.read()?, reader.read()?, reader.read()?];
        let present = params.iter().filter(|p| !p.is_null()).count();
        if present != parameter_count.as_usize() {
            return Err(DataShareError::corrupt(format!(
                "{:?} declares {} parameters but carries {}",
                operation, count, present
            )));
        }
        if params[..present].iter().any(PredicateObject::is_null) {
            return Err(DataShareError::corrupt(format!("{:?} parameters are not packed", operation)));
        }
        Ok(Self { operation, parameter_count, params })
    }
}

/// How a predicate was specified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SettingMode {
    #[default]
    Unset = 0,
    PredicatesMethod = 1,
    QueryLanguage = 2,
}

impl SettingMode {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(SettingMode::Unset),
            1 => Some(SettingMode::PredicatesMethod),
            2 => Some(SettingMode::QueryLanguage),
            _ => None,
        }
    }
}

/// Filter and ordering for a data operation.
///
/// Built with the fluent methods below, then handed to a dispatch call by
/// reference; the dispatch layer never mutates it.
///
/// ```
/// use datashare_common::protocol::Predicates;
///
/// let predicates = Predicates::new()
///     .equal_to("name", "Rose")
///     .and()
///     .greater_than("age", 18i64)
///     .order_by_desc("age")
///     .limit(10, 0);
/// assert_eq!(predicates.operations().len(), 5);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Predicates {
    operations: Vec<OperationItem>,
    where_clause: String,
    where_args: Vec<String>,
    order: String,
    setting_mode: SettingMode,
}

impl Predicates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw query-language form: a where clause with `?` placeholders.
    pub fn with_where_clause(where_clause: impl Into<String>, where_args: Vec<String>) -> Self {
        Self {
            where_clause: where_clause.into(),
            where_args,
            setting_mode: SettingMode::QueryLanguage,
            ..Self::default()
        }
    }

    pub fn operations(&self) -> &[OperationItem] {
        &self.operations
    }

    pub fn where_clause(&self) -> &str {
        &self.where_clause
    }

    pub fn where_args(&self) -> &[String] {
        &self.where_args
    }

    pub fn order(&self) -> &str {
        &self.order
    }

    pub fn setting_mode(&self) -> SettingMode {
        self.setting_mode
    }

    pub fn set_order(mut self, order: impl Into<String>) -> Self {
        self.order = order.into();
        self
    }

    // Null operands are dropped; the parameter count reflects what is present.
    fn push(mut self, operation: OperationType, params: Vec<PredicateObject>) -> Self {
        let params: Vec<PredicateObject> = params.into_iter().filter(|p| !p.is_null()).take(3).collect();
        let parameter_count = match params.len() {
            0 => ParameterCount::Zero,
            1 => ParameterCount::One,
            2 => ParameterCount::Two,
            _ => ParameterCount::Three,
        };
        let mut slots: [PredicateObject; 3] = Default::default();
        for (slot, param) in slots.iter_mut().zip(params) {
            *slot = param;
        }
        self.operations.push(OperationItem { operation, parameter_count, params: slots });
        self.setting_mode = SettingMode::PredicatesMethod;
        self
    }

    fn compare(self, operation: OperationType, field: &str, value: impl Into<ValueObject>) -> Self {
        let value: ValueObject = value.into();
        self.push(operation, vec![field.into(), value.into()])
    }

    pub fn equal_to(self, field: &str, value: impl Into<ValueObject>) -> Self {
        self.compare(OperationType::EqualTo, field, value)
    }

    pub fn not_equal_to(self, field: &str, value: impl Into<ValueObject>) -> Self {
        self.compare(OperationType::NotEqualTo, field, value)
    }

    pub fn greater_than(self, field: &str, value: impl Into<ValueObject>) -> Self {
        self.compare(OperationType::GreaterThan, field, value)
    }

    pub fn less_than(self, field: &str, value: impl Into<ValueObject>) -> Self {
        self.compare(OperationType::LessThan, field, value)
    }

    pub fn greater_than_or_equal_to(self, field: &str, value: impl Into<ValueObject>) -> Self {
        self.compare(OperationType::GreaterThanOrEqualTo, field, value)
    }

    pub fn less_than_or_equal_to(self, field: &str, value: impl Into<ValueObject>) -> Self {
        self.compare(OperationType::LessThanOrEqualTo, field, value)
    }

    pub fn like(self, field: &str, pattern: &str) -> Self {
        self.push(OperationType::Like, vec![field.into(), pattern.into()])
    }

    pub fn unlike(self, field: &str, pattern: &str) -> Self {
        self.push(OperationType::Unlike, vec![field.into(), pattern.into()])
    }

    pub fn between(self, field: &str, low: impl Into<ValueObject>, high: impl Into<ValueObject>) -> Self {
        let (low, high): (ValueObject, ValueObject) = (low.into(), high.into());
        self.push(OperationType::Between, vec![field.into(), low.into(), high.into()])
    }

    pub fn in_values(self, field: &str, values: impl Into<PredicateObject>) -> Self {
        self.push(OperationType::In, vec![field.into(), values.into()])
    }

    pub fn not_in(self, field: &str, values: impl Into<PredicateObject>) -> Self {
        self.push(OperationType::NotIn, vec![field.into(), values.into()])
    }

    pub fn is_null(self, field: &str) -> Self {
        self.push(OperationType::IsNull, vec![field.into()])
    }

    pub fn is_not_null(self, field: &str) -> Self {
        self.push(OperationType::IsNotNull, vec![field.into()])
    }

    pub fn and(self) -> Self {
        self.push(OperationType::And, vec![])
    }

    pub fn or(self) -> Self {
        self.push(OperationType::Or, vec![])
    }

    pub fn begin_wrap(self) -> Self {
        self.push(OperationType::BeginWrap, vec![])
    }

    pub fn end_wrap(self) -> Self {
        self.push(OperationType::EndWrap, vec![])
    }

    pub fn order_by_asc(self, field: &str) -> Self {
        self.push(OperationType::OrderByAsc, vec![field.into()])
    }

    pub fn order_by_desc(self, field: &str) -> Self {
        self.push(OperationType::OrderByDesc, vec![field.into()])
    }

    pub fn limit(self, number: i64, offset: i64) -> Self {
        self.push(OperationType::Limit, vec![number.into(), offset.into()])
    }

    pub fn group_by(self, fields: Vec<String>) -> Self {
        self.push(OperationType::GroupBy, vec![fields.into()])
    }

    pub fn distinct(self) -> Self {
        self.push(OperationType::Distinct, vec![])
    }

    pub fn in_keys(self, keys: Vec<String>) -> Self {
        self.push(OperationType::InKeys, vec![keys.into()])
    }

    pub fn key_prefix(self, prefix: &str) -> Self {
        self.push(OperationType::KeyPrefix, vec![prefix.into()])
    }
}

impl Marshal for Predicates {
    fn marshal(&self, parcel: &mut Parcel) -> Result<()> {
        self.operations.marshal(parcel)?;
        parcel.write_string(&self.where_clause)?;
        self.where_args.marshal(parcel)?;
        parcel.write_string(&self.order)?;
        parcel.write_i64(self.setting_mode as i64);
        Ok(())
    }
}

impl Unmarshal for Predicates {
    fn unmarshal(reader: &mut ParcelReader<'_>) -> Result<Self> {
        let operations: Vec<OperationItem> = reader.read()?;
        let where_clause = reader.read_string()?;
        let where_args: Vec<String> = reader.read()?;
        let order = reader.read_string()?;
        let mode = reader.read_i64()?;
        let setting_mode = SettingMode::from_code(mode)
            .ok_or_else(|| DataShareError::corrupt(format!("setting mode {} out of range", mode)))?;
        Ok(Self { operations, where_clause, where_args, order, setting_mode })
    }
}
